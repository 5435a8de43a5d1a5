//! Capabilities the host provides to the runtime: reading module text, and
//! installing native functions/globals into the script scope. The runtime
//! never touches the filesystem or decides what globals scripts see — it
//! only asks for text and exposes a registration seam.

use std::path::PathBuf;

use boa_engine::Context;

use crate::error::LoadError;
use crate::module::ModuleId;

/// The host's asset-read capability. The core asks for module text through
/// this trait; it never opens files itself.
pub trait AssetReader: Send + Sync {
    fn read_text(&self, module_id: &ModuleId) -> Result<String, LoadError>;
}

/// An in-memory reader useful for tests and for embedding hosts that keep
/// scripts in memory (e.g. bundled at build time) rather than on disk.
#[derive(Default)]
pub struct InMemoryAssetReader {
    modules: std::collections::HashMap<String, String>,
}

impl InMemoryAssetReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, id: impl Into<String>, source: impl Into<String>) -> Self {
        self.modules.insert(id.into(), source.into());
        self
    }

    pub fn insert(&mut self, id: impl Into<String>, source: impl Into<String>) {
        self.modules.insert(id.into(), source.into());
    }
}

impl AssetReader for InMemoryAssetReader {
    fn read_text(&self, module_id: &ModuleId) -> Result<String, LoadError> {
        self.modules.get(module_id.as_str()).cloned().ok_or_else(|| LoadError {
            module_id: module_id.clone(),
            reason: "not found in in-memory asset set".to_string(),
        })
    }
}

/// Reads module text from files on disk, relative to a configured root.
/// The counterpart to [`InMemoryAssetReader`] for hosts that keep scripts
/// as real files (so [`crate::hotreload::HotReloadWatcher`] has something
/// to watch).
pub struct FsAssetReader {
    root: PathBuf,
}

impl FsAssetReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetReader for FsAssetReader {
    fn read_text(&self, module_id: &ModuleId) -> Result<String, LoadError> {
        let path = self.root.join(module_id.as_str());
        std::fs::read_to_string(&path).map_err(|err| LoadError {
            module_id: module_id.clone(),
            reason: format!("{}: {err}", path.display()),
        })
    }
}

/// Registers native functions/globals into a freshly-built [`Context`].
/// Different subsystems (entity access, logging, time, etc.) each provide
/// one of these and register independently, without the engine knowing
/// about any particular subsystem.
pub trait HostExtension: Send + Sync {
    fn register(&self, context: &mut Context);
}

/// Holds every extension the host wants installed; applied in registration
/// order each time the runtime (re)builds its scope.
#[derive(Default, Clone)]
pub struct HostExtensionRegistry {
    extensions: Vec<std::sync::Arc<dyn HostExtension>>,
}

impl HostExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extension: std::sync::Arc<dyn HostExtension>) {
        self.extensions.push(extension);
    }

    pub fn install_all(&self, context: &mut Context) {
        for extension in &self.extensions {
            extension.register(context);
        }
    }
}
