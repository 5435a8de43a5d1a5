//! Shared module-graph types: [`ModuleId`], [`ModuleRecord`], [`SourceKey`].

use std::fmt;
use std::hash::{Hash, Hasher};

/// Canonical, normalized identifier for a script module. Always produced by
/// [`crate::path::PathNormalizer`]; never constructed directly from raw user
/// input elsewhere in the crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(String);

impl ModuleId {
    pub(crate) fn new(canonical: impl Into<String>) -> Self {
        Self(canonical.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transient cache key: a module id paired with a 64-bit content hash of the
/// text that produced the cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub module_id: ModuleId,
    pub content_hash: u64,
}

impl SourceKey {
    pub fn new(module_id: ModuleId, text: &str) -> Self {
        Self {
            content_hash: content_hash(text),
            module_id,
        }
    }
}

/// Fast non-cryptographic 64-bit hash of module text, used only for cache
/// keys. Never retains the text itself.
pub fn content_hash(text: &str) -> u64 {
    let mut hasher = twox_hash::XxHash64::with_seed(0);
    text.hash(&mut hasher);
    hasher.finish()
}

/// The shape of a module's `exports` value, classified once at load time so
/// the lifecycle never needs to re-introspect it on the hot path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportShape {
    /// `exports = { init, update, destroy }`, used directly as an instance.
    Object,
    /// `exports = function`, a factory called once to produce an instance.
    Factory,
    /// `exports = { create: function }`, `create()` is called once.
    Provider,
}

/// A per-module record owned by [`crate::runtime::ScriptRuntime`]. Mutated
/// only on (re)load; the whole record (including its exports) is destroyed
/// on runtime shutdown, never piecemeal.
pub struct ModuleRecord<Exports> {
    pub module_id: ModuleId,
    pub exports: Exports,
    pub shape: ExportShape,
    pub version: u64,
    pub last_load_error: Option<String>,
    pub source_key: Option<SourceKey>,
}

impl<Exports: fmt::Debug> fmt::Debug for ModuleRecord<Exports> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("module_id", &self.module_id)
            .field("shape", &self.shape)
            .field("version", &self.version)
            .field("last_load_error", &self.last_load_error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_and_distinguishes_text() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
    }

    #[test]
    fn source_key_equality_depends_on_module_id_and_hash() {
        let a = SourceKey::new(ModuleId::new("a.js"), "body");
        let b = SourceKey::new(ModuleId::new("a.js"), "body");
        let c = SourceKey::new(ModuleId::new("a.js"), "different");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
