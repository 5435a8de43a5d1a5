//! Minimal host wiring up `script_core` inside a Bevy app: two entities run
//! scripts loaded from `demos/demo/scripts/`, the event bus carries a tick
//! event between them, and the hot-reload watcher picks up edits to those
//! files while the app is running.

use std::path::PathBuf;
use std::sync::Arc;

use bevy::prelude::*;
use boa_engine::{Context, JsString, JsValue, NativeFunction};

use script_core::appstate::{ScriptWorld, WorldAppState};
use script_core::bevy_integration::ScriptPlugin;
use script_core::cache::CacheConfig;
use script_core::events::EventBus;
use script_core::hotreload::{HotReloadConfig, HotReloadWatcher};
use script_core::lifecycle::{ScriptComponent, ScriptLifecycle};
use script_core::module::ModuleId;
use script_core::resolve::{ModuleResolver, ResolverConfig};
use script_core::runtime::host::{FsAssetReader, HostExtension, HostExtensionRegistry};
use script_core::runtime::ScriptRuntime;

/// Exposes a `log(message)` global to scripts, bridging to the host's
/// `log` crate. A production host would likely expose a level argument
/// too; this demo keeps it to one argument for brevity.
struct ConsoleLogExtension;

impl HostExtension for ConsoleLogExtension {
    fn register(&self, context: &mut Context) {
        let log_fn = NativeFunction::from_copy_closure(|_this: &JsValue, args: &[JsValue], _ctx: &mut Context| {
            let message = args
                .first()
                .and_then(|v| v.as_string())
                .map(|s| s.to_std_string_escaped())
                .unwrap_or_default();
            log::info!("[script] {message}");
            Ok(JsValue::undefined())
        });
        context
            .register_global_callable(JsString::from("log"), 1, log_fn)
            .expect("failed to register `log` global");
    }
}

fn scripts_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scripts")
}

fn build_app_state() -> WorldAppState {
    let root = scripts_dir();

    let mut extensions = HostExtensionRegistry::new();
    extensions.register(Arc::new(ConsoleLogExtension));

    let resolver = ModuleResolver::new(ResolverConfig {
        assets_root: String::new(),
        ..ResolverConfig::default()
    });
    let reader = Arc::new(FsAssetReader::new(&root));
    let runtime = ScriptRuntime::new(resolver, reader, CacheConfig::default(), extensions);

    let watcher = HotReloadWatcher::new(
        &root,
        HotReloadConfig {
            assets_root: root.clone(),
            ..HotReloadConfig::default()
        },
    )
    .expect("failed to start hot-reload watcher");

    WorldAppState::new(runtime, EventBus::default()).with_watcher(watcher)
}

fn setup_world(mut app: NonSendMut<WorldAppState>) {
    let mut world = ScriptWorld::new().with_system(ScriptLifecycle::new());
    let sky = world.entities_mut().spawn_entity();
    world.entities_mut().set_component(sky, ScriptComponent::new(ModuleId::new("sky.js")));
    let spinner = world.entities_mut().spawn_entity();
    world.entities_mut().set_component(spinner, ScriptComponent::new(ModuleId::new("spinner.js")));
    app.set_world(world);
}

fn main() {
    App::new()
        .add_plugins(DefaultPlugins)
        .add_plugins(ScriptPlugin::new(build_app_state))
        .add_systems(Startup, setup_world)
        .run();
}
