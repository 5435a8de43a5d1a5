//! Bevy integration: installs [`WorldAppState`] into the `App` and ticks it
//! once per `Update`.
//!
//! [`ScriptRuntime`](crate::runtime::ScriptRuntime) holds a `boa_engine::Context`
//! directly and is not `Send` — the whole core already runs on one
//! designated main thread, so a worker thread would only add a channel hop
//! for no benefit. [`WorldAppState`] is installed as a *non-send* resource
//! instead, which Bevy guarantees only ever runs on the main thread.

use std::sync::Mutex;

use bevy::prelude::*;

use crate::appstate::WorldAppState;

/// Builds and installs a [`WorldAppState`] as a non-send resource, then
/// ticks it with the frame's delta time every `Update`.
///
/// The state is supplied as a factory rather than a value: `WorldAppState`
/// is not `Send` (it owns a `boa_engine::Context`), while `Plugin` itself
/// must be `Send + Sync`. The factory only needs to be `Send` — it runs
/// exactly once, inside `build()`, which Bevy always calls from the main
/// thread, so the non-`Send` value it produces never has to cross threads.
pub struct ScriptPlugin<F> {
    factory: Mutex<Option<F>>,
}

impl<F> ScriptPlugin<F>
where
    F: FnOnce() -> WorldAppState + Send + 'static,
{
    pub fn new(factory: F) -> Self {
        Self {
            factory: Mutex::new(Some(factory)),
        }
    }
}

impl<F> Plugin for ScriptPlugin<F>
where
    F: FnOnce() -> WorldAppState + Send + 'static,
{
    fn build(&self, app: &mut App) {
        let factory = self
            .factory
            .lock()
            .expect("script plugin factory poisoned")
            .take()
            .expect("ScriptPlugin::build called more than once");

        log::info!("installing scripting core as a non-send Bevy resource");
        app.insert_non_send_resource(factory());
        app.add_systems(Update, tick_world_app_state);
    }
}

/// Advances the scripting core by one frame, in the exact order
/// [`WorldAppState::tick`] specifies (drain jobs, poll hot-reload, restart
/// if anything invalidated, pump events, update the active world).
fn tick_world_app_state(mut state: NonSendMut<WorldAppState>, time: Res<Time>) {
    state.tick(time.delta_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::events::EventBus;
    use crate::resolve::{ModuleResolver, ResolverConfig};
    use crate::runtime::host::{HostExtensionRegistry, InMemoryAssetReader};
    use crate::runtime::ScriptRuntime;
    use std::sync::Arc;

    fn make_state() -> WorldAppState {
        let reader = InMemoryAssetReader::new();
        let resolver = ModuleResolver::new(ResolverConfig::default());
        let runtime = ScriptRuntime::new(resolver, Arc::new(reader), CacheConfig::default(), HostExtensionRegistry::new());
        WorldAppState::new(runtime, EventBus::default())
    }

    #[test]
    fn plugin_installs_world_app_state_as_non_send_resource() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.add_plugins(ScriptPlugin::new(make_state));
        app.update();

        assert!(app.world().get_non_send_resource::<WorldAppState>().is_some());
    }
}
