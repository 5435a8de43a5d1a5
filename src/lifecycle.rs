//! [`ScriptLifecycle`]: the per-frame init/update/destroy driver that ties a
//! [`ScriptComponent`] to its [`ScriptRuntime`]-backed instance.
//!
//! Iteration goes through [`EntityWorld::view`] rather than `for_each`: the
//! driver needs the world free to hand to a host extension mid-loop (the
//! per-entity `init` call may touch other components through host-bound
//! globals), so it snapshots components, mutates the snapshot, and writes
//! each entity back once its turn is done — exactly the pattern `view()` is
//! documented for.

use boa_engine::JsValue;

use crate::error::ScriptCallError;
use crate::events::EventBus;
use crate::module::{ExportShape, ModuleId};
use crate::runtime::ScriptRuntime;
use crate::world::{EntityId, EntityWorld};

/// Attached to any entity a script should drive. `instance`/`last_seen_version`
/// are lifecycle-owned state, not something a script author sets directly.
#[derive(Clone)]
pub struct ScriptComponent {
    pub module_id: ModuleId,
    last_seen_version: Option<u64>,
    instance: Option<JsValue>,
}

impl ScriptComponent {
    pub fn new(module_id: ModuleId) -> Self {
        Self {
            module_id,
            last_seen_version: None,
            instance: None,
        }
    }

    pub fn instance(&self) -> Option<&JsValue> {
        self.instance.as_ref()
    }
}

/// Stateless driver: all state it touches lives on [`ScriptComponent`] and
/// in [`ScriptRuntime`]/[`EventBus`]. One instance is shared across an
/// embedding's lifetime; `reset()` clears every entity's instance without
/// recreating the driver itself.
#[derive(Default)]
pub struct ScriptLifecycle;

impl ScriptLifecycle {
    pub fn new() -> Self {
        Self
    }

    /// Drive every `ScriptComponent` for one frame.
    pub fn update(&self, world: &mut EntityWorld, runtime: &mut ScriptRuntime, events: &mut EventBus, tpf: f64) {
        let snapshot = world.view::<ScriptComponent>();
        for (entity, mut sc) in snapshot {
            let version = runtime.module_version(&sc.module_id);

            if sc.instance.is_none() || sc.last_seen_version != Some(version) {
                if sc.instance.take().is_some() {
                    self.destroy_instance(&sc, entity, runtime);
                    events.off_owner(entity);
                }

                match self.instantiate(&sc, runtime) {
                    Ok(instance) => {
                        sc.instance = Some(instance.clone());
                        // Re-read after instantiation: `require_module` may
                        // have just loaded the module for the first time,
                        // which bumps its version from under the `version`
                        // read above. Capturing the stale value here would
                        // make the next frame see a version mismatch and
                        // destroy/reinit the instance it just created.
                        sc.last_seen_version = Some(runtime.module_version(&sc.module_id));

                        let api = build_init_api(entity, runtime.context_mut());
                        if let Err(err) = runtime.call_method(&instance, "init", &[api]) {
                            log_swallowed(&err, Some(&sc.module_id), Some(entity));
                        }
                    }
                    Err(err) => {
                        log::error!("lifecycle: failed to (re)instantiate `{}` for entity {entity}: {err}", sc.module_id);
                        world.set_component(entity, sc);
                        continue;
                    }
                }
            }

            if let Some(instance) = sc.instance.clone() {
                let arg = JsValue::from(tpf);
                if let Err(err) = runtime.call_method(&instance, "update", &[arg]) {
                    log_swallowed(&err, Some(&sc.module_id), Some(entity));
                }
            }

            world.set_component(entity, sc);
        }
    }

    fn instantiate(&self, sc: &ScriptComponent, runtime: &mut ScriptRuntime) -> Result<JsValue, String> {
        let exports = runtime.require_module(&sc.module_id).map_err(|e| e.to_string())?;
        let shape = classify(&exports, runtime);
        runtime.instantiate(&exports, shape).map_err(|e| e.to_string())
    }

    fn destroy_instance(&self, sc: &ScriptComponent, entity: EntityId, runtime: &mut ScriptRuntime) {
        if let Some(instance) = sc.instance.clone() {
            if let Err(err) = runtime.call_method(&instance, "destroy", &[]) {
                log_swallowed(&err, Some(&sc.module_id), Some(entity));
            }
        }
    }

    /// Called when the host destroys an entity: runs `destroy` on its
    /// instance (if any) and reaps every event subscription it owned.
    pub fn on_entity_removed(&self, world: &mut EntityWorld, runtime: &mut ScriptRuntime, events: &mut EventBus, entity: EntityId) {
        if let Some(sc) = world.get_component::<ScriptComponent>(entity).cloned() {
            self.destroy_instance(&sc, entity, runtime);
        }
        events.off_owner(entity);
        world.remove_component::<ScriptComponent>(entity);
    }

    /// Invalidate every module in `changed`, then force every entity running
    /// one of them to reinitialize on the next `update`.
    pub fn on_hot_reload_changed(&self, world: &mut EntityWorld, runtime: &mut ScriptRuntime, events: &mut EventBus, changed: &[ModuleId]) {
        runtime.invalidate_many(changed);

        let snapshot = world.view::<ScriptComponent>();
        for (entity, mut sc) in snapshot {
            if changed.contains(&sc.module_id) {
                self.destroy_instance(&sc, entity, runtime);
                events.off_owner(entity);
                sc.instance = None;
                sc.last_seen_version = None;
                world.set_component(entity, sc);
            }
        }
    }

    /// Destroy every live instance and forget every version, e.g. before a
    /// deterministic restart.
    pub fn reset(&self, world: &mut EntityWorld, runtime: &mut ScriptRuntime, events: &mut EventBus) {
        let snapshot = world.view::<ScriptComponent>();
        for (entity, sc) in snapshot {
            self.destroy_instance(&sc, entity, runtime);
            events.off_owner(entity);
            world.set_component(entity, ScriptComponent::new(sc.module_id));
        }
    }
}

fn classify(exports: &JsValue, runtime: &mut ScriptRuntime) -> ExportShape {
    let Some(obj) = exports.as_object() else {
        return ExportShape::Object;
    };
    if obj.is_callable() {
        return ExportShape::Factory;
    }
    let has_create = obj
        .get(boa_engine::JsString::from("create"), runtime.context_mut())
        .ok()
        .and_then(|v| v.as_object().cloned())
        .map(|f| f.is_callable())
        .unwrap_or(false);
    if has_create {
        ExportShape::Provider
    } else {
        ExportShape::Object
    }
}

/// Minimal per-entity argument to `init`: `{ entityId }`. The richer host
/// API surface (events/entity/assets/log) is installed as globals by the
/// host's [`crate::runtime::host::HostExtension`]s, not rebuilt here per
/// call — the exact shape of that surface is left to the host.
fn build_init_api(entity: EntityId, ctx: &mut boa_engine::Context) -> JsValue {
    let obj = boa_engine::JsObject::default();
    let _ = obj.set(boa_engine::JsString::from("entityId"), JsValue::from(entity as f64), false, ctx);
    JsValue::from(obj)
}

fn log_swallowed(err: &ScriptCallError, module_id: Option<&ModuleId>, entity_id: Option<EntityId>) {
    log::error!(
        "script call `{}` failed for module {:?} entity {:?}: {}",
        err.phase,
        module_id,
        entity_id,
        err.reason
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::resolve::{ModuleResolver, ResolverConfig};
    use crate::runtime::host::{HostExtensionRegistry, InMemoryAssetReader};
    use std::sync::Arc;

    fn runtime(reader: InMemoryAssetReader) -> ScriptRuntime {
        let resolver = ModuleResolver::new(ResolverConfig {
            assets_root: String::new(),
            ..ResolverConfig::default()
        });
        ScriptRuntime::new(resolver, Arc::new(reader), CacheConfig::default(), HostExtensionRegistry::new())
    }

    #[test]
    fn init_runs_once_then_update_runs_every_frame() {
        let reader = InMemoryAssetReader::new().with_module(
            "a.js",
            "let inits = 0; let updates = 0; \
             exports.init = function() { inits += 1; }; \
             exports.update = function() { updates += 1; }; \
             exports.getCounts = function() { return { inits, updates }; };",
        );
        let mut rt = runtime(reader);
        let mut world = EntityWorld::new();
        let mut events = EventBus::default();
        let lifecycle = ScriptLifecycle::new();

        let e = world.spawn_entity();
        world.set_component(e, ScriptComponent::new(ModuleId::new("a.js")));

        lifecycle.update(&mut world, &mut rt, &mut events, 0.016);
        lifecycle.update(&mut world, &mut rt, &mut events, 0.016);
        lifecycle.update(&mut world, &mut rt, &mut events, 0.016);

        let sc = world.get_component::<ScriptComponent>(e).unwrap();
        let instance = sc.instance().unwrap().clone();
        let counts = rt.call_method(&instance, "getCounts", &[]).unwrap().unwrap();
        let obj = counts.as_object().unwrap();
        let inits = obj.get(boa_engine::JsString::from("inits"), rt.context_mut()).unwrap();
        let updates = obj.get(boa_engine::JsString::from("updates"), rt.context_mut()).unwrap();
        assert_eq!(inits.as_number(), Some(1.0));
        assert_eq!(updates.as_number(), Some(3.0));
    }

    #[test]
    fn hot_reload_destroys_and_reinitializes() {
        let reader = InMemoryAssetReader::new().with_module(
            "a.js",
            "let destroyed = false; \
             exports.destroy = function() { destroyed = true; }; \
             exports.wasDestroyed = function() { return destroyed; };",
        );
        let mut rt = runtime(reader);
        let mut world = EntityWorld::new();
        let mut events = EventBus::default();
        let lifecycle = ScriptLifecycle::new();

        let e = world.spawn_entity();
        world.set_component(e, ScriptComponent::new(ModuleId::new("a.js")));
        lifecycle.update(&mut world, &mut rt, &mut events, 0.0);

        let id = ModuleId::new("a.js");
        lifecycle.on_hot_reload_changed(&mut world, &mut rt, &mut events, std::slice::from_ref(&id));

        let sc = world.get_component::<ScriptComponent>(e).unwrap();
        assert!(sc.instance().is_none());

        lifecycle.update(&mut world, &mut rt, &mut events, 0.0);
        let sc = world.get_component::<ScriptComponent>(e).unwrap();
        assert!(sc.instance().is_some());
    }

    #[test]
    fn on_entity_removed_runs_destroy_and_reaps_subscriptions() {
        let reader = InMemoryAssetReader::new().with_module("a.js", "exports.update = function() {};");
        let mut rt = runtime(reader);
        let mut world = EntityWorld::new();
        let mut events = EventBus::default();
        let lifecycle = ScriptLifecycle::new();

        let e = world.spawn_entity();
        world.set_component(e, ScriptComponent::new(ModuleId::new("a.js")));
        lifecycle.update(&mut world, &mut rt, &mut events, 0.0);
        events.on_event("topic", crate::events::Phase::Main, 0, Some(e), |_| {});
        assert_eq!(events.subscription_count(), 1);

        lifecycle.on_entity_removed(&mut world, &mut rt, &mut events, e);

        assert_eq!(events.subscription_count(), 0);
        assert!(world.get_component::<ScriptComponent>(e).is_none());
    }

    #[test]
    fn missing_methods_are_silently_skipped() {
        let reader = InMemoryAssetReader::new().with_module("a.js", "module.exports = {};");
        let mut rt = runtime(reader);
        let mut world = EntityWorld::new();
        let mut events = EventBus::default();
        let lifecycle = ScriptLifecycle::new();

        let e = world.spawn_entity();
        world.set_component(e, ScriptComponent::new(ModuleId::new("a.js")));
        lifecycle.update(&mut world, &mut rt, &mut events, 0.016);

        let sc = world.get_component::<ScriptComponent>(e).unwrap();
        assert!(sc.instance().is_some());
    }
}
