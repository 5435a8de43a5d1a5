//! [`WorldAppState`]: the frame driver tying job draining, hot-reload,
//! event dispatch and world update into one fixed per-frame order.
//!
//! This module owns none of the actual game content — it orchestrates the
//! subsystems built elsewhere in the crate. A host (e.g. the `bevy`
//! integration) ticks one `WorldAppState` once per frame.

use std::collections::HashSet;

use crate::events::EventBus;
use crate::hotreload::HotReloadWatcher;
use crate::lifecycle::ScriptLifecycle;
use crate::module::ModuleId;
use crate::runtime::ScriptRuntime;
use crate::world::EntityWorld;

pub const DEFAULT_JOB_DRAIN_BUDGET: usize = 256;

/// A unit of per-frame behavior registered into a [`ScriptWorld`]. Systems
/// run in registration order, the same ordering guarantee a Bevy
/// `add_systems(Update, ...)` chain gives, just without a Bevy schedule
/// backing it.
pub trait WorldSystem {
    fn start(&mut self, _world: &mut EntityWorld, _runtime: &mut ScriptRuntime, _events: &mut EventBus) {}
    fn stop(&mut self, _world: &mut EntityWorld, _runtime: &mut ScriptRuntime, _events: &mut EventBus) {}
    fn update(&mut self, world: &mut EntityWorld, runtime: &mut ScriptRuntime, events: &mut EventBus, tpf: f64);
}

impl WorldSystem for ScriptLifecycle {
    fn update(&mut self, world: &mut EntityWorld, runtime: &mut ScriptRuntime, events: &mut EventBus, tpf: f64) {
        ScriptLifecycle::update(&*self, world, runtime, events, tpf)
    }
}

/// A swappable bundle of entities plus the systems that drive them. Starts
/// lazily: `start()` runs the first time the world is ticked or swapped in,
/// never at construction.
pub struct ScriptWorld {
    entities: EntityWorld,
    systems: Vec<Box<dyn WorldSystem>>,
    started: bool,
}

impl Default for ScriptWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptWorld {
    pub fn new() -> Self {
        Self {
            entities: EntityWorld::new(),
            systems: Vec::new(),
            started: false,
        }
    }

    pub fn with_system(mut self, system: impl WorldSystem + 'static) -> Self {
        self.systems.push(Box::new(system));
        self
    }

    pub fn entities(&self) -> &EntityWorld {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut EntityWorld {
        &mut self.entities
    }

    fn start(&mut self, runtime: &mut ScriptRuntime, events: &mut EventBus) {
        if self.started {
            return;
        }
        for system in &mut self.systems {
            system.start(&mut self.entities, runtime, events);
        }
        self.started = true;
    }

    fn stop(&mut self, runtime: &mut ScriptRuntime, events: &mut EventBus) {
        if !self.started {
            return;
        }
        for system in &mut self.systems {
            system.stop(&mut self.entities, runtime, events);
        }
        self.started = false;
    }

    fn update(&mut self, runtime: &mut ScriptRuntime, events: &mut EventBus, tpf: f64) {
        if !self.started {
            self.start(runtime, events);
        }
        for system in &mut self.systems {
            system.update(&mut self.entities, runtime, events, tpf);
        }
    }
}

/// Ties the runtime, event bus, hot-reload watcher and the active
/// [`ScriptWorld`] into one frame driver. `tick()` runs one fixed sequence:
/// drain jobs, poll hot-reload, restart if anything actually invalidated,
/// pump events, update the active world.
pub struct WorldAppState {
    runtime: ScriptRuntime,
    events: EventBus,
    watcher: Option<HotReloadWatcher>,
    job_drain_budget: usize,
    active_world: Option<ScriptWorld>,
}

impl WorldAppState {
    pub fn new(runtime: ScriptRuntime, events: EventBus) -> Self {
        Self {
            runtime,
            events,
            watcher: None,
            job_drain_budget: DEFAULT_JOB_DRAIN_BUDGET,
            active_world: None,
        }
    }

    pub fn with_watcher(mut self, watcher: HotReloadWatcher) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn with_job_drain_budget(mut self, budget: usize) -> Self {
        self.job_drain_budget = budget;
        self
    }

    pub fn runtime(&self) -> &ScriptRuntime {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut ScriptRuntime {
        &mut self.runtime
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn active_world(&self) -> Option<&ScriptWorld> {
        self.active_world.as_ref()
    }

    pub fn active_world_mut(&mut self) -> Option<&mut ScriptWorld> {
        self.active_world.as_mut()
    }

    /// Stop the previous world (if any), install `world` as the active one,
    /// and start it. Does not tick it — the next `tick()` call does that.
    pub fn set_world(&mut self, mut world: ScriptWorld) {
        if let Some(mut old) = self.active_world.take() {
            old.stop(&mut self.runtime, &mut self.events);
        }
        world.start(&mut self.runtime, &mut self.events);
        self.active_world = Some(world);
    }

    /// Advance one frame. `tpf` is the host's time-per-frame in seconds.
    pub fn tick(&mut self, tpf: f64) {
        let executed = self.runtime.drain_jobs(self.job_drain_budget);
        if executed > 0 {
            log::trace!("worldappstate: drained {executed} queued jobs");
        }

        let changed: HashSet<ModuleId> = self.watcher.as_mut().map(|w| w.poll()).unwrap_or_default();
        let mut restart_requested = false;
        if !changed.is_empty() {
            let invalidated = self.runtime.invalidate_many(&changed);
            if invalidated > 0 {
                restart_requested = true;
                log::info!("worldappstate: hot-reload invalidated {invalidated} module(s), restarting world");
            }
        }

        if restart_requested {
            if let Some(world) = &mut self.active_world {
                world.stop(&mut self.runtime, &mut self.events);
                self.runtime.reinstall_globals();
                world.start(&mut self.runtime, &mut self.events);
            }
        }

        self.events.pump();

        if let Some(world) = &mut self.active_world {
            world.update(&mut self.runtime, &mut self.events, tpf);
        }
    }
}
