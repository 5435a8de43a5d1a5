//! # Polyglot scripting core
//!
//! The subsystem that loads, wraps, compiles, caches, and hot-reloads script
//! modules; links script-side components to host entities through an
//! entity-component store; drives per-frame script lifecycle deterministically;
//! carries events between host and scripts with phased, prioritized,
//! pattern-matched dispatch; and queues work from background threads for
//! safe execution on the host's single render/update thread.
//!
//! This crate does not execute scripts itself in the sense of owning a
//! rendering loop, an asset pipeline, or a network stack — it drives an
//! embedded script engine (Boa) the host supplies, and asks the host for
//! module text through [`runtime::host::AssetReader`]. Everything a game
//! actually does (audio, materials, shaders, physics, input) stays out of
//! this crate; it is thin host-API surface the scripts consume.
//!
//! ## Dependency order
//!
//! [`path`] and [`resolve`] are leaves; [`cache`] and [`runtime`] build on
//! them; [`events`], [`jobs`], and [`world`] are independent of the module
//! graph; [`lifecycle`] ties [`world`] to [`runtime`] and [`events`];
//! [`appstate`] is the frame driver tying everything together.
//!
//! ## Example
//!
//! ```no_run
//! use script_core::appstate::{ScriptWorld, WorldAppState};
//! use script_core::cache::CacheConfig;
//! use script_core::events::EventBus;
//! use script_core::lifecycle::{ScriptComponent, ScriptLifecycle};
//! use script_core::module::ModuleId;
//! use script_core::resolve::{ModuleResolver, ResolverConfig};
//! use script_core::runtime::host::{HostExtensionRegistry, InMemoryAssetReader};
//! use script_core::runtime::ScriptRuntime;
//! use std::sync::Arc;
//!
//! let reader = InMemoryAssetReader::new()
//!     .with_module("scripts/sky.js", "exports.update = function(tpf) {};");
//! let resolver = ModuleResolver::new(ResolverConfig::default());
//! let runtime = ScriptRuntime::new(resolver, Arc::new(reader), CacheConfig::default(), HostExtensionRegistry::new());
//!
//! let mut app = WorldAppState::new(runtime, EventBus::default());
//! let mut world = ScriptWorld::new().with_system(ScriptLifecycle::new());
//! let sky = world.entities_mut().spawn_entity();
//! world.entities_mut().set_component(sky, ScriptComponent::new(ModuleId::new("scripts/sky.js")));
//! app.set_world(world);
//! app.tick(0.016);
//! ```

pub mod appstate;
pub mod cache;
pub mod error;
pub mod events;
pub mod hotreload;
pub mod jobs;
pub mod lifecycle;
pub mod module;
pub mod path;
pub mod resolve;
pub mod runtime;
pub mod world;

#[cfg(feature = "bevy")]
pub mod bevy_integration;
