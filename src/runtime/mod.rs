//! [`ScriptRuntime`]: the module graph plus the single embedded [`Context`]
//! it evaluates against.
//!
//! Everything that touches `Context` lives behind `&mut ScriptRuntime` and is
//! only ever called from the host thread (see [`crate::error::InvariantError`]).
//! The module graph itself (resolver, caches, per-module state, job queue) is
//! split into [`ModuleGraph`] and held behind `Rc<RefCell<_>>` so the native
//! `require` function registered into the engine can borrow it again, re-
//! entrantly, without also needing a second handle to `Context` — boa hands
//! `Context` to the closure fresh on every call instead of letting it capture
//! one, so the only thing the closure needs to own is the graph handle.

mod wrap;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use boa_engine::object::FunctionObjectBuilder;
use boa_engine::{Context, JsError, JsNativeError, JsObject, JsString, JsValue, NativeFunction, Script, Source};
use boa_gc::{empty_trace, Finalize, Trace};

use crate::cache::{CacheConfig, ScriptCache};
use crate::error::{CompileError, EvaluateError, RequireError, ScriptCallError};
use crate::jobs::{JobQueue, JobSender};
use crate::module::{ExportShape, ModuleId, ModuleRecord, SourceKey};
use crate::resolve::ModuleResolver;
use crate::runtime::host::{AssetReader, HostExtensionRegistry};

pub mod host;

pub use wrap::wrap_source;

/// Per-module bookkeeping that survives invalidation. `version` only ever
/// increases and is tracked independently of `record`: `invalidate` bumps it
/// and clears `record` in the same step, so a module mid-reload (no `record`
/// yet) still reports its live version. `pending_reload` is set by
/// [`ScriptRuntime::invalidate`] and cleared by the next load so a single
/// invalidate-then-reload cycle bumps the version exactly once, while a
/// version already bumped by `invalidate` isn't bumped again by the load
/// that follows it.
struct ModuleSlot {
    version: u64,
    record: Option<ModuleRecord<JsValue>>,
    pending_reload: bool,
}

impl Default for ModuleSlot {
    fn default() -> Self {
        Self {
            version: 0,
            record: None,
            pending_reload: false,
        }
    }
}

/// Everything `require` needs besides the engine `Context` itself: resolver,
/// bounded caches, per-module state, the asset reader, and the job queue.
/// Lives behind `Rc<RefCell<_>>` so both [`ScriptRuntime`]'s own methods and
/// the native `require` closure it installs can reach it.
struct ModuleGraph {
    resolver: ModuleResolver,
    cache: ScriptCache<Script>,
    slots: HashMap<ModuleId, ModuleSlot>,
    reader: Arc<dyn AssetReader>,
    jobs: JobQueue,
    invalidation_hooks: Vec<Box<dyn FnMut(&ModuleId)>>,
}

/// Data a `require` native function closure captures. Opaque to boa's
/// garbage collector: it holds only `Rc`/plain Rust state, never a `JsValue`
/// or other GC-managed handle, so it is safe to mark untraced the way the
/// teacher's `ReactClient` is.
#[derive(Clone, Finalize)]
struct RequireCapture {
    graph: Rc<RefCell<ModuleGraph>>,
    parent: ModuleId,
}

unsafe impl Trace for RequireCapture {
    empty_trace!();
}

/// Owns the embedded engine and the module graph evaluated against it. One
/// `ScriptRuntime` per host thread; `require`, `invalidate`, `instantiate`,
/// and `call_method` all require `&mut self` because they may run JS.
pub struct ScriptRuntime {
    graph: Rc<RefCell<ModuleGraph>>,
    context: Context,
    extensions: HostExtensionRegistry,
}

impl ScriptRuntime {
    pub fn new(resolver: ModuleResolver, reader: Arc<dyn AssetReader>, cache_config: CacheConfig, extensions: HostExtensionRegistry) -> Self {
        let mut context = Context::default();
        extensions.install_all(&mut context);

        Self {
            graph: Rc::new(RefCell::new(ModuleGraph {
                resolver,
                cache: ScriptCache::new(cache_config),
                slots: HashMap::new(),
                reader,
                jobs: JobQueue::new(),
                invalidation_hooks: Vec::new(),
            })),
            context,
            extensions,
        }
    }

    /// Re-runs every registered host extension against the current context.
    /// The frame driver calls this during a deterministic restart without
    /// needing to know what the host extensions actually bind.
    pub fn reinstall_globals(&mut self) {
        self.extensions.install_all(&mut self.context);
    }

    /// A cloneable handle background threads use to submit work that must
    /// run on the host thread.
    pub fn jobs(&self) -> JobSender {
        self.graph.borrow().jobs.sender()
    }

    /// Run up to `budget` queued jobs. Must be called from the host thread.
    pub fn drain_jobs(&self, budget: usize) -> usize {
        self.graph.borrow().jobs.drain(budget)
    }

    pub fn pending_jobs(&self) -> usize {
        self.graph.borrow().jobs.len()
    }

    /// Current version of `id`, or `0` if it has never loaded.
    pub fn module_version(&self, id: &ModuleId) -> u64 {
        self.graph.borrow().slots.get(id).map(|s| s.version).unwrap_or(0)
    }

    /// Register a hook invoked with a module's id every time it is
    /// invalidated. Used by [`crate::lifecycle::ScriptLifecycle`] to tear
    /// down live instances of a module before it reloads.
    pub fn on_invalidated(&mut self, hook: impl FnMut(&ModuleId) + 'static) {
        self.graph.borrow_mut().invalidation_hooks.push(Box::new(hook));
    }

    /// Drop `id`'s cached exports and bump its version. Returns whether a
    /// loaded record existed to invalidate. A no-op on a module that was
    /// never loaded or is already pending reload.
    pub fn invalidate(&mut self, id: &ModuleId) -> bool {
        let existed = {
            let mut graph = self.graph.borrow_mut();
            graph.cache.invalidate(id);
            match graph.slots.get_mut(id) {
                Some(slot) if slot.record.is_some() => {
                    slot.record = None;
                    slot.version += 1;
                    slot.pending_reload = true;
                    true
                }
                _ => false,
            }
        };
        if existed {
            let mut graph = self.graph.borrow_mut();
            for hook in &mut graph.invalidation_hooks {
                hook(id);
            }
        }
        existed
    }

    /// Invalidate every id in `ids`, returning how many had a loaded record.
    pub fn invalidate_many<'a>(&mut self, ids: impl IntoIterator<Item = &'a ModuleId>) -> u32 {
        let mut count = 0;
        for id in ids {
            if self.invalidate(id) {
                count += 1;
            }
        }
        count
    }

    /// Resolve `request` from `parent` and return its (cached or freshly
    /// loaded) exports. The only entry point that can recurse into itself —
    /// directly, or via the `require` function visible to the module body —
    /// for circular requires.
    pub fn require(&mut self, parent: Option<&ModuleId>, request: &str) -> Result<JsValue, RequireError> {
        let id = self.graph.borrow().resolver.resolve(parent, request)?;
        require_by_id(&self.graph, &mut self.context, &id)
    }

    /// Resolve-and-load by an already-canonical id, skipping resolution.
    /// Useful for hosts that keep their own id (e.g. the entry script path)
    /// rather than re-resolving a request string.
    pub fn require_module(&mut self, id: &ModuleId) -> Result<JsValue, RequireError> {
        require_by_id(&self.graph, &mut self.context, id)
    }

    /// Classify `exports` and, for a [`ExportShape::Factory`] or
    /// [`ExportShape::Provider`] shape, call the factory/`create` function to
    /// produce the instance a script's lifecycle actually drives.
    pub fn instantiate(&mut self, exports: &JsValue, shape: ExportShape) -> Result<JsValue, EvaluateError> {
        match shape {
            ExportShape::Object => Ok(exports.clone()),
            ExportShape::Factory => {
                let factory = exports.as_object().cloned().filter(JsObject::is_callable).ok_or_else(|| EvaluateError {
                    module_id: ModuleId::new(""),
                    reason: "exports classified as Factory but is not callable".to_string(),
                })?;
                factory.call(&JsValue::undefined(), &[], &mut self.context).map_err(|e| EvaluateError {
                    module_id: ModuleId::new(""),
                    reason: e.to_string(),
                })
            }
            ExportShape::Provider => {
                let obj = exports.as_object().cloned().ok_or_else(|| EvaluateError {
                    module_id: ModuleId::new(""),
                    reason: "exports classified as Provider but is not an object".to_string(),
                })?;
                let create = obj.get(JsString::from("create"), &mut self.context).map_err(|e| EvaluateError {
                    module_id: ModuleId::new(""),
                    reason: e.to_string(),
                })?;
                let create_fn = create.as_object().cloned().filter(JsObject::is_callable).ok_or_else(|| EvaluateError {
                    module_id: ModuleId::new(""),
                    reason: "exports.create is not callable".to_string(),
                })?;
                create_fn.call(&JsValue::undefined(), &[], &mut self.context).map_err(|e| EvaluateError {
                    module_id: ModuleId::new(""),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Call `method` on `instance` with `args` if it exists and is callable.
    /// `Ok(None)` means the method is absent — lifecycle and event dispatch
    /// treat that as a silent no-op. A thrown exception or a non-callable
    /// property comes back as `Err` for the
    /// caller to log and swallow; it must never propagate out of a per-frame
    /// tick.
    pub fn call_method(&mut self, instance: &JsValue, method: &str, args: &[JsValue]) -> Result<Option<JsValue>, ScriptCallError> {
        let Some(obj) = instance.as_object() else {
            return Ok(None);
        };
        let property = obj.get(JsString::from(method), &mut self.context).map_err(|e| ScriptCallError {
            module_id: None,
            entity_id: None,
            phase: "call_method",
            reason: e.to_string(),
        })?;
        let Some(func) = property.as_object().cloned().filter(JsObject::is_callable) else {
            return Ok(None);
        };
        func.call(instance, args, &mut self.context)
            .map(Some)
            .map_err(|e| ScriptCallError {
                module_id: None,
                entity_id: None,
                phase: "call_method",
                reason: e.to_string(),
            })
    }

    /// Direct access to the embedded engine, for host extensions that need
    /// to build `JsValue`s (e.g. arguments to `call_method`) outside of a
    /// native function call.
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }
}

fn require_by_id(graph: &Rc<RefCell<ModuleGraph>>, ctx: &mut Context, id: &ModuleId) -> Result<JsValue, RequireError> {
    {
        let g = graph.borrow();
        if let Some(slot) = g.slots.get(id) {
            if let Some(record) = &slot.record {
                if record.last_load_error.is_none() {
                    return Ok(record.exports.clone());
                }
            }
        }
    }
    load_module(graph, ctx, id)
}

fn load_module(graph: &Rc<RefCell<ModuleGraph>>, ctx: &mut Context, id: &ModuleId) -> Result<JsValue, RequireError> {
    let module_obj = JsObject::default();
    let exports_obj = JsObject::default();
    module_obj
        .set(JsString::from("exports"), JsValue::from(exports_obj.clone()), false, ctx)
        .map_err(|e| RequireError::Evaluate(EvaluateError {
            module_id: id.clone(),
            reason: e.to_string(),
        }))?;

    {
        let mut g = graph.borrow_mut();
        let slot = g.slots.entry(id.clone()).or_default();
        if !slot.pending_reload {
            slot.version += 1;
        }
        slot.pending_reload = false;
        let version = slot.version;
        slot.record = Some(ModuleRecord {
            module_id: id.clone(),
            exports: exports_obj.clone().into(),
            shape: ExportShape::Object,
            version,
            last_load_error: None,
            source_key: None,
        });
    }

    let result = load_inner(graph, ctx, id, &module_obj, &exports_obj);

    let mut g = graph.borrow_mut();
    let slot = g.slots.entry(id.clone()).or_default();
    let version = slot.version;
    match &result {
        Ok((final_exports, key)) => {
            let shape = classify_exports(final_exports, ctx);
            slot.record = Some(ModuleRecord {
                module_id: id.clone(),
                exports: final_exports.clone(),
                shape,
                version,
                last_load_error: None,
                source_key: Some(key.clone()),
            });
        }
        Err(err) => {
            log::error!("require `{id}` failed: {err}");
            slot.record = Some(ModuleRecord {
                module_id: id.clone(),
                exports: exports_obj.clone().into(),
                shape: ExportShape::Object,
                version,
                last_load_error: Some(err.to_string()),
                source_key: None,
            });
        }
    }
    drop(g);

    result.map(|(exports, _)| exports)
}

fn load_inner(
    graph: &Rc<RefCell<ModuleGraph>>,
    ctx: &mut Context,
    id: &ModuleId,
    module_obj: &JsObject,
    exports_obj: &JsObject,
) -> Result<(JsValue, SourceKey), RequireError> {
    let text = {
        let mut g = graph.borrow_mut();
        match g.cache.get_text(id) {
            Some(text) => text,
            None => {
                let text = g.reader.read_text(id).map_err(RequireError::Load)?;
                g.cache.put_text(id.clone(), text.clone());
                text
            }
        }
    };

    let key = SourceKey::new(id.clone(), &text);

    let wrapped = {
        let mut g = graph.borrow_mut();
        match g.cache.get_wrapped_code(&key) {
            Some(code) => code,
            None => {
                let code = wrap_source(&text);
                g.cache.put_wrapped_code(key.clone(), code.clone());
                code
            }
        }
    };

    let compiled = {
        let mut g = graph.borrow_mut();
        match g.cache.get_compiled(&key) {
            Some(script) => script,
            None => {
                let source = Source::from_bytes(wrapped.as_bytes());
                let script = Script::parse(source, None, ctx).map_err(|e| CompileError {
                    module_id: id.clone(),
                    reason: e.to_string(),
                })?;
                g.cache.put_compiled(key.clone(), script.clone());
                script
            }
        }
    };

    let wrapper_value = compiled.evaluate(ctx).map_err(|e| EvaluateError {
        module_id: id.clone(),
        reason: e.to_string(),
    })?;

    let wrapper_fn = wrapper_value
        .as_object()
        .cloned()
        .filter(JsObject::is_callable)
        .ok_or_else(|| EvaluateError {
            module_id: id.clone(),
            reason: "wrapped module body did not evaluate to a function".to_string(),
        })?;

    let require_fn = make_require_function(graph.clone(), id.clone(), ctx);
    let dirname = dirname_of(id.as_str());

    let args = [
        JsValue::from(module_obj.clone()),
        JsValue::from(exports_obj.clone()),
        require_fn,
        JsValue::from(JsString::from(id.as_str())),
        JsValue::from(JsString::from(dirname)),
    ];

    wrapper_fn.call(&JsValue::undefined(), &args, ctx).map_err(|e| EvaluateError {
        module_id: id.clone(),
        reason: e.to_string(),
    })?;

    let final_exports = module_obj.get(JsString::from("exports"), ctx).unwrap_or_else(|_| exports_obj.clone().into());
    Ok((final_exports, key))
}

fn make_require_function(graph: Rc<RefCell<ModuleGraph>>, parent: ModuleId, ctx: &mut Context) -> JsValue {
    let capture = RequireCapture { graph, parent };
    JsValue::from(context_register_require(ctx, capture))
}

fn context_register_require(ctx: &mut Context, capture: RequireCapture) -> JsObject {
    let native = NativeFunction::from_copy_closure_with_captures(
        |_this: &JsValue, args: &[JsValue], capture: &RequireCapture, ctx: &mut Context| -> Result<JsValue, JsError> {
            let request = args
                .first()
                .and_then(|v| v.as_string())
                .map(|s| s.to_std_string_escaped())
                .unwrap_or_default();
            let resolved = capture.graph.borrow().resolver.resolve(Some(&capture.parent), &request);
            let id = resolved.map_err(|e| JsError::from_native(JsNativeError::typ().with_message(e.to_string())))?;
            require_by_id(&capture.graph, ctx, &id).map_err(|e| JsError::from_native(JsNativeError::typ().with_message(e.to_string())))
        },
        capture,
    );
    FunctionObjectBuilder::new(ctx.realm(), native).build()
}

fn classify_exports(value: &JsValue, ctx: &mut Context) -> ExportShape {
    let Some(obj) = value.as_object() else {
        return ExportShape::Object;
    };
    if obj.is_callable() {
        return ExportShape::Factory;
    }
    if let Ok(create) = obj.get(JsString::from("create"), ctx) {
        if create.as_object().map(JsObject::is_callable).unwrap_or(false) {
            return ExportShape::Provider;
        }
    }
    ExportShape::Object
}

fn dirname_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}
