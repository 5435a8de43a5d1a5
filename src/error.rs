//! Error taxonomy for the scripting core.
//!
//! `require` propagates [`ResolveError`], [`LoadError`], [`CompileError`] and
//! [`EvaluateError`] to its caller so a broken module fails startup loudly.
//! [`ScriptCallError`] never escapes the lifecycle or event-dispatch boundary:
//! it exists to be logged and swallowed, never returned up the call stack.

use crate::module::ModuleId;
use thiserror::Error;

/// No resolver strategy produced a canonical module id.
#[derive(Debug, Error)]
#[error("could not resolve module `{request}` from `{parent}`: tried {tried:?}")]
pub struct ResolveError {
    pub request: String,
    pub parent: String,
    pub tried: Vec<&'static str>,
}

/// The host's asset-read capability could not produce module text.
#[derive(Debug, Error)]
#[error("failed to load source for `{module_id}`: {reason}")]
pub struct LoadError {
    pub module_id: ModuleId,
    pub reason: String,
}

/// The wrapped source text failed to compile in the embedded engine.
#[derive(Debug, Error)]
#[error("failed to compile `{module_id}`: {reason}")]
pub struct CompileError {
    pub module_id: ModuleId,
    pub reason: String,
}

/// The module body threw while evaluating.
#[derive(Debug, Error)]
#[error("error evaluating `{module_id}`: {reason}")]
pub struct EvaluateError {
    pub module_id: ModuleId,
    pub reason: String,
}

/// A lifecycle hook or event handler threw. Always caught, logged, and
/// discarded by the caller — never returned further up.
#[derive(Debug, Error)]
#[error("script call `{phase}` on `{module_id:?}` failed: {reason}")]
pub struct ScriptCallError {
    pub module_id: Option<ModuleId>,
    pub entity_id: Option<u32>,
    pub phase: &'static str,
    pub reason: String,
}

/// The core API was misused, e.g. `require` called off the host thread.
#[derive(Debug, Error)]
#[error("invariant violated: {0}")]
pub struct InvariantError(pub String);

/// Union of the errors `ScriptRuntime::require` can surface to its caller.
#[derive(Debug, Error)]
pub enum RequireError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Evaluate(#[from] EvaluateError),
    #[error(transparent)]
    Invariant(#[from] InvariantError),
}
