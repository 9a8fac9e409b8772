//! Inline-completion request pipeline: debounce, cache, dispatch.

pub mod context;
pub mod debounce;
pub mod dispatcher;
pub mod session;

pub use context::EditorContext;
pub use debounce::{DebounceGate, GateDecision};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use session::{
    AnalysisNotice, CompletionOutcome, CompletionResult, CompletionSession, InlineCompletion,
};
