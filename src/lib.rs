//! lmcomplete — inline-completion client for local AI backends.
//!
//! Turns editor edit events into debounced, cached, cancellable requests
//! against an external `/v1/completions` server. Every failure degrades to
//! "no suggestion"; nothing here interrupts typing.

pub mod cache;
pub mod completion;
pub mod config;
pub mod error;
pub mod providers;
pub mod quick_fix;
pub mod status;

pub use completion::{CompletionSession, EditorContext, InlineCompletion};
pub use config::Config;
pub use error::{CompletionError, Result};
