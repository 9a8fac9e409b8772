//! Request dispatcher: one backend call, raced against cancellation, with
//! every failure classified and logged instead of returned.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::CompletionError;
use crate::providers::{Analysis, CompletionBackend, CompletionRequest};

/// How a dispatched request ended.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The backend returned non-empty text.
    Success {
        text: String,
        analysis: Option<Analysis>,
    },
    /// The backend answered but offered nothing (missing, empty or
    /// malformed completion).
    Empty,
    /// The token fired before or as the response arrived.
    Cancelled,
    Timeout,
    /// Backend not running.
    ConnectionRefused,
    /// Anything else; already logged.
    Failed(CompletionError),
}

pub struct Dispatcher {
    backend: Arc<dyn CompletionBackend>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn CompletionBackend> {
        &self.backend
    }

    /// Send `request` and classify the result.
    ///
    /// A token that fires while the call is in flight wins immediately and
    /// the call is dropped. The token is checked once more after the
    /// response so a result racing a cancellation is discarded.
    pub async fn dispatch(
        &self,
        request: &CompletionRequest,
        token: &CancellationToken,
    ) -> DispatchOutcome {
        if token.is_cancelled() {
            return DispatchOutcome::Cancelled;
        }
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => {
                trace!("Completion cancelled in flight");
                return DispatchOutcome::Cancelled;
            }
            result = self.backend.complete(request) => result,
        };

        if token.is_cancelled() {
            trace!("Discarding completion that arrived after cancellation");
            return DispatchOutcome::Cancelled;
        }

        match result {
            Ok(response) => match response.first_text() {
                Some(text) => DispatchOutcome::Success {
                    text: text.to_string(),
                    analysis: response.first_analysis().cloned(),
                },
                None => {
                    debug!(backend = self.backend.name(), "Backend returned no completion");
                    DispatchOutcome::Empty
                }
            },
            Err(err) => self.classify(err),
        }
    }

    fn classify(&self, err: CompletionError) -> DispatchOutcome {
        let backend = self.backend.name();
        match err {
            CompletionError::Cancelled => DispatchOutcome::Cancelled,
            // Backend not running; the status indicator covers it.
            CompletionError::ConnectionRefused => DispatchOutcome::ConnectionRefused,
            CompletionError::Timeout => {
                debug!(backend, "Completion request timed out");
                DispatchOutcome::Timeout
            }
            CompletionError::MalformedResponse(detail) => {
                debug!(backend, detail = %detail, "Malformed completion response, treating as empty");
                DispatchOutcome::Empty
            }
            other => {
                warn!(backend, kind = other.kind(), error = %other, "Completion request failed");
                DispatchOutcome::Failed(other)
            }
        }
    }
}
