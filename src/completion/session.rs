//! Per-editor-session completion pipeline.
//!
//! A [`CompletionSession`] is built once when the editor integration starts
//! and shared by `Arc` with every request handler. It owns the cache, the
//! debounce gate and the running config; nothing lives in process globals.
//!
//! Flow per request:
//!
//! ```text
//! trigger -> debounce -> (cancelled) | cache hit -> done
//!                                    | cache miss -> dispatch -> cache -> done
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::{CacheStats, CompletionCache};
use crate::config::Config;
use crate::providers::{Analysis, CompletionBackend, CompletionRequest, HttpBackend, SeverityCounts};
use crate::quick_fix::{self, QuickFixAction};
use crate::status::ServerStatus;

use super::context::{analysis_language, EditorContext};
use super::debounce::{DebounceGate, GateDecision};
use super::dispatcher::{DispatchOutcome, Dispatcher};

/// Capacity of the analysis notification channel. Slow subscribers drop
/// old notices rather than block completion.
const ANALYSIS_CHANNEL_CAPACITY: usize = 16;

/// A suggestion to render at the cursor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineCompletion {
    pub text: String,
    pub line: usize,
    pub column: usize,
}

/// Transient summary shown when analysis accompanies a completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisNotice {
    pub issue_count: usize,
    pub by_severity: SeverityCounts,
    pub complexity: Option<f64>,
}

impl AnalysisNotice {
    fn from_analysis(analysis: &Analysis) -> Self {
        Self {
            issue_count: analysis.issues.len(),
            by_severity: analysis.summary.by_severity,
            complexity: analysis.complexity,
        }
    }

    /// One-line status message.
    pub fn message(&self) -> String {
        let mut msg = format!(
            "{} issue(s): {} critical, {} high, {} medium",
            self.issue_count,
            self.by_severity.critical,
            self.by_severity.high,
            self.by_severity.medium
        );
        if let Some(complexity) = self.complexity {
            msg.push_str(&format!(", complexity {:.1}", complexity));
        }
        msg
    }
}

/// Terminal state of one completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// Inline completion switched off.
    Disabled,
    Cancelled,
    /// Answered from the cache without a backend call.
    CacheHit,
    /// Fresh completion from the backend.
    Completed,
    /// Backend offered nothing.
    Empty,
    Timeout,
    /// Backend not running.
    Offline,
    Failed,
}

/// Result of [`CompletionSession::complete`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    pub outcome: CompletionOutcome,
    pub completion: Option<InlineCompletion>,
    /// Set only for a fresh completion that carried analysis. The same
    /// notice also goes out on [`CompletionSession::subscribe_analysis`].
    pub analysis: Option<AnalysisNotice>,
}

impl CompletionResult {
    fn none(outcome: CompletionOutcome) -> Self {
        Self {
            outcome,
            completion: None,
            analysis: None,
        }
    }
}

pub struct CompletionSession {
    config: RwLock<Config>,
    cache: Mutex<CompletionCache>,
    gate: DebounceGate,
    dispatcher: Dispatcher,
    /// Bumped whenever a config change clears the cache. A response is only
    /// cached if the generation it was requested under is still current.
    generation: AtomicU64,
    status_tx: watch::Sender<ServerStatus>,
    analysis_tx: broadcast::Sender<AnalysisNotice>,
}

impl CompletionSession {
    pub fn new(config: Config, backend: Arc<dyn CompletionBackend>) -> Self {
        let cache = CompletionCache::new(config.cache_ttl(), config.cache.max_entries);
        let gate = DebounceGate::new(config.debounce());
        let initial = if config.enable_inline_completion {
            ServerStatus::Ready
        } else {
            ServerStatus::Disabled
        };
        let (status_tx, _) = watch::channel(initial);
        let (analysis_tx, _) = broadcast::channel(ANALYSIS_CHANNEL_CAPACITY);
        Self {
            config: RwLock::new(config),
            cache: Mutex::new(cache),
            gate,
            dispatcher: Dispatcher::new(backend),
            generation: AtomicU64::new(0),
            status_tx,
            analysis_tx,
        }
    }

    /// Session backed by the HTTP backend at `config.server_url`.
    pub fn with_http(config: Config) -> Self {
        let backend = Arc::new(HttpBackend::from_config(&config));
        Self::new(config, backend)
    }

    pub fn config(&self) -> Config {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn status(&self) -> ServerStatus {
        *self.status_tx.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ServerStatus> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_analysis(&self) -> broadcast::Receiver<AnalysisNotice> {
        self.analysis_tx.subscribe()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).stats()
    }

    /// Swap in a new config. Returns `true` if the cache was cleared.
    pub fn apply_config(&self, new: Config) -> bool {
        // Config is published before the generation moves, so a request that
        // sees the new generation also sees the new config.
        let invalidates = {
            let mut current = self.config.write().unwrap_or_else(|e| e.into_inner());
            let invalidates = current.invalidates_cache(&new);
            *current = new.clone();
            invalidates
        };

        {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if cache.capacity() != new.cache.max_entries.max(1) || cache.ttl() != new.cache_ttl() {
                *cache = CompletionCache::new(new.cache_ttl(), new.cache.max_entries);
            } else if invalidates {
                cache.clear();
            }
            if invalidates {
                self.generation.fetch_add(1, Ordering::SeqCst);
            }
        }
        if invalidates {
            info!(model = %new.model, server_url = %new.server_url, "Completion settings changed, cache cleared");
        }

        self.gate.set_window(new.debounce());
        self.dispatcher.backend().reconfigure(&new);
        self.set_status(if new.enable_inline_completion {
            ServerStatus::Ready
        } else {
            ServerStatus::Disabled
        });
        invalidates
    }

    /// Apply every config sent on `rx` until the sender goes away.
    pub fn spawn_config_listener(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<Config>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(config) = rx.recv().await {
                self.apply_config(config);
            }
            debug!("Config channel closed, listener exiting");
        })
    }

    /// Zero or one suggestion for the cursor in `ctx`.
    pub async fn provide(
        &self,
        ctx: &EditorContext,
        token: CancellationToken,
    ) -> Option<InlineCompletion> {
        self.complete(ctx, token).await.completion
    }

    /// Run one request through the pipeline and report how it ended.
    pub async fn complete(&self, ctx: &EditorContext, token: CancellationToken) -> CompletionResult {
        let generation = self.generation.load(Ordering::SeqCst);
        let config = self.config();
        if !config.enable_inline_completion {
            return CompletionResult::none(CompletionOutcome::Disabled);
        }

        if self.gate.pass(&token).await == GateDecision::Cancelled {
            debug!("Completion cancelled during debounce");
            return CompletionResult::none(CompletionOutcome::Cancelled);
        }

        let prompt = ctx.prompt(config.context_lines);
        if prompt.is_empty() {
            return CompletionResult::none(CompletionOutcome::Empty);
        }

        let cached = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .lookup(&prompt);
        if let Some(text) = cached {
            debug!(prompt_len = prompt.len(), "Completion cache hit");
            return CompletionResult {
                outcome: CompletionOutcome::CacheHit,
                completion: Some(self.inline(ctx, text)),
                analysis: None,
            };
        }

        let request = build_request(&config, ctx, prompt);
        self.set_status(ServerStatus::Generating);
        let outcome = self.dispatcher.dispatch(&request, &token).await;

        match outcome {
            DispatchOutcome::Success { text, analysis } => {
                {
                    let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
                    if self.generation.load(Ordering::SeqCst) == generation {
                        cache.insert(request.prompt, text.clone());
                    } else {
                        debug!("Config changed while in flight, not caching result");
                    }
                }
                self.set_status(ServerStatus::Ready);
                let analysis = analysis.map(|analysis| {
                    let notice = AnalysisNotice::from_analysis(&analysis);
                    debug!(message = %notice.message(), "Analysis received");
                    // No subscribers is fine.
                    let _ = self.analysis_tx.send(notice.clone());
                    notice
                });
                CompletionResult {
                    outcome: CompletionOutcome::Completed,
                    completion: Some(self.inline(ctx, text)),
                    analysis,
                }
            }
            DispatchOutcome::Empty => {
                self.set_status(ServerStatus::Ready);
                CompletionResult::none(CompletionOutcome::Empty)
            }
            DispatchOutcome::Cancelled => {
                self.set_status(ServerStatus::Ready);
                CompletionResult::none(CompletionOutcome::Cancelled)
            }
            DispatchOutcome::Timeout => {
                self.set_status(ServerStatus::Ready);
                CompletionResult::none(CompletionOutcome::Timeout)
            }
            DispatchOutcome::ConnectionRefused => {
                self.set_status(ServerStatus::Offline);
                CompletionResult::none(CompletionOutcome::Offline)
            }
            DispatchOutcome::Failed(_) => {
                self.set_status(ServerStatus::Error);
                CompletionResult::none(CompletionOutcome::Failed)
            }
        }
    }

    /// Quick-fix code actions for the cursor line.
    pub async fn quick_fixes(&self, ctx: &EditorContext) -> Vec<QuickFixAction> {
        quick_fix::request_actions(self.dispatcher.backend().as_ref(), ctx).await
    }

    fn inline(&self, ctx: &EditorContext, text: String) -> InlineCompletion {
        InlineCompletion {
            text,
            line: ctx.line,
            column: ctx.column,
        }
    }

    fn set_status(&self, status: ServerStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

fn build_request(config: &Config, ctx: &EditorContext, prompt: String) -> CompletionRequest {
    let (include_analysis, language) = if config.enable_code_analysis {
        (
            Some(true),
            Some(analysis_language(&config.analysis_language, &ctx.language_id)),
        )
    } else {
        (None, None)
    };
    CompletionRequest {
        model: config.model.clone(),
        prompt,
        max_tokens: config.sampling.max_tokens,
        temperature: config.sampling.temperature,
        stop: config.sampling.stop.clone(),
        include_analysis,
        language,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CompletionError, Result};
    use crate::providers::{
        CompletionResponse, MockCompletionBackend, QuickFixRequest, QuickFixResponse,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Config with no debounce so tests only wait when they opt in.
    fn test_config() -> Config {
        Config {
            debounce_ms: 0,
            model: "m1".into(),
            ..Default::default()
        }
    }

    fn ctx(text: &str) -> EditorContext {
        let lines: Vec<&str> = text.split('\n').collect();
        let line = lines.len() - 1;
        let column = lines[line].chars().count();
        EditorContext::new(text, line, column, "python")
    }

    /// Backend that sleeps, counts calls, then returns fixed text.
    struct FakeBackend {
        delay: Duration,
        text: &'static str,
        calls: AtomicUsize,
    }

    impl FakeBackend {
        fn new(delay: Duration, text: &'static str) -> Arc<Self> {
            Arc::new(Self {
                delay,
                text,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl CompletionBackend for FakeBackend {
        async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(CompletionResponse::with_text(self.text))
        }

        async fn quick_fixes(&self, _request: &QuickFixRequest) -> Result<QuickFixResponse> {
            Ok(QuickFixResponse::default())
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    #[tokio::test]
    async fn test_timeout_then_success_then_cache_hit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut mock = MockCompletionBackend::new();
        mock.expect_name().return_const("mock");
        mock.expect_complete()
            .withf(|req| req.model == "m1" && req.prompt == "def foo():\n    ")
            .times(2)
            .returning(move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(CompletionError::Timeout)
                } else {
                    Ok(CompletionResponse::with_text("    pass"))
                }
            });
        let session = CompletionSession::new(test_config(), Arc::new(mock));
        let ctx = ctx("def foo():\n    ");

        let first = session.complete(&ctx, CancellationToken::new()).await;
        assert_eq!(first.outcome, CompletionOutcome::Timeout);
        assert!(first.completion.is_none());
        assert_eq!(session.cache_stats().total_entries, 0);

        let second = session.complete(&ctx, CancellationToken::new()).await;
        assert_eq!(second.outcome, CompletionOutcome::Completed);
        assert_eq!(second.completion.unwrap().text, "    pass");

        let third = session.complete(&ctx, CancellationToken::new()).await;
        assert_eq!(third.outcome, CompletionOutcome::CacheHit);
        assert_eq!(third.completion.unwrap().text, "    pass");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancel_during_debounce_makes_no_call() {
        let mut mock = MockCompletionBackend::new();
        mock.expect_complete().never();
        let config = Config {
            debounce_ms: 50,
            ..test_config()
        };
        let session = CompletionSession::new(config, Arc::new(mock));

        // Prime the gate so the next trigger lands inside the window.
        let primer = CancellationToken::new();
        primer.cancel();
        let first = session.complete(&ctx("x = "), primer).await;
        assert_eq!(first.outcome, CompletionOutcome::Cancelled);

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        let result = session.complete(&ctx("x = 1"), token).await;
        assert_eq!(result.outcome, CompletionOutcome::Cancelled);
        assert!(result.completion.is_none());
    }

    #[tokio::test]
    async fn test_cancel_in_flight_discards_late_result() {
        let backend = FakeBackend::new(Duration::from_millis(150), "late");
        let session = CompletionSession::new(test_config(), backend.clone());
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });

        let result = session.complete(&ctx("fn main() {"), token).await;
        assert_eq!(result.outcome, CompletionOutcome::Cancelled);
        assert!(result.completion.is_none());
        assert_eq!(backend.calls(), 1, "request was issued before cancel");
        assert_eq!(session.cache_stats().total_entries, 0, "nothing cached");
        assert_eq!(session.status(), ServerStatus::Ready);
    }

    #[tokio::test]
    async fn test_debounce_waits_full_window() {
        let backend = FakeBackend::new(Duration::ZERO, "ok");
        let config = Config {
            debounce_ms: 60,
            ..test_config()
        };
        let session = CompletionSession::new(config, backend.clone());

        session.complete(&ctx("a"), CancellationToken::new()).await;
        let started = std::time::Instant::now();
        let result = session.complete(&ctx("ab"), CancellationToken::new()).await;
        assert!(started.elapsed() >= Duration::from_millis(60));
        assert_eq!(result.outcome, CompletionOutcome::Completed);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_requests_both_dispatch() {
        let backend = FakeBackend::new(Duration::from_millis(30), "ok");
        let session = Arc::new(CompletionSession::new(test_config(), backend.clone()));

        let s1 = Arc::clone(&session);
        let s2 = Arc::clone(&session);
        let (r1, r2) = tokio::join!(
            async move { s1.complete(&ctx("one"), CancellationToken::new()).await },
            async move { s2.complete(&ctx("two"), CancellationToken::new()).await }
        );
        assert_eq!(r1.outcome, CompletionOutcome::Completed);
        assert_eq!(r2.outcome, CompletionOutcome::Completed);
        assert_eq!(backend.calls(), 2);
        assert_eq!(session.cache_stats().total_entries, 2);
    }

    #[tokio::test]
    async fn test_disabled_skips_everything() {
        let mut mock = MockCompletionBackend::new();
        mock.expect_complete().never();
        let config = Config {
            enable_inline_completion: false,
            ..test_config()
        };
        let session = CompletionSession::new(config, Arc::new(mock));
        assert_eq!(session.status(), ServerStatus::Disabled);
        let result = session.complete(&ctx("x"), CancellationToken::new()).await;
        assert_eq!(result.outcome, CompletionOutcome::Disabled);
    }

    #[tokio::test]
    async fn test_connection_refused_sets_offline() {
        let mut mock = MockCompletionBackend::new();
        mock.expect_name().return_const("mock");
        mock.expect_complete()
            .times(1)
            .returning(|_| Err(CompletionError::ConnectionRefused));
        let session = CompletionSession::new(test_config(), Arc::new(mock));
        let mut status = session.subscribe_status();

        let result = session.complete(&ctx("x"), CancellationToken::new()).await;
        assert_eq!(result.outcome, CompletionOutcome::Offline);
        assert!(result.completion.is_none());
        assert_eq!(*status.borrow_and_update(), ServerStatus::Offline);
    }

    #[tokio::test]
    async fn test_unknown_error_sets_error_status() {
        let mut mock = MockCompletionBackend::new();
        mock.expect_name().return_const("mock");
        mock.expect_complete()
            .times(1)
            .returning(|_| Err(CompletionError::Unknown("reset by peer".into())));
        let session = CompletionSession::new(test_config(), Arc::new(mock));
        let result = session.complete(&ctx("x"), CancellationToken::new()).await;
        assert_eq!(result.outcome, CompletionOutcome::Failed);
        assert_eq!(session.status(), ServerStatus::Error);
    }

    #[tokio::test]
    async fn test_analysis_request_and_notice() {
        let mut mock = MockCompletionBackend::new();
        mock.expect_name().return_const("mock");
        mock.expect_complete()
            .withf(|req| req.include_analysis == Some(true) && req.language.as_deref() == Some("python"))
            .times(1)
            .returning(|_| {
                let body = serde_json::json!({
                    "choices": [{
                        "text": "return 1",
                        "analysis": {
                            "issues": [{}, {}],
                            "summary": {"by_severity": {"critical": 0, "high": 1, "medium": 1}},
                            "complexity": 2.0
                        }
                    }]
                });
                Ok(serde_json::from_value(body).unwrap())
            });
        let config = Config {
            enable_code_analysis: true,
            ..test_config()
        };
        let session = CompletionSession::new(config, Arc::new(mock));
        let mut notices = session.subscribe_analysis();

        let result = session
            .complete(&ctx("def f():\n    "), CancellationToken::new())
            .await;
        assert_eq!(result.completion.unwrap().text, "return 1");

        let notice = notices.try_recv().unwrap();
        assert_eq!(result.analysis.as_ref(), Some(&notice));
        assert_eq!(notice.issue_count, 2);
        assert_eq!(notice.by_severity.high, 1);
        assert_eq!(
            notice.message(),
            "2 issue(s): 0 critical, 1 high, 1 medium, complexity 2.0"
        );
    }

    #[tokio::test]
    async fn test_model_change_clears_cache() {
        let backend = FakeBackend::new(Duration::ZERO, "ok");
        let session = CompletionSession::new(test_config(), backend.clone());
        session.complete(&ctx("a"), CancellationToken::new()).await;
        assert_eq!(session.cache_stats().total_entries, 1);

        let unrelated = Config {
            debounce_ms: 0,
            ..session.config()
        };
        assert!(!session.apply_config(unrelated));
        assert_eq!(session.cache_stats().total_entries, 1);

        let new_model = Config {
            model: "m2".into(),
            ..session.config()
        };
        assert!(session.apply_config(new_model));
        assert_eq!(session.cache_stats().total_entries, 0);

        let result = session.complete(&ctx("a"), CancellationToken::new()).await;
        assert_eq!(result.outcome, CompletionOutcome::Completed);
        assert_eq!(backend.calls(), 2);
    }

    /// Backend that answers with the model it was asked for, after a delay.
    struct ModelEchoBackend {
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl CompletionBackend for ModelEchoBackend {
        async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
            tokio::time::sleep(self.delay).await;
            Ok(CompletionResponse::with_text(&format!("from {}", request.model)))
        }

        async fn quick_fixes(&self, _request: &QuickFixRequest) -> Result<QuickFixResponse> {
            Ok(QuickFixResponse::default())
        }

        fn name(&self) -> &'static str {
            "echo"
        }
    }

    #[tokio::test]
    async fn test_model_switch_mid_flight_not_cached() {
        let backend = Arc::new(ModelEchoBackend {
            delay: Duration::from_millis(100),
        });
        let session = Arc::new(CompletionSession::new(test_config(), backend));

        let in_flight = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.complete(&ctx("a"), CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(session.apply_config(Config {
            model: "m2".into(),
            ..session.config()
        }));

        let first = in_flight.await.unwrap();
        assert_eq!(first.outcome, CompletionOutcome::Completed);
        assert_eq!(first.completion.unwrap().text, "from m1");
        assert_eq!(session.cache_stats().total_entries, 0);

        let second = session.complete(&ctx("a"), CancellationToken::new()).await;
        assert_eq!(second.outcome, CompletionOutcome::Completed);
        assert_eq!(second.completion.unwrap().text, "from m2");

        let third = session.complete(&ctx("a"), CancellationToken::new()).await;
        assert_eq!(third.outcome, CompletionOutcome::CacheHit);
        assert_eq!(third.completion.unwrap().text, "from m2");
    }

    #[tokio::test]
    async fn test_config_listener_applies_updates() {
        let backend = FakeBackend::new(Duration::ZERO, "ok");
        let session = Arc::new(CompletionSession::new(test_config(), backend));
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Arc::clone(&session).spawn_config_listener(rx);

        tx.send(Config {
            enable_inline_completion: false,
            ..test_config()
        })
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert!(!session.config().enable_inline_completion);
        assert_eq!(session.status(), ServerStatus::Disabled);
    }

    #[tokio::test]
    async fn test_prompt_respects_context_lines() {
        let mut mock = MockCompletionBackend::new();
        mock.expect_name().return_const("mock");
        mock.expect_complete()
            .withf(|req| req.prompt == "c\nd")
            .times(1)
            .returning(|_| Ok(CompletionResponse::default()));
        let config = Config {
            context_lines: 2,
            ..test_config()
        };
        let session = CompletionSession::new(config, Arc::new(mock));
        let result = session.complete(&ctx("a\nb\nc\nd"), CancellationToken::new()).await;
        assert_eq!(result.outcome, CompletionOutcome::Empty);
    }
}
