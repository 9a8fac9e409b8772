//! Long-running editor bridge over stdin/stdout.
//!
//! Reads one JSON edit event per line and writes one JSON result per
//! completed request. A new event cancels the request still running for the
//! previous one, the way an editor cancels when the user keeps typing.
//! At end of input, outstanding requests finish and are answered before
//! exit. The config file is watched and reloads clear the cache when needed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lmcomplete::completion::{AnalysisNotice, CompletionOutcome, InlineCompletion};
use lmcomplete::config::ConfigWatcher;
use lmcomplete::{CompletionSession, Config, EditorContext};

const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditEvent {
    #[serde(default)]
    id: u64,
    text: String,
    line: usize,
    column: usize,
    #[serde(default)]
    language_id: String,
}

#[derive(Debug, Serialize)]
struct EventReply {
    id: u64,
    outcome: CompletionOutcome,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    completion: Option<InlineCompletion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<AnalysisNotice>,
}

pub(crate) async fn cmd_stdio(config: Config, config_path: PathBuf) -> Result<()> {
    let session = Arc::new(CompletionSession::with_http(config.clone()));

    let (config_tx, config_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watcher = ConfigWatcher::new(config_path, CONFIG_POLL_INTERVAL, config);
    let watcher_handle = tokio::spawn(watcher.watch(config_tx, shutdown_rx));
    let listener_handle = Arc::clone(&session).spawn_config_listener(config_rx);

    info!("Reading edit events from stdin");
    let served = serve(
        session,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await;

    let _ = shutdown_tx.send(true);
    let _ = watcher_handle.await;
    listener_handle.abort();
    served.map(|_| ())
}

/// Answer edit events from `input` on `output` until `input` ends.
///
/// Returns `output` once every request has replied.
async fn serve<R, W>(session: Arc<CompletionSession>, input: R, output: W) -> Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<EventReply>();
    let writer = tokio::spawn(async move {
        let mut output = output;
        while let Some(reply) = reply_rx.recv().await {
            let Ok(mut line) = serde_json::to_string(&reply) else {
                continue;
            };
            line.push('\n');
            if output.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = output.flush().await;
        }
        output
    });

    let mut lines = input.lines();
    let mut tasks = JoinSet::new();
    let mut in_flight: Option<CancellationToken> = None;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let event: EditEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed edit event");
                continue;
            }
        };

        if let Some(previous) = in_flight.take() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        in_flight = Some(token.clone());

        let session = Arc::clone(&session);
        let reply_tx = reply_tx.clone();
        tasks.spawn(async move {
            let ctx = EditorContext::new(event.text, event.line, event.column, &event.language_id);
            let result = session.complete(&ctx, token).await;
            debug!(id = event.id, outcome = ?result.outcome, "Edit event handled");
            let _ = reply_tx.send(EventReply {
                id: event.id,
                outcome: result.outcome,
                status: session.status().label(),
                completion: result.completion,
                analysis: result.analysis,
            });
        });
        while tasks.try_join_next().is_some() {}
    }

    debug!(pending = tasks.len(), "Input closed, waiting for outstanding requests");
    while tasks.join_next().await.is_some() {}
    drop(reply_tx);
    Ok(writer.await?)
}
