//! One-shot completion and quick-fix commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use lmcomplete::{CompletionSession, Config, EditorContext};

use super::language_from_path;

fn editor_context(
    file: &Path,
    line: usize,
    column: usize,
    language: Option<String>,
) -> Result<EditorContext> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let language = language.unwrap_or_else(|| language_from_path(file));
    Ok(EditorContext::new(text, line, column, &language))
}

/// Run one completion; Ctrl-C cancels it.
pub(crate) async fn cmd_complete(
    config: Config,
    file: &Path,
    line: usize,
    column: usize,
    language: Option<String>,
) -> Result<()> {
    let ctx = editor_context(file, line, column, language)?;
    let session = Arc::new(CompletionSession::with_http(config));

    let token = CancellationToken::new();
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let result = session.complete(&ctx, token).await;
    info!(outcome = ?result.outcome, status = %session.status(), "Completion finished");
    if let Some(item) = result.completion {
        println!("{}", item.text);
    }
    if let Some(notice) = result.analysis {
        eprintln!("{}", notice.message());
    }
    Ok(())
}

pub(crate) async fn cmd_quick_fixes(
    config: Config,
    file: &Path,
    line: usize,
    language: Option<String>,
) -> Result<()> {
    let ctx = editor_context(file, line, 0, language)?;
    let session = CompletionSession::with_http(config);
    let actions = session.quick_fixes(&ctx).await;
    if actions.is_empty() {
        println!("No quick fixes.");
        return Ok(());
    }
    for action in actions {
        let marker = if action.is_preferred { "*" } else { " " };
        println!("{} {}", marker, action.title);
        if !action.fix.explanation.is_empty() {
            println!("    {}", action.fix.explanation);
        }
    }
    Ok(())
}
