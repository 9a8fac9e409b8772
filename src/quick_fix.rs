//! Quick-fix suggestions for the editor's code-action menu.
//!
//! Like completion, this never fails loudly: any error is logged and the
//! editor simply shows no actions.

use tracing::debug;

use crate::completion::context::{backend_language, EditorContext};
use crate::providers::{CompletionBackend, QuickFix, QuickFixRequest};

/// Languages the backend offers fixes for.
const SUPPORTED_LANGUAGES: &[&str] = &["python", "javascript", "typescript"];

/// A fix ready to be shown as a code action.
#[derive(Debug, Clone, PartialEq)]
pub struct QuickFixAction {
    /// Menu title.
    pub title: String,
    /// 0-based line the fix applies to.
    pub line: usize,
    pub fix: QuickFix,
    /// Syntax and style fixes are offered as the preferred action.
    pub is_preferred: bool,
}

impl QuickFixAction {
    fn from_fix(fix: QuickFix, line: usize) -> Self {
        let is_preferred = matches!(fix.category.as_str(), "syntax" | "style");
        Self {
            title: format!("🔧 {}", fix.title),
            line,
            fix,
            is_preferred,
        }
    }
}

/// Ask the backend for fixes to the cursor line.
///
/// Returns nothing for unsupported languages and blank lines without
/// contacting the backend. Only auto-fixable suggestions are kept.
pub async fn request_actions(
    backend: &dyn CompletionBackend,
    ctx: &EditorContext,
) -> Vec<QuickFixAction> {
    if !SUPPORTED_LANGUAGES.contains(&ctx.language_id.as_str()) {
        return Vec::new();
    }
    let line_text = ctx.current_line();
    if line_text.is_empty() {
        return Vec::new();
    }

    let request = QuickFixRequest {
        prompt: line_text.to_string(),
        language: backend_language(&ctx.language_id).to_string(),
    };
    match backend.quick_fixes(&request).await {
        Ok(response) => response
            .fixes
            .into_iter()
            .filter(|f| f.auto_fixable)
            .map(|f| QuickFixAction::from_fix(f, ctx.line))
            .collect(),
        Err(e) => {
            debug!(kind = e.kind(), error = %e, "Quick-fix request failed");
            Vec::new()
        }
    }
}
