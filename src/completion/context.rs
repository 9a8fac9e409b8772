//! Prompt extraction from the editor buffer.

/// Snapshot of the editor at the moment completion was triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorContext {
    /// Full document text.
    pub text: String,
    /// Zero-based cursor line.
    pub line: usize,
    /// Zero-based cursor column, in chars.
    pub column: usize,
    /// Editor language id (`python`, `rust`, ...).
    pub language_id: String,
}

impl EditorContext {
    pub fn new(text: impl Into<String>, line: usize, column: usize, language_id: &str) -> Self {
        Self {
            text: text.into(),
            line,
            column,
            language_id: language_id.to_string(),
        }
    }

    /// Text preceding the cursor, limited to the last `context_lines` lines.
    ///
    /// The cursor line counts as one of them and is cut at the cursor
    /// column. A cursor past the end of the buffer clamps to the end.
    pub fn prompt(&self, context_lines: usize) -> String {
        if context_lines == 0 {
            return String::new();
        }
        let lines: Vec<&str> = self.text.split('\n').collect();
        let cursor_line = self.line.min(lines.len().saturating_sub(1));
        let first = (cursor_line + 1).saturating_sub(context_lines);

        let mut out = String::new();
        for line in &lines[first..cursor_line] {
            out.push_str(line);
            out.push('\n');
        }
        let current = lines.get(cursor_line).copied().unwrap_or_default();
        let column = if self.line > cursor_line {
            current.chars().count()
        } else {
            self.column
        };
        out.extend(current.chars().take(column));
        out
    }

    /// The trimmed text of the cursor line.
    pub fn current_line(&self) -> &str {
        self.text.split('\n').nth(self.line).unwrap_or_default().trim()
    }
}

/// Map an editor language id onto a language the backend analyzes.
pub fn backend_language(language_id: &str) -> &'static str {
    match language_id {
        "python" => "python",
        "javascript" => "javascript",
        "typescript" => "typescript",
        "java" => "java",
        "cpp" => "cpp",
        "c" => "c",
        _ => "generic",
    }
}

/// Pick the analysis language: an explicit setting wins over the editor id.
pub fn analysis_language(configured: &str, language_id: &str) -> String {
    let configured = configured.trim();
    if configured.is_empty() {
        backend_language(language_id).to_string()
    } else {
        configured.to_string()
    }
}
