//! Command-line interface.

mod complete;
mod health;
mod stdio;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use lmcomplete::Config;

pub(crate) use complete::{cmd_complete, cmd_quick_fixes};
pub(crate) use health::cmd_health;
pub(crate) use stdio::cmd_stdio;

#[derive(Parser)]
#[command(name = "lmcomplete")]
#[command(version)]
#[command(about = "Inline completions from a local AI backend", long_about = None)]
pub(crate) struct Cli {
    /// Config file (default: ~/.lmcomplete/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Request one inline completion at a cursor position
    Complete {
        /// Source file to complete in
        #[arg(long)]
        file: PathBuf,
        /// 0-based cursor line
        #[arg(long)]
        line: usize,
        /// 0-based cursor column
        #[arg(long)]
        column: usize,
        /// Editor language id (defaults to one derived from the extension)
        #[arg(long)]
        language: Option<String>,
    },
    /// List auto-fixable quick fixes for a line
    QuickFixes {
        #[arg(long)]
        file: PathBuf,
        /// 0-based line
        #[arg(long)]
        line: usize,
        #[arg(long)]
        language: Option<String>,
    },
    /// Serve completions for JSON edit events read from stdin
    Stdio,
    /// Check whether the completion server is up
    Health,
    /// Print the effective configuration
    Config,
}

/// Load config from `path` (or the default location) with env overrides.
pub(crate) fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_at(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Config::load().context("Failed to load config"),
    }
}

pub(crate) fn cmd_config(config: &Config) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

/// Guess an editor language id from a file extension.
pub(crate) fn language_from_path(path: &std::path::Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "py" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "java" => "java",
        "cc" | "cpp" | "cxx" | "hpp" => "cpp",
        "c" | "h" => "c",
        "rs" => "rust",
        _ => "plaintext",
    }
    .to_string()
}
