//! lmcomplete binary.

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = cli::load_config(cli.config.as_ref())?;
    match cli.command {
        Commands::Complete {
            file,
            line,
            column,
            language,
        } => cli::cmd_complete(config, &file, line, column, language).await,
        Commands::QuickFixes {
            file,
            line,
            language,
        } => cli::cmd_quick_fixes(config, &file, line, language).await,
        Commands::Stdio => {
            let path = cli.config.clone().unwrap_or_else(lmcomplete::Config::path);
            cli::cmd_stdio(config, path).await
        }
        Commands::Health => cli::cmd_health(&config).await,
        Commands::Config => cli::cmd_config(&config),
    }
}
