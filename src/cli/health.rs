//! Server health command.

use anyhow::Result;

use lmcomplete::providers::HttpBackend;
use lmcomplete::status::ServerStatus;
use lmcomplete::{CompletionError, Config};

pub(crate) async fn cmd_health(config: &Config) -> Result<()> {
    let backend = HttpBackend::from_config(config);
    let status = match backend.health().await {
        Ok(()) => ServerStatus::Ready,
        Err(CompletionError::ConnectionRefused) => ServerStatus::Offline,
        Err(e) => {
            eprintln!("Health check failed: {}", e);
            ServerStatus::Error
        }
    };
    println!("{} ({})", status.label(), backend.base_url());
    if status != ServerStatus::Ready {
        anyhow::bail!("completion server at {} is not ready", backend.base_url());
    }
    Ok(())
}
