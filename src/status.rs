//! Passive server status indicator.
//!
//! The editor shows this in its status bar instead of popping dialogs; a
//! backend that isn't running only ever shows up here.

use serde::Serialize;

/// What the status bar currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Ready,
    /// A completion request is in flight.
    Generating,
    /// Nothing is listening at the configured server URL.
    Offline,
    /// The last request failed for some other reason.
    Error,
    /// Inline completion is switched off in config.
    Disabled,
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Ready => "Ready",
            ServerStatus::Generating => "Generating...",
            ServerStatus::Offline => "Offline",
            ServerStatus::Error => "Error",
            ServerStatus::Disabled => "Disabled",
        }
    }

    /// Status bar text.
    pub fn label(&self) -> String {
        format!("lmcomplete: {}", self.as_str())
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(ServerStatus::Ready.label(), "lmcomplete: Ready");
        assert_eq!(ServerStatus::Generating.label(), "lmcomplete: Generating...");
        assert_eq!(ServerStatus::Offline.to_string(), "Offline");
    }

    #[test]
    fn test_serialize_snake_case() {
        let json = serde_json::to_string(&ServerStatus::Offline).unwrap();
        assert_eq!(json, r#""offline""#);
    }
}
