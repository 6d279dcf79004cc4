//! Environment configuration
//!
//! One struct, read once in the composition root and passed down by
//! value. Recognised variables: `CLAUDE_STUDIO_API` (base URL companion
//! processes call back into), `USE_MOCK_AI` (deterministic LLM responses
//! and auto-approved human gates), `MCP_STABLE_MODE` (stable vs dev
//! profile), plus `HOST`/`PORT` for the server binary.

use serde::{Deserialize, Serialize};

/// Runtime configuration for the studio server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudioConfig {
    /// API base URL handed to spawned agent processes
    pub api_url: String,
    /// Mock mode: deterministic agent responses, auto-approving gates
    pub use_mock_ai: bool,
    /// Stable configuration profile for MCP integrations
    pub stable_mode: bool,
    pub host: String,
    pub port: u16,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:3456".to_string(),
            use_mock_ai: false,
            stable_mode: false,
            host: "127.0.0.1".to_string(),
            port: 3456,
        }
    }
}

fn truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl StudioConfig {
    /// Read configuration from the environment, with defaults everywhere
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let host = std::env::var("HOST").unwrap_or(defaults.host);
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        Self {
            api_url: std::env::var("CLAUDE_STUDIO_API")
                .unwrap_or_else(|_| format!("http://{host}:{port}")),
            use_mock_ai: std::env::var("USE_MOCK_AI").map(|v| truthy(&v)).unwrap_or(false),
            stable_mode: std::env::var("MCP_STABLE_MODE").map(|v| truthy(&v)).unwrap_or(false),
            host,
            port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthy_values() {
        assert!(truthy("1"));
        assert!(truthy("true"));
        assert!(truthy("YES"));
        assert!(truthy(" on "));
        assert!(!truthy("0"));
        assert!(!truthy("false"));
        assert!(!truthy(""));
    }

    #[test]
    fn test_defaults() {
        let config = StudioConfig::default();
        assert!(!config.use_mock_ai);
        assert_eq!(config.port, 3456);
    }
}
