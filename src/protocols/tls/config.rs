//! # TLS Parser Configuration
//!
//! Loaded from JSON by the embedding process and handed to
//! [`TlsParser::with_config`](super::TlsParser::with_config). Every field
//! is optional in the file; missing fields take their defaults.
//!
//! ```json
//! {
//!   "enabled": true,
//!   "ports": [443, 8443],
//!   "no_reassemble": true,
//!   "max_certificate_buffer": 262144,
//!   "session_timeout": 300.0
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Default upper bound for the certificate reassembly buffer.
pub const DEFAULT_MAX_CERTIFICATE_BUFFER: usize = 256 * 1024;

/// Default idle timeout for TLS sessions, in seconds.
pub const DEFAULT_SESSION_TIMEOUT: f64 = 300.0;

/// TLS parser configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Whether TLS inspection is enabled at all.
    pub enabled: bool,
    /// Well-known TLS ports used by callers to select flows for probing.
    pub ports: Vec<u16>,
    /// Also stop stream reassembly once the session turns encrypted.
    pub no_reassemble: bool,
    /// Hard cap on the certificate reassembly buffer, in bytes.
    pub max_certificate_buffer: usize,
    /// Idle timeout for session state, in seconds.
    pub session_timeout: f64,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ports: vec![443, 465, 636, 993, 995, 8443],
            no_reassemble: true,
            max_certificate_buffer: DEFAULT_MAX_CERTIFICATE_BUFFER,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }
}

impl TlsConfig {
    /// Parse a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path, e)))?;

        serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path, e)))
    }

    /// True if `port` is one of the configured TLS ports.
    pub fn is_tls_port(&self, port: u16) -> bool {
        self.ports.contains(&port)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while loading a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
