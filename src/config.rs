use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::verify::VerifyPolicy;

/// Transport settings shared by [`crate::ExchangeServer`] and
/// [`crate::RemoteChecksums`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Listen address for the server, peer address for the client.
    pub addr: String,
    /// Connect, read and write timeout in milliseconds.
    pub timeout_ms: u64,
    /// Checksum payloads above this many bytes are zstd compressed.
    pub compress_threshold: usize,
    pub zstd_level: i32,
    /// Largest payload accepted from, or sent to, the wire.
    pub max_frame_len: u32,
    /// Concurrent connections served by `ExchangeServer::serve`.
    pub max_connections: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:10000".to_string(),
            timeout_ms: 5_000,
            compress_threshold: 4096,
            zstd_level: 3,
            max_frame_len: 16 * 1024 * 1024,
            max_connections: 64,
        }
    }
}

impl ExchangeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub policy: VerifyPolicy,
}

impl Config {
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
        Self::from_json_str(&text)
    }
}
