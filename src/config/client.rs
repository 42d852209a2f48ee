/// Client configuration.
///
/// Constants for the share client's cadences, plus the small persisted configuration
/// (relay host, TLS flag, reconnect timeouts).
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Interval (in milliseconds) between local observation ticks.
pub const TICK_INTERVAL_MS: u64 = 1000;

/// An unchanged snapshot is re-sent after this many seconds (keep-alive / resync).
pub const RESEND_INTERVAL_SECS: u64 = 30;

/// Default for each of the reconnect timeouts.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Relay host used when nothing is configured.
pub const DEFAULT_SERVER: &str = "maps.caraxi.dev";

/// Default silence (in seconds) before an established connection counts as stale. Kept above the
/// relay's 10 s heartbeat period so a periodic heartbeat never races the stale timer.
pub const DEFAULT_STALE_TIMEOUT_SECS: u64 = 15;

/// Minimum interval (in milliseconds) between two live reads of the local map state.
pub const MAP_READ_THROTTLE_MS: u64 = 1000;

/// Persisted client settings. Missing fields fall back to their defaults.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    pub version: u32,
    /// Connect with `wss://` instead of `ws://`.
    pub use_ssl: bool,
    /// Relay host, optionally with `:port` and path.
    pub server: String,
    pub connect_on_startup: bool,
    /// Give up on a connection attempt after this long.
    pub reconnect_timeout_secs: u64,
    /// Wait this long before retrying after a failed connection attempt.
    pub error_reconnect_timeout_secs: u64,
    /// Wait this long before reconnecting after an established connection is lost.
    pub lost_reconnect_timeout_secs: u64,
    /// Drop and reconnect when nothing arrives from the relay for this long.
    pub stale_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: 1,
            use_ssl: true,
            server: DEFAULT_SERVER.to_string(),
            connect_on_startup: true,
            reconnect_timeout_secs: DEFAULT_TIMEOUT_SECS,
            error_reconnect_timeout_secs: DEFAULT_TIMEOUT_SECS,
            lost_reconnect_timeout_secs: DEFAULT_TIMEOUT_SECS,
            stale_timeout_secs: DEFAULT_STALE_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Plaintext config pointing at `server`.
    pub fn insecure(server: impl Into<String>) -> Self {
        Self {
            use_ssl: false,
            server: server.into(),
            ..Self::default()
        }
    }

    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "wss" } else { "ws" };
        format!("{}://{}", scheme, self.server)
    }

    pub fn reconnect_timeout(&self) -> Duration {
        Duration::from_secs(self.reconnect_timeout_secs)
    }

    /// Silence after which an established connection is dropped and re-established.
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_timeout_secs)
    }

    pub fn error_reconnect_timeout(&self) -> Duration {
        Duration::from_secs(self.error_reconnect_timeout_secs)
    }

    pub fn lost_reconnect_timeout(&self) -> Duration {
        Duration::from_secs(self.lost_reconnect_timeout_secs)
    }
}
