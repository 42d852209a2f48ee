/// Relay configuration constants.
///
/// This module defines the relay's listening port and its timer cadences
/// (heartbeat, forced refresh, registry sweep).
pub const RELAY_PORT: u16 = 44333; // Fixed port clients connect to.

/// Interval (in seconds) between periodic heartbeats pushed to each connection.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 10;

/// Delay (in milliseconds) before a forced heartbeat fires. Bursts of updates inside this window
/// collapse into a single push.
pub const FORCED_REFRESH_DELAY_MS: u64 = 1000;

/// Interval (in seconds) between sweeps that drop closed connections from the registry.
pub const SWEEP_INTERVAL_SECS: u64 = 30;

/// Environment variable overriding the bind address.
pub const BIND_ENV: &str = "RELAY_BIND";

/// Address the relay listens on: `RELAY_BIND` if set, otherwise all interfaces on [`RELAY_PORT`].
pub fn bind_address() -> String {
    std::env::var(BIND_ENV).unwrap_or_else(|_| format!("0.0.0.0:{}", RELAY_PORT))
}
