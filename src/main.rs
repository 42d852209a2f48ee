//! Main entry point for the relay server.
//!
//! Initializes logging, starts the connection registry actor and launches the HTTP server
//! with the share WebSocket endpoint.

use log::info;
use party_map_relay::config::relay::bind_address;
use party_map_relay::server::start_relay;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger from environment variable (default to info level).
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let addr = bind_address();
    let (server, addrs, _registry) = start_relay(addr.as_str())?;
    info!("[Relay] Listening on {:?}", addrs);
    server.await
}
