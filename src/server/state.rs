// src/server/state.rs

//! Application state for the relay server.
//!
//! Holds the address of the registry actor so WebSocket handlers can hand it to each new
//! connection actor.

use actix::Addr;
use crate::server::registry::RelayRegistry;

/// Shared application state, injected into HTTP/WebSocket handlers.
pub struct AppState {
    /// Address of the connection registry actor.
    pub registry_addr: Addr<RelayRegistry>,
}

impl AppState {
    pub fn new(registry_addr: Addr<RelayRegistry>) -> Self {
        AppState { registry_addr }
    }
}
