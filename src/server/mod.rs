// src/server/mod.rs

//! Relay server root module.
//!
//! - Application state and routing
//! - `connection`: one actor per socket (validation, timers)
//! - `registry`: the single owner of all connection bookkeeping (heartbeats, mutual peers, sweep)

pub mod state;
pub mod router;
pub mod messages;
pub mod registry;
pub mod connection;
pub mod ws_actor_utils;

use actix::{Actor, Addr};
use actix_web::{web, App, HttpServer};
use actix_web::dev::Server;
use std::net::{SocketAddr, ToSocketAddrs};

use registry::RelayRegistry;

/// Starts the registry actor and an HTTP server bound to `addr`.
///
/// Returns the server future (to be awaited or spawned), the bound addresses and the registry
/// address. Must be called from inside an actix system.
pub fn start_relay(addr: impl ToSocketAddrs) -> std::io::Result<(Server, Vec<SocketAddr>, Addr<RelayRegistry>)> {
    let registry = RelayRegistry::new().start();
    let state = web::Data::new(state::AppState::new(registry.clone()));

    let http = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(router::config)
    })
    .bind(addr)?;
    let addrs = http.addrs();
    Ok((http.run(), addrs, registry))
}
