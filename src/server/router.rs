//! HTTP and WebSocket routing configuration.
//!
//! Clients connect to the bare host (`ws://host:port`), so the share socket lives at the root.
//! `/ws` is accepted as an alias for reverse proxies that route by path.

use actix_web::web;
use crate::server::connection::ws_share;

/// Configure the relay's routes.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").to(ws_share))
        .service(web::resource("/ws").to(ws_share));
}
