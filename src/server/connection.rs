/// WebSocket connection actor for the relay.
///
/// One actor per accepted socket. It validates inbound records, forwards them to the registry,
/// and owns the connection's two timers: the periodic heartbeat and the one-shot forced refresh.
/// Each timer is a single `SpawnHandle` that is cancelled and replaced, never mutated.
use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use log::{debug, info, warn};
use std::time::Duration;
use uuid::Uuid;

use super::messages::{Connect, ConnectionId, Disconnect, ForceHeartbeat, Heartbeat, Publish, RequestHeartbeat};
use super::registry::RelayRegistry;
use super::ws_actor_utils::WsActorUtils;
use crate::config::relay::{FORCED_REFRESH_DELAY_MS, HEARTBEAT_INTERVAL_SECS};
use crate::protocol::{parse_share, ProtocolViolation};

/// Lifecycle of a relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Accepted, no id advertised.
    Connected,
    /// Advertised a non-empty id.
    Identified,
    Closed,
}

pub struct ConnectionActor {
    pub id: ConnectionId,
    pub registry: Addr<RelayRegistry>,
    phase: ConnectionPhase,
    /// Periodic heartbeat timer.
    heartbeat: Option<SpawnHandle>,
    /// Pending forced refresh.
    refresh: Option<SpawnHandle>,
}

impl ConnectionActor {
    pub fn new(registry: Addr<RelayRegistry>) -> Self {
        Self {
            id: Uuid::new_v4(),
            registry,
            phase: ConnectionPhase::Connected,
            heartbeat: None,
            refresh: None,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    fn request_heartbeat(&self) {
        if self.phase != ConnectionPhase::Closed {
            self.registry.do_send(RequestHeartbeat { id: self.id });
        }
    }

    fn cancel_timers(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        if let Some(handle) = self.heartbeat.take() {
            ctx.cancel_future(handle);
        }
        if let Some(handle) = self.refresh.take() {
            ctx.cancel_future(handle);
        }
    }

    /// (Re)starts the periodic heartbeat, first tick one interval from now.
    fn schedule_periodic(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        if let Some(handle) = self.heartbeat.take() {
            ctx.cancel_future(handle);
        }
        let handle = ctx.run_interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS), |act, _ctx| {
            act.request_heartbeat();
        });
        self.heartbeat = Some(handle);
    }

    /// Replaces both timers with a single refresh shortly from now; the periodic cadence resumes
    /// after it fires. Repeated calls inside the delay collapse into one push.
    fn force_heartbeat(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        if self.phase == ConnectionPhase::Closed {
            return;
        }
        self.cancel_timers(ctx);
        let handle = ctx.run_later(Duration::from_millis(FORCED_REFRESH_DELAY_MS), |act, ctx| {
            act.refresh = None;
            act.request_heartbeat();
            act.schedule_periodic(ctx);
        });
        self.refresh = Some(handle);
    }

    fn handle_frame(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let data = match parse_share(text) {
            Ok(data) => data,
            Err(violation) => {
                self.close_for_violation(ctx, &violation);
                return;
            }
        };

        if data.user.is_empty() {
            self.phase = ConnectionPhase::Connected;
            self.registry.do_send(Publish { id: self.id, data });
            return;
        }

        if self.phase == ConnectionPhase::Connected {
            debug!("[Connection] {} identified", self.id);
        }
        self.phase = ConnectionPhase::Identified;
        self.registry.do_send(Publish { id: self.id, data });
        self.force_heartbeat(ctx);
    }
}

impl WsActorUtils for ConnectionActor {
    fn connection_id(&self) -> ConnectionId {
        self.id
    }
}

impl Actor for ConnectionActor {
    type Context = ws::WebsocketContext<Self>;

    /// Registers with the registry, pushes a first heartbeat and starts the periodic one.
    fn started(&mut self, ctx: &mut Self::Context) {
        info!("[Connection] {} opened", self.id);
        self.registry.do_send(Connect {
            id: self.id,
            addr: ctx.address(),
        });
        self.request_heartbeat();
        self.schedule_periodic(ctx);
    }

    /// Marks the connection closed in the registry; it is purged on the next sweep.
    fn stopped(&mut self, ctx: &mut Self::Context) {
        self.cancel_timers(ctx);
        self.phase = ConnectionPhase::Closed;
        self.registry.do_send(Disconnect { id: self.id });
        info!("[Connection] {} disconnected", self.id);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ConnectionActor {
    /// Handles incoming WebSocket frames from the client.
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => self.handle_frame(&text, ctx),
            Ok(ws::Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => self.handle_frame(text, ctx),
                Err(e) => self.close_for_violation(ctx, &ProtocolViolation::Malformed(e.to_string())),
            },
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => (),
            Err(e) => {
                warn!("[Connection] {} transport error: {}", self.id, e);
                ctx.stop();
            }
        }
    }
}

impl Handler<ForceHeartbeat> for ConnectionActor {
    type Result = ();

    fn handle(&mut self, _msg: ForceHeartbeat, ctx: &mut Self::Context) -> Self::Result {
        self.force_heartbeat(ctx);
    }
}

impl Handler<Heartbeat> for ConnectionActor {
    type Result = ();

    /// Writes the registry's computed record to the socket.
    fn handle(&mut self, msg: Heartbeat, ctx: &mut Self::Context) -> Self::Result {
        if self.phase == ConnectionPhase::Closed {
            return;
        }
        self.send_share(ctx, &msg.0);
    }
}

/// WebSocket endpoint for share clients. No handshake parameters; identity arrives in-band.
pub async fn ws_share(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<crate::server::state::AppState>,
) -> Result<HttpResponse, Error> {
    ws::start(ConnectionActor::new(data.registry_addr.clone()), &req, stream)
}
