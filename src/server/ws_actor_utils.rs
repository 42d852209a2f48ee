use actix::ActorContext;
use actix_web_actors::ws;
use log::{error, warn};

use crate::protocol::{ProtocolViolation, ShareData};
use crate::server::messages::ConnectionId;

/// Helpers shared by relay WebSocket actors.
pub trait WsActorUtils {
    fn connection_id(&self) -> ConnectionId;

    /// Protocol violation: close the socket and stop the actor. Nothing is sent back besides the
    /// close frame.
    fn close_for_violation<A>(&mut self, ctx: &mut ws::WebsocketContext<A>, violation: &ProtocolViolation)
    where
        A: actix::Actor<Context = ws::WebsocketContext<A>>,
    {
        warn!("[Connection] {} closed for protocol violation: {}", self.connection_id(), violation);
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Policy,
            description: None,
        }));
        ctx.stop();
    }

    /// Writes one share record to the socket.
    fn send_share<A>(&mut self, ctx: &mut ws::WebsocketContext<A>, data: &ShareData)
    where
        A: actix::Actor<Context = ws::WebsocketContext<A>>,
    {
        match serde_json::to_string(data) {
            Ok(text) => ctx.text(text),
            Err(e) => error!("[Connection] {} failed to serialize heartbeat: {}", self.connection_id(), e),
        }
    }
}
