//! Actor messages exchanged between connection actors and the registry.

use actix::prelude::*;
use uuid::Uuid;

use super::connection::ConnectionActor;
use crate::protocol::ShareData;

/// Identifies one socket for its whole lifetime.
pub type ConnectionId = Uuid;

// Connection -> registry

/// A socket was accepted.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect {
    pub id: ConnectionId,
    pub addr: Addr<ConnectionActor>,
}

/// The socket closed (peer close, transport error, or protocol violation).
#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub id: ConnectionId,
}

/// A validated inbound record.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Publish {
    pub id: ConnectionId,
    pub data: ShareData,
}

/// A heartbeat timer fired; the registry answers with [`Heartbeat`].
#[derive(Message)]
#[rtype(result = "()")]
pub struct RequestHeartbeat {
    pub id: ConnectionId,
}

// Registry -> connection

/// A mutually linked peer changed; refresh soon.
#[derive(Message)]
#[rtype(result = "()")]
pub struct ForceHeartbeat;

/// The record to write to the socket.
#[derive(Message, Clone, Debug)]
#[rtype(result = "()")]
pub struct Heartbeat(pub ShareData);
