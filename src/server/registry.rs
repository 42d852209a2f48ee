//! Connection registry actor.
//!
//! Owns the bookkeeping for every relay connection. All reads and writes go through this actor's
//! mailbox, so each handler sees a consistent view of every other connection without locks.
//! Closed connections stay in the table until the next sweep; every scan skips them.

use actix::prelude::*;
use log::{debug, info};
use std::collections::HashMap;
use std::time::Duration;

use super::connection::ConnectionActor;
use super::messages::{Connect, ConnectionId, Disconnect, ForceHeartbeat, Heartbeat, Publish, RequestHeartbeat};
use crate::config::relay::SWEEP_INTERVAL_SECS;
use crate::protocol::{MapIdentifier, PseudonymousId, ShareData, MAX_PARTY_SIZE};

/// What the relay knows about one connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRecord {
    /// Creation order; the oldest matching connection wins lookups.
    seq: u64,
    pub own_id: PseudonymousId,
    pub own: MapIdentifier,
    pub party: Vec<PseudonymousId>,
    pub closed: bool,
}

impl ConnectionRecord {
    /// Live, identifies as `id`, and lists `wanted_by` in its own party.
    fn reciprocates(&self, id: &str, wanted_by: &str) -> bool {
        !self.closed && !wanted_by.is_empty() && self.own_id == id && self.party.iter().any(|p| p == wanted_by)
    }
}

/// Result of applying one inbound record.
#[derive(Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Unknown or closed connection.
    Ignored,
    /// Sentinel received; advertised state cleared, nothing to push.
    Reset,
    /// State stored; these mutually linked peers must be refreshed.
    Identified { peers: Vec<ConnectionId> },
}

/// Plain data behind [`RelayRegistry`].
#[derive(Debug, Default)]
pub struct ConnectionTable {
    records: HashMap<ConnectionId, ConnectionRecord>,
    next_seq: u64,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ConnectionId) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.records.insert(id, ConnectionRecord { seq, ..ConnectionRecord::default() });
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&ConnectionRecord> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn publish(&mut self, id: ConnectionId, data: &ShareData) -> PublishOutcome {
        let Some(record) = self.records.get_mut(&id).filter(|r| !r.closed) else {
            return PublishOutcome::Ignored;
        };

        if data.user.is_empty() {
            record.own_id.clear();
            record.own = MapIdentifier::NONE;
            record.party.clear();
            return PublishOutcome::Reset;
        }

        record.own_id = data.user.clone();
        record.own = data.own();
        record.party = data.party.keys().take(MAX_PARTY_SIZE).cloned().collect();

        let own_id = record.own_id.clone();
        let party = record.party.clone();
        let mut peers = Vec::new();
        for member in &party {
            for (peer_id, peer) in &self.records {
                if *peer_id != id && peer.reciprocates(member, &own_id) && !peers.contains(peer_id) {
                    peers.push(*peer_id);
                }
            }
        }
        PublishOutcome::Identified { peers }
    }

    /// Oldest live connection identifying as `id` that lists `wanted_by` back.
    fn mutual_peer(&self, id: &str, wanted_by: &str, except: ConnectionId) -> Option<&ConnectionRecord> {
        self.records
            .iter()
            .filter(|(peer_id, peer)| **peer_id != except && peer.reciprocates(id, wanted_by))
            .map(|(_, peer)| peer)
            .min_by_key(|peer| peer.seq)
    }

    /// The record pushed to connection `id`: its own state plus, per tracked party id, the
    /// mutual peer's map or zeros.
    pub fn heartbeat(&self, id: ConnectionId) -> Option<ShareData> {
        let record = self.records.get(&id).filter(|r| !r.closed)?;
        let mut data = ShareData {
            user: record.own_id.clone(),
            ..ShareData::empty()
        };
        data.set_own(record.own);
        for member in record.party.iter().take(MAX_PARTY_SIZE) {
            let map = self
                .mutual_peer(member, &record.own_id, id)
                .map(|peer| peer.own)
                .unwrap_or(MapIdentifier::NONE);
            data.party.insert(member.clone(), Some(map));
        }
        Some(data)
    }

    /// Marks a connection closed. Returns false if it was unknown or already closed.
    pub fn close(&mut self, id: ConnectionId) -> bool {
        match self.records.get_mut(&id) {
            Some(record) if !record.closed => {
                record.closed = true;
                true
            }
            _ => false,
        }
    }

    /// Drops closed records and returns their ids.
    pub fn sweep(&mut self) -> Vec<ConnectionId> {
        let closed: Vec<ConnectionId> = self
            .records
            .iter()
            .filter(|(_, r)| r.closed)
            .map(|(id, _)| *id)
            .collect();
        for id in &closed {
            self.records.remove(id);
        }
        closed
    }
}

/// Main registry actor.
pub struct RelayRegistry {
    table: ConnectionTable,
    /// Connection actor addresses, pruned together with the table.
    sessions: HashMap<ConnectionId, Addr<ConnectionActor>>,
    sweep_interval: Duration,
}

impl RelayRegistry {
    pub fn new() -> Self {
        Self::with_sweep_interval(Duration::from_secs(SWEEP_INTERVAL_SECS))
    }

    pub fn with_sweep_interval(sweep_interval: Duration) -> Self {
        Self {
            table: ConnectionTable::new(),
            sessions: HashMap::new(),
            sweep_interval,
        }
    }

    fn sweep(&mut self) {
        let removed = self.table.sweep();
        for id in &removed {
            self.sessions.remove(id);
        }
        if !removed.is_empty() {
            info!("[Registry] Swept {} closed connection(s), {} remaining", removed.len(), self.table.len());
        }
    }
}

impl Default for RelayRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Actor for RelayRegistry {
    type Context = Context<Self>;

    /// Starts the periodic sweep.
    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.run_interval(self.sweep_interval, |act, _ctx| act.sweep());
    }
}

impl Handler<Connect> for RelayRegistry {
    type Result = ();

    fn handle(&mut self, msg: Connect, _ctx: &mut Self::Context) -> Self::Result {
        self.table.insert(msg.id);
        self.sessions.insert(msg.id, msg.addr);
        debug!("[Registry] Connection {} registered ({} tracked)", msg.id, self.table.len());
    }
}

impl Handler<Disconnect> for RelayRegistry {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _ctx: &mut Self::Context) -> Self::Result {
        if self.table.close(msg.id) {
            debug!("[Registry] Connection {} closed", msg.id);
        }
    }
}

impl Handler<Publish> for RelayRegistry {
    type Result = ();

    /// Stores the connection's advertised state and refreshes the peers that care about it.
    fn handle(&mut self, msg: Publish, _ctx: &mut Self::Context) -> Self::Result {
        match self.table.publish(msg.id, &msg.data) {
            PublishOutcome::Identified { peers } => {
                for peer in &peers {
                    if let Some(addr) = self.sessions.get(peer) {
                        addr.do_send(ForceHeartbeat);
                    }
                }
                debug!("[Registry] Connection {} published {}, {} peer(s) refreshed", msg.id, msg.data.own(), peers.len());
            }
            PublishOutcome::Reset => debug!("[Registry] Connection {} has nothing to share", msg.id),
            PublishOutcome::Ignored => {}
        }
    }
}

impl Handler<RequestHeartbeat> for RelayRegistry {
    type Result = ();

    fn handle(&mut self, msg: RequestHeartbeat, _ctx: &mut Self::Context) -> Self::Result {
        let (Some(data), Some(addr)) = (self.table.heartbeat(msg.id), self.sessions.get(&msg.id)) else {
            return;
        };
        addr.do_send(Heartbeat(data));
    }
}
