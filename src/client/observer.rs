//! Collaborator interfaces the share client consumes from the host, and the per-player view it
//! hands back for rendering.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::client::MAP_READ_THROTTLE_MS;
use crate::protocol::{MapIdentifier, PseudonymousId};

/// Another player in the local player's group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartyMember {
    pub player_id: u64,
    /// Presentation only, never sent.
    pub name: String,
}

/// One snapshot of the host's group state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalObservation {
    pub player_id: u64,
    pub name: String,
    pub group_id: i64,
    pub group_id2: i64,
    pub members: Vec<PartyMember>,
}

impl LocalObservation {
    /// False when the host reports no player or no group; the client then publishes the sentinel.
    pub fn is_grouped(&self) -> bool {
        self.player_id != 0 && self.group_id != 0 && self.group_id2 != 0
    }

    /// Members that can be shared with: not the local player, not an empty slot.
    pub fn others(&self) -> impl Iterator<Item = &PartyMember> {
        self.members
            .iter()
            .filter(move |m| m.player_id != 0 && m.player_id != self.player_id)
    }
}

/// Supplies the local player's id, group ids and party members on demand.
pub trait LocalObserver: Send + Sync {
    fn observe(&self) -> LocalObservation;
}

/// Supplies the local player's current map.
pub trait MapReader: Send + Sync {
    fn current_map(&self) -> MapIdentifier;
}

impl<F> MapReader for F
where
    F: Fn() -> MapIdentifier + Send + Sync,
{
    fn current_map(&self) -> MapIdentifier {
        self()
    }
}

/// Caches another reader's value and refreshes it at most once per throttle window.
pub struct ThrottledReader<R> {
    inner: R,
    throttle: Duration,
    cache: Mutex<Option<(Instant, MapIdentifier)>>,
}

impl<R: MapReader> ThrottledReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_throttle(inner, Duration::from_millis(MAP_READ_THROTTLE_MS))
    }

    pub fn with_throttle(inner: R, throttle: Duration) -> Self {
        Self {
            inner,
            throttle,
            cache: Mutex::new(None),
        }
    }
}

impl<R: MapReader> MapReader for ThrottledReader<R> {
    fn current_map(&self) -> MapIdentifier {
        let mut cache = self.cache.lock();
        match *cache {
            Some((read_at, map)) if read_at.elapsed() < self.throttle => map,
            _ => {
                let map = self.inner.current_map();
                *cache = Some((Instant::now(), map));
                map
            }
        }
    }
}

/// Where a player's map comes from: the live reader for the local player, or the last value
/// learned from the relay for everyone else.
#[derive(Clone)]
pub enum PlayerMapState {
    Local(Arc<dyn MapReader>),
    Remote(Option<MapIdentifier>),
}

impl PlayerMapState {
    pub fn map(&self) -> MapIdentifier {
        match self {
            PlayerMapState::Local(reader) => reader.current_map(),
            PlayerMapState::Remote(known) => known.unwrap_or(MapIdentifier::NONE),
        }
    }
}

impl std::fmt::Debug for PlayerMapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerMapState::Local(_) => f.write_str("Local"),
            PlayerMapState::Remote(known) => f.debug_tuple("Remote").field(known).finish(),
        }
    }
}

/// A row for the rendering layer.
#[derive(Clone, Debug)]
pub struct PlayerView {
    pub player_id: u64,
    pub name: String,
    /// `None` while not grouped.
    pub pseudonym: Option<PseudonymousId>,
    pub state: PlayerMapState,
}

impl PlayerView {
    pub fn map(&self) -> MapIdentifier {
        self.state.map()
    }

    pub fn has_map(&self) -> bool {
        self.map().has_map()
    }
}
