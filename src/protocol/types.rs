//! Wire types exchanged between clients and the relay.
//!
//! The same JSON shape travels in both directions:
//! `{"user": "...", "mapType": n, "mapSpot": n, "party": {"<id>": {"mapType": n, "mapSpot": n} | null}}`.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// 64 hex characters derived by [`crate::identity::IdentityHasher`], or empty.
pub type PseudonymousId = String;

/// Which map a player holds and at which location slot. `rank == 0` means no map.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MapIdentifier {
    #[serde(rename = "mapType")]
    pub rank: u32,
    #[serde(rename = "mapSpot")]
    pub spot: u16,
}

impl MapIdentifier {
    pub const NONE: MapIdentifier = MapIdentifier { rank: 0, spot: 0 };

    pub fn new(rank: u32, spot: u16) -> Self {
        Self { rank, spot }
    }

    pub fn has_map(&self) -> bool {
        self.rank != 0
    }
}

impl std::fmt::Display for MapIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.rank, self.spot)
    }
}

/// The session record: what a client publishes, and what the relay pushes back.
///
/// `party` is a `BTreeMap` so that serializing the same state always yields the same bytes;
/// the client's dedup relies on that.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ShareData {
    pub user: PseudonymousId,
    #[serde(rename = "mapType")]
    pub map_type: u32,
    #[serde(rename = "mapSpot")]
    pub map_spot: u16,
    #[serde(deserialize_with = "lenient_party")]
    pub party: BTreeMap<PseudonymousId, Option<MapIdentifier>>,
}

impl ShareData {
    /// The "nothing to share" record.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn own(&self) -> MapIdentifier {
        MapIdentifier::new(self.map_type, self.map_spot)
    }

    pub fn set_own(&mut self, own: MapIdentifier) {
        self.map_type = own.rank;
        self.map_spot = own.spot;
    }
}

/// `party` must be a JSON object; the values are informational only, so anything that is not a
/// well-formed map identifier reads as unknown instead of failing the whole frame.
fn lenient_party<'de, D>(deserializer: D) -> Result<BTreeMap<PseudonymousId, Option<MapIdentifier>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(id, value)| (id, serde_json::from_value::<MapIdentifier>(value).ok()))
        .collect())
}
