// src/protocol/mod.rs

//! Wire protocol shared by the relay and the client.
//!
//! - `types`: the `ShareData` record and `MapIdentifier`
//! - `validation`: schema checks applied to every inbound frame

pub mod types;
pub mod validation;

pub use types::{MapIdentifier, PseudonymousId, ShareData};
pub use validation::{parse_share, validate, ProtocolViolation};

/// Party size excluding self.
pub const MAX_PARTY_SIZE: usize = 7;

/// Upper bound (inclusive) for `mapType` and `mapSpot` on the wire.
pub const MAX_MAP_VALUE: u8 = 99;

/// Length of a non-empty pseudonymous id.
pub const PSEUDONYM_LEN: usize = 64;
