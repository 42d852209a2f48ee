// src/client/mod.rs

//! Client side of the party map share.
//!
//! - `state`: dedup/throttle decisions and the party knowledge map
//! - `observer`: what the host must supply, and the per-player view handed back
//! - `share`: the connection and tick tasks

pub mod observer;
pub mod share;
pub mod state;

pub use observer::{LocalObservation, LocalObserver, MapReader, PartyMember, PlayerMapState, PlayerView, ThrottledReader};
pub use share::{ShareClient, ShareError};
pub use state::ShareState;
