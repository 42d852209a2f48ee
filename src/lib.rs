//! Anonymized party map sharing.
//!
//! Party members publish which treasure map they hold under a session-scoped pseudonym; a relay
//! pushes each member the maps of the peers that list them back.
//!
//! - `protocol`: wire record and validation
//! - `identity`: pseudonym derivation
//! - `client`: share state and the relay client
//! - `server`: the relay (connection actors and registry)
//! - `config`: constants and the persisted client configuration

pub mod config;
pub mod protocol;
pub mod identity;
pub mod client;
pub mod server;

#[cfg(test)]
mod tests;
