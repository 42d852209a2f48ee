/// Main configuration module.
///
/// - `relay`: constants for the relay server
/// - `client`: constants and the persisted client configuration
/// - `store`: loading and saving the client configuration
pub mod relay;
pub mod client;
pub mod store;

pub use client::ClientConfig;
pub use store::{ConfigError, ConfigStore, JsonFileStore};
