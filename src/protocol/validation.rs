use thiserror::Error;

use super::types::ShareData;
use super::{MAX_MAP_VALUE, MAX_PARTY_SIZE, PSEUDONYM_LEN};

/// Reasons a frame is rejected. On the relay every variant closes the connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("payload is not a share record: {0}")]
    Malformed(String),
    #[error("user id has length {0}, expected 0 or 64")]
    UserLength(usize),
    #[error("mapType {0} outside 0..=99")]
    MapTypeOutOfRange(u32),
    #[error("mapSpot {0} outside 0..=99")]
    MapSpotOutOfRange(u16),
    #[error("party lists {0} members, at most 7 allowed")]
    PartyTooLarge(usize),
}

/// Checks a decoded record against the wire schema.
pub fn validate(data: &ShareData) -> Result<(), ProtocolViolation> {
    let user_len = data.user.chars().count();
    if user_len != 0 && user_len != PSEUDONYM_LEN {
        return Err(ProtocolViolation::UserLength(user_len));
    }
    if data.map_type > MAX_MAP_VALUE as u32 {
        return Err(ProtocolViolation::MapTypeOutOfRange(data.map_type));
    }
    if data.map_spot > MAX_MAP_VALUE as u16 {
        return Err(ProtocolViolation::MapSpotOutOfRange(data.map_spot));
    }
    if data.party.len() > MAX_PARTY_SIZE {
        return Err(ProtocolViolation::PartyTooLarge(data.party.len()));
    }
    Ok(())
}

/// Decodes and validates one text frame.
pub fn parse_share(text: &str) -> Result<ShareData, ProtocolViolation> {
    let data: ShareData =
        serde_json::from_str(text).map_err(|e| ProtocolViolation::Malformed(e.to_string()))?;
    validate(&data)?;
    Ok(data)
}
