//! Client-side share state: what was last published, and what is known about the party.

use log::error;
use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use crate::config::client::RESEND_INTERVAL_SECS;
use crate::protocol::{MapIdentifier, PseudonymousId, ShareData, MAX_PARTY_SIZE};

/// Owns the local snapshot and decides when it must be (re)transmitted.
///
/// `update` returns the serialized frame to send, or `None` when the snapshot is unchanged and
/// the last transmission is younger than the resend interval.
#[derive(Debug)]
pub struct ShareState {
    data: ShareData,
    last_sent: Option<String>,
    last_sent_at: Option<Instant>,
    resend_interval: Duration,
}

impl Default for ShareState {
    fn default() -> Self {
        Self::new()
    }
}

impl ShareState {
    pub fn new() -> Self {
        Self::with_resend_interval(Duration::from_secs(RESEND_INTERVAL_SECS))
    }

    pub fn with_resend_interval(resend_interval: Duration) -> Self {
        Self {
            data: ShareData::empty(),
            last_sent: None,
            last_sent_at: None,
            resend_interval,
        }
    }

    /// Applies one tick of local observations.
    ///
    /// Party members that left are forgotten, new members start unknown, and members that stay
    /// keep whatever was last learned about them. At most [`MAX_PARTY_SIZE`] distinct ids are kept.
    pub fn update(
        &mut self,
        own_id: &str,
        own: MapIdentifier,
        party_ids: &[PseudonymousId],
        now: Instant,
    ) -> Option<String> {
        self.data.user = own_id.to_string();
        self.data.set_own(own);

        let mut seen = HashSet::new();
        let current: Vec<&PseudonymousId> = party_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .take(MAX_PARTY_SIZE)
            .collect();
        self.data.party.retain(|id, _| current.contains(&id));
        for id in current {
            self.data.party.entry(id.clone()).or_insert(None);
        }

        let frame = match serde_json::to_string(&self.data) {
            Ok(frame) => frame,
            Err(e) => {
                error!("[Share] Failed to serialize share data: {}", e);
                return None;
            }
        };

        let fresh = self
            .last_sent_at
            .is_some_and(|at| now.saturating_duration_since(at) < self.resend_interval);
        if fresh && self.last_sent.as_deref() == Some(frame.as_str()) {
            return None;
        }
        self.last_sent = Some(frame.clone());
        self.last_sent_at = Some(now);
        Some(frame)
    }

    /// Merges a relay heartbeat. Only ids currently tracked are updated; the rest are ignored.
    pub fn apply_inbound(&mut self, inbound: &ShareData) -> usize {
        let mut applied = 0;
        for (id, map) in &inbound.party {
            if let Some(slot) = self.data.party.get_mut(id) {
                *slot = *map;
                applied += 1;
            }
        }
        applied
    }

    /// Forgets the last transmission so the next `update` always sends.
    pub fn reset_transmitted(&mut self) {
        self.last_sent = None;
        self.last_sent_at = None;
    }

    pub fn data(&self) -> &ShareData {
        &self.data
    }

    /// Best-known map per party member; `None` means nothing learned yet.
    pub fn party_view(&self) -> BTreeMap<PseudonymousId, Option<MapIdentifier>> {
        self.data.party.clone()
    }

    pub fn known(&self, id: &str) -> Option<MapIdentifier> {
        self.data.party.get(id).copied().flatten()
    }
}
