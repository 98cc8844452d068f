//! Bandwidth constraint negotiation (RFC 5104 §3.5.4).
//!
//! Every remote participant may keep one TMMBR constraint on each of our
//! streams. Constraints expire unless refreshed. The bounding set a remote
//! media sender announces through TMMBN is stored as is.

use crate::codec::tmmb::TmmbItem;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Report intervals a TMMBR constraint stays valid without being refreshed.
pub const TMMBR_TIMEOUT_INTERVALS: u32 = 3;

#[derive(Debug, Copy, Clone)]
struct Candidate {
    item: TmmbItem,
    arrival_time: Instant,
}

#[derive(Debug, Default)]
pub(crate) struct TmmbrNegotiator {
    lifetime: Duration,
    /// Local media source -> proposer -> latest constraint.
    candidates: HashMap<u32, HashMap<u32, Candidate>>,
    /// Remote reporter -> announced bounding set.
    bounding_sets: HashMap<u32, Vec<TmmbItem>>,
}

impl TmmbrNegotiator {
    pub(crate) fn new(report_interval: Duration) -> Self {
        Self {
            lifetime: report_interval * TMMBR_TIMEOUT_INTERVALS,
            ..Default::default()
        }
    }

    fn is_expired(&self, candidate: &Candidate, now: Instant) -> bool {
        now.saturating_duration_since(candidate.arrival_time) > self.lifetime
    }

    /// Stores a constraint `proposer` placed on `media_ssrc`. The stored item
    /// carries the proposer SSRC. Zero bitrate constraints are refused.
    pub(crate) fn insert(
        &mut self,
        media_ssrc: u32,
        proposer_ssrc: u32,
        item: TmmbItem,
        now: Instant,
    ) -> bool {
        if item.bitrate_bps == 0 {
            return false;
        }

        let lifetime = self.lifetime;
        let proposals = self.candidates.entry(media_ssrc).or_default();
        proposals.retain(|_, c| now.saturating_duration_since(c.arrival_time) <= lifetime);
        proposals.insert(
            proposer_ssrc,
            Candidate {
                item: TmmbItem {
                    ssrc: proposer_ssrc,
                    ..item
                },
                arrival_time: now,
            },
        );
        true
    }

    /// Live constraints on `media_ssrc`, oldest first.
    pub(crate) fn candidates(&self, media_ssrc: u32, now: Instant) -> Vec<TmmbItem> {
        let Some(proposals) = self.candidates.get(&media_ssrc) else {
            return vec![];
        };

        let mut live: Vec<&Candidate> = proposals
            .values()
            .filter(|c| !self.is_expired(c, now))
            .collect();
        live.sort_by_key(|c| (c.arrival_time, c.item.ssrc));
        live.into_iter().map(|c| c.item).collect()
    }

    pub(crate) fn remove_proposer(&mut self, proposer_ssrc: u32) {
        for proposals in self.candidates.values_mut() {
            proposals.remove(&proposer_ssrc);
        }
        self.candidates.retain(|_, proposals| !proposals.is_empty());
        self.bounding_sets.remove(&proposer_ssrc);
    }

    pub(crate) fn set_bounding_set(&mut self, reporter_ssrc: u32, bounding_set: Vec<TmmbItem>) {
        self.bounding_sets.insert(reporter_ssrc, bounding_set);
    }

    /// Union of the bounding sets announced by remote senders, and whether
    /// `local_ssrc` is one of its owners.
    pub(crate) fn bounding_set(&self, local_ssrc: u32) -> (Vec<TmmbItem>, bool) {
        let mut items: Vec<TmmbItem> = self.bounding_sets.values().flatten().copied().collect();
        items.sort_by_key(|item| (item.ssrc, item.bitrate_bps));
        items.dedup();
        let tmmbr_owner = items.iter().any(|item| item.ssrc == local_ssrc);
        (items, tmmbr_owner)
    }
}

/// Lowest bitrate among `items`.
pub(crate) fn min_bitrate(items: &[TmmbItem]) -> Option<u64> {
    items.iter().map(|item| item.bitrate_bps).min()
}
