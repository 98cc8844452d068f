//! Detection of silent or stalled remote receivers.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::{Duration, Instant};

/// Report intervals without a qualifying event before an alarm fires.
pub const RR_TIMEOUT_INTERVALS: u32 = 3;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Alarm {
    Armed,
    Fired,
}

impl Alarm {
    /// Fires at most once per arming.
    fn poll(&mut self, expired: bool) -> bool {
        if *self == Alarm::Armed && expired {
            *self = Alarm::Fired;
            return true;
        }
        false
    }

    fn rearm(&mut self) {
        *self = Alarm::Armed;
    }
}

#[derive(Debug)]
struct StreamTimeout {
    last_report: Instant,
    last_sequence_number: u32,
    last_sequence_advance: Instant,
    liveness: Alarm,
    stagnation: Alarm,
}

#[derive(Debug, Default)]
pub(crate) struct TimeoutTracker {
    streams: HashMap<u32, StreamTimeout>,
}

impl TimeoutTracker {
    /// A report block about local stream `ssrc` arrived.
    pub(crate) fn on_report_block(&mut self, ssrc: u32, extended_sequence_number: u32, now: Instant) {
        match self.streams.entry(ssrc) {
            Entry::Vacant(e) => {
                e.insert(StreamTimeout {
                    last_report: now,
                    last_sequence_number: extended_sequence_number,
                    last_sequence_advance: now,
                    liveness: Alarm::Armed,
                    stagnation: Alarm::Armed,
                });
            }
            Entry::Occupied(mut e) => {
                let stream = e.get_mut();
                stream.last_report = now;
                stream.liveness.rearm();
                if extended_sequence_number > stream.last_sequence_number {
                    stream.last_sequence_number = extended_sequence_number;
                    stream.last_sequence_advance = now;
                    stream.stagnation.rearm();
                }
            }
        }
    }

    pub(crate) fn rr_timeout(&mut self, now: Instant, report_interval: Duration) -> bool {
        let limit = report_interval * RR_TIMEOUT_INTERVALS;
        let mut fired = false;
        for stream in self.streams.values_mut() {
            let expired = now.saturating_duration_since(stream.last_report) > limit;
            fired |= stream.liveness.poll(expired);
        }
        fired
    }

    pub(crate) fn rr_sequence_number_timeout(
        &mut self,
        now: Instant,
        report_interval: Duration,
    ) -> bool {
        let limit = report_interval * RR_TIMEOUT_INTERVALS;
        let mut fired = false;
        for stream in self.streams.values_mut() {
            let expired = now.saturating_duration_since(stream.last_sequence_advance) > limit;
            fired |= stream.stagnation.poll(expired);
        }
        fired
    }

    /// Forgets streams that are no longer ours.
    pub(crate) fn retain(&mut self, mut owned: impl FnMut(u32) -> bool) {
        self.streams.retain(|&ssrc, _| owned(ssrc));
    }
}
