//! Round-trip time from report blocks (RFC 3550 §6.4.1) and from the
//! extended report RRTR/DLRR exchange (RFC 3611 §4.4, §4.5).

use crate::time::{compact_ntp, compact_ntp_rtt_to_duration, duration_to_compact_ntp};
use log::trace;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Round-trip time samples derived from one remote reporter.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RttStats {
    pub last: Duration,
    pub min: Duration,
    pub max: Duration,
    pub avg: Duration,
    pub num_samples: u32,
}

impl RttStats {
    fn add_sample(&mut self, rtt: Duration) {
        self.last = rtt;
        if self.num_samples == 0 {
            self.min = rtt;
            self.max = rtt;
            self.avg = rtt;
        } else {
            self.min = self.min.min(rtt);
            self.max = self.max.max(rtt);
            let samples = self.num_samples as u128;
            let avg = (self.avg.as_nanos() * samples + rtt.as_nanos()) / (samples + 1);
            self.avg = Duration::from_nanos(avg as u64);
        }
        self.num_samples = self.num_samples.saturating_add(1);
    }
}

/// What a local RTCP sender needs to answer the last received RRTR with a
/// DLRR sub-block.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ReceiveTimeInfo {
    pub ssrc: u32,
    /// Compact NTP of the received reference time.
    pub last_rr: u32,
    /// Compact NTP interval since it arrived.
    pub delay_since_last_rr: u32,
}

#[derive(Debug, Copy, Clone)]
struct ReferenceTime {
    ssrc: u32,
    last_rr: u32,
    arrival_time: Instant,
}

/// `now - delay - last`, all compact NTP, wrapping like the wire fields.
pub fn rtt_from_report(now: u32, last_report: u32, delay: u32) -> Duration {
    compact_ntp_rtt_to_duration(now.wrapping_sub(delay).wrapping_sub(last_report))
}

#[derive(Debug, Default)]
pub(crate) struct RttEstimator {
    per_reporter: HashMap<u32, RttStats>,
    xr_rrtr_enabled: bool,
    xr_rr_rtt: Option<Duration>,
    reference_time: Option<ReferenceTime>,
}

impl RttEstimator {
    pub(crate) fn new(xr_rrtr_enabled: bool) -> Self {
        Self {
            xr_rrtr_enabled,
            ..Default::default()
        }
    }

    /// Records the round trip implied by a report block. Blocks that do not
    /// echo a sender report (`last_sender_report == 0`) carry no sample.
    pub(crate) fn on_report_block(
        &mut self,
        remote_ssrc: u32,
        last_sender_report: u32,
        delay: u32,
        now_compact_ntp: u32,
    ) -> Option<Duration> {
        if last_sender_report == 0 {
            return None;
        }

        let rtt = rtt_from_report(now_compact_ntp, last_sender_report, delay);
        self.per_reporter
            .entry(remote_ssrc)
            .or_default()
            .add_sample(rtt);
        trace!("rtt {:?} from reporter {}", rtt, remote_ssrc);
        Some(rtt)
    }

    pub(crate) fn rtt(&self, remote_ssrc: u32) -> Option<RttStats> {
        self.per_reporter.get(&remote_ssrc).copied()
    }

    pub(crate) fn on_receiver_reference_time(
        &mut self,
        remote_ssrc: u32,
        ntp_timestamp: u64,
        now: Instant,
    ) {
        self.reference_time = Some(ReferenceTime {
            ssrc: remote_ssrc,
            last_rr: compact_ntp(ntp_timestamp),
            arrival_time: now,
        });
    }

    /// Records the round trip implied by a DLRR sub-block about one of our
    /// streams. Ignored unless RRTR sending is enabled.
    pub(crate) fn on_dlrr(
        &mut self,
        last_rr: u32,
        delay_since_last_rr: u32,
        now_compact_ntp: u32,
    ) -> Option<Duration> {
        if !self.xr_rrtr_enabled || last_rr == 0 {
            return None;
        }

        let rtt = rtt_from_report(now_compact_ntp, last_rr, delay_since_last_rr);
        self.xr_rr_rtt = Some(rtt);
        Some(rtt)
    }

    pub(crate) fn get_and_reset_xr_rr_rtt(&mut self) -> Option<Duration> {
        self.xr_rr_rtt.take()
    }

    pub(crate) fn last_reference_time_info(&self, now: Instant) -> Option<ReceiveTimeInfo> {
        self.reference_time.map(|reference| ReceiveTimeInfo {
            ssrc: reference.ssrc,
            last_rr: reference.last_rr,
            delay_since_last_rr: duration_to_compact_ntp(
                now.saturating_duration_since(reference.arrival_time),
            ),
        })
    }

    pub(crate) fn set_xr_rrtr_enabled(&mut self, enabled: bool) {
        self.xr_rrtr_enabled = enabled;
    }

    pub(crate) fn xr_rrtr_enabled(&self) -> bool {
        self.xr_rrtr_enabled
    }

    pub(crate) fn remove_reporter(&mut self, remote_ssrc: u32) {
        self.per_reporter.remove(&remote_ssrc);
        self.xr_rr_rtt = None;
    }
}
