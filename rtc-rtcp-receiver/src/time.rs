//! Mapping between monotonic [`Instant`]s and NTP wallclock timestamps.

use std::ops::Add;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Offset in seconds between the NTP epoch (1900) and the unix epoch (1970).
const NTP_UNIX_OFFSET_SECS: u64 = 0x83AA7E80;

/// Smallest round-trip time ever reported.
pub const MIN_RTT: Duration = Duration::from_millis(1);

/// An [`Instant`] paired with the wallclock time it was taken at.
///
/// Every NTP value the receiver derives is computed from this anchor and the
/// caller supplied `now`, so a fixed anchor makes all RTT math reproducible.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SystemInstant {
    instant: Instant,
    duration_since_unix_epoch: Duration,
}

impl Default for SystemInstant {
    fn default() -> Self {
        Self::now()
    }
}

impl SystemInstant {
    pub fn now() -> Self {
        Self {
            instant: Instant::now(),
            duration_since_unix_epoch: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_else(|_| Duration::from_secs(0)),
        }
    }

    pub fn new(instant: Instant, duration_since_unix_epoch: Duration) -> Self {
        Self {
            instant,
            duration_since_unix_epoch,
        }
    }

    pub fn instant(&self) -> Instant {
        self.instant
    }

    pub fn duration_since_unix_epoch(&self) -> Duration {
        self.duration_since_unix_epoch
    }

    pub fn unix(&self, now: Instant) -> Duration {
        match now.checked_duration_since(self.instant) {
            Some(elapsed) => elapsed.add(self.duration_since_unix_epoch),
            None => self
                .duration_since_unix_epoch
                .saturating_sub(self.instant.duration_since(now)),
        }
    }

    pub fn ntp(&self, now: Instant) -> u64 {
        SystemInstant::unix2ntp(self.unix(now))
    }

    /// Middle 32 bits of the NTP timestamp at `now`.
    pub fn compact_ntp(&self, now: Instant) -> u32 {
        compact_ntp(self.ntp(now))
    }

    pub fn unix2ntp(duration_since_unix_epoch: Duration) -> u64 {
        let u = duration_since_unix_epoch.as_nanos() as u64;

        let mut s = u / 1_000_000_000;
        s += NTP_UNIX_OFFSET_SECS;
        let mut f = u % 1_000_000_000;
        f <<= 32;
        f /= 1_000_000_000;
        s <<= 32;

        s | f
    }
}

/// Compact (16.16 fixed point) form of a 64-bit NTP timestamp.
pub fn compact_ntp(ntp: u64) -> u32 {
    (ntp >> 16) as u32
}

/// Expresses a duration in compact NTP units, wrapping like the wire field.
pub fn duration_to_compact_ntp(duration: Duration) -> u32 {
    ((duration.as_nanos() << 16) / 1_000_000_000) as u32
}

/// Converts a compact NTP interval into a round-trip time.
///
/// Intervals above 2^31 come from a clock running backwards and are reported
/// as [`MIN_RTT`], as is anything that rounds to zero.
pub fn compact_ntp_rtt_to_duration(compact_ntp_interval: u32) -> Duration {
    if compact_ntp_interval > 0x8000_0000 {
        return MIN_RTT;
    }
    let ms = (compact_ntp_interval as u64 * 1000 + (1 << 15)) >> 16;
    Duration::from_millis(ms).max(MIN_RTT)
}
