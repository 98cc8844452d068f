//! Accounting of received feedback packets per local stream.
//!
//! Besides plain packet counts, NACKed sequence numbers go through a recency
//! window so a retransmission request repeated by the remote side is not
//! counted as a new loss.

use crate::observer::RtcpPacketTypeCounter;
use log::warn;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::Instant;

/// Half of u16 max value, used for sequence number wraparound detection.
const UINT16_SIZE_HALF: u16 = 1 << 15;

/// Default number of sequence numbers remembered per stream.
pub const DEFAULT_NACK_WINDOW: u16 = 1024;

/// Tracks recently requested sequence numbers using a circular bitmap.
#[derive(Debug, Clone)]
pub(crate) struct NackLog {
    /// Bitmap of requested sequence numbers. Each u64 tracks 64 of them.
    requested: Vec<u64>,
    /// Size of the window (power of 2, minimum 64).
    size: u16,
    /// Newest requested sequence number.
    end: u16,
    started: bool,
}

impl NackLog {
    /// Size must be a power of 2 between 64 and 32768 (inclusive).
    pub(crate) fn new(size: u16) -> Option<Self> {
        if !Self::is_valid_size(size) {
            return None;
        }

        Some(Self {
            requested: vec![0u64; (size / 64) as usize],
            size,
            end: 0,
            started: false,
        })
    }

    pub(crate) fn is_valid_size(size: u16) -> bool {
        (6..=15).any(|i| size == 1 << i)
    }

    /// Records a request for `seq`. Returns false if it was already requested
    /// within the window.
    pub(crate) fn insert(&mut self, seq: u16) -> bool {
        if !self.started {
            self.started = true;
            self.end = seq;
            self.set_requested(seq);
            return true;
        }

        let diff = seq.wrapping_sub(self.end);
        match diff {
            0 => false,
            d if d < UINT16_SIZE_HALF => {
                // Newer than anything seen: forget the slots being skipped over.
                if d >= self.size {
                    self.requested.fill(0);
                } else {
                    let mut i = self.end.wrapping_add(1);
                    while i != seq {
                        self.del_requested(i);
                        i = i.wrapping_add(1);
                    }
                }
                self.end = seq;
                self.set_requested(seq);
                true
            }
            _ => {
                if self.end.wrapping_sub(seq) >= self.size {
                    // Too old to tell, count it without disturbing the window.
                    return true;
                }
                if self.get_requested(seq) {
                    return false;
                }
                self.set_requested(seq);
                true
            }
        }
    }

    fn set_requested(&mut self, seq: u16) {
        let pos = seq % self.size;
        self.requested[(pos / 64) as usize] |= 1 << (pos % 64);
    }

    fn del_requested(&mut self, seq: u16) {
        let pos = seq % self.size;
        self.requested[(pos / 64) as usize] &= !(1u64 << (pos % 64));
    }

    fn get_requested(&self, seq: u16) -> bool {
        let pos = seq % self.size;
        (self.requested[(pos / 64) as usize] & (1 << (pos % 64))) != 0
    }
}

#[derive(Debug, Clone)]
struct StreamCounters {
    counter: RtcpPacketTypeCounter,
    nack_log: NackLog,
}

#[derive(Debug)]
pub(crate) struct PacketTypeCounters {
    streams: HashMap<u32, StreamCounters>,
    /// Empty log every new stream starts from.
    empty_nack_log: NackLog,
}

impl PacketTypeCounters {
    pub(crate) fn new(nack_window: u16) -> Self {
        let empty_nack_log = NackLog::new(nack_window).unwrap_or_else(|| {
            warn!(
                "invalid nack window {}, falling back to {}",
                nack_window, DEFAULT_NACK_WINDOW
            );
            NackLog {
                requested: vec![0u64; (DEFAULT_NACK_WINDOW / 64) as usize],
                size: DEFAULT_NACK_WINDOW,
                end: 0,
                started: false,
            }
        });

        Self {
            streams: HashMap::new(),
            empty_nack_log,
        }
    }

    fn stream(&mut self, ssrc: u32, now: Instant) -> &mut StreamCounters {
        let stream = match self.streams.entry(ssrc) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(StreamCounters {
                counter: RtcpPacketTypeCounter::default(),
                nack_log: self.empty_nack_log.clone(),
            }),
        };
        stream.counter.first_packet_time.get_or_insert(now);
        stream
    }

    pub(crate) fn on_nack(&mut self, ssrc: u32, sequence_numbers: &[u16], now: Instant) {
        let stream = self.stream(ssrc, now);
        stream.counter.nack_packets += 1;
        for &seq in sequence_numbers {
            stream.counter.nack_requests += 1;
            if stream.nack_log.insert(seq) {
                stream.counter.unique_nack_requests += 1;
            }
        }
    }

    pub(crate) fn on_pli(&mut self, ssrc: u32, now: Instant) {
        self.stream(ssrc, now).counter.pli_packets += 1;
    }

    pub(crate) fn on_fir(&mut self, ssrc: u32, now: Instant) {
        self.stream(ssrc, now).counter.fir_packets += 1;
    }

    pub(crate) fn get(&self, ssrc: u32) -> Option<RtcpPacketTypeCounter> {
        self.streams.get(&ssrc).map(|stream| stream.counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nack_log_invalid_size() {
        assert!(NackLog::new(0).is_none());
        assert!(NackLog::new(32).is_none());
        assert!(NackLog::new(1000).is_none());
        assert!(NackLog::new(64).is_some());
        assert!(NackLog::new(32768).is_some());
    }

    #[test]
    fn test_nack_log_duplicates() {
        let mut log = NackLog::new(64).unwrap();
        let unique: Vec<bool> = [1u16, 2, 3, 5, 5, 7, 3, 30, 40]
            .iter()
            .map(|&seq| log.insert(seq))
            .collect();
        assert_eq!(
            unique,
            vec![true, true, true, true, false, true, false, true, true]
        );
    }

    #[test]
    fn test_nack_log_forgets_outside_window() {
        let mut log = NackLog::new(64).unwrap();
        assert!(log.insert(10));
        assert!(log.insert(100));
        // 10 slid out of the window
        assert!(log.insert(10));
        assert!(!log.insert(100));

        assert!(log.insert(90));
        assert!(log.insert(120));
        assert!(!log.insert(90));
        // shares the slot of 90
        assert!(log.insert(154));
        assert!(log.insert(90));
    }

    #[test]
    fn test_nack_log_wraparound() {
        let mut log = NackLog::new(128).unwrap();
        assert!(log.insert(65534));
        assert!(log.insert(1));
        assert!(!log.insert(65534));
        assert!(log.insert(65535));
        assert!(!log.insert(1));
    }

    #[test]
    fn test_packet_type_counters() {
        let now = Instant::now();
        let mut counters = PacketTypeCounters::new(DEFAULT_NACK_WINDOW);
        assert!(counters.get(1).is_none());

        counters.on_nack(1, &[1, 2, 3, 5], now);
        counters.on_nack(1, &[5, 7, 30, 40], now);
        counters.on_pli(1, now);
        counters.on_fir(2, now);

        let counter = counters.get(1).unwrap();
        assert_eq!(counter.first_packet_time, Some(now));
        assert_eq!(counter.nack_packets, 2);
        assert_eq!(counter.nack_requests, 8);
        assert_eq!(counter.unique_nack_requests, 7);
        assert_eq!(counter.pli_packets, 1);
        assert_eq!(counter.fir_packets, 0);

        assert_eq!(counters.get(2).map(|c| c.fir_packets), Some(1));
    }

    #[test]
    fn test_packet_type_counters_invalid_window() {
        let counters = PacketTypeCounters::new(1000);
        assert_eq!(counters.empty_nack_log.size, DEFAULT_NACK_WINDOW);
    }
}
