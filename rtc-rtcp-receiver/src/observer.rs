//! Consumer facing callback traits.
//!
//! Every observer is optional and shared behind an [`Arc`](std::sync::Arc).
//! Callbacks run on the thread that called
//! [`RtcpReceiver::handle_rtcp`](crate::RtcpReceiver::handle_rtcp), after the
//! receiver released its state lock. Observers must not call back into the
//! receiver.

use crate::codec::tmmb::TmmbItem;
use crate::report_block::ReportBlockData;
use rtcp::transport_feedbacks::transport_layer_cc::TransportLayerCc;
use std::time::{Duration, Instant};

/// Reception statistics carried by a single report block.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RtcpStatistics {
    pub fraction_lost: u8,
    pub cumulative_lost: u32,
    pub extended_highest_sequence_number: u32,
    pub jitter: u32,
}

/// Feedback counters kept per local stream.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RtcpPacketTypeCounter {
    /// Arrival of the first counted packet.
    pub first_packet_time: Option<Instant>,
    pub nack_packets: u32,
    pub fir_packets: u32,
    pub pli_packets: u32,
    /// Sequence numbers requested across all NACKs.
    pub nack_requests: u32,
    /// Requested sequence numbers not seen recently.
    pub unique_nack_requests: u32,
}

impl RtcpPacketTypeCounter {
    /// Share of NACKed sequence numbers that were requested for the first time.
    pub fn unique_nack_requests_in_percent(&self) -> Option<u32> {
        if self.nack_requests == 0 {
            return None;
        }
        Some((self.unique_nack_requests as u64 * 100 / self.nack_requests as u64) as u32)
    }
}

pub trait RtcpBandwidthObserver: Send + Sync {
    fn on_received_estimated_bitrate(&self, bitrate_bps: u64);

    /// Report blocks of all sender and receiver reports in one compound
    /// packet, together with the last computed round-trip time.
    fn on_received_rtcp_receiver_report(
        &self,
        report_blocks: &[ReportBlockData],
        rtt: Option<Duration>,
        now: Instant,
    );
}

pub trait RtcpIntraFrameObserver: Send + Sync {
    fn on_received_intra_frame_request(&self, ssrc: u32);

    fn on_received_sli(&self, ssrc: u32, picture_id: u8);

    fn on_received_rpsi(&self, ssrc: u32, picture_id: u64);

    fn on_local_ssrc_changed(&self, old_ssrc: u32, new_ssrc: u32);
}

pub trait RtcpStatisticsObserver: Send + Sync {
    fn statistics_updated(&self, statistics: &RtcpStatistics, remote_ssrc: u32, source_ssrc: u32);

    fn cname_changed(&self, cname: &str, ssrc: u32);
}

pub trait RtcpPacketTypeCounterObserver: Send + Sync {
    fn rtcp_packet_types_counter_updated(&self, ssrc: u32, packet_counter: &RtcpPacketTypeCounter);
}

pub trait TransportFeedbackObserver: Send + Sync {
    fn on_transport_feedback(&self, feedback: &TransportLayerCc);
}

/// The RTP module that owns the receiver.
pub trait RtcpReceiverOwner: Send + Sync {
    /// Live bandwidth constraint candidates on `media_ssrc`, one of our
    /// streams, after a TMMBR changed them.
    fn set_tmmbn(&self, media_ssrc: u32, candidates: &[TmmbItem]);

    /// The remote side asked for a sender report (RRR).
    fn on_request_send_report(&self);

    fn on_received_nack(&self, ssrc: u32, sequence_numbers: &[u16]);

    fn on_received_rtcp_report_blocks(&self, report_blocks: &[ReportBlockData]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_nack_requests_in_percent() {
        let mut counter = RtcpPacketTypeCounter::default();
        assert_eq!(counter.unique_nack_requests_in_percent(), None);

        counter.nack_requests = 8;
        counter.unique_nack_requests = 7;
        assert_eq!(counter.unique_nack_requests_in_percent(), Some(87));
    }
}
