//! Delivery of the events collected while handling one compound buffer.

use crate::codec::tmmb::TmmbItem;
use crate::observer::{
    RtcpBandwidthObserver, RtcpIntraFrameObserver, RtcpPacketTypeCounter,
    RtcpPacketTypeCounterObserver, RtcpReceiverOwner, RtcpStatistics, RtcpStatisticsObserver,
    TransportFeedbackObserver,
};
use crate::report_block::ReportBlockData;
use rtcp::transport_feedbacks::transport_layer_cc::TransportLayerCc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything observers must hear about one input buffer.
#[derive(Default)]
pub(crate) struct PacketInformation {
    /// Report blocks of all SR/RR sub-packets. `None` when the buffer had
    /// neither.
    pub(crate) report_blocks: Option<Vec<ReportBlockData>>,
    pub(crate) rtt: Option<Duration>,
    /// (statistics, reporter, local source)
    pub(crate) statistics: Vec<(RtcpStatistics, u32, u32)>,
    pub(crate) cname_changes: Vec<(String, u32)>,
    /// (local target, live candidates) for every target a TMMBR changed.
    pub(crate) tmmbr_candidates: Vec<(u32, Vec<TmmbItem>)>,
    pub(crate) request_send_report: bool,
    pub(crate) nacks: Vec<(u32, Vec<u16>)>,
    pub(crate) intra_frame_requests: Vec<u32>,
    pub(crate) slice_losses: Vec<(u32, u8)>,
    pub(crate) reference_pictures: Vec<(u32, u64)>,
    pub(crate) estimated_bitrates: Vec<u64>,
    pub(crate) tmmbr_min_bitrates: Vec<u64>,
    pub(crate) transport_feedbacks: Vec<TransportLayerCc>,
    /// Local streams whose counters changed, in first touch order.
    pub(crate) touched_counters: Vec<u32>,
    pub(crate) counters: Vec<(u32, RtcpPacketTypeCounter)>,
    pub(crate) statistics_observer: Option<Arc<dyn RtcpStatisticsObserver>>,
}

impl PacketInformation {
    pub(crate) fn touch_counter(&mut self, ssrc: u32) {
        if !self.touched_counters.contains(&ssrc) {
            self.touched_counters.push(ssrc);
        }
    }

    pub(crate) fn add_intra_frame_request(&mut self, ssrc: u32) {
        if !self.intra_frame_requests.contains(&ssrc) {
            self.intra_frame_requests.push(ssrc);
        }
    }
}

/// Observers fixed at build time.
#[derive(Default, Clone)]
pub(crate) struct Observers {
    pub(crate) bandwidth: Option<Arc<dyn RtcpBandwidthObserver>>,
    pub(crate) intra_frame: Option<Arc<dyn RtcpIntraFrameObserver>>,
    pub(crate) packet_type_counter: Option<Arc<dyn RtcpPacketTypeCounterObserver>>,
    pub(crate) transport_feedback: Option<Arc<dyn TransportFeedbackObserver>>,
    pub(crate) owner: Option<Arc<dyn RtcpReceiverOwner>>,
}

impl Observers {
    pub(crate) fn notify(&self, info: PacketInformation, now: Instant) {
        if let Some(owner) = &self.owner {
            for (media_ssrc, candidates) in &info.tmmbr_candidates {
                owner.set_tmmbn(*media_ssrc, candidates);
            }
            if info.request_send_report {
                owner.on_request_send_report();
            }
            for (ssrc, sequence_numbers) in &info.nacks {
                owner.on_received_nack(*ssrc, sequence_numbers);
            }
        }

        if let Some(intra_frame) = &self.intra_frame {
            for &ssrc in &info.intra_frame_requests {
                intra_frame.on_received_intra_frame_request(ssrc);
            }
            for &(ssrc, picture_id) in &info.slice_losses {
                intra_frame.on_received_sli(ssrc, picture_id);
            }
            for &(ssrc, picture_id) in &info.reference_pictures {
                intra_frame.on_received_rpsi(ssrc, picture_id);
            }
        }

        if let Some(bandwidth) = &self.bandwidth {
            for &bitrate_bps in info.estimated_bitrates.iter().chain(&info.tmmbr_min_bitrates) {
                bandwidth.on_received_estimated_bitrate(bitrate_bps);
            }
            if let Some(report_blocks) = &info.report_blocks {
                bandwidth.on_received_rtcp_receiver_report(report_blocks, info.rtt, now);
            }
        }

        if let (Some(owner), Some(report_blocks)) = (&self.owner, &info.report_blocks) {
            owner.on_received_rtcp_report_blocks(report_blocks);
        }

        if let Some(transport_feedback) = &self.transport_feedback {
            for feedback in &info.transport_feedbacks {
                transport_feedback.on_transport_feedback(feedback);
            }
        }

        if let Some(statistics_observer) = &info.statistics_observer {
            for (statistics, remote_ssrc, source_ssrc) in &info.statistics {
                statistics_observer.statistics_updated(statistics, *remote_ssrc, *source_ssrc);
            }
            for (cname, ssrc) in &info.cname_changes {
                statistics_observer.cname_changed(cname, *ssrc);
            }
        }

        if let Some(packet_type_counter) = &self.packet_type_counter {
            for (ssrc, counter) in &info.counters {
                packet_type_counter.rtcp_packet_types_counter_updated(*ssrc, counter);
            }
        }
    }
}
