//! Routing of decoded sub-packets to the per-feature state.

use super::notify::PacketInformation;
use super::{LastFir, ReceiverState, SenderInfo, VoipMetric};
use crate::codec::rpsi::{FORMAT_RPSI, Rpsi, unmarshal_rpsi};
use crate::codec::tmmb::{FORMAT_TMMBN, FORMAT_TMMBR, TmmbFeedback, unmarshal_tmmbn, unmarshal_tmmbr};
use crate::codec::{CompoundPacketReader, PT_PSFB, PT_RTPFB, SubPacket};
use crate::error::Result;
use crate::tmmbr::min_bitrate;
use log::{debug, trace, warn};
use rtcp::extended_report::{
    DLRRReportBlock, ExtendedReport, ReceiverReferenceTimeReportBlock, VoIPMetricsReportBlock,
};
use rtcp::goodbye::Goodbye;
use rtcp::packet::Packet;
use rtcp::payload_feedbacks::full_intra_request::FullIntraRequest;
use rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use rtcp::payload_feedbacks::receiver_estimated_maximum_bitrate::ReceiverEstimatedMaximumBitrate;
use rtcp::payload_feedbacks::slice_loss_indication::SliceLossIndication;
use rtcp::receiver_report::ReceiverReport;
use rtcp::reception_report::ReceptionReport;
use rtcp::sender_report::SenderReport;
use rtcp::source_description::{SdesType, SourceDescription};
use rtcp::transport_feedbacks::rapid_resynchronization_request::RapidResynchronizationRequest;
use rtcp::transport_feedbacks::transport_layer_cc::TransportLayerCc;
use rtcp::transport_feedbacks::transport_layer_nack::TransportLayerNack;
use std::time::{Duration, Instant};

/// Shortest interval between two forwarded FIRs from the same reporter.
const MIN_FIR_INTERVAL: Duration = Duration::from_millis(17);

impl ReceiverState {
    /// Applies one compound buffer. Returns `None` when no sub-packet could
    /// be decoded.
    pub(super) fn process_compound(&mut self, now: Instant, raw: &[u8]) -> Option<PacketInformation> {
        let mut info = PacketInformation::default();
        let mut decoded = 0usize;

        for sub_packet in CompoundPacketReader::new(raw) {
            let sub_packet = match sub_packet {
                Ok(sub_packet) => sub_packet,
                Err(err) => {
                    warn!("dropping rest of rtcp compound packet: {}", err);
                    break;
                }
            };

            match self.handle_sub_packet(now, &sub_packet, &mut info) {
                Ok(()) => decoded += 1,
                Err(err) => warn!(
                    "dropping rtcp packet type {} format {}: {}",
                    sub_packet.packet_type, sub_packet.format, err
                ),
            }
        }

        if decoded == 0 {
            return None;
        }

        if info.touched_counters.is_empty() {
            info.touched_counters.push(self.main_ssrc);
        }
        info.counters = info
            .touched_counters
            .iter()
            .map(|&ssrc| (ssrc, self.counters.get(ssrc).unwrap_or_default()))
            .collect();

        if !info.statistics.is_empty() || !info.cname_changes.is_empty() {
            info.statistics_observer = self.statistics_observer.clone();
        }

        Some(info)
    }

    fn handle_sub_packet(
        &mut self,
        now: Instant,
        sub_packet: &SubPacket,
        info: &mut PacketInformation,
    ) -> Result<()> {
        match (sub_packet.packet_type, sub_packet.format) {
            (PT_RTPFB, FORMAT_TMMBR) => {
                let tmmbr = unmarshal_tmmbr(sub_packet)?;
                self.handle_tmmbr(now, tmmbr, info);
            }
            (PT_RTPFB, FORMAT_TMMBN) => {
                let tmmbn = unmarshal_tmmbn(sub_packet)?;
                self.handle_tmmbn(tmmbn);
            }
            (PT_PSFB, FORMAT_RPSI) => {
                let rpsi = unmarshal_rpsi(sub_packet)?;
                self.handle_rpsi(rpsi, info);
            }
            _ => {
                let packet = sub_packet.decode()?;
                if !self.handle_packet(now, packet.as_ref(), info) {
                    trace!(
                        "skipping rtcp packet type {} format {}",
                        sub_packet.packet_type, sub_packet.format
                    );
                }
            }
        }
        Ok(())
    }

    fn handle_packet(&mut self, now: Instant, packet: &dyn Packet, info: &mut PacketInformation) -> bool {
        let packet = packet.as_any();
        if let Some(sr) = packet.downcast_ref::<SenderReport>() {
            self.handle_sender_report(now, sr, info);
        } else if let Some(rr) = packet.downcast_ref::<ReceiverReport>() {
            self.handle_receiver_report(now, rr, info);
        } else if let Some(sdes) = packet.downcast_ref::<SourceDescription>() {
            self.handle_source_description(sdes, info);
        } else if let Some(bye) = packet.downcast_ref::<Goodbye>() {
            self.handle_goodbye(bye);
        } else if let Some(xr) = packet.downcast_ref::<ExtendedReport>() {
            self.handle_extended_report(now, xr);
        } else if let Some(pli) = packet.downcast_ref::<PictureLossIndication>() {
            self.handle_pli(now, pli, info);
        } else if let Some(fir) = packet.downcast_ref::<FullIntraRequest>() {
            self.handle_fir(now, fir, info);
        } else if let Some(sli) = packet.downcast_ref::<SliceLossIndication>() {
            self.handle_sli(sli, info);
        } else if let Some(remb) = packet.downcast_ref::<ReceiverEstimatedMaximumBitrate>() {
            info.estimated_bitrates.push(remb.bitrate as u64);
        } else if let Some(nack) = packet.downcast_ref::<TransportLayerNack>() {
            self.handle_nack(now, nack, info);
        } else if let Some(rrr) = packet.downcast_ref::<RapidResynchronizationRequest>() {
            if self.is_owned(rrr.media_ssrc) {
                info.request_send_report = true;
            }
        } else if let Some(tcc) = packet.downcast_ref::<TransportLayerCc>() {
            if self.is_owned(tcc.media_ssrc) {
                info.transport_feedbacks.push(tcc.clone());
            }
        } else {
            return false;
        }
        true
    }

    fn handle_sender_report(&mut self, now: Instant, sr: &SenderReport, info: &mut PacketInformation) {
        trace!("received sr from {} with {} blocks", sr.ssrc, sr.reports.len());
        info.report_blocks.get_or_insert_with(Vec::new);

        if sr.ssrc == self.remote_ssrc {
            self.remote_sender_info = Some(SenderInfo {
                ntp_time: sr.ntp_time,
                rtp_time: sr.rtp_time,
                packet_count: sr.packet_count,
                octet_count: sr.octet_count,
                arrival_time: now,
                arrival_ntp: self.clock.ntp(now),
            });
        } else {
            debug!("sr from {} is not from the configured peer", sr.ssrc);
        }

        for report in &sr.reports {
            self.handle_report_block(now, sr.ssrc, report, info);
        }
    }

    fn handle_receiver_report(&mut self, now: Instant, rr: &ReceiverReport, info: &mut PacketInformation) {
        trace!("received rr from {} with {} blocks", rr.ssrc, rr.reports.len());
        info.report_blocks.get_or_insert_with(Vec::new);

        for report in &rr.reports {
            self.handle_report_block(now, rr.ssrc, report, info);
        }
    }

    fn handle_report_block(
        &mut self,
        now: Instant,
        remote_ssrc: u32,
        report: &ReceptionReport,
        info: &mut PacketInformation,
    ) {
        if !self.is_owned(report.ssrc) {
            debug!(
                "report block from {} about {} is not for us",
                remote_ssrc, report.ssrc
            );
            return;
        }

        let data = self.report_blocks.update(remote_ssrc, report, now);
        self.last_received_receiver_report = Some(now);
        self.timeouts
            .on_report_block(report.ssrc, report.last_sequence_number, now);

        let compact_now = self.clock.compact_ntp(now);
        if let Some(rtt) =
            self.rtt
                .on_report_block(remote_ssrc, report.last_sender_report, report.delay, compact_now)
        {
            info.rtt = Some(rtt);
        }

        info.statistics
            .push((data.statistics(), remote_ssrc, report.ssrc));
        if let Some(report_blocks) = info.report_blocks.as_mut() {
            report_blocks.push(data);
        }
    }

    fn handle_source_description(&mut self, sdes: &SourceDescription, info: &mut PacketInformation) {
        for chunk in &sdes.chunks {
            for item in &chunk.items {
                if !matches!(item.sdes_type, SdesType::SdesCname) {
                    continue;
                }
                let cname = String::from_utf8_lossy(&item.text).into_owned();
                trace!("cname of {} is {}", chunk.source, cname);
                self.cnames.set(chunk.source, cname.clone());
                info.cname_changes.push((cname, chunk.source));
            }
        }
    }

    fn handle_goodbye(&mut self, bye: &Goodbye) {
        for &source in &bye.sources {
            debug!("bye from {}", source);
            self.remove_reporter(source);
        }
    }

    /// Drops everything learned from `remote_ssrc`.
    pub(super) fn remove_reporter(&mut self, remote_ssrc: u32) {
        self.cnames.remove(remote_ssrc);
        self.report_blocks.remove_reporter(remote_ssrc);
        self.rtt.remove_reporter(remote_ssrc);
        self.tmmbr.remove_proposer(remote_ssrc);
        self.last_fir.remove(&remote_ssrc);
    }

    fn handle_extended_report(&mut self, now: Instant, xr: &ExtendedReport) {
        for block in &xr.reports {
            let block = block.as_any();
            if let Some(rrtr) = block.downcast_ref::<ReceiverReferenceTimeReportBlock>() {
                self.rtt
                    .on_receiver_reference_time(xr.sender_ssrc, rrtr.ntp_timestamp, now);
            } else if let Some(dlrr) = block.downcast_ref::<DLRRReportBlock>() {
                let compact_now = self.clock.compact_ntp(now);
                for sub_block in &dlrr.reports {
                    if !self.is_owned(sub_block.ssrc) {
                        debug!("dlrr about {} is not for us", sub_block.ssrc);
                        continue;
                    }
                    if let Some(rtt) = self.rtt.on_dlrr(sub_block.last_rr, sub_block.dlrr, compact_now)
                    {
                        trace!("xr rtt {:?} from {}", rtt, xr.sender_ssrc);
                    }
                }
            } else if let Some(voip) = block.downcast_ref::<VoIPMetricsReportBlock>() {
                if self.is_owned(voip.ssrc) {
                    self.last_voip_metric = Some(VoipMetric {
                        ssrc: voip.ssrc,
                        loss_rate: voip.loss_rate,
                        discard_rate: voip.discard_rate,
                        round_trip_delay: voip.round_trip_delay,
                        end_system_delay: voip.end_system_delay,
                    });
                }
            } else {
                trace!("skipping xr block from {}", xr.sender_ssrc);
            }
        }
    }

    fn handle_pli(&mut self, now: Instant, pli: &PictureLossIndication, info: &mut PacketInformation) {
        if !self.is_owned(pli.media_ssrc) {
            debug!("pli about {} is not for us", pli.media_ssrc);
            return;
        }
        self.counters.on_pli(pli.media_ssrc, now);
        info.touch_counter(pli.media_ssrc);
        info.add_intra_frame_request(pli.media_ssrc);
    }

    fn handle_fir(&mut self, now: Instant, fir: &FullIntraRequest, info: &mut PacketInformation) {
        for entry in &fir.fir {
            if !self.is_owned(entry.ssrc) {
                debug!("fir about {} is not for us", entry.ssrc);
                continue;
            }
            self.counters.on_fir(entry.ssrc, now);
            info.touch_counter(entry.ssrc);

            if let Some(last) = self.last_fir.get(&fir.sender_ssrc) {
                if last.sequence_number == entry.sequence_number {
                    trace!("repeated fir {} from {}", entry.sequence_number, fir.sender_ssrc);
                    continue;
                }
                if now.saturating_duration_since(last.time) < MIN_FIR_INTERVAL {
                    trace!("fir from {} too soon after previous one", fir.sender_ssrc);
                    continue;
                }
            }
            self.last_fir.insert(
                fir.sender_ssrc,
                LastFir {
                    sequence_number: entry.sequence_number,
                    time: now,
                },
            );
            info.add_intra_frame_request(entry.ssrc);
        }
    }

    fn handle_sli(&self, sli: &SliceLossIndication, info: &mut PacketInformation) {
        if !self.is_owned(sli.media_ssrc) {
            debug!("sli about {} is not for us", sli.media_ssrc);
            return;
        }
        for entry in &sli.sli_entries {
            info.slice_losses.push((sli.media_ssrc, entry.picture));
        }
    }

    fn handle_rpsi(&self, rpsi: Rpsi, info: &mut PacketInformation) {
        if !self.is_owned(rpsi.media_ssrc) {
            debug!("rpsi about {} is not for us", rpsi.media_ssrc);
            return;
        }
        trace!(
            "rpsi from {} for payload type {}",
            rpsi.sender_ssrc, rpsi.payload_type
        );
        info.reference_pictures
            .push((rpsi.media_ssrc, rpsi.picture_id));
    }

    fn handle_nack(&mut self, now: Instant, nack: &TransportLayerNack, info: &mut PacketInformation) {
        if !self.is_owned(nack.media_ssrc) {
            debug!("nack about {} is not for us", nack.media_ssrc);
            return;
        }

        let mut sequence_numbers = vec![];
        for pair in &nack.nacks {
            sequence_numbers.push(pair.packet_id);
            for i in 0..16u16 {
                if pair.lost_packets & (1 << i) != 0 {
                    sequence_numbers.push(pair.packet_id.wrapping_add(i + 1));
                }
            }
        }

        self.counters
            .on_nack(nack.media_ssrc, &sequence_numbers, now);
        info.touch_counter(nack.media_ssrc);
        info.nacks.push((nack.media_ssrc, sequence_numbers));
    }

    fn handle_tmmbr(&mut self, now: Instant, tmmbr: TmmbFeedback, info: &mut PacketInformation) {
        // a relay names the original requester in the media ssrc field
        let proposer_ssrc = if tmmbr.media_ssrc != 0 {
            tmmbr.media_ssrc
        } else {
            tmmbr.sender_ssrc
        };

        let mut targets = vec![];
        for item in tmmbr.items {
            if !self.is_owned(item.ssrc) {
                debug!("tmmbr about {} is not for us", item.ssrc);
                continue;
            }
            if self.tmmbr.insert(item.ssrc, proposer_ssrc, item, now) && !targets.contains(&item.ssrc)
            {
                targets.push(item.ssrc);
            }
        }

        for media_ssrc in targets {
            let candidates = self.tmmbr.candidates(media_ssrc, now);
            info.tmmbr_min_bitrates.extend(min_bitrate(&candidates));
            info.tmmbr_candidates.push((media_ssrc, candidates));
        }
    }

    fn handle_tmmbn(&mut self, tmmbn: TmmbFeedback) {
        trace!(
            "bounding set of {} entries from {}",
            tmmbn.items.len(),
            tmmbn.sender_ssrc
        );
        self.tmmbr.set_bounding_set(tmmbn.sender_ssrc, tmmbn.items);
    }
}
