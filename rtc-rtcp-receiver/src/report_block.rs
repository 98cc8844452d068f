use crate::observer::RtcpStatistics;
use rtcp::reception_report::ReceptionReport;
use std::collections::HashMap;
use std::time::Instant;

/// Latest reception report block a remote reporter sent about one of our
/// local streams.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReportBlockData {
    /// SSRC of the peer that sent the report.
    pub remote_ssrc: u32,
    /// Local stream the report is about.
    pub source_ssrc: u32,
    pub fraction_lost: u8,
    pub cumulative_lost: u32,
    pub extended_highest_sequence_number: u32,
    pub jitter: u32,
    pub last_sender_report: u32,
    pub delay_since_last_sender_report: u32,
    pub arrival_time: Instant,
}

impl ReportBlockData {
    pub(crate) fn new(remote_ssrc: u32, report: &ReceptionReport, arrival_time: Instant) -> Self {
        Self {
            remote_ssrc,
            source_ssrc: report.ssrc,
            fraction_lost: report.fraction_lost,
            cumulative_lost: report.total_lost,
            extended_highest_sequence_number: report.last_sequence_number,
            jitter: report.jitter,
            last_sender_report: report.last_sender_report,
            delay_since_last_sender_report: report.delay,
            arrival_time,
        }
    }

    pub fn statistics(&self) -> RtcpStatistics {
        RtcpStatistics {
            fraction_lost: self.fraction_lost,
            cumulative_lost: self.cumulative_lost,
            extended_highest_sequence_number: self.extended_highest_sequence_number,
            jitter: self.jitter,
        }
    }
}

/// Report blocks keyed by (remote reporter, local source).
#[derive(Debug, Default)]
pub(crate) struct ReportBlockStore {
    blocks: HashMap<(u32, u32), ReportBlockData>,
}

impl ReportBlockStore {
    pub(crate) fn update(
        &mut self,
        remote_ssrc: u32,
        report: &ReceptionReport,
        now: Instant,
    ) -> ReportBlockData {
        let data = ReportBlockData::new(remote_ssrc, report, now);
        self.blocks.insert((remote_ssrc, report.ssrc), data);
        data
    }

    pub(crate) fn snapshot(&self) -> Vec<ReportBlockData> {
        self.blocks.values().copied().collect()
    }

    /// Drops every block sent by `remote_ssrc`, returning how many were held.
    pub(crate) fn remove_reporter(&mut self, remote_ssrc: u32) -> usize {
        let before = self.blocks.len();
        self.blocks.retain(|&(remote, _), _| remote != remote_ssrc);
        before - self.blocks.len()
    }
}
