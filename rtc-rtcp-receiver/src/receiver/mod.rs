//! The RTCP receiver and its builder.

mod dispatch;
mod notify;

use crate::cname::CnameTable;
use crate::codec::tmmb::TmmbItem;
use crate::nack::{DEFAULT_NACK_WINDOW, PacketTypeCounters};
use crate::observer::{
    RtcpBandwidthObserver, RtcpIntraFrameObserver, RtcpPacketTypeCounter,
    RtcpPacketTypeCounterObserver, RtcpReceiverOwner, RtcpStatisticsObserver,
    TransportFeedbackObserver,
};
use crate::report_block::{ReportBlockData, ReportBlockStore};
use crate::rtt::{ReceiveTimeInfo, RttEstimator, RttStats};
use crate::time::{SystemInstant, compact_ntp, duration_to_compact_ntp};
use crate::timeout::TimeoutTracker;
use crate::tmmbr::TmmbrNegotiator;
use log::debug;
use notify::Observers;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default nominal RTCP report interval.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(8);

/// Sender information of the last SR received from the configured peer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SenderInfo {
    pub ntp_time: u64,
    pub rtp_time: u32,
    pub packet_count: u32,
    pub octet_count: u32,
    pub arrival_time: Instant,
    /// Local NTP time at arrival.
    pub arrival_ntp: u64,
}

/// Latest XR VoIP metrics block about one of our streams.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct VoipMetric {
    pub ssrc: u32,
    pub loss_rate: u8,
    pub discard_rate: u8,
    pub round_trip_delay: u16,
    pub end_system_delay: u16,
}

#[derive(Debug, Copy, Clone)]
struct LastFir {
    sequence_number: u8,
    time: Instant,
}

/// Builder for the [`RtcpReceiver`].
///
/// # Example
///
/// ```ignore
/// use rtc_rtcp_receiver::RtcpReceiverBuilder;
/// use std::time::{Duration, Instant};
///
/// let receiver = RtcpReceiverBuilder::new()
///     .with_report_interval(Duration::from_secs(1))
///     .with_owner(owner)
///     .build();
/// receiver.set_ssrcs(0x123456, &[]);
/// receiver.set_remote_ssrc(0x10203);
/// receiver.handle_rtcp(Instant::now(), &buf);
/// ```
pub struct RtcpReceiverBuilder {
    system_instant: Option<SystemInstant>,
    report_interval: Duration,
    nack_window: u16,
    rtcp_xr_rrtr_status: bool,
    observers: Observers,
    statistics_observer: Option<Arc<dyn RtcpStatisticsObserver>>,
}

impl Default for RtcpReceiverBuilder {
    fn default() -> Self {
        Self {
            system_instant: None,
            report_interval: DEFAULT_REPORT_INTERVAL,
            nack_window: DEFAULT_NACK_WINDOW,
            rtcp_xr_rrtr_status: false,
            observers: Observers::default(),
            statistics_observer: None,
        }
    }
}

impl RtcpReceiverBuilder {
    /// Create a new builder with default settings.
    ///
    /// Default report interval is 8 seconds, default NACK window is 1024
    /// sequence numbers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchor used to map `Instant`s to NTP time. Defaults to the wallclock
    /// at build time.
    pub fn with_system_instant(mut self, system_instant: SystemInstant) -> Self {
        self.system_instant = Some(system_instant);
        self
    }

    /// Nominal RTCP interval. TMMBR constraints expire after three of them.
    pub fn with_report_interval(mut self, report_interval: Duration) -> Self {
        self.report_interval = report_interval;
        self
    }

    /// Number of recent NACKed sequence numbers remembered per stream to count
    /// unique requests. Must be a power of 2 between 64 and 32768.
    pub fn with_nack_window(mut self, nack_window: u16) -> Self {
        self.nack_window = nack_window;
        self
    }

    pub fn with_rtcp_xr_rrtr_status(mut self, enabled: bool) -> Self {
        self.rtcp_xr_rrtr_status = enabled;
        self
    }

    pub fn with_bandwidth_observer(mut self, observer: Arc<dyn RtcpBandwidthObserver>) -> Self {
        self.observers.bandwidth = Some(observer);
        self
    }

    pub fn with_intra_frame_observer(mut self, observer: Arc<dyn RtcpIntraFrameObserver>) -> Self {
        self.observers.intra_frame = Some(observer);
        self
    }

    pub fn with_packet_type_counter_observer(
        mut self,
        observer: Arc<dyn RtcpPacketTypeCounterObserver>,
    ) -> Self {
        self.observers.packet_type_counter = Some(observer);
        self
    }

    pub fn with_transport_feedback_observer(
        mut self,
        observer: Arc<dyn TransportFeedbackObserver>,
    ) -> Self {
        self.observers.transport_feedback = Some(observer);
        self
    }

    pub fn with_statistics_observer(mut self, observer: Arc<dyn RtcpStatisticsObserver>) -> Self {
        self.statistics_observer = Some(observer);
        self
    }

    pub fn with_owner(mut self, owner: Arc<dyn RtcpReceiverOwner>) -> Self {
        self.observers.owner = Some(owner);
        self
    }

    pub fn build(self) -> RtcpReceiver {
        let state = ReceiverState {
            clock: self.system_instant.unwrap_or_default(),
            main_ssrc: 0,
            registered_ssrcs: HashSet::from([0]),
            remote_ssrc: 0,
            remote_sender_info: None,
            last_received_receiver_report: None,
            report_blocks: ReportBlockStore::default(),
            rtt: RttEstimator::new(self.rtcp_xr_rrtr_status),
            cnames: CnameTable::default(),
            tmmbr: TmmbrNegotiator::new(self.report_interval),
            timeouts: TimeoutTracker::default(),
            counters: PacketTypeCounters::new(self.nack_window),
            last_fir: HashMap::new(),
            last_voip_metric: None,
            statistics_observer: self.statistics_observer,
        };

        RtcpReceiver {
            state: Mutex::new(state),
            observers: self.observers,
        }
    }
}

struct ReceiverState {
    clock: SystemInstant,
    main_ssrc: u32,
    /// Local streams, including `main_ssrc`.
    registered_ssrcs: HashSet<u32>,
    remote_ssrc: u32,
    remote_sender_info: Option<SenderInfo>,
    last_received_receiver_report: Option<Instant>,
    report_blocks: ReportBlockStore,
    rtt: RttEstimator,
    cnames: CnameTable,
    tmmbr: TmmbrNegotiator,
    timeouts: TimeoutTracker,
    counters: PacketTypeCounters,
    /// Reporter -> last forwarded FIR.
    last_fir: HashMap<u32, LastFir>,
    last_voip_metric: Option<VoipMetric>,
    statistics_observer: Option<Arc<dyn RtcpStatisticsObserver>>,
}

impl ReceiverState {
    fn is_owned(&self, ssrc: u32) -> bool {
        self.registered_ssrcs.contains(&ssrc)
    }
}

/// Receive side of an RTCP session.
///
/// Parses compound packets from the remote peer, keeps what they report
/// about our streams and forwards derived events to the configured
/// observers. All methods take `&self`; state is guarded by a single lock
/// that is never held while observers run.
pub struct RtcpReceiver {
    state: Mutex<ReceiverState>,
    observers: Observers,
}

impl RtcpReceiver {
    /// Processes one compound RTCP packet received at `now`.
    ///
    /// Malformed input is logged and dropped. Sub-packets framed before a
    /// framing error are still applied.
    pub fn handle_rtcp(&self, now: Instant, raw: &[u8]) {
        let info = self.state.lock().process_compound(now, raw);
        if let Some(info) = info {
            self.observers.notify(info, now);
        }
    }

    /// Sets the local streams. `main_ssrc` is always owned, `registered_ssrcs`
    /// adds auxiliary streams such as RTX.
    pub fn set_ssrcs(&self, main_ssrc: u32, registered_ssrcs: &[u32]) {
        let old_ssrc = {
            let mut state = self.state.lock();
            let old_ssrc = state.main_ssrc;
            state.main_ssrc = main_ssrc;
            state.registered_ssrcs = registered_ssrcs.iter().copied().collect();
            state.registered_ssrcs.insert(main_ssrc);

            let ReceiverState {
                timeouts,
                registered_ssrcs: owned,
                ..
            } = &mut *state;
            timeouts.retain(|ssrc| owned.contains(&ssrc));
            old_ssrc
        };

        debug!("local ssrcs set, main {} (was {})", main_ssrc, old_ssrc);
        if old_ssrc != main_ssrc {
            if let Some(intra_frame) = &self.observers.intra_frame {
                intra_frame.on_local_ssrc_changed(old_ssrc, main_ssrc);
            }
        }
    }

    pub fn main_ssrc(&self) -> u32 {
        self.state.lock().main_ssrc
    }

    /// Designates the peer whose sender reports are kept. Sender information
    /// of the previous peer is discarded.
    pub fn set_remote_ssrc(&self, remote_ssrc: u32) {
        let mut state = self.state.lock();
        debug!("remote ssrc set to {}", remote_ssrc);
        state.remote_ssrc = remote_ssrc;
        state.remote_sender_info = None;
    }

    pub fn remote_ssrc(&self) -> u32 {
        self.state.lock().remote_ssrc
    }

    /// Enables RTT computation from XR DLRR blocks.
    pub fn set_rtcp_xr_rrtr_status(&self, enabled: bool) {
        self.state.lock().rtt.set_xr_rrtr_enabled(enabled);
    }

    pub fn rtcp_xr_rrtr_status(&self) -> bool {
        self.state.lock().rtt.xr_rrtr_enabled()
    }

    /// Replaces (or with `None` removes) the statistics observer.
    pub fn register_statistics_observer(&self, observer: Option<Arc<dyn RtcpStatisticsObserver>>) {
        self.state.lock().statistics_observer = observer;
    }

    pub fn sender_info_received(&self) -> Option<SenderInfo> {
        self.state.lock().remote_sender_info
    }

    /// Compact NTP of the last sender report from the peer, and the compact
    /// NTP interval since it arrived.
    pub fn last_received_sr(&self, now: Instant) -> Option<(u32, u32)> {
        let state = self.state.lock();
        let sender_info = state.remote_sender_info?;
        Some((
            compact_ntp(sender_info.ntp_time),
            duration_to_compact_ntp(now.saturating_duration_since(sender_info.arrival_time)),
        ))
    }

    /// Arrival of the last report block about one of our streams.
    pub fn last_received_receiver_report(&self) -> Option<Instant> {
        self.state.lock().last_received_receiver_report
    }

    /// Latest report block per (reporter, local stream).
    pub fn statistics_received(&self) -> Vec<ReportBlockData> {
        self.state.lock().report_blocks.snapshot()
    }

    pub fn rtt(&self, remote_ssrc: u32) -> Option<RttStats> {
        self.state.lock().rtt.rtt(remote_ssrc)
    }

    /// RTT from the last DLRR block, cleared by reading it.
    pub fn get_and_reset_xr_rr_rtt(&self) -> Option<Duration> {
        self.state.lock().rtt.get_and_reset_xr_rr_rtt()
    }

    pub fn last_received_xr_reference_time_info(&self, now: Instant) -> Option<ReceiveTimeInfo> {
        self.state.lock().rtt.last_reference_time_info(now)
    }

    pub fn cname(&self, remote_ssrc: u32) -> Option<String> {
        self.state.lock().cnames.get(remote_ssrc).map(str::to_owned)
    }

    /// Live TMMBR constraints on the main stream, oldest first.
    pub fn tmmbr_received(&self, now: Instant) -> Vec<TmmbItem> {
        let state = self.state.lock();
        state.tmmbr.candidates(state.main_ssrc, now)
    }

    /// Live TMMBR constraints on any of our streams, oldest first.
    pub fn tmmbr_received_for(&self, media_ssrc: u32, now: Instant) -> Vec<TmmbItem> {
        self.state.lock().tmmbr.candidates(media_ssrc, now)
    }

    /// Bounding set announced by the remote side through TMMBN, and whether
    /// our main stream is one of its owners.
    pub fn bounding_set(&self) -> (Vec<TmmbItem>, bool) {
        let state = self.state.lock();
        state.tmmbr.bounding_set(state.main_ssrc)
    }

    /// True once when no report block about our streams arrived within three
    /// `report_interval`s.
    pub fn rtcp_rr_timeout(&self, now: Instant, report_interval: Duration) -> bool {
        self.state.lock().timeouts.rr_timeout(now, report_interval)
    }

    /// True once when the extended highest sequence number reported for our
    /// streams did not advance within three `report_interval`s.
    pub fn rtcp_rr_sequence_number_timeout(&self, now: Instant, report_interval: Duration) -> bool {
        self.state
            .lock()
            .timeouts
            .rr_sequence_number_timeout(now, report_interval)
    }

    pub fn packet_type_counter(&self, ssrc: u32) -> Option<RtcpPacketTypeCounter> {
        self.state.lock().counters.get(ssrc)
    }

    pub fn last_voip_metric(&self) -> Option<VoipMetric> {
        self.state.lock().last_voip_metric
    }
}
