//! RTC RTCP Receiver - Receive side RTCP processing for RTP sessions.
//!
//! This crate consumes compound RTCP packets sent by a remote peer, keeps the
//! state they carry about our local streams and forwards derived events to
//! narrow observer traits. Packets are decoded with the [`rtcp`] crate;
//! the feedback formats it keeps as raw packets (TMMBR, TMMBN, RPSI) are
//! decoded here.
//!
//! # Handled Packets
//!
//! | Packet | Effect |
//! |--------|--------|
//! | SR / RR | Report blocks about our streams, round-trip time, sender info of the configured peer |
//! | SDES | CNAME per remote source |
//! | BYE | Drops all state learned from the listed sources |
//! | XR | RRTR reference time, DLRR round-trip time, VoIP metrics |
//! | PLI / FIR | Intra frame requests, FIR de-duplication |
//! | SLI / RPSI | Slice loss and reference picture indications |
//! | REMB | Estimated bitrate |
//! | TMMBR / TMMBN | Bandwidth constraint candidates and the announced bounding set |
//! | NACK | Retransmission requests and unique request accounting |
//! | RRR | Sender report requests |
//! | Transport-wide CC | Forwarded to the transport feedback observer |
//!
//! # Observers
//!
//! | Trait | Receives |
//! |-------|----------|
//! | [`RtcpReceiverOwner`] | TMMBR candidates, send report requests, NACK lists, report blocks |
//! | [`RtcpBandwidthObserver`] | Estimated bitrate, report blocks with RTT |
//! | [`RtcpIntraFrameObserver`] | PLI/FIR, SLI, RPSI, local SSRC changes |
//! | [`RtcpStatisticsObserver`] | Per block statistics, CNAME changes |
//! | [`RtcpPacketTypeCounterObserver`] | Per stream feedback counters |
//! | [`TransportFeedbackObserver`] | Transport-wide congestion control feedback |
//!
//! Observers are called after the receiver released its internal lock, in
//! the order listed above for the owner and then the remaining traits.
//!
//! # Time
//!
//! The receiver never reads a clock. Every time dependent call takes the
//! caller's `now`, and a [`SystemInstant`] anchor maps `Instant`s to NTP.
//!
//! # Quick Start
//!
//! ```ignore
//! use rtc_rtcp_receiver::RtcpReceiverBuilder;
//! use std::sync::Arc;
//! use std::time::{Duration, Instant};
//!
//! let receiver = RtcpReceiverBuilder::new()
//!     .with_report_interval(Duration::from_secs(1))
//!     .with_bandwidth_observer(Arc::new(bandwidth))
//!     .with_owner(Arc::new(rtp_module))
//!     .build();
//!
//! receiver.set_ssrcs(0x123456, &[0x123457]);
//! receiver.set_remote_ssrc(0x10203);
//!
//! receiver.handle_rtcp(Instant::now(), &buf);
//! if let Some(rtt) = receiver.rtt(0x10203) {
//!     println!("rtt {:?}", rtt.last);
//! }
//! ```
#![warn(rust_2018_idioms)]

mod cname;
mod codec;
mod error;
mod nack;
mod observer;
mod receiver;
mod report_block;
mod rtt;
mod time;
mod timeout;
mod tmmbr;

pub use codec::tmmb::TmmbItem;
pub use error::{Error, Result};
pub use nack::DEFAULT_NACK_WINDOW;
pub use observer::{
    RtcpBandwidthObserver, RtcpIntraFrameObserver, RtcpPacketTypeCounter,
    RtcpPacketTypeCounterObserver, RtcpReceiverOwner, RtcpStatistics, RtcpStatisticsObserver,
    TransportFeedbackObserver,
};
pub use receiver::{
    DEFAULT_REPORT_INTERVAL, RtcpReceiver, RtcpReceiverBuilder, SenderInfo, VoipMetric,
};
pub use report_block::ReportBlockData;
pub use rtt::{ReceiveTimeInfo, RttStats, rtt_from_report};
pub use time::{
    MIN_RTT, SystemInstant, compact_ntp, compact_ntp_rtt_to_duration, duration_to_compact_ntp,
};
pub use timeout::RR_TIMEOUT_INTERVALS;
pub use tmmbr::TMMBR_TIMEOUT_INTERVALS;
