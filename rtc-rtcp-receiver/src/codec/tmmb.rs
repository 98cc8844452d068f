//! Temporary Maximum Media Stream Bit Rate Request and Notification
//! (RFC 5104 §4.2.1 and §4.2.2).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                              SSRC                             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! | MxTBR Exp |  MxTBR Mantissa                 |Measured Overhead|
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use super::{PT_RTPFB, SSRC_LENGTH, SubPacket, read_u32};
use crate::error::{Error, Result};

pub(crate) const FORMAT_TMMBR: u8 = 3;
pub(crate) const FORMAT_TMMBN: u8 = 4;

const COMMON_FEEDBACK_LENGTH: usize = 2 * SSRC_LENGTH;
const FCI_ENTRY_LENGTH: usize = 8;

const EXPONENT_SHIFT: u32 = 26;
const MANTISSA_SHIFT: u32 = 9;
const MANTISSA_MASK: u32 = 0x1ffff;
const OVERHEAD_MASK: u32 = 0x1ff;

/// One bandwidth constraint tuple.
///
/// In a decoded request or notification `ssrc` is the media source the
/// constraint applies to. Once stored by the receiver it is the SSRC of the
/// peer that proposed the constraint.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TmmbItem {
    pub ssrc: u32,
    pub bitrate_bps: u64,
    pub packet_overhead: u16,
}

impl TmmbItem {
    fn unmarshal(buf: &[u8]) -> Result<Self> {
        let ssrc = read_u32(buf, 0);
        let compact = read_u32(buf, SSRC_LENGTH);

        let exponent = compact >> EXPONENT_SHIFT;
        let mantissa = ((compact >> MANTISSA_SHIFT) & MANTISSA_MASK) as u64;
        let bitrate_bps = mantissa << exponent;
        if bitrate_bps >> exponent != mantissa {
            return Err(Error::TmmbBitrateOverflow);
        }

        Ok(TmmbItem {
            ssrc,
            bitrate_bps,
            packet_overhead: (compact & OVERHEAD_MASK) as u16,
        })
    }
}

/// Decoded TMMBR or TMMBN packet.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct TmmbFeedback {
    pub(crate) sender_ssrc: u32,
    /// Zero unless a relay forwards the request on behalf of this source.
    pub(crate) media_ssrc: u32,
    pub(crate) items: Vec<TmmbItem>,
}

pub(crate) fn unmarshal_tmmbr(sub_packet: &SubPacket) -> Result<TmmbFeedback> {
    let feedback = unmarshal(sub_packet, FORMAT_TMMBR)?;
    if feedback.items.is_empty() {
        return Err(Error::TmmbrNoEntry);
    }
    Ok(feedback)
}

pub(crate) fn unmarshal_tmmbn(sub_packet: &SubPacket) -> Result<TmmbFeedback> {
    unmarshal(sub_packet, FORMAT_TMMBN)
}

fn unmarshal(sub_packet: &SubPacket, format: u8) -> Result<TmmbFeedback> {
    if sub_packet.packet_type != PT_RTPFB || sub_packet.format != format {
        return Err(Error::UnexpectedPacketType {
            packet_type: sub_packet.packet_type,
            format: sub_packet.format,
        });
    }

    let payload = sub_packet.payload()?;
    if payload.len() < COMMON_FEEDBACK_LENGTH {
        return Err(Error::FeedbackTooShort);
    }

    let fci = &payload[COMMON_FEEDBACK_LENGTH..];
    if fci.len() % FCI_ENTRY_LENGTH != 0 {
        return Err(Error::TmmbInvalidLength(fci.len()));
    }

    let items = fci
        .chunks_exact(FCI_ENTRY_LENGTH)
        .map(TmmbItem::unmarshal)
        .collect::<Result<Vec<_>>>()?;

    Ok(TmmbFeedback {
        sender_ssrc: read_u32(payload, 0),
        media_ssrc: read_u32(payload, SSRC_LENGTH),
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CompoundPacketReader;

    fn tmmb_packet(format: u8, sender_ssrc: u32, entries: &[(u32, u32, u32, u32)]) -> Vec<u8> {
        relayed_tmmb_packet(format, sender_ssrc, 0, entries)
    }

    fn relayed_tmmb_packet(
        format: u8,
        sender_ssrc: u32,
        media_ssrc: u32,
        entries: &[(u32, u32, u32, u32)],
    ) -> Vec<u8> {
        let words = 2 + entries.len() * 2;
        let mut raw = vec![0x80 | format, PT_RTPFB, 0, words as u8];
        raw.extend_from_slice(&sender_ssrc.to_be_bytes());
        raw.extend_from_slice(&media_ssrc.to_be_bytes());
        for &(ssrc, exponent, mantissa, overhead) in entries {
            raw.extend_from_slice(&ssrc.to_be_bytes());
            let compact = (exponent << 26) | (mantissa << 9) | overhead;
            raw.extend_from_slice(&compact.to_be_bytes());
        }
        raw
    }

    fn sub_packet(raw: &[u8]) -> SubPacket {
        CompoundPacketReader::new(raw).next().unwrap().unwrap()
    }

    #[test]
    fn test_tmmbr_unmarshal() {
        // 300000 = 75000 << 2
        let raw = tmmb_packet(FORMAT_TMMBR, 0x10203, &[(0x123456, 2, 75000, 40)]);
        let tmmbr = unmarshal_tmmbr(&sub_packet(&raw)).unwrap();
        assert_eq!(tmmbr.sender_ssrc, 0x10203);
        assert_eq!(tmmbr.media_ssrc, 0);
        assert_eq!(
            tmmbr.items,
            vec![TmmbItem {
                ssrc: 0x123456,
                bitrate_bps: 300000,
                packet_overhead: 40,
            }]
        );
    }

    #[test]
    fn test_tmmbr_relayed_keeps_media_ssrc() {
        let raw = relayed_tmmb_packet(FORMAT_TMMBR, 0x10203, 0x777, &[(0x123456, 0, 1000, 0)]);
        let tmmbr = unmarshal_tmmbr(&sub_packet(&raw)).unwrap();
        assert_eq!(tmmbr.sender_ssrc, 0x10203);
        assert_eq!(tmmbr.media_ssrc, 0x777);
    }

    #[test]
    fn test_tmmbr_requires_entry() {
        let raw = tmmb_packet(FORMAT_TMMBR, 1, &[]);
        assert_eq!(unmarshal_tmmbr(&sub_packet(&raw)), Err(Error::TmmbrNoEntry));
    }

    #[test]
    fn test_tmmbn_may_be_empty() {
        let raw = tmmb_packet(FORMAT_TMMBN, 1, &[]);
        let tmmbn = unmarshal_tmmbn(&sub_packet(&raw)).unwrap();
        assert!(tmmbn.items.is_empty());
    }

    #[test]
    fn test_tmmb_partial_entry() {
        let mut raw = tmmb_packet(FORMAT_TMMBN, 1, &[(2, 0, 1, 0)]);
        raw.extend_from_slice(&[0, 0, 0, 3]);
        raw[3] = 5;
        assert_eq!(
            unmarshal_tmmbn(&sub_packet(&raw)),
            Err(Error::TmmbInvalidLength(12))
        );
    }

    #[test]
    fn test_tmmb_bitrate_overflow() {
        let raw = tmmb_packet(FORMAT_TMMBR, 1, &[(2, 63, 0x1ffff, 0)]);
        assert_eq!(
            unmarshal_tmmbr(&sub_packet(&raw)),
            Err(Error::TmmbBitrateOverflow)
        );
    }

    #[test]
    fn test_tmmb_wrong_format() {
        let raw = tmmb_packet(FORMAT_TMMBN, 1, &[(2, 0, 1, 0)]);
        assert_eq!(
            unmarshal_tmmbr(&sub_packet(&raw)),
            Err(Error::UnexpectedPacketType {
                packet_type: PT_RTPFB,
                format: FORMAT_TMMBN,
            })
        );
    }
}
