//! Framing of compound RTCP buffers.
//!
//! A compound buffer is split on the common header length field. Each framed
//! sub-packet is then decoded on its own, either through
//! [`rtcp::packet::unmarshal`] or, for feedback formats the `rtcp` crate
//! keeps as raw packets, through [`tmmb`] and [`rpsi`].
//!
//! A framing error ends iteration because the position of the next header is
//! unknown. A decoding error only affects the sub-packet it occurred in.
//!
//! Bodies whose inner lengths the `rtcp` codec does not check itself (FIR
//! entries, XR block lengths) are validated here before decoding.

pub(crate) mod rpsi;
pub(crate) mod tmmb;

use crate::error::{Error, Result};
use bytes::Bytes;
use rtcp::packet::Packet;

pub(crate) const HEADER_LENGTH: usize = 4;
pub(crate) const SSRC_LENGTH: usize = 4;

pub(crate) const PT_RTPFB: u8 = 205;
pub(crate) const PT_PSFB: u8 = 206;
const PT_XR: u8 = 207;

const FORMAT_FIR: u8 = 4;
const FIR_ENTRY_LENGTH: usize = 8;
const XR_BLOCK_HEADER_LENGTH: usize = 4;
/// Largest XR block length whose byte size still fits the wire's u16.
const MAX_XR_BLOCK_LENGTH: usize = 0x3ffe;

const RTP_VERSION: u8 = 2;
const VERSION_SHIFT: u8 = 6;
const PADDING_MASK: u8 = 0x20;
const COUNT_MASK: u8 = 0x1f;

/// One framed RTCP packet of a compound buffer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SubPacket {
    pub(crate) packet_type: u8,
    /// Report count or feedback message type, depending on the packet type.
    pub(crate) format: u8,
    pub(crate) raw: Bytes,
}

impl SubPacket {
    /// Decodes the sub-packet with the `rtcp` codec.
    pub(crate) fn decode(&self) -> Result<Box<dyn Packet>> {
        match (self.packet_type, self.format) {
            (PT_PSFB, FORMAT_FIR) => self.check_fir()?,
            (PT_XR, _) => self.check_extended_report()?,
            _ => {}
        }

        let mut raw = self.raw.clone();
        let packet = rtcp::packet::unmarshal(&mut raw)?
            .into_iter()
            .next()
            .ok_or(Error::EmptySubPacket)?;
        let packet: Box<dyn Packet> = packet;
        Ok(packet)
    }

    /// FIR entries must fill the body exactly, with and without padding.
    fn check_fir(&self) -> Result<()> {
        let payload = self.payload()?;
        let body = self.raw.len() - HEADER_LENGTH;
        if payload.len() < 2 * SSRC_LENGTH {
            return Err(Error::FeedbackTooShort);
        }
        for fci in [payload.len() - 2 * SSRC_LENGTH, body - 2 * SSRC_LENGTH] {
            if fci % FIR_ENTRY_LENGTH != 0 {
                return Err(Error::FirInvalidLength(fci));
            }
        }
        Ok(())
    }

    /// Report blocks must tile the body, with and without padding.
    fn check_extended_report(&self) -> Result<()> {
        let payload = self.payload()?;
        if payload.len() < SSRC_LENGTH {
            return Err(Error::FeedbackTooShort);
        }
        check_xr_blocks(&payload[SSRC_LENGTH..])?;
        check_xr_blocks(&self.raw[HEADER_LENGTH + SSRC_LENGTH..])
    }

    /// Bytes following the common header, without trailing padding.
    pub(crate) fn payload(&self) -> Result<&[u8]> {
        let mut end = self.raw.len();
        if self.raw[0] & PADDING_MASK != 0 {
            let padding = self.raw[end - 1] as usize;
            if padding == 0 || HEADER_LENGTH + padding > end {
                return Err(Error::InvalidPadding);
            }
            end -= padding;
        }
        Ok(&self.raw[HEADER_LENGTH..end])
    }
}

/// Iterator over the framed sub-packets of a compound buffer.
///
/// Yields at most one error, after which iteration stops.
pub(crate) struct CompoundPacketReader {
    buf: Bytes,
    failed: bool,
}

impl CompoundPacketReader {
    pub(crate) fn new(raw: &[u8]) -> Self {
        Self {
            buf: Bytes::copy_from_slice(raw),
            failed: false,
        }
    }

    fn next_sub_packet(&mut self) -> Result<SubPacket> {
        if self.buf.len() < HEADER_LENGTH {
            return Err(Error::HeaderTooShort);
        }

        let first = self.buf[0];
        let version = first >> VERSION_SHIFT;
        if version != RTP_VERSION {
            return Err(Error::BadVersion(version));
        }

        let length = (u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize + 1) * 4;
        if length > self.buf.len() {
            return Err(Error::LengthExceedsBuffer {
                length,
                remaining: self.buf.len(),
            });
        }

        let raw = self.buf.split_to(length);
        Ok(SubPacket {
            packet_type: raw[1],
            format: first & COUNT_MASK,
            raw,
        })
    }
}

impl Iterator for CompoundPacketReader {
    type Item = Result<SubPacket>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.buf.is_empty() {
            return None;
        }

        let next = self.next_sub_packet();
        if next.is_err() {
            self.failed = true;
        }
        Some(next)
    }
}

fn check_xr_blocks(mut blocks: &[u8]) -> Result<()> {
    while !blocks.is_empty() {
        if blocks.len() < XR_BLOCK_HEADER_LENGTH {
            return Err(Error::XrBlockTruncated {
                length: XR_BLOCK_HEADER_LENGTH,
                remaining: blocks.len(),
            });
        }
        let block_length = u16::from_be_bytes([blocks[2], blocks[3]]) as usize;
        let length = XR_BLOCK_HEADER_LENGTH + block_length * 4;
        if block_length > MAX_XR_BLOCK_LENGTH || length > blocks.len() {
            return Err(Error::XrBlockTruncated {
                length,
                remaining: blocks.len(),
            });
        }
        blocks = &blocks[length..];
    }
    Ok(())
}

pub(crate) fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_splits_compound() {
        let raw = [
            0x80, 201, 0, 1, 0, 0, 0, 1, // RR without blocks
            0x81, 203, 0, 1, 0, 0, 0, 1, // BYE with one source
        ];
        let packets: Vec<_> = CompoundPacketReader::new(&raw)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].packet_type, 201);
        assert_eq!(packets[0].format, 0);
        assert_eq!(packets[1].packet_type, 203);
        assert_eq!(packets[1].format, 1);
        assert_eq!(packets[1].raw.len(), 8);
    }

    #[test]
    fn test_reader_rejects_bad_version() {
        let mut reader = CompoundPacketReader::new(&[0, 0, 0, 0]);
        assert_eq!(reader.next(), Some(Err(Error::BadVersion(0))));
        assert_eq!(reader.next(), None);
    }

    #[test]
    fn test_reader_stops_after_truncated_packet() {
        let raw = [
            0x80, 201, 0, 1, 0, 0, 0, 1, // RR without blocks
            0x80, 201, 0, 6, 0, 0, 0, 1, // claims 28 bytes
            0x80, 201, 0, 1, 0, 0, 0, 1,
        ];
        let mut reader = CompoundPacketReader::new(&raw);
        assert!(matches!(reader.next(), Some(Ok(_))));
        assert!(matches!(
            reader.next(),
            Some(Err(Error::LengthExceedsBuffer { length: 28, .. }))
        ));
        assert_eq!(reader.next(), None);
    }

    #[test]
    fn test_reader_short_tail() {
        let raw = [0x80, 201, 0, 1, 0, 0, 0, 1, 0x80, 201];
        let mut reader = CompoundPacketReader::new(&raw);
        assert!(matches!(reader.next(), Some(Ok(_))));
        assert_eq!(reader.next(), Some(Err(Error::HeaderTooShort)));
        assert_eq!(reader.next(), None);
    }

    #[test]
    fn test_payload_strips_padding() {
        let raw = [0xa3, 205, 0, 2, 1, 2, 3, 4, 5, 6, 0, 2];
        let sub_packet = CompoundPacketReader::new(&raw).next().unwrap().unwrap();
        assert_eq!(sub_packet.payload().unwrap(), &[1, 2, 3, 4, 5, 6]);

        let raw = [0xa3, 205, 0, 1, 1, 2, 3, 9];
        let sub_packet = CompoundPacketReader::new(&raw).next().unwrap().unwrap();
        assert_eq!(sub_packet.payload(), Err(Error::InvalidPadding));
    }

    #[test]
    fn test_decode_rejects_partial_fir_entry() {
        let raw = [
            0x84, 206, 0, 5, 0, 0, 0, 1, 0, 0, 0, 0, // FIR header
            0, 0, 0, 2, 7, 0, 0, 0, // one entry
            0, 0, 0, 3, // half an entry
        ];
        let sub_packet = CompoundPacketReader::new(&raw).next().unwrap().unwrap();
        assert_eq!(
            sub_packet.decode().err(),
            Some(Error::FirInvalidLength(12))
        );
    }

    #[test]
    fn test_decode_rejects_fir_with_padded_partial_entry() {
        let raw = [
            0xa4, 206, 0, 5, 0, 0, 0, 1, 0, 0, 0, 0, // FIR header, padded
            0, 0, 0, 2, 7, 0, 0, 0, // one entry
            0, 0, 0, 4, // padding
        ];
        let sub_packet = CompoundPacketReader::new(&raw).next().unwrap().unwrap();
        assert_eq!(
            sub_packet.decode().err(),
            Some(Error::FirInvalidLength(12))
        );
    }

    #[test]
    fn test_decode_rejects_oversized_xr_block() {
        let raw = [
            0x80, 207, 0, 3, 0, 0, 0, 1, // XR header
            4, 0, 0xff, 0xff, 0, 0, 0, 0, // RRTR claiming 65535 words
        ];
        let sub_packet = CompoundPacketReader::new(&raw).next().unwrap().unwrap();
        assert_eq!(
            sub_packet.decode().err(),
            Some(Error::XrBlockTruncated {
                length: 4 + 0xffff * 4,
                remaining: 8,
            })
        );
    }

    #[test]
    fn test_decode_rejects_xr_block_header_fragment() {
        let raw = [
            0x80, 207, 0, 4, 0, 0, 0, 1, // XR header
            4, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0, 2, // RRTR
        ];
        let sub_packet = CompoundPacketReader::new(&raw).next().unwrap().unwrap();
        assert!(sub_packet.decode().is_ok());

        let raw = [
            0xa0, 207, 0, 2, 0, 0, 0, 1, // XR header, padded
            4, 0, 0, 2, // block header, padding eats its body
        ];
        let sub_packet = CompoundPacketReader::new(&raw).next().unwrap().unwrap();
        assert_eq!(
            sub_packet.decode().err(),
            Some(Error::XrBlockTruncated {
                length: 4,
                remaining: 2,
            })
        );
    }

    #[test]
    fn test_decode_receiver_report() {
        let raw = [0x80, 201, 0, 1, 0x12, 0x34, 0x56, 0x78];
        let sub_packet = CompoundPacketReader::new(&raw).next().unwrap().unwrap();
        let packet = sub_packet.decode().unwrap();
        let rr = packet
            .as_any()
            .downcast_ref::<rtcp::receiver_report::ReceiverReport>()
            .unwrap();
        assert_eq!(rr.ssrc, 0x12345678);
        assert!(rr.reports.is_empty());
    }
}
