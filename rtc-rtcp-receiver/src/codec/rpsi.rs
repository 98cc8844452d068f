//! Reference Picture Selection Indication (RFC 4585 §6.3.3).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      PB       |0| Payload Type|    Native RPSI bit string     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   defined per codec          ...                | Padding (0) |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The bit string carries the picture id in 7-bit groups, most significant
//! group first. The high bit of every byte is a continuation flag.

use super::{PT_PSFB, SSRC_LENGTH, SubPacket, read_u32};
use crate::error::{Error, Result};

pub(crate) const FORMAT_RPSI: u8 = 3;

const COMMON_FEEDBACK_LENGTH: usize = 2 * SSRC_LENGTH;
const PADDING_BITS_OFFSET: usize = COMMON_FEEDBACK_LENGTH;
const PAYLOAD_TYPE_OFFSET: usize = COMMON_FEEDBACK_LENGTH + 1;
const BIT_STRING_OFFSET: usize = COMMON_FEEDBACK_LENGTH + 2;
const MIN_FCI_LENGTH: usize = 4;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Rpsi {
    pub(crate) sender_ssrc: u32,
    pub(crate) media_ssrc: u32,
    pub(crate) payload_type: u8,
    pub(crate) picture_id: u64,
}

pub(crate) fn unmarshal_rpsi(sub_packet: &SubPacket) -> Result<Rpsi> {
    if sub_packet.packet_type != PT_PSFB || sub_packet.format != FORMAT_RPSI {
        return Err(Error::UnexpectedPacketType {
            packet_type: sub_packet.packet_type,
            format: sub_packet.format,
        });
    }

    let payload = sub_packet.payload()?;
    if payload.len() < COMMON_FEEDBACK_LENGTH + MIN_FCI_LENGTH {
        return Err(Error::FeedbackTooShort);
    }

    let padding_bits = payload[PADDING_BITS_OFFSET];
    if padding_bits % 8 != 0 {
        return Err(Error::RpsiFractionalPadding(padding_bits));
    }
    let padding_bytes = (padding_bits / 8) as usize;
    if BIT_STRING_OFFSET + padding_bytes >= payload.len() {
        return Err(Error::RpsiPaddingTooLarge(padding_bytes));
    }

    let mut picture_id = 0u64;
    for &b in &payload[BIT_STRING_OFFSET..payload.len() - padding_bytes] {
        if picture_id >> 57 != 0 {
            return Err(Error::RpsiPictureIdOverflow);
        }
        picture_id = (picture_id << 7) | (b & 0x7f) as u64;
    }

    Ok(Rpsi {
        sender_ssrc: read_u32(payload, 0),
        media_ssrc: read_u32(payload, SSRC_LENGTH),
        payload_type: payload[PAYLOAD_TYPE_OFFSET] & 0x7f,
        picture_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CompoundPacketReader;

    fn sub_packet(raw: &[u8]) -> SubPacket {
        CompoundPacketReader::new(raw).next().unwrap().unwrap()
    }

    fn rpsi_packet(picture_id: u64) -> Vec<u8> {
        let mut groups = vec![(picture_id & 0x7f) as u8];
        let mut rest = picture_id >> 7;
        while rest != 0 {
            groups.push(0x80 | (rest & 0x7f) as u8);
            rest >>= 7;
        }
        groups.reverse();

        let mut fci = vec![0, 100];
        fci.extend_from_slice(&groups);
        let padding_bytes = (4 - fci.len() % 4) % 4;
        fci[0] = (padding_bytes * 8) as u8;
        fci.resize(fci.len() + padding_bytes, 0);

        let words = 2 + fci.len() / 4;
        let mut raw = vec![0x80 | FORMAT_RPSI, PT_PSFB, 0, words as u8];
        raw.extend_from_slice(&0x1234u32.to_be_bytes());
        raw.extend_from_slice(&0x5678u32.to_be_bytes());
        raw.extend_from_slice(&fci);
        raw
    }

    #[test]
    fn test_rpsi_unmarshal() {
        let raw = rpsi_packet(0x123456789);
        let rpsi = unmarshal_rpsi(&sub_packet(&raw)).unwrap();
        assert_eq!(
            rpsi,
            Rpsi {
                sender_ssrc: 0x1234,
                media_ssrc: 0x5678,
                payload_type: 100,
                picture_id: 0x123456789,
            }
        );
    }

    #[test]
    fn test_rpsi_fractional_padding() {
        let raw = [
            0x83, PT_PSFB, 0, 3, 0x12, 0x34, 0x56, 0x78, 0x98, 0x76, 0x54, 0x32, 0x0b, 0, 0, 0,
        ];
        assert_eq!(
            unmarshal_rpsi(&sub_packet(&raw)),
            Err(Error::RpsiFractionalPadding(0x0b))
        );
    }

    #[test]
    fn test_rpsi_padding_too_large() {
        let raw = [
            0x83, PT_PSFB, 0, 3, 0x12, 0x34, 0x56, 0x78, 0x98, 0x76, 0x54, 0x32, 0xa8, 0, 0, 0,
        ];
        assert_eq!(
            unmarshal_rpsi(&sub_packet(&raw)),
            Err(Error::RpsiPaddingTooLarge(21))
        );
    }

    #[test]
    fn test_rpsi_too_short() {
        let raw = [
            0x83, PT_PSFB, 0, 2, 0x12, 0x34, 0x56, 0x78, 0x98, 0x76, 0x54, 0x32,
        ];
        assert_eq!(
            unmarshal_rpsi(&sub_packet(&raw)),
            Err(Error::FeedbackTooShort)
        );
    }

    #[test]
    fn test_rpsi_picture_id_overflow() {
        let mut raw = vec![0x83, PT_PSFB, 0, 5, 0, 0, 0, 1, 0, 0, 0, 2, 0, 96];
        raw.extend_from_slice(&[0xff; 10]);
        assert_eq!(
            unmarshal_rpsi(&sub_packet(&raw)),
            Err(Error::RpsiPictureIdOverflow)
        );
    }
}
