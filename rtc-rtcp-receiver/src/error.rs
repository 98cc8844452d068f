use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Remaining bytes cannot hold a common RTCP header.
    #[error("rtcp: header too short")]
    HeaderTooShort,
    /// Version field of the common header is not 2.
    #[error("rtcp: bad version {0}")]
    BadVersion(u8),
    /// Length field points past the end of the buffer.
    #[error("rtcp: length {length} exceeds remaining {remaining} bytes")]
    LengthExceedsBuffer { length: usize, remaining: usize },
    /// A framed sub-packet decoded to no packet at all.
    #[error("rtcp: sub-packet decoded to nothing")]
    EmptySubPacket,
    /// Padding count is zero or larger than the packet body.
    #[error("rtcp: invalid padding")]
    InvalidPadding,
    /// Feedback packet is shorter than its fixed part.
    #[error("rtcp: feedback packet too short")]
    FeedbackTooShort,
    /// Sub-packet is not of the expected type or format.
    #[error("rtcp: unexpected packet type {packet_type} format {format}")]
    UnexpectedPacketType { packet_type: u8, format: u8 },
    /// FIR FCI is not a whole number of entries.
    #[error("fir: fci length {0} is not a multiple of 8")]
    FirInvalidLength(usize),
    /// XR report block extends past the end of the packet.
    #[error("xr: block of {length} bytes exceeds remaining {remaining} bytes")]
    XrBlockTruncated { length: usize, remaining: usize },
    /// TMMBR/TMMBN FCI is not a whole number of entries.
    #[error("tmmb: fci length {0} is not a multiple of 8")]
    TmmbInvalidLength(usize),
    /// TMMBR request without any FCI entry.
    #[error("tmmbr: no fci entry")]
    TmmbrNoEntry,
    /// Mantissa shifted by exponent does not fit in 64 bits.
    #[error("tmmb: bitrate overflow")]
    TmmbBitrateOverflow,
    /// RPSI padding is not a whole number of bytes.
    #[error("rpsi: fractional padding of {0} bits")]
    RpsiFractionalPadding(u8),
    /// RPSI padding consumes the native bit string.
    #[error("rpsi: padding of {0} bytes exceeds bit string")]
    RpsiPaddingTooLarge(usize),
    /// Native RPSI bit string does not fit in a 64-bit picture id.
    #[error("rpsi: picture id exceeds 64 bits")]
    RpsiPictureIdOverflow,

    #[error("{0}")]
    Rtcp(#[from] shared::error::Error),
}
