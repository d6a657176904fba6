//! Local validation errors
//!
//! These are raised before any native call is made.

use thiserror::Error;

use crate::filter::FilterKind;
use crate::protocol::ProtocolKind;
use crate::version::ApiVersion;

/// A caller-supplied value was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Baud rate outside the protocol's supported set
    #[error("{protocol}: baudrate {baudrate} not supported ({supported:?})")]
    UnsupportedBaudrate {
        protocol: ProtocolKind,
        baudrate: u32,
        supported: &'static [u32],
    },

    /// Pin combination outside the protocol's supported set
    #[error("{protocol}: pin(s) {pins:?} not supported ({supported:?})")]
    UnsupportedPins {
        protocol: ProtocolKind,
        pins: Vec<u8>,
        supported: &'static [&'static [u8]],
    },

    /// CAN addressing mode not one of standard/extended/both
    #[error("unknown CAN addressing mode: {0}")]
    UnknownAddressing(String),

    /// Unparseable or unsupported API version string
    #[error("API version {0} is not supported")]
    UnknownApiVersion(String),

    /// Payload does not fit the active encoding
    #[error("payload of {len} bytes exceeds the {capacity}-byte message capacity")]
    PayloadTooLarge { len: usize, capacity: usize },

    /// Native record reports sizes that do not fit its buffer
    #[error("malformed message record: {0}")]
    MalformedRecord(String),

    /// Filter width must be between 1 and 8 bytes
    #[error("filter size {0} is outside 1..=8 bytes")]
    InvalidFilterSize(usize),

    /// Integer does not fit in the filter width
    #[error("filter {field} 0x{value:X} does not fit in {size} bytes")]
    FilterValueTooWide {
        field: &'static str,
        value: u64,
        size: usize,
    },

    /// Mask, pattern and flow must share one width
    #[error("filter {field} is {len} bytes, expected {size}")]
    FilterWidthMismatch {
        field: &'static str,
        len: usize,
        size: usize,
    },

    /// Device names are passed as C strings
    #[error("device name contains an interior NUL byte")]
    InvalidDeviceName,

    /// A length or count does not fit the native 32-bit argument
    #[error("{field} of {value} does not fit a 32-bit count")]
    CountOutOfRange { field: &'static str, value: usize },

    /// Per-message read buffer outside the allocatable range
    #[error("read buffer size {size} is outside 1..={max} bytes")]
    InvalidBufferSize { size: usize, max: usize },
}

/// Errors from the filter builder
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// Only flow-control filters are built here
    #[error("{0} filters are not supported")]
    KindNotSupported(FilterKind),

    /// Filter records exist for the 04.04 layout only
    #[error("filter construction is not supported for API version {0}")]
    EncodingNotSupported(ApiVersion),
}
