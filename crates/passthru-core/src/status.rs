//! PassThru status codes (SAE J2534-1 return values)
//!
//! Every native call returns one of a fixed set of codes. Zero is success,
//! everything else is a failure with a canonical description. The lookup is
//! total over the known set and fails for anything else.

use std::fmt;

use thiserror::Error;

/// A numeric status that is not part of the J2534 return value table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown PassThru status code 0x{0:08X}")]
pub struct UnknownStatus(pub u32);

/// Coarse classification of a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// `STATUS_NOERROR`
    Success,
    /// Bad identifiers, unsupported values, pointer contract violations
    Validation,
    /// Call made in a state where it cannot succeed
    State,
    /// Buffers and limits
    Capacity,
    /// Request did not complete in time
    Timing,
    /// Pins, voltages and other shared hardware resources
    Resource,
    /// Generic failure
    Undefined,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::Validation => "validation",
            Self::State => "state",
            Self::Capacity => "capacity",
            Self::Timing => "timing",
            Self::Resource => "resource",
            Self::Undefined => "undefined",
        };
        f.write_str(name)
    }
}

/// J2534 return values (Figure 95)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    NoError = 0x00,
    NotSupported = 0x01,
    InvalidChannelId = 0x02,
    ProtocolIdNotSupported = 0x03,
    NullParameter = 0x04,
    IoctlValueNotSupported = 0x05,
    FlagNotSupported = 0x06,
    Failed = 0x07,
    DeviceNotConnected = 0x08,
    Timeout = 0x09,
    InvalidMsg = 0x0A,
    TimeIntervalNotSupported = 0x0B,
    ExceededLimit = 0x0C,
    InvalidMsgId = 0x0D,
    DeviceInUse = 0x0E,
    IoctlIdNotSupported = 0x0F,
    BufferEmpty = 0x10,
    BufferFull = 0x11,
    BufferOverflow = 0x12,
    PinNotSupported = 0x13,
    ResourceConflict = 0x14,
    MsgProtocolId = 0x15,
    InvalidFilterId = 0x16,
    MsgNotAllowed = 0x17,
    NotUnique = 0x18,
    BaudrateNotSupported = 0x19,
    InvalidDeviceId = 0x1A,
    DeviceNotOpen = 0x1B,
    NullRequired = 0x1C,
    FilterTypeNotSupported = 0x1D,
    IoctlParamIdNotSupported = 0x1E,
    VoltageInUse = 0x1F,
    PinInUse = 0x20,
    InitFailed = 0x21,
    OpenFailed = 0x22,
    BufferTooSmall = 0x23,
    LogChanNotAllowed = 0x24,
    SelectTypeNotSupported = 0x25,
    ConcurrentApiCall = 0x26,
}

impl ErrorCode {
    /// Every known code, in numeric order
    pub const ALL: [ErrorCode; 39] = [
        Self::NoError,
        Self::NotSupported,
        Self::InvalidChannelId,
        Self::ProtocolIdNotSupported,
        Self::NullParameter,
        Self::IoctlValueNotSupported,
        Self::FlagNotSupported,
        Self::Failed,
        Self::DeviceNotConnected,
        Self::Timeout,
        Self::InvalidMsg,
        Self::TimeIntervalNotSupported,
        Self::ExceededLimit,
        Self::InvalidMsgId,
        Self::DeviceInUse,
        Self::IoctlIdNotSupported,
        Self::BufferEmpty,
        Self::BufferFull,
        Self::BufferOverflow,
        Self::PinNotSupported,
        Self::ResourceConflict,
        Self::MsgProtocolId,
        Self::InvalidFilterId,
        Self::MsgNotAllowed,
        Self::NotUnique,
        Self::BaudrateNotSupported,
        Self::InvalidDeviceId,
        Self::DeviceNotOpen,
        Self::NullRequired,
        Self::FilterTypeNotSupported,
        Self::IoctlParamIdNotSupported,
        Self::VoltageInUse,
        Self::PinInUse,
        Self::InitFailed,
        Self::OpenFailed,
        Self::BufferTooSmall,
        Self::LogChanNotAllowed,
        Self::SelectTypeNotSupported,
        Self::ConcurrentApiCall,
    ];

    /// Numeric value as returned by the native library
    pub fn value(self) -> u32 {
        self as u32
    }

    pub fn is_success(self) -> bool {
        self == Self::NoError
    }

    /// Canonical J2534 identifier, e.g. `ERR_BUFFER_EMPTY`
    pub fn name(self) -> &'static str {
        match self {
            Self::NoError => "STATUS_NOERROR",
            Self::NotSupported => "ERR_NOT_SUPPORTED",
            Self::InvalidChannelId => "ERR_INVALID_CHANNEL_ID",
            Self::ProtocolIdNotSupported => "ERR_PROTOCOL_ID_NOT_SUPPORTED",
            Self::NullParameter => "ERR_NULL_PARAMETER",
            Self::IoctlValueNotSupported => "ERR_IOCTL_VALUE_NOT_SUPPORTED",
            Self::FlagNotSupported => "ERR_FLAG_NOT_SUPPORTED",
            Self::Failed => "ERR_FAILED",
            Self::DeviceNotConnected => "ERR_DEVICE_NOT_CONNECTED",
            Self::Timeout => "ERR_TIMEOUT",
            Self::InvalidMsg => "ERR_INVALID_MSG",
            Self::TimeIntervalNotSupported => "ERR_TIME_INTERVAL_NOT_SUPPORTED",
            Self::ExceededLimit => "ERR_EXCEEDED_LIMIT",
            Self::InvalidMsgId => "ERR_INVALID_MSG_ID",
            Self::DeviceInUse => "ERR_DEVICE_IN_USE",
            Self::IoctlIdNotSupported => "ERR_IOCTL_ID_NOT_SUPPORTED",
            Self::BufferEmpty => "ERR_BUFFER_EMPTY",
            Self::BufferFull => "ERR_BUFFER_FULL",
            Self::BufferOverflow => "ERR_BUFFER_OVERFLOW",
            Self::PinNotSupported => "ERR_PIN_NOT_SUPPORTED",
            Self::ResourceConflict => "ERR_RESOURCE_CONFLICT",
            Self::MsgProtocolId => "ERR_MSG_PROTOCOL_ID",
            Self::InvalidFilterId => "ERR_INVALID_FILTER_ID",
            Self::MsgNotAllowed => "ERR_MSG_NOT_ALLOWED",
            Self::NotUnique => "ERR_NOT_UNIQUE",
            Self::BaudrateNotSupported => "ERR_BAUDRATE_NOT_SUPPORTED",
            Self::InvalidDeviceId => "ERR_INVALID_DEVICE_ID",
            Self::DeviceNotOpen => "ERR_DEVICE_NOT_OPEN",
            Self::NullRequired => "ERR_NULL_REQUIRED",
            Self::FilterTypeNotSupported => "ERR_FILTER_TYPE_NOT_SUPPORTED",
            Self::IoctlParamIdNotSupported => "ERR_IOCTL_PARAM_ID_NOT_SUPPORTED",
            Self::VoltageInUse => "ERR_VOLTAGE_IN_USE",
            Self::PinInUse => "ERR_PIN_IN_USE",
            Self::InitFailed => "ERR_INIT_FAILED",
            Self::OpenFailed => "ERR_OPEN_FAILED",
            Self::BufferTooSmall => "ERR_BUFFER_TOO_SMALL",
            Self::LogChanNotAllowed => "ERR_LOG_CHAN_NOT_ALLOWED",
            Self::SelectTypeNotSupported => "ERR_SELECT_TYPE_NOT_SUPPORTED",
            Self::ConcurrentApiCall => "ERR_CONCURRENT_API_CALL",
        }
    }

    pub fn category(self) -> ErrorCategory {
        use ErrorCategory::*;

        match self {
            Self::NoError => Success,

            Self::NotSupported
            | Self::InvalidChannelId
            | Self::ProtocolIdNotSupported
            | Self::NullParameter
            | Self::IoctlValueNotSupported
            | Self::FlagNotSupported
            | Self::InvalidMsg
            | Self::TimeIntervalNotSupported
            | Self::InvalidMsgId
            | Self::IoctlIdNotSupported
            | Self::PinNotSupported
            | Self::MsgProtocolId
            | Self::InvalidFilterId
            | Self::MsgNotAllowed
            | Self::BaudrateNotSupported
            | Self::InvalidDeviceId
            | Self::NullRequired
            | Self::FilterTypeNotSupported
            | Self::IoctlParamIdNotSupported
            | Self::SelectTypeNotSupported => Validation,

            Self::DeviceNotConnected
            | Self::DeviceNotOpen
            | Self::LogChanNotAllowed
            | Self::ConcurrentApiCall
            | Self::InitFailed
            | Self::OpenFailed => State,

            Self::BufferEmpty
            | Self::BufferFull
            | Self::BufferOverflow
            | Self::BufferTooSmall
            | Self::ExceededLimit => Capacity,

            Self::Timeout => Timing,

            Self::DeviceInUse
            | Self::ResourceConflict
            | Self::NotUnique
            | Self::VoltageInUse
            | Self::PinInUse => Resource,

            Self::Failed => Undefined,
        }
    }

    /// Human-readable description from the J2534 return value table
    pub fn description(self) -> &'static str {
        match self {
            Self::NoError => "Function call was successful.",
            Self::NotSupported => "Device does not support the API function.",
            Self::InvalidChannelId => "Invalid <ChannelID> value.",
            Self::ProtocolIdNotSupported => "<ProtocolID> value is not supported.",
            Self::NullParameter => "NULL pointer supplied where a valid pointer is required.",
            Self::IoctlValueNotSupported => {
                "SCONFIG_LIST is either invalid, out of range, or not applicable for the current channel."
            }
            Self::FlagNotSupported => {
                "<Flags> value(s) are either invalid, unknown, or not applicable for the current channel."
            }
            Self::Failed => "Undefined error.",
            Self::DeviceNotConnected => "Pass-Thru Device communication error.",
            Self::Timeout => "Request could not be completed in the designated time.",
            Self::InvalidMsg => "Message structure is invalid for the given <ChannelID>.",
            Self::TimeIntervalNotSupported => {
                "Value for the <TimeInterval> is either invalid or out of range for the current channel."
            }
            Self::ExceededLimit => "Exceeded the allowed limits.",
            Self::InvalidMsgId => "Invalid <MsgID> value.",
            Self::DeviceInUse => "Device is currently open.",
            Self::IoctlIdNotSupported => {
                "<IoctlID> value is either invalid, unknown, or not applicable for the current channel."
            }
            Self::BufferEmpty => "The buffer is empty, no data available.",
            Self::BufferFull => "Buffer is full.",
            Self::BufferOverflow => "Indicates a buffer overflow occurred, data was lost.",
            Self::PinNotSupported => {
                "Pin number and/or connector specified is either invalid or unknown."
            }
            Self::ResourceConflict => "Request causes a resource conflict.",
            Self::MsgProtocolId => {
                "Protocol ID in the PASSTHRU_MSG structure does not match the Protocol ID from the \
                 original call to PassThruConnect/PassThruLogicalConnect for the Channel ID."
            }
            Self::InvalidFilterId => "Invalid <FilterID> value.",
            Self::MsgNotAllowed => {
                "Attempting to queue a Segmented Message whose network address and/or <TxFlags> does \
                 not match those defined for the <RemoteAddress> or <RemoteTxFlags> during channel \
                 creation on a logical communication channel."
            }
            Self::NotUnique => "Attempt was made to create a duplicate where one is not allowed.",
            Self::BaudrateNotSupported => {
                "Baud rate is either invalid or unachievable for the current channel."
            }
            Self::InvalidDeviceId => {
                "PassThruOpen has been successfully called, but the current Device ID is not valid."
            }
            Self::DeviceNotOpen => "PassThruOpen has not been successfully called.",
            Self::NullRequired => "A parameter that is required to be NULL is not set to NULL.",
            Self::FilterTypeNotSupported => {
                "<FilterType> is either invalid or unknown for the current channel."
            }
            Self::IoctlParamIdNotSupported => {
                "Parameter referenced in the SCONFIG_LIST structure is not supported."
            }
            Self::VoltageInUse => "Programming voltage is currently being applied to another pin.",
            Self::PinInUse => {
                "Pin number specified is currently in use (either for voltage, ground, or by another channel)."
            }
            Self::InitFailed => "Physical vehicle bus initialization failed.",
            Self::OpenFailed => {
                "There is an invalid name or there is a configuration issue (e.g., firmware/DLL \
                 mismatch) and the associated device could not be opened."
            }
            Self::BufferTooSmall => {
                "The size of <DataBuffer>, as indicated by <DataBufferSize> in the PASSTHRU_MSG \
                 structure, is too small to accommodate the full message."
            }
            Self::LogChanNotAllowed => {
                "Logical communication channel is not allowed for the designated physical \
                 communication channel and Protocol ID combination."
            }
            Self::SelectTypeNotSupported => "<SelectType> is either invalid or unknown.",
            Self::ConcurrentApiCall => {
                "A J2534 API function has been called before the previous J2534 function call has completed."
            }
        }
    }
}

impl TryFrom<u32> for ErrorCode {
    type Error = UnknownStatus;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|code| code.value() == value)
            .ok_or(UnknownStatus(value))
    }
}

impl From<ErrorCode> for u32 {
    fn from(code: ErrorCode) -> Self {
        code.value()
    }
}

impl fmt::UpperHex for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::UpperHex::fmt(&self.value(), f)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0x00, ErrorCode::NoError, ErrorCategory::Success)]
    #[case(0x02, ErrorCode::InvalidChannelId, ErrorCategory::Validation)]
    #[case(0x09, ErrorCode::Timeout, ErrorCategory::Timing)]
    #[case(0x10, ErrorCode::BufferEmpty, ErrorCategory::Capacity)]
    #[case(0x1B, ErrorCode::DeviceNotOpen, ErrorCategory::State)]
    #[case(0x1F, ErrorCode::VoltageInUse, ErrorCategory::Resource)]
    #[case(0x07, ErrorCode::Failed, ErrorCategory::Undefined)]
    #[case(0x26, ErrorCode::ConcurrentApiCall, ErrorCategory::State)]
    fn test_lookup_and_category(
        #[case] raw: u32,
        #[case] expected: ErrorCode,
        #[case] category: ErrorCategory,
    ) {
        let code = ErrorCode::try_from(raw).unwrap();
        assert_eq!(code, expected);
        assert_eq!(code.category(), category);
        assert_eq!(u32::from(code), raw);
    }

    #[rstest]
    #[case(0x27)]
    #[case(0xFF)]
    #[case(0x1000_0000)]
    fn test_unknown_code_is_rejected(#[case] raw: u32) {
        assert_eq!(ErrorCode::try_from(raw), Err(UnknownStatus(raw)));
    }

    #[test]
    fn test_table_is_dense_and_ordered() {
        for (index, code) in ErrorCode::ALL.iter().enumerate() {
            assert_eq!(code.value(), index as u32);
        }
        assert!(ErrorCode::ALL.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_only_no_error_is_success() {
        let successes: Vec<_> = ErrorCode::ALL
            .iter()
            .filter(|code| code.category() == ErrorCategory::Success)
            .collect();
        assert_eq!(successes, vec![&ErrorCode::NoError]);
        assert!(ErrorCode::NoError.is_success());
        assert!(!ErrorCode::Failed.is_success());
    }

    #[test]
    fn test_display_uses_canonical_name() {
        assert_eq!(ErrorCode::BufferEmpty.to_string(), "ERR_BUFFER_EMPTY");
        assert_eq!(format!("{:02X}", ErrorCode::BufferEmpty), "10");
        assert!(ErrorCode::ALL.iter().all(|code| !code.description().is_empty()));
    }
}
