//! Protocol catalog
//!
//! One variant per protocol family (J2534-1 7.3.5.8). Each family carries its
//! own supported baud rate and pin tables, and its own rule for deriving the
//! connect flags from caller options. Construction validates against those
//! tables and never substitutes a different value.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

use crate::error::ValidationError;

/// Protocol identifiers (Figure 27)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolId {
    /// GM / Chrysler CLASS2
    J1850Vpw,
    /// Ford SCP
    J1850Pwm,
    /// ISO 9141 and ISO 9141-2
    Iso9141,
    /// ISO 14230 (Keyword Protocol 2000)
    Iso14230,
    /// Raw CAN frames, no transport layer
    Can,
    Iso15765,
    J2610,
    /// Logical ISO 15765 channel (05.00)
    Iso15765Logical,
    /// Vendor or future protocol id reported by the device
    Other(u32),
}

impl ProtocolId {
    pub fn value(self) -> u32 {
        match self {
            Self::J1850Vpw => 0x01,
            Self::J1850Pwm => 0x02,
            Self::Iso9141 => 0x03,
            Self::Iso14230 => 0x04,
            Self::Can => 0x05,
            Self::Iso15765 => 0x06,
            Self::J2610 => 0x07,
            Self::Iso15765Logical => 0x200,
            Self::Other(v) => v,
        }
    }

    /// ISO 15765 family, addressed over a logical channel in 05.00
    pub fn is_iso15765(self) -> bool {
        matches!(self, Self::Iso15765 | Self::Iso15765Logical)
    }
}

impl From<u32> for ProtocolId {
    fn from(value: u32) -> Self {
        match value {
            0x01 => Self::J1850Vpw,
            0x02 => Self::J1850Pwm,
            0x03 => Self::Iso9141,
            0x04 => Self::Iso14230,
            0x05 => Self::Can,
            0x06 => Self::Iso15765,
            0x07 => Self::J2610,
            0x200 => Self::Iso15765Logical,
            other => Self::Other(other),
        }
    }
}

impl From<ProtocolId> for u32 {
    fn from(id: ProtocolId) -> Self {
        id.value()
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::J1850Vpw => write!(f, "J1850VPW"),
            Self::J1850Pwm => write!(f, "J1850PWM"),
            Self::Iso9141 => write!(f, "ISO9141"),
            Self::Iso14230 => write!(f, "ISO14230"),
            Self::Can => write!(f, "CAN"),
            Self::Iso15765 => write!(f, "ISO15765"),
            Self::J2610 => write!(f, "J2610"),
            Self::Iso15765Logical => write!(f, "ISO15765_LOGICAL"),
            Self::Other(v) => write!(f, "Protocol(0x{:08X})", v),
        }
    }
}

bitflags! {
    /// `PassThruConnect` flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ConnectFlags: u32 {
        const CAN_29BIT_ID = 0x0000_0100;
        const CHECKSUM_DISABLED = 0x0000_0200;
        const CAN_ID_BOTH = 0x0002_0000;
        const K_LINE_ONLY = 0x0004_0000;
    }
}

/// Connector types (Figure 87)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Connector {
    /// SAE J1962 vehicle diagnostic connector
    #[default]
    J1962,
}

impl Connector {
    pub fn value(self) -> u32 {
        match self {
            Self::J1962 => 0x01,
        }
    }
}

/// CAN identifier addressing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CanAddressing {
    /// 11-bit identifiers only
    #[default]
    Standard,
    /// 29-bit identifiers only
    Extended,
    /// Both 11-bit and 29-bit identifiers
    Both,
}

impl CanAddressing {
    pub fn flags(self) -> ConnectFlags {
        match self {
            Self::Standard => ConnectFlags::empty(),
            Self::Extended => ConnectFlags::CAN_29BIT_ID,
            Self::Both => ConnectFlags::CAN_ID_BOTH,
        }
    }
}

impl TryFrom<u32> for CanAddressing {
    type Error = ValidationError;

    fn try_from(mode: u32) -> Result<Self, Self::Error> {
        match mode {
            0 => Ok(Self::Standard),
            1 => Ok(Self::Extended),
            2 => Ok(Self::Both),
            other => Err(ValidationError::UnknownAddressing(other.to_string())),
        }
    }
}

impl FromStr for CanAddressing {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" | "11bit" => Ok(Self::Standard),
            "extended" | "29bit" => Ok(Self::Extended),
            "both" => Ok(Self::Both),
            _ => Err(ValidationError::UnknownAddressing(s.to_string())),
        }
    }
}

const J1850VPW_RATES: &[u32] = &[10400, 41600];
const J1850PWM_RATES: &[u32] = &[10400];
const KLINE_RATES: &[u32] = &[
    4800, 9600, 9615, 9800, 10000, 10400, 10870, 11905, 12500, 13158, 13889, 14706, 15625, 19200,
    115200,
];
const CAN_RATES: &[u32] = &[125_000, 250_000, 500_000];
const J2610_RATES: &[u32] = &[7812, 62500];

const J1850VPW_PINS: &[&[u8]] = &[&[2]];
const J1850PWM_PINS: &[&[u8]] = &[&[2, 10]];
const KLINE_PINS: &[&[u8]] = &[&[7, 15], &[7]];
const CAN_PINS: &[&[u8]] = &[&[6, 14]];
const J2610_PINS: &[&[u8]] = &[&[14, 7], &[7, 12], &[15, 9]];

/// Protocol family tag, indexing the static capability tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    J1850Vpw,
    J1850Pwm,
    Iso9141,
    Iso14230,
    Can,
    Iso15765,
    J2610,
}

impl ProtocolKind {
    pub const ALL: [ProtocolKind; 7] = [
        Self::J1850Vpw,
        Self::J1850Pwm,
        Self::Iso9141,
        Self::Iso14230,
        Self::Can,
        Self::Iso15765,
        Self::J2610,
    ];

    pub fn id(self) -> ProtocolId {
        match self {
            Self::J1850Vpw => ProtocolId::J1850Vpw,
            Self::J1850Pwm => ProtocolId::J1850Pwm,
            Self::Iso9141 => ProtocolId::Iso9141,
            Self::Iso14230 => ProtocolId::Iso14230,
            Self::Can => ProtocolId::Can,
            Self::Iso15765 => ProtocolId::Iso15765,
            Self::J2610 => ProtocolId::J2610,
        }
    }

    pub fn supported_baudrates(self) -> &'static [u32] {
        match self {
            Self::J1850Vpw => J1850VPW_RATES,
            Self::J1850Pwm => J1850PWM_RATES,
            Self::Iso9141 | Self::Iso14230 => KLINE_RATES,
            Self::Can | Self::Iso15765 => CAN_RATES,
            Self::J2610 => J2610_RATES,
        }
    }

    pub fn supported_pins(self) -> &'static [&'static [u8]] {
        match self {
            Self::J1850Vpw => J1850VPW_PINS,
            Self::J1850Pwm => J1850PWM_PINS,
            Self::Iso9141 | Self::Iso14230 => KLINE_PINS,
            Self::Can | Self::Iso15765 => CAN_PINS,
            Self::J2610 => J2610_PINS,
        }
    }

    /// Whether the caller chooses the pins for this family
    pub fn accepts_pins(self) -> bool {
        matches!(self, Self::Iso9141 | Self::Iso14230 | Self::J2610)
    }

    /// Pin combination used when the caller does not choose one
    pub fn default_pins(self) -> &'static [u8] {
        self.supported_pins()[0]
    }

    fn check_baudrate(self, baudrate: u32) -> Result<(), ValidationError> {
        let supported = self.supported_baudrates();
        if supported.contains(&baudrate) {
            Ok(())
        } else {
            Err(ValidationError::UnsupportedBaudrate {
                protocol: self,
                baudrate,
                supported,
            })
        }
    }

    fn check_pins(self, pins: &[u8]) -> Result<(), ValidationError> {
        let supported = self.supported_pins();
        if supported.iter().any(|set| *set == pins) {
            Ok(())
        } else {
            Err(ValidationError::UnsupportedPins {
                protocol: self,
                pins: pins.to_vec(),
                supported,
            })
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.id(), f)
    }
}

/// A validated bus configuration
///
/// Build through the per-family constructors, which check the baud rate and
/// pins against the family's tables. The parameter structs have no public
/// fields, so a value outside the tables cannot be assembled by hand:
///
/// ```compile_fail
/// use passthru_core::protocol::{CanAddressing, CanParams, Protocol};
///
/// let protocol = Protocol::Can(CanParams {
///     baudrate: 33_333,
///     addressing: CanAddressing::Standard,
/// });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protocol {
    J1850Vpw(BusParams),
    J1850Pwm(BusParams),
    Iso9141(KLineParams),
    Iso14230(KLineParams),
    Can(CanParams),
    Iso15765(CanParams),
    J2610(J2610Params),
}

/// Parameters of a bus with nothing to choose but the rate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusParams {
    pub(crate) baudrate: u32,
}

impl BusParams {
    pub fn baudrate(&self) -> u32 {
        self.baudrate
    }
}

/// K-line parameters (ISO 9141, ISO 14230)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KLineParams {
    pub(crate) baudrate: u32,
    pub(crate) pins: Vec<u8>,
    pub(crate) checksum: bool,
}

impl KLineParams {
    pub fn baudrate(&self) -> u32 {
        self.baudrate
    }

    pub fn pins(&self) -> &[u8] {
        &self.pins
    }

    /// Whether the device computes and checks the checksum
    pub fn checksum(&self) -> bool {
        self.checksum
    }

    fn flags(&self) -> ConnectFlags {
        let mut flags = ConnectFlags::empty();
        if self.pins.len() == 1 {
            flags |= ConnectFlags::K_LINE_ONLY;
        }
        if !self.checksum {
            flags |= ConnectFlags::CHECKSUM_DISABLED;
        }
        flags
    }
}

/// CAN parameters (raw CAN, ISO 15765)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanParams {
    pub(crate) baudrate: u32,
    pub(crate) addressing: CanAddressing,
}

impl CanParams {
    pub fn baudrate(&self) -> u32 {
        self.baudrate
    }

    pub fn addressing(&self) -> CanAddressing {
        self.addressing
    }
}

/// SAE J2610 parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct J2610Params {
    pub(crate) baudrate: u32,
    pub(crate) pins: Vec<u8>,
}

impl J2610Params {
    pub fn baudrate(&self) -> u32 {
        self.baudrate
    }

    pub fn pins(&self) -> &[u8] {
        &self.pins
    }
}

impl Protocol {
    pub fn j1850vpw(baudrate: u32) -> Result<Self, ValidationError> {
        Self::J1850Vpw(BusParams { baudrate }).validated()
    }

    pub fn j1850pwm(baudrate: u32) -> Result<Self, ValidationError> {
        Self::J1850Pwm(BusParams { baudrate }).validated()
    }

    /// ISO 9141. Checksum handling by the device is disabled unless `checksum` is set.
    pub fn iso9141(baudrate: u32, pins: &[u8], checksum: bool) -> Result<Self, ValidationError> {
        Self::Iso9141(KLineParams {
            baudrate,
            pins: pins.to_vec(),
            checksum,
        })
        .validated()
    }

    pub fn iso14230(baudrate: u32, pins: &[u8], checksum: bool) -> Result<Self, ValidationError> {
        Self::Iso14230(KLineParams {
            baudrate,
            pins: pins.to_vec(),
            checksum,
        })
        .validated()
    }

    pub fn can(baudrate: u32, addressing: CanAddressing) -> Result<Self, ValidationError> {
        Self::Can(CanParams {
            baudrate,
            addressing,
        })
        .validated()
    }

    pub fn iso15765(baudrate: u32, addressing: CanAddressing) -> Result<Self, ValidationError> {
        Self::Iso15765(CanParams {
            baudrate,
            addressing,
        })
        .validated()
    }

    pub fn j2610(baudrate: u32, pins: &[u8]) -> Result<Self, ValidationError> {
        Self::J2610(J2610Params {
            baudrate,
            pins: pins.to_vec(),
        })
        .validated()
    }

    fn validated(self) -> Result<Self, ValidationError> {
        self.validate()?;
        Ok(self)
    }

    /// Check the baud rate and pins against the family tables
    pub fn validate(&self) -> Result<(), ValidationError> {
        let kind = self.kind();
        kind.check_baudrate(self.baudrate())?;
        if let Some(pins) = self.pins() {
            kind.check_pins(pins)?;
        }
        Ok(())
    }

    pub fn kind(&self) -> ProtocolKind {
        match self {
            Self::J1850Vpw(_) => ProtocolKind::J1850Vpw,
            Self::J1850Pwm(_) => ProtocolKind::J1850Pwm,
            Self::Iso9141(_) => ProtocolKind::Iso9141,
            Self::Iso14230(_) => ProtocolKind::Iso14230,
            Self::Can(_) => ProtocolKind::Can,
            Self::Iso15765(_) => ProtocolKind::Iso15765,
            Self::J2610(_) => ProtocolKind::J2610,
        }
    }

    pub fn id(&self) -> ProtocolId {
        self.kind().id()
    }

    pub fn baudrate(&self) -> u32 {
        match self {
            Self::J1850Vpw(params) | Self::J1850Pwm(params) => params.baudrate(),
            Self::Iso9141(params) | Self::Iso14230(params) => params.baudrate(),
            Self::Can(params) | Self::Iso15765(params) => params.baudrate(),
            Self::J2610(params) => params.baudrate(),
        }
    }

    /// Caller-selected pins, for the families that accept them
    pub fn pins(&self) -> Option<&[u8]> {
        match self {
            Self::Iso9141(params) | Self::Iso14230(params) => Some(params.pins()),
            Self::J2610(params) => Some(params.pins()),
            _ => None,
        }
    }

    /// Connect flags derived from the family's options
    pub fn flags(&self) -> ConnectFlags {
        match self {
            Self::Iso9141(params) | Self::Iso14230(params) => params.flags(),
            Self::Can(params) | Self::Iso15765(params) => params.addressing.flags(),
            Self::J1850Vpw(_) | Self::J1850Pwm(_) | Self::J2610(_) => ConnectFlags::empty(),
        }
    }

    /// Connector the protocol is wired to
    pub fn connector(&self) -> Connector {
        Connector::J1962
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn build(kind: ProtocolKind, baudrate: u32) -> Result<Protocol, ValidationError> {
        match kind {
            ProtocolKind::J1850Vpw => Protocol::j1850vpw(baudrate),
            ProtocolKind::J1850Pwm => Protocol::j1850pwm(baudrate),
            ProtocolKind::Iso9141 => Protocol::iso9141(baudrate, &[7, 15], false),
            ProtocolKind::Iso14230 => Protocol::iso14230(baudrate, &[7], false),
            ProtocolKind::Can => Protocol::can(baudrate, CanAddressing::Standard),
            ProtocolKind::Iso15765 => Protocol::iso15765(baudrate, CanAddressing::Standard),
            ProtocolKind::J2610 => Protocol::j2610(baudrate, &[14, 7]),
        }
    }

    #[test]
    fn test_baudrate_accepted_iff_supported() {
        let candidates = [
            300, 4800, 7812, 9600, 10400, 19200, 41600, 62500, 115200, 125_000, 250_000, 500_000,
            1_000_000,
        ];

        for kind in ProtocolKind::ALL {
            for rate in candidates {
                let result = build(kind, rate);
                if kind.supported_baudrates().contains(&rate) {
                    let protocol = result.unwrap();
                    assert_eq!(protocol.baudrate(), rate);
                    assert_eq!(protocol.kind(), kind);
                } else {
                    assert_eq!(
                        result,
                        Err(ValidationError::UnsupportedBaudrate {
                            protocol: kind,
                            baudrate: rate,
                            supported: kind.supported_baudrates(),
                        })
                    );
                }
            }
        }
    }

    #[test]
    fn test_baudrate_error_names_value_and_set() {
        let err = Protocol::can(1_000_000, CanAddressing::Both).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("1000000"), "{}", text);
        assert!(text.contains("[125000, 250000, 500000]"), "{}", text);
    }

    #[rstest]
    #[case(&[7, 15])]
    #[case(&[7])]
    fn test_kline_pins_returned_unchanged(#[case] pins: &[u8]) {
        let protocol = Protocol::iso9141(10400, pins, false).unwrap();
        assert_eq!(protocol.pins(), Some(pins));
    }

    #[rstest]
    #[case(&[15, 7])]
    #[case(&[6, 14])]
    #[case(&[])]
    fn test_kline_pins_rejected(#[case] pins: &[u8]) {
        let err = Protocol::iso14230(10400, pins, false).unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedPins { .. }));
    }

    #[test]
    fn test_j2610_pins_keep_order() {
        let protocol = Protocol::j2610(7812, &[14, 7]).unwrap();
        assert_eq!(protocol.pins(), Some(&[14u8, 7][..]));
        assert!(Protocol::j2610(7812, &[7, 14]).is_err());
    }

    #[rstest]
    #[case(CanAddressing::Both, ConnectFlags::CAN_ID_BOTH)]
    #[case(CanAddressing::Extended, ConnectFlags::CAN_29BIT_ID)]
    #[case(CanAddressing::Standard, ConnectFlags::empty())]
    fn test_can_addressing_flags(#[case] addressing: CanAddressing, #[case] expected: ConnectFlags) {
        let can = Protocol::can(500_000, addressing).unwrap();
        let isotp = Protocol::iso15765(500_000, addressing).unwrap();
        assert_eq!(can.flags(), expected);
        assert_eq!(isotp.flags(), expected);
    }

    #[test]
    fn test_unknown_addressing_mode() {
        assert_eq!(CanAddressing::try_from(2).unwrap(), CanAddressing::Both);
        assert_eq!(
            CanAddressing::try_from(3),
            Err(ValidationError::UnknownAddressing("3".to_string()))
        );
        assert_eq!("Extended".parse::<CanAddressing>().unwrap(), CanAddressing::Extended);
        assert!("mixed".parse::<CanAddressing>().is_err());
    }

    #[test]
    fn test_kline_flags() {
        let single = Protocol::iso9141(10400, &[7], false).unwrap();
        assert_eq!(
            single.flags(),
            ConnectFlags::K_LINE_ONLY | ConnectFlags::CHECKSUM_DISABLED
        );

        let dual_checked = Protocol::iso14230(10400, &[7, 15], true).unwrap();
        assert_eq!(dual_checked.flags(), ConnectFlags::empty());
    }

    #[test]
    fn test_non_shared_buses_have_no_flags() {
        assert!(Protocol::j1850vpw(41600).unwrap().flags().is_empty());
        assert!(Protocol::j1850pwm(10400).unwrap().flags().is_empty());
        assert!(Protocol::j2610(62500, &[15, 9]).unwrap().flags().is_empty());
    }

    #[test]
    fn test_validate_catches_hand_built_values() {
        let protocol = Protocol::Can(CanParams {
            baudrate: 33_333,
            addressing: CanAddressing::Standard,
        });
        assert!(protocol.validate().is_err());
    }

    #[test]
    fn test_variant_params_expose_validated_values() {
        match Protocol::iso14230(10400, &[7], true).unwrap() {
            Protocol::Iso14230(params) => {
                assert_eq!(params.baudrate(), 10400);
                assert_eq!(params.pins(), &[7u8][..]);
                assert!(params.checksum());
            }
            other => panic!("unexpected variant {:?}", other),
        }

        match Protocol::iso15765(250_000, CanAddressing::Extended).unwrap() {
            Protocol::Iso15765(params) => {
                assert_eq!(params.baudrate(), 250_000);
                assert_eq!(params.addressing(), CanAddressing::Extended);
            }
            other => panic!("unexpected variant {:?}", other),
        }
    }

    #[test]
    fn test_protocol_id_values() {
        assert_eq!(ProtocolId::from(0x06), ProtocolId::Iso15765);
        assert_eq!(ProtocolId::from(0x200), ProtocolId::Iso15765Logical);
        assert_eq!(ProtocolId::from(0x8000), ProtocolId::Other(0x8000));
        assert_eq!(u32::from(ProtocolId::Other(0x8000)), 0x8000);
        assert!(ProtocolId::Iso15765Logical.is_iso15765());
        assert!(!ProtocolId::Can.is_iso15765());
    }
}
