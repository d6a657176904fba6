//! Numeric identifiers from the J2534-1 figures
//!
//! Grouped per namespace so call sites read as `ioctl_id::GET_CONFIG`.

use std::fmt;

/// `IoctlID` values (Figure 92)
pub mod ioctl_id {
    pub const GET_CONFIG: u32 = 0x01;
    pub const SET_CONFIG: u32 = 0x02;
    pub const READ_PIN_VOLTAGE: u32 = 0x03;
    pub const FIVE_BAUD_INIT: u32 = 0x04;
    pub const FAST_INIT: u32 = 0x05;
    pub const CLEAR_TX_QUEUE: u32 = 0x07;
    pub const CLEAR_RX_QUEUE: u32 = 0x08;
    pub const CLEAR_PERIODIC_MSGS: u32 = 0x09;
    pub const CLEAR_MSG_FILTERS: u32 = 0x0A;
    pub const CLEAR_FUNCT_MSG_LOOKUP_TABLE: u32 = 0x0B;
    pub const ADD_TO_FUNCT_MSG_LOOKUP_TABLE: u32 = 0x0C;
    pub const DELETE_FROM_FUNCT_MSG_LOOKUP_TABLE: u32 = 0x0D;
    pub const READ_PROG_VOLTAGE: u32 = 0x0E;
    pub const BUS_ON: u32 = 0x0F;
}

/// `SCONFIG.Parameter` ids for GET_CONFIG / SET_CONFIG
pub mod config_param {
    pub const DATA_RATE: u32 = 0x01;
    pub const LOOPBACK: u32 = 0x03;
    pub const NODE_ADDRESS: u32 = 0x04;
    pub const NETWORK_LINE: u32 = 0x05;
    pub const P1_MIN: u32 = 0x06;
    pub const P1_MAX: u32 = 0x07;
    pub const P2_MIN: u32 = 0x08;
    pub const P2_MAX: u32 = 0x09;
    pub const P3_MIN: u32 = 0x0A;
    pub const P3_MAX: u32 = 0x0B;
    pub const P4_MIN: u32 = 0x0C;
    pub const P4_MAX: u32 = 0x0D;
    pub const W1_MAX: u32 = 0x0E;
    pub const W2_MAX: u32 = 0x0F;
    pub const W3_MAX: u32 = 0x10;
    pub const W4_MIN: u32 = 0x11;
    pub const W5_MIN: u32 = 0x12;
    pub const TIDLE: u32 = 0x13;
    pub const TINIL: u32 = 0x14;
    pub const TWUP: u32 = 0x15;
    pub const PARITY: u32 = 0x16;
    pub const W0_MIN: u32 = 0x19;
    pub const T1_MAX: u32 = 0x1A;
    pub const T2_MIN: u32 = 0x1B;
    pub const T4_MAX: u32 = 0x1C;
    pub const T5_MIN: u32 = 0x1D;
    pub const ISO15765_BS: u32 = 0x1E;
    pub const ISO15765_STMIN: u32 = 0x1F;
    pub const DATA_BITS: u32 = 0x20;
    pub const FIVE_BAUD_MOD: u32 = 0x21;
    pub const BS_TX: u32 = 0x22;
    pub const STMIN_TX: u32 = 0x23;
    pub const T3_MAX: u32 = 0x24;
    pub const ISO15765_WAIT_LIMIT: u32 = 0x25;
    pub const W1_MIN: u32 = 0x26;
    pub const W2_MIN: u32 = 0x27;
    pub const W3_MIN: u32 = 0x28;
    pub const W4_MAX: u32 = 0x29;
    pub const N_BR_MIN: u32 = 0x2A;
    pub const ISO15765_PAD_VALUE: u32 = 0x2B;
    pub const N_AS_MAX: u32 = 0x2C;
    pub const N_AR_MAX: u32 = 0x2D;
    pub const N_BS_MAX: u32 = 0x2E;
    pub const N_CR_MAX: u32 = 0x2F;
    pub const N_CS_MIN: u32 = 0x30;
    pub const ECHO_PHYSICAL_CHANNEL_TX: u32 = 0x31;
}

/// Values for the enumerated config parameters
pub mod config_value {
    pub const BUS_NORMAL: u32 = 0;
    pub const BUS_PLUS: u32 = 1;
    pub const BUS_MINUS: u32 = 2;

    pub const NO_PARITY: u32 = 0;
    pub const ODD_PARITY: u32 = 1;
    pub const EVEN_PARITY: u32 = 2;

    pub const DATA_BITS_8: u32 = 0;
    pub const DATA_BITS_7: u32 = 1;

    pub const ISO_STD_INIT: u32 = 0;
    pub const ISO_INV_KB2: u32 = 1;
    pub const ISO_INV_ADD: u32 = 2;
    pub const ISO_9141_STD: u32 = 3;

    pub const DISABLE_ECHO: u32 = 0;
    pub const ENABLE_ECHO: u32 = 1;
}

/// `SelectType` (Figure 89)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectType {
    Readable,
}

impl SelectType {
    pub fn value(self) -> u32 {
        match self {
            Self::Readable => 0x01,
        }
    }
}

/// Programming voltage argument (Figure 91)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Voltage {
    /// 5000..=20000 mV on the selected pin
    Millivolts(u32),
    ShortToGround,
    PinOff,
}

impl Voltage {
    pub const SHORT_TO_GROUND: u32 = 0xFFFF_FFFE;
    pub const PIN_OFF: u32 = 0xFFFF_FFFF;

    pub fn value(self) -> u32 {
        match self {
            Self::Millivolts(mv) => mv,
            Self::ShortToGround => Self::SHORT_TO_GROUND,
            Self::PinOff => Self::PIN_OFF,
        }
    }
}

impl From<u32> for Voltage {
    fn from(value: u32) -> Self {
        match value {
            Self::SHORT_TO_GROUND => Self::ShortToGround,
            Self::PIN_OFF => Self::PinOff,
            mv => Self::Millivolts(mv),
        }
    }
}

impl fmt::Display for Voltage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Millivolts(mv) => write!(f, "{} mV", mv),
            Self::ShortToGround => write!(f, "short to ground"),
            Self::PinOff => write!(f, "pin off"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voltage_values() {
        assert_eq!(Voltage::Millivolts(12_000).value(), 12_000);
        assert_eq!(Voltage::ShortToGround.value(), 0xFFFF_FFFE);
        assert_eq!(Voltage::PinOff.value(), 0xFFFF_FFFF);
        assert_eq!(Voltage::from(0xFFFF_FFFE), Voltage::ShortToGround);
        assert_eq!(Voltage::from(7000), Voltage::Millivolts(7000));
    }

    #[test]
    fn test_select_type() {
        assert_eq!(SelectType::Readable.value(), 1);
    }
}
