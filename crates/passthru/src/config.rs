//! Session configuration
//!
//! A TOML file naming the API version, the device to open and the bus to
//! connect:
//!
//! ```toml
//! api_version = "04.04"
//! device = "J2534-1:ExampleUdsDev"
//!
//! [protocol]
//! type = "iso15765"
//! baudrate = 500000
//! addressing = "both"
//! ```
//!
//! Values are validated against the protocol catalog when loaded; an
//! unsupported baud rate or pin set is an error, never clamped.

use std::path::Path;

use passthru_core::raw::{MAX_MSG5_BUFFER_SIZE, PASSTHRU_MSG_DATA_SIZE};
use passthru_core::{
    ApiVersion, CanAddressing, ConnectionConfig, Protocol, ProtocolKind, ValidationError,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for a device session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// API revision the library implements
    #[serde(default)]
    pub api_version: ApiVersion,
    /// Device name passed to `PassThruOpen` (default device when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Per-message payload buffer for 05.00 reads
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Bus to connect
    pub protocol: ProtocolConfig,
}

fn default_read_buffer_size() -> usize {
    PASSTHRU_MSG_DATA_SIZE
}

/// Bus protocol and its parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProtocolConfig {
    J1850Vpw {
        #[serde(default = "default_vpw_baudrate")]
        baudrate: u32,
    },
    J1850Pwm {
        #[serde(default = "default_kline_baudrate")]
        baudrate: u32,
    },
    Iso9141 {
        #[serde(default = "default_kline_baudrate")]
        baudrate: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pins: Option<Vec<u8>>,
        #[serde(default)]
        checksum: bool,
    },
    Iso14230 {
        #[serde(default = "default_kline_baudrate")]
        baudrate: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pins: Option<Vec<u8>>,
        #[serde(default)]
        checksum: bool,
    },
    Can {
        #[serde(default = "default_can_baudrate")]
        baudrate: u32,
        #[serde(default = "default_addressing")]
        addressing: String,
    },
    Iso15765 {
        #[serde(default = "default_can_baudrate")]
        baudrate: u32,
        #[serde(default = "default_addressing")]
        addressing: String,
    },
    J2610 {
        baudrate: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pins: Option<Vec<u8>>,
    },
}

fn default_vpw_baudrate() -> u32 {
    10400
}

fn default_kline_baudrate() -> u32 {
    10400
}

fn default_can_baudrate() -> u32 {
    500000
}

fn default_addressing() -> String {
    "standard".to_string()
}

impl ProtocolConfig {
    /// Build the validated protocol, using the family's default pins when
    /// none are configured
    pub fn to_protocol(&self) -> Result<Protocol, ValidationError> {
        match self {
            Self::J1850Vpw { baudrate } => Protocol::j1850vpw(*baudrate),
            Self::J1850Pwm { baudrate } => Protocol::j1850pwm(*baudrate),
            Self::Iso9141 {
                baudrate,
                pins,
                checksum,
            } => {
                let pins = pins_or_default(pins, ProtocolKind::Iso9141);
                Protocol::iso9141(*baudrate, pins, *checksum)
            }
            Self::Iso14230 {
                baudrate,
                pins,
                checksum,
            } => {
                let pins = pins_or_default(pins, ProtocolKind::Iso14230);
                Protocol::iso14230(*baudrate, pins, *checksum)
            }
            Self::Can {
                baudrate,
                addressing,
            } => Protocol::can(*baudrate, addressing.parse::<CanAddressing>()?),
            Self::Iso15765 {
                baudrate,
                addressing,
            } => Protocol::iso15765(*baudrate, addressing.parse::<CanAddressing>()?),
            Self::J2610 { baudrate, pins } => {
                let pins = pins_or_default(pins, ProtocolKind::J2610);
                Protocol::j2610(*baudrate, pins)
            }
        }
    }
}

fn pins_or_default(pins: &Option<Vec<u8>>, kind: ProtocolKind) -> &[u8] {
    pins.as_deref().unwrap_or_else(|| kind.default_pins())
}

impl TryFrom<&ProtocolConfig> for Protocol {
    type Error = ValidationError;

    fn try_from(config: &ProtocolConfig) -> Result<Self, Self::Error> {
        config.to_protocol()
    }
}

impl SessionConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the protocol, device name and read buffer size
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.connection()?;
        if let Some(device) = &self.device {
            if device.contains('\0') {
                return Err(ValidationError::InvalidDeviceName);
            }
        }
        if !(1..=MAX_MSG5_BUFFER_SIZE).contains(&self.read_buffer_size) {
            return Err(ValidationError::InvalidBufferSize {
                size: self.read_buffer_size,
                max: MAX_MSG5_BUFFER_SIZE,
            });
        }
        Ok(())
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Connection configuration for `DeviceSession::connect`
    pub fn connection(&self) -> Result<ConnectionConfig, ValidationError> {
        ConnectionConfig::new(self.protocol.to_protocol()?)
    }
}
