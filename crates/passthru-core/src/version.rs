//! PassThru API versions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Published J2534-1 API revisions supported by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ApiVersion {
    /// 04.04 (2004): inline message buffers, scalar connect parameters
    V0404,
    /// 05.00 (2015): out-of-band message buffers, resources, logical channels
    V0500,
}

impl ApiVersion {
    pub fn major(self) -> u8 {
        match self {
            Self::V0404 => 4,
            Self::V0500 => 5,
        }
    }

    pub fn minor(self) -> u8 {
        match self {
            Self::V0404 => 4,
            Self::V0500 => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::V0404 => "04.04",
            Self::V0500 => "05.00",
        }
    }
}

impl Default for ApiVersion {
    fn default() -> Self {
        Self::V0404
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiVersion {
    type Err = ValidationError;

    /// Accepts "04.04", "4.4", "05.00", "5.0" and "5"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut parts = s.splitn(2, '.');
        let major = parts.next().and_then(|p| p.parse::<u8>().ok());
        let minor = match parts.next() {
            Some(p) => p.parse::<u8>().ok(),
            None => Some(0),
        };

        match (major, minor) {
            (Some(4), Some(4)) => Ok(Self::V0404),
            (Some(5), Some(0)) => Ok(Self::V0500),
            _ => Err(ValidationError::UnknownApiVersion(s.to_string())),
        }
    }
}

impl TryFrom<String> for ApiVersion {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ApiVersion> for String {
    fn from(version: ApiVersion) -> Self {
        version.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_versions() {
        assert_eq!("04.04".parse::<ApiVersion>().unwrap(), ApiVersion::V0404);
        assert_eq!("4.4".parse::<ApiVersion>().unwrap(), ApiVersion::V0404);
        assert_eq!("05.00".parse::<ApiVersion>().unwrap(), ApiVersion::V0500);
        assert_eq!(" 5 ".parse::<ApiVersion>().unwrap(), ApiVersion::V0500);
        assert!("02.02".parse::<ApiVersion>().is_err());
        assert!("five".parse::<ApiVersion>().is_err());
    }

    #[test]
    fn test_ordering() {
        assert!(ApiVersion::V0404 < ApiVersion::V0500);
        assert_eq!(ApiVersion::V0500.to_string(), "05.00");
    }
}
