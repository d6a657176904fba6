//! Connection configuration for `PassThruConnect`

use crate::error::ValidationError;
use crate::protocol::{ConnectFlags, Connector, Protocol, ProtocolId};

/// A protocol that has passed catalog validation, ready to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    protocol: Protocol,
}

impl ConnectionConfig {
    /// Wrap a protocol, rejecting values outside its family tables
    pub fn new(protocol: Protocol) -> Result<Self, ValidationError> {
        protocol.validate()?;
        Ok(Self { protocol })
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn protocol_id(&self) -> ProtocolId {
        self.protocol.id()
    }

    pub fn flags(&self) -> ConnectFlags {
        self.protocol.flags()
    }

    pub fn baudrate(&self) -> u32 {
        self.protocol.baudrate()
    }

    pub fn pins(&self) -> Option<&[u8]> {
        self.protocol.pins()
    }

    /// Only the J1962 connector is supported
    pub fn connector(&self) -> Connector {
        Connector::J1962
    }

    /// Pins to list in a 05.00 resource structure: the caller's choice, or
    /// the family's default combination
    pub fn resource_pins(&self) -> Vec<u32> {
        let pins = self
            .pins()
            .unwrap_or_else(|| self.protocol.kind().default_pins());
        pins.iter().map(|&p| u32::from(p)).collect()
    }
}

impl TryFrom<Protocol> for ConnectionConfig {
    type Error = ValidationError;

    fn try_from(protocol: Protocol) -> Result<Self, Self::Error> {
        Self::new(protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{BusParams, CanAddressing};

    #[test]
    fn test_derived_properties() {
        let config =
            ConnectionConfig::new(Protocol::iso15765(500_000, CanAddressing::Both).unwrap())
                .unwrap();
        assert_eq!(config.protocol_id(), ProtocolId::Iso15765);
        assert_eq!(config.flags(), ConnectFlags::CAN_ID_BOTH);
        assert_eq!(config.baudrate(), 500_000);
        assert_eq!(config.pins(), None);
        assert_eq!(config.connector(), Connector::J1962);
        assert_eq!(config.resource_pins(), vec![6, 14]);
    }

    #[test]
    fn test_rejects_non_conforming_protocol() {
        let bad = Protocol::J1850Vpw(BusParams { baudrate: 9600 });
        assert!(ConnectionConfig::new(bad).is_err());
    }

    #[test]
    fn test_resource_pins_follow_caller_choice() {
        let config = ConnectionConfig::try_from(Protocol::iso9141(10400, &[7], true).unwrap())
            .unwrap();
        assert_eq!(config.resource_pins(), vec![7]);
    }
}
