//! Logical PassThru message
//!
//! Both wire layouts share a header (protocol, rx status, tx flags, timestamp,
//! data size, extra data index). The logical message keeps the primary
//! payload and the trailing extra bytes apart.

use std::fmt;

use bitflags::bitflags;

use crate::protocol::ProtocolId;

bitflags! {
    /// Receive status bits reported with each read message
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RxStatus: u32 {
        const TX_MSG_TYPE = 0x0000_0001;
        const START_OF_MESSAGE = 0x0000_0002;
        const RX_BREAK = 0x0000_0004;
        const TX_INDICATION = 0x0000_0008;
        const ISO15765_PADDING_ERROR = 0x0000_0010;
        const ISO15765_ADDR_TYPE = 0x0000_0080;
        const CAN_29BIT_ID = 0x0000_0100;
    }
}

bitflags! {
    /// Transmit flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TxFlags: u32 {
        const ISO15765_FRAME_PAD = 0x0000_0040;
        const ISO15765_ADDR_TYPE = 0x0000_0080;
        const CAN_29BIT_ID = 0x0000_0100;
        const WAIT_P3_MIN_ONLY = 0x0000_0200;
        const SCI_MODE = 0x0040_0000;
        const SCI_TX_VOLTAGE = 0x0080_0000;
    }
}

/// Header fields common to the 04.04 and 05.00 records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    pub protocol_id: u32,
    pub rx_status: u32,
    pub tx_flags: u32,
    pub timestamp: u32,
    pub data_size: u32,
    pub extra_data_index: u32,
}

/// A message as seen by callers
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    pub protocol: ProtocolId,
    pub rx_status: RxStatus,
    pub tx_flags: TxFlags,
    /// Microseconds, as stamped by the device
    pub timestamp: u32,
    /// Primary payload
    pub data: Vec<u8>,
    /// Bytes past the extra data index (protocol indications)
    pub extra: Vec<u8>,
}

impl Message {
    pub fn new(protocol: ProtocolId, data: impl Into<Vec<u8>>) -> Self {
        Self {
            protocol,
            rx_status: RxStatus::empty(),
            tx_flags: TxFlags::empty(),
            timestamp: 0,
            data: data.into(),
            extra: Vec::new(),
        }
    }

    pub fn with_tx_flags(mut self, tx_flags: TxFlags) -> Self {
        self.tx_flags = tx_flags;
        self
    }

    pub fn with_rx_status(mut self, rx_status: RxStatus) -> Self {
        self.rx_status = rx_status;
        self
    }

    pub fn with_extra(mut self, extra: impl Into<Vec<u8>>) -> Self {
        self.extra = extra.into();
        self
    }

    /// Total bytes on the wire: payload plus extra
    pub fn data_size(&self) -> usize {
        self.data.len() + self.extra.len()
    }

    /// Offset where the extra bytes begin
    pub fn extra_data_index(&self) -> usize {
        self.data.len()
    }

    /// Payload and extra bytes as one contiguous buffer
    pub fn wire_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.data_size());
        bytes.extend_from_slice(&self.data);
        bytes.extend_from_slice(&self.extra);
        bytes
    }

    /// Header for encoding. Sizes are truncated to `u32`; callers check
    /// capacity first.
    pub fn header(&self) -> MessageHeader {
        MessageHeader {
            protocol_id: self.protocol.value(),
            rx_status: self.rx_status.bits(),
            tx_flags: self.tx_flags.bits(),
            timestamp: self.timestamp,
            data_size: self.data_size() as u32,
            extra_data_index: self.extra_data_index() as u32,
        }
    }

    /// Rebuild a message from a header and exactly `data_size` bytes.
    ///
    /// Splits at the extra data index when it falls inside the payload;
    /// otherwise `extra` is empty.
    pub fn from_parts(header: &MessageHeader, payload: &[u8]) -> Self {
        let split = (header.extra_data_index as usize).min(payload.len());
        Self {
            protocol: ProtocolId::from(header.protocol_id),
            rx_status: RxStatus::from_bits_retain(header.rx_status),
            tx_flags: TxFlags::from_bits_retain(header.tx_flags),
            timestamp: header.timestamp,
            data: payload[..split].to_vec(),
            extra: payload[split..].to_vec(),
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("protocol", &self.protocol)
            .field("rx_status", &self.rx_status)
            .field("tx_flags", &self.tx_flags)
            .field("timestamp", &self.timestamp)
            .field("data", &hex::encode(&self.data))
            .field("extra", &hex::encode(&self.extra))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn header(data_size: u32, extra_data_index: u32) -> MessageHeader {
        MessageHeader {
            protocol_id: 0x06,
            rx_status: RxStatus::START_OF_MESSAGE.bits(),
            tx_flags: TxFlags::ISO15765_FRAME_PAD.bits(),
            timestamp: 1234,
            data_size,
            extra_data_index,
        }
    }

    #[test]
    fn test_no_extra_when_index_equals_size() {
        let payload = [0x00, 0x00, 0x07, 0xE8, 0x50, 0x03];
        let msg = Message::from_parts(&header(6, 6), &payload);
        assert_eq!(msg.data, payload.to_vec());
        assert!(msg.extra.is_empty());
        assert_eq!(msg.protocol, ProtocolId::Iso15765);
        assert_eq!(msg.timestamp, 1234);
    }

    #[test]
    fn test_split_at_extra_data_index() {
        let payload = [0x00, 0x00, 0x07, 0xE8, 0xAA, 0xBB];
        let msg = Message::from_parts(&header(6, 4), &payload);
        assert_eq!(msg.data, vec![0x00, 0x00, 0x07, 0xE8]);
        assert_eq!(msg.extra, vec![0xAA, 0xBB]);
        assert_eq!(msg.wire_bytes(), payload.to_vec());
        assert_eq!(msg.header(), header(6, 4));
    }

    #[test]
    fn test_index_past_end_means_no_extra() {
        let payload = [0x01, 0x02];
        let msg = Message::from_parts(&header(2, 40), &payload);
        assert_eq!(msg.data, vec![0x01, 0x02]);
        assert!(msg.extra.is_empty());
    }

    #[test]
    fn test_unknown_flag_bits_are_preserved() {
        let mut h = header(0, 0);
        h.rx_status = 0x8000_0001;
        let msg = Message::from_parts(&h, &[]);
        assert_eq!(msg.rx_status.bits(), 0x8000_0001);
        assert_eq!(msg.header().rx_status, 0x8000_0001);
    }
}
