//! Receive filter builder
//!
//! A flow-control filter is three messages sharing one header template
//! (ISO 15765, caller rx status and tx flags, data size and extra data index
//! both equal to the filter width). Payloads are the big-endian bytes of the
//! mask, pattern and flow-control id.

use std::fmt;

use crate::error::{FilterError, ValidationError};
use crate::message::{Message, RxStatus, TxFlags};
use crate::protocol::ProtocolId;
use crate::raw::PassThruMsg4;
use crate::version::ApiVersion;

/// Width used when the caller does not give one (a 29-bit CAN id fits)
pub const DEFAULT_FILTER_SIZE: usize = 4;

/// Widest filter an integer value can describe
pub const MAX_FILTER_SIZE: usize = 8;

/// `FilterType` (Figure 90)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Pass,
    Block,
    FlowControl,
}

impl FilterKind {
    pub fn value(self) -> u32 {
        match self {
            Self::Pass => 0x01,
            Self::Block => 0x02,
            Self::FlowControl => 0x03,
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pass => "pass",
            Self::Block => "block",
            Self::FlowControl => "flow-control",
        };
        f.write_str(name)
    }
}

/// Big-endian bytes of `value`, exactly `size` long
pub fn pack_be(field: &'static str, value: u64, size: usize) -> Result<Vec<u8>, ValidationError> {
    if size == 0 || size > MAX_FILTER_SIZE {
        return Err(ValidationError::InvalidFilterSize(size));
    }
    if size < MAX_FILTER_SIZE && value >> (8 * size) != 0 {
        return Err(ValidationError::FilterValueTooWide { field, value, size });
    }
    Ok(value.to_be_bytes()[MAX_FILTER_SIZE - size..].to_vec())
}

/// A validated filter description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    kind: FilterKind,
    size: usize,
    mask: Vec<u8>,
    pattern: Vec<u8>,
    flow: Vec<u8>,
    rx_status: RxStatus,
    tx_flags: TxFlags,
}

/// Encoding A records ready for `PassThruStartMsgFilter`
#[derive(Debug, Clone)]
pub struct FilterRecords {
    pub mask: Box<PassThruMsg4>,
    pub pattern: Box<PassThruMsg4>,
    pub flow: Box<PassThruMsg4>,
}

impl FilterSpec {
    /// Pass filters are not built here
    pub fn pass(_mask: u64, _pattern: u64) -> Result<Self, FilterError> {
        Err(FilterError::KindNotSupported(FilterKind::Pass))
    }

    /// Block filters are not built here
    pub fn block(_mask: u64, _pattern: u64) -> Result<Self, FilterError> {
        Err(FilterError::KindNotSupported(FilterKind::Block))
    }

    /// Flow-control filter of the default 4-byte width
    pub fn flow_control(pattern: u64, mask: u64, flow: u64) -> Result<Self, FilterError> {
        Self::flow_control_sized(pattern, mask, flow, DEFAULT_FILTER_SIZE)
    }

    pub fn flow_control_sized(
        pattern: u64,
        mask: u64,
        flow: u64,
        size: usize,
    ) -> Result<Self, FilterError> {
        Ok(Self {
            kind: FilterKind::FlowControl,
            size,
            mask: pack_be("mask", mask, size)?,
            pattern: pack_be("pattern", pattern, size)?,
            flow: pack_be("flow", flow, size)?,
            rx_status: RxStatus::empty(),
            tx_flags: TxFlags::empty(),
        })
    }

    /// Flow-control filter from raw byte strings, all `size` long
    pub fn from_bytes(
        pattern: &[u8],
        mask: &[u8],
        flow: &[u8],
        size: usize,
    ) -> Result<Self, FilterError> {
        if size == 0 || size > crate::raw::PASSTHRU_MSG_DATA_SIZE {
            return Err(ValidationError::InvalidFilterSize(size).into());
        }
        for (field, bytes) in [("mask", mask), ("pattern", pattern), ("flow", flow)] {
            if bytes.len() != size {
                return Err(ValidationError::FilterWidthMismatch {
                    field,
                    len: bytes.len(),
                    size,
                }
                .into());
            }
        }
        Ok(Self {
            kind: FilterKind::FlowControl,
            size,
            mask: mask.to_vec(),
            pattern: pattern.to_vec(),
            flow: flow.to_vec(),
            rx_status: RxStatus::empty(),
            tx_flags: TxFlags::empty(),
        })
    }

    pub fn with_rx_status(mut self, rx_status: RxStatus) -> Self {
        self.rx_status = rx_status;
        self
    }

    pub fn with_tx_flags(mut self, tx_flags: TxFlags) -> Self {
        self.tx_flags = tx_flags;
        self
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn mask(&self) -> &[u8] {
        &self.mask
    }

    pub fn pattern(&self) -> &[u8] {
        &self.pattern
    }

    pub fn flow(&self) -> &[u8] {
        &self.flow
    }

    pub fn rx_status(&self) -> RxStatus {
        self.rx_status
    }

    pub fn tx_flags(&self) -> TxFlags {
        self.tx_flags
    }

    fn template(&self, payload: &[u8]) -> Message {
        Message::new(ProtocolId::Iso15765, payload)
            .with_rx_status(self.rx_status)
            .with_tx_flags(self.tx_flags)
    }

    /// Logical mask, pattern and flow messages, in that order
    pub fn messages(&self) -> [Message; 3] {
        [
            self.template(&self.mask),
            self.template(&self.pattern),
            self.template(&self.flow),
        ]
    }

    /// Encode for the given API version. Only 04.04 records are produced.
    pub fn encode(&self, version: ApiVersion) -> Result<FilterRecords, FilterError> {
        if version != ApiVersion::V0404 {
            return Err(FilterError::EncodingNotSupported(version));
        }
        let [mask, pattern, flow] = self.messages();
        Ok(FilterRecords {
            mask: PassThruMsg4::from_message(&mask)?,
            pattern: PassThruMsg4::from_message(&pattern)?,
            flow: PassThruMsg4::from_message(&flow)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0xED, 4, vec![0x00, 0x00, 0x00, 0xED])]
    #[case(0x7E0, 2, vec![0x07, 0xE0])]
    #[case(0x18DA_F110, 4, vec![0x18, 0xDA, 0xF1, 0x10])]
    #[case(0xFF, 1, vec![0xFF])]
    #[case(u64::MAX, 8, vec![0xFF; 8])]
    fn test_pack_big_endian(#[case] value: u64, #[case] size: usize, #[case] expected: Vec<u8>) {
        assert_eq!(pack_be("pattern", value, size).unwrap(), expected);
    }

    #[rstest]
    #[case(0x100, 1)]
    #[case(0x1_0000_0000, 4)]
    fn test_pack_rejects_wide_values(#[case] value: u64, #[case] size: usize) {
        assert_eq!(
            pack_be("mask", value, size).unwrap_err(),
            ValidationError::FilterValueTooWide {
                field: "mask",
                value,
                size
            }
        );
    }

    #[rstest]
    #[case(0)]
    #[case(9)]
    fn test_pack_rejects_bad_size(#[case] size: usize) {
        assert_eq!(
            pack_be("flow", 1, size).unwrap_err(),
            ValidationError::InvalidFilterSize(size)
        );
    }

    #[test]
    fn test_flow_control_payloads() {
        let filter = FilterSpec::flow_control(0x0000_00ED, 0xFFFF_FFFF, 0x0000_00F1).unwrap();
        assert_eq!(filter.kind(), FilterKind::FlowControl);
        assert_eq!(filter.size(), 4);
        assert_eq!(filter.pattern(), &[0x00, 0x00, 0x00, 0xED]);
        assert_eq!(filter.mask(), &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(filter.flow(), &[0x00, 0x00, 0x00, 0xF1]);
    }

    #[test]
    fn test_messages_share_header_template() {
        let filter = FilterSpec::flow_control(0x7E8, 0xFFFF_FFFF, 0x7E0)
            .unwrap()
            .with_tx_flags(TxFlags::ISO15765_FRAME_PAD);

        let [mask, pattern, flow] = filter.messages();
        for msg in [&mask, &pattern, &flow] {
            assert_eq!(msg.protocol, ProtocolId::Iso15765);
            assert_eq!(msg.tx_flags, TxFlags::ISO15765_FRAME_PAD);
            assert_eq!(msg.header().data_size, 4);
            assert_eq!(msg.header().extra_data_index, 4);
        }
        assert_eq!(mask.data, vec![0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(pattern.data, vec![0x00, 0x00, 0x07, 0xE8]);
        assert_eq!(flow.data, vec![0x00, 0x00, 0x07, 0xE0]);
    }

    #[test]
    fn test_encode_v4_records() {
        let filter = FilterSpec::flow_control_sized(0x7E8, 0x7FF, 0x7E0, 2).unwrap();
        let records = filter.encode(ApiVersion::V0404).unwrap();

        assert_eq!(records.mask.protocol_id, 0x06);
        assert_eq!(records.mask.data_size, 2);
        assert_eq!(records.mask.extra_data_index, 2);
        assert_eq!(&records.mask.data[..2], &[0x07, 0xFF]);
        assert_eq!(&records.pattern.data[..2], &[0x07, 0xE8]);
        assert_eq!(&records.flow.data[..2], &[0x07, 0xE0]);
    }

    #[test]
    fn test_encode_v5_not_supported() {
        let filter = FilterSpec::flow_control(1, 2, 3).unwrap();
        assert_eq!(
            filter.encode(ApiVersion::V0500).unwrap_err(),
            FilterError::EncodingNotSupported(ApiVersion::V0500)
        );
    }

    #[test]
    fn test_pass_and_block_fail_fast() {
        assert_eq!(
            FilterSpec::pass(0xFF, 0x01).unwrap_err(),
            FilterError::KindNotSupported(FilterKind::Pass)
        );
        assert_eq!(
            FilterSpec::block(0xFF, 0x01).unwrap_err(),
            FilterError::KindNotSupported(FilterKind::Block)
        );
    }

    #[test]
    fn test_from_bytes_width_mismatch() {
        let err = FilterSpec::from_bytes(&[0, 0, 7, 0xE8], &[0xFF; 3], &[0, 0, 7, 0xE0], 4)
            .unwrap_err();
        assert_eq!(
            err,
            FilterError::Invalid(ValidationError::FilterWidthMismatch {
                field: "mask",
                len: 3,
                size: 4
            })
        );
    }
}
