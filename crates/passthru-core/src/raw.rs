//! Native record layouts
//!
//! `#[repr(C)]` structures exchanged with the vendor library. All integer
//! fields are 32-bit unsigned, matching `unsigned long` on the Windows ABI
//! the standard targets.

use std::fmt;
use std::ptr;

use crate::error::ValidationError;
use crate::message::{Message, MessageHeader};

/// Inline payload capacity of the 04.04 record (4096 + 32)
pub const PASSTHRU_MSG_DATA_SIZE: usize = 4128;

/// Length of the `SDEVICE` name buffer
pub const DEVICE_NAME_LEN: usize = 80;

/// Length of the version and last-error string buffers
pub const STRING_BUFFER_LEN: usize = 80;

/// Largest per-message buffer a 05.00 read allocates
pub const MAX_MSG5_BUFFER_SIZE: usize = 1 << 20;

/// Read a NUL-terminated ASCII buffer
pub fn read_c_str(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// `PASSTHRU_MSG` as defined by 04.04
#[repr(C)]
#[derive(Clone)]
pub struct PassThruMsg4 {
    pub protocol_id: u32,
    pub rx_status: u32,
    pub tx_flags: u32,
    pub timestamp: u32,
    pub data_size: u32,
    pub extra_data_index: u32,
    pub data: [u8; PASSTHRU_MSG_DATA_SIZE],
}

impl Default for PassThruMsg4 {
    fn default() -> Self {
        Self {
            protocol_id: 0,
            rx_status: 0,
            tx_flags: 0,
            timestamp: 0,
            data_size: 0,
            extra_data_index: 0,
            data: [0; PASSTHRU_MSG_DATA_SIZE],
        }
    }
}

impl PassThruMsg4 {
    /// Encode a message, failing if it does not fit the inline buffer
    pub fn from_message(msg: &Message) -> Result<Box<Self>, ValidationError> {
        let len = msg.data_size();
        if len > PASSTHRU_MSG_DATA_SIZE {
            return Err(ValidationError::PayloadTooLarge {
                len,
                capacity: PASSTHRU_MSG_DATA_SIZE,
            });
        }

        let mut record = Box::<Self>::default();
        record.set_header(&msg.header());
        record.data[..msg.data.len()].copy_from_slice(&msg.data);
        record.data[msg.data.len()..len].copy_from_slice(&msg.extra);
        Ok(record)
    }

    pub fn header(&self) -> MessageHeader {
        MessageHeader {
            protocol_id: self.protocol_id,
            rx_status: self.rx_status,
            tx_flags: self.tx_flags,
            timestamp: self.timestamp,
            data_size: self.data_size,
            extra_data_index: self.extra_data_index,
        }
    }

    pub fn set_header(&mut self, header: &MessageHeader) {
        self.protocol_id = header.protocol_id;
        self.rx_status = header.rx_status;
        self.tx_flags = header.tx_flags;
        self.timestamp = header.timestamp;
        self.data_size = header.data_size;
        self.extra_data_index = header.extra_data_index;
    }

    /// The `data_size` bytes in use
    pub fn payload(&self) -> Result<&[u8], ValidationError> {
        let len = self.data_size as usize;
        self.data.get(..len).ok_or_else(|| {
            ValidationError::MalformedRecord(format!(
                "DataSize {} exceeds the {}-byte buffer",
                len, PASSTHRU_MSG_DATA_SIZE
            ))
        })
    }

    pub fn to_message(&self) -> Result<Message, ValidationError> {
        Ok(Message::from_parts(&self.header(), self.payload()?))
    }
}

impl fmt::Debug for PassThruMsg4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = (self.data_size as usize).min(PASSTHRU_MSG_DATA_SIZE);
        f.debug_struct("PassThruMsg4")
            .field("protocol_id", &self.protocol_id)
            .field("rx_status", &format_args!("0x{:08X}", self.rx_status))
            .field("tx_flags", &format_args!("0x{:08X}", self.tx_flags))
            .field("timestamp", &self.timestamp)
            .field("data_size", &self.data_size)
            .field("extra_data_index", &self.extra_data_index)
            .field("data", &hex::encode(&self.data[..shown]))
            .finish()
    }
}

/// `PASSTHRU_MSG` as defined by 05.00
///
/// The payload lives in a caller-owned buffer referenced by `data_buffer`.
#[repr(C)]
#[derive(Debug)]
pub struct PassThruMsg5 {
    pub protocol_id: u32,
    pub message_handle: u32,
    pub rx_status: u32,
    pub tx_flags: u32,
    pub timestamp: u32,
    pub data_length: u32,
    pub extra_data_index: u32,
    pub data_buffer: *mut u8,
    pub data_buffer_size: u32,
}

impl Default for PassThruMsg5 {
    fn default() -> Self {
        Self {
            protocol_id: 0,
            message_handle: 0,
            rx_status: 0,
            tx_flags: 0,
            timestamp: 0,
            data_length: 0,
            extra_data_index: 0,
            data_buffer: ptr::null_mut(),
            data_buffer_size: 0,
        }
    }
}

impl PassThruMsg5 {
    pub fn header(&self) -> MessageHeader {
        MessageHeader {
            protocol_id: self.protocol_id,
            rx_status: self.rx_status,
            tx_flags: self.tx_flags,
            timestamp: self.timestamp,
            data_size: self.data_length,
            extra_data_index: self.extra_data_index,
        }
    }

    pub fn set_header(&mut self, header: &MessageHeader) {
        self.protocol_id = header.protocol_id;
        self.rx_status = header.rx_status;
        self.tx_flags = header.tx_flags;
        self.timestamp = header.timestamp;
        self.data_length = header.data_size;
        self.extra_data_index = header.extra_data_index;
    }

    /// The whole referenced buffer
    ///
    /// # Safety
    ///
    /// `data_buffer` must be null or point to `data_buffer_size` bytes that
    /// stay valid and unaliased for the returned lifetime.
    pub unsafe fn buffer(&self) -> &[u8] {
        if self.data_buffer.is_null() {
            &[]
        } else {
            std::slice::from_raw_parts(self.data_buffer, self.data_buffer_size as usize)
        }
    }

    /// Mutable view of the referenced buffer
    ///
    /// # Safety
    ///
    /// Same contract as [`PassThruMsg5::buffer`], and the bytes must be
    /// writable.
    pub unsafe fn buffer_mut(&mut self) -> &mut [u8] {
        if self.data_buffer.is_null() {
            &mut []
        } else {
            std::slice::from_raw_parts_mut(self.data_buffer, self.data_buffer_size as usize)
        }
    }
}

/// A contiguous array of 05.00 records together with the buffers they point into
///
/// The records are handed to the native call as one slice. Each buffer is a
/// separate heap allocation that is never resized, so the pointers stay
/// valid for as long as the batch lives.
pub struct Msg5Batch {
    records: Vec<PassThruMsg5>,
    buffers: Vec<Vec<u8>>,
}

impl Msg5Batch {
    /// Empty records for a read of up to `count` messages
    pub fn for_read(count: usize, capacity: usize) -> Self {
        let buffers = vec![vec![0u8; capacity]; count];
        Self::wire(buffers, |_| MessageHeader::default())
    }

    /// Records for transmission, one buffer per message sized to fit
    pub fn from_messages(messages: &[Message], capacity: usize) -> Result<Self, ValidationError> {
        let mut buffers = Vec::with_capacity(messages.len());
        for msg in messages {
            if msg.data_size() > capacity {
                return Err(ValidationError::PayloadTooLarge {
                    len: msg.data_size(),
                    capacity,
                });
            }
            buffers.push(msg.wire_bytes());
        }
        Ok(Self::wire(buffers, |i| messages[i].header()))
    }

    fn wire(mut buffers: Vec<Vec<u8>>, header: impl Fn(usize) -> MessageHeader) -> Self {
        let records = buffers
            .iter_mut()
            .enumerate()
            .map(|(i, buffer)| {
                let mut record = PassThruMsg5::default();
                record.set_header(&header(i));
                record.data_buffer = buffer.as_mut_ptr();
                record.data_buffer_size = u32::try_from(buffer.len()).unwrap_or(u32::MAX);
                record
            })
            .collect();
        Self { records, buffers }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[PassThruMsg5] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [PassThruMsg5] {
        &mut self.records
    }

    /// Decode the first `count` records from the owned buffers
    pub fn to_messages(&self, count: usize) -> Result<Vec<Message>, ValidationError> {
        self.records
            .iter()
            .zip(&self.buffers)
            .take(count)
            .map(|(record, buffer)| {
                let len = record.data_length as usize;
                let payload = buffer.get(..len).ok_or_else(|| {
                    ValidationError::MalformedRecord(format!(
                        "DataLength {} exceeds the {}-byte buffer",
                        len,
                        buffer.len()
                    ))
                })?;
                Ok(Message::from_parts(&record.header(), payload))
            })
            .collect()
    }
}

/// `SCONFIG`: one parameter/value pair
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SConfig {
    pub parameter: u32,
    pub value: u32,
}

impl SConfig {
    pub fn new(parameter: u32, value: u32) -> Self {
        Self { parameter, value }
    }
}

/// `SCONFIG_LIST` for the GET_CONFIG / SET_CONFIG ioctls
#[repr(C)]
#[derive(Debug)]
pub struct SConfigList {
    pub num_of_params: u32,
    pub config_ptr: *mut SConfig,
}

impl SConfigList {
    /// Point a list at `params`; the slice must outlive every use of the list
    pub fn new(params: &mut [SConfig]) -> Self {
        Self {
            num_of_params: params.len() as u32,
            config_ptr: params.as_mut_ptr(),
        }
    }

    /// # Safety
    ///
    /// `config_ptr` must be null or point to `num_of_params` writable entries.
    pub unsafe fn params_mut(&mut self) -> &mut [SConfig] {
        if self.config_ptr.is_null() {
            &mut []
        } else {
            std::slice::from_raw_parts_mut(self.config_ptr, self.num_of_params as usize)
        }
    }
}

/// `SDEVICE` returned by `PassThruGetNextDevice`
#[repr(C)]
#[derive(Clone)]
pub struct SDevice {
    pub device_name: [u8; DEVICE_NAME_LEN],
    pub device_available: u32,
    pub device_dll_fw_status: u32,
    pub device_connected_media: u32,
    pub device_connect_speed: u32,
    pub device_signal_quality: u32,
    pub device_signal_strength: u32,
}

impl Default for SDevice {
    fn default() -> Self {
        Self {
            device_name: [0; DEVICE_NAME_LEN],
            device_available: 0,
            device_dll_fw_status: 0,
            device_connected_media: 0,
            device_connect_speed: 0,
            device_signal_quality: 0,
            device_signal_strength: 0,
        }
    }
}

impl SDevice {
    pub fn name(&self) -> String {
        read_c_str(&self.device_name)
    }

    /// Copy `name` into the fixed buffer, truncating to leave a terminator
    pub fn set_name(&mut self, name: &str) {
        self.device_name = [0; DEVICE_NAME_LEN];
        let len = name.len().min(DEVICE_NAME_LEN - 1);
        self.device_name[..len].copy_from_slice(&name.as_bytes()[..len]);
    }
}

impl fmt::Debug for SDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SDevice")
            .field("device_name", &self.name())
            .field("device_available", &self.device_available)
            .field("device_dll_fw_status", &self.device_dll_fw_status)
            .field("device_connected_media", &self.device_connected_media)
            .field("device_connect_speed", &self.device_connect_speed)
            .field("device_signal_quality", &self.device_signal_quality)
            .field("device_signal_strength", &self.device_signal_strength)
            .finish()
    }
}

/// `RESOURCE_STRUCT`: connector and pin list for 05.00 connect/voltage calls
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ResourceStruct {
    pub connector: u32,
    pub num_of_resources: u32,
    pub resource_list_ptr: *mut u32,
}

impl ResourceStruct {
    /// Point at `pins`; the slice must outlive every use of the struct
    pub fn new(connector: u32, pins: &mut [u32]) -> Self {
        Self {
            connector,
            num_of_resources: pins.len() as u32,
            resource_list_ptr: pins.as_mut_ptr(),
        }
    }

    /// # Safety
    ///
    /// `resource_list_ptr` must be null or point to `num_of_resources` entries.
    pub unsafe fn resources(&self) -> &[u32] {
        if self.resource_list_ptr.is_null() {
            &[]
        } else {
            std::slice::from_raw_parts(self.resource_list_ptr, self.num_of_resources as usize)
        }
    }
}

/// `ISO15765_CHANNEL_DESCRIPTOR` for `PassThruLogicalConnect`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Iso15765ChannelDescriptor {
    pub local_tx_flags: u32,
    pub remote_tx_flags: u32,
    pub local_address: [u8; 5],
    pub remote_address: [u8; 5],
}

impl Iso15765ChannelDescriptor {
    pub fn new(local_address: [u8; 5], remote_address: [u8; 5]) -> Self {
        Self {
            local_tx_flags: 0,
            remote_tx_flags: 0,
            local_address,
            remote_address,
        }
    }

    pub fn with_tx_flags(mut self, local: u32, remote: u32) -> Self {
        self.local_tx_flags = local;
        self.remote_tx_flags = remote;
        self
    }
}

/// `SCHANNELSET` for `PassThruSelect`
#[repr(C)]
#[derive(Debug)]
pub struct SChannelSet {
    pub channel_count: u32,
    pub channel_threshold: u32,
    pub channel_list: *mut u32,
}

impl SChannelSet {
    /// Point at `channels`; the slice must outlive every use of the set
    pub fn new(channels: &mut [u32], threshold: u32) -> Self {
        Self {
            channel_count: u32::try_from(channels.len()).unwrap_or(u32::MAX),
            channel_threshold: threshold,
            channel_list: channels.as_mut_ptr(),
        }
    }

    /// # Safety
    ///
    /// `channel_list` must be null or point to `channel_count` writable entries.
    pub unsafe fn channels_mut(&mut self) -> &mut [u32] {
        if self.channel_list.is_null() {
            &mut []
        } else {
            std::slice::from_raw_parts_mut(self.channel_list, self.channel_count as usize)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::TxFlags;
    use crate::protocol::ProtocolId;
    use pretty_assertions::assert_eq;
    use std::mem::{offset_of, size_of};

    #[test]
    fn test_record_layouts() {
        assert_eq!(size_of::<PassThruMsg4>(), 24 + PASSTHRU_MSG_DATA_SIZE);
        assert_eq!(offset_of!(PassThruMsg4, extra_data_index), 20);
        assert_eq!(offset_of!(PassThruMsg4, data), 24);

        assert_eq!(offset_of!(PassThruMsg5, message_handle), 4);
        assert_eq!(offset_of!(PassThruMsg5, data_length), 20);
        assert_eq!(offset_of!(PassThruMsg5, extra_data_index), 24);

        assert_eq!(size_of::<SDevice>(), DEVICE_NAME_LEN + 6 * 4);
        assert_eq!(size_of::<SConfig>(), 8);
        assert_eq!(offset_of!(Iso15765ChannelDescriptor, remote_address), 13);
    }

    #[test]
    fn test_msg4_round_trip_with_extra() {
        let msg = Message::new(ProtocolId::Iso15765, vec![0x00, 0x00, 0x07, 0xE0, 0x3E])
            .with_tx_flags(TxFlags::ISO15765_FRAME_PAD)
            .with_extra(vec![0x01, 0x02]);

        let record = PassThruMsg4::from_message(&msg).unwrap();
        assert_eq!(record.data_size, 7);
        assert_eq!(record.extra_data_index, 5);
        assert_eq!(&record.data[..7], &[0x00, 0x00, 0x07, 0xE0, 0x3E, 0x01, 0x02]);

        assert_eq!(record.to_message().unwrap(), msg);
    }

    #[test]
    fn test_msg4_rejects_oversize_payload() {
        let msg = Message::new(ProtocolId::Can, vec![0u8; PASSTHRU_MSG_DATA_SIZE + 1]);
        assert_eq!(
            PassThruMsg4::from_message(&msg).unwrap_err(),
            ValidationError::PayloadTooLarge {
                len: PASSTHRU_MSG_DATA_SIZE + 1,
                capacity: PASSTHRU_MSG_DATA_SIZE,
            }
        );

        let full = Message::new(ProtocolId::Can, vec![0xAAu8; PASSTHRU_MSG_DATA_SIZE]);
        assert!(PassThruMsg4::from_message(&full).is_ok());
    }

    #[test]
    fn test_msg4_malformed_size() {
        let mut record = PassThruMsg4::default();
        record.data_size = (PASSTHRU_MSG_DATA_SIZE + 10) as u32;
        assert!(matches!(
            record.to_message(),
            Err(ValidationError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_msg5_batch_points_into_owned_buffers() {
        let msgs = vec![
            Message::new(ProtocolId::Can, vec![0x00, 0x00, 0x07, 0xDF, 0x02, 0x01, 0x00]),
            Message::new(ProtocolId::Can, vec![0x00, 0x00, 0x07, 0xE0]).with_extra(vec![0xFF]),
        ];
        let batch = Msg5Batch::from_messages(&msgs, 64).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.records()[1].data_length, 5);
        assert_eq!(batch.records()[1].extra_data_index, 4);

        // SAFETY: the batch owns the buffers the records point to
        let bytes = unsafe { batch.records()[0].buffer() };
        assert_eq!(bytes, &[0x00, 0x00, 0x07, 0xDF, 0x02, 0x01, 0x00]);

        assert_eq!(batch.to_messages(2).unwrap(), msgs);
    }

    #[test]
    fn test_msg5_batch_capacity() {
        let msgs = vec![Message::new(ProtocolId::Can, vec![0u8; 9])];
        assert!(matches!(
            Msg5Batch::from_messages(&msgs, 8),
            Err(ValidationError::PayloadTooLarge { len: 9, capacity: 8 })
        ));
    }

    #[test]
    fn test_device_name_round_trip() {
        let mut device = SDevice::default();
        device.set_name("J2534-1:ExampleUdsDev");
        assert_eq!(device.name(), "J2534-1:ExampleUdsDev");

        device.set_name(&"x".repeat(200));
        assert_eq!(device.name().len(), DEVICE_NAME_LEN - 1);
    }
}
