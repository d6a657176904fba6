//! Wire encodings
//!
//! Each API revision has its own record layout and its own signatures for
//! the calls that carry messages or resources. A session picks one encoding
//! at construction and keeps it for its lifetime.

use std::slice;
use std::time::Duration;

use passthru_core::raw::{Msg5Batch, PassThruMsg4, ResourceStruct, PASSTHRU_MSG_DATA_SIZE};
use passthru_core::{
    ApiVersion, ConnectionConfig, Connector, ErrorCode, FilterError, FilterKind, FilterSpec,
    Message, ValidationError, Voltage,
};
use tracing::debug;

use crate::error::{check, PassThruError, PassThruResult};
use crate::library::PassThruLibrary;
use crate::procedure::VersionReq;

/// Convert a timeout to the native millisecond argument
pub fn timeout_ms(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}

/// Convert a caller-supplied length to a native count argument
pub(crate) fn native_count(
    operation: &'static str,
    field: &'static str,
    value: usize,
) -> PassThruResult<u32> {
    u32::try_from(value).map_err(|_| {
        PassThruError::validation(operation, ValidationError::CountOutOfRange { field, value })
    })
}

/// Interpret the status of `PassThruReadMsgs`
///
/// An empty buffer is an empty read. A timeout with some messages is a
/// partial read; a timeout with none is reported.
fn read_status(operation: &'static str, rc: u32, read: u32) -> PassThruResult<usize> {
    match ErrorCode::try_from(rc) {
        Ok(ErrorCode::BufferEmpty) => Ok(0),
        Ok(ErrorCode::Timeout) if read > 0 => Ok(read as usize),
        _ => check(operation, rc).map(|()| read as usize),
    }
}

/// Operations whose native form depends on the API revision
pub trait WireEncoding: Send + Sync {
    fn version(&self) -> ApiVersion;

    /// Largest `data_size` a message may carry
    fn capacity(&self) -> usize;

    /// `PassThruConnect`
    ///
    /// # Panics
    ///
    /// Under 05.00, ISO 15765 channels are opened with `logical_connect`;
    /// passing an ISO 15765 protocol here is a programming error.
    fn connect(
        &self,
        lib: &dyn PassThruLibrary,
        device_id: u32,
        config: &ConnectionConfig,
    ) -> PassThruResult<u32>;

    fn read_msgs(
        &self,
        lib: &dyn PassThruLibrary,
        channel_id: u32,
        count: usize,
        timeout: Duration,
    ) -> PassThruResult<Vec<Message>>;

    /// `PassThruWriteMsgs` (04.04). Returns the number of messages sent.
    fn write_msgs(
        &self,
        lib: &dyn PassThruLibrary,
        channel_id: u32,
        msgs: &[Message],
        timeout: Duration,
    ) -> PassThruResult<usize>;

    /// `PassThruQueueMsgs` (05.00). Returns the number of messages queued.
    fn queue_msgs(
        &self,
        lib: &dyn PassThruLibrary,
        channel_id: u32,
        msgs: &[Message],
    ) -> PassThruResult<usize>;

    fn start_periodic_msg(
        &self,
        lib: &dyn PassThruLibrary,
        channel_id: u32,
        msg: &Message,
        interval: Duration,
    ) -> PassThruResult<u32>;

    /// Three-message flow-control filter (04.04)
    fn start_flow_control_filter(
        &self,
        lib: &dyn PassThruLibrary,
        channel_id: u32,
        filter: &FilterSpec,
    ) -> PassThruResult<u32>;

    /// Two-message pass or block filter (05.00)
    fn start_msg_filter(
        &self,
        lib: &dyn PassThruLibrary,
        channel_id: u32,
        kind: FilterKind,
        mask: &Message,
        pattern: &Message,
    ) -> PassThruResult<u32>;

    fn set_programming_voltage(
        &self,
        lib: &dyn PassThruLibrary,
        device_id: u32,
        pin: u8,
        voltage: Voltage,
    ) -> PassThruResult<()>;
}

/// Pick the encoding for an API revision
pub fn for_version(version: ApiVersion, read_buffer_size: usize) -> Box<dyn WireEncoding> {
    match version {
        ApiVersion::V0404 => Box::new(EncodingV4),
        ApiVersion::V0500 => Box::new(EncodingV5::new(read_buffer_size)),
    }
}

fn wrong_version(operation: &'static str, required: ApiVersion, actual: ApiVersion) -> PassThruError {
    PassThruError::VersionMismatch {
        operation,
        required: VersionReq::Exact(required),
        actual,
    }
}

/// 04.04: inline 4128-byte records, scalar connect arguments
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodingV4;

impl EncodingV4 {
    fn record(operation: &'static str, msg: &Message) -> PassThruResult<Box<PassThruMsg4>> {
        PassThruMsg4::from_message(msg).map_err(|e| PassThruError::validation(operation, e))
    }
}

impl WireEncoding for EncodingV4 {
    fn version(&self) -> ApiVersion {
        ApiVersion::V0404
    }

    fn capacity(&self) -> usize {
        PASSTHRU_MSG_DATA_SIZE
    }

    fn connect(
        &self,
        lib: &dyn PassThruLibrary,
        device_id: u32,
        config: &ConnectionConfig,
    ) -> PassThruResult<u32> {
        let mut channel_id = 0;
        let rc = lib.connect(
            device_id,
            config.protocol_id().value(),
            config.flags().bits(),
            config.baudrate(),
            &mut channel_id,
        );
        debug!(
            device_id,
            protocol = %config.protocol_id(),
            flags = format_args!("0x{:08X}", config.flags().bits()),
            baudrate = config.baudrate(),
            channel_id,
            rc,
            "PassThruConnect"
        );
        check("connect", rc)?;
        Ok(channel_id)
    }

    fn read_msgs(
        &self,
        lib: &dyn PassThruLibrary,
        channel_id: u32,
        count: usize,
        timeout: Duration,
    ) -> PassThruResult<Vec<Message>> {
        let mut read = native_count("read", "message count", count)?;
        let mut records = vec![PassThruMsg4::default(); count];
        let rc = lib.read_msgs4(channel_id, &mut records, &mut read, timeout_ms(timeout));
        debug!(channel_id, requested = count, read, rc, "PassThruReadMsgs");

        let read = read_status("read", rc, read)?.min(count);
        records[..read]
            .iter()
            .map(|r| r.to_message())
            .collect::<Result<_, _>>()
            .map_err(|e| PassThruError::validation("read", e))
    }

    fn write_msgs(
        &self,
        lib: &dyn PassThruLibrary,
        channel_id: u32,
        msgs: &[Message],
        timeout: Duration,
    ) -> PassThruResult<usize> {
        let records = msgs
            .iter()
            .map(|m| Self::record("write", m).map(|r| *r))
            .collect::<PassThruResult<Vec<_>>>()?;
        let mut sent = native_count("write", "message count", records.len())?;
        let rc = lib.write_msgs4(channel_id, &records, &mut sent, timeout_ms(timeout));
        for msg in msgs {
            debug!(channel_id, data = %hex::encode(&msg.data), "PassThruWriteMsgs");
        }
        debug!(channel_id, requested = msgs.len(), sent, rc, "PassThruWriteMsgs");
        check("write", rc)?;
        Ok(sent as usize)
    }

    fn queue_msgs(
        &self,
        _lib: &dyn PassThruLibrary,
        _channel_id: u32,
        _msgs: &[Message],
    ) -> PassThruResult<usize> {
        Err(wrong_version("queue", ApiVersion::V0500, ApiVersion::V0404))
    }

    fn start_periodic_msg(
        &self,
        lib: &dyn PassThruLibrary,
        channel_id: u32,
        msg: &Message,
        interval: Duration,
    ) -> PassThruResult<u32> {
        let record = Self::record("start_periodic", msg)?;
        let mut msg_id = 0;
        let rc = lib.start_periodic_msg4(channel_id, &record, &mut msg_id, timeout_ms(interval));
        debug!(channel_id, msg_id, data = %hex::encode(&msg.data), rc, "PassThruStartPeriodicMsg");
        check("start_periodic", rc)?;
        Ok(msg_id)
    }

    fn start_flow_control_filter(
        &self,
        lib: &dyn PassThruLibrary,
        channel_id: u32,
        filter: &FilterSpec,
    ) -> PassThruResult<u32> {
        let records = filter
            .encode(ApiVersion::V0404)
            .map_err(|e| PassThruError::filter("set_filter", e))?;
        let mut filter_id = 0;
        let rc = lib.start_msg_filter4(
            channel_id,
            filter.kind().value(),
            &records.mask,
            &records.pattern,
            Some(&records.flow),
            &mut filter_id,
        );
        debug!(
            channel_id,
            mask = %hex::encode(filter.mask()),
            pattern = %hex::encode(filter.pattern()),
            flow = %hex::encode(filter.flow()),
            filter_id,
            rc,
            "PassThruStartMsgFilter"
        );
        check("set_filter", rc)?;
        Ok(filter_id)
    }

    fn start_msg_filter(
        &self,
        _lib: &dyn PassThruLibrary,
        _channel_id: u32,
        _kind: FilterKind,
        _mask: &Message,
        _pattern: &Message,
    ) -> PassThruResult<u32> {
        Err(wrong_version(
            "start_msg_filter",
            ApiVersion::V0500,
            ApiVersion::V0404,
        ))
    }

    fn set_programming_voltage(
        &self,
        lib: &dyn PassThruLibrary,
        device_id: u32,
        pin: u8,
        voltage: Voltage,
    ) -> PassThruResult<()> {
        let rc = lib.set_programming_voltage4(device_id, u32::from(pin), voltage.value());
        debug!(device_id, pin, %voltage, rc, "PassThruSetProgrammingVoltage");
        check("set_programming_voltage", rc)
    }
}

/// 05.00: caller-owned payload buffers, resource structures
#[derive(Debug, Clone, Copy)]
pub struct EncodingV5 {
    buffer_size: usize,
}

impl EncodingV5 {
    pub fn new(buffer_size: usize) -> Self {
        Self { buffer_size }
    }

    fn batch(&self, operation: &'static str, msgs: &[Message]) -> PassThruResult<Msg5Batch> {
        Msg5Batch::from_messages(msgs, self.buffer_size)
            .map_err(|e| PassThruError::validation(operation, e))
    }
}

impl Default for EncodingV5 {
    fn default() -> Self {
        Self::new(PASSTHRU_MSG_DATA_SIZE)
    }
}

impl WireEncoding for EncodingV5 {
    fn version(&self) -> ApiVersion {
        ApiVersion::V0500
    }

    fn capacity(&self) -> usize {
        self.buffer_size
    }

    fn connect(
        &self,
        lib: &dyn PassThruLibrary,
        device_id: u32,
        config: &ConnectionConfig,
    ) -> PassThruResult<u32> {
        assert!(
            !config.protocol_id().is_iso15765(),
            "use logical_connect for ISO 15765 channels under API 05.00"
        );

        let mut pins = config.resource_pins();
        let resource = ResourceStruct::new(config.connector().value(), &mut pins);
        let mut channel_id = 0;
        let rc = lib.connect_with_resource(
            device_id,
            config.protocol_id().value(),
            config.flags().bits(),
            config.baudrate(),
            &resource,
            &mut channel_id,
        );
        debug!(
            device_id,
            protocol = %config.protocol_id(),
            flags = format_args!("0x{:08X}", config.flags().bits()),
            baudrate = config.baudrate(),
            pins = ?pins,
            channel_id,
            rc,
            "PassThruConnect"
        );
        check("connect", rc)?;
        Ok(channel_id)
    }

    fn read_msgs(
        &self,
        lib: &dyn PassThruLibrary,
        channel_id: u32,
        count: usize,
        timeout: Duration,
    ) -> PassThruResult<Vec<Message>> {
        let mut read = native_count("read", "message count", count)?;
        let mut batch = Msg5Batch::for_read(count, self.buffer_size);
        let rc = lib.read_msgs5(channel_id, batch.records_mut(), &mut read, timeout_ms(timeout));
        debug!(channel_id, requested = count, read, rc, "PassThruReadMsgs");

        let read = read_status("read", rc, read)?.min(count);
        batch
            .to_messages(read)
            .map_err(|e| PassThruError::validation("read", e))
    }

    fn write_msgs(
        &self,
        _lib: &dyn PassThruLibrary,
        _channel_id: u32,
        _msgs: &[Message],
        _timeout: Duration,
    ) -> PassThruResult<usize> {
        Err(wrong_version("write", ApiVersion::V0404, ApiVersion::V0500))
    }

    fn queue_msgs(
        &self,
        lib: &dyn PassThruLibrary,
        channel_id: u32,
        msgs: &[Message],
    ) -> PassThruResult<usize> {
        let batch = self.batch("queue", msgs)?;
        let mut queued = native_count("queue", "message count", batch.len())?;
        let rc = lib.queue_msgs5(channel_id, batch.records(), &mut queued);
        debug!(channel_id, requested = msgs.len(), queued, rc, "PassThruQueueMsgs");
        check("queue", rc)?;
        Ok(queued as usize)
    }

    fn start_periodic_msg(
        &self,
        lib: &dyn PassThruLibrary,
        channel_id: u32,
        msg: &Message,
        interval: Duration,
    ) -> PassThruResult<u32> {
        let batch = self.batch("start_periodic", slice::from_ref(msg))?;
        let mut msg_id = 0;
        let rc = lib.start_periodic_msg5(
            channel_id,
            &batch.records()[0],
            &mut msg_id,
            timeout_ms(interval),
        );
        debug!(channel_id, msg_id, data = %hex::encode(&msg.data), rc, "PassThruStartPeriodicMsg");
        check("start_periodic", rc)?;
        Ok(msg_id)
    }

    fn start_flow_control_filter(
        &self,
        _lib: &dyn PassThruLibrary,
        _channel_id: u32,
        _filter: &FilterSpec,
    ) -> PassThruResult<u32> {
        Err(PassThruError::filter(
            "set_filter",
            FilterError::EncodingNotSupported(ApiVersion::V0500),
        ))
    }

    fn start_msg_filter(
        &self,
        lib: &dyn PassThruLibrary,
        channel_id: u32,
        kind: FilterKind,
        mask: &Message,
        pattern: &Message,
    ) -> PassThruResult<u32> {
        if kind == FilterKind::FlowControl {
            return Err(PassThruError::filter(
                "start_msg_filter",
                FilterError::KindNotSupported(kind),
            ));
        }
        let batch = self.batch("start_msg_filter", &[mask.clone(), pattern.clone()])?;
        let records = batch.records();
        let mut filter_id = 0;
        let rc = lib.start_msg_filter5(
            channel_id,
            kind.value(),
            &records[0],
            &records[1],
            &mut filter_id,
        );
        debug!(
            channel_id,
            %kind,
            mask = %hex::encode(&mask.data),
            pattern = %hex::encode(&pattern.data),
            filter_id,
            rc,
            "PassThruStartMsgFilter"
        );
        check("start_msg_filter", rc)?;
        Ok(filter_id)
    }

    fn set_programming_voltage(
        &self,
        lib: &dyn PassThruLibrary,
        device_id: u32,
        pin: u8,
        voltage: Voltage,
    ) -> PassThruResult<()> {
        let mut pins = [u32::from(pin)];
        let resource = ResourceStruct::new(Connector::J1962.value(), &mut pins);
        let rc = lib.set_programming_voltage5(device_id, &resource, voltage.value());
        debug!(device_id, pin, %voltage, rc, "PassThruSetProgrammingVoltage");
        check("set_programming_voltage", rc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::mock::MockLibrary;
    use passthru_core::{CanAddressing, Protocol, ProtocolId};
    use pretty_assertions::assert_eq;

    fn open(lib: &MockLibrary) -> u32 {
        let mut device_id = 0;
        assert_eq!(lib.open(None, &mut device_id), 0);
        device_id
    }

    #[test]
    fn test_read_status_policy() {
        assert_eq!(read_status("read", 0x10, 0).unwrap(), 0);
        assert_eq!(read_status("read", 0x09, 2).unwrap(), 2);
        assert_eq!(
            read_status("read", 0x09, 0).unwrap_err().code(),
            Some(ErrorCode::Timeout)
        );
        assert_eq!(read_status("read", 0, 3).unwrap(), 3);
    }

    #[test]
    fn test_timeout_conversion_saturates() {
        assert_eq!(timeout_ms(Duration::ZERO), 0);
        assert_eq!(timeout_ms(Duration::from_millis(250)), 250);
        assert_eq!(timeout_ms(Duration::from_secs(u64::MAX)), u32::MAX);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_read_count_beyond_u32_is_rejected() {
        let count = u32::MAX as usize + 1;
        let lib = MockLibrary::new(ApiVersion::V0404);
        let err = EncodingV4
            .read_msgs(&lib, 1, count, Duration::ZERO)
            .unwrap_err();
        assert_eq!(
            err,
            PassThruError::Validation {
                operation: "read",
                source: ValidationError::CountOutOfRange {
                    field: "message count",
                    value: count,
                },
            }
        );

        let lib = MockLibrary::new(ApiVersion::V0500);
        let err = EncodingV5::new(8)
            .read_msgs(&lib, 1, count, Duration::ZERO)
            .unwrap_err();
        assert!(err.is_local(), "{}", err);
        assert!(lib.calls().is_empty());
    }

    #[test]
    fn test_v5_connect_passes_resource_pins() {
        let lib = MockLibrary::new(ApiVersion::V0500);
        let device_id = open(&lib);
        let config = ConnectionConfig::new(Protocol::can(500_000, CanAddressing::Both).unwrap())
            .unwrap();

        let channel_id = EncodingV5::default()
            .connect(&lib, device_id, &config)
            .unwrap();
        let channel = lib.channel(channel_id).unwrap();
        assert_eq!(channel.resources, vec![6, 14]);
        assert_eq!(channel.protocol_id, ProtocolId::Can.value());
    }

    #[test]
    #[should_panic(expected = "logical_connect")]
    fn test_v5_connect_rejects_iso15765() {
        let lib = MockLibrary::new(ApiVersion::V0500);
        let device_id = open(&lib);
        let config =
            ConnectionConfig::new(Protocol::iso15765(500_000, CanAddressing::Standard).unwrap())
                .unwrap();
        let _ = EncodingV5::default().connect(&lib, device_id, &config);
    }

    #[test]
    fn test_v5_round_trip_through_mock() {
        let lib = MockLibrary::new(ApiVersion::V0500);
        let device_id = open(&lib);
        let config = ConnectionConfig::new(Protocol::can(500_000, CanAddressing::Standard).unwrap())
            .unwrap();
        let encoding = EncodingV5::new(64);
        let channel_id = encoding.connect(&lib, device_id, &config).unwrap();

        let msg = Message::new(ProtocolId::Can, vec![0x00, 0x00, 0x07, 0xE8, 0x02, 0x50, 0x03])
            .with_extra(vec![0xAA]);
        lib.inject_rx(channel_id, msg.clone());

        let read = encoding
            .read_msgs(&lib, channel_id, 4, Duration::ZERO)
            .unwrap();
        assert_eq!(read, vec![msg.clone()]);

        assert_eq!(encoding.queue_msgs(&lib, channel_id, &[msg.clone()]).unwrap(), 1);
        assert_eq!(lib.written(channel_id), vec![msg]);
    }

    #[test]
    fn test_v5_buffer_capacity_is_enforced() {
        let lib = MockLibrary::new(ApiVersion::V0500);
        let encoding = EncodingV5::new(8);
        let msg = Message::new(ProtocolId::Can, vec![0u8; 9]);
        let err = encoding.queue_msgs(&lib, 1, &[msg]).unwrap_err();
        assert!(matches!(err, PassThruError::Validation { operation: "queue", .. }));
        assert!(lib.calls().is_empty());
    }

    #[test]
    fn test_v5_flow_control_filter_not_supported() {
        let lib = MockLibrary::new(ApiVersion::V0500);
        let filter = FilterSpec::flow_control(0x7E8, 0xFFFF_FFFF, 0x7E0).unwrap();
        let err = EncodingV5::default()
            .start_flow_control_filter(&lib, 1, &filter)
            .unwrap_err();
        assert_eq!(
            err,
            PassThruError::Filter {
                operation: "set_filter",
                source: FilterError::EncodingNotSupported(ApiVersion::V0500),
            }
        );
    }

    #[test]
    fn test_cross_version_calls_report_mismatch() {
        let lib = MockLibrary::new(ApiVersion::V0404);
        let err = EncodingV4.queue_msgs(&lib, 1, &[]).unwrap_err();
        assert!(matches!(err, PassThruError::VersionMismatch { operation: "queue", .. }));

        let err = EncodingV5::default()
            .write_msgs(&lib, 1, &[], Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, PassThruError::VersionMismatch { operation: "write", .. }));
    }
}
