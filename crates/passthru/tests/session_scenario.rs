//! Integration tests for the device session
//!
//! These tests drive a `DeviceSession` against the in-process mock library
//! through full open / connect / filter / read / close sequences.

use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

use passthru::library::mock::{MockDevice, MockLibrary, MOCK_BATTERY_MV};
use passthru::{
    ApiVersion, CanAddressing, ChannelHandle, ConnectFlags, ConnectionConfig, DeviceHandle,
    DeviceSession, ErrorCode, FilterKind, FilterSpec, IoctlRequest, IoctlResponse, Message,
    PassThruError, Procedure, Protocol, ProtocolId, SessionConfig,
};
use passthru_core::consts::config_param;
use passthru_core::raw::{Iso15765ChannelDescriptor, SConfig};
use pretty_assertions::assert_eq;
use rstest::rstest;

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "passthru=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

fn setup(version: ApiVersion) -> (Arc<MockLibrary>, DeviceSession) {
    init_tracing();
    let lib = Arc::new(MockLibrary::new(version));
    let session = DeviceSession::new(lib.clone(), version);
    (lib, session)
}

fn can(baudrate: u32, addressing: CanAddressing) -> ConnectionConfig {
    ConnectionConfig::new(Protocol::can(baudrate, addressing).unwrap()).unwrap()
}

// =============================================================================
// End-to-end
// =============================================================================

#[test]
fn test_end_to_end_scenario() {
    let (lib, session) = setup(ApiVersion::V0404);

    let device = session.open("TestDev").unwrap();
    assert_eq!(session.open_refs(), 1);

    let config = can(500_000, CanAddressing::Both);
    assert!(config.flags().contains(ConnectFlags::CAN_ID_BOTH));
    let channel = session.connect(device, &config).unwrap();
    let mock_channel = lib.channel(channel.raw()).unwrap();
    assert_eq!(mock_channel.protocol_id, ProtocolId::Can.value());
    assert_eq!(mock_channel.flags, ConnectFlags::CAN_ID_BOTH.bits());
    assert_eq!(mock_channel.baudrate, 500_000);

    let filter = FilterSpec::flow_control(0x0000_00ED, 0xFFFF_FFFF, 0x0000_00F1).unwrap();
    session.set_filter(channel, &filter).unwrap();

    let filters = lib.filters(channel.raw());
    assert_eq!(filters.len(), 1);
    assert_eq!(filters[0].kind, FilterKind::FlowControl.value());
    assert_eq!(filters[0].pattern.data, vec![0x00, 0x00, 0x00, 0xED]);
    assert_eq!(filters[0].mask.data, vec![0xFF, 0xFF, 0xFF, 0xFF]);
    assert_eq!(
        filters[0].flow_control.as_ref().map(|m| m.data.clone()),
        Some(vec![0x00, 0x00, 0x00, 0xF1])
    );

    // Poll with nothing queued: returns immediately
    let msgs = session.read(channel, 3, Duration::ZERO).unwrap();
    assert!(msgs.len() <= 3);

    session.disconnect(channel).unwrap();
    session.close(device).unwrap();
    assert_eq!(session.open_refs(), 0);

    let err = session.read(channel, 3, Duration::ZERO).unwrap_err();
    assert_eq!(err, PassThruError::NotOpen { operation: "read" });
}

#[test]
fn test_partial_read_returns_what_arrived() {
    let (lib, session) = setup(ApiVersion::V0404);
    let device = session.open("TestDev").unwrap();
    let channel = session.connect(device, &can(500_000, CanAddressing::Standard)).unwrap();

    let response = Message::new(ProtocolId::Can, vec![0x00, 0x00, 0x07, 0xE8, 0x02, 0x50, 0x01]);
    lib.inject_rx(channel.raw(), response.clone());

    let msgs = session.read(channel, 3, Duration::from_millis(50)).unwrap();
    assert_eq!(msgs, vec![response]);
}

// =============================================================================
// Guard contract
// =============================================================================

#[rstest]
#[case::close("close")]
#[case::connect("connect")]
#[case::read("read")]
#[case::set_filter("set_filter")]
fn test_operations_require_open(#[case] operation: &str) {
    let (lib, session) = setup(ApiVersion::V0404);
    let channel = ChannelHandle::new(1);
    let filter = FilterSpec::flow_control(0x7E8, 0xFFFF_FFFF, 0x7E0).unwrap();

    let err = match operation {
        "close" => session.close(DeviceHandle::new(1)).unwrap_err(),
        "connect" => session
            .connect(DeviceHandle::new(1), &can(500_000, CanAddressing::Standard))
            .unwrap_err(),
        "read" => session.read(channel, 1, Duration::ZERO).unwrap_err(),
        "set_filter" => session.set_filter(channel, &filter).unwrap_err(),
        _ => unreachable!(),
    };

    assert_eq!(err.operation(), operation);
    assert!(matches!(err, PassThruError::NotOpen { .. }));
    assert!(err.to_string().contains("must be opened"), "{err}");
    assert!(lib.calls().is_empty());
}

#[test]
fn test_connect_after_open_and_double_close() {
    let (_lib, session) = setup(ApiVersion::V0404);
    let device = session.open("TestDev").unwrap();
    session
        .connect(device, &can(250_000, CanAddressing::Extended))
        .unwrap();

    session.close(device).unwrap();
    let err = session.close(device).unwrap_err();
    assert_eq!(err, PassThruError::NotOpen { operation: "close" });
}

#[test]
fn test_missing_procedure_fails_before_native_call() {
    init_tracing();
    let lib = Arc::new(MockLibrary::new(ApiVersion::V0404));
    lib.remove_procedure(Procedure::Connect);
    let session = DeviceSession::new(lib.clone(), ApiVersion::V0404);

    let device = session.open("TestDev").unwrap();
    let calls_before = lib.calls();

    let err = session
        .connect(device, &can(500_000, CanAddressing::Standard))
        .unwrap_err();
    assert!(matches!(
        err,
        PassThruError::NotSupported {
            operation: "connect",
            procedure: Procedure::Connect,
            ..
        }
    ));
    assert!(err.to_string().contains("PassThruConnect"), "{err}");
    assert_eq!(lib.calls(), calls_before);
}

#[test]
fn test_native_error_carries_description() {
    let (lib, session) = setup(ApiVersion::V0404);
    lib.fail_next(Procedure::Open, ErrorCode::DeviceNotConnected);

    let err = session.open("TestDev").unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::DeviceNotConnected));
    let msg = err.to_string();
    assert!(msg.starts_with("open failed"), "{msg}");
    assert!(msg.contains("ERR_DEVICE_NOT_CONNECTED"), "{msg}");
}

// =============================================================================
// API version dispatch
// =============================================================================

#[test]
fn test_set_filter_requires_legacy_api() {
    let (_lib, session) = setup(ApiVersion::V0500);
    let device = session.open("TestDev").unwrap();
    let channel = session.connect(device, &can(500_000, CanAddressing::Standard)).unwrap();

    let filter = FilterSpec::flow_control(0x7E8, 0xFFFF_FFFF, 0x7E0).unwrap();
    let err = session.set_filter(channel, &filter).unwrap_err();
    assert!(matches!(
        err,
        PassThruError::VersionMismatch {
            operation: "set_filter",
            actual: ApiVersion::V0500,
            ..
        }
    ));
}

#[test]
#[should_panic(expected = "logical_connect")]
fn test_v5_connect_iso15765_is_a_programming_error() {
    let (_lib, session) = setup(ApiVersion::V0500);
    let device = session.open("TestDev").unwrap();
    let iso = ConnectionConfig::new(Protocol::iso15765(500_000, CanAddressing::Standard).unwrap())
        .unwrap();
    let _ = session.connect(device, &iso);
}

#[test]
fn test_v5_connect_passes_resource_pins() {
    let (lib, session) = setup(ApiVersion::V0500);
    let device = session.open("TestDev").unwrap();
    let channel = session.connect(device, &can(500_000, CanAddressing::Standard)).unwrap();
    assert_eq!(lib.channel(channel.raw()).unwrap().resources, vec![6, 14]);
}

#[test]
fn test_v5_logical_channels_and_select() {
    let (lib, session) = setup(ApiVersion::V0500);
    let device = session.open("TestDev").unwrap();
    let physical = session.connect(device, &can(500_000, CanAddressing::Standard)).unwrap();

    let descriptor = Iso15765ChannelDescriptor::new([0, 0, 0x07, 0xE0, 0], [0, 0, 0x07, 0xE8, 0]);
    let engine = session
        .logical_connect(physical, ConnectFlags::empty(), &descriptor)
        .unwrap();
    let logical = lib.channel(engine.raw()).unwrap();
    assert_eq!(logical.protocol_id, ProtocolId::Iso15765Logical.value());
    assert_eq!(logical.logical.map(|(parent, _)| parent), Some(physical.raw()));

    // Logical channels cannot be stacked
    let err = session
        .logical_connect(engine, ConnectFlags::empty(), &descriptor)
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::LogChanNotAllowed));

    assert!(session
        .select(&[physical, engine], 0, Duration::ZERO)
        .unwrap()
        .is_empty());

    let response = Message::new(ProtocolId::Iso15765Logical, vec![0x00, 0x00, 0x07, 0xE8, 0x50, 0x03]);
    lib.inject_rx(engine.raw(), response.clone());
    let ready = session.select(&[physical, engine], 1, Duration::ZERO).unwrap();
    assert_eq!(ready, vec![engine]);
    assert_eq!(session.read(engine, 1, Duration::ZERO).unwrap(), vec![response]);

    session.logical_disconnect(engine).unwrap();
    assert!(lib.channel(engine.raw()).is_none());
}

#[test]
fn test_v5_queue_and_pass_filter() {
    let (lib, session) = setup(ApiVersion::V0500);
    let device = session.open("TestDev").unwrap();
    let channel = session.connect(device, &can(500_000, CanAddressing::Standard)).unwrap();

    let mask = Message::new(ProtocolId::Can, vec![0xFF, 0xFF, 0xFF, 0xFF]);
    let pattern = Message::new(ProtocolId::Can, vec![0x00, 0x00, 0x07, 0xE8]);
    session
        .start_msg_filter(channel, FilterKind::Pass, &mask, &pattern)
        .unwrap();
    let filters = lib.filters(channel.raw());
    assert_eq!(filters[0].kind, FilterKind::Pass.value());
    assert_eq!(filters[0].pattern, pattern);
    assert_eq!(filters[0].flow_control, None);

    let request = Message::new(ProtocolId::Can, vec![0x00, 0x00, 0x07, 0xE0, 0x02, 0x10, 0x03]);
    assert_eq!(session.queue(channel, &[request.clone()]).unwrap(), 1);
    assert_eq!(lib.written(channel.raw()), vec![request]);
}

#[test]
fn test_v5_device_discovery() {
    let (lib, session) = setup(ApiVersion::V0500);
    lib.set_devices(vec![
        MockDevice {
            name: "J2534-1:DevA".to_string(),
            available: true,
        },
        MockDevice {
            name: "J2534-1:DevB".to_string(),
            available: false,
        },
    ]);

    let err = session.next_device().unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::BufferEmpty));

    // Discovery does not require an open device
    assert_eq!(session.scan_for_devices().unwrap(), 2);
    let first = session.next_device().unwrap();
    assert_eq!(first.name, "J2534-1:DevA");
    assert!(first.available);
    let second = session.next_device().unwrap();
    assert_eq!(second.name, "J2534-1:DevB");
    assert!(!second.available);

    let err = session.next_device().unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::ExceededLimit));
}

// =============================================================================
// Ioctl
// =============================================================================

#[test]
fn test_ioctl_config_and_voltage() {
    let (lib, session) = setup(ApiVersion::V0404);
    let device = session.open("TestDev").unwrap();
    let channel = session.connect(device, &can(500_000, CanAddressing::Standard)).unwrap();

    assert_eq!(
        session.ioctl(device, IoctlRequest::ReadPinVoltage).unwrap(),
        IoctlResponse::Millivolts(MOCK_BATTERY_MV)
    );

    session
        .ioctl(
            channel,
            IoctlRequest::SetConfig(vec![SConfig::new(config_param::LOOPBACK, 1)]),
        )
        .unwrap();
    assert_eq!(
        session
            .ioctl(channel, IoctlRequest::GetConfig(vec![config_param::LOOPBACK]))
            .unwrap(),
        IoctlResponse::Config(vec![SConfig::new(config_param::LOOPBACK, 1)])
    );

    lib.inject_rx(channel.raw(), Message::new(ProtocolId::Can, vec![0, 0, 0x07, 0xE8]));
    session.ioctl(channel, IoctlRequest::ClearRxQueue).unwrap();
    assert!(session.read(channel, 1, Duration::ZERO).unwrap().is_empty());

    let err = session
        .ioctl(device, IoctlRequest::GetConfig(vec![config_param::DATA_RATE]))
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidChannelId));
    assert_eq!(err.operation(), "ioctl");
}

// =============================================================================
// Config
// =============================================================================

#[test]
fn test_session_from_config() {
    init_tracing();
    let config = SessionConfig::from_toml_str(
        r#"
        api_version = "05.00"
        device = "J2534-1:MockDevice"
        read_buffer_size = 256

        [protocol]
        type = "can"
        baudrate = 250000
        addressing = "extended"
        "#,
    )
    .unwrap();

    let lib = Arc::new(MockLibrary::new(ApiVersion::V0500));
    let session = DeviceSession::from_config(lib.clone(), &config);
    assert_eq!(session.version(), ApiVersion::V0500);

    let device = session.open(config.device.as_deref().unwrap_or_default()).unwrap();
    let channel = session.connect(device, &config.connection().unwrap()).unwrap();
    assert_eq!(
        lib.channel(channel.raw()).unwrap().flags,
        ConnectFlags::CAN_29BIT_ID.bits()
    );

    // Payloads beyond the configured buffer are rejected before the native call
    let oversized = Message::new(ProtocolId::Can, vec![0u8; 257]);
    let err = session.queue(channel, &[oversized]).unwrap_err();
    assert!(err.is_local());
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_native_calls_are_serialized() {
    let (lib, session) = setup(ApiVersion::V0404);
    lib.set_latency(Duration::from_millis(2));
    let session = Arc::new(session);

    let device = session.open("TestDev").unwrap();
    let channels: Vec<ChannelHandle> = (0..4)
        .map(|_| session.connect(device, &can(500_000, CanAddressing::Standard)).unwrap())
        .collect();
    for channel in &channels {
        for i in 0..5u8 {
            lib.inject_rx(channel.raw(), Message::new(ProtocolId::Can, vec![0, 0, 0x07, 0xE8, i]));
        }
    }

    let handles: Vec<_> = channels
        .iter()
        .copied()
        .map(|channel| {
            let session = session.clone();
            thread::spawn(move || {
                let mut received = 0;
                for _ in 0..5 {
                    received += session.read(channel, 1, Duration::ZERO).unwrap().len();
                }
                received
            })
        })
        .collect();

    let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, 20);
    assert_eq!(lib.overlapping_calls(), 0);
}
