//! Mock PassThru library for testing
//!
//! Behaves like a well-mannered vendor library: handles are issued from
//! counters, receive queues are fed by the test, and every transmitted
//! message, filter and periodic message is recorded. Overlapping calls are
//! detected and answered with `ERR_CONCURRENT_API_CALL`.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ffi::CStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use passthru_core::consts::{config_param, ioctl_id};
use passthru_core::raw::{
    Iso15765ChannelDescriptor, PassThruMsg4, PassThruMsg5, ResourceStruct, SChannelSet, SDevice,
};
use passthru_core::{ApiVersion, ErrorCode, FilterKind, Message, ProtocolId, SelectType, Voltage};
use tracing::debug;

use super::gateway::{IoctlArg, PassThruLibrary, Status, StringBuffer};
use crate::procedure::{Procedure, ProcedureSet};

/// Battery voltage reported by `READ_PIN_VOLTAGE`
pub const MOCK_BATTERY_MV: u32 = 12_600;

/// A filter installed on a mock channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockFilter {
    pub kind: u32,
    pub mask: Message,
    pub pattern: Message,
    pub flow_control: Option<Message>,
}

/// A periodic message started on a mock channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockPeriodic {
    pub message: Message,
    pub interval_ms: u32,
}

/// State of one mock channel
#[derive(Debug, Clone, Default)]
pub struct MockChannel {
    pub device_id: u32,
    pub protocol_id: u32,
    pub flags: u32,
    pub baudrate: u32,
    /// Pins from the resource structure (05.00)
    pub resources: Vec<u32>,
    /// Parent channel and descriptor for logical channels
    pub logical: Option<(u32, Iso15765ChannelDescriptor)>,
    pub rx: VecDeque<Message>,
    pub written: Vec<Message>,
    pub filters: BTreeMap<u32, MockFilter>,
    pub periodic: BTreeMap<u32, MockPeriodic>,
    pub config: BTreeMap<u32, u32>,
}

/// A device reported by `PassThruGetNextDevice`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockDevice {
    pub name: String,
    pub available: bool,
}

#[derive(Debug, Default)]
struct MockState {
    next_handle: u32,
    devices_open: HashMap<u32, String>,
    channels: HashMap<u32, MockChannel>,
    pending_rx: HashMap<u32, VecDeque<Message>>,
    failures: HashMap<Procedure, VecDeque<ErrorCode>>,
    calls: Vec<Procedure>,
    last_error: String,
    scan: Option<VecDeque<MockDevice>>,
    prog_voltage: BTreeMap<u32, Voltage>,
}

impl MockState {
    fn handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }
}

/// Mock library for testing
pub struct MockLibrary {
    version: ApiVersion,
    procedures: Mutex<ProcedureSet>,
    devices: Mutex<Vec<MockDevice>>,
    latency: Mutex<Duration>,
    state: Mutex<MockState>,
    in_flight: AtomicBool,
    overlaps: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl MockLibrary {
    /// A library exporting every procedure of `version`
    pub fn new(version: ApiVersion) -> Self {
        Self {
            version,
            procedures: Mutex::new(ProcedureSet::full(version)),
            devices: Mutex::new(vec![MockDevice {
                name: "J2534-1:MockDevice".to_string(),
                available: true,
            }]),
            latency: Mutex::new(Duration::ZERO),
            state: Mutex::new(MockState::default()),
            in_flight: AtomicBool::new(false),
            overlaps: AtomicUsize::new(0),
        }
    }

    pub fn version(&self) -> ApiVersion {
        self.version
    }

    /// Pretend the library does not export `procedure`
    pub fn remove_procedure(&self, procedure: Procedure) {
        self.procedures.lock().remove(procedure);
    }

    /// Time each call spends in flight
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Devices reported by the next scan
    pub fn set_devices(&self, devices: Vec<MockDevice>) {
        *self.devices.lock() = devices;
    }

    /// Fail the next call of `procedure` with `code`
    pub fn fail_next(&self, procedure: Procedure, code: ErrorCode) {
        self.state
            .lock()
            .failures
            .entry(procedure)
            .or_default()
            .push_back(code);
    }

    /// Queue a message for reading on `channel_id`
    ///
    /// Messages injected before the channel exists are delivered once it
    /// is connected with that id.
    pub fn inject_rx(&self, channel_id: u32, message: Message) {
        let mut state = self.state.lock();
        match state.channels.get_mut(&channel_id) {
            Some(channel) => channel.rx.push_back(message),
            None => state
                .pending_rx
                .entry(channel_id)
                .or_default()
                .push_back(message),
        }
    }

    /// Snapshot of a connected channel
    pub fn channel(&self, channel_id: u32) -> Option<MockChannel> {
        self.state.lock().channels.get(&channel_id).cloned()
    }

    pub fn written(&self, channel_id: u32) -> Vec<Message> {
        self.channel(channel_id)
            .map(|c| c.written)
            .unwrap_or_default()
    }

    pub fn filters(&self, channel_id: u32) -> Vec<MockFilter> {
        self.channel(channel_id)
            .map(|c| c.filters.into_values().collect())
            .unwrap_or_default()
    }

    pub fn open_devices(&self) -> usize {
        self.state.lock().devices_open.len()
    }

    /// Procedures that reached the library, in call order
    pub fn calls(&self) -> Vec<Procedure> {
        self.state.lock().calls.clone()
    }

    pub fn programming_voltage(&self, pin: u32) -> Option<Voltage> {
        self.state.lock().prog_voltage.get(&pin).copied()
    }

    /// Calls that arrived while another was still in flight
    pub fn overlapping_calls(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    /// Run one native call: overlap detection, latency, scripted failures,
    /// then `body` under the state lock.
    fn call(&self, procedure: Procedure, body: impl FnOnce(&mut MockState) -> ErrorCode) -> Status {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
            return ErrorCode::ConcurrentApiCall.value();
        }
        let _guard = InFlight(&self.in_flight);

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        let mut state = self.state.lock();
        state.calls.push(procedure);

        let scripted = state
            .failures
            .get_mut(&procedure)
            .and_then(|queue| queue.pop_front());
        let code = match scripted {
            Some(code) => code,
            None => body(&mut state),
        };

        if code != ErrorCode::NoError {
            state.last_error = format!("{}: {}", procedure, code.description());
        }
        debug!(%procedure, rc = %code, "Mock library call");
        code.value()
    }

    fn channel_mut(state: &mut MockState, channel_id: u32) -> Result<&mut MockChannel, ErrorCode> {
        state
            .channels
            .get_mut(&channel_id)
            .ok_or(ErrorCode::InvalidChannelId)
    }

    fn new_channel(state: &mut MockState, mut channel: MockChannel) -> u32 {
        let id = state.handle();
        if let Some(pending) = state.pending_rx.remove(&id) {
            channel.rx.extend(pending);
        }
        channel
            .config
            .insert(config_param::DATA_RATE, channel.baudrate);
        state.channels.insert(id, channel);
        id
    }

    /// Pop up to `wanted` messages and pick the status the standard requires
    fn drain(rx: &mut VecDeque<Message>, wanted: usize, timeout: u32) -> (Vec<Message>, ErrorCode) {
        let take = wanted.min(rx.len());
        let msgs: Vec<Message> = rx.drain(..take).collect();
        let code = if msgs.len() == wanted {
            ErrorCode::NoError
        } else if timeout > 0 {
            ErrorCode::Timeout
        } else if msgs.is_empty() {
            ErrorCode::BufferEmpty
        } else {
            ErrorCode::NoError
        };
        (msgs, code)
    }

    fn filter_arity(filter_type: u32, has_flow: bool) -> Result<(), ErrorCode> {
        let flow_control = filter_type == FilterKind::FlowControl.value();
        if filter_type == 0 || filter_type > FilterKind::FlowControl.value() {
            return Err(ErrorCode::FilterTypeNotSupported);
        }
        match (flow_control, has_flow) {
            (true, false) => Err(ErrorCode::NullParameter),
            (false, true) => Err(ErrorCode::NullRequired),
            _ => Ok(()),
        }
    }
}

fn status(result: Result<(), ErrorCode>) -> ErrorCode {
    match result {
        Ok(()) => ErrorCode::NoError,
        Err(code) => code,
    }
}

fn fill(buf: &mut StringBuffer, text: &str) {
    buf.fill(0);
    let len = text.len().min(buf.len() - 1);
    buf[..len].copy_from_slice(&text.as_bytes()[..len]);
}

impl PassThruLibrary for MockLibrary {
    fn name(&self) -> &str {
        "mock"
    }

    fn procedures(&self) -> ProcedureSet {
        self.procedures.lock().clone()
    }

    fn open(&self, name: Option<&CStr>, device_id: &mut u32) -> Status {
        let name = name
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.call(Procedure::Open, |state| {
            if state.devices_open.values().any(|open| *open == name) {
                return ErrorCode::DeviceInUse;
            }
            let id = state.handle();
            state.devices_open.insert(id, name);
            *device_id = id;
            ErrorCode::NoError
        })
    }

    fn close(&self, device_id: u32) -> Status {
        self.call(Procedure::Close, |state| {
            if state.devices_open.remove(&device_id).is_none() {
                return ErrorCode::InvalidDeviceId;
            }
            state.channels.retain(|_, c| c.device_id != device_id);
            ErrorCode::NoError
        })
    }

    fn connect(
        &self,
        device_id: u32,
        protocol_id: u32,
        flags: u32,
        baudrate: u32,
        channel_id: &mut u32,
    ) -> Status {
        self.call(Procedure::Connect, |state| {
            if !state.devices_open.contains_key(&device_id) {
                return ErrorCode::InvalidDeviceId;
            }
            if let ProtocolId::Other(_) | ProtocolId::Iso15765Logical = ProtocolId::from(protocol_id)
            {
                return ErrorCode::ProtocolIdNotSupported;
            }
            *channel_id = Self::new_channel(
                state,
                MockChannel {
                    device_id,
                    protocol_id,
                    flags,
                    baudrate,
                    ..Default::default()
                },
            );
            ErrorCode::NoError
        })
    }

    fn connect_with_resource(
        &self,
        device_id: u32,
        protocol_id: u32,
        flags: u32,
        baudrate: u32,
        resource: &ResourceStruct,
        channel_id: &mut u32,
    ) -> Status {
        // SAFETY: the caller keeps the pin list alive for the duration of the call
        let resources = unsafe { resource.resources() }.to_vec();
        self.call(Procedure::Connect, |state| {
            if !state.devices_open.contains_key(&device_id) {
                return ErrorCode::InvalidDeviceId;
            }
            if resources.is_empty() {
                return ErrorCode::PinNotSupported;
            }
            *channel_id = Self::new_channel(
                state,
                MockChannel {
                    device_id,
                    protocol_id,
                    flags,
                    baudrate,
                    resources,
                    ..Default::default()
                },
            );
            ErrorCode::NoError
        })
    }

    fn disconnect(&self, channel_id: u32) -> Status {
        self.call(Procedure::Disconnect, |state| {
            if state.channels.remove(&channel_id).is_none() {
                return ErrorCode::InvalidChannelId;
            }
            state
                .channels
                .retain(|_, c| !matches!(c.logical, Some((parent, _)) if parent == channel_id));
            ErrorCode::NoError
        })
    }

    fn logical_connect(
        &self,
        physical_channel_id: u32,
        protocol_id: u32,
        flags: u32,
        descriptor: &Iso15765ChannelDescriptor,
        channel_id: &mut u32,
    ) -> Status {
        let descriptor = *descriptor;
        self.call(Procedure::LogicalConnect, |state| {
            let parent = match state.channels.get(&physical_channel_id) {
                Some(parent) => parent.clone(),
                None => return ErrorCode::InvalidChannelId,
            };
            if ProtocolId::from(protocol_id) != ProtocolId::Iso15765Logical {
                return ErrorCode::ProtocolIdNotSupported;
            }
            let physical = matches!(
                ProtocolId::from(parent.protocol_id),
                ProtocolId::Can | ProtocolId::Iso15765
            );
            if parent.logical.is_some() || !physical {
                return ErrorCode::LogChanNotAllowed;
            }
            *channel_id = Self::new_channel(
                state,
                MockChannel {
                    device_id: parent.device_id,
                    protocol_id,
                    flags,
                    baudrate: parent.baudrate,
                    logical: Some((physical_channel_id, descriptor)),
                    ..Default::default()
                },
            );
            ErrorCode::NoError
        })
    }

    fn logical_disconnect(&self, channel_id: u32) -> Status {
        self.call(Procedure::LogicalDisconnect, |state| {
            match state.channels.get(&channel_id) {
                Some(c) if c.logical.is_some() => {
                    state.channels.remove(&channel_id);
                    ErrorCode::NoError
                }
                _ => ErrorCode::InvalidChannelId,
            }
        })
    }

    fn select(&self, channel_set: &mut SChannelSet, select_type: u32, timeout: u32) -> Status {
        // SAFETY: the caller keeps the channel list alive for the duration of the call
        let requested = unsafe { channel_set.channels_mut() }.to_vec();
        let threshold = channel_set.channel_threshold as usize;
        let mut readable = Vec::new();

        let rc = self.call(Procedure::Select, |state| {
            if select_type != SelectType::Readable.value() {
                return ErrorCode::SelectTypeNotSupported;
            }
            for id in &requested {
                match state.channels.get(id) {
                    Some(c) if !c.rx.is_empty() => readable.push(*id),
                    Some(_) => {}
                    None => return ErrorCode::InvalidChannelId,
                }
            }
            if readable.len() < threshold && timeout > 0 {
                return ErrorCode::Timeout;
            }
            ErrorCode::NoError
        });

        if rc == ErrorCode::NoError.value() {
            // SAFETY: as above; `readable` is a subset of the list so it fits
            let list = unsafe { channel_set.channels_mut() };
            list[..readable.len()].copy_from_slice(&readable);
            channel_set.channel_count = readable.len() as u32;
        }
        rc
    }

    fn read_msgs4(
        &self,
        channel_id: u32,
        msgs: &mut [PassThruMsg4],
        num_msgs: &mut u32,
        timeout: u32,
    ) -> Status {
        let wanted = (*num_msgs as usize).min(msgs.len());
        *num_msgs = 0;
        self.call(Procedure::ReadMsgs, |state| {
            let channel = match Self::channel_mut(state, channel_id) {
                Ok(channel) => channel,
                Err(code) => return code,
            };
            let (read, code) = Self::drain(&mut channel.rx, wanted, timeout);
            for (slot, msg) in msgs.iter_mut().zip(&read) {
                match PassThruMsg4::from_message(msg) {
                    Ok(record) => *slot = *record,
                    Err(_) => return ErrorCode::BufferOverflow,
                }
            }
            *num_msgs = read.len() as u32;
            code
        })
    }

    fn read_msgs5(
        &self,
        channel_id: u32,
        msgs: &mut [PassThruMsg5],
        num_msgs: &mut u32,
        timeout: u32,
    ) -> Status {
        let wanted = (*num_msgs as usize).min(msgs.len());
        *num_msgs = 0;
        self.call(Procedure::ReadMsgs, |state| {
            let channel = match Self::channel_mut(state, channel_id) {
                Ok(channel) => channel,
                Err(code) => return code,
            };
            let (read, code) = Self::drain(&mut channel.rx, wanted, timeout);
            for (slot, msg) in msgs.iter_mut().zip(&read) {
                let bytes = msg.wire_bytes();
                // SAFETY: the caller's batch owns `data_buffer_size` bytes behind each record
                let buffer = unsafe { slot.buffer_mut() };
                if buffer.len() < bytes.len() {
                    return ErrorCode::BufferTooSmall;
                }
                buffer[..bytes.len()].copy_from_slice(&bytes);
                slot.set_header(&msg.header());
            }
            *num_msgs = read.len() as u32;
            code
        })
    }

    fn write_msgs4(
        &self,
        channel_id: u32,
        msgs: &[PassThruMsg4],
        num_msgs: &mut u32,
        _timeout: u32,
    ) -> Status {
        let wanted = (*num_msgs as usize).min(msgs.len());
        *num_msgs = 0;
        self.call(Procedure::WriteMsgs, |state| {
            let channel = match Self::channel_mut(state, channel_id) {
                Ok(channel) => channel,
                Err(code) => return code,
            };
            for record in &msgs[..wanted] {
                if record.protocol_id != channel.protocol_id {
                    return ErrorCode::MsgProtocolId;
                }
                match record.to_message() {
                    Ok(msg) => channel.written.push(msg),
                    Err(_) => return ErrorCode::InvalidMsg,
                }
                *num_msgs += 1;
            }
            ErrorCode::NoError
        })
    }

    fn queue_msgs5(&self, channel_id: u32, msgs: &[PassThruMsg5], num_msgs: &mut u32) -> Status {
        let wanted = (*num_msgs as usize).min(msgs.len());
        *num_msgs = 0;
        self.call(Procedure::QueueMsgs, |state| {
            let channel = match Self::channel_mut(state, channel_id) {
                Ok(channel) => channel,
                Err(code) => return code,
            };
            for record in &msgs[..wanted] {
                if record.protocol_id != channel.protocol_id {
                    return ErrorCode::MsgProtocolId;
                }
                // SAFETY: the caller's batch owns the buffer behind each record
                let buffer = unsafe { record.buffer() };
                let Some(payload) = buffer.get(..record.data_length as usize) else {
                    return ErrorCode::InvalidMsg;
                };
                channel
                    .written
                    .push(Message::from_parts(&record.header(), payload));
                *num_msgs += 1;
            }
            ErrorCode::NoError
        })
    }

    fn start_periodic_msg4(
        &self,
        channel_id: u32,
        msg: &PassThruMsg4,
        msg_id: &mut u32,
        interval_ms: u32,
    ) -> Status {
        self.call(Procedure::StartPeriodicMsg, |state| {
            let id = state.handle();
            let channel = match Self::channel_mut(state, channel_id) {
                Ok(channel) => channel,
                Err(code) => return code,
            };
            if !(5..=65535).contains(&interval_ms) {
                return ErrorCode::TimeIntervalNotSupported;
            }
            let Ok(message) = msg.to_message() else {
                return ErrorCode::InvalidMsg;
            };
            channel.periodic.insert(
                id,
                MockPeriodic {
                    message,
                    interval_ms,
                },
            );
            *msg_id = id;
            ErrorCode::NoError
        })
    }

    fn start_periodic_msg5(
        &self,
        channel_id: u32,
        msg: &PassThruMsg5,
        msg_id: &mut u32,
        interval_ms: u32,
    ) -> Status {
        // SAFETY: the caller's batch owns the buffer behind the record
        let payload = unsafe { msg.buffer() }
            .get(..msg.data_length as usize)
            .map(|p| Message::from_parts(&msg.header(), p));
        self.call(Procedure::StartPeriodicMsg, |state| {
            let id = state.handle();
            let channel = match Self::channel_mut(state, channel_id) {
                Ok(channel) => channel,
                Err(code) => return code,
            };
            if !(5..=65535).contains(&interval_ms) {
                return ErrorCode::TimeIntervalNotSupported;
            }
            let Some(message) = payload else {
                return ErrorCode::InvalidMsg;
            };
            channel.periodic.insert(
                id,
                MockPeriodic {
                    message,
                    interval_ms,
                },
            );
            *msg_id = id;
            ErrorCode::NoError
        })
    }

    fn stop_periodic_msg(&self, channel_id: u32, msg_id: u32) -> Status {
        self.call(Procedure::StopPeriodicMsg, |state| {
            let channel = match Self::channel_mut(state, channel_id) {
                Ok(channel) => channel,
                Err(code) => return code,
            };
            match channel.periodic.remove(&msg_id) {
                Some(_) => ErrorCode::NoError,
                None => ErrorCode::InvalidMsgId,
            }
        })
    }

    fn start_msg_filter4(
        &self,
        channel_id: u32,
        filter_type: u32,
        mask: &PassThruMsg4,
        pattern: &PassThruMsg4,
        flow_control: Option<&PassThruMsg4>,
        filter_id: &mut u32,
    ) -> Status {
        self.call(Procedure::StartMsgFilter, |state| {
            let id = state.handle();
            let channel = match Self::channel_mut(state, channel_id) {
                Ok(channel) => channel,
                Err(code) => return code,
            };
            if let Err(code) = Self::filter_arity(filter_type, flow_control.is_some()) {
                return code;
            }
            let decoded = (
                mask.to_message(),
                pattern.to_message(),
                flow_control.map(PassThruMsg4::to_message).transpose(),
            );
            let (Ok(mask), Ok(pattern), Ok(flow_control)) = decoded else {
                return ErrorCode::InvalidMsg;
            };
            if mask.data_size() != pattern.data_size() || mask.data_size() > 12 {
                return ErrorCode::InvalidMsg;
            }
            channel.filters.insert(
                id,
                MockFilter {
                    kind: filter_type,
                    mask,
                    pattern,
                    flow_control,
                },
            );
            *filter_id = id;
            ErrorCode::NoError
        })
    }

    fn start_msg_filter5(
        &self,
        channel_id: u32,
        filter_type: u32,
        mask: &PassThruMsg5,
        pattern: &PassThruMsg5,
        filter_id: &mut u32,
    ) -> Status {
        let decode = |record: &PassThruMsg5| {
            // SAFETY: the caller's batch owns the buffer behind the record
            unsafe { record.buffer() }
                .get(..record.data_length as usize)
                .map(|p| Message::from_parts(&record.header(), p))
        };
        let decoded = (decode(mask), decode(pattern));
        self.call(Procedure::StartMsgFilter, |state| {
            let id = state.handle();
            let channel = match Self::channel_mut(state, channel_id) {
                Ok(channel) => channel,
                Err(code) => return code,
            };
            if filter_type == FilterKind::FlowControl.value() {
                return ErrorCode::FilterTypeNotSupported;
            }
            if let Err(code) = Self::filter_arity(filter_type, false) {
                return code;
            }
            let (Some(mask), Some(pattern)) = decoded else {
                return ErrorCode::InvalidMsg;
            };
            if mask.data_size() != pattern.data_size() {
                return ErrorCode::InvalidMsg;
            }
            channel.filters.insert(
                id,
                MockFilter {
                    kind: filter_type,
                    mask,
                    pattern,
                    flow_control: None,
                },
            );
            *filter_id = id;
            ErrorCode::NoError
        })
    }

    fn stop_msg_filter(&self, channel_id: u32, filter_id: u32) -> Status {
        self.call(Procedure::StopMsgFilter, |state| {
            let channel = match Self::channel_mut(state, channel_id) {
                Ok(channel) => channel,
                Err(code) => return code,
            };
            match channel.filters.remove(&filter_id) {
                Some(_) => ErrorCode::NoError,
                None => ErrorCode::InvalidFilterId,
            }
        })
    }

    fn set_programming_voltage4(&self, device_id: u32, pin: u32, voltage: u32) -> Status {
        self.call(Procedure::SetProgrammingVoltage, |state| {
            if !state.devices_open.contains_key(&device_id) {
                return ErrorCode::InvalidDeviceId;
            }
            apply_voltage(state, &[pin], Voltage::from(voltage))
        })
    }

    fn set_programming_voltage5(
        &self,
        device_id: u32,
        resource: &ResourceStruct,
        voltage: u32,
    ) -> Status {
        // SAFETY: the caller keeps the pin list alive for the duration of the call
        let pins = unsafe { resource.resources() }.to_vec();
        self.call(Procedure::SetProgrammingVoltage, |state| {
            if !state.devices_open.contains_key(&device_id) {
                return ErrorCode::InvalidDeviceId;
            }
            apply_voltage(state, &pins, Voltage::from(voltage))
        })
    }

    fn read_version(
        &self,
        device_id: u32,
        firmware: &mut StringBuffer,
        dll: &mut StringBuffer,
        api: &mut StringBuffer,
    ) -> Status {
        let api_version = self.version.as_str();
        self.call(Procedure::ReadVersion, |state| {
            if !state.devices_open.contains_key(&device_id) {
                return ErrorCode::InvalidDeviceId;
            }
            fill(firmware, "1.00.0000");
            fill(dll, env!("CARGO_PKG_VERSION"));
            fill(api, api_version);
            ErrorCode::NoError
        })
    }

    fn get_last_error(&self, description: &mut StringBuffer) -> Status {
        self.call(Procedure::GetLastError, |state| {
            fill(description, &state.last_error);
            ErrorCode::NoError
        })
    }

    fn ioctl(&self, handle: u32, ioctl: u32, input: IoctlArg<'_>, output: IoctlArg<'_>) -> Status {
        self.call(Procedure::Ioctl, |state| match ioctl {
            ioctl_id::READ_PIN_VOLTAGE | ioctl_id::READ_PROG_VOLTAGE => {
                if !state.devices_open.contains_key(&handle) {
                    return ErrorCode::InvalidDeviceId;
                }
                let IoctlArg::Value(out) = output else {
                    return ErrorCode::NullParameter;
                };
                *out = if ioctl == ioctl_id::READ_PIN_VOLTAGE {
                    MOCK_BATTERY_MV
                } else {
                    state
                        .prog_voltage
                        .values()
                        .find_map(|v| match v {
                            Voltage::Millivolts(mv) => Some(*mv),
                            _ => None,
                        })
                        .unwrap_or(0)
                };
                ErrorCode::NoError
            }
            ioctl_id::GET_CONFIG | ioctl_id::SET_CONFIG => {
                let channel = match Self::channel_mut(state, handle) {
                    Ok(channel) => channel,
                    Err(code) => return code,
                };
                let IoctlArg::ConfigList(list) = input else {
                    return ErrorCode::NullParameter;
                };
                if !output.is_null() {
                    return ErrorCode::NullRequired;
                }
                // SAFETY: the caller keeps the parameter array alive for the call
                let params = unsafe { list.params_mut() };
                for param in params.iter_mut() {
                    if param.parameter == 0 || param.parameter > config_param::ECHO_PHYSICAL_CHANNEL_TX
                    {
                        return ErrorCode::IoctlParamIdNotSupported;
                    }
                    if ioctl == ioctl_id::GET_CONFIG {
                        param.value = channel.config.get(&param.parameter).copied().unwrap_or(0);
                    } else {
                        channel.config.insert(param.parameter, param.value);
                    }
                }
                ErrorCode::NoError
            }
            ioctl_id::CLEAR_TX_QUEUE
            | ioctl_id::CLEAR_RX_QUEUE
            | ioctl_id::CLEAR_PERIODIC_MSGS
            | ioctl_id::CLEAR_MSG_FILTERS
            | ioctl_id::CLEAR_FUNCT_MSG_LOOKUP_TABLE
            | ioctl_id::BUS_ON => {
                let channel = match Self::channel_mut(state, handle) {
                    Ok(channel) => channel,
                    Err(code) => return code,
                };
                if !input.is_null() || !output.is_null() {
                    return ErrorCode::NullRequired;
                }
                match ioctl {
                    ioctl_id::CLEAR_TX_QUEUE => channel.written.clear(),
                    ioctl_id::CLEAR_RX_QUEUE => channel.rx.clear(),
                    ioctl_id::CLEAR_PERIODIC_MSGS => channel.periodic.clear(),
                    ioctl_id::CLEAR_MSG_FILTERS => channel.filters.clear(),
                    _ => {}
                }
                ErrorCode::NoError
            }
            _ => ErrorCode::IoctlIdNotSupported,
        })
    }

    fn scan_for_devices(&self, device_count: &mut u32) -> Status {
        let devices = self.devices.lock().clone();
        self.call(Procedure::ScanForDevices, |state| {
            *device_count = devices.len() as u32;
            state.scan = Some(devices.into());
            ErrorCode::NoError
        })
    }

    fn get_next_device(&self, device: &mut SDevice) -> Status {
        self.call(Procedure::GetNextDevice, |state| {
            let Some(scan) = state.scan.as_mut() else {
                return ErrorCode::BufferEmpty;
            };
            let Some(next) = scan.pop_front() else {
                return ErrorCode::ExceededLimit;
            };
            *device = SDevice::default();
            device.set_name(&next.name);
            device.device_available = u32::from(next.available);
            device.device_connected_media = 1;
            device.device_connect_speed = 480_000_000;
            ErrorCode::NoError
        })
    }
}

fn apply_voltage(state: &mut MockState, pins: &[u32], voltage: Voltage) -> ErrorCode {
    if pins.is_empty() || pins.iter().any(|&p| p == 0 || p > 16) {
        return ErrorCode::PinNotSupported;
    }
    if let Voltage::Millivolts(mv) = voltage {
        if !(5_000..=20_000).contains(&mv) {
            return ErrorCode::ExceededLimit;
        }
        let busy = state
            .prog_voltage
            .iter()
            .any(|(pin, v)| !pins.contains(pin) && matches!(v, Voltage::Millivolts(_)));
        if busy {
            return ErrorCode::VoltageInUse;
        }
    }
    for &pin in pins {
        match voltage {
            Voltage::PinOff => {
                state.prog_voltage.remove(&pin);
            }
            v => {
                state.prog_voltage.insert(pin, v);
            }
        }
    }
    ErrorCode::NoError
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique() {
        let lib = MockLibrary::new(ApiVersion::V0404);
        let mut dev = 0;
        assert_eq!(lib.open(None, &mut dev), 0);

        let mut a = 0;
        let mut b = 0;
        assert_eq!(lib.connect(dev, 5, 0, 500_000, &mut a), 0);
        assert_eq!(lib.connect(dev, 6, 0, 500_000, &mut b), 0);
        assert_ne!(a, b);
        assert_ne!(a, dev);
    }

    #[test]
    fn test_read_status_policy() {
        let mut rx: VecDeque<Message> = VecDeque::new();
        assert_eq!(MockLibrary::drain(&mut rx, 3, 0).1, ErrorCode::BufferEmpty);
        assert_eq!(MockLibrary::drain(&mut rx, 3, 100).1, ErrorCode::Timeout);

        rx.push_back(Message::new(ProtocolId::Can, vec![1]));
        let (msgs, code) = MockLibrary::drain(&mut rx, 3, 0);
        assert_eq!(msgs.len(), 1);
        assert_eq!(code, ErrorCode::NoError);
    }

    #[test]
    fn test_scripted_failure_is_consumed_once() {
        let lib = MockLibrary::new(ApiVersion::V0404);
        lib.fail_next(Procedure::Open, ErrorCode::DeviceNotConnected);

        let mut dev = 0;
        assert_eq!(lib.open(None, &mut dev), ErrorCode::DeviceNotConnected.value());
        assert_eq!(lib.open(None, &mut dev), 0);

        let mut buf = [0u8; 80];
        lib.get_last_error(&mut buf);
        assert!(passthru_core::raw::read_c_str(&buf).starts_with("PassThruOpen"));
    }

    #[test]
    fn test_flow_control_filter_requires_flow_message() {
        assert_eq!(
            MockLibrary::filter_arity(FilterKind::FlowControl.value(), false),
            Err(ErrorCode::NullParameter)
        );
        assert_eq!(
            MockLibrary::filter_arity(FilterKind::Pass.value(), true),
            Err(ErrorCode::NullRequired)
        );
        assert_eq!(
            MockLibrary::filter_arity(7, false),
            Err(ErrorCode::FilterTypeNotSupported)
        );
    }
}
