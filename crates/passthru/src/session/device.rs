//! Device session façade

use std::ffi::CString;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use passthru_core::raw::{
    read_c_str, Iso15765ChannelDescriptor, SChannelSet, SDevice, PASSTHRU_MSG_DATA_SIZE,
    STRING_BUFFER_LEN,
};
use passthru_core::{
    ApiVersion, ConnectFlags, ConnectionConfig, FilterKind, FilterSpec, Message, ProtocolId,
    SelectType, ValidationError, Voltage,
};
use tracing::{debug, info, warn};

use super::{
    ChannelHandle, DeviceHandle, DeviceInfo, FilterHandle, PeriodicHandle, VersionInfo,
};
use crate::config::SessionConfig;
use crate::encoding::{self, native_count, timeout_ms, WireEncoding};
use crate::error::{check, PassThruError, PassThruResult};
use crate::ioctl::{IoctlRequest, IoctlResponse, IoctlTarget};
use crate::library::{PassThruLibrary, StringBuffer};
use crate::procedure::{Procedure, ProcedureSet, VersionReq};

#[derive(Debug, Default)]
struct SessionState {
    open_refs: usize,
}

/// Preconditions of one session operation
#[derive(Debug, Clone, Copy)]
struct Call {
    operation: &'static str,
    procedure: Procedure,
    version: VersionReq,
    open_required: bool,
}

impl Call {
    fn new(operation: &'static str, procedure: Procedure) -> Self {
        Self {
            operation,
            procedure,
            version: VersionReq::Any,
            open_required: true,
        }
    }

    fn version(mut self, version: VersionReq) -> Self {
        self.version = version;
        self
    }

    fn unopened(mut self) -> Self {
        self.open_required = false;
        self
    }
}

/// A PassThru library bound to one API revision
///
/// All native calls are made while holding the session lock, so at most one
/// call is in flight per session. Every operation checks, in order, that the
/// library exports the procedure, that the API revision allows it and that a
/// device is open.
pub struct DeviceSession {
    library: Arc<dyn PassThruLibrary>,
    encoding: Box<dyn WireEncoding>,
    procedures: ProcedureSet,
    state: Mutex<SessionState>,
}

impl DeviceSession {
    pub fn new(library: Arc<dyn PassThruLibrary>, version: ApiVersion) -> Self {
        Self::with_encoding(library, encoding::for_version(version, PASSTHRU_MSG_DATA_SIZE))
    }

    /// Use the API revision and read buffer size from a config file
    pub fn from_config(library: Arc<dyn PassThruLibrary>, config: &SessionConfig) -> Self {
        Self::with_encoding(
            library,
            encoding::for_version(config.api_version, config.read_buffer_size),
        )
    }

    pub fn with_encoding(library: Arc<dyn PassThruLibrary>, encoding: Box<dyn WireEncoding>) -> Self {
        let procedures = library.procedures().restrict_to(encoding.version());
        info!(
            library = library.name(),
            version = %encoding.version(),
            procedures = procedures.len(),
            "PassThru session created"
        );
        Self {
            library,
            encoding,
            procedures,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn version(&self) -> ApiVersion {
        self.encoding.version()
    }

    /// Procedures callable through this session
    pub fn procedures(&self) -> &ProcedureSet {
        &self.procedures
    }

    pub fn library_name(&self) -> &str {
        self.library.name()
    }

    /// Number of successful opens not yet closed
    pub fn open_refs(&self) -> usize {
        self.state.lock().open_refs
    }

    /// Check the preconditions of `call` and take the session lock
    fn enter(&self, call: Call) -> PassThruResult<MutexGuard<'_, SessionState>> {
        if !self.procedures.contains(call.procedure) {
            return Err(PassThruError::NotSupported {
                operation: call.operation,
                procedure: call.procedure,
                library: self.library.name().to_string(),
            });
        }

        let actual = self.encoding.version();
        if !call.version.matches(actual) {
            return Err(PassThruError::VersionMismatch {
                operation: call.operation,
                required: call.version,
                actual,
            });
        }

        let state = self.state.lock();
        if call.open_required && state.open_refs == 0 {
            return Err(PassThruError::NotOpen {
                operation: call.operation,
            });
        }
        Ok(state)
    }

    /// Reject payloads the active encoding cannot carry
    fn check_payloads<'a>(
        &self,
        operation: &'static str,
        msgs: impl IntoIterator<Item = &'a Message>,
    ) -> PassThruResult<()> {
        let capacity = self.encoding.capacity();
        match msgs.into_iter().find(|m| m.data_size() > capacity) {
            Some(msg) => Err(PassThruError::validation(
                operation,
                ValidationError::PayloadTooLarge {
                    len: msg.data_size(),
                    capacity,
                },
            )),
            None => Ok(()),
        }
    }

    /// Open a device by name; an empty name opens the default device
    pub fn open(&self, name: &str) -> PassThruResult<DeviceHandle> {
        let c_name = if name.is_empty() {
            None
        } else {
            Some(CString::new(name).map_err(|_| {
                PassThruError::validation("open", ValidationError::InvalidDeviceName)
            })?)
        };

        let mut state = self.enter(Call::new("open", Procedure::Open).unopened())?;
        let mut device_id = 0;
        let rc = self.library.open(c_name.as_deref(), &mut device_id);
        debug!(name, device_id, rc, "PassThruOpen");
        check("open", rc).inspect_err(|e| warn!(name, error = %e, "Open failed"))?;

        state.open_refs += 1;
        let device = DeviceHandle::new(device_id);
        info!(name, %device, open_refs = state.open_refs, "Device opened");
        Ok(device)
    }

    pub fn open_default(&self) -> PassThruResult<DeviceHandle> {
        self.open("")
    }

    pub fn close(&self, device: DeviceHandle) -> PassThruResult<()> {
        let mut state = self.enter(Call::new("close", Procedure::Close))?;
        let rc = self.library.close(device.raw());
        debug!(device_id = device.raw(), rc, "PassThruClose");
        check("close", rc).inspect_err(|e| warn!(%device, error = %e, "Close failed"))?;

        state.open_refs -= 1;
        info!(%device, open_refs = state.open_refs, "Device closed");
        Ok(())
    }

    /// Connect a physical channel
    ///
    /// # Panics
    ///
    /// Under 05.00, ISO 15765 channels must be opened with
    /// [`logical_connect`](Self::logical_connect) on top of a CAN channel.
    pub fn connect(
        &self,
        device: DeviceHandle,
        config: &ConnectionConfig,
    ) -> PassThruResult<ChannelHandle> {
        let _state = self.enter(Call::new("connect", Procedure::Connect))?;
        let channel_id = self
            .encoding
            .connect(self.library.as_ref(), device.raw(), config)
            .inspect_err(|e| warn!(%device, error = %e, "Connect failed"))?;

        let channel = ChannelHandle::new(channel_id);
        info!(
            %device,
            %channel,
            protocol = %config.protocol_id(),
            baudrate = config.baudrate(),
            "Channel connected"
        );
        Ok(channel)
    }

    pub fn disconnect(&self, channel: ChannelHandle) -> PassThruResult<()> {
        let _state = self.enter(Call::new("disconnect", Procedure::Disconnect))?;
        let rc = self.library.disconnect(channel.raw());
        debug!(channel_id = channel.raw(), rc, "PassThruDisconnect");
        check("disconnect", rc)
            .inspect_err(|e| warn!(%channel, error = %e, "Disconnect failed"))?;

        info!(%channel, "Channel disconnected");
        Ok(())
    }

    /// Open an addressed ISO 15765 channel on a physical CAN channel (05.00)
    pub fn logical_connect(
        &self,
        physical: ChannelHandle,
        flags: ConnectFlags,
        descriptor: &Iso15765ChannelDescriptor,
    ) -> PassThruResult<ChannelHandle> {
        let _state = self.enter(
            Call::new("logical_connect", Procedure::LogicalConnect)
                .version(VersionReq::AtLeast(ApiVersion::V0500)),
        )?;
        let mut channel_id = 0;
        let rc = self.library.logical_connect(
            physical.raw(),
            ProtocolId::Iso15765Logical.value(),
            flags.bits(),
            descriptor,
            &mut channel_id,
        );
        debug!(
            physical_channel_id = physical.raw(),
            local = %hex::encode(descriptor.local_address),
            remote = %hex::encode(descriptor.remote_address),
            channel_id,
            rc,
            "PassThruLogicalConnect"
        );
        check("logical_connect", rc)
            .inspect_err(|e| warn!(%physical, error = %e, "Logical connect failed"))?;

        let channel = ChannelHandle::new(channel_id);
        info!(%physical, %channel, "Logical channel connected");
        Ok(channel)
    }

    pub fn logical_disconnect(&self, channel: ChannelHandle) -> PassThruResult<()> {
        let _state = self.enter(
            Call::new("logical_disconnect", Procedure::LogicalDisconnect)
                .version(VersionReq::AtLeast(ApiVersion::V0500)),
        )?;
        let rc = self.library.logical_disconnect(channel.raw());
        debug!(channel_id = channel.raw(), rc, "PassThruLogicalDisconnect");
        check("logical_disconnect", rc)
            .inspect_err(|e| warn!(%channel, error = %e, "Logical disconnect failed"))?;

        info!(%channel, "Logical channel disconnected");
        Ok(())
    }

    /// Wait until at least `threshold` of `channels` have messages to read
    ///
    /// Returns the readable channels.
    pub fn select(
        &self,
        channels: &[ChannelHandle],
        threshold: usize,
        timeout: Duration,
    ) -> PassThruResult<Vec<ChannelHandle>> {
        let _state = self.enter(
            Call::new("select", Procedure::Select).version(VersionReq::AtLeast(ApiVersion::V0500)),
        )?;
        native_count("select", "channel count", channels.len())?;
        let threshold_arg = native_count("select", "threshold", threshold)?;
        let mut ids: Vec<u32> = channels.iter().map(|c| c.raw()).collect();
        let mut set = SChannelSet::new(&mut ids, threshold_arg);
        let rc = self
            .library
            .select(&mut set, SelectType::Readable.value(), timeout_ms(timeout));
        let ready = (set.channel_count as usize).min(ids.len());
        debug!(requested = channels.len(), threshold, ready, rc, "PassThruSelect");
        check("select", rc).inspect_err(|e| warn!(threshold, error = %e, "Select failed"))?;

        Ok(ids[..ready].iter().copied().map(ChannelHandle::new).collect())
    }

    /// Read up to `count` messages, waiting at most `timeout`
    ///
    /// A zero timeout polls. Returns the messages that arrived, possibly none.
    pub fn read(
        &self,
        channel: ChannelHandle,
        count: usize,
        timeout: Duration,
    ) -> PassThruResult<Vec<Message>> {
        let _state = self.enter(Call::new("read", Procedure::ReadMsgs))?;
        let msgs = self
            .encoding
            .read_msgs(self.library.as_ref(), channel.raw(), count, timeout)
            .inspect_err(|e| warn!(%channel, error = %e, "Read failed"))?;

        for msg in &msgs {
            debug!(
                channel_id = channel.raw(),
                protocol = %msg.protocol,
                data = %hex::encode(&msg.data),
                extra = %hex::encode(&msg.extra),
                "Message received"
            );
        }
        Ok(msgs)
    }

    /// Send messages (04.04). Returns the number sent.
    pub fn write(
        &self,
        channel: ChannelHandle,
        msgs: &[Message],
        timeout: Duration,
    ) -> PassThruResult<usize> {
        let _state = self.enter(
            Call::new("write", Procedure::WriteMsgs).version(VersionReq::Exact(ApiVersion::V0404)),
        )?;
        self.check_payloads("write", msgs)?;
        self.encoding
            .write_msgs(self.library.as_ref(), channel.raw(), msgs, timeout)
            .inspect_err(|e| warn!(%channel, error = %e, "Write failed"))
    }

    /// Queue messages for transmission (05.00). Returns the number queued.
    pub fn queue(&self, channel: ChannelHandle, msgs: &[Message]) -> PassThruResult<usize> {
        let _state = self.enter(
            Call::new("queue", Procedure::QueueMsgs)
                .version(VersionReq::AtLeast(ApiVersion::V0500)),
        )?;
        self.check_payloads("queue", msgs)?;
        self.encoding
            .queue_msgs(self.library.as_ref(), channel.raw(), msgs)
            .inspect_err(|e| warn!(%channel, error = %e, "Queue failed"))
    }

    pub fn start_periodic(
        &self,
        channel: ChannelHandle,
        msg: &Message,
        interval: Duration,
    ) -> PassThruResult<PeriodicHandle> {
        let _state = self.enter(Call::new("start_periodic", Procedure::StartPeriodicMsg))?;
        self.check_payloads("start_periodic", [msg])?;
        let msg_id = self
            .encoding
            .start_periodic_msg(self.library.as_ref(), channel.raw(), msg, interval)
            .inspect_err(|e| warn!(%channel, error = %e, "Periodic message start failed"))?;

        info!(%channel, msg_id, interval_ms = timeout_ms(interval), "Periodic message started");
        Ok(PeriodicHandle::new(msg_id))
    }

    pub fn stop_periodic(&self, channel: ChannelHandle, periodic: PeriodicHandle) -> PassThruResult<()> {
        let _state = self.enter(Call::new("stop_periodic", Procedure::StopPeriodicMsg))?;
        let rc = self.library.stop_periodic_msg(channel.raw(), periodic.raw());
        debug!(channel_id = channel.raw(), msg_id = periodic.raw(), rc, "PassThruStopPeriodicMsg");
        check("stop_periodic", rc)
            .inspect_err(|e| {
                warn!(%channel, msg_id = periodic.raw(), error = %e, "Periodic message stop failed")
            })
    }

    /// Install a flow-control filter (04.04)
    pub fn set_filter(
        &self,
        channel: ChannelHandle,
        filter: &FilterSpec,
    ) -> PassThruResult<FilterHandle> {
        let _state = self.enter(
            Call::new("set_filter", Procedure::StartMsgFilter)
                .version(VersionReq::Exact(ApiVersion::V0404)),
        )?;
        let filter_id = self
            .encoding
            .start_flow_control_filter(self.library.as_ref(), channel.raw(), filter)
            .inspect_err(|e| warn!(%channel, error = %e, "Filter install failed"))?;

        info!(%channel, kind = %filter.kind(), filter_id, "Filter installed");
        Ok(FilterHandle::new(filter_id))
    }

    /// Install a pass or block filter (05.00)
    pub fn start_msg_filter(
        &self,
        channel: ChannelHandle,
        kind: FilterKind,
        mask: &Message,
        pattern: &Message,
    ) -> PassThruResult<FilterHandle> {
        let _state = self.enter(
            Call::new("start_msg_filter", Procedure::StartMsgFilter)
                .version(VersionReq::AtLeast(ApiVersion::V0500)),
        )?;
        self.check_payloads("start_msg_filter", [mask, pattern])?;
        let filter_id = self
            .encoding
            .start_msg_filter(self.library.as_ref(), channel.raw(), kind, mask, pattern)
            .inspect_err(|e| warn!(%channel, error = %e, "Filter install failed"))?;

        info!(%channel, %kind, filter_id, "Filter installed");
        Ok(FilterHandle::new(filter_id))
    }

    pub fn stop_msg_filter(&self, channel: ChannelHandle, filter: FilterHandle) -> PassThruResult<()> {
        let _state = self.enter(Call::new("stop_msg_filter", Procedure::StopMsgFilter))?;
        let rc = self.library.stop_msg_filter(channel.raw(), filter.raw());
        debug!(channel_id = channel.raw(), filter_id = filter.raw(), rc, "PassThruStopMsgFilter");
        check("stop_msg_filter", rc)
            .inspect_err(|e| {
                warn!(%channel, filter_id = filter.raw(), error = %e, "Filter removal failed")
            })
    }

    pub fn set_programming_voltage(
        &self,
        device: DeviceHandle,
        pin: u8,
        voltage: Voltage,
    ) -> PassThruResult<()> {
        let _state = self.enter(Call::new(
            "set_programming_voltage",
            Procedure::SetProgrammingVoltage,
        ))?;
        self.encoding
            .set_programming_voltage(self.library.as_ref(), device.raw(), pin, voltage)
            .inspect_err(|e| warn!(%device, pin, error = %e, "Programming voltage failed"))
    }

    pub fn read_version(&self, device: DeviceHandle) -> PassThruResult<VersionInfo> {
        let _state = self.enter(Call::new("read_version", Procedure::ReadVersion))?;
        let mut firmware: StringBuffer = [0; STRING_BUFFER_LEN];
        let mut dll: StringBuffer = [0; STRING_BUFFER_LEN];
        let mut api: StringBuffer = [0; STRING_BUFFER_LEN];
        let rc = self
            .library
            .read_version(device.raw(), &mut firmware, &mut dll, &mut api);
        debug!(device_id = device.raw(), rc, "PassThruReadVersion");
        check("read_version", rc)
            .inspect_err(|e| warn!(%device, error = %e, "Read version failed"))?;

        Ok(VersionInfo {
            firmware: read_c_str(&firmware),
            dll: read_c_str(&dll),
            api: read_c_str(&api),
        })
    }

    /// Description of the library's most recent failure
    pub fn last_error(&self) -> PassThruResult<String> {
        let _state = self.enter(Call::new("last_error", Procedure::GetLastError).unopened())?;
        let mut description: StringBuffer = [0; STRING_BUFFER_LEN];
        let rc = self.library.get_last_error(&mut description);
        debug!(rc, "PassThruGetLastError");
        check("last_error", rc)?;
        Ok(read_c_str(&description))
    }

    pub fn ioctl(
        &self,
        target: impl Into<IoctlTarget>,
        request: IoctlRequest,
    ) -> PassThruResult<IoctlResponse> {
        let _state = self.enter(Call::new("ioctl", Procedure::Ioctl))?;
        let target = target.into();
        request
            .execute(self.library.as_ref(), target)
            .inspect_err(|e| warn!(?target, error = %e, "Ioctl failed"))
    }

    /// Enumerate attached devices (05.00). Returns the number found.
    pub fn scan_for_devices(&self) -> PassThruResult<u32> {
        let _state = self.enter(
            Call::new("scan_for_devices", Procedure::ScanForDevices)
                .version(VersionReq::AtLeast(ApiVersion::V0500))
                .unopened(),
        )?;
        let mut count = 0;
        let rc = self.library.scan_for_devices(&mut count);
        debug!(count, rc, "PassThruScanForDevices");
        check("scan_for_devices", rc)
            .inspect_err(|e| warn!(error = %e, "Device scan failed"))?;

        info!(count, "Device scan complete");
        Ok(count)
    }

    /// Next device from the last scan (05.00)
    pub fn next_device(&self) -> PassThruResult<DeviceInfo> {
        let _state = self.enter(
            Call::new("next_device", Procedure::GetNextDevice)
                .version(VersionReq::AtLeast(ApiVersion::V0500))
                .unopened(),
        )?;
        let mut device = SDevice::default();
        let rc = self.library.get_next_device(&mut device);
        debug!(?device, rc, "PassThruGetNextDevice");
        check("next_device", rc)?;
        Ok(DeviceInfo::from(&device))
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("library", &self.library.name())
            .field("version", &self.encoding.version())
            .field("open_refs", &self.state.lock().open_refs)
            .finish()
    }
}
