//! Library bound to resolved `PassThru*` entry points
//!
//! Loading the vendor library is left to the caller. [`NativeLibrary`] takes
//! a resolver that maps export names to addresses, keeps the exports the API
//! revision defines and calls them through typed function pointers.
//!
//! # Example
//!
//! ```ignore
//! let library = unsafe {
//!     NativeLibrary::from_resolver(ApiVersion::V0404, |symbol| {
//!         vendor.symbol_address(symbol)
//!     })
//! }
//! .with_name("ExampleUdsDev");
//! let session = DeviceSession::new(Arc::new(library), ApiVersion::V0404);
//! ```

use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr};
use std::fmt;
use std::mem;
use std::ptr;

use passthru_core::raw::{
    Iso15765ChannelDescriptor, PassThruMsg4, PassThruMsg5, ResourceStruct, SChannelSet, SDevice,
};
use passthru_core::ApiVersion;
use tracing::debug;

use super::gateway::{IoctlArg, PassThruLibrary, Status, StringBuffer, NOT_SUPPORTED};
use crate::procedure::{Procedure, ProcedureSet};

type OpenFn = unsafe extern "system" fn(*const c_char, *mut u32) -> Status;
type HandleFn = unsafe extern "system" fn(u32) -> Status;
type StopFn = unsafe extern "system" fn(u32, u32) -> Status;
type Connect4Fn = unsafe extern "system" fn(u32, u32, u32, u32, *mut u32) -> Status;
type Connect5Fn = unsafe extern "system" fn(u32, u32, u32, u32, ResourceStruct, *mut u32) -> Status;
type LogicalConnectFn = unsafe extern "system" fn(u32, u32, u32, *const c_void, *mut u32) -> Status;
type SelectFn = unsafe extern "system" fn(*mut SChannelSet, u32, u32) -> Status;
type ReadMsgs4Fn = unsafe extern "system" fn(u32, *mut PassThruMsg4, *mut u32, u32) -> Status;
type ReadMsgs5Fn = unsafe extern "system" fn(u32, *mut PassThruMsg5, *mut u32, u32) -> Status;
type WriteMsgs4Fn = unsafe extern "system" fn(u32, *const PassThruMsg4, *mut u32, u32) -> Status;
type QueueMsgs5Fn = unsafe extern "system" fn(u32, *const PassThruMsg5, *mut u32) -> Status;
type StartPeriodic4Fn = unsafe extern "system" fn(u32, *const PassThruMsg4, *mut u32, u32) -> Status;
type StartPeriodic5Fn = unsafe extern "system" fn(u32, *const PassThruMsg5, *mut u32, u32) -> Status;
type StartFilter4Fn = unsafe extern "system" fn(
    u32,
    u32,
    *const PassThruMsg4,
    *const PassThruMsg4,
    *const PassThruMsg4,
    *mut u32,
) -> Status;
type StartFilter5Fn = unsafe extern "system" fn(
    u32,
    u32,
    *const PassThruMsg5,
    *const PassThruMsg5,
    *mut u32,
) -> Status;
type SetVoltage4Fn = unsafe extern "system" fn(u32, u32, u32) -> Status;
type SetVoltage5Fn = unsafe extern "system" fn(u32, ResourceStruct, u32) -> Status;
type ReadVersionFn = unsafe extern "system" fn(u32, *mut c_char, *mut c_char, *mut c_char) -> Status;
type GetLastErrorFn = unsafe extern "system" fn(*mut c_char) -> Status;
type IoctlFn = unsafe extern "system" fn(u32, u32, *mut c_void, *mut c_void) -> Status;
type ScanFn = unsafe extern "system" fn(*mut u32) -> Status;
type NextDeviceFn = unsafe extern "system" fn(*mut SDevice) -> Status;

/// Typed entry points; an export the library lacks stays `None`
#[derive(Default, Clone, Copy)]
struct EntryPoints {
    open: Option<OpenFn>,
    close: Option<HandleFn>,
    connect4: Option<Connect4Fn>,
    connect5: Option<Connect5Fn>,
    disconnect: Option<HandleFn>,
    logical_connect: Option<LogicalConnectFn>,
    logical_disconnect: Option<HandleFn>,
    select: Option<SelectFn>,
    read_msgs4: Option<ReadMsgs4Fn>,
    read_msgs5: Option<ReadMsgs5Fn>,
    write_msgs4: Option<WriteMsgs4Fn>,
    queue_msgs5: Option<QueueMsgs5Fn>,
    start_periodic4: Option<StartPeriodic4Fn>,
    start_periodic5: Option<StartPeriodic5Fn>,
    stop_periodic: Option<StopFn>,
    start_filter4: Option<StartFilter4Fn>,
    start_filter5: Option<StartFilter5Fn>,
    stop_filter: Option<StopFn>,
    set_voltage4: Option<SetVoltage4Fn>,
    set_voltage5: Option<SetVoltage5Fn>,
    read_version: Option<ReadVersionFn>,
    get_last_error: Option<GetLastErrorFn>,
    ioctl: Option<IoctlFn>,
    scan_for_devices: Option<ScanFn>,
    get_next_device: Option<NextDeviceFn>,
}

/// Addresses found for one API revision
struct Resolved {
    version: ApiVersion,
    addresses: HashMap<String, *const c_void>,
}

impl Resolved {
    /// # Safety
    ///
    /// `F` must be the function pointer type of `procedure`'s prototype.
    unsafe fn get<F: Copy>(&self, procedure: Procedure) -> Option<F> {
        debug_assert_eq!(mem::size_of::<F>(), mem::size_of::<*const c_void>());
        self.addresses
            .get(procedure.symbol())
            .map(|addr| mem::transmute_copy::<*const c_void, F>(addr))
    }

    /// Like [`Resolved::get`], for exports whose prototype is specific to `version`
    unsafe fn get_for<F: Copy>(&self, version: ApiVersion, procedure: Procedure) -> Option<F> {
        if self.version == version {
            self.get(procedure)
        } else {
            None
        }
    }
}

/// Clamp a caller-supplied message count to the records actually provided
fn clamp_count(num_msgs: &mut u32, len: usize) {
    *num_msgs = (*num_msgs).min(u32::try_from(len).unwrap_or(u32::MAX));
}

/// A PassThru library reached through resolved export addresses
pub struct NativeLibrary {
    name: String,
    version: ApiVersion,
    procedures: ProcedureSet,
    entry: EntryPoints,
}

impl NativeLibrary {
    /// Bind the exports `resolve` finds for `version`
    ///
    /// `resolve` is asked once per export the revision defines; `None` or a
    /// null address marks the export as missing.
    ///
    /// # Safety
    ///
    /// Every non-null address must be the named export, with the prototype
    /// `version` defines for it, and must stay callable for the life of the
    /// returned value.
    pub unsafe fn from_resolver(
        version: ApiVersion,
        mut resolve: impl FnMut(&str) -> Option<*const c_void>,
    ) -> Self {
        let mut addresses = HashMap::new();
        let procedures = ProcedureSet::probe(version, |symbol| {
            match resolve(symbol).filter(|addr| !addr.is_null()) {
                Some(addr) => {
                    addresses.insert(symbol.to_string(), addr);
                    true
                }
                None => false,
            }
        });
        let resolved = Resolved { version, addresses };
        let v4 = ApiVersion::V0404;
        let v5 = ApiVersion::V0500;

        let entry = EntryPoints {
            open: resolved.get(Procedure::Open),
            close: resolved.get(Procedure::Close),
            connect4: resolved.get_for(v4, Procedure::Connect),
            connect5: resolved.get_for(v5, Procedure::Connect),
            disconnect: resolved.get(Procedure::Disconnect),
            logical_connect: resolved.get(Procedure::LogicalConnect),
            logical_disconnect: resolved.get(Procedure::LogicalDisconnect),
            select: resolved.get(Procedure::Select),
            read_msgs4: resolved.get_for(v4, Procedure::ReadMsgs),
            read_msgs5: resolved.get_for(v5, Procedure::ReadMsgs),
            write_msgs4: resolved.get(Procedure::WriteMsgs),
            queue_msgs5: resolved.get(Procedure::QueueMsgs),
            start_periodic4: resolved.get_for(v4, Procedure::StartPeriodicMsg),
            start_periodic5: resolved.get_for(v5, Procedure::StartPeriodicMsg),
            stop_periodic: resolved.get(Procedure::StopPeriodicMsg),
            start_filter4: resolved.get_for(v4, Procedure::StartMsgFilter),
            start_filter5: resolved.get_for(v5, Procedure::StartMsgFilter),
            stop_filter: resolved.get(Procedure::StopMsgFilter),
            set_voltage4: resolved.get_for(v4, Procedure::SetProgrammingVoltage),
            set_voltage5: resolved.get_for(v5, Procedure::SetProgrammingVoltage),
            read_version: resolved.get(Procedure::ReadVersion),
            get_last_error: resolved.get(Procedure::GetLastError),
            ioctl: resolved.get(Procedure::Ioctl),
            scan_for_devices: resolved.get(Procedure::ScanForDevices),
            get_next_device: resolved.get(Procedure::GetNextDevice),
        };

        debug!(
            %version,
            resolved = procedures.len(),
            defined = crate::procedure::exports_for(version).len(),
            "PassThru exports resolved"
        );
        Self {
            name: "native".to_string(),
            version,
            procedures,
            entry,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// API revision the entry points were bound for
    pub fn version(&self) -> ApiVersion {
        self.version
    }
}

impl fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("procedures", &self.procedures)
            .finish()
    }
}

// SAFETY: every pointer argument below is derived from a live reference or
// slice that outlives the call, and `from_resolver`'s contract guarantees the
// entry point matches the prototype it is called through.
impl PassThruLibrary for NativeLibrary {
    fn name(&self) -> &str {
        &self.name
    }

    fn procedures(&self) -> ProcedureSet {
        self.procedures.clone()
    }

    fn open(&self, name: Option<&CStr>, device_id: &mut u32) -> Status {
        match self.entry.open {
            Some(f) => unsafe { f(name.map_or(ptr::null(), CStr::as_ptr), device_id) },
            None => NOT_SUPPORTED,
        }
    }

    fn close(&self, device_id: u32) -> Status {
        match self.entry.close {
            Some(f) => unsafe { f(device_id) },
            None => NOT_SUPPORTED,
        }
    }

    fn connect(
        &self,
        device_id: u32,
        protocol_id: u32,
        flags: u32,
        baudrate: u32,
        channel_id: &mut u32,
    ) -> Status {
        match self.entry.connect4 {
            Some(f) => unsafe { f(device_id, protocol_id, flags, baudrate, channel_id) },
            None => NOT_SUPPORTED,
        }
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
        match self.entry.connect5 {
            Some(f) => unsafe { f(device_id, protocol_id, flags, baudrate, *resource, channel_id) },
            None => NOT_SUPPORTED,
        }
    }

    fn disconnect(&self, channel_id: u32) -> Status {
        match self.entry.disconnect {
            Some(f) => unsafe { f(channel_id) },
            None => NOT_SUPPORTED,
        }
    }

    fn logical_connect(
        &self,
        physical_channel_id: u32,
        protocol_id: u32,
        flags: u32,
        descriptor: &Iso15765ChannelDescriptor,
        channel_id: &mut u32,
    ) -> Status {
        let descriptor = descriptor as *const Iso15765ChannelDescriptor as *const c_void;
        match self.entry.logical_connect {
            Some(f) => unsafe { f(physical_channel_id, protocol_id, flags, descriptor, channel_id) },
            None => NOT_SUPPORTED,
        }
    }

    fn logical_disconnect(&self, channel_id: u32) -> Status {
        match self.entry.logical_disconnect {
            Some(f) => unsafe { f(channel_id) },
            None => NOT_SUPPORTED,
        }
    }

    fn select(&self, channel_set: &mut SChannelSet, select_type: u32, timeout: u32) -> Status {
        match self.entry.select {
            Some(f) => unsafe { f(channel_set, select_type, timeout) },
            None => NOT_SUPPORTED,
        }
    }

    fn read_msgs4(
        &self,
        channel_id: u32,
        msgs: &mut [PassThruMsg4],
        num_msgs: &mut u32,
        timeout: u32,
    ) -> Status {
        clamp_count(num_msgs, msgs.len());
        match self.entry.read_msgs4 {
            Some(f) => unsafe { f(channel_id, msgs.as_mut_ptr(), num_msgs, timeout) },
            None => NOT_SUPPORTED,
        }
    }

    fn read_msgs5(
        &self,
        channel_id: u32,
        msgs: &mut [PassThruMsg5],
        num_msgs: &mut u32,
        timeout: u32,
    ) -> Status {
        clamp_count(num_msgs, msgs.len());
        match self.entry.read_msgs5 {
            Some(f) => unsafe { f(channel_id, msgs.as_mut_ptr(), num_msgs, timeout) },
            None => NOT_SUPPORTED,
        }
    }

    fn write_msgs4(
        &self,
        channel_id: u32,
        msgs: &[PassThruMsg4],
        num_msgs: &mut u32,
        timeout: u32,
    ) -> Status {
        clamp_count(num_msgs, msgs.len());
        match self.entry.write_msgs4 {
            Some(f) => unsafe { f(channel_id, msgs.as_ptr(), num_msgs, timeout) },
            None => NOT_SUPPORTED,
        }
    }

    fn queue_msgs5(&self, channel_id: u32, msgs: &[PassThruMsg5], num_msgs: &mut u32) -> Status {
        clamp_count(num_msgs, msgs.len());
        match self.entry.queue_msgs5 {
            Some(f) => unsafe { f(channel_id, msgs.as_ptr(), num_msgs) },
            None => NOT_SUPPORTED,
        }
    }

    fn start_periodic_msg4(
        &self,
        channel_id: u32,
        msg: &PassThruMsg4,
        msg_id: &mut u32,
        interval_ms: u32,
    ) -> Status {
        match self.entry.start_periodic4 {
            Some(f) => unsafe { f(channel_id, msg, msg_id, interval_ms) },
            None => NOT_SUPPORTED,
        }
    }

    fn start_periodic_msg5(
        &self,
        channel_id: u32,
        msg: &PassThruMsg5,
        msg_id: &mut u32,
        interval_ms: u32,
    ) -> Status {
        match self.entry.start_periodic5 {
            Some(f) => unsafe { f(channel_id, msg, msg_id, interval_ms) },
            None => NOT_SUPPORTED,
        }
    }

    fn stop_periodic_msg(&self, channel_id: u32, msg_id: u32) -> Status {
        match self.entry.stop_periodic {
            Some(f) => unsafe { f(channel_id, msg_id) },
            None => NOT_SUPPORTED,
        }
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
        let flow_control = flow_control.map_or(ptr::null(), |m| m as *const PassThruMsg4);
        match self.entry.start_filter4 {
            Some(f) => unsafe { f(channel_id, filter_type, mask, pattern, flow_control, filter_id) },
            None => NOT_SUPPORTED,
        }
    }

    fn start_msg_filter5(
        &self,
        channel_id: u32,
        filter_type: u32,
        mask: &PassThruMsg5,
        pattern: &PassThruMsg5,
        filter_id: &mut u32,
    ) -> Status {
        match self.entry.start_filter5 {
            Some(f) => unsafe { f(channel_id, filter_type, mask, pattern, filter_id) },
            None => NOT_SUPPORTED,
        }
    }

    fn stop_msg_filter(&self, channel_id: u32, filter_id: u32) -> Status {
        match self.entry.stop_filter {
            Some(f) => unsafe { f(channel_id, filter_id) },
            None => NOT_SUPPORTED,
        }
    }

    fn set_programming_voltage4(&self, device_id: u32, pin: u32, voltage: u32) -> Status {
        match self.entry.set_voltage4 {
            Some(f) => unsafe { f(device_id, pin, voltage) },
            None => NOT_SUPPORTED,
        }
    }

    fn set_programming_voltage5(
        &self,
        device_id: u32,
        resource: &ResourceStruct,
        voltage: u32,
    ) -> Status {
        match self.entry.set_voltage5 {
            Some(f) => unsafe { f(device_id, *resource, voltage) },
            None => NOT_SUPPORTED,
        }
    }

    fn read_version(
        &self,
        device_id: u32,
        firmware: &mut StringBuffer,
        dll: &mut StringBuffer,
        api: &mut StringBuffer,
    ) -> Status {
        match self.entry.read_version {
            Some(f) => unsafe {
                f(
                    device_id,
                    firmware.as_mut_ptr().cast(),
                    dll.as_mut_ptr().cast(),
                    api.as_mut_ptr().cast(),
                )
            },
            None => NOT_SUPPORTED,
        }
    }

    fn get_last_error(&self, description: &mut StringBuffer) -> Status {
        match self.entry.get_last_error {
            Some(f) => unsafe { f(description.as_mut_ptr().cast()) },
            None => NOT_SUPPORTED,
        }
    }

    fn ioctl(
        &self,
        handle: u32,
        ioctl_id: u32,
        mut input: IoctlArg<'_>,
        mut output: IoctlArg<'_>,
    ) -> Status {
        match self.entry.ioctl {
            Some(f) => unsafe { f(handle, ioctl_id, input.as_mut_ptr(), output.as_mut_ptr()) },
            None => NOT_SUPPORTED,
        }
    }

    fn scan_for_devices(&self, device_count: &mut u32) -> Status {
        match self.entry.scan_for_devices {
            Some(f) => unsafe { f(device_count) },
            None => NOT_SUPPORTED,
        }
    }

    fn get_next_device(&self, device: &mut SDevice) -> Status {
        match self.entry.get_next_device {
            Some(f) => unsafe { f(device) },
            None => NOT_SUPPORTED,
        }
    }
}
