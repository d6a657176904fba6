//! Native library gateway trait

use std::ffi::{c_void, CStr};
use std::ptr;

use passthru_core::raw::{
    Iso15765ChannelDescriptor, PassThruMsg4, PassThruMsg5, ResourceStruct, SChannelSet, SConfigList,
    SDevice, STRING_BUFFER_LEN,
};
use passthru_core::ErrorCode;

use crate::procedure::ProcedureSet;

/// Raw status returned by every native call
pub type Status = u32;

pub(super) const NOT_SUPPORTED: Status = ErrorCode::NotSupported as u32;

/// Fixed-size string buffer filled by the library
pub type StringBuffer = [u8; STRING_BUFFER_LEN];

/// `pInput` / `pOutput` of `PassThruIoctl`
#[derive(Debug)]
pub enum IoctlArg<'a> {
    Null,
    ConfigList(&'a mut SConfigList),
    Value(&'a mut u32),
}

impl IoctlArg<'_> {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The `void *` passed to the native call
    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        match self {
            Self::Null => ptr::null_mut(),
            Self::ConfigList(list) => &mut **list as *mut SConfigList as *mut c_void,
            Self::Value(value) => &mut **value as *mut u32 as *mut c_void,
        }
    }
}

/// A loaded PassThru library
///
/// One method per `PassThru*` export, mirroring the C signatures: output
/// parameters are `&mut`, and the return value is the raw status. Methods
/// that exist in only one API revision return `ERR_NOT_SUPPORTED` unless the
/// implementation provides them. Loading, symbol resolution and unloading
/// belong to the implementation.
pub trait PassThruLibrary: Send + Sync {
    /// Library name used in error messages
    fn name(&self) -> &str;

    /// Procedures the library exports
    fn procedures(&self) -> ProcedureSet;

    fn open(&self, name: Option<&CStr>, device_id: &mut u32) -> Status;

    fn close(&self, device_id: u32) -> Status;

    /// 04.04 `PassThruConnect`
    fn connect(
        &self,
        _device_id: u32,
        _protocol_id: u32,
        _flags: u32,
        _baudrate: u32,
        _channel_id: &mut u32,
    ) -> Status {
        NOT_SUPPORTED
    }

    /// 05.00 `PassThruConnect`
    fn connect_with_resource(
        &self,
        _device_id: u32,
        _protocol_id: u32,
        _flags: u32,
        _baudrate: u32,
        _resource: &ResourceStruct,
        _channel_id: &mut u32,
    ) -> Status {
        NOT_SUPPORTED
    }

    fn disconnect(&self, channel_id: u32) -> Status;

    fn logical_connect(
        &self,
        _physical_channel_id: u32,
        _protocol_id: u32,
        _flags: u32,
        _descriptor: &Iso15765ChannelDescriptor,
        _channel_id: &mut u32,
    ) -> Status {
        NOT_SUPPORTED
    }

    fn logical_disconnect(&self, _channel_id: u32) -> Status {
        NOT_SUPPORTED
    }

    fn select(&self, _channel_set: &mut SChannelSet, _select_type: u32, _timeout: u32) -> Status {
        NOT_SUPPORTED
    }

    fn read_msgs4(
        &self,
        _channel_id: u32,
        _msgs: &mut [PassThruMsg4],
        _num_msgs: &mut u32,
        _timeout: u32,
    ) -> Status {
        NOT_SUPPORTED
    }

    fn read_msgs5(
        &self,
        _channel_id: u32,
        _msgs: &mut [PassThruMsg5],
        _num_msgs: &mut u32,
        _timeout: u32,
    ) -> Status {
        NOT_SUPPORTED
    }

    fn write_msgs4(
        &self,
        _channel_id: u32,
        _msgs: &[PassThruMsg4],
        _num_msgs: &mut u32,
        _timeout: u32,
    ) -> Status {
        NOT_SUPPORTED
    }

    fn queue_msgs5(&self, _channel_id: u32, _msgs: &[PassThruMsg5], _num_msgs: &mut u32) -> Status {
        NOT_SUPPORTED
    }

    fn start_periodic_msg4(
        &self,
        _channel_id: u32,
        _msg: &PassThruMsg4,
        _msg_id: &mut u32,
        _interval_ms: u32,
    ) -> Status {
        NOT_SUPPORTED
    }

    fn start_periodic_msg5(
        &self,
        _channel_id: u32,
        _msg: &PassThruMsg5,
        _msg_id: &mut u32,
        _interval_ms: u32,
    ) -> Status {
        NOT_SUPPORTED
    }

    fn stop_periodic_msg(&self, channel_id: u32, msg_id: u32) -> Status;

    fn start_msg_filter4(
        &self,
        _channel_id: u32,
        _filter_type: u32,
        _mask: &PassThruMsg4,
        _pattern: &PassThruMsg4,
        _flow_control: Option<&PassThruMsg4>,
        _filter_id: &mut u32,
    ) -> Status {
        NOT_SUPPORTED
    }

    fn start_msg_filter5(
        &self,
        _channel_id: u32,
        _filter_type: u32,
        _mask: &PassThruMsg5,
        _pattern: &PassThruMsg5,
        _filter_id: &mut u32,
    ) -> Status {
        NOT_SUPPORTED
    }

    fn stop_msg_filter(&self, channel_id: u32, filter_id: u32) -> Status;

    fn set_programming_voltage4(&self, _device_id: u32, _pin: u32, _voltage: u32) -> Status {
        NOT_SUPPORTED
    }

    fn set_programming_voltage5(
        &self,
        _device_id: u32,
        _resource: &ResourceStruct,
        _voltage: u32,
    ) -> Status {
        NOT_SUPPORTED
    }

    fn read_version(
        &self,
        device_id: u32,
        firmware: &mut StringBuffer,
        dll: &mut StringBuffer,
        api: &mut StringBuffer,
    ) -> Status;

    fn get_last_error(&self, description: &mut StringBuffer) -> Status;

    fn ioctl(&self, handle: u32, ioctl_id: u32, input: IoctlArg<'_>, output: IoctlArg<'_>)
        -> Status;

    fn scan_for_devices(&self, _device_count: &mut u32) -> Status {
        NOT_SUPPORTED
    }

    fn get_next_device(&self, _device: &mut SDevice) -> Status {
        NOT_SUPPORTED
    }
}
