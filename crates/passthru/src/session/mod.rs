//! Device session
//!
//! This module holds the stateful façade over a loaded library: device and
//! channel lifecycle, call-ordering guards and version dispatch.

mod device;

use std::fmt;

use passthru_core::raw::SDevice;

pub use device::DeviceSession;

/// Device id returned by `PassThruOpen`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(u32);

/// Channel id returned by `PassThruConnect` / `PassThruLogicalConnect`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(u32);

/// Filter id returned by `PassThruStartMsgFilter`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterHandle(u32);

/// Message id returned by `PassThruStartPeriodicMsg`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeriodicHandle(u32);

impl DeviceHandle {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl ChannelHandle {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl FilterHandle {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl PeriodicHandle {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Firmware, library and API version strings of a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub firmware: String,
    pub dll: String,
    pub api: String,
}

/// A device found by `PassThruScanForDevices`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub available: bool,
    pub dll_fw_status: u32,
    pub connected_media: u32,
    pub connect_speed: u32,
    pub signal_quality: u32,
    pub signal_strength: u32,
}

impl From<&SDevice> for DeviceInfo {
    fn from(device: &SDevice) -> Self {
        Self {
            name: device.name(),
            available: device.device_available != 0,
            dll_fw_status: device.device_dll_fw_status,
            connected_media: device.device_connected_media,
            connect_speed: device.device_connect_speed,
            signal_quality: device.device_signal_quality,
            signal_strength: device.device_signal_strength,
        }
    }
}
