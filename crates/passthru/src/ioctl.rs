//! Typed `PassThruIoctl` requests

use passthru_core::consts::ioctl_id;
use passthru_core::raw::{SConfig, SConfigList};
use tracing::debug;

use crate::error::{check, PassThruResult};
use crate::library::{IoctlArg, PassThruLibrary};
use crate::session::{ChannelHandle, DeviceHandle};

/// Handle an ioctl is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlTarget {
    Device(DeviceHandle),
    Channel(ChannelHandle),
}

impl IoctlTarget {
    pub fn raw(self) -> u32 {
        match self {
            Self::Device(d) => d.raw(),
            Self::Channel(c) => c.raw(),
        }
    }
}

impl From<DeviceHandle> for IoctlTarget {
    fn from(device: DeviceHandle) -> Self {
        Self::Device(device)
    }
}

impl From<ChannelHandle> for IoctlTarget {
    fn from(channel: ChannelHandle) -> Self {
        Self::Channel(channel)
    }
}

/// Supported ioctl requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoctlRequest {
    /// Read the listed config parameters of a channel
    GetConfig(Vec<u32>),
    /// Write parameter/value pairs on a channel
    SetConfig(Vec<SConfig>),
    /// Battery voltage on pin 16, in millivolts
    ReadPinVoltage,
    /// Programming voltage currently applied, in millivolts
    ReadProgVoltage,
    ClearTxQueue,
    ClearRxQueue,
    ClearPeriodicMsgs,
    ClearMsgFilters,
    ClearFunctMsgLookupTable,
    BusOn,
}

/// Result of an ioctl
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoctlResponse {
    Done,
    Config(Vec<SConfig>),
    Millivolts(u32),
}

impl IoctlRequest {
    pub fn id(&self) -> u32 {
        match self {
            Self::GetConfig(_) => ioctl_id::GET_CONFIG,
            Self::SetConfig(_) => ioctl_id::SET_CONFIG,
            Self::ReadPinVoltage => ioctl_id::READ_PIN_VOLTAGE,
            Self::ReadProgVoltage => ioctl_id::READ_PROG_VOLTAGE,
            Self::ClearTxQueue => ioctl_id::CLEAR_TX_QUEUE,
            Self::ClearRxQueue => ioctl_id::CLEAR_RX_QUEUE,
            Self::ClearPeriodicMsgs => ioctl_id::CLEAR_PERIODIC_MSGS,
            Self::ClearMsgFilters => ioctl_id::CLEAR_MSG_FILTERS,
            Self::ClearFunctMsgLookupTable => ioctl_id::CLEAR_FUNCT_MSG_LOOKUP_TABLE,
            Self::BusOn => ioctl_id::BUS_ON,
        }
    }

    /// Build the native arguments, call the library and decode the output
    pub(crate) fn execute(
        self,
        lib: &dyn PassThruLibrary,
        target: IoctlTarget,
    ) -> PassThruResult<IoctlResponse> {
        let id = self.id();
        let handle = target.raw();
        match self {
            Self::GetConfig(parameters) => {
                let mut params: Vec<SConfig> =
                    parameters.into_iter().map(|p| SConfig::new(p, 0)).collect();
                let mut list = SConfigList::new(&mut params);
                let rc = lib.ioctl(handle, id, IoctlArg::ConfigList(&mut list), IoctlArg::Null);
                debug!(handle, ioctl = id, count = params.len(), rc, "PassThruIoctl GET_CONFIG");
                check("ioctl", rc)?;
                Ok(IoctlResponse::Config(params))
            }
            Self::SetConfig(mut params) => {
                let mut list = SConfigList::new(&mut params);
                let rc = lib.ioctl(handle, id, IoctlArg::ConfigList(&mut list), IoctlArg::Null);
                debug!(handle, ioctl = id, ?params, rc, "PassThruIoctl SET_CONFIG");
                check("ioctl", rc)?;
                Ok(IoctlResponse::Done)
            }
            Self::ReadPinVoltage | Self::ReadProgVoltage => {
                let mut millivolts = 0;
                let rc = lib.ioctl(handle, id, IoctlArg::Null, IoctlArg::Value(&mut millivolts));
                debug!(handle, ioctl = id, millivolts, rc, "PassThruIoctl");
                check("ioctl", rc)?;
                Ok(IoctlResponse::Millivolts(millivolts))
            }
            _ => {
                let rc = lib.ioctl(handle, id, IoctlArg::Null, IoctlArg::Null);
                debug!(handle, ioctl = id, rc, "PassThruIoctl");
                check("ioctl", rc)?;
                Ok(IoctlResponse::Done)
            }
        }
    }
}
