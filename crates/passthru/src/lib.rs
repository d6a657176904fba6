//! passthru - SAE J2534 PassThru device session
//!
//! This crate drives a vendor PassThru library through a stateful session
//! that knows which API revision the library speaks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      DeviceSession                          │
//! │  open / connect / filter / read / write, call-order guards  │
//! │                                                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │ProcedureSet │  │SessionConfig│  │ IoctlRequest        │  │
//! │  │ (exports)   │  │ (toml)      │  │ (typed ioctls)      │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! │                          │                                  │
//! │                    ┌─────┴──────┐                           │
//! │                    │WireEncoding│                           │
//! │                    │(04.04/05.00)                           │
//! │                    └─────┬──────┘                           │
//! │                          │                                  │
//! │                 ┌────────┴────────┐                         │
//! │                 │PassThruLibrary  │                         │
//! │                 │(native / mock)  │                         │
//! │                 └─────────────────┘                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod encoding;
pub mod error;
pub mod ioctl;
pub mod library;
pub mod procedure;
pub mod session;

pub use config::{ProtocolConfig, SessionConfig};
pub use encoding::{EncodingV4, EncodingV5, WireEncoding};
pub use error::{ConfigError, PassThruError, PassThruResult};
pub use ioctl::{IoctlRequest, IoctlResponse, IoctlTarget};
pub use library::{IoctlArg, NativeLibrary, PassThruLibrary};
pub use procedure::{Procedure, ProcedureSet, VersionReq};
pub use session::{
    ChannelHandle, DeviceHandle, DeviceInfo, DeviceSession, FilterHandle, PeriodicHandle,
    VersionInfo,
};

// Re-export for convenience
pub use passthru_core::{
    ApiVersion, CanAddressing, ConnectFlags, ConnectionConfig, ErrorCode, FilterKind, FilterSpec,
    Message, Protocol, ProtocolId, RxStatus, TxFlags, ValidationError, Voltage,
};
