//! passthru-core - Types shared by every SAE J2534 PassThru layer
//!
//! This crate holds the parts of the PassThru contract that never touch the
//! native library: the protocol catalog and its parameter tables, the
//! logical message model and its raw `#[repr(C)]` encodings, the filter
//! builder and the status code taxonomy.

pub mod connection;
pub mod consts;
pub mod error;
pub mod filter;
pub mod message;
pub mod protocol;
pub mod raw;
pub mod status;
pub mod version;

pub use connection::ConnectionConfig;
pub use consts::{SelectType, Voltage};
pub use error::{FilterError, ValidationError};
pub use filter::{FilterKind, FilterRecords, FilterSpec, DEFAULT_FILTER_SIZE};
pub use message::{Message, MessageHeader, RxStatus, TxFlags};
pub use protocol::{
    BusParams, CanAddressing, CanParams, ConnectFlags, Connector, J2610Params, KLineParams,
    Protocol, ProtocolId, ProtocolKind,
};
pub use status::{ErrorCategory, ErrorCode, UnknownStatus};
pub use version::ApiVersion;
