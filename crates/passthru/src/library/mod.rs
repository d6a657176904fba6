//! Native library gateway
//!
//! The session talks to the vendor library only through [`PassThruLibrary`].
//! [`native::NativeLibrary`] calls the `PassThru*` exports of a loaded
//! library through resolved addresses; [`mock::MockLibrary`] stands in for
//! hardware in tests.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use passthru::library::mock::MockLibrary;
//! use passthru::{ApiVersion, DeviceSession};
//!
//! let library = Arc::new(MockLibrary::new(ApiVersion::V0404));
//! let session = DeviceSession::new(library, ApiVersion::V0404);
//! let device = session.open("J2534-1:MockDevice")?;
//! ```

mod gateway;
pub mod mock;
pub mod native;

pub use gateway::{IoctlArg, PassThruLibrary, Status, StringBuffer};
pub use native::NativeLibrary;
