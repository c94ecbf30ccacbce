//! USB subsystem
//!
//! Locates the target device and brings it into a state where bulk
//! transfers can be issued:
//! - Device discovery by vendor/product
//! - Kernel driver detachment, configuration, interface claim and alternate
//!   setting selection
//! - rusb-backed transports for each platform family

pub mod initializer;
pub mod locator;
pub mod transport;

pub use initializer::{ConfigurationSelection, DeviceSession, InitStatus, OpenFailed};
pub use locator::{LocateError, Located};
pub use transport::{NativeTransport, RusbTransport};
