//! Common utilities for usb-seq
//!
//! This crate provides the pieces shared between the sequencer and its tests:
//! error handling, logging setup, the USB transport abstraction, and a scripted
//! in-memory transport for exercising the sequencer without hardware.

pub mod error;
pub mod logging;
pub mod test_utils;
pub mod usb_types;

pub use error::{Error, Result};
pub use logging::{Verbosity, setup_logging};
pub use usb_types::{
    ConfigurationLayout, DeviceIds, InterfaceLayout, TransferHandle, Transport, TransportError,
    TransportResult,
};
