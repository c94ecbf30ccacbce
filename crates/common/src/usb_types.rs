//! USB transport abstractions
//!
//! The sequencer never talks to libusb directly. Everything it needs from the
//! host USB stack (enumeration, descriptors, open/close, interface management
//! and bulk transfers) goes through the [`Transport`] and [`TransferHandle`]
//! traits, so that platform differences live in the implementations and the
//! acquisition logic stays the same everywhere.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a transport implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("operation timed out")]
    Timeout,

    #[error("endpoint stalled")]
    Pipe,

    #[error("no such device (it may have been disconnected)")]
    NoDevice,

    #[error("entity not found")]
    NotFound,

    #[error("resource busy")]
    Busy,

    #[error("overflow")]
    Overflow,

    #[error("input/output error")]
    Io,

    #[error("invalid parameter")]
    InvalidParam,

    #[error("access denied (insufficient permissions)")]
    Access,

    #[error("operation not supported on this platform")]
    NotSupported,

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Vendor/product identifier pair of a USB device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIds {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceIds {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

impl fmt::Display for DeviceIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// One interface as declared in a configuration descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceLayout {
    /// bInterfaceNumber
    pub number: u8,
    /// bAlternateSetting of each declared alternate setting, in descriptor order
    pub alternate_settings: Vec<u8>,
}

/// One configuration as declared by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationLayout {
    /// bConfigurationValue
    pub value: u8,
    /// Interfaces in descriptor order
    pub interfaces: Vec<InterfaceLayout>,
}

impl ConfigurationLayout {
    /// Find an interface by its number
    pub fn interface(&self, number: u8) -> Option<&InterfaceLayout> {
        self.interfaces.iter().find(|i| i.number == number)
    }
}

/// Operations on an opened device
///
/// Endpoint arguments are full endpoint addresses, direction bit included.
pub trait TransferHandle {
    fn set_configuration(&mut self, value: u8) -> TransportResult<()>;

    fn claim_interface(&mut self, interface: u8) -> TransportResult<()>;

    fn release_interface(&mut self, interface: u8) -> TransportResult<()>;

    fn set_alternate_setting(&mut self, interface: u8, setting: u8) -> TransportResult<()>;

    /// Bulk OUT transfer, returning the number of bytes written
    fn write_bulk(&mut self, endpoint: u8, data: &[u8], timeout: Duration)
    -> TransportResult<usize>;

    /// Bulk IN transfer into `buf`, returning the number of bytes read
    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> TransportResult<usize>;

    /// Full port reset
    fn reset(&mut self) -> TransportResult<()>;
}

/// Host USB stack capability
///
/// Implementations exist per platform family; callers never branch on the
/// platform themselves.
pub trait Transport {
    /// Opaque reference to an enumerated physical device
    type Device;
    /// Open handle to a device
    type Handle: TransferHandle;

    /// All attached devices, in bus order then device order
    fn devices(&self) -> TransportResult<Vec<Self::Device>>;

    fn device_ids(&self, device: &Self::Device) -> TransportResult<DeviceIds>;

    /// Human readable position of the device on the bus, for diagnostics
    fn location(&self, device: &Self::Device) -> String;

    /// Every configuration the device declares, in descriptor order
    fn configurations(&self, device: &Self::Device) -> TransportResult<Vec<ConfigurationLayout>>;

    fn open(&self, device: &Self::Device) -> TransportResult<Self::Handle>;

    /// Whether the OS binds kernel drivers to interfaces that must be
    /// detached before claiming
    fn kernel_driver_support(&self) -> bool;

    fn detach_kernel_driver(&self, handle: &mut Self::Handle, interface: u8)
    -> TransportResult<()>;

    /// Release `interface` and close the handle, performing whatever extra
    /// teardown the platform needs for the device to accept later
    /// connections.
    fn release(&self, handle: Self::Handle, interface: u8) -> TransportResult<()>;
}
