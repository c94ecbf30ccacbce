//! rusb-backed transports
//!
//! One generic implementation parameterised by platform family. The families
//! differ in two places: whether kernel drivers have to be detached before an
//! interface can be claimed, and whether the device needs a port reset on
//! release to accept later connections (Windows drivers ignore new
//! connections otherwise).

use common::{
    ConfigurationLayout, DeviceIds, InterfaceLayout, TransferHandle, Transport, TransportError,
    TransportResult,
};
use rusb::{Context, Device, DeviceHandle, UsbContext};
use std::marker::PhantomData;
use std::time::Duration;
use tracing::{debug, warn};

/// Platform-specific behaviour of a transport
pub trait PlatformFamily {
    const NAME: &'static str;
    const DETACHES_KERNEL_DRIVERS: bool;
    const RESETS_ON_RELEASE: bool;
}

/// Linux and other systems where kernel drivers own interfaces
#[derive(Debug, Clone, Copy)]
pub struct KernelDrivers;

impl PlatformFamily for KernelDrivers {
    const NAME: &'static str = "kernel-drivers";
    const DETACHES_KERNEL_DRIVERS: bool = true;
    const RESETS_ON_RELEASE: bool = false;
}

/// Windows, where there is nothing to detach but the device must be reset
#[derive(Debug, Clone, Copy)]
pub struct ResetOnRelease;

impl PlatformFamily for ResetOnRelease {
    const NAME: &'static str = "reset-on-release";
    const DETACHES_KERNEL_DRIVERS: bool = false;
    const RESETS_ON_RELEASE: bool = true;
}

/// Transport for the platform this binary was built for
#[cfg(windows)]
pub type NativeTransport = RusbTransport<ResetOnRelease>;

/// Transport for the platform this binary was built for
#[cfg(not(windows))]
pub type NativeTransport = RusbTransport<KernelDrivers>;

/// libusb transport via rusb
pub struct RusbTransport<P: PlatformFamily> {
    context: Context,
    _platform: PhantomData<P>,
}

impl<P: PlatformFamily> RusbTransport<P> {
    pub fn new() -> TransportResult<Self> {
        let context = Context::new().map_err(map_rusb_error)?;
        debug!("USB context created ({})", P::NAME);

        Ok(Self {
            context,
            _platform: PhantomData,
        })
    }
}

/// Open rusb device handle
pub struct RusbHandle(DeviceHandle<Context>);

impl TransferHandle for RusbHandle {
    fn set_configuration(&mut self, value: u8) -> TransportResult<()> {
        self.0.set_active_configuration(value).map_err(map_rusb_error)
    }

    fn claim_interface(&mut self, interface: u8) -> TransportResult<()> {
        self.0.claim_interface(interface).map_err(map_rusb_error)
    }

    fn release_interface(&mut self, interface: u8) -> TransportResult<()> {
        self.0.release_interface(interface).map_err(map_rusb_error)
    }

    fn set_alternate_setting(&mut self, interface: u8, setting: u8) -> TransportResult<()> {
        self.0
            .set_alternate_setting(interface, setting)
            .map_err(map_rusb_error)
    }

    fn write_bulk(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> TransportResult<usize> {
        self.0
            .write_bulk(endpoint, data, timeout)
            .map_err(map_rusb_error)
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> TransportResult<usize> {
        self.0
            .read_bulk(endpoint, buf, timeout)
            .map_err(map_rusb_error)
    }

    fn reset(&mut self) -> TransportResult<()> {
        self.0.reset().map_err(map_rusb_error)
    }
}

impl<P: PlatformFamily> Transport for RusbTransport<P> {
    type Device = Device<Context>;
    type Handle = RusbHandle;

    fn devices(&self) -> TransportResult<Vec<Device<Context>>> {
        let mut devices: Vec<_> = self
            .context
            .devices()
            .map_err(map_rusb_error)?
            .iter()
            .collect();
        // stable: libusb's order is kept within a bus
        devices.sort_by_key(|d| d.bus_number());
        debug!("Enumerated {} devices", devices.len());
        Ok(devices)
    }

    fn device_ids(&self, device: &Device<Context>) -> TransportResult<DeviceIds> {
        let descriptor = device.device_descriptor().map_err(map_rusb_error)?;
        Ok(DeviceIds::new(descriptor.vendor_id(), descriptor.product_id()))
    }

    fn location(&self, device: &Device<Context>) -> String {
        format!("{:03}/{:03}", device.bus_number(), device.address())
    }

    fn configurations(
        &self,
        device: &Device<Context>,
    ) -> TransportResult<Vec<ConfigurationLayout>> {
        let descriptor = device.device_descriptor().map_err(map_rusb_error)?;

        (0..descriptor.num_configurations())
            .map(|index| {
                let config = device.config_descriptor(index).map_err(map_rusb_error)?;
                Ok(ConfigurationLayout {
                    value: config.number(),
                    interfaces: config
                        .interfaces()
                        .map(|interface| InterfaceLayout {
                            number: interface.number(),
                            alternate_settings: interface
                                .descriptors()
                                .map(|d| d.setting_number())
                                .collect(),
                        })
                        .collect(),
                })
            })
            .collect()
    }

    fn open(&self, device: &Device<Context>) -> TransportResult<RusbHandle> {
        device.open().map(RusbHandle).map_err(map_rusb_error)
    }

    fn kernel_driver_support(&self) -> bool {
        P::DETACHES_KERNEL_DRIVERS && rusb::supports_detach_kernel_driver()
    }

    fn detach_kernel_driver(&self, handle: &mut RusbHandle, interface: u8) -> TransportResult<()> {
        handle
            .0
            .detach_kernel_driver(interface)
            .map_err(map_rusb_error)
    }

    fn release(&self, mut handle: RusbHandle, interface: u8) -> TransportResult<()> {
        if P::RESETS_ON_RELEASE {
            if let Err(e) = handle.reset() {
                warn!("Failed to reset device before release: {}", e);
            }
        }

        let result = handle.release_interface(interface);
        // the handle closes when dropped
        drop(handle);
        result
    }
}

/// Map rusb::Error to TransportError
pub fn map_rusb_error(err: rusb::Error) -> TransportError {
    match err {
        rusb::Error::Timeout => TransportError::Timeout,
        rusb::Error::Pipe => TransportError::Pipe,
        rusb::Error::NoDevice => TransportError::NoDevice,
        rusb::Error::NotFound => TransportError::NotFound,
        rusb::Error::Busy => TransportError::Busy,
        rusb::Error::Overflow => TransportError::Overflow,
        rusb::Error::Io => TransportError::Io,
        rusb::Error::InvalidParam => TransportError::InvalidParam,
        rusb::Error::Access => TransportError::Access,
        rusb::Error::NotSupported => TransportError::NotSupported,
        _ => TransportError::Other(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_rusb_error() {
        assert_eq!(map_rusb_error(rusb::Error::Timeout), TransportError::Timeout);
        assert_eq!(map_rusb_error(rusb::Error::Pipe), TransportError::Pipe);
        assert_eq!(map_rusb_error(rusb::Error::NoDevice), TransportError::NoDevice);
        assert_eq!(map_rusb_error(rusb::Error::NotFound), TransportError::NotFound);
        assert!(matches!(
            map_rusb_error(rusb::Error::NoMem),
            TransportError::Other(_)
        ));
    }
}
