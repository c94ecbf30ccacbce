//! Test utilities for usb-seq
//!
//! Provides a scripted in-memory [`Transport`] that records every call made
//! against it, so acquisition and transfer logic can be tested without
//! hardware.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{MockCall, MockDevice, MockTransport};
//! use common::{DeviceIds, TransferHandle, Transport};
//!
//! let mock = MockTransport::new().with_device(MockDevice::new(1, 4, 0x1234, 0x0001));
//! let devices = mock.devices().unwrap();
//! assert_eq!(mock.device_ids(&devices[0]).unwrap(), DeviceIds::new(0x1234, 0x0001));
//! assert_eq!(mock.calls(), vec![MockCall::Enumerate]);
//! ```

use crate::usb_types::{
    ConfigurationLayout, DeviceIds, InterfaceLayout, TransferHandle, Transport, TransportError,
    TransportResult,
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

/// A call observed by the mock, in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Enumerate,
    Open { device: usize },
    DetachKernelDriver { interface: u8 },
    SetConfiguration(u8),
    ClaimInterface(u8),
    SetAlternateSetting { interface: u8, setting: u8 },
    WriteBulk { endpoint: u8, data: Vec<u8>, timeout: Duration },
    ReadBulk { endpoint: u8, timeout: Duration },
    Reset,
    ReleaseInterface(u8),
    Close,
}

impl MockCall {
    pub fn is_transfer(&self) -> bool {
        matches!(self, MockCall::WriteBulk { .. } | MockCall::ReadBulk { .. })
    }
}

/// Which platform family the mock imitates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockPlatform {
    /// Kernel drivers may own interfaces; no reset on release
    KernelDrivers,
    /// No kernel driver concept; device must be reset before release
    ResetOnRelease,
}

/// A device the mock will enumerate
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub bus: u8,
    pub address: u8,
    pub ids: TransportResult<DeviceIds>,
    pub configurations: TransportResult<Vec<ConfigurationLayout>>,
    pub open_error: Option<TransportError>,
}

impl MockDevice {
    /// A device with one configuration (value 1) holding interface 0 with
    /// alternate setting 0
    pub fn new(bus: u8, address: u8, vendor_id: u16, product_id: u16) -> Self {
        Self {
            bus,
            address,
            ids: Ok(DeviceIds::new(vendor_id, product_id)),
            configurations: Ok(vec![create_mock_configuration(1, &[(0, &[0])])]),
            open_error: None,
        }
    }

    pub fn with_configurations(mut self, configurations: Vec<ConfigurationLayout>) -> Self {
        self.configurations = Ok(configurations);
        self
    }

    pub fn with_configuration_error(mut self, error: TransportError) -> Self {
        self.configurations = Err(error);
        self
    }

    pub fn with_open_error(mut self, error: TransportError) -> Self {
        self.open_error = Some(error);
        self
    }

    pub fn with_unreadable_descriptor(mut self) -> Self {
        self.ids = Err(TransportError::Io);
        self
    }
}

/// Build a configuration layout from `(interface number, alt settings)` pairs
pub fn create_mock_configuration(value: u8, interfaces: &[(u8, &[u8])]) -> ConfigurationLayout {
    ConfigurationLayout {
        value,
        interfaces: interfaces
            .iter()
            .map(|(number, alts)| InterfaceLayout {
                number: *number,
                alternate_settings: alts.to_vec(),
            })
            .collect(),
    }
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<MockCall>,
    reads: VecDeque<TransportResult<Vec<u8>>>,
    write_error: Option<TransportError>,
    detach_error: Option<TransportError>,
    set_configuration_error: Option<TransportError>,
    claim_error: Option<TransportError>,
    alternate_setting_error: Option<TransportError>,
}

impl MockState {
    fn record(&mut self, call: MockCall) {
        self.calls.push(call);
    }
}

fn outcome(error: &Option<TransportError>) -> TransportResult<()> {
    match error {
        Some(e) => Err(e.clone()),
        None => Ok(()),
    }
}

/// Scripted transport
///
/// Bulk reads are served from a queue; once it runs dry every read times out.
/// Writes succeed with the full length unless a write error is configured.
#[derive(Debug, Clone)]
pub struct MockTransport {
    devices: Vec<MockDevice>,
    platform: MockPlatform,
    state: Rc<RefCell<MockState>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            platform: MockPlatform::KernelDrivers,
            state: Rc::new(RefCell::new(MockState::default())),
        }
    }

    pub fn with_platform(mut self, platform: MockPlatform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_device(mut self, device: MockDevice) -> Self {
        self.devices.push(device);
        self
    }

    /// Queue one successful single-byte read per byte
    pub fn with_read_bytes(self, bytes: &[u8]) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.reads.extend(bytes.iter().map(|b| Ok(vec![*b])));
        }
        self
    }

    /// Queue an arbitrary read result
    pub fn with_read_result(self, result: TransportResult<Vec<u8>>) -> Self {
        self.state.borrow_mut().reads.push_back(result);
        self
    }

    pub fn with_write_error(self, error: TransportError) -> Self {
        self.state.borrow_mut().write_error = Some(error);
        self
    }

    pub fn with_detach_error(self, error: TransportError) -> Self {
        self.state.borrow_mut().detach_error = Some(error);
        self
    }

    pub fn with_set_configuration_error(self, error: TransportError) -> Self {
        self.state.borrow_mut().set_configuration_error = Some(error);
        self
    }

    pub fn with_claim_error(self, error: TransportError) -> Self {
        self.state.borrow_mut().claim_error = Some(error);
        self
    }

    pub fn with_alternate_setting_error(self, error: TransportError) -> Self {
        self.state.borrow_mut().alternate_setting_error = Some(error);
        self
    }

    /// Every call recorded so far
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.borrow().calls.clone()
    }

    /// Number of bulk transfers attempted
    pub fn transfer_count(&self) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| c.is_transfer())
            .count()
    }

    /// Payloads of every bulk write, concatenated in order
    pub fn written_bytes(&self) -> Vec<u8> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|c| match c {
                MockCall::WriteBulk { data, .. } => Some(data.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Number of times a handle was closed
    pub fn close_count(&self) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| **c == MockCall::Close)
            .count()
    }
}

/// Handle returned by [`MockTransport::open`]
#[derive(Debug)]
pub struct MockHandle {
    device: usize,
    state: Rc<RefCell<MockState>>,
}

impl MockHandle {
    pub fn device(&self) -> usize {
        self.device
    }
}

impl TransferHandle for MockHandle {
    fn set_configuration(&mut self, value: u8) -> TransportResult<()> {
        let mut state = self.state.borrow_mut();
        state.record(MockCall::SetConfiguration(value));
        outcome(&state.set_configuration_error)
    }

    fn claim_interface(&mut self, interface: u8) -> TransportResult<()> {
        let mut state = self.state.borrow_mut();
        state.record(MockCall::ClaimInterface(interface));
        outcome(&state.claim_error)
    }

    fn release_interface(&mut self, interface: u8) -> TransportResult<()> {
        self.state
            .borrow_mut()
            .record(MockCall::ReleaseInterface(interface));
        Ok(())
    }

    fn set_alternate_setting(&mut self, interface: u8, setting: u8) -> TransportResult<()> {
        let mut state = self.state.borrow_mut();
        state.record(MockCall::SetAlternateSetting { interface, setting });
        outcome(&state.alternate_setting_error)
    }

    fn write_bulk(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> TransportResult<usize> {
        let mut state = self.state.borrow_mut();
        state.record(MockCall::WriteBulk {
            endpoint,
            data: data.to_vec(),
            timeout,
        });
        outcome(&state.write_error).map(|()| data.len())
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> TransportResult<usize> {
        let mut state = self.state.borrow_mut();
        state.record(MockCall::ReadBulk { endpoint, timeout });
        let data = state.reads.pop_front().unwrap_or(Err(TransportError::Timeout))?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    fn reset(&mut self) -> TransportResult<()> {
        self.state.borrow_mut().record(MockCall::Reset);
        Ok(())
    }
}

impl Transport for MockTransport {
    type Device = usize;
    type Handle = MockHandle;

    fn devices(&self) -> TransportResult<Vec<usize>> {
        self.state.borrow_mut().record(MockCall::Enumerate);
        Ok((0..self.devices.len()).collect())
    }

    fn device_ids(&self, device: &usize) -> TransportResult<DeviceIds> {
        self.devices[*device].ids.clone()
    }

    fn location(&self, device: &usize) -> String {
        let device = &self.devices[*device];
        format!("{:03}/{:03}", device.bus, device.address)
    }

    fn configurations(&self, device: &usize) -> TransportResult<Vec<ConfigurationLayout>> {
        self.devices[*device].configurations.clone()
    }

    fn open(&self, device: &usize) -> TransportResult<MockHandle> {
        self.state
            .borrow_mut()
            .record(MockCall::Open { device: *device });
        if let Some(e) = &self.devices[*device].open_error {
            return Err(e.clone());
        }
        Ok(MockHandle {
            device: *device,
            state: Rc::clone(&self.state),
        })
    }

    fn kernel_driver_support(&self) -> bool {
        self.platform == MockPlatform::KernelDrivers
    }

    fn detach_kernel_driver(&self, _handle: &mut MockHandle, interface: u8) -> TransportResult<()> {
        let mut state = self.state.borrow_mut();
        state.record(MockCall::DetachKernelDriver { interface });
        outcome(&state.detach_error)
    }

    fn release(&self, mut handle: MockHandle, interface: u8) -> TransportResult<()> {
        if self.platform == MockPlatform::ResetOnRelease {
            handle.reset()?;
        }
        handle.release_interface(interface)?;
        self.state.borrow_mut().record(MockCall::Close);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_drain_then_time_out() {
        let mock = MockTransport::new()
            .with_device(MockDevice::new(1, 1, 1, 1))
            .with_read_bytes(&[0x42]);
        let mut handle = mock.open(&0).unwrap();
        let mut buf = [0u8; 1];

        assert_eq!(handle.read_bulk(0x81, &mut buf, Duration::ZERO), Ok(1));
        assert_eq!(buf[0], 0x42);
        assert_eq!(
            handle.read_bulk(0x81, &mut buf, Duration::ZERO),
            Err(TransportError::Timeout)
        );
        assert_eq!(mock.transfer_count(), 2);
    }

    #[test]
    fn test_release_resets_on_reset_platform() {
        let mock = MockTransport::new()
            .with_platform(MockPlatform::ResetOnRelease)
            .with_device(MockDevice::new(1, 1, 1, 1));
        let handle = mock.open(&0).unwrap();
        mock.release(handle, 0).unwrap();

        assert_eq!(
            mock.calls(),
            vec![
                MockCall::Open { device: 0 },
                MockCall::Reset,
                MockCall::ReleaseInterface(0),
                MockCall::Close,
            ]
        );
        assert!(!mock.kernel_driver_support());
    }

    #[test]
    fn test_open_error() {
        let mock = MockTransport::new()
            .with_device(MockDevice::new(1, 1, 1, 1).with_open_error(TransportError::Access));
        assert_eq!(mock.open(&0).unwrap_err(), TransportError::Access);
    }
}
