//! Device initialization
//!
//! Takes a located device from "found" to "ready for transfers": open it,
//! detach kernel drivers, select a configuration, claim interface 0 and pick
//! its first alternate setting. Only opening is allowed to fail; every later
//! step is best effort and its outcome is recorded in [`InitStatus`].

use crate::usb::locator::Located;
use common::{
    ConfigurationLayout, DeviceIds, TransferHandle, Transport, TransportError, TransportResult,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Interface claimed for every session
pub const SESSION_INTERFACE: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unable to open device {ids}: {source}")]
pub struct OpenFailed {
    pub ids: DeviceIds,
    #[source]
    pub source: TransportError,
}

/// Configuration, interface and alternate setting chosen for the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigurationSelection {
    /// Position of the configuration in the device's descriptor list
    pub config_index: usize,
    /// bConfigurationValue handed to set-configuration
    pub configuration_value: u8,
    pub interface: u8,
    /// First alternate setting declared for the interface, if any
    pub alternate_setting: Option<u8>,
}

impl ConfigurationSelection {
    /// The last configuration in the list is the one selected; interface 0
    /// and its first alternate setting are always used.
    pub fn from_layouts(configurations: &[ConfigurationLayout]) -> Option<Self> {
        let config_index = configurations.len().checked_sub(1)?;
        let config = &configurations[config_index];

        Some(Self {
            config_index,
            configuration_value: config.value,
            interface: SESSION_INTERFACE,
            alternate_setting: config
                .interface(SESSION_INTERFACE)
                .and_then(|i| i.alternate_settings.first().copied()),
        })
    }
}

/// Result of one initialization step
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StepStatus {
    Done,
    Failed(TransportError),
    /// Not attempted because the device provided nothing to act on
    #[default]
    Skipped,
}

impl StepStatus {
    fn from_result(result: TransportResult<()>) -> Self {
        match result {
            Ok(()) => StepStatus::Done,
            Err(e) => StepStatus::Failed(e),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StepStatus::Done)
    }
}

/// How far initialization got
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InitStatus {
    /// Interfaces whose kernel driver could not be detached
    pub detach_failures: Vec<(u8, TransportError)>,
    pub configuration: StepStatus,
    pub claim: StepStatus,
    pub alternate_setting: StepStatus,
}

impl InitStatus {
    /// True when some step failed or was skipped, meaning transfers may fail
    ///
    /// A detach that fails with `NotFound` only means no driver was bound.
    pub fn is_degraded(&self) -> bool {
        self.detach_failures
            .iter()
            .any(|(_, e)| *e != TransportError::NotFound)
            || !self.configuration.is_done()
            || !self.claim.is_done()
            || !self.alternate_setting.is_done()
    }
}

/// An open, claimed and configured device
///
/// The handle is released exactly once: by [`DeviceSession::release`], or
/// when the session is dropped without it.
pub struct DeviceSession<'t, T: Transport> {
    transport: &'t T,
    handle: Option<T::Handle>,
    ids: DeviceIds,
    selection: Option<ConfigurationSelection>,
    status: InitStatus,
}

impl<'t, T: Transport> DeviceSession<'t, T> {
    pub fn ids(&self) -> DeviceIds {
        self.ids
    }

    pub fn selection(&self) -> Option<&ConfigurationSelection> {
        self.selection.as_ref()
    }

    pub fn status(&self) -> &InitStatus {
        &self.status
    }

    /// Handle for transfers; `None` once released
    pub fn handle_mut(&mut self) -> Option<&mut T::Handle> {
        self.handle.as_mut()
    }

    /// Release the interface and close the device
    pub fn release(mut self) -> TransportResult<()> {
        self.release_handle()
    }

    fn release_handle(&mut self) -> TransportResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        let result = self.transport.release(handle, SESSION_INTERFACE);
        match &result {
            Ok(()) => debug!("Released device {}", self.ids),
            Err(e) => warn!("Failed to release device {}: {}", self.ids, e),
        }
        result
    }
}

impl<T: Transport> Drop for DeviceSession<'_, T> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            debug!("Releasing device {} on drop", self.ids);
            let _ = self.release_handle();
        }
    }
}

/// Open a located device and bring it into a usable state
pub fn open<'t, T: Transport>(
    transport: &'t T,
    located: &Located<T::Device>,
) -> Result<DeviceSession<'t, T>, OpenFailed> {
    let ids = located.ids;
    let mut handle = transport.open(&located.device).map_err(|source| {
        warn!("unable to open device {}: {}", ids, source);
        OpenFailed { ids, source }
    })?;
    debug!("Opened device {} at {}", ids, transport.location(&located.device));

    let mut status = InitStatus::default();

    let configurations = transport
        .configurations(&located.device)
        .unwrap_or_else(|e| {
            warn!("Failed to read configuration descriptors: {}", e);
            Vec::new()
        });

    if transport.kernel_driver_support() {
        for config in &configurations {
            for interface in &config.interfaces {
                match transport.detach_kernel_driver(&mut handle, interface.number) {
                    Ok(()) => debug!("detached kernel driver from interface {}", interface.number),
                    Err(TransportError::NotFound) => {
                        debug!("no kernel driver on interface {}", interface.number);
                        status
                            .detach_failures
                            .push((interface.number, TransportError::NotFound));
                    }
                    Err(e) => {
                        warn!(
                            "Failed to detach kernel driver from interface {}: {}",
                            interface.number, e
                        );
                        status.detach_failures.push((interface.number, e));
                    }
                }
            }
        }
    } else {
        debug!("Platform has no kernel drivers to detach");
    }

    let selection = ConfigurationSelection::from_layouts(&configurations);

    status.configuration = match &selection {
        Some(sel) => {
            let result = handle.set_configuration(sel.configuration_value);
            debug!("set conf={} -> {:?}", sel.configuration_value, result);
            StepStatus::from_result(result)
        }
        None => {
            warn!("Device declares no usable configuration");
            StepStatus::Skipped
        }
    };

    let result = handle.claim_interface(SESSION_INTERFACE);
    debug!("claim interface {} -> {:?}", SESSION_INTERFACE, result);
    status.claim = StepStatus::from_result(result);

    status.alternate_setting = match selection.and_then(|s| s.alternate_setting) {
        Some(alt) => {
            let result = handle.set_alternate_setting(SESSION_INTERFACE, alt);
            debug!("alt setting {} -> {:?}", alt, result);
            StepStatus::from_result(result)
        }
        None => StepStatus::Skipped,
    };

    if status.is_degraded() {
        warn!("Device {} initialized with errors: {:?}", ids, status);
    } else {
        debug!("opening device {} succeeded", ids);
    }

    Ok(DeviceSession {
        transport,
        handle: Some(handle),
        ids,
        selection,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{
        MockCall, MockDevice, MockPlatform, MockTransport, create_mock_configuration,
    };

    fn located(mock: &MockTransport) -> Located<usize> {
        crate::usb::locator::find(mock, DeviceIds::new(0x1234, 0x0001)).unwrap()
    }

    #[test]
    fn test_selects_last_configuration() {
        let mock = MockTransport::new().with_device(
            MockDevice::new(1, 1, 0x1234, 0x0001).with_configurations(vec![
                create_mock_configuration(1, &[(0, &[0])]),
                create_mock_configuration(2, &[(0, &[4, 5]), (1, &[0])]),
            ]),
        );

        let session = open(&mock, &located(&mock)).unwrap();

        assert_eq!(
            session.selection(),
            Some(&ConfigurationSelection {
                config_index: 1,
                configuration_value: 2,
                interface: 0,
                alternate_setting: Some(4),
            })
        );
        let calls = mock.calls();
        assert!(calls.contains(&MockCall::SetConfiguration(2)));
        assert!(calls.contains(&MockCall::SetAlternateSetting {
            interface: 0,
            setting: 4
        }));
    }

    #[test]
    fn test_detaches_every_interface_of_every_configuration() {
        let mock = MockTransport::new().with_device(
            MockDevice::new(1, 1, 0x1234, 0x0001).with_configurations(vec![
                create_mock_configuration(1, &[(0, &[0]), (1, &[0])]),
                create_mock_configuration(2, &[(0, &[0])]),
            ]),
        );

        let _session = open(&mock, &located(&mock)).unwrap();

        let detached: Vec<u8> = mock
            .calls()
            .iter()
            .filter_map(|c| match c {
                MockCall::DetachKernelDriver { interface } => Some(*interface),
                _ => None,
            })
            .collect();
        assert_eq!(detached, vec![0, 1, 0]);
    }

    #[test]
    fn test_step_order() {
        let mock = MockTransport::new().with_device(MockDevice::new(1, 1, 0x1234, 0x0001));
        let _session = open(&mock, &located(&mock)).unwrap();

        assert_eq!(
            mock.calls()[1..5],
            [
                MockCall::Open { device: 0 },
                MockCall::DetachKernelDriver { interface: 0 },
                MockCall::SetConfiguration(1),
                MockCall::ClaimInterface(0),
            ]
        );
    }

    #[test]
    fn test_no_detach_without_kernel_drivers() {
        let mock = MockTransport::new()
            .with_platform(MockPlatform::ResetOnRelease)
            .with_device(MockDevice::new(1, 1, 0x1234, 0x0001));

        let session = open(&mock, &located(&mock)).unwrap();

        assert!(
            !mock
                .calls()
                .iter()
                .any(|c| matches!(c, MockCall::DetachKernelDriver { .. }))
        );
        assert!(!session.status().is_degraded());
    }

    #[test]
    fn test_open_failure_is_reported() {
        let mock = MockTransport::new().with_device(
            MockDevice::new(1, 1, 0x1234, 0x0001).with_open_error(TransportError::Access),
        );

        let err = open(&mock, &located(&mock)).err().unwrap();
        assert_eq!(err.source, TransportError::Access);
        assert_eq!(mock.close_count(), 0);
    }

    #[test]
    fn test_failed_steps_still_yield_session() {
        let mock = MockTransport::new()
            .with_device(MockDevice::new(1, 1, 0x1234, 0x0001))
            .with_detach_error(TransportError::Access)
            .with_set_configuration_error(TransportError::Busy)
            .with_claim_error(TransportError::Busy)
            .with_alternate_setting_error(TransportError::Pipe);

        let session = open(&mock, &located(&mock)).unwrap();
        let status = session.status();

        assert!(status.is_degraded());
        assert_eq!(status.detach_failures, vec![(0, TransportError::Access)]);
        assert_eq!(status.configuration, StepStatus::Failed(TransportError::Busy));
        assert_eq!(status.claim, StepStatus::Failed(TransportError::Busy));
        assert_eq!(
            status.alternate_setting,
            StepStatus::Failed(TransportError::Pipe)
        );
    }

    #[test]
    fn test_missing_driver_is_not_degradation() {
        let mock = MockTransport::new()
            .with_device(MockDevice::new(1, 1, 0x1234, 0x0001))
            .with_detach_error(TransportError::NotFound);

        let session = open(&mock, &located(&mock)).unwrap();
        assert!(!session.status().is_degraded());
    }

    #[test]
    fn test_unreadable_configurations() {
        let mock = MockTransport::new().with_device(
            MockDevice::new(1, 1, 0x1234, 0x0001).with_configuration_error(TransportError::Io),
        );

        let session = open(&mock, &located(&mock)).unwrap();

        assert!(session.selection().is_none());
        assert_eq!(session.status().configuration, StepStatus::Skipped);
        assert!(session.status().claim.is_done());
        assert!(session.status().is_degraded());
    }

    #[test]
    fn test_release_once_then_drop_is_noop() {
        let mock = MockTransport::new().with_device(MockDevice::new(1, 1, 0x1234, 0x0001));
        let session = open(&mock, &located(&mock)).unwrap();

        session.release().unwrap();
        assert_eq!(mock.close_count(), 1);
    }

    #[test]
    fn test_drop_releases() {
        let mock = MockTransport::new().with_device(MockDevice::new(1, 1, 0x1234, 0x0001));
        {
            let _session = open(&mock, &located(&mock)).unwrap();
        }
        assert_eq!(mock.close_count(), 1);
        assert_eq!(mock.calls().last(), Some(&MockCall::Close));
    }
}
