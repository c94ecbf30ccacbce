//! Device discovery
//!
//! Walks the transport's device list in order and returns the first device
//! whose vendor and product IDs match.

use common::{DeviceIds, Transport, TransportError};
use thiserror::Error;
use tracing::{debug, warn};

/// A device matching the requested IDs
#[derive(Debug, Clone)]
pub struct Located<D> {
    pub ids: DeviceIds,
    pub device: D,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocateError {
    #[error("no device matching {0} found")]
    NotFound(DeviceIds),

    #[error("failed to enumerate USB devices: {0}")]
    Enumeration(#[source] TransportError),
}

/// Find the first device with exactly `wanted` vendor and product IDs
pub fn find<T>(transport: &T, wanted: DeviceIds) -> Result<Located<T::Device>, LocateError>
where
    T: Transport + ?Sized,
{
    let devices = transport.devices().map_err(LocateError::Enumeration)?;

    for device in devices {
        let ids = match transport.device_ids(&device) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(
                    "Skipping device {}: cannot read descriptor: {}",
                    transport.location(&device),
                    e
                );
                continue;
            }
        };

        debug!("found usb {} {}", transport.location(&device), ids);

        if ids == wanted {
            debug!("found device {}", wanted);
            return Ok(Located { ids, device });
        }
    }

    Err(LocateError::NotFound(wanted))
}
