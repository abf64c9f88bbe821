//! Implements discovering, claiming, and talking to a CM19A over raw USB interrupt transfers.

use std::{fmt, time::Duration};

use log::{debug, info, warn};
use rusb::{Device, DeviceHandle, GlobalContext};
use thiserror::Error;

use crate::transport::{Transport, TransportError};

/// The USB vendor ID of X10 Wireless Technology
pub const X10_USB_VID: u16 = 0x0BC7;

/// The USB PID of the CM19A (sold as the Firecracker interface)
pub const CM19A_USB_PID: u16 = 0x0002;

/// Everything needed to find and claim one transceiver model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    pub configuration: u8,
    pub interface: u8,
    pub alternate_setting: u8,
    pub read_endpoint: u8,
    pub write_endpoint: u8,
    pub max_frame_len: usize,
}

/// The CM19A has a single configuration with a single interface.
pub const CM19A: DeviceIdentity = DeviceIdentity {
    vendor_id: X10_USB_VID,
    product_id: CM19A_USB_PID,
    configuration: 1,
    interface: 0,
    alternate_setting: 0,
    read_endpoint: 0x81,
    write_endpoint: 0x02,
    max_frame_len: cm19a_protocol::MAX_FRAME_LEN,
};

/// Step of [`UsbTransport::open`] that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStep {
    Open,
    Configure,
    Claim,
    AlternateSetting,
}

impl fmt::Display for ClaimStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClaimStep::Open => "open the device",
            ClaimStep::Configure => "select the configuration",
            ClaimStep::Claim => "claim the interface",
            ClaimStep::AlternateSetting => "set the alternate setting",
        })
    }
}

#[derive(Error, Debug)]
pub enum OpenError {
    #[error("No USB device with ID {vendor_id:04x}:{product_id:04x} was found. Is the transceiver plugged in?")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },

    #[error("Could not enumerate USB devices: {0}")]
    Enumerate(rusb::Error),

    #[error("Could not {step}: {source}. The device may be in use by another driver.")]
    Claim { step: ClaimStep, source: rusb::Error },
}

/// Finds the first device on any bus matching the identity's vendor and product id.
fn find_device(identity: &DeviceIdentity) -> Result<Device<GlobalContext>, OpenError> {
    let devices = rusb::devices().map_err(OpenError::Enumerate)?;

    for device in devices.iter() {
        let descriptor = match device.device_descriptor() {
            Ok(descriptor) => descriptor,
            Err(e) => {
                debug!(
                    "Skipping device {:03}:{:03} with unreadable descriptor: {}",
                    device.bus_number(),
                    device.address(),
                    e
                );
                continue;
            }
        };

        if descriptor.vendor_id() == identity.vendor_id
            && descriptor.product_id() == identity.product_id
        {
            debug!(
                "Found {:04x}:{:04x} on bus {:03} device {:03}",
                identity.vendor_id,
                identity.product_id,
                device.bus_number(),
                device.address()
            );
            return Ok(device);
        }
    }

    Err(OpenError::DeviceNotFound {
        vendor_id: identity.vendor_id,
        product_id: identity.product_id,
    })
}

/// A claimed USB interface on a transceiver.
///
/// The interface is released on [`Transport::release`] or when dropped.
pub struct UsbTransport {
    handle: DeviceHandle<GlobalContext>,
    identity: DeviceIdentity,
    claimed: bool,
}

impl UsbTransport {
    /// Opens the device and claims its interface.
    ///
    /// Opening, selecting the configuration, claiming the interface and
    /// selecting the alternate setting happen in that order. If a step fails
    /// everything acquired by the earlier steps is given back before the
    /// error is returned.
    pub fn open(identity: &DeviceIdentity) -> Result<Self, OpenError> {
        let device = find_device(identity)?;

        let claim_error =
            |step: ClaimStep| move |source: rusb::Error| OpenError::Claim { step, source };

        let handle = device.open().map_err(claim_error(ClaimStep::Open))?;

        // Not every platform supports this, and the CM19A usually has no kernel driver bound.
        if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
            debug!("Kernel driver auto-detach unavailable: {}", e);
        }

        handle
            .set_active_configuration(identity.configuration)
            .map_err(claim_error(ClaimStep::Configure))?;

        handle
            .claim_interface(identity.interface)
            .map_err(claim_error(ClaimStep::Claim))?;

        if let Err(source) =
            handle.set_alternate_setting(identity.interface, identity.alternate_setting)
        {
            if let Err(e) = handle.release_interface(identity.interface) {
                warn!("Failed to release interface after a failed claim: {}", e);
            }
            return Err(OpenError::Claim {
                step: ClaimStep::AlternateSetting,
                source,
            });
        }

        info!(
            "Opened {:04x}:{:04x} and claimed interface {}",
            identity.vendor_id, identity.product_id, identity.interface
        );

        Ok(Self {
            handle,
            identity: *identity,
            claimed: true,
        })
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }
}

impl Transport for UsbTransport {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        if !self.claimed {
            return Err(TransportError::Released);
        }

        let len = buf.len().min(self.identity.max_frame_len);
        Ok(self
            .handle
            .read_interrupt(self.identity.read_endpoint, &mut buf[..len], timeout)?)
    }

    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<usize, TransportError> {
        if !self.claimed {
            return Err(TransportError::Released);
        }

        Ok(self
            .handle
            .write_interrupt(self.identity.write_endpoint, data, timeout)?)
    }

    fn release(&mut self) {
        if !self.claimed {
            return;
        }
        self.claimed = false;

        match self.handle.release_interface(self.identity.interface) {
            Ok(()) => debug!("Released interface {}", self.identity.interface),
            Err(e) => warn!(
                "Failed to release interface {}: {}",
                self.identity.interface, e
            ),
        }
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for UsbTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsbTransport")
            .field("identity", &self.identity)
            .field("claimed", &self.claimed)
            .finish()
    }
}
