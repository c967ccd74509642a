//! HID transport abstraction and the hidapi backend.
//!
//! The session only talks to the traits in this module, so tests and other
//! backends can stand in for real hardware.

use crate::{Error, Result, VENDOR_ID};
use hidapi::{HidApi, HidDevice};
use std::ffi::CString;
use std::sync::Mutex;
use tracing::{debug, info};

/// Read poll interval of the hidapi backend.
///
/// The device lock is released between polls so writers never wait longer
/// than this for a blocked reader.
const READ_POLL_MS: i32 = 50;

/// A connected device as seen by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Platform device path.
    pub path: String,
    /// USB product ID.
    pub product_id: u16,
    /// USB serial number, if the device reports one.
    pub serial: Option<String>,
    /// USB product string.
    pub product_name: Option<String>,
}

/// Bus-level operations: discovering and opening devices.
pub trait Transport: Send + Sync {
    /// Handle type produced by [`Transport::open`].
    type Handle: DeviceHandle;

    /// Lists connected devices with the given VID:PID.
    fn enumerate(&self, vendor_id: u16, product_id: u16) -> Result<Vec<DeviceDescriptor>>;

    /// Opens a previously enumerated device.
    fn open(&self, descriptor: &DeviceDescriptor) -> Result<Self::Handle>;
}

/// Operations on one open device.
///
/// Implementations must allow `read` on one thread while `write` and
/// `send_feature_report` are called from others.
pub trait DeviceHandle: Send + Sync + 'static {
    /// Reads one input report. Returns `Ok(0)` when no report arrived
    /// within the backend's poll interval.
    fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Writes one output report, returning the number of bytes accepted.
    fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Sends a feature report.
    fn send_feature_report(&self, buf: &[u8]) -> Result<()>;

    /// Closes the handle. Every later call fails with [`Error::Closed`].
    fn close(&self) -> Result<()>;
}

/// Transport backed by hidapi.
pub struct HidTransport {
    api: Mutex<HidApi>,
}

impl HidTransport {
    /// Initializes the HID library.
    pub fn new() -> Result<Self> {
        let api = HidApi::new()?;
        Ok(Self {
            api: Mutex::new(api),
        })
    }
}

impl Transport for HidTransport {
    type Handle = HidHandle;

    fn enumerate(&self, vendor_id: u16, product_id: u16) -> Result<Vec<DeviceDescriptor>> {
        let mut api = self.api.lock().map_err(|_| Error::Closed)?;
        api.refresh_devices()?;

        let devices: Vec<_> = api
            .device_list()
            .filter(|d| d.vendor_id() == vendor_id && d.product_id() == product_id)
            .map(|d| DeviceDescriptor {
                path: d.path().to_string_lossy().into_owned(),
                product_id: d.product_id(),
                serial: d.serial_number().map(str::to_string),
                product_name: d.product_string().map(str::to_string),
            })
            .collect();

        for dev in &devices {
            debug!(
                "Found HID device: path={}, serial={:?}",
                dev.path, dev.serial
            );
        }

        Ok(devices)
    }

    fn open(&self, descriptor: &DeviceDescriptor) -> Result<HidHandle> {
        let api = self.api.lock().map_err(|_| Error::Closed)?;
        let path = CString::new(descriptor.path.as_str()).map_err(|_| Error::DeviceNotFound {
            product_id: descriptor.product_id,
            serial: descriptor.serial.clone(),
        })?;

        let device = api.open_path(path.as_c_str())?;

        info!(
            "Panel opened (VID:{:04X} PID:{:04X}, path={})",
            VENDOR_ID, descriptor.product_id, descriptor.path
        );

        Ok(HidHandle {
            device: Mutex::new(Some(device)),
        })
    }
}

/// Open hidapi device.
pub struct HidHandle {
    device: Mutex<Option<HidDevice>>,
}

impl HidHandle {
    fn with_device<T>(&self, f: impl FnOnce(&HidDevice) -> Result<T>) -> Result<T> {
        let guard = self.device.lock().map_err(|_| Error::Closed)?;
        match guard.as_ref() {
            Some(device) => f(device),
            None => Err(Error::Closed),
        }
    }
}

impl DeviceHandle for HidHandle {
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.with_device(|d| Ok(d.read_timeout(buf, READ_POLL_MS)?))
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        self.with_device(|d| Ok(d.write(buf)?))
    }

    fn send_feature_report(&self, buf: &[u8]) -> Result<()> {
        self.with_device(|d| Ok(d.send_feature_report(buf)?))
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.device.lock().map_err(|_| Error::Closed)?;
        if guard.take().is_some() {
            debug!("HID handle closed");
        }
        Ok(())
    }
}

/// Lists every connected panel matching one of the given profiles.
pub fn list_devices<T: Transport + ?Sized>(
    transport: &T,
    profiles: &[crate::DeviceProfile],
) -> Result<Vec<(crate::DeviceProfile, DeviceDescriptor)>> {
    let mut found = Vec::new();
    for profile in profiles {
        for descriptor in transport.enumerate(VENDOR_ID, profile.product_id)? {
            found.push((profile.clone(), descriptor));
        }
    }
    Ok(found)
}
