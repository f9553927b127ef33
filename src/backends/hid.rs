//! hidapi backend: USB/Bluetooth switch interfaces and gamepads.
//!
//! [`HidSwitchSource`] wraps a `hidapi::HidDevice`. It:
//! - opens the handle in non-blocking mode
//! - drains a bounded number of reports per poll
//! - turns the button bitmask of each report into press/release edges
//!
//! It does **not** interpret axes; joysticks that need analog input should be fed through
//! a platform gamepad API or a [`VirtualSource`](super::VirtualSource).

use super::report::ButtonReportDecoder;
use crate::device::{Device, DeviceType, InputSource};
use crate::error::{InputError, Result};
use crate::event::RawSignal;
use hidapi::{DeviceInfo, HidApi, HidDevice};
use tracing::{debug, warn};

/// Maximum number of HID reports drained per `poll()` call.
const MAX_REPORTS_PER_TICK: usize = 32;
const REPORT_BUF_LEN: usize = 64;

/// Stable id for a HID endpoint.
pub fn hid_device_id(info: &DeviceInfo) -> String {
    match info.serial_number().filter(|s| !s.is_empty()) {
        Some(serial) => format!(
            "hid:{:04x}:{:04x}:{}",
            info.vendor_id(),
            info.product_id(),
            serial
        ),
        None => format!(
            "hid:{:04x}:{:04x}:{}",
            info.vendor_id(),
            info.product_id(),
            info.interface_number()
        ),
    }
}

/// Device type suggested by the HID usage, or `None` for endpoints we do not read.
fn classify(info: &DeviceInfo) -> Option<DeviceType> {
    let (page, usage) = (info.usage_page(), info.usage());
    match (page, usage) {
        // Generic Desktop: joystick, gamepad
        (0x01, 0x04) | (0x01, 0x05) => Some(DeviceType::Joystick),
        // mouse and keyboard endpoints are left to the OS
        (0x01, 0x02) | (0x01, 0x06) => None,
        // Button page, or vendor-defined pages used by switch boxes
        (0x09, _) => Some(DeviceType::Switch),
        (p, _) if p & 0xFF00 == 0xFF00 => Some(DeviceType::Switch),
        _ => None,
    }
}

/// Enumerate HID endpoints that look like switch interfaces or gamepads.
pub fn discover_hid_devices(api: &HidApi) -> Vec<Device> {
    let mut found = Vec::new();
    for info in api.device_list() {
        let Some(device_type) = classify(info) else {
            continue;
        };
        let id = hid_device_id(info);
        if found.iter().any(|d: &Device| d.id == id) {
            continue;
        }
        let name = info.product_string().unwrap_or("HID device").to_string();
        let device = Device::new(id, name, device_type).with_vendor(
            info.manufacturer_string().unwrap_or_default(),
            info.product_string().unwrap_or_default(),
        );
        debug!("HID candidate {}", device);
        found.push(device);
    }
    found
}

pub struct HidSwitchSource {
    id: String,
    name: String,
    raw: HidDevice,
    decoder: ButtonReportDecoder,
    buf: [u8; REPORT_BUF_LEN],
    failed: bool,
}

impl HidSwitchSource {
    /// Open the endpoint of `device_id`. The button bitmask starts `offset` bytes into each
    /// report and is `width` bytes wide.
    pub fn open(api: &HidApi, device_id: &str, offset: usize, width: usize) -> Result<Self> {
        let info = api
            .device_list()
            .find(|info| hid_device_id(info) == device_id)
            .ok_or_else(|| InputError::not_found(device_id))?;
        let raw = info.open_device(api).map_err(|e| InputError::PairingFailed {
            device_id: device_id.to_string(),
            reason: e.to_string(),
        })?;
        if let Err(e) = raw.set_blocking_mode(false) {
            debug!("{}: non-blocking mode unavailable ({})", device_id, e);
        }
        Ok(Self {
            id: device_id.to_string(),
            name: info.product_string().unwrap_or("HID device").to_string(),
            raw,
            decoder: ButtonReportDecoder::new(offset, width),
            buf: [0; REPORT_BUF_LEN],
            failed: false,
        })
    }
}

impl InputSource for HidSwitchSource {
    fn poll(&mut self) -> Vec<RawSignal> {
        let mut out = Vec::new();
        if self.failed {
            return out;
        }
        for _ in 0..MAX_REPORTS_PER_TICK {
            match self.raw.read(&mut self.buf) {
                Ok(0) => break,
                Ok(n) => out.extend(self.decoder.decode(&self.buf[..n])),
                Err(e) => {
                    warn!("{}: HID read failed: {}", self.id, e);
                    self.failed = true;
                    self.decoder.reset();
                    out.push(RawSignal::Fault {
                        message: e.to_string(),
                    });
                    break;
                }
            }
        }
        out
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> &str {
        &self.id
    }
}
