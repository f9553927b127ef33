//! Device records and the polling source trait.
//!
//! A [`Device`] is the registry's identity + capability record for one physical input
//! device. Records are created by discovery or an explicit pairing request and are only
//! mutated through lifecycle transitions in [`DeviceRegistry`](crate::registry::DeviceRegistry).
//!
//! ## Status transitions
//! ```text
//! Disconnected ──► Pairing ──► Connected
//!      ▲              │            │
//!      │              ▼            │
//!      │            Error ─────────┼──► Pairing   (explicit reconnect)
//!      └──────────────────────────-┘             (disconnect is always reachable)
//! ```

use crate::event::RawSignal;
use crate::settings::DeviceSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Closed set of supported device categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceType {
    Switch,
    EyeTracker,
    Joystick,
    Touch,
    SipPuff,
    HeadMouse,
    Brainwave,
    #[serde(rename = "EMG")]
    Emg,
}

impl DeviceType {
    /// Continuous pointing devices drive the dwell selector instead of the scan engine.
    pub fn is_pointing(self) -> bool {
        matches!(self, Self::EyeTracker | Self::HeadMouse)
    }

    /// Devices that are sampled on a frame cadence rather than delivering events.
    pub fn is_polled(self) -> bool {
        matches!(self, Self::Joystick)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Switch => "switch",
            Self::EyeTracker => "eye-tracker",
            Self::Joystick => "joystick",
            Self::Touch => "touch",
            Self::SipPuff => "sip-puff",
            Self::HeadMouse => "head-mouse",
            Self::Brainwave => "brainwave",
            Self::Emg => "emg",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DeviceStatus {
    #[default]
    Disconnected,
    Pairing,
    Connected,
    Error,
}

impl DeviceStatus {
    /// Whether `self → next` is a legal lifecycle step.
    pub fn can_transition_to(self, next: DeviceStatus) -> bool {
        use DeviceStatus::*;
        match (self, next) {
            (_, Disconnected) => true,
            (Disconnected, Pairing) | (Error, Pairing) => true,
            (Pairing, Connected) | (Pairing, Error) => true,
            _ => false,
        }
    }
}

/// Capability tags advertised by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Buttons,
    Axes,
    Hat,
    Gaze,
    Pointer,
    Click,
    Touch,
    Breath,
    Bioelectric,
    Battery,
    Haptics,
}

/// Identity and capability record for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Stable id; also the persistence key.
    pub id: String,
    pub display_name: String,
    pub device_type: DeviceType,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub status: DeviceStatus,
    #[serde(default)]
    pub capabilities: BTreeSet<Capability>,
    pub settings: DeviceSettings,
    /// Wall-clock milliseconds since the Unix epoch.
    #[serde(default)]
    pub last_connected_at: Option<u64>,
    /// 0..=100
    #[serde(default)]
    pub battery_level: Option<u8>,
}

impl Device {
    /// Build a disconnected record with default settings for `device_type`.
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        device_type: DeviceType,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            device_type,
            manufacturer: String::new(),
            model: String::new(),
            status: DeviceStatus::Disconnected,
            capabilities: default_capabilities(device_type),
            settings: DeviceSettings::default_for(device_type),
            last_connected_at: None,
            battery_level: None,
        }
    }

    pub fn with_settings(mut self, settings: DeviceSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_vendor(mut self, manufacturer: impl Into<String>, model: impl Into<String>) -> Self {
        self.manufacturer = manufacturer.into();
        self.model = model.into();
        self
    }

    pub fn is_connected(&self) -> bool {
        self.status == DeviceStatus::Connected
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] ({})", self.display_name, self.id, self.device_type)
    }
}

fn default_capabilities(device_type: DeviceType) -> BTreeSet<Capability> {
    use Capability::*;
    let caps: &[Capability] = match device_type {
        DeviceType::Switch => &[Buttons],
        DeviceType::EyeTracker => &[Gaze],
        DeviceType::Joystick => &[Axes, Buttons, Hat],
        DeviceType::Touch => &[Touch],
        DeviceType::SipPuff => &[Breath],
        DeviceType::HeadMouse => &[Pointer, Click],
        DeviceType::Brainwave | DeviceType::Emg => &[Bioelectric],
    };
    caps.iter().copied().collect()
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub(crate) fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A source of raw signals that has to be sampled (gamepad-style devices, HID handles).
///
/// Event-driven devices push [`RawSignal`]s straight into the engine instead.
pub trait InputSource {
    /// Drain whatever changed since the last call.
    fn poll(&mut self) -> Vec<RawSignal>;
    fn name(&self) -> &str;
    /// Id of the [`Device`] record this source feeds.
    fn id(&self) -> &str;
}
