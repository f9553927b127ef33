//! Device registry and lifecycle manager.
//!
//! [`DeviceRegistry`] owns every [`Device`] record and is the only place they change. It
//! enforces the status state machine, tracks the single active device, and writes each
//! mutated record through its [`DeviceStore`].
//!
//! Persistence failures are retried once. A second failure does not fail the mutation;
//! it is logged and queued as a warning for [`DeviceRegistry::take_warnings`]. The
//! in-memory state stays authoritative for the session.

use crate::device::{wall_clock_ms, Device, DeviceStatus};
use crate::error::{InputError, Result};
use crate::settings::{Calibration, DeviceSettings, SettingsPatch};
use crate::store::DeviceStore;
use tracing::{debug, info, warn};

pub struct DeviceRegistry {
    devices: Vec<Device>,
    active: Option<String>,
    store: Box<dyn DeviceStore>,
    warnings: Vec<InputError>,
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.devices)
            .field("active", &self.active)
            .field("warnings", &self.warnings)
            .finish_non_exhaustive()
    }
}

impl DeviceRegistry {
    /// Empty registry; nothing is loaded from `store`.
    pub fn new(store: impl DeviceStore + 'static) -> Self {
        Self {
            devices: Vec::new(),
            active: None,
            store: Box::new(store),
            warnings: Vec::new(),
        }
    }

    /// Registry seeded from the persisted catalog. Every record starts disconnected.
    pub fn load(store: impl DeviceStore + 'static) -> Result<Self> {
        let mut registry = Self::new(store);
        for mut device in registry.store.load_persisted_devices()? {
            if !device.settings.matches(device.device_type) {
                warn!(
                    "Persisted settings for {} do not fit a {} device; using defaults",
                    device.id, device.device_type
                );
                device.settings = DeviceSettings::default_for(device.device_type);
            }
            device.status = DeviceStatus::Disconnected;
            device.battery_level = None;
            registry.devices.push(device);
        }
        info!("Loaded {} persisted device(s)", registry.devices.len());
        Ok(registry)
    }

    pub fn list_devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn get(&self, device_id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == device_id)
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_device(&self) -> Option<&Device> {
        self.active.as_deref().and_then(|id| self.get(id))
    }

    /// Merge a device found by platform enumeration.
    ///
    /// Known ids keep their stored settings; identity fields are refreshed.
    pub fn upsert_discovered(&mut self, found: Device) -> Result<()> {
        let id = found.id.clone();
        if let Some(existing) = self.devices.iter_mut().find(|d| d.id == id) {
            if existing.device_type != found.device_type {
                return Err(InputError::invalid_config(format!(
                    "device {} rediscovered as {} (was {})",
                    id, found.device_type, existing.device_type
                )));
            }
            existing.display_name = found.display_name;
            existing.manufacturer = found.manufacturer;
            existing.model = found.model;
            existing.capabilities = found.capabilities;
            debug!("Refreshed discovered device {}", id);
        } else {
            Self::check_settings(&found)?;
            info!("Discovered {}", found);
            self.devices.push(found);
        }
        self.persist(&id);
        Ok(())
    }

    /// Explicit pairing request for a device enumeration did not report.
    pub fn pair(&mut self, device: Device) -> Result<()> {
        Self::check_settings(&device)?;
        if self.get(&device.id).is_some() {
            return Err(InputError::invalid_config(format!(
                "device {} is already registered",
                device.id
            )));
        }
        info!("Paired {}", device);
        let id = device.id.clone();
        self.devices.push(device);
        self.persist(&id);
        Ok(())
    }

    /// Forget a device entirely.
    pub fn unpair(&mut self, device_id: &str) -> Result<Device> {
        let idx = self.index_of(device_id)?;
        let device = self.devices.remove(idx);
        if self.active.as_deref() == Some(device_id) {
            self.active = None;
        }
        let mut result = self.store.remove_device_record(device_id);
        if result.is_err() {
            result = self.store.remove_device_record(device_id);
        }
        if let Err(e) = result {
            warn!("Could not remove {} from store: {}", device_id, e);
            self.warnings.push(e);
        }
        info!("Unpaired {}", device);
        Ok(device)
    }

    /// Run the pairing sequence: `Disconnected → Pairing → {Connected | Error}`.
    ///
    /// `handshake` performs the device-type-specific work. A device in `Error` restarts the
    /// sequence; an already connected device is left alone.
    pub fn connect<F>(&mut self, device_id: &str, handshake: F) -> Result<()>
    where
        F: FnOnce(&Device) -> Result<()>,
    {
        let idx = self.index_of(device_id)?;
        match self.devices[idx].status {
            DeviceStatus::Connected => return Ok(()),
            DeviceStatus::Pairing => {
                return Err(InputError::PairingFailed {
                    device_id: device_id.to_string(),
                    reason: "pairing already in progress".into(),
                })
            }
            DeviceStatus::Error => debug!("Reconnect attempt for {}", device_id),
            DeviceStatus::Disconnected => {}
        }

        self.devices[idx].status = DeviceStatus::Pairing;
        debug!("{} → Pairing", device_id);

        match handshake(&self.devices[idx]) {
            Ok(()) => {
                let dev = &mut self.devices[idx];
                dev.status = DeviceStatus::Connected;
                dev.last_connected_at = Some(wall_clock_ms());
                info!("Connected {}", dev);
                self.persist(device_id);
                Ok(())
            }
            Err(e) => {
                self.devices[idx].status = DeviceStatus::Error;
                warn!("Pairing {} failed: {}", device_id, e);
                self.persist(device_id);
                Err(match e {
                    InputError::PairingFailed { .. }
                    | InputError::UnsupportedDeviceType { .. }
                    | InputError::InvalidConfiguration { .. } => e,
                    other => InputError::PairingFailed {
                        device_id: device_id.to_string(),
                        reason: other.to_string(),
                    },
                })
            }
        }
    }

    /// Move to `Disconnected`. Clears the active slot if this was the active device.
    ///
    /// Returns whether the device was the active one.
    pub fn disconnect(&mut self, device_id: &str) -> Result<bool> {
        let idx = self.index_of(device_id)?;
        let was_active = self.active.as_deref() == Some(device_id);
        if was_active {
            self.active = None;
        }
        if self.devices[idx].status != DeviceStatus::Disconnected {
            self.devices[idx].status = DeviceStatus::Disconnected;
            info!("Disconnected {}", self.devices[idx]);
            self.persist(device_id);
        }
        Ok(was_active)
    }

    /// Apply a status reported by the device itself.
    ///
    /// Illegal steps are ignored with a warning. A device error while connected is treated
    /// as a disconnect; `Error` is reserved for failed pairing.
    pub fn apply_status(&mut self, device_id: &str, status: DeviceStatus) -> Result<DeviceStatus> {
        let idx = self.index_of(device_id)?;
        let current = self.devices[idx].status;
        let next = match (current, status) {
            (DeviceStatus::Connected, DeviceStatus::Error) => DeviceStatus::Disconnected,
            (_, next) => next,
        };
        if current == next {
            return Ok(current);
        }
        if !current.can_transition_to(next) {
            warn!(
                "Ignoring illegal status change for {}: {:?} → {:?}",
                device_id, current, next
            );
            return Ok(current);
        }
        if next == DeviceStatus::Disconnected && self.active.as_deref() == Some(device_id) {
            self.active = None;
        }
        let dev = &mut self.devices[idx];
        dev.status = next;
        if next == DeviceStatus::Connected {
            dev.last_connected_at = Some(wall_clock_ms());
        }
        debug!("{} status {:?} → {:?}", device_id, current, next);
        self.persist(device_id);
        Ok(next)
    }

    pub fn set_battery(&mut self, device_id: &str, level: u8) -> Result<()> {
        let idx = self.index_of(device_id)?;
        let level = level.min(100);
        if self.devices[idx].battery_level != Some(level) {
            self.devices[idx].battery_level = Some(level);
            self.persist(device_id);
        }
        Ok(())
    }

    /// Make a connected device the active one. Returns the previously active id.
    pub fn set_active(&mut self, device_id: &str) -> Result<Option<String>> {
        let dev = self
            .get(device_id)
            .ok_or_else(|| InputError::not_found(device_id))?;
        if !dev.is_connected() {
            return Err(InputError::DeviceNotConnected {
                device_id: device_id.to_string(),
            });
        }
        info!("Active device → {}", device_id);
        Ok(self.active.replace(device_id.to_string()))
    }

    pub fn clear_active(&mut self) -> Option<String> {
        self.active.take()
    }

    /// Merge a partial settings update. The stored settings are replaced only if the merged
    /// result validates.
    pub fn update_settings(&mut self, device_id: &str, patch: &SettingsPatch) -> Result<&Device> {
        let idx = self.index_of(device_id)?;
        let next = self.devices[idx].settings.apply(patch)?;
        self.devices[idx].settings = next;
        debug!("Updated settings for {}", device_id);
        self.persist(device_id);
        Ok(&self.devices[idx])
    }

    /// Replace the whole calibration record of a pointing device.
    pub fn commit_calibration(&mut self, device_id: &str, calibration: Calibration) -> Result<()> {
        let idx = self.index_of(device_id)?;
        let dev = &mut self.devices[idx];
        match &mut dev.settings {
            DeviceSettings::EyeTracker(s) => s.calibration = calibration,
            _ => {
                return Err(InputError::UnsupportedDeviceType {
                    device_type: dev.device_type,
                })
            }
        }
        info!("Committed calibration for {}", device_id);
        self.persist(device_id);
        Ok(())
    }

    /// Drain warnings (persistence failures) accumulated since the last call.
    pub fn take_warnings(&mut self) -> Vec<InputError> {
        std::mem::take(&mut self.warnings)
    }

    fn index_of(&self, device_id: &str) -> Result<usize> {
        self.devices
            .iter()
            .position(|d| d.id == device_id)
            .ok_or_else(|| InputError::not_found(device_id))
    }

    fn check_settings(device: &Device) -> Result<()> {
        if !device.settings.matches(device.device_type) {
            return Err(InputError::UnsupportedDeviceType {
                device_type: device.device_type,
            });
        }
        device.settings.validate()
    }

    fn persist(&mut self, device_id: &str) {
        let Some(device) = self.devices.iter().find(|d| d.id == device_id) else {
            return;
        };
        if let Err(first) = self.store.persist_device_record(device) {
            debug!("Persisting {} failed ({}); retrying", device_id, first);
            if let Err(e) = self.store.persist_device_record(device) {
                warn!("Persisting {} failed after retry: {}", device_id, e);
                self.warnings.push(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceType;
    use crate::settings::{EyeTrackerPatch, SwitchBinding, SwitchPatch};
    use crate::store::MemoryStore;
    use crate::event::Action;

    fn registry_with(devices: &[Device]) -> (DeviceRegistry, MemoryStore) {
        let store = MemoryStore::new();
        let mut reg = DeviceRegistry::new(store.clone());
        for d in devices {
            reg.pair(d.clone()).unwrap();
        }
        (reg, store)
    }

    #[test]
    fn connect_success_records_timestamp_and_persists() {
        let (mut reg, store) = registry_with(&[Device::new("sw", "Switch", DeviceType::Switch)]);
        reg.connect("sw", |_| Ok(())).unwrap();
        let dev = reg.get("sw").unwrap();
        assert_eq!(dev.status, DeviceStatus::Connected);
        assert!(dev.last_connected_at.is_some());
        assert_eq!(store.record("sw").unwrap().status, DeviceStatus::Connected);
    }

    #[test]
    fn connect_failure_lands_in_error_and_retry_restarts() {
        let (mut reg, _) = registry_with(&[Device::new("sw", "Switch", DeviceType::Switch)]);
        let err = reg
            .connect("sw", |d| {
                assert_eq!(d.status, DeviceStatus::Pairing);
                Err(InputError::PairingFailed {
                    device_id: d.id.clone(),
                    reason: "permission denied".into(),
                })
            })
            .unwrap_err();
        assert!(matches!(err, InputError::PairingFailed { .. }));
        assert_eq!(reg.get("sw").unwrap().status, DeviceStatus::Error);

        reg.connect("sw", |_| Ok(())).unwrap();
        assert_eq!(reg.get("sw").unwrap().status, DeviceStatus::Connected);
    }

    #[test]
    fn unknown_device_is_not_found() {
        let (mut reg, _) = registry_with(&[]);
        assert!(matches!(
            reg.connect("ghost", |_| Ok(())),
            Err(InputError::DeviceNotFound { .. })
        ));
        assert!(reg.set_active("ghost").is_err());
    }

    #[test]
    fn only_connected_devices_can_become_active() {
        let (mut reg, _) = registry_with(&[
            Device::new("a", "A", DeviceType::Switch),
            Device::new("b", "B", DeviceType::EyeTracker),
        ]);
        assert!(matches!(
            reg.set_active("a"),
            Err(InputError::DeviceNotConnected { .. })
        ));
        reg.connect("a", |_| Ok(())).unwrap();
        reg.connect("b", |_| Ok(())).unwrap();
        assert_eq!(reg.set_active("a").unwrap(), None);
        assert_eq!(reg.set_active("b").unwrap().as_deref(), Some("a"));
        // connecting b did not disconnect a
        assert!(reg.get("a").unwrap().is_connected());
    }

    #[test]
    fn disconnect_clears_active() {
        let (mut reg, _) = registry_with(&[Device::new("a", "A", DeviceType::Switch)]);
        reg.connect("a", |_| Ok(())).unwrap();
        reg.set_active("a").unwrap();
        assert!(reg.disconnect("a").unwrap());
        assert!(reg.active_id().is_none());
    }

    #[test]
    fn illegal_reported_status_is_ignored() {
        let (mut reg, _) = registry_with(&[Device::new("a", "A", DeviceType::Switch)]);
        let status = reg.apply_status("a", DeviceStatus::Connected).unwrap();
        assert_eq!(status, DeviceStatus::Disconnected);
    }

    #[test]
    fn invalid_settings_update_leaves_previous_value() {
        let (mut reg, _) = registry_with(&[Device::new("a", "A", DeviceType::Switch)]);
        let before = reg.get("a").unwrap().settings.clone();
        let patch = SettingsPatch::Switch(SwitchPatch {
            bindings: Some(vec![
                SwitchBinding::new("x", Action::Select),
                SwitchBinding::new("x", Action::Next),
            ]),
            ..Default::default()
        });
        assert!(reg.update_settings("a", &patch).is_err());
        assert_eq!(reg.get("a").unwrap().settings, before);
    }

    #[test]
    fn persistence_failure_retries_once_then_warns() {
        let (mut reg, store) = registry_with(&[Device::new("et", "ET", DeviceType::EyeTracker)]);
        let patch = SettingsPatch::EyeTracker(EyeTrackerPatch {
            dwell_time_ms: Some(600),
            ..Default::default()
        });

        store.fail_next_writes(1);
        reg.update_settings("et", &patch).unwrap();
        assert!(reg.take_warnings().is_empty());

        store.fail_next_writes(2);
        reg.update_settings("et", &patch).unwrap();
        let warnings = reg.take_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].is_warning());
    }

    #[test]
    fn load_resets_session_state() {
        let store = MemoryStore::new();
        {
            let mut reg = DeviceRegistry::new(store.clone());
            reg.pair(Device::new("a", "A", DeviceType::Switch)).unwrap();
            reg.connect("a", |_| Ok(())).unwrap();
            reg.set_battery("a", 80).unwrap();
        }
        let reg = DeviceRegistry::load(store).unwrap();
        let dev = reg.get("a").unwrap();
        assert_eq!(dev.status, DeviceStatus::Disconnected);
        assert_eq!(dev.battery_level, None);
        assert!(dev.last_connected_at.is_some());
    }

    #[test]
    fn rediscovery_keeps_stored_settings() {
        let (mut reg, _) = registry_with(&[Device::new("et", "ET", DeviceType::EyeTracker)]);
        let patch = SettingsPatch::EyeTracker(EyeTrackerPatch {
            dwell_time_ms: Some(1500),
            ..Default::default()
        });
        reg.update_settings("et", &patch).unwrap();

        let found = Device::new("et", "Tracker 5", DeviceType::EyeTracker).with_vendor("Acme", "T5");
        reg.upsert_discovered(found).unwrap();
        let dev = reg.get("et").unwrap();
        assert_eq!(dev.display_name, "Tracker 5");
        let dwell = dev.settings.as_eye_tracker().unwrap().dwell_settings.dwell_time_ms;
        assert_eq!(dwell, 1500);
    }

    #[test]
    fn unpair_removes_record() {
        let (mut reg, store) = registry_with(&[Device::new("a", "A", DeviceType::Switch)]);
        reg.unpair("a").unwrap();
        assert!(reg.get("a").is_none());
        assert!(store.record("a").is_none());
    }
}
