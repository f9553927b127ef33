//! The synchronous input core.
//!
//! [`InputEngine`] owns the registry, one normalizer per connected device, the scan engine,
//! the dwell selector, any calibration run in flight, and the event bus. Every method takes
//! `&mut self`, so whoever owns the engine serializes all state changes; the tokio runtime
//! in [`crate::runtime`] does that with a single-consumer command queue.
//!
//! The engine has no clock. Operations that stamp events or measure time take `now_ms`
//! explicitly, which keeps every state machine testable without sleeping.
//!
//! # Routing
//! ```text
//! RawSignal ─► Normalizer ─► DeviceEvent ─► validate ─► EventBus
//!                                               │
//!                 status / battery / error ◄────┤
//!                                               │ (active device only)
//!        Switch, joystick, touch, sip/puff, EEG/EMG ─► Action ─► dispatcher ─► scan / host
//!        Gaze, head mouse ─► calibration run (if any) or smoother ─► dwell ─► commit
//! ```
//!
//! Input events from any device other than the active one are dropped. Changing the active
//! device stops the previous scan or dwell process before the new one starts, inside one
//! call, so nothing from the old device can be routed after the switch begins.

use crate::binding::{resolve_button, resolve_switch};
use crate::calibration::{CalibrationOutcome, CalibrationRun, SampleOutcome};
use crate::config::EngineConfig;
use crate::device::{Device, DeviceStatus};
use crate::dispatch::{dispatch_action, DispatchContext, Dispatched};
use crate::dwell::{DwellSelector, GazeSmoother};
use crate::error::{InputError, Result};
use crate::event::{Action, DeviceEvent, EventPayload, RawSignal};
use crate::eventbus::{EventBus, EventFilter, EventListener};
use crate::host::{Host, PairingBackend};
use crate::normalize::{normalizer_for, Normalizer};
use crate::registry::DeviceRegistry;
use crate::scan::{ScanEngine, TimerPlan};
use crate::settings::{DeviceSettings, EyeTrackerSettings, ScanMode, ScanSettings, SettingsPatch};
use crate::status::{CalibrationStatus, DwellSnapshot, ScanningStatus};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// What the engine did with one signal or event.
#[derive(Debug, Clone, PartialEq)]
pub enum Handled {
    /// A canonical action was dispatched.
    Action(Action, Dispatched),
    /// State changed (pointer moved, switch released, battery level) without an action.
    Consumed,
    /// Rejected: malformed, or from an unknown, disconnected, or inactive device.
    Dropped,
}

/// Process bound to the active device.
enum Process {
    Scan(ScanSettings),
    Pointer(EyeTrackerSettings),
}

fn process_for(device: &Device) -> Process {
    match &device.settings {
        DeviceSettings::Switch(s) => Process::Scan(s.scan_settings.clone()),
        DeviceSettings::EyeTracker(s) => Process::Pointer(s.clone()),
        // discrete non-switch devices move the cursor themselves
        DeviceSettings::Joystick(_) | DeviceSettings::None => Process::Scan(ScanSettings {
            mode: ScanMode::Step,
            ..ScanSettings::default()
        }),
    }
}

pub struct InputEngine {
    config: EngineConfig,
    registry: DeviceRegistry,
    normalizers: HashMap<String, Box<dyn Normalizer>>,
    pairing: Box<dyn PairingBackend>,
    host: Box<dyn Host>,
    bus: EventBus,
    scan: ScanEngine,
    smoother: GazeSmoother,
    dwell: Option<DwellSelector>,
    calibration: Option<CalibrationRun>,
    calibration_result: Option<Result<CalibrationOutcome>>,
    dropped: u64,
}

impl InputEngine {
    pub fn new(
        config: EngineConfig,
        registry: DeviceRegistry,
        host: impl Host + 'static,
        pairing: impl PairingBackend + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let rearm = config.scan.rearm_delay_ms;
        Ok(Self {
            config,
            registry,
            normalizers: HashMap::new(),
            pairing: Box::new(pairing),
            host: Box::new(host),
            bus: EventBus::new(),
            scan: ScanEngine::new(rearm),
            smoother: GazeSmoother::default(),
            dwell: None,
            calibration: None,
            calibration_result: None,
            dropped: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn list_devices(&self) -> &[Device] {
        self.registry.list_devices()
    }

    pub fn active_device(&self) -> Option<&Device> {
        self.registry.active_device()
    }

    pub fn add_listener(
        &mut self,
        listener: impl EventListener + 'static,
        filter: EventFilter,
        tag: Option<String>,
    ) -> u64 {
        self.bus.add_listener(listener, filter, tag)
    }

    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    /// Signals dropped as malformed or from devices that are not connected.
    pub fn dropped_events(&self) -> u64 {
        self.dropped
    }

    /// Persistence warnings accumulated by the registry.
    pub fn take_warnings(&mut self) -> Vec<InputError> {
        self.registry.take_warnings()
    }

    // --- registry & lifecycle ---

    pub fn discover(&mut self, device: Device) -> Result<()> {
        self.registry.upsert_discovered(device)
    }

    pub fn pair(&mut self, device: Device) -> Result<()> {
        self.registry.pair(device)
    }

    pub fn unpair(&mut self, device_id: &str, now_ms: u64) -> Result<Device> {
        let connected = self
            .registry
            .get(device_id)
            .ok_or_else(|| InputError::not_found(device_id))?
            .status
            != DeviceStatus::Disconnected;
        if connected {
            self.disconnect(device_id, now_ms)?;
        }
        self.registry.unpair(device_id)
    }

    /// Pair and handshake a device. On failure the device is left in `Error` and the typed
    /// error is returned; nothing else changes.
    pub fn connect(&mut self, device_id: &str, now_ms: u64) -> Result<()> {
        let before = self
            .registry
            .get(device_id)
            .ok_or_else(|| InputError::not_found(device_id))?
            .status;

        let pairing = &mut self.pairing;
        let mut built: Option<Box<dyn Normalizer>> = None;
        let result = self.registry.connect(device_id, |device| {
            pairing.pair(device)?;
            let mut normalizer = normalizer_for(device)?;
            normalizer.handshake(device)?;
            built = Some(normalizer);
            Ok(())
        });

        if let Some(normalizer) = built {
            self.normalizers.insert(device_id.to_string(), normalizer);
        }
        let after = self.registry.get(device_id).map(|d| d.status);
        if let Some(status) = after.filter(|s| *s != before) {
            self.emit_lifecycle(device_id, EventPayload::Status(status), now_ms);
        }
        result
    }

    /// Disconnect a device. If it was active, its scan is interrupted (the host gets a
    /// `ScanNotice::Interrupted`) and dwell stops.
    pub fn disconnect(&mut self, device_id: &str, now_ms: u64) -> Result<()> {
        let before = self
            .registry
            .get(device_id)
            .ok_or_else(|| InputError::not_found(device_id))?
            .status;
        let was_active = self.registry.disconnect(device_id)?;
        self.after_disconnect(device_id, was_active);
        if before != DeviceStatus::Disconnected {
            self.emit_lifecycle(
                device_id,
                EventPayload::Status(DeviceStatus::Disconnected),
                now_ms,
            );
        }
        Ok(())
    }

    /// Make `device_id` the active device and start its scan or dwell process.
    ///
    /// The previous process is torn down first. Fails without changing anything if the
    /// device is unknown or not connected.
    pub fn set_active(&mut self, device_id: &str) -> Result<()> {
        let previous = self.registry.set_active(device_id)?;
        if let Some(prev) = previous.filter(|p| p != device_id) {
            debug!("Handing off from {} to {}", prev, device_id);
            self.abort_calibration_for(&prev, "active device changed");
        }
        self.stop_processes(None);
        self.start_processes();
        Ok(())
    }

    /// No active device: scanning and dwell stop.
    pub fn clear_active(&mut self) -> Option<String> {
        let previous = self.registry.clear_active();
        if let Some(prev) = &previous {
            self.abort_calibration_for(prev, "active device cleared");
        }
        self.stop_processes(None);
        previous
    }

    /// Merge a settings patch. A connected device gets a fresh normalizer; the active device
    /// restarts its process with the new settings.
    ///
    /// A connected device must accept the merged settings before anything is committed; on
    /// error the record, the stored catalog, and the running normalizer are unchanged.
    pub fn update_settings(&mut self, device_id: &str, patch: &SettingsPatch) -> Result<Device> {
        let current = self
            .registry
            .get(device_id)
            .ok_or_else(|| InputError::not_found(device_id))?;
        let mut candidate = current.clone();
        candidate.settings = current.settings.apply(patch)?;

        let normalizer = if candidate.is_connected() {
            let mut normalizer = normalizer_for(&candidate)?;
            normalizer.handshake(&candidate)?;
            Some(normalizer)
        } else {
            None
        };

        let device = self.registry.update_settings(device_id, patch)?.clone();
        if let Some(normalizer) = normalizer {
            self.normalizers.insert(device.id.clone(), normalizer);
        }
        if self.registry.active_id() == Some(device_id) {
            self.stop_processes(None);
            self.start_processes();
        }
        Ok(device)
    }

    // --- input path ---

    /// Normalize and route one raw signal from `device_id`.
    pub fn handle_raw(&mut self, device_id: &str, raw: RawSignal, now_ms: u64) -> Handled {
        let Some(normalizer) = self.normalizers.get_mut(device_id) else {
            debug!("Dropping {:?} from {} (not connected)", raw, device_id);
            self.dropped += 1;
            return Handled::Dropped;
        };
        match normalizer.handle_raw(&raw, now_ms) {
            Ok(Some(event)) => self.handle_event(event, now_ms),
            Ok(None) => Handled::Consumed,
            Err(e) => {
                warn!("Dropping signal: {}", e);
                self.dropped += 1;
                Handled::Dropped
            }
        }
    }

    /// Route an already-normalized event. Events are validated first; invalid ones are
    /// logged and dropped, never propagated.
    pub fn handle_event(&mut self, event: DeviceEvent, now_ms: u64) -> Handled {
        let Some(device_type) = self.registry.get(event.device_id()).map(|d| d.device_type) else {
            debug!("Dropping event from unknown device {}", event.device_id());
            self.dropped += 1;
            return Handled::Dropped;
        };
        if let Err(e) = event.validate(device_type) {
            warn!("Dropping event: {}", e);
            self.dropped += 1;
            return Handled::Dropped;
        }
        self.bus.emit(&event);

        let device_id = event.device_id();
        match event.payload() {
            EventPayload::Status(status) => {
                self.apply_reported_status(device_id, *status);
                Handled::Consumed
            }
            EventPayload::Battery(level) => {
                if let Err(e) = self.registry.set_battery(device_id, *level) {
                    warn!("Battery update for {} failed: {}", device_id, e);
                }
                Handled::Consumed
            }
            EventPayload::Error(message) => {
                warn!("{} reported a fault: {}", device_id, message);
                self.apply_reported_status(device_id, DeviceStatus::Error);
                Handled::Consumed
            }
            _ if self.registry.active_id() != Some(device_id) => {
                debug!("Ignoring input from inactive device {}", device_id);
                Handled::Dropped
            }
            payload => self.route_input(device_id, payload, now_ms),
        }
    }

    /// Execute a canonical action on behalf of any source (keyboard shortcuts included).
    pub fn dispatch(&mut self, action: Action) -> Dispatched {
        let restart = self.restart_settings();
        dispatch_action(
            action,
            DispatchContext {
                scan: &mut self.scan,
                restart: restart.as_ref(),
                host: self.host.as_mut(),
            },
        )
    }

    fn route_input(&mut self, device_id: &str, payload: &EventPayload, now_ms: u64) -> Handled {
        match payload {
            EventPayload::Switch { switch_id, pressed } => {
                let Some(action) = self
                    .registry
                    .get(device_id)
                    .and_then(|d| d.settings.as_switch())
                    .and_then(|s| resolve_switch(&s.bindings, switch_id))
                else {
                    return Handled::Consumed;
                };
                let inverse = self.scan.settings().mode == ScanMode::Inverse;
                if inverse && action == Action::Select && !self.scan.is_idle() {
                    if *pressed {
                        self.scan.hold();
                        return Handled::Consumed;
                    }
                    return match self.scan.release(self.host.as_mut()) {
                        Some(target) => Handled::Action(action, Dispatched::Selected(target)),
                        None => Handled::Consumed,
                    };
                }
                if !pressed {
                    return Handled::Consumed;
                }
                Handled::Action(action, self.dispatch(action))
            }
            EventPayload::Gaze { x, y } => self.pointer_sample(device_id, *x, *y, false, now_ms),
            EventPayload::HeadMouse { x, y, click } => {
                self.pointer_sample(device_id, *x, *y, *click, now_ms)
            }
            EventPayload::JoystickMove { direction, .. } => {
                let action = direction.action();
                Handled::Action(action, self.dispatch(action))
            }
            EventPayload::JoystickButton { button_id, pressed } => {
                let action = self
                    .registry
                    .get(device_id)
                    .and_then(|d| d.settings.as_joystick())
                    .and_then(|s| resolve_button(&s.buttons, button_id));
                match action {
                    Some(action) if *pressed => Handled::Action(action, self.dispatch(action)),
                    _ => Handled::Consumed,
                }
            }
            EventPayload::Touch { action, .. }
            | EventPayload::SipPuff { action, .. }
            | EventPayload::Bioelectric { action, .. } => {
                Handled::Action(*action, self.dispatch(*action))
            }
            EventPayload::Status(_) | EventPayload::Battery(_) | EventPayload::Error(_) => {
                Handled::Consumed
            }
        }
    }

    fn pointer_sample(&mut self, device_id: &str, x: f32, y: f32, click: bool, now_ms: u64) -> Handled {
        if let Some(run) = self
            .calibration
            .as_mut()
            .filter(|r| r.device_id() == device_id)
        {
            if click {
                return Handled::Consumed;
            }
            match run.add_sample(x, y, now_ms, self.host.as_mut()) {
                Ok(SampleOutcome::Complete) => self.finish_calibration(now_ms),
                Ok(_) => {}
                Err(e) => self.abort_calibration(e),
            }
            return Handled::Consumed;
        }

        let Some(dwell) = self.dwell.as_mut() else {
            return Handled::Consumed;
        };
        let committed = if click {
            let (sx, sy) = self.smoother.current().unwrap_or((x, y));
            dwell.click(sx, sy, self.host.as_mut())
        } else {
            let (sx, sy) = self.smoother.push(x, y);
            dwell.update(sx, sy, now_ms, self.host.as_mut())
        };
        match committed {
            Some(target) => {
                self.host.activate_target(&target);
                Handled::Action(Action::Select, Dispatched::Selected(target))
            }
            None => Handled::Consumed,
        }
    }

    // --- scan timer ---

    /// Current timer plan and its generation.
    pub fn scan_timer(&self) -> (u64, TimerPlan) {
        (self.scan.timer_generation(), self.scan.timer_plan())
    }

    /// Timer expiry armed under `generation`. Stale generations are ignored.
    pub fn on_scan_timer(&mut self, generation: u64) -> bool {
        if generation != self.scan.timer_generation() {
            return false;
        }
        match self.scan.timer_plan() {
            TimerPlan::Repeating { .. } => self.scan.tick(self.host.as_mut()),
            TimerPlan::Rearm { .. } if self.registry.active_id().is_some() => {
                self.scan.rearm(self.host.as_mut());
            }
            TimerPlan::Rearm { .. } => self.scan.stop(self.host.as_mut()),
            TimerPlan::Off => return false,
        }
        true
    }

    /// Host-initiated pause (e.g. a modal dialog is up).
    pub fn pause_scan(&mut self) {
        self.scan.pause(self.host.as_mut());
    }

    pub fn resume_scan(&mut self) {
        self.scan.resume(self.host.as_mut());
    }

    /// Re-read the host's targets and restart scanning from the first one (screen changed).
    pub fn restart_scan(&mut self) -> bool {
        let Some(settings) = self.restart_settings() else {
            return false;
        };
        let targets = self.host.focusable_targets();
        self.scan.start(targets, settings, self.host.as_mut())
    }

    // --- calibration ---

    /// Start a nine-point calibration of a connected pointing device, making it active.
    ///
    /// A run already in progress is aborted first. The result arrives through
    /// [`take_calibration_result`](Self::take_calibration_result).
    pub fn begin_calibration(&mut self, device_id: &str, now_ms: u64) -> Result<()> {
        let device = self
            .registry
            .get(device_id)
            .ok_or_else(|| InputError::not_found(device_id))?;
        if !device.device_type.is_pointing() {
            return Err(InputError::UnsupportedDeviceType {
                device_type: device.device_type,
            });
        }
        if !device.is_connected() {
            return Err(InputError::DeviceNotConnected {
                device_id: device_id.to_string(),
            });
        }
        if self.calibration.is_some() {
            self.abort_calibration(InputError::aborted("superseded by a new run"));
        }
        if self.registry.active_id() != Some(device_id) {
            self.set_active(device_id)?;
        }
        self.calibration_result = None;
        self.calibration = Some(CalibrationRun::begin(
            device_id,
            self.config.screen,
            self.config.calibration.clone(),
            now_ms,
            self.host.as_mut(),
        ));
        Ok(())
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibration.is_some()
    }

    /// When the current calibration point times out.
    pub fn calibration_deadline(&self) -> Option<u64> {
        self.calibration.as_ref().map(CalibrationRun::deadline_ms)
    }

    /// Abort the run if its current point is past its deadline.
    pub fn check_calibration_timeout(&mut self, now_ms: u64) -> bool {
        let expired = match &self.calibration {
            Some(run) => run.check_timeout(now_ms).err(),
            None => None,
        };
        match expired {
            Some(e) => {
                self.abort_calibration(e);
                true
            }
            None => false,
        }
    }

    /// User abort. The committed calibration is untouched.
    pub fn cancel_calibration(&mut self) -> bool {
        if self.calibration.is_none() {
            return false;
        }
        self.abort_calibration(InputError::aborted("cancelled by user"));
        true
    }

    /// Outcome of the last finished or aborted run, once.
    pub fn take_calibration_result(&mut self) -> Option<Result<CalibrationOutcome>> {
        self.calibration_result.take()
    }

    fn finish_calibration(&mut self, now_ms: u64) {
        let Some(run) = self.calibration.take() else {
            return;
        };
        let device_id = run.device_id().to_string();
        let result = run.finish(now_ms).and_then(|outcome| {
            self.registry
                .commit_calibration(&device_id, outcome.calibration.clone())?;
            Ok(outcome)
        });
        self.calibration_result = Some(result);
    }

    fn abort_calibration(&mut self, reason: InputError) {
        if let Some(run) = self.calibration.take() {
            let err = run.abort(reason, self.host.as_mut());
            self.calibration_result = Some(Err(err));
        }
    }

    fn abort_calibration_for(&mut self, device_id: &str, reason: &str) {
        if self
            .calibration
            .as_ref()
            .is_some_and(|r| r.device_id() == device_id)
        {
            self.abort_calibration(InputError::aborted(reason));
        }
    }

    // --- status ---

    pub fn scanning_status(&self) -> ScanningStatus {
        self.scan.status(self.registry.active_id())
    }

    pub fn calibration_status(&self, device_id: &str) -> Result<CalibrationStatus> {
        let device = self
            .registry
            .get(device_id)
            .ok_or_else(|| InputError::not_found(device_id))?;
        let settings = device
            .settings
            .as_eye_tracker()
            .ok_or(InputError::UnsupportedDeviceType {
                device_type: device.device_type,
            })?;
        Ok(CalibrationStatus {
            device_id: device_id.to_string(),
            committed: settings.calibration.clone(),
            in_progress: self
                .calibration
                .as_ref()
                .filter(|r| r.device_id() == device_id)
                .map(CalibrationRun::progress),
        })
    }

    /// Copy of the per-target dwell timers.
    pub fn dwell_snapshot(&self) -> DwellSnapshot {
        self.dwell
            .as_ref()
            .map(DwellSelector::snapshot)
            .unwrap_or_default()
    }

    /// Stop every process and abandon calibration. Device records are left as they are.
    pub fn shutdown(&mut self) {
        self.abort_calibration(InputError::aborted("engine shut down"));
        self.stop_processes(None);
        info!("Input engine stopped");
    }

    // --- internals ---

    fn restart_settings(&self) -> Option<ScanSettings> {
        match process_for(self.registry.active_device()?) {
            Process::Scan(settings) => Some(settings),
            Process::Pointer(_) => None,
        }
    }

    fn start_processes(&mut self) {
        let Some(device) = self.registry.active_device() else {
            return;
        };
        match process_for(device) {
            Process::Scan(settings) => {
                let targets = self.host.focusable_targets();
                self.scan.start(targets, settings, self.host.as_mut());
            }
            Process::Pointer(settings) => {
                self.smoother = GazeSmoother::new(settings.gaze_smoothing_factor);
                self.dwell = Some(DwellSelector::new(settings.dwell_settings));
            }
        }
    }

    /// Tear down scan and dwell. With `interrupted`, the host is told why the scan stopped.
    fn stop_processes(&mut self, interrupted: Option<&str>) {
        match interrupted {
            Some(device_id) => {
                self.scan.interrupt(device_id, self.host.as_mut());
            }
            None => self.scan.stop(self.host.as_mut()),
        }
        self.dwell = None;
        self.smoother.reset();
    }

    fn after_disconnect(&mut self, device_id: &str, was_active: bool) {
        self.normalizers.remove(device_id);
        self.pairing.release(device_id);
        self.abort_calibration_for(device_id, "device disconnected");
        if was_active {
            self.stop_processes(Some(device_id));
        }
    }

    fn apply_reported_status(&mut self, device_id: &str, status: DeviceStatus) {
        let was_active = self.registry.active_id() == Some(device_id);
        match self.registry.apply_status(device_id, status) {
            Ok(DeviceStatus::Connected) => {}
            Ok(_) => self.after_disconnect(device_id, was_active),
            Err(e) => warn!("Status update for {} failed: {}", device_id, e),
        }
    }

    fn emit_lifecycle(&mut self, device_id: &str, payload: EventPayload, now_ms: u64) {
        self.bus.emit(&DeviceEvent::new(device_id, payload, now_ms));
    }
}
