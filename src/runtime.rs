//! tokio runtime around [`InputEngine`].
//!
//! One task owns the engine and drains a bounded command queue, so engine state is never
//! mutated concurrently. Around it:
//!
//! - a **scan timer task**, re-spawned whenever the scan engine publishes a new timer plan.
//!   Each tick carries the plan's generation; ticks from a replaced plan are ignored.
//! - a **calibration deadline task** for the point currently on screen.
//! - one **frame-paced poll task** per continuous source attached with
//!   [`EngineHandle::attach_source`]. Poll tasks hold only a weak sender, so they never keep
//!   the engine alive and wind down once it stops.
//!
//! Every task is independent and cancellable; aborting one never blocks another.
//!
//! ```no_run
//! # async fn demo(engine: switchscan::InputEngine) -> switchscan::Result<()> {
//! use switchscan::spawn_engine;
//!
//! let (handle, task) = spawn_engine(engine);
//! handle.connect("switch-box").await?;
//! handle.set_active("switch-box").await?;
//! // ...
//! handle.shutdown().await;
//! let _engine = task.await;
//! # Ok(())
//! # }
//! ```

use crate::calibration::CalibrationOutcome;
use crate::device::{Device, InputSource};
use crate::dispatch::Dispatched;
use crate::engine::InputEngine;
use crate::error::{InputError, Result};
use crate::event::{Action, DeviceEvent, RawSignal};
use crate::eventbus::{BroadcastListener, EventFilter};
use crate::scan::TimerPlan;
use crate::settings::SettingsPatch;
use crate::status::{CalibrationStatus, DwellSnapshot, ScanningStatus};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Capacity of the diagnostics broadcast stream.
const EVENT_STREAM_CAPACITY: usize = 1024;

type Reply<T> = oneshot::Sender<T>;

/// Requests processed by the engine task, in arrival order.
pub enum EngineCommand {
    Raw { device_id: String, signal: RawSignal },
    Event(DeviceEvent),
    Dispatch { action: Action, reply: Reply<Dispatched> },
    Discover { device: Device, reply: Reply<Result<()>> },
    Pair { device: Device, reply: Reply<Result<()>> },
    Unpair { device_id: String, reply: Reply<Result<Device>> },
    Connect { device_id: String, reply: Reply<Result<()>> },
    Disconnect { device_id: String, reply: Reply<Result<()>> },
    SetActive { device_id: String, reply: Reply<Result<()>> },
    ClearActive { reply: Reply<Option<String>> },
    UpdateSettings { device_id: String, patch: SettingsPatch, reply: Reply<Result<Device>> },
    PauseScan,
    ResumeScan,
    RestartScan,
    Calibrate { device_id: String, reply: Reply<Result<CalibrationOutcome>> },
    CancelCalibration { reply: Reply<bool> },
    ScanningStatus { reply: Reply<ScanningStatus> },
    CalibrationStatus { device_id: String, reply: Reply<Result<CalibrationStatus>> },
    DwellSnapshot { reply: Reply<DwellSnapshot> },
    ListDevices { reply: Reply<Vec<Device>> },
    TakeWarnings { reply: Reply<Vec<InputError>> },
    Shutdown,
}

/// Messages from the runtime's own timer tasks.
enum Internal {
    ScanTimer(u64),
    CalibrationDeadline,
}

/// Cloneable async front end to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
    events: broadcast::Sender<DeviceEvent>,
    frame_interval: Duration,
}

/// A running poll task for one continuous source.
pub struct SourceTask {
    device_id: String,
    task: JoinHandle<()>,
}

impl SourceTask {
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

/// Start the engine task. Must be called from within a tokio runtime.
///
/// The returned join handle yields the engine back after [`EngineHandle::shutdown`] or once
/// every handle is dropped.
pub fn spawn_engine(mut engine: InputEngine) -> (EngineHandle, JoinHandle<InputEngine>) {
    let capacity = engine.config().queue.capacity;
    let frame_interval = Duration::from_millis(engine.config().polling.frame_interval_ms);
    let (tx, rx) = mpsc::channel(capacity);
    let (internal_tx, internal_rx) = mpsc::channel(capacity);
    let (events, _) = broadcast::channel(EVENT_STREAM_CAPACITY);

    engine.add_listener(BroadcastListener::new(events.clone()), EventFilter::All, None);

    let state = EngineLoop {
        engine,
        started: Instant::now(),
        internal_tx,
        scan_timer: None,
        deadline_timer: None,
        pending_calibration: None,
    };
    let task = tokio::spawn(state.run(rx, internal_rx));
    (
        EngineHandle {
            tx,
            events,
            frame_interval,
        },
        task,
    )
}

impl EngineHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> EngineCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| InputError::EngineClosed)?;
        rx.await.map_err(|_| InputError::EngineClosed)
    }

    async fn send(&self, cmd: EngineCommand) -> Result<()> {
        self.tx.send(cmd).await.map_err(|_| InputError::EngineClosed)
    }

    /// Stream of every accepted [`DeviceEvent`], for diagnostics and telemetry.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    pub async fn submit_raw(&self, device_id: impl Into<String>, signal: RawSignal) -> Result<()> {
        self.send(EngineCommand::Raw {
            device_id: device_id.into(),
            signal,
        })
        .await
    }

    /// Non-blocking submit for platform callbacks. `Ok(false)` means the queue was full and
    /// the signal was dropped.
    pub fn try_submit_raw(&self, device_id: impl Into<String>, signal: RawSignal) -> Result<bool> {
        let cmd = EngineCommand::Raw {
            device_id: device_id.into(),
            signal,
        };
        match self.tx.try_send(cmd) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => {
                warn!("Input queue full; dropping signal");
                Ok(false)
            }
            Err(TrySendError::Closed(_)) => Err(InputError::EngineClosed),
        }
    }

    pub async fn submit_event(&self, event: DeviceEvent) -> Result<()> {
        self.send(EngineCommand::Event(event)).await
    }

    pub async fn dispatch(&self, action: Action) -> Result<Dispatched> {
        self.request(|reply| EngineCommand::Dispatch { action, reply })
            .await
    }

    pub async fn discover(&self, device: Device) -> Result<()> {
        self.request(|reply| EngineCommand::Discover { device, reply })
            .await?
    }

    pub async fn pair(&self, device: Device) -> Result<()> {
        self.request(|reply| EngineCommand::Pair { device, reply })
            .await?
    }

    pub async fn unpair(&self, device_id: impl Into<String>) -> Result<Device> {
        let device_id = device_id.into();
        self.request(|reply| EngineCommand::Unpair { device_id, reply })
            .await?
    }

    pub async fn connect(&self, device_id: impl Into<String>) -> Result<()> {
        let device_id = device_id.into();
        self.request(|reply| EngineCommand::Connect { device_id, reply })
            .await?
    }

    pub async fn disconnect(&self, device_id: impl Into<String>) -> Result<()> {
        let device_id = device_id.into();
        self.request(|reply| EngineCommand::Disconnect { device_id, reply })
            .await?
    }

    pub async fn set_active(&self, device_id: impl Into<String>) -> Result<()> {
        let device_id = device_id.into();
        self.request(|reply| EngineCommand::SetActive { device_id, reply })
            .await?
    }

    pub async fn clear_active(&self) -> Result<Option<String>> {
        self.request(|reply| EngineCommand::ClearActive { reply })
            .await
    }

    pub async fn update_settings(
        &self,
        device_id: impl Into<String>,
        patch: SettingsPatch,
    ) -> Result<Device> {
        let device_id = device_id.into();
        self.request(|reply| EngineCommand::UpdateSettings {
            device_id,
            patch,
            reply,
        })
        .await?
    }

    pub async fn pause_scan(&self) -> Result<()> {
        self.send(EngineCommand::PauseScan).await
    }

    pub async fn resume_scan(&self) -> Result<()> {
        self.send(EngineCommand::ResumeScan).await
    }

    pub async fn restart_scan(&self) -> Result<()> {
        self.send(EngineCommand::RestartScan).await
    }

    /// Run a full calibration. Resolves once all points are scored, a point times out, or
    /// the run is cancelled; only the first case changes the stored calibration.
    pub async fn calibrate(&self, device_id: impl Into<String>) -> Result<CalibrationOutcome> {
        let device_id = device_id.into();
        self.request(|reply| EngineCommand::Calibrate { device_id, reply })
            .await?
    }

    pub async fn cancel_calibration(&self) -> Result<bool> {
        self.request(|reply| EngineCommand::CancelCalibration { reply })
            .await
    }

    pub async fn scanning_status(&self) -> Result<ScanningStatus> {
        self.request(|reply| EngineCommand::ScanningStatus { reply })
            .await
    }

    pub async fn calibration_status(&self, device_id: impl Into<String>) -> Result<CalibrationStatus> {
        let device_id = device_id.into();
        self.request(|reply| EngineCommand::CalibrationStatus { device_id, reply })
            .await?
    }

    pub async fn dwell_snapshot(&self) -> Result<DwellSnapshot> {
        self.request(|reply| EngineCommand::DwellSnapshot { reply })
            .await
    }

    pub async fn list_devices(&self) -> Result<Vec<Device>> {
        self.request(|reply| EngineCommand::ListDevices { reply })
            .await
    }

    pub async fn take_warnings(&self) -> Result<Vec<InputError>> {
        self.request(|reply| EngineCommand::TakeWarnings { reply })
            .await
    }

    /// Ask the engine task to stop. Await its join handle to get the engine back.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(EngineCommand::Shutdown).await;
    }

    /// Poll `source` once per frame and feed its signals to the engine.
    pub fn attach_source<S>(&self, mut source: S) -> SourceTask
    where
        S: InputSource + Send + 'static,
    {
        let device_id = source.id().to_string();
        let weak = self.tx.downgrade();
        let period = self.frame_interval;
        let id = device_id.clone();
        let task = tokio::spawn(async move {
            let mut frames = tokio::time::interval(period);
            frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
            debug!("Polling {} ({}) every {:?}", source.name(), id, period);
            loop {
                frames.tick().await;
                let Some(tx) = weak.upgrade() else {
                    break;
                };
                if tx.is_closed() {
                    break;
                }
                for signal in source.poll() {
                    let cmd = EngineCommand::Raw {
                        device_id: id.clone(),
                        signal,
                    };
                    if tx.send(cmd).await.is_err() {
                        return;
                    }
                }
            }
            debug!("Poll task for {} finished", id);
        });
        SourceTask { device_id, task }
    }
}

struct EngineLoop {
    engine: InputEngine,
    started: Instant,
    internal_tx: mpsc::Sender<Internal>,
    /// Generation the running timer task was armed for.
    scan_timer: Option<(u64, Option<JoinHandle<()>>)>,
    deadline_timer: Option<(u64, JoinHandle<()>)>,
    pending_calibration: Option<Reply<Result<CalibrationOutcome>>>,
}

impl EngineLoop {
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<EngineCommand>,
        mut internal_rx: mpsc::Receiver<Internal>,
    ) -> InputEngine {
        info!("Input engine running");
        self.settle();
        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(EngineCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(msg) = internal_rx.recv() => self.handle_internal(msg),
            }
            self.settle();
        }

        if let Some((_, Some(task))) = self.scan_timer.take() {
            task.abort();
        }
        if let Some((_, task)) = self.deadline_timer.take() {
            task.abort();
        }
        self.engine.shutdown();
        self.settle_calibration();
        self.engine
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn handle_command(&mut self, cmd: EngineCommand) {
        let now = self.now_ms();
        let engine = &mut self.engine;
        match cmd {
            EngineCommand::Raw { device_id, signal } => {
                engine.handle_raw(&device_id, signal, now);
            }
            EngineCommand::Event(event) => {
                engine.handle_event(event, now);
            }
            EngineCommand::Dispatch { action, reply } => {
                let _ = reply.send(engine.dispatch(action));
            }
            EngineCommand::Discover { device, reply } => {
                let _ = reply.send(engine.discover(device));
            }
            EngineCommand::Pair { device, reply } => {
                let _ = reply.send(engine.pair(device));
            }
            EngineCommand::Unpair { device_id, reply } => {
                let _ = reply.send(engine.unpair(&device_id, now));
            }
            EngineCommand::Connect { device_id, reply } => {
                let _ = reply.send(engine.connect(&device_id, now));
            }
            EngineCommand::Disconnect { device_id, reply } => {
                let _ = reply.send(engine.disconnect(&device_id, now));
            }
            EngineCommand::SetActive { device_id, reply } => {
                let _ = reply.send(engine.set_active(&device_id));
            }
            EngineCommand::ClearActive { reply } => {
                let _ = reply.send(engine.clear_active());
            }
            EngineCommand::UpdateSettings {
                device_id,
                patch,
                reply,
            } => {
                let _ = reply.send(engine.update_settings(&device_id, &patch));
            }
            EngineCommand::PauseScan => engine.pause_scan(),
            EngineCommand::ResumeScan => engine.resume_scan(),
            EngineCommand::RestartScan => {
                engine.restart_scan();
            }
            EngineCommand::Calibrate { device_id, reply } => {
                if self.pending_calibration.is_some() {
                    self.engine.cancel_calibration();
                    self.settle_calibration();
                }
                match self.engine.begin_calibration(&device_id, now) {
                    Ok(()) => self.pending_calibration = Some(reply),
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            EngineCommand::CancelCalibration { reply } => {
                let _ = reply.send(engine.cancel_calibration());
            }
            EngineCommand::ScanningStatus { reply } => {
                let _ = reply.send(engine.scanning_status());
            }
            EngineCommand::CalibrationStatus { device_id, reply } => {
                let _ = reply.send(engine.calibration_status(&device_id));
            }
            EngineCommand::DwellSnapshot { reply } => {
                let _ = reply.send(engine.dwell_snapshot());
            }
            EngineCommand::ListDevices { reply } => {
                let _ = reply.send(engine.list_devices().to_vec());
            }
            EngineCommand::TakeWarnings { reply } => {
                let _ = reply.send(engine.take_warnings());
            }
            EngineCommand::Shutdown => {}
        }
    }

    fn handle_internal(&mut self, msg: Internal) {
        match msg {
            Internal::ScanTimer(generation) => {
                if !self.engine.on_scan_timer(generation) {
                    debug!("Stale scan tick (generation {})", generation);
                }
            }
            Internal::CalibrationDeadline => {
                let now = self.now_ms();
                self.engine.check_calibration_timeout(now);
            }
        }
    }

    /// Bring timer tasks and pending replies in line with the engine's state.
    fn settle(&mut self) {
        self.settle_calibration();
        self.sync_scan_timer();
        self.sync_deadline_timer();
    }

    fn settle_calibration(&mut self) {
        if let Some(result) = self.engine.take_calibration_result() {
            match self.pending_calibration.take() {
                Some(reply) => {
                    let _ = reply.send(result);
                }
                None => debug!("Calibration finished with nobody waiting"),
            }
        }
    }

    fn sync_scan_timer(&mut self) {
        let (generation, plan) = self.engine.scan_timer();
        if self.scan_timer.as_ref().map(|(g, _)| *g) == Some(generation) {
            return;
        }
        if let Some((_, Some(task))) = self.scan_timer.take() {
            task.abort();
        }
        let tx = self.internal_tx.clone();
        let task = match plan {
            TimerPlan::Off => None,
            TimerPlan::Repeating {
                first_ms,
                period_ms,
            } => Some(tokio::spawn(async move {
                let start = Instant::now() + Duration::from_millis(first_ms);
                let mut ticks = tokio::time::interval_at(start, Duration::from_millis(period_ms));
                ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticks.tick().await;
                    if tx.send(Internal::ScanTimer(generation)).await.is_err() {
                        break;
                    }
                }
            })),
            TimerPlan::Rearm { delay_ms } => Some(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                let _ = tx.send(Internal::ScanTimer(generation)).await;
            })),
        };
        self.scan_timer = Some((generation, task));
    }

    fn sync_deadline_timer(&mut self) {
        let wanted = self.engine.calibration_deadline();
        let current = self.deadline_timer.as_ref().map(|(d, _)| *d);
        if wanted == current {
            return;
        }
        if let Some((_, task)) = self.deadline_timer.take() {
            task.abort();
        }
        if let Some(deadline) = wanted {
            let at = self.started + Duration::from_millis(deadline);
            let tx = self.internal_tx.clone();
            let task = tokio::spawn(async move {
                tokio::time::sleep_until(at).await;
                let _ = tx.send(Internal::CalibrationDeadline).await;
            });
            self.deadline_timer = Some((deadline, task));
        }
    }
}
