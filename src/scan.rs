//! Switch-access scan engine.
//!
//! ```text
//!            start (targets non-empty)
//!   Idle ─────────────────────────────► Scanning(i) ◄──────┐
//!    ▲                                   │   │  tick/Next/Prev: i ± 1 mod n
//!    │ stop / interrupt / exhausted      │   │             │
//!    └───────────────────────────────────┘   │ Select      │ rearm (after delay,
//!                                            ▼             │  restarts at 0)
//!                                         Paused(i) ───────┘
//! ```
//!
//! The engine does not own a clock. It publishes a [`TimerPlan`] plus a generation number;
//! whoever drives it (the runtime's timer task, or a test) calls [`ScanEngine::tick`] /
//! [`ScanEngine::rearm`] when the plan says so. Any change of plan bumps the generation,
//! so ticks armed under an older plan can be recognised and dropped.
//!
//! All per-tick work is O(1) in the number of targets.

use crate::host::{FeedbackCue, Host, ScanNotice, TargetId};
use crate::settings::{ScanMode, ScanSettings};
use crate::status::ScanningStatus;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One focusable element and its position in scan order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTarget {
    pub id: TargetId,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanState {
    Idle,
    Scanning { index: usize },
    Paused { index: usize },
}

/// What the timer driving the engine should currently be doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerPlan {
    Off,
    /// Call `tick` after `first_ms`, then every `period_ms`.
    Repeating { first_ms: u64, period_ms: u64 },
    /// Call `rearm` once after `delay_ms`.
    Rearm { delay_ms: u64 },
}

pub struct ScanEngine {
    state: ScanState,
    targets: Vec<ScanTarget>,
    settings: ScanSettings,
    cycles: u32,
    /// Inverse mode: the select switch is currently held.
    held: bool,
    timer: TimerPlan,
    generation: u64,
    rearm_delay_ms: u64,
}

impl ScanEngine {
    pub fn new(rearm_delay_ms: u64) -> Self {
        Self {
            state: ScanState::Idle,
            targets: Vec::new(),
            settings: ScanSettings::default(),
            cycles: 0,
            held: false,
            timer: TimerPlan::Off,
            generation: 0,
            rearm_delay_ms,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == ScanState::Idle
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub fn targets(&self) -> &[ScanTarget] {
        &self.targets
    }

    /// Completed traversals since scanning (re)started or the user last moved the cursor.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn timer_plan(&self) -> TimerPlan {
        self.timer
    }

    pub fn timer_generation(&self) -> u64 {
        self.generation
    }

    /// Currently highlighted target, while scanning.
    pub fn highlighted(&self) -> Option<&ScanTarget> {
        match self.state {
            ScanState::Scanning { index } => self.targets.get(index),
            _ => None,
        }
    }

    /// Begin scanning `targets` from the first one. An empty list leaves the engine Idle.
    pub fn start(&mut self, targets: Vec<TargetId>, settings: ScanSettings, host: &mut dyn Host) -> bool {
        self.stop(host);
        if targets.is_empty() {
            debug!("No focusable targets; scan stays idle");
            return false;
        }
        self.targets = targets
            .into_iter()
            .enumerate()
            .map(|(index, id)| ScanTarget { id, index })
            .collect();
        self.settings = settings;
        self.cycles = 0;
        self.held = false;
        self.state = ScanState::Scanning { index: 0 };
        self.highlight(0, true, host);

        let plan = match self.settings.mode {
            ScanMode::Automatic => self.repeating(true),
            ScanMode::Step | ScanMode::Inverse => TimerPlan::Off,
        };
        self.set_timer(plan);
        info!(
            "Scanning {} target(s) in {:?} mode",
            self.targets.len(),
            self.settings.mode
        );
        true
    }

    /// Any state → Idle. Un-highlights the current target.
    pub fn stop(&mut self, host: &mut dyn Host) {
        if let ScanState::Scanning { index } = self.state {
            self.highlight(index, false, host);
        }
        if self.state != ScanState::Idle {
            debug!("Scan stopped");
        }
        self.state = ScanState::Idle;
        self.held = false;
        self.set_timer(TimerPlan::Off);
    }

    /// Stop because the driving device went away, and tell the host.
    pub fn interrupt(&mut self, device_id: &str, host: &mut dyn Host) -> bool {
        if self.is_idle() {
            return false;
        }
        self.stop(host);
        info!("Scan interrupted: {} disconnected", device_id);
        host.scan_notice(ScanNotice::Interrupted {
            device_id: device_id.to_string(),
        });
        true
    }

    /// Timer step: advance one target, counting completed traversals.
    pub fn tick(&mut self, host: &mut dyn Host) {
        let ScanState::Scanning { index } = self.state else {
            return;
        };
        let len = self.targets.len();
        let next = (index + 1) % len;
        if next == 0 {
            self.cycles += 1;
            let limit = self.settings.loop_count;
            if limit > 0 && self.cycles >= limit {
                self.highlight(index, false, host);
                self.state = ScanState::Idle;
                self.held = false;
                self.set_timer(TimerPlan::Off);
                info!("Scan exhausted after {} cycle(s)", self.cycles);
                host.scan_notice(ScanNotice::Exhausted {
                    cycles: self.cycles,
                });
                return;
            }
        }
        self.move_to(index, next, host);
    }

    pub fn next(&mut self, host: &mut dyn Host) -> bool {
        self.step(1, host)
    }

    pub fn previous(&mut self, host: &mut dyn Host) -> bool {
        self.step(-1, host)
    }

    /// Commit the highlighted target and pause until the re-arm delay has passed.
    pub fn select(&mut self, host: &mut dyn Host) -> Option<TargetId> {
        let ScanState::Scanning { index } = self.state else {
            debug!("Select ignored: nothing highlighted");
            return None;
        };
        let target = self.targets[index].id.clone();
        self.highlight(index, false, host);
        host.activate_target(&target);
        if self.settings.sound_feedback {
            host.play_feedback(FeedbackCue::Commit);
        }
        self.state = ScanState::Paused { index };
        self.held = false;
        self.set_timer(TimerPlan::Rearm {
            delay_ms: self.rearm_delay_ms,
        });
        info!("Scan selected {}", target);
        Some(target)
    }

    /// Restart from the first target after a selection, using the host's current targets.
    pub fn rearm(&mut self, host: &mut dyn Host) -> bool {
        if !matches!(self.state, ScanState::Paused { .. })
            || !matches!(self.timer, TimerPlan::Rearm { .. })
        {
            return false;
        }
        let targets = host.focusable_targets();
        let settings = self.settings.clone();
        self.start(targets, settings, host)
    }

    /// Hold the scan in place (host-initiated, e.g. a modal dialog).
    pub fn pause(&mut self, host: &mut dyn Host) {
        if let ScanState::Scanning { index } = self.state {
            self.highlight(index, false, host);
            self.state = ScanState::Paused { index };
            self.held = false;
            self.set_timer(TimerPlan::Off);
        }
    }

    pub fn resume(&mut self, host: &mut dyn Host) {
        let ScanState::Paused { index } = self.state else {
            return;
        };
        if matches!(self.timer, TimerPlan::Rearm { .. }) {
            self.rearm(host);
            return;
        }
        self.state = ScanState::Scanning { index };
        self.highlight(index, true, host);
        let plan = match self.settings.mode {
            ScanMode::Automatic => self.repeating(false),
            _ => TimerPlan::Off,
        };
        self.set_timer(plan);
    }

    /// Inverse mode: the select switch went down; start advancing.
    pub fn hold(&mut self) {
        if self.settings.mode != ScanMode::Inverse || self.held {
            return;
        }
        if matches!(self.state, ScanState::Scanning { .. }) {
            self.held = true;
            self.cycles = 0;
            let plan = self.repeating(false);
            self.set_timer(plan);
        }
    }

    /// Inverse mode: the select switch came up; commit what is highlighted.
    pub fn release(&mut self, host: &mut dyn Host) -> Option<TargetId> {
        if self.settings.mode != ScanMode::Inverse || !self.held {
            return None;
        }
        self.held = false;
        self.select(host)
    }

    fn step(&mut self, delta: isize, host: &mut dyn Host) -> bool {
        let ScanState::Scanning { index } = self.state else {
            debug!("Step ignored while {:?}", self.state);
            return false;
        };
        let len = self.targets.len() as isize;
        let next = (index as isize + delta).rem_euclid(len) as usize;
        self.cycles = 0;
        self.move_to(index, next, host);
        if matches!(self.timer, TimerPlan::Repeating { .. }) {
            // restart the period so the new highlight gets a full interval
            let plan = self.repeating(false);
            self.set_timer(plan);
        }
        true
    }

    fn move_to(&mut self, from: usize, to: usize, host: &mut dyn Host) {
        self.highlight(from, false, host);
        self.state = ScanState::Scanning { index: to };
        self.highlight(to, true, host);
        if self.settings.sound_feedback {
            host.play_feedback(FeedbackCue::ScanStep);
        }
    }

    fn highlight(&self, index: usize, on: bool, host: &mut dyn Host) {
        if !self.settings.visual_feedback {
            return;
        }
        if let Some(target) = self.targets.get(index) {
            host.show_scan_highlight(&target.id, on);
        }
    }

    fn repeating(&self, first: bool) -> TimerPlan {
        let period_ms = u64::from(self.settings.scan_speed_ms.max(1));
        let first_ms = if first && self.settings.first_delay_ms > 0 {
            u64::from(self.settings.first_delay_ms)
        } else {
            period_ms
        };
        TimerPlan::Repeating {
            first_ms,
            period_ms,
        }
    }

    fn set_timer(&mut self, plan: TimerPlan) {
        if plan == TimerPlan::Off && self.timer == TimerPlan::Off {
            return;
        }
        self.timer = plan;
        self.generation += 1;
    }
}

impl ScanEngine {
    pub fn status(&self, device_id: Option<&str>) -> ScanningStatus {
        ScanningStatus {
            state: self.state,
            mode: self.settings.mode,
            highlighted: self.highlighted().map(|t| t.id.clone()),
            target_count: self.targets.len(),
            cycles: self.cycles,
            device_id: device_id.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostCall, RecordingHost};

    fn targets() -> Vec<TargetId> {
        vec!["T1".into(), "T2".into(), "T3".into()]
    }

    fn settings(mode: ScanMode, loop_count: u32) -> ScanSettings {
        ScanSettings {
            mode,
            scan_speed_ms: 1000,
            loop_count,
            first_delay_ms: 0,
            sound_feedback: false,
            visual_feedback: true,
        }
    }

    #[test]
    fn empty_target_list_stays_idle() {
        let mut host = RecordingHost::default();
        let mut scan = ScanEngine::new(500);
        assert!(!scan.start(Vec::new(), settings(ScanMode::Automatic, 0), &mut host));
        assert_eq!(scan.state(), ScanState::Idle);
        assert_eq!(scan.timer_plan(), TimerPlan::Off);
        assert!(host.calls().is_empty());
    }

    #[test]
    fn two_ticks_highlight_third_target() {
        let mut host = RecordingHost::default();
        let mut scan = ScanEngine::new(500);
        scan.start(targets(), settings(ScanMode::Automatic, 0), &mut host);
        assert_eq!(
            scan.timer_plan(),
            TimerPlan::Repeating {
                first_ms: 1000,
                period_ms: 1000
            }
        );
        scan.tick(&mut host);
        scan.tick(&mut host);
        assert_eq!(scan.state(), ScanState::Scanning { index: 2 });
        assert_eq!(host.highlighted().as_deref(), Some("T3"));
    }

    #[test]
    fn loop_count_exhausts_exactly_once() {
        let mut host = RecordingHost::default();
        let mut scan = ScanEngine::new(500);
        scan.start(targets(), settings(ScanMode::Automatic, 2), &mut host);
        for _ in 0..6 {
            scan.tick(&mut host);
        }
        assert_eq!(scan.state(), ScanState::Idle);
        assert_eq!(scan.timer_plan(), TimerPlan::Off);
        // further ticks are inert
        scan.tick(&mut host);
        scan.tick(&mut host);
        assert_eq!(host.notices(), vec![ScanNotice::Exhausted { cycles: 2 }]);
        assert_eq!(host.highlighted(), None);
    }

    #[test]
    fn select_commits_current_index_after_steps() {
        let mut host = RecordingHost::default();
        let mut scan = ScanEngine::new(500);
        scan.start(targets(), settings(ScanMode::Automatic, 0), &mut host);
        scan.next(&mut host);
        scan.next(&mut host);
        scan.next(&mut host); // wraps to T1
        scan.previous(&mut host); // T3
        assert_eq!(scan.select(&mut host).as_deref(), Some("T3"));
        assert_eq!(host.activations(), vec!["T3".to_string()]);
        assert_eq!(scan.state(), ScanState::Paused { index: 2 });
        assert_eq!(scan.timer_plan(), TimerPlan::Rearm { delay_ms: 500 });
    }

    #[test]
    fn rearm_restarts_from_first_target() {
        let mut host = RecordingHost::new(["A", "B"]);
        let mut scan = ScanEngine::new(500);
        scan.start(targets(), settings(ScanMode::Automatic, 0), &mut host);
        scan.tick(&mut host);
        scan.select(&mut host);
        assert!(scan.rearm(&mut host));
        assert_eq!(scan.state(), ScanState::Scanning { index: 0 });
        assert_eq!(scan.highlighted().map(|t| t.id.as_str()), Some("A"));
        // a second rearm is not pending any more
        assert!(!scan.rearm(&mut host));
    }

    #[test]
    fn manual_step_restarts_timer_generation() {
        let mut host = RecordingHost::default();
        let mut scan = ScanEngine::new(500);
        scan.start(targets(), settings(ScanMode::Automatic, 0), &mut host);
        let before = scan.timer_generation();
        scan.next(&mut host);
        assert!(scan.timer_generation() > before);
    }

    #[test]
    fn step_mode_never_arms_timer() {
        let mut host = RecordingHost::default();
        let mut scan = ScanEngine::new(500);
        scan.start(targets(), settings(ScanMode::Step, 0), &mut host);
        assert_eq!(scan.timer_plan(), TimerPlan::Off);
        scan.next(&mut host);
        assert_eq!(scan.timer_plan(), TimerPlan::Off);
        assert_eq!(host.highlighted().as_deref(), Some("T2"));
    }

    #[test]
    fn inverse_mode_scans_while_held_and_commits_on_release() {
        let mut host = RecordingHost::default();
        let mut scan = ScanEngine::new(500);
        scan.start(targets(), settings(ScanMode::Inverse, 0), &mut host);
        assert_eq!(scan.timer_plan(), TimerPlan::Off);
        scan.hold();
        assert!(matches!(scan.timer_plan(), TimerPlan::Repeating { .. }));
        scan.tick(&mut host);
        assert_eq!(scan.release(&mut host).as_deref(), Some("T2"));
        assert_eq!(host.activations(), vec!["T2".to_string()]);
    }

    #[test]
    fn interrupt_goes_idle_and_notifies() {
        let mut host = RecordingHost::default();
        let mut scan = ScanEngine::new(500);
        scan.start(targets(), settings(ScanMode::Automatic, 0), &mut host);
        scan.tick(&mut host);
        assert!(scan.interrupt("sw-1", &mut host));
        assert!(scan.is_idle());
        assert_eq!(
            host.notices(),
            vec![ScanNotice::Interrupted {
                device_id: "sw-1".into()
            }]
        );
        let highlights = host.highlight_count();
        scan.tick(&mut host);
        assert_eq!(host.highlight_count(), highlights);
        assert_eq!(host.highlighted(), None);
    }

    #[test]
    fn pause_and_resume_keep_position() {
        let mut host = RecordingHost::default();
        let mut scan = ScanEngine::new(500);
        scan.start(targets(), settings(ScanMode::Automatic, 0), &mut host);
        scan.tick(&mut host);
        scan.pause(&mut host);
        assert_eq!(scan.timer_plan(), TimerPlan::Off);
        scan.tick(&mut host);
        scan.resume(&mut host);
        assert_eq!(scan.state(), ScanState::Scanning { index: 1 });
    }

    #[test]
    fn first_delay_applies_to_first_highlight_only() {
        let mut host = RecordingHost::default();
        let mut scan = ScanEngine::new(500);
        let mut s = settings(ScanMode::Automatic, 0);
        s.first_delay_ms = 2500;
        scan.start(targets(), s, &mut host);
        assert_eq!(
            scan.timer_plan(),
            TimerPlan::Repeating {
                first_ms: 2500,
                period_ms: 1000
            }
        );
    }

    #[test]
    fn sound_feedback_plays_cue_per_step() {
        let mut host = RecordingHost::default();
        let mut scan = ScanEngine::new(500);
        let mut s = settings(ScanMode::Automatic, 0);
        s.sound_feedback = true;
        s.visual_feedback = false;
        scan.start(targets(), s, &mut host);
        scan.tick(&mut host);
        assert_eq!(host.calls(), vec![HostCall::Feedback(FeedbackCue::ScanStep)]);
    }
}
