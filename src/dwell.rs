//! Gaze smoothing and dwell selection for pointing devices (eye trackers, head mice).
//!
//! # Smoothing
//! [`GazeSmoother`] is a one-pole low-pass filter:
//! `smoothed = prev + (raw - prev) * (1 - factor)`, seeded with the first raw sample.
//! With `factor` in `[0, 1)` a constant input converges monotonically, so there is no
//! overshoot or oscillation.
//!
//! # Dwell
//! [`DwellSelector`] hit-tests each smoothed point through the host and keeps one timer per
//! target. Progress is `min((now - start) / dwell_time, 1)` while the hit target is
//! unchanged. Reaching 1 commits the target and clears its entry. Moving to another
//! target (or to empty space) drops the stale entry immediately.
//!
//! After a commit the same target cannot start a new dwell until the point leaves
//! `dwell_radius_px` of where the commit happened, or the hit target changes. Without that
//! guard a user who keeps looking at a key would type it once per `dwell_time`.

use crate::host::{Host, TargetId};
use crate::settings::DwellSettings;
use crate::status::{DwellProgress, DwellSnapshot};
use std::collections::HashMap;
use tracing::{debug, trace};

#[derive(Debug, Clone, Default)]
pub struct GazeSmoother {
    factor: f32,
    prev: Option<(f32, f32)>,
}

impl GazeSmoother {
    pub fn new(factor: f32) -> Self {
        Self {
            factor: factor.clamp(0.0, 0.999),
            prev: None,
        }
    }

    pub fn push(&mut self, x: f32, y: f32) -> (f32, f32) {
        let next = match self.prev {
            None => (x, y),
            Some((px, py)) => {
                let k = 1.0 - self.factor;
                (px + (x - px) * k, py + (y - py) * k)
            }
        };
        self.prev = Some(next);
        next
    }

    /// Last smoothed point.
    pub fn current(&self) -> Option<(f32, f32)> {
        self.prev
    }

    pub fn reset(&mut self) {
        self.prev = None;
    }
}

#[derive(Debug, Clone, Copy)]
struct DwellEntry {
    started_ms: u64,
    progress: f32,
}

#[derive(Debug, Clone)]
struct CommitGuard {
    target: TargetId,
    x: f32,
    y: f32,
}

pub struct DwellSelector {
    settings: DwellSettings,
    entries: HashMap<TargetId, DwellEntry>,
    current: Option<TargetId>,
    guard: Option<CommitGuard>,
}

impl DwellSelector {
    pub fn new(settings: DwellSettings) -> Self {
        Self {
            settings,
            entries: HashMap::new(),
            current: None,
            guard: None,
        }
    }

    pub fn settings(&self) -> &DwellSettings {
        &self.settings
    }

    /// Target under the pointer as of the last update.
    pub fn current_target(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Feed one smoothed point. Returns the target committed by this update, if any.
    pub fn update(&mut self, x: f32, y: f32, now_ms: u64, host: &mut dyn Host) -> Option<TargetId> {
        let hit = host.target_at_point(x, y);

        if let Some(guard) = &self.guard {
            let same = hit.as_deref() == Some(guard.target.as_str());
            if same && (x - guard.x).hypot(y - guard.y) <= self.settings.dwell_radius_px {
                return None;
            }
            trace!("Dwell guard on {} released", guard.target);
            self.guard = None;
        }

        if hit != self.current {
            if let Some(stale) = self.current.take() {
                self.entries.remove(&stale);
            }
            self.current = hit.clone();
        }
        let target = hit?;

        let entry = self.entries.entry(target.clone()).or_insert(DwellEntry {
            started_ms: now_ms,
            progress: 0.0,
        });
        let elapsed = now_ms.saturating_sub(entry.started_ms) as f32;
        let dwell = self.settings.dwell_time_ms.max(1) as f32;
        entry.progress = entry.progress.max((elapsed / dwell).min(1.0));
        let progress = entry.progress;

        if self.settings.show_feedback {
            host.show_dwell_feedback(&target, progress);
        }
        if progress < 1.0 {
            return None;
        }

        self.entries.remove(&target);
        self.guard = Some(CommitGuard {
            target: target.clone(),
            x,
            y,
        });
        debug!("Dwell committed {}", target);
        Some(target)
    }

    /// Pointer click (head mouse): select whatever is under the point right now.
    pub fn click(&mut self, x: f32, y: f32, host: &mut dyn Host) -> Option<TargetId> {
        let target = host.target_at_point(x, y)?;
        self.entries.remove(&target);
        self.guard = Some(CommitGuard {
            target: target.clone(),
            x,
            y,
        });
        debug!("Click selected {}", target);
        Some(target)
    }

    pub fn snapshot(&self) -> DwellSnapshot {
        let mut items: Vec<DwellProgress> = self
            .entries
            .iter()
            .map(|(target, e)| DwellProgress {
                target: target.clone(),
                started_ms: e.started_ms,
                progress: e.progress,
            })
            .collect();
        items.sort_by(|a, b| a.target.cmp(&b.target));
        DwellSnapshot(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RecordingHost;

    fn host() -> RecordingHost {
        let host = RecordingHost::default();
        host.add_region("T", 0.0, 0.0, 200.0, 200.0);
        host.add_region("U", 300.0, 0.0, 200.0, 200.0);
        host
    }

    fn selector() -> DwellSelector {
        DwellSelector::new(DwellSettings {
            dwell_time_ms: 1000,
            dwell_radius_px: 50.0,
            show_feedback: true,
        })
    }

    #[test]
    fn smoother_seeds_with_first_sample_and_converges() {
        let mut s = GazeSmoother::new(0.5);
        assert_eq!(s.push(100.0, 100.0), (100.0, 100.0));
        let mut last = s.push(200.0, 100.0);
        assert_eq!(last, (150.0, 100.0));
        for _ in 0..60 {
            let next = s.push(200.0, 100.0);
            assert!(next.0 >= last.0 && next.0 <= 200.0);
            last = next;
        }
        assert!((last.0 - 200.0).abs() < 1e-3);
    }

    #[test]
    fn constant_input_after_seed_stays_put() {
        let mut s = GazeSmoother::new(0.8);
        s.push(42.0, 7.0);
        for _ in 0..10 {
            assert_eq!(s.push(42.0, 7.0), (42.0, 7.0));
        }
    }

    #[test]
    fn fixed_gaze_commits_exactly_once() {
        let mut h = host();
        let mut d = selector();
        let mut commits = Vec::new();
        for t in (0..=3000).step_by(50) {
            if let Some(c) = d.update(100.0, 100.0, t, &mut h) {
                commits.push((c, t));
            }
        }
        assert_eq!(commits, vec![("T".to_string(), 1000)]);
    }

    #[test]
    fn progress_is_monotonic_and_resets_on_target_change() {
        let mut h = host();
        let mut d = selector();
        d.update(100.0, 100.0, 0, &mut h);
        d.update(100.0, 100.0, 400, &mut h);
        assert_eq!(d.snapshot().get("T").map(|p| p.progress), Some(0.4));

        d.update(400.0, 100.0, 500, &mut h);
        assert!(d.snapshot().get("T").is_none());
        assert_eq!(d.snapshot().get("U").map(|p| p.progress), Some(0.0));

        d.update(100.0, 100.0, 600, &mut h);
        assert_eq!(d.snapshot().get("T").map(|p| p.progress), Some(0.0));

        let feedback: Vec<f32> = h
            .dwell_feedback()
            .into_iter()
            .filter(|(t, _)| t == "T")
            .map(|(_, p)| p)
            .collect();
        assert_eq!(feedback, vec![0.0, 0.4, 0.0]);
    }

    #[test]
    fn empty_space_clears_entries() {
        let mut h = host();
        let mut d = selector();
        d.update(100.0, 100.0, 0, &mut h);
        assert_eq!(d.update(250.0, 100.0, 100, &mut h), None);
        assert!(d.snapshot().is_empty());
        assert_eq!(d.current_target(), None);
    }

    #[test]
    fn guard_releases_after_leaving_radius() {
        let mut h = host();
        let mut d = selector();
        d.update(100.0, 100.0, 0, &mut h);
        assert!(d.update(100.0, 100.0, 1000, &mut h).is_some());
        // moved 60px but still on T: guard released, new dwell starts
        assert!(d.update(160.0, 100.0, 1100, &mut h).is_none());
        assert_eq!(d.update(160.0, 100.0, 2100, &mut h).as_deref(), Some("T"));
    }

    #[test]
    fn feedback_can_be_disabled() {
        let mut h = host();
        let mut d = DwellSelector::new(DwellSettings {
            show_feedback: false,
            ..DwellSettings::default()
        });
        d.update(100.0, 100.0, 0, &mut h);
        d.update(100.0, 100.0, 500, &mut h);
        assert!(h.dwell_feedback().is_empty());
    }

    #[test]
    fn click_selects_immediately() {
        let mut h = host();
        let mut d = selector();
        d.update(350.0, 50.0, 0, &mut h);
        assert_eq!(d.click(350.0, 50.0, &mut h).as_deref(), Some("U"));
        assert!(d.snapshot().is_empty());
        assert_eq!(d.click(250.0, 50.0, &mut h), None);
    }
}
