//! Nine-point calibration for pointing devices.
//!
//! A run shows the points of a 3×3 grid one at a time, collects raw (unsmoothed) pointer
//! samples for each, and scores every point by its mean error:
//!
//! ```text
//! accuracy = max(0, 1 - mean_distance / max_tolerable_px)
//! ```
//!
//! Samples that arrive within `settle_ms` of a point appearing are discarded while the eye
//! travels to it. A point is done once it has `min_samples` samples; if it has not got them
//! by `point_timeout_ms` after it appeared, the whole run aborts.
//!
//! A [`CalibrationRun`] never touches the device record. Only [`CalibrationRun::finish`]
//! produces a [`Calibration`], and only once all nine points are scored, so an aborted or
//! cancelled run leaves the committed calibration exactly as it was.

use crate::config::{CalibrationConfig, ScreenConfig};
use crate::error::{InputError, Result};
use crate::host::Host;
use crate::settings::{Calibration, CalibrationPoint};
use crate::status::CalibrationProgress;
use tracing::{debug, info, warn};

pub const GRID_POINTS: usize = 9;

/// Grid points, row-major from the top-left, inset by `margin` from every edge.
pub fn calibration_grid(screen: ScreenConfig, margin: f32) -> [(f32, f32); GRID_POINTS] {
    let xs = [margin, screen.width / 2.0, screen.width - margin];
    let ys = [margin, screen.height / 2.0, screen.height - margin];
    let mut grid = [(0.0, 0.0); GRID_POINTS];
    for (row, y) in ys.iter().enumerate() {
        for (col, x) in xs.iter().enumerate() {
            grid[row * 3 + col] = (*x, *y);
        }
    }
    grid
}

/// Score one point from its samples.
pub fn point_accuracy(target: (f32, f32), samples: &[(f32, f32)], max_tolerable_px: f32) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let total: f32 = samples
        .iter()
        .map(|(x, y)| (x - target.0).hypot(y - target.1))
        .sum();
    let mean = total / samples.len() as f32;
    (1.0 - mean / max_tolerable_px).max(0.0)
}

/// What one sample did to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// Dropped: still inside the settle window.
    Settling,
    Collecting,
    /// Point `index` has enough samples; the next point is now shown.
    PointComplete { index: usize },
    /// All points are scored; call [`CalibrationRun::finish`].
    Complete,
}

/// Result of a completed run.
#[derive(Debug)]
pub struct CalibrationOutcome {
    pub calibration: Calibration,
    /// `CalibrationLowAccuracy` when the aggregate falls below the configured threshold.
    /// The calibration is committed regardless.
    pub warning: Option<InputError>,
}

#[derive(Debug)]
pub struct CalibrationRun {
    device_id: String,
    config: CalibrationConfig,
    grid: [(f32, f32); GRID_POINTS],
    scored: Vec<CalibrationPoint>,
    samples: Vec<(f32, f32)>,
    shown_at_ms: u64,
}

impl CalibrationRun {
    /// Start a run and show the first point.
    pub fn begin(
        device_id: impl Into<String>,
        screen: ScreenConfig,
        config: CalibrationConfig,
        now_ms: u64,
        host: &mut dyn Host,
    ) -> Self {
        let grid = calibration_grid(screen, config.margin_px);
        let run = Self {
            device_id: device_id.into(),
            config,
            grid,
            scored: Vec::with_capacity(GRID_POINTS),
            samples: Vec::new(),
            shown_at_ms: now_ms,
        };
        info!("Calibrating {}", run.device_id);
        let (x, y) = run.grid[0];
        host.show_calibration_point(0, x, y);
        run
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn is_complete(&self) -> bool {
        self.scored.len() == GRID_POINTS
    }

    /// When the current point times out.
    pub fn deadline_ms(&self) -> u64 {
        self.shown_at_ms + self.config.point_timeout_ms
    }

    pub fn progress(&self) -> CalibrationProgress {
        CalibrationProgress {
            point_index: self.scored.len().min(GRID_POINTS - 1),
            total_points: GRID_POINTS,
            samples: self.samples.len() as u32,
        }
    }

    pub fn add_sample(&mut self, x: f32, y: f32, now_ms: u64, host: &mut dyn Host) -> Result<SampleOutcome> {
        if self.is_complete() {
            return Ok(SampleOutcome::Complete);
        }
        self.check_timeout(now_ms)?;
        if now_ms < self.shown_at_ms + self.config.settle_ms {
            return Ok(SampleOutcome::Settling);
        }
        if !x.is_finite() || !y.is_finite() {
            return Ok(SampleOutcome::Collecting);
        }
        self.samples.push((x, y));
        if (self.samples.len() as u32) < self.config.min_samples {
            return Ok(SampleOutcome::Collecting);
        }

        let index = self.scored.len();
        let target = self.grid[index];
        let accuracy = point_accuracy(target, &self.samples, self.config.max_tolerable_px);
        debug!("Calibration point {} scored {:.2}", index, accuracy);
        self.scored.push(CalibrationPoint {
            x: target.0,
            y: target.1,
            sample_count: self.samples.len() as u32,
            accuracy,
        });
        self.samples.clear();

        if self.is_complete() {
            host.hide_calibration();
            return Ok(SampleOutcome::Complete);
        }
        self.shown_at_ms = now_ms;
        let (nx, ny) = self.grid[index + 1];
        host.show_calibration_point(index + 1, nx, ny);
        Ok(SampleOutcome::PointComplete { index })
    }

    /// `CalibrationAborted` once the current point is past its deadline.
    pub fn check_timeout(&self, now_ms: u64) -> Result<()> {
        if self.is_complete() || now_ms < self.deadline_ms() {
            return Ok(());
        }
        Err(InputError::aborted(format!(
            "point {} timed out with {} of {} samples",
            self.scored.len(),
            self.samples.len(),
            self.config.min_samples
        )))
    }

    /// Abandon the run. Returns the error to report.
    pub fn abort(self, reason: InputError, host: &mut dyn Host) -> InputError {
        warn!("Calibration of {} aborted: {}", self.device_id, reason);
        host.hide_calibration();
        reason
    }

    /// Build the calibration record from a complete run.
    pub fn finish(self, now_ms: u64) -> Result<CalibrationOutcome> {
        if !self.is_complete() {
            return Err(InputError::aborted(format!(
                "only {} of {} points collected",
                self.scored.len(),
                GRID_POINTS
            )));
        }
        let aggregate =
            self.scored.iter().map(|p| p.accuracy).sum::<f32>() / self.scored.len() as f32;
        let threshold = self.config.low_accuracy_threshold;
        let warning = (aggregate < threshold).then(|| InputError::CalibrationLowAccuracy {
            aggregate,
            threshold,
        });
        info!(
            "Calibration of {} complete, aggregate accuracy {:.2}",
            self.device_id, aggregate
        );
        Ok(CalibrationOutcome {
            calibration: Calibration {
                points: self.scored,
                aggregate_accuracy: aggregate,
                last_calibrated_at: Some(now_ms),
            },
            warning,
        })
    }
}
