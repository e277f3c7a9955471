//! One-pole low-pass with a magnitude-adaptive cutoff.
//!
//! The coefficient is re-derived from the wall-clock `dt` of every sample,
//! so the filter response does not depend on polling jitter.

use crate::mapping::profile::SmoothingSettings;
use crate::timing::{adaptive_cutoff, elapsed_between, is_sample_gap, magnitude, smoothing_alpha};
use std::time::{Duration, Instant};

/// Cutoff frequencies for small and large movements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutoffRange {
    pub min_hz: f64,
    pub max_hz: f64,
}

impl CutoffRange {
    pub fn fixed(hz: f64) -> Self {
        Self {
            min_hz: hz,
            max_hz: hz,
        }
    }
}

impl From<&SmoothingSettings> for CutoffRange {
    fn from(settings: &SmoothingSettings) -> Self {
        Self {
            min_hz: settings.min_cutoff_hz,
            max_hz: settings.max_cutoff_hz,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdaptiveSmoother {
    max_gap: Duration,
    value: Option<(f64, f64)>,
    last_at: Option<Instant>,
}

impl AdaptiveSmoother {
    pub fn new(max_gap: Duration) -> Self {
        Self {
            max_gap,
            value: None,
            last_at: None,
        }
    }

    /// Filters one 2D sample. The first sample after a reset, or after a gap
    /// longer than `max_gap`, is taken as-is.
    pub fn smooth(&mut self, x: f64, y: f64, at: Instant, cutoff: CutoffRange) -> (f64, f64) {
        let dt = self.last_at.map(|last| elapsed_between(last, at));
        self.last_at = Some(at);

        let previous = match self.value {
            Some(previous) if !is_sample_gap(dt, self.max_gap) => previous,
            _ => {
                self.value = Some((x, y));
                return (x, y);
            }
        };

        let cutoff_hz = adaptive_cutoff(magnitude(x, y), cutoff.min_hz, cutoff.max_hz);
        let alpha = smoothing_alpha(cutoff_hz, dt.unwrap_or_default());
        let next = (
            previous.0 + alpha * (x - previous.0),
            previous.1 + alpha * (y - previous.1),
        );
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> Option<(f64, f64)> {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = None;
        self.last_at = None;
    }
}
