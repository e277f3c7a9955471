//! Timing policy primitives shared by the classifier, the analog pipeline and
//! the command wheel.
//!
//! Everything in here is a pure function or a plain value type. No state is
//! kept between calls; the callers own whatever needs to persist.

use std::f64::consts::TAU;
use std::time::{Duration, Instant};

/// Asymmetric enter/exit band.
///
/// A value has to rise to `enter` before the band becomes active, and has to
/// fall below `exit` before it becomes inactive again. `enter` is expected to
/// be greater than or equal to `exit`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hysteresis {
    pub enter: f64,
    pub exit: f64,
}

impl Hysteresis {
    pub const fn new(enter: f64, exit: f64) -> Self {
        Self { enter, exit }
    }

    /// Returns the new activity state for `value` given the previous one.
    pub fn evaluate(&self, was_active: bool, value: f64) -> bool {
        if was_active {
            value >= self.exit
        } else {
            value >= self.enter
        }
    }
}

/// Euclidean magnitude of a 2D sample.
pub fn magnitude(x: f64, y: f64) -> f64 {
    (x * x + y * y).sqrt()
}

/// True when a 2D sample lies inside a radial deadzone.
pub fn in_radial_deadzone(x: f64, y: f64, deadzone: f64) -> bool {
    magnitude(x, y) < deadzone
}

/// Maps a magnitude past the deadzone onto `[0, 1]`.
pub fn normalize_past_deadzone(magnitude: f64, deadzone: f64) -> f64 {
    if deadzone >= 1.0 {
        return 0.0;
    }
    ((magnitude - deadzone) / (1.0 - deadzone)).clamp(0.0, 1.0)
}

/// Acceleration curve: `normalized^exponent * multiplier`.
pub fn acceleration_curve(normalized: f64, exponent: f64, multiplier: f64) -> f64 {
    if normalized <= 0.0 {
        return 0.0;
    }
    normalized.powf(exponent.max(f64::EPSILON)) * multiplier
}

/// Cutoff frequency interpolated between `min_hz` and `max_hz` by magnitude.
///
/// Small movements get the low cutoff (heavy smoothing), large movements the
/// high cutoff (little lag).
pub fn adaptive_cutoff(magnitude: f64, min_hz: f64, max_hz: f64) -> f64 {
    let t = magnitude.clamp(0.0, 1.0);
    min_hz + (max_hz - min_hz) * t
}

/// One-pole low-pass coefficient `1 - exp(-2π·cutoff·dt)`.
pub fn smoothing_alpha(cutoff_hz: f64, dt: Duration) -> f64 {
    let dt = dt.as_secs_f64();
    if cutoff_hz <= 0.0 || dt <= 0.0 {
        return 1.0;
    }
    1.0 - (-TAU * cutoff_hz * dt).exp()
}

/// Exponential velocity decay over `dt` with a per-second rate.
pub fn momentum_decay(velocity: f64, decay_per_second: f64, dt: Duration) -> f64 {
    velocity * (-decay_per_second * dt.as_secs_f64()).exp()
}

/// Elapsed time between two instants, saturating at zero.
pub fn elapsed_between(earlier: Instant, later: Instant) -> Duration {
    later.saturating_duration_since(earlier)
}

/// True when `later` happened no more than `threshold` after `earlier`.
pub fn within(earlier: Instant, later: Instant, threshold: Duration) -> bool {
    elapsed_between(earlier, later) <= threshold
}

/// True when a hold lasted at least `threshold`.
pub fn is_long_hold(hold_duration: Duration, threshold: Duration) -> bool {
    hold_duration >= threshold
}

/// Linear ramp from 0 to 1 over `duration`.
pub fn ramp_progress(elapsed: Duration, duration: Duration) -> f64 {
    if duration.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0)
}

/// True when the gap since the previous sample is too long to interpolate
/// across, or there was no previous sample.
pub fn is_sample_gap(dt: Option<Duration>, max_gap: Duration) -> bool {
    match dt {
        Some(dt) => dt > max_gap,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hysteresis_holds_state_between_thresholds() {
        let band = Hysteresis::new(0.42, 0.34);
        assert!(!band.evaluate(false, 0.40));
        assert!(band.evaluate(false, 0.42));
        assert!(band.evaluate(true, 0.35));
        assert!(!band.evaluate(true, 0.33));
    }

    #[test]
    fn radial_deadzone_uses_magnitude() {
        assert!(in_radial_deadzone(0.1, 0.1, 0.15));
        assert!(!in_radial_deadzone(0.12, 0.12, 0.15));
        assert!(!in_radial_deadzone(0.0, -0.15, 0.15));
    }

    #[test]
    fn normalize_handles_degenerate_deadzone() {
        assert_eq!(normalize_past_deadzone(0.9, 1.0), 0.0);
        assert!((normalize_past_deadzone(0.6, 0.2) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn alpha_grows_with_dt_and_cutoff() {
        let slow = smoothing_alpha(1.0, Duration::from_millis(8));
        let fast = smoothing_alpha(10.0, Duration::from_millis(8));
        let long = smoothing_alpha(1.0, Duration::from_millis(80));
        assert!(slow < fast);
        assert!(slow < long);
        assert!(fast < 1.0);
        assert_eq!(smoothing_alpha(0.0, Duration::from_millis(8)), 1.0);
    }

    #[test]
    fn momentum_decays_towards_zero() {
        let v = momentum_decay(100.0, 5.0, Duration::from_millis(100));
        assert!(v < 100.0 && v > 50.0);
    }

    #[test]
    fn ramp_is_clamped() {
        let d = Duration::from_secs(1);
        assert_eq!(ramp_progress(Duration::from_millis(500), d), 0.5);
        assert_eq!(ramp_progress(Duration::from_secs(2), d), 1.0);
        assert_eq!(ramp_progress(Duration::ZERO, Duration::ZERO), 1.0);
    }

    #[test]
    fn first_sample_counts_as_gap() {
        let max = Duration::from_millis(100);
        assert!(is_sample_gap(None, max));
        assert!(is_sample_gap(Some(Duration::from_millis(150)), max));
        assert!(!is_sample_gap(Some(Duration::from_millis(8)), max));
    }
}
