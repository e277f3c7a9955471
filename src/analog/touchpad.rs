//! Touchpad channels.
//!
//! Single-finger deltas drive the pointer. Two-finger samples are split
//! into pinch (zoom) and pan (scroll) by comparing the smoothed change of
//! finger distance with the smoothed movement of the finger center. Pan
//! keeps the fractional pixel remainder between samples and hands off to
//! momentum scrolling when the fingers lift at speed.
//!
//! Deltas are in touch-surface units where y grows downward.

use super::smoothing::{AdaptiveSmoother, CutoffRange};
use crate::controller::button::TwoFingerSample;
use crate::mapping::action::{KeyCode, Modifiers};
use crate::mapping::profile::{MomentumSettings, TouchpadSettings, ZoomMode};
use crate::output::{Effect, GesturePhase, MomentumPhase, ScrollPhase};
use crate::timing::{acceleration_curve, elapsed_between, magnitude, momentum_decay};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

/// Fractional pixel carry.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Residual {
    x: f64,
    y: f64,
}

impl Residual {
    /// Adds `(dx, dy)` and returns the whole-pixel part, keeping the rest.
    fn take_whole(&mut self, dx: f64, dy: f64) -> (f64, f64) {
        let x = self.x + dx;
        let y = self.y + dy;
        let whole = (x.trunc(), y.trunc());
        self.x = x - whole.0;
        self.y = y - whole.1;
        whole
    }
}

#[derive(Debug, Clone)]
struct Momentum {
    vx: f64,
    vy: f64,
    last_at: Instant,
    residual: Residual,
    began: bool,
}

#[derive(Debug, Clone)]
struct TwoFingerGesture {
    center: AdaptiveSmoother,
    distance: AdaptiveSmoother,
    scroll_began: bool,
    magnify_active: bool,
    zoom_accumulator: f64,
    residual: Residual,
    // Recent pan deltas in pixels, newest last
    recent: VecDeque<(f64, f64, Instant)>,
}

impl TwoFingerGesture {
    fn new(max_gap: Duration) -> Self {
        Self {
            center: AdaptiveSmoother::new(max_gap),
            distance: AdaptiveSmoother::new(max_gap),
            scroll_began: false,
            magnify_active: false,
            zoom_accumulator: 0.0,
            residual: Residual::default(),
            recent: VecDeque::new(),
        }
    }

    fn end_phases(&mut self, effects: &mut Vec<Effect>) {
        if self.magnify_active {
            self.magnify_active = false;
            effects.push(Effect::Magnify {
                magnification: 0.0,
                phase: GesturePhase::Ended,
            });
        }
        if self.scroll_began {
            self.scroll_began = false;
            effects.push(Effect::Scroll {
                dx: 0.0,
                dy: 0.0,
                phase: Some(ScrollPhase::Ended),
                momentum: None,
            });
        }
    }

    /// Release velocity in pixels per second.
    fn release_velocity(&self) -> Option<(f64, f64)> {
        let first = self.recent.front()?;
        let last = self.recent.back()?;
        let span = elapsed_between(first.2, last.2).as_secs_f64();
        if span <= 0.0 {
            return None;
        }
        // The first delta happened before the span starts
        let (sx, sy) = self
            .recent
            .iter()
            .skip(1)
            .fold((0.0, 0.0), |(ax, ay), (dx, dy, _)| (ax + dx, ay + dy));
        Some((sx / span, sy / span))
    }
}

#[derive(Debug, Clone)]
pub struct TouchpadPipeline {
    max_gap: Duration,
    pointer: AdaptiveSmoother,
    gesture: Option<TwoFingerGesture>,
    momentum: Option<Momentum>,
}

impl TouchpadPipeline {
    pub fn new(max_sample_gap: Duration) -> Self {
        Self {
            max_gap: max_sample_gap,
            pointer: AdaptiveSmoother::new(max_sample_gap),
            gesture: None,
            momentum: None,
        }
    }

    pub fn is_coasting(&self) -> bool {
        self.momentum.is_some()
    }

    /// Single-finger movement.
    pub fn feed_delta(
        &mut self,
        settings: &TouchpadSettings,
        dx: f64,
        dy: f64,
        at: Instant,
    ) -> Vec<Effect> {
        let mut effects = self.stop_momentum();
        if dx.abs() < settings.min_delta && dy.abs() < settings.min_delta {
            return effects;
        }
        let (sx, sy) = self.pointer.smooth(
            dx,
            dy,
            at,
            CutoffRange::fixed(settings.smoothing_cutoff_hz),
        );
        let length = magnitude(sx, sy);
        if length <= f64::EPSILON {
            return effects;
        }
        let speed = acceleration_curve(length, settings.acceleration, settings.sensitivity);
        effects.push(Effect::MoveMouse {
            dx: sx / length * speed,
            dy: sy / length * speed,
        });
        effects
    }

    /// Two-finger sample: pinch to zoom or pan to scroll.
    pub fn feed_gesture(
        &mut self,
        settings: &TouchpadSettings,
        sample: TwoFingerSample,
        at: Instant,
    ) -> Vec<Effect> {
        let mut effects = self.stop_momentum();
        let max_gap = self.max_gap;
        let gesture = self
            .gesture
            .get_or_insert_with(|| TwoFingerGesture::new(max_gap));

        let cutoff = CutoffRange::fixed(settings.smoothing_cutoff_hz);
        let (cx, cy) = gesture
            .center
            .smooth(sample.center_dx, sample.center_dy, at, cutoff);
        let (distance, _) = gesture.distance.smooth(sample.distance_delta, 0.0, at, cutoff);

        let pan = magnitude(cx, cy);
        let pinch = distance.abs();
        let pinching = pinch > settings.pinch_deadzone
            && (pan < settings.pan_deadzone
                || (pan > 0.0 && pinch / pan > settings.pinch_pan_ratio));

        if pinching {
            if gesture.scroll_began {
                gesture.scroll_began = false;
                effects.push(Effect::Scroll {
                    dx: 0.0,
                    dy: 0.0,
                    phase: Some(ScrollPhase::Ended),
                    momentum: None,
                });
            }
            gesture.recent.clear();
            zoom(gesture, settings, distance, &mut effects);
        } else if pan >= settings.pan_deadzone {
            if gesture.magnify_active {
                gesture.magnify_active = false;
                effects.push(Effect::Magnify {
                    magnification: 0.0,
                    phase: GesturePhase::Ended,
                });
            }
            let px = cx * settings.pan_sensitivity;
            let py = cy * settings.pan_sensitivity;
            gesture.recent.push_back((px, py, at));
            while gesture.recent.len() > settings.momentum.velocity_samples.max(2) {
                gesture.recent.pop_front();
            }
            let (dx, dy) = gesture.residual.take_whole(px, py);
            if dx != 0.0 || dy != 0.0 {
                let phase = if gesture.scroll_began {
                    ScrollPhase::Changed
                } else {
                    ScrollPhase::Began
                };
                gesture.scroll_began = true;
                effects.push(Effect::Scroll {
                    dx,
                    dy,
                    phase: Some(phase),
                    momentum: None,
                });
            }
        }
        effects
    }

    /// Fingers lifted: close the gesture and maybe start coasting.
    pub fn end_gesture(&mut self, settings: &TouchpadSettings, at: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.pointer.reset();
        let Some(mut gesture) = self.gesture.take() else {
            return effects;
        };
        let was_scrolling = gesture.scroll_began;
        gesture.end_phases(&mut effects);

        if was_scrolling && settings.momentum.enabled {
            if let Some((vx, vy)) = gesture.release_velocity() {
                if magnitude(vx, vy) >= settings.momentum.min_start_velocity {
                    debug!("Momentum scroll from {:.0}/{:.0} px/s", vx, vy);
                    self.momentum = Some(Momentum {
                        vx,
                        vy,
                        last_at: at,
                        residual: Residual::default(),
                        began: false,
                    });
                }
            }
        }
        effects
    }

    /// Advances momentum scrolling to `now`.
    pub fn tick(&mut self, settings: &MomentumSettings, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        let Some(momentum) = self.momentum.as_mut() else {
            return effects;
        };
        let dt = elapsed_between(momentum.last_at, now);
        if dt.is_zero() {
            return effects;
        }
        momentum.last_at = now;
        momentum.vx = momentum_decay(momentum.vx, settings.decay_per_second, dt);
        momentum.vy = momentum_decay(momentum.vy, settings.decay_per_second, dt);

        if magnitude(momentum.vx, momentum.vy) < settings.stop_velocity {
            return self.stop_momentum();
        }

        let seconds = dt.as_secs_f64();
        let (dx, dy) = momentum
            .residual
            .take_whole(momentum.vx * seconds, momentum.vy * seconds);
        if !momentum.began {
            momentum.began = true;
            effects.push(Effect::Scroll {
                dx,
                dy,
                phase: None,
                momentum: Some(MomentumPhase::Began),
            });
        } else if dx != 0.0 || dy != 0.0 {
            effects.push(Effect::Scroll {
                dx,
                dy,
                phase: None,
                momentum: Some(MomentumPhase::Continue),
            });
        }
        effects
    }

    fn stop_momentum(&mut self) -> Vec<Effect> {
        match self.momentum.take() {
            Some(momentum) if momentum.began => vec![Effect::Scroll {
                dx: 0.0,
                dy: 0.0,
                phase: None,
                momentum: Some(MomentumPhase::Ended),
            }],
            _ => Vec::new(),
        }
    }

    pub fn reset(&mut self) -> Vec<Effect> {
        let mut effects = self.stop_momentum();
        if let Some(mut gesture) = self.gesture.take() {
            gesture.end_phases(&mut effects);
        }
        self.pointer.reset();
        effects
    }
}

fn zoom(
    gesture: &mut TwoFingerGesture,
    settings: &TouchpadSettings,
    distance: f64,
    effects: &mut Vec<Effect>,
) {
    match settings.zoom_mode {
        ZoomMode::Native => {
            let phase = if gesture.magnify_active {
                GesturePhase::Changed
            } else {
                GesturePhase::Began
            };
            gesture.magnify_active = true;
            effects.push(Effect::Magnify {
                magnification: distance * settings.native_zoom_scale,
                phase,
            });
        }
        ZoomMode::KeySteps => {
            let step = settings.zoom_step_threshold;
            if step <= 0.0 {
                return;
            }
            gesture.zoom_accumulator += distance;
            while gesture.zoom_accumulator >= step {
                gesture.zoom_accumulator -= step;
                effects.push(Effect::PressKey {
                    key: KeyCode::EQUAL,
                    modifiers: Modifiers::COMMAND,
                });
            }
            while gesture.zoom_accumulator <= -step {
                gesture.zoom_accumulator += step;
                effects.push(Effect::PressKey {
                    key: KeyCode::MINUS,
                    modifiers: Modifiers::COMMAND,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn settings() -> TouchpadSettings {
        TouchpadSettings {
            pan_sensitivity: 100.0,
            ..Default::default()
        }
    }

    fn pan(dx: f64, dy: f64) -> TwoFingerSample {
        TwoFingerSample {
            center_dx: dx,
            center_dy: dy,
            distance_delta: 0.0,
        }
    }

    fn pinch(delta: f64) -> TwoFingerSample {
        TwoFingerSample {
            center_dx: 0.0,
            center_dy: 0.0,
            distance_delta: delta,
        }
    }

    fn tick_at(t0: Instant, n: u64) -> Instant {
        t0 + Duration::from_micros(8_333 * n)
    }

    #[test]
    fn sub_pixel_pan_eventually_scrolls() {
        let mut pad = TouchpadPipeline::new(Duration::from_millis(100));
        let s = settings();
        let t0 = Instant::now();
        // 0.5 px per sample
        assert_eq!(pad.feed_gesture(&s, pan(0.0, 0.005), t0), vec![]);
        let effects = pad.feed_gesture(&s, pan(0.0, 0.005), tick_at(t0, 1));
        assert_eq!(effects.len(), 1);
        match &effects[0] {
            Effect::Scroll { dy, phase, .. } => {
                assert!((dy - 1.0).abs() < 1e-9);
                assert_eq!(*phase, Some(ScrollPhase::Began));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn residual_never_loses_input() {
        let mut pad = TouchpadPipeline::new(Duration::from_millis(100));
        let s = settings();
        let t0 = Instant::now();
        let mut total = 0.0;
        for n in 0..40 {
            for effect in pad.feed_gesture(&s, pan(0.0, 0.0045), tick_at(t0, n)) {
                if let Effect::Scroll { dy, .. } = effect {
                    total += dy;
                }
            }
        }
        // 40 * 0.45 px = 18 px, minus at most one pixel still carried
        assert!(total >= 17.0 && total <= 18.0, "total {}", total);
    }

    #[test]
    fn pinch_emits_native_magnify_phases() {
        let mut pad = TouchpadPipeline::new(Duration::from_millis(100));
        let s = settings();
        let t0 = Instant::now();
        let first = pad.feed_gesture(&s, pinch(0.01), t0);
        assert_eq!(
            first,
            vec![Effect::Magnify {
                magnification: 0.02,
                phase: GesturePhase::Began
            }]
        );
        let second = pad.feed_gesture(&s, pinch(0.01), tick_at(t0, 1));
        assert!(matches!(
            second.as_slice(),
            [Effect::Magnify {
                phase: GesturePhase::Changed,
                ..
            }]
        ));
        assert_eq!(
            pad.end_gesture(&s, tick_at(t0, 2)),
            vec![Effect::Magnify {
                magnification: 0.0,
                phase: GesturePhase::Ended
            }]
        );
    }

    fn pan_and_pinch(dy: f64, delta: f64) -> TwoFingerSample {
        TwoFingerSample {
            center_dx: 0.0,
            center_dy: dy,
            distance_delta: delta,
        }
    }

    #[test]
    fn pinch_dominating_a_live_pan_zooms() {
        let mut pad = TouchpadPipeline::new(Duration::from_millis(100));
        let s = settings();
        // pan 0.01 is past the pan deadzone, pinch/pan = 2.0 > 1.5
        let effects = pad.feed_gesture(&s, pan_and_pinch(0.01, 0.02), Instant::now());
        assert!(
            matches!(
                effects.as_slice(),
                [Effect::Magnify {
                    phase: GesturePhase::Began,
                    ..
                }]
            ),
            "{:?}",
            effects
        );
    }

    #[test]
    fn weak_pinch_during_pan_scrolls() {
        let mut pad = TouchpadPipeline::new(Duration::from_millis(100));
        let s = settings();
        // pinch/pan = 1.2 stays under the ratio
        let effects = pad.feed_gesture(&s, pan_and_pinch(0.01, 0.012), Instant::now());
        assert!(
            matches!(
                effects.as_slice(),
                [Effect::Scroll {
                    phase: Some(ScrollPhase::Began),
                    ..
                }]
            ),
            "{:?}",
            effects
        );
    }

    #[test]
    fn key_step_zoom_accumulates() {
        let mut pad = TouchpadPipeline::new(Duration::from_millis(100));
        let s = TouchpadSettings {
            zoom_mode: ZoomMode::KeySteps,
            ..settings()
        };
        let t0 = Instant::now();
        let mut presses = Vec::new();
        for n in 0..9 {
            presses.extend(pad.feed_gesture(&s, pinch(0.01), tick_at(t0, n)));
        }
        assert_eq!(
            presses,
            vec![Effect::PressKey {
                key: KeyCode::EQUAL,
                modifiers: Modifiers::COMMAND
            }]
        );
    }

    #[test]
    fn fast_pan_release_coasts_and_decays() {
        let mut pad = TouchpadPipeline::new(Duration::from_millis(100));
        let s = settings();
        let t0 = Instant::now();
        for n in 0..5 {
            pad.feed_gesture(&s, pan(0.0, 0.05), tick_at(t0, n));
        }
        let lift = tick_at(t0, 5);
        let ended = pad.end_gesture(&s, lift);
        assert_eq!(
            ended,
            vec![Effect::Scroll {
                dx: 0.0,
                dy: 0.0,
                phase: Some(ScrollPhase::Ended),
                momentum: None
            }]
        );
        assert!(pad.is_coasting());

        let first = pad.tick(&s.momentum, tick_at(t0, 6));
        assert!(matches!(
            first.as_slice(),
            [Effect::Scroll {
                momentum: Some(MomentumPhase::Began),
                ..
            }]
        ));

        let mut last = Vec::new();
        for n in 7..2_000 {
            let effects = pad.tick(&s.momentum, tick_at(t0, n));
            if !effects.is_empty() {
                last = effects;
            }
            if !pad.is_coasting() {
                break;
            }
        }
        assert!(!pad.is_coasting());
        assert_eq!(
            last,
            vec![Effect::Scroll {
                dx: 0.0,
                dy: 0.0,
                phase: None,
                momentum: Some(MomentumPhase::Ended)
            }]
        );
    }

    #[test]
    fn new_touch_cancels_momentum() {
        let mut pad = TouchpadPipeline::new(Duration::from_millis(100));
        let s = settings();
        let t0 = Instant::now();
        for n in 0..5 {
            pad.feed_gesture(&s, pan(0.0, 0.05), tick_at(t0, n));
        }
        pad.end_gesture(&s, tick_at(t0, 5));
        pad.tick(&s.momentum, tick_at(t0, 6));
        let effects = pad.feed_delta(&s, 0.0, 0.0, tick_at(t0, 7));
        assert_eq!(
            effects,
            vec![Effect::Scroll {
                dx: 0.0,
                dy: 0.0,
                phase: None,
                momentum: Some(MomentumPhase::Ended)
            }]
        );
        assert!(!pad.is_coasting());
    }

    #[test]
    fn pointer_respects_min_delta() {
        let mut pad = TouchpadPipeline::new(Duration::from_millis(100));
        let s = settings();
        assert_eq!(pad.feed_delta(&s, 0.0001, 0.0, Instant::now()), vec![]);
        let effects = pad.feed_delta(&s, 0.02, 0.0, Instant::now());
        assert!(matches!(effects.as_slice(), [Effect::MoveMouse { dx, .. }] if *dx > 0.0));
    }
}
