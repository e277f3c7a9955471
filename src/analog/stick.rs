//! Stick channels: mouse, scroll and direction-key modes.

use super::smoothing::{AdaptiveSmoother, CutoffRange};
use crate::controller::button::StickChannel;
use crate::mapping::action::KeyCode;
use crate::mapping::profile::{JoystickSettings, ScrollBoostSettings, StickMode};
use crate::output::Effect;
use crate::timing::{
    acceleration_curve, in_radial_deadzone, magnitude, normalize_past_deadzone, within,
};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::debug;

/// "Flick-flick" turbo scrolling.
///
/// Tracks the peak |y| of each deflection. When the stick returns to
/// center after a flick that follows a same-direction flick within the
/// window, the boost is armed for the next deflection. It ends when that
/// deflection reverses direction or returns to center.
#[derive(Debug, Clone, Default)]
struct ScrollBoost {
    deflected: bool,
    peak: f64,
    direction: f64,
    last_flick: Option<(f64, Instant)>,
    armed: Option<f64>,
}

impl ScrollBoost {
    fn track(&mut self, y: f64, settings: &ScrollBoostSettings) -> f64 {
        self.deflected = true;
        let direction = y.signum();
        if let Some(armed) = self.armed {
            if y != 0.0 && direction != armed {
                debug!("Scroll boost cancelled by reversal");
                self.armed = None;
            }
        }
        if y.abs() > self.peak {
            self.peak = y.abs();
            self.direction = direction;
        }
        match self.armed {
            Some(_) if settings.enabled => settings.multiplier,
            _ => 1.0,
        }
    }

    fn on_center(&mut self, at: Instant, settings: &ScrollBoostSettings) {
        if !self.deflected {
            return;
        }
        self.deflected = false;
        self.armed = None;

        if self.peak >= settings.flick_threshold {
            let window = Duration::from_millis(settings.window_ms);
            let repeated = self.last_flick.is_some_and(|(direction, last)| {
                direction == self.direction && within(last, at, window)
            });
            if repeated && settings.enabled {
                debug!("Scroll boost armed");
                self.armed = Some(self.direction);
            }
            self.last_flick = Some((self.direction, at));
        }
        self.peak = 0.0;
    }
}

#[derive(Debug, Clone)]
struct ChannelState {
    smoother: AdaptiveSmoother,
    held_keys: BTreeSet<KeyCode>,
    boost: ScrollBoost,
}

impl ChannelState {
    fn new(max_gap: Duration) -> Self {
        Self {
            smoother: AdaptiveSmoother::new(max_gap),
            held_keys: BTreeSet::new(),
            boost: ScrollBoost::default(),
        }
    }

    fn release_keys(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.held_keys)
            .into_iter()
            .map(Effect::KeyUp)
            .collect()
    }

    fn reset(&mut self) -> Vec<Effect> {
        self.smoother.reset();
        self.boost = ScrollBoost::default();
        self.release_keys()
    }
}

/// Both stick channels.
#[derive(Debug, Clone)]
pub struct StickPipeline {
    left: ChannelState,
    right: ChannelState,
}

impl StickPipeline {
    pub fn new(max_sample_gap: Duration) -> Self {
        Self {
            left: ChannelState::new(max_sample_gap),
            right: ChannelState::new(max_sample_gap),
        }
    }

    fn channel_mut(&mut self, channel: StickChannel) -> &mut ChannelState {
        match channel {
            StickChannel::Left => &mut self.left,
            StickChannel::Right => &mut self.right,
        }
    }

    pub fn held_keys(&self, channel: StickChannel) -> &BTreeSet<KeyCode> {
        match channel {
            StickChannel::Left => &self.left.held_keys,
            StickChannel::Right => &self.right.held_keys,
        }
    }

    /// One poll-tick sample for `channel`. `y` grows upward.
    pub fn feed(
        &mut self,
        settings: &JoystickSettings,
        channel: StickChannel,
        x: f64,
        y: f64,
        at: Instant,
    ) -> Vec<Effect> {
        let stick = settings.stick(channel);
        let state = self.channel_mut(channel);

        if let Some(keys) = stick.mode.direction_keys() {
            return direction_keys(state, keys, x, y, stick.deadzone, settings.direction_threshold);
        }

        let mut effects = state.release_keys();
        if stick.mode == StickMode::None {
            state.smoother.reset();
            return effects;
        }

        if in_radial_deadzone(x, y, stick.deadzone) {
            state.smoother.reset();
            if stick.mode == StickMode::Scroll {
                state.boost.on_center(at, &settings.scroll_boost);
            }
            return effects;
        }

        let (sx, sy) = if settings.smoothing.enabled {
            state
                .smoother
                .smooth(x, y, at, CutoffRange::from(&settings.smoothing))
        } else {
            (x, y)
        };
        let smoothed = magnitude(sx, sy);
        if smoothed <= f64::EPSILON {
            return effects;
        }
        let speed = acceleration_curve(
            normalize_past_deadzone(smoothed, stick.deadzone),
            stick.acceleration,
            stick.multiplier,
        );
        let dx = sx / smoothed * speed;
        let dy = sy / smoothed * speed;

        match stick.mode {
            StickMode::Mouse => {
                // Screen y grows downward
                let dy = if stick.invert_y { dy } else { -dy };
                if dx != 0.0 || dy != 0.0 {
                    effects.push(Effect::MoveMouse { dx, dy });
                }
            }
            StickMode::Scroll => {
                let boost = state.boost.track(sy, &settings.scroll_boost);
                let dy = if stick.invert_y { -dy } else { dy };
                if dx != 0.0 || dy != 0.0 {
                    effects.push(Effect::Scroll {
                        dx: dx * boost,
                        dy: dy * boost,
                        phase: None,
                        momentum: None,
                    });
                }
            }
            _ => {}
        }
        effects
    }

    /// Stops driving `channel` (wheel took over the stick).
    pub fn release_channel(&mut self, channel: StickChannel) -> Vec<Effect> {
        self.channel_mut(channel).reset()
    }

    pub fn reset(&mut self) -> Vec<Effect> {
        let mut effects = self.left.reset();
        effects.extend(self.right.reset());
        effects
    }
}

fn direction_keys(
    state: &mut ChannelState,
    [up, down, left, right]: [KeyCode; 4],
    x: f64,
    y: f64,
    deadzone: f64,
    threshold: f64,
) -> Vec<Effect> {
    let mut wanted = BTreeSet::new();
    if !in_radial_deadzone(x, y, deadzone) {
        if y >= threshold {
            wanted.insert(up);
        } else if y <= -threshold {
            wanted.insert(down);
        }
        if x <= -threshold {
            wanted.insert(left);
        } else if x >= threshold {
            wanted.insert(right);
        }
    }

    let mut effects: Vec<Effect> = state
        .held_keys
        .difference(&wanted)
        .copied()
        .map(Effect::KeyUp)
        .collect();
    effects.extend(
        wanted
            .difference(&state.held_keys)
            .copied()
            .map(Effect::KeyDown),
    );
    state.held_keys = wanted;
    effects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::profile::StickSettings;
    use pretty_assertions::assert_eq;

    fn settings(left_mode: StickMode) -> JoystickSettings {
        let mut settings = JoystickSettings::default();
        settings.smoothing.enabled = false;
        settings.left_stick = StickSettings {
            mode: left_mode,
            deadzone: 0.15,
            multiplier: 18.0,
            acceleration: 1.8,
            invert_y: false,
        };
        settings.right_stick = StickSettings {
            mode: StickMode::Scroll,
            deadzone: 0.15,
            multiplier: 6.0,
            acceleration: 1.0,
            invert_y: false,
        };
        settings
    }

    fn pipeline() -> StickPipeline {
        StickPipeline::new(Duration::from_millis(100))
    }

    #[test]
    fn deadzone_emits_nothing() {
        let mut p = pipeline();
        let s = settings(StickMode::Mouse);
        assert_eq!(p.feed(&s, StickChannel::Left, 0.1, 0.05, Instant::now()), vec![]);
    }

    #[test]
    fn full_deflection_moves_at_multiplier() {
        let mut p = pipeline();
        let s = settings(StickMode::Mouse);
        let t0 = Instant::now();
        assert_eq!(
            p.feed(&s, StickChannel::Left, 1.0, 0.0, t0),
            vec![Effect::MoveMouse { dx: 18.0, dy: 0.0 }]
        );
        match p.feed(&s, StickChannel::Left, 0.0, 1.0, t0).as_slice() {
            [Effect::MoveMouse { dx, dy }] => {
                assert!(dx.abs() < 1e-9);
                assert!((dy + 18.0).abs() < 1e-9);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn acceleration_curve_shapes_partial_deflection() {
        let mut p = pipeline();
        let s = settings(StickMode::Mouse);
        let effects = p.feed(&s, StickChannel::Left, 0.575, 0.0, Instant::now());
        let expected = 0.5f64.powf(1.8) * 18.0;
        match effects.as_slice() {
            [Effect::MoveMouse { dx, .. }] => assert!((dx - expected).abs() < 1e-9),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn direction_keys_only_emit_transitions() {
        let mut p = pipeline();
        let s = settings(StickMode::WasdKeys);
        let t0 = Instant::now();
        assert_eq!(
            p.feed(&s, StickChannel::Left, 0.6, 0.6, t0),
            vec![Effect::KeyDown(KeyCode::D), Effect::KeyDown(KeyCode::W)]
        );
        assert_eq!(p.feed(&s, StickChannel::Left, 0.65, 0.62, t0), vec![]);
        assert_eq!(
            p.feed(&s, StickChannel::Left, 0.9, 0.1, t0),
            vec![Effect::KeyUp(KeyCode::W)]
        );
        assert_eq!(
            p.feed(&s, StickChannel::Left, 0.0, 0.0, t0),
            vec![Effect::KeyUp(KeyCode::D)]
        );
    }

    #[test]
    fn reset_releases_held_direction_keys() {
        let mut p = pipeline();
        let s = settings(StickMode::ArrowKeys);
        p.feed(&s, StickChannel::Left, 0.0, -0.9, Instant::now());
        assert_eq!(p.reset(), vec![Effect::KeyUp(KeyCode::DOWN_ARROW)]);
        assert!(p.held_keys(StickChannel::Left).is_empty());
    }

    fn scroll_dy(effects: &[Effect]) -> f64 {
        match effects {
            [Effect::Scroll { dy, .. }] => *dy,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn double_flick_boosts_next_deflection() {
        let mut p = pipeline();
        let s = settings(StickMode::Mouse);
        let t0 = Instant::now();
        let ms = |n| t0 + Duration::from_millis(n);

        let normal = scroll_dy(&p.feed(&s, StickChannel::Right, 0.0, 0.9, ms(0)));
        p.feed(&s, StickChannel::Right, 0.0, 0.0, ms(50));
        p.feed(&s, StickChannel::Right, 0.0, 0.9, ms(100));
        p.feed(&s, StickChannel::Right, 0.0, 0.0, ms(150));

        let boosted = scroll_dy(&p.feed(&s, StickChannel::Right, 0.0, 0.9, ms(200)));
        assert!((boosted - normal * 3.0).abs() < 1e-9);

        // reversal ends the boost
        let reversed = scroll_dy(&p.feed(&s, StickChannel::Right, 0.0, -0.9, ms(220)));
        assert!((reversed + normal).abs() < 1e-9);
    }

    #[test]
    fn slow_flicks_do_not_boost() {
        let mut p = pipeline();
        let s = settings(StickMode::Mouse);
        let t0 = Instant::now();
        let ms = |n| t0 + Duration::from_millis(n);

        let normal = scroll_dy(&p.feed(&s, StickChannel::Right, 0.0, 0.9, ms(0)));
        p.feed(&s, StickChannel::Right, 0.0, 0.0, ms(50));
        p.feed(&s, StickChannel::Right, 0.0, 0.9, ms(600));
        p.feed(&s, StickChannel::Right, 0.0, 0.0, ms(650));
        let next = scroll_dy(&p.feed(&s, StickChannel::Right, 0.0, 0.9, ms(700)));
        assert!((next - normal).abs() < 1e-9);
    }
}
