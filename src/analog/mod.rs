//! Stick/analog pipeline.
//!
//! Runs once per poll tick on every channel. Deadzone, smoothing and the
//! acceleration curve turn positions (sticks) or deltas (touchpad) into
//! pointer movement, scroll deltas or direction-key edges.

pub mod smoothing;
pub mod stick;
pub mod touchpad;

use crate::output::Effect;
use std::time::Duration;
pub use stick::StickPipeline;
pub use touchpad::TouchpadPipeline;

/// All analog channels. Guarded by its own lock, separate from the
/// classifier, since the two never share state.
#[derive(Debug, Clone)]
pub struct AnalogPipeline {
    pub sticks: StickPipeline,
    pub touchpad: TouchpadPipeline,
}

impl AnalogPipeline {
    pub fn new(max_sample_gap: Duration) -> Self {
        Self {
            sticks: StickPipeline::new(max_sample_gap),
            touchpad: TouchpadPipeline::new(max_sample_gap),
        }
    }

    /// Drops every smoothing state and releases held direction keys.
    pub fn reset(&mut self) -> Vec<Effect> {
        let mut effects = self.sticks.reset();
        effects.extend(self.touchpad.reset());
        effects
    }
}
