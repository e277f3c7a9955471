//! Controller input.
//!
//! [`button`] defines the engine's input vocabulary. With the `gamepad`
//! feature, [`event_collector`] reads a physical gamepad through gilrs:
//!
//! ```text
//! Gamepad ──► EventCollector ──► ControllerEvent ──► MappingEngine
//!             (blocking task)
//! ```

pub mod button;
#[cfg(feature = "gamepad")]
pub mod event_collector;

pub use button::{ButtonId, ControllerEvent, StickChannel, TriggerSide, TwoFingerSample};
