//! Controller-facing input vocabulary.
//!
//! [`ButtonId`] names every physical input surface the engine can classify.
//! [`ControllerEvent`] is what a device adapter pushes into the engine.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::time::{Duration, Instant};

/// Identity of a physical button surface.
///
/// The declaration order is the total order used for deterministic chord
/// fallback, so new variants go at the end.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ButtonId {
    A,
    B,
    X,
    Y,
    LeftBumper,
    RightBumper,
    LeftTrigger,
    RightTrigger,
    LeftThumbstick,
    RightThumbstick,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
    Menu,
    View,
    Share,
    Guide,
    TouchpadButton,
    TouchpadTwoFingerButton,
    TouchpadTap,
    TouchpadTwoFingerTap,
}

impl Display for ButtonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ButtonId::A => "A",
            ButtonId::B => "B",
            ButtonId::X => "X",
            ButtonId::Y => "Y",
            ButtonId::LeftBumper => "LB",
            ButtonId::RightBumper => "RB",
            ButtonId::LeftTrigger => "LT",
            ButtonId::RightTrigger => "RT",
            ButtonId::LeftThumbstick => "L3",
            ButtonId::RightThumbstick => "R3",
            ButtonId::DPadUp => "D-Up",
            ButtonId::DPadDown => "D-Down",
            ButtonId::DPadLeft => "D-Left",
            ButtonId::DPadRight => "D-Right",
            ButtonId::Menu => "Menu",
            ButtonId::View => "View",
            ButtonId::Share => "Share",
            ButtonId::Guide => "Guide",
            ButtonId::TouchpadButton => "Touchpad Click",
            ButtonId::TouchpadTwoFingerButton => "Touchpad 2F Click",
            ButtonId::TouchpadTap => "Touchpad Tap",
            ButtonId::TouchpadTwoFingerTap => "Touchpad 2F Tap",
        };
        f.write_str(name)
    }
}

/// Analog stick channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StickChannel {
    Left,
    Right,
}

/// Analog trigger side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSide {
    Left,
    Right,
}

impl TriggerSide {
    pub fn button(self) -> ButtonId {
        match self {
            TriggerSide::Left => ButtonId::LeftTrigger,
            TriggerSide::Right => ButtonId::RightTrigger,
        }
    }
}

/// One two-finger touchpad sample.
///
/// `center_dx`/`center_dy` is the movement of the midpoint between both
/// fingers since the previous sample, `distance_delta` the change of the
/// distance between them (positive when spreading).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwoFingerSample {
    pub center_dx: f64,
    pub center_dy: f64,
    pub distance_delta: f64,
}

/// Event pushed by a device adapter into the engine.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    ButtonPressed {
        button: ButtonId,
        at: Instant,
    },
    ButtonReleased {
        button: ButtonId,
        at: Instant,
        hold_duration: Duration,
    },
    /// Absolute stick position in `[-1, 1]`, y up.
    StickMoved {
        channel: StickChannel,
        x: f64,
        y: f64,
    },
    /// Trigger value in `[0, 1]`.
    TriggerMoved {
        side: TriggerSide,
        value: f64,
        at: Instant,
    },
    /// Single-finger touchpad movement delta.
    TouchpadMoved {
        dx: f64,
        dy: f64,
        at: Instant,
    },
    TouchpadGesture {
        sample: TwoFingerSample,
        at: Instant,
    },
    /// All fingers lifted from the touchpad.
    TouchpadLifted {
        at: Instant,
    },
    Connected,
    Disconnected,
}
