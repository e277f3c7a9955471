//! Deferred side effects.
//!
//! Engine state is mutated under a lock and the resulting effects are
//! collected here; the caller applies them to the sink after the guard is
//! dropped.

use super::{GesturePhase, MomentumPhase, OutputSink, ScrollPhase};
use crate::controller::button::ButtonId;
use crate::mapping::action::{Action, KeyCode, Modifiers};
use crate::wheel::item::WheelActivation;
use std::collections::BTreeSet;
use std::time::Duration;

/// Notification for observers (overlay, UI, logging).
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ButtonPressed(ButtonId),
    ButtonReleased {
        button: ButtonId,
        hold_duration: Duration,
    },
    ChordDetected(BTreeSet<ButtonId>),
    /// Topmost layer after a change, `None` for the base mapping.
    LayerChanged(Option<String>),
    WheelShown {
        alternate: bool,
    },
    WheelSelectionChanged {
        index: Option<usize>,
        full_deflection: bool,
    },
    /// The full-deflection ramp completed for this segment.
    WheelReady(usize),
    WheelActivated(WheelActivation),
    WheelHidden,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Perform(Action),
    StartHold(Action),
    StopHold(Action),
    PressKey {
        key: KeyCode,
        modifiers: Modifiers,
    },
    KeyDown(KeyCode),
    KeyUp(KeyCode),
    MoveMouse {
        dx: f64,
        dy: f64,
    },
    Scroll {
        dx: f64,
        dy: f64,
        phase: Option<ScrollPhase>,
        momentum: Option<MomentumPhase>,
    },
    Magnify {
        magnification: f64,
        phase: GesturePhase,
    },
    Notify(EngineEvent),
}

impl Effect {
    /// Runs the effect against `sink`. Notifications are handed back to the
    /// caller instead.
    pub fn apply(self, sink: &dyn OutputSink) -> Option<EngineEvent> {
        match self {
            Effect::Perform(action) => sink.perform(&action),
            Effect::StartHold(action) => sink.start_hold_mapping(&action),
            Effect::StopHold(action) => sink.stop_hold_mapping(&action),
            Effect::PressKey { key, modifiers } => sink.press_key(key, modifiers),
            Effect::KeyDown(key) => sink.key_down(key, Modifiers::NONE),
            Effect::KeyUp(key) => sink.key_up(key, Modifiers::NONE),
            Effect::MoveMouse { dx, dy } => sink.move_mouse(dx, dy),
            Effect::Scroll {
                dx,
                dy,
                phase,
                momentum,
            } => sink.scroll(dx, dy, phase, momentum),
            Effect::Magnify {
                magnification,
                phase,
            } => sink.magnify(magnification, phase),
            Effect::Notify(event) => return Some(event),
        }
        None
    }
}
