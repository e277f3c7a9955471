//! Output side of the engine.
//!
//! The engine never talks to the OS directly. Everything it wants to happen
//! goes through an [`OutputSink`]; the platform layer supplies the
//! implementation. [`ChannelSink`] forwards commands over a tokio channel,
//! [`LoggingSink`] only logs them.
//!
//! ```text
//! Classifier ──┐
//! Analog ──────┼──► Vec<Effect> ──► OutputSink
//! Wheel ───────┘        │
//!                       └──► EngineEvent observers
//! ```

pub mod channel;
pub mod effect;
pub mod logging;

pub use channel::{ChannelSink, OutputCommand};
pub use effect::{Effect, EngineEvent};
pub use logging::LoggingSink;

use crate::mapping::action::{Action, KeyCode, Modifiers, MouseButton, SystemCommand};

/// Phase tag of a live scroll gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollPhase {
    Began,
    Changed,
    Ended,
}

/// Phase tag of synthetic momentum scrolling after finger lift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MomentumPhase {
    Began,
    Continue,
    Ended,
}

/// Phase of a native magnify gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Began,
    Changed,
    Ended,
}

/// Abstract key/mouse/system synthesis backend.
///
/// Implementations must be cheap to call; the engine invokes them outside of
/// any lock, but still on its serial input path.
pub trait OutputSink: Send + Sync {
    fn press_key(&self, key: KeyCode, modifiers: Modifiers);
    fn key_down(&self, key: KeyCode, modifiers: Modifiers);
    fn key_up(&self, key: KeyCode, modifiers: Modifiers);
    fn hold_modifier(&self, modifiers: Modifiers);
    fn release_modifier(&self, modifiers: Modifiers);
    fn click_mouse(&self, button: MouseButton, modifiers: Modifiers);
    fn mouse_down(&self, button: MouseButton);
    fn mouse_up(&self, button: MouseButton);
    fn move_mouse(&self, dx: f64, dy: f64);
    fn scroll(
        &self,
        dx: f64,
        dy: f64,
        phase: Option<ScrollPhase>,
        momentum: Option<MomentumPhase>,
    );
    fn magnify(&self, magnification: f64, phase: GesturePhase);
    fn execute_macro(&self, id: &str);
    fn execute_system_command(&self, command: &SystemCommand);

    /// Fires an action once.
    fn perform(&self, action: &Action) {
        if let Some(id) = &action.macro_id {
            self.execute_macro(id);
        } else if let Some(command) = &action.system_command {
            self.execute_system_command(command);
        } else if let Some(key) = action.key_code {
            self.press_key(key, action.modifiers);
        } else if let Some(button) = action.mouse_button {
            self.click_mouse(button, action.modifiers);
        } else if !action.modifiers.is_empty() {
            self.hold_modifier(action.modifiers);
            self.release_modifier(action.modifiers);
        }
    }

    /// Starts holding an action until [`stop_hold_mapping`](Self::stop_hold_mapping).
    fn start_hold_mapping(&self, action: &Action) {
        if action.macro_id.is_some() || action.system_command.is_some() {
            self.perform(action);
            return;
        }
        if !action.modifiers.is_empty() {
            self.hold_modifier(action.modifiers);
        }
        if let Some(key) = action.key_code {
            self.key_down(key, action.modifiers);
        } else if let Some(button) = action.mouse_button {
            self.mouse_down(button);
        }
    }

    fn stop_hold_mapping(&self, action: &Action) {
        if action.macro_id.is_some() || action.system_command.is_some() {
            return;
        }
        if let Some(key) = action.key_code {
            self.key_up(key, action.modifiers);
        } else if let Some(button) = action.mouse_button {
            self.mouse_up(button);
        }
        if !action.modifiers.is_empty() {
            self.release_modifier(action.modifiers);
        }
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use std::sync::Mutex;

    /// Sink that records every command for assertions.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSink {
        commands: Mutex<Vec<OutputCommand>>,
    }

    impl RecordingSink {
        pub(crate) fn take(&self) -> Vec<OutputCommand> {
            std::mem::take(&mut *self.commands.lock().unwrap())
        }

        pub(crate) fn snapshot(&self) -> Vec<OutputCommand> {
            self.commands.lock().unwrap().clone()
        }

        fn push(&self, command: OutputCommand) {
            self.commands.lock().unwrap().push(command);
        }
    }

    impl OutputSink for RecordingSink {
        fn press_key(&self, key: KeyCode, modifiers: Modifiers) {
            self.push(OutputCommand::PressKey { key, modifiers });
        }
        fn key_down(&self, key: KeyCode, modifiers: Modifiers) {
            self.push(OutputCommand::KeyDown { key, modifiers });
        }
        fn key_up(&self, key: KeyCode, modifiers: Modifiers) {
            self.push(OutputCommand::KeyUp { key, modifiers });
        }
        fn hold_modifier(&self, modifiers: Modifiers) {
            self.push(OutputCommand::HoldModifier(modifiers));
        }
        fn release_modifier(&self, modifiers: Modifiers) {
            self.push(OutputCommand::ReleaseModifier(modifiers));
        }
        fn click_mouse(&self, button: MouseButton, modifiers: Modifiers) {
            self.push(OutputCommand::ClickMouse { button, modifiers });
        }
        fn mouse_down(&self, button: MouseButton) {
            self.push(OutputCommand::MouseDown(button));
        }
        fn mouse_up(&self, button: MouseButton) {
            self.push(OutputCommand::MouseUp(button));
        }
        fn move_mouse(&self, dx: f64, dy: f64) {
            self.push(OutputCommand::MoveMouse { dx, dy });
        }
        fn scroll(
            &self,
            dx: f64,
            dy: f64,
            phase: Option<ScrollPhase>,
            momentum: Option<MomentumPhase>,
        ) {
            self.push(OutputCommand::Scroll {
                dx,
                dy,
                phase,
                momentum,
            });
        }
        fn magnify(&self, magnification: f64, phase: GesturePhase) {
            self.push(OutputCommand::Magnify {
                magnification,
                phase,
            });
        }
        fn execute_macro(&self, id: &str) {
            self.push(OutputCommand::Macro(id.to_string()));
        }
        fn execute_system_command(&self, command: &SystemCommand) {
            self.push(OutputCommand::System(command.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::recording::RecordingSink;
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn hold_and_release_are_symmetric() {
        let sink = RecordingSink::default();
        let action = Action::key(KeyCode::W, Modifiers::SHIFT);
        sink.start_hold_mapping(&action);
        sink.stop_hold_mapping(&action);
        assert_eq!(
            sink.take(),
            vec![
                OutputCommand::HoldModifier(Modifiers::SHIFT),
                OutputCommand::KeyDown {
                    key: KeyCode::W,
                    modifiers: Modifiers::SHIFT
                },
                OutputCommand::KeyUp {
                    key: KeyCode::W,
                    modifiers: Modifiers::SHIFT
                },
                OutputCommand::ReleaseModifier(Modifiers::SHIFT),
            ]
        );
    }

    #[test]
    fn perform_prefers_macro_over_key() {
        let sink = RecordingSink::default();
        let mut action = Action::key(KeyCode::W, Modifiers::NONE);
        action.macro_id = Some("m1".into());
        sink.perform(&action);
        assert_eq!(sink.take(), vec![OutputCommand::Macro("m1".into())]);
    }

    #[test]
    fn modifier_only_action_taps_modifier() {
        let sink = RecordingSink::default();
        sink.perform(&Action::modifier(Modifiers::COMMAND));
        assert_eq!(
            sink.take(),
            vec![
                OutputCommand::HoldModifier(Modifiers::COMMAND),
                OutputCommand::ReleaseModifier(Modifiers::COMMAND),
            ]
        );
    }
}
