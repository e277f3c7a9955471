//! Declarative action descriptions loaded from a profile.
//!
//! These values are immutable once loaded. The engine looks them up and hands
//! them to an output sink; it never mutates them.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::ops::BitOr;
use std::time::Duration;

/// Virtual key code understood by the output backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyCode(pub u16);

impl KeyCode {
    pub const A: KeyCode = KeyCode(0);
    pub const S: KeyCode = KeyCode(1);
    pub const D: KeyCode = KeyCode(2);
    pub const W: KeyCode = KeyCode(13);
    pub const EQUAL: KeyCode = KeyCode(24);
    pub const MINUS: KeyCode = KeyCode(27);
    pub const RETURN: KeyCode = KeyCode(36);
    pub const TAB: KeyCode = KeyCode(48);
    pub const SPACE: KeyCode = KeyCode(49);
    pub const ESCAPE: KeyCode = KeyCode(53);
    pub const LEFT_ARROW: KeyCode = KeyCode(123);
    pub const RIGHT_ARROW: KeyCode = KeyCode(124);
    pub const DOWN_ARROW: KeyCode = KeyCode(125);
    pub const UP_ARROW: KeyCode = KeyCode(126);
}

impl Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key#{}", self.0)
    }
}

/// Modifier flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Modifiers {
    pub command: bool,
    pub option: bool,
    pub control: bool,
    pub shift: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        command: false,
        option: false,
        control: false,
        shift: false,
    };
    pub const COMMAND: Modifiers = Modifiers {
        command: true,
        ..Modifiers::NONE
    };
    pub const OPTION: Modifiers = Modifiers {
        option: true,
        ..Modifiers::NONE
    };
    pub const CONTROL: Modifiers = Modifiers {
        control: true,
        ..Modifiers::NONE
    };
    pub const SHIFT: Modifiers = Modifiers {
        shift: true,
        ..Modifiers::NONE
    };

    pub fn is_empty(&self) -> bool {
        *self == Modifiers::NONE
    }
}

impl BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Self) -> Self::Output {
        Modifiers {
            command: self.command || rhs.command,
            option: self.option || rhs.option,
            control: self.control || rhs.control,
            shift: self.shift || rhs.shift,
        }
    }
}

impl Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.control {
            parts.push("Ctrl");
        }
        if self.option {
            parts.push("Opt");
        }
        if self.shift {
            parts.push("Shift");
        }
        if self.command {
            parts.push("Cmd");
        }
        write!(f, "{}", parts.join("+"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// OS-level command executed by the output backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemCommand {
    LaunchApp {
        app_id: String,
    },
    OpenNewWindow {
        app_id: String,
    },
    ForceQuitApp {
        app_id: String,
    },
    OpenUrl {
        url: String,
        #[serde(default)]
        private: bool,
    },
}

/// The leaf of a mapping: what actually gets emitted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Action {
    pub key_code: Option<KeyCode>,
    pub mouse_button: Option<MouseButton>,
    pub modifiers: Modifiers,
    pub macro_id: Option<String>,
    pub system_command: Option<SystemCommand>,
    /// Free-form label shown by overlays.
    pub hint: Option<String>,
}

impl Action {
    pub fn key(key_code: KeyCode, modifiers: Modifiers) -> Self {
        Self {
            key_code: Some(key_code),
            modifiers,
            ..Default::default()
        }
    }

    pub fn mouse(button: MouseButton) -> Self {
        Self {
            mouse_button: Some(button),
            ..Default::default()
        }
    }

    pub fn modifier(modifiers: Modifiers) -> Self {
        Self {
            modifiers,
            ..Default::default()
        }
    }

    pub fn macro_ref(id: impl Into<String>) -> Self {
        Self {
            macro_id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn system(command: SystemCommand) -> Self {
        Self {
            system_command: Some(command),
            ..Default::default()
        }
    }

    /// Nothing would be emitted for this action.
    pub fn is_empty(&self) -> bool {
        self.key_code.is_none()
            && self.mouse_button.is_none()
            && self.modifiers.is_empty()
            && self.macro_id.is_none()
            && self.system_command.is_none()
    }

    pub fn is_mouse_click(&self) -> bool {
        self.mouse_button.is_some() && self.key_code.is_none()
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(hint) = &self.hint {
            return f.write_str(hint);
        }
        if let Some(id) = &self.macro_id {
            return write!(f, "macro:{}", id);
        }
        if let Some(command) = &self.system_command {
            return write!(f, "{:?}", command);
        }
        match (self.key_code, self.mouse_button) {
            (Some(key), _) if self.modifiers.is_empty() => write!(f, "{}", key),
            (Some(key), _) => write!(f, "{}+{}", self.modifiers, key),
            (None, Some(button)) => write!(f, "mouse:{:?}", button),
            (None, None) if !self.modifiers.is_empty() => write!(f, "{}", self.modifiers),
            (None, None) => f.write_str("<none>"),
        }
    }
}

/// Alternate action gated by a duration threshold (long hold or double tap).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedAction {
    pub threshold_ms: u64,
    #[serde(flatten)]
    pub action: Action,
}

impl TimedAction {
    pub fn new(threshold: Duration, action: Action) -> Self {
        Self {
            threshold_ms: threshold.as_millis() as u64,
            action,
        }
    }

    pub fn threshold(&self) -> Duration {
        Duration::from_millis(self.threshold_ms)
    }
}

/// Auto-repeat while held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatSpec {
    #[serde(default = "default_repeat_enabled")]
    pub enabled: bool,
    pub interval_ms: u64,
}

fn default_repeat_enabled() -> bool {
    true
}

impl RepeatSpec {
    pub fn every(interval: Duration) -> Self {
        Self {
            enabled: true,
            interval_ms: interval.as_millis() as u64,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// What a button, chord or layer entry does.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionMapping {
    #[serde(flatten)]
    pub action: Action,
    pub long_hold: Option<TimedAction>,
    pub double_tap: Option<TimedAction>,
    pub repeat: Option<RepeatSpec>,
    /// Emit on press and keep it held until release instead of tapping.
    pub is_hold_modifier: bool,
}

impl ActionMapping {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            ..Default::default()
        }
    }

    pub fn hold(action: Action) -> Self {
        Self {
            action,
            is_hold_modifier: true,
            ..Default::default()
        }
    }

    pub fn with_long_hold(mut self, threshold: Duration, action: Action) -> Self {
        self.long_hold = Some(TimedAction::new(threshold, action));
        self
    }

    pub fn with_double_tap(mut self, threshold: Duration, action: Action) -> Self {
        self.double_tap = Some(TimedAction::new(threshold, action));
        self
    }

    pub fn with_repeat(mut self, interval: Duration) -> Self {
        self.repeat = Some(RepeatSpec::every(interval));
        self
    }

    pub fn repeat_interval(&self) -> Option<Duration> {
        self.repeat
            .as_ref()
            .filter(|spec| spec.enabled && spec.interval_ms > 0)
            .map(RepeatSpec::interval)
    }

    pub fn is_empty(&self) -> bool {
        self.action.is_empty()
            && self.long_hold.is_none()
            && self.double_tap.is_none()
            && !self.is_hold_modifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifiers_combine() {
        let m = Modifiers::COMMAND | Modifiers::SHIFT;
        assert!(m.command && m.shift && !m.option);
        assert_eq!(m.to_string(), "Shift+Cmd");
    }

    #[test]
    fn mapping_parses_from_toml() {
        let text = r#"
            key_code = 13
            is_hold_modifier = false

            [modifiers]
            command = true

            [long_hold]
            threshold_ms = 400
            macro_id = "save-all"

            [repeat]
            interval_ms = 50
        "#;
        let mapping: ActionMapping = toml::from_str(text).unwrap();
        assert_eq!(mapping.action.key_code, Some(KeyCode::W));
        assert!(mapping.action.modifiers.command);
        let long_hold = mapping.long_hold.unwrap();
        assert_eq!(long_hold.threshold(), Duration::from_millis(400));
        assert_eq!(long_hold.action.macro_id.as_deref(), Some("save-all"));
        assert_eq!(mapping.repeat.unwrap().interval(), Duration::from_millis(50));
    }

    #[test]
    fn disabled_repeat_has_no_interval() {
        let mut mapping = ActionMapping::new(Action::key(KeyCode::SPACE, Modifiers::NONE))
            .with_repeat(Duration::from_millis(30));
        assert_eq!(mapping.repeat_interval(), Some(Duration::from_millis(30)));
        mapping.repeat.as_mut().unwrap().enabled = false;
        assert_eq!(mapping.repeat_interval(), None);
    }

    #[test]
    fn empty_action_detection() {
        assert!(Action::default().is_empty());
        assert!(!Action::modifier(Modifiers::SHIFT).is_empty());
        assert!(Action::mouse(MouseButton::Left).is_mouse_click());
    }
}
