//! Command wheel items.

use crate::mapping::action::Action;
use serde::{Deserialize, Serialize};

/// What a wheel segment launches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WheelItemKind {
    App { app_id: String },
    Website { url: String },
    Action { action: Action },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WheelItem {
    pub label: String,
    #[serde(flatten)]
    pub kind: WheelItemKind,
}

impl WheelItem {
    pub fn app(label: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: WheelItemKind::App {
                app_id: app_id.into(),
            },
        }
    }

    pub fn website(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: WheelItemKind::Website { url: url.into() },
        }
    }

    pub fn action(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            kind: WheelItemKind::Action { action },
        }
    }
}

/// Which activation zone a selection was made in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WheelZone {
    /// Inside the selection ring.
    Normal,
    /// Pushed to the rim.
    FullDeflection,
    /// Held at the rim until the progress ramp completed.
    LongHold,
}

impl WheelZone {
    /// Zone picked by `(is_full_deflection, progress >= 1)`.
    pub fn from_state(is_full_deflection: bool, progress: f64) -> Self {
        match (is_full_deflection, progress >= 1.0) {
            (true, true) => WheelZone::LongHold,
            (true, false) => WheelZone::FullDeflection,
            (false, _) => WheelZone::Normal,
        }
    }
}

/// Result of `activate_selection`.
#[derive(Debug, Clone, PartialEq)]
pub struct WheelActivation {
    pub index: usize,
    pub item: WheelItem,
    pub zone: WheelZone,
}
