//! Profiles, layers and the shared profile snapshot.
//!
//! A [`Profile`] is an immutable value. The engine reads it through a
//! [`ProfileSource`], taking an `Arc` snapshot at the start of each logical
//! operation; [`ProfileStore::swap`] replaces the whole reference, so a
//! running operation never observes a half-updated profile.

use crate::controller::button::{ButtonId, StickChannel};
use crate::mapping::action::{ActionMapping, KeyCode};
use crate::mapping::error::MappingError;
use crate::wheel::item::WheelItem;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Chord: an exact button set resolving to one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordMapping {
    pub buttons: BTreeSet<ButtonId>,
    pub action: ActionMapping,
}

impl ChordMapping {
    pub fn new(buttons: impl IntoIterator<Item = ButtonId>, action: ActionMapping) -> Self {
        Self {
            buttons: buttons.into_iter().collect(),
            action,
        }
    }
}

/// Overlay of button mappings, active while its activator is held.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Layer {
    pub id: String,
    pub activator: Option<ButtonId>,
    pub button_mappings: HashMap<ButtonId, ActionMapping>,
}

/// Per-application replacement mappings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppOverride {
    pub app_id: String,
    pub button_mappings: HashMap<ButtonId, ActionMapping>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StickMode {
    #[default]
    None,
    Mouse,
    Scroll,
    WasdKeys,
    ArrowKeys,
}

impl StickMode {
    /// Key codes for (up, down, left, right) in direction-key modes.
    pub fn direction_keys(self) -> Option<[KeyCode; 4]> {
        match self {
            StickMode::WasdKeys => Some([KeyCode::W, KeyCode::S, KeyCode::A, KeyCode::D]),
            StickMode::ArrowKeys => Some([
                KeyCode::UP_ARROW,
                KeyCode::DOWN_ARROW,
                KeyCode::LEFT_ARROW,
                KeyCode::RIGHT_ARROW,
            ]),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StickSettings {
    pub mode: StickMode,
    pub deadzone: f64,
    /// Output units per tick at full deflection.
    pub multiplier: f64,
    /// Acceleration curve exponent.
    pub acceleration: f64,
    pub invert_y: bool,
}

impl Default for StickSettings {
    fn default() -> Self {
        Self {
            mode: StickMode::None,
            deadzone: 0.15,
            multiplier: 18.0,
            acceleration: 1.8,
            invert_y: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingSettings {
    pub enabled: bool,
    pub min_cutoff_hz: f64,
    pub max_cutoff_hz: f64,
}

impl Default for SmoothingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_cutoff_hz: 1.5,
            max_cutoff_hz: 12.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollBoostSettings {
    pub enabled: bool,
    /// Peak |y| a deflection has to reach to count as a flick.
    pub flick_threshold: f64,
    /// Maximum time between two flicks of the same direction.
    pub window_ms: u64,
    pub multiplier: f64,
}

impl Default for ScrollBoostSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            flick_threshold: 0.7,
            window_ms: 400,
            multiplier: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoomMode {
    /// Native magnify gesture events.
    #[default]
    Native,
    /// Discrete Cmd+= / Cmd+- key presses.
    KeySteps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumSettings {
    pub enabled: bool,
    /// Exponential decay rate per second.
    pub decay_per_second: f64,
    /// Momentum ends below this speed (pixels per second).
    pub stop_velocity: f64,
    /// Momentum only starts above this release speed (pixels per second).
    pub min_start_velocity: f64,
    /// Number of recent deltas used to estimate the release velocity.
    pub velocity_samples: usize,
}

impl Default for MomentumSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            decay_per_second: 4.0,
            stop_velocity: 20.0,
            min_start_velocity: 80.0,
            velocity_samples: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TouchpadSettings {
    /// Pointer multiplier applied after the acceleration curve.
    pub sensitivity: f64,
    pub acceleration: f64,
    /// Deltas smaller than this are treated as no movement.
    pub min_delta: f64,
    pub smoothing_cutoff_hz: f64,
    /// Pixels of scroll per unit of two-finger center movement.
    pub pan_sensitivity: f64,
    pub pinch_deadzone: f64,
    pub pan_deadzone: f64,
    /// Pinch wins when pinch/pan exceeds this ratio.
    pub pinch_pan_ratio: f64,
    pub zoom_mode: ZoomMode,
    /// Accumulated distance change per Cmd+/- step.
    pub zoom_step_threshold: f64,
    /// Magnification per unit of distance change for native zoom.
    pub native_zoom_scale: f64,
    pub momentum: MomentumSettings,
}

impl Default for TouchpadSettings {
    fn default() -> Self {
        Self {
            sensitivity: 900.0,
            acceleration: 1.2,
            min_delta: 0.0005,
            smoothing_cutoff_hz: 10.0,
            pan_sensitivity: 600.0,
            pinch_deadzone: 0.002,
            pan_deadzone: 0.004,
            pinch_pan_ratio: 1.5,
            zoom_mode: ZoomMode::Native,
            zoom_step_threshold: 0.08,
            native_zoom_scale: 2.0,
            momentum: MomentumSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoystickSettings {
    pub left_stick: StickSettings,
    pub right_stick: StickSettings,
    pub smoothing: SmoothingSettings,
    pub scroll_boost: ScrollBoostSettings,
    /// Per-axis threshold for direction-key modes.
    pub direction_threshold: f64,
    pub touchpad: TouchpadSettings,
}

impl Default for JoystickSettings {
    fn default() -> Self {
        Self {
            left_stick: StickSettings {
                mode: StickMode::Mouse,
                ..Default::default()
            },
            right_stick: StickSettings {
                mode: StickMode::Scroll,
                multiplier: 6.0,
                acceleration: 2.0,
                ..Default::default()
            },
            smoothing: SmoothingSettings::default(),
            scroll_boost: ScrollBoostSettings::default(),
            direction_threshold: 0.4,
            touchpad: TouchpadSettings::default(),
        }
    }
}

impl JoystickSettings {
    pub fn stick(&self, channel: StickChannel) -> &StickSettings {
        match channel {
            StickChannel::Left => &self.left_stick,
            StickChannel::Right => &self.right_stick,
        }
    }
}

/// Command wheel wiring inside a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandWheelSettings {
    pub activator: ButtonId,
    #[serde(default)]
    pub alternate_modifier: Option<ButtonId>,
    #[serde(default = "default_wheel_stick")]
    pub stick: StickChannel,
    #[serde(default)]
    pub show_alternate_first: bool,
    #[serde(default)]
    pub items: Vec<WheelItem>,
    #[serde(default)]
    pub alternate_items: Vec<WheelItem>,
}

fn default_wheel_stick() -> StickChannel {
    StickChannel::Right
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub name: String,
    pub button_mappings: HashMap<ButtonId, ActionMapping>,
    pub chords: Vec<ChordMapping>,
    pub layers: Vec<Layer>,
    pub app_overrides: Vec<AppOverride>,
    pub joystick: JoystickSettings,
    pub command_wheel: Option<CommandWheelSettings>,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, MappingError> {
        let profile: Profile = toml::from_str(text)?;
        profile.validate()?;
        debug!(
            "Parsed profile '{}' with {} mappings, {} chords, {} layers",
            profile.name,
            profile.button_mappings.len(),
            profile.chords.len(),
            profile.layers.len()
        );
        Ok(profile)
    }

    pub fn load(path: &Path) -> Result<Self, MappingError> {
        info!("Loading profile from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), MappingError> {
        let mut chord_sets = HashSet::new();
        for chord in &self.chords {
            let buttons: Vec<ButtonId> = chord.buttons.iter().copied().collect();
            if buttons.len() < 2 {
                return Err(MappingError::ChordTooSmall(buttons));
            }
            if !chord_sets.insert(chord.buttons.clone()) {
                return Err(MappingError::DuplicateChord(buttons));
            }
            validate_mapping(&format!("chord {:?}", buttons), &chord.action)?;
        }

        let mut activators = HashSet::new();
        let mut layer_ids = HashSet::new();
        for layer in &self.layers {
            if !layer_ids.insert(layer.id.as_str()) {
                return Err(MappingError::DuplicateLayer(layer.id.clone()));
            }
            if let Some(activator) = layer.activator {
                if !activators.insert(activator) {
                    return Err(MappingError::DuplicateLayerActivator(activator));
                }
                if self.is_chord_member(activator) {
                    return Err(MappingError::ActivatorInChord(activator));
                }
            }
            for (button, mapping) in &layer.button_mappings {
                validate_mapping(&format!("{} in layer {}", button, layer.id), mapping)?;
            }
        }

        for (button, mapping) in &self.button_mappings {
            validate_mapping(&button.to_string(), mapping)?;
        }
        for app in &self.app_overrides {
            for (button, mapping) in &app.button_mappings {
                validate_mapping(&format!("{} for {}", button, app.app_id), mapping)?;
            }
        }

        if let Some(wheel) = &self.command_wheel {
            if wheel.items.is_empty() && wheel.alternate_items.is_empty() {
                return Err(MappingError::WheelError("wheel has no items".to_string()));
            }
            if Some(wheel.activator) == wheel.alternate_modifier {
                return Err(MappingError::WheelError(
                    "activator and alternate modifier must differ".to_string(),
                ));
            }
            if activators.contains(&wheel.activator) {
                return Err(MappingError::WheelError(format!(
                    "{} is already a layer activator",
                    wheel.activator
                )));
            }
        }
        Ok(())
    }

    pub fn layer(&self, id: &str) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.id == id)
    }

    pub fn layer_for_activator(&self, button: ButtonId) -> Option<&Layer> {
        self.layers
            .iter()
            .find(|layer| layer.activator == Some(button))
    }

    pub fn is_layer_activator(&self, button: ButtonId) -> bool {
        self.layer_for_activator(button).is_some()
    }

    pub fn is_chord_member(&self, button: ButtonId) -> bool {
        self.chords.iter().any(|chord| chord.buttons.contains(&button))
    }

    /// Button drives the command wheel and never resolves to a mapping.
    pub fn is_wheel_button(&self, button: ButtonId) -> bool {
        self.command_wheel.as_ref().is_some_and(|wheel| {
            wheel.activator == button || wheel.alternate_modifier == Some(button)
        })
    }

    pub fn app_override(&self, app_id: &str) -> Option<&AppOverride> {
        self.app_overrides.iter().find(|app| app.app_id == app_id)
    }
}

fn validate_mapping(owner: &str, mapping: &ActionMapping) -> Result<(), MappingError> {
    let invalid = |reason: &str| MappingError::InvalidTiming {
        button: owner.to_string(),
        reason: reason.to_string(),
    };
    if let Some(long_hold) = &mapping.long_hold {
        if long_hold.threshold_ms == 0 {
            return Err(invalid("long hold threshold must be positive"));
        }
    }
    if let Some(double_tap) = &mapping.double_tap {
        if double_tap.threshold_ms == 0 {
            return Err(invalid("double tap threshold must be positive"));
        }
    }
    if let Some(repeat) = &mapping.repeat {
        if repeat.enabled && repeat.interval_ms == 0 {
            return Err(invalid("repeat interval must be positive"));
        }
    }
    Ok(())
}

/// Read access to the current profile snapshot.
pub trait ProfileSource: Send + Sync {
    fn snapshot(&self) -> Arc<Profile>;
}

/// Owner of the active profile; hands out watch receivers to readers.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    sender: Arc<watch::Sender<Arc<Profile>>>,
}

impl ProfileStore {
    pub fn new(profile: Profile) -> Self {
        let (sender, _) = watch::channel(Arc::new(profile));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Profile>> {
        self.sender.subscribe()
    }

    /// Replaces the active profile. Subscribers see the change on their next
    /// `changed()`; readers holding an older snapshot keep it.
    pub fn swap(&self, profile: Profile) -> Result<(), MappingError> {
        profile.validate()?;
        info!("Switching to profile '{}'", profile.name);
        self.sender.send_replace(Arc::new(profile));
        Ok(())
    }
}

impl ProfileSource for ProfileStore {
    fn snapshot(&self) -> Arc<Profile> {
        self.sender.borrow().clone()
    }
}

impl ProfileSource for watch::Receiver<Arc<Profile>> {
    fn snapshot(&self) -> Arc<Profile> {
        self.borrow().clone()
    }
}
