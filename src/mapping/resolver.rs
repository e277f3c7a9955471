//! Action resolution: pure lookups from inputs to mappings.
//!
//! Nothing in here holds locks or timers. The classifier calls these with a
//! profile snapshot and its own layer stack.

use crate::controller::button::ButtonId;
use crate::mapping::action::{Action, ActionMapping, SystemCommand};
use crate::mapping::profile::{ChordMapping, Profile};
use crate::wheel::item::{WheelItem, WheelItemKind, WheelZone};
use std::collections::BTreeSet;

/// Ordered set of held layers; the most recently activated one wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerStack {
    layers: Vec<String>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts `id` on top. An id already in the stack is moved, not duplicated.
    pub fn activate(&mut self, id: &str) {
        self.layers.retain(|layer| layer != id);
        self.layers.push(id.to_string());
    }

    /// Removes `id` wherever it sits. Returns false if it was not held.
    pub fn deactivate(&mut self, id: &str) -> bool {
        let before = self.layers.len();
        self.layers.retain(|layer| layer != id);
        before != self.layers.len()
    }

    pub fn active(&self) -> Option<&str> {
        self.layers.last().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.layers.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Effective mapping for `button`: active layer, then application override,
/// then the base profile.
pub fn resolve_button<'p>(
    profile: &'p Profile,
    button: ButtonId,
    layers: &LayerStack,
    frontmost_app: Option<&str>,
) -> Option<&'p ActionMapping> {
    if let Some(mapping) = layers
        .active()
        .and_then(|id| profile.layer(id))
        .and_then(|layer| layer.button_mappings.get(&button))
    {
        return Some(mapping);
    }
    if let Some(mapping) = frontmost_app
        .and_then(|app| profile.app_override(app))
        .and_then(|app| app.button_mappings.get(&button))
    {
        return Some(mapping);
    }
    profile.button_mappings.get(&button)
}

/// Outcome of closing a chord capture window.
#[derive(Debug, Clone, PartialEq)]
pub enum ChordResolution {
    /// Every captured button was a layer activator or wheel button.
    Nothing,
    /// One real member left: ordinary single-button handling.
    Single(ButtonId),
    /// Exact match against a chord mapping.
    Chord(ChordMapping),
    /// No match: resolve each member on its own, ascending order.
    Individual(Vec<ButtonId>),
}

fn chord_candidates(profile: &Profile, captured: &BTreeSet<ButtonId>) -> BTreeSet<ButtonId> {
    captured
        .iter()
        .copied()
        .filter(|button| !profile.is_layer_activator(*button) && !profile.is_wheel_button(*button))
        .collect()
}

pub fn resolve_chord(profile: &Profile, captured: &BTreeSet<ButtonId>) -> ChordResolution {
    let members = chord_candidates(profile, captured);
    match members.len() {
        0 => ChordResolution::Nothing,
        1 => members
            .iter()
            .next()
            .copied()
            .map_or(ChordResolution::Nothing, ChordResolution::Single),
        _ => match profile.chords.iter().find(|chord| chord.buttons == members) {
            Some(chord) => ChordResolution::Chord(chord.clone()),
            None => ChordResolution::Individual(members.into_iter().collect()),
        },
    }
}

/// True when `captured` is a strict subset of some chord, so waiting for
/// more buttons could still complete it.
pub fn is_chord_prefix(profile: &Profile, captured: &BTreeSet<ButtonId>) -> bool {
    let members = chord_candidates(profile, captured);
    profile
        .chords
        .iter()
        .any(|chord| chord.buttons.len() > members.len() && members.is_subset(&chord.buttons))
}

/// Action behind a wheel item for the zone it was activated in.
pub fn resolve_wheel_action(item: &WheelItem, zone: WheelZone) -> Action {
    match &item.kind {
        WheelItemKind::App { app_id } => {
            let app_id = app_id.clone();
            Action::system(match zone {
                WheelZone::Normal => SystemCommand::LaunchApp { app_id },
                WheelZone::FullDeflection => SystemCommand::OpenNewWindow { app_id },
                WheelZone::LongHold => SystemCommand::ForceQuitApp { app_id },
            })
        }
        WheelItemKind::Website { url } => Action::system(SystemCommand::OpenUrl {
            url: url.clone(),
            private: zone != WheelZone::Normal,
        }),
        WheelItemKind::Action { action } => action.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::action::{KeyCode, Modifiers};
    use crate::mapping::profile::{AppOverride, Layer};
    use pretty_assertions::assert_eq;

    fn key(code: KeyCode) -> ActionMapping {
        ActionMapping::new(Action::key(code, Modifiers::NONE))
    }

    fn profile() -> Profile {
        let mut profile = Profile::new("test");
        profile.button_mappings.insert(ButtonId::A, key(KeyCode::RETURN));
        profile.button_mappings.insert(ButtonId::B, key(KeyCode::ESCAPE));
        profile.chords.push(ChordMapping::new(
            [ButtonId::A, ButtonId::B],
            key(KeyCode::TAB),
        ));
        profile.chords.push(ChordMapping::new(
            [ButtonId::X, ButtonId::Y, ButtonId::A],
            key(KeyCode::SPACE),
        ));
        profile.layers.push(Layer {
            id: "nav".into(),
            activator: Some(ButtonId::LeftBumper),
            button_mappings: [(ButtonId::A, key(KeyCode::UP_ARROW))].into_iter().collect(),
        });
        profile.layers.push(Layer {
            id: "media".into(),
            activator: Some(ButtonId::RightBumper),
            button_mappings: Default::default(),
        });
        profile.app_overrides.push(AppOverride {
            app_id: "com.example.editor".into(),
            button_mappings: [(ButtonId::B, key(KeyCode::SPACE))].into_iter().collect(),
        });
        profile
    }

    #[test]
    fn layer_stack_last_activated_wins() {
        let mut stack = LayerStack::new();
        stack.activate("l1");
        stack.activate("l2");
        assert_eq!(stack.active(), Some("l2"));
        stack.deactivate("l1");
        assert_eq!(stack.active(), Some("l2"));
        stack.deactivate("l2");
        assert_eq!(stack.active(), None);
    }

    #[test]
    fn duplicate_activation_moves_to_top() {
        let mut stack = LayerStack::new();
        stack.activate("l1");
        stack.activate("l2");
        stack.activate("l1");
        assert_eq!(stack.active(), Some("l1"));
        stack.deactivate("l1");
        assert_eq!(stack.active(), Some("l2"));
        assert!(!stack.deactivate("l1"));
    }

    #[test]
    fn layer_mapping_overrides_base_and_falls_through() {
        let profile = profile();
        let mut stack = LayerStack::new();
        stack.activate("nav");
        let a = resolve_button(&profile, ButtonId::A, &stack, None).unwrap();
        assert_eq!(a.action.key_code, Some(KeyCode::UP_ARROW));
        let b = resolve_button(&profile, ButtonId::B, &stack, None).unwrap();
        assert_eq!(b.action.key_code, Some(KeyCode::ESCAPE));
        assert!(resolve_button(&profile, ButtonId::Y, &stack, None).is_none());
    }

    #[test]
    fn app_override_applies_below_layers() {
        let profile = profile();
        let stack = LayerStack::new();
        let b = resolve_button(&profile, ButtonId::B, &stack, Some("com.example.editor")).unwrap();
        assert_eq!(b.action.key_code, Some(KeyCode::SPACE));
        let b = resolve_button(&profile, ButtonId::B, &stack, Some("other")).unwrap();
        assert_eq!(b.action.key_code, Some(KeyCode::ESCAPE));
    }

    #[test]
    fn chord_matching_is_exact_and_strips_activators() {
        let profile = profile();
        let set = |buttons: &[ButtonId]| buttons.iter().copied().collect::<BTreeSet<_>>();

        match resolve_chord(&profile, &set(&[ButtonId::B, ButtonId::A, ButtonId::LeftBumper])) {
            ChordResolution::Chord(chord) => {
                assert_eq!(chord.action.action.key_code, Some(KeyCode::TAB))
            }
            other => panic!("expected chord, got {:?}", other),
        }
        assert_eq!(
            resolve_chord(&profile, &set(&[ButtonId::A, ButtonId::LeftBumper])),
            ChordResolution::Single(ButtonId::A)
        );
        assert_eq!(
            resolve_chord(&profile, &set(&[ButtonId::LeftBumper, ButtonId::RightBumper])),
            ChordResolution::Nothing
        );
        assert_eq!(
            resolve_chord(&profile, &set(&[ButtonId::Y, ButtonId::B])),
            ChordResolution::Individual(vec![ButtonId::B, ButtonId::Y])
        );
    }

    #[test]
    fn prefix_detection() {
        let profile = profile();
        let set = |buttons: &[ButtonId]| buttons.iter().copied().collect::<BTreeSet<_>>();
        assert!(is_chord_prefix(&profile, &set(&[ButtonId::X, ButtonId::Y])));
        assert!(!is_chord_prefix(&profile, &set(&[ButtonId::A, ButtonId::B, ButtonId::X, ButtonId::Y])));
    }

    #[test]
    fn wheel_zones_map_to_commands() {
        let app = WheelItem::app("Term", "com.example.term");
        assert_eq!(
            resolve_wheel_action(&app, WheelZone::LongHold).system_command,
            Some(SystemCommand::ForceQuitApp {
                app_id: "com.example.term".into()
            })
        );
        let site = WheelItem::website("Docs", "https://example.com");
        assert_eq!(
            resolve_wheel_action(&site, WheelZone::LongHold).system_command,
            Some(SystemCommand::OpenUrl {
                url: "https://example.com".into(),
                private: true
            })
        );
        assert_eq!(
            resolve_wheel_action(&site, WheelZone::Normal).system_command,
            Some(SystemCommand::OpenUrl {
                url: "https://example.com".into(),
                private: false
            })
        );
    }
}
