//! Button Edge Classifier.
//!
//! Turns press/release edges into resolved actions: single tap, double tap,
//! long hold, chord, repeat and hold-start/hold-end. The classifier is a
//! plain synchronous state machine. Every entry point returns the effects
//! it produced and never talks to the output sink itself; the caller holds
//! the lock around the call and applies the effects afterwards.
//!
//! Deferred work (chord window expiry, long hold, pending single taps,
//! repeat ticks) lives in a [`TimerQueue`]. Timers due strictly before an
//! edge are fired before that edge is handled, so timers and edges for the
//! same button are processed in timestamp order.
//!
//! Per-button phases:
//!
//! ```text
//! Idle ─press─► ChordMember ─window─► AwaitingLongHold ─release─► Idle
//!   │               └─────chord─────► ActiveChord ─────release─► Idle
//!   ├──press──► HeldModifier ─────────────────────────release─► Idle
//!   └──press──► LayerActivator ───────────────────────release─► Idle
//! ```
//!
//! Pending single taps (double-tap window, chord release delay) outlive the
//! press and are tracked next to the phase.

use super::chord::{ChordCandidateWindow, ReleasedMember};
use super::timers::{TimerId, TimerQueue};
use crate::controller::button::ButtonId;
use crate::mapping::action::{Action, ActionMapping};
use crate::mapping::profile::{ChordMapping, Profile};
use crate::mapping::resolver::{
    is_chord_prefix, resolve_button, resolve_chord, ChordResolution, LayerStack,
};
use crate::output::{Effect, EngineEvent};
use crate::timing::{is_long_hold, within};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierSettings {
    /// How long the first chord-eligible press waits for partners.
    pub chord_window: Duration,
    /// Delay of a chord member's single tap after release.
    pub chord_release_delay: Duration,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            chord_window: Duration::from_millis(150),
            chord_release_delay: Duration::from_millis(40),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassifierTimer {
    ChordWindow,
    LongHold(ButtonId),
    Repeat(ButtonId),
    PendingTap(ButtonId),
}

#[derive(Debug, Clone, PartialEq, Default)]
enum ButtonPhase {
    #[default]
    Idle,
    LayerActivator(String),
    /// Captured by the open chord window.
    ChordMember,
    /// Part of a chord that fired; the release is swallowed.
    ActiveChord,
    HeldModifier(Action),
    /// Individual press, classified on release or by the long-hold timer.
    AwaitingLongHold,
    /// Already resolved at press time.
    Swallowed,
    Unmapped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingTapKind {
    DoubleTapWindow,
    ChordRelease,
}

#[derive(Debug, Clone)]
struct PendingTap {
    timer: TimerId,
    kind: PendingTapKind,
    action: Action,
    released_at: Instant,
    hold_duration: Duration,
}

#[derive(Debug, Clone, Default)]
struct ButtonRuntimeState {
    is_down: bool,
    pressed_at: Option<Instant>,
    last_tap_at: Option<Instant>,
    phase: ButtonPhase,
    // Resolved at press time so a layer change mid-press cannot swap it
    mapping: Option<ActionMapping>,
    long_hold_timer: Option<TimerId>,
    repeat_timer: Option<TimerId>,
    long_hold_fired: bool,
    repeated: bool,
    pending_tap: Option<PendingTap>,
}

#[derive(Debug, Clone)]
struct ActiveChord {
    members: BTreeSet<ButtonId>,
    held: Option<Action>,
}

#[derive(Debug)]
pub struct ButtonClassifier {
    settings: ClassifierSettings,
    states: BTreeMap<ButtonId, ButtonRuntimeState>,
    timers: TimerQueue<ClassifierTimer>,
    window: Option<ChordCandidateWindow>,
    active_chords: Vec<ActiveChord>,
    layers: LayerStack,
    frontmost_app: Option<String>,
}

fn layer_changed(layers: &LayerStack) -> Effect {
    Effect::Notify(EngineEvent::LayerChanged(layers.active().map(str::to_string)))
}

impl ButtonClassifier {
    pub fn new(settings: ClassifierSettings) -> Self {
        Self {
            settings,
            states: BTreeMap::new(),
            timers: TimerQueue::new(),
            window: None,
            active_chords: Vec::new(),
            layers: LayerStack::new(),
            frontmost_app: None,
        }
    }

    pub fn settings(&self) -> ClassifierSettings {
        self.settings
    }

    pub fn set_frontmost_app(&mut self, app_id: Option<String>) {
        self.frontmost_app = app_id;
    }

    pub fn active_layer(&self) -> Option<&str> {
        self.layers.active()
    }

    pub fn is_down(&self, button: ButtonId) -> bool {
        self.states.get(&button).is_some_and(|state| state.is_down)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn on_press(&mut self, profile: &Profile, button: ButtonId, at: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.fire_before(profile, at, &mut effects);

        let state = self.states.entry(button).or_default();
        if state.is_down {
            debug!("Ignoring duplicate press of {}", button);
            return effects;
        }
        state.is_down = true;
        state.pressed_at = Some(at);
        state.long_hold_fired = false;
        state.repeated = false;
        state.mapping = None;
        effects.push(Effect::Notify(EngineEvent::ButtonPressed(button)));

        if let Some(layer) = profile.layer_for_activator(button) {
            let id = layer.id.clone();
            info!("Layer '{}' activated by {}", id, button);
            self.layers.activate(&id);
            state.phase = ButtonPhase::LayerActivator(id);
            effects.push(layer_changed(&self.layers));
            return effects;
        }

        state.mapping =
            resolve_button(profile, button, &self.layers, self.frontmost_app.as_deref()).cloned();

        if profile.is_chord_member(button) {
            self.capture_chord_member(profile, button, at, &mut effects);
        } else {
            self.begin_press(profile, button, at, at, &mut effects);
        }
        effects
    }

    pub fn on_release(
        &mut self,
        profile: &Profile,
        button: ButtonId,
        at: Instant,
        hold_duration: Duration,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.fire_before(profile, at, &mut effects);

        let Some(state) = self.states.get_mut(&button).filter(|state| state.is_down) else {
            debug!("Ignoring release of {} without a recorded press", button);
            return effects;
        };
        state.is_down = false;
        let phase = std::mem::take(&mut state.phase);
        effects.push(Effect::Notify(EngineEvent::ButtonReleased {
            button,
            hold_duration,
        }));

        match phase {
            ButtonPhase::LayerActivator(id) => {
                if self.layers.deactivate(&id) {
                    info!("Layer '{}' released", id);
                    effects.push(layer_changed(&self.layers));
                }
            }
            ButtonPhase::ChordMember => {
                if let Some(window) = self.window.as_mut() {
                    window.record_release(button, at, hold_duration);
                }
            }
            ButtonPhase::ActiveChord => self.release_chord_member(button, &mut effects),
            ButtonPhase::HeldModifier(action) => {
                debug!("Stopping hold of {} on {}", action, button);
                if state.mapping.as_ref().is_some_and(|m| m.double_tap.is_some()) {
                    state.last_tap_at = Some(at);
                }
                effects.push(Effect::StopHold(action));
            }
            ButtonPhase::AwaitingLongHold => {
                self.classify_release(profile, button, at, hold_duration, true, &mut effects)
            }
            ButtonPhase::Swallowed | ButtonPhase::Unmapped | ButtonPhase::Idle => {}
        }
        effects
    }

    /// Fires every timer due at or before `now`.
    pub fn fire_due(&mut self, profile: &Profile, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        while let Some((id, deadline, timer)) = self.timers.pop_due(now) {
            self.fire_timer(profile, id, deadline, now, timer, &mut effects);
        }
        effects
    }

    /// Cancels all timers, stops every hold and clears the layer stack.
    pub fn reset(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        for (button, state) in std::mem::take(&mut self.states) {
            if let ButtonPhase::HeldModifier(action) = state.phase {
                debug!("Releasing hold of {} on {} during reset", action, button);
                effects.push(Effect::StopHold(action));
            }
        }
        for chord in self.active_chords.drain(..) {
            if let Some(action) = chord.held {
                effects.push(Effect::StopHold(action));
            }
        }
        self.timers.clear();
        self.window = None;
        if !self.layers.is_empty() {
            self.layers.clear();
            effects.push(layer_changed(&self.layers));
        }
        info!("Classifier reset, released {} held outputs", effects.len());
        effects
    }

    fn fire_before(&mut self, profile: &Profile, at: Instant, effects: &mut Vec<Effect>) {
        while let Some((id, deadline, timer)) = self.timers.pop_before(at) {
            self.fire_timer(profile, id, deadline, at, timer, effects);
        }
    }

    fn capture_chord_member(
        &mut self,
        profile: &Profile,
        button: ButtonId,
        at: Instant,
        effects: &mut Vec<Effect>,
    ) {
        // Same button again inside the window: it cannot be a chord any more
        if self
            .window
            .as_ref()
            .is_some_and(|window| window.released(button).is_some())
        {
            self.resolve_window(profile, at, effects);
        }

        if let Some(state) = self.states.get_mut(&button) {
            state.phase = ButtonPhase::ChordMember;
        }

        let window_open = self
            .window
            .as_ref()
            .is_some_and(|window| window.is_open_at(at));
        if window_open {
            if let Some(window) = self.window.as_mut() {
                window.capture(button);
                debug!("Chord window now holds {:?}", window.captured());
            }
        } else {
            if self.window.is_some() {
                self.resolve_window(profile, at, effects);
            }
            let timer = self
                .timers
                .schedule(at + self.settings.chord_window, ClassifierTimer::ChordWindow);
            let mut window =
                ChordCandidateWindow::open(button, at, self.settings.chord_window, timer);

            // Members still waiting out their release delay join the window
            for (other, state) in self.states.iter_mut() {
                let waiting = state
                    .pending_tap
                    .as_ref()
                    .is_some_and(|pending| pending.kind == PendingTapKind::ChordRelease);
                if *other == button || !waiting {
                    continue;
                }
                if let Some(pending) = state.pending_tap.take() {
                    self.timers.cancel(pending.timer);
                    window.capture_released(
                        *other,
                        ReleasedMember {
                            released_at: pending.released_at,
                            hold_duration: pending.hold_duration,
                        },
                    );
                }
            }
            debug!("Opened chord window with {:?}", window.captured());
            self.window = Some(window);
        }

        let captured = match &self.window {
            Some(window) => window.captured().clone(),
            None => return,
        };
        if captured.len() > 1 && !is_chord_prefix(profile, &captured) {
            self.resolve_window(profile, at, effects);
        }
    }

    /// Closes the chord window and resolves what it captured.
    fn resolve_window(&mut self, profile: &Profile, now: Instant, effects: &mut Vec<Effect>) {
        let Some(window) = self.window.take() else {
            return;
        };
        self.timers.cancel(window.timer());

        match resolve_chord(profile, window.captured()) {
            ChordResolution::Nothing => {}
            ChordResolution::Chord(chord) => self.fire_chord(chord, &window, effects),
            ChordResolution::Single(button) => {
                self.resolve_member(profile, button, &window, now, effects)
            }
            ChordResolution::Individual(buttons) => {
                debug!("No chord for {:?}, resolving individually", buttons);
                for button in buttons {
                    self.resolve_member(profile, button, &window, now, effects);
                }
            }
        }
    }

    fn fire_chord(
        &mut self,
        chord: ChordMapping,
        window: &ChordCandidateWindow,
        effects: &mut Vec<Effect>,
    ) {
        info!("Chord {:?} -> {}", chord.buttons, chord.action.action);
        effects.push(Effect::Notify(EngineEvent::ChordDetected(chord.buttons.clone())));

        let mut held_members = BTreeSet::new();
        for button in window.captured() {
            if let Some(state) = self.states.get_mut(button) {
                if state.is_down {
                    state.phase = ButtonPhase::ActiveChord;
                    held_members.insert(*button);
                } else {
                    state.phase = ButtonPhase::Idle;
                }
            }
        }

        let action = chord.action.action;
        if chord.action.is_hold_modifier && !held_members.is_empty() {
            effects.push(Effect::StartHold(action.clone()));
            self.active_chords.push(ActiveChord {
                members: held_members,
                held: Some(action),
            });
            return;
        }
        effects.push(Effect::Perform(action));
        if !held_members.is_empty() {
            self.active_chords.push(ActiveChord {
                members: held_members,
                held: None,
            });
        }
    }

    fn release_chord_member(&mut self, button: ButtonId, effects: &mut Vec<Effect>) {
        let Some(index) = self
            .active_chords
            .iter()
            .position(|chord| chord.members.contains(&button))
        else {
            return;
        };
        let chord = &mut self.active_chords[index];
        chord.members.remove(&button);
        // The first member to let go ends a held chord
        if let Some(action) = chord.held.take() {
            effects.push(Effect::StopHold(action));
        }
        if chord.members.is_empty() {
            self.active_chords.remove(index);
        }
    }

    fn resolve_member(
        &mut self,
        profile: &Profile,
        button: ButtonId,
        window: &ChordCandidateWindow,
        now: Instant,
        effects: &mut Vec<Effect>,
    ) {
        match window.released(button) {
            Some(member) => self.classify_release(
                profile,
                button,
                member.released_at,
                member.hold_duration,
                false,
                effects,
            ),
            None => {
                let pressed_at = self
                    .states
                    .get(&button)
                    .and_then(|state| state.pressed_at)
                    .unwrap_or(now);
                self.begin_press(profile, button, pressed_at, now, effects);
            }
        }
    }

    /// Individual press handling once chord capture is out of the way.
    /// Long-hold deadlines are measured from the physical press.
    fn begin_press(
        &mut self,
        profile: &Profile,
        button: ButtonId,
        pressed_at: Instant,
        now: Instant,
        effects: &mut Vec<Effect>,
    ) {
        let Some(state) = self.states.get_mut(&button) else {
            return;
        };
        let Some(mapping) = state.mapping.clone() else {
            debug!("{} is unmapped", button);
            state.phase = ButtonPhase::Unmapped;
            return;
        };

        let unambiguous_click = mapping.action.is_mouse_click()
            && !profile.is_chord_member(button)
            && mapping.double_tap.is_none()
            && mapping.long_hold.is_none();
        if mapping.is_hold_modifier || unambiguous_click {
            if let Some(double_tap) = &mapping.double_tap {
                if state
                    .last_tap_at
                    .is_some_and(|last| within(last, pressed_at, double_tap.threshold()))
                {
                    debug!("Double tap on held {} -> {}", button, double_tap.action);
                    state.last_tap_at = None;
                    state.phase = ButtonPhase::Swallowed;
                    effects.push(Effect::Perform(double_tap.action.clone()));
                    return;
                }
            }
            debug!("Holding {} on {}", mapping.action, button);
            state.phase = ButtonPhase::HeldModifier(mapping.action.clone());
            effects.push(Effect::StartHold(mapping.action));
            return;
        }

        state.phase = ButtonPhase::AwaitingLongHold;
        if let Some(long_hold) = &mapping.long_hold {
            state.long_hold_timer = Some(self.timers.schedule(
                pressed_at + long_hold.threshold(),
                ClassifierTimer::LongHold(button),
            ));
        }
        if let Some(interval) = mapping.repeat_interval() {
            state.repeated = true;
            effects.push(Effect::Perform(mapping.action.clone()));
            state.repeat_timer = Some(
                self.timers
                    .schedule(now + interval, ClassifierTimer::Repeat(button)),
            );
        }
    }

    /// Release classification: long hold, double tap, then single tap.
    fn classify_release(
        &mut self,
        profile: &Profile,
        button: ButtonId,
        at: Instant,
        hold_duration: Duration,
        allow_chord_delay: bool,
        effects: &mut Vec<Effect>,
    ) {
        let delay_single = allow_chord_delay && profile.is_chord_member(button);
        let Some(state) = self.states.get_mut(&button) else {
            return;
        };
        if let Some(id) = state.long_hold_timer.take() {
            self.timers.cancel(id);
        }
        if let Some(id) = state.repeat_timer.take() {
            self.timers.cancel(id);
        }
        let Some(mapping) = state.mapping.clone() else {
            return;
        };
        if state.long_hold_fired || state.repeated {
            return;
        }

        if let Some(long_hold) = &mapping.long_hold {
            if is_long_hold(hold_duration, long_hold.threshold()) {
                info!("Long hold on {} -> {}", button, long_hold.action);
                state.last_tap_at = None;
                effects.push(Effect::Perform(long_hold.action.clone()));
                return;
            }
        }

        if let Some(double_tap) = &mapping.double_tap {
            if state
                .last_tap_at
                .is_some_and(|last| within(last, at, double_tap.threshold()))
            {
                if let Some(pending) = state.pending_tap.take() {
                    self.timers.cancel(pending.timer);
                }
                state.last_tap_at = None;
                info!("Double tap on {} -> {}", button, double_tap.action);
                effects.push(Effect::Perform(double_tap.action.clone()));
            } else {
                state.last_tap_at = Some(at);
                let timer = self
                    .timers
                    .schedule(at + double_tap.threshold(), ClassifierTimer::PendingTap(button));
                state.pending_tap = Some(PendingTap {
                    timer,
                    kind: PendingTapKind::DoubleTapWindow,
                    action: mapping.action,
                    released_at: at,
                    hold_duration,
                });
            }
            return;
        }

        if delay_single {
            let timer = self.timers.schedule(
                at + self.settings.chord_release_delay,
                ClassifierTimer::PendingTap(button),
            );
            state.pending_tap = Some(PendingTap {
                timer,
                kind: PendingTapKind::ChordRelease,
                action: mapping.action,
                released_at: at,
                hold_duration,
            });
        } else {
            debug!("Tap on {} -> {}", button, mapping.action);
            effects.push(Effect::Perform(mapping.action));
        }
    }

    fn fire_timer(
        &mut self,
        profile: &Profile,
        id: TimerId,
        deadline: Instant,
        now: Instant,
        timer: ClassifierTimer,
        effects: &mut Vec<Effect>,
    ) {
        match timer {
            ClassifierTimer::ChordWindow => {
                if self.window.as_ref().is_some_and(|window| window.timer() == id) {
                    debug!("Chord window expired");
                    self.resolve_window(profile, deadline, effects);
                }
            }
            ClassifierTimer::LongHold(button) => {
                let Some(state) = self.states.get_mut(&button) else {
                    return;
                };
                if state.long_hold_timer != Some(id) || !state.is_down {
                    return;
                }
                state.long_hold_timer = None;
                let Some(long_hold) = state.mapping.as_ref().and_then(|m| m.long_hold.clone())
                else {
                    return;
                };
                state.long_hold_fired = true;
                state.last_tap_at = None;
                if let Some(repeat) = state.repeat_timer.take() {
                    self.timers.cancel(repeat);
                }
                info!("Long hold on {} -> {}", button, long_hold.action);
                effects.push(Effect::Perform(long_hold.action));
            }
            ClassifierTimer::Repeat(button) => {
                let Some(state) = self.states.get_mut(&button) else {
                    return;
                };
                if state.repeat_timer != Some(id) || !state.is_down {
                    return;
                }
                let Some(mapping) = state.mapping.as_ref() else {
                    return;
                };
                let Some(interval) = mapping.repeat_interval() else {
                    state.repeat_timer = None;
                    return;
                };
                effects.push(Effect::Perform(mapping.action.clone()));
                let mut next = deadline + interval;
                if next <= now {
                    next = now + interval;
                }
                state.repeat_timer = Some(self.timers.schedule(next, ClassifierTimer::Repeat(button)));
            }
            ClassifierTimer::PendingTap(button) => {
                let Some(state) = self.states.get_mut(&button) else {
                    return;
                };
                if state.pending_tap.as_ref().map(|pending| pending.timer) != Some(id) {
                    return;
                }
                if let Some(pending) = state.pending_tap.take() {
                    if pending.kind == PendingTapKind::DoubleTapWindow {
                        state.last_tap_at = None;
                    }
                    debug!("Delayed tap on {} -> {}", button, pending.action);
                    effects.push(Effect::Perform(pending.action));
                }
            }
        }
    }
}
