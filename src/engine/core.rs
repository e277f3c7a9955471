//! Serial dispatch hub.
//!
//! [`EngineCore`] owns one lock per subsystem: classifier, analog pipeline,
//! command wheel and trigger edges. Each entry point takes a profile
//! snapshot, mutates exactly one subsystem under its guard, drops the guard
//! and only then applies the collected effects to the output sink.

use super::classifier::ButtonClassifier;
use crate::analog::AnalogPipeline;
use crate::config::EngineSettings;
use crate::controller::button::{
    ButtonId, ControllerEvent, StickChannel, TriggerSide, TwoFingerSample,
};
use crate::mapping::profile::{Profile, ProfileSource};
use crate::mapping::resolver::resolve_wheel_action;
use crate::output::{Effect, EngineEvent, OutputSink};
use crate::timing::{elapsed_between, Hysteresis};
use crate::wheel::RadialSelector;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, Default)]
struct StickPositions {
    left: (f64, f64),
    right: (f64, f64),
}

impl StickPositions {
    fn get(&self, channel: StickChannel) -> (f64, f64) {
        match channel {
            StickChannel::Left => self.left,
            StickChannel::Right => self.right,
        }
    }

    fn set(&mut self, channel: StickChannel, position: (f64, f64)) {
        match channel {
            StickChannel::Left => self.left = position,
            StickChannel::Right => self.right = position,
        }
    }
}

#[derive(Debug)]
struct WheelState {
    selector: RadialSelector,
    /// Stick driving the wheel while it is shown.
    stick: Option<StickChannel>,
    modifier_down: bool,
}

#[derive(Debug, Default)]
struct TriggerState {
    left: Option<Instant>,
    right: Option<Instant>,
}

impl TriggerState {
    fn slot(&mut self, side: TriggerSide) -> &mut Option<Instant> {
        match side {
            TriggerSide::Left => &mut self.left,
            TriggerSide::Right => &mut self.right,
        }
    }
}

enum TriggerEdge {
    Pressed,
    Released(Duration),
}

pub struct EngineCore {
    classifier: Mutex<ButtonClassifier>,
    analog: Mutex<AnalogPipeline>,
    positions: Mutex<StickPositions>,
    wheel: Mutex<WheelState>,
    triggers: Mutex<TriggerState>,
    trigger_band: Hysteresis,
    enabled: AtomicBool,
    sink: Arc<dyn OutputSink>,
    profiles: Arc<dyn ProfileSource>,
    events: Option<mpsc::Sender<EngineEvent>>,
}

impl fmt::Debug for EngineCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineCore")
            .field("enabled", &self.is_enabled())
            .field("trigger_band", &self.trigger_band)
            .finish_non_exhaustive()
    }
}

impl EngineCore {
    pub fn new(
        settings: &EngineSettings,
        sink: Arc<dyn OutputSink>,
        profiles: Arc<dyn ProfileSource>,
    ) -> Self {
        Self {
            classifier: Mutex::new(ButtonClassifier::new(settings.classifier_settings())),
            analog: Mutex::new(AnalogPipeline::new(settings.max_sample_gap())),
            positions: Mutex::new(StickPositions::default()),
            wheel: Mutex::new(WheelState {
                selector: RadialSelector::new(settings.selector_settings()),
                stick: None,
                modifier_down: false,
            }),
            triggers: Mutex::new(TriggerState::default()),
            trigger_band: settings.trigger_hysteresis(),
            enabled: AtomicBool::new(true),
            sink,
            profiles,
            events: None,
        }
    }

    /// Forwards every [`EngineEvent`] to `events`.
    pub fn with_events(mut self, events: mpsc::Sender<EngineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn handle(&self, event: ControllerEvent) {
        match event {
            ControllerEvent::Connected => info!("Controller connected"),
            ControllerEvent::Disconnected => {
                info!("Controller disconnected, releasing all outputs");
                self.reset();
            }
            _ if !self.is_enabled() => {}
            ControllerEvent::ButtonPressed { button, at } => self.on_button_pressed(button, at),
            ControllerEvent::ButtonReleased {
                button,
                at,
                hold_duration,
            } => self.on_button_released(button, at, hold_duration),
            ControllerEvent::StickMoved { channel, x, y } => self.feed_stick_sample(channel, x, y),
            ControllerEvent::TriggerMoved { side, value, at } => {
                self.feed_trigger(side, value, at)
            }
            ControllerEvent::TouchpadMoved { dx, dy, at } => self.feed_touchpad_delta(dx, dy, at),
            ControllerEvent::TouchpadGesture { sample, at } => {
                self.feed_touchpad_gesture(sample, at)
            }
            ControllerEvent::TouchpadLifted { at } => self.touchpad_lifted(at),
        }
    }

    pub fn on_button_pressed(&self, button: ButtonId, at: Instant) {
        if !self.is_enabled() {
            return;
        }
        let profile = self.profiles.snapshot();
        let effects = if profile.is_wheel_button(button) {
            self.wheel_press(&profile, button, at)
        } else {
            lock(&self.classifier).on_press(&profile, button, at)
        };
        self.dispatch(effects);
    }

    pub fn on_button_released(&self, button: ButtonId, at: Instant, hold_duration: Duration) {
        if !self.is_enabled() {
            return;
        }
        let profile = self.profiles.snapshot();
        let effects = if profile.is_wheel_button(button) {
            self.wheel_release(&profile, button, at, hold_duration)
        } else {
            lock(&self.classifier).on_release(&profile, button, at, hold_duration)
        };
        self.dispatch(effects);
    }

    /// Latest stick position; consumed on the next poll tick.
    pub fn feed_stick_sample(&self, channel: StickChannel, x: f64, y: f64) {
        lock(&self.positions).set(channel, (x, y));
    }

    /// Converts an analog trigger value into button edges.
    pub fn feed_trigger(&self, side: TriggerSide, value: f64, at: Instant) {
        let edge = {
            let mut triggers = lock(&self.triggers);
            let slot = triggers.slot(side);
            let active = self.trigger_band.evaluate(slot.is_some(), value);
            match (*slot, active) {
                (None, true) => {
                    *slot = Some(at);
                    Some(TriggerEdge::Pressed)
                }
                (Some(pressed_at), false) => {
                    *slot = None;
                    Some(TriggerEdge::Released(elapsed_between(pressed_at, at)))
                }
                _ => None,
            }
        };
        match edge {
            Some(TriggerEdge::Pressed) => self.on_button_pressed(side.button(), at),
            Some(TriggerEdge::Released(held)) => self.on_button_released(side.button(), at, held),
            None => {}
        }
    }

    pub fn feed_touchpad_delta(&self, dx: f64, dy: f64, at: Instant) {
        if !self.is_enabled() {
            return;
        }
        let profile = self.profiles.snapshot();
        let effects = lock(&self.analog)
            .touchpad
            .feed_delta(&profile.joystick.touchpad, dx, dy, at);
        self.dispatch(effects);
    }

    pub fn feed_touchpad_gesture(&self, sample: TwoFingerSample, at: Instant) {
        if !self.is_enabled() {
            return;
        }
        let profile = self.profiles.snapshot();
        let effects = lock(&self.analog)
            .touchpad
            .feed_gesture(&profile.joystick.touchpad, sample, at);
        self.dispatch(effects);
    }

    pub fn touchpad_lifted(&self, at: Instant) {
        if !self.is_enabled() {
            return;
        }
        let profile = self.profiles.snapshot();
        let effects = lock(&self.analog)
            .touchpad
            .end_gesture(&profile.joystick.touchpad, at);
        self.dispatch(effects);
    }

    /// One poll tick: due timers, wheel selection, stick channels and
    /// touchpad momentum, in that order.
    pub fn tick(&self, now: Instant) {
        if !self.is_enabled() {
            return;
        }
        self.fire_due(now);
        let profile = self.profiles.snapshot();

        let positions = *lock(&self.positions);
        let (wheel_stick, events) = {
            let mut wheel = lock(&self.wheel);
            match wheel.stick {
                Some(channel) => {
                    let (x, y) = positions.get(channel);
                    let events = wheel.selector.update_selection(x, y, now);
                    (Some(channel), events)
                }
                None => (None, Vec::new()),
            }
        };
        self.dispatch(events.into_iter().map(Effect::Notify).collect());

        let effects = {
            let mut analog = lock(&self.analog);
            let mut effects = Vec::new();
            for channel in [StickChannel::Left, StickChannel::Right] {
                if wheel_stick == Some(channel) {
                    continue;
                }
                let (x, y) = positions.get(channel);
                effects.extend(analog.sticks.feed(&profile.joystick, channel, x, y, now));
            }
            effects.extend(
                analog
                    .touchpad
                    .tick(&profile.joystick.touchpad.momentum, now),
            );
            effects
        };
        self.dispatch(effects);
    }

    /// Fires classifier timers due at or before `now`.
    pub fn fire_due(&self, now: Instant) {
        if !self.is_enabled() {
            return;
        }
        let profile = self.profiles.snapshot();
        let effects = lock(&self.classifier).fire_due(&profile, now);
        self.dispatch(effects);
    }

    /// Earliest pending classifier deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        lock(&self.classifier).next_deadline()
    }

    pub fn set_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::SeqCst);
        if was && !enabled {
            info!("Mapping disabled");
            self.reset();
        } else if !was && enabled {
            info!("Mapping enabled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_frontmost_app(&self, app_id: Option<String>) {
        debug!("Frontmost application: {:?}", app_id);
        lock(&self.classifier).set_frontmost_app(app_id);
    }

    pub fn active_layer(&self) -> Option<String> {
        lock(&self.classifier).active_layer().map(str::to_string)
    }

    /// Cancels every timer and releases every held output.
    pub fn reset(&self) {
        let effects = lock(&self.classifier).reset();
        self.dispatch(effects);

        let effects = lock(&self.analog).reset();
        self.dispatch(effects);

        let events = {
            let mut wheel = lock(&self.wheel);
            wheel.stick = None;
            wheel.modifier_down = false;
            wheel.selector.hide()
        };
        self.dispatch(events.into_iter().map(Effect::Notify).collect());

        *lock(&self.triggers) = TriggerState::default();
        *lock(&self.positions) = StickPositions::default();
        info!("Engine state reset");
    }

    fn wheel_press(&self, profile: &Profile, button: ButtonId, at: Instant) -> Vec<Effect> {
        let mut effects = vec![Effect::Notify(EngineEvent::ButtonPressed(button))];
        let Some(settings) = profile.command_wheel.as_ref() else {
            return effects;
        };

        let events = {
            let mut wheel = lock(&self.wheel);
            if button == settings.activator {
                if wheel.stick.is_some() {
                    debug!("Ignoring duplicate wheel activator press");
                    return effects;
                }
                wheel.stick = Some(settings.stick);
                let alternate = settings.show_alternate_first || wheel.modifier_down;
                wheel.selector.prepare(
                    settings.items.clone(),
                    settings.alternate_items.clone(),
                    alternate,
                )
            } else {
                wheel.modifier_down = true;
                wheel.selector.set_showing_alternate(true, at)
            }
        };
        effects.extend(events.into_iter().map(Effect::Notify));

        if button == settings.activator {
            effects.extend(lock(&self.analog).sticks.release_channel(settings.stick));
        }
        effects
    }

    fn wheel_release(
        &self,
        profile: &Profile,
        button: ButtonId,
        at: Instant,
        hold_duration: Duration,
    ) -> Vec<Effect> {
        let mut effects = vec![Effect::Notify(EngineEvent::ButtonReleased {
            button,
            hold_duration,
        })];
        let Some(settings) = profile.command_wheel.as_ref() else {
            return effects;
        };

        let mut wheel = lock(&self.wheel);
        if button != settings.activator {
            wheel.modifier_down = false;
            let events = wheel.selector.set_showing_alternate(false, at);
            effects.extend(events.into_iter().map(Effect::Notify));
            return effects;
        }
        if wheel.stick.take().is_none() {
            debug!("Ignoring wheel activator release without a press");
            return effects;
        }

        let activation = wheel.selector.activate_selection(at);
        let hidden = wheel.selector.hide();
        drop(wheel);

        match activation {
            Some(activation) => {
                let action = resolve_wheel_action(&activation.item, activation.zone);
                info!(
                    "Wheel activated '{}' ({:?}) -> {}",
                    activation.item.label, activation.zone, action
                );
                effects.push(Effect::Perform(action));
                effects.push(Effect::Notify(EngineEvent::WheelActivated(activation)));
            }
            None => debug!("Wheel closed without a selection"),
        }
        effects.extend(hidden.into_iter().map(Effect::Notify));
        effects
    }

    fn dispatch(&self, effects: Vec<Effect>) {
        for effect in effects {
            if let Some(event) = effect.apply(self.sink.as_ref()) {
                self.publish(event);
            }
        }
    }

    fn publish(&self, event: EngineEvent) {
        let Some(events) = &self.events else {
            return;
        };
        match events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => warn!("Event channel full, dropping {:?}", event),
            Err(TrySendError::Closed(_)) => debug!("Event channel closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::action::{Action, ActionMapping, KeyCode, Modifiers, SystemCommand};
    use crate::mapping::profile::{CommandWheelSettings, ProfileStore, StickMode};
    use crate::output::recording::RecordingSink;
    use crate::output::OutputCommand;
    use crate::wheel::WheelItem;
    use pretty_assertions::assert_eq;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn press(key: KeyCode) -> OutputCommand {
        OutputCommand::PressKey {
            key,
            modifiers: Modifiers::NONE,
        }
    }

    fn profile() -> Profile {
        let mut profile = Profile::new("core");
        profile.button_mappings.insert(
            ButtonId::A,
            ActionMapping::new(Action::key(KeyCode::RETURN, Modifiers::NONE)),
        );
        profile.button_mappings.insert(
            ButtonId::LeftTrigger,
            ActionMapping::new(Action::key(KeyCode::SPACE, Modifiers::NONE)),
        );
        profile.button_mappings.insert(
            ButtonId::LeftBumper,
            ActionMapping::hold(Action::modifier(Modifiers::COMMAND)),
        );
        profile.joystick.left_stick.mode = StickMode::WasdKeys;
        profile.command_wheel = Some(CommandWheelSettings {
            activator: ButtonId::Guide,
            alternate_modifier: Some(ButtonId::View),
            stick: StickChannel::Right,
            show_alternate_first: false,
            items: (0..8)
                .map(|i| WheelItem::app(format!("App {}", i), format!("com.example.app{}", i)))
                .collect(),
            alternate_items: vec![WheelItem::website("Docs", "https://docs.rs")],
        });
        profile
    }

    fn core() -> (EngineCore, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let store = ProfileStore::new(profile());
        let core = EngineCore::new(&EngineSettings::default(), sink.clone(), Arc::new(store));
        (core, sink)
    }

    fn count(commands: &[OutputCommand], wanted: &OutputCommand) -> usize {
        commands.iter().filter(|c| *c == wanted).count()
    }

    #[test]
    fn tap_reaches_sink() {
        let (core, sink) = core();
        let t0 = Instant::now();
        core.handle(ControllerEvent::ButtonPressed {
            button: ButtonId::A,
            at: t0,
        });
        core.handle(ControllerEvent::ButtonReleased {
            button: ButtonId::A,
            at: t0 + ms(60),
            hold_duration: ms(60),
        });
        assert_eq!(sink.take(), vec![press(KeyCode::RETURN)]);
    }

    #[test]
    fn trigger_band_produces_single_tap() {
        let (core, sink) = core();
        let t0 = Instant::now();
        for (n, value) in [0.2, 0.6, 0.45, 0.4, 0.3, 0.1].into_iter().enumerate() {
            core.feed_trigger(TriggerSide::Left, value, t0 + ms(n as u64 * 10));
        }
        assert_eq!(sink.take(), vec![press(KeyCode::SPACE)]);
    }

    #[test]
    fn disable_mid_hold_releases_modifier() {
        let (core, sink) = core();
        let t0 = Instant::now();
        core.on_button_pressed(ButtonId::LeftBumper, t0);
        core.set_enabled(false);
        core.on_button_released(ButtonId::LeftBumper, t0 + ms(500), ms(500));

        let commands = sink.take();
        assert_eq!(
            count(&commands, &OutputCommand::HoldModifier(Modifiers::COMMAND)),
            1
        );
        assert_eq!(
            count(&commands, &OutputCommand::ReleaseModifier(Modifiers::COMMAND)),
            1
        );

        core.on_button_pressed(ButtonId::A, t0 + ms(600));
        assert!(sink.take().is_empty());
    }

    #[test]
    fn touchpad_ignored_while_disabled() {
        let (core, sink) = core();
        let t0 = Instant::now();
        let sample = crate::controller::button::TwoFingerSample {
            center_dx: 0.0,
            center_dy: 0.05,
            distance_delta: 0.0,
        };
        core.feed_touchpad_gesture(sample, t0);
        assert!(!sink.take().is_empty());

        core.set_enabled(false);
        sink.take();
        core.feed_touchpad_gesture(sample, t0 + ms(8));
        core.touchpad_lifted(t0 + ms(16));
        core.tick(t0 + ms(24));
        assert!(sink.take().is_empty());
    }

    #[test]
    fn disconnect_releases_direction_keys() {
        let (core, sink) = core();
        let t0 = Instant::now();
        core.feed_stick_sample(StickChannel::Left, 0.0, 1.0);
        core.tick(t0);
        assert_eq!(
            sink.take(),
            vec![OutputCommand::KeyDown {
                key: KeyCode::W,
                modifiers: Modifiers::NONE
            }]
        );

        core.handle(ControllerEvent::Disconnected);
        assert_eq!(
            sink.take(),
            vec![OutputCommand::KeyUp {
                key: KeyCode::W,
                modifiers: Modifiers::NONE
            }]
        );
    }

    #[test]
    fn wheel_selection_launches_app() {
        let (core, sink) = core();
        let t0 = Instant::now();
        core.on_button_pressed(ButtonId::Guide, t0);
        core.feed_stick_sample(StickChannel::Right, 0.6, -0.01);
        core.tick(t0 + ms(8));
        core.tick(t0 + ms(16));
        core.on_button_released(ButtonId::Guide, t0 + ms(40), ms(40));

        // the wheel stick never scrolls while the wheel is shown
        assert_eq!(
            sink.take(),
            vec![OutputCommand::System(SystemCommand::LaunchApp {
                app_id: "com.example.app2".into()
            })]
        );
    }

    #[test]
    fn wheel_release_tolerance_after_snap_back() {
        let (core, sink) = core();
        let t0 = Instant::now();
        core.on_button_pressed(ButtonId::Guide, t0);
        core.feed_stick_sample(StickChannel::Right, -0.01, -1.0);
        core.tick(t0 + ms(8));
        core.feed_stick_sample(StickChannel::Right, 0.0, 0.0);
        core.tick(t0 + ms(16));
        core.on_button_released(ButtonId::Guide, t0 + ms(100), ms(100));

        assert_eq!(
            sink.take(),
            vec![OutputCommand::System(SystemCommand::OpenNewWindow {
                app_id: "com.example.app4".into()
            })]
        );
    }

    #[test]
    fn wheel_alternate_set_via_modifier() {
        let (core, sink) = core();
        let t0 = Instant::now();
        core.on_button_pressed(ButtonId::Guide, t0);
        core.on_button_pressed(ButtonId::View, t0 + ms(5));
        core.feed_stick_sample(StickChannel::Right, 0.01, 0.7);
        core.tick(t0 + ms(8));
        core.on_button_released(ButtonId::View, t0 + ms(20), ms(15));
        core.on_button_released(ButtonId::Guide, t0 + ms(22), ms(22));

        assert_eq!(
            sink.take(),
            vec![OutputCommand::System(SystemCommand::OpenUrl {
                url: "https://docs.rs".into(),
                private: false
            })]
        );
    }

    #[tokio::test]
    async fn events_are_published() {
        let (core, _sink) = core();
        let (tx, mut rx) = mpsc::channel(16);
        let core = core.with_events(tx);
        let t0 = Instant::now();
        core.on_button_pressed(ButtonId::A, t0);
        core.on_button_released(ButtonId::A, t0 + ms(30), ms(30));

        assert_eq!(rx.recv().await, Some(EngineEvent::ButtonPressed(ButtonId::A)));
        assert_eq!(
            rx.recv().await,
            Some(EngineEvent::ButtonReleased {
                button: ButtonId::A,
                hold_duration: ms(30)
            })
        );
    }
}
