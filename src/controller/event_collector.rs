//! gilrs device adapter.
//!
//! Polls gilrs on a blocking task and pushes [`ControllerEvent`]s into the
//! engine. Button releases carry the hold duration measured from the
//! matching press; sticks are forwarded only when their position changes.

use super::button::{ButtonId, ControllerEvent, StickChannel, TriggerSide};
use chrono::Local;
use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use statum::{machine, state};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug)]
pub struct CollectorSettings {
    /// Sleep between polls when gilrs has no pending event.
    pub idle_sleep: Duration,
    /// Stick changes smaller than this are not forwarded.
    pub stick_epsilon: f32,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            idle_sleep: Duration::from_micros(500),
            stick_epsilon: 0.001,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to initialize collector: {0}")]
    InitializationError(String),

    #[error("Failed to send event: {0}")]
    EventSendError(String),

    #[error("Collector task failed: {0}")]
    TaskError(String),
}

/// Press timestamps for hold-duration bookkeeping.
#[derive(Debug, Default)]
struct PressTracker {
    pressed: HashMap<ButtonId, Instant>,
}

impl PressTracker {
    /// `None` when the button is already down.
    fn press(&mut self, button: ButtonId, at: Instant) -> Option<ControllerEvent> {
        if self.pressed.contains_key(&button) {
            return None;
        }
        self.pressed.insert(button, at);
        Some(ControllerEvent::ButtonPressed { button, at })
    }

    /// `None` when there was no matching press.
    fn release(&mut self, button: ButtonId, at: Instant) -> Option<ControllerEvent> {
        let pressed_at = self.pressed.remove(&button)?;
        Some(ControllerEvent::ButtonReleased {
            button,
            at,
            hold_duration: at.saturating_duration_since(pressed_at),
        })
    }

    /// Synthesized releases for everything still down.
    fn release_all(&mut self, at: Instant) -> Vec<ControllerEvent> {
        let mut buttons: Vec<ButtonId> = self.pressed.keys().copied().collect();
        buttons.sort();
        buttons
            .into_iter()
            .filter_map(|button| self.release(button, at))
            .collect()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct StickAxes {
    left: (f32, f32),
    right: (f32, f32),
}

#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Collecting,
}

#[machine]
#[derive(Debug)]
pub struct EventCollector<S: CollectionState> {
    gilrs: Gilrs,
    active_gamepad: Option<GamepadId>,
    settings: CollectorSettings,
    event_sender: mpsc::Sender<ControllerEvent>,
    presses: PressTracker,
    sticks: StickAxes,
}

impl<S: CollectionState> EventCollector<S> {
    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }
}

impl EventCollector<Initializing> {
    pub fn create(
        settings: Option<CollectorSettings>,
        event_sender: mpsc::Sender<ControllerEvent>,
    ) -> Result<Self, CollectorError> {
        let settings = settings.unwrap_or_default();
        debug!("Creating Event Collector with settings: {:?}", settings);

        info!("Initializing gilrs controller interface");
        let gilrs = Gilrs::new().map_err(|e| {
            error!("Failed to initialize gilrs: {}", e);
            CollectorError::InitializationError(e.to_string())
        })?;

        Ok(Self::new(
            gilrs,
            None,
            settings,
            event_sender,
            PressTracker::default(),
            StickAxes::default(),
        ))
    }

    pub fn initialize(mut self) -> EventCollector<Collecting> {
        let gamepads: Vec<(GamepadId, Gamepad<'_>)> = self.gilrs.gamepads().collect();
        if gamepads.is_empty() {
            warn!("No gamepad connected, waiting for one");
        } else {
            info!("Found {} gamepads:", gamepads.len());
            for (idx, (id, gamepad)) in gamepads.iter().enumerate() {
                info!("  [{}] ID: {}, Name: {}", idx, id, gamepad.name());
            }
            let (id, gamepad) = &gamepads[0];
            info!("Selected gamepad: {} ({})", gamepad.name(), id);
            self.active_gamepad = Some(*id);
        }

        info!("Event Collector initialized, transitioning to Collecting state");
        self.transition()
    }
}

impl EventCollector<Collecting> {
    /// Polls until `token` is cancelled or the engine input closes.
    pub fn run_collection_loop(&mut self, token: CancellationToken) -> Result<(), CollectorError> {
        info!("Starting Event Collector loop");
        let mut event_count = 0u64;
        let mut last_log_time = Local::now();
        let log_interval = chrono::Duration::seconds(30);

        while !token.is_cancelled() {
            match self.gilrs.next_event() {
                Some(event) => {
                    for converted in self.convert(event) {
                        self.send(converted)?;
                        event_count += 1;
                    }
                }
                None => std::thread::sleep(self.settings.idle_sleep),
            }

            let now = Local::now();
            if now - last_log_time > log_interval {
                debug!(
                    "Event Collector stats: forwarded {} events in last {} seconds",
                    event_count,
                    log_interval.num_seconds()
                );
                event_count = 0;
                last_log_time = now;
            }
        }

        for release in self.presses.release_all(Instant::now()) {
            self.send(release)?;
        }
        info!("Event Collector loop stopped");
        Ok(())
    }

    fn send(&self, event: ControllerEvent) -> Result<(), CollectorError> {
        match self.event_sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                warn!("Engine input full, dropping {:?}", event);
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(CollectorError::EventSendError(
                "engine input closed".to_string(),
            )),
        }
    }

    fn convert(&mut self, Event { id, event, .. }: Event) -> Vec<ControllerEvent> {
        let at = Instant::now();
        match event {
            EventType::Connected => {
                if self.active_gamepad.is_none() {
                    info!("Gamepad {} connected, selecting it", id);
                    self.active_gamepad = Some(id);
                    return vec![ControllerEvent::Connected];
                }
                return Vec::new();
            }
            EventType::Disconnected if self.active_gamepad == Some(id) => {
                warn!("Active gamepad {} disconnected", id);
                self.active_gamepad = None;
                self.presses.pressed.clear();
                self.sticks = StickAxes::default();
                return vec![ControllerEvent::Disconnected];
            }
            _ => {}
        }
        if self.active_gamepad != Some(id) {
            return Vec::new();
        }

        match event {
            EventType::ButtonPressed(button, _) => map_button(button)
                .and_then(|button| self.presses.press(button, at))
                .into_iter()
                .collect(),
            EventType::ButtonReleased(button, _) => map_button(button)
                .and_then(|button| self.presses.release(button, at))
                .into_iter()
                .collect(),
            EventType::ButtonChanged(button, value, _) => match map_trigger(button) {
                Some(side) => vec![ControllerEvent::TriggerMoved {
                    side,
                    value: f64::from(value),
                    at,
                }],
                None => Vec::new(),
            },
            EventType::AxisChanged(axis, value, _) => self.stick_axis(axis, value),
            _ => Vec::new(),
        }
    }

    fn stick_axis(&mut self, axis: Axis, value: f32) -> Vec<ControllerEvent> {
        let (channel, position) = match axis {
            Axis::LeftStickX | Axis::LeftStickY => (StickChannel::Left, &mut self.sticks.left),
            Axis::RightStickX | Axis::RightStickY => (StickChannel::Right, &mut self.sticks.right),
            Axis::LeftZ => {
                return vec![ControllerEvent::TriggerMoved {
                    side: TriggerSide::Left,
                    value: f64::from(value),
                    at: Instant::now(),
                }]
            }
            Axis::RightZ => {
                return vec![ControllerEvent::TriggerMoved {
                    side: TriggerSide::Right,
                    value: f64::from(value),
                    at: Instant::now(),
                }]
            }
            _ => return Vec::new(),
        };
        let slot = match axis {
            Axis::LeftStickX | Axis::RightStickX => &mut position.0,
            _ => &mut position.1,
        };
        if (*slot - value).abs() < self.settings.stick_epsilon {
            return Vec::new();
        }
        *slot = value;
        let (x, y) = *position;
        vec![ControllerEvent::StickMoved {
            channel,
            x: f64::from(x),
            y: f64::from(y),
        }]
    }
}

/// Collector running on a blocking task.
pub struct CollectorHandle {
    token: CancellationToken,
    task_handle: Option<JoinHandle<Result<(), CollectorError>>>,
}

impl CollectorHandle {
    pub fn spawn(
        settings: Option<CollectorSettings>,
        event_sender: mpsc::Sender<ControllerEvent>,
    ) -> Result<Self, CollectorError> {
        let collector = EventCollector::create(settings, event_sender)?;
        let token = CancellationToken::new();
        let loop_token = token.clone();

        let task_handle = tokio::task::spawn_blocking(move || {
            let mut collecting = collector.initialize();
            collecting.run_collection_loop(loop_token)
        });
        info!("Event Collector successfully started");

        Ok(Self {
            token,
            task_handle: Some(task_handle),
        })
    }

    pub async fn shutdown(&mut self) -> Result<(), CollectorError> {
        self.token.cancel();
        match self.task_handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| CollectorError::TaskError(e.to_string()))?,
            None => Ok(()),
        }
    }
}

fn map_button(button: Button) -> Option<ButtonId> {
    match button {
        Button::South => Some(ButtonId::A),
        Button::East => Some(ButtonId::B),
        Button::West => Some(ButtonId::X),
        Button::North => Some(ButtonId::Y),
        Button::Start => Some(ButtonId::Menu),
        Button::Select => Some(ButtonId::View),
        Button::Mode => Some(ButtonId::Guide),
        Button::LeftTrigger => Some(ButtonId::LeftBumper),
        Button::RightTrigger => Some(ButtonId::RightBumper),
        Button::LeftThumb => Some(ButtonId::LeftThumbstick),
        Button::RightThumb => Some(ButtonId::RightThumbstick),
        Button::DPadUp => Some(ButtonId::DPadUp),
        Button::DPadDown => Some(ButtonId::DPadDown),
        Button::DPadLeft => Some(ButtonId::DPadLeft),
        Button::DPadRight => Some(ButtonId::DPadRight),
        // analog triggers become edges through the engine's hysteresis band
        _ => None,
    }
}

fn map_trigger(button: Button) -> Option<TriggerSide> {
    match button {
        Button::LeftTrigger2 => Some(TriggerSide::Left),
        Button::RightTrigger2 => Some(TriggerSide::Right),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn face_buttons_follow_xbox_layout() {
        assert_eq!(map_button(Button::South), Some(ButtonId::A));
        assert_eq!(map_button(Button::North), Some(ButtonId::Y));
        assert_eq!(map_button(Button::LeftTrigger), Some(ButtonId::LeftBumper));
        assert_eq!(map_button(Button::LeftTrigger2), None);
        assert_eq!(map_trigger(Button::RightTrigger2), Some(TriggerSide::Right));
    }

    #[test]
    fn release_carries_hold_duration() {
        let mut tracker = PressTracker::default();
        let t0 = Instant::now();
        assert!(tracker.press(ButtonId::A, t0).is_some());
        assert!(tracker.press(ButtonId::A, t0).is_none());

        match tracker.release(ButtonId::A, t0 + Duration::from_millis(120)) {
            Some(ControllerEvent::ButtonReleased { hold_duration, .. }) => {
                assert_eq!(hold_duration, Duration::from_millis(120))
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(tracker.release(ButtonId::A, t0).is_none());
    }

    #[test]
    fn release_all_flushes_held_buttons() {
        let mut tracker = PressTracker::default();
        let t0 = Instant::now();
        tracker.press(ButtonId::B, t0);
        tracker.press(ButtonId::A, t0);
        let released: Vec<ButtonId> = tracker
            .release_all(t0)
            .into_iter()
            .filter_map(|event| match event {
                ControllerEvent::ButtonReleased { button, .. } => Some(button),
                _ => None,
            })
            .collect();
        assert_eq!(released, vec![ButtonId::A, ButtonId::B]);
        assert!(tracker.pressed.is_empty());
    }
}
