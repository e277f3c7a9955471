use super::{GesturePhase, MomentumPhase, OutputSink, ScrollPhase};
use crate::mapping::action::{KeyCode, Modifiers, MouseButton, SystemCommand};
use tokio::sync::mpsc;
use tracing::warn;

/// One output primitive, as forwarded over a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputCommand {
    PressKey {
        key: KeyCode,
        modifiers: Modifiers,
    },
    KeyDown {
        key: KeyCode,
        modifiers: Modifiers,
    },
    KeyUp {
        key: KeyCode,
        modifiers: Modifiers,
    },
    HoldModifier(Modifiers),
    ReleaseModifier(Modifiers),
    ClickMouse {
        button: MouseButton,
        modifiers: Modifiers,
    },
    MouseDown(MouseButton),
    MouseUp(MouseButton),
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
    Macro(String),
    System(SystemCommand),
}

/// Sink that forwards every primitive to a platform task.
///
/// The channel is unbounded so a slow consumer never costs a key-up or
/// modifier release. Sending never blocks the engine.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<OutputCommand>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutputCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, command: OutputCommand) {
        if let Err(e) = self.tx.send(command) {
            warn!("Output consumer is gone, dropping {:?}", e.0);
        }
    }
}

impl OutputSink for ChannelSink {
    fn press_key(&self, key: KeyCode, modifiers: Modifiers) {
        self.send(OutputCommand::PressKey { key, modifiers });
    }

    fn key_down(&self, key: KeyCode, modifiers: Modifiers) {
        self.send(OutputCommand::KeyDown { key, modifiers });
    }

    fn key_up(&self, key: KeyCode, modifiers: Modifiers) {
        self.send(OutputCommand::KeyUp { key, modifiers });
    }

    fn hold_modifier(&self, modifiers: Modifiers) {
        self.send(OutputCommand::HoldModifier(modifiers));
    }

    fn release_modifier(&self, modifiers: Modifiers) {
        self.send(OutputCommand::ReleaseModifier(modifiers));
    }

    fn click_mouse(&self, button: MouseButton, modifiers: Modifiers) {
        self.send(OutputCommand::ClickMouse { button, modifiers });
    }

    fn mouse_down(&self, button: MouseButton) {
        self.send(OutputCommand::MouseDown(button));
    }

    fn mouse_up(&self, button: MouseButton) {
        self.send(OutputCommand::MouseUp(button));
    }

    fn move_mouse(&self, dx: f64, dy: f64) {
        self.send(OutputCommand::MoveMouse { dx, dy });
    }

    fn scroll(
        &self,
        dx: f64,
        dy: f64,
        phase: Option<ScrollPhase>,
        momentum: Option<MomentumPhase>,
    ) {
        self.send(OutputCommand::Scroll {
            dx,
            dy,
            phase,
            momentum,
        });
    }

    fn magnify(&self, magnification: f64, phase: GesturePhase) {
        self.send(OutputCommand::Magnify {
            magnification,
            phase,
        });
    }

    fn execute_macro(&self, id: &str) {
        self.send(OutputCommand::Macro(id.to_string()));
    }

    fn execute_system_command(&self, command: &SystemCommand) {
        self.send(OutputCommand::System(command.clone()));
    }
}
