use super::{GesturePhase, MomentumPhase, OutputSink, ScrollPhase};
use crate::mapping::action::{KeyCode, Modifiers, MouseButton, SystemCommand};
use tracing::{debug, info};

/// Dry-run backend: logs what would be synthesized.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

impl OutputSink for LoggingSink {
    fn press_key(&self, key: KeyCode, modifiers: Modifiers) {
        if modifiers.is_empty() {
            info!("Press {}", key);
        } else {
            info!("Press {}+{}", modifiers, key);
        }
    }

    fn key_down(&self, key: KeyCode, modifiers: Modifiers) {
        info!("Key down {} {}", key, modifiers);
    }

    fn key_up(&self, key: KeyCode, modifiers: Modifiers) {
        info!("Key up {} {}", key, modifiers);
    }

    fn hold_modifier(&self, modifiers: Modifiers) {
        info!("Hold modifier {}", modifiers);
    }

    fn release_modifier(&self, modifiers: Modifiers) {
        info!("Release modifier {}", modifiers);
    }

    fn click_mouse(&self, button: MouseButton, modifiers: Modifiers) {
        info!("Click {:?} {}", button, modifiers);
    }

    fn mouse_down(&self, button: MouseButton) {
        info!("Mouse down {:?}", button);
    }

    fn mouse_up(&self, button: MouseButton) {
        info!("Mouse up {:?}", button);
    }

    // Called at poll rate, keep it out of the info stream
    fn move_mouse(&self, dx: f64, dy: f64) {
        debug!("Move mouse dx={:.2} dy={:.2}", dx, dy);
    }

    fn scroll(
        &self,
        dx: f64,
        dy: f64,
        phase: Option<ScrollPhase>,
        momentum: Option<MomentumPhase>,
    ) {
        debug!(
            "Scroll dx={:.2} dy={:.2} phase={:?} momentum={:?}",
            dx, dy, phase, momentum
        );
    }

    fn magnify(&self, magnification: f64, phase: GesturePhase) {
        debug!("Magnify {:.4} {:?}", magnification, phase);
    }

    fn execute_macro(&self, id: &str) {
        info!("Run macro '{}'", id);
    }

    fn execute_system_command(&self, command: &SystemCommand) {
        info!("System command {:?}", command);
    }
}
