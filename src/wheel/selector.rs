//! Radial Selector: turns a 2D stick position into a wheel segment.
//!
//! Segment 0 points up and indices increase clockwise. Two hysteresis bands
//! keep the selection stable near its edges: the selection ring and the
//! full-deflection rim. Holding the rim on one segment fills a progress
//! ramp; completing it fires a ready notification once per hold.

use super::item::{WheelActivation, WheelItem, WheelZone};
use crate::output::EngineEvent;
use crate::timing::{elapsed_between, magnitude, ramp_progress, within, Hysteresis};
use std::f64::consts::{FRAC_PI_2, TAU};
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectorSettings {
    pub selection: Hysteresis,
    pub full_deflection: Hysteresis,
    /// Time at the rim until the long-hold zone is reached.
    pub full_hold: Duration,
    /// How long after the stick snaps back the last selection still counts.
    pub release_tolerance: Duration,
    /// Debounce before showing the primary items again.
    pub alternate_swap_back: Duration,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            selection: Hysteresis::new(0.42, 0.34),
            full_deflection: Hysteresis::new(0.94, 0.88),
            full_hold: Duration::from_secs(1),
            release_tolerance: Duration::from_millis(300),
            alternate_swap_back: Duration::from_millis(300),
        }
    }
}

/// Segment under `(x, y)` for `count` segments, 0 = up, clockwise.
pub fn segment_index(x: f64, y: f64, count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    let theta = y.atan2(x);
    let normalized = (-(theta - FRAC_PI_2)).rem_euclid(TAU);
    let step = TAU / count as f64;
    ((normalized / step).floor() as usize) % count
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct LastSelection {
    index: usize,
    full_deflection: bool,
    progress: f64,
    at: Instant,
}

#[derive(Debug, Clone)]
struct WheelSelectionState {
    items: Vec<WheelItem>,
    alternate_items: Vec<WheelItem>,
    showing_alternate: bool,
    swap_back_at: Option<Instant>,
    selection_active: bool,
    selected_index: Option<usize>,
    is_full_deflection: bool,
    full_deflection_started_at: Option<Instant>,
    progress: f64,
    ready_fired: bool,
    last_valid: Option<LastSelection>,
}

impl WheelSelectionState {
    fn current_items(&self) -> &[WheelItem] {
        if self.showing_alternate {
            &self.alternate_items
        } else {
            &self.items
        }
    }

    fn reset_ramp(&mut self) {
        self.full_deflection_started_at = None;
        self.progress = 0.0;
        self.ready_fired = false;
    }

    fn clear_selection(&mut self) {
        self.selection_active = false;
        self.selected_index = None;
        self.is_full_deflection = false;
        self.last_valid = None;
        self.reset_ramp();
    }
}

#[derive(Debug, Clone)]
pub struct RadialSelector {
    settings: SelectorSettings,
    state: Option<WheelSelectionState>,
}

impl RadialSelector {
    pub fn new(settings: SelectorSettings) -> Self {
        Self {
            settings,
            state: None,
        }
    }

    pub fn settings(&self) -> SelectorSettings {
        self.settings
    }

    /// Starts a wheel session with fresh selection state.
    pub fn prepare(
        &mut self,
        items: Vec<WheelItem>,
        alternate_items: Vec<WheelItem>,
        show_alternate_first: bool,
    ) -> Vec<EngineEvent> {
        let showing_alternate = show_alternate_first && !alternate_items.is_empty();
        info!(
            "Command wheel shown with {} items ({} alternate)",
            items.len(),
            alternate_items.len()
        );
        self.state = Some(WheelSelectionState {
            items,
            alternate_items,
            showing_alternate,
            swap_back_at: None,
            selection_active: false,
            selected_index: None,
            is_full_deflection: false,
            full_deflection_started_at: None,
            progress: 0.0,
            ready_fired: false,
            last_valid: None,
        });
        vec![EngineEvent::WheelShown {
            alternate: showing_alternate,
        }]
    }

    pub fn is_visible(&self) -> bool {
        self.state.is_some()
    }

    /// Switching to the alternate set is immediate; switching back waits
    /// for the debounce and is applied by a later update or tick.
    pub fn set_showing_alternate(&mut self, show: bool, at: Instant) -> Vec<EngineEvent> {
        let swap_back = self.settings.alternate_swap_back;
        let Some(state) = self.state.as_mut() else {
            return Vec::new();
        };
        if show {
            state.swap_back_at = None;
            if !state.showing_alternate && !state.alternate_items.is_empty() {
                debug!("Command wheel showing alternate items");
                state.showing_alternate = true;
                state.clear_selection();
                return vec![EngineEvent::WheelShown { alternate: true }];
            }
        } else if state.showing_alternate && state.swap_back_at.is_none() {
            state.swap_back_at = Some(at + swap_back);
        }
        Vec::new()
    }

    /// Applies a due swap back to the primary items.
    pub fn tick(&mut self, now: Instant) -> Vec<EngineEvent> {
        let Some(state) = self.state.as_mut() else {
            return Vec::new();
        };
        match state.swap_back_at {
            Some(due) if now >= due => {
                debug!("Command wheel back to primary items");
                state.swap_back_at = None;
                state.showing_alternate = false;
                state.clear_selection();
                vec![EngineEvent::WheelShown { alternate: false }]
            }
            _ => Vec::new(),
        }
    }

    pub fn update_selection(&mut self, x: f64, y: f64, at: Instant) -> Vec<EngineEvent> {
        let mut events = self.tick(at);
        let settings = self.settings;
        let Some(state) = self.state.as_mut() else {
            return events;
        };
        let count = state.current_items().len();
        if count == 0 {
            return events;
        }

        let length = magnitude(x, y);
        state.selection_active = settings.selection.evaluate(state.selection_active, length);
        if !state.selection_active {
            if state.selected_index.take().is_some() {
                state.is_full_deflection = false;
                state.reset_ramp();
                events.push(EngineEvent::WheelSelectionChanged {
                    index: None,
                    full_deflection: false,
                });
            }
            return events;
        }

        let index = segment_index(x, y, count);
        let full = settings
            .full_deflection
            .evaluate(state.is_full_deflection, length);
        let segment_changed = state.selected_index != Some(index);
        if segment_changed || !full {
            state.reset_ramp();
        }
        if full {
            let started = *state.full_deflection_started_at.get_or_insert(at);
            state.progress = ramp_progress(elapsed_between(started, at), settings.full_hold);
            if state.progress >= 1.0 && !state.ready_fired {
                state.ready_fired = true;
                info!("Command wheel segment {} ready", index);
                events.push(EngineEvent::WheelReady(index));
            }
        }

        let changed = segment_changed || full != state.is_full_deflection;
        state.selected_index = Some(index);
        state.is_full_deflection = full;
        state.last_valid = Some(LastSelection {
            index,
            full_deflection: full,
            progress: state.progress,
            at,
        });
        if changed {
            events.push(EngineEvent::WheelSelectionChanged {
                index: Some(index),
                full_deflection: full,
            });
        }
        events
    }

    /// Resolves the current selection, falling back to the last valid one
    /// within the release tolerance.
    pub fn activate_selection(&self, at: Instant) -> Option<WheelActivation> {
        let state = self.state.as_ref()?;
        let (index, full_deflection, progress) = match state.selected_index {
            Some(index) => (index, state.is_full_deflection, state.progress),
            None => {
                let last = state
                    .last_valid
                    .filter(|last| within(last.at, at, self.settings.release_tolerance))?;
                debug!("Using last selection {} within release tolerance", last.index);
                (last.index, last.full_deflection, last.progress)
            }
        };
        let item = state.current_items().get(index)?.clone();
        Some(WheelActivation {
            index,
            item,
            zone: WheelZone::from_state(full_deflection, progress),
        })
    }

    /// Ends the session; all selection state is dropped.
    pub fn hide(&mut self) -> Vec<EngineEvent> {
        match self.state.take() {
            Some(_) => {
                debug!("Command wheel hidden");
                vec![EngineEvent::WheelHidden]
            }
            None => Vec::new(),
        }
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.state.as_ref().and_then(|state| state.selected_index)
    }

    pub fn is_selection_active(&self) -> bool {
        self.state.as_ref().is_some_and(|state| state.selection_active)
    }

    pub fn is_full_deflection(&self) -> bool {
        self.state.as_ref().is_some_and(|state| state.is_full_deflection)
    }

    pub fn progress(&self) -> f64 {
        self.state.as_ref().map_or(0.0, |state| state.progress)
    }

    pub fn is_showing_alternate(&self) -> bool {
        self.state.as_ref().is_some_and(|state| state.showing_alternate)
    }
}
