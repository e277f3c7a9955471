use super::timers::TimerId;
use crate::controller::button::ButtonId;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

/// A member that was released while the window was still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleasedMember {
    pub released_at: Instant,
    pub hold_duration: Duration,
}

/// Buttons captured between the first chord-eligible press and resolution.
#[derive(Debug, Clone)]
pub struct ChordCandidateWindow {
    captured: BTreeSet<ButtonId>,
    released: BTreeMap<ButtonId, ReleasedMember>,
    opened_at: Instant,
    expires_after: Duration,
    timer: TimerId,
}

impl ChordCandidateWindow {
    pub fn open(first: ButtonId, opened_at: Instant, expires_after: Duration, timer: TimerId) -> Self {
        Self {
            captured: BTreeSet::from([first]),
            released: BTreeMap::new(),
            opened_at,
            expires_after,
            timer,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.opened_at + self.expires_after
    }

    pub fn timer(&self) -> TimerId {
        self.timer
    }

    pub fn is_open_at(&self, at: Instant) -> bool {
        at <= self.deadline()
    }

    pub fn capture(&mut self, button: ButtonId) {
        self.captured.insert(button);
    }

    /// Adds a button that was already released, e.g. one still waiting out
    /// its release delay when the window opened.
    pub fn capture_released(&mut self, button: ButtonId, member: ReleasedMember) {
        self.captured.insert(button);
        self.released.insert(button, member);
    }

    /// Release of a captured member. The button stays captured.
    pub fn record_release(&mut self, button: ButtonId, released_at: Instant, hold_duration: Duration) -> bool {
        if !self.captured.contains(&button) {
            return false;
        }
        self.released.insert(
            button,
            ReleasedMember {
                released_at,
                hold_duration,
            },
        );
        true
    }

    pub fn contains(&self, button: ButtonId) -> bool {
        self.captured.contains(&button)
    }

    pub fn captured(&self) -> &BTreeSet<ButtonId> {
        &self.captured
    }

    pub fn released(&self, button: ButtonId) -> Option<ReleasedMember> {
        self.released.get(&button).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::timers::TimerQueue;

    #[test]
    fn released_members_stay_captured() {
        let t0 = Instant::now();
        let mut timers = TimerQueue::new();
        let id = timers.schedule(t0, ());
        let mut window = ChordCandidateWindow::open(ButtonId::A, t0, Duration::from_millis(150), id);
        window.capture(ButtonId::B);
        assert!(window.record_release(ButtonId::A, t0 + Duration::from_millis(20), Duration::from_millis(20)));
        assert!(!window.record_release(ButtonId::X, t0, Duration::ZERO));

        assert!(window.contains(ButtonId::A));
        assert_eq!(window.captured().len(), 2);
        assert_eq!(
            window.released(ButtonId::A).map(|m| m.hold_duration),
            Some(Duration::from_millis(20))
        );
        assert!(window.is_open_at(t0 + Duration::from_millis(150)));
        assert!(!window.is_open_at(t0 + Duration::from_millis(151)));
    }
}
