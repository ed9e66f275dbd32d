//! Pending edits that are pushed upstream once the user stops typing, and a
//! last-scheduled-wins debounce timer.
//!
//! Time is always passed in, so callers decide which clock drives them.

use std::time::{Duration, Instant};

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq)]
pub enum EditState<T> {
    /// The upstream value is what the user sees.
    Synced,
    /// The user changed the value; it is pushed upstream at `settle_at`.
    Editing { value: T, settle_at: Instant },
    /// Pushed upstream, waiting for upstream to report it back.
    Committing { value: T },
}

/// Local copy of a value that diverges from upstream while being edited.
///
/// Upstream values are never echoed back into the buffer while an edit is
/// in progress, so a late upstream update cannot overwrite fresh typing.
#[derive(Debug, Clone)]
pub struct PendingEdit<T> {
    state: EditState<T>,
    delay: Duration,
}

impl<T: Clone + PartialEq> Default for PendingEdit<T> {
    fn default() -> Self {
        Self::new(DEFAULT_SETTLE_DELAY)
    }
}

impl<T: Clone + PartialEq> PendingEdit<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            state: EditState::Synced,
            delay,
        }
    }

    pub fn state(&self) -> &EditState<T> {
        &self.state
    }

    pub fn is_synced(&self) -> bool {
        matches!(self.state, EditState::Synced)
    }

    /// Every keystroke restarts the settle timer.
    pub fn edit(&mut self, value: T, now: Instant) {
        self.state = EditState::Editing {
            value,
            settle_at: now + self.delay,
        };
    }

    /// Returns the value to push upstream once the edit has settled.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.state {
            EditState::Editing { value, settle_at } if now >= *settle_at => {
                let value = value.clone();
                self.state = EditState::Committing {
                    value: value.clone(),
                };
                Some(value)
            }
            _ => None,
        }
    }

    /// Pushes an unsettled edit upstream right away.
    pub fn flush(&mut self) -> Option<T> {
        match &self.state {
            EditState::Editing { value, .. } => {
                let value = value.clone();
                self.state = EditState::Committing {
                    value: value.clone(),
                };
                Some(value)
            }
            _ => None,
        }
    }

    /// Upstream reports its current value.
    pub fn acknowledge(&mut self, upstream: &T) {
        match &self.state {
            EditState::Committing { value } if value == upstream => {
                self.state = EditState::Synced;
            }
            // Upstream changed under us; it wins.
            EditState::Committing { .. } => self.state = EditState::Synced,
            EditState::Editing { .. } | EditState::Synced => {}
        }
    }

    /// The value to display next to `upstream`.
    pub fn current<'a>(&'a self, upstream: &'a T) -> &'a T {
        match &self.state {
            EditState::Synced => upstream,
            EditState::Editing { value, .. } | EditState::Committing { value } => value,
        }
    }
}

/// A timer where scheduling again replaces the earlier deadline.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_SETTLE_DELAY)
    }
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// True exactly once per schedule, when the deadline has passed.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
