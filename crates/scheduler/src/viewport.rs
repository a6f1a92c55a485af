//! Viewport model
//!
//! The external viewport source reports `(first_visible, visible_count,
//! settled)` on every scroll-state change and on initial layout. The
//! scheduler keeps the last reported window and whether the view is moving.

use std::ops::Range;

/// Visible window; last reported value wins
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewportState {
    pub first_visible: usize,
    pub visible_count: usize,
}

impl ViewportState {
    pub fn new(first_visible: usize, visible_count: usize) -> Self {
        Self {
            first_visible,
            visible_count,
        }
    }

    /// Visible positions, `[first, first + count)`.
    ///
    /// The end is clamped at `usize::MAX`, so a window reaching past it is
    /// shortened rather than reported position by position.
    pub fn indices(&self) -> Range<usize> {
        self.first_visible..self.first_visible.saturating_add(self.visible_count)
    }

    pub fn is_empty(&self) -> bool {
        self.visible_count == 0
    }
}

/// One report from the viewport source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportEvent {
    pub first_visible: usize,
    pub visible_count: usize,
    /// `true` once scrolling has stopped
    pub settled: bool,
}

impl ViewportEvent {
    /// Scrolling stopped with this window visible
    pub fn settled(first_visible: usize, visible_count: usize) -> Self {
        Self {
            first_visible,
            visible_count,
            settled: true,
        }
    }

    /// The view is moving; this window is transient
    pub fn scrolling(first_visible: usize, visible_count: usize) -> Self {
        Self {
            first_visible,
            visible_count,
            settled: false,
        }
    }

    pub fn state(&self) -> ViewportState {
        ViewportState::new(self.first_visible, self.visible_count)
    }
}

/// Viewport stability as tracked by the scheduler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScrollMode {
    /// Viewport is stable; launches allowed
    #[default]
    Idle,
    /// Viewport is changing; in-flight tasks were cancelled
    Scrolling,
}
