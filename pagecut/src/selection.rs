//! Pointer selection state machine.
//!
//! Turns click pairs and drag gestures into validated `(start, end)` pairs of
//! capture points. Points that would break the top-to-bottom ordering are
//! ignored without changing state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CaptureResult;
use crate::geometry::Interval;

/// Drags shorter than this many pixels are discarded
pub const DEFAULT_DRAG_THRESHOLD: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointRole {
    Start,
    End,
}

impl PointRole {
    fn opposite(self) -> Self {
        match self {
            PointRole::Start => PointRole::End,
            PointRole::End => PointRole::Start,
        }
    }
}

/// A recorded pointer position waiting to be paired
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturePoint {
    pub y: u32,
    pub role: PointRole,
    pub captured_at: DateTime<Utc>,
}

impl CapturePoint {
    fn now(y: u32, role: PointRole) -> Self {
        Self {
            y,
            role,
            captured_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionState {
    /// Nothing recorded since capture was (re)activated
    Idle,
    /// At least one pair completed, next point must be a start
    AwaitingStart,
    /// A start point is recorded, next point must be an end
    AwaitingEnd,
}

/// How consecutive pairs relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescentPolicy {
    /// Each new start must lie at or below the previous end
    Sequential,
    /// Every pair is independent of the ones before it
    Independent,
}

/// A start/end pair ready to become a section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedSelection {
    pub start: CapturePoint,
    pub end: CapturePoint,
}

impl CompletedSelection {
    pub fn interval(&self) -> CaptureResult<Interval> {
        Interval::new(self.start.y, self.end.y)
    }
}

/// Why a pointer event left the machine untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    UnexpectedRole,
    EndNotBelowStart,
    StartAbovePreviousEnd,
    DragTooShort,
    NoDragInProgress,
    StartPending,
}

/// Result of feeding one event to the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionEvent {
    Ignored(IgnoreReason),
    StartRecorded(u32),
    Completed(CompletedSelection),
    /// A drag gesture began or moved; nothing is recorded until release
    Dragging { from: u32, to: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DragGesture {
    origin: u32,
    current: u32,
}

#[derive(Debug, Clone)]
pub struct SelectionMachine {
    points: Vec<CapturePoint>,
    expected: PointRole,
    previous_end: Option<u32>,
    completed_pairs: usize,
    policy: DescentPolicy,
    drag: Option<DragGesture>,
    drag_threshold: u32,
}

impl SelectionMachine {
    pub fn new(policy: DescentPolicy, drag_threshold: u32) -> Self {
        Self {
            points: Vec::new(),
            expected: PointRole::Start,
            previous_end: None,
            completed_pairs: 0,
            policy,
            drag: None,
            drag_threshold,
        }
    }

    pub fn state(&self) -> SelectionState {
        match self.expected {
            PointRole::End => SelectionState::AwaitingEnd,
            PointRole::Start if self.completed_pairs > 0 => SelectionState::AwaitingStart,
            PointRole::Start => SelectionState::Idle,
        }
    }

    pub fn expected_role(&self) -> PointRole {
        self.expected
    }

    /// Unpaired points recorded so far
    pub fn points(&self) -> &[CapturePoint] {
        &self.points
    }

    pub fn policy(&self) -> DescentPolicy {
        self.policy
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Switch policy and start over from an empty sequence.
    pub fn set_policy(&mut self, policy: DescentPolicy) {
        self.policy = policy;
        self.reset();
    }

    /// Record a start point at `y`.
    pub fn on_start(&mut self, y: u32) -> SelectionEvent {
        if self.expected != PointRole::Start {
            return self.ignore(y, IgnoreReason::UnexpectedRole);
        }
        if self.policy == DescentPolicy::Sequential
            && self.previous_end.is_some_and(|previous_end| y < previous_end)
        {
            return self.ignore(y, IgnoreReason::StartAbovePreviousEnd);
        }

        self.points.push(CapturePoint::now(y, PointRole::Start));
        self.expected = PointRole::End;
        debug!(y, "Recorded start point");
        SelectionEvent::StartRecorded(y)
    }

    /// Record an end point at `y`, completing the pair.
    pub fn on_end(&mut self, y: u32) -> SelectionEvent {
        if self.expected != PointRole::End {
            return self.ignore(y, IgnoreReason::UnexpectedRole);
        }
        let Some(last) = self.points.last() else {
            return self.ignore(y, IgnoreReason::UnexpectedRole);
        };
        if y <= last.y {
            return self.ignore(y, IgnoreReason::EndNotBelowStart);
        }

        let end = CapturePoint::now(y, PointRole::End);
        let Some(start) = self.points.pop() else {
            return self.ignore(y, IgnoreReason::UnexpectedRole);
        };
        self.points.clear();
        self.expected = PointRole::Start;
        self.completed_pairs += 1;
        self.previous_end = match self.policy {
            DescentPolicy::Sequential => Some(y),
            DescentPolicy::Independent => None,
        };

        debug!(start = start.y, end = y, "Completed selection");
        SelectionEvent::Completed(CompletedSelection { start, end })
    }

    /// A discrete click: start or end depending on what is expected next.
    pub fn click(&mut self, y: u32) -> SelectionEvent {
        match self.expected {
            PointRole::Start => self.on_start(y),
            PointRole::End => self.on_end(y),
        }
    }

    /// Begin a drag gesture at `y`.
    pub fn press(&mut self, y: u32) -> SelectionEvent {
        if self.expected == PointRole::End {
            return self.ignore(y, IgnoreReason::StartPending);
        }
        self.drag = Some(DragGesture {
            origin: y,
            current: y,
        });
        SelectionEvent::Dragging { from: y, to: y }
    }

    pub fn drag_to(&mut self, y: u32) -> SelectionEvent {
        match self.drag.as_mut() {
            Some(drag) => {
                drag.current = y;
                SelectionEvent::Dragging {
                    from: drag.origin,
                    to: y,
                }
            }
            None => self.ignore(y, IgnoreReason::NoDragInProgress),
        }
    }

    /// Finish a drag gesture, collapsing it into one start/end pair.
    pub fn release(&mut self, y: u32) -> SelectionEvent {
        let Some(drag) = self.drag.take() else {
            return self.ignore(y, IgnoreReason::NoDragInProgress);
        };
        let (top, bottom) = if drag.origin <= y {
            (drag.origin, y)
        } else {
            (y, drag.origin)
        };
        if bottom - top < self.drag_threshold {
            return self.ignore(y, IgnoreReason::DragTooShort);
        }

        match self.on_start(top) {
            SelectionEvent::StartRecorded(_) => {}
            other => return other,
        }
        match self.on_end(bottom) {
            completed @ SelectionEvent::Completed(_) => completed,
            other => {
                // Zero-length drags with a zero threshold; leave nothing behind
                self.points.clear();
                self.expected = PointRole::Start;
                other
            }
        }
    }

    /// Remove an unpaired point, re-deriving the role expected next.
    pub fn remove_point(&mut self, index: usize) -> Option<CapturePoint> {
        if index >= self.points.len() {
            return None;
        }
        let removed = self.points.remove(index);
        self.expected = self
            .points
            .last()
            .map_or(PointRole::Start, |last| last.role.opposite());
        Some(removed)
    }

    /// Abandon unpaired points and any drag in progress.
    pub fn cancel(&mut self) {
        self.points.clear();
        self.drag = None;
        self.expected = PointRole::Start;
    }

    /// Drop a drag in progress without touching recorded points.
    pub fn abort_drag(&mut self) {
        self.drag = None;
    }

    /// Forget everything, including the previous end used for descent checks.
    pub fn reset(&mut self) {
        self.cancel();
        self.previous_end = None;
        self.completed_pairs = 0;
    }

    fn ignore(&self, y: u32, reason: IgnoreReason) -> SelectionEvent {
        debug!(y, reason = ?reason, state = ?self.state(), "Ignored pointer event");
        SelectionEvent::Ignored(reason)
    }
}

impl Default for SelectionMachine {
    fn default() -> Self {
        Self::new(DescentPolicy::Sequential, DEFAULT_DRAG_THRESHOLD)
    }
}
