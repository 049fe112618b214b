use super::Direction;

/// Phase of the single tracked drag
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GesturePhase {
    Idle,
    Dragging { start: f32 },
}

/// Resolution of a released drag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
    Commit(Direction),
    SnapBack,
}

impl GestureOutcome {
    pub fn direction(self) -> Option<Direction> {
        match self {
            GestureOutcome::Commit(direction) => Some(direction),
            GestureOutcome::SnapBack => None,
        }
    }
}

/// Converts pointer drags into a fractional offset and, on release, a
/// discrete navigation decision.
///
/// Positive offsets mean the pointer moved towards the top of the viewport,
/// i.e. an intent to advance.
#[derive(Debug, Clone)]
pub struct GestureTracker {
    phase: GesturePhase,
    offset: f32,
    threshold: f32,
    viewport_extent: f32,
}

impl GestureTracker {
    pub fn new(threshold: f32, viewport_extent: f32) -> Self {
        Self {
            phase: GesturePhase::Idle,
            offset: 0.0,
            threshold,
            viewport_extent,
        }
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.phase, GesturePhase::Dragging { .. })
    }

    /// Updates the extent used to normalise offsets (e.g. after a resize)
    pub fn set_viewport_extent(&mut self, extent: f32) {
        self.viewport_extent = extent;
    }

    /// Begins tracking. A start while already dragging restarts from `coordinate`.
    pub fn start(&mut self, coordinate: f32) {
        self.phase = GesturePhase::Dragging { start: coordinate };
        self.offset = 0.0;
    }

    /// Recomputes the offset for a pointer move; `None` when idle
    pub fn move_to(&mut self, coordinate: f32) -> Option<f32> {
        let GesturePhase::Dragging { start } = self.phase else {
            return None;
        };

        self.offset = if self.viewport_extent > 0.0 {
            (start - coordinate) / self.viewport_extent
        } else {
            0.0
        };
        Some(self.offset)
    }

    /// Ends the drag. The offset is always reset to zero.
    pub fn release(&mut self) -> GestureOutcome {
        let offset = self.offset;
        let was_dragging = self.is_dragging();
        self.cancel();

        if !was_dragging {
            return GestureOutcome::SnapBack;
        }

        match resolve_offset(offset, self.threshold) {
            Some(direction) => GestureOutcome::Commit(direction),
            None => GestureOutcome::SnapBack,
        }
    }

    /// Abandons any drag without resolving it
    pub fn cancel(&mut self) {
        self.phase = GesturePhase::Idle;
        self.offset = 0.0;
    }
}

/// Maps an offset to a direction when it strictly exceeds the threshold
pub fn resolve_offset(offset: f32, threshold: f32) -> Option<Direction> {
    if offset.abs() <= threshold {
        None
    } else if offset > 0.0 {
        Some(Direction::Forward)
    } else {
        Some(Direction::Backward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> GestureTracker {
        GestureTracker::new(0.15, 100.0)
    }

    #[test]
    fn test_starts_idle() {
        let t = tracker();
        assert_eq!(t.phase(), GesturePhase::Idle);
        assert_eq!(t.offset(), 0.0);
    }

    #[test]
    fn test_move_while_idle_is_ignored() {
        let mut t = tracker();
        assert_eq!(t.move_to(50.0), None);
        assert_eq!(t.offset(), 0.0);
    }

    #[test]
    fn test_upward_drag_is_positive() {
        let mut t = tracker();
        t.start(80.0);
        assert_eq!(t.move_to(60.0), Some(0.2));
        assert_eq!(t.release(), GestureOutcome::Commit(Direction::Forward));
    }

    #[test]
    fn test_downward_drag_is_negative() {
        let mut t = tracker();
        t.start(20.0);
        let offset = t.move_to(50.0).unwrap();
        assert!((offset + 0.3).abs() < f32::EPSILON);
        assert_eq!(t.release(), GestureOutcome::Commit(Direction::Backward));
    }

    #[test]
    fn test_small_drag_snaps_back() {
        let mut t = tracker();
        t.start(50.0);
        t.move_to(40.0);
        assert_eq!(t.release(), GestureOutcome::SnapBack);
    }

    #[test]
    fn test_offset_exactly_at_threshold_snaps_back() {
        assert_eq!(resolve_offset(0.15, 0.15), None);
        assert_eq!(resolve_offset(-0.15, 0.15), None);
        assert_eq!(resolve_offset(0.16, 0.15), Some(Direction::Forward));
    }

    #[test]
    fn test_release_always_resets_offset() {
        let mut t = tracker();
        t.start(90.0);
        t.move_to(10.0);
        t.release();
        assert_eq!(t.offset(), 0.0);
        assert_eq!(t.phase(), GesturePhase::Idle);

        t.start(50.0);
        t.move_to(49.0);
        t.release();
        assert_eq!(t.offset(), 0.0);
    }

    #[test]
    fn test_restart_while_dragging_uses_new_origin() {
        let mut t = tracker();
        t.start(90.0);
        t.move_to(50.0);
        t.start(50.0);
        assert_eq!(t.offset(), 0.0);
        assert_eq!(t.move_to(45.0), Some(0.05));
        assert_eq!(t.release(), GestureOutcome::SnapBack);
    }

    #[test]
    fn test_release_while_idle_snaps_back() {
        let mut t = tracker();
        assert_eq!(t.release(), GestureOutcome::SnapBack);
    }

    #[test]
    fn test_zero_viewport_never_commits() {
        let mut t = GestureTracker::new(0.15, 0.0);
        t.start(10.0);
        assert_eq!(t.move_to(0.0), Some(0.0));
        assert_eq!(t.release(), GestureOutcome::SnapBack);
    }

    #[test]
    fn test_outcome_direction() {
        assert_eq!(
            GestureOutcome::Commit(Direction::Backward).direction(),
            Some(Direction::Backward)
        );
        assert_eq!(GestureOutcome::SnapBack.direction(), None);
    }
}
