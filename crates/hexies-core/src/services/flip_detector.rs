//! Flip-intent detection from host selection events
//!
//! The host has no double-click notification, so two selections of the
//! same object within the click window count as a flip request.

use chrono::{DateTime, Duration, Utc};

use crate::data::{SelectionEvent, WidgetId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorState {
    Idle,
    /// One selection seen; a second one of the same object before
    /// `at + window` triggers a flip.
    Armed {
        object_id: WidgetId,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionDecision {
    Flip(WidgetId),
    Armed(WidgetId),
    /// Empty or multi-object selection, state unchanged.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct FlipDetector {
    window: Duration,
    state: DetectorState,
}

impl FlipDetector {
    pub fn new(window: std::time::Duration) -> Self {
        Self {
            window: Duration::from_std(window).unwrap_or_else(|_| Duration::milliseconds(300)),
            state: DetectorState::Idle,
        }
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state = DetectorState::Idle;
    }

    pub fn on_selection(&mut self, event: &SelectionEvent) -> SelectionDecision {
        let Some(object_id) = event.single_object() else {
            return SelectionDecision::Ignored;
        };

        let is_repeat = match &self.state {
            DetectorState::Armed { object_id: last, at } => {
                let elapsed = event.timestamp - *at;
                last == object_id && elapsed >= Duration::zero() && elapsed < self.window
            }
            DetectorState::Idle => false,
        };

        if is_repeat {
            self.state = DetectorState::Idle;
            SelectionDecision::Flip(object_id.clone())
        } else {
            self.state = DetectorState::Armed {
                object_id: object_id.clone(),
                at: event.timestamp,
            };
            SelectionDecision::Armed(object_id.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> FlipDetector {
        FlipDetector::new(std::time::Duration::from_millis(300))
    }

    fn select(id: &str, at: DateTime<Utc>) -> SelectionEvent {
        SelectionEvent::single(WidgetId::new(id), at)
    }

    #[test]
    fn test_second_selection_within_window_flips() {
        let mut detector = detector();
        let t0 = Utc::now();

        assert_eq!(
            detector.on_selection(&select("w1", t0)),
            SelectionDecision::Armed(WidgetId::new("w1"))
        );
        assert_eq!(
            detector.on_selection(&select("w1", t0 + Duration::milliseconds(200))),
            SelectionDecision::Flip(WidgetId::new("w1"))
        );
        assert_eq!(detector.state(), &DetectorState::Idle);
    }

    #[test]
    fn test_selection_outside_window_rearms() {
        let mut detector = detector();
        let t0 = Utc::now();

        detector.on_selection(&select("w1", t0));
        let decision = detector.on_selection(&select("w1", t0 + Duration::milliseconds(500)));

        assert_eq!(decision, SelectionDecision::Armed(WidgetId::new("w1")));
    }

    #[test]
    fn test_selection_exactly_at_window_does_not_flip() {
        let mut detector = detector();
        let t0 = Utc::now();

        detector.on_selection(&select("w1", t0));
        let decision = detector.on_selection(&select("w1", t0 + Duration::milliseconds(300)));

        assert_eq!(decision, SelectionDecision::Armed(WidgetId::new("w1")));
    }

    #[test]
    fn test_different_object_moves_baseline() {
        let mut detector = detector();
        let t0 = Utc::now();

        detector.on_selection(&select("w1", t0));
        detector.on_selection(&select("w2", t0 + Duration::milliseconds(100)));
        let decision = detector.on_selection(&select("w1", t0 + Duration::milliseconds(200)));

        assert_eq!(decision, SelectionDecision::Armed(WidgetId::new("w1")));
    }

    #[test]
    fn test_triple_selection_flips_once() {
        let mut detector = detector();
        let t0 = Utc::now();

        let decisions: Vec<_> = [0, 100, 200]
            .into_iter()
            .map(|ms| detector.on_selection(&select("w1", t0 + Duration::milliseconds(ms))))
            .collect();

        let flips = decisions
            .iter()
            .filter(|d| matches!(d, SelectionDecision::Flip(_)))
            .count();
        assert_eq!(flips, 1);
    }

    #[test]
    fn test_multi_and_empty_selections_are_ignored() {
        let mut detector = detector();
        let t0 = Utc::now();
        detector.on_selection(&select("w1", t0));

        let multi = SelectionEvent {
            object_ids: vec![WidgetId::new("w1"), WidgetId::new("w2")],
            timestamp: t0 + Duration::milliseconds(50),
        };
        let empty = SelectionEvent {
            object_ids: Vec::new(),
            timestamp: t0 + Duration::milliseconds(60),
        };
        assert_eq!(detector.on_selection(&multi), SelectionDecision::Ignored);
        assert_eq!(detector.on_selection(&empty), SelectionDecision::Ignored);

        assert_eq!(
            detector.on_selection(&select("w1", t0 + Duration::milliseconds(100))),
            SelectionDecision::Flip(WidgetId::new("w1"))
        );
    }

    #[test]
    fn test_out_of_order_timestamp_does_not_flip() {
        let mut detector = detector();
        let t0 = Utc::now();

        detector.on_selection(&select("w1", t0));
        let decision = detector.on_selection(&select("w1", t0 - Duration::milliseconds(10)));

        assert_eq!(decision, SelectionDecision::Armed(WidgetId::new("w1")));
    }
}
