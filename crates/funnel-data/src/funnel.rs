//! Funnel classification of a single actor timeline.
//!
//! The completed-funnel count is `min(views, carts, purchases)`. This is an
//! approximation: it does not check that the events occurred in
//! view → cart → purchase order or that cycles do not interleave.

use rayon::prelude::*;
use serde::Serialize;

use funnel_core::models::EventKind;

use crate::timeline::ActorTimeline;

/// Furthest point an actor reached in the funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
    /// No events at all.
    Empty,
    /// Only views.
    Browsing,
    /// Added to cart but never purchased.
    CartAbandoned,
    /// Purchased, but the view or cart step is missing.
    PurchasedPartial,
    /// At least one view, one cart and one purchase.
    Complete,
}

impl FunnelStage {
    pub const ALL: [FunnelStage; 5] = [
        FunnelStage::Empty,
        FunnelStage::Browsing,
        FunnelStage::CartAbandoned,
        FunnelStage::PurchasedPartial,
        FunnelStage::Complete,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FunnelStage::Empty => "empty",
            FunnelStage::Browsing => "browsing",
            FunnelStage::CartAbandoned => "cart abandoned",
            FunnelStage::PurchasedPartial => "purchased (partial funnel)",
            FunnelStage::Complete => "complete",
        }
    }
}

/// Derived funnel facts for one timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FunnelOutcome {
    pub is_complete: bool,
    /// `Some` only when `is_complete`.
    pub completed_count: Option<u64>,
    /// Leading `view` events before the first cart or purchase.
    pub views_before_commit: u64,
    pub stage: FunnelStage,
}

impl FunnelOutcome {
    /// Whether the timeline had any events; empty timelines are left out of
    /// the views-before-commit mean.
    pub fn is_active(&self) -> bool {
        self.stage != FunnelStage::Empty
    }
}

/// A timeline paired with its classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedActor {
    pub timeline: ActorTimeline,
    pub outcome: FunnelOutcome,
}

/// Pure, per-timeline classification.
pub struct FunnelClassifier;

impl FunnelClassifier {
    pub fn classify(timeline: &ActorTimeline) -> FunnelOutcome {
        let counts = timeline.counts();
        let is_complete = EventKind::ALL.iter().all(|k| counts.has(*k));

        let completed_count =
            is_complete.then(|| counts.view.min(counts.cart).min(counts.purchase));

        let views_before_commit = timeline
            .ordered_events()
            .iter()
            .take_while(|k| **k == EventKind::View)
            .count() as u64;

        let stage = if timeline.is_empty() {
            FunnelStage::Empty
        } else if is_complete {
            FunnelStage::Complete
        } else if counts.has(EventKind::Purchase) {
            FunnelStage::PurchasedPartial
        } else if counts.has(EventKind::Cart) {
            FunnelStage::CartAbandoned
        } else {
            FunnelStage::Browsing
        };

        FunnelOutcome {
            is_complete,
            completed_count,
            views_before_commit,
            stage,
        }
    }

    /// Classify every timeline, preserving order.
    pub fn classify_all(timelines: Vec<ActorTimeline>, parallel: bool) -> Vec<ClassifiedActor> {
        let pair = |timeline: ActorTimeline| {
            let outcome = Self::classify(&timeline);
            ClassifiedActor { timeline, outcome }
        };
        if parallel {
            timelines.into_par_iter().map(pair).collect()
        } else {
            timelines.into_iter().map(pair).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EventKind::{Cart, Purchase, View};

    fn timeline(events: &[EventKind]) -> ActorTimeline {
        ActorTimeline::new("actor", events.to_vec(), 0.0)
    }

    #[test]
    fn test_scenario_view_view_cart_is_incomplete() {
        let outcome = FunnelClassifier::classify(&timeline(&[View, View, Cart]));
        assert!(!outcome.is_complete);
        assert_eq!(outcome.completed_count, None);
        assert_eq!(outcome.views_before_commit, 2);
        assert_eq!(outcome.stage, FunnelStage::CartAbandoned);
    }

    #[test]
    fn test_scenario_purchase_first_is_complete() {
        let outcome = FunnelClassifier::classify(&timeline(&[Purchase, View, Cart, Purchase]));
        assert!(outcome.is_complete);
        assert_eq!(outcome.completed_count, Some(1));
        assert_eq!(outcome.views_before_commit, 0);
        assert_eq!(outcome.stage, FunnelStage::Complete);
    }

    #[test]
    fn test_completed_count_is_min_of_counts() {
        for (v, c, p) in [(1, 1, 1), (3, 2, 5), (4, 4, 2), (7, 1, 9)] {
            let mut events = Vec::new();
            events.extend(std::iter::repeat(View).take(v));
            events.extend(std::iter::repeat(Cart).take(c));
            events.extend(std::iter::repeat(Purchase).take(p));
            let outcome = FunnelClassifier::classify(&timeline(&events));
            assert_eq!(outcome.completed_count, Some(v.min(c).min(p) as u64));
        }
    }

    #[test]
    fn test_incomplete_never_reports_completed_count() {
        for events in [vec![View, View], vec![Cart, Purchase], vec![View, Purchase]] {
            let outcome = FunnelClassifier::classify(&timeline(&events));
            assert!(!outcome.is_complete);
            assert_eq!(outcome.completed_count, None);
        }
    }

    #[test]
    fn test_views_before_commit_equals_views_when_never_committed() {
        let outcome = FunnelClassifier::classify(&timeline(&[View, View, View]));
        assert_eq!(outcome.views_before_commit, 3);
        assert_eq!(outcome.stage, FunnelStage::Browsing);
    }

    #[test]
    fn test_views_before_commit_bounded_by_view_count() {
        let t = timeline(&[View, Cart, View, View, Purchase]);
        let outcome = FunnelClassifier::classify(&t);
        assert_eq!(outcome.views_before_commit, 1);
        assert!(outcome.views_before_commit < t.counts().view);
    }

    #[test]
    fn test_empty_timeline() {
        let outcome = FunnelClassifier::classify(&timeline(&[]));
        assert!(!outcome.is_complete);
        assert_eq!(outcome.views_before_commit, 0);
        assert_eq!(outcome.stage, FunnelStage::Empty);
        assert!(!outcome.is_active());
    }

    #[test]
    fn test_purchase_without_cart_is_partial() {
        let outcome = FunnelClassifier::classify(&timeline(&[View, Purchase]));
        assert_eq!(outcome.stage, FunnelStage::PurchasedPartial);
    }

    #[test]
    fn test_classify_all_preserves_order_and_matches_sequential() {
        let timelines: Vec<ActorTimeline> = (0..200)
            .map(|i| {
                let events = match i % 4 {
                    0 => vec![View],
                    1 => vec![View, Cart],
                    2 => vec![View, Cart, Purchase],
                    _ => vec![Purchase],
                };
                ActorTimeline::new(format!("a{i:03}"), events, 0.0)
            })
            .collect();

        let sequential = FunnelClassifier::classify_all(timelines.clone(), false);
        let parallel = FunnelClassifier::classify_all(timelines, true);
        assert_eq!(sequential, parallel);
        assert_eq!(sequential[2].outcome.stage, FunnelStage::Complete);
        assert_eq!(sequential[0].timeline.actor_key(), "a000");
    }
}
