//! Per-actor event timelines.
//!
//! Records are bucketed by actor key in a single pass, then each bucket is
//! sorted once by `(timestamp, input index)`. Bucketing is an explicit fold
//! over [`TimelineAccumulator`], whose `merge` is associative, so partial
//! folds from rayon workers combine in any order to the same result.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use funnel_core::error::{FunnelError, Result};
use funnel_core::models::{EventKind, EventRecord};
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

// ── EventCounts ───────────────────────────────────────────────────────────────

/// Occurrences of each [`EventKind`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventCounts {
    pub view: u64,
    pub cart: u64,
    pub purchase: u64,
}

impl EventCounts {
    pub fn get(&self, kind: EventKind) -> u64 {
        match kind {
            EventKind::View => self.view,
            EventKind::Cart => self.cart,
            EventKind::Purchase => self.purchase,
        }
    }

    pub fn has(&self, kind: EventKind) -> bool {
        self.get(kind) > 0
    }

    pub fn record(&mut self, kind: EventKind) {
        match kind {
            EventKind::View => self.view += 1,
            EventKind::Cart => self.cart += 1,
            EventKind::Purchase => self.purchase += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.view + self.cart + self.purchase
    }

    pub fn merge(self, other: EventCounts) -> EventCounts {
        EventCounts {
            view: self.view + other.view,
            cart: self.cart + other.cart,
            purchase: self.purchase + other.purchase,
        }
    }
}

// ── ActorTimeline ─────────────────────────────────────────────────────────────

/// Ordered event history of one actor. Immutable once built; `counts` always
/// agrees with `ordered_events`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorTimeline {
    actor_key: String,
    ordered_events: Vec<EventKind>,
    counts: EventCounts,
    spend: f64,
}

impl ActorTimeline {
    /// Build a timeline from an already ordered event sequence.
    pub fn new(actor_key: impl Into<String>, ordered_events: Vec<EventKind>, spend: f64) -> Self {
        let mut counts = EventCounts::default();
        for kind in &ordered_events {
            counts.record(*kind);
        }
        Self {
            actor_key: actor_key.into(),
            ordered_events,
            counts,
            spend,
        }
    }

    pub fn actor_key(&self) -> &str {
        &self.actor_key
    }

    pub fn ordered_events(&self) -> &[EventKind] {
        &self.ordered_events
    }

    pub fn counts(&self) -> &EventCounts {
        &self.counts
    }

    /// Sum of purchase prices.
    pub fn spend(&self) -> f64 {
        self.spend
    }

    pub fn is_empty(&self) -> bool {
        self.ordered_events.is_empty()
    }
}

// ── TimelineAccumulator ───────────────────────────────────────────────────────

/// A validated event waiting in its actor bucket.
#[derive(Debug, Clone)]
struct StampedEvent {
    timestamp: DateTime<Utc>,
    index: usize,
    kind: EventKind,
    revenue: f64,
}

/// Partial grouping state: actor key → unsorted events.
#[derive(Debug, Default)]
pub struct TimelineAccumulator {
    buckets: HashMap<String, Vec<StampedEvent>>,
}

impl TimelineAccumulator {
    /// Fold one record (at input position `index`) into the accumulator.
    ///
    /// Fails with [`FunnelError::MalformedRecord`] when the record violates
    /// the record contract.
    pub fn fold(mut self, index: usize, record: &EventRecord) -> Result<Self> {
        let kind = record
            .classify()
            .map_err(|reason| FunnelError::malformed(index, record.actor_key.as_str(), reason))?;

        let event = StampedEvent {
            timestamp: record.timestamp,
            index,
            kind,
            revenue: record.revenue(kind),
        };

        match self.buckets.get_mut(record.actor_key.as_str()) {
            Some(bucket) => bucket.push(event),
            None => {
                self.buckets.insert(record.actor_key.clone(), vec![event]);
            }
        }
        Ok(self)
    }

    /// Combine two partial folds. Associative and commutative up to the
    /// in-bucket order, which [`TimelineAccumulator::into_timelines`] fixes.
    pub fn merge(self, other: Self) -> Self {
        let (mut large, small) = if self.buckets.len() >= other.buckets.len() {
            (self, other)
        } else {
            (other, self)
        };
        for (key, events) in small.buckets {
            large.buckets.entry(key).or_default().extend(events);
        }
        large
    }

    /// Number of distinct actors seen so far.
    pub fn actor_count(&self) -> usize {
        self.buckets.len()
    }

    /// Sort every bucket and emit timelines ordered by actor key.
    pub fn into_timelines(self, parallel: bool) -> Vec<ActorTimeline> {
        let mut timelines: Vec<ActorTimeline> = if parallel {
            self.buckets
                .into_par_iter()
                .map(|(key, events)| Self::seal(key, events))
                .collect()
        } else {
            self.buckets
                .into_iter()
                .map(|(key, events)| Self::seal(key, events))
                .collect()
        };
        timelines.sort_by(|a, b| a.actor_key.cmp(&b.actor_key));
        timelines
    }

    fn seal(actor_key: String, mut events: Vec<StampedEvent>) -> ActorTimeline {
        // Input index is unique, so this order is total and reproducible.
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.index.cmp(&b.index)));
        let spend = events.iter().map(|e| e.revenue).sum();
        let ordered = events.into_iter().map(|e| e.kind).collect();
        ActorTimeline::new(actor_key, ordered, spend)
    }
}

// ── TimelineBuilder ───────────────────────────────────────────────────────────

/// Stateless entry points for grouping records into timelines.
pub struct TimelineBuilder;

impl TimelineBuilder {
    /// One timeline per distinct actor key, sorted by key.
    pub fn build(records: &[EventRecord]) -> Result<Vec<ActorTimeline>> {
        Self::build_with(records, false)
    }

    /// Same result as [`TimelineBuilder::build`], bucketed on the rayon pool.
    pub fn build_parallel(records: &[EventRecord]) -> Result<Vec<ActorTimeline>> {
        Self::build_with(records, true)
    }

    pub fn build_with(records: &[EventRecord], parallel: bool) -> Result<Vec<ActorTimeline>> {
        let accumulator = if parallel {
            records
                .par_iter()
                .enumerate()
                .try_fold(TimelineAccumulator::default, |acc, (index, record)| {
                    acc.fold(index, record)
                })
                .try_reduce(TimelineAccumulator::default, |a, b| Ok(a.merge(b)))?
        } else {
            records
                .iter()
                .enumerate()
                .try_fold(TimelineAccumulator::default(), |acc, (index, record)| {
                    acc.fold(index, record)
                })?
        };

        debug!(
            records = records.len(),
            actors = accumulator.actor_count(),
            parallel,
            "bucketed records by actor"
        );

        Ok(accumulator.into_timelines(parallel))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
