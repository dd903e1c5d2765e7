//! Population-level metrics over classified timelines.
//!
//! Three independent families, each a commutative fold with a `merge`:
//!
//! * funnel tallies (completion rate, cart → purchase, views before commit),
//! * per-category conversion, grouped straight from the event records,
//! * revenue concentration (the Pareto check).
//!
//! [`MetricEngine::compute`] runs them side by side with `rayon::join`.

use std::collections::BTreeMap;

use funnel_core::error::{FunnelError, Result};
use funnel_core::metric::{Metric, UndefinedMetric};
use funnel_core::models::{CategoryPath, EventKind, EventRecord};
use funnel_core::settings::MetricsConfig;
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::funnel::{ClassifiedActor, FunnelStage};
use crate::timeline::EventCounts;

// ── FunnelTally ───────────────────────────────────────────────────────────────

/// Running counts behind the per-actor funnel metrics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunnelTally {
    pub actors: u64,
    /// Actors with at least one event.
    pub active_actors: u64,
    pub complete_actors: u64,
    /// Sum of `completed_count` over complete actors.
    pub completed_funnels: u64,
    pub cart_actors: u64,
    pub cart_and_purchase_actors: u64,
    pub views_before_commit: u64,
    pub events: EventCounts,
    pub stages: BTreeMap<FunnelStage, u64>,
}

impl FunnelTally {
    pub fn observe(mut self, actor: &ClassifiedActor) -> Self {
        let counts = actor.timeline.counts();
        let outcome = &actor.outcome;

        self.actors += 1;
        if outcome.is_active() {
            self.active_actors += 1;
            self.views_before_commit += outcome.views_before_commit;
        }
        if let Some(completed) = outcome.completed_count {
            self.complete_actors += 1;
            self.completed_funnels += completed;
        }
        if counts.has(EventKind::Cart) {
            self.cart_actors += 1;
            if counts.has(EventKind::Purchase) {
                self.cart_and_purchase_actors += 1;
            }
        }
        self.events = self.events.merge(*counts);
        *self.stages.entry(outcome.stage).or_insert(0) += 1;
        self
    }

    pub fn merge(mut self, other: Self) -> Self {
        self.actors += other.actors;
        self.active_actors += other.active_actors;
        self.complete_actors += other.complete_actors;
        self.completed_funnels += other.completed_funnels;
        self.cart_actors += other.cart_actors;
        self.cart_and_purchase_actors += other.cart_and_purchase_actors;
        self.views_before_commit += other.views_before_commit;
        self.events = self.events.merge(other.events);
        for (stage, n) in other.stages {
            *self.stages.entry(stage).or_insert(0) += n;
        }
        self
    }

    pub fn completion_rate(&self) -> Metric {
        Metric::of_counts(self.complete_actors, self.actors, UndefinedMetric::NoActors)
    }

    pub fn cart_to_purchase_rate(&self) -> Metric {
        Metric::of_counts(
            self.cart_and_purchase_actors,
            self.cart_actors,
            UndefinedMetric::NoCartActors,
        )
    }

    pub fn average_views_before_commit(&self) -> Metric {
        Metric::of_counts(
            self.views_before_commit,
            self.active_actors,
            UndefinedMetric::NoActiveActors,
        )
    }

    pub fn event_share(&self) -> EventShare {
        let total = self.events.total();
        let share = |n: u64| Metric::of_counts(n, total, UndefinedMetric::NoEvents);
        EventShare {
            view: share(self.events.view),
            cart: share(self.events.cart),
            purchase: share(self.events.purchase),
        }
    }

    /// Stage counts with every stage present, zero-filled.
    pub fn stage_distribution(&self) -> BTreeMap<FunnelStage, u64> {
        FunnelStage::ALL
            .iter()
            .map(|stage| (*stage, self.stages.get(stage).copied().unwrap_or(0)))
            .collect()
    }
}

/// Fraction of all events that are of each kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EventShare {
    pub view: Metric,
    pub cart: Metric,
    pub purchase: Metric,
}

// ── CategoryTally ─────────────────────────────────────────────────────────────

/// Conversion figures for one category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CategoryConversion {
    pub views: u64,
    pub carts: u64,
    pub purchases: u64,
    /// `purchases / views`; undefined when the category has no views.
    pub rate: Metric,
}

/// Event counts per category, built directly from records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryTally {
    pub by_category: BTreeMap<CategoryPath, EventCounts>,
    /// Events with no category.
    pub uncategorized: u64,
}

impl CategoryTally {
    /// Fold one record. `depth` rolls the category up before grouping.
    pub fn observe(
        mut self,
        index: usize,
        record: &EventRecord,
        depth: Option<usize>,
    ) -> Result<Self> {
        let kind = record
            .classify()
            .map_err(|reason| FunnelError::malformed(index, record.actor_key.as_str(), reason))?;

        match &record.category {
            Some(category) => {
                let key = match depth {
                    Some(d) => category.truncate(d),
                    None => category.clone(),
                };
                self.by_category.entry(key).or_default().record(kind);
            }
            None => self.uncategorized += 1,
        }
        Ok(self)
    }

    pub fn merge(mut self, other: Self) -> Self {
        for (category, counts) in other.by_category {
            let entry = self.by_category.entry(category).or_default();
            *entry = entry.merge(counts);
        }
        self.uncategorized += other.uncategorized;
        self
    }

    /// Conversion per category. Categories without views stay in the map with
    /// an undefined rate.
    pub fn conversions(&self) -> BTreeMap<CategoryPath, CategoryConversion> {
        self.by_category
            .iter()
            .map(|(category, counts)| {
                let conversion = CategoryConversion {
                    views: counts.view,
                    carts: counts.cart,
                    purchases: counts.purchase,
                    rate: Metric::of_counts(
                        counts.purchase,
                        counts.view,
                        UndefinedMetric::NoCategoryViews,
                    ),
                };
                (category.clone(), conversion)
            })
            .collect()
    }
}

// ── RevenueConcentration ──────────────────────────────────────────────────────

/// Share of revenue held by the top slice of purchasing actors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueConcentration {
    pub top_percent: u8,
    pub purchasing_actors: u64,
    /// `floor(purchasing_actors * top_percent / 100)`.
    pub top_actor_count: u64,
    pub top_revenue: f64,
    pub rest_revenue: f64,
    pub total_revenue: f64,
    pub top_share: Metric,
    pub rest_share: Metric,
}

impl RevenueConcentration {
    /// Pareto split over purchasing actors.
    ///
    /// Actors are ranked by spend descending (ties by actor key ascending); the
    /// first `floor(n * top_percent / 100)` form the top partition.
    pub fn from_actors(actors: &[ClassifiedActor], top_percent: u8) -> Self {
        let mut spenders: Vec<(&str, f64)> = actors
            .iter()
            .filter(|a| a.timeline.counts().has(EventKind::Purchase))
            .map(|a| (a.timeline.actor_key(), a.timeline.spend()))
            .collect();
        spenders.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let n = spenders.len();
        let top_actor_count = (n * usize::from(top_percent) / 100).min(n);

        let top_revenue: f64 = spenders[..top_actor_count].iter().map(|(_, s)| s).sum();
        let rest_revenue: f64 = spenders[top_actor_count..].iter().map(|(_, s)| s).sum();
        let total_revenue = top_revenue + rest_revenue;

        let share = |part: f64| {
            if n == 0 {
                Metric::Undefined {
                    reason: UndefinedMetric::NoPurchasingActors,
                }
            } else {
                Metric::ratio(part, total_revenue, UndefinedMetric::NoRevenue)
            }
        };

        Self {
            top_percent,
            purchasing_actors: n as u64,
            top_actor_count: top_actor_count as u64,
            top_revenue,
            rest_revenue,
            total_revenue,
            top_share: share(top_revenue),
            rest_share: share(rest_revenue),
        }
    }
}

// ── PopulationMetrics ─────────────────────────────────────────────────────────

/// Everything the engine derives from one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopulationMetrics {
    pub actor_count: u64,
    pub complete_actor_count: u64,
    pub total_completed_funnels: u64,
    pub funnel_completion_rate: Metric,
    pub cart_to_purchase_rate: Metric,
    pub average_views_before_commit: Metric,
    pub conversion_rate_by_category: BTreeMap<CategoryPath, CategoryConversion>,
    pub uncategorized_events: u64,
    pub revenue_concentration: RevenueConcentration,
    pub stage_distribution: BTreeMap<FunnelStage, u64>,
    pub event_share: EventShare,
}

// ── MetricEngine ──────────────────────────────────────────────────────────────

/// Folds classified actors and raw records into [`PopulationMetrics`].
#[derive(Debug, Clone, Default)]
pub struct MetricEngine {
    config: MetricsConfig,
}

impl MetricEngine {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Compute all metric families.
    ///
    /// `records` must be the batch the actors were built from; categories are
    /// per event, so conversion is grouped from records rather than timelines.
    /// Fails with [`FunnelError::Config`] when the configuration is out of
    /// range and with [`FunnelError::EmptyPopulation`] when `actors` is empty.
    pub fn compute(
        &self,
        records: &[EventRecord],
        actors: &[ClassifiedActor],
    ) -> Result<PopulationMetrics> {
        self.config.validate()?;
        if actors.is_empty() {
            return Err(FunnelError::EmptyPopulation);
        }

        let parallel = self.config.parallel;
        let depth = self.config.category_depth;
        let top_percent = self.config.top_percent;

        let (funnel, (categories, revenue)) = if parallel {
            rayon::join(
                || Self::funnel_tally(actors, true),
                || {
                    rayon::join(
                        || Self::category_tally(records, depth, true),
                        || RevenueConcentration::from_actors(actors, top_percent),
                    )
                },
            )
        } else {
            (
                Self::funnel_tally(actors, false),
                (
                    Self::category_tally(records, depth, false),
                    RevenueConcentration::from_actors(actors, top_percent),
                ),
            )
        };
        let categories = categories?;

        debug!(
            actors = funnel.actors,
            categories = categories.by_category.len(),
            purchasing_actors = revenue.purchasing_actors,
            "metric families computed"
        );

        Ok(PopulationMetrics {
            actor_count: funnel.actors,
            complete_actor_count: funnel.complete_actors,
            total_completed_funnels: funnel.completed_funnels,
            funnel_completion_rate: funnel.completion_rate(),
            cart_to_purchase_rate: funnel.cart_to_purchase_rate(),
            average_views_before_commit: funnel.average_views_before_commit(),
            conversion_rate_by_category: categories.conversions(),
            uncategorized_events: categories.uncategorized,
            revenue_concentration: revenue,
            stage_distribution: funnel.stage_distribution(),
            event_share: funnel.event_share(),
        })
    }

    pub fn funnel_tally(actors: &[ClassifiedActor], parallel: bool) -> FunnelTally {
        if parallel {
            actors
                .par_iter()
                .fold(FunnelTally::default, FunnelTally::observe)
                .reduce(FunnelTally::default, FunnelTally::merge)
        } else {
            actors.iter().fold(FunnelTally::default(), FunnelTally::observe)
        }
    }

    pub fn category_tally(
        records: &[EventRecord],
        depth: Option<usize>,
        parallel: bool,
    ) -> Result<CategoryTally> {
        if parallel {
            records
                .par_iter()
                .enumerate()
                .try_fold(CategoryTally::default, |tally, (index, record)| {
                    tally.observe(index, record, depth)
                })
                .try_reduce(CategoryTally::default, |a, b| Ok(a.merge(b)))
        } else {
            records
                .iter()
                .enumerate()
                .try_fold(CategoryTally::default(), |tally, (index, record)| {
                    tally.observe(index, record, depth)
                })
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
