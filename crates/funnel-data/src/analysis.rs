//! Main analysis pipeline.
//!
//! records → actor timelines → funnel outcomes → population metrics, plus the
//! brand price index. [`compute_metrics`] is the in-memory entry point;
//! [`analyze_events`] adds loading from disk and run metadata.

use std::path::PathBuf;

use chrono::Utc;
use funnel_core::error::Result;
use funnel_core::models::{ActorKeyMode, CategoryPath, EventRecord};
use funnel_core::settings::MetricsConfig;
use serde::Serialize;
use tracing::info;

use crate::brands::BrandPriceIndex;
use crate::funnel::{ClassifiedActor, FunnelClassifier};
use crate::metrics::{MetricEngine, PopulationMetrics};
use crate::reader::load_event_records;
use crate::timeline::TimelineBuilder;

// ── Public types ──────────────────────────────────────────────────────────────

/// What to analyse and how.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Event file or directory.
    pub data_path: PathBuf,
    pub actor_mode: ActorKeyMode,
    pub metrics: MetricsConfig,
    /// Restrict the brand price index to this category subtree.
    pub brand_category: Option<CategoryPath>,
}

/// Metadata produced alongside the report.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisMetadata {
    /// ISO-8601 timestamp when this report was generated.
    pub generated_at: String,
    pub data_path: String,
    pub actor_mode: ActorKeyMode,
    pub files_read: usize,
    pub records_loaded: usize,
    pub skipped_lines: usize,
    pub actors: usize,
    /// Wall-clock seconds spent reading event files.
    pub load_time_seconds: f64,
    /// Wall-clock seconds spent grouping, classifying and aggregating.
    pub compute_time_seconds: f64,
}

/// The complete output of [`analyze_events`].
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub metadata: AnalysisMetadata,
    pub metrics: PopulationMetrics,
    pub brand_prices: BrandPriceIndex,
}

// ── Public functions ──────────────────────────────────────────────────────────

/// Group records into timelines and classify each one.
pub fn classify_records(records: &[EventRecord], parallel: bool) -> Result<Vec<ClassifiedActor>> {
    let timelines = TimelineBuilder::build_with(records, parallel)?;
    Ok(FunnelClassifier::classify_all(timelines, parallel))
}

/// Compute population metrics for an in-memory batch.
///
/// Fails with [`MalformedRecord`](funnel_core::FunnelError::MalformedRecord)
/// on a contract violation and with
/// [`EmptyPopulation`](funnel_core::FunnelError::EmptyPopulation) when the
/// batch has no actors.
pub fn compute_metrics(records: &[EventRecord], config: &MetricsConfig) -> Result<PopulationMetrics> {
    let engine = MetricEngine::new(config.clone());
    let actors = classify_records(records, engine.config().parallel)?;
    engine.compute(records, &actors)
}

/// Run the full pipeline against event files on disk.
pub fn analyze_events(request: &AnalysisRequest) -> Result<AnalysisReport> {
    info!(
        path = %request.data_path.display(),
        actor = %request.actor_mode,
        "loading events"
    );

    let load_start = std::time::Instant::now();
    let loaded = load_event_records(&request.data_path, request.actor_mode)?;
    let load_time = load_start.elapsed().as_secs_f64();

    let compute_start = std::time::Instant::now();
    let engine = MetricEngine::new(request.metrics.clone());
    let actors = classify_records(&loaded.records, engine.config().parallel)?;
    let metrics = engine.compute(&loaded.records, &actors)?;
    let brand_prices = BrandPriceIndex::build(&loaded.records, request.brand_category.as_ref())?;
    let compute_time = compute_start.elapsed().as_secs_f64();

    info!(
        records = loaded.records.len(),
        actors = actors.len(),
        compute_seconds = compute_time,
        "analysis complete"
    );

    let metadata = AnalysisMetadata {
        generated_at: Utc::now().to_rfc3339(),
        data_path: request.data_path.display().to_string(),
        actor_mode: request.actor_mode,
        files_read: loaded.files_read,
        records_loaded: loaded.records.len(),
        skipped_lines: loaded.skipped_lines,
        actors: actors.len(),
        load_time_seconds: load_time,
        compute_time_seconds: compute_time,
    };

    Ok(AnalysisReport {
        metadata,
        metrics,
        brand_prices,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
