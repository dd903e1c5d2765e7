//! Event ingestion and funnel analysis.
//!
//! Loads clickstream events, groups them into per-actor timelines, classifies
//! each timeline against the view → cart → purchase funnel and aggregates the
//! population metrics.

pub mod analysis;
pub mod brands;
pub mod funnel;
pub mod metrics;
pub mod reader;
pub mod timeline;

pub use funnel_core as core;
