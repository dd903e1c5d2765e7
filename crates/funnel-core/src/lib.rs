//! Shared building blocks for the funnel metrics workspace.
//!
//! Event and category types, the error taxonomy, ratio metrics, CLI settings
//! and number formatting used by the report layer.

pub mod error;
pub mod formatting;
pub mod metric;
pub mod models;
pub mod settings;

pub use error::{FunnelError, MalformedReason, Result};
pub use metric::{Metric, UndefinedMetric};
pub use models::{ActorKeyMode, CategoryPath, EventKind, EventRecord};
