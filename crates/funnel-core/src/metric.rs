//! Ratio values that may be undefined.
//!
//! A zero denominator is a reportable state, not a failure: every ratio the
//! engine produces is a [`Metric`] that either carries a value or names the
//! missing denominator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a ratio could not be computed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedMetric {
    #[error("no actors in population")]
    NoActors,
    #[error("no actor has any events")]
    NoActiveActors,
    #[error("no actor added to cart")]
    NoCartActors,
    #[error("category has no views")]
    NoCategoryViews,
    #[error("no actor made a purchase")]
    NoPurchasingActors,
    #[error("purchases carry no revenue")]
    NoRevenue,
    #[error("no events observed")]
    NoEvents,
}

/// A ratio that is either defined or explicitly undefined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Metric {
    Defined { value: f64 },
    Undefined { reason: UndefinedMetric },
}

impl Metric {
    /// `numerator / denominator`, or `Undefined(reason)` when the denominator is zero.
    pub fn ratio(numerator: f64, denominator: f64, reason: UndefinedMetric) -> Self {
        if denominator == 0.0 {
            Metric::Undefined { reason }
        } else {
            Metric::Defined {
                value: numerator / denominator,
            }
        }
    }

    /// Count-based ratio.
    pub fn of_counts(numerator: u64, denominator: u64, reason: UndefinedMetric) -> Self {
        Self::ratio(numerator as f64, denominator as f64, reason)
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Metric::Defined { value } => Some(*value),
            Metric::Undefined { .. } => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Metric::Defined { .. })
    }

    pub fn undefined_reason(&self) -> Option<UndefinedMetric> {
        match self {
            Metric::Defined { .. } => None,
            Metric::Undefined { reason } => Some(*reason),
        }
    }
}
