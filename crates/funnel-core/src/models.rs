use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MalformedReason;

/// The closed set of funnel actions an actor can perform.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    View,
    Cart,
    Purchase,
}

impl EventKind {
    /// All kinds in funnel order.
    pub const ALL: [EventKind; 3] = [EventKind::View, EventKind::Cart, EventKind::Purchase];

    /// Wire name as it appears in the `event_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::View => "view",
            EventKind::Cart => "cart",
            EventKind::Purchase => "purchase",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = MalformedReason;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(EventKind::View),
            "cart" => Ok(EventKind::Cart),
            "purchase" => Ok(EventKind::Purchase),
            other => Err(MalformedReason::UnknownEventKind(other.to_string())),
        }
    }
}

// ── CategoryPath ──────────────────────────────────────────────────────────────

/// Hierarchical product category, e.g. `electronics.smartphone`.
///
/// Stored as ordered path segments; serialized in its dotted form so it can be
/// used directly as a JSON object key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CategoryPath {
    segments: Vec<String>,
}

impl CategoryPath {
    /// Parse a dotted category string.
    ///
    /// Returns `None` for blank input or when every segment is empty.
    /// Empty segments (`"a..b"`) are dropped.
    pub fn parse(dotted: &str) -> Option<Self> {
        let segments: Vec<String> = dotted
            .trim()
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if segments.is_empty() {
            None
        } else {
            Some(Self { segments })
        }
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Roll the path up to at most `depth` segments. A depth of zero is
    /// treated as one so the result is never empty.
    pub fn truncate(&self, depth: usize) -> Self {
        let keep = depth.max(1).min(self.depth());
        Self {
            segments: self.segments[..keep].to_vec(),
        }
    }

    /// Whether `self` equals `other` or lies beneath it.
    pub fn starts_with(&self, other: &CategoryPath) -> bool {
        self.segments.starts_with(&other.segments)
    }
}

impl fmt::Display for CategoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl From<CategoryPath> for String {
    fn from(path: CategoryPath) -> Self {
        path.to_string()
    }
}

impl TryFrom<String> for CategoryPath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CategoryPath::parse(&value).ok_or_else(|| format!("empty category path {value:?}"))
    }
}

// ── ActorKeyMode ──────────────────────────────────────────────────────────────

/// Which identifier column groups events into one actor.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ActorKeyMode {
    /// Group by `user_id`: one timeline per customer.
    User,
    /// Group by `user_session`: one timeline per browsing session.
    #[default]
    Session,
}

impl fmt::Display for ActorKeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorKeyMode::User => f.write_str("user"),
            ActorKeyMode::Session => f.write_str("session"),
        }
    }
}

// ── EventRecord ───────────────────────────────────────────────────────────────

/// One observed storefront action, as delivered by ingestion.
///
/// `event_type` keeps the raw wire value; [`EventRecord::classify`] turns it
/// into an [`EventKind`] and enforces the record contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub actor_key: String,
    /// Used only for ordering within an actor.
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    #[serde(default)]
    pub category: Option<CategoryPath>,
    #[serde(default)]
    pub brand: Option<String>,
    /// Required for purchases, optional otherwise.
    #[serde(default)]
    pub price: Option<f64>,
}

impl EventRecord {
    /// Build a record with no category, brand or price.
    pub fn new(
        actor_key: impl Into<String>,
        timestamp: DateTime<Utc>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            actor_key: actor_key.into(),
            timestamp,
            event_type: event_type.into(),
            category: None,
            brand: None,
            price: None,
        }
    }

    pub fn with_category(mut self, dotted: &str) -> Self {
        self.category = CategoryPath::parse(dotted);
        self
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    /// Validate the record and return its kind.
    pub fn classify(&self) -> Result<EventKind, MalformedReason> {
        let kind: EventKind = self.event_type.parse()?;
        match self.price {
            Some(p) if p < 0.0 => return Err(MalformedReason::NegativePrice(p)),
            None if kind == EventKind::Purchase => return Err(MalformedReason::MissingPrice),
            _ => {}
        }
        Ok(kind)
    }

    /// Revenue contributed by this record: the price for purchases, zero otherwise.
    pub fn revenue(&self, kind: EventKind) -> f64 {
        if kind == EventKind::Purchase {
            self.price.unwrap_or(0.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 10, 1, 0, 0, 0).unwrap()
    }

    // ── EventKind ─────────────────────────────────────────────────────────────

    #[test]
    fn test_event_kind_parses_wire_names() {
        assert_eq!("view".parse::<EventKind>(), Ok(EventKind::View));
        assert_eq!("cart".parse::<EventKind>(), Ok(EventKind::Cart));
        assert_eq!("purchase".parse::<EventKind>(), Ok(EventKind::Purchase));
    }

    #[test]
    fn test_event_kind_rejects_other_values() {
        assert_eq!(
            "remove_from_cart".parse::<EventKind>(),
            Err(MalformedReason::UnknownEventKind("remove_from_cart".to_string()))
        );
        assert!("View".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_event_kind_serde_lowercase() {
        let json = serde_json::to_string(&EventKind::Purchase).unwrap();
        assert_eq!(json, "\"purchase\"");
    }

    // ── CategoryPath ──────────────────────────────────────────────────────────

    #[test]
    fn test_category_parse_segments() {
        let path = CategoryPath::parse("electronics.smartphone").unwrap();
        assert_eq!(path.depth(), 2);
        assert_eq!(path.truncate(1).to_string(), "electronics");
        assert_eq!(path.to_string(), "electronics.smartphone");
    }

    #[test]
    fn test_category_parse_blank_is_none() {
        assert!(CategoryPath::parse("").is_none());
        assert!(CategoryPath::parse("   ").is_none());
        assert!(CategoryPath::parse("..").is_none());
    }

    #[test]
    fn test_category_parse_drops_empty_segments() {
        let path = CategoryPath::parse("appliances..kitchen.").unwrap();
        assert_eq!(path.to_string(), "appliances.kitchen");
    }

    #[test]
    fn test_category_truncate() {
        let path = CategoryPath::parse("appliances.kitchen.refrigerators").unwrap();
        assert_eq!(path.truncate(1).to_string(), "appliances");
        assert_eq!(path.truncate(2).to_string(), "appliances.kitchen");
        assert_eq!(path.truncate(9), path);
        assert_eq!(path.truncate(0).to_string(), "appliances");
    }

    #[test]
    fn test_category_starts_with() {
        let leaf = CategoryPath::parse("electronics.audio.headphone").unwrap();
        let parent = CategoryPath::parse("electronics.audio").unwrap();
        assert!(leaf.starts_with(&parent));
        assert!(!parent.starts_with(&leaf));
    }

    #[test]
    fn test_category_serializes_as_dotted_string() {
        let path = CategoryPath::parse("computers.notebook").unwrap();
        assert_eq!(serde_json::to_string(&path).unwrap(), "\"computers.notebook\"");
        let back: CategoryPath = serde_json::from_str("\"computers.notebook\"").unwrap();
        assert_eq!(back, path);
        assert!(serde_json::from_str::<CategoryPath>("\"\"").is_err());
    }

    // ── EventRecord::classify ─────────────────────────────────────────────────

    #[test]
    fn test_classify_view_without_price() {
        let record = EventRecord::new("u1", ts(), "view");
        assert_eq!(record.classify(), Ok(EventKind::View));
    }

    #[test]
    fn test_classify_purchase_requires_price() {
        let record = EventRecord::new("u1", ts(), "purchase");
        assert_eq!(record.classify(), Err(MalformedReason::MissingPrice));

        let priced = record.with_price(19.99);
        assert_eq!(priced.classify(), Ok(EventKind::Purchase));
    }

    #[test]
    fn test_classify_rejects_negative_price() {
        let record = EventRecord::new("u1", ts(), "cart").with_price(-1.0);
        assert_eq!(record.classify(), Err(MalformedReason::NegativePrice(-1.0)));
    }

    #[test]
    fn test_classify_rejects_unknown_kind() {
        let record = EventRecord::new("u1", ts(), "wishlist");
        assert!(matches!(
            record.classify(),
            Err(MalformedReason::UnknownEventKind(k)) if k == "wishlist"
        ));
    }

    #[test]
    fn test_revenue_only_counts_purchases() {
        let record = EventRecord::new("u1", ts(), "view").with_price(50.0);
        assert_eq!(record.revenue(EventKind::View), 0.0);
        let purchase = EventRecord::new("u1", ts(), "purchase").with_price(50.0);
        assert_eq!(purchase.revenue(EventKind::Purchase), 50.0);
    }
}
