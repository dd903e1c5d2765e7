//! Average purchase price per brand within each category.

use std::collections::{BTreeMap, HashMap};

use funnel_core::error::{FunnelError, Result};
use funnel_core::models::{CategoryPath, EventKind, EventRecord};
use serde::Serialize;

/// Purchase price summary for one brand in one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrandPrice {
    pub brand: String,
    pub purchases: u64,
    pub average_price: f64,
}

#[derive(Debug, Default)]
struct PriceSum {
    total: f64,
    count: u64,
}

/// Brands ranked by average purchase price, per category.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BrandPriceIndex {
    categories: BTreeMap<CategoryPath, Vec<BrandPrice>>,
}

impl BrandPriceIndex {
    /// Build the index from purchase events that carry both a category and a
    /// brand. With `filter`, only that category and its children are kept.
    ///
    /// Each brand list is sorted by average price descending, ties by brand
    /// name ascending.
    pub fn build(records: &[EventRecord], filter: Option<&CategoryPath>) -> Result<Self> {
        let mut sums: HashMap<(&CategoryPath, &str), PriceSum> = HashMap::new();

        for (index, record) in records.iter().enumerate() {
            let kind = record.classify().map_err(|reason| {
                FunnelError::malformed(index, record.actor_key.as_str(), reason)
            })?;
            if kind != EventKind::Purchase {
                continue;
            }
            let (Some(category), Some(brand), Some(price)) =
                (&record.category, record.brand.as_deref(), record.price)
            else {
                continue;
            };
            let brand = brand.trim();
            if brand.is_empty() {
                continue;
            }
            if let Some(prefix) = filter {
                if !category.starts_with(prefix) {
                    continue;
                }
            }
            let sum = sums.entry((category, brand)).or_default();
            sum.total += price;
            sum.count += 1;
        }

        let mut categories: BTreeMap<CategoryPath, Vec<BrandPrice>> = BTreeMap::new();
        for ((category, brand), sum) in sums {
            categories
                .entry(category.clone())
                .or_default()
                .push(BrandPrice {
                    brand: brand.to_string(),
                    purchases: sum.count,
                    average_price: sum.total / sum.count as f64,
                });
        }
        for brands in categories.values_mut() {
            brands.sort_by(|a, b| {
                b.average_price
                    .total_cmp(&a.average_price)
                    .then_with(|| a.brand.cmp(&b.brand))
            });
        }

        Ok(Self { categories })
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn categories(&self) -> impl Iterator<Item = (&CategoryPath, &[BrandPrice])> {
        self.categories.iter().map(|(c, b)| (c, b.as_slice()))
    }

    pub fn brands(&self, category: &CategoryPath) -> Option<&[BrandPrice]> {
        self.categories.get(category).map(Vec::as_slice)
    }

    /// Brand with the highest average price in `category`.
    pub fn top_brand(&self, category: &CategoryPath) -> Option<&BrandPrice> {
        self.categories.get(category).and_then(|b| b.first())
    }

    /// The top brand of every category, cheapest leader first.
    pub fn leaders(&self) -> Vec<(&CategoryPath, &BrandPrice)> {
        let mut leaders: Vec<(&CategoryPath, &BrandPrice)> = self
            .categories
            .iter()
            .filter_map(|(category, brands)| brands.first().map(|b| (category, b)))
            .collect();
        leaders.sort_by(|a, b| {
            a.1.average_price
                .total_cmp(&b.1.average_price)
                .then_with(|| a.0.cmp(b.0))
        });
        leaders
    }
}
