//! Canonical product record and the multi-phase merge rules
//!
//! A product is observed in several passes of different fidelity (detail-page
//! API, list-page API, rendered-DOM fallback, external batch import). Each
//! pass produces a [`PartialProduct`]; the task-scoped draft folds partials
//! into one [`ProductRecord`] so that a field populated by a higher-fidelity
//! source is never clobbered by a lower-fidelity one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::estimate::{Confidence, EstimationMethod};
use super::snapshot::StockStatus;

/// Fidelity rank of an extraction source. Ordering matters: variants are
/// declared lowest-first so `Ord` agrees with "which source wins a merge".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFidelity {
    /// Externally ingested payload (e.g. an in-page collector batch)
    BatchImport,
    /// Text/DOM heuristics over a rendered card
    DomFallback,
    /// Intercepted list-phase API widgets
    ListApi,
    /// Intercepted detail-phase API widgets (both detail steps)
    DetailApi,
}

/// One canonical product record, keyed by marketplace-assigned SKU.
///
/// Directly observed fields come from the extraction pipeline; the derived
/// sales fields are filled in from the estimator on demand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductRecord {
    pub sku: String,
    pub title: String,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    #[serde(rename = "productUrl")]
    pub product_url: String,
    pub price: f64,
    #[serde(rename = "originalPrice")]
    pub original_price: f64,
    #[serde(rename = "discountPercent")]
    pub discount_percent: u32,
    /// Breadcrumb path joined with " > "
    pub category: String,
    pub brand: String,
    pub rating: f64,
    #[serde(rename = "reviewCount")]
    pub review_count: u32,
    #[serde(rename = "sellerType")]
    pub seller_type: String,
    #[serde(rename = "sellerName")]
    pub seller_name: String,
    #[serde(rename = "creationDate")]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(rename = "followerCount")]
    pub follower_count: u32,
    #[serde(rename = "followerMinPrice")]
    pub follower_min_price: f64,
    #[serde(rename = "followerMinUrl")]
    pub follower_min_url: String,
    #[serde(rename = "lengthCm")]
    pub length_cm: f64,
    #[serde(rename = "widthCm")]
    pub width_cm: f64,
    #[serde(rename = "heightCm")]
    pub height_cm: f64,
    #[serde(rename = "weightG")]
    pub weight_g: f64,
    #[serde(rename = "volumeLiters")]
    pub volume_liters: f64,
    #[serde(rename = "deliveryInfo")]
    pub delivery_info: String,
    /// Search keyword this record was collected under
    pub keyword: String,
    #[serde(rename = "stockQuantity")]
    pub stock_quantity: Option<u32>,
    #[serde(rename = "stockStatus")]
    pub stock_status: StockStatus,

    // Derived sales fields (estimator output, recomputable at any time)
    #[serde(rename = "weeklySales")]
    pub weekly_sales: u64,
    #[serde(rename = "monthlySales")]
    pub monthly_sales: u64,
    #[serde(rename = "salesEstimateMethod")]
    pub sales_estimate_method: EstimationMethod,
    #[serde(rename = "salesConfidence")]
    pub sales_confidence: Confidence,
    #[serde(rename = "monthlyGmv")]
    pub monthly_gmv: f64,

    #[serde(rename = "lastCollectedAt")]
    pub last_collected_at: Option<DateTime<Utc>>,
}

impl ProductRecord {
    /// Create an otherwise-empty record for a known SKU
    pub fn new(sku: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            title: String::new(),
            image_url: String::new(),
            product_url: String::new(),
            price: 0.0,
            original_price: 0.0,
            discount_percent: 0,
            category: String::new(),
            brand: String::new(),
            rating: 0.0,
            review_count: 0,
            seller_type: String::new(),
            seller_name: String::new(),
            creation_date: None,
            follower_count: 0,
            follower_min_price: 0.0,
            follower_min_url: String::new(),
            length_cm: 0.0,
            width_cm: 0.0,
            height_cm: 0.0,
            weight_g: 0.0,
            volume_liters: 0.0,
            delivery_info: String::new(),
            keyword: String::new(),
            stock_quantity: None,
            stock_status: StockStatus::Unknown,
            weekly_sales: 0,
            monthly_sales: 0,
            sales_estimate_method: EstimationMethod::None,
            sales_confidence: Confidence::None,
            monthly_gmv: 0.0,
            last_collected_at: None,
        }
    }
}

/// Fields resolvable from a single extraction pass. Empty string / zero /
/// `None` means "not observed this pass" (the marketplace never reports a
/// legitimate zero price or empty SKU, so absence encoding is safe here).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialProduct {
    pub sku: String,
    pub title: String,
    pub image_url: String,
    pub product_url: String,
    pub price: f64,
    pub original_price: f64,
    pub discount_percent: u32,
    pub category: String,
    pub brand: String,
    pub rating: f64,
    pub review_count: u32,
    pub seller_type: String,
    pub seller_name: String,
    pub creation_date: Option<DateTime<Utc>>,
    pub follower_count: u32,
    pub follower_min_price: f64,
    pub follower_min_url: String,
    pub length_cm: f64,
    pub width_cm: f64,
    pub height_cm: f64,
    pub weight_g: f64,
    pub volume_liters: f64,
    pub delivery_info: String,
    pub stock_quantity: Option<u32>,
    /// Which extraction channel produced this pass
    pub source: SourceFidelity,
}

impl Default for SourceFidelity {
    fn default() -> Self {
        Self::DomFallback
    }
}

impl PartialProduct {
    pub fn new(source: SourceFidelity) -> Self {
        Self {
            source,
            ..Self::default()
        }
    }

    /// A partial without a SKU cannot be merged anywhere
    pub fn has_identity(&self) -> bool {
        !self.sku.is_empty()
    }

    /// Fill every still-empty field of `record` from this pass.
    fn fill_into(&self, record: &mut ProductRecord) {
        fill_str(&mut record.title, &self.title);
        fill_str(&mut record.image_url, &self.image_url);
        fill_str(&mut record.product_url, &self.product_url);
        fill_f64(&mut record.price, self.price);
        fill_f64(&mut record.original_price, self.original_price);
        fill_u32(&mut record.discount_percent, self.discount_percent);
        fill_str(&mut record.category, &self.category);
        fill_str(&mut record.brand, &self.brand);
        fill_f64(&mut record.rating, self.rating);
        fill_u32(&mut record.review_count, self.review_count);
        fill_str(&mut record.seller_type, &self.seller_type);
        fill_str(&mut record.seller_name, &self.seller_name);
        if record.creation_date.is_none() {
            record.creation_date = self.creation_date;
        }
        fill_u32(&mut record.follower_count, self.follower_count);
        fill_f64(&mut record.follower_min_price, self.follower_min_price);
        fill_str(&mut record.follower_min_url, &self.follower_min_url);
        fill_f64(&mut record.length_cm, self.length_cm);
        fill_f64(&mut record.width_cm, self.width_cm);
        fill_f64(&mut record.height_cm, self.height_cm);
        fill_f64(&mut record.weight_g, self.weight_g);
        fill_f64(&mut record.volume_liters, self.volume_liters);
        fill_str(&mut record.delivery_info, &self.delivery_info);
        if record.stock_quantity.is_none() {
            record.stock_quantity = self.stock_quantity;
        }
    }
}

fn fill_str(dst: &mut String, src: &str) {
    if dst.is_empty() && !src.is_empty() {
        dst.push_str(src);
    }
}

fn fill_f64(dst: &mut f64, src: f64) {
    if *dst == 0.0 && src != 0.0 {
        *dst = src;
    }
}

fn fill_u32(dst: &mut u32, src: u32) {
    if *dst == 0 && src != 0 {
        *dst = src;
    }
}

/// Task-scoped accumulator for one SKU across extraction passes.
///
/// The draft keeps every observed pass and resolves them fidelity-first, so
/// absorbing passes in any arrival order yields the same record: resolution
/// sorts by fidelity (stable, so same-fidelity passes keep arrival order)
/// and lets each pass fill only the fields still empty after the better
/// sources had their turn.
#[derive(Debug, Clone)]
pub struct ProductDraft {
    sku: String,
    observations: Vec<PartialProduct>,
    /// Set when the detail phase failed and the item fell back to list data
    pub degraded: bool,
}

impl ProductDraft {
    pub fn new(sku: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            observations: Vec::new(),
            degraded: false,
        }
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    /// Absorb one extraction pass. Passes for a different SKU are ignored;
    /// the coordinator routes by SKU before calling this.
    pub fn absorb(&mut self, partial: PartialProduct) {
        if partial.sku == self.sku {
            self.observations.push(partial);
        }
    }

    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }

    /// Resolve the accumulated passes into one canonical record.
    pub fn resolved(&self, keyword: &str, collected_at: DateTime<Utc>) -> ProductRecord {
        let mut ranked: Vec<&PartialProduct> = self.observations.iter().collect();
        ranked.sort_by(|a, b| b.source.cmp(&a.source));

        let mut record = ProductRecord::new(self.sku.clone());
        for partial in ranked {
            partial.fill_into(&mut record);
        }
        record.stock_status = match record.stock_quantity {
            Some(qty) => StockStatus::classify(qty),
            None => StockStatus::Unknown,
        };
        record.keyword = keyword.to_string();
        record.last_collected_at = Some(collected_at);
        record
    }
}
