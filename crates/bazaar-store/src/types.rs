//! Document types and write reports.

use std::collections::{BTreeMap, BTreeSet};

use bazaar_core::ProductId;
use serde::{Deserialize, Serialize};

/// Specification table: group title → attribute title → values.
pub type Specifications = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Numeric facts pulled out of the specification table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductFeatures {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_gb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ram_gb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_inch: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_g: Option<f64>,
    /// Three dimensions in millimetres, as listed upstream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions_mm: Option<[f64; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thickness_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_cm3: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_mah: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_year: Option<i32>,
}

impl ProductFeatures {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A normalized product, keyed by upstream product id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDocument {
    pub id: ProductId,
    pub title_en: String,
    pub title_fa: Option<String>,
    pub brand_code: String,
    pub category_code: String,
    /// Selling price of the default variant.
    pub price: Option<i64>,
    pub rate: Option<f64>,
    pub count_raters: Option<i64>,
    pub specifications: Specifications,
    pub colors: Vec<String>,
    pub images: Vec<String>,
    /// Number of product badges.
    pub popularity: i64,
    pub num_questions: i64,
    pub num_comments: i64,
    pub suggestions: Option<serde_json::Value>,
    pub comments_overview: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "ProductFeatures::is_empty")]
    pub features: ProductFeatures,
}

/// Update-or-insert of one product keyed by id.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOp {
    pub id: ProductId,
    pub document: ProductDocument,
}

impl UpsertOp {
    pub fn new(document: ProductDocument) -> Self {
        Self {
            id: document.id.clone(),
            document,
        }
    }
}

/// A normalized review. Many per product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentDocument {
    pub product_id: ProductId,
    pub title: Option<String>,
    pub body: String,
    pub rate: Option<i64>,
    pub advantages: Vec<String>,
    pub disadvantages: Vec<String>,
    pub is_buyer: Option<bool>,
    pub created_at: Option<String>,
    pub color: Option<String>,
    pub seller: Option<String>,
    pub likes: Option<i64>,
    pub dislikes: Option<i64>,
    pub images: Vec<String>,
}

/// Transformed comments of one chunk.
///
/// `product_ids` lists every product the chunk touched; their stored
/// comments are replaced by `documents`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentBatch {
    pub product_ids: BTreeSet<ProductId>,
    pub documents: Vec<CommentDocument>,
}

/// Outcome of one unordered product bulk write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkWriteReport {
    pub inserted: usize,
    pub updated: usize,
    /// Matched an identical stored document; nothing written.
    pub unchanged: usize,
    pub failed: usize,
}

impl BulkWriteReport {
    /// Ops whose document is now in the store.
    pub fn persisted(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }

    pub fn merge(&mut self, other: &BulkWriteReport) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
    }
}

/// Outcome of one comment chunk replacement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommentLoadReport {
    pub deleted: usize,
    pub inserted: usize,
    pub failed: usize,
}

/// Collection sizes.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub products: i64,
    pub comments: i64,
    pub commented_products: i64,
    pub db_path: String,
    pub db_size_mb: f64,
}
