//! Upstream response envelopes.
//!
//! Only the fields the crawler reads are modelled. Product and comment
//! payloads stay as raw JSON; they are normalized later.

use bazaar_core::ProductId;
use serde::Deserialize;
use serde_json::Value;

use crate::types::{Brand, Category};

/// `{"data": ...}` wrapper every endpoint uses.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub struct Pager {
    pub total_pages: u32,
}

// ---------------------------------------------------------------
// Listings
// ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct BrandListing {
    pub filters: BrandFilters,
}

#[derive(Debug, Deserialize)]
pub struct BrandFilters {
    pub brands: BrandOptions,
}

#[derive(Debug, Deserialize)]
pub struct BrandOptions {
    pub options: Vec<Brand>,
}

/// Category codes sit in one of the page widgets; which one varies.
#[derive(Debug, Deserialize)]
pub struct CategoryListing {
    #[serde(default)]
    pub widgets: Vec<Value>,
}

impl CategoryListing {
    pub fn categories(&self) -> Vec<Category> {
        self.widgets
            .iter()
            .filter_map(|w| w.pointer("/data/categories").and_then(Value::as_array))
            .flatten()
            .filter_map(|c| c.get("code").and_then(Value::as_str))
            .map(|code| Category {
                code: code.to_string(),
            })
            .collect()
    }
}

/// One page of a brand or category listing.
#[derive(Debug, Deserialize)]
pub struct ListingPage {
    pub pager: Pager,
    #[serde(default)]
    pub products: Vec<ListedProduct>,
}

impl ListingPage {
    pub fn product_ids(&self) -> Vec<ProductId> {
        self.products
            .iter()
            .filter_map(|p| ProductId::from_json(&p.id))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct ListedProduct {
    pub id: Value,
}

// ---------------------------------------------------------------
// Detail and reviews
// ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ProductDetail {
    pub product: Value,
}

#[derive(Debug, Deserialize)]
pub struct CommentPage {
    pub pager: Option<Pager>,
    #[serde(default)]
    pub comments: Vec<Value>,
}
