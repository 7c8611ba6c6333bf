//! Raw upstream records and their typed, lenient reading.
//!
//! Raw records stay opaque JSON until transform so snapshots keep exactly
//! what the API returned. At transform time each payload is read into a
//! field struct where everything is optional; required-field policy is
//! applied afterwards.

use bazaar_core::ProductId;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A `data.product` payload as returned by the detail endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawProduct(pub Value);

impl RawProduct {
    pub fn new(payload: Value) -> Self {
        Self(payload)
    }

    /// Upstream id, if the payload carries a usable one.
    pub fn id(&self) -> Option<ProductId> {
        self.0.get("id").and_then(ProductId::from_json)
    }
}

/// One upstream comment tagged with the product it was fetched for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawComment {
    pub product_id: Option<ProductId>,
    pub payload: Value,
}

impl RawComment {
    pub fn new(product_id: ProductId, payload: Value) -> Self {
        Self {
            product_id: Some(product_id),
            payload,
        }
    }

    /// Build from a payload that embeds its own `product_id` field.
    pub fn from_flat(payload: Value) -> Self {
        let product_id = payload.get("product_id").and_then(ProductId::from_json);
        Self {
            product_id,
            payload,
        }
    }
}

/// Why a record produced no document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejected {
    #[error("unreadable payload: {0}")]
    Unreadable(String),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}

// ---------------------------------------------------------------
// Typed readings
// ---------------------------------------------------------------

/// `null` and absent both read as the type's default.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ProductFields {
    pub id: Option<Value>,
    pub title_en: Option<String>,
    pub title_fa: Option<String>,
    pub brand: Option<CodeRef>,
    pub category: Option<CodeRef>,
    pub default_variant: Option<Variant>,
    pub rating: Option<Rating>,
    #[serde(deserialize_with = "nullable")]
    pub colors: Vec<Titled>,
    pub images: Option<Images>,
    pub specifications: Option<Value>,
    #[serde(deserialize_with = "nullable")]
    pub product_badges: Vec<Value>,
    pub comments_count: Option<i64>,
    pub questions_count: Option<i64>,
    pub suggestion: Option<Value>,
    pub comments_overview: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct CodeRef {
    pub code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Variant {
    pub price: Option<Price>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Price {
    pub selling_price: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Rating {
    pub rate: Option<f64>,
    pub count: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Titled {
    pub title: Option<String>,
}

/// Anything carrying a `url` list; the first entry is the usable one.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct UrlList {
    #[serde(deserialize_with = "nullable")]
    pub url: Vec<String>,
}

impl UrlList {
    pub fn first(&self) -> Option<&str> {
        self.url.first().map(|s| s.as_str()).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Images {
    pub main: Option<UrlList>,
    #[serde(deserialize_with = "nullable")]
    pub list: Vec<UrlList>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct CommentFields {
    pub title: Option<String>,
    pub body: Option<String>,
    pub rate: Option<i64>,
    pub advantages: Option<TextList>,
    pub disadvantages: Option<TextList>,
    pub is_buyer: Option<bool>,
    pub created_at: Option<String>,
    pub purchased_item: Option<PurchasedItem>,
    pub reactions: Option<Reactions>,
    #[serde(deserialize_with = "nullable")]
    pub files: Vec<UrlList>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct PurchasedItem {
    pub color: Option<Titled>,
    pub seller: Option<Titled>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Reactions {
    pub likes: Option<i64>,
    pub dislikes: Option<i64>,
}

/// Pros/cons arrive either as one string or a list of strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum TextList {
    One(String),
    Many(Vec<Option<String>>),
}

impl TextList {
    pub fn into_vec(self) -> Vec<String> {
        let items = match self {
            TextList::One(s) => vec![s],
            TextList::Many(items) => items.into_iter().flatten().collect(),
        };
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_collections_read_as_empty() {
        let fields: ProductFields =
            serde_json::from_value(json!({"colors": null, "product_badges": null})).unwrap();
        assert!(fields.colors.is_empty());
        assert!(fields.product_badges.is_empty());
    }

    #[test]
    fn test_text_list_accepts_string_or_list() {
        let one: TextList = serde_json::from_value(json!("good screen")).unwrap();
        assert_eq!(one.into_vec(), vec!["good screen"]);

        let many: TextList = serde_json::from_value(json!(["fast", null, " "])).unwrap();
        assert_eq!(many.into_vec(), vec!["fast"]);
    }

    #[test]
    fn test_flat_comment_picks_up_embedded_id() {
        let raw = RawComment::from_flat(json!({"product_id": 77, "body": "ok"}));
        assert_eq!(raw.product_id, Some(ProductId::from(77)));

        let raw = RawComment::from_flat(json!({"body": "orphan"}));
        assert!(raw.product_id.is_none());
    }
}
