//! Product transform: `data.product` payloads into upsert ops.

use bazaar_core::ProductId;
use bazaar_store::{ProductDocument, UpsertOp};
use tracing::{debug, warn};

use crate::normalize::{extract_features, flatten_specifications};
use crate::raw::{ProductFields, RawProduct, Rejected};

/// Transform one chunk. Rejected records are logged and left out.
pub fn transform_products(records: &[RawProduct]) -> Vec<UpsertOp> {
    let ops: Vec<UpsertOp> = records
        .iter()
        .filter_map(|raw| match transform_product(raw) {
            Ok(doc) => Some(UpsertOp::new(doc)),
            Err(reason) => {
                let id = raw.id().map(ProductId::into_string);
                warn!(
                    "Skipping product {}: {}",
                    id.as_deref().unwrap_or("N/A"),
                    reason
                );
                None
            }
        })
        .collect();
    debug!("Transformed {} of {} products", ops.len(), records.len());
    ops
}

/// Normalize a single product payload.
///
/// Requires an id, an English title (possibly empty), brand and category
/// codes, and a readable specification table.
pub fn transform_product(raw: &RawProduct) -> Result<ProductDocument, Rejected> {
    let fields: ProductFields = serde_json::from_value(raw.0.clone())
        .map_err(|e| Rejected::Unreadable(e.to_string()))?;

    let id = fields
        .id
        .as_ref()
        .and_then(ProductId::from_json)
        .ok_or(Rejected::MissingField("id"))?;
    // Present but empty is kept; only absent or null drops the record.
    let title_en = fields.title_en.ok_or(Rejected::MissingField("title_en"))?;
    let brand_code = fields
        .brand
        .and_then(|b| non_empty(b.code))
        .ok_or(Rejected::MissingField("brand"))?;
    let category_code = fields
        .category
        .and_then(|c| non_empty(c.code))
        .ok_or(Rejected::MissingField("category"))?;
    let specifications = fields
        .specifications
        .as_ref()
        .and_then(flatten_specifications)
        .ok_or(Rejected::MissingField("specifications"))?;

    let mut images = Vec::new();
    if let Some(imgs) = &fields.images {
        if let Some(main) = imgs.main.as_ref().and_then(|m| m.first()) {
            images.push(main.to_string());
        }
        images.extend(imgs.list.iter().filter_map(|u| u.first()).map(str::to_string));
    }

    let (rate, count_raters) = fields
        .rating
        .map(|r| (r.rate, r.count))
        .unwrap_or_default();

    let features = extract_features(&specifications);

    Ok(ProductDocument {
        id,
        title_en,
        title_fa: non_empty(fields.title_fa),
        brand_code,
        category_code,
        price: fields
            .default_variant
            .and_then(|v| v.price)
            .and_then(|p| p.selling_price),
        rate,
        count_raters,
        specifications,
        colors: fields
            .colors
            .into_iter()
            .filter_map(|c| non_empty(c.title))
            .collect(),
        images,
        popularity: fields.product_badges.len() as i64,
        num_questions: fields.questions_count.unwrap_or(0),
        num_comments: fields.comments_count.unwrap_or(0),
        suggestions: fields.suggestion.filter(|v| !v.is_null()),
        comments_overview: fields.comments_overview.filter(|v| v.is_object()),
        features,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_payload() -> serde_json::Value {
        json!({
            "id": 123,
            "title_en": "English Title",
            "title_fa": "FA",
            "brand": {"code": "bcode"},
            "category": {"code": "ccode"},
            "specifications": {"group": {"attr": ["v"]}},
            "colors": [{"title": "red"}, {"title": "green"}],
            "rating": {"rate": 4, "count": 10},
            "default_variant": {"price": {"selling_price": 199}},
            "product_badges": [1, 2],
            "suggestion": {"count": 42, "percentage": 90},
            "comments_count": 5,
            "questions_count": 2,
            "comments_overview": {"overview": "ok"},
            "images": {"main": {"url": ["m.jpg"]}, "list": [{"url": ["a.jpg"]}, {"url": []}]}
        })
    }

    #[test]
    fn test_full_payload_maps_every_field() {
        let doc = transform_product(&RawProduct::new(full_payload())).unwrap();
        assert_eq!(doc.id.as_str(), "123");
        assert_eq!(doc.title_fa.as_deref(), Some("FA"));
        assert_eq!(doc.brand_code, "bcode");
        assert_eq!(doc.category_code, "ccode");
        assert_eq!(doc.price, Some(199));
        assert_eq!(doc.rate, Some(4.0));
        assert_eq!(doc.count_raters, Some(10));
        assert_eq!(doc.colors, vec!["red", "green"]);
        assert_eq!(doc.images, vec!["m.jpg", "a.jpg"]);
        assert_eq!(doc.popularity, 2);
        assert_eq!(doc.num_comments, 5);
        assert_eq!(doc.num_questions, 2);
        assert_eq!(doc.specifications["group"]["attr"], vec!["v"]);
        assert!(doc.comments_overview.is_some());
    }

    #[test]
    fn test_missing_required_fields_are_rejected() {
        for field in ["id", "title_en", "brand", "category", "specifications"] {
            let mut payload = full_payload();
            payload.as_object_mut().unwrap().remove(field);
            let err = transform_product(&RawProduct::new(payload)).unwrap_err();
            assert!(matches!(err, Rejected::MissingField(_)), "{}", field);
        }

        let mut payload = full_payload();
        payload["brand"] = json!({});
        assert_eq!(
            transform_product(&RawProduct::new(payload)).unwrap_err(),
            Rejected::MissingField("brand")
        );
    }

    #[test]
    fn test_empty_title_is_kept_but_null_title_is_not() {
        let payload = json!({
            "id": 1,
            "title_en": "",
            "brand": {"code": "b"},
            "category": {"code": "c"},
            "specifications": {"g": {"a": ["v"]}}
        });
        let doc = transform_product(&RawProduct::new(payload.clone())).unwrap();
        assert_eq!(doc.title_en, "");

        let mut null_title = payload;
        null_title["title_en"] = serde_json::Value::Null;
        assert_eq!(
            transform_product(&RawProduct::new(null_title)).unwrap_err(),
            Rejected::MissingField("title_en")
        );
    }

    #[test]
    fn test_unreadable_payload_is_rejected() {
        let mut payload = full_payload();
        payload["rating"] = json!("five stars");
        assert!(matches!(
            transform_product(&RawProduct::new(payload)),
            Err(Rejected::Unreadable(_))
        ));
    }

    #[test]
    fn test_optional_fields_default() {
        let payload = json!({
            "id": "55",
            "title_en": "Bare",
            "brand": {"code": "b"},
            "category": {"code": "c"},
            "specifications": [],
            "colors": null
        });
        let doc = transform_product(&RawProduct::new(payload)).unwrap();
        assert_eq!(doc.price, None);
        assert!(doc.colors.is_empty());
        assert!(doc.images.is_empty());
        assert_eq!(doc.num_comments, 0);
        assert!(doc.features.is_empty());
    }

    #[test]
    fn test_chunk_skips_bad_records_only() {
        let mut bad = full_payload();
        bad["title_en"] = serde_json::Value::Null;
        let mut second = full_payload();
        second["id"] = json!(124);

        let ops = transform_products(&[
            RawProduct::new(full_payload()),
            RawProduct::new(bad),
            RawProduct::new(second),
        ]);
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[1].id.as_str(), "124");
    }

    #[test]
    fn test_transform_is_deterministic() {
        let raw = RawProduct::new(full_payload());
        assert_eq!(transform_product(&raw), transform_product(&raw));
    }
}
