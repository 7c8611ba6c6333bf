//! Comment transform: raw review payloads into a replace batch.

use bazaar_store::{CommentBatch, CommentDocument};
use tracing::{debug, warn};

use crate::normalize::normalize_digits;
use crate::raw::{CommentFields, RawComment, Rejected};

/// Transform one chunk of comments.
///
/// Every product id seen in the chunk is recorded in `product_ids`, even
/// when all of that product's comments were rejected, so the load replaces
/// the product's stored comments as a whole.
pub fn transform_comments(records: &[RawComment]) -> CommentBatch {
    let mut batch = CommentBatch::default();
    for raw in records {
        if let Some(id) = &raw.product_id {
            batch.product_ids.insert(id.clone());
        }
        match transform_comment(raw) {
            Ok(doc) => batch.documents.push(doc),
            Err(reason) => warn!(
                "Skipping comment for product {}: {}",
                raw.product_id
                    .as_ref()
                    .map(|id| id.as_str())
                    .unwrap_or("N/A"),
                reason
            ),
        }
    }
    debug!(
        "Transformed {} of {} comments across {} products",
        batch.documents.len(),
        records.len(),
        batch.product_ids.len()
    );
    batch
}

/// Normalize a single comment. Requires a product id and a non-empty body.
pub fn transform_comment(raw: &RawComment) -> Result<CommentDocument, Rejected> {
    let product_id = raw
        .product_id
        .clone()
        .ok_or(Rejected::MissingField("product_id"))?;
    let fields: CommentFields = serde_json::from_value(raw.payload.clone())
        .map_err(|e| Rejected::Unreadable(e.to_string()))?;

    let body = fields
        .body
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())
        .ok_or(Rejected::MissingField("body"))?;

    let (color, seller) = match fields.purchased_item {
        Some(item) => (
            item.color.and_then(|c| c.title),
            item.seller.and_then(|s| s.title),
        ),
        None => (None, None),
    };
    let (likes, dislikes) = fields
        .reactions
        .map(|r| (r.likes, r.dislikes))
        .unwrap_or_default();

    Ok(CommentDocument {
        product_id,
        title: fields.title.filter(|t| !t.trim().is_empty()),
        body,
        rate: fields.rate,
        advantages: fields.advantages.map(|a| a.into_vec()).unwrap_or_default(),
        disadvantages: fields
            .disadvantages
            .map(|d| d.into_vec())
            .unwrap_or_default(),
        is_buyer: fields.is_buyer,
        created_at: fields.created_at.map(|d| normalize_digits(d.trim())),
        color,
        seller,
        likes,
        dislikes,
        images: fields
            .files
            .iter()
            .filter_map(|f| f.first())
            .map(str::to_string)
            .collect(),
    })
}
