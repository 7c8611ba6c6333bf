//! Bazaar Transform: pure normalization of raw upstream records.
//!
//! Nothing here performs I/O. Records that cannot be normalized are dropped
//! with a `warn!` and counted by the caller; a bad record never fails a chunk.

pub mod chunking;
pub mod comment;
pub mod normalize;
pub mod product;
pub mod raw;

pub use chunking::{chunk_groups, chunk_records, Chunk};
pub use comment::{transform_comment, transform_comments};
pub use product::{transform_product, transform_products};
pub use raw::{RawComment, RawProduct, Rejected};
