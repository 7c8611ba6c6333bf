//! Bazaar Core: error type, pipeline configuration, product id normalization.

pub mod config;
pub mod error;
pub mod ids;

pub use config::{CommentLoadMode, PipelineConfig, StoreTarget};
pub use error::{Error, Result};
pub use ids::ProductId;
