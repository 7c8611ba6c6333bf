//! Discovery vocabulary: parents, work units and collection counts.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A brand option from the catalog listing filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    pub id: i64,
    pub code: String,
}

/// A category code from the category listing widgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub code: String,
}

/// A paged product listing: one brand or one category.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Parent {
    Brand(i64),
    Category(String),
}

impl Parent {
    /// Key used in snapshots and per-parent aggregates.
    pub fn key(&self) -> String {
        match self {
            Parent::Brand(id) => id.to_string(),
            Parent::Category(code) => code.clone(),
        }
    }
}

impl fmt::Display for Parent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parent::Brand(id) => write!(f, "brand {}", id),
            Parent::Category(code) => write!(f, "category {}", code),
        }
    }
}

/// One page of one parent's listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkUnit {
    pub parent: Parent,
    /// 1-based.
    pub page: u32,
}

/// Request outcomes summed over the collections of one stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrawlStats {
    pub succeeded: usize,
    pub failed: usize,
    pub abandoned: usize,
}

impl CrawlStats {
    pub fn merge(&mut self, other: CrawlStats) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.abandoned += other.abandoned;
    }
}
