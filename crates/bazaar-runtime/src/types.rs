//! Run and stream reports.

use bazaar_crawl::CrawlStats;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counts for one stream of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamReport {
    /// Raw records fed to transform.
    pub records: usize,
    pub chunks: usize,
    /// Records that produced a document.
    pub transformed: usize,
    /// Records dropped by transform.
    pub skipped: usize,
    /// Documents the store now holds from this run.
    pub persisted: usize,
    /// Documents the store rejected.
    pub failed: usize,
    /// Request outcomes, when the stream crawled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crawl: Option<CrawlStats>,
}

impl StreamReport {
    pub fn merge(&mut self, other: &StreamReport) {
        self.records += other.records;
        self.chunks += other.chunks;
        self.transformed += other.transformed;
        self.skipped += other.skipped;
        self.persisted += other.persisted;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamOutcome {
    Completed(StreamReport),
    Failed(String),
}

impl StreamOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StreamOutcome::Failed(_))
    }

    pub fn report(&self) -> Option<&StreamReport> {
        match self {
            StreamOutcome::Completed(report) => Some(report),
            StreamOutcome::Failed(_) => None,
        }
    }
}

/// Where the run's raw records came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunSource {
    Crawl,
    Snapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub source: RunSource,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Discovery request outcomes; absent for snapshot runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery: Option<CrawlStats>,
    pub catalog: StreamOutcome,
    pub reviews: StreamOutcome,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        !self.catalog.is_failed() && !self.reviews.is_failed()
    }
}
