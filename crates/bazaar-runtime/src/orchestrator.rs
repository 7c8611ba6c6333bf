//! Orchestrator: one pipeline run, both streams.

use std::sync::Arc;

use bazaar_core::{PipelineConfig, Result};
use bazaar_crawl::{CatalogJob, CrawlJob, ProductIndex, Resolver, ReviewJob};
use chrono::{DateTime, Utc};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

use crate::context::RunContext;
use crate::etl;
use crate::snapshot::{raw_comment_groups, raw_products, RawRecords, SnapshotKind, SnapshotStore};
use crate::types::*;

/// Runs discovery, then the catalog and review streams as independent tasks.
pub struct Orchestrator {
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute one run.
    ///
    /// Errors only on fatal conditions: invalid config, store unavailable,
    /// or a missing snapshot in skip-crawl mode. A failing stream is
    /// reported in its [`StreamOutcome`] and never cancels the other.
    pub async fn run(&self) -> Result<RunReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(
            "Run {} starting ({})",
            run_id,
            if self.config.skip_crawl { "snapshot" } else { "crawl" }
        );

        let ctx = RunContext::open(run_id.clone(), self.config.clone())?;
        let result = if self.config.skip_crawl {
            replay(&ctx).await
        } else {
            crawl(&ctx, started_at).await
        };
        let closed = ctx.close();

        let (source, discovery, catalog, reviews) = result?;
        closed?;

        let report = RunReport {
            run_id,
            source,
            started_at,
            finished_at: Utc::now(),
            discovery,
            catalog,
            reviews,
        };
        if report.succeeded() {
            info!("Run {} finished", report.run_id);
        } else {
            warn!("Run {} finished with a failed stream", report.run_id);
        }
        Ok(report)
    }
}

type StreamPair = (RunSource, Option<bazaar_crawl::CrawlStats>, StreamOutcome, StreamOutcome);

// ---------------------------------------------------------------------------
// Crawl mode
// ---------------------------------------------------------------------------

async fn crawl(ctx: &RunContext, started_at: DateTime<Utc>) -> Result<StreamPair> {
    let stamp = SnapshotStore::stamp(started_at);
    let catalog_job = CatalogJob::from_config(&ctx.config);
    let review_job = ReviewJob::from_config(&ctx.config);

    let resolver = Resolver::new(ctx.client.clone(), catalog_job.clone(), ctx.fanout());
    let parents = resolver.list_parents().await;
    let (index, discovery) = resolver.resolve_product_ids(parents).await;
    if let Err(e) = ctx.snapshots.write(&stamp, SnapshotKind::Brands, &index) {
        warn!("Brand snapshot not written: {}", e);
    }

    let index = Arc::new(index);
    let catalog = tokio::spawn(crawl_stream(
        ctx.clone(),
        CrawlJob::Catalog(catalog_job),
        index.clone(),
        stamp.clone(),
    ));
    let reviews = tokio::spawn(crawl_stream(
        ctx.clone(),
        CrawlJob::Review(review_job),
        index,
        stamp,
    ));

    let (catalog, reviews) = join_streams(catalog, reviews).await;
    Ok((RunSource::Crawl, Some(discovery), catalog, reviews))
}

async fn crawl_stream(
    ctx: RunContext,
    job: CrawlJob,
    index: Arc<ProductIndex>,
    stamp: String,
) -> Result<StreamReport> {
    let harvest = job.collect(&ctx.client, ctx.fanout(), &index).await;
    info!(
        "Stream {} collected {} records ({} ok, {} failed, {} abandoned)",
        job.name(),
        harvest.record_count(),
        harvest.stats.succeeded,
        harvest.stats.failed,
        harvest.stats.abandoned
    );

    let kind = match job {
        CrawlJob::Catalog(_) => SnapshotKind::Products,
        CrawlJob::Review(_) => SnapshotKind::Comments,
    };
    if let Err(e) = ctx.snapshots.write(&stamp, kind, &harvest.records) {
        warn!("Snapshot for {} not written: {}", job.name(), e);
    }

    let mut report = load(&ctx, kind, harvest.records).await?;
    report.crawl = Some(harvest.stats);
    Ok(report)
}

// ---------------------------------------------------------------------------
// Snapshot mode
// ---------------------------------------------------------------------------

async fn replay(ctx: &RunContext) -> Result<StreamPair> {
    let pair = ctx.snapshots.read_latest_pair()?;
    info!(
        "Replaying snapshot {} from {}",
        pair.stamp,
        ctx.snapshots.dir().display()
    );
    let (products, comments) = (pair.products, pair.comments);

    let catalog = {
        let ctx = ctx.clone();
        tokio::spawn(async move { load(&ctx, SnapshotKind::Products, products).await })
    };
    let reviews = {
        let ctx = ctx.clone();
        tokio::spawn(async move { load(&ctx, SnapshotKind::Comments, comments).await })
    };

    let (catalog, reviews) = join_streams(catalog, reviews).await;
    Ok((RunSource::Snapshot, None, catalog, reviews))
}

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

async fn load(ctx: &RunContext, kind: SnapshotKind, records: RawRecords) -> Result<StreamReport> {
    match kind {
        SnapshotKind::Comments => etl::load_comments(ctx, raw_comment_groups(records)).await,
        _ => etl::load_products(ctx, raw_products(records)).await,
    }
}

async fn join_streams(
    catalog: JoinHandle<Result<StreamReport>>,
    reviews: JoinHandle<Result<StreamReport>>,
) -> (StreamOutcome, StreamOutcome) {
    let (catalog, reviews) = tokio::join!(catalog, reviews);
    (outcome("catalog", catalog), outcome("reviews", reviews))
}

fn outcome(
    stream: &str,
    joined: std::result::Result<Result<StreamReport>, JoinError>,
) -> StreamOutcome {
    match joined {
        Ok(Ok(report)) => StreamOutcome::Completed(report),
        Ok(Err(e)) => {
            error!("Stream {} failed: {}", stream, e);
            StreamOutcome::Failed(e.to_string())
        }
        Err(e) => {
            let reason = if e.is_panic() {
                "stream task panicked".to_string()
            } else {
                format!("stream task cancelled: {}", e)
            };
            error!("Stream {} failed: {}", stream, reason);
            StreamOutcome::Failed(reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::Error;

    #[test]
    fn test_outcome_maps_errors_to_failed() {
        let ok = outcome("catalog", Ok(Ok(StreamReport::default())));
        assert_eq!(ok, StreamOutcome::Completed(StreamReport::default()));

        let err = outcome("reviews", Ok(Err(Error::Database("locked".into()))));
        assert!(err.is_failed());
    }

    #[tokio::test]
    async fn test_panicking_stream_does_not_cancel_sibling() {
        async fn explode() -> Result<StreamReport> {
            panic!("boom")
        }

        let catalog = tokio::spawn(explode());
        let reviews = tokio::spawn(async {
            Ok(StreamReport {
                records: 3,
                ..Default::default()
            })
        });

        let (catalog, reviews) = join_streams(catalog, reviews).await;
        assert_eq!(catalog, StreamOutcome::Failed("stream task panicked".into()));
        assert_eq!(reviews.report().unwrap().records, 3);
    }

    #[tokio::test]
    async fn test_skip_crawl_without_snapshot_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.skip_crawl = true;
        config.store.db_path = dir.path().join("bazaar.db");
        config.snapshot_dir = dir.path().join("snapshots");

        let err = Orchestrator::new(config).run().await.unwrap_err();
        assert!(matches!(err, Error::Snapshot(_)));
    }
}
