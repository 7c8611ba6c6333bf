//! Per-stream chunked transform and load.
//!
//! Chunks of a stream run concurrently: transform on the rayon pool, load
//! on tokio's blocking pool. A chunk whose load fails counts its documents
//! as failed; the other chunks carry on.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bazaar_core::{CommentLoadMode, Error, Result};
use bazaar_store::{CommentLoadReport, SqliteStore};
use bazaar_transform::{
    chunk_groups, chunk_records, transform_comments, transform_products, Chunk, RawComment,
    RawProduct,
};
use rayon::ThreadPool;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::types::StreamReport;

/// Run `f` on the CPU pool and await its result.
async fn on_pool<R, F>(pool: &ThreadPool, f: F) -> Result<R>
where
    R: Send + 'static,
    F: FnOnce() -> R + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    pool.spawn(move || {
        let result = std::panic::catch_unwind(AssertUnwindSafe(f));
        let _ = tx.send(result);
    });
    rx.await
        .map_err(|_| Error::Internal("transform worker dropped its result".into()))?
        .map_err(|_| Error::Transform("transform panicked".into()))
}

/// Run blocking store work off the async runtime.
async fn blocking<R, F>(f: F) -> Result<R>
where
    R: Send + 'static,
    F: FnOnce() -> Result<R> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("load task failed: {}", e)))?
}

/// Transform and upsert a product batch.
pub async fn load_products(ctx: &RunContext, records: Vec<RawProduct>) -> Result<StreamReport> {
    let total = records.len();
    let chunks = chunk_records(records, ctx.config.chunk_size)?;
    let mut report = StreamReport {
        records: total,
        chunks: chunks.len(),
        ..Default::default()
    };

    let mut set = JoinSet::new();
    for chunk in chunks {
        let pool = ctx.pool.clone();
        let store = ctx.store.clone();
        set.spawn(async move { product_chunk(pool, store, chunk).await });
    }

    while let Some(joined) = set.join_next().await {
        let chunk_report = joined.map_err(|e| Error::Internal(format!("chunk task failed: {}", e)))?;
        report.merge(&chunk_report);
    }

    info!(
        "Products: {} records in {} chunks, {} transformed, {} skipped, {} persisted, {} failed",
        report.records, report.chunks, report.transformed, report.skipped, report.persisted, report.failed
    );
    Ok(report)
}

async fn product_chunk(
    pool: Arc<ThreadPool>,
    store: Arc<SqliteStore>,
    chunk: Chunk<RawProduct>,
) -> StreamReport {
    let index = chunk.index;
    let records = chunk.len();
    let mut report = StreamReport {
        records,
        ..Default::default()
    };

    let ops = match on_pool(&pool, move || transform_products(&chunk.records)).await {
        Ok(ops) => ops,
        Err(e) => {
            warn!("Product chunk {} transform failed: {}", index, e);
            report.skipped = records;
            return report;
        }
    };
    report.transformed = ops.len();
    report.skipped = records - ops.len();
    if ops.is_empty() {
        return report;
    }

    let op_count = ops.len();
    match blocking(move || store.upsert_products(&ops)).await {
        Ok(write) => {
            report.persisted = write.persisted();
            report.failed = write.failed;
            debug!(
                "Product chunk {}: inserted={}, updated={}, unchanged={}, failed={}",
                index, write.inserted, write.updated, write.unchanged, write.failed
            );
        }
        Err(e) => {
            warn!("Product chunk {} load failed: {}", index, e);
            report.failed = op_count;
        }
    }
    report
}

/// Transform and replace comments, one chunk per set of whole products.
pub async fn load_comments(
    ctx: &RunContext,
    groups: Vec<Vec<RawComment>>,
) -> Result<StreamReport> {
    let total = groups.iter().map(Vec::len).sum();
    let chunks = chunk_groups(groups, ctx.config.chunk_size)?;
    let mut report = StreamReport {
        records: total,
        chunks: chunks.len(),
        ..Default::default()
    };

    let mode = ctx.config.comment_load_mode;
    let mut set = JoinSet::new();
    for chunk in chunks {
        let pool = ctx.pool.clone();
        let store = ctx.store.clone();
        set.spawn(async move { comment_chunk(pool, store, chunk, mode).await });
    }

    while let Some(joined) = set.join_next().await {
        let chunk_report = joined.map_err(|e| Error::Internal(format!("chunk task failed: {}", e)))?;
        report.merge(&chunk_report);
    }

    info!(
        "Comments: {} records in {} chunks, {} transformed, {} skipped, {} persisted, {} failed",
        report.records, report.chunks, report.transformed, report.skipped, report.persisted, report.failed
    );
    Ok(report)
}

async fn comment_chunk(
    pool: Arc<ThreadPool>,
    store: Arc<SqliteStore>,
    chunk: Chunk<RawComment>,
    mode: CommentLoadMode,
) -> StreamReport {
    let index = chunk.index;
    let records = chunk.len();
    let mut report = StreamReport {
        records,
        ..Default::default()
    };

    let batch = match on_pool(&pool, move || transform_comments(&chunk.records)).await {
        Ok(batch) => batch,
        Err(e) => {
            warn!("Comment chunk {} transform failed: {}", index, e);
            report.skipped = records;
            return report;
        }
    };
    report.transformed = batch.documents.len();
    report.skipped = records - batch.documents.len();
    if batch.documents.is_empty() {
        return report;
    }

    let doc_count = batch.documents.len();
    match blocking(move || store.replace_comments(&batch, mode)).await {
        Ok(CommentLoadReport {
            deleted,
            inserted,
            failed,
        }) => {
            report.persisted = inserted;
            report.failed = failed;
            debug!(
                "Comment chunk {}: deleted={}, inserted={}, failed={}",
                index, deleted, inserted, failed
            );
        }
        Err(e) => {
            warn!("Comment chunk {} load failed: {}", index, e);
            report.failed = doc_count;
        }
    }
    report
}
