//! Bounded fan-out with a collection deadline.
//!
//! Every item becomes a task. At most `concurrency` tasks run their fetch at
//! once; the rest wait for a permit. Results are gathered until all tasks
//! finish or the deadline passes, whichever is first. Tasks still running at
//! the deadline are aborted and counted as abandoned. Nothing is retried.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::client::FetchError;
use crate::types::CrawlStats;

#[derive(Debug, Clone, Copy)]
pub struct FanoutSettings {
    pub concurrency: usize,
    pub deadline: Duration,
}

impl FanoutSettings {
    pub fn from_config(config: &bazaar_core::PipelineConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            deadline: config.collect_deadline(),
        }
    }
}

/// Successful results of one collection, in completion order, with counts.
#[derive(Debug)]
pub struct Collected<T> {
    pub items: Vec<T>,
    pub succeeded: usize,
    pub failed: usize,
    pub abandoned: usize,
}

impl<T> Collected<T> {
    pub fn stats(&self) -> CrawlStats {
        CrawlStats {
            succeeded: self.succeeded,
            failed: self.failed,
            abandoned: self.abandoned,
        }
    }
}

/// Run `fetch` over every item under `settings`.
///
/// `label` names the collection in logs.
pub async fn collect<I, T, F, Fut>(
    label: &str,
    items: Vec<I>,
    settings: FanoutSettings,
    fetch: F,
) -> Collected<T>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
{
    let total = items.len();
    let limit = Arc::new(Semaphore::new(settings.concurrency.max(1)));
    let deadline = Instant::now() + settings.deadline;

    let mut set = JoinSet::new();
    for item in items {
        let request = fetch(item);
        let limit = limit.clone();
        set.spawn(async move {
            let _permit = limit
                .acquire_owned()
                .await
                .map_err(|e| FetchError::Request(e.to_string()))?;
            request.await
        });
    }

    let mut collected = Collected {
        items: Vec::with_capacity(total),
        succeeded: 0,
        failed: 0,
        abandoned: 0,
    };

    loop {
        match tokio::time::timeout_at(deadline, set.join_next()).await {
            Ok(Some(Ok(Ok(item)))) => {
                collected.items.push(item);
                collected.succeeded += 1;
            }
            Ok(Some(Ok(Err(e)))) => {
                warn!("{}: request failed: {}", label, e);
                collected.failed += 1;
            }
            Ok(Some(Err(e))) => {
                warn!("{}: task did not complete: {}", label, e);
                collected.failed += 1;
            }
            Ok(None) => break,
            Err(_) => {
                collected.abandoned = set.len();
                set.abort_all();
                warn!(
                    "{}: deadline of {:?} reached, abandoned {} of {} requests",
                    label, settings.deadline, collected.abandoned, total
                );
                break;
            }
        }
    }

    debug!(
        "{}: {} succeeded, {} failed, {} abandoned",
        label, collected.succeeded, collected.failed, collected.abandoned
    );
    collected
}
