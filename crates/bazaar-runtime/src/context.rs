//! Run-scoped resources.

use std::sync::Arc;

use bazaar_core::{Error, PipelineConfig, Result};
use bazaar_crawl::{FanoutSettings, FetchClient};
use bazaar_store::SqliteStore;
use rayon::ThreadPool;
use tracing::{info, warn};

use crate::snapshot::SnapshotStore;

/// Everything one run shares: config, the gated HTTP client, the store, the
/// transform pool and the snapshot directory.
///
/// Clones share the underlying resources. The store is released by
/// [`RunContext::close`] once every clone is gone.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: String,
    pub config: Arc<PipelineConfig>,
    pub client: FetchClient,
    pub store: Arc<SqliteStore>,
    pub pool: Arc<ThreadPool>,
    pub snapshots: SnapshotStore,
}

impl RunContext {
    pub fn open(run_id: String, config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let client = FetchClient::from_config(&config)?;
        let store = SqliteStore::open(&config.store)?;
        let threads = config.worker_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("bazaar-transform-{}", i))
            .build()
            .map_err(|e| Error::Internal(format!("transform pool: {}", e)))?;
        let snapshots = SnapshotStore::new(config.snapshot_dir.clone());

        info!(
            "Run {} context ready: {} transform threads, concurrency {}, chunk size {}",
            run_id, threads, config.concurrency, config.chunk_size
        );

        Ok(Self {
            run_id,
            config: Arc::new(config),
            client,
            store: Arc::new(store),
            pool: Arc::new(pool),
            snapshots,
        })
    }

    pub fn fanout(&self) -> FanoutSettings {
        FanoutSettings::from_config(&self.config)
    }

    /// Close the store.
    ///
    /// If a straggling load still holds a reference, the connection is
    /// released when that reference drops instead.
    pub fn close(self) -> Result<()> {
        let run_id = self.run_id;
        match Arc::try_unwrap(self.store) {
            Ok(store) => {
                store.close()?;
                info!("Run {} store closed", run_id);
            }
            Err(_) => warn!("Run {} store still referenced; closing on last drop", run_id),
        }
        Ok(())
    }
}
