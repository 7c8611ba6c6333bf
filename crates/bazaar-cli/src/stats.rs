//! Store and snapshot inspection for the `stats` command.

use std::path::PathBuf;

use bazaar_core::PipelineConfig;
use bazaar_runtime::{SnapshotKind, SnapshotStore};
use bazaar_store::{SqliteStore, StoreStats};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub store: Option<StoreStats>,
    pub latest_products: Option<PathBuf>,
    pub latest_comments: Option<PathBuf>,
    pub errors: Vec<String>,
}

impl StatsReport {
    pub fn is_ok(&self) -> bool {
        self.store.is_some() && self.errors.is_empty()
    }
}

/// Collect collection counts and the newest snapshot pair.
///
/// Never creates a database: a missing file is reported, not opened.
pub fn inspect(config: &PipelineConfig) -> StatsReport {
    let mut report = StatsReport {
        store: None,
        latest_products: None,
        latest_comments: None,
        errors: Vec::new(),
    };

    let db_path = &config.store.db_path;
    if !db_path.exists() {
        report
            .errors
            .push(format!("Database not found: {}", db_path.display()));
    } else {
        match SqliteStore::open(&config.store) {
            Ok(store) => {
                match store.get_stats() {
                    Ok(stats) => report.store = Some(stats),
                    Err(e) => report.errors.push(format!("Failed to read stats: {}", e)),
                }
                if let Err(e) = store.close() {
                    report.errors.push(format!("Failed to close store: {}", e));
                }
            }
            Err(e) => report.errors.push(format!("Failed to open store: {}", e)),
        }
    }

    let snapshots = SnapshotStore::new(config.snapshot_dir.clone());
    for kind in [SnapshotKind::Products, SnapshotKind::Comments] {
        match snapshots.latest(kind) {
            Ok(path) => {
                debug!("Latest {:?} snapshot: {:?}", kind, path);
                match kind {
                    SnapshotKind::Comments => report.latest_comments = path,
                    _ => report.latest_products = path,
                }
            }
            Err(e) => report.errors.push(format!("Failed to list snapshots: {}", e)),
        }
    }

    report
}

pub fn print_report(report: &StatsReport) {
    println!("=== Bazaar Store ===");
    println!();
    match &report.store {
        Some(stats) => {
            println!("Database:           {}", stats.db_path);
            println!("Size:               {:.2} MB", stats.db_size_mb);
            println!("Products:           {}", stats.products);
            println!("Comments:           {}", stats.comments);
            println!("Commented products: {}", stats.commented_products);
        }
        None => println!("Database:           unavailable"),
    }

    let shown = |p: &Option<PathBuf>| {
        p.as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "none".into())
    };
    println!("Products snapshot:  {}", shown(&report.latest_products));
    println!("Comments snapshot:  {}", shown(&report.latest_comments));

    if !report.errors.is_empty() {
        println!();
        println!("Errors:");
        for e in &report.errors {
            println!("  - {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(root: &std::path::Path) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.store.db_path = root.join("bazaar.db");
        config.snapshot_dir = root.join("snapshots");
        config
    }

    #[test]
    fn test_missing_database_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());

        let report = inspect(&config);
        assert!(!report.is_ok());
        assert!(report.store.is_none());
        assert!(!config.store.db_path.exists());
        assert!(report.latest_products.is_none());
    }

    #[test]
    fn test_existing_store_and_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        SqliteStore::open(&config.store).unwrap().close().unwrap();
        let snapshots = SnapshotStore::new(config.snapshot_dir.clone());
        snapshots
            .write("2025-03-01_08-00-00", SnapshotKind::Comments, &serde_json::json!({}))
            .unwrap();

        let report = inspect(&config);
        assert!(report.is_ok());
        let stats = report.store.as_ref().unwrap();
        assert_eq!(stats.products, 0);
        assert_eq!(stats.comments, 0);
        assert!(report.latest_products.is_none());
        assert!(report
            .latest_comments
            .as_ref()
            .unwrap()
            .ends_with("2025-03-01_08-00-00_comments.json"));
    }
}
