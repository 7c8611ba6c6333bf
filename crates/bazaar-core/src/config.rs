//! Pipeline configuration: defaults, optional JSON file, `BAZAAR_*` environment overrides.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

pub const DEFAULT_CATALOG_URL: &str = "https://api.digikala.com/v1/categories/mobile-phone/search/";
pub const DEFAULT_PRODUCT_URL: &str = "https://api.digikala.com/v2/product/";
pub const DEFAULT_COMMENTS_URL: &str = "https://api.digikala.com/v1/rate-review/products/";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:136.0) Gecko/20100101 Firefox/136.0";

pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_CHUNK_SIZE: usize = 100;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DEADLINE_SECS: u64 = 400;

/// How a comment chunk replaces the stored comments of the products it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommentLoadMode {
    /// Delete committed on its own, then the inserts. A crash in between
    /// leaves the touched products without comments until the next run.
    #[default]
    DeleteThenInsert,
    /// Delete and inserts share one transaction.
    Transactional,
}

impl FromStr for CommentLoadMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "delete_then_insert" | "delete-then-insert" => Ok(Self::DeleteThenInsert),
            "transactional" => Ok(Self::Transactional),
            other => Err(Error::Config(format!("unknown comment load mode: {}", other))),
        }
    }
}

/// Where documents are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreTarget {
    /// SQLite database file.
    pub db_path: PathBuf,
    pub products_collection: String,
    pub comments_collection: String,
}

impl Default for StoreTarget {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/bazaar.db"),
            products_collection: "products".into(),
            comments_collection: "comments".into(),
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Brand-filtered product listing endpoint; also answers the brand options probe.
    pub catalog_url: String,
    /// Category-catalog API root (`<root>categories/<code>/search/`). Unused when absent.
    pub category_url: Option<String>,
    /// Product detail endpoint, `<product_url><id>/`.
    pub product_url: String,
    /// Review endpoint, `<comments_url><id>/?page=N`.
    pub comments_url: String,
    pub request_timeout_secs: u64,
    /// Collection deadline for one fan-out.
    pub collect_deadline_secs: u64,
    pub chunk_size: usize,
    /// Maximum in-flight requests and fan-out pool size.
    pub concurrency: usize,
    /// Adds `has_selling_stock=1` to listing requests.
    pub in_stock_only: bool,
    pub user_agent: String,
    pub store: StoreTarget,
    pub snapshot_dir: PathBuf,
    /// Skip crawling and run transform/load on the latest snapshots only.
    pub skip_crawl: bool,
    pub comment_load_mode: CommentLoadMode,
    /// CPU worker threads for transform; host core count when unset.
    pub workers: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.into(),
            category_url: None,
            product_url: DEFAULT_PRODUCT_URL.into(),
            comments_url: DEFAULT_COMMENTS_URL.into(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            collect_deadline_secs: DEFAULT_DEADLINE_SECS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            in_stock_only: true,
            user_agent: DEFAULT_USER_AGENT.into(),
            store: StoreTarget::default(),
            snapshot_dir: PathBuf::from("data/snapshots"),
            skip_crawl: false,
            comment_load_mode: CommentLoadMode::default(),
            workers: None,
        }
    }
}

impl PipelineConfig {
    /// Load config: defaults, then the JSON file (if given), then environment variables.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                info!("Loaded pipeline config from {}", path.display());
                serde_json::from_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `BAZAAR_*` overrides from a variable lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BAZAAR_CATALOG_URL") {
            self.catalog_url = v;
        }
        if let Some(v) = lookup("BAZAAR_CATEGORY_URL") {
            self.category_url = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Some(v) = lookup("BAZAAR_PRODUCT_URL") {
            self.product_url = v;
        }
        if let Some(v) = lookup("BAZAAR_COMMENTS_URL") {
            self.comments_url = v;
        }
        if let Some(v) = lookup("BAZAAR_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_number("BAZAAR_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("BAZAAR_DEADLINE_SECS") {
            self.collect_deadline_secs = parse_number("BAZAAR_DEADLINE_SECS", &v)?;
        }
        if let Some(v) = lookup("BAZAAR_CHUNK_SIZE") {
            self.chunk_size = parse_number("BAZAAR_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = lookup("BAZAAR_CONCURRENCY") {
            self.concurrency = parse_number("BAZAAR_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("BAZAAR_WORKERS") {
            self.workers = Some(parse_number("BAZAAR_WORKERS", &v)?);
        }
        if let Some(v) = lookup("BAZAAR_IN_STOCK_ONLY") {
            self.in_stock_only = parse_flag(&v);
        }
        if let Some(v) = lookup("BAZAAR_SKIP_CRAWL") {
            self.skip_crawl = parse_flag(&v);
        }
        if let Some(v) = lookup("BAZAAR_USER_AGENT") {
            self.user_agent = v;
        }
        if let Some(v) = lookup("BAZAAR_DB_PATH") {
            self.store.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("BAZAAR_PRODUCTS_COLLECTION") {
            self.store.products_collection = v;
        }
        if let Some(v) = lookup("BAZAAR_COMMENTS_COLLECTION") {
            self.store.comments_collection = v;
        }
        if let Some(v) = lookup("BAZAAR_SNAPSHOT_DIR") {
            self.snapshot_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("BAZAAR_COMMENT_LOAD_MODE") {
            self.comment_load_mode = v.parse()?;
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 || self.collect_deadline_secs == 0 {
            return Err(Error::Config("timeouts must be positive".into()));
        }
        if self.workers == Some(0) {
            return Err(Error::Config("workers must be at least 1".into()));
        }
        for name in [&self.store.products_collection, &self.store.comments_collection] {
            if !is_identifier(name) {
                return Err(Error::Config(format!("invalid collection name: {:?}", name)));
            }
        }
        if self.store.products_collection == self.store.comments_collection {
            return Err(Error::Config("collections must have distinct names".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn collect_deadline(&self) -> Duration {
        Duration::from_secs(self.collect_deadline_secs)
    }

    /// Worker threads for the transform pool.
    pub fn worker_threads(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} is not a valid number: {:?}", key, value)))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Collection names are spliced into SQL, so only `[A-Za-z_][A-Za-z0-9_]*` is allowed.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
