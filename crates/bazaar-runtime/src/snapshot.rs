//! Timestamped snapshot files of raw crawl output.
//!
//! Files are named `<YYYY-MM-DD_HH-MM-SS>_<kind>.json`; the newest file of a
//! kind is the one whose name sorts last. Replays read the newest stamp that
//! has both products and comments.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use bazaar_core::{Error, ProductId, Result};
use bazaar_transform::{RawComment, RawProduct};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

const STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Parent or product key → raw payloads, as written to disk.
pub type RawRecords = BTreeMap<String, Vec<Value>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    /// Parent → product ids.
    Brands,
    /// Parent → product detail payloads.
    Products,
    /// Product → comment payloads.
    Comments,
}

impl SnapshotKind {
    fn suffix(&self) -> &'static str {
        match self {
            SnapshotKind::Brands => "brands",
            SnapshotKind::Products => "products",
            SnapshotKind::Comments => "comments",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File-name stamp for a run started at `at`.
    pub fn stamp(at: DateTime<Utc>) -> String {
        at.format(STAMP_FORMAT).to_string()
    }

    pub fn path_for(&self, stamp: &str, kind: SnapshotKind) -> PathBuf {
        self.dir.join(format!("{}_{}.json", stamp, kind.suffix()))
    }

    /// Serialize `value` to the snapshot path for `stamp`.
    ///
    /// Data lands in a `.tmp` sibling and is renamed into place only after
    /// a successful flush.
    pub fn write<T: Serialize>(&self, stamp: &str, kind: SnapshotKind, value: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| Error::Snapshot(format!("{}: {}", self.dir.display(), e)))?;
        let path = self.path_for(stamp, kind);
        let tmp = path.with_extension("json.tmp");

        if let Err(e) = write_json(&tmp, value) {
            let _ = fs::remove_file(&tmp);
            return Err(Error::Snapshot(format!("{}: {}", tmp.display(), e)));
        }
        fs::rename(&tmp, &path)
            .map_err(|e| Error::Snapshot(format!("{}: {}", path.display(), e)))?;
        info!("Wrote snapshot {}", path.display());
        Ok(path)
    }

    /// Stamps that have a snapshot of `kind`, oldest first. A missing
    /// directory has none.
    fn stamps(&self, kind: SnapshotKind) -> Result<BTreeSet<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(Error::Snapshot(format!("{}: {}", self.dir.display(), e))),
        };

        let suffix = format!("_{}.json", kind.suffix());
        let mut stamps = BTreeSet::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(stamp) = name.strip_suffix(&suffix) else {
                continue;
            };
            if NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).is_ok() {
                stamps.insert(stamp.to_string());
            }
        }
        Ok(stamps)
    }

    /// Newest snapshot of `kind`, if any.
    pub fn latest(&self, kind: SnapshotKind) -> Result<Option<PathBuf>> {
        Ok(self
            .stamps(kind)?
            .last()
            .map(|stamp| self.path_for(stamp, kind)))
    }

    /// Newest stamp that has both a products and a comments snapshot.
    pub fn latest_pair(&self) -> Result<Option<String>> {
        let comments = self.stamps(SnapshotKind::Comments)?;
        Ok(self
            .stamps(SnapshotKind::Products)?
            .into_iter()
            .rev()
            .find(|stamp| comments.contains(stamp)))
    }

    pub fn read<T: DeserializeOwned>(path: &Path) -> Result<T> {
        let file = fs::File::open(path)
            .map_err(|e| Error::Snapshot(format!("{}: {}", path.display(), e)))?;
        let value = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::Snapshot(format!("{}: {}", path.display(), e)))?;
        debug!("Read snapshot {}", path.display());
        Ok(value)
    }

    /// Latest snapshot of `kind`; its absence is an error.
    pub fn read_latest(&self, kind: SnapshotKind) -> Result<(PathBuf, RawRecords)> {
        let path = self.latest(kind)?.ok_or_else(|| {
            Error::Snapshot(format!(
                "no {} snapshot in {}",
                kind.suffix(),
                self.dir.display()
            ))
        })?;
        let records = Self::read(&path)?;
        Ok((path, records))
    }

    /// Products and comments of the latest complete pair; its absence is an
    /// error.
    pub fn read_latest_pair(&self) -> Result<SnapshotPair> {
        let stamp = self.latest_pair()?.ok_or_else(|| {
            Error::Snapshot(format!(
                "no products/comments snapshot pair in {}",
                self.dir.display()
            ))
        })?;
        let products = Self::read(&self.path_for(&stamp, SnapshotKind::Products))?;
        let comments = Self::read(&self.path_for(&stamp, SnapshotKind::Comments))?;
        Ok(SnapshotPair {
            stamp,
            products,
            comments,
        })
    }
}

/// Products and comments written by the same run.
#[derive(Debug)]
pub struct SnapshotPair {
    pub stamp: String,
    pub products: RawRecords,
    pub comments: RawRecords,
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    writer.get_ref().sync_all()
}

/// Flatten parent → products into transform input.
pub fn raw_products(records: RawRecords) -> Vec<RawProduct> {
    records
        .into_values()
        .flatten()
        .map(RawProduct::new)
        .collect()
}

/// Product → comments into per-product groups of transform input.
pub fn raw_comment_groups(records: RawRecords) -> Vec<Vec<RawComment>> {
    records
        .into_iter()
        .map(|(key, payloads)| {
            let product_id = ProductId::parse(&key);
            payloads
                .into_iter()
                .map(|payload| RawComment {
                    product_id: product_id.clone(),
                    payload,
                })
                .collect()
        })
        .collect()
}
