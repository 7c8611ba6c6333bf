//! Fixed-size chunking of one extraction batch.
//!
//! A chunk is the unit of transform and load parallelism. Chunks are built
//! from a single batch, so one never mixes catalog and review records.

use bazaar_core::{Error, Result};

/// An ordered slice of a batch, tagged with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk<T> {
    pub index: usize,
    pub records: Vec<T>,
}

impl<T> Chunk<T> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Split `records` into chunks of at most `size`, preserving order.
///
/// Only the last chunk may be short. An empty batch yields no chunks.
pub fn chunk_records<T>(records: Vec<T>, size: usize) -> Result<Vec<Chunk<T>>> {
    if size == 0 {
        return Err(Error::Transform("chunk size must be at least 1".into()));
    }

    let mut chunks = Vec::with_capacity(records.len().div_ceil(size));
    let mut current = Vec::with_capacity(size.min(records.len()));
    for record in records {
        current.push(record);
        if current.len() == size {
            chunks.push(Chunk {
                index: chunks.len(),
                records: std::mem::take(&mut current),
            });
        }
    }
    if !current.is_empty() {
        chunks.push(Chunk {
            index: chunks.len(),
            records: current,
        });
    }
    Ok(chunks)
}

/// Pack whole groups into chunks of at most `size` records.
///
/// A group is never split. A group larger than `size` forms a chunk of its
/// own. Used for comments, whose load replaces a product's comments
/// wholesale and so must see all of them in one chunk.
pub fn chunk_groups<T>(groups: Vec<Vec<T>>, size: usize) -> Result<Vec<Chunk<T>>> {
    if size == 0 {
        return Err(Error::Transform("chunk size must be at least 1".into()));
    }

    let mut chunks = Vec::new();
    let mut current: Vec<T> = Vec::new();
    for group in groups.into_iter().filter(|g| !g.is_empty()) {
        if !current.is_empty() && current.len() + group.len() > size {
            chunks.push(Chunk {
                index: chunks.len(),
                records: std::mem::take(&mut current),
            });
        }
        current.extend(group);
    }
    if !current.is_empty() {
        chunks.push(Chunk {
            index: chunks.len(),
            records: current,
        });
    }
    Ok(chunks)
}
