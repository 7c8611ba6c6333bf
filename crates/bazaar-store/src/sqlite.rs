//! SQLite document store for products and comments.
//!
//! One connection per store behind a mutex; callers on an async runtime
//! wrap calls in `spawn_blocking`.

use std::path::{Path, PathBuf};

use bazaar_core::{CommentLoadMode, Error, ProductId, Result, StoreTarget};
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use tracing::{debug, info, warn};

use crate::schema::{comments_sql, products_sql, products_triggers_sql};
use crate::types::*;

/// SQLite's default host-parameter limit is far above this; keeps statements small.
const DELETE_BATCH: usize = 500;

/// Document store with a `products` and a `comments` collection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    products: String,
    comments: String,
}

impl SqliteStore {
    /// Open or create the store described by `target`, applying the schema.
    pub fn open(target: &StoreTarget) -> Result<Self> {
        if let Some(dir) = target.db_path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| Error::Storage(e.to_string()))?;
            }
        }

        let conn = Self::create_connection(&target.db_path)?;
        Self::init_schema(&conn, &target.products_collection, &target.comments_collection)?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: target.db_path.clone(),
            products: target.products_collection.clone(),
            comments: target.comments_collection.clone(),
        };

        info!(
            "SqliteStore opened: {} products, {} comments, path={}",
            store.count_products()?,
            store.count_comments()?,
            store.db_path.display()
        );

        Ok(store)
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(conn)
    }

    fn init_schema(conn: &Connection, products: &str, comments: &str) -> Result<()> {
        let full_schema = format!(
            "{}\n{}\n{}",
            products_sql(products),
            products_triggers_sql(products),
            comments_sql(comments)
        );
        conn.execute_batch(&full_schema)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;
        Ok(())
    }

    /// Close the connection, surfacing any error SQLite reports on close.
    pub fn close(self) -> Result<()> {
        let path = self.db_path.clone();
        self.conn
            .into_inner()
            .close()
            .map_err(|(_, e)| Error::Database(e.to_string()))?;
        debug!("SqliteStore closed: {}", path.display());
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ---------------------------------------------------------------
    // Products
    // ---------------------------------------------------------------

    /// Unordered bulk upsert. Each op is applied on its own; a rejected op is
    /// counted and logged and the rest still run. Nothing is retried.
    pub fn upsert_products(&self, ops: &[UpsertOp]) -> Result<BulkWriteReport> {
        let mut report = BulkWriteReport::default();
        if ops.is_empty() {
            return Ok(report);
        }

        let now = now_millis();
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(|e| Error::Database(e.to_string()))?;
        {
            let mut existing_stmt = tx
                .prepare_cached(&format!("SELECT 1 FROM {} WHERE id = ?1", self.products))
                .map_err(|e| Error::Database(e.to_string()))?;
            let mut upsert_stmt = tx
                .prepare_cached(&format!(
                    "INSERT INTO {t} (id, title_en, brand_code, category_code, doc, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                     ON CONFLICT(id) DO UPDATE SET
                         title_en = excluded.title_en,
                         brand_code = excluded.brand_code,
                         category_code = excluded.category_code,
                         doc = excluded.doc,
                         updated_at = excluded.updated_at
                     WHERE {t}.doc IS NOT excluded.doc",
                    t = self.products
                ))
                .map_err(|e| Error::Database(e.to_string()))?;

            for op in ops {
                let doc_json = match serde_json::to_string(&op.document) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Product {} could not be serialized: {}", op.id, e);
                        report.failed += 1;
                        continue;
                    }
                };

                let existed = existing_stmt
                    .query_row(params![op.id.as_str()], |_| Ok(()))
                    .optional()
                    .map_err(|e| Error::Database(e.to_string()))?
                    .is_some();

                let result = upsert_stmt.execute(params![
                    op.id.as_str(),
                    op.document.title_en,
                    op.document.brand_code,
                    op.document.category_code,
                    doc_json,
                    now,
                ]);

                match result {
                    Ok(changed) => match (existed, changed) {
                        (false, _) => report.inserted += 1,
                        (true, 0) => report.unchanged += 1,
                        (true, _) => report.updated += 1,
                    },
                    Err(e) => {
                        warn!("Product {} rejected by store: {}", op.id, e);
                        report.failed += 1;
                    }
                }
            }
        }
        tx.commit().map_err(|e| Error::Database(e.to_string()))?;

        debug!(
            "Product bulk write: inserted={}, updated={}, unchanged={}, failed={}",
            report.inserted, report.updated, report.unchanged, report.failed
        );
        Ok(report)
    }

    /// Fetch a stored product document.
    pub fn get_product(&self, id: &ProductId) -> Result<Option<ProductDocument>> {
        let conn = self.conn.lock();
        let doc: Option<String> = conn
            .prepare_cached(&format!("SELECT doc FROM {} WHERE id = ?1", self.products))
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![id.as_str()], |row| row.get(0))
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        doc.map(|json| serde_json::from_str(&json).map_err(Error::from))
            .transpose()
    }

    /// Raw stored row `(doc, updated_at)`, for comparing writes byte-for-byte.
    pub fn get_product_row(&self, id: &ProductId) -> Result<Option<(String, i64)>> {
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached(&format!(
                "SELECT doc, updated_at FROM {} WHERE id = ?1",
                self.products
            ))
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![id.as_str()], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row)
    }

    pub fn count_products(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", self.products), [], |row| {
            row.get(0)
        })
        .map_err(|e| Error::Database(e.to_string()))
    }

    // ---------------------------------------------------------------
    // Comments
    // ---------------------------------------------------------------

    /// Replace the stored comments of every product the batch touches.
    ///
    /// A batch without documents is a no-op. In `DeleteThenInsert` mode the
    /// delete commits before the inserts start; in `Transactional` mode both
    /// commit together or not at all.
    pub fn replace_comments(
        &self,
        batch: &CommentBatch,
        mode: CommentLoadMode,
    ) -> Result<CommentLoadReport> {
        let mut report = CommentLoadReport::default();
        if batch.documents.is_empty() {
            return Ok(report);
        }

        let ids: Vec<&str> = batch.product_ids.iter().map(|id| id.as_str()).collect();
        let mut conn = self.conn.lock();

        match mode {
            CommentLoadMode::DeleteThenInsert => {
                let tx = conn.transaction().map_err(|e| Error::Database(e.to_string()))?;
                report.deleted = self.delete_comments(&tx, &ids)?;
                tx.commit().map_err(|e| Error::Database(e.to_string()))?;

                let tx = conn.transaction().map_err(|e| Error::Database(e.to_string()))?;
                let (inserted, failed) = self.insert_comments(&tx, &batch.documents)?;
                tx.commit().map_err(|e| Error::Database(e.to_string()))?;
                report.inserted = inserted;
                report.failed = failed;
            }
            CommentLoadMode::Transactional => {
                let tx = conn.transaction().map_err(|e| Error::Database(e.to_string()))?;
                let deleted = self.delete_comments(&tx, &ids)?;
                let (inserted, failed) = self.insert_comments(&tx, &batch.documents)?;
                if failed > 0 {
                    tx.rollback().map_err(|e| Error::Database(e.to_string()))?;
                    warn!(
                        "Comment batch for {} products rolled back: {} documents rejected",
                        ids.len(),
                        failed
                    );
                    report.failed = batch.documents.len();
                    return Ok(report);
                }
                tx.commit().map_err(|e| Error::Database(e.to_string()))?;
                report.deleted = deleted;
                report.inserted = inserted;
            }
        }

        debug!(
            "Comment load: deleted={}, inserted={}, failed={}",
            report.deleted, report.inserted, report.failed
        );
        Ok(report)
    }

    fn delete_comments(&self, tx: &Transaction<'_>, ids: &[&str]) -> Result<usize> {
        let mut deleted = 0;
        for batch in ids.chunks(DELETE_BATCH) {
            let placeholders = vec!["?"; batch.len()].join(", ");
            let sql = format!(
                "DELETE FROM {} WHERE product_id IN ({})",
                self.comments, placeholders
            );
            deleted += tx
                .execute(&sql, params_from_iter(batch.iter()))
                .map_err(|e| Error::Database(e.to_string()))?;
        }
        Ok(deleted)
    }

    /// Insert each document independently. Returns `(inserted, failed)`.
    fn insert_comments(
        &self,
        tx: &Transaction<'_>,
        documents: &[CommentDocument],
    ) -> Result<(usize, usize)> {
        let now = now_millis();
        let mut stmt = tx
            .prepare_cached(&format!(
                "INSERT INTO {} (product_id, body, rate, doc, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                self.comments
            ))
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut inserted = 0;
        let mut failed = 0;
        for doc in documents {
            let doc_json = match serde_json::to_string(doc) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Comment for {} could not be serialized: {}", doc.product_id, e);
                    failed += 1;
                    continue;
                }
            };
            match stmt.execute(params![doc.product_id.as_str(), doc.body, doc.rate, doc_json, now]) {
                Ok(_) => inserted += 1,
                Err(e) => {
                    warn!("Comment for {} rejected by store: {}", doc.product_id, e);
                    failed += 1;
                }
            }
        }
        Ok((inserted, failed))
    }

    pub fn count_comments(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", self.comments), [], |row| {
            row.get(0)
        })
        .map_err(|e| Error::Database(e.to_string()))
    }

    /// Number of stored comments across the given products.
    pub fn count_comments_for(&self, ids: &[ProductId]) -> Result<i64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE product_id IN ({})",
            self.comments, placeholders
        );
        let conn = self.conn.lock();
        conn.query_row(&sql, params_from_iter(ids.iter().map(|id| id.as_str())), |row| {
            row.get(0)
        })
        .map_err(|e| Error::Database(e.to_string()))
    }

    /// Stored comments of one product, in insertion order.
    pub fn comments_for_product(&self, id: &ProductId) -> Result<Vec<CommentDocument>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(&format!(
                "SELECT doc FROM {} WHERE product_id = ?1 ORDER BY id",
                self.comments
            ))
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![id.as_str()], |row| row.get::<_, String>(0))
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut docs = Vec::new();
        for row in rows {
            let json = row.map_err(|e| Error::Database(e.to_string()))?;
            docs.push(serde_json::from_str(&json)?);
        }
        Ok(docs)
    }

    // ---------------------------------------------------------------
    // Stats
    // ---------------------------------------------------------------

    pub fn get_stats(&self) -> Result<StoreStats> {
        let products = self.count_products()?;
        let comments = self.count_comments()?;
        let commented_products: i64 = {
            let conn = self.conn.lock();
            conn.query_row(
                &format!("SELECT COUNT(DISTINCT product_id) FROM {}", self.comments),
                [],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(e.to_string()))?
        };
        let db_size_mb = std::fs::metadata(&self.db_path)
            .map(|m| m.len() as f64 / (1024.0 * 1024.0))
            .unwrap_or(0.0);

        Ok(StoreStats {
            products,
            comments,
            commented_products,
            db_path: self.db_path.display().to_string(),
            db_size_mb,
        })
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
