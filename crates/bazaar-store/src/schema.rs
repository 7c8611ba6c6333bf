//! Collection schema SQL.
//!
//! Collection names are configurable, so the statements are rendered per
//! store. Names are validated as plain identifiers by `PipelineConfig`.

/// Products collection: one row per product id, full document in `doc`.
pub fn products_sql(table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {t} (
    id TEXT PRIMARY KEY NOT NULL CHECK (length(id) > 0),
    title_en TEXT NOT NULL,
    brand_code TEXT NOT NULL,
    category_code TEXT NOT NULL,
    doc TEXT NOT NULL CHECK (
        json_valid(doc)
        AND json_extract(doc, '$.id') IS id
        AND json_type(doc, '$.title_en') IS 'text'
        AND json_type(doc, '$.specifications') IS 'object'
        AND json_type(doc, '$.colors') IS 'array'
        AND json_type(doc, '$.images') IS 'array'
        AND coalesce(json_type(doc, '$.price'), 'null') IN ('integer', 'real', 'null')
        AND coalesce(json_type(doc, '$.rate'), 'null') IN ('integer', 'real', 'null')
        AND (json_extract(doc, '$.rate') IS NULL OR json_extract(doc, '$.rate') BETWEEN 0 AND 5)
        AND coalesce(json_type(doc, '$.count_raters'), 'null') IN ('integer', 'null')
        AND json_type(doc, '$.popularity') IS 'integer'
        AND json_type(doc, '$.num_questions') IS 'integer'
        AND json_type(doc, '$.num_comments') IS 'integer'
    ),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_{t}_brand ON {t}(brand_code);
CREATE INDEX IF NOT EXISTS idx_{t}_category ON {t}(category_code);
"#,
        t = table
    )
}

/// Nested shape rules a CHECK constraint cannot express (they need subqueries).
pub fn products_triggers_sql(table: &str) -> String {
    let rule = r#"
    EXISTS (
        SELECT 1 FROM json_each(NEW.doc, '$.specifications') AS grp
        WHERE grp.type <> 'object'
           OR EXISTS (SELECT 1 FROM json_each(grp.value) AS attr WHERE attr.type <> 'array')
    )
    OR EXISTS (SELECT 1 FROM json_each(NEW.doc, '$.colors') WHERE type <> 'text')
    OR EXISTS (SELECT 1 FROM json_each(NEW.doc, '$.images') WHERE type <> 'text')"#;

    format!(
        r#"
CREATE TRIGGER IF NOT EXISTS {t}_shape_ai BEFORE INSERT ON {t}
WHEN {rule}
BEGIN
    SELECT RAISE(ABORT, 'product document shape rejected');
END;

CREATE TRIGGER IF NOT EXISTS {t}_shape_au BEFORE UPDATE OF doc ON {t}
WHEN {rule}
BEGIN
    SELECT RAISE(ABORT, 'product document shape rejected');
END;
"#,
        t = table,
        rule = rule
    )
}

/// Comments collection: many rows per product id.
pub fn comments_sql(table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {t} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id TEXT NOT NULL CHECK (length(product_id) > 0),
    body TEXT NOT NULL CHECK (length(body) > 0),
    rate INTEGER CHECK (rate IS NULL OR rate BETWEEN 0 AND 5),
    doc TEXT NOT NULL CHECK (
        json_valid(doc)
        AND json_extract(doc, '$.product_id') IS product_id
        AND json_type(doc, '$.images') IS 'array'
        AND json_type(doc, '$.advantages') IS 'array'
        AND json_type(doc, '$.disadvantages') IS 'array'
        AND coalesce(json_type(doc, '$.is_buyer'), 'null') IN ('true', 'false', 'null')
        AND coalesce(json_type(doc, '$.likes'), 'null') IN ('integer', 'null')
        AND coalesce(json_type(doc, '$.dislikes'), 'null') IN ('integer', 'null')
    ),
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_{t}_product_id ON {t}(product_id);
"#,
        t = table
    )
}
