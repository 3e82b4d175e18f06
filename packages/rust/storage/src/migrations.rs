//! SQL migration definitions for the TenderWatch notice database.
//!
//! Migrations run in ascending order when the database is opened read-write.
//! Each one records its version in `schema_migrations` as its last statement.

/// A versioned batch of schema statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "notices keyed by canonical key",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS notices (
    id             TEXT PRIMARY KEY,
    canonical_key  TEXT NOT NULL UNIQUE,
    title          TEXT NOT NULL,
    url            TEXT,
    source_item_id TEXT,
    published_at   TEXT,
    raw_text       TEXT NOT NULL,
    content_hash   TEXT NOT NULL,
    extracted_json TEXT NOT NULL,
    decision_json  TEXT,
    decision_state TEXT,
    fit_score      INTEGER,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notices_decision_state ON notices(decision_state);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "run history",
            sql: r#"
CREATE TABLE IF NOT EXISTS runs (
    id          TEXT PRIMARY KEY,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
