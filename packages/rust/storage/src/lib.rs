//! libSQL notice store (embedded, offline mode).
//!
//! [`Storage`] keeps one row per canonical key with the latest extracted
//! fields and decision, plus a history of pipeline runs.
//!
//! **Access rules:**
//! - `tenderwatch run`: read-write via [`Storage::open`]
//! - `tenderwatch list` / `show`: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database, params};
use tracing::{debug, info};
use uuid::Uuid;

use tenderwatch_shared::{
    CanonicalKey, ContentHash, Decision, DecisionState, ExtractedFields, NoticeFields, NoticeId,
    NoticeRecord, Result, TenderError,
};

const NOTICE_COLUMNS: &str = "id, canonical_key, title, url, source_item_id, published_at, raw_text, \
     content_hash, extracted_json, decision_json, created_at, updated_at";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TenderError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path).build().await.map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TenderError::Storage(format!(
                "database not found: {} (run `tenderwatch run` first)",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path).build().await.map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    TenderError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 on a fresh database.
    async fn get_schema_version(&self) -> u32 {
        let Ok(mut rows) = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await
        else {
            return 0;
        };

        match rows.next().await {
            Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
            _ => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(TenderError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Notices
    // -----------------------------------------------------------------------

    /// Insert or update the notice stored under `fields.canonical_key`.
    ///
    /// The row id and `created_at` survive updates. Passing no decision keeps
    /// whatever decision was stored before.
    pub async fn upsert_notice(
        &self,
        fields: &NoticeFields,
        decision: Option<&Decision>,
    ) -> Result<NoticeRecord> {
        self.check_writable()?;

        let now = Utc::now().to_rfc3339();
        let extracted_json = serde_json::to_string(&fields.extracted)
            .map_err(|e| TenderError::Storage(format!("serialize extracted fields: {e}")))?;
        let decision_json = decision
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| TenderError::Storage(format!("serialize decision: {e}")))?;

        self.conn
            .execute(
                "INSERT INTO notices (id, canonical_key, title, url, source_item_id, published_at,
                                      raw_text, content_hash, extracted_json, decision_json,
                                      decision_state, fit_score, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(canonical_key) DO UPDATE SET
                   title = excluded.title,
                   url = excluded.url,
                   source_item_id = excluded.source_item_id,
                   published_at = excluded.published_at,
                   raw_text = excluded.raw_text,
                   content_hash = excluded.content_hash,
                   extracted_json = excluded.extracted_json,
                   decision_json = COALESCE(excluded.decision_json, notices.decision_json),
                   decision_state = COALESCE(excluded.decision_state, notices.decision_state),
                   fit_score = CASE WHEN excluded.decision_json IS NULL
                                    THEN notices.fit_score ELSE excluded.fit_score END,
                   updated_at = excluded.updated_at",
                params![
                    NoticeId::new().to_string(),
                    fields.canonical_key.as_str(),
                    fields.title.as_str(),
                    fields.url.as_deref(),
                    fields.source_item_id.as_deref(),
                    fields.published_at.map(|d| d.to_string()),
                    fields.raw_text.as_str(),
                    fields.content_hash.as_str(),
                    extracted_json,
                    decision_json,
                    decision.map(|d| d.state().as_str()),
                    decision.and_then(Decision::fit_score).map(i64::from),
                    now.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;

        debug!(key = %fields.canonical_key, decided = decision.is_some(), "notice upserted");

        self.get_by_canonical_key(&fields.canonical_key)
            .await?
            .ok_or_else(|| {
                TenderError::Storage(format!(
                    "notice {} missing after upsert",
                    fields.canonical_key
                ))
            })
    }

    /// Look up a notice by canonical key.
    pub async fn get_by_canonical_key(&self, key: &CanonicalKey) -> Result<Option<NoticeRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {NOTICE_COLUMNS} FROM notices WHERE canonical_key = ?1"),
                params![key.as_str()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_notice(&row)?)),
            None => Ok(None),
        }
    }

    /// List notices, best fit first (unscored last), optionally filtered by state.
    pub async fn list_notices(
        &self,
        state: Option<DecisionState>,
        limit: u32,
    ) -> Result<Vec<NoticeRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {NOTICE_COLUMNS} FROM notices
                     WHERE ?1 IS NULL OR decision_state = ?1
                     ORDER BY fit_score IS NULL, fit_score DESC, updated_at DESC
                     LIMIT ?2"
                ),
                params![state.map(|s| s.as_str()), limit],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_notice(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Record the start of a pipeline run. Returns the run id.
    pub async fn insert_run(&self) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO runs (id, started_at) VALUES (?1, ?2)",
                params![id.as_str(), now.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(id)
    }

    /// Mark a run finished and attach its summary.
    pub async fn finish_run(&self, run_id: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

fn db_err(e: libsql::Error) -> TenderError {
    TenderError::Storage(e.to_string())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TenderError::Storage(format!("invalid timestamp {raw:?}: {e}")))
}

/// Convert a row selected with [`NOTICE_COLUMNS`] into a [`NoticeRecord`].
fn row_to_notice(row: &libsql::Row) -> Result<NoticeRecord> {
    let id: String = row.get(0).map_err(db_err)?;
    let id = id
        .parse::<NoticeId>()
        .map_err(|e| TenderError::Storage(format!("invalid notice id {id}: {e}")))?;

    let extracted_json: String = row.get(8).map_err(db_err)?;
    let extracted: ExtractedFields = serde_json::from_str(&extracted_json)
        .map_err(|e| TenderError::Storage(format!("invalid extracted_json: {e}")))?;

    let decision = row
        .get::<String>(9)
        .ok()
        .map(|json| serde_json::from_str::<Decision>(&json))
        .transpose()
        .map_err(|e| TenderError::Storage(format!("invalid decision_json: {e}")))?;

    let published_at = row
        .get::<String>(5)
        .ok()
        .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok());

    Ok(NoticeRecord {
        id,
        canonical_key: CanonicalKey::from_stored(row.get::<String>(1).map_err(db_err)?),
        title: row.get(2).map_err(db_err)?,
        url: row.get::<String>(3).ok(),
        source_item_id: row.get::<String>(4).ok(),
        published_at,
        raw_text: row.get(6).map_err(db_err)?,
        content_hash: ContentHash::from_stored(row.get::<String>(7).map_err(db_err)?),
        extracted,
        decision,
        created_at: parse_timestamp(&row.get::<String>(10).map_err(db_err)?)?,
        updated_at: parse_timestamp(&row.get::<String>(11).map_err(db_err)?)?,
    })
}
