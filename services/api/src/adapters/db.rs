//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the multi-tenant implementation
//! of the `RecordStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use speaking_coach_core::domain::{Highlight, Record, RecordId, Scope, UserId};
use speaking_coach_core::ports::{PortError, PortResult, RecordStore};
use sqlx::{types::Json, FromRow, PgPool};
use tracing::warn;
use uuid::Uuid;

const RECORD_COLUMNS: &str =
    "id, user_id, created_at, updated_at, part, topic, band, ai_script, personal_script, highlights";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `RecordStore` port.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    /// Creates a new `PgRecordStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Every remote operation needs an identity.
fn owner_of(scope: &Scope) -> PortResult<&UserId> {
    scope.owner().ok_or(PortError::Unauthorized)
}

fn store_error(e: sqlx::Error) -> PortError {
    warn!("Record store query failed: {}", e);
    PortError::Store(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(Serialize, Deserialize)]
struct HighlightColumn {
    phrase: String,
    cn_meaning: String,
    reusability: String,
}

#[derive(FromRow)]
struct RecordRow {
    id: Uuid,
    user_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    part: String,
    topic: String,
    band: String,
    ai_script: String,
    personal_script: String,
    highlights: Json<Vec<HighlightColumn>>,
}

impl RecordRow {
    fn from_domain(record: &Record, owner: &UserId) -> Self {
        Self {
            id: record.id.as_uuid(),
            user_id: owner.as_str().to_string(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            part: record.part.label().to_string(),
            topic: record.topic.clone(),
            band: record.band.to_string(),
            ai_script: record.ai_script.clone(),
            personal_script: record.personal_script.clone(),
            highlights: Json(
                record
                    .highlights
                    .iter()
                    .map(|h| HighlightColumn {
                        phrase: h.phrase.clone(),
                        cn_meaning: h.cn_meaning.clone(),
                        reusability: h.reusability_note.clone(),
                    })
                    .collect(),
            ),
        }
    }

    fn to_domain(self) -> PortResult<Record> {
        Ok(Record {
            id: RecordId::from_uuid(self.id),
            owner: Some(UserId::new(self.user_id)),
            created_at: self.created_at,
            updated_at: self.updated_at,
            part: self
                .part
                .parse()
                .map_err(|e| PortError::Store(format!("Row {}: {}", self.id, e)))?,
            topic: self.topic,
            band: self
                .band
                .parse()
                .map_err(|e| PortError::Store(format!("Row {}: {}", self.id, e)))?,
            ai_script: self.ai_script,
            personal_script: self.personal_script,
            highlights: self
                .highlights
                .0
                .into_iter()
                .map(|h| Highlight {
                    phrase: h.phrase,
                    cn_meaning: h.cn_meaning,
                    reusability_note: h.reusability,
                })
                .collect(),
        })
    }
}

//=========================================================================================
// `RecordStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RecordStore for PgRecordStore {
    fn requires_identity(&self) -> bool {
        true
    }

    async fn list(&self, scope: &Scope) -> PortResult<Vec<Record>> {
        let owner = owner_of(scope)?;
        let rows = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {} FROM practice_records WHERE user_id = $1 ORDER BY updated_at DESC",
            RECORD_COLUMNS
        ))
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter().map(RecordRow::to_domain).collect()
    }

    async fn upsert(&self, scope: &Scope, record: Record) -> PortResult<Record> {
        let owner = owner_of(scope)?;
        let row = RecordRow::from_domain(&record, owner);

        // The conflict branch only fires for the caller's own rows; another
        // owner's id yields no row back.
        let stored = sqlx::query_as::<_, RecordRow>(&format!(
            "INSERT INTO practice_records ({cols}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO UPDATE SET \
                updated_at = EXCLUDED.updated_at, \
                part = EXCLUDED.part, \
                topic = EXCLUDED.topic, \
                band = EXCLUDED.band, \
                ai_script = EXCLUDED.ai_script, \
                personal_script = EXCLUDED.personal_script, \
                highlights = EXCLUDED.highlights \
             WHERE practice_records.user_id = EXCLUDED.user_id \
             RETURNING {cols}",
            cols = RECORD_COLUMNS
        ))
        .bind(row.id)
        .bind(&row.user_id)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(&row.part)
        .bind(&row.topic)
        .bind(&row.band)
        .bind(&row.ai_script)
        .bind(&row.personal_script)
        .bind(&row.highlights)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        match stored {
            Some(stored) => stored.to_domain(),
            None => {
                warn!(record_id = %record.id, user_id = %owner, "Upsert refused for a record owned by someone else.");
                Err(PortError::Unauthorized)
            }
        }
    }

    async fn remove(&self, scope: &Scope, id: RecordId) -> PortResult<()> {
        let owner = owner_of(scope)?;
        sqlx::query("DELETE FROM practice_records WHERE id = $1 AND user_id = $2")
            .bind(id.as_uuid())
            .bind(owner.as_str())
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}
