//! Chunk repository and the chunk update protocol.
//!
//! An edit creates a new immutable version and moves the chunk's active
//! pointer in one transaction. The chunk row is locked `FOR UPDATE` for the
//! duration, serializing concurrent edits; an optional `expected_version`
//! adds an optimistic check so a caller holding stale state loses with a
//! `Conflict` instead of silently overwriting.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use corpus_core::{
    ChunkRepository, DocumentChunk, Error, Result, UpdateChunkRequest,
};

use crate::versioning::PgVersionRepository;

/// PostgreSQL implementation of [`ChunkRepository`].
#[derive(Clone)]
pub struct PgChunkRepository {
    pool: PgPool,
    versions: PgVersionRepository,
}

impl PgChunkRepository {
    /// Create a new chunk repository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        let versions = PgVersionRepository::new(pool.clone());
        Self { pool, versions }
    }

    fn map_row(row: sqlx::postgres::PgRow) -> DocumentChunk {
        DocumentChunk {
            id: row.get("id"),
            document_id: row.get("document_id"),
            chunk_index: row.get("chunk_index"),
            content: row.get("content"),
            chunk_version_id: row.get("chunk_version_id"),
            version: row.get("version"),
            modification_count: row.get("modification_count"),
            last_modified_by: row.get("last_modified_by"),
            last_modified_at: row.get("last_modified_at"),
            created_at_utc: row.get("created_at_utc"),
        }
    }

    const SELECT_COLUMNS: &'static str =
        "id, document_id, chunk_index, content, chunk_version_id, version,
         modification_count, last_modified_by, last_modified_at, created_at_utc";
}

#[async_trait]
impl ChunkRepository for PgChunkRepository {
    async fn get(&self, id: Uuid) -> Result<DocumentChunk> {
        let query = format!(
            "SELECT {} FROM document_chunk WHERE id = $1",
            Self::SELECT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::map_row).ok_or(Error::ChunkNotFound(id))
    }

    async fn list_for_document(&self, document_id: Uuid) -> Result<Vec<DocumentChunk>> {
        let query = format!(
            "SELECT {} FROM document_chunk WHERE document_id = $1 ORDER BY chunk_index ASC",
            Self::SELECT_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(document_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::map_row).collect())
    }

    async fn update(&self, chunk_id: Uuid, req: UpdateChunkRequest) -> Result<DocumentChunk> {
        if req.content.trim().is_empty() {
            return Err(Error::Validation("Chunk content must not be empty".into()));
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Row lock serializes concurrent edits to the same chunk.
        let current: Option<(i32,)> =
            sqlx::query_as("SELECT version FROM document_chunk WHERE id = $1 FOR UPDATE")
                .bind(chunk_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(Error::Database)?;
        let current_version = current.ok_or(Error::ChunkNotFound(chunk_id))?.0;

        if let Some(expected) = req.expected_version {
            if expected != current_version {
                // Loser of the race: surface the conflict, leave the row
                // untouched. The caller retries with fresh state.
                return Err(Error::Conflict(format!(
                    "Chunk {} is at version {}, expected {}",
                    chunk_id, current_version, expected
                )));
            }
        }

        let version = self
            .versions
            .create_version_tx(
                &mut tx,
                chunk_id,
                &req.content,
                &req.modified_by,
                req.comment.as_deref(),
            )
            .await?;

        let now = Utc::now();
        let query = format!(
            "UPDATE document_chunk
             SET content = $1, chunk_version_id = $2, version = $3,
                 modification_count = modification_count + 1,
                 last_modified_by = $4, last_modified_at = $5
             WHERE id = $6
             RETURNING {}",
            Self::SELECT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(&req.content)
            .bind(version.id)
            .bind(current_version + 1)
            .bind(&req.modified_by)
            .bind(now)
            .bind(chunk_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            chunk_id = %chunk_id,
            version = current_version + 1,
            version_number = version.version_number,
            "Chunk updated"
        );

        Ok(Self::map_row(row))
    }
}
