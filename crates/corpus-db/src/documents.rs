//! Document repository and transactional ingestion.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use corpus_core::{
    new_v7, CreateDocumentRequest, Document, DocumentRepository, Error, Result,
};

use crate::chunking::{Chunker, ChunkerConfig, ParagraphChunker};
use crate::versioning::PgVersionRepository;

/// PostgreSQL implementation of [`DocumentRepository`].
///
/// Ingestion splits content with the configured chunker and creates the
/// document, every chunk at version 1, and every chunk's initial version in
/// a single transaction.
pub struct PgDocumentRepository {
    pool: PgPool,
    chunker: Box<dyn Chunker>,
}

impl Clone for PgDocumentRepository {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}

impl PgDocumentRepository {
    /// Create a repository with the default paragraph chunker.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            chunker: Box::new(ParagraphChunker::new(ChunkerConfig::default())),
        }
    }

    /// Create a repository with a custom chunking strategy.
    pub fn with_chunker(pool: PgPool, chunker: impl Chunker + 'static) -> Self {
        Self {
            pool,
            chunker: Box::new(chunker),
        }
    }

    fn map_row(row: sqlx::postgres::PgRow) -> Document {
        Document {
            id: row.get("id"),
            title: row.get("title"),
            source: row.get("source"),
            created_at_utc: row.get("created_at_utc"),
            updated_at_utc: row.get("updated_at_utc"),
            chunk_count: row.try_get("chunk_count").unwrap_or(0),
        }
    }
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn insert(&self, req: CreateDocumentRequest) -> Result<Uuid> {
        if req.content.trim().is_empty() {
            return Err(Error::Validation(
                "Document content must not be empty".into(),
            ));
        }
        if req.title.trim().is_empty() {
            return Err(Error::Validation("Document title must not be empty".into()));
        }

        let document_id = new_v7();
        let now = Utc::now();
        let pieces = self.chunker.chunk(&req.content);

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query(
            "INSERT INTO document (id, title, source, created_at_utc, updated_at_utc)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(document_id)
        .bind(&req.title)
        .bind(&req.source)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        for (index, piece) in pieces.iter().enumerate() {
            let chunk_id = new_v7();
            let version_id = new_v7();
            let hash = PgVersionRepository::hash_content(&piece.text);

            sqlx::query(
                "INSERT INTO document_chunk
                     (id, document_id, chunk_index, content, chunk_version_id, version,
                      modification_count, last_modified_by, last_modified_at, created_at_utc)
                 VALUES ($1, $2, $3, $4, $5, 1, 0, $6, $7, $7)",
            )
            .bind(chunk_id)
            .bind(document_id)
            .bind(index as i32)
            .bind(&piece.text)
            .bind(version_id)
            .bind(&req.created_by)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

            sqlx::query(
                "INSERT INTO chunk_version
                     (id, chunk_id, version_number, content, hash, modified_by, comment, created_at_utc)
                 VALUES ($1, $2, 1, $3, $4, $5, $6, $7)",
            )
            .bind(version_id)
            .bind(chunk_id)
            .bind(&piece.text)
            .bind(&hash)
            .bind(&req.created_by)
            .bind("Initial version")
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;

        info!(
            document_id = %document_id,
            chunk_count = pieces.len(),
            "Document ingested"
        );

        Ok(document_id)
    }

    async fn fetch(&self, id: Uuid) -> Result<Document> {
        let row = sqlx::query(
            "SELECT d.id, d.title, d.source, d.created_at_utc, d.updated_at_utc,
                    (SELECT COUNT(*) FROM document_chunk c WHERE c.document_id = d.id) AS chunk_count
             FROM document d
             WHERE d.id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::map_row).ok_or(Error::DocumentNotFound(id))
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT d.id, d.title, d.source, d.created_at_utc, d.updated_at_utc,
                    (SELECT COUNT(*) FROM document_chunk c WHERE c.document_id = d.id) AS chunk_count
             FROM document d
             ORDER BY d.created_at_utc DESC
             LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::map_row).collect())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        // Versions and chunks cascade via foreign keys.
        let result = sqlx::query("DELETE FROM document WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(id));
        }
        Ok(())
    }
}
