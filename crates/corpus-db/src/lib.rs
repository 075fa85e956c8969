//! # corpus-db
//!
//! PostgreSQL database layer for corpus.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for documents, chunks, versions, and jobs
//! - Text chunking for document ingestion
//! - The chunk update protocol (locked, versioned edits)
//!
//! ## Example
//!
//! ```rust,ignore
//! use corpus_db::Database;
//! use corpus_core::{CreateDocumentRequest, DocumentRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/corpus").await?;
//!
//!     let document_id = db.documents.insert(CreateDocumentRequest {
//!         title: "Getting Started".to_string(),
//!         content: "First paragraph.\n\nSecond paragraph.".to_string(),
//!         source: "upload".to_string(),
//!         created_by: "alice".to_string(),
//!     }).await?;
//!
//!     println!("Ingested document: {}", document_id);
//!     Ok(())
//! }
//! ```
pub mod chunking;
pub mod chunks;
pub mod documents;
pub mod jobs;
pub mod pool;
pub mod versioning;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use corpus_core::*;

// Re-export chunking types
pub use chunking::{Chunker, ChunkerConfig, ParagraphChunker, SlidingWindowChunker, TextChunk};

// Re-export repository implementations
pub use chunks::PgChunkRepository;
pub use documents::PgDocumentRepository;
pub use jobs::PgJobRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use versioning::PgVersionRepository;

use tracing::warn;
use uuid::Uuid;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Document repository for ingestion and retrieval.
    pub documents: PgDocumentRepository,
    /// Chunk repository for reads and versioned edits.
    pub chunks: PgChunkRepository,
    /// Version ledger repository.
    pub versions: PgVersionRepository,
    /// Job repository for background processing.
    pub jobs: PgJobRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn from_pool(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            documents: PgDocumentRepository::new(pool.clone()),
            chunks: PgChunkRepository::new(pool.clone()),
            versions: PgVersionRepository::new(pool.clone()),
            jobs: PgJobRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::from_pool(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::from_pool(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }

    /// Ingest a document and schedule vectorization for each of its chunks.
    ///
    /// The document, chunks, and initial versions commit atomically; the
    /// per-chunk enqueues that follow are best-effort, logged on failure.
    pub async fn ingest_document(&self, req: CreateDocumentRequest) -> Result<Document> {
        let document_id = self.documents.insert(req).await?;

        for chunk in self.chunks.list_for_document(document_id).await? {
            if let Err(e) = self
                .jobs
                .queue_deduplicated(
                    Some(chunk.id),
                    Some(document_id),
                    JobType::Vectorize,
                    JobType::Vectorize.default_priority(),
                    None,
                )
                .await
            {
                warn!(
                    chunk_id = %chunk.id,
                    error = %e,
                    "Document ingested but vectorize enqueue failed"
                );
            }
        }

        self.documents.fetch(document_id).await
    }

    /// Edit a chunk and schedule downstream reprocessing.
    ///
    /// Two phases. Phase one commits the versioned update; phase two queues
    /// a deduplicated reindex job. The enqueue is best-effort: if it fails
    /// the edit stands, the failure is logged, and a later edit or sweep
    /// picks the reindex up. Returns the updated chunk.
    pub async fn edit_chunk(
        &self,
        chunk_id: Uuid,
        req: UpdateChunkRequest,
    ) -> Result<DocumentChunk> {
        let chunk = self.chunks.update(chunk_id, req).await?;

        if let Err(e) = self
            .jobs
            .queue_deduplicated(
                Some(chunk.id),
                Some(chunk.document_id),
                JobType::Reindex,
                JobType::Reindex.default_priority(),
                None,
            )
            .await
        {
            warn!(
                chunk_id = %chunk.id,
                error = %e,
                "Chunk edit committed but reindex enqueue failed"
            );
        }

        Ok(chunk)
    }

    /// Restore a chunk to an earlier version and schedule downstream
    /// reprocessing.
    ///
    /// Same two-phase shape as [`Database::edit_chunk`]: the restore commits
    /// a new version, then a deduplicated reindex job is queued best-effort
    /// so the search index catches up with the restored content.
    pub async fn restore_version(&self, version_id: Uuid) -> Result<ChunkVersion> {
        let restored = self.versions.restore(version_id).await?;

        let document_id = match self.chunks.get(restored.chunk_id).await {
            Ok(chunk) => Some(chunk.document_id),
            Err(_) => None,
        };
        if let Err(e) = self
            .jobs
            .queue_deduplicated(
                Some(restored.chunk_id),
                document_id,
                JobType::Reindex,
                JobType::Reindex.default_priority(),
                None,
            )
            .await
        {
            warn!(
                chunk_id = %restored.chunk_id,
                error = %e,
                "Restore committed but reindex enqueue failed"
            );
        }

        Ok(restored)
    }

    /// Resolve a chunk's content, falling back to the version ledger when
    /// the cached copy is absent.
    pub async fn chunk_content(&self, chunk_id: Uuid) -> Result<String> {
        let chunk = self.chunks.get(chunk_id).await?;
        if let Some(content) = chunk.content {
            return Ok(content);
        }

        // Ingestion always sets the pointer, so a missing one is corruption.
        let version_id = chunk.chunk_version_id.ok_or_else(|| {
            Error::Internal(format!("chunk {} has no content and no active version", chunk_id))
        })?;
        let version = self
            .versions
            .get_version(version_id)
            .await?
            .ok_or(Error::VersionNotFound(version_id))?;
        Ok(version.content)
    }
}
