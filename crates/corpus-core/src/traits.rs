//! Repository traits and collaborator seams.
//!
//! Repositories own persistence of the core entities; the relational store
//! behind them is the single source of truth for the chunk/version
//! consistency invariant. `SearchIndex` and `CacheInvalidator` are downstream
//! collaborators the core consumes but does not implement: their copies may
//! be transiently stale and are refreshed by background jobs.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    ChunkVersion, CreateDocumentRequest, Document, DocumentChunk, Job, JobType, QueueStats,
    UpdateChunkRequest, VersionSummary,
};

/// Repository for ingested documents.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Ingest a document: split into chunks, create each chunk at version 1
    /// with its initial version snapshot, all in one transaction.
    async fn insert(&self, req: CreateDocumentRequest) -> Result<Uuid>;

    /// Fetch a document by ID.
    async fn fetch(&self, id: Uuid) -> Result<Document>;

    /// List documents, newest first.
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Document>>;

    /// Delete a document and its chunks/versions.
    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Repository for document chunks.
#[async_trait]
pub trait ChunkRepository: Send + Sync {
    /// Get a chunk by ID.
    async fn get(&self, id: Uuid) -> Result<DocumentChunk>;

    /// List all chunks of a document ordered by `chunk_index`.
    async fn list_for_document(&self, document_id: Uuid) -> Result<Vec<DocumentChunk>>;

    /// Apply an edit to a chunk.
    ///
    /// Creates a new version and moves the chunk's active-version pointer in
    /// one transaction. Fails with `Validation` on empty content, `Conflict`
    /// when `expected_version` is stale, `ChunkNotFound` when absent. Never
    /// partially applied.
    async fn update(&self, chunk_id: Uuid, req: UpdateChunkRequest) -> Result<DocumentChunk>;
}

/// Repository for the append-only chunk version ledger.
#[async_trait]
pub trait VersionRepository: Send + Sync {
    /// Append a new version for a chunk.
    ///
    /// The version number is `max(existing for chunk, 0) + 1`, allocated
    /// inside the same transaction as the chunk pointer update.
    async fn create_version(
        &self,
        chunk_id: Uuid,
        content: &str,
        modified_by: &str,
        comment: Option<&str>,
    ) -> Result<ChunkVersion>;

    /// Full version history of a chunk, ordered by `version_number` ascending.
    async fn get_history(&self, chunk_id: Uuid) -> Result<Vec<ChunkVersion>>;

    /// Version history without content snapshots.
    async fn list_summaries(&self, chunk_id: Uuid) -> Result<Vec<VersionSummary>>;

    /// Point lookup of a single version.
    async fn get_version(&self, version_id: Uuid) -> Result<Option<ChunkVersion>>;

    /// Restore an old version by appending a new one with the same content.
    ///
    /// Never mutates or deletes the target version or any version created
    /// after it; the new version is attributed to the system actor.
    async fn restore(&self, version_id: Uuid) -> Result<ChunkVersion>;

    /// Unified diff between two versions of the same chunk.
    async fn diff_versions(&self, chunk_id: Uuid, from: i32, to: i32) -> Result<String>;
}

/// Repository for the background job queue.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Queue a new job (always starts in `pending`).
    async fn queue(
        &self,
        chunk_id: Option<Uuid>,
        document_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Uuid>;

    /// Queue a job unless an equivalent pending/started one exists for the
    /// same chunk. Returns `None` when deduplicated away.
    async fn queue_deduplicated(
        &self,
        chunk_id: Option<Uuid>,
        document_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Option<Uuid>>;

    /// Claim the next claimable job for processing (`pending`/`retry` → `started`).
    async fn claim_next(&self) -> Result<Option<Job>>;

    /// Claim the next claimable job whose type is in `job_types`.
    /// An empty slice means "claim any type".
    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>>;

    /// Update job progress.
    async fn update_progress(&self, job_id: Uuid, percent: i32, message: Option<&str>)
        -> Result<()>;

    /// Mark a started job as succeeded. Illegal transitions are logged and
    /// ignored, not raised.
    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()>;

    /// Mark a started job as failed and count the failure against the
    /// retry cap. Illegal transitions are logged and ignored, not raised.
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Externally cancel a job that is not yet terminal.
    async fn revoke(&self, job_id: Uuid) -> Result<()>;

    /// Re-arm failed jobs younger than `max_age_secs` that have failed
    /// fewer than `attempt_cap` times (`failure` → `retry`). Returns how
    /// many were re-armed.
    async fn requeue_failed(&self, max_age_secs: i64, attempt_cap: i32) -> Result<u64>;

    /// Failed jobs that exhausted their retries, for manual inspection.
    async fn list_exhausted(&self, attempt_cap: i32, limit: i64) -> Result<Vec<Job>>;

    /// Get job by ID.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Get all jobs for a chunk.
    async fn get_for_chunk(&self, chunk_id: Uuid) -> Result<Vec<Job>>;

    /// Count of claimable jobs.
    async fn pending_count(&self) -> Result<i64>;

    /// List recent jobs.
    async fn list_recent(&self, limit: i64) -> Result<Vec<Job>>;

    /// Queue statistics summary.
    async fn queue_stats(&self) -> Result<QueueStats>;

    /// Delete old terminal jobs, keeping the most recent `keep_count`.
    async fn cleanup(&self, keep_count: i64) -> Result<i64>;
}

/// Downstream search index collaborator.
///
/// Implementations must be idempotent: jobs are delivered at least once and
/// may be processed out of enqueue order.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Index (or re-index) a chunk's current content.
    async fn index_chunk(&self, chunk_id: Uuid, document_id: Uuid, content: &str) -> Result<()>;

    /// Remove a chunk from the index.
    async fn remove_chunk(&self, chunk_id: Uuid) -> Result<()>;
}

/// Downstream cache collaborator.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    /// Mark a chunk's cached entries stale.
    async fn invalidate_chunk(&self, chunk_id: Uuid) -> Result<()>;

    /// Mark all of a document's cached entries stale.
    async fn invalidate_document(&self, document_id: Uuid) -> Result<()>;
}
