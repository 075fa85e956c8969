//! Core data models for documents, chunks, version history, and jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// =============================================================================
// DOCUMENT & CHUNK TYPES
// =============================================================================

/// A document ingested into the knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    /// Where this document came from ("upload", "crawler", "api", ...).
    pub source: String,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
    /// Number of chunks in this document (computed).
    #[serde(default)]
    pub chunk_count: i64,
}

/// One independently versionable segment of a document's text.
///
/// A chunk caches its current content and points at the active
/// [`ChunkVersion`] through `chunk_version_id`. The version ledger is the
/// authoritative record; the cache may be absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: Uuid,
    pub document_id: Uuid,
    /// Ordinal position within the document, unique per document.
    pub chunk_index: i32,
    /// Cached copy of the active version's content.
    pub content: Option<String>,
    /// The currently active version. If set, it references a `ChunkVersion`
    /// whose `chunk_id` equals this chunk's id.
    pub chunk_version_id: Option<Uuid>,
    /// Monotonically increasing edit counter, starts at 1 on ingestion.
    pub version: i32,
    pub modification_count: i32,
    pub last_modified_by: Option<String>,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub created_at_utc: DateTime<Utc>,
}

/// Immutable snapshot of a chunk's content at one point in time.
///
/// For a given chunk, `version_number` values are unique and form a
/// contiguous increasing sequence (1..N) matching creation order. Rows are
/// never mutated or deleted; restoring an old version appends a new one.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChunkVersion {
    pub id: Uuid,
    pub chunk_id: Uuid,
    pub version_number: i32,
    pub content: String,
    /// SHA-256 of `content`, hex-encoded.
    pub hash: String,
    pub modified_by: String,
    pub comment: Option<String>,
    pub created_at_utc: DateTime<Utc>,
}

/// Summary of a version (without the full content snapshot).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionSummary {
    pub id: Uuid,
    pub version_number: i32,
    pub modified_by: String,
    pub comment: Option<String>,
    pub created_at_utc: DateTime<Utc>,
    pub is_current: bool,
}

/// Request to ingest a new document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDocumentRequest {
    pub title: String,
    pub content: String,
    pub source: String,
    pub created_by: String,
}

/// Request to edit a single chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateChunkRequest {
    pub content: String,
    pub modified_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Optimistic-concurrency check: when set, the update fails with a
    /// conflict if the chunk's current `version` differs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<i32>,
}

// =============================================================================
// JOB TYPES
// =============================================================================

/// Status of a job in the queue.
///
/// ```text
/// pending -> started -> success            (terminal)
///                    -> failure            (terminal unless retried)
/// failure -> retry -> started              (retry sweeper)
/// pending/started/retry -> revoked         (terminal, external cancel)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Started,
    Success,
    Failure,
    Retry,
    Revoked,
}

impl JobStatus {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failure | JobStatus::Revoked
        )
    }

    /// Whether a job in this state is claimable by a worker.
    pub fn is_claimable(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Retry)
    }

    /// Whether the transition `self -> next` is legal.
    ///
    /// The SQL transition guards in the job repository mirror this table;
    /// violations there are logged and ignored rather than raised.
    pub fn permits(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending, Started) | (Retry, Started) => true,
            (Started, Success) | (Started, Failure) => true,
            // Retry sweeper re-arms a recent failure.
            (Failure, Retry) => true,
            // External cancellation of anything not yet terminal.
            (Pending, Revoked) | (Started, Revoked) | (Retry, Revoked) => true,
            _ => false,
        }
    }
}

/// Type of background work tied to a chunk or document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Re-embed a chunk's current content
    Vectorize,
    /// Update the downstream search index for a chunk
    Reindex,
    /// Run OCR over a document's source attachment
    Ocr,
    /// Full reprocess of a document (re-chunk downstream artifacts)
    Reprocess,
}

impl JobType {
    /// Default priority for this job type (higher = more urgent).
    pub fn default_priority(&self) -> i32 {
        match self {
            // Reindex gates search freshness after an edit
            JobType::Reindex => 7,
            JobType::Vectorize => 5,
            // OCR is slow and gates nothing interactive
            JobType::Ocr => 3,
            // Whole-document reprocess is a background migration task
            JobType::Reprocess => 1,
        }
    }
}

/// A job in the processing queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub chunk_id: Option<Uuid>,
    pub document_id: Option<Uuid>,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i32,
    pub payload: Option<JsonValue>,
    pub result: Option<JsonValue>,
    pub error_message: Option<String>,
    pub progress_percent: i32,
    pub progress_message: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Queue statistics summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub started: i64,
    pub succeeded_last_hour: i64,
    pub failed_last_hour: i64,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Success.is_terminal());
        assert!(JobStatus::Failure.is_terminal());
        assert!(JobStatus::Revoked.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Started.is_terminal());
        assert!(!JobStatus::Retry.is_terminal());
    }

    #[test]
    fn test_claimable_states() {
        assert!(JobStatus::Pending.is_claimable());
        assert!(JobStatus::Retry.is_claimable());
        assert!(!JobStatus::Started.is_claimable());
        assert!(!JobStatus::Success.is_claimable());
        assert!(!JobStatus::Failure.is_claimable());
        assert!(!JobStatus::Revoked.is_claimable());
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(JobStatus::Pending.permits(JobStatus::Started));
        assert!(JobStatus::Started.permits(JobStatus::Success));
        assert!(JobStatus::Started.permits(JobStatus::Failure));
    }

    #[test]
    fn test_retry_transitions() {
        assert!(JobStatus::Failure.permits(JobStatus::Retry));
        assert!(JobStatus::Retry.permits(JobStatus::Started));
        // A retry-armed job cannot skip straight to a terminal outcome.
        assert!(!JobStatus::Retry.permits(JobStatus::Success));
        assert!(!JobStatus::Retry.permits(JobStatus::Failure));
    }

    #[test]
    fn test_revocation_transitions() {
        assert!(JobStatus::Pending.permits(JobStatus::Revoked));
        assert!(JobStatus::Started.permits(JobStatus::Revoked));
        assert!(JobStatus::Retry.permits(JobStatus::Revoked));
        // Terminal states stay terminal.
        assert!(!JobStatus::Success.permits(JobStatus::Revoked));
        assert!(!JobStatus::Failure.permits(JobStatus::Revoked));
        assert!(!JobStatus::Revoked.permits(JobStatus::Revoked));
    }

    #[test]
    fn test_terminal_states_permit_nothing_but_retry() {
        for next in [
            JobStatus::Pending,
            JobStatus::Started,
            JobStatus::Success,
            JobStatus::Failure,
            JobStatus::Retry,
            JobStatus::Revoked,
        ] {
            assert!(!JobStatus::Success.permits(next));
            assert!(!JobStatus::Revoked.permits(next));
            if next != JobStatus::Retry {
                assert!(!JobStatus::Failure.permits(next));
            }
        }
    }

    #[test]
    fn test_no_direct_pending_to_terminal() {
        assert!(!JobStatus::Pending.permits(JobStatus::Success));
        assert!(!JobStatus::Pending.permits(JobStatus::Failure));
    }

    #[test]
    fn test_job_status_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::to_string(&JobStatus::Revoked).unwrap(),
            "\"revoked\""
        );
        let status: JobStatus = serde_json::from_str("\"failure\"").unwrap();
        assert_eq!(status, JobStatus::Failure);
    }

    #[test]
    fn test_job_type_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobType::Vectorize).unwrap(),
            "\"vectorize\""
        );
        let jt: JobType = serde_json::from_str("\"reindex\"").unwrap();
        assert_eq!(jt, JobType::Reindex);
    }

    #[test]
    fn test_default_priorities_ordering() {
        assert!(JobType::Reindex.default_priority() > JobType::Vectorize.default_priority());
        assert!(JobType::Vectorize.default_priority() > JobType::Ocr.default_priority());
        assert!(JobType::Ocr.default_priority() > JobType::Reprocess.default_priority());
    }

    #[test]
    fn test_update_chunk_request_serde_roundtrip() {
        let req = UpdateChunkRequest {
            content: "new text".to_string(),
            modified_by: "alice".to_string(),
            comment: None,
            expected_version: Some(3),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("comment"));
        let back: UpdateChunkRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content, "new text");
        assert_eq!(back.expected_version, Some(3));
    }
}
