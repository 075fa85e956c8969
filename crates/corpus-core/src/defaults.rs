//! Centralized default constants for the corpus system.
//!
//! **This module is the single source of truth** for all shared default
//! values. Crates reference these constants instead of defining their own
//! magic numbers.

// =============================================================================
// CHUNKING
// =============================================================================

/// Maximum characters per chunk for text splitting.
pub const CHUNK_SIZE: usize = 1000;

/// Minimum characters per chunk (smaller chunks may be merged).
pub const CHUNK_MIN_SIZE: usize = 100;

/// Overlap characters between adjacent chunks for context preservation.
pub const CHUNK_OVERLAP: usize = 100;

// =============================================================================
// JOBS
// =============================================================================

/// Maximum retries for failed jobs before they stay failed permanently.
pub const JOB_MAX_RETRIES: i32 = 3;

/// Polling interval when the queue is empty (milliseconds).
pub const JOB_POLL_INTERVAL_MS: u64 = 500;

/// Maximum concurrent jobs per worker.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Per-job execution timeout in seconds.
pub const JOB_TIMEOUT_SECS: u64 = 600;

/// Retry sweeper: only failures younger than this are re-armed (seconds).
pub const RETRY_MAX_AGE_SECS: u64 = 3600;

/// Retry sweeper scan interval (seconds).
pub const RETRY_SCAN_INTERVAL_SECS: u64 = 60;

/// Capacity of the worker event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// VERSIONING
// =============================================================================

/// Actor recorded on system-created versions (restores).
pub const SYSTEM_ACTOR: &str = "system";

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for list endpoints.
pub const PAGE_LIMIT: i64 = 50;

/// Default page offset.
pub const PAGE_OFFSET: i64 = 0;
