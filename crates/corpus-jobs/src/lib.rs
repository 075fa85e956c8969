//! # corpus-jobs
//!
//! Background job queue system for corpus.
//!
//! This crate provides:
//! - Priority-based job claiming with concurrent workers
//! - Progress tracking and notifications via broadcast channels
//! - Sweep-based retry of failed jobs with an attempt cap
//! - Handlers for chunk reindexing and vectorization
//!
//! ## Example
//!
//! ```ignore
//! use corpus_jobs::{WorkerBuilder, WorkerConfig, NoOpHandler, RetryPolicy, RetrySweeper};
//! use corpus_db::Database;
//! use corpus_core::JobType;
//!
//! let db = Database::connect("postgres://...").await?;
//!
//! // Create worker with handlers
//! let worker = WorkerBuilder::new(db.clone())
//!     .with_config(WorkerConfig::from_env())
//!     .with_handler(NoOpHandler::new(JobType::Reindex))
//!     .build()
//!     .await;
//!
//! let handle = worker.start();
//!
//! // Sweep failures back into the queue
//! let sweeper = RetrySweeper::new(db, RetryPolicy::from_env()).start();
//!
//! // Graceful shutdown
//! handle.shutdown().await?;
//! sweeper.shutdown().await?;
//! ```

pub mod handler;
pub mod reindex;
pub mod retry;
pub mod worker;

// Re-export core types
pub use corpus_core::*;

// Re-export job types
pub use handler::{JobContext, JobHandler, JobResult, NoOpHandler};
pub use reindex::{ReindexHandler, VectorizeHandler};
pub use retry::{RetryPolicy, RetrySweeper, SweeperHandle};
pub use worker::{JobWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};

/// Default maximum retries for failed jobs.
pub const DEFAULT_MAX_RETRIES: i32 = corpus_core::defaults::JOB_MAX_RETRIES;

/// Default polling interval for job processing (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = corpus_core::defaults::JOB_POLL_INTERVAL_MS;
