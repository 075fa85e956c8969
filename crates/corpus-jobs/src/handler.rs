//! Job handlers for each job type.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use corpus_core::{Job, JobType};

/// Progress callback type for job handlers.
pub type ProgressCallback = Box<dyn Fn(i32, Option<&str>) + Send + Sync>;

/// Context provided to job handlers.
pub struct JobContext {
    /// The job being processed.
    pub job: Job,
    /// Progress callback for updating job progress.
    progress_callback: Option<ProgressCallback>,
}

impl JobContext {
    /// Create a new job context.
    pub fn new(job: Job) -> Self {
        Self {
            job,
            progress_callback: None,
        }
    }

    /// Set the progress callback.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(i32, Option<&str>) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Report progress to the callback.
    pub fn report_progress(&self, percent: i32, message: Option<&str>) {
        if let Some(ref callback) = self.progress_callback {
            callback(percent, message);
        }
    }

    /// Get the chunk ID for this job, if any.
    pub fn chunk_id(&self) -> Option<Uuid> {
        self.job.chunk_id
    }

    /// Get the document ID for this job, if any.
    pub fn document_id(&self) -> Option<Uuid> {
        self.job.document_id
    }

    /// Get the job payload.
    pub fn payload(&self) -> Option<&JsonValue> {
        self.job.payload.as_ref()
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum JobResult {
    /// Job completed successfully with optional result data.
    Success(Option<JsonValue>),
    /// Job failed with an error message.
    Failed(String),
}

/// Trait for job handlers.
///
/// Handlers must be idempotent. Jobs are delivered at least once, may run
/// after the chunk has changed again, and may be swept back in as retries.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type this handler processes.
    fn job_type(&self) -> JobType;

    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobResult;

    /// Check if this handler can process the given job type.
    fn can_handle(&self, job_type: JobType) -> bool {
        self.job_type() == job_type
    }
}

/// No-op handler for testing.
pub struct NoOpHandler {
    job_type: JobType,
}

impl NoOpHandler {
    /// Create a new no-op handler for the given job type.
    pub fn new(job_type: JobType) -> Self {
        Self { job_type }
    }
}

#[async_trait]
impl JobHandler for NoOpHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        ctx.report_progress(50, Some("Processing..."));
        ctx.report_progress(100, Some("Done"));
        JobResult::Success(None)
    }
}

#[cfg(test)]
pub(crate) fn test_job(job_type: JobType) -> Job {
    Job {
        id: Uuid::new_v4(),
        chunk_id: None,
        document_id: None,
        job_type,
        status: corpus_core::JobStatus::Pending,
        priority: 0,
        payload: None,
        result: None,
        error_message: None,
        progress_percent: 0,
        progress_message: None,
        retry_count: 0,
        max_retries: 3,
        created_at: chrono::Utc::now(),
        started_at: None,
        completed_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_context_chunk_id() {
        let mut job = test_job(JobType::Reindex);
        job.chunk_id = Some(Uuid::new_v4());

        let ctx = JobContext::new(job.clone());
        assert_eq!(ctx.chunk_id(), job.chunk_id);
        assert!(ctx.document_id().is_none());
    }

    #[test]
    fn test_job_context_payload() {
        use serde_json::json;

        let mut job = test_job(JobType::Reindex);
        job.payload = Some(json!({"force": true}));

        let ctx = JobContext::new(job);
        assert_eq!(ctx.payload().unwrap()["force"], true);
    }

    #[test]
    fn test_job_context_report_progress_no_callback() {
        let ctx = JobContext::new(test_job(JobType::Vectorize));
        // Should not panic
        ctx.report_progress(50, Some("test"));
        ctx.report_progress(100, None);
    }

    #[test]
    fn test_job_context_with_progress_callback() {
        use std::sync::{Arc, Mutex};

        let progress_log = Arc::new(Mutex::new(Vec::new()));
        let progress_log_clone = progress_log.clone();

        let ctx = JobContext::new(test_job(JobType::Vectorize)).with_progress_callback(
            move |percent, message| {
                progress_log_clone
                    .lock()
                    .unwrap()
                    .push((percent, message.map(String::from)));
            },
        );

        ctx.report_progress(25, Some("Starting"));
        ctx.report_progress(100, None);

        let log = progress_log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], (25, Some("Starting".to_string())));
        assert_eq!(log[1], (100, None));
    }

    #[tokio::test]
    async fn test_noop_handler() {
        let handler = NoOpHandler::new(JobType::Vectorize);
        assert_eq!(handler.job_type(), JobType::Vectorize);
        assert!(handler.can_handle(JobType::Vectorize));
        assert!(!handler.can_handle(JobType::Reindex));

        let ctx = JobContext::new(test_job(JobType::Vectorize));
        let result = handler.execute(ctx).await;
        assert!(matches!(result, JobResult::Success(None)));
    }

    #[tokio::test]
    async fn test_noop_handler_reports_progress() {
        use std::sync::{Arc, Mutex};

        let handler = NoOpHandler::new(JobType::Ocr);
        let progress_log = Arc::new(Mutex::new(Vec::new()));
        let progress_log_clone = progress_log.clone();

        let ctx = JobContext::new(test_job(JobType::Ocr)).with_progress_callback(
            move |percent, _| {
                progress_log_clone.lock().unwrap().push(percent);
            },
        );

        let result = handler.execute(ctx).await;
        assert!(matches!(result, JobResult::Success(None)));
        assert_eq!(*progress_log.lock().unwrap(), vec![50, 100]);
    }
}
