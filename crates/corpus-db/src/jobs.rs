//! Job queue repository.
//!
//! Every state transition is a guarded UPDATE whose WHERE clause mirrors
//! [`JobStatus::permits`]. A transition rejected by the guard (completing an
//! already-terminal job, finishing work revoked mid-flight) is logged at
//! WARN and ignored rather than raised: job runners are best-effort and must
//! not crash the worker loop.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use corpus_core::{
    new_v7, Error, Job, JobRepository, JobStatus, JobType, QueueStats, Result,
};

/// PostgreSQL implementation of [`JobRepository`].
#[derive(Clone)]
pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    /// Create a new job repository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Convert JobType to string for database.
    fn job_type_to_str(job_type: JobType) -> &'static str {
        match job_type {
            JobType::Vectorize => "vectorize",
            JobType::Reindex => "reindex",
            JobType::Ocr => "ocr",
            JobType::Reprocess => "reprocess",
        }
    }

    /// Convert string from database to JobType.
    fn str_to_job_type(s: &str) -> JobType {
        match s {
            "vectorize" => JobType::Vectorize,
            "reindex" => JobType::Reindex,
            "ocr" => JobType::Ocr,
            "reprocess" => JobType::Reprocess,
            _ => JobType::Reprocess, // fallback
        }
    }

    /// Convert JobStatus to string for database.
    fn job_status_to_str(status: JobStatus) -> &'static str {
        match status {
            JobStatus::Pending => "pending",
            JobStatus::Started => "started",
            JobStatus::Success => "success",
            JobStatus::Failure => "failure",
            JobStatus::Retry => "retry",
            JobStatus::Revoked => "revoked",
        }
    }

    /// Convert string from database to JobStatus.
    fn str_to_job_status(s: &str) -> JobStatus {
        match s {
            "pending" => JobStatus::Pending,
            "started" => JobStatus::Started,
            "success" => JobStatus::Success,
            "failure" => JobStatus::Failure,
            "retry" => JobStatus::Retry,
            "revoked" => JobStatus::Revoked,
            _ => JobStatus::Pending, // fallback
        }
    }

    /// Parse a job row into a Job struct.
    fn parse_job_row(row: sqlx::postgres::PgRow) -> Job {
        Job {
            id: row.get("id"),
            chunk_id: row.get("chunk_id"),
            document_id: row.get("document_id"),
            job_type: Self::str_to_job_type(row.get("job_type")),
            status: Self::str_to_job_status(row.get("status")),
            priority: row.get("priority"),
            payload: row.get("payload"),
            result: row.get("result"),
            error_message: row.get("error_message"),
            progress_percent: row.get("progress_percent"),
            progress_message: row.get("progress_message"),
            retry_count: row.get("retry_count"),
            max_retries: row.get("max_retries"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        }
    }

    const RETURNING_COLUMNS: &'static str =
        "id, chunk_id, document_id, job_type::text AS job_type, status::text AS status,
         priority, payload, result, error_message, progress_percent, progress_message,
         retry_count, max_retries, created_at, started_at, completed_at";
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn queue(
        &self,
        chunk_id: Option<Uuid>,
        document_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Uuid> {
        let job_id = new_v7();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO job_queue (id, chunk_id, document_id, job_type, status, priority, payload, max_retries, created_at)
             VALUES ($1, $2, $3, $4::job_type, 'pending'::job_status, $5, $6, $7, $8)",
        )
        .bind(job_id)
        .bind(chunk_id)
        .bind(document_id)
        .bind(Self::job_type_to_str(job_type))
        .bind(priority)
        .bind(&payload)
        .bind(corpus_core::defaults::JOB_MAX_RETRIES)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(job_id = %job_id, job_type = ?job_type, "Job queued");
        Ok(job_id)
    }

    async fn queue_deduplicated(
        &self,
        chunk_id: Option<Uuid>,
        document_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Option<Uuid>> {
        // Atomic check-and-insert to prevent TOCTOU races when concurrent
        // edits try to queue the same reprocessing job. Only deduplicates
        // when chunk_id is present.
        let Some(cid) = chunk_id else {
            let job_id = self
                .queue(chunk_id, document_id, job_type, priority, payload)
                .await?;
            return Ok(Some(job_id));
        };

        let job_id = new_v7();
        let now = Utc::now();

        let result = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO job_queue (id, chunk_id, document_id, job_type, status, priority, payload, max_retries, created_at)
             SELECT $1, $2, $3, $4::job_type, 'pending'::job_status, $5, $6, $7, $8
             WHERE NOT EXISTS (
                 SELECT 1 FROM job_queue
                 WHERE chunk_id = $2 AND job_type = $4::job_type
                   AND status IN ('pending'::job_status, 'started'::job_status, 'retry'::job_status)
             )
             RETURNING id",
        )
        .bind(job_id)
        .bind(cid)
        .bind(document_id)
        .bind(Self::job_type_to_str(job_type))
        .bind(priority)
        .bind(&payload)
        .bind(corpus_core::defaults::JOB_MAX_RETRIES)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result)
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        self.claim_next_for_types(&[]).await
    }

    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>> {
        let now = Utc::now();
        let type_strings: Vec<String> = job_types
            .iter()
            .map(|jt| Self::job_type_to_str(*jt).to_string())
            .collect();

        // FOR UPDATE SKIP LOCKED allows concurrent workers to claim without
        // blocking each other. `retry` is claimable like `pending`.
        let query = format!(
            "UPDATE job_queue
             SET status = 'started'::job_status, started_at = $1
             WHERE id = (
                 SELECT id FROM job_queue
                 WHERE status IN ('pending'::job_status, 'retry'::job_status)
                   AND (cardinality($2::text[]) = 0 OR job_type::text = ANY($2))
                 ORDER BY priority DESC, created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {}",
            Self::RETURNING_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(now)
            .bind(&type_strings)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_job_row))
    }

    async fn update_progress(
        &self,
        job_id: Uuid,
        percent: i32,
        message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE job_queue SET progress_percent = $1, progress_message = $2
             WHERE id = $3 AND status = 'started'::job_status",
        )
        .bind(percent)
        .bind(message)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()> {
        let now = Utc::now();

        // Guard mirrors JobStatus::permits(Started -> Success). If the job
        // was revoked (or already terminal) this write is ignored.
        let updated = sqlx::query(
            "UPDATE job_queue
             SET status = 'success'::job_status, completed_at = $1, result = $2,
                 progress_percent = 100
             WHERE id = $3 AND status = 'started'::job_status",
        )
        .bind(now)
        .bind(&result)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if updated.rows_affected() == 0 {
            warn!(job_id = %job_id, "Ignored illegal transition to success");
        }
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        let now = Utc::now();

        // Each failure counts against the retry cap.
        let updated = sqlx::query(
            "UPDATE job_queue
             SET status = 'failure'::job_status, completed_at = $1, error_message = $2,
                 retry_count = retry_count + 1
             WHERE id = $3 AND status = 'started'::job_status",
        )
        .bind(now)
        .bind(error)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if updated.rows_affected() == 0 {
            warn!(job_id = %job_id, "Ignored illegal transition to failure");
        }
        Ok(())
    }

    async fn revoke(&self, job_id: Uuid) -> Result<()> {
        let now = Utc::now();

        let updated = sqlx::query(
            "UPDATE job_queue
             SET status = 'revoked'::job_status, completed_at = $1
             WHERE id = $2 AND status IN ('pending'::job_status, 'started'::job_status, 'retry'::job_status)",
        )
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if updated.rows_affected() == 0 {
            warn!(job_id = %job_id, "Ignored revoke of terminal job");
        }
        Ok(())
    }

    async fn requeue_failed(&self, max_age_secs: i64, attempt_cap: i32) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::seconds(max_age_secs);

        // retry_count already holds the number of recorded failures (`fail`
        // increments it), so a job at the cap stays in failure.
        let result = sqlx::query(
            "UPDATE job_queue
             SET status = 'retry'::job_status,
                 started_at = NULL, completed_at = NULL,
                 progress_percent = 0, progress_message = NULL
             WHERE status = 'failure'::job_status
               AND completed_at > $1
               AND retry_count < $2",
        )
        .bind(cutoff)
        .bind(attempt_cap)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let count = result.rows_affected();
        if count > 0 {
            debug!(job_count = count, "Re-armed failed jobs for retry");
        }
        Ok(count)
    }

    async fn list_exhausted(&self, attempt_cap: i32, limit: i64) -> Result<Vec<Job>> {
        let query = format!(
            "SELECT {} FROM job_queue
             WHERE status = 'failure'::job_status AND retry_count >= $1
             ORDER BY completed_at DESC
             LIMIT $2",
            Self::RETURNING_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(attempt_cap)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_job_row).collect())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let query = format!(
            "SELECT {} FROM job_queue WHERE id = $1",
            Self::RETURNING_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_job_row))
    }

    async fn get_for_chunk(&self, chunk_id: Uuid) -> Result<Vec<Job>> {
        let query = format!(
            "SELECT {} FROM job_queue WHERE chunk_id = $1 ORDER BY created_at DESC",
            Self::RETURNING_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(chunk_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_job_row).collect())
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM job_queue
             WHERE status IN ('pending'::job_status, 'retry'::job_status)",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(count)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Job>> {
        let query = format!(
            "SELECT {} FROM job_queue ORDER BY created_at DESC LIMIT $1",
            Self::RETURNING_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_job_row).collect())
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) FILTER (WHERE status = 'pending' OR status = 'retry') as pending,
                COUNT(*) FILTER (WHERE status = 'started') as started,
                COUNT(*) FILTER (WHERE status = 'success' AND completed_at > NOW() - INTERVAL '1 hour') as succeeded_last_hour,
                COUNT(*) FILTER (WHERE status = 'failure' AND completed_at > NOW() - INTERVAL '1 hour') as failed_last_hour,
                COUNT(*) as total
             FROM job_queue",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueStats {
            pending: row.get::<i64, _>("pending"),
            started: row.get::<i64, _>("started"),
            succeeded_last_hour: row.get::<i64, _>("succeeded_last_hour"),
            failed_last_hour: row.get::<i64, _>("failed_last_hour"),
            total: row.get::<i64, _>("total"),
        })
    }

    async fn cleanup(&self, keep_count: i64) -> Result<i64> {
        let result = sqlx::query(
            "DELETE FROM job_queue
             WHERE id NOT IN (
                 SELECT id FROM job_queue
                 ORDER BY
                     CASE WHEN status IN ('pending', 'started', 'retry') THEN 0 ELSE 1 END,
                     completed_at DESC NULLS LAST
                 LIMIT $1
             )",
        )
        .bind(keep_count)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_type_round_trip() {
        for job_type in [
            JobType::Vectorize,
            JobType::Reindex,
            JobType::Ocr,
            JobType::Reprocess,
        ] {
            let s = PgJobRepository::job_type_to_str(job_type);
            assert_eq!(PgJobRepository::str_to_job_type(s), job_type);
        }
    }

    #[test]
    fn test_str_to_job_type_unknown_fallback() {
        assert_eq!(
            PgJobRepository::str_to_job_type("unknown_type"),
            JobType::Reprocess
        );
        assert_eq!(PgJobRepository::str_to_job_type(""), JobType::Reprocess);
    }

    #[test]
    fn test_job_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Started,
            JobStatus::Success,
            JobStatus::Failure,
            JobStatus::Retry,
            JobStatus::Revoked,
        ] {
            let s = PgJobRepository::job_status_to_str(status);
            assert_eq!(PgJobRepository::str_to_job_status(s), status);
        }
    }

    #[test]
    fn test_str_to_job_status_unknown_fallback() {
        assert_eq!(
            PgJobRepository::str_to_job_status("bogus"),
            JobStatus::Pending
        );
    }

    #[test]
    fn test_job_type_strings_are_unique() {
        let types = [
            JobType::Vectorize,
            JobType::Reindex,
            JobType::Ocr,
            JobType::Reprocess,
        ];
        let mut strings: Vec<&str> = types
            .iter()
            .map(|t| PgJobRepository::job_type_to_str(*t))
            .collect();
        strings.sort();
        strings.dedup();
        assert_eq!(strings.len(), types.len());
    }

    #[test]
    fn test_job_status_strings_are_unique() {
        let statuses = [
            JobStatus::Pending,
            JobStatus::Started,
            JobStatus::Success,
            JobStatus::Failure,
            JobStatus::Retry,
            JobStatus::Revoked,
        ];
        let mut strings: Vec<&str> = statuses
            .iter()
            .map(|s| PgJobRepository::job_status_to_str(*s))
            .collect();
        strings.sort();
        strings.dedup();
        assert_eq!(strings.len(), statuses.len());
    }

    #[test]
    fn test_status_strings_match_serde() {
        // DB strings and the serde representation must agree, since both
        // appear in payloads and log lines.
        for status in [
            JobStatus::Pending,
            JobStatus::Started,
            JobStatus::Success,
            JobStatus::Failure,
            JobStatus::Retry,
            JobStatus::Revoked,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(
                json.trim_matches('"'),
                PgJobRepository::job_status_to_str(status)
            );
        }
    }
}
