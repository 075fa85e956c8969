//! Retry sweeper for failed jobs.
//!
//! Failed jobs are not retried inline by the worker. A periodic sweep moves
//! recent failures back to `retry` in a single guarded UPDATE, and workers
//! pick them up like any pending job. Failures older than the age window or
//! past the attempt cap stay in `failure` for manual inspection.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info, warn};

use corpus_core::{defaults, JobRepository, Result};
use corpus_db::Database;

/// Retry policy for the sweeper.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// A job that has failed this many times is no longer re-armed.
    pub attempt_cap: i32,
    /// Only failures younger than this are re-armed.
    pub max_age: Duration,
    /// How often the sweep runs.
    pub scan_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempt_cap: defaults::JOB_MAX_RETRIES,
            max_age: Duration::from_secs(defaults::RETRY_MAX_AGE_SECS),
            scan_interval: Duration::from_secs(defaults::RETRY_SCAN_INTERVAL_SECS),
        }
    }
}

impl RetryPolicy {
    /// Create policy from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_MAX_RETRIES` | `3` | Retry attempts per job |
    /// | `JOB_RETRY_MAX_AGE_SECS` | `3600` | Age window for re-arming failures |
    /// | `JOB_RETRY_SCAN_INTERVAL_SECS` | `60` | Sweep interval |
    pub fn from_env() -> Self {
        let mut policy = Self::default();

        if let Some(cap) = env_parse::<i32>("JOB_MAX_RETRIES") {
            policy.attempt_cap = cap.max(0);
        }
        if let Some(secs) = env_parse::<u64>("JOB_RETRY_MAX_AGE_SECS") {
            policy.max_age = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("JOB_RETRY_SCAN_INTERVAL_SECS") {
            policy.scan_interval = Duration::from_secs(secs.max(1));
        }

        policy
    }

    /// Set the attempt cap.
    pub fn with_attempt_cap(mut self, cap: i32) -> Self {
        self.attempt_cap = cap;
        self
    }

    /// Set the age window.
    pub fn with_max_age(mut self, age: Duration) -> Self {
        self.max_age = age;
        self
    }

    /// Set the scan interval.
    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Handle for controlling a running sweeper.
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| corpus_core::Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }
}

/// Periodic sweep that re-arms recent failures for retry.
pub struct RetrySweeper {
    db: Database,
    policy: RetryPolicy,
}

impl RetrySweeper {
    /// Create a new sweeper.
    pub fn new(db: Database, policy: RetryPolicy) -> Self {
        Self { db, policy }
    }

    /// Start the sweep loop and return a handle for control.
    pub fn start(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        SweeperHandle { shutdown_tx }
    }

    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        info!(
            attempt_cap = self.policy.attempt_cap,
            max_age_secs = self.policy.max_age.as_secs(),
            scan_interval_secs = self.policy.scan_interval.as_secs(),
            "Retry sweeper started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Retry sweeper received shutdown signal");
                    break;
                }
                _ = sleep(self.policy.scan_interval) => {
                    self.sweep_once().await;
                }
            }
        }

        info!("Retry sweeper stopped");
    }

    /// Run a single sweep pass.
    ///
    /// Errors are logged and swallowed so a transient database problem
    /// never kills the loop.
    pub async fn sweep_once(&self) {
        match self
            .db
            .jobs
            .requeue_failed(self.policy.max_age.as_secs() as i64, self.policy.attempt_cap)
            .await
        {
            Ok(0) => {}
            Ok(count) => {
                info!(job_count = count, "Re-armed failed jobs for retry");
            }
            Err(e) => {
                error!(error = ?e, "Retry sweep failed");
                return;
            }
        }

        // Surface exhausted jobs so operators notice them.
        match self.db.jobs.list_exhausted(self.policy.attempt_cap, 10).await {
            Ok(exhausted) if !exhausted.is_empty() => {
                for job in &exhausted {
                    warn!(
                        job_id = %job.id,
                        job_type = ?job.job_type,
                        retry_count = job.retry_count,
                        error = job.error_message.as_deref().unwrap_or("unknown"),
                        "Job exhausted its retries"
                    );
                }
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = ?e, "Failed to list exhausted jobs");
            }
        }
    }
}
