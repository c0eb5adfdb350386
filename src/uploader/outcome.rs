use async_trait::async_trait;
use std::fmt;

use crate::errors::{AppResult, PostError, PostResult};

use super::bsky_client::PostRef;

/// Persistent per-job outcome state.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    async fn record_success(&self, job_id: i64) -> AppResult<()>;

    /// Store `failure_count` as the job's new retry counter.
    async fn record_failure(&self, job_id: i64, failure_count: u32) -> AppResult<()>;
}

/// Diagnostic log destination.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn write(&self, message: &str) -> AppResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Uploading,
    Submitting,
    Succeeded,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Pending => "pending",
            JobState::Uploading => "uploading",
            JobState::Submitting => "submitting",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Terminal state of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    Success {
        job_id: i64,
    },
    Failure {
        job_id: i64,
        failure_count: u32,
        message: String,
        is_client_error: bool,
    },
}

impl PostOutcome {
    pub fn job_id(&self) -> i64 {
        match self {
            PostOutcome::Success { job_id } | PostOutcome::Failure { job_id, .. } => *job_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PostOutcome::Success { .. })
    }

    pub fn state(&self) -> JobState {
        if self.is_success() {
            JobState::Succeeded
        } else {
            JobState::Failed
        }
    }
}

/// Diagnostic line written for a failed job.
pub fn failure_log_message(identifier: &str, error: &PostError) -> String {
    match error {
        PostError::MissingImage => format!("{}: image missing, post skipped", identifier),
        other => format!("{}: post failed\n{}", identifier, other),
    }
}

/// Convert the pipeline result into the job's terminal outcome and persist it.
///
/// Store and sink failures are logged and swallowed; this never returns an error.
pub async fn record_outcome(
    result: PostResult<PostRef>,
    job_id: i64,
    identifier: &str,
    failure_count: u32,
    store: &dyn OutcomeStore,
    sink: &dyn LogSink,
) -> PostOutcome {
    match result {
        Ok(post) => {
            log::info!("Job {} posted {}", job_id, post.uri);
            if let Err(e) = store.record_success(job_id).await {
                log::error!("Failed to record success for job {}: {}", job_id, e);
            }
            PostOutcome::Success { job_id }
        }
        Err(error) => {
            let failure_count = failure_count.saturating_add(1);

            if error.suppresses_log() {
                log::debug!("Job {} failed with a suppressed error", job_id);
            } else if let Err(e) = sink.write(&failure_log_message(identifier, &error)).await {
                log::error!("Failed to write diagnostic log for job {}: {}", job_id, e);
            }

            if let Err(e) = store.record_failure(job_id, failure_count).await {
                log::error!("Failed to record failure for job {}: {}", job_id, e);
            }

            log::warn!(
                "Job {} failed (attempt {}): {}",
                job_id,
                failure_count,
                error
            );

            PostOutcome::Failure {
                job_id,
                failure_count,
                message: error.message(),
                is_client_error: error.is_client_error(),
            }
        }
    }
}
