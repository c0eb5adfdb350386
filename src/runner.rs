use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::image_processor;
use crate::uploader::{CommitCount, PostJob, PostOutcome};

/// One line of the scheduler's daily manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestEntry {
    pub account_id: i64,
    pub commit_count: CommitCount,
    #[serde(default)]
    pub image_path: Option<PathBuf>,
}

pub fn parse_manifest(manifest: &str) -> AppResult<Vec<ManifestEntry>> {
    let entries: Vec<ManifestEntry> = serde_json::from_str(manifest)?;
    Ok(entries)
}

pub async fn load_manifest(path: &Path) -> AppResult<Vec<ManifestEntry>> {
    let manifest = tokio::fs::read_to_string(path).await?;
    let entries = parse_manifest(&manifest)?;
    log::info!("Loaded {} manifest entries from {}", entries.len(), path.display());
    Ok(entries)
}

/// Resolve manifest entries into post jobs.
///
/// Entries for unknown or not fully linked accounts are skipped. A missing
/// image file leaves the job without one; an undecodable file is carried into
/// the job as its error.
pub async fn build_jobs(db: &Database, entries: Vec<ManifestEntry>) -> AppResult<Vec<PostJob>> {
    let mut jobs = Vec::new();

    for entry in entries {
        let account = match db.get_account(entry.account_id).await {
            Ok(account) => account,
            Err(AppError::AccountNotFound { id }) => {
                log::warn!("Skipping manifest entry for unknown account {}", id);
                continue;
            }
            Err(e) => return Err(e),
        };

        let image = match &entry.image_path {
            Some(path) => image_processor::load_image_blob(path).await,
            None => Ok(None),
        };
        if let Err(e) = &image {
            log::warn!("Unusable image for account {}: {}", account.id, e);
        }

        match account.post_job(entry.commit_count, image) {
            Some(job) => jobs.push(job),
            None => log::warn!("Skipping account {}: not fully linked", account.id),
        }
    }

    Ok(jobs)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[PostOutcome]) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        Self {
            succeeded,
            failed: outcomes.len() - succeeded,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} posted, {} failed", self.succeeded, self.failed)
    }
}
