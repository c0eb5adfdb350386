use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::PostSettings;
use crate::errors::{PostError, PostResult};
use crate::image_processor::ImageBlob;
use crate::security::{InputValidator, SessionCredential};

use super::bsky_client::{AttachmentRef, ExternalEmbed, PostRecord, PostRef, SocialClient};
use super::composer::{compose_message, CommitCount, ComposedMessage};
use super::outcome::{record_outcome, JobState, LogSink, OutcomeStore, PostOutcome};

/// One daily post for one linked account.
#[derive(Debug, Clone)]
pub struct PostJob {
    pub job_id: i64,
    pub credential: SessionCredential,
    /// Overrides the default service endpoint (self-hosted PDS).
    pub service_endpoint: Option<String>,
    pub commit_count: CommitCount,
    pub github_name: String,
    pub failure_count: u32,
    /// The rendered image. `Ok(None)` when none was produced, `Err` when the
    /// file exists but could not be used.
    pub image: PostResult<Option<ImageBlob>>,
}

pub fn build_post_record(
    message: &ComposedMessage,
    settings: &PostSettings,
    attachment: Option<&AttachmentRef>,
    created_at: DateTime<Utc>,
) -> PostRecord {
    PostRecord {
        record_type: super::bsky_client::POST_COLLECTION.to_string(),
        text: message.text.clone(),
        facets: message.facets.clone(),
        langs: vec![settings.language.clone()],
        created_at: created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        embed: attachment.map(|thumb| {
            ExternalEmbed::with_thumbnail(&settings.landing_page_uri, &settings.embed_title, thumb)
        }),
    }
}

/// Runs post jobs against injected collaborators.
#[derive(Clone)]
pub struct Dispatcher {
    client: Arc<dyn SocialClient>,
    store: Arc<dyn OutcomeStore>,
    sink: Arc<dyn LogSink>,
    settings: PostSettings,
}

impl Dispatcher {
    pub fn new(
        client: Arc<dyn SocialClient>,
        store: Arc<dyn OutcomeStore>,
        sink: Arc<dyn LogSink>,
        settings: PostSettings,
    ) -> Self {
        Self {
            client,
            store,
            sink,
            settings,
        }
    }

    pub fn settings(&self) -> &PostSettings {
        &self.settings
    }

    /// Run one job to its terminal outcome. Never fails.
    pub async fn run(&self, job: PostJob) -> PostOutcome {
        let job_id = job.job_id;
        let failure_count = job.failure_count;
        let identifier = job.credential.identifier.clone();

        log::debug!("Job {} is {}", job_id, JobState::Pending);
        let result = self.attempt(job).await;

        let outcome = record_outcome(
            result,
            job_id,
            &identifier,
            failure_count,
            self.store.as_ref(),
            self.sink.as_ref(),
        )
        .await;
        log::debug!("Job {} is {}", job_id, outcome.state());
        outcome
    }

    async fn attempt(&self, job: PostJob) -> PostResult<PostRef> {
        InputValidator::validate_github_name(&job.github_name)?;
        job.commit_count.validate()?;
        let message = compose_message(&job.commit_count, &job.github_name, &self.settings.hashtag);

        // No text-only fallback: a job without its image is a failed job.
        let image = job.image?.ok_or(PostError::MissingImage)?;

        InputValidator::validate_credential(&job.credential)?;
        let service = job
            .service_endpoint
            .as_deref()
            .unwrap_or(&self.settings.default_service);
        InputValidator::validate_service_endpoint(service)?;

        let session = self.client.login(service, &job.credential).await?;

        log::debug!("Job {} is {}", job.job_id, JobState::Uploading);
        let ImageBlob { data, mime_type } = image;
        let attachment = self.client.upload_blob(&session, data, &mime_type).await?;

        log::debug!("Job {} is {}", job.job_id, JobState::Submitting);
        let record = build_post_record(&message, &self.settings, Some(&attachment), Utc::now());
        self.client.create_post(&session, &record).await
    }

    /// Run independent jobs concurrently, bounded by `max_concurrent_jobs`.
    /// Outcomes are returned ordered by job id.
    pub async fn run_all(&self, jobs: Vec<PostJob>) -> Vec<PostOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_jobs.max(1)));
        let mut tasks = JoinSet::new();

        log::info!("Dispatching {} post jobs", jobs.len());

        for job in jobs {
            let dispatcher = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                dispatcher.run(job).await
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => log::error!("Post job task aborted: {}", e),
            }
        }

        outcomes.sort_by_key(PostOutcome::job_id);
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_without_attachment_has_no_embed() {
        let message = compose_message(&CommitCount::from(3), "alice", "#Githubsky");
        let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let record = build_post_record(&message, &PostSettings::default(), None, created_at);

        assert!(record.embed.is_none());
        assert_eq!(record.langs, vec!["ja".to_string()]);
        assert_eq!(record.created_at, "2024-05-01T09:00:00.000Z");
        assert_eq!(record.record_type, "app.bsky.feed.post");
        assert_eq!(record.facets, message.facets);
    }

    #[test]
    fn test_record_with_attachment_targets_landing_page() {
        let message = compose_message(&CommitCount::from(3), "alice", "#Githubsky");
        let attachment = AttachmentRef {
            content_ref: "r1".to_string(),
            mime_type: "image/png".to_string(),
            size_bytes: 100,
        };
        let record = build_post_record(
            &message,
            &PostSettings::default(),
            Some(&attachment),
            Utc::now(),
        );

        let embed = record.embed.expect("embed");
        assert_eq!(embed.external.uri, "https://githubsky.vercel.app/");
        assert_eq!(embed.external.title, "Githubsky");
        let thumb = embed.external.thumb.expect("thumb");
        assert_eq!(thumb.cid.link, "r1");
        assert_eq!(thumb.size, 100);
    }
}
