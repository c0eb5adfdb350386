use std::io::Write;
use std::sync::Arc;
use tokio::time::Duration;

use githubsky_poster::config::PostSettings;
use githubsky_poster::database::{Database, GithubLink};
use githubsky_poster::errors::PostError;
use githubsky_poster::image_processor;
use githubsky_poster::runner::{build_jobs, parse_manifest};
use githubsky_poster::security::{InputValidator, SessionCredential};
use githubsky_poster::uploader::{BskyClient, Dispatcher, PostOutcome};

// Integration tests for the runner side of githubsky-poster
// These tests verify that manifest, database and image loading work together

fn create_minimal_png() -> Vec<u8> {
    vec![
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // PNG signature
        0x00, 0x00, 0x00, 0x0D, // IHDR chunk length
        0x49, 0x48, 0x44, 0x52, // IHDR
        0x00, 0x00, 0x00, 0x01, // width = 1
        0x00, 0x00, 0x00, 0x01, // height = 1
        0x08, 0x02, 0x00, 0x00, 0x00, // bit depth = 8, color type = 2 (RGB)
        0x90, 0x77, 0x53, 0xDE, // IHDR CRC
        0x00, 0x00, 0x00, 0x00, // IEND chunk length
        0x49, 0x45, 0x4E, 0x44, // IEND
        0xAE, 0x42, 0x60, 0x82, // IEND CRC
    ]
}

#[tokio::test]
async fn test_manifest_to_jobs_workflow() {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let linked = db
        .upsert_account(
            &SessionCredential::new("did:plc:alice", "pw"),
            None,
            &GithubLink::Name {
                github_name: "alice".to_string(),
            },
        )
        .await
        .unwrap();
    let github_missing = db
        .upsert_account(
            &SessionCredential::new("did:plc:bob", "pw"),
            Some("https://pds.example.com"),
            &GithubLink::None,
        )
        .await
        .unwrap();

    let mut image = tempfile::NamedTempFile::new().unwrap();
    image.write_all(&create_minimal_png()).unwrap();

    let manifest = serde_json::json!([
        { "account_id": linked, "commit_count": 5, "image_path": image.path() },
        { "account_id": github_missing, "commit_count": 1 },
        { "account_id": 999, "commit_count": 1 }
    ])
    .to_string();

    let jobs = build_jobs(&db, parse_manifest(&manifest).unwrap())
        .await
        .unwrap();

    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.job_id, linked);
    assert_eq!(job.github_name, "alice");
    assert_eq!(
        job.image
            .as_ref()
            .ok()
            .and_then(|i| i.as_ref())
            .map(|i| i.mime_type.as_str()),
        Some("image/png")
    );
}

#[tokio::test]
async fn test_missing_image_file_yields_job_without_image() {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let id = db
        .upsert_account(
            &SessionCredential::new("did:plc:alice", "pw"),
            None,
            &GithubLink::OAuth {
                github_name: "alice".to_string(),
            },
        )
        .await
        .unwrap();

    let manifest = serde_json::json!([
        { "account_id": id, "commit_count": "3", "image_path": "/definitely/not/here.png" }
    ])
    .to_string();

    let jobs = build_jobs(&db, parse_manifest(&manifest).unwrap())
        .await
        .unwrap();
    assert_eq!(jobs.len(), 1);
    assert!(matches!(jobs[0].image, Ok(None)));
}

#[tokio::test]
async fn test_corrupt_image_is_client_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"this is not an image").unwrap();

    let err = image_processor::load_image_blob(file.path())
        .await
        .unwrap_err();
    assert!(err.is_client_error());
}

#[tokio::test]
async fn test_corrupt_image_fails_job_as_client_error() {
    let db = Arc::new(Database::connect("sqlite::memory:").await.unwrap());
    let id = db
        .upsert_account(
            &SessionCredential::new("did:plc:alice", "pw"),
            None,
            &GithubLink::Name {
                github_name: "alice".to_string(),
            },
        )
        .await
        .unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"this is not an image").unwrap();

    let manifest = serde_json::json!([
        { "account_id": id, "commit_count": 4, "image_path": file.path() }
    ])
    .to_string();

    let mut jobs = build_jobs(&db, parse_manifest(&manifest).unwrap())
        .await
        .unwrap();
    assert_eq!(jobs.len(), 1);
    match &jobs[0].image {
        Err(e) => assert!(e.is_client_error()),
        other => panic!("expected image error, got {:?}", other),
    }

    // The job fails on its image before any request is made.
    let client = BskyClient::new(Duration::from_secs(1)).unwrap();
    let dispatcher = Dispatcher::new(
        Arc::new(client),
        db.clone(),
        db.clone(),
        PostSettings::default(),
    );
    let outcome = dispatcher.run(jobs.remove(0)).await;

    match outcome {
        PostOutcome::Failure {
            message,
            is_client_error,
            ..
        } => {
            assert!(is_client_error);
            assert!(message.contains("Invalid image"));
        }
        other => panic!("expected failure, got {:?}", other),
    }

    let logs = db.recent_logs(5).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].contains("Invalid image"));
    assert!(!logs[0].contains("image missing"));
    assert_eq!(db.get_account(id).await.unwrap().fail_count, 1);
}

#[test]
fn test_credential_validation_integration() {
    let good = SessionCredential::new("alice.bsky.social", "abcd-efgh-ijkl-mnop");
    assert!(InputValidator::validate_credential(&good).is_ok());

    let empty_secret = SessionCredential::new("alice.bsky.social", "");
    match InputValidator::validate_credential(&empty_secret) {
        Err(PostError::Client { message, .. }) => assert!(message.contains("password")),
        other => panic!("unexpected result: {:?}", other),
    }
}
