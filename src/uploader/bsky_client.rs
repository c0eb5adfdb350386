use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Duration;

use crate::errors::{AppResult, PostError, PostResult};
use crate::security::SessionCredential;

use super::facets::Facet;

pub const POST_COLLECTION: &str = "app.bsky.feed.post";
const EXTERNAL_EMBED_TYPE: &str = "app.bsky.embed.external";

/// Authenticated session returned by `login`.
#[derive(Clone)]
pub struct Session {
    pub service: String,
    pub did: String,
    pub handle: String,
    pub access_jwt: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("service", &self.service)
            .field("did", &self.did)
            .field("handle", &self.handle)
            .field("access_jwt", &"<redacted>")
            .finish()
    }
}

/// Reference to an uploaded blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    pub content_ref: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidLink {
    #[serde(rename = "$link")]
    pub link: String,
}

/// Blob as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobRef {
    #[serde(rename = "$type")]
    pub blob_type: String,
    #[serde(rename = "ref")]
    pub cid: CidLink,
    pub mime_type: String,
    pub size: u64,
}

impl From<&AttachmentRef> for BlobRef {
    fn from(attachment: &AttachmentRef) -> Self {
        Self {
            blob_type: "blob".to_string(),
            cid: CidLink {
                link: attachment.content_ref.clone(),
            },
            mime_type: attachment.mime_type.clone(),
            size: attachment.size_bytes,
        }
    }
}

impl From<BlobRef> for AttachmentRef {
    fn from(blob: BlobRef) -> Self {
        Self {
            content_ref: blob.cid.link,
            mime_type: blob.mime_type,
            size_bytes: blob.size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct External {
    pub uri: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb: Option<BlobRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalEmbed {
    #[serde(rename = "$type")]
    pub embed_type: String,
    pub external: External,
}

impl ExternalEmbed {
    pub fn with_thumbnail(uri: &str, title: &str, thumb: &AttachmentRef) -> Self {
        Self {
            embed_type: EXTERNAL_EMBED_TYPE.to_string(),
            external: External {
                uri: uri.to_string(),
                title: title.to_string(),
                description: String::new(),
                thumb: Some(BlobRef::from(thumb)),
            },
        }
    }
}

/// `app.bsky.feed.post` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(rename = "$type")]
    pub record_type: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<Facet>,
    pub langs: Vec<String>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<ExternalEmbed>,
}

/// Identifies the created post.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PostRef {
    pub uri: String,
    pub cid: String,
}

/// Operations the dispatch pipeline needs from the social service.
#[async_trait]
pub trait SocialClient: Send + Sync {
    async fn login(&self, service: &str, credential: &SessionCredential) -> PostResult<Session>;

    async fn upload_blob(
        &self,
        session: &Session,
        data: Vec<u8>,
        mime_type: &str,
    ) -> PostResult<AttachmentRef>;

    async fn create_post(&self, session: &Session, record: &PostRecord) -> PostResult<PostRef>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    access_jwt: String,
    did: String,
    handle: String,
}

#[derive(Debug, Deserialize)]
struct UploadBlobResponse {
    blob: BlobRef,
}

#[derive(Debug, Default, Deserialize)]
struct XrpcErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Map a non-success XRPC status to the pipeline taxonomy.
///
/// 4xx is caller-attributable except timeouts, rate limiting and expired tokens.
pub fn classify_status(status: StatusCode, error_code: Option<&str>, message: String) -> PostError {
    let environmental = matches!(
        status,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS
    ) || error_code == Some("ExpiredToken");

    if status.is_client_error() && !environmental {
        PostError::client(message)
    } else {
        PostError::server(message)
    }
}

/// XRPC client for Bluesky-compatible PDS endpoints.
pub struct BskyClient {
    client: Client,
}

impl BskyClient {
    pub fn new(timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("githubsky-poster/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    fn xrpc_url(service: &str, nsid: &str) -> String {
        format!("{}/xrpc/{}", service.trim_end_matches('/'), nsid)
    }

    async fn check_response(response: Response, action: &str) -> PostResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let parsed: XrpcErrorBody = serde_json::from_str(&body).unwrap_or_default();
        let detail = parsed
            .message
            .clone()
            .or_else(|| parsed.error.clone())
            .unwrap_or(body);

        log::debug!("{} failed with status {}: {}", action, status, detail);
        Err(classify_status(
            status,
            parsed.error.as_deref(),
            format!("{} failed ({}): {}", action, status, detail),
        ))
    }
}

#[async_trait]
impl SocialClient for BskyClient {
    async fn login(&self, service: &str, credential: &SessionCredential) -> PostResult<Session> {
        let url = Self::xrpc_url(service, "com.atproto.server.createSession");
        log::debug!("Creating session for {} at {}", credential.identifier, service);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "identifier": credential.identifier,
                "password": credential.secret,
            }))
            .send()
            .await?;

        let response = Self::check_response(response, "Login").await?;
        let session: CreateSessionResponse = response.json().await?;

        Ok(Session {
            service: service.trim_end_matches('/').to_string(),
            did: session.did,
            handle: session.handle,
            access_jwt: session.access_jwt,
        })
    }

    async fn upload_blob(
        &self,
        session: &Session,
        data: Vec<u8>,
        mime_type: &str,
    ) -> PostResult<AttachmentRef> {
        let url = Self::xrpc_url(&session.service, "com.atproto.repo.uploadBlob");
        log::debug!("Uploading {} byte blob ({})", data.len(), mime_type);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&session.access_jwt)
            .header(header::CONTENT_TYPE, mime_type)
            .body(data)
            .send()
            .await?;

        let response = Self::check_response(response, "Blob upload").await?;
        let uploaded: UploadBlobResponse = response.json().await?;
        Ok(uploaded.blob.into())
    }

    async fn create_post(&self, session: &Session, record: &PostRecord) -> PostResult<PostRef> {
        let url = Self::xrpc_url(&session.service, "com.atproto.repo.createRecord");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&session.access_jwt)
            .json(&serde_json::json!({
                "repo": session.did,
                "collection": POST_COLLECTION,
                "record": record,
            }))
            .send()
            .await?;

        let response = Self::check_response(response, "Create post").await?;
        let post: PostRef = response.json().await?;
        log::debug!("Created post {}", post.uri);
        Ok(post)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::BAD_REQUEST, None, "x".into()).is_client_error());
        assert!(classify_status(StatusCode::UNAUTHORIZED, Some("AuthenticationRequired"), "x".into())
            .is_client_error());
        assert!(!classify_status(StatusCode::UNAUTHORIZED, Some("ExpiredToken"), "x".into())
            .is_client_error());
        assert!(!classify_status(StatusCode::TOO_MANY_REQUESTS, None, "x".into()).is_client_error());
        assert!(!classify_status(StatusCode::BAD_GATEWAY, None, "x".into()).is_client_error());
    }

    #[test]
    fn test_xrpc_url_trims_slash() {
        assert_eq!(
            BskyClient::xrpc_url("https://bsky.social/", "com.atproto.server.createSession"),
            "https://bsky.social/xrpc/com.atproto.server.createSession"
        );
    }

    #[test]
    fn test_embed_wire_shape() {
        let attachment = AttachmentRef {
            content_ref: "bafkrei".to_string(),
            mime_type: "image/png".to_string(),
            size_bytes: 100,
        };
        let embed = ExternalEmbed::with_thumbnail("https://githubsky.vercel.app/", "Githubsky", &attachment);
        let json = serde_json::to_value(&embed).unwrap();

        assert_eq!(json["$type"], "app.bsky.embed.external");
        assert_eq!(json["external"]["uri"], "https://githubsky.vercel.app/");
        assert_eq!(json["external"]["description"], "");
        assert_eq!(json["external"]["thumb"]["$type"], "blob");
        assert_eq!(json["external"]["thumb"]["ref"]["$link"], "bafkrei");
        assert_eq!(json["external"]["thumb"]["mimeType"], "image/png");
        assert_eq!(json["external"]["thumb"]["size"], 100);
    }

    #[test]
    fn test_session_debug_redacts_token() {
        let session = Session {
            service: "https://bsky.social".to_string(),
            did: "did:plc:abc".to_string(),
            handle: "alice.bsky.social".to_string(),
            access_jwt: "secret-token".to_string(),
        };
        assert!(!format!("{:?}", session).contains("secret-token"));
    }
}
