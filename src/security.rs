use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::errors::{PostError, PostResult};

/// Identifier (DID or handle) plus app password used to open a session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredential {
    pub identifier: String,
    pub secret: String,
}

impl SessionCredential {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

fn github_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9]|-[A-Za-z0-9]){0,38}$")
            .expect("github name pattern is valid")
    })
}

fn handle_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$")
            .expect("handle pattern is valid")
    })
}

pub struct InputValidator;

impl InputValidator {
    /// Accepts a DID (`did:plc:...`, `did:web:...`) or a domain handle.
    pub fn validate_identifier(identifier: &str) -> PostResult<()> {
        let trimmed = identifier.trim();

        if trimmed.is_empty() {
            return Err(PostError::client("Account identifier cannot be empty"));
        }

        if let Some(rest) = trimmed.strip_prefix("did:") {
            let mut parts = rest.splitn(2, ':');
            let method = parts.next().unwrap_or_default();
            let id = parts.next().unwrap_or_default();
            if method.is_empty() || id.is_empty() {
                return Err(PostError::client(format!("Malformed DID: {}", trimmed)));
            }
            return Ok(());
        }

        if trimmed.len() > 253 || !handle_pattern().is_match(trimmed) {
            return Err(PostError::client(format!("Malformed handle: {}", trimmed)));
        }

        Ok(())
    }

    pub fn validate_credential(credential: &SessionCredential) -> PostResult<()> {
        Self::validate_identifier(&credential.identifier)?;
        if credential.secret.is_empty() {
            return Err(PostError::client("Account password cannot be empty"));
        }
        Ok(())
    }

    pub fn validate_github_name(name: &str) -> PostResult<()> {
        if !github_name_pattern().is_match(name) {
            return Err(PostError::client(format!("Invalid GitHub user name: {}", name)));
        }
        Ok(())
    }

    pub fn validate_service_endpoint(endpoint: &str) -> PostResult<()> {
        let trimmed = endpoint.trim();
        if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
            return Err(PostError::client(format!("Invalid service endpoint: {}", endpoint)));
        }
        if trimmed.len() > 500 {
            return Err(PostError::client("Service endpoint too long"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let credential = SessionCredential::new("alice.bsky.social", "abcd-efgh-ijkl-mnop");
        let debug = format!("{:?}", credential);
        assert!(debug.contains("alice.bsky.social"));
        assert!(!debug.contains("abcd-efgh"));
    }

    #[test]
    fn test_identifiers() {
        assert!(InputValidator::validate_identifier("did:plc:z72i7hdynmk6r22z27h6tvur").is_ok());
        assert!(InputValidator::validate_identifier("alice.bsky.social").is_ok());
        assert!(InputValidator::validate_identifier("did:plc").is_err());
        assert!(InputValidator::validate_identifier("alice").is_err());
        assert!(InputValidator::validate_identifier("  ").is_err());
    }

    #[test]
    fn test_github_names() {
        assert!(InputValidator::validate_github_name("alice").is_ok());
        assert!(InputValidator::validate_github_name("a-b-c").is_ok());
        assert!(InputValidator::validate_github_name("-alice").is_err());
        assert!(InputValidator::validate_github_name("alice-").is_err());
        assert!(InputValidator::validate_github_name("al--ice").is_err());
        assert!(InputValidator::validate_github_name("alice/../x").is_err());
        assert!(InputValidator::validate_github_name(&"a".repeat(40)).is_err());
    }

    #[test]
    fn test_validation_errors_are_client_errors() {
        let err = InputValidator::validate_service_endpoint("bsky.social").unwrap_err();
        assert!(err.is_client_error());
    }
}
