use serde::{Deserialize, Serialize};
use std::fmt;

use super::facets::{detect_facets, Facet};
use crate::errors::{PostError, PostResult};

/// Commit count as handed over by the scheduler, embedded verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommitCount {
    Number(u64),
    Text(String),
}

impl fmt::Display for CommitCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitCount::Number(n) => write!(f, "{}", n),
            CommitCount::Text(s) => write!(f, "{}", s),
        }
    }
}

impl CommitCount {
    /// Text counts are embedded verbatim, so they must still be a number.
    pub fn validate(&self) -> PostResult<()> {
        match self {
            CommitCount::Number(_) => Ok(()),
            CommitCount::Text(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => {
                Ok(())
            }
            CommitCount::Text(s) => Err(PostError::client(format!(
                "Commit count is not a number: {:?}",
                s
            ))),
        }
    }
}

impl From<u64> for CommitCount {
    fn from(n: u64) -> Self {
        CommitCount::Number(n)
    }
}

impl From<&str> for CommitCount {
    fn from(s: &str) -> Self {
        CommitCount::Text(s.to_string())
    }
}

/// Post text with its detected facets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedMessage {
    pub text: String,
    pub facets: Vec<Facet>,
}

pub fn profile_url(github_name: &str) -> String {
    format!("https://github.com/{}", github_name)
}

pub fn compose_text(commit_count: &CommitCount, github_name: &str, hashtag: &str) -> String {
    format!(
        "昨日はGitHubに{}回commitしました\n{}\n{}",
        commit_count,
        hashtag,
        profile_url(github_name)
    )
}

pub fn compose_message(
    commit_count: &CommitCount,
    github_name: &str,
    hashtag: &str,
) -> ComposedMessage {
    let text = compose_text(commit_count, github_name, hashtag);
    let facets = detect_facets(&text);
    log::debug!("Composed post with {} facets", facets.len());
    ComposedMessage { text, facets }
}
