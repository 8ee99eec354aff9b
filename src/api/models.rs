//! API request and response models

use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Snippet payload for create, update and partial update
///
/// Every field is optional at the serde level so missing fields are
/// reported per field instead of as a decode error. Read-only fields
/// (`id`, `owner`, ...) sent by clients are ignored.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SnippetInput {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub code: Option<String>,

    #[serde(default)]
    pub linenos: Option<bool>,

    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub style: Option<String>,
}

/// Hyperlinked snippet representation
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SnippetInfo {
    pub url: String,
    pub id: u64,
    pub highlight: String,
    /// Owner's username
    pub owner: String,
    pub title: String,
    pub code: String,
    pub linenos: bool,
    pub language: String,
    pub style: String,
}

/// Hyperlinked user representation
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct UserInfo {
    pub url: String,
    pub id: u64,
    pub username: String,
    /// URLs of the user's snippets, oldest first
    pub snippets: Vec<String>,
}
