//! Oracle message and stream types
//!
//! These are NOT domain types - they only describe the text-in/text-out
//! contract with the language-model oracle.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message role in an oracle conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OracleMessage {
    pub role: Role,
    pub content: String,
}

impl OracleMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One item of an oracle response stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPart {
    /// Incremental text
    TextDelta { delta: String },
    /// The stream failed; nothing further follows
    Error { error: String },
    /// Normal end of stream
    Finish,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Request(String),
    #[error("oracle returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("oracle stream failed: {0}")]
    Stream(String),
    #[error("oracle is not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        OracleError::Request(err.to_string())
    }
}
