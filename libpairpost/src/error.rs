//! Error types for Pairpost

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PairpostError>;

#[derive(Error, Debug)]
pub enum PairpostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    #[error("Upload failed: {0}")]
    Upload(#[from] UploadError),

    #[error("Remote request failed: {0}")]
    Remote(#[from] RemoteRequestError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Process-level failures outside any single post, such as output or signal setup
    #[error("{0}")]
    Runtime(String),
}

impl PairpostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PairpostError::InvalidArgument(_) => 3,
            PairpostError::Config(_) => 2,
            PairpostError::Content(_) => 1,
            PairpostError::Upload(_) => 1,
            PairpostError::Remote(_) => 1,
            PairpostError::Runtime(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to parse {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("No eligible content folders for user '{username}' under {}", .root.display())]
    NoContent { username: String, root: PathBuf },

    #[error("Invalid reply content for user '{username}': {reason}")]
    InvalidReply { username: String, reason: String },

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug, Clone)]
pub enum UploadError {
    #[error("Cannot read media file {path}: {reason}")]
    File { path: String, reason: String },

    #[error("Media store rejected upload (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected media store response: {0}")]
    MalformedResponse(String),
}

/// Failure of a single call against the posting API
///
/// Carries the HTTP status and response body when the server answered.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}{}", describe_response(.status, .body))]
pub struct RemoteRequestError {
    pub status: Option<u16>,
    pub body: Option<String>,
    pub message: String,
}

impl RemoteRequestError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            body: None,
            message: message.into(),
        }
    }

    pub fn with_response(message: impl Into<String>, status: u16, body: String) -> Self {
        Self {
            status: Some(status),
            body: Some(body),
            message: message.into(),
        }
    }
}

fn describe_response(status: &Option<u16>, body: &Option<String>) -> String {
    match (status, body) {
        (Some(status), Some(body)) if !body.is_empty() => format!(" (HTTP {}): {}", status, body),
        (Some(status), _) => format!(" (HTTP {})", status),
        (None, _) => String::new(),
    }
}
