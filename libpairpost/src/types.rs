//! Core types for Pairpost

use std::fmt;
use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{PairpostError, Result};

/// Maximum number of media files a single content folder contributes
pub const MAX_MEDIA_PER_ITEM: usize = 2;

/// A posting account
///
/// The access token is kept in a [`SecretString`] so it never shows up in
/// `Debug` output or log lines.
#[derive(Clone)]
pub struct User {
    pub username: String,
    pub access_token: SecretString,
    pub has_reply_capability: bool,
}

impl User {
    pub fn new(username: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            access_token: SecretString::from(access_token.into()),
            has_reply_capability: false,
        }
    }

    pub fn with_reply_capability(mut self, has_reply_capability: bool) -> Self {
        self.has_reply_capability = has_reply_capability;
        self
    }

    /// Bearer token for API calls made on behalf of this user
    pub fn token(&self) -> &str {
        self.access_token.expose_secret()
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("username", &self.username)
            .field("access_token", &"[REDACTED]")
            .field("has_reply_capability", &self.has_reply_capability)
            .finish()
    }
}

/// Content picked for one post: a caption and up to two local images
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub folder: String,
    pub caption: String,
    media_paths: Vec<PathBuf>,
}

impl ContentItem {
    /// Build a content item, rejecting more than [`MAX_MEDIA_PER_ITEM`] media files
    pub fn new(
        folder: impl Into<String>,
        caption: impl Into<String>,
        media_paths: Vec<PathBuf>,
    ) -> Result<Self> {
        if media_paths.len() > MAX_MEDIA_PER_ITEM {
            return Err(PairpostError::InvalidArgument(format!(
                "A content item holds at most {} media files, got {}",
                MAX_MEDIA_PER_ITEM,
                media_paths.len()
            )));
        }

        Ok(Self {
            folder: folder.into(),
            caption: caption.into(),
            media_paths,
        })
    }

    /// Media files in posting order
    pub fn media_paths(&self) -> &[PathBuf] {
        &self.media_paths
    }
}

/// Text and optional image posted as a reply under a published thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyContent {
    pub text: String,
    pub image_path: Option<PathBuf>,
}

/// Wire value of the `media_type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaType {
    Image,
    Video,
    Text,
    Carousel,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "IMAGE",
            MediaType::Video => "VIDEO",
            MediaType::Text => "TEXT",
            MediaType::Carousel => "CAROUSEL",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role a container plays in a post
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Text,
    Image,
    CarouselChild,
    CarouselParent,
    Reply,
}

/// A server-side container that has been created but not yet published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaContainer {
    pub id: String,
    pub kind: ContainerKind,
}

impl MediaContainer {
    pub fn new(id: String, kind: ContainerKind) -> Self {
        Self { id, kind }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Success,
    Error,
}

/// Outcome of one user's pipeline run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostResult {
    pub username: String,
    pub status: PostStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PostResult {
    pub fn success(username: impl Into<String>, thread_id: String, reply_id: Option<String>) -> Self {
        Self {
            username: username.into(),
            status: PostStatus::Success,
            thread_id: Some(thread_id),
            reply_id,
            message: None,
        }
    }

    pub fn error(username: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            status: PostStatus::Error,
            thread_id: None,
            reply_id: None,
            message: Some(message.into()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == PostStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_item_accepts_up_to_two_media() {
        for count in 0..=2 {
            let paths = (0..count)
                .map(|i| PathBuf::from(format!("image{}.jpg", i + 1)))
                .collect();
            let item = ContentItem::new("pair-01", "caption", paths).unwrap();
            assert_eq!(item.media_paths().len(), count);
        }
    }

    #[test]
    fn test_content_item_rejects_three_media() {
        let paths = vec![
            PathBuf::from("a.jpg"),
            PathBuf::from("b.jpg"),
            PathBuf::from("c.jpg"),
        ];
        let result = ContentItem::new("pair-01", "caption", paths);
        assert!(matches!(result, Err(PairpostError::InvalidArgument(_))));
    }

    #[test]
    fn test_user_debug_redacts_token() {
        let user = User::new("alice", "super-secret-token");
        let debug = format!("{:?}", user);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("super-secret-token"));
        assert_eq!(user.token(), "super-secret-token");
    }

    #[test]
    fn test_media_type_wire_values() {
        assert_eq!(MediaType::Image.as_str(), "IMAGE");
        assert_eq!(MediaType::Carousel.to_string(), "CAROUSEL");
        assert_eq!(serde_json::to_string(&MediaType::Text).unwrap(), "\"TEXT\"");
    }

    #[test]
    fn test_post_result_json_shape() {
        let ok = PostResult::success("alice", "thread-1".to_string(), None);
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["thread_id"], "thread-1");
        assert!(json.get("reply_id").is_none());

        let failed = PostResult::error("bob", "upload failed");
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "upload failed");
        assert!(!failed.is_success());
    }
}
