//! In-memory collaborators for testing
//!
//! The mocks record every call into shared logs so tests can assert on the
//! exact sequence of remote operations, including when each one happened on
//! the tokio clock. Failures are injected per user, per media type or per
//! file path. Nothing here touches the network or the filesystem.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::content::ContentSource;
use crate::error::{ContentError, PairpostError, RemoteRequestError, Result, UploadError};
use crate::media::MediaStore;
use crate::threads::{ApiConnector, ContainerRequest, PostingApi};
use crate::types::{ContentItem, MediaType, ReplyContent, User};

/// A remote operation seen by [`MockPostingApi`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Create(ContainerRequest),
    Publish(String),
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub username: String,
    pub call: ApiCall,
    pub at: Instant,
}

/// Shared, ordered log of API calls across all mock clients
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl CallLog {
    fn push(&self, username: &str, call: ApiCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                username: username.to_string(),
                call,
                at: Instant::now(),
            });
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn for_user(&self, username: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.username == username)
            .collect()
    }

    /// Container creation requests, in call order
    pub fn creates(&self) -> Vec<ContainerRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c.call {
                ApiCall::Create(request) => Some(request),
                ApiCall::Publish(_) => None,
            })
            .collect()
    }

    /// Published creation ids, in call order
    pub fn publishes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c.call {
                ApiCall::Publish(id) => Some(id),
                ApiCall::Create(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Failure injection for one user's mock client
#[derive(Debug, Clone, Default)]
pub struct MockApiBehavior {
    /// Fail container creation for this media type
    pub fail_create: Option<MediaType>,
    /// Fail container creation for replies
    pub fail_reply: bool,
    /// Fail every publish call
    pub fail_publish: bool,
}

/// Posting API double bound to one user
pub struct MockPostingApi {
    username: String,
    behavior: MockApiBehavior,
    log: CallLog,
    ids: Arc<AtomicUsize>,
}

impl MockPostingApi {
    pub fn new(username: impl Into<String>) -> Self {
        Self::with_behavior(username, MockApiBehavior::default())
    }

    pub fn with_behavior(username: impl Into<String>, behavior: MockApiBehavior) -> Self {
        Self {
            username: username.into(),
            behavior,
            log: CallLog::default(),
            ids: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn sharing(mut self, log: CallLog, ids: Arc<AtomicUsize>) -> Self {
        self.log = log;
        self.ids = ids;
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    fn next_id(&self) -> usize {
        self.ids.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl PostingApi for MockPostingApi {
    async fn create_container(&self, request: &ContainerRequest) -> Result<String> {
        self.log.push(&self.username, ApiCall::Create(request.clone()));

        let is_reply = request.reply_to_id.is_some();
        if (is_reply && self.behavior.fail_reply)
            || (!is_reply && self.behavior.fail_create == Some(request.media_type))
        {
            return Err(RemoteRequestError::with_response(
                "POST /me/threads failed",
                400,
                format!("mock rejected {} container", request.media_type),
            )
            .into());
        }

        Ok(format!("container-{}", self.next_id()))
    }

    async fn publish(&self, creation_id: &str) -> Result<String> {
        self.log
            .push(&self.username, ApiCall::Publish(creation_id.to_string()));

        if self.behavior.fail_publish {
            return Err(RemoteRequestError::with_response(
                "POST /me/threads_publish failed",
                400,
                "mock publish failure".to_string(),
            )
            .into());
        }

        Ok(format!("thread-{}", self.next_id()))
    }
}

/// Connector handing out [`MockPostingApi`]s that share one call log
#[derive(Default)]
pub struct MockConnector {
    log: CallLog,
    ids: Arc<AtomicUsize>,
    behaviors: HashMap<String, MockApiBehavior>,
    refused: HashSet<String>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(mut self, username: &str, behavior: MockApiBehavior) -> Self {
        self.behaviors.insert(username.to_string(), behavior);
        self
    }

    /// Make `connect` itself fail for this user
    pub fn refusing(mut self, username: &str) -> Self {
        self.refused.insert(username.to_string());
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

impl ApiConnector for MockConnector {
    fn connect(&self, user: &User) -> Result<Arc<dyn PostingApi>> {
        if self.refused.contains(&user.username) {
            return Err(PairpostError::InvalidArgument(format!(
                "mock connector refused '{}'",
                user.username
            )));
        }

        let behavior = self
            .behaviors
            .get(&user.username)
            .cloned()
            .unwrap_or_default();
        let api = MockPostingApi::with_behavior(&user.username, behavior)
            .sharing(self.log.clone(), self.ids.clone());
        Ok(Arc::new(api))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub path: PathBuf,
    pub owner: String,
    pub at: Instant,
}

/// Media store double returning predictable URLs
#[derive(Default)]
pub struct MockMediaStore {
    uploads: Arc<Mutex<Vec<UploadRecord>>>,
    failing_owners: HashSet<String>,
    failing_paths: HashSet<PathBuf>,
}

impl MockMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every upload made on behalf of `owner`
    pub fn failing_for(mut self, owner: &str) -> Self {
        self.failing_owners.insert(owner.to_string());
        self
    }

    /// Fail uploads of this exact path
    pub fn failing_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.failing_paths.insert(path.into());
        self
    }

    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// URL the mock returns for a given upload
    pub fn url_for(path: &Path, owner: &str) -> String {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        format!("https://media.mock/{}/{}", owner, name)
    }
}

#[async_trait]
impl MediaStore for MockMediaStore {
    async fn upload(&self, path: &Path, owner: &str) -> Result<String> {
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(UploadRecord {
                path: path.to_path_buf(),
                owner: owner.to_string(),
                at: Instant::now(),
            });

        if self.failing_owners.contains(owner) || self.failing_paths.contains(path) {
            return Err(UploadError::Rejected {
                status: 500,
                body: format!("mock upload failure for {}", path.display()),
            }
            .into());
        }

        Ok(Self::url_for(path, owner))
    }
}

/// Content source serving fixed items per user
#[derive(Debug, Default)]
pub struct StaticContent {
    items: HashMap<String, ContentItem>,
    replies: HashMap<String, ReplyContent>,
    invalid_replies: HashSet<String>,
}

impl StaticContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, username: &str, item: ContentItem) -> Self {
        self.items.insert(username.to_string(), item);
        self
    }

    pub fn with_reply(mut self, username: &str, reply: ReplyContent) -> Self {
        self.replies.insert(username.to_string(), reply);
        self
    }

    /// Reply folder exists but its text is missing
    pub fn with_invalid_reply(mut self, username: &str) -> Self {
        self.invalid_replies.insert(username.to_string());
        self
    }
}

impl ContentSource for StaticContent {
    fn select_content(&self, username: &str) -> Result<ContentItem> {
        self.items.get(username).cloned().ok_or_else(|| {
            ContentError::NoContent {
                username: username.to_string(),
                root: PathBuf::from("static"),
            }
            .into()
        })
    }

    fn select_reply(&self, username: &str) -> Result<Option<ReplyContent>> {
        if self.invalid_replies.contains(username) {
            return Err(ContentError::InvalidReply {
                username: username.to_string(),
                reason: "reply.txt is missing".to_string(),
            }
            .into());
        }
        Ok(self.replies.get(username).cloned())
    }

    fn has_reply_source(&self, username: &str) -> bool {
        self.replies.contains_key(username) || self.invalid_replies.contains(username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_api_records_calls_and_issues_ids() {
        let api = MockPostingApi::new("alice");
        let container = api
            .create_media_container(MediaType::Text, Some("hi"), None, None, false)
            .await
            .unwrap();
        let thread = api.publish(&container).await.unwrap();

        assert_eq!(container, "container-1");
        assert_eq!(thread, "thread-2");
        assert_eq!(api.log().publishes(), vec!["container-1".to_string()]);
        assert_eq!(api.log().creates()[0].text.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_video_url_and_carousel_guard() {
        let api = MockPostingApi::new("alice");
        api.create_media_container(MediaType::Video, None, Some("https://v/1.mp4"), None, true)
            .await
            .unwrap();

        let request = &api.log().creates()[0];
        assert_eq!(request.video_url.as_deref(), Some("https://v/1.mp4"));
        assert_eq!(request.image_url, None);
        assert!(request.is_carousel_item);

        let err = api
            .create_media_container(MediaType::Carousel, None, None, None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, PairpostError::InvalidArgument(_)));
        assert_eq!(api.log().len(), 1);
    }

    #[tokio::test]
    async fn test_connector_shares_log_across_users() {
        let connector = MockConnector::new();
        let alice = connector.connect(&User::new("alice", "a")).unwrap();
        let bob = connector.connect(&User::new("bob", "b")).unwrap();

        alice.publish("x").await.unwrap();
        bob.publish("y").await.unwrap();

        let log = connector.log();
        assert_eq!(log.len(), 2);
        assert_eq!(log.for_user("bob")[0].call, ApiCall::Publish("y".to_string()));
    }

    #[tokio::test]
    async fn test_connector_failure_injection() {
        let connector = MockConnector::new()
            .with_behavior(
                "alice",
                MockApiBehavior {
                    fail_publish: true,
                    ..Default::default()
                },
            )
            .refusing("mallory");

        assert!(connector.connect(&User::new("mallory", "m")).is_err());

        let alice = connector.connect(&User::new("alice", "a")).unwrap();
        let err = alice.publish("container-1").await.unwrap_err();
        assert!(matches!(err, PairpostError::Remote(_)));
    }

    #[tokio::test]
    async fn test_mock_media_store() {
        let store = MockMediaStore::new().failing_for("bob");

        let url = store.upload(Path::new("/pairs/a/image1.jpg"), "alice").await.unwrap();
        assert_eq!(url, "https://media.mock/alice/image1.jpg");
        assert!(store.upload(Path::new("/pairs/b/image1.jpg"), "bob").await.is_err());
        assert_eq!(store.uploads().len(), 2);
    }

    #[test]
    fn test_static_content() {
        let content = StaticContent::new()
            .with_item("alice", ContentItem::new("f", "c", Vec::new()).unwrap())
            .with_invalid_reply("alice");

        assert!(content.select_content("alice").is_ok());
        assert!(content.select_content("bob").is_err());
        assert!(content.has_reply_source("alice"));
        assert!(content.select_reply("alice").is_err());
        assert_eq!(content.select_reply("bob").unwrap(), None);
    }
}
