//! Single-user post pipeline
//!
//! One run takes a user's content through
//!
//! ```text
//! Selecting -> Uploading -> ContainerCreate -> AwaitingReady -> Publishing
//!   -> ReplySelecting -> ReplyUploading -> ReplyContainerCreate
//!   -> ReplyAwaitingReady -> ReplyPublishing -> Done
//! ```
//!
//! Any failure up to and including `Publishing` fails the whole run. The
//! reply steps only run for users with a reply folder, and their failures
//! are reported alongside a successful post rather than replacing it. No
//! step is retried and nothing already created is rolled back.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::TimingConfig;
use crate::content::ContentSource;
use crate::error::{PairpostError, Result};
use crate::media::MediaStore;
use crate::threads::{validate_carousel_children, PostingApi};
use crate::types::{ContainerKind, ContentItem, MediaContainer, MediaType, PostResult, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Selecting,
    Uploading,
    ContainerCreate,
    AwaitingReady,
    Publishing,
    ReplySelecting,
    ReplyUploading,
    ReplyContainerCreate,
    ReplyAwaitingReady,
    ReplyPublishing,
    Done,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Selecting => "selecting",
            PipelineStage::Uploading => "uploading",
            PipelineStage::ContainerCreate => "container_create",
            PipelineStage::AwaitingReady => "awaiting_ready",
            PipelineStage::Publishing => "publishing",
            PipelineStage::ReplySelecting => "reply_selecting",
            PipelineStage::ReplyUploading => "reply_uploading",
            PipelineStage::ReplyContainerCreate => "reply_container_create",
            PipelineStage::ReplyAwaitingReady => "reply_awaiting_ready",
            PipelineStage::ReplyPublishing => "reply_publishing",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Fixed waits for server-side media processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessDelays {
    /// Before publishing a top-level container
    pub post_ready: Duration,
    /// After creating each carousel child
    pub carousel_item: Duration,
    /// Before publishing a reply
    pub reply_ready: Duration,
}

impl Default for ReadinessDelays {
    fn default() -> Self {
        Self {
            post_ready: Duration::from_secs(30),
            carousel_item: Duration::from_secs(5),
            reply_ready: Duration::from_secs(30),
        }
    }
}

impl From<&TimingConfig> for ReadinessDelays {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            post_ready: timing.post_ready_delay,
            carousel_item: timing.carousel_item_delay,
            reply_ready: timing.reply_ready_delay,
        }
    }
}

/// A pipeline run that stopped before the post was published
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct PipelineFailure {
    pub stage: PipelineStage,
    #[source]
    pub source: PairpostError,
}

trait AtStage<T> {
    fn at_stage(self, stage: PipelineStage) -> std::result::Result<T, PipelineFailure>;
}

impl<T> AtStage<T> for Result<T> {
    fn at_stage(self, stage: PipelineStage) -> std::result::Result<T, PipelineFailure> {
        self.map_err(|source| PipelineFailure { stage, source })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// No reply folder, or reply capability is off
    Skipped,
    Posted(String),
    /// The post stands; the reply did not go out
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostOutcome {
    pub folder: String,
    pub thread_id: String,
    pub reply: ReplyOutcome,
}

impl PostOutcome {
    pub fn reply_id(&self) -> Option<&str> {
        match &self.reply {
            ReplyOutcome::Posted(id) => Some(id),
            _ => None,
        }
    }
}

pub struct PostPipeline {
    media: Arc<dyn MediaStore>,
    content: Arc<dyn ContentSource>,
    delays: ReadinessDelays,
}

impl PostPipeline {
    pub fn new(
        media: Arc<dyn MediaStore>,
        content: Arc<dyn ContentSource>,
        delays: ReadinessDelays,
    ) -> Self {
        Self {
            media,
            content,
            delays,
        }
    }

    /// Run the pipeline and fold the outcome into a [`PostResult`]
    pub async fn run(&self, api: &dyn PostingApi, user: &User) -> PostResult {
        match self.execute(api, user).await {
            Ok(outcome) => {
                let reply_id = outcome.reply_id().map(str::to_string);
                let result = PostResult::success(&user.username, outcome.thread_id, reply_id);
                match outcome.reply {
                    ReplyOutcome::Failed(reason) => {
                        result.with_message(format!("posted, but reply failed: {}", reason))
                    }
                    _ => result,
                }
            }
            Err(failure) => {
                warn!(username = %user.username, stage = %failure.stage, error = %failure.source, "post failed");
                PostResult::error(&user.username, failure.to_string())
            }
        }
    }

    pub async fn execute(
        &self,
        api: &dyn PostingApi,
        user: &User,
    ) -> std::result::Result<PostOutcome, PipelineFailure> {
        let span = info_span!("post", username = %user.username);
        self.execute_inner(api, user).instrument(span).await
    }

    async fn execute_inner(
        &self,
        api: &dyn PostingApi,
        user: &User,
    ) -> std::result::Result<PostOutcome, PipelineFailure> {
        let username = user.username.as_str();

        let item = self
            .content
            .select_content(username)
            .at_stage(PipelineStage::Selecting)?;
        debug!(stage = %PipelineStage::Selecting, folder = %item.folder, media = item.media_paths().len(), "content selected");

        let urls = self
            .upload_all(&item, username)
            .await
            .at_stage(PipelineStage::Uploading)?;

        let container = self
            .create_post_container(api, &item, &urls)
            .await
            .at_stage(PipelineStage::ContainerCreate)?;

        debug!(
            stage = %PipelineStage::AwaitingReady,
            container_id = %container.id,
            delay = ?self.delays.post_ready,
            "waiting for container to be ready"
        );
        sleep(self.delays.post_ready).await;

        let thread_id = api
            .publish(&container.id)
            .await
            .at_stage(PipelineStage::Publishing)?;
        info!(stage = %PipelineStage::Publishing, folder = %item.folder, thread_id = %thread_id, "post published");

        let reply = if user.has_reply_capability {
            match self.post_reply(api, username, &thread_id).await {
                Ok(Some(reply_id)) => ReplyOutcome::Posted(reply_id),
                Ok(None) => ReplyOutcome::Skipped,
                Err(failure) => {
                    warn!(stage = %failure.stage, error = %failure.source, "reply failed");
                    ReplyOutcome::Failed(failure.to_string())
                }
            }
        } else {
            debug!(stage = %PipelineStage::ReplySelecting, "no reply folder, skipping reply");
            ReplyOutcome::Skipped
        };

        debug!(stage = %PipelineStage::Done, "pipeline finished");
        Ok(PostOutcome {
            folder: item.folder,
            thread_id,
            reply,
        })
    }

    /// Upload media in order, one at a time
    async fn upload_all(&self, item: &ContentItem, owner: &str) -> Result<Vec<String>> {
        let mut urls = Vec::with_capacity(item.media_paths().len());
        for path in item.media_paths() {
            urls.push(self.media.upload(path, owner).await?);
        }
        Ok(urls)
    }

    async fn create_post_container(
        &self,
        api: &dyn PostingApi,
        item: &ContentItem,
        urls: &[String],
    ) -> Result<MediaContainer> {
        let caption = Some(item.caption.as_str());

        match urls {
            [] => {
                let id = api
                    .create_media_container(MediaType::Text, caption, None, None, false)
                    .await?;
                Ok(MediaContainer::new(id, ContainerKind::Text))
            }
            [url] => {
                let id = api
                    .create_media_container(MediaType::Image, caption, Some(url), None, false)
                    .await?;
                Ok(MediaContainer::new(id, ContainerKind::Image))
            }
            _ => {
                validate_carousel_children(urls.len())?;

                let mut children = Vec::with_capacity(urls.len());
                for url in urls {
                    let child = MediaContainer::new(
                        api.create_media_container(MediaType::Image, None, Some(url), None, true)
                            .await?,
                        ContainerKind::CarouselChild,
                    );
                    debug!(container_id = %child.id, delay = ?self.delays.carousel_item, "carousel item created");
                    sleep(self.delays.carousel_item).await;
                    children.push(child.id);
                }

                let id = api.create_carousel_container(&children, caption).await?;
                Ok(MediaContainer::new(id, ContainerKind::CarouselParent))
            }
        }
    }

    async fn post_reply(
        &self,
        api: &dyn PostingApi,
        username: &str,
        thread_id: &str,
    ) -> std::result::Result<Option<String>, PipelineFailure> {
        let Some(reply) = self
            .content
            .select_reply(username)
            .at_stage(PipelineStage::ReplySelecting)?
        else {
            return Ok(None);
        };

        let image_url = match &reply.image_path {
            Some(path) => match self.media.upload(path, username).await {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(stage = %PipelineStage::ReplyUploading, error = %e, "reply image upload failed, replying with text only");
                    None
                }
            },
            None => None,
        };

        let media_type = if image_url.is_some() {
            MediaType::Image
        } else {
            MediaType::Text
        };
        let container = MediaContainer::new(
            api.create_media_container(
                media_type,
                Some(&reply.text),
                image_url.as_deref(),
                Some(thread_id),
                false,
            )
            .await
            .at_stage(PipelineStage::ReplyContainerCreate)?,
            ContainerKind::Reply,
        );

        debug!(stage = %PipelineStage::ReplyAwaitingReady, container_id = %container.id, "waiting for reply to be ready");
        sleep(self.delays.reply_ready).await;

        let reply_id = api
            .publish(&container.id)
            .await
            .at_stage(PipelineStage::ReplyPublishing)?;
        info!(stage = %PipelineStage::ReplyPublishing, thread_id, reply_id = %reply_id, "reply published");

        Ok(Some(reply_id))
    }
}
