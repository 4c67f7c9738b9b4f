//! Threads Graph API client
//!
//! Posting is a two-phase protocol: a container is created with
//! `POST /me/threads`, and once the server has finished processing its
//! media it is made public with `POST /me/threads_publish`. Neither call is
//! idempotent, so nothing in this module retries.
//!
//! # Examples
//!
//! ```no_run
//! use libpairpost::threads::{PostingApi, ThreadsClient};
//! use libpairpost::types::MediaType;
//!
//! # async fn example() -> libpairpost::Result<()> {
//! let client = ThreadsClient::new("https://graph.threads.net/v1.0", "token")?;
//! let container = client
//!     .create_media_container(MediaType::Text, Some("hello"), None, None, false)
//!     .await?;
//! let thread_id = client.publish(&container).await?;
//! println!("published {}", thread_id);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ConfigError, PairpostError, RemoteRequestError, Result};
use crate::types::{MediaType, User};

/// Smallest number of children a carousel accepts
pub const CAROUSEL_MIN_CHILDREN: usize = 2;
/// Largest number of children a carousel accepts
pub const CAROUSEL_MAX_CHILDREN: usize = 10;

/// Fields of a container creation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRequest {
    pub media_type: MediaType,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub children: Vec<String>,
    pub is_carousel_item: bool,
    pub reply_to_id: Option<String>,
}

impl ContainerRequest {
    pub fn new(media_type: MediaType) -> Self {
        Self {
            media_type,
            text: None,
            image_url: None,
            video_url: None,
            children: Vec::new(),
            is_carousel_item: false,
            reply_to_id: None,
        }
    }

    /// Query parameters in the order the API documents them
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("media_type", self.media_type.as_str().to_string())];

        if let Some(text) = &self.text {
            params.push(("text", text.clone()));
        }
        if let Some(url) = &self.image_url {
            params.push(("image_url", url.clone()));
        }
        if let Some(url) = &self.video_url {
            params.push(("video_url", url.clone()));
        }
        if !self.children.is_empty() {
            params.push(("children", self.children.join(",")));
        }
        if self.media_type != MediaType::Carousel {
            params.push(("is_carousel_item", self.is_carousel_item.to_string()));
        }
        if let Some(reply_to_id) = &self.reply_to_id {
            params.push(("reply_to_id", reply_to_id.clone()));
        }

        params
    }
}

/// Container and publish operations of the posting API
///
/// Implementations provide the two raw calls; the typed helpers are built
/// on top of them so every implementation shares the same argument checks.
#[async_trait]
pub trait PostingApi: Send + Sync {
    /// Create a container and return its creation id
    async fn create_container(&self, request: &ContainerRequest) -> Result<String>;

    /// Publish a previously created container and return the published id
    ///
    /// The server rejects containers whose media is still processing, so
    /// callers wait the documented readiness delay first.
    async fn publish(&self, creation_id: &str) -> Result<String>;

    /// Create a single media, text, or reply container
    async fn create_media_container(
        &self,
        media_type: MediaType,
        text: Option<&str>,
        media_url: Option<&str>,
        reply_to_id: Option<&str>,
        is_carousel_item: bool,
    ) -> Result<String> {
        if media_type == MediaType::Carousel {
            return Err(PairpostError::InvalidArgument(
                "Use create_carousel_container for CAROUSEL containers".to_string(),
            ));
        }

        let mut request = ContainerRequest::new(media_type);
        request.text = text.map(str::to_string);
        request.reply_to_id = reply_to_id.map(str::to_string);
        request.is_carousel_item = is_carousel_item;
        match media_type {
            MediaType::Video => request.video_url = media_url.map(str::to_string),
            _ => request.image_url = media_url.map(str::to_string),
        }

        self.create_container(&request).await
    }

    /// Create the parent container of a carousel
    ///
    /// Fails with `InvalidArgument` before contacting the server when the
    /// number of children is outside 2-10.
    async fn create_carousel_container(
        &self,
        child_ids: &[String],
        text: Option<&str>,
    ) -> Result<String> {
        validate_carousel_children(child_ids.len())?;

        let mut request = ContainerRequest::new(MediaType::Carousel);
        request.children = child_ids.to_vec();
        request.text = text.map(str::to_string);

        self.create_container(&request).await
    }
}

pub fn validate_carousel_children(count: usize) -> Result<()> {
    if !(CAROUSEL_MIN_CHILDREN..=CAROUSEL_MAX_CHILDREN).contains(&count) {
        return Err(PairpostError::InvalidArgument(format!(
            "A carousel needs {}-{} children, got {}",
            CAROUSEL_MIN_CHILDREN, CAROUSEL_MAX_CHILDREN, count
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

/// HTTP client for one account of the Threads Graph API
pub struct ThreadsClient {
    http: Client,
    base_url: String,
    access_token: SecretString,
}

impl ThreadsClient {
    /// Create a client with its own connection pool
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Result<Self> {
        let http = build_http_client(Duration::from_secs(30))?;
        Ok(Self::with_client(
            http,
            base_url,
            SecretString::from(access_token.into()),
        ))
    }

    /// Create a client sharing an existing connection pool
    pub fn with_client(http: Client, base_url: impl Into<String>, access_token: SecretString) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token,
        }
    }

    async fn post(&self, endpoint: &str, params: &[(&'static str, String)]) -> Result<String> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(endpoint, ?params, "sending request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.access_token.expose_secret())
            .query(params)
            .send()
            .await
            .map_err(|e| RemoteRequestError::new(format!("POST {} failed: {}", endpoint, e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            RemoteRequestError::new(format!(
                "POST {} failed: could not read response: {}",
                endpoint, e
            ))
        })?;

        if !status.is_success() {
            return Err(RemoteRequestError::with_response(
                format!("POST {} failed", endpoint),
                status.as_u16(),
                body,
            )
            .into());
        }

        let parsed: IdResponse = serde_json::from_str(&body).map_err(|e| {
            RemoteRequestError::with_response(
                format!("POST {} returned no id: {}", endpoint, e),
                status.as_u16(),
                body.clone(),
            )
        })?;

        Ok(parsed.id)
    }
}

#[async_trait]
impl PostingApi for ThreadsClient {
    async fn create_container(&self, request: &ContainerRequest) -> Result<String> {
        let id = self.post("/me/threads", &request.to_params()).await?;
        info!(
            media_type = %request.media_type,
            carousel_item = request.is_carousel_item,
            container_id = %id,
            "created container"
        );
        Ok(id)
    }

    async fn publish(&self, creation_id: &str) -> Result<String> {
        let params = [("creation_id", creation_id.to_string())];
        let id = self.post("/me/threads_publish", &params).await?;
        info!(container_id = %creation_id, thread_id = %id, "published container");
        Ok(id)
    }
}

/// Builds a posting client bound to one user's credentials
pub trait ApiConnector: Send + Sync {
    fn connect(&self, user: &User) -> Result<Arc<dyn PostingApi>>;
}

/// Connector producing [`ThreadsClient`]s that share one connection pool
pub struct HttpConnector {
    http: Client,
    base_url: String,
}

impl HttpConnector {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_http_client(timeout)?,
            base_url: base_url.into(),
        })
    }
}

impl ApiConnector for HttpConnector {
    fn connect(&self, user: &User) -> Result<Arc<dyn PostingApi>> {
        if user.token().trim().is_empty() {
            return Err(PairpostError::InvalidArgument(format!(
                "User '{}' has an empty access token",
                user.username
            )));
        }

        Ok(Arc::new(ThreadsClient::with_client(
            self.http.clone(),
            self.base_url.clone(),
            user.access_token.clone(),
        )))
    }
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()
        .map_err(|e| {
            ConfigError::InvalidValue {
                field: "http client".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
}
