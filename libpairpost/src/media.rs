//! Media hosting
//!
//! The posting API only accepts media by public URL, so every local image
//! is uploaded to Cloudinary first and the returned `secure_url` is what
//! goes into the container.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::{MediaConfig, WatermarkConfig};
use crate::error::{Result, UploadError};
use crate::threads::build_http_client;

/// Uploads local files and hands back a durable public URL
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Upload `path` on behalf of `owner` and return its secure URL
    async fn upload(&self, path: &Path, owner: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

/// Signed uploads to the Cloudinary image upload endpoint
pub struct CloudinaryStore {
    http: Client,
    upload_url: String,
    api_key: String,
    api_secret: SecretString,
    folder: Option<String>,
    watermark: Option<WatermarkConfig>,
}

impl CloudinaryStore {
    /// Build a store from configuration, resolving credentials from the
    /// environment or the config file
    pub fn from_config(config: &MediaConfig, timeout: Duration) -> Result<Self> {
        let credentials = config.credentials()?;
        let http = build_http_client(timeout)?;

        Ok(Self {
            http,
            upload_url: format!(
                "{}/{}/image/upload",
                config.base_url.trim_end_matches('/'),
                credentials.cloud_name
            ),
            api_key: credentials.api_key,
            api_secret: credentials.api_secret,
            folder: config.folder.clone().filter(|f| !f.is_empty()),
            watermark: config.watermark.enabled.then(|| config.watermark.clone()),
        })
    }

    /// Parameters covered by the request signature
    fn signed_params(&self, owner: &str, timestamp: i64) -> BTreeMap<&'static str, String> {
        let mut params = BTreeMap::new();
        params.insert("timestamp", timestamp.to_string());
        if let Some(folder) = &self.folder {
            params.insert("folder", folder.clone());
        }
        if let Some(watermark) = &self.watermark {
            params.insert("transformation", watermark_transformation(watermark, owner));
        }
        params
    }

    fn sign(&self, params: &BTreeMap<&'static str, String>) -> String {
        sign_params(params, self.api_secret.expose_secret())
    }
}

#[async_trait]
impl MediaStore for CloudinaryStore {
    async fn upload(&self, path: &Path, owner: &str) -> Result<String> {
        let bytes = tokio::fs::read(path).await.map_err(|e| UploadError::File {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());

        let params = self.signed_params(owner, chrono::Utc::now().timestamp());
        let signature = self.sign(&params);

        let mut form = Form::new()
            .text("api_key", self.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");
        for (key, value) in &params {
            form = form.text(*key, value.clone());
        }
        form = form.part("file", Part::bytes(bytes).file_name(file_name));

        debug!(path = %path.display(), owner, "uploading media");

        let response = self
            .http
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let parsed: UploadResponse = serde_json::from_str(&body)
            .map_err(|e| UploadError::MalformedResponse(format!("{}: {}", e, body)))?;

        info!(path = %path.display(), url = %parsed.secure_url, "uploaded media");
        Ok(parsed.secure_url)
    }
}

/// SHA-256 over `key=value` pairs joined with `&` in key order, followed by the secret
pub fn sign_params(params: &BTreeMap<&'static str, String>, api_secret: &str) -> String {
    let to_sign = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Text overlay showing `@owner` on the uploaded image
pub fn watermark_transformation(watermark: &WatermarkConfig, owner: &str) -> String {
    format!(
        "l_text:{}_{}:%40{},co_white,g_{},x_20,y_20,o_{}",
        watermark.font,
        watermark.size,
        escape_overlay_text(owner),
        watermark.position,
        watermark.opacity
    )
}

fn escape_overlay_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            ',' => escaped.push_str("%2C"),
            '/' => escaped.push_str("%2F"),
            '@' => escaped.push_str("%40"),
            _ => escaped.push(c),
        }
    }
    escaped
}
