//! Media upload collaborator.
//!
//! Images never go through the document store: they are posted to an external
//! blob host and only the returned public URL is stored in a message or
//! profile.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info};

use duet_shared::constants::MAX_IMAGE_SIZE;

use crate::error::{ClientError, Result};

/// Uploads bytes and returns the public URL they are served from.
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String>;
}

/// Unsigned multipart upload to an HTTP image host.
///
/// Sends `file` and `upload_preset` form fields and reads `secure_url` from
/// the JSON reply.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: String,
    preset: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

impl HttpUploader {
    pub fn new(endpoint: impl Into<String>, preset: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            preset: preset.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MediaUploader for HttpUploader {
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        check_size(bytes.len())?;
        let size = bytes.len();

        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name.to_string()))
            .text("upload_preset", self.preset.clone());

        debug!(endpoint = %self.endpoint, size, "Uploading image");

        let resp = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::Upload(format!("Could not reach upload host: {e}")))?;

        if !resp.status().is_success() {
            return Err(ClientError::Upload(format!(
                "Upload host answered {}",
                resp.status()
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| ClientError::Upload(format!("Unreadable upload response: {e}")))?;
        let url = parse_response(&body)?;

        info!(size, "Image uploaded");
        Ok(url)
    }
}

fn check_size(len: usize) -> Result<()> {
    if len == 0 {
        return Err(ClientError::Upload("File is empty".into()));
    }
    if len > MAX_IMAGE_SIZE {
        return Err(ClientError::Upload(format!(
            "File too large: {len} bytes (max {MAX_IMAGE_SIZE})"
        )));
    }
    Ok(())
}

fn parse_response(body: &str) -> Result<String> {
    let parsed: UploadResponse = serde_json::from_str(body)
        .map_err(|e| ClientError::Upload(format!("Invalid upload response: {e}")))?;
    if parsed.secure_url.is_empty() {
        return Err(ClientError::Upload("Upload response has no URL".into()));
    }
    Ok(parsed.secure_url)
}
