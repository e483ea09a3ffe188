use std::time::Duration;

use futures::StreamExt as _;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::services::{ByteStream, ImageService, ImageUpload, UploadedImage};

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file_path: String,
}

/// HTTP client for the upload/static-file service.
#[derive(Clone, Debug)]
pub struct HttpImageService {
    client: reqwest::Client,
    upload_url: Url,
    timeout: Duration,
}

impl HttpImageService {
    pub fn new(client: reqwest::Client, config: &PipelineConfig) -> Result<Self, PipelineError> {
        Ok(Self {
            client,
            upload_url: config.upload_url()?,
            timeout: config.request_timeout,
        })
    }
}

#[async_trait::async_trait]
impl ImageService for HttpImageService {
    async fn upload(&self, image: ImageUpload) -> Result<UploadedImage, PipelineError> {
        let size = image.bytes.len() as u64;
        let part = reqwest::multipart::Part::bytes(image.bytes)
            .file_name(image.filename)
            .mime_str(&image.mime)
            .map_err(|e| PipelineError::upload_failed(format!("invalid MIME type: {e}"), None))?;
        let form = reqwest::multipart::Form::new().part("file", part);
        debug!(event = "upload.request", domain = "upload", url = %self.upload_url, bytes = size);

        let response = self
            .client
            .post(self.upload_url.clone())
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PipelineError::upload_failed(format!("request failed: {e}"), None))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(PipelineError::upload_failed(
                format!("upload service responded with status {status}: {body}"),
                Some(status.as_u16()),
            ));
        }
        let parsed: UploadResponse = response.json().await.map_err(|e| {
            PipelineError::upload_failed(
                format!("response did not contain a file_path: {e}"),
                Some(status.as_u16()),
            )
        })?;
        info!(event = "upload.succeeded", domain = "upload", file_path = %parsed.file_path);
        Ok(UploadedImage(parsed.file_path))
    }

    async fn download(&self, url: &Url) -> Result<ByteStream, PipelineError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| PipelineError::download_failed(url.as_str(), e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::download_failed(
                url.as_str(),
                format!("server responded with status {status}"),
            ));
        }
        let url = url.to_string();
        let stream = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|e| PipelineError::download_failed(url.clone(), e.to_string()))
        });
        Ok(Box::pin(stream))
    }
}
