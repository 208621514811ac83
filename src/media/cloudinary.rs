//! Cloudinary media backend.
//!
//! Publishes images through the Cloudinary upload API using `reqwest`.
//! Requests are authenticated with signed parameters: the parameters
//! being sent (minus `file`, `api_key` and the signature fields) are
//! sorted, joined as `k=v&k=v`, suffixed with the API secret and hashed
//! with SHA-256.
//!
//! Endpoints:
//!   Upload:   `POST {api_base}/{cloud_name}/image/upload`
//!   Destroy:  `POST {api_base}/{cloud_name}/image/destroy`

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use tracing::{debug, info, warn};

use super::backend::{MediaBackend, RemoteObject};
use crate::config::CloudinaryConfig;

// -- API response types -------------------------------------------------------

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

/// Compute the hex SHA-256 request signature for `params`.
pub fn sign_params(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted: Vec<_> = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Media backend that publishes to a Cloudinary account.
pub struct CloudinaryBackend {
    client: reqwest::Client,
    api_base: String,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    folder: String,
}

impl CloudinaryBackend {
    /// Create a backend from account settings. All three credentials are
    /// required.
    pub fn new(config: &CloudinaryConfig) -> anyhow::Result<Self> {
        if !config.is_complete() {
            anyhow::bail!(
                "media.backend is 'cloudinary' but cloud_name, api_key or api_secret is missing"
            );
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

        info!(
            "Cloudinary media backend initialized: cloud={} folder='{}'",
            config.cloud_name, config.folder
        );

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            cloud_name: config.cloud_name.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            folder: config.folder.clone(),
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/{}/image/{}", self.api_base, self.cloud_name, action)
    }

    fn timestamp() -> String {
        chrono::Utc::now().timestamp().to_string()
    }

    /// Build a descriptive error from a non-success response.
    fn api_error(status: StatusCode, body: &str, context: &str) -> anyhow::Error {
        if let Ok(err_resp) = serde_json::from_str::<ApiErrorResponse>(body) {
            if let Some(message) = err_resp.error.and_then(|e| e.message) {
                return anyhow::anyhow!("Cloudinary {context}: {message} (HTTP {status})");
            }
        }
        anyhow::anyhow!("Cloudinary {context}: HTTP {status} - {body}")
    }
}

impl MediaBackend for CloudinaryBackend {
    fn upload(
        &self,
        path: &Path,
        file_name: &str,
        content_type: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<RemoteObject>> + Send + '_>> {
        let path = path.to_path_buf();
        let file_name = file_name.to_string();
        let content_type = content_type.to_string();
        Box::pin(async move {
            let data = tokio::fs::read(&path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to read staged file {path:?}: {e}"))?;

            let timestamp = Self::timestamp();
            let mut params = vec![("timestamp", timestamp.as_str())];
            if !self.folder.is_empty() {
                params.push(("folder", self.folder.as_str()));
            }
            let signature = sign_params(&params, &self.api_secret);

            let part = Part::bytes(data)
                .file_name(file_name.clone())
                .mime_str(&content_type)?;
            let mut form = Form::new()
                .part("file", part)
                .text("api_key", self.api_key.clone())
                .text("signature", signature)
                .text("signature_algorithm", "sha256");
            for (key, value) in params {
                form = form.text(key, value.to_string());
            }

            debug!("Cloudinary upload: file={file_name}");
            let resp = self
                .client
                .post(self.endpoint("upload"))
                .multipart(form)
                .send()
                .await?;

            let status = resp.status();
            let body = resp.text().await?;
            if !status.is_success() {
                return Err(Self::api_error(status, &body, "upload"));
            }

            let parsed: UploadResponse = serde_json::from_str(&body)
                .map_err(|e| anyhow::anyhow!("Cloudinary upload: unexpected response: {e}"))?;
            Ok(RemoteObject {
                url: parsed.secure_url,
                public_id: parsed.public_id,
            })
        })
    }

    fn delete(
        &self,
        public_id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let public_id = public_id.to_string();
        Box::pin(async move {
            let timestamp = Self::timestamp();
            let signature = sign_params(
                &[("public_id", public_id.as_str()), ("timestamp", timestamp.as_str())],
                &self.api_secret,
            );

            debug!("Cloudinary destroy: public_id={public_id}");
            let resp = self
                .client
                .post(self.endpoint("destroy"))
                .form(&[
                    ("public_id", public_id.as_str()),
                    ("timestamp", timestamp.as_str()),
                    ("api_key", self.api_key.as_str()),
                    ("signature", signature.as_str()),
                    ("signature_algorithm", "sha256"),
                ])
                .send()
                .await?;

            let status = resp.status();
            let body = resp.text().await?;
            if !status.is_success() {
                return Err(Self::api_error(status, &body, "destroy"));
            }

            let parsed: DestroyResponse = serde_json::from_str(&body)
                .map_err(|e| anyhow::anyhow!("Cloudinary destroy: unexpected response: {e}"))?;
            match parsed.result.as_str() {
                "ok" => Ok(()),
                "not found" => {
                    warn!("Cloudinary destroy: {public_id} was already gone");
                    Ok(())
                }
                other => Err(anyhow::anyhow!("Cloudinary destroy: result '{other}'")),
            }
        })
    }
}
