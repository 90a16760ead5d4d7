//! Publishing a finished render.
//!
//! The local output is removed only after the store confirms the upload.
//! A failed upload never fails the job: the local file is kept and its
//! local URL reported together with a [`PublishWarning`].

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use reelsmith_common::config::StorageConfig;
use reelsmith_common::error::{ReelError, ReelResult};

use crate::probe::MediaProber;
use crate::workdir::{ScratchFiles, WorkDir};

/// Remote storage for rendered videos.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `local` as `name` and return its public URL.
    async fn upload(&self, local: &Path, name: &str) -> ReelResult<String>;
}

/// Object storage that accepts plain HTTP PUTs (S3-compatible presigned or
/// token-authenticated endpoints).
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    config: StorageConfig,
}

impl HttpObjectStore {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Object key for a file name.
    pub fn key_for(&self, name: &str) -> String {
        let prefix = self.config.key_prefix.trim_matches('/');
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}/{name}")
        }
    }

    fn url(base: &str, key: &str) -> String {
        format!("{}/{key}", base.trim_end_matches('/'))
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn upload(&self, local: &Path, name: &str) -> ReelResult<String> {
        let key = self.key_for(name);
        let file = File::open(local).await?;
        let size = file.metadata().await?.len();
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));

        let mut request = self
            .client
            .put(Self::url(&self.config.upload_base_url, &key))
            .header("Content-Type", "video/mp4")
            .header("Content-Length", size)
            .body(body);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }
        if self.config.public_read {
            request = request.header("x-amz-acl", "public-read");
        }

        let response = request
            .send()
            .await
            .map_err(|e| ReelError::upload(format!("Upload request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(ReelError::upload(format!(
                "Upload failed with status: {}",
                response.status()
            )));
        }

        tracing::info!(key = %key, bytes = size, "Uploaded render");
        Ok(Self::url(&self.config.public_base_url, &key))
    }
}

/// A publish step that degraded instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishWarning {
    pub message: String,
}

impl fmt::Display for PublishWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "publish warning: {}", self.message)
    }
}

/// Result of publishing one output.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub video_url: String,
    pub file_path: PathBuf,
    pub duration_secs: f64,
    pub warning: Option<PublishWarning>,
}

/// Measures, uploads and reports a rendered file.
pub struct ResultPublisher<'a> {
    prober: &'a dyn MediaProber,
    store: Option<&'a dyn ObjectStore>,
    local_url_prefix: &'a str,
}

impl<'a> ResultPublisher<'a> {
    pub fn new(
        prober: &'a dyn MediaProber,
        store: Option<&'a dyn ObjectStore>,
        local_url_prefix: &'a str,
    ) -> Self {
        Self {
            prober,
            store,
            local_url_prefix,
        }
    }

    pub fn local_url(&self, job_id: &str) -> String {
        format!(
            "{}/{}",
            self.local_url_prefix.trim_end_matches('/'),
            WorkDir::output_file_name(job_id)
        )
    }

    pub async fn publish(&self, job_id: &str, output: &Path, target_secs: f64) -> Published {
        let duration_secs = match self.prober.duration_secs(output).await {
            Some(secs) => secs,
            None => {
                tracing::warn!(job_id, "Could not probe output duration, reporting the target");
                target_secs
            }
        };

        let Some(store) = self.store else {
            return Published {
                video_url: self.local_url(job_id),
                file_path: output.to_path_buf(),
                duration_secs,
                warning: None,
            };
        };

        match store.upload(output, &WorkDir::output_file_name(job_id)).await {
            Ok(url) => {
                if let Err(e) = tokio::fs::remove_file(output).await {
                    tracing::warn!(job_id, error = %e, "Uploaded, but failed to remove local output");
                }
                Published {
                    video_url: url,
                    file_path: output.to_path_buf(),
                    duration_secs,
                    warning: None,
                }
            }
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Upload failed, keeping local output");
                Published {
                    video_url: self.local_url(job_id),
                    file_path: output.to_path_buf(),
                    duration_secs,
                    warning: Some(PublishWarning {
                        message: e.to_string(),
                    }),
                }
            }
        }
    }
}

/// Remove the job's intermediates. Runs on every exit path.
pub async fn release_intermediates(scratch: &mut ScratchFiles, job_id: &str) {
    let removed = scratch.cleanup().await;
    tracing::debug!(job_id, removed, "Released intermediates");
}
