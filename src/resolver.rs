use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::LoadModelOptions;
use crate::{EmberError, Result};

/// Metadata for a model file that is known to exist on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    /// Model name as requested, suffix included.
    pub name: String,
    /// File name within the models directory.
    pub file_name: String,
    /// Absolute path of the model file.
    pub path: PathBuf,
    /// Source url, when the file was (or could be) downloaded.
    pub url: Option<String>,
}

/// One entry of the remote model registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    #[serde(default)]
    pub name: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,
}

/// Maps a model name to a usable local file, downloading when permitted.
#[async_trait]
pub trait ModelResolver: Send + Sync {
    async fn resolve(&self, model_name: &str, options: &LoadModelOptions) -> Result<ResolvedModel>;
}

/// Strip url query/fragment and path separators so a remote file name is safe
/// to create inside the models directory.
pub(crate) fn sanitize_file_name(file_name: &str) -> Result<String> {
    let trimmed = file_name.trim();
    let no_query = trimmed.split('?').next().unwrap_or(trimmed);
    let no_fragment = no_query.split('#').next().unwrap_or(no_query);
    let flattened = no_fragment
        .trim_start_matches('/')
        .replace('\\', "/")
        .replace('/', "__");

    let mut sanitized = String::with_capacity(flattened.len());
    for ch in flattened.chars() {
        let invalid = matches!(ch, '<' | '>' | ':' | '"' | '|' | '?' | '*');
        if invalid || ch.is_control() {
            sanitized.push('_');
        } else {
            sanitized.push(ch);
        }
    }
    while sanitized.ends_with('.') || sanitized.ends_with(' ') {
        sanitized.pop();
    }

    if sanitized.is_empty() {
        return Err(EmberError::Config(format!(
            "invalid model file name {file_name:?}"
        )));
    }
    Ok(sanitized)
}

fn file_has_content(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|metadata| metadata.len() > 0)
        .unwrap_or(false)
}

/// Resolver backed by a models directory and a plain HTTP host.
///
/// A model resolves to its cached file when one exists; otherwise the file is
/// fetched from `<base_url>/<file>` when downloads are allowed. Downloads go
/// to a `.tmp` sibling first and are renamed into place once the byte count
/// matches the advertised length. No resume and no checksum verification.
#[derive(Clone)]
pub struct HttpResolver {
    http: reqwest::Client,
    base_url: String,
    registry_url: String,
}

const DEFAULT_BASE_URL: &str = "https://gpt4all.io/models/gguf";
const DEFAULT_REGISTRY_URL: &str = "https://gpt4all.io/models/models3.json";

impl HttpResolver {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            // Model files run into the gigabytes.
            .timeout(Duration::from_secs(3600))
            .build()
            .expect("reqwest client build should not fail");

        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_registry_url(mut self, registry_url: impl Into<String>) -> Self {
        self.registry_url = registry_url.into();
        self
    }

    fn download_url(&self, file_name: &str) -> String {
        format!("{}/{file_name}", self.base_url.trim_end_matches('/'))
    }

    /// Fetch the remote model registry.
    pub async fn remote_listing(&self) -> Result<Vec<ModelDescriptor>> {
        let response = self.http.get(&self.registry_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EmberError::Download {
                status,
                url: self.registry_url.clone(),
            });
        }
        Ok(response.json::<Vec<ModelDescriptor>>().await?)
    }

    async fn download(&self, url: &str, target: &Path) -> Result<()> {
        info!(url, target = %target.display(), "downloading model");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EmberError::Download {
                status,
                url: url.to_string(),
            });
        }
        let expected = response.content_length();

        let tmp_path = target.with_extension("gguf.tmp");
        let mut tmp_file = tokio::fs::File::create(&tmp_path).await?;

        let mut response = response;
        let mut downloaded: u64 = 0;
        let outcome: Result<()> = async {
            while let Some(chunk) = response.chunk().await? {
                tmp_file.write_all(&chunk).await?;
                downloaded += chunk.len() as u64;
            }
            tmp_file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(err) = outcome {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(err);
        }

        if let Some(expected) = expected {
            if downloaded != expected {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(EmberError::Config(format!(
                    "incomplete download of {url}: got {downloaded} bytes, expected {expected}"
                )));
            }
        }

        tokio::fs::rename(&tmp_path, target).await?;
        info!(target = %target.display(), bytes = downloaded, "download complete");
        Ok(())
    }
}

impl Default for HttpResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelResolver for HttpResolver {
    async fn resolve(&self, model_name: &str, options: &LoadModelOptions) -> Result<ResolvedModel> {
        let file_name = sanitize_file_name(model_name)?;
        let path = options.model_path.join(&file_name);
        let url = self.download_url(&file_name);

        if file_has_content(&path) {
            debug!(model = model_name, path = %path.display(), "model cached locally");
            return Ok(ResolvedModel {
                name: model_name.to_string(),
                file_name,
                path,
                url: Some(url),
            });
        }

        if !options.allow_download {
            return Err(EmberError::ModelNotFound {
                name: model_name.to_string(),
            });
        }

        tokio::fs::create_dir_all(&options.model_path).await?;
        self.download(&url, &path).await?;

        Ok(ResolvedModel {
            name: model_name.to_string(),
            file_name,
            path,
            url: Some(url),
        })
    }
}
