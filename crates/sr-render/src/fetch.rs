//! Asset fetching into job scratch space.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sr_core::config::FetchConfig;
use sr_core::{Error, Result};
use tokio::io::AsyncWriteExt;

/// Downloads a remote or local asset to a local path.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Write the asset at `url` to `dest`, returning the bytes written.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Fetches `http(s)://` URLs with reqwest. `file://` URLs and plain paths
/// are copied only when they resolve inside the configured local root.
pub struct HttpFetcher {
    client: reqwest::Client,
    local_root: Option<PathBuf>,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            local_root: config.local_root.clone(),
        })
    }

    /// Resolve a local source, refusing anything outside `local_root`.
    async fn confine(&self, url: &str, source: &Path) -> Result<PathBuf> {
        let Some(ref root) = self.local_root else {
            return Err(Error::fetch(url, "local paths are not allowed"));
        };
        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(|e| Error::fetch(url, format!("local root {}: {e}", root.display())))?;
        let resolved = tokio::fs::canonicalize(source)
            .await
            .map_err(|e| Error::fetch(url, e))?;
        if !resolved.starts_with(&root) {
            return Err(Error::fetch(url, "path is outside the local asset root"));
        }
        Ok(resolved)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(url, format!("HTTP {status}")));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(|e| Error::fetch(url, e))? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        let written = match classify(url) {
            Source::Remote => self.download(url, dest).await?,
            Source::Local(path) => {
                let source = self.confine(url, &path).await?;
                tokio::fs::copy(&source, dest)
                    .await
                    .map_err(|e| Error::fetch(url, e))?
            }
            Source::Unsupported => return Err(Error::fetch(url, "unsupported scheme")),
        };

        if written == 0 {
            return Err(Error::fetch(url, "empty response body"));
        }
        tracing::debug!(url, bytes = written, "fetched {:?}", dest);
        Ok(written)
    }
}

#[derive(Debug, PartialEq)]
enum Source {
    Remote,
    Local(PathBuf),
    Unsupported,
}

fn classify(url: &str) -> Source {
    if url.starts_with("http://") || url.starts_with("https://") {
        return Source::Remote;
    }
    if let Some(rest) = url.strip_prefix("file://") {
        return Source::Local(PathBuf::from(rest));
    }
    if url.contains("://") || url.trim().is_empty() {
        return Source::Unsupported;
    }
    Source::Local(PathBuf::from(url))
}

/// File extension to use for an asset, taken from the URL path when it
/// looks like one, else `fallback`.
pub fn extension_for(url: &str, fallback: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => fallback.to_string(),
    }
}
