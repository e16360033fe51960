//! Concurrent picture downloads for the enrichment stage.
//!
//! Pictures are fetched by a bounded pool (`buffer_unordered`) and stored as
//! `<output>/images/<random>.png`. A failed download is logged and leaves
//! that article without an image; it never fails the work item.

use crate::utils::random_file_name;
use futures::stream::{self, StreamExt};
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument, warn};
use url::Url;

const NAME_LEN: usize = 10;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid picture url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered {0}")]
    Status(StatusCode),

    #[error("could not store picture: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ImagePool {
    client: Client,
    dir: PathBuf,
    workers: usize,
    base_url: Option<Url>,
}

impl ImagePool {
    /// Pool writing into `<output_dir>/images`, created if missing.
    pub async fn new(output_dir: &Path, workers: usize) -> std::io::Result<Self> {
        let dir = output_dir.join("images");
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            client: Client::new(),
            dir,
            workers: workers.max(1),
            base_url: None,
        })
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Resolve relative picture sources against `base`.
    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base_url = Some(base);
        self
    }

    fn resolve(&self, src: &str) -> Result<Url, DownloadError> {
        match (Url::parse(src), &self.base_url) {
            (Ok(url), _) => Ok(url),
            (Err(url::ParseError::RelativeUrlWithoutBase), Some(base)) => Ok(base.join(src)?),
            (Err(e), _) => Err(e.into()),
        }
    }

    async fn download(&self, src: &str) -> Result<PathBuf, DownloadError> {
        let url = self.resolve(src)?;
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(DownloadError::Status(response.status()));
        }
        let bytes = response.bytes().await?;
        let path = self.dir.join(random_file_name(NAME_LEN, "png"));
        fs::write(&path, &bytes).await?;
        Ok(path)
    }

    /// Download every non-empty source. The result is aligned with `sources`.
    #[instrument(level = "info", skip_all, fields(count = sources.len(), workers = self.workers))]
    pub async fn download_all(&self, sources: &[String]) -> Vec<Option<PathBuf>> {
        let mut paths = vec![None; sources.len()];
        let results: Vec<(usize, Option<PathBuf>)> = stream::iter(sources.iter().enumerate())
            .filter(|(_, src)| std::future::ready(!src.trim().is_empty()))
            .map(|(i, src)| async move {
                match self.download(src).await {
                    Ok(path) => {
                        debug!(%src, path = %path.display(), "Downloaded picture");
                        (i, Some(path))
                    }
                    Err(e) => {
                        warn!(%src, error = %e, "Failed to download picture");
                        (i, None)
                    }
                }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut stored = 0usize;
        for (i, path) in results {
            stored += usize::from(path.is_some());
            paths[i] = path;
        }
        info!(stored, "Pictures downloaded");
        paths
    }
}
