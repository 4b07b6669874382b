//! Model downloading for the tagger's resource pair.
//!
//! Fetches `<name>.onnx` and `<name>.csv` from the WD14 model collection on
//! Hugging Face, or from its mirror when the caller is located in mainland
//! China. Server errors and dropped connections are retried with exponential
//! backoff; everything else fails immediately.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use reqwest::{Client, Response, StatusCode};
use tokio::{fs, io::AsyncWriteExt};

use crate::{
    error::{Result, TaggerError},
    file::ModelFiles,
};

pub const HUGGINGFACE_BASE_URL: &str = "https://huggingface.co/honmo/wd14-collection/resolve/main";
pub const MIRROR_BASE_URL: &str = "https://hf-mirror.com/honmo/wd14-collection/resolve/main";
pub const REGION_LOOKUP_URL: &str = "https://ipapi.co/country/";

/// Region assumed when the lookup fails.
const FALLBACK_REGION: &str = "CN";

/// Retry behaviour for transient HTTP failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 1000,
        }
    }
}

/// Status codes worth another attempt.
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 500 | 502 | 503 | 504)
}

/// `base_delay * 2^attempt`, capped at 30 seconds.
pub fn backoff_duration(attempt: u32, base_delay_ms: u64) -> Duration {
    let delay = base_delay_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(delay.min(30_000))
}

pub fn base_url_for_region(country_code: &str) -> &'static str {
    if country_code.trim().eq_ignore_ascii_case("CN") {
        MIRROR_BASE_URL
    } else {
        HUGGINGFACE_BASE_URL
    }
}

/// Looks up the caller's country code, defaulting to `CN` on any failure.
pub async fn detect_region(client: &Client) -> String {
    let lookup = async {
        let response = client
            .get(REGION_LOOKUP_URL)
            .timeout(Duration::from_secs(5))
            .send()
            .await?
            .error_for_status()?;
        response.text().await
    };
    match lookup.await {
        Ok(code) if !code.trim().is_empty() => code.trim().to_string(),
        Ok(_) => FALLBACK_REGION.to_string(),
        Err(e) => {
            tracing::debug!(error = %e, "region lookup failed");
            FALLBACK_REGION.to_string()
        }
    }
}

/// Downloads model resource pairs into a local directory.
#[derive(Debug, Clone)]
pub struct ModelDownloader {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
    progress: bool,
}

impl ModelDownloader {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
            progress: false,
        })
    }

    /// Picks the download source from the caller's region.
    pub async fn for_current_region() -> Result<Self> {
        let mut downloader = Self::new(HUGGINGFACE_BASE_URL)?;
        let region = detect_region(&downloader.client).await;
        downloader.base_url = base_url_for_region(&region).to_string();
        tracing::info!(%region, base_url = %downloader.base_url, "selected download source");
        Ok(downloader)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Draws a per-file progress bar on stderr while streaming.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn file_url(&self, file_name: &str) -> String {
        format!("{}/{}?download=true", self.base_url, file_name)
    }

    /// Downloads the model and tag listing of `files`, skipping files that
    /// already exist. Returns the local paths of both files.
    pub async fn download_model(&self, files: &ModelFiles) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(files.dir()).await?;

        let mut paths = Vec::new();
        for (file_name, dest) in [
            (files.model_file_name(), files.model_path()),
            (files.tags_file_name(), files.tags_path()),
        ] {
            if dest.exists() {
                tracing::info!(file = %file_name, "file already exists, skipping");
            } else {
                let bytes = self.download_file(&self.file_url(&file_name), &dest).await?;
                tracing::info!(file = %file_name, bytes, "downloaded");
            }
            paths.push(dest);
        }
        Ok(paths)
    }

    /// Streams `url` into `dest` through a `.part` file.
    async fn download_file(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self.get_with_retry(url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(TaggerError::NotFound(PathBuf::from(url)));
        }
        if !response.status().is_success() {
            return Err(TaggerError::Network(format!(
                "Failed to download file: {} ({})",
                url,
                response.status()
            )));
        }

        let expected = response.content_length();
        let part = dest.with_extension(match dest.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.part", ext),
            None => "part".to_string(),
        });

        let progress = self.progress_bar(expected, dest);
        let written = match stream_to_file(response, &part, &progress).await {
            Ok(written) => written,
            Err(e) => {
                progress.abandon();
                let _ = fs::remove_file(&part).await;
                return Err(e);
            }
        };

        if let Some(expected) = expected.filter(|&n| n != 0) {
            if expected != written {
                progress.abandon();
                let _ = fs::remove_file(&part).await;
                return Err(TaggerError::CorruptResource {
                    path: dest.to_path_buf(),
                    reason: format!("expected {} bytes, received {}", expected, written),
                });
            }
        }

        progress.finish();
        fs::rename(&part, dest).await?;
        Ok(written)
    }

    fn progress_bar(&self, total: Option<u64>, dest: &Path) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::with_draw_target(total, ProgressDrawTarget::stderr());
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
        )
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        if let Some(name) = dest.file_name() {
            bar.set_message(name.to_string_lossy().into_owned());
        }
        bar
    }

    async fn get_with_retry(&self, url: &str) -> Result<Response> {
        let mut attempt = 0;
        loop {
            tracing::debug!(%url, attempt, "requesting");
            let outcome = self.client.get(url).send().await;
            let retryable = match &outcome {
                Ok(response) => is_retryable_status(response.status()),
                Err(e) => e.is_connect() || e.is_timeout(),
            };
            if !retryable || attempt >= self.retry.max_retries {
                return match outcome {
                    Ok(response) if is_retryable_status(response.status()) => {
                        Err(TaggerError::Network(format!(
                            "{} still failing with {} after {} retries",
                            url,
                            response.status(),
                            attempt
                        )))
                    }
                    other => Ok(other?),
                };
            }
            let delay = backoff_duration(attempt, self.retry.base_delay_ms);
            tracing::warn!(%url, attempt, ?delay, "transient download failure, retrying");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Writes the response body to `path`, returning the byte count.
async fn stream_to_file(response: Response, path: &Path, progress: &ProgressBar) -> Result<u64> {
    let mut file = fs::File::create(path).await?;
    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        progress.inc(chunk.len() as u64);
    }
    file.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_base_url_for_region() {
        assert_eq!(base_url_for_region("CN"), MIRROR_BASE_URL);
        assert_eq!(base_url_for_region("cn\n"), MIRROR_BASE_URL);
        assert_eq!(base_url_for_region("US"), HUGGINGFACE_BASE_URL);
    }

    #[test]
    fn test_retryable_statuses() {
        for code in [500, 502, 503, 504] {
            assert!(is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
        for code in [200, 404, 429, 501] {
            assert!(!is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
    }

    #[test]
    fn test_backoff_exponential() {
        assert_eq!(backoff_duration(0, 1000), Duration::from_millis(1000));
        assert_eq!(backoff_duration(1, 1000), Duration::from_millis(2000));
        assert_eq!(backoff_duration(3, 1000), Duration::from_millis(8000));
        assert_eq!(backoff_duration(10, 1000), Duration::from_millis(30_000));
    }

    #[test]
    fn test_file_url() {
        let downloader = ModelDownloader::new("http://localhost:8080/").unwrap();
        assert_eq!(
            downloader.file_url("m.csv"),
            "http://localhost:8080/m.csv?download=true"
        );
    }
}
