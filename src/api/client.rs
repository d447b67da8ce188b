use futures::Stream;
use futures::TryStreamExt;
use regex::Regex;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::Client;
use thiserror::Error;
use url::Url;

use super::models::ClientConfig;
use crate::domain::{DownloadRequest, SavePageFormat};
use crate::utils::sanitize_filename;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// HTTP side of the download engine: turns URLs into requests and streams bodies.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: ClientConfig,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Self {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client, using defaults: {}", e);
                Client::new()
            });
        Self { client, config }
    }

    /// Builds a download request for `input`, asking the server for a file name.
    ///
    /// A failing `HEAD` is not fatal; the name then comes from the URL.
    pub async fn prepare_request(&self, input: &str, save_page: bool) -> Result<DownloadRequest> {
        let url = Url::parse(input.trim())?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ApiError::UnsupportedScheme(url.scheme().to_string()));
        }

        let from_server = match self.client.head(url.clone()).send().await {
            Ok(response) if response.status().is_success() => response
                .headers()
                .get(CONTENT_DISPOSITION)
                .and_then(|value| value.to_str().ok())
                .and_then(filename_from_content_disposition),
            Ok(response) => {
                tracing::debug!("HEAD {} returned {}", url, response.status());
                None
            }
            Err(e) => {
                tracing::debug!("HEAD {} failed: {}", url, e);
                None
            }
        };

        let mut name = from_server
            .or_else(|| filename_from_url(&url))
            .unwrap_or_else(|| self.config.fallback_filename.clone());

        let request = if save_page {
            if !name.contains('.') {
                name.push_str(".html");
            }
            DownloadRequest::new(url, name).save_page(SavePageFormat::SingleHtml)
        } else {
            DownloadRequest::new(url, name)
        };
        Ok(request)
    }

    /// Download file with progress stream
    /// Returns (total_size, stream)
    pub async fn download_file_stream(
        &self,
        url: &Url,
    ) -> Result<(Option<u64>, impl Stream<Item = Result<bytes::Bytes>>)> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;

        let total_size = response.content_length();
        let stream = response.bytes_stream().map_err(ApiError::RequestError);

        Ok((total_size, stream))
    }
}

/// Extracts the file name from a `Content-Disposition` header value.
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    // RFC 5987 form takes precedence over the plain one
    let extended = Regex::new(r#"(?i)filename\*\s*=\s*[\w-]*'[^']*'([^;]+)"#).ok()?;
    if let Some(caps) = extended.captures(header) {
        let decoded = urlencoding::decode(caps[1].trim()).ok()?;
        return non_empty(sanitize_filename(&decoded));
    }

    let plain = Regex::new(r#"(?i)filename\s*=\s*(?:"([^"]*)"|([^;]+))"#).ok()?;
    let caps = plain.captures(header)?;
    let raw = caps.get(1).or_else(|| caps.get(2))?.as_str().trim();
    non_empty(sanitize_filename(raw))
}

/// Last non-empty path segment, percent-decoded.
pub fn filename_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.rev().find(|s| !s.is_empty())?;
    let decoded = urlencoding::decode(segment).ok()?;
    non_empty(sanitize_filename(&decoded))
}

fn non_empty(name: String) -> Option<String> {
    let name = name.trim_matches(|c| c == '.' || c == ' ').to_string();
    (!name.is_empty()).then_some(name)
}
