use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use harvest_logging::harvest_debug;
use reqwest::header::CONTENT_TYPE;

use crate::{EngineEvent, FailureKind, FetchError, FetchMetadata, FetchOutput, FetchRequest};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    /// Cap for buffered fetches. Streamed bodies are capped by the download sink.
    pub max_bytes: u64,
    /// Empty means every content type is accepted.
    pub allowed_content_types: Vec<String>,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            allowed_content_types: Vec::new(),
            user_agent: concat!("harvest/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl FetchSettings {
    /// Settings for fetching pages that will be handed to the extractor.
    pub fn for_documents() -> Self {
        Self {
            allowed_content_types: vec![
                "text/html".to_string(),
                "application/xhtml+xml".to_string(),
            ],
            ..Self::default()
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Response whose body has not been read yet.
pub struct ResponseStream {
    pub metadata: FetchMetadata,
    pub chunks: BoxStream<'static, Result<Bytes, FetchError>>,
}

impl std::fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches the whole body into memory.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchOutput, FetchError>;

    /// Sends the request and hands back the body as a stream of chunks.
    async fn open_stream(&self, request: &FetchRequest) -> Result<ResponseStream, FetchError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    settings: FetchSettings,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    fn build_client(&self, redirect_counter: Arc<AtomicUsize>) -> Result<reqwest::Client, FetchError> {
        let redirect_limit = self.settings.redirect_limit;
        let policy = reqwest::redirect::Policy::custom(move |attempt| {
            let count = attempt.previous().len();
            redirect_counter.store(count, Ordering::Relaxed);
            if count >= redirect_limit {
                attempt.error("redirect limit exceeded")
            } else {
                attempt.follow()
            }
        });

        reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .user_agent(self.settings.user_agent.clone())
            .redirect(policy)
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))
    }

    fn is_content_type_allowed(&self, content_type: &str) -> bool {
        if self.settings.allowed_content_types.is_empty() {
            return true;
        }
        let ct = content_type.split(';').next().unwrap_or(content_type).trim();
        self.settings
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ct))
    }

    /// Validates the url, sends the GET and checks status and content type.
    async fn send(&self, request: &FetchRequest) -> Result<(reqwest::Response, FetchMetadata), FetchError> {
        let parsed = parse_absolute_url(&request.url)?;
        let redirect_counter = Arc::new(AtomicUsize::new(0));
        let client = self.build_client(redirect_counter.clone())?;

        let mut builder = client.get(parsed);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        let response = builder.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.as_u16().to_string(),
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        if let Some(ct) = content_type.as_deref() {
            if !self.is_content_type_allowed(ct) {
                return Err(FetchError::new(
                    FailureKind::UnsupportedContentType {
                        content_type: ct.to_string(),
                    },
                    "unsupported content type",
                ));
            }
        }

        let metadata = FetchMetadata {
            original_url: request.url.clone(),
            final_url: response.url().to_string(),
            redirect_count: redirect_counter.load(Ordering::Relaxed),
            content_type,
            content_length: response.content_length(),
        };
        harvest_debug!(
            "GET {} -> {} (redirects={}, content_length={:?})",
            metadata.original_url,
            status,
            metadata.redirect_count,
            metadata.content_length
        );

        Ok((response, metadata))
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchOutput, FetchError> {
        let (response, metadata) = self.send(request).await?;

        if let Some(content_len) = metadata.content_length {
            if content_len > self.settings.max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes: self.settings.max_bytes,
                        actual: Some(content_len),
                    },
                    "response too large",
                ));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > self.settings.max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes: self.settings.max_bytes,
                        actual: Some(next_len),
                    },
                    "response too large",
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchOutput { bytes, metadata })
    }

    async fn open_stream(&self, request: &FetchRequest) -> Result<ResponseStream, FetchError> {
        let (response, metadata) = self.send(request).await?;
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_reqwest_error))
            .boxed();
        Ok(ResponseStream { metadata, chunks })
    }
}

/// Only absolute urls are fetchable; relative references are rejected up front.
pub fn parse_absolute_url(raw: &str) -> Result<url::Url, FetchError> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|err| FetchError::new(FailureKind::InvalidUrl, format!("{raw}: {err}")))?;
    if parsed.cannot_be_a_base() || parsed.host_str().is_none() {
        return Err(FetchError::new(
            FailureKind::InvalidUrl,
            format!("{raw}: not an absolute http url"),
        ));
    }
    Ok(parsed)
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FailureKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}
