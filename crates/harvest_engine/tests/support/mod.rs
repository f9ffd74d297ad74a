//! Test doubles shared by the engine integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use harvest_engine::{
    EngineEvent, FailureKind, FetchError, FetchMetadata, FetchOutput, FetchRequest, Fetcher,
    ProgressSink, ResponseStream,
};

/// Scripted response for one url.
#[derive(Clone)]
pub enum Script {
    /// Serve the chunks, then end the body.
    Body(Vec<&'static [u8]>),
    /// Serve the chunks, then fail the stream with a network error.
    BreakAfter(Vec<&'static [u8]>),
    /// Fail before any body is produced.
    Status(u16),
}

#[derive(Default)]
pub struct FakeFetcher {
    scripts: HashMap<String, Script>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, script: Script) -> Self {
        self.scripts.insert(url.to_string(), script);
        self
    }

    fn metadata(url: &str, content_length: Option<u64>) -> FetchMetadata {
        FetchMetadata {
            original_url: url.to_string(),
            final_url: url.to_string(),
            redirect_count: 0,
            content_type: Some("application/octet-stream".to_string()),
            content_length,
        }
    }

    fn script(&self, url: &str) -> Result<Script, FetchError> {
        self.scripts
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::new(FailureKind::Network, format!("no script for {url}")))
    }
}

#[async_trait::async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchOutput, FetchError> {
        let mut response = self.open_stream(request).await?;
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunks.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        Ok(FetchOutput {
            bytes,
            metadata: response.metadata,
        })
    }

    async fn open_stream(&self, request: &FetchRequest) -> Result<ResponseStream, FetchError> {
        let url = request.url.as_str();
        let (chunks, broken) = match self.script(url)? {
            Script::Status(code) => {
                return Err(FetchError::new(FailureKind::HttpStatus(code), code.to_string()))
            }
            Script::Body(chunks) => (chunks, false),
            Script::BreakAfter(chunks) => (chunks, true),
        };
        let total: u64 = chunks.iter().map(|c| c.len() as u64).sum();
        let mut items: Vec<Result<Bytes, FetchError>> = chunks
            .into_iter()
            .map(|c| Ok(Bytes::from_static(c)))
            .collect();
        if broken {
            items.push(Err(FetchError::new(FailureKind::Network, "connection reset")));
        }
        Ok(ResponseStream {
            metadata: Self::metadata(url, (!broken).then_some(total)),
            chunks: stream::iter(items).boxed(),
        })
    }
}

#[derive(Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}
