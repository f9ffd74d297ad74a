use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use harvest_logging::{harvest_debug, harvest_warn};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::fetch::{Fetcher, ProgressSink, ResponseStream};
use crate::{
    DownloadTask, EngineEvent, FailureKind, FetchError, FetchRequest, Stage, TaskProgress,
};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("write to {path} failed: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("download exceeds {max_bytes} bytes")]
    TooLarge { max_bytes: u64 },
}

impl SinkError {
    fn io(path: &Path, source: io::Error) -> Self {
        SinkError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    /// Flattens the error into the engine's failure vocabulary for events.
    pub fn to_fetch_error(&self) -> FetchError {
        match self {
            SinkError::Fetch(err) => err.clone(),
            SinkError::Io { .. } => FetchError::new(FailureKind::Storage, self.to_string()),
            SinkError::TooLarge { max_bytes } => FetchError::new(
                FailureKind::TooLarge {
                    max_bytes: *max_bytes,
                    actual: None,
                },
                self.to_string(),
            ),
        }
    }
}

/// Streams response bodies straight to disk, one file per task.
#[derive(Clone)]
pub struct DownloadSink {
    fetcher: Arc<dyn Fetcher>,
    timeout: Option<Duration>,
    max_bytes: Option<u64>,
}

impl DownloadSink {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            timeout: None,
            max_bytes: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: Option<u64>) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Downloads `task.source_url` into `task.destination_path`.
    ///
    /// The file is created only once the response headers arrived. If anything
    /// fails after that, the partial file is removed before the error is
    /// returned. Returns the number of bytes written.
    pub async fn persist(&self, task: &DownloadTask, progress: &dyn ProgressSink) -> Result<u64, SinkError> {
        emit_stage(progress, task, Stage::Pending, None);

        let request = FetchRequest {
            url: task.source_url.clone(),
            timeout: self.timeout,
        };
        let response = self.fetcher.open_stream(&request).await?;

        if let (Some(max_bytes), Some(len)) = (self.max_bytes, response.metadata.content_length) {
            if len > max_bytes {
                return Err(SinkError::TooLarge { max_bytes });
            }
        }

        let path = task.destination_path.as_path();
        let mut file = File::create(path).await.map_err(|e| SinkError::io(path, e))?;
        emit_stage(progress, task, Stage::Streaming, Some(0));

        let result = self.write_body(&mut file, response, task, progress).await;
        drop(file);

        if let Err(err) = &result {
            remove_partial(path).await;
            harvest_debug!("Task {} cleaned up after: {}", task.task_id, err);
        }
        result
    }

    async fn write_body(
        &self,
        file: &mut File,
        response: ResponseStream,
        task: &DownloadTask,
        progress: &dyn ProgressSink,
    ) -> Result<u64, SinkError> {
        let path = task.destination_path.as_path();
        let mut written: u64 = 0;
        let mut chunks = response.chunks;
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            if let Some(max_bytes) = self.max_bytes {
                if written > max_bytes {
                    return Err(SinkError::TooLarge { max_bytes });
                }
            }
            file.write_all(&chunk).await.map_err(|e| SinkError::io(path, e))?;
            emit_stage(progress, task, Stage::Streaming, Some(written));
        }
        file.flush().await.map_err(|e| SinkError::io(path, e))?;
        file.sync_all().await.map_err(|e| SinkError::io(path, e))?;
        Ok(written)
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => harvest_warn!("Could not remove partial file {}: {}", path.display(), err),
    }
}

fn emit_stage(progress: &dyn ProgressSink, task: &DownloadTask, stage: Stage, bytes: Option<u64>) {
    progress.emit(EngineEvent::Progress(TaskProgress {
        task_id: task.task_id,
        stage,
        bytes,
    }));
}
