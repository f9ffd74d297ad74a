use std::sync::{Mutex, MutexGuard};

use harvest_core::{update, BatchSummary, CompletionLog, Effect, Msg, TaskResultKind, TaskStage};
use harvest_engine::{DownloadTask, EngineEvent, ProgressSink, Stage};
use harvest_logging::{harvest_info, harvest_warn};

/// Feeds engine events into the completion log and runs the effects it returns.
#[derive(Default)]
pub struct ProgressBridge {
    log: Mutex<CompletionLog>,
}

impl ProgressBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, tasks: &[DownloadTask]) {
        for task in tasks {
            self.dispatch(Msg::TaskQueued {
                task_id: task.task_id,
                url: task.source_url.clone(),
            });
        }
    }

    pub fn summary(&self) -> BatchSummary {
        self.lock().view()
    }

    fn lock(&self) -> MutexGuard<'_, CompletionLog> {
        // The log stays consistent even if a holder panicked mid-update.
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn dispatch(&self, msg: Msg) {
        let effects = {
            let mut guard = self.lock();
            let state = std::mem::take(&mut *guard);
            let (next, effects) = update(state, msg);
            *guard = next;
            effects
        };
        for effect in effects {
            run_effect(effect);
        }
    }
}

impl ProgressSink for ProgressBridge {
    fn emit(&self, event: EngineEvent) {
        self.dispatch(map_event(event));
    }
}

fn map_event(event: EngineEvent) -> Msg {
    match event {
        EngineEvent::Progress(progress) => Msg::TaskProgress {
            task_id: progress.task_id,
            stage: map_stage(progress.stage),
            bytes: progress.bytes,
        },
        EngineEvent::TaskCompleted {
            task_id, result, ..
        } => Msg::TaskDone {
            task_id,
            result: match result {
                Ok(bytes) => TaskResultKind::Success { bytes },
                Err(err) => TaskResultKind::Failed {
                    reason: err.to_string(),
                },
            },
        },
    }
}

fn run_effect(effect: Effect) {
    match effect {
        Effect::ReportFailure {
            task_id,
            url,
            reason,
        } => {
            harvest_warn!("Task {} failed: {} ({})", task_id, url, reason);
        }
        Effect::BatchFinished(summary) => {
            harvest_info!(
                "Batch finished: completed={} failed={} bytes={}",
                summary.completed,
                summary.failed,
                summary.bytes_written
            );
        }
    }
}

fn map_stage(stage: Stage) -> TaskStage {
    match stage {
        Stage::Pending => TaskStage::Pending,
        Stage::Streaming => TaskStage::Streaming,
        Stage::Completed => TaskStage::Completed,
        Stage::Failed => TaskStage::Failed,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use harvest_engine::{FailureKind, FetchError, TaskProgress};
    use pretty_assertions::assert_eq;

    use super::*;

    fn task(task_id: u64) -> DownloadTask {
        DownloadTask {
            task_id,
            source_url: format!("http://h/{task_id}.jpg"),
            destination_path: PathBuf::from(format!("{task_id}.jpg")),
        }
    }

    #[test]
    fn events_fold_into_summary() {
        let bridge = ProgressBridge::new();
        bridge.queue(&[task(0), task(1)]);

        bridge.emit(EngineEvent::Progress(TaskProgress {
            task_id: 0,
            stage: Stage::Streaming,
            bytes: Some(10),
        }));
        assert_eq!(bridge.summary().streaming, 1);

        bridge.emit(EngineEvent::TaskCompleted {
            task_id: 0,
            url: "http://h/0.jpg".to_string(),
            result: Ok(10),
        });
        bridge.emit(EngineEvent::TaskCompleted {
            task_id: 1,
            url: "http://h/1.jpg".to_string(),
            result: Err(FetchError::new(FailureKind::HttpStatus(404), "404")),
        });

        let summary = bridge.summary();
        assert_eq!(
            (summary.total, summary.completed, summary.failed, summary.bytes_written),
            (2, 1, 1, 10)
        );
        assert!(summary.is_finished());
    }

    #[test]
    fn failure_reason_keeps_status_code() {
        let msg = map_event(EngineEvent::TaskCompleted {
            task_id: 3,
            url: "http://h/3.jpg".to_string(),
            result: Err(FetchError::new(FailureKind::HttpStatus(404), "404")),
        });
        assert_eq!(
            msg,
            Msg::TaskDone {
                task_id: 3,
                result: TaskResultKind::Failed {
                    reason: "http status 404: 404".to_string()
                },
            }
        );
    }
}
