use std::collections::BTreeMap;

use crate::view_model::BatchSummary;

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskStage {
    #[default]
    Pending,
    Streaming,
    Completed,
    Failed,
}

impl TaskStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStage::Completed | TaskStage::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResultKind {
    Success { bytes: u64 },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct TaskRecord {
    pub(crate) url: String,
    pub(crate) stage: TaskStage,
    pub(crate) bytes: Option<u64>,
}

/// Per-batch record of every task's lifecycle.
///
/// Terminal stages are sticky: once a task completed or failed, later
/// messages for it are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompletionLog {
    tasks: BTreeMap<TaskId, TaskRecord>,
    finished_reported: bool,
}

impl CompletionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.tasks.len(),
            ..BatchSummary::default()
        };
        for record in self.tasks.values() {
            match record.stage {
                TaskStage::Pending => summary.pending += 1,
                TaskStage::Streaming => summary.streaming += 1,
                TaskStage::Completed => {
                    summary.completed += 1;
                    summary.bytes_written += record.bytes.unwrap_or(0);
                }
                TaskStage::Failed => summary.failed += 1,
            }
        }
        summary
    }

    /// Re-queueing a known id is ignored.
    pub(crate) fn queue(&mut self, task_id: TaskId, url: String) {
        if self.tasks.contains_key(&task_id) {
            return;
        }
        self.tasks.insert(
            task_id,
            TaskRecord {
                url,
                ..TaskRecord::default()
            },
        );
        self.finished_reported = false;
    }

    pub(crate) fn apply_progress(&mut self, task_id: TaskId, stage: TaskStage, bytes: Option<u64>) {
        // Completion goes through `apply_done` so the outcome is recorded with it.
        if stage.is_terminal() {
            return;
        }
        let Some(record) = self.tasks.get_mut(&task_id) else {
            return;
        };
        if record.stage.is_terminal() {
            return;
        }
        if stage == TaskStage::Pending && record.stage == TaskStage::Streaming {
            return;
        }
        record.stage = stage;
        if bytes.is_some() {
            record.bytes = bytes;
        }
    }

    /// Returns the task's url when the transition was applied.
    pub(crate) fn apply_done(&mut self, task_id: TaskId, result: &TaskResultKind) -> Option<String> {
        let record = self.tasks.get_mut(&task_id)?;
        if record.stage.is_terminal() {
            return None;
        }
        match result {
            TaskResultKind::Success { bytes } => {
                record.stage = TaskStage::Completed;
                record.bytes = Some(*bytes);
            }
            TaskResultKind::Failed { .. } => {
                record.stage = TaskStage::Failed;
                record.bytes = None;
            }
        }
        Some(record.url.clone())
    }

    /// True once, the first time every queued task is terminal.
    pub(crate) fn take_finished(&mut self) -> bool {
        if self.finished_reported || self.tasks.is_empty() {
            return false;
        }
        if self.tasks.values().all(|record| record.stage.is_terminal()) {
            self.finished_reported = true;
            return true;
        }
        false
    }
}
