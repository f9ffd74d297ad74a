use crate::{BatchSummary, TaskId};

/// Side effects the caller performs after an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// One line per failed task naming the url and reason.
    ReportFailure {
        task_id: TaskId,
        url: String,
        reason: String,
    },
    /// Every queued task reached a terminal stage.
    BatchFinished(BatchSummary),
}
