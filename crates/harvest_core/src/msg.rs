#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// A task was planned and is waiting to start.
    TaskQueued { task_id: crate::TaskId, url: String },
    /// Engine progress for a task.
    TaskProgress {
        task_id: crate::TaskId,
        stage: crate::TaskStage,
        bytes: Option<u64>,
    },
    /// Engine completion for a task.
    TaskDone {
        task_id: crate::TaskId,
        result: crate::TaskResultKind,
    },
}
