//! Harvest core: pure completion-log state machine and summary helpers.
mod effect;
mod msg;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use msg::Msg;
pub use state::{CompletionLog, TaskId, TaskResultKind, TaskStage};
pub use update::update;
pub use view_model::BatchSummary;
