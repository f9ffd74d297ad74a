use crate::{CompletionLog, Effect, Msg, TaskResultKind};

/// Pure update function: applies a message to the log and returns any effects.
pub fn update(mut state: CompletionLog, msg: Msg) -> (CompletionLog, Vec<Effect>) {
    let mut effects = Vec::new();
    match msg {
        Msg::TaskQueued { task_id, url } => {
            state.queue(task_id, url);
        }
        Msg::TaskProgress {
            task_id,
            stage,
            bytes,
        } => {
            state.apply_progress(task_id, stage, bytes);
        }
        Msg::TaskDone { task_id, result } => {
            if let Some(url) = state.apply_done(task_id, &result) {
                if let TaskResultKind::Failed { reason } = result {
                    effects.push(Effect::ReportFailure {
                        task_id,
                        url,
                        reason,
                    });
                }
            }
            if state.take_finished() {
                effects.push(Effect::BatchFinished(state.view()));
            }
        }
    }

    (state, effects)
}
