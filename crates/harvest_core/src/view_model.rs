#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub pending: usize,
    pub streaming: usize,
    pub completed: usize,
    pub failed: usize,
    pub bytes_written: u64,
}

impl BatchSummary {
    pub fn is_finished(&self) -> bool {
        self.total > 0 && self.completed + self.failed == self.total
    }
}
