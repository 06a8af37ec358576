use thiserror::Error;

use duewatch_core::{ConfigError, ScheduleId};

use crate::store::StoreError;

/// Engine-level failures, split along the lines callers care about:
/// transient store trouble is retryable next cycle, config problems need an
/// operator, and a missing schedule is a caller mistake.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("schedule not found: {0}")]
    ScheduleNotFound(ScheduleId),
}
