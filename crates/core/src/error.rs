use thiserror::Error;

/// Configuration problems: bad env values or schedule alert settings that
/// fail validation. These are never retried — they require operator action.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid alert thresholds: {0}")]
    Thresholds(String),

    #[error("alerting enabled but no delivery channels configured")]
    NoChannels,

    #[error("schedule has no deadlines")]
    NoDeadlines,

    #[error("invalid value for {key}: {value}")]
    Env { key: String, value: String },

    #[error("{0}")]
    Other(String),
}
