//! Job message domain types

use serde::{Deserialize, Serialize};

/// A user visible message attached to a job or executor job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub level: MessageLevel,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

impl JobMessage {
    pub fn new(level: MessageLevel, text: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            level,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(MessageLevel::Info, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(MessageLevel::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(MessageLevel::Error, text)
    }
}
