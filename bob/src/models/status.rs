//! Outcome of a single queued command.

use serde::{Deserialize, Serialize};

use crate::process::EXEC_FAILED;

/// Status of a command after a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    /// Command never finished (not launched, or killed).
    Pending,
    /// Command exited with status 0.
    Succeeded,
    /// Command exited with a non-zero status.
    Failed,
    /// Program could not be executed.
    Unrunnable,
}

impl CommandStatus {
    /// Classify an exit code as recorded by the runner.
    pub const fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            None => Self::Pending,
            Some(0) => Self::Succeeded,
            Some(EXEC_FAILED) => Self::Unrunnable,
            Some(_) => Self::Failed,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Unrunnable => "unrunnable",
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_exit_code() {
        assert_eq!(CommandStatus::from_exit_code(None), CommandStatus::Pending);
        assert_eq!(CommandStatus::from_exit_code(Some(0)), CommandStatus::Succeeded);
        assert_eq!(CommandStatus::from_exit_code(Some(2)), CommandStatus::Failed);
        assert_eq!(
            CommandStatus::from_exit_code(Some(EXEC_FAILED)),
            CommandStatus::Unrunnable
        );
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&CommandStatus::Unrunnable).unwrap();
        assert_eq!(json, "\"unrunnable\"");
        assert_eq!(CommandStatus::Failed.to_string(), "failed");
    }
}
