use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Error,
    Skipped,
}

/// Structured result returned by every job handler: `{status, message|error|result}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl JobOutcome {
    #[must_use]
    pub fn success(result: Value) -> Self {
        Self {
            status: OutcomeStatus::Success,
            message: None,
            error: None,
            result: Some(result),
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Skipped,
            message: Some(message.into()),
            error: None,
            result: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Error,
            message: None,
            error: Some(error.into()),
            result: None,
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == OutcomeStatus::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_only_the_relevant_field() -> color_eyre::Result<()> {
        let skipped = serde_json::to_value(JobOutcome::skipped("unsupported type"))?;
        assert_eq!(
            skipped,
            json!({"status": "skipped", "message": "unsupported type"})
        );

        let success = serde_json::to_value(JobOutcome::success(json!({"faces_indexed": 3})))?;
        assert_eq!(
            success,
            json!({"status": "success", "result": {"faces_indexed": 3}})
        );

        let error = serde_json::to_value(JobOutcome::error("corrupt image"))?;
        assert_eq!(error, json!({"status": "error", "error": "corrupt image"}));
        Ok(())
    }
}
