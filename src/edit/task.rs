// Remote edit task wire types

use serde::Deserialize;

/// Status reported by `GET {base}/task/{id}`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Success,
    Failed,
    Cancelled,
    /// Any non-terminal status (`pending`, `running`, `queued`, ...)
    #[serde(other)]
    Pending,
}

impl RemoteStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RemoteStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteStatus::Success => "success",
            RemoteStatus::Failed => "failed",
            RemoteStatus::Cancelled => "cancelled",
            RemoteStatus::Pending => "pending",
        }
    }
}

impl Default for RemoteStatus {
    fn default() -> Self {
        RemoteStatus::Pending
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskOutput {
    #[serde(default)]
    pub file_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskStatusResponse {
    #[serde(default)]
    pub status: RemoteStatus,
    #[serde(default)]
    pub output: Option<TaskOutput>,
    /// Free-form error; providers send either a string or an object
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl TaskStatusResponse {
    pub fn file_url(&self) -> Option<&str> {
        self.output
            .as_ref()
            .and_then(|o| o.file_url.as_deref())
            .filter(|u| !u.is_empty())
    }

    /// Error detail as display text
    pub fn error_detail(&self) -> String {
        match &self.error {
            None | Some(serde_json::Value::Null) => "unknown error".to_string(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}
