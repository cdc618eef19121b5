use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    AsRefStr,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Completed, failed and cancelled jobs never change state again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Client-side view of a long-running job.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Task<O> {
    pub id: String,
    pub status: TaskStatus,
    /// 0..=100, never goes backwards.
    pub progress: u8,
    pub message: String,
    pub estimated_time: Option<u32>,
    pub result: Option<O>,
    pub error: Option<String>,
}

impl<O> Task<O> {
    pub fn new(id: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            id: id.into(),
            status,
            progress: 0,
            message: String::new(),
            estimated_time: None,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Folds a newer observation into this one.
    ///
    /// A terminal task is frozen. Progress is clamped to 100 and only moves
    /// forward; a completed task reports 100.
    pub fn advance(&mut self, next: Task<O>) {
        if self.is_terminal() {
            return;
        }
        self.status = next.status;
        self.progress = self.progress.max(next.progress.min(100));
        if self.status == TaskStatus::Completed {
            self.progress = 100;
        }
        if !next.message.is_empty() {
            self.message = next.message;
        }
        if next.estimated_time.is_some() {
            self.estimated_time = next.estimated_time;
        }
        if next.result.is_some() {
            self.result = next.result;
        }
        if next.error.is_some() {
            self.error = next.error;
        }
    }
}

/// Result of a finished generation job.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct GeneratedPresentation {
    pub presentation_id: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl GeneratedPresentation {
    /// The worker has reported the new id as `ppt_id`, `pptId` and
    /// `presentation_id` over time.
    pub fn from_result(result: &Value) -> Option<Self> {
        let id = ["ppt_id", "pptId", "presentation_id"]
            .iter()
            .find_map(|k| result.get(*k).and_then(|v| v.as_str()))
            .filter(|s| !s.is_empty())?;
        Some(Self {
            presentation_id: id.to_string(),
            title: result
                .get("title")
                .and_then(|t| t.as_str())
                .map(|t| t.to_string()),
        })
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ExportArtifact {
    pub download_url: String,
    #[serde(default)]
    pub expires_at: Option<String>,
}
