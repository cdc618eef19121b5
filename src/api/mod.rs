mod client;

pub use client::ApiClient;

use crate::models::{
    ExportFormat, ExportQuality, Presentation, Slide, SlideContent, SlideLayout, TaskStatus,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// Presentation, slide or task no longer exists.
    NotFound,
    /// Rejected field values, or local input refused before any request was sent.
    Validation,
    /// Credential invalid or expired. Never retried here.
    Unauthorized,
    /// Connectivity failure, timeout or a server-side hiccup. The only transient kind.
    Transport,
    /// Reserved for optimistic-concurrency checks.
    Conflict,
    /// The response arrived but could not be decoded.
    Parse,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::new(ApiErrorKind::NotFound, format!("{what} not found"))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Validation, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(ApiErrorKind::Unauthorized, "Unauthorized")
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Transport, message)
    }

    pub fn parse(e: impl std::fmt::Display) -> Self {
        Self::new(ApiErrorKind::Parse, e.to_string())
    }

    pub(crate) fn network(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::parse(e)
        } else {
            Self::transport(e.to_string())
        }
    }

    /// Maps a non-success HTTP status and its body onto the error taxonomy.
    pub fn from_status(status: u16, body: &str, ctx: &str) -> Self {
        let kind = match status {
            401 | 403 => return Self::unauthorized(),
            404 => ApiErrorKind::NotFound,
            400 | 422 => ApiErrorKind::Validation,
            409 => ApiErrorKind::Conflict,
            408 | 429 => ApiErrorKind::Transport,
            s if s >= 500 => ApiErrorKind::Transport,
            _ => ApiErrorKind::Validation,
        };

        let detail = backend_message(body).unwrap_or_else(|| body.trim().to_string());
        let message = if detail.is_empty() {
            format!("{ctx} (HTTP {status})")
        } else {
            format!("{ctx} (HTTP {status}): {detail}")
        };
        Self::new(kind, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ApiErrorKind::Transport
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Pulls a readable message out of a backend error body.
///
/// The backend answers with `{"detail": {"code", "message"}}` for domain errors,
/// `{"detail": [{"msg": ...}]}` for request validation and occasionally a bare
/// `{"message": ...}` or `{"detail": "..."}`.
pub(crate) fn backend_message(body: &str) -> Option<String> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;

    match v.get("detail") {
        Some(serde_json::Value::String(s)) => return Some(s.clone()),
        Some(serde_json::Value::Object(o)) => {
            if let Some(m) = o.get("message").and_then(|m| m.as_str()) {
                return Some(m.to_string());
            }
        }
        Some(serde_json::Value::Array(items)) => {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|e| {
                    e.get("msg")
                        .or_else(|| e.get("message"))
                        .and_then(|m| m.as_str())
                })
                .collect();
            if !msgs.is_empty() {
                return Some(msgs.join(", "));
            }
        }
        _ => {}
    }

    v.get("message")
        .and_then(|m| m.as_str())
        .map(|m| m.to_string())
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PresentationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slides: Option<Vec<Slide>>,
}

/// Slide creation payload.
#[derive(Clone, Debug, PartialEq)]
pub struct NewSlide {
    pub layout: SlideLayout,
    pub content: SlideContent,
    /// Insert position; `None` appends.
    pub position: Option<usize>,
}

impl Default for NewSlide {
    fn default() -> Self {
        let mut fields = serde_json::Map::new();
        fields.insert("title".to_string(), "New slide".into());
        fields.insert("text".to_string(), "".into());
        Self {
            layout: SlideLayout::Content,
            content: SlideContent::from_fields(SlideLayout::Content, fields),
            position: None,
        }
    }
}

/// Partial slide update sent to the backend. Absent parts are left untouched remotely.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SlidePatch {
    pub content: Option<SlideContent>,
    pub layout: Option<SlideLayout>,
    pub notes: Option<String>,
}

impl SlidePatch {
    pub fn content(content: SlideContent) -> Self {
        Self {
            content: Some(content),
            ..Default::default()
        }
    }

    pub fn layout(layout: SlideLayout) -> Self {
        Self {
            layout: Some(layout),
            ..Default::default()
        }
    }

    pub fn notes(notes: impl Into<String>) -> Self {
        Self {
            notes: Some(notes.into()),
            ..Default::default()
        }
    }
}

/// Undo/redo answer. `state` is whatever history entry the server restored:
/// usually `{title, slides}`, but single-slide entries carry one slide or nothing.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct HistoryStep {
    pub success: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub state: Option<serde_json::Value>,
}

impl HistoryStep {
    pub fn slides(&self) -> Option<Vec<Slide>> {
        let list = self.state.as_ref()?.get("slides")?.clone();
        serde_json::from_value(list).ok()
    }

    pub fn title(&self) -> Option<String> {
        self.state
            .as_ref()?
            .get("title")
            .and_then(|t| t.as_str())
            .map(|t| t.to_string())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct HistoryEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub operation_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub slide_id: Option<String>,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    /// Requested slide count.
    pub num_slides: u32,
    pub language: String,
    pub style: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            template_id: None,
            num_slides: 10,
            language: "zh".to_string(),
            style: "business".to_string(),
            provider: None,
        }
    }

    /// Same bounds the backend enforces, checked before a request is spent on them.
    pub fn validate(&self) -> ApiResult<()> {
        let len = self.prompt.trim().chars().count();
        if !(10..=2000).contains(&len) {
            return Err(ApiError::validation(
                "prompt must be between 10 and 2000 characters",
            ));
        }
        if !(1..=50).contains(&self.num_slides) {
            return Err(ApiError::validation("slide count must be between 1 and 50"));
        }
        if self.language != "zh" && self.language != "en" {
            return Err(ApiError::validation(format!(
                "unsupported language: {}",
                self.language
            )));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GenerationAccepted {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub estimated_time: Option<u32>,
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GenerationStatus {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ExportRequest {
    pub format: ExportFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<ExportQuality>,
}

/// Both the submit answer and the status answer of an export job.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ExportStatus {
    pub export_task_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// Remote presentation store, history log and job backends.
///
/// Every method is a suspension point; implementations return typed payloads
/// or an [`ApiError`]. Futures are not required to be `Send`.
#[allow(async_fn_in_trait)]
pub trait Gateway: 'static {
    async fn get_presentation(&self, id: &str) -> ApiResult<Presentation>;

    async fn update_presentation(
        &self,
        id: &str,
        patch: &PresentationPatch,
    ) -> ApiResult<Presentation>;

    async fn delete_presentation(&self, id: &str) -> ApiResult<()>;

    async fn create_slide(&self, presentation_id: &str, slide: &NewSlide) -> ApiResult<Slide>;

    async fn update_slide(
        &self,
        presentation_id: &str,
        slide_id: &str,
        patch: &SlidePatch,
    ) -> ApiResult<Slide>;

    async fn delete_slide(&self, presentation_id: &str, slide_id: &str) -> ApiResult<()>;

    async fn undo(&self, presentation_id: &str) -> ApiResult<HistoryStep>;

    async fn redo(&self, presentation_id: &str) -> ApiResult<HistoryStep>;

    async fn history(&self, presentation_id: &str, limit: u32) -> ApiResult<Vec<HistoryEntry>>;

    async fn submit_generation(&self, req: &GenerationRequest) -> ApiResult<GenerationAccepted>;

    async fn generation_status(&self, task_id: &str) -> ApiResult<GenerationStatus>;

    async fn cancel_generation(&self, task_id: &str) -> ApiResult<()>;

    async fn submit_export(
        &self,
        presentation_id: &str,
        req: &ExportRequest,
    ) -> ApiResult<ExportStatus>;

    async fn export_status(&self, presentation_id: &str, task_id: &str)
        -> ApiResult<ExportStatus>;
}
