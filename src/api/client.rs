use super::{
    ApiError, ApiResult, ExportRequest, ExportStatus, GenerationAccepted, GenerationRequest,
    GenerationStatus, Gateway, HistoryEntry, HistoryStep, NewSlide, PresentationPatch, SlidePatch,
};
use crate::config::EditorConfig;
use crate::models::{FieldMap, Presentation, Slide};
use leptos::logging::warn;
use serde::Serialize;
use urlencoding::encode;

#[derive(Serialize)]
struct LayoutRef {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Serialize)]
struct CreateSlideBody {
    #[serde(rename = "type")]
    kind: String,
    layout: LayoutRef,
    content: FieldMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<usize>,
}

impl From<&NewSlide> for CreateSlideBody {
    fn from(s: &NewSlide) -> Self {
        Self {
            kind: s.layout.to_string(),
            layout: LayoutRef {
                kind: s.layout.to_string(),
            },
            content: s.content.to_fields(),
            position: s.position,
        }
    }
}

#[derive(Serialize)]
struct UpdateSlideBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<FieldMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    layout: Option<LayoutRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
}

impl From<&SlidePatch> for UpdateSlideBody {
    fn from(p: &SlidePatch) -> Self {
        Self {
            content: p.content.as_ref().map(|c| c.to_fields()),
            layout: p.layout.map(|l| LayoutRef {
                kind: l.to_string(),
            }),
            notes: p.notes.clone(),
        }
    }
}

/// HTTP implementation of [`Gateway`].
#[derive(Clone, Debug)]
pub struct ApiClient {
    pub(crate) base_url: String,
    pub(crate) token: Option<String>,
    #[cfg_attr(target_arch = "wasm32", allow(dead_code))]
    pub(crate) timeout_ms: u32,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::from_config(&EditorConfig {
            api_url: base_url.into(),
            ..EditorConfig::default()
        })
    }

    pub fn from_config(config: &EditorConfig) -> Self {
        Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: None,
            timeout_ms: config.request_timeout_ms,
        }
    }

    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_auth_headers(
        mut req: reqwest::RequestBuilder,
        token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        if let Some(token) = token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }
        req
    }

    fn http(&self) -> ApiResult<reqwest::Client> {
        let builder = reqwest::Client::builder();
        // Browsers own the fetch timeout.
        // TODO: abort wasm fetches after `timeout_ms` through an AbortController.
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(std::time::Duration::from_millis(u64::from(
            self.timeout_ms,
        )));
        builder.build().map_err(ApiError::network)
    }

    async fn request_api<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&impl Serialize>,
        ctx: &str,
    ) -> ApiResult<T> {
        let client = self.http()?;
        let mut req = client.request(method, self.url(path));
        req = Self::with_auth_headers(req, self.token.as_deref());

        if let Some(b) = body {
            req = req.json(b);
        }

        let res = req.send().await.map_err(ApiError::network)?;
        let status = res.status();
        let text = res.text().await.map_err(ApiError::network)?;

        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16(), &text, ctx));
        }

        // 204 and empty bodies decode as `null`, which `()` and `Value` accept.
        let text: &str = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| ApiError::parse(format!("{ctx}: {e}")))
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str, ctx: &str) -> ApiResult<T> {
        self.request_api(reqwest::Method::GET, path, None::<&()>, ctx)
            .await
    }

    /// Slide creation has been observed to answer with the slide itself or
    /// with the whole presentation.
    pub(crate) fn pick_created_slide(
        data: serde_json::Value,
        position: Option<usize>,
    ) -> ApiResult<Slide> {
        let from_deck = data
            .get("slides")
            .and_then(|s| s.as_array())
            .is_some();

        if !from_deck {
            let slide: Slide = serde_json::from_value(data).map_err(ApiError::parse)?;
            if slide.id.trim().is_empty() {
                return Err(ApiError::parse("Create slide response is missing slide id"));
            }
            return Ok(slide);
        }

        let deck: Presentation = serde_json::from_value(data).map_err(ApiError::parse)?;
        let idx = match position {
            Some(p) if p < deck.slides.len() => p,
            _ => deck.slides.len().saturating_sub(1),
        };
        deck.slides
            .into_iter()
            .nth(idx)
            .ok_or_else(|| ApiError::parse("Create slide response has no slides"))
    }
}

impl Gateway for ApiClient {
    async fn get_presentation(&self, id: &str) -> ApiResult<Presentation> {
        self.get(&format!("/ppt/{}", encode(id)), "Load presentation")
            .await
    }

    async fn update_presentation(
        &self,
        id: &str,
        patch: &PresentationPatch,
    ) -> ApiResult<Presentation> {
        self.request_api(
            reqwest::Method::PATCH,
            &format!("/ppt/{}", encode(id)),
            Some(patch),
            "Update presentation",
        )
        .await
    }

    async fn delete_presentation(&self, id: &str) -> ApiResult<()> {
        let _: serde_json::Value = self
            .request_api(
                reqwest::Method::DELETE,
                &format!("/ppt/{}", encode(id)),
                None::<&()>,
                "Delete presentation",
            )
            .await?;
        Ok(())
    }

    async fn create_slide(&self, presentation_id: &str, slide: &NewSlide) -> ApiResult<Slide> {
        let data: serde_json::Value = self
            .request_api(
                reqwest::Method::POST,
                &format!("/ppt/{}/slides", encode(presentation_id)),
                Some(&CreateSlideBody::from(slide)),
                "Create slide",
            )
            .await?;
        Self::pick_created_slide(data, slide.position)
    }

    async fn update_slide(
        &self,
        presentation_id: &str,
        slide_id: &str,
        patch: &SlidePatch,
    ) -> ApiResult<Slide> {
        self.request_api(
            reqwest::Method::PATCH,
            &format!(
                "/ppt/{}/slides/{}",
                encode(presentation_id),
                encode(slide_id)
            ),
            Some(&UpdateSlideBody::from(patch)),
            "Update slide",
        )
        .await
    }

    async fn delete_slide(&self, presentation_id: &str, slide_id: &str) -> ApiResult<()> {
        let _: serde_json::Value = self
            .request_api(
                reqwest::Method::DELETE,
                &format!(
                    "/ppt/{}/slides/{}",
                    encode(presentation_id),
                    encode(slide_id)
                ),
                None::<&()>,
                "Delete slide",
            )
            .await?;
        Ok(())
    }

    async fn undo(&self, presentation_id: &str) -> ApiResult<HistoryStep> {
        self.request_api(
            reqwest::Method::POST,
            &format!("/ppt/{}/undo", encode(presentation_id)),
            None::<&()>,
            "Undo",
        )
        .await
    }

    async fn redo(&self, presentation_id: &str) -> ApiResult<HistoryStep> {
        self.request_api(
            reqwest::Method::POST,
            &format!("/ppt/{}/redo", encode(presentation_id)),
            None::<&()>,
            "Redo",
        )
        .await
    }

    async fn history(&self, presentation_id: &str, limit: u32) -> ApiResult<Vec<HistoryEntry>> {
        let data: serde_json::Value = self
            .get(
                &format!("/ppt/{}/history?limit={limit}", encode(presentation_id)),
                "Load history",
            )
            .await?;

        // Either a bare list or `{history: [...]}`.
        let list = match data {
            serde_json::Value::Array(_) => data,
            other => other
                .get("history")
                .cloned()
                .unwrap_or(serde_json::Value::Array(Vec::new())),
        };
        serde_json::from_value(list).map_err(ApiError::parse)
    }

    async fn submit_generation(&self, req: &GenerationRequest) -> ApiResult<GenerationAccepted> {
        self.request_api(
            reqwest::Method::POST,
            "/ppt/generate",
            Some(req),
            "Start generation",
        )
        .await
    }

    async fn generation_status(&self, task_id: &str) -> ApiResult<GenerationStatus> {
        self.get(
            &format!("/ppt/generate/{}/status", encode(task_id)),
            "Generation status",
        )
        .await
    }

    async fn cancel_generation(&self, task_id: &str) -> ApiResult<()> {
        let data: serde_json::Value = self
            .request_api(
                reqwest::Method::POST,
                &format!("/ppt/generate/{}/cancel", encode(task_id)),
                None::<&()>,
                "Cancel generation",
            )
            .await?;
        if data.get("success").and_then(|s| s.as_bool()) == Some(false) {
            warn!("cancel of generation {task_id} was not acknowledged: {data}");
        }
        Ok(())
    }

    async fn submit_export(
        &self,
        presentation_id: &str,
        req: &ExportRequest,
    ) -> ApiResult<ExportStatus> {
        self.request_api(
            reqwest::Method::POST,
            &format!("/ppt/{}/export", encode(presentation_id)),
            Some(req),
            "Start export",
        )
        .await
    }

    async fn export_status(
        &self,
        presentation_id: &str,
        task_id: &str,
    ) -> ApiResult<ExportStatus> {
        self.get(
            &format!(
                "/ppt/{}/export/{}/status",
                encode(presentation_id),
                encode(task_id)
            ),
            "Export status",
        )
        .await
    }
}
