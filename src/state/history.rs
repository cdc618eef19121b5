use super::{AutosaveCoordinator, SlideCollection};
use crate::api::{ApiError, ApiResult, Gateway, HistoryEntry, HistoryStep};
use leptos::logging::log;
use std::rc::Rc;

/// Undo/redo over the server's history log.
///
/// Does not flush; callers flush pending edits first.
pub struct HistoryController<G> {
    gateway: Rc<G>,
    slides: SlideCollection<G>,
    autosave: AutosaveCoordinator<G>,
}

impl<G> Clone for HistoryController<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            slides: self.slides.clone(),
            autosave: self.autosave.clone(),
        }
    }
}

impl<G: Gateway> HistoryController<G> {
    pub fn new(
        gateway: Rc<G>,
        slides: SlideCollection<G>,
        autosave: AutosaveCoordinator<G>,
    ) -> Self {
        Self {
            gateway,
            slides,
            autosave,
        }
    }

    pub async fn undo(&self) -> ApiResult<HistoryStep> {
        let step = self.gateway.undo(self.slides.presentation_id()).await?;
        self.apply(step, "undo").await
    }

    pub async fn redo(&self) -> ApiResult<HistoryStep> {
        let step = self.gateway.redo(self.slides.presentation_id()).await?;
        self.apply(step, "redo").await
    }

    pub async fn entries(&self, limit: u32) -> ApiResult<Vec<HistoryEntry>> {
        self.gateway
            .history(self.slides.presentation_id(), limit)
            .await
    }

    async fn apply(&self, step: HistoryStep, op: &str) -> ApiResult<HistoryStep> {
        if !step.success {
            let why = step
                .description
                .clone()
                .unwrap_or_else(|| "rejected".to_string());
            return Err(ApiError::validation(format!("{op} failed: {why}")));
        }

        match step.slides() {
            Some(slides) => self.slides.replace_slides(slides, step.title()),
            // Single-slide entries carry no list.
            None => self.slides.load().await?,
        }
        self.autosave.forget_missing();

        log!(
            "{op}: {}",
            step.description.as_deref().unwrap_or("history step applied")
        );
        Ok(step)
    }
}
