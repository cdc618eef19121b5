use super::{AutosaveCoordinator, FlushOutcome, HistoryController, SlideCollection};
use crate::api::{ApiError, ApiResult, Gateway, GenerationRequest, HistoryEntry, HistoryStep, NewSlide, SlidePatch};
use crate::config::EditorConfig;
use crate::models::{
    ExportArtifact, ExportFormat, ExportQuality, GeneratedPresentation, Slide, SlideLayout,
    SlideUpdate, Task, TaskStatus,
};
use crate::runtime::Runtime;
use crate::tasks::{ExportJob, ExportOrder, GenerationJob, TaskTracker};
use leptos::logging::{log, warn};
use serde_json::Value;
use std::cell::RefCell;
use std::future::Future;
use std::rc::{Rc, Weak};

/// Editor input, as produced by the UI layer.
#[derive(Clone, Debug, PartialEq)]
pub enum EditorMessage {
    Stage {
        slide_id: String,
        field: String,
        value: Value,
    },
    /// A field lost focus.
    Blur { slide_id: String },
    Select { slide_id: String },
    Save,
    Undo,
    Redo,
}

/// One open presentation with everything that edits it.
///
/// Built on open, torn down on drop; nothing here is global.
pub struct EditorSession<G, R: Runtime> {
    config: EditorConfig,
    runtime: Rc<R>,
    slides: SlideCollection<G>,
    autosave: AutosaveCoordinator<G>,
    history: HistoryController<G>,
    generation: TaskTracker<GenerationJob, G, R>,
    export: TaskTracker<ExportJob, G, R>,
    autosave_timer: RefCell<Option<R::Interval>>,
}

impl<G: Gateway, R: Runtime> EditorSession<G, R> {
    /// Loads the presentation and wires the pieces together.
    pub async fn open(
        gateway: Rc<G>,
        runtime: Rc<R>,
        config: EditorConfig,
        presentation_id: &str,
    ) -> ApiResult<Self> {
        let slides = SlideCollection::new(gateway.clone(), presentation_id);
        slides.load().await?;

        let autosave = AutosaveCoordinator::new(slides.clone());
        let history = HistoryController::new(gateway.clone(), slides.clone(), autosave.clone());
        let generation: TaskTracker<GenerationJob, G, R> =
            TaskTracker::new(gateway.clone(), runtime.clone(), config.poll_interval_ms);
        let export: TaskTracker<ExportJob, G, R> =
            TaskTracker::new(gateway, runtime.clone(), config.poll_interval_ms);

        {
            let slides = slides.clone();
            let autosave = autosave.clone();
            let rt: Weak<R> = Rc::downgrade(&runtime);
            generation.set_on_finished(move |task: &Task<GeneratedPresentation>| {
                if task.status != TaskStatus::Completed {
                    return;
                }
                // Generation into another presentation leaves this deck alone.
                let ours = task
                    .result
                    .as_ref()
                    .is_some_and(|r| r.presentation_id == slides.presentation_id());
                if !ours {
                    return;
                }
                let Some(rt) = rt.upgrade() else {
                    return;
                };
                let slides = slides.clone();
                let autosave = autosave.clone();
                rt.spawn(Box::pin(async move {
                    match slides.load().await {
                        Ok(()) => {
                            autosave.forget_missing();
                        }
                        Err(e) => warn!("reload after generation failed: {e}"),
                    }
                }));
            });
        }

        log!("editor session opened for {presentation_id}");
        Ok(Self {
            config,
            runtime,
            slides,
            autosave,
            history,
            generation,
            export,
            autosave_timer: RefCell::new(None),
        })
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn slides(&self) -> &SlideCollection<G> {
        &self.slides
    }

    pub fn autosave(&self) -> &AutosaveCoordinator<G> {
        &self.autosave
    }

    pub fn generation(&self) -> &TaskTracker<GenerationJob, G, R> {
        &self.generation
    }

    pub fn export(&self) -> &TaskTracker<ExportJob, G, R> {
        &self.export
    }

    pub fn stage(&self, slide_id: &str, field: &str, value: Value) -> bool {
        self.autosave
            .stage(slide_id, field, value, self.runtime.now_ms())
    }

    pub async fn blur(&self, slide_id: &str) -> ApiResult<FlushOutcome> {
        self.autosave.flush(slide_id).await
    }

    pub async fn save(&self) -> ApiResult<()> {
        self.autosave.flush_all().await
    }

    /// The slide with unsaved edits applied.
    pub fn rendered(&self, slide_id: &str) -> Option<Slide> {
        self.autosave.rendered(slide_id)
    }

    /// Flushes, then moves the selection even if the flush failed; the
    /// unsaved edits stay buffered either way.
    pub async fn select_slide(&self, slide_id: &str) -> ApiResult<bool> {
        let flushed = self.autosave.flush_all().await;
        let selected = self.slides.select(slide_id);
        flushed.map(|()| selected)
    }

    pub async fn add_slide(&self, initial: Option<NewSlide>) -> ApiResult<Slide> {
        self.slides.add(initial).await
    }

    /// Deleting the last slide needs `confirm_last`.
    pub async fn delete_slide(&self, slide_id: &str, confirm_last: bool) -> ApiResult<()> {
        if self.slides.len() == 1 && self.slides.contains(slide_id) && !confirm_last {
            return Err(ApiError::validation(
                "deleting the last slide needs confirmation",
            ));
        }

        self.autosave.flush_all_except(Some(slide_id)).await?;
        let deleted = self.slides.delete(slide_id).await;
        if !self.slides.contains(slide_id) {
            self.autosave.discard(slide_id);
        }
        deleted
    }

    /// Switches layout locally, then remotely; reverts if the server refuses.
    pub async fn set_layout(&self, slide_id: &str, layout: SlideLayout) -> ApiResult<()> {
        self.autosave.flush_all().await?;
        let update = SlideUpdate {
            layout: Some(layout),
            ..SlideUpdate::default()
        };
        let prev = self
            .slides
            .update_local(slide_id, update)
            .ok_or_else(|| ApiError::not_found(format!("slide {slide_id}")))?;

        if let Err(e) = self
            .slides
            .update_remote(slide_id, &SlidePatch::layout(layout))
            .await
        {
            self.slides.restore(prev);
            return Err(e);
        }
        Ok(())
    }

    pub async fn set_notes(&self, slide_id: &str, notes: &str) -> ApiResult<()> {
        let update = SlideUpdate {
            notes: Some(notes.to_string()),
            ..SlideUpdate::default()
        };
        let prev = self
            .slides
            .update_local(slide_id, update)
            .ok_or_else(|| ApiError::not_found(format!("slide {slide_id}")))?;

        if let Err(e) = self
            .slides
            .update_remote(slide_id, &SlidePatch::notes(notes))
            .await
        {
            self.slides.restore(prev);
            return Err(e);
        }
        Ok(())
    }

    /// Reorders, flushes, then saves the order. Any failure restores the
    /// previous order.
    pub async fn reorder_slides(&self, order: &[String]) -> ApiResult<()> {
        let prev = self.slides.reorder(order);
        let saved = match self.autosave.flush_all().await {
            Ok(()) => self.slides.persist_order().await,
            Err(e) => Err(e),
        };
        if let Err(e) = saved {
            warn!("reorder not saved, restoring previous order: {e}");
            self.slides.reorder(&prev);
            return Err(e);
        }
        Ok(())
    }

    pub async fn rename(&self, title: &str) -> ApiResult<()> {
        self.slides.rename(title).await
    }

    /// Drops unsaved edits, stops timers and deletes the presentation.
    pub async fn delete_presentation(&self) -> ApiResult<()> {
        self.slides.delete_presentation().await?;
        self.autosave.forget_missing();
        self.teardown();
        Ok(())
    }

    /// Flushes first; nothing is undone if that fails.
    pub async fn undo(&self) -> ApiResult<HistoryStep> {
        self.autosave.flush_all().await?;
        self.history.undo().await
    }

    pub async fn redo(&self) -> ApiResult<HistoryStep> {
        self.autosave.flush_all().await?;
        self.history.redo().await
    }

    pub async fn history_entries(&self) -> ApiResult<Vec<HistoryEntry>> {
        self.history.entries(self.config.history_limit).await
    }

    pub async fn start_generation(
        &self,
        req: &GenerationRequest,
    ) -> ApiResult<Task<GeneratedPresentation>> {
        self.generation.submit(req).await
    }

    /// Marks the generation cancelled immediately; the future carries the
    /// remote cancel.
    #[must_use = "the remote cancel only runs when the future is awaited"]
    pub fn cancel_generation(&self) -> impl Future<Output = ApiResult<()>> + 'static {
        self.generation.cancel()
    }

    pub async fn start_export(
        &self,
        format: ExportFormat,
        quality: Option<ExportQuality>,
    ) -> ApiResult<Task<ExportArtifact>> {
        let order = ExportOrder {
            presentation_id: self.slides.presentation_id().to_string(),
            format,
            quality,
        };
        self.export.submit(&order).await
    }

    #[must_use = "the cancel result is only reported through the future"]
    pub fn cancel_export(&self) -> impl Future<Output = ApiResult<()>> + 'static {
        self.export.cancel()
    }

    /// Starts the timer that saves slides once their edits go quiet.
    pub fn start_autosave(&self) {
        if self.autosave_timer.borrow().is_some() {
            return;
        }

        let debounce = i64::from(self.config.autosave_debounce_ms);
        let period = (self.config.autosave_debounce_ms / 2).max(100);
        let autosave = self.autosave.clone();
        let rt: Weak<R> = Rc::downgrade(&self.runtime);

        let timer = self.runtime.start_interval(
            period,
            Box::new(move || {
                let Some(rt) = rt.upgrade() else {
                    return;
                };
                let now = rt.now_ms();
                let autosave = autosave.clone();
                rt.spawn(Box::pin(async move {
                    if let Err(e) = autosave.flush_due(now, debounce).await {
                        warn!("autosave failed: {e}");
                    }
                }));
            }),
        );
        *self.autosave_timer.borrow_mut() = Some(timer);
    }

    pub fn stop_autosave(&self) {
        let timer = self.autosave_timer.borrow_mut().take();
        if let Some(timer) = timer {
            self.runtime.stop_interval(timer);
        }
    }

    pub async fn dispatch(&self, msg: EditorMessage) -> ApiResult<()> {
        match msg {
            EditorMessage::Stage {
                slide_id,
                field,
                value,
            } => {
                if !self.stage(&slide_id, &field, value) {
                    return Err(ApiError::not_found(format!("slide {slide_id}")));
                }
                Ok(())
            }
            EditorMessage::Blur { slide_id } => self.blur(&slide_id).await.map(|_| ()),
            EditorMessage::Select { slide_id } => self.select_slide(&slide_id).await.map(|_| ()),
            EditorMessage::Save => self.save().await,
            EditorMessage::Undo => self.undo().await.map(|_| ()),
            EditorMessage::Redo => self.redo().await.map(|_| ()),
        }
    }

    /// Stops every timer this session owns.
    pub fn teardown(&self) {
        self.stop_autosave();
        self.generation.teardown();
        self.export.teardown();
    }
}

impl<G, R: Runtime> Drop for EditorSession<G, R> {
    fn drop(&mut self) {
        if let Some(timer) = self.autosave_timer.get_mut().take() {
            self.runtime.stop_interval(timer);
        }
    }
}
