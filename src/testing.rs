//! In-memory gateway and hand-cranked runtime for unit tests.

use crate::api::{
    ApiError, ApiResult, ExportRequest, ExportStatus, Gateway, GenerationAccepted,
    GenerationRequest, GenerationStatus, HistoryEntry, HistoryStep, NewSlide, PresentationPatch,
    SlidePatch,
};
use crate::models::{
    FieldMap, Presentation, PresentationStatus, Slide, SlideContent, SlideLayout, TaskStatus,
};
use crate::runtime::{LocalTask, Runtime};
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use tokio::sync::Notify;

pub(crate) fn content_slide(id: &str) -> Slide {
    let mut fields = FieldMap::new();
    fields.insert("title".to_string(), json!(format!("Title {id}")));
    fields.insert("text".to_string(), json!(""));
    Slide::new(id, SlideLayout::Content, fields)
}

/// Backend double. Every call is recorded by method name before any
/// injected failure or gate applies.
pub(crate) struct FakeGateway {
    deck: RefCell<Presentation>,
    calls: RefCell<Vec<String>>,
    failures: RefCell<HashMap<&'static str, ApiError>>,
    update_gate: RefCell<Option<Rc<Notify>>>,
    undo_stack: RefCell<Vec<Vec<Slide>>>,
    redo_stack: RefCell<Vec<Vec<Slide>>>,
    history_state: Cell<bool>,
    history_rejection: RefCell<Option<String>>,
    generation: RefCell<VecDeque<ApiResult<GenerationStatus>>>,
    export: RefCell<VecDeque<ApiResult<ExportStatus>>>,
    next_id: Cell<u32>,
}

impl FakeGateway {
    pub fn with_slides(ids: &[&str]) -> Self {
        Self {
            deck: RefCell::new(Presentation {
                id: "p1".to_string(),
                title: "Deck".to_string(),
                description: None,
                status: PresentationStatus::Draft,
                slides: ids.iter().map(|id| content_slide(id)).collect(),
                version: Some(1),
                created_at: "2026-01-01T00:00:00Z".to_string(),
                updated_at: "2026-01-01T00:00:00Z".to_string(),
            }),
            calls: RefCell::new(Vec::new()),
            failures: RefCell::new(HashMap::new()),
            update_gate: RefCell::new(None),
            undo_stack: RefCell::new(Vec::new()),
            redo_stack: RefCell::new(Vec::new()),
            history_state: Cell::new(true),
            history_rejection: RefCell::new(None),
            generation: RefCell::new(VecDeque::new()),
            export: RefCell::new(VecDeque::new()),
            next_id: Cell::new(0),
        }
    }

    /// The next call to `op` fails with `err`.
    pub fn fail_next(&self, op: &'static str, err: ApiError) {
        self.failures.borrow_mut().insert(op, err);
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls.borrow().iter().filter(|c| c.as_str() == op).count()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Parks `update_slide` calls until [`FakeGateway::release_updates`].
    pub fn hold_updates(&self) {
        *self.update_gate.borrow_mut() = Some(Rc::new(Notify::new()));
    }

    pub fn release_updates(&self) {
        if let Some(gate) = self.update_gate.borrow_mut().take() {
            gate.notify_one();
        }
    }

    /// Undo/redo answers carry no slide list from now on.
    pub fn omit_history_state(&self) {
        self.history_state.set(false);
    }

    /// The next undo/redo answers `success: false`.
    pub fn reject_history(&self, why: &str) {
        *self.history_rejection.borrow_mut() = Some(why.to_string());
    }

    pub fn script_generation(&self, status: ApiResult<GenerationStatus>) {
        self.generation.borrow_mut().push_back(status);
    }

    pub fn script_export(&self, status: ApiResult<ExportStatus>) {
        self.export.borrow_mut().push_back(status);
    }

    pub fn remove_remote_slide(&self, id: &str) {
        self.deck.borrow_mut().slides.retain(|s| s.id != id);
    }

    pub fn remote_slide_ids(&self) -> Vec<String> {
        self.deck.borrow().slides.iter().map(|s| s.id.clone()).collect()
    }

    pub fn remote_slide(&self, id: &str) -> Option<Slide> {
        self.deck.borrow().slides.iter().find(|s| s.id == id).cloned()
    }

    fn enter(&self, op: &'static str) -> ApiResult<()> {
        self.calls.borrow_mut().push(op.to_string());
        match self.failures.borrow_mut().remove(op) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn checkpoint(&self) {
        let slides = self.deck.borrow().slides.clone();
        self.undo_stack.borrow_mut().push(slides);
        self.redo_stack.borrow_mut().clear();
    }

    fn step(&self, from: &RefCell<Vec<Vec<Slide>>>, to: &RefCell<Vec<Vec<Slide>>>, op: &str) -> ApiResult<HistoryStep> {
        if let Some(why) = self.history_rejection.borrow_mut().take() {
            return Ok(HistoryStep {
                success: false,
                description: Some(why),
                state: None,
            });
        }
        let Some(slides) = from.borrow_mut().pop() else {
            return Err(ApiError::from_status(
                400,
                r#"{"detail": {"code": "CANNOT_UNDO", "message": "nothing to step to"}}"#,
                op,
            ));
        };

        let mut deck = self.deck.borrow_mut();
        to.borrow_mut().push(std::mem::replace(&mut deck.slides, slides));
        let state = self
            .history_state
            .get()
            .then(|| json!({"title": deck.title, "slides": deck.slides}));
        Ok(HistoryStep {
            success: true,
            description: Some(format!("{op} applied")),
            state,
        })
    }

    fn not_found(what: &str) -> ApiError {
        ApiError::not_found(what)
    }
}

impl Gateway for FakeGateway {
    async fn get_presentation(&self, id: &str) -> ApiResult<Presentation> {
        self.enter("get_presentation")?;
        let deck = self.deck.borrow();
        if deck.id != id {
            return Err(Self::not_found("presentation"));
        }
        Ok(deck.clone())
    }

    async fn update_presentation(
        &self,
        id: &str,
        patch: &PresentationPatch,
    ) -> ApiResult<Presentation> {
        self.enter("update_presentation")?;
        if self.deck.borrow().id != id {
            return Err(Self::not_found("presentation"));
        }
        if patch.slides.is_some() {
            self.checkpoint();
        }
        let mut deck = self.deck.borrow_mut();
        if let Some(title) = &patch.title {
            deck.title = title.clone();
        }
        if let Some(slides) = &patch.slides {
            deck.slides = slides.clone();
        }
        Ok(deck.clone())
    }

    async fn delete_presentation(&self, _id: &str) -> ApiResult<()> {
        self.enter("delete_presentation")
    }

    async fn create_slide(&self, _presentation_id: &str, new: &NewSlide) -> ApiResult<Slide> {
        self.enter("create_slide")?;
        self.checkpoint();

        let n = self.next_id.get() + 1;
        self.next_id.set(n);
        let slide = Slide {
            id: format!("new-{n}"),
            layout: new.layout,
            content: new.content.clone(),
            notes: None,
            theme: None,
            background: None,
            style: None,
        };

        let mut deck = self.deck.borrow_mut();
        let at = new
            .position
            .map(|p| p.min(deck.slides.len()))
            .unwrap_or(deck.slides.len());
        deck.slides.insert(at, slide.clone());
        Ok(slide)
    }

    async fn update_slide(
        &self,
        _presentation_id: &str,
        slide_id: &str,
        patch: &SlidePatch,
    ) -> ApiResult<Slide> {
        self.calls.borrow_mut().push("update_slide".to_string());
        let gate = self.update_gate.borrow().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(e) = self.failures.borrow_mut().remove("update_slide") {
            return Err(e);
        }

        if self.remote_slide(slide_id).is_none() {
            return Err(Self::not_found("slide"));
        }
        self.checkpoint();

        let mut deck = self.deck.borrow_mut();
        let slide = deck
            .slides
            .iter_mut()
            .find(|s| s.id == slide_id)
            .ok_or_else(|| Self::not_found("slide"))?;
        if let Some(layout) = patch.layout {
            slide.set_layout(layout);
        }
        if let Some(content) = &patch.content {
            slide.content = SlideContent::from_fields(slide.layout, content.to_fields());
        }
        if let Some(notes) = &patch.notes {
            slide.notes = Some(notes.clone());
        }
        Ok(slide.clone())
    }

    async fn delete_slide(&self, _presentation_id: &str, slide_id: &str) -> ApiResult<()> {
        self.enter("delete_slide")?;
        if self.remote_slide(slide_id).is_none() {
            return Err(Self::not_found("slide"));
        }
        self.checkpoint();
        self.remove_remote_slide(slide_id);
        Ok(())
    }

    async fn undo(&self, _presentation_id: &str) -> ApiResult<HistoryStep> {
        self.enter("undo")?;
        self.step(&self.undo_stack, &self.redo_stack, "Undo")
    }

    async fn redo(&self, _presentation_id: &str) -> ApiResult<HistoryStep> {
        self.enter("redo")?;
        self.step(&self.redo_stack, &self.undo_stack, "Redo")
    }

    async fn history(&self, _presentation_id: &str, limit: u32) -> ApiResult<Vec<HistoryEntry>> {
        self.enter("history")?;
        let n = self.undo_stack.borrow().len().min(limit as usize);
        Ok((0..n)
            .map(|i| HistoryEntry {
                id: format!("h{i}"),
                operation_type: "update".to_string(),
                description: format!("change {i}"),
                slide_id: None,
                created_at: String::new(),
            })
            .collect())
    }

    async fn submit_generation(&self, _req: &GenerationRequest) -> ApiResult<GenerationAccepted> {
        self.enter("submit_generation")?;
        let n = self.count("submit_generation");
        Ok(GenerationAccepted {
            task_id: format!("gen-{n}"),
            status: TaskStatus::Pending,
            estimated_time: Some(30),
            message: "queued".to_string(),
        })
    }

    async fn generation_status(&self, task_id: &str) -> ApiResult<GenerationStatus> {
        self.enter("generation_status")?;
        self.generation
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(GenerationStatus {
                    task_id: task_id.to_string(),
                    status: TaskStatus::Processing,
                    progress: 0,
                    result: None,
                    error_message: None,
                    message: None,
                })
            })
    }

    async fn cancel_generation(&self, _task_id: &str) -> ApiResult<()> {
        self.enter("cancel_generation")
    }

    async fn submit_export(
        &self,
        _presentation_id: &str,
        _req: &ExportRequest,
    ) -> ApiResult<ExportStatus> {
        self.enter("submit_export")?;
        let n = self.count("submit_export");
        Ok(ExportStatus {
            export_task_id: format!("exp-{n}"),
            status: TaskStatus::Pending,
            download_url: None,
            expires_at: None,
        })
    }

    async fn export_status(
        &self,
        _presentation_id: &str,
        task_id: &str,
    ) -> ApiResult<ExportStatus> {
        self.enter("export_status")?;
        self.export.borrow_mut().pop_front().unwrap_or_else(|| {
            Ok(ExportStatus {
                export_task_id: task_id.to_string(),
                status: TaskStatus::Processing,
                download_url: None,
                expires_at: None,
            })
        })
    }
}

type Tick = Rc<RefCell<Box<dyn FnMut()>>>;

pub(crate) struct ManualInterval {
    alive: Rc<Cell<bool>>,
}

impl Drop for ManualInterval {
    fn drop(&mut self) {
        self.alive.set(false);
    }
}

/// Runtime whose clock, timers and spawned tasks only move when a test says so.
#[derive(Default)]
pub(crate) struct ManualRuntime {
    now: Cell<i64>,
    intervals: RefCell<Vec<(Rc<Cell<bool>>, u32, Tick)>>,
    spawned: RefCell<VecDeque<LocalTask>>,
}

impl ManualRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: i64) {
        self.now.set(self.now.get() + ms);
    }

    pub fn active_intervals(&self) -> usize {
        self.intervals
            .borrow()
            .iter()
            .filter(|(alive, _, _)| alive.get())
            .count()
    }

    pub fn interval_periods(&self) -> Vec<u32> {
        self.intervals
            .borrow()
            .iter()
            .filter(|(alive, _, _)| alive.get())
            .map(|(_, period, _)| *period)
            .collect()
    }

    /// Fires every live interval once.
    pub fn fire_intervals(&self) {
        let ticks: Vec<Tick> = {
            let mut intervals = self.intervals.borrow_mut();
            intervals.retain(|(alive, _, _)| alive.get());
            intervals.iter().map(|(_, _, tick)| tick.clone()).collect()
        };
        for tick in ticks {
            (tick.borrow_mut())();
        }
    }

    pub fn spawned_count(&self) -> usize {
        self.spawned.borrow().len()
    }

    /// Runs spawned tasks, including ones spawned meanwhile, to completion.
    pub async fn run_spawned(&self) {
        loop {
            let next = self.spawned.borrow_mut().pop_front();
            let Some(task) = next else {
                break;
            };
            task.await;
        }
    }
}

impl Runtime for ManualRuntime {
    type Interval = ManualInterval;

    fn now_ms(&self) -> i64 {
        self.now.get()
    }

    fn start_interval(&self, period_ms: u32, tick: Box<dyn FnMut()>) -> ManualInterval {
        let alive = Rc::new(Cell::new(true));
        self.intervals
            .borrow_mut()
            .push((alive.clone(), period_ms, Rc::new(RefCell::new(tick))));
        ManualInterval { alive }
    }

    fn spawn(&self, task: LocalTask) {
        self.spawned.borrow_mut().push_back(task);
    }
}
