mod jobs;

pub use jobs::{ExportJob, ExportOrder, ExportTicket, GenerationJob, JobKind};

use crate::api::{ApiError, ApiResult, Gateway};
use crate::models::{Task, TaskStatus};
use crate::runtime::Runtime;
use leptos::logging::{log, warn};
use std::cell::RefCell;
use std::future::Future;
use std::rc::{Rc, Weak};

pub const DEFAULT_POLL_INTERVAL_MS: u32 = 2000;

type Listener<O> = Rc<dyn Fn(&Task<O>)>;

struct TrackerState<K: JobKind, I> {
    ticket: Option<K::Ticket>,
    task: Option<Task<K::Output>>,
    /// (task id, timer). At most one per tracker.
    poll: Option<(String, I)>,
    /// A status request is outstanding.
    in_flight: bool,
    /// Bumped on submit, cancel, dismiss and teardown; responses tagged with
    /// an older epoch are dropped.
    epoch: u64,
    torn_down: bool,
    last_error: Option<ApiError>,
}

struct Inner<K: JobKind, G, R: Runtime> {
    gateway: Rc<G>,
    runtime: Rc<R>,
    interval_ms: u32,
    state: RefCell<TrackerState<K, R::Interval>>,
    on_finished: RefCell<Option<Listener<K::Output>>>,
}

/// Submits one job at a time and polls it to a terminal state.
///
/// The poll timer only holds a weak reference; dropping the tracker stops it.
pub struct TaskTracker<K: JobKind, G, R: Runtime> {
    inner: Rc<Inner<K, G, R>>,
}

impl<K: JobKind, G: Gateway, R: Runtime> TaskTracker<K, G, R> {
    pub fn new(gateway: Rc<G>, runtime: Rc<R>, interval_ms: u32) -> Self {
        Self {
            inner: Rc::new(Inner {
                gateway,
                runtime,
                interval_ms: interval_ms.max(1),
                state: RefCell::new(TrackerState {
                    ticket: None,
                    task: None,
                    poll: None,
                    in_flight: false,
                    epoch: 0,
                    torn_down: false,
                    last_error: None,
                }),
                on_finished: RefCell::new(None),
            }),
        }
    }

    /// Called once per task when it reaches a terminal state.
    pub fn set_on_finished(&self, f: impl Fn(&Task<K::Output>) + 'static) {
        *self.inner.on_finished.borrow_mut() = Some(Rc::new(f));
    }

    /// Starts a job, replacing any current one. Polling starts unless the
    /// first answer is already terminal.
    pub async fn submit(&self, req: &K::Request) -> ApiResult<Task<K::Output>> {
        let epoch = {
            let mut st = self.inner.state.borrow_mut();
            if st.torn_down {
                return Err(ApiError::validation(format!(
                    "{} tracker is shut down",
                    K::NAME
                )));
            }
            let old = st.poll.take();
            st.epoch += 1;
            st.ticket = None;
            st.task = None;
            st.in_flight = false;
            st.last_error = None;
            if let Some((_, timer)) = old {
                self.inner.runtime.stop_interval(timer);
            }
            st.epoch
        };

        let submitted = K::submit(&*self.inner.gateway, req).await;

        let (ticket, task) = match submitted {
            Ok(pair) => pair,
            Err(e) => {
                warn!("{} submit failed: {e}", K::NAME);
                let mut st = self.inner.state.borrow_mut();
                if st.epoch == epoch {
                    st.last_error = Some(e.clone());
                }
                return Err(e);
            }
        };

        {
            let mut st = self.inner.state.borrow_mut();
            if st.epoch != epoch || st.torn_down {
                warn!("{} {} superseded before tracking began", K::NAME, task.id);
                return Ok(task);
            }
            st.ticket = Some(ticket);
            st.task = Some(task.clone());
        }

        if task.is_terminal() {
            self.inner.notify(&task);
            return Ok(task);
        }

        let weak: Weak<Inner<K, G, R>> = Rc::downgrade(&self.inner);
        let timer = self.inner.runtime.start_interval(
            self.inner.interval_ms,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Inner::tick(&inner);
                }
            }),
        );
        self.inner.state.borrow_mut().poll = Some((task.id.clone(), timer));
        log!("{} {} polling every {}ms", K::NAME, task.id, self.inner.interval_ms);
        Ok(task)
    }

    /// Stops polling and marks the task cancelled before returning; the
    /// returned future then asks the server to cancel. Idempotent.
    ///
    /// A remote failure is reported but the local task stays cancelled.
    #[must_use = "the remote cancel only runs when the future is awaited"]
    pub fn cancel(&self) -> impl Future<Output = ApiResult<()>> + 'static {
        let ticket = self.inner.cancel_local();
        let gateway = self.inner.gateway.clone();
        let weak = Rc::downgrade(&self.inner);

        async move {
            let Some(ticket) = ticket else {
                return Ok(());
            };
            match K::cancel(&*gateway, &ticket).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    warn!("{} remote cancel failed: {e}", K::NAME);
                    if let Some(inner) = weak.upgrade() {
                        inner.state.borrow_mut().last_error = Some(e.clone());
                    }
                    Err(e)
                }
            }
        }
    }

    /// Forgets the current task without contacting the server.
    pub fn dismiss(&self) {
        let timer = {
            let mut st = self.inner.state.borrow_mut();
            st.epoch += 1;
            st.ticket = None;
            st.task = None;
            st.in_flight = false;
            st.last_error = None;
            st.poll.take()
        };
        if let Some((_, timer)) = timer {
            self.inner.runtime.stop_interval(timer);
        }
    }

    /// Stops polling for good. Responses still in flight are ignored.
    pub fn teardown(&self) {
        self.inner.teardown();
    }

    pub fn task(&self) -> Option<Task<K::Output>> {
        self.inner.state.borrow().task.clone()
    }

    pub fn status(&self) -> Option<TaskStatus> {
        self.inner.state.borrow().task.as_ref().map(|t| t.status)
    }

    pub fn is_polling(&self) -> bool {
        self.inner.state.borrow().poll.is_some()
    }

    /// Task id the timer is polling, if any.
    pub fn polling_task_id(&self) -> Option<String> {
        self.inner
            .state
            .borrow()
            .poll
            .as_ref()
            .map(|(id, _)| id.clone())
    }

    pub fn last_error(&self) -> Option<ApiError> {
        self.inner.state.borrow().last_error.clone()
    }
}

impl<K: JobKind, G, R: Runtime> Drop for TaskTracker<K, G, R> {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

impl<K: JobKind, G, R: Runtime> Inner<K, G, R> {
    fn notify(&self, task: &Task<K::Output>) {
        let listener = self.on_finished.borrow().clone();
        if let Some(f) = listener {
            f(task);
        }
    }

    fn teardown(&self) {
        let timer = {
            let mut st = self.state.borrow_mut();
            st.torn_down = true;
            st.epoch += 1;
            st.in_flight = false;
            st.poll.take()
        };
        if let Some((_, timer)) = timer {
            self.runtime.stop_interval(timer);
        }
    }

    fn cancel_local(&self) -> Option<K::Ticket> {
        let (ticket, task, timer) = {
            let mut guard = self.state.borrow_mut();
            let st = &mut *guard;
            let task = st.task.as_mut()?;
            if task.is_terminal() {
                return None;
            }
            task.status = TaskStatus::Cancelled;
            st.epoch += 1;
            st.in_flight = false;
            (st.ticket.clone(), task.clone(), st.poll.take())
        };

        if let Some((_, timer)) = timer {
            self.runtime.stop_interval(timer);
        }
        log!("{} {} cancelled", K::NAME, task.id);
        self.notify(&task);
        ticket
    }
}

impl<K: JobKind, G: Gateway, R: Runtime> Inner<K, G, R> {
    fn tick(inner: &Rc<Self>) {
        let (ticket, epoch) = {
            let mut st = inner.state.borrow_mut();
            if st.torn_down || st.poll.is_none() || st.in_flight {
                return;
            }
            let Some(ticket) = st.ticket.clone() else {
                return;
            };
            st.in_flight = true;
            (ticket, st.epoch)
        };

        let gateway = inner.gateway.clone();
        let weak = Rc::downgrade(inner);
        inner.runtime.spawn(Box::pin(async move {
            let res = K::status(&*gateway, &ticket).await;
            if let Some(inner) = weak.upgrade() {
                inner.apply(epoch, res);
            }
        }));
    }

    fn apply(&self, epoch: u64, res: ApiResult<Task<K::Output>>) {
        let (task, timer) = {
            let mut guard = self.state.borrow_mut();
            let st = &mut *guard;
            if st.epoch != epoch || st.torn_down {
                return;
            }
            st.in_flight = false;
            let Some(task) = st.task.as_mut() else {
                return;
            };
            if task.is_terminal() {
                return;
            }

            match res {
                Ok(next) => task.advance(next),
                Err(e) if e.is_transient() => {
                    warn!("{} {} poll failed, retrying: {e}", K::NAME, task.id);
                    return;
                }
                Err(e) => {
                    warn!("{} {} poll failed: {e}", K::NAME, task.id);
                    task.status = TaskStatus::Failed;
                    task.error = Some(e.message.clone());
                    st.last_error = Some(e);
                }
            }

            if !task.is_terminal() {
                return;
            }
            (task.clone(), st.poll.take())
        };

        if let Some((_, timer)) = timer {
            self.runtime.stop_interval(timer);
        }
        log!("{} {} finished: {}", K::NAME, task.id, task.status);
        self.notify(&task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiErrorKind, ExportStatus, GenerationRequest, GenerationStatus};
    use crate::models::{ExportFormat, GeneratedPresentation};
    use crate::testing::{FakeGateway, ManualRuntime};
    use serde_json::json;
    use std::cell::Cell;

    type GenTracker = TaskTracker<GenerationJob, FakeGateway, ManualRuntime>;

    fn setup() -> (Rc<FakeGateway>, Rc<ManualRuntime>, GenTracker) {
        let gw = Rc::new(FakeGateway::with_slides(&["s1"]));
        let rt = Rc::new(ManualRuntime::new());
        let tracker = TaskTracker::new(gw.clone(), rt.clone(), DEFAULT_POLL_INTERVAL_MS);
        (gw, rt, tracker)
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new("Quarterly business review for the sales team")
    }

    fn status(v: serde_json::Value) -> GenerationStatus {
        serde_json::from_value(v).expect("status should parse")
    }

    async fn tick(rt: &ManualRuntime) {
        rt.fire_intervals();
        rt.run_spawned().await;
    }

    #[tokio::test]
    async fn test_generation_runs_to_completion() {
        let (gw, rt, tracker) = setup();
        gw.script_generation(Ok(status(
            json!({"task_id": "gen-1", "status": "processing", "progress": 40}),
        )));
        gw.script_generation(Ok(status(json!({
            "task_id": "gen-1",
            "status": "completed",
            "progress": 100,
            "result": {"pptId": "abc"}
        }))));

        let finished = Rc::new(Cell::new(0));
        let seen = finished.clone();
        tracker.set_on_finished(move |t| {
            assert_eq!(t.status, TaskStatus::Completed);
            seen.set(seen.get() + 1);
        });

        let first = tracker.submit(&request()).await.expect("submit");
        assert_eq!(first.status, TaskStatus::Pending);
        assert_eq!(rt.active_intervals(), 1);
        assert_eq!(tracker.polling_task_id().as_deref(), Some("gen-1"));

        tick(&rt).await;
        let t = tracker.task().expect("task");
        assert_eq!(t.status, TaskStatus::Processing);
        assert_eq!(t.progress, 40);
        assert!(tracker.is_polling());

        tick(&rt).await;
        let t = tracker.task().expect("task");
        assert_eq!(t.status, TaskStatus::Completed);
        assert_eq!(
            t.result,
            Some(GeneratedPresentation {
                presentation_id: "abc".to_string(),
                title: None
            })
        );
        assert!(!tracker.is_polling());
        assert_eq!(rt.active_intervals(), 0);
        assert_eq!(finished.get(), 1);

        tick(&rt).await;
        assert_eq!(gw.count("generation_status"), 2);
    }

    #[tokio::test]
    async fn test_tick_skipped_while_request_in_flight() {
        let (gw, rt, tracker) = setup();
        tracker.submit(&request()).await.expect("submit");

        rt.fire_intervals();
        rt.fire_intervals();
        rt.run_spawned().await;
        assert_eq!(gw.count("generation_status"), 1);

        tick(&rt).await;
        assert_eq!(gw.count("generation_status"), 2);
    }

    #[tokio::test]
    async fn test_resubmit_replaces_loop_and_drops_stale_response() {
        let (gw, rt, tracker) = setup();
        tracker.submit(&request()).await.expect("submit");

        // Response for gen-1 is outstanding when gen-2 starts.
        gw.script_generation(Ok(status(json!({
            "task_id": "gen-1",
            "status": "completed",
            "result": {"ppt_id": "old"}
        }))));
        rt.fire_intervals();

        tracker.submit(&request()).await.expect("submit");
        assert_eq!(rt.active_intervals(), 1);
        assert_eq!(tracker.polling_task_id().as_deref(), Some("gen-2"));

        rt.run_spawned().await;
        let t = tracker.task().expect("task");
        assert_eq!(t.id, "gen-2");
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(tracker.is_polling());
    }

    #[tokio::test]
    async fn test_cancel_is_synchronous_and_final() {
        let (gw, rt, tracker) = setup();
        gw.script_generation(Ok(status(
            json!({"task_id": "gen-1", "status": "processing", "progress": 10}),
        )));
        tracker.submit(&request()).await.expect("submit");
        tick(&rt).await;
        assert_eq!(tracker.status(), Some(TaskStatus::Processing));

        let remote = tracker.cancel();
        assert_eq!(tracker.status(), Some(TaskStatus::Cancelled));
        assert_eq!(rt.active_intervals(), 0);
        assert_eq!(gw.count("cancel_generation"), 0);

        remote.await.expect("remote cancel");
        assert_eq!(gw.count("cancel_generation"), 1);

        tick(&rt).await;
        assert_eq!(gw.count("generation_status"), 1);

        tracker.cancel().await.expect("second cancel is a no-op");
        assert_eq!(gw.count("cancel_generation"), 1);
    }

    #[tokio::test]
    async fn test_dropped_cancel_future_only_cancels_locally() {
        let (gw, rt, tracker) = setup();
        tracker.submit(&request()).await.expect("submit");

        drop(tracker.cancel());
        assert_eq!(tracker.status(), Some(TaskStatus::Cancelled));
        assert_eq!(rt.active_intervals(), 0);
        assert_eq!(gw.count("cancel_generation"), 0);
    }

    #[tokio::test]
    async fn test_cancel_ignores_in_flight_response() {
        let (gw, rt, tracker) = setup();
        tracker.submit(&request()).await.expect("submit");
        gw.script_generation(Ok(status(
            json!({"task_id": "gen-1", "status": "processing", "progress": 70}),
        )));

        rt.fire_intervals();
        let remote = tracker.cancel();
        rt.run_spawned().await;
        remote.await.expect("remote cancel");

        let t = tracker.task().expect("task");
        assert_eq!(t.status, TaskStatus::Cancelled);
        assert_eq!(t.progress, 0);
    }

    #[tokio::test]
    async fn test_remote_cancel_failure_keeps_local_cancel() {
        let (gw, rt, tracker) = setup();
        tracker.submit(&request()).await.expect("submit");
        gw.fail_next("cancel_generation", ApiError::transport("offline"));

        let e = tracker.cancel().await.unwrap_err();
        assert_eq!(e.kind, ApiErrorKind::Transport);
        assert_eq!(tracker.status(), Some(TaskStatus::Cancelled));
        assert_eq!(tracker.last_error(), Some(e));
        assert_eq!(rt.active_intervals(), 0);
    }

    #[tokio::test]
    async fn test_cancel_without_task_is_noop() {
        let (gw, _rt, tracker) = setup();
        tracker.cancel().await.expect("noop");
        assert!(tracker.task().is_none());
        assert_eq!(gw.count("cancel_generation"), 0);
    }

    #[tokio::test]
    async fn test_transport_errors_keep_polling() {
        let (gw, rt, tracker) = setup();
        gw.script_generation(Err(ApiError::transport("timeout")));
        gw.script_generation(Ok(status(json!({
            "task_id": "gen-1",
            "status": "completed",
            "result": {"presentation_id": "p9"}
        }))));
        tracker.submit(&request()).await.expect("submit");

        tick(&rt).await;
        assert!(tracker.is_polling());
        assert_eq!(tracker.status(), Some(TaskStatus::Pending));

        tick(&rt).await;
        assert_eq!(tracker.status(), Some(TaskStatus::Completed));
        assert!(tracker.last_error().is_none());
    }

    #[tokio::test]
    async fn test_other_poll_errors_fail_the_task() {
        let (gw, rt, tracker) = setup();
        gw.script_generation(Err(ApiError::not_found("task gen-1")));
        tracker.submit(&request()).await.expect("submit");

        tick(&rt).await;
        let t = tracker.task().expect("task");
        assert_eq!(t.status, TaskStatus::Failed);
        assert_eq!(t.error.as_deref(), Some("task gen-1 not found"));
        assert_eq!(tracker.last_error().map(|e| e.kind), Some(ApiErrorKind::NotFound));
        assert_eq!(rt.active_intervals(), 0);
    }

    #[tokio::test]
    async fn test_server_failure_is_terminal() {
        let (gw, rt, tracker) = setup();
        gw.script_generation(Ok(status(json!({
            "task_id": "gen-1",
            "status": "failed",
            "error_message": "quota exceeded"
        }))));
        tracker.submit(&request()).await.expect("submit");

        tick(&rt).await;
        let t = tracker.task().expect("task");
        assert_eq!(t.status, TaskStatus::Failed);
        assert_eq!(t.error.as_deref(), Some("quota exceeded"));
        assert!(!tracker.is_polling());
        tick(&rt).await;
        assert_eq!(gw.count("generation_status"), 1);
    }

    #[tokio::test]
    async fn test_submit_failure_leaves_no_task() {
        let (gw, rt, tracker) = setup();
        gw.fail_next("submit_generation", ApiError::unauthorized());

        let e = tracker.submit(&request()).await.unwrap_err();
        assert_eq!(e.kind, ApiErrorKind::Unauthorized);
        assert!(tracker.task().is_none());
        assert_eq!(tracker.last_error(), Some(e));
        assert_eq!(rt.active_intervals(), 0);
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_locally() {
        let (gw, _rt, tracker) = setup();
        let e = tracker
            .submit(&GenerationRequest::new("too short"))
            .await
            .unwrap_err();
        assert_eq!(e.kind, ApiErrorKind::Validation);
        assert_eq!(gw.count("submit_generation"), 0);
    }

    #[tokio::test]
    async fn test_teardown_stops_timer_and_ignores_late_response() {
        let (gw, rt, tracker) = setup();
        gw.script_generation(Ok(status(
            json!({"task_id": "gen-1", "status": "processing", "progress": 50}),
        )));
        tracker.submit(&request()).await.expect("submit");

        rt.fire_intervals();
        tracker.teardown();
        rt.run_spawned().await;

        assert_eq!(rt.active_intervals(), 0);
        assert_eq!(tracker.status(), Some(TaskStatus::Pending));
        assert!(tracker.submit(&request()).await.is_err());
    }

    #[tokio::test]
    async fn test_drop_releases_timer() {
        let (_gw, rt, tracker) = setup();
        tracker.submit(&request()).await.expect("submit");
        assert_eq!(rt.active_intervals(), 1);
        drop(tracker);
        assert_eq!(rt.active_intervals(), 0);
        rt.fire_intervals();
        rt.run_spawned().await;
    }

    #[tokio::test]
    async fn test_dismiss_clears_task() {
        let (_gw, rt, tracker) = setup();
        tracker.submit(&request()).await.expect("submit");
        tracker.dismiss();
        assert!(tracker.task().is_none());
        assert_eq!(rt.active_intervals(), 0);
    }

    #[tokio::test]
    async fn test_export_job_lifecycle() {
        let gw = Rc::new(FakeGateway::with_slides(&["s1"]));
        let rt = Rc::new(ManualRuntime::new());
        let tracker: TaskTracker<ExportJob, _, _> =
            TaskTracker::new(gw.clone(), rt.clone(), DEFAULT_POLL_INTERVAL_MS);

        let export = |v: serde_json::Value| -> ExportStatus {
            serde_json::from_value(v).expect("status should parse")
        };
        gw.script_export(Ok(export(
            json!({"export_task_id": "exp-1", "status": "processing"}),
        )));
        gw.script_export(Ok(export(json!({
            "export_task_id": "exp-1",
            "status": "completed",
            "download_url": "https://cdn.test/exp-1.pdf"
        }))));

        let order = ExportOrder {
            presentation_id: "p1".to_string(),
            format: ExportFormat::Pdf,
            quality: None,
        };
        tracker.submit(&order).await.expect("submit");
        assert_eq!(gw.count("submit_export"), 1);

        tick(&rt).await;
        assert_eq!(tracker.task().map(|t| t.progress), Some(0));
        tick(&rt).await;

        let t = tracker.task().expect("task");
        assert_eq!(t.progress, 100);
        assert_eq!(
            t.result.map(|a| a.download_url).as_deref(),
            Some("https://cdn.test/exp-1.pdf")
        );
        assert_eq!(rt.active_intervals(), 0);
    }

    #[tokio::test]
    async fn test_export_cancel_has_no_remote_call() {
        let gw = Rc::new(FakeGateway::with_slides(&["s1"]));
        let rt = Rc::new(ManualRuntime::new());
        let tracker: TaskTracker<ExportJob, _, _> =
            TaskTracker::new(gw.clone(), rt.clone(), DEFAULT_POLL_INTERVAL_MS);
        let order = ExportOrder {
            presentation_id: "p1".to_string(),
            format: ExportFormat::Pptx,
            quality: None,
        };
        tracker.submit(&order).await.expect("submit");

        tracker.cancel().await.expect("cancel");
        assert_eq!(tracker.status(), Some(TaskStatus::Cancelled));
        assert_eq!(rt.active_intervals(), 0);
        assert_eq!(gw.calls().len(), 1);
    }
}
