use super::SlideCollection;
use crate::api::{ApiError, ApiResult, Gateway, SlidePatch};
use crate::drafts::EditBuffer;
use crate::models::{FieldMap, Slide};
use leptos::logging::{log, warn};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tokio::sync::watch;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing differed from the persisted copy; no request was sent.
    Clean,
    Saved,
    /// A flush for this slide was already running and went round again for
    /// these edits. Returned once that run has finished.
    Queued,
}

/// A running flush loop for one slide.
struct Flight {
    rerun: bool,
    /// Final result of the loop, for callers that joined it.
    done: watch::Sender<Option<ApiResult<FlushOutcome>>>,
}

type Flights = Rc<RefCell<HashMap<String, Flight>>>;

/// Forgets the flight if its loop is dropped before finishing, which wakes
/// joined callers with an error.
struct FlightGuard {
    in_flight: Flights,
    slide_id: String,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if let Ok(mut running) = self.in_flight.try_borrow_mut() {
            running.remove(&self.slide_id);
        }
    }
}

/// Buffers field edits and writes them back one slide at a time.
///
/// Flushes of the same slide never overlap: a flush requested while one is
/// in flight makes the running one go round again, and waits for it.
pub struct AutosaveCoordinator<G> {
    slides: SlideCollection<G>,
    buffer: Rc<RefCell<EditBuffer>>,
    in_flight: Flights,
}

impl<G> Clone for AutosaveCoordinator<G> {
    fn clone(&self) -> Self {
        Self {
            slides: self.slides.clone(),
            buffer: self.buffer.clone(),
            in_flight: self.in_flight.clone(),
        }
    }
}

impl<G: Gateway> AutosaveCoordinator<G> {
    pub fn new(slides: SlideCollection<G>) -> Self {
        Self {
            slides,
            buffer: Rc::new(RefCell::new(EditBuffer::new())),
            in_flight: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Records an edit. Edits for slides not in the collection are refused.
    pub fn stage(&self, slide_id: &str, field: &str, value: Value, now_ms: i64) -> bool {
        if !self.slides.contains(slide_id) {
            warn!("dropping edit of `{field}` for unknown slide {slide_id}");
            return false;
        }
        self.buffer
            .borrow_mut()
            .stage(slide_id, field, value, now_ms)
            .is_some()
    }

    /// Writes the slide's buffered edits. Resolves only after they have
    /// reached the server or failed.
    pub async fn flush(&self, slide_id: &str) -> ApiResult<FlushOutcome> {
        let joined = {
            let mut running = self.in_flight.borrow_mut();
            match running.get_mut(slide_id) {
                Some(flight) => {
                    flight.rerun = true;
                    Some(flight.done.subscribe())
                }
                None => {
                    let (done, _) = watch::channel(None);
                    running.insert(
                        slide_id.to_string(),
                        Flight {
                            rerun: false,
                            done,
                        },
                    );
                    None
                }
            }
        };
        if let Some(mut rx) = joined {
            let done = rx
                .wait_for(Option::is_some)
                .await
                .map(|done| (*done).clone());
            return match done {
                Ok(Some(Err(e))) => Err(e),
                Ok(_) => Ok(FlushOutcome::Queued),
                Err(_) => Err(ApiError::transport(format!(
                    "flush of slide {slide_id} was abandoned"
                ))),
            };
        }

        let _guard = FlightGuard {
            in_flight: self.in_flight.clone(),
            slide_id: slide_id.to_string(),
        };

        let mut outcome = FlushOutcome::Clean;
        let result = loop {
            match self.flush_once(slide_id).await {
                Ok(FlushOutcome::Saved) => outcome = FlushOutcome::Saved,
                Ok(_) => {}
                Err(e) => break Err(e),
            }

            let again = match self.in_flight.borrow_mut().get_mut(slide_id) {
                Some(flight) if flight.rerun => {
                    flight.rerun = false;
                    true
                }
                _ => false,
            };
            if !again {
                break Ok(outcome);
            }
        };

        let flight = self.in_flight.borrow_mut().remove(slide_id);
        if let Some(flight) = flight {
            flight.done.send_replace(Some(result.clone()));
        }
        result
    }

    async fn flush_once(&self, slide_id: &str) -> ApiResult<FlushOutcome> {
        let Some(ticket) = self.buffer.borrow().snapshot(slide_id) else {
            return Ok(FlushOutcome::Clean);
        };

        let Some(persisted) = self.slides.slide(slide_id) else {
            warn!("discarding edits of deleted slide {slide_id}");
            self.buffer.borrow_mut().discard_slide(slide_id);
            return Err(ApiError::not_found(format!("slide {slide_id}")));
        };

        let current = persisted.fields();
        let dirty = ticket
            .fields
            .iter()
            .any(|(k, d)| current.get(k) != Some(&d.value));
        if !dirty {
            self.buffer.borrow_mut().acknowledge(&ticket);
            return Ok(FlushOutcome::Clean);
        }

        let merged = persisted.merged_with(&ticket.values());
        let (_, applied) = self
            .slides
            .write_slide(slide_id, &SlidePatch::content(merged.content))
            .await?;
        if !applied && self.slides.contains(slide_id) {
            // The list was swapped meanwhile; the edits stay buffered until a
            // flush against the new copy.
            warn!("slide {slide_id} was reloaded during save, keeping its edits");
            return Ok(FlushOutcome::Saved);
        }

        let cleared = self.buffer.borrow_mut().acknowledge(&ticket);
        log!("slide {slide_id} saved ({cleared} fields)");
        Ok(FlushOutcome::Saved)
    }

    /// Flushes every buffered slide. All are attempted; the first error wins.
    pub async fn flush_all(&self) -> ApiResult<()> {
        self.flush_all_except(None).await
    }

    pub(crate) async fn flush_all_except(&self, skip: Option<&str>) -> ApiResult<()> {
        let ids: Vec<String> = self
            .buffer
            .borrow()
            .slide_ids()
            .into_iter()
            .filter(|id| Some(id.as_str()) != skip)
            .collect();
        let mut first_err = None;
        for id in ids {
            if let Err(e) = self.flush(&id).await {
                warn!("flush of slide {id} failed: {e}");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Flushes slides idle for at least `debounce_ms`. Returns how many were saved.
    pub async fn flush_due(&self, now_ms: i64, debounce_ms: i64) -> ApiResult<usize> {
        let due = self.buffer.borrow().due_slides(now_ms, debounce_ms);
        let mut saved = 0;
        let mut first_err = None;
        for id in due {
            match self.flush(&id).await {
                Ok(FlushOutcome::Saved) => saved += 1,
                Ok(_) => {}
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(saved),
        }
    }

    pub fn overlay(&self, slide_id: &str) -> Option<FieldMap> {
        self.buffer.borrow().overlay(slide_id)
    }

    /// The slide as the editor shows it: persisted content under buffered edits.
    pub fn rendered(&self, slide_id: &str) -> Option<Slide> {
        let slide = self.slides.slide(slide_id)?;
        Some(match self.overlay(slide_id) {
            Some(o) => slide.merged_with(&o),
            None => slide,
        })
    }

    pub fn is_dirty(&self, slide_id: &str) -> bool {
        self.buffer.borrow().contains(slide_id)
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.borrow().is_empty()
    }

    pub fn pending_value(&self, slide_id: &str, field: &str) -> Option<Value> {
        self.buffer.borrow().get(slide_id, field).cloned()
    }

    pub(crate) fn discard(&self, slide_id: &str) -> bool {
        self.buffer.borrow_mut().discard_slide(slide_id)
    }

    /// Drops buffered edits of slides no longer in the collection.
    pub(crate) fn forget_missing(&self) -> Vec<String> {
        let slides = self.slides.clone();
        let dropped = self
            .buffer
            .borrow_mut()
            .retain_slides(|id| slides.contains(id));
        if !dropped.is_empty() {
            warn!("dropped edits of removed slides: {dropped:?}");
        }
        dropped
    }
}
