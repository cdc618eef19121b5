use crate::api::{ApiError, ApiErrorKind, ApiResult, Gateway, NewSlide, PresentationPatch, SlidePatch};
use crate::models::{Presentation, Slide, SlideUpdate};
use crate::util::reorder_by_ids;
use leptos::logging::{log, warn};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Default)]
struct Deck {
    /// Presentation metadata; its `slides` stay empty.
    meta: Option<Presentation>,
    slides: Vec<Slide>,
    current: Option<String>,
    /// Bumped whenever the list is replaced wholesale so late slide
    /// responses from before the swap are dropped.
    epoch: u64,
}

impl Deck {
    fn contains(&self, slide_id: &str) -> bool {
        self.slides.iter().any(|s| s.id == slide_id)
    }

    /// Keeps the selection if it still exists, else selects the first slide.
    fn repoint(&mut self) {
        let keep = self
            .current
            .as_deref()
            .is_some_and(|id| self.contains(id));
        if !keep {
            self.current = self.slides.first().map(|s| s.id.clone());
        }
    }

    fn set_meta(&mut self, mut p: Presentation) {
        p.slides.clear();
        self.meta = Some(p);
    }
}

/// Ordered slide list and current-slide pointer of one presentation.
///
/// The only writer of the canonical list. After every operation the current
/// pointer is `None` or names a slide in the list.
pub struct SlideCollection<G> {
    gateway: Rc<G>,
    presentation_id: String,
    deck: Rc<RefCell<Deck>>,
}

impl<G> Clone for SlideCollection<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            presentation_id: self.presentation_id.clone(),
            deck: self.deck.clone(),
        }
    }
}

impl<G: Gateway> SlideCollection<G> {
    pub fn new(gateway: Rc<G>, presentation_id: impl Into<String>) -> Self {
        Self {
            gateway,
            presentation_id: presentation_id.into(),
            deck: Rc::new(RefCell::new(Deck::default())),
        }
    }

    pub fn presentation_id(&self) -> &str {
        &self.presentation_id
    }

    pub async fn load(&self) -> ApiResult<()> {
        let mut p = self.gateway.get_presentation(&self.presentation_id).await?;
        let slides = std::mem::take(&mut p.slides);

        let mut deck = self.deck.borrow_mut();
        log!(
            "presentation {} loaded: {} slides",
            self.presentation_id,
            slides.len()
        );
        deck.slides = slides;
        deck.set_meta(p);
        deck.epoch += 1;
        deck.repoint();
        Ok(())
    }

    /// Moves the pointer. Unknown ids are ignored.
    pub fn select(&self, slide_id: &str) -> bool {
        let mut deck = self.deck.borrow_mut();
        if !deck.contains(slide_id) {
            return false;
        }
        deck.current = Some(slide_id.to_string());
        true
    }

    /// Creates a slide remotely, inserts the returned copy and selects it.
    pub async fn add(&self, initial: Option<NewSlide>) -> ApiResult<Slide> {
        let req = initial.unwrap_or_default();
        let slide = self
            .gateway
            .create_slide(&self.presentation_id, &req)
            .await?;

        let mut deck = self.deck.borrow_mut();
        deck.slides.retain(|s| s.id != slide.id);
        let at = req
            .position
            .map(|p| p.min(deck.slides.len()))
            .unwrap_or(deck.slides.len());
        deck.slides.insert(at, slide.clone());
        deck.current = Some(slide.id.clone());
        Ok(slide)
    }

    /// Optimistic in-memory change. Returns the slide as it was, for reverting.
    pub fn update_local(&self, slide_id: &str, update: SlideUpdate) -> Option<Slide> {
        let mut deck = self.deck.borrow_mut();
        let slide = deck.slides.iter_mut().find(|s| s.id == slide_id)?;
        let prev = slide.clone();

        if let Some(layout) = update.layout {
            slide.set_layout(layout);
        }
        if !update.fields.is_empty() {
            *slide = slide.merged_with(&update.fields);
        }
        if let Some(notes) = update.notes {
            slide.notes = Some(notes);
        }
        Some(prev)
    }

    /// Puts back a slide captured by [`SlideCollection::update_local`].
    pub fn restore(&self, slide: Slide) -> bool {
        let mut deck = self.deck.borrow_mut();
        match deck.slides.iter_mut().find(|s| s.id == slide.id) {
            Some(cur) => {
                *cur = slide;
                true
            }
            None => false,
        }
    }

    /// Deletes remotely, then locally, repointing the selection in the same step.
    ///
    /// A remote `NotFound` still removes the local copy before surfacing.
    pub async fn delete(&self, slide_id: &str) -> ApiResult<()> {
        if !self.contains(slide_id) {
            return Err(ApiError::not_found(format!("slide {slide_id}")));
        }

        match self
            .gateway
            .delete_slide(&self.presentation_id, slide_id)
            .await
        {
            Ok(()) => {
                self.remove_local(slide_id);
                Ok(())
            }
            Err(e) if e.kind == ApiErrorKind::NotFound => {
                warn!("slide {slide_id} was already gone remotely");
                self.remove_local(slide_id);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn remove_local(&self, slide_id: &str) {
        let mut deck = self.deck.borrow_mut();
        deck.slides.retain(|s| s.id != slide_id);
        if deck.current.as_deref() == Some(slide_id) {
            deck.current = None;
        }
        deck.repoint();
    }

    /// Local reorder. Returns the previous order.
    pub fn reorder(&self, order: &[String]) -> Vec<String> {
        let mut deck = self.deck.borrow_mut();
        let prev = deck.slides.iter().map(|s| s.id.clone()).collect();
        let slides = std::mem::take(&mut deck.slides);
        deck.slides = reorder_by_ids(slides, order, |s| s.id.as_str());
        prev
    }

    /// Saves the local order through the presentation PATCH.
    pub async fn persist_order(&self) -> ApiResult<()> {
        let patch = PresentationPatch {
            title: None,
            slides: Some(self.slides()),
        };
        let p = self
            .gateway
            .update_presentation(&self.presentation_id, &patch)
            .await?;
        self.deck.borrow_mut().set_meta(p);
        Ok(())
    }

    pub async fn rename(&self, title: &str) -> ApiResult<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ApiError::validation("title must not be empty"));
        }

        let patch = PresentationPatch {
            title: Some(title.to_string()),
            slides: None,
        };
        let p = self
            .gateway
            .update_presentation(&self.presentation_id, &patch)
            .await?;
        self.deck.borrow_mut().set_meta(p);
        Ok(())
    }

    /// Deletes the whole presentation and empties the local copy.
    pub async fn delete_presentation(&self) -> ApiResult<()> {
        self.gateway
            .delete_presentation(&self.presentation_id)
            .await?;

        let mut deck = self.deck.borrow_mut();
        let epoch = deck.epoch + 1;
        *deck = Deck {
            epoch,
            ..Deck::default()
        };
        log!("presentation {} deleted", self.presentation_id);
        Ok(())
    }

    /// PATCHes one slide and adopts the server's copy.
    pub async fn update_remote(&self, slide_id: &str, patch: &SlidePatch) -> ApiResult<Slide> {
        self.write_slide(slide_id, patch)
            .await
            .map(|(slide, _)| slide)
    }

    /// Like [`SlideCollection::update_remote`], also telling whether the
    /// server's copy made it into the list. It does not when the list was
    /// replaced while the request was out.
    pub(crate) async fn write_slide(
        &self,
        slide_id: &str,
        patch: &SlidePatch,
    ) -> ApiResult<(Slide, bool)> {
        let epoch = self.epoch();
        let slide = self
            .gateway
            .update_slide(&self.presentation_id, slide_id, patch)
            .await?;
        let applied = self.apply_persisted(slide.clone(), epoch);
        Ok((slide, applied))
    }

    /// Replaces a slide with a persisted copy, unless the list was swapped
    /// since `epoch` or the slide was deleted meanwhile.
    pub(crate) fn apply_persisted(&self, slide: Slide, epoch: u64) -> bool {
        let mut deck = self.deck.borrow_mut();
        if deck.epoch != epoch {
            return false;
        }
        match deck.slides.iter_mut().find(|s| s.id == slide.id) {
            Some(cur) => {
                *cur = slide;
                true
            }
            None => false,
        }
    }

    pub(crate) fn replace_slides(&self, slides: Vec<Slide>, title: Option<String>) {
        let mut deck = self.deck.borrow_mut();
        deck.slides = slides;
        if let (Some(meta), Some(title)) = (deck.meta.as_mut(), title) {
            meta.title = title;
        }
        deck.epoch += 1;
        deck.repoint();
    }

    pub fn slides(&self) -> Vec<Slide> {
        self.deck.borrow().slides.clone()
    }

    pub fn slide_ids(&self) -> Vec<String> {
        self.deck.borrow().slides.iter().map(|s| s.id.clone()).collect()
    }

    pub fn slide(&self, slide_id: &str) -> Option<Slide> {
        self.deck
            .borrow()
            .slides
            .iter()
            .find(|s| s.id == slide_id)
            .cloned()
    }

    pub fn contains(&self, slide_id: &str) -> bool {
        self.deck.borrow().contains(slide_id)
    }

    pub fn current(&self) -> Option<String> {
        self.deck.borrow().current.clone()
    }

    pub fn current_slide(&self) -> Option<Slide> {
        let id = self.current()?;
        self.slide(&id)
    }

    pub fn len(&self) -> usize {
        self.deck.borrow().slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deck.borrow().slides.is_empty()
    }

    pub fn title(&self) -> Option<String> {
        self.deck.borrow().meta.as_ref().map(|m| m.title.clone())
    }

    /// Metadata plus the current local slide list.
    pub fn presentation(&self) -> Option<Presentation> {
        let deck = self.deck.borrow();
        let mut p = deck.meta.clone()?;
        p.slides = deck.slides.clone();
        Some(p)
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.deck.borrow().epoch
    }
}
