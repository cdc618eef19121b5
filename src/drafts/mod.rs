use crate::models::FieldMap;
use serde_json::Value;
use std::collections::BTreeMap;

/// One unsaved field value.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDraft {
    pub value: Value,
    /// Bumped on every stage; a flush only clears the value it sent.
    pub seq: u64,
    pub staged_ms: i64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SlideDraft {
    /// field -> draft
    pub fields: BTreeMap<String, FieldDraft>,
    pub updated_ms: i64,
}

/// What a flush sends, and what it may clear once the write lands.
#[derive(Clone, Debug, PartialEq)]
pub struct FlushTicket {
    pub slide_id: String,
    pub fields: BTreeMap<String, FieldDraft>,
}

impl FlushTicket {
    pub fn values(&self) -> FieldMap {
        self.fields
            .iter()
            .map(|(k, d)| (k.clone(), d.value.clone()))
            .collect()
    }
}

/// Per-slide unsaved edits, keyed by slide id then field name.
///
/// A slide id is present only while it has at least one unflushed field.
#[derive(Clone, Debug, Default)]
pub struct EditBuffer {
    slides: BTreeMap<String, SlideDraft>,
    next_seq: u64,
}

impl EditBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a local edit. Returns the sequence number assigned to it, or
    /// `None` when the slide id or field name is blank.
    pub fn stage(&mut self, slide_id: &str, field: &str, value: Value, now_ms: i64) -> Option<u64> {
        if slide_id.trim().is_empty() || field.trim().is_empty() {
            return None;
        }

        self.next_seq += 1;
        let seq = self.next_seq;

        let d = self.slides.entry(slide_id.to_string()).or_default();
        d.fields.insert(
            field.to_string(),
            FieldDraft {
                value,
                seq,
                staged_ms: now_ms,
            },
        );
        d.updated_ms = d.updated_ms.max(now_ms);
        Some(seq)
    }

    pub fn snapshot(&self, slide_id: &str) -> Option<FlushTicket> {
        let d = self.slides.get(slide_id)?;
        Some(FlushTicket {
            slide_id: slide_id.to_string(),
            fields: d.fields.clone(),
        })
    }

    /// Clears the fields a successful flush persisted. Fields restaged after
    /// the ticket was taken stay buffered. Returns how many were cleared.
    pub fn acknowledge(&mut self, ticket: &FlushTicket) -> usize {
        let Some(d) = self.slides.get_mut(&ticket.slide_id) else {
            return 0;
        };

        let mut cleared = 0;
        for (field, sent) in &ticket.fields {
            if d.fields.get(field).is_some_and(|cur| cur.seq == sent.seq) {
                d.fields.remove(field);
                cleared += 1;
            }
        }

        if d.fields.is_empty() {
            self.slides.remove(&ticket.slide_id);
        }
        cleared
    }

    pub fn discard_slide(&mut self, slide_id: &str) -> bool {
        self.slides.remove(slide_id).is_some()
    }

    /// Drops every slide `keep` rejects and returns their ids.
    pub fn retain_slides(&mut self, keep: impl Fn(&str) -> bool) -> Vec<String> {
        let dropped: Vec<String> = self
            .slides
            .keys()
            .filter(|id| !keep(id.as_str()))
            .cloned()
            .collect();
        for id in &dropped {
            self.slides.remove(id);
        }
        dropped
    }

    /// Buffered values of one slide.
    pub fn overlay(&self, slide_id: &str) -> Option<FieldMap> {
        let d = self.slides.get(slide_id)?;
        Some(
            d.fields
                .iter()
                .map(|(k, f)| (k.clone(), f.value.clone()))
                .collect(),
        )
    }

    pub fn slide_ids(&self) -> Vec<String> {
        self.slides.keys().cloned().collect()
    }

    /// Slides whose newest edit is at least `debounce_ms` old.
    pub fn due_slides(&self, now_ms: i64, debounce_ms: i64) -> Vec<String> {
        self.slides
            .iter()
            .filter(|(_, d)| now_ms - d.updated_ms >= debounce_ms)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn get(&self, slide_id: &str, field: &str) -> Option<&Value> {
        self.slides
            .get(slide_id)?
            .fields
            .get(field)
            .map(|f| &f.value)
    }

    pub fn contains(&self, slide_id: &str) -> bool {
        self.slides.contains_key(slide_id)
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }
}
