mod content;
mod task;

pub use content::{
    BodyFields, ComparisonFields, ComparisonRow, DataFields, FieldMap, GridFields, GridItem,
    ImageTextFields, LayoutContent, ProcessFields, QuoteFields, SectionFields, SlideContent,
    Stat, TimelineEvent, TimelineFields, TitleFields, TwoColumnFields,
};
pub use task::{ExportArtifact, GeneratedPresentation, Task, TaskStatus};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Closed set of slide layouts.
///
/// `title-content` is the legacy name of [`SlideLayout::Content`]; any other
/// unknown string falls back to `Content` as well.
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
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(from = "String", into = "String")]
pub enum SlideLayout {
    Title,
    #[default]
    #[strum(to_string = "content", serialize = "title-content")]
    Content,
    TwoColumn,
    ImageText,
    Timeline,
    Process,
    Grid,
    Comparison,
    Data,
    Quote,
    Section,
}

impl SlideLayout {
    /// Content keys this layout renders.
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            SlideLayout::Title => &["title", "subtitle"],
            SlideLayout::Content => &["title", "text", "bullets"],
            SlideLayout::TwoColumn => &["title", "text", "second_column"],
            SlideLayout::ImageText => &["title", "image_url", "text"],
            SlideLayout::Timeline => &["title", "events"],
            SlideLayout::Process => &["title", "steps"],
            SlideLayout::Grid => &["title", "items"],
            SlideLayout::Comparison => &["title", "items"],
            SlideLayout::Data => &["title", "stats"],
            SlideLayout::Quote => &["quote", "author", "title"],
            SlideLayout::Section => &["title", "description"],
        }
    }

    pub fn supports(self, field: &str) -> bool {
        self.fields().contains(&field)
    }
}

impl From<String> for SlideLayout {
    fn from(s: String) -> Self {
        s.trim().parse().unwrap_or_default()
    }
}

impl From<SlideLayout> for String {
    fn from(l: SlideLayout) -> Self {
        l.to_string()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PresentationStatus {
    #[default]
    Draft,
    Generating,
    Completed,
    /// Anything the backend adds later (e.g. `published`, `archived`).
    #[serde(other)]
    Other,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Presentation {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: PresentationStatus,
    #[serde(default)]
    pub slides: Vec<Slide>,
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// One slide. Serialized in the backend's wire shape
/// (`{id, type, content, layout: {type, theme, background}, style, notes}`).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(from = "SlideWire", into = "SlideWire")]
pub struct Slide {
    pub id: String,
    pub layout: SlideLayout,
    pub content: SlideContent,
    pub notes: Option<String>,
    pub theme: Option<String>,
    pub background: Option<String>,
    /// Opaque style block, passed through untouched.
    pub style: Option<serde_json::Value>,
}

impl Slide {
    pub fn new(id: impl Into<String>, layout: SlideLayout, fields: FieldMap) -> Self {
        Self {
            id: id.into(),
            layout,
            content: SlideContent::from_fields(layout, fields),
            notes: None,
            theme: None,
            background: None,
            style: None,
        }
    }

    pub fn fields(&self) -> FieldMap {
        self.content.to_fields()
    }

    /// Switches layout without dropping any content key.
    pub fn set_layout(&mut self, layout: SlideLayout) {
        if self.layout == layout {
            return;
        }
        self.content = self.content.convert_to(layout);
        self.layout = layout;
    }

    /// Field-level merge; `overlay` wins on every key it carries.
    pub fn merged_with(&self, overlay: &FieldMap) -> Slide {
        let mut fields = self.fields();
        for (k, v) in overlay {
            fields.insert(k.clone(), v.clone());
        }
        Slide {
            content: SlideContent::from_fields(self.layout, fields),
            ..self.clone()
        }
    }
}

/// Local, synchronous change to a slide.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SlideUpdate {
    /// Content keys to overwrite; other keys are kept.
    pub fields: FieldMap,
    pub layout: Option<SlideLayout>,
    pub notes: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
struct LayoutWire {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    background: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
struct SlideWire {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default)]
    content: Option<FieldMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    layout: Option<LayoutWire>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    style: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
}

impl From<SlideWire> for Slide {
    fn from(w: SlideWire) -> Self {
        let layout_name = w
            .layout
            .as_ref()
            .map(|l| l.kind.clone())
            .filter(|k| !k.trim().is_empty())
            .or(w.kind)
            .unwrap_or_default();
        let layout = SlideLayout::from(layout_name);
        let (theme, background) = w
            .layout
            .map(|l| (l.theme, l.background))
            .unwrap_or((None, None));

        Slide {
            id: w.id.unwrap_or_default(),
            layout,
            content: SlideContent::from_fields(layout, w.content.unwrap_or_default()),
            notes: w.notes,
            theme,
            background,
            style: w.style,
        }
    }
}

impl From<Slide> for SlideWire {
    fn from(s: Slide) -> Self {
        SlideWire {
            id: Some(s.id),
            kind: Some(s.layout.to_string()),
            content: Some(s.content.to_fields()),
            layout: Some(LayoutWire {
                kind: s.layout.to_string(),
                theme: s.theme,
                background: s.background,
            }),
            style: s.style,
            notes: s.notes,
        }
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExportFormat {
    Pptx,
    Pdf,
    Png,
    Jpg,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExportQuality {
    Standard,
    High,
}
