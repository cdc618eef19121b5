use super::SlideLayout;
use leptos::logging::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Flat content map as exchanged with the backend and staged by the editor.
pub type FieldMap = serde_json::Map<String, Value>;

/// Accepts strings, numbers and booleans for text slots. Generated decks
/// regularly put `2024` where a string is expected.
fn lenient_string<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected text, got {other}"
        ))),
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct TimelineEvent {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: FieldMap,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct GridItem {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: FieldMap,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ComparisonRow {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        rename = "valueA",
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub value_a: Option<String>,
    #[serde(
        rename = "valueB",
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub value_b: Option<String>,
    #[serde(flatten)]
    pub extra: FieldMap,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Stat {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub extra: FieldMap,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct TitleFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct BodyFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bullets: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct TwoColumnFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_column: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ImageTextFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct TimelineFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<TimelineEvent>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ProcessFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct GridFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<GridItem>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ComparisonFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ComparisonRow>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct DataFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Vec<Stat>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct QuoteFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SectionFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Typed content, one variant per layout.
#[derive(Clone, Debug, PartialEq)]
pub enum LayoutContent {
    Title(TitleFields),
    Content(BodyFields),
    TwoColumn(TwoColumnFields),
    ImageText(ImageTextFields),
    Timeline(TimelineFields),
    Process(ProcessFields),
    Grid(GridFields),
    Comparison(ComparisonFields),
    Data(DataFields),
    Quote(QuoteFields),
    Section(SectionFields),
}

impl Default for LayoutContent {
    fn default() -> Self {
        LayoutContent::Content(BodyFields::default())
    }
}

impl LayoutContent {
    pub fn layout(&self) -> SlideLayout {
        match self {
            LayoutContent::Title(_) => SlideLayout::Title,
            LayoutContent::Content(_) => SlideLayout::Content,
            LayoutContent::TwoColumn(_) => SlideLayout::TwoColumn,
            LayoutContent::ImageText(_) => SlideLayout::ImageText,
            LayoutContent::Timeline(_) => SlideLayout::Timeline,
            LayoutContent::Process(_) => SlideLayout::Process,
            LayoutContent::Grid(_) => SlideLayout::Grid,
            LayoutContent::Comparison(_) => SlideLayout::Comparison,
            LayoutContent::Data(_) => SlideLayout::Data,
            LayoutContent::Quote(_) => SlideLayout::Quote,
            LayoutContent::Section(_) => SlideLayout::Section,
        }
    }

    /// The title slot, which every layout has.
    pub fn title(&self) -> Option<&str> {
        let t = match self {
            LayoutContent::Title(f) => &f.title,
            LayoutContent::Content(f) => &f.title,
            LayoutContent::TwoColumn(f) => &f.title,
            LayoutContent::ImageText(f) => &f.title,
            LayoutContent::Timeline(f) => &f.title,
            LayoutContent::Process(f) => &f.title,
            LayoutContent::Grid(f) => &f.title,
            LayoutContent::Comparison(f) => &f.title,
            LayoutContent::Data(f) => &f.title,
            LayoutContent::Quote(f) => &f.title,
            LayoutContent::Section(f) => &f.title,
        };
        t.as_deref()
    }

    fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            LayoutContent::Title(f) => serde_json::to_value(f),
            LayoutContent::Content(f) => serde_json::to_value(f),
            LayoutContent::TwoColumn(f) => serde_json::to_value(f),
            LayoutContent::ImageText(f) => serde_json::to_value(f),
            LayoutContent::Timeline(f) => serde_json::to_value(f),
            LayoutContent::Process(f) => serde_json::to_value(f),
            LayoutContent::Grid(f) => serde_json::to_value(f),
            LayoutContent::Comparison(f) => serde_json::to_value(f),
            LayoutContent::Data(f) => serde_json::to_value(f),
            LayoutContent::Quote(f) => serde_json::to_value(f),
            LayoutContent::Section(f) => serde_json::to_value(f),
        }
    }
}

/// Slide content: the typed fields of the current layout plus every other
/// key the slide carries. Keys a layout does not render live in `extra` so a
/// layout switch never loses them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SlideContent {
    pub body: LayoutContent,
    pub extra: FieldMap,
}

impl SlideContent {
    /// Splits a flat map into the layout's typed fields and the rest.
    ///
    /// A supported key whose value has the wrong shape is kept verbatim in
    /// `extra` instead of failing the whole slide.
    pub fn from_fields(layout: SlideLayout, mut fields: FieldMap) -> Self {
        let mut known = FieldMap::new();
        for key in layout.fields() {
            if let Some(v) = fields.remove(*key) {
                known.insert(key.to_string(), v);
            }
        }

        let body = match layout {
            SlideLayout::Title => LayoutContent::Title(split_known(known, &mut fields)),
            SlideLayout::Content => LayoutContent::Content(split_known(known, &mut fields)),
            SlideLayout::TwoColumn => LayoutContent::TwoColumn(split_known(known, &mut fields)),
            SlideLayout::ImageText => LayoutContent::ImageText(split_known(known, &mut fields)),
            SlideLayout::Timeline => LayoutContent::Timeline(split_known(known, &mut fields)),
            SlideLayout::Process => LayoutContent::Process(split_known(known, &mut fields)),
            SlideLayout::Grid => LayoutContent::Grid(split_known(known, &mut fields)),
            SlideLayout::Comparison => {
                LayoutContent::Comparison(split_known(known, &mut fields))
            }
            SlideLayout::Data => LayoutContent::Data(split_known(known, &mut fields)),
            SlideLayout::Quote => LayoutContent::Quote(split_known(known, &mut fields)),
            SlideLayout::Section => LayoutContent::Section(split_known(known, &mut fields)),
        };

        SlideContent {
            body,
            extra: fields,
        }
    }

    /// Flat map of every key, typed fields first, then `extra`.
    pub fn to_fields(&self) -> FieldMap {
        let mut out = match self.body.to_value() {
            Ok(Value::Object(m)) => m,
            _ => FieldMap::new(),
        };
        for (k, v) in &self.extra {
            out.entry(k.clone()).or_insert_with(|| v.clone());
        }
        out
    }

    pub fn layout(&self) -> SlideLayout {
        self.body.layout()
    }

    pub fn convert_to(&self, layout: SlideLayout) -> SlideContent {
        SlideContent::from_fields(layout, self.to_fields())
    }

    pub fn get(&self, field: &str) -> Option<Value> {
        self.to_fields().remove(field)
    }
}

impl Serialize for SlideContent {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.to_fields().serialize(s)
    }
}

fn split_known<T>(known: FieldMap, rest: &mut FieldMap) -> T
where
    T: DeserializeOwned + Default,
{
    if let Ok(t) = serde_json::from_value::<T>(Value::Object(known.clone())) {
        return t;
    }

    // Keep what parses, park the rest.
    let mut good = FieldMap::new();
    for (k, v) in known {
        let mut probe = FieldMap::new();
        probe.insert(k.clone(), v.clone());
        if serde_json::from_value::<T>(Value::Object(probe)).is_ok() {
            good.insert(k, v);
        } else {
            warn!("slide content: keeping malformed `{k}` as an extra field");
            rest.insert(k, v);
        }
    }
    serde_json::from_value(Value::Object(good)).unwrap_or_default()
}
