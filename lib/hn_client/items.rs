use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Raw item payload returned by `GET /item/{id}.json`.
///
/// Mirrors the wire shape, including fields ingestion never persists.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct HnItem {
    pub id: i64,
    #[serde(default, deserialize_with = "deserialize_option_bool_tolerant")]
    pub deleted: Option<bool>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub by: Option<String>,
    pub time: Option<i64>,
    pub text: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_bool_tolerant")]
    pub dead: Option<bool>,
    pub parent: Option<i64>,
    pub poll: Option<i64>,
    pub url: Option<String>,
    pub score: Option<i64>,
    pub title: Option<String>,
    pub parts: Option<Vec<i64>>,
    pub descendants: Option<i64>,
    pub kids: Option<Vec<i64>>,
}

/// Coerces the odd bool shapes the Firebase mirror has emitted (numbers, strings,
/// single-element arrays) and drops anything else to `None`.
fn deserialize_option_bool_tolerant<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(value_to_bool_tolerant))
}

fn value_to_bool_tolerant(value: Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(flag),
        Value::Number(number) => number.as_f64().map(|n| n != 0.0),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        Value::Array(values) => values.into_iter().next().and_then(value_to_bool_tolerant),
        Value::Null | Value::Object(_) => None,
    }
}

/// Item kind tag as reported in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Story,
    Comment,
    Poll,
    PollOption,
    Job,
    Unknown,
}

impl ItemKind {
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag {
            Some("story") => Self::Story,
            Some("comment") => Self::Comment,
            Some("poll") => Self::Poll,
            Some("pollopt") => Self::PollOption,
            Some("job") => Self::Job,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Story => "story",
            Self::Comment => "comment",
            Self::Poll => "poll",
            Self::PollOption => "pollopt",
            Self::Job => "job",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The part of a story that ingestion owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Story {
    pub id: i64,
    pub title: Option<String>,
    pub url: Option<String>,
}

/// An upstream item after kind dispatch. Only `Story` carries a payload, because
/// only stories are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalItem {
    Story(Story),
    Other { id: i64, kind: ItemKind },
}

impl ExternalItem {
    pub fn id(&self) -> i64 {
        match self {
            Self::Story(story) => story.id,
            Self::Other { id, .. } => *id,
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Story(_) => ItemKind::Story,
            Self::Other { kind, .. } => *kind,
        }
    }
}

impl From<HnItem> for ExternalItem {
    fn from(raw: HnItem) -> Self {
        match ItemKind::from_tag(raw.type_.as_deref()) {
            ItemKind::Story => Self::Story(Story {
                id: raw.id,
                title: raw.title,
                url: raw.url,
            }),
            kind => Self::Other { id: raw.id, kind },
        }
    }
}

/// Story list endpoints exposed by the HN API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum ListEndpoint {
    #[value(name = "topstories")]
    TopStories,
    #[value(name = "newstories")]
    NewStories,
    #[value(name = "beststories")]
    BestStories,
    #[value(name = "askstories")]
    AskStories,
    #[value(name = "showstories")]
    ShowStories,
    #[value(name = "jobstories")]
    JobStories,
}

impl ListEndpoint {
    /// Path segment before `.json`.
    pub fn as_path(self) -> &'static str {
        match self {
            Self::TopStories => "topstories",
            Self::NewStories => "newstories",
            Self::BestStories => "beststories",
            Self::AskStories => "askstories",
            Self::ShowStories => "showstories",
            Self::JobStories => "jobstories",
        }
    }
}

impl fmt::Display for ListEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path())
    }
}

impl FromStr for ListEndpoint {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "topstories" | "top" => Ok(Self::TopStories),
            "newstories" | "new" => Ok(Self::NewStories),
            "beststories" | "best" => Ok(Self::BestStories),
            "askstories" | "ask" => Ok(Self::AskStories),
            "showstories" | "show" => Ok(Self::ShowStories),
            "jobstories" | "jobs" => Ok(Self::JobStories),
            other => Err(format!("unknown list endpoint `{other}`")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ExternalItem, HnItem, ItemKind, ListEndpoint, Story};

    #[test]
    fn story_payload_maps_to_story_variant() {
        let raw = r#"{
            "id": 8863,
            "type": "story",
            "by": "dhouston",
            "score": 111,
            "title": "My YC app: Dropbox - Throw away your USB drive",
            "url": "http://www.getdropbox.com/u/2/screencast.html"
        }"#;

        let item: HnItem = serde_json::from_str(raw).unwrap();
        assert_eq!(item.type_.as_deref(), Some("story"));

        assert_eq!(
            ExternalItem::from(item),
            ExternalItem::Story(Story {
                id: 8863,
                title: Some("My YC app: Dropbox - Throw away your USB drive".to_string()),
                url: Some("http://www.getdropbox.com/u/2/screencast.html".to_string()),
            })
        );
    }

    #[test]
    fn non_story_kinds_carry_no_payload() {
        let raw = r#"{"id": 2921983, "type": "comment", "parent": 2921506, "text": "Aw shucks"}"#;
        let item: ExternalItem = serde_json::from_str::<HnItem>(raw).unwrap().into();

        assert_eq!(item.id(), 2921983);
        assert_eq!(item.kind(), ItemKind::Comment);
        assert!(!matches!(item, ExternalItem::Story(_)));
    }

    #[test]
    fn missing_or_unrecognised_type_is_unknown() {
        assert_eq!(ItemKind::from_tag(None), ItemKind::Unknown);
        assert_eq!(ItemKind::from_tag(Some("ask")), ItemKind::Unknown);
        assert_eq!(ItemKind::from_tag(Some("pollopt")), ItemKind::PollOption);
    }

    #[test]
    fn malformed_bool_shapes_do_not_poison_the_item() {
        let raw = r#"{"id": 41550939, "deleted": [true], "dead": "nope", "type": "story"}"#;
        let item: HnItem = serde_json::from_str(raw).unwrap();

        assert_eq!(item.deleted, Some(true));
        assert_eq!(item.dead, None);
    }

    #[test]
    fn endpoint_names_round_trip_through_from_str() {
        for endpoint in [
            ListEndpoint::TopStories,
            ListEndpoint::NewStories,
            ListEndpoint::BestStories,
            ListEndpoint::AskStories,
            ListEndpoint::ShowStories,
            ListEndpoint::JobStories,
        ] {
            assert_eq!(endpoint.as_path().parse::<ListEndpoint>(), Ok(endpoint));
        }
        assert_eq!("best".parse::<ListEndpoint>(), Ok(ListEndpoint::BestStories));
        assert!("hot".parse::<ListEndpoint>().is_err());
    }
}
