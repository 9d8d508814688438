#![forbid(unsafe_code)]

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// One video of the channel, assembled from the search listing and the
/// per-part detail responses.
///
/// Most fields are optional: a detail request can come back without the
/// expected part and the record is still kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topic_categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

impl ContentItem {
    /// Minimal item as produced by the channel listing.
    pub fn listed(
        id: impl Into<String>,
        published_at: Option<DateTime<Utc>>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            published_at,
            title: title.into(),
            description: None,
            tags: None,
            view_count: None,
            like_count: None,
            topic_categories: Vec::new(),
            duration: None,
        }
    }
}

/// A link found in a video description, with a snapshot of the owning
/// video's metadata copied at extraction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRecord {
    pub id: u64,
    pub link: String,
    pub video_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_count: Option<u64>,
}

/// A [`LinkRecord`] with its resolved destination domain attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedLinkRecord {
    #[serde(flatten)]
    pub record: LinkRecord,
    pub domain: String,
}

/// A single spreadsheet cell. Empty cells serialize as `""` so the sheet
/// clears whatever was there before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Text(String),
    Number(u64),
    Empty,
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Text(text) => serializer.serialize_str(text),
            Cell::Number(value) => serializer.serialize_u64(*value),
            Cell::Empty => serializer.serialize_str(""),
        }
    }
}

impl Cell {
    fn text_or_empty(value: Option<String>) -> Self {
        match value {
            Some(text) if !text.is_empty() => Cell::Text(text),
            _ => Cell::Empty,
        }
    }
}

pub const COLUMN_NAMES: [&str; 6] = [
    "link",
    "publishedAt",
    "viewCount",
    "likeCount",
    "domain",
    "tags",
];

/// Six cells in fixed column order: link, publish timestamp, view count,
/// like count, domain, comma-joined tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SpreadsheetRow(pub [Cell; 6]);

impl SpreadsheetRow {
    pub fn header() -> Self {
        Self(COLUMN_NAMES.map(|name| Cell::Text(name.to_string())))
    }

    pub fn cells(&self) -> &[Cell; 6] {
        &self.0
    }
}

impl From<&EnrichedLinkRecord> for SpreadsheetRow {
    fn from(enriched: &EnrichedLinkRecord) -> Self {
        let record = &enriched.record;
        let published = record
            .published_at
            .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true));
        let tags = record.tags.as_ref().map(|tags| tags.join(","));
        Self([
            Cell::text_or_empty(Some(record.link.clone())),
            Cell::text_or_empty(published),
            record.view_count.map_or(Cell::Empty, Cell::Number),
            record.like_count.map_or(Cell::Empty, Cell::Number),
            Cell::text_or_empty(Some(enriched.domain.clone())),
            Cell::text_or_empty(tags),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_record() -> LinkRecord {
        LinkRecord {
            id: 3,
            link: "https://example.com/page".into(),
            video_id: "vid1".into(),
            published_at: Some(Utc.with_ymd_and_hms(2023, 5, 1, 12, 30, 0).unwrap()),
            tags: Some(vec!["rust".into(), "cli".into()]),
            view_count: Some(1200),
            like_count: Some(34),
        }
    }

    #[test]
    fn row_keeps_fixed_column_order() {
        let enriched = EnrichedLinkRecord {
            record: sample_record(),
            domain: "example.com".into(),
        };
        let row = SpreadsheetRow::from(&enriched);
        assert_eq!(
            serde_json::to_value(&row).unwrap(),
            json!([
                "https://example.com/page",
                "2023-05-01T12:30:00Z",
                1200,
                34,
                "example.com",
                "rust,cli"
            ])
        );
    }

    #[test]
    fn row_uses_empty_cells_for_missing_fields() {
        let mut record = sample_record();
        record.tags = None;
        record.published_at = None;
        record.view_count = None;
        let row = SpreadsheetRow::from(&EnrichedLinkRecord {
            record,
            domain: "example.com".into(),
        });
        assert_eq!(row.cells()[1], Cell::Empty);
        assert_eq!(row.cells()[2], Cell::Empty);
        assert_eq!(row.cells()[3], Cell::Number(34));
        assert_eq!(row.cells()[5], Cell::Empty);
        assert_eq!(serde_json::to_value(&row).unwrap()[5], json!(""));
    }

    #[test]
    fn enriched_record_flattens_into_one_object() {
        let enriched = EnrichedLinkRecord {
            record: sample_record(),
            domain: "example.com".into(),
        };
        let value = serde_json::to_value(&enriched).unwrap();
        assert_eq!(value["domain"], json!("example.com"));
        assert_eq!(value["videoId"], json!("vid1"));
        assert_eq!(value["viewCount"], json!(1200));
        let back: EnrichedLinkRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, enriched);
    }

    #[test]
    fn content_item_omits_absent_fields() {
        let item = ContentItem::listed("abc", None, "Title");
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value, json!({"id": "abc", "title": "Title"}));
    }
}
