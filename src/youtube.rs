#![forbid(unsafe_code)]

//! YouTube Data API access: channel enumeration and per-video detail lookup.
//!
//! Shape problems in responses (missing `items`, missing part, odd fields) are
//! logged and turned into empty results so one bad video never aborts a run.
//! Transport failures propagate; nothing is retried.

use crate::error::ApiError;
use crate::models::ContentItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use ureq::Agent;

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const VIDEO_KIND: &str = "youtube#video";

/// Detail categories the videos endpoint can return for a single id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DetailPart {
    Snippet,
    Statistics,
    #[serde(alias = "topic_details")]
    TopicDetails,
    #[serde(alias = "content_details")]
    ContentDetails,
}

impl DetailPart {
    /// Parts fetched when nothing else is configured.
    pub const DEFAULT: [DetailPart; 3] = [
        DetailPart::Snippet,
        DetailPart::Statistics,
        DetailPart::TopicDetails,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Snippet => "snippet",
            Self::Statistics => "statistics",
            Self::TopicDetails => "topicDetails",
            Self::ContentDetails => "contentDetails",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "snippet" => Some(Self::Snippet),
            "statistics" => Some(Self::Statistics),
            "topicDetails" | "topic_details" => Some(Self::TopicDetails),
            "contentDetails" | "content_details" => Some(Self::ContentDetails),
            _ => None,
        }
    }
}

/// The two read endpoints the pipeline needs. Both return the raw JSON body,
/// including error bodies that come with a non-2xx status.
pub trait YoutubeApi {
    fn search_page(
        &self,
        channel_id: &str,
        page_size: Option<u32>,
        page_token: Option<&str>,
    ) -> Result<Value, ApiError>;

    fn video_part(&self, video_id: &str, part: DetailPart) -> Result<Value, ApiError>;
}

/// [`YoutubeApi`] backed by a blocking `ureq` agent and an API key.
pub struct UreqYoutubeApi {
    agent: Agent,
    base: String,
    api_key: String,
}

impl UreqYoutubeApi {
    pub fn new(agent: Agent, base: &str, api_key: &str) -> Self {
        Self {
            agent,
            base: base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn get_json(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Value, ApiError> {
        let url = format!("{}/{}", self.base, endpoint);
        let mut request = self.agent.get(&url).query("key", &self.api_key);
        for (name, value) in query {
            request = request.query(name, value);
        }
        debug!(%url, ?query, "youtube request");

        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                debug!(%url, status, "youtube returned an error status");
                response
            }
            Err(err) => return Err(ApiError::transport(&url, err)),
        };
        response
            .into_json::<Value>()
            .map_err(|err| ApiError::decode(&url, err))
    }
}

impl YoutubeApi for UreqYoutubeApi {
    fn search_page(
        &self,
        channel_id: &str,
        page_size: Option<u32>,
        page_token: Option<&str>,
    ) -> Result<Value, ApiError> {
        let page_size = page_size.map(|size| size.to_string());
        let mut query = vec![
            ("channelId", channel_id),
            ("part", "snippet,id"),
            ("order", "date"),
        ];
        if let Some(size) = page_size.as_deref() {
            query.push(("maxResults", size));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        self.get_json("search", &query)
    }

    fn video_part(&self, video_id: &str, part: DetailPart) -> Result<Value, ApiError> {
        self.get_json("videos", &[("part", part.as_str()), ("id", video_id)])
    }
}

/// One parsed page of the channel listing.
#[derive(Debug, Default)]
pub struct ChannelPage {
    pub items: Vec<ContentItem>,
    pub next_page_token: Option<String>,
}

/// Extracts the videos of one search page. A body without `items` is logged
/// and treated as a final, empty page.
pub fn parse_channel_page(body: &Value) -> ChannelPage {
    let Some(items) = body.get("items").and_then(Value::as_array) else {
        warn!(body = %body, "could not get channel data: response has no items");
        return ChannelPage::default();
    };

    let next_page_token = body
        .get("nextPageToken")
        .and_then(Value::as_str)
        .map(str::to_owned);

    let mut page = ChannelPage {
        items: Vec::with_capacity(items.len()),
        next_page_token,
    };
    for entry in items {
        match parse_listing_entry(entry) {
            Some(Some(item)) => page.items.push(item),
            Some(None) => {}
            None => warn!(item = %entry, "could not extract data from listing item"),
        }
    }
    page
}

/// `None` when required fields are missing, `Some(None)` for non-video kinds.
fn parse_listing_entry(entry: &Value) -> Option<Option<ContentItem>> {
    let kind = entry.pointer("/id/kind")?.as_str()?;
    let published_raw = entry.pointer("/snippet/publishedAt")?.as_str()?;
    let title = entry.pointer("/snippet/title")?.as_str()?;
    if kind != VIDEO_KIND {
        return Some(None);
    }
    let video_id = entry.pointer("/id/videoId")?.as_str()?;
    Some(Some(ContentItem::listed(
        video_id,
        parse_timestamp(published_raw, video_id),
        title,
    )))
}

/// Pages through the channel listing until no continuation token is
/// returned. Order is the listing order (newest first).
pub fn enumerate_channel(
    api: &impl YoutubeApi,
    channel_id: &str,
    page_size: Option<u32>,
) -> Result<Vec<ContentItem>, ApiError> {
    let mut videos: Vec<ContentItem> = Vec::new();
    let mut page_token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let body = api.search_page(channel_id, page_size, page_token.as_deref())?;
        let page = parse_channel_page(&body);
        pages += 1;
        debug!(page = pages, items = page.items.len(), "channel page parsed");
        for item in page.items {
            upsert_item(&mut videos, item);
        }
        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok(videos)
}

/// Later duplicates replace the earlier entry but keep its position.
fn upsert_item(videos: &mut Vec<ContentItem>, item: ContentItem) {
    match videos.iter_mut().find(|existing| existing.id == item.id) {
        Some(existing) => *existing = item,
        None => videos.push(item),
    }
}

/// Fetches one detail part for one video. Returns an empty mapping (after
/// logging the body) when the response lacks that part.
pub fn fetch_detail(
    api: &impl YoutubeApi,
    video_id: &str,
    part: DetailPart,
) -> Result<Map<String, Value>, ApiError> {
    let body = api.video_part(video_id, part)?;
    let fields = body
        .get("items")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|item| item.get(part.as_str()))
        .and_then(Value::as_object);
    match fields {
        Some(fields) => Ok(fields.clone()),
        None => {
            warn!(video_id, part = part.as_str(), body = %body, "could not get part of video data");
            Ok(Map::new())
        }
    }
}

/// Merges a part's field mapping into the item. Unknown fields are ignored;
/// malformed known fields are logged and left untouched.
pub fn apply_detail(item: &mut ContentItem, part: DetailPart, fields: &Map<String, Value>) {
    match part {
        DetailPart::Snippet => {
            if let Some(title) = fields.get("title").and_then(Value::as_str) {
                item.title = title.to_string();
            }
            if let Some(raw) = fields.get("publishedAt").and_then(Value::as_str)
                && let Some(at) = parse_timestamp(raw, &item.id)
            {
                item.published_at = Some(at);
            }
            if let Some(description) = fields.get("description").and_then(Value::as_str) {
                item.description = Some(description.to_string());
            }
            if let Some(tags) = fields.get("tags") {
                match string_list(tags) {
                    Some(tags) => item.tags = Some(tags),
                    None => warn!(video_id = %item.id, "tags field is not a list of strings"),
                }
            }
        }
        DetailPart::Statistics => {
            if let Some(value) = fields.get("viewCount") {
                item.view_count = parse_count(value, "viewCount", &item.id);
            }
            if let Some(value) = fields.get("likeCount") {
                item.like_count = parse_count(value, "likeCount", &item.id);
            }
        }
        DetailPart::TopicDetails => {
            if let Some(categories) = fields.get("topicCategories").and_then(string_list) {
                item.topic_categories = categories;
            }
        }
        DetailPart::ContentDetails => {
            if let Some(duration) = fields.get("duration").and_then(Value::as_str) {
                item.duration = Some(duration.to_string());
            }
        }
    }
}

/// Lists the channel and enriches every video with the requested parts.
/// `progress` is called with `(done, total)` after each video.
pub fn collect_videos(
    api: &impl YoutubeApi,
    channel_id: &str,
    page_size: Option<u32>,
    parts: &[DetailPart],
    mut progress: impl FnMut(usize, usize),
) -> Result<Vec<ContentItem>, ApiError> {
    let mut videos = enumerate_channel(api, channel_id, page_size)?;
    let total = videos.len();
    for (index, item) in videos.iter_mut().enumerate() {
        for part in parts {
            let fields = fetch_detail(api, &item.id, *part)?;
            apply_detail(item, *part, &fields);
        }
        progress(index + 1, total);
    }
    Ok(videos)
}

fn parse_timestamp(raw: &str, video_id: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(at) => Some(at.with_timezone(&Utc)),
        Err(err) => {
            warn!(video_id, raw, %err, "could not parse publish timestamp");
            None
        }
    }
}

fn parse_count(value: &Value, field: &str, video_id: &str) -> Option<u64> {
    let parsed = match value {
        Value::String(text) => text.trim().parse::<u64>().ok(),
        Value::Number(number) => number.as_u64(),
        _ => None,
    };
    if parsed.is_none() {
        warn!(video_id, field, value = %value, "could not parse counter");
    }
    parsed
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|entry| entry.as_str().map(str::to_owned))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Serves canned bodies keyed by page token / (video id, part).
    #[derive(Default)]
    struct FakeApi {
        pages: HashMap<Option<String>, Value>,
        parts: HashMap<(String, DetailPart), Value>,
        search_calls: RefCell<Vec<Option<String>>>,
    }

    impl YoutubeApi for FakeApi {
        fn search_page(
            &self,
            _channel_id: &str,
            _page_size: Option<u32>,
            page_token: Option<&str>,
        ) -> Result<Value, ApiError> {
            let key = page_token.map(str::to_owned);
            self.search_calls.borrow_mut().push(key.clone());
            Ok(self.pages.get(&key).cloned().unwrap_or_else(|| json!({})))
        }

        fn video_part(&self, video_id: &str, part: DetailPart) -> Result<Value, ApiError> {
            Ok(self
                .parts
                .get(&(video_id.to_string(), part))
                .cloned()
                .unwrap_or_else(|| json!({"items": []})))
        }
    }

    fn listing_entry(kind: &str, id: &str, title: &str) -> Value {
        json!({
            "id": {"kind": kind, "videoId": id, "playlistId": id},
            "snippet": {"publishedAt": "2024-01-02T03:04:05Z", "title": title}
        })
    }

    #[test]
    fn detail_part_aliases_agree_between_env_and_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            parts: Vec<DetailPart>,
        }
        let parsed: Wrapper =
            toml::from_str(r#"parts = ["topicDetails", "topic_details", "content_details"]"#)
                .unwrap();
        assert_eq!(
            parsed.parts,
            vec![
                DetailPart::TopicDetails,
                DetailPart::TopicDetails,
                DetailPart::ContentDetails
            ]
        );
        for alias in ["topicDetails", "topic_details", "contentDetails", "content_details"] {
            assert!(DetailPart::parse(alias).is_some(), "{alias}");
        }
    }

    #[test]
    fn parse_channel_page_skips_playlists_and_broken_items() {
        let body = json!({
            "nextPageToken": "NEXT",
            "items": [
                listing_entry("youtube#video", "v1", "First"),
                listing_entry("youtube#playlist", "p1", "A playlist"),
                {"id": {"kind": "youtube#video"}},
                listing_entry("youtube#video", "v2", "Second"),
            ]
        });
        let page = parse_channel_page(&body);
        let ids: Vec<_> = page.items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "v2"]);
        assert_eq!(page.next_page_token.as_deref(), Some("NEXT"));
        assert_eq!(page.items[0].title, "First");
        assert!(page.items[0].published_at.is_some());
    }

    #[test]
    fn parse_channel_page_without_items_is_empty_and_final() {
        let body = json!({"error": {"code": 403}, "nextPageToken": "ignored"});
        let page = parse_channel_page(&body);
        assert!(page.items.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn enumerate_channel_follows_tokens_until_exhausted() {
        let mut api = FakeApi::default();
        api.pages.insert(
            None,
            json!({"nextPageToken": "p2", "items": [listing_entry("youtube#video", "a", "A")]}),
        );
        api.pages.insert(
            Some("p2".into()),
            json!({"items": [
                listing_entry("youtube#video", "b", "B"),
                listing_entry("youtube#video", "a", "A again"),
            ]}),
        );
        let videos = enumerate_channel(&api, "chan", Some(50)).unwrap();
        let ids: Vec<_> = videos.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(videos[0].title, "A again");
        assert_eq!(
            *api.search_calls.borrow(),
            vec![None, Some("p2".to_string())]
        );
    }

    #[test]
    fn fetch_detail_returns_empty_mapping_when_part_missing() {
        let mut api = FakeApi::default();
        api.parts.insert(
            ("v1".into(), DetailPart::Statistics),
            json!({"items": [{"id": "v1"}]}),
        );
        let fields = fetch_detail(&api, "v1", DetailPart::Statistics).unwrap();
        assert!(fields.is_empty());
        let fields = fetch_detail(&api, "unknown", DetailPart::Snippet).unwrap();
        assert!(fields.is_empty());
    }

    #[test]
    fn collect_videos_merges_every_part() {
        let mut api = FakeApi::default();
        api.pages.insert(
            None,
            json!({"items": [listing_entry("youtube#video", "v1", "Escaped &amp; title")]}),
        );
        api.parts.insert(
            ("v1".into(), DetailPart::Snippet),
            json!({"items": [{"snippet": {
                "title": "Escaped & title",
                "description": "see https://example.com",
                "tags": ["music", "live"]
            }}]}),
        );
        api.parts.insert(
            ("v1".into(), DetailPart::Statistics),
            json!({"items": [{"statistics": {"viewCount": "1500", "likeCount": "42"}}]}),
        );
        api.parts.insert(
            ("v1".into(), DetailPart::TopicDetails),
            json!({"items": [{"topicDetails": {
                "topicCategories": ["https://en.wikipedia.org/wiki/Music"]
            }}]}),
        );

        let mut reported = Vec::new();
        let videos = collect_videos(&api, "chan", None, &DetailPart::DEFAULT, |done, total| {
            reported.push((done, total))
        })
        .unwrap();

        assert_eq!(reported, vec![(1, 1)]);
        let item = &videos[0];
        assert_eq!(item.title, "Escaped & title");
        assert_eq!(item.description.as_deref(), Some("see https://example.com"));
        assert_eq!(item.tags, Some(vec!["music".to_string(), "live".to_string()]));
        assert_eq!(item.view_count, Some(1500));
        assert_eq!(item.like_count, Some(42));
        assert_eq!(item.topic_categories.len(), 1);
    }

    #[test]
    fn apply_detail_leaves_unparseable_counters_absent() {
        let mut item = ContentItem::listed("v1", None, "t");
        let fields = json!({"viewCount": "many", "likeCount": 7});
        apply_detail(
            &mut item,
            DetailPart::Statistics,
            fields.as_object().unwrap(),
        );
        assert_eq!(item.view_count, None);
        assert_eq!(item.like_count, Some(7));
    }

    #[test]
    fn detail_part_names_match_api() {
        for part in [
            DetailPart::Snippet,
            DetailPart::Statistics,
            DetailPart::TopicDetails,
            DetailPart::ContentDetails,
        ] {
            assert_eq!(DetailPart::parse(part.as_str()), Some(part));
        }
        assert_eq!(DetailPart::parse("bogus"), None);
    }

    #[test]
    fn ureq_api_sends_key_and_paging_parameters() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/search")
                .query_param("key", "secret")
                .query_param("channelId", "chan")
                .query_param("part", "snippet,id")
                .query_param("order", "date")
                .query_param("maxResults", "50")
                .query_param("pageToken", "tok");
            then.status(200).json_body(json!({"items": []}));
        });

        let api = UreqYoutubeApi::new(crate::http::build_agent(), &server.base_url(), "secret");
        let body = api.search_page("chan", Some(50), Some("tok")).unwrap();
        mock.assert();
        assert_eq!(body, json!({"items": []}));
    }

    #[test]
    fn ureq_api_returns_error_bodies_for_inspection() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/videos")
                .query_param("part", "statistics")
                .query_param("id", "v1");
            then.status(403)
                .json_body(json!({"error": {"code": 403, "message": "quotaExceeded"}}));
        });

        let api = UreqYoutubeApi::new(crate::http::build_agent(), &server.base_url(), "k");
        let fields = fetch_detail(&api, "v1", DetailPart::Statistics).unwrap();
        mock.assert();
        assert!(fields.is_empty());
    }

    #[test]
    fn ureq_api_reports_transport_failures() {
        let api = UreqYoutubeApi::new(crate::http::build_agent(), "http://127.0.0.1:1", "k");
        let err = api.video_part("v1", DetailPart::Snippet).unwrap_err();
        assert!(matches!(err, ApiError::Transport { .. }));
    }
}
