#![forbid(unsafe_code)]

use crate::models::{ContentItem, LinkRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Whitespace is the only terminator, so trailing punctuation stays attached
/// to the link.
static LINK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+").expect("link pattern compiles"));

/// Returns every link substring of `text`, in order of appearance.
pub fn find_links(text: &str) -> impl Iterator<Item = &str> {
    LINK_PATTERN.find_iter(text).map(|found| found.as_str())
}

/// Produces one record per link across all items. Ids start at zero and
/// follow item order, then match order within an item.
pub fn extract_links(items: &[ContentItem]) -> Vec<LinkRecord> {
    let mut records = Vec::new();
    let mut next_id = 0u64;

    for item in items {
        let Some(description) = item.description.as_deref() else {
            warn!(video_id = %item.id, "video has no description; no links extracted");
            continue;
        };

        let mut found = 0usize;
        for link in find_links(description) {
            records.push(snapshot_item(next_id, link, item));
            next_id += 1;
            found += 1;
        }
        debug!(video_id = %item.id, links = found, "description scanned");
    }

    records
}

fn snapshot_item(id: u64, link: &str, item: &ContentItem) -> LinkRecord {
    report_missing(item, "publishedAt", item.published_at.is_none());
    report_missing(item, "tags", item.tags.is_none());
    report_missing(item, "viewCount", item.view_count.is_none());
    report_missing(item, "likeCount", item.like_count.is_none());

    LinkRecord {
        id,
        link: link.to_string(),
        video_id: item.id.clone(),
        published_at: item.published_at,
        tags: item.tags.clone(),
        view_count: item.view_count,
        like_count: item.like_count,
    }
}

fn report_missing(item: &ContentItem, field: &str, missing: bool) {
    if missing {
        warn!(video_id = %item.id, field, "can not get field for video");
    }
}
