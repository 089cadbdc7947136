//! Search result normalization
//!
//! Indexers hand back wildly heterogeneous payloads: newznab-ish XML
//! turned JSON, torrent APIs, and scraped HTML pages. This module maps
//! each raw hit into one canonical `SearchResult` at the boundary, so
//! nothing downstream ever touches an untyped map. Upstream data is
//! untrusted; every field degrades to an empty/None value instead of
//! erroring.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Transport class of a search hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Usenet,
    Torrent,
    Http,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Usenet => "usenet",
            SourceType::Torrent => "torrent",
            SourceType::Http => "http",
        }
    }
}

/// Protocol family an indexer speaks
///
/// Torznab is not a separate kind: it is the newznab protocol with a
/// different default category, carried on the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexerKind {
    BuiltinHttp,
    Torrent,
    Newznab,
}

/// Static description of one configured indexer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerDescriptor {
    pub id: String,
    pub name: String,
    pub kind: IndexerKind,
    /// Page-scraping sources need a follow-up fetch before download
    #[serde(default)]
    pub requires_scraping: bool,
    /// Category applied when the payload carries none (torznab-style)
    #[serde(default)]
    pub default_category: Option<u32>,
}

/// One mirror of a multi-link HTTP source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadLink {
    pub url: String,
    pub service: String,
    pub priority: u32,
    /// Inclusive issue range this link covers, for partial-volume links
    pub issue_range: Option<(f64, f64)>,
    pub context_text: Option<String>,
}

/// Canonical search hit
///
/// `guid` deduplicates only within one indexer; the same guid string
/// from two indexers is two different logical sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub guid: String,
    pub link: String,
    pub pub_date: Option<DateTime<Utc>>,
    pub size: Option<i64>,
    pub categories: Vec<u32>,
    pub indexer_id: String,
    pub indexer_name: String,
    pub source_type: SourceType,
    pub download_links: Vec<DownloadLink>,
    pub requires_scraping: bool,
    pub is_volume_pack: bool,
    /// Inclusive (first, last) issue numbers a pack covers
    pub covers_issues: Option<(f64, f64)>,
    pub pack_issue_count: Option<u32>,
}

/// Map one raw indexer payload into the canonical shape
pub fn normalize(raw: &Value, indexer: &IndexerDescriptor) -> SearchResult {
    let source_type = match indexer.kind {
        IndexerKind::BuiltinHttp => SourceType::Http,
        IndexerKind::Torrent => SourceType::Torrent,
        IndexerKind::Newznab => SourceType::Usenet,
    };

    let title = string_field(raw, "title");
    let link = string_field(raw, "link");
    let guid = match raw.get("guid").and_then(Value::as_str) {
        Some(guid) if !guid.is_empty() => guid.to_string(),
        _ => link.clone(),
    };

    let mut categories = parse_categories(raw.get("categories"));
    if categories.is_empty() {
        if let Some(default) = indexer.default_category {
            categories.push(default);
        }
    }

    let is_volume_pack = raw
        .get("is_volume_pack")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    SearchResult {
        title,
        guid,
        link,
        pub_date: raw
            .get("pub_date")
            .and_then(Value::as_str)
            .and_then(parse_pub_date),
        size: parse_size(raw.get("size")),
        categories,
        indexer_id: indexer.id.clone(),
        indexer_name: indexer.name.clone(),
        source_type,
        download_links: parse_download_links(raw.get("download_links")),
        requires_scraping: indexer.requires_scraping
            || raw
                .get("requires_scraping")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        is_volume_pack,
        covers_issues: if is_volume_pack {
            parse_issue_range(raw.get("covers_issues"))
        } else {
            None
        },
        pack_issue_count: if is_volume_pack {
            raw.get("pack_issue_count")
                .and_then(Value::as_u64)
                .map(|n| n as u32)
        } else {
            None
        },
    }
}

fn string_field(raw: &Value, key: &str) -> String {
    raw.get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

/// Publication date cascade: RFC-3339, RFC-2822, then two naive formats
fn parse_pub_date(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
    }

    None
}

/// Size in bytes from a JSON number or a numeric string
fn parse_size(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Categories from a comma-separated string or a JSON array
///
/// Non-digit tokens are dropped rather than failing the whole list.
fn parse_categories(value: Option<&Value>) -> Vec<u32> {
    match value {
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()))
            .filter_map(|token| token.parse().ok())
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_u64)
            .map(|n| n as u32)
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_download_links(value: Option<&Value>) -> Vec<DownloadLink> {
    let items = match value {
        Some(Value::Array(items)) => items,
        _ => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| {
            let url = item.get("url").and_then(Value::as_str)?;
            Some(DownloadLink {
                url: url.to_string(),
                service: item
                    .get("service")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
                priority: item
                    .get("priority")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as u32,
                issue_range: parse_issue_range(item.get("issue_range")),
                context_text: item
                    .get("context_text")
                    .and_then(Value::as_str)
                    .map(|s| s.to_string()),
            })
        })
        .collect()
}

fn parse_issue_range(value: Option<&Value>) -> Option<(f64, f64)> {
    let items = value?.as_array()?;
    if items.len() != 2 {
        return None;
    }
    Some((items[0].as_f64()?, items[1].as_f64()?))
}
