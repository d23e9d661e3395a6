//! Structured data embedded in listing pages: JSON-LD, `__NEXT_DATA__`,
//! and inline application-state blobs assigned to `window.*`.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use jobscout_core::{RawJobRecord, Source};
use regex::Regex;
use scraper::Html;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::dates::{date_from_epoch, parse_posted_date};
use crate::markup::{compile, FallbackApplyUrl};
use crate::{truncate_chars, AdapterError, PageContext, StrategyResult, MAX_DESCRIPTION_CHARS};

/// Upper bound on how far a balanced-brace scan may run.
pub const MAX_BLOB_SCAN_BYTES: usize = 3_000_000;

/// Depth limit when hunting for a `results` array.
pub const MAX_RESULTS_DEPTH: usize = 8;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern compiles"));

pub fn strip_tags(text: &str) -> String {
    let stripped = if text.contains('<') {
        TAG_RE.replace_all(text, " ").into_owned()
    } else {
        text.to_string()
    };
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn description_from(text: &str) -> String {
    truncate_chars(&strip_tags(text), MAX_DESCRIPTION_CHARS)
}

pub fn json_at<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    Some(cur)
}

pub fn json_str<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    json_at(value, path)?.as_str()
}

/// First non-blank string among `keys`, numbers rendered as text.
pub fn first_text(value: &JsonValue, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(*key)? {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First of `keys` that yields a date: numbers as epochs, strings as ISO or
/// relative text.
pub fn posted_date_of(value: &JsonValue, keys: &[&str], now: DateTime<Utc>) -> Option<NaiveDate> {
    keys.iter().find_map(|key| match value.get(*key)? {
        JsonValue::Number(n) => n.as_f64().and_then(date_from_epoch),
        JsonValue::String(s) => parse_posted_date(s, now),
        _ => None,
    })
}

/// Parse the JSON object that opens at byte `start` (which must be `{`),
/// honouring string literals so braces inside them do not count.
pub fn balanced_json_at(text: &str, start: usize) -> Option<JsonValue> {
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&b'{') {
        return None;
    }
    let limit = bytes.len().min(start.saturating_add(MAX_BLOB_SCAN_BYTES));
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for idx in start..limit {
        let b = bytes[idx];
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return serde_json::from_str(&text[start..=idx]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

/// Every object blob assigned right after a match of `marker`.
pub fn blobs_after(text: &str, marker: &Regex) -> Vec<JsonValue> {
    marker
        .find_iter(text)
        .filter_map(|m| {
            let open = m.end() + text[m.end()..].find('{')?;
            balanced_json_at(text, open)
        })
        .filter(JsonValue::is_object)
        .collect()
}

/// Depth-first search for a non-empty `results` array of job-shaped objects.
pub fn find_results(value: &JsonValue, depth: usize) -> Option<&Vec<JsonValue>> {
    if depth > MAX_RESULTS_DEPTH {
        return None;
    }
    let object = value.as_object()?;
    for (key, child) in object {
        if key == "results" {
            if let Some(items) = child.as_array() {
                let job_shaped = items.first().is_some_and(|first| {
                    first.get("job").is_some()
                        || first.get("title").is_some()
                        || first.get("jobkey").is_some()
                });
                if job_shaped {
                    return Some(items);
                }
            }
        }
        if child.is_object() {
            if let Some(found) = find_results(child, depth + 1) {
                return Some(found);
            }
        }
    }
    None
}

fn script_texts(document: &Html, selector: &str) -> Result<Vec<String>, AdapterError> {
    let sel = compile(selector)?;
    Ok(document
        .select(&sel)
        .map(|script| script.text().collect::<String>())
        .collect())
}

/// All `JobPosting` objects from `application/ld+json` scripts.
pub fn json_ld_postings(document: &Html) -> Result<Vec<JsonValue>, AdapterError> {
    let mut postings = Vec::new();
    for raw in script_texts(document, r#"script[type="application/ld+json"]"#)? {
        let parsed: JsonValue = match serde_json::from_str(raw.trim()) {
            Ok(v) => v,
            Err(err) => {
                debug!(error = %err, "skipping unparseable ld+json block");
                continue;
            }
        };
        let items = match parsed {
            JsonValue::Array(items) => items,
            JsonValue::Object(ref obj) if obj.get("@graph").is_some_and(JsonValue::is_array) => obj
                .get("@graph")
                .and_then(JsonValue::as_array)
                .cloned()
                .unwrap_or_default(),
            other => vec![other],
        };
        postings.extend(items.into_iter().filter(|item| {
            json_str(item, &["@type"]) == Some("JobPosting") && first_text(item, &["title"]).is_some()
        }));
    }
    Ok(postings)
}

/// `props.pageProps` from a Next.js data script.
pub fn next_data_page_props(document: &Html) -> Result<Option<JsonValue>, AdapterError> {
    let Some(raw) = script_texts(document, "script#__NEXT_DATA__")?.into_iter().next() else {
        return Ok(None);
    };
    let parsed: JsonValue = match serde_json::from_str(raw.trim()) {
        Ok(v) => v,
        Err(err) => {
            debug!(error = %err, "unparseable __NEXT_DATA__ block");
            return Ok(None);
        }
    };
    Ok(json_at(&parsed, &["props", "pageProps"]).cloned())
}

/// The job list under the first populated `keys` entry of `page_props`.
/// Lists may sit directly under the key or one level down under `nested`.
pub fn page_props_items<'a>(
    page_props: &'a JsonValue,
    keys: &[&str],
    nested: &[&str],
) -> Vec<&'a JsonValue> {
    for key in keys {
        let Some(raw) = page_props.get(*key) else {
            continue;
        };
        let list = match raw {
            JsonValue::Array(items) => Some(items),
            JsonValue::Object(_) => nested.iter().find_map(|n| raw.get(*n)?.as_array()),
            _ => None,
        };
        if let Some(items) = list.filter(|items| !items.is_empty()) {
            return items.iter().collect();
        }
    }
    Vec::new()
}

fn ld_locality(posting: &JsonValue) -> Option<String> {
    let location = match posting.get("jobLocation")? {
        JsonValue::Array(items) => items.first()?,
        other => other,
    };
    json_str(location, &["address", "addressLocality"])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Map one JSON-LD `JobPosting` onto a record.
pub fn ld_posting_record(
    source: Source,
    posting: &JsonValue,
    ctx: &PageContext<'_>,
    fallback_apply_url: FallbackApplyUrl,
) -> Option<RawJobRecord> {
    let role = first_text(posting, &["title"])?;
    let company = json_str(posting, &["hiringOrganization", "name"])?.trim().to_string();
    let location = ld_locality(posting).unwrap_or_else(|| ctx.location.trim().to_string());
    let apply_url = first_text(posting, &["url"])
        .unwrap_or_else(|| fallback_apply_url(ctx, &role, &company));
    let description = posting
        .get("description")
        .and_then(JsonValue::as_str)
        .map(description_from)
        .unwrap_or_default();
    let date_posted = posted_date_of(posting, &["datePosted"], ctx.now);

    RawJobRecord::new(source, company, role, location, apply_url)
        .map(|r| r.with_description(description).with_date_posted(date_posted))
}

/// JSON-LD strategy body shared by portals that publish `JobPosting` markup.
pub fn json_ld_records(
    source: Source,
    body: &str,
    ctx: &PageContext<'_>,
    fallback_apply_url: FallbackApplyUrl,
) -> StrategyResult {
    let document = Html::parse_document(body);
    let postings = json_ld_postings(&document)?;
    if postings.is_empty() {
        return Ok(None);
    }
    Ok(Some(
        postings
            .iter()
            .filter_map(|p| ld_posting_record(source, p, ctx, fallback_apply_url))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn balanced_scan_ignores_braces_in_strings() {
        let text = r#"window.x = {"a": "}{", "b": {"c": "\"}"}}; trailing {"#;
        let start = text.find('{').unwrap();
        let value = balanced_json_at(text, start).unwrap();
        assert_eq!(value["a"], "}{");
        assert_eq!(value["b"]["c"], "\"}");
    }

    #[test]
    fn unterminated_blob_is_none() {
        assert!(balanced_json_at(r#"{"a": {"b": 1}"#, 0).is_none());
        assert!(balanced_json_at("no brace", 0).is_none());
    }

    #[test]
    fn finds_nested_results() {
        let value = json!({
            "meta": {"results": [1, 2]},
            "metaData": {"mosaicProviderJobCardsModel": {"results": [{"jobkey": "k1"}]}}
        });
        let found = find_results(&value, 0).unwrap();
        assert_eq!(found[0]["jobkey"], "k1");
    }

    #[test]
    fn results_search_is_depth_bounded() {
        let mut value = json!({"results": [{"title": "deep"}]});
        for _ in 0..=MAX_RESULTS_DEPTH {
            value = json!({ "wrap": value });
        }
        assert!(find_results(&value, 0).is_none());
    }

    #[test]
    fn posted_date_prefers_first_usable_key() {
        use chrono::TimeZone;
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).single().unwrap();
        let item = json!({"pubDate": 1_772_150_400_000u64, "formattedRelativeTime": "Today"});
        assert_eq!(
            posted_date_of(&item, &["datePublished", "pubDate", "formattedRelativeTime"], now),
            NaiveDate::from_ymd_opt(2026, 2, 27)
        );
        let item = json!({"pubDate": 0, "formattedRelativeTime": "2 days ago"});
        assert_eq!(
            posted_date_of(&item, &["pubDate", "formattedRelativeTime"], now),
            NaiveDate::from_ymd_opt(2026, 3, 8)
        );
    }

    #[test]
    fn strips_markup_and_collapses_space() {
        assert_eq!(strip_tags("<ul><li>Own the <b>roadmap</b></li></ul>"), "Own the roadmap");
        assert_eq!(strip_tags("plain  text"), "plain text");
    }

    #[test]
    fn page_props_lists_direct_or_nested() {
        let props = json!({"jobs": [], "searchResult": {"jobDetails": [{"title": "PM"}]}});
        let items = page_props_items(&props, &["jobs", "searchResult"], &["jobDetails", "jobs"]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["title"], "PM");
    }
}
