use super::types::*;
use crate::error::{ItemDefect, ParseError};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Non-blank string content of a JSON value.
fn text(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}

/// Representative file name. `files` is either a map keyed by file name or a
/// list of such maps; in the list case the first entry's keys are used.
fn first_file_name(files: &Value) -> Option<&str> {
    let map = match files {
        Value::Object(map) => map,
        Value::Array(list) => list.first()?.as_object()?,
        _ => return None,
    };
    map.keys().next().map(String::as_str).filter(|k| !k.is_empty())
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    text(value)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Convert one feed entry. Field-level defects are filled with sentinels;
/// only a non-object entry or one without any identifier is rejected.
pub fn parse_entry(index: usize, entry: Value) -> Result<Item, ItemDefect> {
    if !entry.is_object() {
        return Err(ItemDefect::NotAnObject { index });
    }
    let gist: RawGist =
        serde_json::from_value(entry).map_err(|_| ItemDefect::NotAnObject { index })?;

    let content_url = text(&gist.html_url).or_else(|| text(&gist.url));
    let identifier = text(&gist.id)
        .map(str::to_string)
        .or_else(|| gist.id.as_u64().map(|n| n.to_string()))
        .or_else(|| content_url.map(str::to_string))
        .ok_or(ItemDefect::MissingIdentifier { index })?;

    // `owner: null` and a missing owner both end up here as a non-object.
    let owner = gist.owner.as_object();
    let owner_name = owner
        .and_then(|o| o.get("login"))
        .and_then(text)
        .unwrap_or(ANONYMOUS_OWNER)
        .to_string();
    let icon_url = owner
        .and_then(|o| o.get("avatar_url"))
        .and_then(text)
        .unwrap_or(PLACEHOLDER_ICON_URL)
        .to_string();

    let file_name = first_file_name(&gist.files).unwrap_or(UNTITLED_FILE);

    Ok(Item {
        title: format!("{} / {}", owner_name, file_name),
        owner: owner_name,
        description: gist.description.as_str().unwrap_or_default().to_string(),
        content_url: content_url.unwrap_or_default().to_string(),
        icon_url,
        updated_at: parse_timestamp(&gist.updated_at),
        identifier,
    })
}

/// Decode a feed body into items, in source order.
///
/// The body must be a JSON array; anything else aborts the cycle with a
/// [`ParseError`]. Individual bad entries are logged and skipped.
pub fn parse_feed(body: &str) -> Result<Vec<Item>, ParseError> {
    let document: Value =
        serde_json::from_str(body).map_err(|e| ParseError(e.to_string()))?;
    let Value::Array(entries) = document else {
        return Err(ParseError("expected a JSON array of gists".to_string()));
    };

    let mut items = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        match parse_entry(index, entry) {
            Ok(item) => items.push(item),
            Err(defect) => tracing::warn!(%defect, "skipping feed entry"),
        }
    }
    Ok(items)
}
