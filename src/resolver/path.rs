//! Dotted and bracketed path lookup over JSON values.
//!
//! `data.answer[0].content`, `$.steps.step1.extracted.token`, `[0].id` and
//! `matrix[1][0]` are all valid paths. A leading `$.` is optional and an empty
//! path selects the root itself.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::{Result, ScrapeError};

/// One dotted part: an optional key followed by any number of `[n]` indexes.
static PART_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([^\[\]]*)((?:\[\d+\])*)$").unwrap());
static INDEX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl Segment {
    fn label(&self) -> String {
        match self {
            Segment::Key(key) => key.clone(),
            Segment::Index(idx) => format!("[{}]", idx),
        }
    }
}

/// Strip the `$.` (or bare `$`) root marker.
fn strip_root(path: &str) -> &str {
    let path = path.trim();
    if let Some(rest) = path.strip_prefix("$.") {
        rest
    } else if path == "$" {
        ""
    } else {
        path
    }
}

/// Split a path into segments. A malformed part is reported as the failing segment.
pub fn parse(path: &str) -> Result<Vec<Segment>> {
    let body = strip_root(path);
    if body.is_empty() {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    for part in body.split('.') {
        let caps = PART_RE.captures(part).ok_or_else(|| ScrapeError::reference_not_found(path, part))?;
        let key = &caps[1];
        let indexes = &caps[2];

        if key.is_empty() && indexes.is_empty() {
            return Err(ScrapeError::reference_not_found(path, part));
        }
        if !key.is_empty() {
            segments.push(Segment::Key(key.to_string()));
        }
        for idx in INDEX_RE.captures_iter(indexes) {
            let idx = idx[1].parse::<usize>().map_err(|_| ScrapeError::reference_not_found(path, &idx[0]))?;
            segments.push(Segment::Index(idx));
        }
    }
    Ok(segments)
}

/// Walk `path` from `root`, failing with the first segment that does not resolve.
pub fn lookup<'a>(
    root: &'a Value,
    path: &str,
) -> Result<&'a Value> {
    let mut current = root;
    for segment in parse(path)? {
        let next = match &segment {
            Segment::Key(key) => current.as_object().and_then(|obj| obj.get(key)),
            Segment::Index(idx) => current.as_array().and_then(|arr| arr.get(*idx)),
        };
        current = next.ok_or_else(|| ScrapeError::reference_not_found(path, &segment.label()))?;
    }
    Ok(current)
}
