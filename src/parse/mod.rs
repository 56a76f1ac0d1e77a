//! Response parser and repair.
//!
//! Models wrap their JSON in prose or code fences, quote inconsistently and
//! leave trailing commas.  [`parse_response`] runs an ordered list of
//! extraction strategies over the raw text and returns the first non-empty
//! mapping.  It never fails: an empty map means "nothing usable", and the
//! caller retries the keys it is missing.
//!
//! Every structured span is parsed strictly.  A span that does not parse as a
//! complete JSON object contributes nothing; the next strategy gets its turn.

mod normalize;
mod scan;
mod spans;

use indexmap::IndexMap;

pub use normalize::normalize;

/// Key → line mapping extracted from one response, in response order.
pub type ResultMap = IndexMap<String, String>;

/// A pure extraction strategy.
type Strategy = fn(&str) -> Option<ResultMap>;

/// Strategies in the order they are tried.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("json fence", json_fence),
    ("any fence", any_fence),
    ("brace span", brace_span),
    ("whole text", whole_text),
    ("normalized", normalized),
    ("line scan", scan::line_scan),
];

/// Turn raw model output into a key → text mapping.
pub fn parse_response(raw: &str) -> ResultMap {
    let raw = raw.trim_start_matches('\u{feff}').trim();
    if raw.is_empty() {
        return ResultMap::new();
    }

    for (name, strategy) in STRATEGIES {
        if let Some(map) = strategy(raw) {
            if !map.is_empty() {
                log::debug!("parse: {} entries via {name}", map.len());
                return map;
            }
        }
    }

    log::debug!("parse: no usable entries in {} bytes", raw.len());
    ResultMap::new()
}

/// Parse `span` as one complete JSON object, keeping non-empty string values.
pub fn parse_strict(span: &str) -> Option<ResultMap> {
    let object: IndexMap<String, serde_json::Value> = serde_json::from_str(span.trim()).ok()?;

    Some(
        object
            .iter()
            .filter_map(|(key, value)| {
                let text = value.as_str()?.trim();
                let key = key.trim();
                (!text.is_empty() && !key.is_empty()).then(|| (key.to_string(), text.to_string()))
            })
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn first_strict<'a>(candidates: impl IntoIterator<Item = &'a str>) -> Option<ResultMap> {
    candidates
        .into_iter()
        .filter_map(parse_strict)
        .find(|map| !map.is_empty())
}

fn json_fence(raw: &str) -> Option<ResultMap> {
    first_strict(
        spans::fences(raw)
            .into_iter()
            .filter(|f| f.label.eq_ignore_ascii_case("json"))
            .map(|f| f.body),
    )
}

fn any_fence(raw: &str) -> Option<ResultMap> {
    first_strict(spans::fences(raw).into_iter().map(|f| f.body))
}

fn brace_span(raw: &str) -> Option<ResultMap> {
    first_strict(spans::object_spans(raw))
}

fn whole_text(raw: &str) -> Option<ResultMap> {
    parse_strict(raw)
}

/// Normalise every candidate span the strict strategies saw, then retry.
fn normalized(raw: &str) -> Option<ResultMap> {
    let mut candidates: Vec<&str> = spans::fences(raw).into_iter().map(|f| f.body).collect();
    candidates.extend(spans::object_spans(raw));
    candidates.push(raw);

    candidates
        .into_iter()
        .map(normalize)
        .filter_map(|text| {
            // Normalising can make a previously unbalanced span balanced.
            spans::object_spans(&text)
                .into_iter()
                .find_map(|span| parse_strict(span).filter(|m| !m.is_empty()))
        })
        .next()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
