//! Last-resort line scan for `key: value` style pairs.

use once_cell::sync::Lazy;
use regex::Regex;

use super::ResultMap;

/// `"key": "value"` with JSON escapes in the value.
static QUOTED_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""([^"\n]+)"\s*[:：]\s*"((?:[^"\\]|\\.)*)""#).expect("valid quoted pair regex")
});

/// `key: value`, `key=value` or `key：value`, value up to a newline, comma
/// or closing brace.  Keys may be quoted with single quotes.
static BARE_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"'?([\p{L}_][\w]*)'?\s*[:=：]\s*([^\n,}]+)").expect("valid bare pair regex")
});

/// Scan `raw` for pairs.  Quoted pairs win when any are present.
pub(crate) fn line_scan(raw: &str) -> Option<ResultMap> {
    let quoted: ResultMap = QUOTED_PAIR
        .captures_iter(raw)
        .filter_map(|c| entry(&c[1], &unescape(&c[2])))
        .collect();
    if !quoted.is_empty() {
        return Some(quoted);
    }

    let bare: ResultMap = BARE_PAIR
        .captures_iter(raw)
        .filter_map(|c| {
            let value = c[2]
                .trim()
                .trim_matches(|ch: char| matches!(ch, '"' | '\'' | '“' | '”' | '「' | '」'))
                .trim();
            entry(&c[1], value)
        })
        .collect();
    (!bare.is_empty()).then_some(bare)
}

fn entry(key: &str, value: &str) -> Option<(String, String)> {
    let key = key.trim();
    let value = value.trim();
    (!key.is_empty() && !value.is_empty()).then(|| (key.to_string(), value.to_string()))
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
