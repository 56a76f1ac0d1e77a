//! Candidate span extraction: fenced blocks and balanced brace spans.

/// One ```` ``` ```` fenced block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Fence<'a> {
    /// Info string after the opening fence (`json`, `text`, or empty).
    pub label: &'a str,
    pub body: &'a str,
}

/// All closed fenced blocks, in order.  An unclosed fence ends the scan.
pub(crate) fn fences(text: &str) -> Vec<Fence<'_>> {
    const FENCE: &str = "```";

    let mut out = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find(FENCE) {
        let after = &rest[open + FENCE.len()..];

        // The info string runs to the end of the opening line.
        let (label, body_start) = match after.find('\n') {
            Some(nl) if is_info_string(after[..nl].trim()) => (after[..nl].trim(), nl + 1),
            _ => ("", 0),
        };

        let region = &after[body_start..];
        let Some(close) = region.find(FENCE) else {
            break;
        };
        out.push(Fence {
            label,
            body: &region[..close],
        });
        rest = &region[close + FENCE.len()..];
    }
    out
}

fn is_info_string(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'))
}

/// Top-level balanced `{ ... }` spans, found by depth counting.
///
/// Double-quoted strings are skipped (with backslash escapes), so braces in
/// values do not affect depth.  Stray closing braces at depth zero are
/// ignored; a span still open at the end of the text is dropped.
pub(crate) fn object_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        spans.push(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    spans
}
