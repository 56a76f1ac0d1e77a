//! Best-effort repair of almost-JSON.
//!
//! A single character-level pass that:
//! * strips `//` line comments and `/* */` block comments,
//! * drops commas directly before `}` or `]`,
//! * rewrites `'single'` quoted strings as `"double"` quoted ones,
//! * quotes bare identifier keys (`greeting_1:` becomes `"greeting_1":`),
//! * maps a full-width colon outside strings to `:`,
//! * collapses whitespace runs outside strings and escapes raw control
//!   characters inside them.
//!
//! The output is only ever handed to the strict parser.

use std::iter::Peekable;
use std::str::Chars;

pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => copy_double_quoted(&mut chars, &mut out),
            '\'' => convert_single_quoted(&mut chars, &mut out),
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
                push_space(&mut out);
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                push_space(&mut out);
            }
            ',' if next_significant(&chars).is_some_and(|n| n == '}' || n == ']') => {}
            '：' => out.push(':'),
            c if c.is_whitespace() => push_space(&mut out),
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::from(c);
                while let Some(&n) = chars.peek() {
                    if n.is_alphanumeric() || n == '_' {
                        ident.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if next_significant(&chars).is_some_and(|n| n == ':' || n == '：') {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else {
                    out.push_str(&ident);
                }
            }
            c => out.push(c),
        }
    }

    out.trim().to_string()
}

/// First non-whitespace character ahead, without consuming anything.
fn next_significant(chars: &Peekable<Chars<'_>>) -> Option<char> {
    chars.clone().find(|c| !c.is_whitespace())
}

fn push_space(out: &mut String) {
    if !out.is_empty() && !out.ends_with(' ') {
        out.push(' ');
    }
}

fn push_string_char(c: char, out: &mut String) {
    match c {
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        c if c.is_control() => {}
        c => out.push(c),
    }
}

/// Copy a double-quoted string (opening quote already consumed).
fn copy_double_quoted(chars: &mut Peekable<Chars<'_>>, out: &mut String) {
    out.push('"');
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push('\\');
                if let Some(n) = chars.next() {
                    out.push(n);
                }
            }
            '"' => break,
            c => push_string_char(c, out),
        }
    }
    out.push('"');
}

/// Rewrite a single-quoted string (opening quote already consumed) as a
/// double-quoted one.
fn convert_single_quoted(chars: &mut Peekable<Chars<'_>>, out: &mut String) {
    out.push('"');
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\'') => out.push('\''),
                Some(n) => {
                    out.push('\\');
                    out.push(n);
                }
                None => {}
            },
            '"' => out.push_str("\\\""),
            '\'' => break,
            c => push_string_char(c, out),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repairs_the_common_mistakes() {
        assert_eq!(
            normalize("{greeting_1: 'hi', }"),
            r#"{"greeting_1": "hi" }"#
        );
    }

    #[test]
    fn strips_comments() {
        let text = "{\"a\": \"x\", // note\n/* block\ncomment */ \"b\": \"y\"}";
        let fixed = normalize(text);
        assert!(!fixed.contains("note"));
        assert!(!fixed.contains("block"));
        let value: serde_json::Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(value["b"], "y");
    }

    #[test]
    fn comment_markers_inside_strings_survive() {
        let fixed = normalize(r#"{"url": "http://example.com/*x*/"}"#);
        assert_eq!(fixed, r#"{"url": "http://example.com/*x*/"}"#);
    }

    #[test]
    fn single_quoted_strings_escape_inner_double_quotes() {
        let fixed = normalize(r#"{'a': 'say "hi"', 'b': 'it\'s'}"#);
        let value: serde_json::Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(value["a"], "say \"hi\"");
        assert_eq!(value["b"], "it's");
    }

    #[test]
    fn literals_are_not_quoted() {
        assert_eq!(normalize("{a: true, b: null}"), r#"{"a": true, "b": null}"#);
    }

    #[test]
    fn han_keys_and_full_width_colon() {
        let fixed = normalize("{问候：'你好'}");
        assert_eq!(fixed, r#"{"问候":"你好"}"#);
    }

    #[test]
    fn raw_newlines_inside_strings_are_escaped() {
        let fixed = normalize("{\"a\": \"line one\nline two\"}");
        let value: serde_json::Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(value["a"], "line one\nline two");
    }

    #[test]
    fn trailing_comma_in_arrays() {
        assert_eq!(normalize("[1, 2, ]"), "[1, 2 ]");
    }
}
