//! Tolerant repair of near-JSON emitted by the model.
//!
//! The model routinely wraps its answer in a fenced block, leaves keys bare,
//! uses single quotes, leaves trailing commas and writes `"key": ,` for unknown
//! values. `repair_json` fixes those in one string-aware pass, so text inside
//! double-quoted strings is never rewritten and valid JSON comes back as-is.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::IgnoredAny;
use serde_json::Value;

use super::AnalysisError;

const FENCE: &str = "```";

/// Fence carrying a language tag, e.g. "```json". The body may start on the
/// same line as the tag.
static TAGGED_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z][\w.+-]*").unwrap());

/// Rewrite model output into text a strict JSON parser accepts (best effort).
///
/// Parsing is left to the caller; see `parse_repaired`.
pub fn repair_json(raw: &str) -> String {
    let candidate = strip_code_fences(raw).trim();
    if is_strict_json(candidate) {
        return candidate.to_string();
    }

    let normalized = normalize_tokens(skip_leading_prose(candidate));
    match balanced_object_end(&normalized) {
        Some(end) => normalized[..end].to_string(),
        None => normalized,
    }
}

/// Repair then parse. An `Err` here means the output is beyond repair.
pub fn parse_repaired(raw: &str) -> Result<Value, AnalysisError> {
    let repaired = repair_json(raw);
    serde_json::from_str(&repaired).map_err(|e| AnalysisError::JsonParsing(e.to_string()))
}

fn is_strict_json(text: &str) -> bool {
    !text.is_empty() && serde_json::from_str::<IgnoredAny>(text).is_ok()
}

/// Drop everything up to and including the last tagged fence, then cut at the
/// first fence still present. An untagged opening fence is dropped as well.
fn strip_code_fences(text: &str) -> &str {
    let body = match TAGGED_FENCE.find_iter(text).last() {
        Some(m) => &text[m.end()..],
        None => {
            let leading = text.trim_start();
            leading.strip_prefix(FENCE).unwrap_or(text)
        }
    };

    match body.find(FENCE) {
        Some(end) => &body[..end],
        None => body,
    }
}

fn skip_leading_prose(text: &str) -> &str {
    if text.starts_with('{') || text.starts_with('[') {
        return text;
    }
    match text.find('{') {
        Some(start) => &text[start..],
        None => text,
    }
}

/// Byte offset just past the `}` closing the top-level object, if it closes.
/// Expects normalized text, where every string is double-quoted.
fn balanced_object_end(text: &str) -> Option<usize> {
    if !text.starts_with('{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => depth += 1,
            '}' | ']' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn skip_whitespace(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

/// Single pass over the text outside string literals:
/// trailing commas are dropped, bare keys quoted, single-quoted strings
/// re-delimited and empty values replaced by `null`.
fn normalize_tokens(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    // Last non-whitespace character emitted outside a string literal.
    let mut last_sig: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => {
                i = copy_double_quoted(&chars, i, &mut out);
                last_sig = Some('"');
            }
            '\'' => {
                i = convert_single_quoted(&chars, i, &mut out);
                last_sig = Some('"');
            }
            ',' => {
                let next = skip_whitespace(&chars, i + 1);
                if !matches!(chars.get(next), Some('}') | Some(']')) {
                    out.push(',');
                    last_sig = Some(',');
                }
                i += 1;
            }
            ':' => {
                let next = skip_whitespace(&chars, i + 1);
                if matches!(chars.get(next), Some(',') | Some('}')) {
                    out.push_str(": null");
                    i = next;
                } else {
                    out.push(':');
                    i += 1;
                }
                last_sig = Some(':');
            }
            c if is_word_char(c) => {
                let start = i;
                while i < chars.len() && is_word_char(chars[i]) {
                    i += 1;
                }
                let is_key = matches!(last_sig, Some('{') | Some(','))
                    && chars.get(skip_whitespace(&chars, i)) == Some(&':');
                if is_key {
                    out.push('"');
                    out.extend(&chars[start..i]);
                    out.push('"');
                } else {
                    out.extend(&chars[start..i]);
                }
                last_sig = Some(chars[i - 1]);
            }
            c => {
                out.push(c);
                if !c.is_whitespace() {
                    last_sig = Some(c);
                }
                i += 1;
            }
        }
    }

    out
}

/// Control characters are illegal raw inside JSON strings.
fn push_escaped_control(c: char, out: &mut String) {
    match c {
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        other => out.push_str(&format!("\\u{:04x}", other as u32)),
    }
}

/// Copy a double-quoted literal starting at `start`; returns the index after it.
fn copy_double_quoted(chars: &[char], start: usize, out: &mut String) -> usize {
    out.push('"');
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                out.push('\\');
                if let Some(&escaped) = chars.get(i + 1) {
                    out.push(escaped);
                }
                i += 2;
            }
            '"' => {
                out.push('"');
                return i + 1;
            }
            c if c.is_control() => {
                push_escaped_control(c, out);
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    chars.len()
}

/// Re-emit a single-quoted literal as a double-quoted one.
fn convert_single_quoted(chars: &[char], start: usize, out: &mut String) -> usize {
    out.push('"');
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                match chars.get(i + 1) {
                    Some('\'') => out.push('\''),
                    Some(&escaped) => {
                        out.push('\\');
                        out.push(escaped);
                    }
                    None => {}
                }
                i += 2;
            }
            '\'' => {
                out.push('"');
                return i + 1;
            }
            '"' => {
                out.push_str("\\\"");
                i += 1;
            }
            c if c.is_control() => {
                push_escaped_control(c, out);
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    chars.len()
}
