// Clean clinical dialogue before it is sent to the model.
// Strips invisible Unicode, tidies whitespace and caps the length.

/// Maximum dialogue length sent to the model (characters).
const MAX_DIALOGUE_CHARS: usize = 50_000;

const TRUNCATION_MARKER: &str = "…[TRUNCATED]";

/// Sanitize a dialogue transcript for the model prompt.
pub fn sanitize_for_llm(raw: &str) -> String {
    let visible = remove_invisible_chars(raw);
    let unwrapped = strip_dialogue_tags(&visible);
    let normalized = normalize_whitespace(&unwrapped);
    truncate_chars(&normalized, MAX_DIALOGUE_CHARS)
}

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200B}'..='\u{200F}'   // zero-width space/joiners, LRM/RLM
            | '\u{202A}'..='\u{202E}' // bidi embeddings and overrides
            | '\u{2060}'..='\u{2064}' // word joiner, invisible operators
            | '\u{FEFF}'
    )
}

/// Keeps space, tab and line breaks; drops other control and format chars.
fn remove_invisible_chars(text: &str) -> String {
    text.chars()
        .filter(|&c| matches!(c, ' ' | '\t' | '\n' | '\r') || !(c.is_control() || is_invisible(c)))
        .collect()
}

/// The prompt fences the transcript in `<dialogue>` tags; the transcript
/// itself must not be able to close that fence.
fn strip_dialogue_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = find_ascii_ci(rest, "dialogue>") {
        let tag_start = if rest[..pos].ends_with("</") {
            pos - 2
        } else if rest[..pos].ends_with('<') {
            pos - 1
        } else {
            out.push_str(&rest[..pos + "dialogue>".len()]);
            rest = &rest[pos + "dialogue>".len()..];
            continue;
        };
        out.push_str(&rest[..tag_start]);
        rest = &rest[pos + "dialogue>".len()..];
    }
    out.push_str(rest);
    out
}

fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle.as_bytes()))
}

/// Trim every line and collapse runs of blank lines to one.
fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() && lines.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    if lines.last() == Some(&"") {
        lines.pop();
    }
    lines.join("\n")
}

/// Cut to at most `max_chars` characters, preferring the last whitespace
/// before the limit, and append the truncation marker.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    let Some((limit, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };
    let head = &text[..limit];
    let cut = head
        .rfind(char::is_whitespace)
        .filter(|&pos| pos > 0)
        .unwrap_or(limit);
    format!("{}{TRUNCATION_MARKER}", head[..cut].trim_end())
}
