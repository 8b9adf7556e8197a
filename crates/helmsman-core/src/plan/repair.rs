//! Text repairs for almost-JSON oracle replies
//!
//! Each repair is a pure `&str -> Option<String>` that returns `None` when it
//! has nothing to change. Scans that look for structural characters skip
//! over string literals.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repair {
    StripFences,
    ExtractSegment,
    NormalizeQuotes,
    PythonLiterals,
    TrailingCommas,
    CloseBrackets,
}

impl Repair {
    /// Order in which repairs are attempted.
    pub const PIPELINE: [Repair; 6] = [
        Repair::StripFences,
        Repair::ExtractSegment,
        Repair::NormalizeQuotes,
        Repair::PythonLiterals,
        Repair::TrailingCommas,
        Repair::CloseBrackets,
    ];

    pub fn apply(self, text: &str) -> Option<String> {
        match self {
            Repair::StripFences => strip_fences(text),
            Repair::ExtractSegment => extract_segment(text),
            Repair::NormalizeQuotes => normalize_quotes(text),
            Repair::PythonLiterals => python_literals(text),
            Repair::TrailingCommas => trailing_commas(text),
            Repair::CloseBrackets => close_brackets(text),
        }
    }
}

impl fmt::Display for Repair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Repair::StripFences => "stripped code fences",
            Repair::ExtractSegment => "extracted JSON from prose",
            Repair::NormalizeQuotes => "normalized smart quotes",
            Repair::PythonLiterals => "replaced Python literals",
            Repair::TrailingCommas => "removed trailing commas",
            Repair::CloseBrackets => "closed unbalanced brackets",
        };
        f.write_str(label)
    }
}

/// Content of the first fenced block. An unterminated fence runs to the end.
pub fn strip_fences(text: &str) -> Option<String> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    // Skip the info string (`json`, `JSON`, ...) up to the first newline.
    let body_start = match after.find('\n') {
        Some(nl) if after[..nl].chars().all(|c| c.is_ascii_alphanumeric() || c.is_whitespace()) => {
            nl + 1
        }
        _ => 0,
    };
    let body = &after[body_start..];
    let body = match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    };
    Some(body.trim().to_string())
}

/// Cut the outermost JSON object or array out of surrounding prose.
pub fn extract_segment(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let start = trimmed.find(['{', '['])?;
    let segment = match balanced_end(&trimmed[start..]) {
        Some(end) => &trimmed[start..start + end],
        // Unterminated: keep the tail so bracket closing can finish it.
        None => &trimmed[start..],
    };
    (segment != trimmed).then(|| segment.to_string())
}

/// Byte length of the balanced value starting at `text[0]`.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

pub fn normalize_quotes(text: &str) -> Option<String> {
    if !text.contains(['\u{201c}', '\u{201d}', '\u{201e}', '\u{2018}', '\u{2019}']) {
        return None;
    }
    Some(
        text.chars()
            .map(|c| match c {
                '\u{201c}' | '\u{201d}' | '\u{201e}' => '"',
                '\u{2018}' | '\u{2019}' => '\'',
                other => other,
            })
            .collect(),
    )
}

/// Replace bare `True`, `False` and `None` outside string literals.
pub fn python_literals(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut changed = false;
    let mut in_string = false;
    let mut escaped = false;
    let mut word = String::new();

    let flush = |word: &mut String, out: &mut String, changed: &mut bool| {
        let replacement = match word.as_str() {
            "True" => Some("true"),
            "False" => Some("false"),
            "None" => Some("null"),
            _ => None,
        };
        match replacement {
            Some(r) => {
                out.push_str(r);
                *changed = true;
            }
            None => out.push_str(word),
        }
        word.clear();
    };

    for ch in text.chars() {
        if in_string {
            out.push(ch);
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if ch.is_ascii_alphanumeric() || ch == '_' {
            word.push(ch);
            continue;
        }
        flush(&mut word, &mut out, &mut changed);
        if ch == '"' {
            in_string = true;
        }
        out.push(ch);
    }
    flush(&mut word, &mut out, &mut changed);

    changed.then_some(out)
}

/// Drop commas that directly precede a closing bracket.
pub fn trailing_commas(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut changed = false;
    let mut in_string = false;
    let mut escaped = false;
    // A comma outside strings plus the whitespace after it, held until the
    // next significant character shows whether it trails.
    let mut held: Option<String> = None;

    for ch in text.chars() {
        if in_string {
            out.push(ch);
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if let Some(mut comma) = held.take() {
            if ch.is_whitespace() {
                comma.push(ch);
                held = Some(comma);
                continue;
            }
            if matches!(ch, '}' | ']') {
                changed = true;
                comma.remove(0);
            }
            out.push_str(&comma);
        }
        if ch == ',' {
            held = Some(String::from(","));
            continue;
        }
        if ch == '"' {
            in_string = true;
        }
        out.push(ch);
    }
    if let Some(comma) = held {
        out.push_str(&comma);
    }

    changed.then_some(out)
}

/// Terminate an open string and append the missing closers in order.
pub fn close_brackets(text: &str) -> Option<String> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for ch in text.chars() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&ch) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }
    if stack.is_empty() && !in_string {
        return None;
    }

    let mut out = text.trim_end().to_string();
    if in_string {
        out.push('"');
    }
    // A dangling separator would still be invalid after closing.
    while out.ends_with(',') || out.ends_with(':') {
        out.pop();
        out.truncate(out.trim_end().len());
    }
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_language_tagged_fence() {
        let text = "Here you go:\n```json\n{\"done\": true}\n```\nThanks";
        assert_eq!(strip_fences(text).as_deref(), Some("{\"done\": true}"));
    }

    #[test]
    fn extracts_object_ignoring_braces_in_strings() {
        let text = r#"Plan: {"summary": "use {braces}", "toolCalls": [], "done": true} ok?"#;
        assert_eq!(
            extract_segment(text).as_deref(),
            Some(r#"{"summary": "use {braces}", "toolCalls": [], "done": true}"#)
        );
        assert_eq!(extract_segment(r#"{"a": 1}"#), None);
    }

    #[test]
    fn python_literals_skip_string_contents() {
        let text = r#"{"summary": "True story", "done": True, "x": None}"#;
        assert_eq!(
            python_literals(text).as_deref(),
            Some(r#"{"summary": "True story", "done": true, "x": null}"#)
        );
        assert_eq!(python_literals(r#"{"done": true}"#), None);
    }

    #[test]
    fn trailing_commas_are_removed() {
        let text = "{\"toolCalls\": [1, 2, ], \"done\": true,\n}";
        assert_eq!(
            trailing_commas(text).as_deref(),
            Some("{\"toolCalls\": [1, 2 ], \"done\": true\n}")
        );
        assert_eq!(trailing_commas(r#"{"s": ",]"}"#), None);
    }

    #[test]
    fn trailing_commas_keep_inner_commas_and_strings() {
        let text = r#"{"a": [1,, 2 ,], "b": "x, ]", "c": {"d": 1 , } , }"#;
        assert_eq!(
            trailing_commas(text).as_deref(),
            Some(r#"{"a": [1,, 2 ], "b": "x, ]", "c": {"d": 1  }  }"#)
        );
        assert_eq!(trailing_commas("[1, 2]"), None);
        assert_eq!(trailing_commas("[1, 2,"), None);
    }

    #[test]
    fn closes_truncated_reply() {
        let text = r#"{"summary": "scale", "toolCalls": [{"tool": "scaleDeployment", "args": {"name": "web""#;
        assert_eq!(
            close_brackets(text).as_deref(),
            Some(r#"{"summary": "scale", "toolCalls": [{"tool": "scaleDeployment", "args": {"name": "web"}}]}"#)
        );
    }

    #[test]
    fn smart_quotes_are_normalized() {
        assert_eq!(
            normalize_quotes("{\u{201c}done\u{201d}: true}").as_deref(),
            Some("{\"done\": true}")
        );
    }
}
