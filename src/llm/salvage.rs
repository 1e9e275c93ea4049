/// Recovery parsing for backend output that is not strictly valid JSON.
///
/// Models frequently wrap the requested JSON object in prose or code fences.
/// `salvage_json` extracts the largest balanced `{...}` or `[...]` substring
/// that parses, scanning with string-escape awareness so braces inside string
/// literals do not confuse the balance count.
use serde_json::Value;

/// Extract and parse the largest balanced JSON object or array in `text`.
/// Strict parsing of the whole input is attempted first.
pub fn salvage_json(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        return Some(value);
    }

    let mut best: Option<&str> = None;
    for open in ['{', '['] {
        for (start, _) in text.char_indices().filter(|&(_, c)| c == open) {
            if let Some(candidate) = balanced_from(&text[start..], open) {
                if best.is_none_or(|b| candidate.len() > b.len()) {
                    best = Some(candidate);
                }
            }
        }
    }

    best.and_then(|s| serde_json::from_str(s).ok())
}

/// Longest balanced span starting at the first character of `text`, which
/// must be `open`. Returns `None` when the span never closes.
fn balanced_from(text: &str, open: char) -> Option<&str> {
    let close = if open == '{' { '}' } else { ']' };
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[..i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_json_passes_through() {
        let value = salvage_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_recovers_object_from_prose() {
        let text = r#"Sure! Here is the summary you asked for:

{"middle_summary": "The committee debated school funding.", "categories": ["education"]}

Let me know if you need anything else."#;
        let value = salvage_json(text).unwrap();
        assert_eq!(
            value["middle_summary"],
            "The committee debated school funding."
        );
    }

    #[test]
    fn test_recovers_from_code_fence() {
        let text = "```json\n{\"title\": \"Budget session\"}\n```";
        let value = salvage_json(text).unwrap();
        assert_eq!(value["title"], "Budget session");
    }

    #[test]
    fn test_braces_inside_strings_do_not_break_balance() {
        let text = r#"noise {"note": "uses { and } freely", "n": 2} trailing"#;
        let value = salvage_json(text).unwrap();
        assert_eq!(value["n"], 2);
    }

    #[test]
    fn test_prefers_largest_balanced_span() {
        let text = r#"{"small": 1} and then {"bigger": {"nested": true}, "x": 2}"#;
        let value = salvage_json(text).unwrap();
        assert_eq!(value["x"], 2);
    }

    #[test]
    fn test_unbalanced_input_yields_none() {
        assert!(salvage_json("{\"never\": \"closes\"").is_none());
        assert!(salvage_json("no json here at all").is_none());
    }

    #[test]
    fn test_array_salvage() {
        let text = "the list: [1, 2, 3] thanks";
        let value = salvage_json(text).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 3);
    }
}
