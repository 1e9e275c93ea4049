use crate::models::{Dialog, RawMeeting, RawUtterance};

/// Build the ordered dialog sequence for one meeting.
///
/// Order resolution, in priority: a trailing numeric suffix of the utterance
/// id, then an explicit `order` field, then the utterance's position in the
/// input list. Output is sorted ascending by resolved order. Text is
/// normalized for whitespace and line-ending artifacts only; utterance
/// content is never altered or cut. An empty input produces an empty
/// sequence, not an error.
pub fn build_dialogs(meeting: &RawMeeting) -> Vec<Dialog> {
    let mut dialogs: Vec<Dialog> = meeting
        .utterances
        .iter()
        .enumerate()
        .map(|(position, utterance)| Dialog {
            order: resolve_order(utterance, position),
            speaker: utterance.speaker.clone(),
            speaker_group: utterance.speaker_group.clone(),
            speaker_position: utterance.speaker_position.clone(),
            speaker_role: utterance.speaker_role.clone(),
            original_text: normalize_text(&utterance.text),
            summary: String::new(),
            soft_language: String::new(),
        })
        .collect();

    dialogs.sort_by_key(|d| d.order);
    dialogs
}

/// Resolve the numeric order for one utterance
fn resolve_order(utterance: &RawUtterance, position: usize) -> u64 {
    if let Some(order) = numeric_suffix(&utterance.id) {
        return order;
    }
    if let Some(order) = utterance.order {
        return order;
    }
    position as u64
}

/// Trailing digit run of an identifier, e.g. "u_042" -> 42
fn numeric_suffix(id: &str) -> Option<u64> {
    let digits: String = id
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Normalize whitespace and line-ending artifacts: CRLF and CR become LF,
/// outer whitespace is trimmed, and runs of three or more newlines collapse
/// to a single blank line. Words and punctuation are untouched.
fn normalize_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let trimmed = unified.trim();

    let mut out = String::with_capacity(trimmed.len());
    let mut newline_run = 0usize;
    for c in trimmed.chars() {
        if c == '\n' {
            newline_run += 1;
            if newline_run <= 2 {
                out.push('\n');
            }
        } else {
            newline_run = 0;
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utterance(id: &str, order: Option<u64>, text: &str) -> RawUtterance {
        RawUtterance {
            id: id.to_string(),
            order,
            speaker: String::new(),
            speaker_group: String::new(),
            speaker_position: String::new(),
            speaker_role: String::new(),
            text: text.to_string(),
        }
    }

    fn meeting(utterances: Vec<RawUtterance>) -> RawMeeting {
        RawMeeting {
            id: "m_1".to_string(),
            name: "Plenary".to_string(),
            date: String::new(),
            house: String::new(),
            session: String::new(),
            utterances,
        }
    }

    #[test]
    fn test_order_from_id_suffix() {
        let m = meeting(vec![
            utterance("speech_12", None, "second"),
            utterance("speech_3", None, "first"),
        ]);
        let dialogs = build_dialogs(&m);
        assert_eq!(dialogs[0].order, 3);
        assert_eq!(dialogs[0].original_text, "first");
        assert_eq!(dialogs[1].order, 12);
    }

    #[test]
    fn test_order_falls_back_to_explicit_field_then_position() {
        let m = meeting(vec![
            utterance("no-digits", Some(5), "explicit"),
            utterance("also-none", None, "positional"),
        ]);
        let dialogs = build_dialogs(&m);
        // Position fallback for index 1 resolves to 1, explicit gives 5
        assert_eq!(dialogs[0].order, 1);
        assert_eq!(dialogs[0].original_text, "positional");
        assert_eq!(dialogs[1].order, 5);
    }

    #[test]
    fn test_empty_meeting_yields_empty_sequence() {
        assert!(build_dialogs(&meeting(vec![])).is_empty());
    }

    #[test]
    fn test_numeric_suffix() {
        assert_eq!(numeric_suffix("u_042"), Some(42));
        assert_eq!(numeric_suffix("7"), Some(7));
        assert_eq!(numeric_suffix("u42x"), None);
        assert_eq!(numeric_suffix(""), None);
    }

    #[test]
    fn test_normalize_text_touches_only_whitespace() {
        let raw = "  Mr. Speaker,\r\n\r\n\r\n\r\nI rise today.  ";
        assert_eq!(normalize_text(raw), "Mr. Speaker,\n\nI rise today.");

        let untouched = "Line one\nLine two";
        assert_eq!(normalize_text(untouched), untouched);
    }
}
