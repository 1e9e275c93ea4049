use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A partial summary covering a specific subset of dialog orders.
///
/// One is produced per chunk; at the reduction root a single MiddleSummary
/// covers every order in the meeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiddleSummary {
    /// Orders of the dialogs this summary is based on
    pub based_on_orders: BTreeSet<u64>,
    pub summary: String,
}

/// Keyword priority as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordPriority {
    High,
    Medium,
    Low,
}

impl KeywordPriority {
    /// Weight used when ranking keywords across chunks
    pub fn weight(self) -> u32 {
        match self {
            KeywordPriority::High => 3,
            KeywordPriority::Medium => 2,
            KeywordPriority::Low => 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyword {
    pub keyword: String,
    pub priority: KeywordPriority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Term {
    pub term: String,
    #[serde(default)]
    pub definition: String,
}

/// Per-dialog annotation returned by the chunk summarizer, matched back to
/// the dialog array by `order`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogUpdate {
    pub order: u64,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub soft_language: String,
}

/// Schema-constrained output for one chunk. `middle_summary` is the only
/// required field; everything else defaults to empty when the backend
/// omits it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkResult {
    #[serde(default)]
    pub middle_summary: String,
    #[serde(default)]
    pub dialog_updates: Vec<DialogUpdate>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub terms: Vec<Term>,
    #[serde(default)]
    pub keywords: Vec<Keyword>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub outline: Vec<String>,
}

/// Output of one reduction call. Only the root layer's result is
/// authoritative for the article.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReduceResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub soft_summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<Keyword>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_result_tolerates_missing_optional_fields() {
        let json = r#"{"middle_summary": "The committee debated the budget."}"#;
        let result: ChunkResult = serde_json::from_str(json).unwrap();

        assert_eq!(result.middle_summary, "The committee debated the budget.");
        assert!(result.dialog_updates.is_empty());
        assert!(result.keywords.is_empty());
        assert!(result.participants.is_empty());
    }

    #[test]
    fn test_keyword_priority_weights() {
        assert_eq!(KeywordPriority::High.weight(), 3);
        assert_eq!(KeywordPriority::Medium.weight(), 2);
        assert_eq!(KeywordPriority::Low.weight(), 1);
    }

    #[test]
    fn test_keyword_priority_snake_case() {
        let kw: Keyword =
            serde_json::from_str(r#"{"keyword": "education", "priority": "high"}"#).unwrap();
        assert_eq!(kw.priority, KeywordPriority::High);
    }
}
