use serde::{Deserialize, Serialize};

/// One atomic utterance in a meeting, ordered by `order`.
///
/// `original_text` is immutable once built and is never split across chunks.
/// `summary` and `soft_language` start empty and are filled in by the chunk
/// merge step when the backend mentions this dialog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dialog {
    /// Unique ascending position within the meeting
    pub order: u64,
    /// Speaker display name
    #[serde(default)]
    pub speaker: String,
    /// Parliamentary group / faction
    #[serde(default)]
    pub speaker_group: String,
    /// Position (e.g. committee chair)
    #[serde(default)]
    pub speaker_position: String,
    /// Role within this meeting (e.g. answerer, questioner)
    #[serde(default)]
    pub speaker_role: String,
    /// Verbatim utterance text, whitespace-normalized only
    pub original_text: String,
    /// Per-utterance summary, filled by the chunk summarizer
    #[serde(default)]
    pub summary: String,
    /// Plain-language rewording, filled by the chunk summarizer
    #[serde(default)]
    pub soft_language: String,
}

impl Dialog {
    /// Character length used for packing decisions
    pub fn char_len(&self) -> usize {
        self.original_text.chars().count()
    }
}

/// A raw utterance as delivered by the transcript source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawUtterance {
    /// Source identifier; a trailing numeric suffix carries the order
    #[serde(default)]
    pub id: String,
    /// Explicit order, used when the id carries no numeric suffix
    #[serde(default)]
    pub order: Option<u64>,
    #[serde(default)]
    pub speaker: String,
    #[serde(default)]
    pub speaker_group: String,
    #[serde(default)]
    pub speaker_position: String,
    #[serde(default)]
    pub speaker_role: String,
    #[serde(default)]
    pub text: String,
}

/// A raw meeting record as delivered by the transcript source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMeeting {
    pub id: String,
    /// Meeting name (e.g. committee and session)
    pub name: String,
    /// Date of the proceeding, ISO 8601
    #[serde(default)]
    pub date: String,
    /// Legislative body / house
    #[serde(default)]
    pub house: String,
    /// Session identifier
    #[serde(default)]
    pub session: String,
    #[serde(default)]
    pub utterances: Vec<RawUtterance>,
}
