use serde::{Deserialize, Serialize};

use super::{Dialog, Keyword, MiddleSummary, Participant, Term};

/// The terminal aggregate for one meeting: metadata, the full dialog
/// sequence, all chunk-level partial summaries, and the reduced final
/// summary. Built once by the aggregator and immutable thereafter;
/// ownership passes to the persistence collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub meeting_id: String,
    pub meeting_name: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub house: String,
    #[serde(default)]
    pub session: String,

    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub soft_summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub categories: Vec<String>,

    #[serde(default)]
    pub dialogs: Vec<Dialog>,
    #[serde(default)]
    pub middle_summaries: Vec<MiddleSummary>,
    #[serde(default)]
    pub outline: Vec<String>,

    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub terms: Vec<Term>,
    #[serde(default)]
    pub keywords: Vec<Keyword>,
}

impl Article {
    /// Number of dialogs carried by this article
    pub fn dialog_count(&self) -> usize {
        self.dialogs.len()
    }

    /// Number of chunk-level partial summaries
    pub fn chunk_count(&self) -> usize {
        self.middle_summaries.len()
    }
}
