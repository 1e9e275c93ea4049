use std::collections::{BTreeSet, HashMap};

use crate::models::{
    Article, ChunkResult, Dialog, Keyword, KeywordPriority, MiddleSummary, Pack, Participant,
    RawMeeting, Term,
};

use super::reduce::Reduction;

/// Topic categories kept on the article
const MAX_CATEGORIES: usize = 5;
/// Ranked keywords kept on the article
const MAX_KEYWORDS: usize = 15;

/// Deterministic, single-threaded merge of chunk results into the final
/// Article.
///
/// Chunk results are sorted by chunk index first — never by completion
/// time — so the same result set aggregates identically under any
/// permutation.
pub fn assemble_article(
    meeting: &RawMeeting,
    dialogs: Vec<Dialog>,
    packs: &[Pack],
    mut chunk_results: Vec<(usize, ChunkResult)>,
    reduction: &Reduction,
) -> Article {
    chunk_results.sort_by_key(|(i, _)| *i);

    let middle_summaries: Vec<MiddleSummary> = chunk_results
        .iter()
        .map(|(i, result)| MiddleSummary {
            based_on_orders: packs
                .get(*i)
                .map(|p| p.orders.iter().copied().collect::<BTreeSet<u64>>())
                .unwrap_or_default(),
            summary: result.middle_summary.clone(),
        })
        .collect();

    let results: Vec<&ChunkResult> = chunk_results.iter().map(|(_, r)| r).collect();

    let title = if reduction.result.title.is_empty() {
        fallback_title(meeting)
    } else {
        reduction.result.title.clone()
    };

    Article {
        meeting_id: meeting.id.clone(),
        meeting_name: meeting.name.clone(),
        date: meeting.date.clone(),
        house: meeting.house.clone(),
        session: meeting.session.clone(),

        title,
        summary: reduction.result.summary.clone(),
        soft_summary: reduction.result.soft_summary.clone(),
        description: reduction.result.description.clone(),
        categories: merge_categories(&results, &reduction.result.categories),

        dialogs,
        middle_summaries,
        outline: results.iter().flat_map(|r| r.outline.clone()).collect(),

        participants: merge_participants(&results),
        terms: merge_terms(&results),
        keywords: merge_keywords(&results, &reduction.result.keywords),
    }
}

/// Deterministic fallback when the backend omitted a title
fn fallback_title(meeting: &RawMeeting) -> String {
    format!("{}（{}）", meeting.name, meeting.date)
}

/// Dedupe participants by whitespace-normalized name, keeping the
/// first-seen summary
fn merge_participants(results: &[&ChunkResult]) -> Vec<Participant> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut merged = Vec::new();

    for result in results {
        for participant in &result.participants {
            let key = normalize_name(&participant.name);
            if key.is_empty() || !seen.insert(key) {
                continue;
            }
            merged.push(participant.clone());
        }
    }
    merged
}

/// Collapse internal whitespace runs and trim, for name identity
fn normalize_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Dedupe terms by exact term, keeping the first-seen definition
fn merge_terms(results: &[&ChunkResult]) -> Vec<Term> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut merged = Vec::new();

    for result in results {
        for term in &result.terms {
            if term.term.is_empty() || !seen.insert(term.term.clone()) {
                continue;
            }
            merged.push(term.clone());
        }
    }
    merged
}

/// Count category frequency across chunks and keep the top ranks;
/// ties break lexicographically. Falls back to the reducer's own
/// categories when no chunk reported any.
fn merge_categories(results: &[&ChunkResult], reducer_categories: &[String]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for result in results {
        for category in &result.categories {
            *counts.entry(category.as_str()).or_insert(0) += 1;
        }
    }
    if counts.is_empty() {
        return reducer_categories.iter().take(MAX_CATEGORIES).cloned().collect();
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(MAX_CATEGORIES)
        .map(|(category, _)| category.to_string())
        .collect()
}

/// Keyword selection: the reducer's own list wins when non-empty;
/// otherwise chunk keywords are ranked by priority-weighted score
/// (high=3, medium=2, low=1 summed across chunks) and the top ranks are
/// re-bucketed into high/medium/low.
fn merge_keywords(results: &[&ChunkResult], reducer_keywords: &[Keyword]) -> Vec<Keyword> {
    if !reducer_keywords.is_empty() {
        return reducer_keywords.to_vec();
    }

    let mut scores: HashMap<&str, u32> = HashMap::new();
    for result in results {
        for keyword in &result.keywords {
            *scores.entry(keyword.keyword.as_str()).or_insert(0) += keyword.priority.weight();
        }
    }

    let mut ranked: Vec<(&str, u32)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(MAX_KEYWORDS);

    let bucket = ranked.len().div_ceil(3).max(1);
    ranked
        .into_iter()
        .enumerate()
        .map(|(rank, (keyword, _))| Keyword {
            keyword: keyword.to_string(),
            priority: match rank / bucket {
                0 => KeywordPriority::High,
                1 => KeywordPriority::Medium,
                _ => KeywordPriority::Low,
            },
        })
        .collect()
}
