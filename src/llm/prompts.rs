use crate::models::{Dialog, MiddleSummary, RawMeeting};

use super::client::ToolSpec;

/// System prompt for chunk summarization (non-negotiable constraints)
pub const CHUNK_SYSTEM_PROMPT: &str = r#"You are summarizing a chunk of a legislative proceeding transcript. You MUST follow these rules:

1. Base every statement only on the utterances provided; never invent facts.
2. Quote names, bill titles and figures exactly as they appear in the transcript.
3. `middle_summary` is required: a faithful condensed account of this chunk.
4. Per-utterance summaries refer to utterances by their `order` value only.
5. Output MUST be valid JSON matching the provided schema.
6. Write in the requested output language; keep a neutral, factual register.

Optional fields (categories, terms, keywords, participants, outline, per-utterance
updates) should be filled when the chunk supports them and omitted otherwise."#;

/// System prompt for reduction calls
pub const REDUCE_SYSTEM_PROMPT: &str = r#"You are condensing partial summaries of one legislative proceeding into a single coherent account. You MUST follow these rules:

1. Use only the partial summaries provided; never invent facts.
2. Preserve chronological order of the proceeding in the combined summary.
3. `title` should be concise and name the decisive topic of the meeting.
4. `summary` is the formal account; `soft_summary` restates it in plain language
   for readers unfamiliar with parliamentary procedure.
5. Output MUST be valid JSON matching the provided schema."#;

/// Build the user prompt for one chunk
pub fn build_chunk_prompt(
    meeting: &RawMeeting,
    dialogs: &[&Dialog],
    chunk_index: usize,
    chunk_count: usize,
    instructions: &str,
    output_language: &str,
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "# Chunk {} of {}\n\n",
        chunk_index + 1,
        chunk_count
    ));
    push_meeting_header(&mut prompt, meeting);
    prompt.push_str(&format!("Output language: {}\n\n", output_language));

    if !instructions.trim().is_empty() {
        prompt.push_str("## Additional Instructions\n");
        prompt.push_str(instructions.trim());
        prompt.push_str("\n\n");
    }

    prompt.push_str("## Utterances\n");
    prompt.push_str("```json\n");
    prompt.push_str(&format_dialogs(dialogs));
    prompt.push_str("\n```\n\n");

    prompt.push_str("## Task\n");
    prompt.push_str("Summarize this chunk using the submit_chunk tool.\n");
    prompt.push_str("Provide `middle_summary` covering the whole chunk, and where the\n");
    prompt.push_str("content supports it: per-utterance summaries and plain-language\n");
    prompt.push_str("rewordings, topic categories, technical terms with definitions,\n");
    prompt.push_str("prioritized keywords, participants, and an outline.\n");

    prompt
}

/// Build the user prompt for one reduction call over a group of partial
/// summaries
pub fn build_reduce_prompt(
    meeting: &RawMeeting,
    summaries: &[MiddleSummary],
    output_language: &str,
) -> String {
    let mut prompt = String::new();

    push_meeting_header(&mut prompt, meeting);
    prompt.push_str(&format!("Output language: {}\n\n", output_language));

    prompt.push_str("## Partial Summaries (chronological)\n");
    for (i, summary) in summaries.iter().enumerate() {
        prompt.push_str(&format!("### Part {}\n", i + 1));
        prompt.push_str(&summary.summary);
        prompt.push_str("\n\n");
    }

    prompt.push_str("## Task\n");
    prompt.push_str("Combine the partial summaries into one account using the\n");
    prompt.push_str("submit_reduction tool. Provide title, categories, summary,\n");
    prompt.push_str("soft_summary, and optionally description and keywords.\n");

    prompt
}

fn push_meeting_header(prompt: &mut String, meeting: &RawMeeting) {
    prompt.push_str("## Meeting\n");
    prompt.push_str(&format!("Name: {}\n", meeting.name));
    if !meeting.date.is_empty() {
        prompt.push_str(&format!("Date: {}\n", meeting.date));
    }
    if !meeting.house.is_empty() {
        prompt.push_str(&format!("House: {}\n", meeting.house));
    }
    if !meeting.session.is_empty() {
        prompt.push_str(&format!("Session: {}\n", meeting.session));
    }
    prompt.push('\n');
}

/// Format dialogs as JSON for the prompt
fn format_dialogs(dialogs: &[&Dialog]) -> String {
    let display: Vec<DialogDisplay> = dialogs
        .iter()
        .map(|d| DialogDisplay {
            order: d.order,
            speaker: &d.speaker,
            speaker_group: &d.speaker_group,
            speaker_position: &d.speaker_position,
            speaker_role: &d.speaker_role,
            text: &d.original_text,
        })
        .collect();

    serde_json::to_string_pretty(&display).unwrap_or_else(|_| "[]".to_string())
}

#[derive(serde::Serialize)]
struct DialogDisplay<'a> {
    order: u64,
    #[serde(skip_serializing_if = "str::is_empty")]
    speaker: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    speaker_group: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    speaker_position: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    speaker_role: &'a str,
    text: &'a str,
}

/// Schema for the chunk summarization tool
pub fn chunk_tool() -> ToolSpec {
    ToolSpec {
        name: "submit_chunk",
        description: "Submit the structured summary of one transcript chunk",
        schema: serde_json::json!({
            "type": "object",
            "properties": {
                "middle_summary": {
                    "type": "string",
                    "description": "Condensed account of this chunk"
                },
                "dialog_updates": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "order": {"type": "integer"},
                            "summary": {"type": "string"},
                            "soft_language": {"type": "string"}
                        },
                        "required": ["order"]
                    }
                },
                "categories": {
                    "type": "array",
                    "items": {"type": "string"}
                },
                "terms": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "term": {"type": "string"},
                            "definition": {"type": "string"}
                        },
                        "required": ["term"]
                    }
                },
                "keywords": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "keyword": {"type": "string"},
                            "priority": {"type": "string", "enum": ["high", "medium", "low"]}
                        },
                        "required": ["keyword", "priority"]
                    }
                },
                "participants": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "summary": {"type": "string"}
                        },
                        "required": ["name"]
                    }
                },
                "outline": {
                    "type": "array",
                    "items": {"type": "string"}
                }
            },
            "required": ["middle_summary"]
        }),
    }
}

/// Schema for the reduction tool
pub fn reduce_tool() -> ToolSpec {
    ToolSpec {
        name: "submit_reduction",
        description: "Submit the combined summary of several partial summaries",
        schema: serde_json::json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "categories": {
                    "type": "array",
                    "items": {"type": "string"}
                },
                "summary": {"type": "string"},
                "soft_summary": {"type": "string"},
                "description": {"type": "string"},
                "keywords": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "keyword": {"type": "string"},
                            "priority": {"type": "string", "enum": ["high", "medium", "low"]}
                        },
                        "required": ["keyword", "priority"]
                    }
                }
            },
            "required": ["title", "summary", "soft_summary", "categories"]
        }),
    }
}
