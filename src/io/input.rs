use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::models::RawMeeting;

/// Inclusive date range for transcript fetches; open ends match everything
#[derive(Debug, Clone, Copy, Default)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    fn contains(&self, date: &str) -> bool {
        let Ok(parsed) = date.parse::<NaiveDate>() else {
            // Meetings with unparsable dates are kept rather than dropped
            return true;
        };
        self.from.is_none_or(|from| parsed >= from) && self.to.is_none_or(|to| parsed <= to)
    }
}

/// Source of raw meeting records. The production deployment fetches over
/// HTTP; failures propagate as fatal for the invocation.
pub trait TranscriptSource {
    fn fetch(&self, range: &DateRange) -> Result<Vec<RawMeeting>>;
}

/// Reads a JSON array of raw meetings from a local file
pub struct FileSource {
    path: std::path::PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TranscriptSource for FileSource {
    fn fetch(&self, range: &DateRange) -> Result<Vec<RawMeeting>> {
        let meetings = parse_meetings_file(&self.path)?;
        Ok(meetings
            .into_iter()
            .filter(|m| range.contains(&m.date))
            .collect())
    }
}

/// Parse a file containing a JSON array of raw meetings
pub fn parse_meetings_file(path: &Path) -> Result<Vec<RawMeeting>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {:?}", path))?;
    parse_meetings_json(&content)
}

/// Parse a JSON string holding either an array of meetings or one meeting
pub fn parse_meetings_json(json: &str) -> Result<Vec<RawMeeting>> {
    let value: serde_json::Value =
        serde_json::from_str(json).context("Failed to parse meetings JSON")?;
    if value.is_array() {
        serde_json::from_value(value).context("Failed to parse meetings array")
    } else {
        let meeting: RawMeeting =
            serde_json::from_value(value).context("Failed to parse meeting record")?;
        Ok(vec![meeting])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEETINGS: &str = r#"[
        {"id": "m_1", "name": "First", "date": "2024-06-10", "utterances": []},
        {"id": "m_2", "name": "Second", "date": "2024-06-20", "utterances": []}
    ]"#;

    #[test]
    fn test_parse_array_and_single_object() {
        assert_eq!(parse_meetings_json(MEETINGS).unwrap().len(), 2);

        let single = r#"{"id": "m_3", "name": "Solo", "utterances": []}"#;
        let parsed = parse_meetings_json(single).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].id, "m_3");
    }

    #[test]
    fn test_file_source_filters_by_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meetings.json");
        std::fs::write(&path, MEETINGS).unwrap();

        let source = FileSource::new(&path);
        let range = DateRange {
            from: Some("2024-06-15".parse().unwrap()),
            to: None,
        };
        let meetings = source.fetch(&range).unwrap();

        assert_eq!(meetings.len(), 1);
        assert_eq!(meetings[0].id, "m_2");
    }

    #[test]
    fn test_open_range_fetches_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meetings.json");
        std::fs::write(&path, MEETINGS).unwrap();

        let meetings = FileSource::new(&path).fetch(&DateRange::default()).unwrap();
        assert_eq!(meetings.len(), 2);
    }
}
