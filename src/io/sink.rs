use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// Audit sink for unusable backend output. Implementations must be cheap and
/// must never be allowed to fail the pipeline; call sites go through
/// `save_best_effort`.
pub trait ErrorSink: Send + Sync {
    /// Persist an error record and return a locator for it
    fn save(&self, error: &str, raw_payload: &str, hint: &str) -> Result<String>;
}

/// Discards everything. Default when no audit directory is configured.
pub struct NoopSink;

impl ErrorSink for NoopSink {
    fn save(&self, _error: &str, _raw_payload: &str, _hint: &str) -> Result<String> {
        Ok(String::new())
    }
}

#[derive(Serialize)]
struct ErrorRecord<'a> {
    error: &'a str,
    raw_payload: &'a str,
    hint: &'a str,
    saved_at: String,
}

/// Writes one JSON blob per error under a directory, named by a fresh UUID.
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl ErrorSink for FileSink {
    fn save(&self, error: &str, raw_payload: &str, hint: &str) -> Result<String> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create sink directory {:?}", self.dir))?;
        let record = ErrorRecord {
            error,
            raw_payload,
            hint,
            saved_at: chrono::Utc::now().to_rfc3339(),
        };
        let path = self.dir.join(format!("{}.json", Uuid::new_v4()));
        let json = serde_json::to_string_pretty(&record)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write error record {:?}", path))?;
        Ok(path.to_string_lossy().into_owned())
    }
}

/// Result-discarding adapter: failures in the sink itself are logged at
/// debug level and swallowed.
pub fn save_best_effort(sink: &dyn ErrorSink, error: &str, raw_payload: &str, hint: &str) {
    match sink.save(error, raw_payload, hint) {
        Ok(locator) if !locator.is_empty() => {
            debug!("error record saved to {}", locator);
        }
        Ok(_) => {}
        Err(e) => {
            debug!("error sink failed (ignored): {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_sink_writes_record() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().to_path_buf());

        let locator = sink
            .save("non-JSON output", "{\"broken", "chunk 3 of meeting m_1")
            .unwrap();
        let content = std::fs::read_to_string(&locator).unwrap();
        assert!(content.contains("non-JSON output"));
        assert!(content.contains("chunk 3 of meeting m_1"));
    }

    #[test]
    fn test_best_effort_swallows_sink_failure() {
        struct FailingSink;
        impl ErrorSink for FailingSink {
            fn save(&self, _: &str, _: &str, _: &str) -> Result<String> {
                anyhow::bail!("disk full")
            }
        }
        // Must not panic or propagate
        save_best_effort(&FailingSink, "e", "raw", "hint");
    }
}
