use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use crate::models::Article;

/// Persistence boundary for finished articles. The production deployment
/// stores into a key-value store with secondary indexes; idempotency is the
/// store's concern, not the pipeline's.
pub trait ArticleStore {
    /// Persist one article and return its storage id
    fn store(&self, article: &Article) -> Result<String>;
}

/// Writes one pretty-printed JSON file per article
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ArticleStore for FileStore {
    fn store(&self, article: &Article) -> Result<String> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create output directory {:?}", self.dir))?;
        let path = self.dir.join(format!("{}.json", article.meeting_id));
        let json =
            serde_json::to_string_pretty(article).context("Failed to serialize article")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write article {:?}", path))?;
        info!("article written to {:?}", path);
        Ok(path.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let article = Article {
            meeting_id: "m_1".to_string(),
            meeting_name: "Plenary".to_string(),
            date: String::new(),
            house: String::new(),
            session: String::new(),
            title: "A sitting".to_string(),
            summary: "It happened.".to_string(),
            soft_summary: String::new(),
            description: String::new(),
            categories: vec![],
            dialogs: vec![],
            middle_summaries: vec![],
            outline: vec![],
            participants: vec![],
            terms: vec![],
            keywords: vec![],
        };

        let id = store.store(&article).unwrap();
        let content = std::fs::read_to_string(&id).unwrap();
        let parsed: Article = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.meeting_id, "m_1");
        assert_eq!(parsed.title, "A sitting");
    }
}
