use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::llm::{ChatBackend, LlmClient};
use crate::models::{Article, RawMeeting};

use super::aggregate::assemble_article;
use super::chunk::summarize_chunks;
use super::dialogs::build_dialogs;
use super::packer::{measure, pack};
use super::reduce::{ReduceConfig, reduce_summaries};

/// Tunables for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Character threshold bounding each chunk
    pub char_threshold: usize,
    /// Concurrent chunk summarization calls per meeting
    pub chunk_concurrency: usize,
    pub reduce: ReduceConfig,
    /// Extra task instructions forwarded to every chunk prompt
    pub instructions: String,
    /// Language the backend writes summaries in
    pub output_language: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            char_threshold: 4_000,
            chunk_concurrency: 3,
            reduce: ReduceConfig::default(),
            instructions: String::new(),
            output_language: "English".to_string(),
        }
    }
}

/// Run the full pipeline for one meeting: dialogs, packs, chunk summaries,
/// tree reduction, aggregation. Fails with the first unrecovered backend
/// error; a meeting with zero utterances produces a valid empty article.
pub async fn process_meeting<B>(
    client: &Arc<LlmClient<B>>,
    meeting: &RawMeeting,
    config: &PipelineConfig,
) -> Result<Article>
where
    B: ChatBackend + 'static,
{
    let mut dialogs = build_dialogs(meeting);
    let packs = pack(&measure(&dialogs), config.char_threshold)
        .with_context(|| format!("packing failed for meeting {}", meeting.id))?;

    info!(
        dialogs = dialogs.len(),
        chunks = packs.len(),
        "processing meeting {}",
        meeting.id
    );

    let chunk_results = summarize_chunks(
        client,
        meeting,
        &mut dialogs,
        &packs,
        &config.instructions,
        &config.output_language,
        config.chunk_concurrency,
    )
    .await
    .with_context(|| format!("chunk summarization failed for meeting {}", meeting.id))?;

    let middles = packs
        .iter()
        .zip(chunk_results.iter())
        .map(|(p, r)| crate::models::MiddleSummary {
            based_on_orders: p.orders.iter().copied().collect(),
            summary: r.middle_summary.clone(),
        })
        .collect();

    let reduction = reduce_summaries(
        client,
        meeting,
        middles,
        &config.output_language,
        &config.reduce,
    )
    .await
    .with_context(|| format!("reduction failed for meeting {}", meeting.id))?;

    let indexed = chunk_results.into_iter().enumerate().collect();
    Ok(assemble_article(meeting, dialogs, &packs, indexed, &reduction))
}

/// Process a batch of meetings with bounded concurrency.
///
/// The output order matches the input order regardless of completion order,
/// and a failed meeting never cancels its siblings; each slot carries its
/// own result.
pub async fn process_batch<B>(
    client: &Arc<LlmClient<B>>,
    meetings: Vec<RawMeeting>,
    config: &PipelineConfig,
    concurrency: usize,
) -> Vec<Result<Article>>
where
    B: ChatBackend + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let config = Arc::new(config.clone());
    let mut tasks: JoinSet<(usize, Result<Article>)> = JoinSet::new();

    let count = meetings.len();
    for (index, meeting) in meetings.into_iter().enumerate() {
        let client = Arc::clone(client);
        let semaphore = Arc::clone(&semaphore);
        let config = Arc::clone(&config);
        tasks.spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return (index, Err(anyhow::anyhow!("semaphore closed"))),
            };
            let result = process_meeting(&client, &meeting, &config).await;
            if let Err(e) = &result {
                warn!("meeting {} failed: {:#}", meeting.id, e);
            }
            (index, result)
        });
    }

    let mut results: Vec<Option<Result<Article>>> = (0..count).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = Some(result),
            Err(e) => warn!("batch task panicked: {}", e),
        }
    }

    results
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| Err(anyhow::anyhow!("meeting task lost"))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;

    use tokio::sync::mpsc;

    use crate::llm::{
        BudgetConfig, ChatMessage, Completion, LlmConfig, LlmError, SchemaCompletion, ToolSpec,
        Usage,
    };
    use crate::models::RawUtterance;

    /// Backend that answers chunk and reduce tools with canned values, and
    /// fails any call whose prompt mentions a poisoned meeting name
    struct ScriptedBackend;

    impl ChatBackend for ScriptedBackend {
        fn complete(
            &self,
            _: &str,
            _: &[ChatMessage],
        ) -> impl Future<Output = Result<Completion, LlmError>> + Send {
            async { Err(LlmError::EmptyResponse) }
        }

        fn complete_with_schema(
            &self,
            _: &str,
            messages: &[ChatMessage],
            tool: &ToolSpec,
        ) -> impl Future<Output = Result<SchemaCompletion, LlmError>> + Send {
            let poisoned = messages.iter().any(|m| m.content.contains("Poisoned"));
            let value = match tool.name {
                "submit_chunk" => serde_json::json!({
                    "middle_summary": "A portion of the debate.",
                    "categories": ["finance"],
                }),
                _ => serde_json::json!({
                    "title": "Session on appropriations",
                    "categories": ["finance"],
                    "summary": "The chamber debated appropriations.",
                    "soft_summary": "They talked about spending.",
                }),
            };
            async move {
                if poisoned {
                    return Err(LlmError::Status {
                        status: 400,
                        body: "bad request".to_string(),
                    });
                }
                Ok(SchemaCompletion {
                    value: Some(value),
                    raw_text: String::new(),
                    usage: Usage::default(),
                })
            }
        }

        fn stream(
            &self,
            _: &str,
            _: &[ChatMessage],
        ) -> impl Future<Output = Result<mpsc::Receiver<Result<String, LlmError>>, LlmError>> + Send
        {
            async { Err(LlmError::EmptyResponse) }
        }

        fn count_tokens(
            &self,
            _: &str,
            _: &[ChatMessage],
        ) -> impl Future<Output = Result<Option<u64>, LlmError>> + Send {
            async { Ok(None) }
        }
    }

    fn test_client() -> Arc<LlmClient<ScriptedBackend>> {
        Arc::new(
            LlmClient::new(
                ScriptedBackend,
                &BudgetConfig {
                    rps: 10_000.0,
                    ..Default::default()
                },
                LlmConfig {
                    max_concurrency: 8,
                    ..Default::default()
                },
            )
            .unwrap(),
        )
    }

    fn meeting(id: &str, name: &str, texts: &[&str]) -> RawMeeting {
        RawMeeting {
            id: id.to_string(),
            name: name.to_string(),
            date: "2024-06-12".to_string(),
            house: String::new(),
            session: String::new(),
            utterances: texts
                .iter()
                .enumerate()
                .map(|(i, text)| RawUtterance {
                    id: format!("u_{}", i + 1),
                    order: None,
                    speaker: format!("Member {}", i + 1),
                    speaker_group: String::new(),
                    speaker_position: String::new(),
                    speaker_role: String::new(),
                    text: text.to_string(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_process_meeting_end_to_end() {
        let client = test_client();
        let m = meeting(
            "m_1",
            "Budget Committee",
            &["The session is open.", "I move to amend.", "Carried."],
        );

        let article = process_meeting(&client, &m, &PipelineConfig::default())
            .await
            .unwrap();

        assert_eq!(article.meeting_id, "m_1");
        assert_eq!(article.dialog_count(), 3);
        assert_eq!(article.chunk_count(), 1);
        assert_eq!(article.title, "Session on appropriations");
        assert_eq!(article.summary, "The chamber debated appropriations.");
        // Dialog order resolved from id suffixes
        assert_eq!(
            article.dialogs.iter().map(|d| d.order).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_empty_meeting_is_valid() {
        let client = test_client();
        let m = meeting("m_0", "Empty Sitting", &[]);

        let article = process_meeting(&client, &m, &PipelineConfig::default())
            .await
            .unwrap();

        assert_eq!(article.dialog_count(), 0);
        assert_eq!(article.chunk_count(), 0);
        // Reducer returned nothing, so the fallback title applies
        assert_eq!(article.title, "Empty Sitting（2024-06-12）");
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_isolates_failures() {
        let client = test_client();
        let meetings = vec![
            meeting("m_a", "First Sitting", &["Opening remarks."]),
            meeting("m_b", "Poisoned Sitting", &["This one fails."]),
            meeting("m_c", "Third Sitting", &["Closing remarks."]),
        ];

        let results = process_batch(&client, meetings, &PipelineConfig::default(), 2).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().meeting_id, "m_a");
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().meeting_id, "m_c");
    }
}
