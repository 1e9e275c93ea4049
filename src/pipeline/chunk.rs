use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::llm::{CHUNK_SYSTEM_PROMPT, ChatBackend, ChatMessage, LlmClient, build_chunk_prompt, chunk_tool};
use crate::models::{ChunkResult, Dialog, DialogUpdate, Pack, RawMeeting};

/// Summarize every pack of one meeting with bounded concurrency.
///
/// Results are re-sorted by chunk index before returning; completion order
/// never affects output order. Per-dialog updates from all chunks are merged
/// back into `dialogs` by order. A failed chunk fails the whole meeting.
pub async fn summarize_chunks<B>(
    client: &Arc<LlmClient<B>>,
    meeting: &RawMeeting,
    dialogs: &mut [Dialog],
    packs: &[Pack],
    instructions: &str,
    output_language: &str,
    concurrency: usize,
) -> Result<Vec<ChunkResult>>
where
    B: ChatBackend + 'static,
{
    if packs.is_empty() {
        return Ok(Vec::new());
    }

    info!(
        chunks = packs.len(),
        concurrency, "summarizing chunks for meeting {}", meeting.id
    );

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks: JoinSet<(usize, Result<ChunkResult>)> = JoinSet::new();

    for (chunk_index, pack) in packs.iter().enumerate() {
        let chunk_dialogs: Vec<&Dialog> = pack.indices.iter().map(|&i| &dialogs[i]).collect();
        let prompt = build_chunk_prompt(
            meeting,
            &chunk_dialogs,
            chunk_index,
            packs.len(),
            instructions,
            output_language,
        );
        let hint = format!(
            "meeting {} chunk {}/{}",
            meeting.id,
            chunk_index + 1,
            packs.len()
        );

        let client = Arc::clone(client);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return (chunk_index, Err(anyhow::anyhow!("semaphore closed"))),
            };
            let result = client
                .generate_object::<ChunkResult>(
                    CHUNK_SYSTEM_PROMPT,
                    &[ChatMessage::user(prompt)],
                    &chunk_tool(),
                    &hint,
                )
                .await
                .map(|r| r.value)
                .map_err(anyhow::Error::from);
            (chunk_index, result)
        });
    }

    let mut results: Vec<Option<ChunkResult>> = vec![None; packs.len()];
    while let Some(joined) = tasks.join_next().await {
        let (chunk_index, result) = joined.context("chunk task panicked")?;
        let result = result.with_context(|| format!("chunk {} failed", chunk_index + 1))?;
        debug!("chunk {}/{} complete", chunk_index + 1, packs.len());
        results[chunk_index] = Some(result);
    }

    let results: Vec<ChunkResult> = results.into_iter().flatten().collect();

    // Merge annotations back in chunk order for determinism
    for result in &results {
        merge_dialog_updates(dialogs, &result.dialog_updates);
    }

    Ok(results)
}

/// Merge per-dialog annotations back into the dialog array, matching by
/// `order`. Dialogs the backend did not mention keep their empty fields;
/// updates referencing unknown orders are dropped.
pub fn merge_dialog_updates(dialogs: &mut [Dialog], updates: &[DialogUpdate]) {
    let by_order: HashMap<u64, usize> = dialogs
        .iter()
        .enumerate()
        .map(|(i, d)| (d.order, i))
        .collect();

    for update in updates {
        let Some(&i) = by_order.get(&update.order) else {
            debug!("dropping update for unknown order {}", update.order);
            continue;
        };
        if !update.summary.is_empty() {
            dialogs[i].summary = update.summary.clone();
        }
        if !update.soft_language.is_empty() {
            dialogs[i].soft_language = update.soft_language.clone();
        }
    }
}
