use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::llm::{ChatBackend, ChatMessage, LlmClient, REDUCE_SYSTEM_PROMPT, build_reduce_prompt, reduce_tool};
use crate::models::{MiddleSummary, RawMeeting, ReduceResult};

/// Configuration for the tree reduction
#[derive(Debug, Clone)]
pub struct ReduceConfig {
    /// Partial summaries condensed per reduction call
    pub group_size: usize,
    /// Concurrent reduction calls within one layer
    pub concurrency: usize,
}

impl Default for ReduceConfig {
    fn default() -> Self {
        Self {
            group_size: 8,
            concurrency: 2,
        }
    }
}

/// Final reduction output together with the orders it covers
#[derive(Debug, Clone)]
pub struct Reduction {
    pub result: ReduceResult,
    /// Union of `based_on_orders` across all leaf summaries
    pub based_on_orders: BTreeSet<u64>,
}

/// Condense chunk-level partial summaries into one result via a parallel
/// tree reduction.
///
/// Layers of fixed-size groups are reduced concurrently until one group
/// remains, giving `O(log_groupSize(n))` sequential layers. Each group's
/// result folds back into a MiddleSummary carrying the union of its
/// `based_on_orders`, so the root covers every leaf order regardless of
/// grouping shape. An empty input reduces to a zero-value result without
/// any backend call.
pub async fn reduce_summaries<B>(
    client: &Arc<LlmClient<B>>,
    meeting: &RawMeeting,
    summaries: Vec<MiddleSummary>,
    output_language: &str,
    config: &ReduceConfig,
) -> Result<Reduction>
where
    B: ChatBackend + 'static,
{
    if config.group_size == 0 {
        bail!("reduce group size must be positive");
    }
    if summaries.is_empty() {
        return Ok(Reduction {
            result: ReduceResult::default(),
            based_on_orders: BTreeSet::new(),
        });
    }

    let mut layer = summaries;
    let mut depth = 0usize;

    while layer.len() > config.group_size {
        depth += 1;
        info!(
            layer = depth,
            inputs = layer.len(),
            group_size = config.group_size,
            "reducing layer for meeting {}",
            meeting.id
        );
        layer = reduce_layer(client, meeting, layer, output_language, config, depth).await?;
    }

    let based_on_orders: BTreeSet<u64> = layer
        .iter()
        .flat_map(|s| s.based_on_orders.iter().copied())
        .collect();

    let prompt = build_reduce_prompt(meeting, &layer, output_language);
    let hint = format!("meeting {} reduce root", meeting.id);
    let result = client
        .generate_object::<ReduceResult>(
            REDUCE_SYSTEM_PROMPT,
            &[ChatMessage::user(prompt)],
            &reduce_tool(),
            &hint,
        )
        .await
        .context("root reduction failed")?
        .value;

    Ok(Reduction {
        result,
        based_on_orders,
    })
}

/// Reduce one layer of groups concurrently, preserving group order
async fn reduce_layer<B>(
    client: &Arc<LlmClient<B>>,
    meeting: &RawMeeting,
    layer: Vec<MiddleSummary>,
    output_language: &str,
    config: &ReduceConfig,
    depth: usize,
) -> Result<Vec<MiddleSummary>>
where
    B: ChatBackend + 'static,
{
    let groups: Vec<Vec<MiddleSummary>> = layer
        .chunks(config.group_size)
        .map(|g| g.to_vec())
        .collect();
    let group_count = groups.len();

    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let mut tasks: JoinSet<(usize, Result<MiddleSummary>)> = JoinSet::new();

    for (group_index, group) in groups.into_iter().enumerate() {
        let orders: BTreeSet<u64> = group
            .iter()
            .flat_map(|s| s.based_on_orders.iter().copied())
            .collect();
        let prompt = build_reduce_prompt(meeting, &group, output_language);
        let hint = format!(
            "meeting {} reduce layer {} group {}/{}",
            meeting.id,
            depth,
            group_index + 1,
            group_count
        );

        let client = Arc::clone(client);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return (group_index, Err(anyhow::anyhow!("semaphore closed"))),
            };
            let result = client
                .generate_object::<ReduceResult>(
                    REDUCE_SYSTEM_PROMPT,
                    &[ChatMessage::user(prompt)],
                    &reduce_tool(),
                    &hint,
                )
                .await
                .map(|r| MiddleSummary {
                    based_on_orders: orders,
                    summary: r.value.summary,
                })
                .map_err(anyhow::Error::from);
            (group_index, result)
        });
    }

    let mut reduced: Vec<Option<MiddleSummary>> = vec![None; group_count];
    while let Some(joined) = tasks.join_next().await {
        let (group_index, result) = joined.context("reduce task panicked")?;
        let summary = result
            .with_context(|| format!("reduce layer {} group {} failed", depth, group_index + 1))?;
        debug!("reduce layer {} group {}/{} complete", depth, group_index + 1, group_count);
        reduced[group_index] = Some(summary);
    }

    Ok(reduced.into_iter().flatten().collect())
}
