use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use plenum::io::{DateRange, FileSink, FileSource, FileStore, NoopSink, TranscriptSource};
use plenum::llm::{
    AnthropicBackend, AnthropicConfig, BudgetConfig, LlmClient, LlmConfig, ParseErrorPolicy,
    RetryConfig,
};
use plenum::pipeline::{PipelineConfig, ReduceConfig, build_dialogs, measure, pack, process_batch};
use plenum::{ArticleStore, ErrorSink};

#[derive(Parser)]
#[command(name = "plenum")]
#[command(author, version, about = "Legislative proceedings summarization pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize meetings from a transcript file and write articles
    Process {
        /// Input file: JSON array of raw meeting records
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory for article JSON files
        #[arg(short, long)]
        output: PathBuf,

        /// File with additional task instructions for the backend
        #[arg(long)]
        instructions: Option<PathBuf>,

        /// Directory for unusable backend output (audit sink)
        #[arg(long)]
        error_dir: Option<PathBuf>,

        /// Only process meetings on or after this date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Only process meetings on or before this date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Language the backend writes summaries in
        #[arg(long, default_value = "English")]
        language: String,

        /// Chunk character threshold
        #[arg(long, default_value = "4000")]
        char_threshold: usize,

        /// Concurrent chunk calls per meeting
        #[arg(long, default_value = "3")]
        chunk_concurrency: usize,

        /// Partial summaries per reduction call
        #[arg(long, default_value = "8")]
        reduce_group_size: usize,

        /// Concurrent reduction calls per layer
        #[arg(long, default_value = "2")]
        reduce_concurrency: usize,

        /// Concurrent meetings in the batch
        #[arg(long, default_value = "2")]
        meeting_concurrency: usize,

        /// Requests per second
        #[arg(long, default_value = "2.0")]
        rps: f64,

        /// Burst size for the RPS bucket (defaults to the rate)
        #[arg(long)]
        burst: Option<f64>,

        /// Requests per minute
        #[arg(long)]
        rpm: Option<u64>,

        /// Requests per UTC day
        #[arg(long)]
        rpd: Option<u64>,

        /// Tokens per minute
        #[arg(long)]
        tpm: Option<u64>,

        /// Pre-reserve tokens-per-minute from estimates before each call
        #[arg(long)]
        strict_tpm: bool,

        /// Total attempts per backend call
        #[arg(long, default_value = "5")]
        max_attempts: u32,

        /// Base backoff delay in milliseconds
        #[arg(long, default_value = "500")]
        retry_base_ms: u64,

        /// Backoff delay cap in milliseconds
        #[arg(long, default_value = "30000")]
        retry_cap_ms: u64,

        /// Per-call timeout in seconds
        #[arg(long, default_value = "300")]
        timeout_secs: u64,

        /// Return empty objects instead of failing on unparsable output
        #[arg(long)]
        lenient_parse: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Report dialog and chunk statistics without calling the backend
    Analyze {
        /// Input file: JSON array of raw meeting records
        #[arg(short, long)]
        input: PathBuf,

        /// Chunk character threshold
        #[arg(long, default_value = "4000")]
        char_threshold: usize,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            input,
            output,
            instructions,
            error_dir,
            from,
            to,
            language,
            char_threshold,
            chunk_concurrency,
            reduce_group_size,
            reduce_concurrency,
            meeting_concurrency,
            rps,
            burst,
            rpm,
            rpd,
            tpm,
            strict_tpm,
            max_attempts,
            retry_base_ms,
            retry_cap_ms,
            timeout_secs,
            lenient_parse,
            verbose,
        } => {
            setup_logging(verbose);

            let instructions = match instructions {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read instructions {:?}", path))?,
                None => String::new(),
            };

            let pipeline_config = PipelineConfig {
                char_threshold,
                chunk_concurrency,
                reduce: ReduceConfig {
                    group_size: reduce_group_size,
                    concurrency: reduce_concurrency,
                },
                instructions,
                output_language: language,
            };
            let budget_config = BudgetConfig {
                rps,
                burst,
                rpm,
                rpd,
                tpm,
                strict_tokens: strict_tpm,
            };
            let llm_config = LlmConfig {
                max_concurrency: chunk_concurrency * meeting_concurrency.max(1),
                call_timeout: Duration::from_secs(timeout_secs),
                retry: RetryConfig {
                    max_attempts,
                    base_delay: Duration::from_millis(retry_base_ms),
                    cap_delay: Duration::from_millis(retry_cap_ms),
                },
                parse_error_policy: if lenient_parse {
                    ParseErrorPolicy::ReturnEmpty
                } else {
                    ParseErrorPolicy::Fail
                },
            };

            process_meetings(
                input,
                output,
                error_dir,
                DateRange { from, to },
                pipeline_config,
                budget_config,
                llm_config,
                meeting_concurrency,
            )
            .await
        }
        Commands::Analyze {
            input,
            char_threshold,
            verbose,
        } => {
            setup_logging(verbose);
            analyze_meetings(input, char_threshold)
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

#[allow(clippy::too_many_arguments)]
async fn process_meetings(
    input: PathBuf,
    output: PathBuf,
    error_dir: Option<PathBuf>,
    range: DateRange,
    pipeline_config: PipelineConfig,
    budget_config: BudgetConfig,
    llm_config: LlmConfig,
    meeting_concurrency: usize,
) -> Result<()> {
    info!("Loading meetings from {:?}", input);
    let meetings = FileSource::new(&input)
        .fetch(&range)
        .context("Failed to load meetings")?;
    info!("Loaded {} meetings", meetings.len());

    if meetings.is_empty() {
        info!("Nothing to process");
        return Ok(());
    }

    let api_config = AnthropicConfig::from_env()?;
    let backend = AnthropicBackend::new(api_config);
    let sink: Arc<dyn ErrorSink> = match error_dir {
        Some(dir) => Arc::new(FileSink::new(dir)),
        None => Arc::new(NoopSink),
    };
    let client = Arc::new(
        LlmClient::with_sink(backend, &budget_config, llm_config, sink)
            .context("Failed to construct LLM client")?,
    );

    let results = process_batch(&client, meetings, &pipeline_config, meeting_concurrency).await;

    let store = FileStore::new(&output);
    let mut succeeded = 0usize;
    let mut failed = 0usize;
    for result in results {
        match result {
            Ok(article) => {
                store.store(&article)?;
                succeeded += 1;
            }
            Err(e) => {
                warn!("meeting failed: {:#}", e);
                failed += 1;
            }
        }
    }

    info!("Complete: {} articles written, {} failed", succeeded, failed);
    if succeeded == 0 && failed > 0 {
        anyhow::bail!("all {} meetings failed", failed);
    }
    Ok(())
}

fn analyze_meetings(input: PathBuf, char_threshold: usize) -> Result<()> {
    let meetings = FileSource::new(&input)
        .fetch(&DateRange::default())
        .context("Failed to load meetings")?;

    println!("Meeting Analysis");
    println!("================");
    println!("Meetings: {}", meetings.len());
    println!();

    for meeting in &meetings {
        let dialogs = build_dialogs(meeting);
        let packs = pack(&measure(&dialogs), char_threshold)?;
        let total_chars: usize = dialogs.iter().map(|d| d.char_len()).sum();
        let oversized = packs.iter().filter(|p| p.oversized).count();

        println!("{} — {}", meeting.id, meeting.name);
        println!("  dialogs: {}", dialogs.len());
        println!("  characters: {}", total_chars);
        println!("  chunks at threshold {}: {}", char_threshold, packs.len());
        if oversized > 0 {
            println!("  oversized single-dialog chunks: {}", oversized);
        }
        if let Some(largest) = packs.iter().map(|p| p.total_len).max() {
            println!("  largest chunk: {} chars", largest);
        }
        println!();
    }

    Ok(())
}
