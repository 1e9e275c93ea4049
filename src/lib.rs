pub mod io;
pub mod llm;
pub mod models;
pub mod pipeline;

pub use io::{
    ArticleStore, DateRange, ErrorSink, FileSink, FileSource, FileStore, NoopSink,
    TranscriptSource, parse_meetings_file, parse_meetings_json,
};
pub use llm::{
    AnthropicBackend, AnthropicConfig, BudgetConfig, BudgetManager, ChatBackend, ChatMessage,
    LlmClient, LlmConfig, LlmError, ParseErrorPolicy, RetryConfig,
};
pub use models::{Article, ChunkResult, Dialog, MiddleSummary, Pack, RawMeeting, ReduceResult};
pub use pipeline::{
    PipelineConfig, ReduceConfig, build_dialogs, measure, pack, process_batch, process_meeting,
};
