pub mod batch;
pub mod config;
pub mod dataset;
pub mod error;
pub mod inference;
pub mod judge;
pub mod metrics;
pub mod pipeline;
pub mod progress;
pub mod results;
pub mod storage;
pub mod token_filter;
pub mod util;
pub mod writer;

use tracing_subscriber::EnvFilter;

pub use batch::{batched, batched_stream};
pub use dataset::{DatasetLoader, Document, DocumentColumns, Record};
pub use error::EvalError;
pub use inference::{InferenceCounters, InferenceOrchestrator, InferenceSettings, InferenceStream};
pub use judge::{extract_grade, JudgeCounters, JudgeFailure, JudgeOrchestrator, JudgeSettings, JudgeStream, GRADE_PATTERN};
pub use metrics::{read_inference_data, MetricsRunner};
pub use results::{
    AggregatedJudgeResults, EvaluationResults, EvaluationScores, Grade, InferenceResult, JudgeResult,
};
pub use token_filter::{HfTokenCounter, TokenBudget, TokenBudgetFilter, TokenCounter};
pub use writer::ResultSink;

/// Install the fmt subscriber for a binary. `RUST_LOG` overrides the
/// default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
