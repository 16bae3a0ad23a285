use std::path::PathBuf;
use std::time::Duration;

use chat_client::ClientConfig;
use clap::{Args, Parser};
use serde::Serialize;

use crate::dataset::{DocumentColumns, DEFAULT_HUB_URL};

const DEFAULT_PROMPT_TEMPLATE: &str = "/home/evaluation/example_prompts/example_summary_prompt.txt";
const DEFAULT_JUDGE_PROMPT1_TEMPLATE: &str = "/home/evaluation/example_prompts/example_judge_prompt1.txt";
const DEFAULT_JUDGE_PROMPT2_TEMPLATE: &str = "/home/evaluation/example_prompts/example_judge_prompt2.txt";

#[derive(Debug, Clone, Args, Serialize)]
pub struct DatasetArgs {
    /// Dataset name on the hub, or a path to a local dataset file
    #[arg(long, default_value = "abisee/cnn_dailymail")]
    pub evaluation_dataset_name: String,

    #[arg(long, default_value = "3.0.0")]
    pub evaluation_dataset_version: String,

    /// Dataset split to evaluate on (train, test, validation)
    #[arg(long, default_value = "test")]
    pub dataset_split: String,

    #[arg(long, default_value = "id")]
    pub id_column_name: String,

    #[arg(long, default_value = "article")]
    pub context_column_name: String,

    #[arg(long, default_value = "highlights")]
    pub gold_standard_column_name: String,

    /// Evaluate only the first n documents; 0 evaluates the full split
    #[arg(long, default_value_t = 0)]
    pub use_data_subset: usize,

    #[arg(long, env = "DATASET_CACHE_DIR", default_value = "datasets")]
    pub dataset_cache_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_HUB_URL)]
    pub dataset_hub_url: String,
}

impl DatasetArgs {
    pub fn columns(&self) -> DocumentColumns {
        DocumentColumns {
            id: self.id_column_name.clone(),
            context: self.context_column_name.clone(),
            gold_standard: self.gold_standard_column_name.clone(),
        }
    }

    pub fn subset(&self) -> Option<usize> {
        (self.use_data_subset > 0).then_some(self.use_data_subset)
    }
}

#[derive(Debug, Clone, Args, Serialize)]
pub struct ModelArgs {
    #[arg(long)]
    pub model_name: String,

    /// Model directory or tokenizer.json used for the token budget
    #[arg(long)]
    pub model_path: PathBuf,

    #[arg(long)]
    pub maximum_context_size: usize,

    /// Requests in flight per batch
    #[arg(long, default_value_t = 50)]
    pub batch_size: usize,

    #[arg(long, default_value = DEFAULT_PROMPT_TEMPLATE)]
    pub prompt_template_path: PathBuf,

    #[arg(long, default_value = "http://localhost")]
    pub llm_base_url: String,

    #[arg(long, default_value = "8080")]
    pub llm_port: String,

    #[arg(long, default_value = "v1")]
    pub llm_endpoint: String,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub request_timeout_secs: Option<u64>,
}

impl ModelArgs {
    pub fn client_config(&self) -> ClientConfig {
        client_config(&self.llm_base_url, &self.llm_port, &self.llm_endpoint, self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Args, Serialize)]
pub struct JudgeArgs {
    #[arg(long)]
    pub judge_model_name: String,

    #[arg(long, default_value = "http://localhost")]
    pub judge_base_url: String,

    #[arg(long, default_value = "8081")]
    pub judge_port: String,

    #[arg(long, default_value = "v1")]
    pub judge_endpoint: String,

    #[arg(long, default_value = DEFAULT_JUDGE_PROMPT1_TEMPLATE)]
    pub judge_prompt1_template_path: PathBuf,

    #[arg(long, default_value = DEFAULT_JUDGE_PROMPT2_TEMPLATE)]
    pub judge_prompt2_template_path: PathBuf,

    #[arg(long, default_value_t = 50)]
    pub judge_batch_size: usize,

    #[arg(long)]
    pub judge_request_timeout_secs: Option<u64>,
}

impl JudgeArgs {
    pub fn client_config(&self) -> ClientConfig {
        client_config(
            &self.judge_base_url,
            &self.judge_port,
            &self.judge_endpoint,
            self.judge_request_timeout_secs,
        )
    }
}

#[derive(Debug, Clone, Args, Serialize)]
pub struct OutputArgs {
    #[arg(short = 'o', long, default_value = "output")]
    pub output_dir_path: PathBuf,
}

fn client_config(base_url: &str, port: &str, endpoint: &str, timeout_secs: Option<u64>) -> ClientConfig {
    let config = ClientConfig::new(base_url)
        .with_port(port)
        .with_endpoint(endpoint);
    match timeout_secs {
        Some(secs) => config.with_timeout(Duration::from_secs(secs)),
        None => config,
    }
}

/// Inference over a dataset followed by automated metrics.
#[derive(Debug, Clone, Parser, Serialize)]
#[command(name = "run-inference-and-metrics", version)]
pub struct InferenceMetricsArgs {
    #[command(flatten)]
    #[serde(flatten)]
    pub dataset: DatasetArgs,

    #[command(flatten)]
    #[serde(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    #[serde(flatten)]
    pub output: OutputArgs,

    #[arg(long, default_value = "en")]
    pub bertscore_language: String,

    /// Rescale BERTScores with this baseline instead of the language default
    #[arg(long)]
    pub bertscore_baseline: Option<f64>,
}

/// Inference over a dataset followed by two-step LLM judging.
#[derive(Debug, Clone, Parser, Serialize)]
#[command(name = "run-inference-and-judge", version)]
pub struct InferenceJudgeArgs {
    #[command(flatten)]
    #[serde(flatten)]
    pub dataset: DatasetArgs,

    #[command(flatten)]
    #[serde(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    #[serde(flatten)]
    pub judge: JudgeArgs,

    #[command(flatten)]
    #[serde(flatten)]
    pub output: OutputArgs,
}

/// Metrics over previously generated inference results.
#[derive(Debug, Clone, Parser, Serialize)]
#[command(name = "compute-metrics", version)]
pub struct MetricsArgs {
    /// Results file (.json or .jsonl) or a directory of them
    #[arg(short = 'i', long)]
    pub input_file_path: PathBuf,

    #[command(flatten)]
    #[serde(flatten)]
    pub output: OutputArgs,

    #[arg(long, default_value = "en")]
    pub bertscore_language: String,

    /// Rescale BERTScores with this baseline instead of the language default
    #[arg(long)]
    pub bertscore_baseline: Option<f64>,
}
