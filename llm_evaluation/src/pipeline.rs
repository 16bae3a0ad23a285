use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chat_client::{ChatClient, RequestParameters};
use chrono::Local;
use futures::stream;
use score_runner::{start_scorer_actor, Baseline, EmbeddingConfig};
use tracing::{error, info, instrument, warn};

use crate::config::{DatasetArgs, InferenceJudgeArgs, InferenceMetricsArgs, MetricsArgs, ModelArgs};
use crate::dataset::{DatasetLoader, Record};
use crate::inference::{InferenceCounters, InferenceOrchestrator, InferenceSettings};
use crate::judge::{JudgeCounters, JudgeOrchestrator, JudgeSettings};
use crate::metrics::{read_inference_data, MetricsRunner};
use crate::progress::ProgressTracker;
use crate::results::{AggregatedJudgeResults, EvaluationResults, InferenceResult};
use crate::storage::ObjectStorage;
use crate::token_filter::{HfTokenCounter, TokenBudgetFilter};
use crate::util::{read_prompt_template, sanitize_file_name};
use crate::writer::{run_directory_name, ResultSink};

fn create_sink(dataset: &DatasetArgs, model: &ModelArgs, output_dir: &Path) -> Result<ResultSink> {
    let run_dir = output_dir.join(run_directory_name(
        &model.model_name,
        &dataset.evaluation_dataset_name,
        &dataset.evaluation_dataset_version,
        Local::now(),
    ));
    ResultSink::create(run_dir, ObjectStorage::from_env())
}

/// Run inference and persist each result as soon as it arrives.
pub async fn stream_inference_to_sink(
    orchestrator: &InferenceOrchestrator,
    records: Vec<Record>,
    sink: &ResultSink,
    total: usize,
) -> Result<InferenceCounters> {
    let mut progress = ProgressTracker::new(total, "inference");
    let mut stream = orchestrator.spawn(records);

    while let Some(result) = stream.next().await {
        match sink.write_inference_result(&result) {
            Ok(path) => {
                info!("Saved inference result for document {} to {}", result.doc_id, path.display());
                progress.update(&result.doc_id);
            }
            Err(e) => {
                error!("Failed to save inference result for document {}: {:#}", result.doc_id, e);
                progress.record_failure();
            }
        }
    }

    progress.finish();
    stream.finish().await
}

/// Judge inference results, persisting each judgment and collecting them
/// into `aggregated`.
pub async fn stream_judgments_to_sink(
    orchestrator: &JudgeOrchestrator,
    results: Vec<InferenceResult>,
    sink: &ResultSink,
    aggregated: &mut AggregatedJudgeResults,
) -> Result<JudgeCounters> {
    let mut progress = ProgressTracker::new(results.len(), "judge");
    let mut stream = orchestrator.spawn(stream::iter(results));

    while let Some(judgment) = stream.next().await {
        if let Err(e) = sink.write_judge_result(&judgment) {
            error!("Failed to save judge result for document {}: {:#}", judgment.context_document_id, e);
            progress.record_failure();
        }
        progress.update(&judgment.context_document_id);
        aggregated.insert(judgment);
    }

    progress.finish();
    stream.finish().await
}

#[instrument(skip_all, fields(model = %model.model_name, dataset = %dataset.evaluation_dataset_name))]
async fn run_inference_stage(dataset: &DatasetArgs, model: &ModelArgs, sink: &ResultSink) -> Result<Vec<InferenceResult>> {
    let records = DatasetLoader::new(dataset.dataset_cache_dir.clone())
        .with_hub_url(dataset.dataset_hub_url.as_str())
        .load(
            &dataset.evaluation_dataset_name,
            &dataset.evaluation_dataset_version,
            &dataset.dataset_split,
        )
        .await?;
    if let Some(subset) = dataset.subset() {
        warn!("Using a subset of the data: {} documents", subset);
    }

    let prompt_template = read_prompt_template(&model.prompt_template_path)?;
    info!("Prompt template read from {}", model.prompt_template_path.display());

    let counter = HfTokenCounter::from_model_path(&model.model_path)?;
    let filter = TokenBudgetFilter::new(Arc::new(counter), model.maximum_context_size);
    let client = ChatClient::new(&model.client_config())?;
    let orchestrator = InferenceOrchestrator::new(
        client,
        filter,
        InferenceSettings {
            model_name: model.model_name.clone(),
            prompt_template,
            columns: dataset.columns(),
            batch_size: model.batch_size,
            subset: dataset.subset(),
            parameters: RequestParameters::new(),
        },
    )?;

    let total = dataset.subset().map_or(records.len(), |s| s.min(records.len()));
    stream_inference_to_sink(&orchestrator, records, sink, total).await?;
    collect_inference_results(sink)
}

/// Read back everything the inference stage persisted. A run in which every
/// document was excluded or failed yields no results rather than an error.
pub fn collect_inference_results(sink: &ResultSink) -> Result<Vec<InferenceResult>> {
    let results_dir = sink.inference_results_dir();
    if !results_dir.exists() {
        warn!("No inference results were produced");
        return Ok(Vec::new());
    }
    info!("Loading generated inferences from {}", results_dir.display());
    read_inference_data(&results_dir)
}

/// Dataset, inference, metrics, sinks.
pub async fn run_inference_and_metrics(args: &InferenceMetricsArgs) -> Result<EvaluationResults> {
    let sink = create_sink(&args.dataset, &args.model, &args.output.output_dir_path)?;
    let results = run_inference_stage(&args.dataset, &args.model, &sink).await?;

    let evaluation = score(&results, &args.bertscore_language, args.bertscore_baseline).await?;
    sink.save_results(&evaluation, args).await?;
    info!("Evaluation complete, results in {}", sink.run_dir().display());
    Ok(evaluation)
}

/// Dataset, inference, two-step judge, sinks.
pub async fn run_inference_and_judge(args: &InferenceJudgeArgs) -> Result<AggregatedJudgeResults> {
    let sink = create_sink(&args.dataset, &args.model, &args.output.output_dir_path)?;
    let results = run_inference_stage(&args.dataset, &args.model, &sink).await?;

    let step1_template = read_prompt_template(&args.judge.judge_prompt1_template_path)?;
    let step2_template = read_prompt_template(&args.judge.judge_prompt2_template_path)?;
    let judge = JudgeOrchestrator::new(
        ChatClient::new(&args.judge.client_config())?,
        JudgeSettings {
            model_name: args.judge.judge_model_name.clone(),
            step1_template: step1_template.clone(),
            step2_template: step2_template.clone(),
            batch_size: args.judge.judge_batch_size,
            parameters: RequestParameters::new(),
        },
    )?;

    let mut aggregated = AggregatedJudgeResults {
        judge_results: BTreeMap::new(),
        total_candidate_judgments: results.len(),
        judge_prompt_step1_template: step1_template,
        judge_prompt_step2_template: step2_template,
        evaluation_dataset_name: args.dataset.evaluation_dataset_name.clone(),
        evaluation_dataset_version: args.dataset.evaluation_dataset_version.clone(),
        llm_name: args.model.model_name.clone(),
        judge_name: args.judge.judge_model_name.clone(),
    };
    stream_judgments_to_sink(&judge, results, &sink, &mut aggregated).await?;

    info!("{}", aggregated);
    sink.save_results(&aggregated, args).await?;
    sink.save_judge_details(&aggregated).await?;
    info!("Evaluation complete, results in {}", sink.run_dir().display());
    Ok(aggregated)
}

/// Metrics over results generated by an earlier run.
pub async fn run_metrics(args: &MetricsArgs) -> Result<EvaluationResults> {
    let results = read_inference_data(&args.input_file_path)?;
    let input_name = args
        .input_file_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "results".to_string());
    let run_dir: PathBuf = args.output.output_dir_path.join(format!(
        "metrics_{}--{}",
        sanitize_file_name(&input_name),
        Local::now().format("%Y-%m-%d_%H-%M-%S")
    ));
    let sink = ResultSink::create(run_dir, ObjectStorage::from_env())?;

    let evaluation = score(&results, &args.bertscore_language, args.bertscore_baseline).await?;
    sink.save_results(&evaluation, args).await?;
    info!("Metrics complete, results in {}", sink.run_dir().display());
    Ok(evaluation)
}

async fn score(results: &[InferenceResult], language: &str, baseline: Option<f64>) -> Result<EvaluationResults> {
    let (scorer, _scorer_thread) = start_scorer_actor(EmbeddingConfig::default());
    scorer.load_model().await.context("Failed to load scoring model")?;
    let mut metrics = MetricsRunner::new(scorer, language);
    if let Some(value) = baseline {
        metrics = metrics.with_baseline(Some(Baseline::uniform(value)));
    }
    let evaluation = metrics.run(results).await?;
    for (name, value) in evaluation.summary_scores() {
        info!("{}: {:.4}", name, value);
    }
    Ok(evaluation)
}
