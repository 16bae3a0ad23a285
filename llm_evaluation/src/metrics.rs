use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use score_runner::{Baseline, ScoreOptions, ScorerHandle};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::error::EvalError;
use crate::results::{EvaluationResults, EvaluationScores, InferenceResult};

/// Scores generations against their gold standards with the scoring actor.
#[derive(Clone)]
pub struct MetricsRunner {
    scorer: ScorerHandle,
    options: ScoreOptions,
}

impl MetricsRunner {
    /// BERTScores are rescaled with the built-in baseline for `language`
    /// when one exists.
    pub fn new(scorer: ScorerHandle, language: impl Into<String>) -> Self {
        let language = language.into();
        let baseline = Baseline::for_language(&language);
        if baseline.is_none() {
            warn!("No BERTScore baseline for language {}, scores are not rescaled", language);
        }
        Self {
            scorer,
            options: ScoreOptions {
                language,
                baseline,
                ignore_case: true,
                ignore_punctuation: true,
            },
        }
    }

    pub fn with_baseline(mut self, baseline: Option<Baseline>) -> Self {
        self.options.baseline = baseline;
        self
    }

    #[instrument(skip_all, fields(results = results.len()))]
    pub async fn run(&self, results: &[InferenceResult]) -> Result<EvaluationResults> {
        let references = results
            .iter()
            .map(|r| r.single_gold_standard().map(str::to_string))
            .collect::<Result<Vec<_>, EvalError>>()?;
        if results.is_empty() {
            warn!("No inference results to score, reporting zero scores");
            return Ok(EvaluationResults {
                full_prompts: Vec::new(),
                generations: Vec::new(),
                scores: EvaluationScores::default(),
            });
        }
        let predictions: Vec<String> = results.iter().map(|r| r.inference_result.clone()).collect();

        let set = self
            .scorer
            .score(predictions.clone(), references, self.options.clone())
            .await
            .context("Scoring failed")?;

        let precision = clamp(set.bertscore.precision);
        let recall = clamp(set.bertscore.recall);
        let f1 = clamp(set.bertscore.f1);

        let scores = EvaluationScores {
            precision_avg_bert: rounded_mean(&precision),
            recall_avg_bert: rounded_mean(&recall),
            f1_avg_bert: rounded_mean(&f1),
            precision_list_bert: precision,
            recall_list_bert: recall,
            f1_list_bert: f1,
            bleu_score: set.bleu,
            accuracy: set.exact_match,
        };
        info!(
            "Scores: f1 {:.4}, bleu {:.4}, accuracy {:.4}",
            scores.f1_avg_bert, scores.bleu_score, scores.accuracy
        );

        Ok(EvaluationResults {
            full_prompts: results.iter().map(|r| r.prompt.clone()).collect(),
            generations: predictions,
            scores,
        })
    }
}

fn clamp(values: Vec<f64>) -> Vec<f64> {
    values.into_iter().map(|v| v.max(0.0)).collect()
}

fn rounded_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    (mean * 10_000.0).round() / 10_000.0
}

/// Load persisted inference results from a `.json` file, a `.jsonl` file or
/// a directory of them. Unreadable entries inside a directory are skipped.
pub fn read_inference_data(path: &Path) -> Result<Vec<InferenceResult>> {
    if !path.exists() {
        return Err(EvalError::MissingFile(path.to_path_buf()).into());
    }

    if !path.is_dir() {
        return read_results_file(path);
    }

    let mut files: Vec<PathBuf> = fs::read_dir(path)
        .with_context(|| format!("Failed to list {}", path.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| matches!(p.extension().and_then(|e| e.to_str()), Some("json" | "jsonl")))
        .collect();
    files.sort();

    let mut results = Vec::new();
    for file in files {
        match read_results_file(&file) {
            Ok(mut loaded) => results.append(&mut loaded),
            Err(e) => warn!("Skipping {}: {:#}", file.display(), e),
        }
    }
    info!("Read {} inference results from {}", results.len(), path.display());
    Ok(results)
}

fn read_results_file(path: &Path) -> Result<Vec<InferenceResult>> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;

    if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
        let results = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(idx, line)| match serde_json::from_str(line) {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!("Skipping line {} of {}: {}", idx + 1, path.display(), e);
                    None
                }
            })
            .collect();
        return Ok(results);
    }

    let value: Value =
        serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))?;
    let entries = match value {
        Value::Array(items) => items,
        other => vec![other],
    };
    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!("Skipping invalid entry in {}: {}", path.display(), e);
                None
            }
        })
        .collect())
}
