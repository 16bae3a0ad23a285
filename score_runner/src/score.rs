use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bleu::compute_bleu_score;
use crate::exact_match::compute_exact_match;
use crate::EmbeddingRunnerTrait;

/// Expected score of unrelated text pairs, subtracted when rescaling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl Baseline {
    pub fn uniform(value: f64) -> Self {
        Self {
            precision: value,
            recall: value,
            f1: value,
        }
    }

    /// Rescaling baseline for `language`, if one is known.
    pub fn for_language(language: &str) -> Option<Self> {
        match language {
            "en" => Some(Self {
                precision: 0.8315,
                recall: 0.8314,
                f1: 0.8315,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoreOptions {
    pub language: String,
    pub baseline: Option<Baseline>,
    pub ignore_case: bool,
    pub ignore_punctuation: bool,
}

impl Default for ScoreOptions {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            baseline: None,
            ignore_case: true,
            ignore_punctuation: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BertScores {
    pub precision: Vec<f64>,
    pub recall: Vec<f64>,
    pub f1: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSet {
    pub bertscore: BertScores,
    pub bleu: f64,
    pub exact_match: f64,
}

fn normalize(mut vector: Vec<f64>) -> Vec<f64> {
    let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Greedy matching over the cosine similarity matrix: every candidate token
/// takes its best reference token (precision) and vice versa (recall).
fn greedy_match(candidate: &[Vec<f64>], reference: &[Vec<f64>]) -> (f64, f64, f64) {
    if candidate.is_empty() || reference.is_empty() {
        return (0.0, 0.0, 0.0);
    }

    let similarities: Vec<Vec<f64>> = candidate
        .iter()
        .map(|c| reference.iter().map(|r| dot(c, r)).collect())
        .collect();

    let precision = similarities
        .iter()
        .map(|row| row.iter().cloned().fold(f64::NEG_INFINITY, f64::max))
        .sum::<f64>()
        / candidate.len() as f64;

    let recall = (0..reference.len())
        .map(|j| {
            similarities
                .iter()
                .map(|row| row[j])
                .fold(f64::NEG_INFINITY, f64::max)
        })
        .sum::<f64>()
        / reference.len() as f64;

    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    (precision, recall, f1)
}

fn rescale(value: f64, baseline: f64) -> f64 {
    (value - baseline) / (1.0 - baseline)
}

/// Per-example BERTScore precision, recall and F1.
///
/// With a baseline the values are rescaled and may become negative.
pub fn compute_bertscore<R>(
    runner: &R,
    predictions: &[String],
    references: &[String],
    options: &ScoreOptions,
) -> Result<BertScores>
where
    R: EmbeddingRunnerTrait + ?Sized,
{
    ensure!(
        predictions.len() == references.len(),
        "Got {} predictions but {} references",
        predictions.len(),
        references.len()
    );
    debug!("Computing BERTScore for {} pairs (lang={})", predictions.len(), options.language);

    let mut scores = BertScores::default();
    for (prediction, reference) in predictions.iter().zip(references.iter()) {
        let candidate: Vec<Vec<f64>> = runner
            .embed_tokens(prediction)?
            .into_iter()
            .map(normalize)
            .collect();
        let gold: Vec<Vec<f64>> = runner
            .embed_tokens(reference)?
            .into_iter()
            .map(normalize)
            .collect();

        let (mut precision, mut recall, mut f1) = greedy_match(&candidate, &gold);
        if let Some(baseline) = options.baseline {
            precision = rescale(precision, baseline.precision);
            recall = rescale(recall, baseline.recall);
            f1 = rescale(f1, baseline.f1);
        }

        scores.precision.push(precision);
        scores.recall.push(recall);
        scores.f1.push(f1);
    }
    Ok(scores)
}

pub fn score_all<R>(
    runner: &R,
    predictions: &[String],
    references: &[String],
    options: &ScoreOptions,
) -> Result<ScoreSet>
where
    R: EmbeddingRunnerTrait + ?Sized,
{
    let bertscore = compute_bertscore(runner, predictions, references, options)?;
    let bleu = compute_bleu_score(predictions, references)?;
    let exact_match = compute_exact_match(
        predictions,
        references,
        options.ignore_case,
        options.ignore_punctuation,
    )?;

    Ok(ScoreSet {
        bertscore,
        bleu,
        exact_match,
    })
}
