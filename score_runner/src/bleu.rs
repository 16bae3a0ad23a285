use std::collections::HashMap;

use anyhow::{ensure, Result};
use regex::Regex;

const MAX_ORDER: usize = 4;

/// mteval-v13a tokenisation: punctuation and symbols become separate tokens,
/// periods and commas are split off unless they sit inside a number.
struct Tokenizer13a {
    rules: Vec<(Regex, &'static str)>,
}

impl Tokenizer13a {
    fn new() -> Self {
        let rules = [
            (r"([{-~\[-`\x20-&(-+:-@/])", " ${1} "),
            (r"([^0-9])([\.,])", "${1} ${2} "),
            (r"([\.,])([^0-9])", " ${1} ${2}"),
            (r"([0-9])(-)", "${1} ${2} "),
        ];
        Self {
            rules: rules
                .iter()
                .map(|(pattern, replacement)| {
                    (Regex::new(pattern).expect("static 13a pattern"), *replacement)
                })
                .collect(),
        }
    }

    fn tokenize(&self, line: &str) -> Vec<String> {
        let mut line = line
            .replace("<skipped>", "")
            .replace("-\n", "")
            .replace('\n', " ");
        if line.contains('&') {
            line = line
                .replace("&quot;", "\"")
                .replace("&amp;", "&")
                .replace("&lt;", "<")
                .replace("&gt;", ">");
        }

        let mut line = format!(" {} ", line);
        for (regex, replacement) in &self.rules {
            line = regex.replace_all(&line, *replacement).into_owned();
        }
        line.split_whitespace().map(str::to_string).collect()
    }
}

fn ngram_counts(tokens: &[String], max_order: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    for order in 1..=max_order {
        for ngram in tokens.windows(order) {
            *counts.entry(ngram).or_insert(0) += 1;
        }
    }
    counts
}

/// Corpus-level BLEU with one reference per prediction, max order 4,
/// no smoothing.
pub fn compute_bleu_score(predictions: &[String], references: &[String]) -> Result<f64> {
    ensure!(
        predictions.len() == references.len(),
        "Got {} predictions but {} references",
        predictions.len(),
        references.len()
    );

    let tokenizer = Tokenizer13a::new();
    let mut matches_by_order = [0usize; MAX_ORDER];
    let mut possible_by_order = [0usize; MAX_ORDER];
    let mut translation_length = 0usize;
    let mut reference_length = 0usize;

    for (prediction, reference) in predictions.iter().zip(references.iter()) {
        let prediction = tokenizer.tokenize(prediction);
        let reference = tokenizer.tokenize(reference);
        translation_length += prediction.len();
        reference_length += reference.len();

        let reference_counts = ngram_counts(&reference, MAX_ORDER);
        for (ngram, count) in ngram_counts(&prediction, MAX_ORDER) {
            let clipped = count.min(reference_counts.get(ngram).copied().unwrap_or(0));
            matches_by_order[ngram.len() - 1] += clipped;
        }
        for order in 1..=MAX_ORDER {
            if prediction.len() >= order {
                possible_by_order[order - 1] += prediction.len() - order + 1;
            }
        }
    }

    let precisions: Vec<f64> = (0..MAX_ORDER)
        .map(|i| {
            if possible_by_order[i] > 0 {
                matches_by_order[i] as f64 / possible_by_order[i] as f64
            } else {
                0.0
            }
        })
        .collect();

    let geo_mean = if precisions.iter().all(|&p| p > 0.0) {
        (precisions.iter().map(|p| p.ln()).sum::<f64>() / MAX_ORDER as f64).exp()
    } else {
        0.0
    };

    if translation_length == 0 {
        return Ok(0.0);
    }
    let ratio = translation_length as f64 / reference_length.max(1) as f64;
    let brevity_penalty = if ratio > 1.0 { 1.0 } else { (1.0 - 1.0 / ratio).exp() };

    Ok(geo_mean * brevity_penalty)
}
