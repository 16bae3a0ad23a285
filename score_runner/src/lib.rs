pub mod actor;
pub mod bleu;
pub mod exact_match;
pub mod score;

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Width of the hashed vectors produced by the default runner.
    pub hashing_dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            hashing_dimensions: 512,
        }
    }
}

/// Produces one embedding per token of a text, as consumed by BERTScore.
pub trait EmbeddingRunnerTrait {
    fn new(config: EmbeddingConfig) -> Self where Self: Sized;
    fn load_model(&mut self) -> anyhow::Result<()>;
    fn embed_tokens(&self, text: &str) -> anyhow::Result<Vec<Vec<f64>>>;
}

/// Whitespace tokens; both runners embed at this granularity.
pub fn split_tokens(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

#[cfg(feature = "use_rust_bert")]
pub mod runner;
#[cfg(feature = "use_rust_bert")]
pub use runner::EmbeddingRunner;

#[cfg(not(feature = "use_rust_bert"))]
pub mod hashing_runner;
#[cfg(not(feature = "use_rust_bert"))]
pub use hashing_runner::EmbeddingRunner;

pub use actor::{
    ScoreCommand,
    ScorerHandle,
    start_scorer_actor,
};
pub use bleu::compute_bleu_score;
pub use exact_match::compute_exact_match;
pub use score::{compute_bertscore, score_all, Baseline, BertScores, ScoreOptions, ScoreSet};
