use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokenizers::Tokenizer;
use tracing::debug;

pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> Result<usize>;
}

/// Counts tokens with a Hugging Face `tokenizer.json`.
pub struct HfTokenCounter {
    tokenizer: Tokenizer,
}

impl HfTokenCounter {
    /// Accepts either the tokenizer file or a model directory containing it.
    pub fn from_model_path(model_path: &Path) -> Result<Self> {
        let file = if model_path.is_dir() {
            model_path.join("tokenizer.json")
        } else {
            model_path.to_path_buf()
        };
        let tokenizer = Tokenizer::from_file(&file)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Failed to load tokenizer from {}", file.display()))?;
        debug!("Loaded tokenizer from {}", file.display());
        Ok(Self { tokenizer })
    }
}

impl TokenCounter for HfTokenCounter {
    fn count_tokens(&self, text: &str) -> Result<usize> {
        let encoding = self.tokenizer.encode(text, true).map_err(anyhow::Error::msg)?;
        Ok(encoding.get_ids().len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenBudget {
    Within(usize),
    Exceeded(usize),
}

/// Decides whether a prompt fits the model's context window.
/// Over-budget prompts are skipped, never truncated.
#[derive(Clone)]
pub struct TokenBudgetFilter {
    counter: Arc<dyn TokenCounter>,
    max_context_size: usize,
}

impl TokenBudgetFilter {
    pub fn new(counter: Arc<dyn TokenCounter>, max_context_size: usize) -> Self {
        Self {
            counter,
            max_context_size,
        }
    }

    pub fn max_context_size(&self) -> usize {
        self.max_context_size
    }

    pub fn check(&self, prompt: &str) -> Result<TokenBudget> {
        let tokens = self.counter.count_tokens(prompt)?;
        Ok(if tokens > self.max_context_size {
            TokenBudget::Exceeded(tokens)
        } else {
            TokenBudget::Within(tokens)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Whitespace;

    impl TokenCounter for Whitespace {
        fn count_tokens(&self, text: &str) -> Result<usize> {
            Ok(text.split_whitespace().count())
        }
    }

    struct Broken;

    impl TokenCounter for Broken {
        fn count_tokens(&self, _text: &str) -> Result<usize> {
            anyhow::bail!("tokenizer exploded")
        }
    }

    #[test]
    fn test_budget_boundary() {
        let filter = TokenBudgetFilter::new(Arc::new(Whitespace), 3);
        assert_eq!(filter.check("a b c").unwrap(), TokenBudget::Within(3));
        assert_eq!(filter.check("a b c d").unwrap(), TokenBudget::Exceeded(4));
    }

    #[test]
    fn test_counter_failure_propagates() {
        let filter = TokenBudgetFilter::new(Arc::new(Broken), 3);
        assert!(filter.check("anything").is_err());
    }

    #[test]
    fn test_missing_tokenizer_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(HfTokenCounter::from_model_path(dir.path()).is_err());
    }
}
