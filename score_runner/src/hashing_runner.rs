use crate::{split_tokens, EmbeddingConfig, EmbeddingRunnerTrait};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Model-free runner: each token becomes a bag of hashed character trigrams.
///
/// Identical tokens map to identical vectors and tokens sharing spelling
/// overlap, which is enough for lexical BERTScore without model files.
pub struct EmbeddingRunner {
    dimensions: usize,
}

impl EmbeddingRunner {
    fn embed_token(&self, token: &str) -> Vec<f64> {
        let mut vector = vec![0.0; self.dimensions];
        let padded: Vec<char> = std::iter::once('<')
            .chain(token.to_lowercase().chars())
            .chain(std::iter::once('>'))
            .collect();

        for window in padded.windows(3) {
            let bucket = fnv1a(window) % self.dimensions as u64;
            vector[bucket as usize] += 1.0;
        }
        vector
    }
}

fn fnv1a(chars: &[char]) -> u64 {
    let mut hash = FNV_OFFSET;
    for c in chars {
        let mut buf = [0u8; 4];
        for byte in c.encode_utf8(&mut buf).bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

impl EmbeddingRunnerTrait for EmbeddingRunner {
    fn new(config: EmbeddingConfig) -> Self {
        Self {
            dimensions: config.hashing_dimensions.max(1),
        }
    }

    fn load_model(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn embed_tokens(&self, text: &str) -> anyhow::Result<Vec<Vec<f64>>> {
        Ok(split_tokens(text)
            .into_iter()
            .map(|token| self.embed_token(token))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_tokens_share_embedding() {
        let runner = EmbeddingRunner::new(EmbeddingConfig::default());
        let embeddings = runner.embed_tokens("Cat cat dog").unwrap();

        assert_eq!(embeddings.len(), 3);
        assert_eq!(embeddings[0], embeddings[1]);
        assert_ne!(embeddings[0], embeddings[2]);
        assert_eq!(embeddings[0].len(), 512);
    }

    #[test]
    fn test_empty_text_has_no_tokens() {
        let runner = EmbeddingRunner::new(EmbeddingConfig::default());
        assert!(runner.embed_tokens("   ").unwrap().is_empty());
    }
}
