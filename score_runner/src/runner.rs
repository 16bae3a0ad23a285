use rust_bert::pipelines::sentence_embeddings::{
    SentenceEmbeddingsBuilder, SentenceEmbeddingsModel, SentenceEmbeddingsModelType,
};
use tracing::info;

use crate::{split_tokens, EmbeddingConfig, EmbeddingRunnerTrait};

pub struct EmbeddingRunner {
    model: Option<SentenceEmbeddingsModel>,
}

impl EmbeddingRunnerTrait for EmbeddingRunner {
    fn new(_config: EmbeddingConfig) -> Self {
        Self { model: None }
    }

    fn load_model(&mut self) -> anyhow::Result<()> {
        info!("Loading sentence embedding model");
        let model = SentenceEmbeddingsBuilder::remote(SentenceEmbeddingsModelType::DistiluseBaseMultilingualCased)
            .create_model()?;
        self.model = Some(model);
        Ok(())
    }

    fn embed_tokens(&self, text: &str) -> anyhow::Result<Vec<Vec<f64>>> {
        match &self.model {
            Some(model) => {
                let tokens = split_tokens(text);
                if tokens.is_empty() {
                    return Ok(Vec::new());
                }
                let embeddings = model.encode(&tokens)?;
                Ok(embeddings
                    .iter()
                    .map(|embedding| embedding.iter().map(|&val| val as f64).collect())
                    .collect())
            }
            None => Err(anyhow::anyhow!("Model not loaded")),
        }
    }
}
