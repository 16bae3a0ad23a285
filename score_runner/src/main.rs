use anyhow::Result;
use score_runner::{start_scorer_actor, EmbeddingConfig, ScoreOptions};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
    .init();

    let mut args = std::env::args().skip(1);
    let prediction = args.next().unwrap_or_else(|| "The cat sat on the mat.".to_string());
    let reference = args.next().unwrap_or_else(|| "A cat was sitting on the mat.".to_string());

    let (scorer, _thread_join_handle) = start_scorer_actor(EmbeddingConfig::default());
    scorer.load_model().await?;
    println!("Model loaded successfully!\n");

    let scores = scorer
        .score(vec![prediction], vec![reference], ScoreOptions::default())
        .await?;

    println!("BERTScore precision: {:.4}", scores.bertscore.precision[0]);
    println!("BERTScore recall:    {:.4}", scores.bertscore.recall[0]);
    println!("BERTScore f1:        {:.4}", scores.bertscore.f1[0]);
    println!("BLEU:                {:.4}", scores.bleu);
    println!("Exact match:         {:.4}", scores.exact_match);

    Ok(())
}
