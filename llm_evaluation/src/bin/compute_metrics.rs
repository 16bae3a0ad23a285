use anyhow::Result;
use clap::Parser;
use llm_evaluation::config::MetricsArgs;
use llm_evaluation::pipeline::run_metrics;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    llm_evaluation::init_tracing();
    let args = MetricsArgs::parse();
    let results = run_metrics(&args).await?;
    println!("{}", serde_json::to_string_pretty(&results.summary_scores())?);
    Ok(())
}
