use anyhow::Result;
use clap::Parser;
use llm_evaluation::config::InferenceMetricsArgs;
use llm_evaluation::pipeline::run_inference_and_metrics;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    llm_evaluation::init_tracing();
    let args = InferenceMetricsArgs::parse();
    run_inference_and_metrics(&args).await?;
    Ok(())
}
