use anyhow::Result;
use clap::Parser;
use llm_evaluation::config::InferenceJudgeArgs;
use llm_evaluation::pipeline::run_inference_and_judge;
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    llm_evaluation::init_tracing();
    let args = InferenceJudgeArgs::parse();
    let results = run_inference_and_judge(&args).await?;
    info!(
        "Judged {} of {} inferences",
        results.judge_results.len(),
        results.total_candidate_judgments
    );
    Ok(())
}
