use std::convert::TryFrom;
use std::sync::Arc;

use anyhow::Context;
use chat_client::{is_error_content, ChatClient, ChatCompletion, ChatMessage, RequestParameters};
use futures::{Stream, StreamExt};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use crate::batch::batched_stream;
use crate::error::EvalError;
use crate::results::{Grade, InferenceResult, JudgeResult};
use crate::util::render_template;

/// Grade format the judge is constrained to in the second step.
pub const GRADE_PATTERN: &str = r"Grade: \[\[([1-9]|10)\]\]";

/// Request parameter carrying the decoding constraint.
const GUIDED_REGEX_PARAMETER: &str = "guided_regex";

/// First grade in `text` matching `pattern`, if it lies on the 1-10 scale.
pub fn extract_grade(pattern: &Regex, text: &str) -> Option<Grade> {
    let captures = pattern.captures(text)?;
    let value: u8 = captures.get(1)?.as_str().parse().ok()?;
    Grade::try_from(value).ok()
}

#[derive(Debug, Clone)]
pub struct JudgeSettings {
    pub model_name: String,
    /// Rendered with `{context}` and `{answer}`.
    pub step1_template: String,
    /// Sent verbatim after the judge's explanation.
    pub step2_template: String,
    pub batch_size: usize,
    pub parameters: RequestParameters,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JudgeCounters {
    pub candidates: usize,
    pub judged: usize,
    pub judge_errors: usize,
}

#[derive(Debug, Error)]
pub enum JudgeFailure {
    #[error("inference result is an error response")]
    ErroneousInference,

    #[error("{step} step returned no content")]
    EmptyResponse { step: &'static str },

    #[error("{step} step failed: {message}")]
    Service { step: &'static str, message: String },

    #[error("no valid grade in judge response: {0:?}")]
    NoGrade(String),

    #[error(transparent)]
    Template(#[from] EvalError),
}

/// Two-step judging: an explanation first, then a constrained grade.
#[derive(Clone)]
pub struct JudgeOrchestrator {
    client: ChatClient,
    settings: Arc<JudgeSettings>,
    grading_parameters: Arc<RequestParameters>,
    grade_pattern: Regex,
}

impl JudgeOrchestrator {
    pub fn new(client: ChatClient, settings: JudgeSettings) -> anyhow::Result<Self> {
        if settings.batch_size < 1 {
            return Err(EvalError::InvalidBatchSize(settings.batch_size).into());
        }
        render_template(&settings.step1_template, &[("context", ""), ("answer", "")])?;

        let mut grading_parameters = settings.parameters.clone();
        grading_parameters.insert(
            GUIDED_REGEX_PARAMETER.to_string(),
            Value::String(GRADE_PATTERN.to_string()),
        );
        let grade_pattern = Regex::new(GRADE_PATTERN).context("Invalid grade pattern")?;

        Ok(Self {
            client,
            settings: Arc::new(settings),
            grading_parameters: Arc::new(grading_parameters),
            grade_pattern,
        })
    }

    pub fn spawn<S>(&self, results: S) -> JudgeStream
    where
        S: Stream<Item = InferenceResult> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.settings.batch_size);
        let orchestrator = self.clone();
        let handle = tokio::spawn(async move { orchestrator.run(results, tx).await });
        JudgeStream { rx, handle }
    }

    #[instrument(skip_all, fields(judge = %self.settings.model_name))]
    async fn run<S>(self, results: S, tx: mpsc::Sender<JudgeResult>) -> Result<JudgeCounters, EvalError>
    where
        S: Stream<Item = InferenceResult> + Send + 'static,
    {
        let mut counters = JudgeCounters::default();
        let batches = batched_stream(results, self.settings.batch_size, false)?;
        futures::pin_mut!(batches);

        while let Some(batch) = batches.next().await {
            let batch = batch?;
            counters.candidates += batch.len();
            debug!("Judging batch of {} inference results", batch.len());

            let mut pending = JoinSet::new();
            for result in batch {
                let orchestrator = self.clone();
                pending.spawn(async move {
                    let doc_id = result.doc_id.clone();
                    (doc_id, orchestrator.judge(result).await)
                });
            }

            while let Some(joined) = pending.join_next().await {
                match joined {
                    Ok((_, Ok(judged))) => {
                        counters.judged += 1;
                        if tx.send(judged).await.is_err() {
                            info!("Judge consumer went away, stopping");
                            return Ok(counters);
                        }
                    }
                    Ok((doc_id, Err(failure))) => {
                        warn!("Judging document {} failed: {}", doc_id, failure);
                        counters.judge_errors += 1;
                    }
                    Err(e) => {
                        error!("Judge task failed: {}", e);
                        counters.judge_errors += 1;
                    }
                }
            }
        }

        Ok(counters)
    }

    /// Judge a single inference result with both steps.
    pub async fn judge(&self, result: InferenceResult) -> Result<JudgeResult, JudgeFailure> {
        if is_error_content(&result.inference_result) {
            return Err(JudgeFailure::ErroneousInference);
        }

        let step1 = render_template(
            &self.settings.step1_template,
            &[("context", &result.document), ("answer", &result.inference_result)],
        )?;
        let mut messages = vec![ChatMessage::user(step1)];

        let (_, response) = self
            .client
            .chat_completion(
                result.doc_id.clone(),
                messages.clone(),
                &self.settings.model_name,
                &self.settings.parameters,
            )
            .await;
        let explanation = response_text(&response, "explanation")?.to_string();

        messages.push(ChatMessage::assistant(explanation.clone()));
        messages.push(ChatMessage::user(self.settings.step2_template.clone()));

        let (_, response) = self
            .client
            .chat_completion(
                result.doc_id.clone(),
                messages,
                &self.settings.model_name,
                &self.grading_parameters,
            )
            .await;
        let grading = response_text(&response, "grading")?;
        let grade = extract_grade(&self.grade_pattern, grading)
            .ok_or_else(|| JudgeFailure::NoGrade(grading.to_string()))?;

        Ok(JudgeResult {
            context_document: result.document,
            context_document_id: result.doc_id,
            gold_standard_result: result.gold_standard_result,
            llm_inference: result.inference_result,
            judge_explanation: explanation,
            judge_grade: grade,
        })
    }
}

fn response_text<'a>(response: &'a ChatCompletion, step: &'static str) -> Result<&'a str, JudgeFailure> {
    let content = response.content().ok_or(JudgeFailure::EmptyResponse { step })?;
    if is_error_content(content) {
        return Err(JudgeFailure::Service {
            step,
            message: content.to_string(),
        });
    }
    Ok(content)
}

/// Receiving end of a judge run.
pub struct JudgeStream {
    rx: mpsc::Receiver<JudgeResult>,
    handle: JoinHandle<Result<JudgeCounters, EvalError>>,
}

impl JudgeStream {
    pub async fn next(&mut self) -> Option<JudgeResult> {
        self.rx.recv().await
    }

    pub async fn finish(self) -> anyhow::Result<JudgeCounters> {
        drop(self.rx);
        let counters = self.handle.await.context("Judge producer panicked")??;
        info!(
            "Judging finished: {} candidates, {} judged, {} errors",
            counters.candidates, counters.judged, counters.judge_errors
        );
        Ok(counters)
    }
}
