use std::sync::Arc;

use anyhow::Context;
use chat_client::{ChatClient, ChatCompletion, ChatMessage, RequestParameters};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use crate::batch::batched;
use crate::dataset::{Document, DocumentColumns, Record};
use crate::error::EvalError;
use crate::results::InferenceResult;
use crate::token_filter::{TokenBudget, TokenBudgetFilter};
use crate::util::render_template;

#[derive(Debug, Clone)]
pub struct InferenceSettings {
    pub model_name: String,
    /// Must contain `{context}` and no other placeholder.
    pub prompt_template: String,
    pub columns: DocumentColumns,
    pub batch_size: usize,
    /// Stop after this many requests have been dispatched.
    pub subset: Option<usize>,
    pub parameters: RequestParameters,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InferenceCounters {
    pub dispatched: usize,
    pub processed: usize,
    pub excluded_by_length: usize,
    pub inference_errors: usize,
}

#[derive(Debug, Error)]
pub enum InferenceFailure {
    #[error("service reported an error: {0}")]
    Service(String),

    #[error("response carried no content")]
    EmptyResponse,
}

/// Runs batched chat completions over dataset records.
#[derive(Clone)]
pub struct InferenceOrchestrator {
    client: ChatClient,
    filter: TokenBudgetFilter,
    settings: Arc<InferenceSettings>,
}

impl InferenceOrchestrator {
    pub fn new(
        client: ChatClient,
        filter: TokenBudgetFilter,
        settings: InferenceSettings,
    ) -> Result<Self, EvalError> {
        if settings.batch_size < 1 {
            return Err(EvalError::InvalidBatchSize(settings.batch_size));
        }
        render_template(&settings.prompt_template, &[("context", "")])?;
        Ok(Self {
            client,
            filter,
            settings: Arc::new(settings),
        })
    }

    /// Start the producer task. Results arrive on the returned stream as
    /// each batch completes, in completion order.
    pub fn spawn(&self, records: Vec<Record>) -> InferenceStream {
        let (tx, rx) = mpsc::channel(self.settings.batch_size);
        let orchestrator = self.clone();
        let handle = tokio::spawn(async move { orchestrator.run(records, tx).await });
        InferenceStream { rx, handle }
    }

    #[instrument(skip_all, fields(model = %self.settings.model_name))]
    async fn run(
        self,
        records: Vec<Record>,
        tx: mpsc::Sender<InferenceResult>,
    ) -> Result<InferenceCounters, EvalError> {
        let settings = Arc::clone(&self.settings);
        let mut counters = InferenceCounters::default();
        let mut capped = false;

        for (batch_idx, batch) in batched(records, settings.batch_size, false)?.enumerate() {
            let batch = batch?;
            let mut slots: Vec<Option<(Document, String)>> = Vec::with_capacity(batch.len());
            let mut pending = JoinSet::new();

            for record in &batch {
                if settings.subset.map_or(false, |cap| counters.dispatched >= cap) {
                    info!("Reached data subset limit of {} documents", counters.dispatched);
                    capped = true;
                    break;
                }

                let document = Document::from_record(record, &settings.columns)?;
                let prompt = render_template(&settings.prompt_template, &[("context", &document.context)])?;

                match self.filter.check(&prompt) {
                    Ok(TokenBudget::Within(_)) => {}
                    Ok(TokenBudget::Exceeded(tokens)) => {
                        debug!(
                            "Skipping document {}: {} tokens exceed context size {}",
                            document.id,
                            tokens,
                            self.filter.max_context_size()
                        );
                        counters.excluded_by_length += 1;
                        continue;
                    }
                    Err(e) => {
                        warn!("Failed to tokenize document {}: {:#}", document.id, e);
                        counters.inference_errors += 1;
                        continue;
                    }
                }

                let index = slots.len();
                let client = self.client.clone();
                let settings = Arc::clone(&settings);
                let doc_id = document.id.clone();
                let messages = vec![ChatMessage::user(prompt.clone())];
                pending.spawn(async move {
                    let response = client
                        .chat_completion(doc_id, messages, &settings.model_name, &settings.parameters)
                        .await;
                    (index, response)
                });
                slots.push(Some((document, prompt)));
                counters.dispatched += 1;
            }

            debug!("Batch {}: {} requests in flight", batch_idx, pending.len());

            while let Some(joined) = pending.join_next().await {
                let (index, (doc_id, completion)) = match joined {
                    Ok(output) => output,
                    Err(e) => {
                        error!("Inference task failed: {}", e);
                        counters.inference_errors += 1;
                        continue;
                    }
                };
                let Some((document, prompt)) = slots.get_mut(index).and_then(Option::take) else {
                    error!("No pending document for response {}", doc_id);
                    counters.inference_errors += 1;
                    continue;
                };

                match generation(&completion) {
                    Ok(text) => {
                        let result = InferenceResult::new(document, prompt, text);
                        counters.processed += 1;
                        if tx.send(result).await.is_err() {
                            info!("Result consumer went away, stopping inference");
                            return Ok(counters);
                        }
                    }
                    Err(e) => {
                        warn!("Inference for document {} failed: {}", doc_id, e);
                        counters.inference_errors += 1;
                    }
                }
            }

            if capped {
                break;
            }
        }

        Ok(counters)
    }
}

fn generation(completion: &ChatCompletion) -> Result<String, InferenceFailure> {
    let content = completion.content().ok_or(InferenceFailure::EmptyResponse)?;
    if completion.is_error() {
        return Err(InferenceFailure::Service(content.to_string()));
    }
    Ok(content.to_string())
}

/// Receiving end of an inference run.
pub struct InferenceStream {
    rx: mpsc::Receiver<InferenceResult>,
    handle: JoinHandle<Result<InferenceCounters, EvalError>>,
}

impl InferenceStream {
    pub async fn next(&mut self) -> Option<InferenceResult> {
        self.rx.recv().await
    }

    /// Wait for the producer and return its counters. Configuration errors
    /// raised while producing surface here.
    pub async fn finish(self) -> anyhow::Result<InferenceCounters> {
        drop(self.rx);
        let counters = self.handle.await.context("Inference producer panicked")??;
        info!(
            "Inference finished: {} dispatched, {} processed, {} excluded by length, {} errors",
            counters.dispatched, counters.processed, counters.excluded_by_length, counters.inference_errors
        );
        Ok(counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_filter::TokenCounter;
    use chat_client::ClientConfig;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    struct Whitespace;

    impl TokenCounter for Whitespace {
        fn count_tokens(&self, text: &str) -> anyhow::Result<usize> {
            Ok(text.split_whitespace().count())
        }
    }

    fn settings(batch_size: usize, subset: Option<usize>) -> InferenceSettings {
        InferenceSettings {
            model_name: "test-model".to_string(),
            prompt_template: "Summarize: {context}".to_string(),
            columns: DocumentColumns {
                id: "id".into(),
                context: "context".into(),
                gold_standard: "gold".into(),
            },
            batch_size,
            subset,
            parameters: RequestParameters::new(),
        }
    }

    fn orchestrator(server: &MockServer, settings: InferenceSettings, max_tokens: usize) -> InferenceOrchestrator {
        let client = ChatClient::new(&ClientConfig::new(&server.uri()).with_endpoint("v1")).unwrap();
        let filter = TokenBudgetFilter::new(Arc::new(Whitespace), max_tokens);
        InferenceOrchestrator::new(client, filter, settings).unwrap()
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({
            "id": "cmpl-1",
            "object": "chat.completion",
            "created": 0,
            "model": "test-model",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}]
        })
    }

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                json!({"id": format!("doc{}", i), "context": format!("text {}", i), "gold": "g"})
                    .as_object()
                    .unwrap()
                    .clone()
            })
            .collect()
    }

    async fn drain(mut stream: InferenceStream) -> (Vec<InferenceResult>, InferenceCounters) {
        let mut results = Vec::new();
        while let Some(result) = stream.next().await {
            results.push(result);
        }
        (results, stream.finish().await.unwrap())
    }

    #[tokio::test]
    async fn test_every_record_is_inferred_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("summary")))
            .expect(5)
            .mount(&server)
            .await;

        let stream = orchestrator(&server, settings(2, None), 100).spawn(records(5));
        let (results, counters) = drain(stream).await;

        let mut ids: Vec<_> = results.iter().map(|r| r.doc_id.clone()).collect();
        ids.sort();
        assert_eq!(ids, vec!["doc0", "doc1", "doc2", "doc3", "doc4"]);
        assert_eq!(counters.dispatched, 5);
        assert_eq!(counters.processed, 5);
        assert_eq!(counters.inference_errors, 0);
    }

    /// Answers after `delay` and records when each request arrived.
    struct DelayedCompletion {
        arrivals: Arc<Mutex<Vec<Instant>>>,
        delay: Duration,
    }

    impl Respond for DelayedCompletion {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            self.arrivals.lock().unwrap().push(Instant::now());
            ResponseTemplate::new(200)
                .set_body_json(completion("summary"))
                .set_delay(self.delay)
        }
    }

    #[tokio::test]
    async fn test_batches_are_dispatched_in_waves() {
        let delay = Duration::from_millis(200);
        let arrivals = Arc::new(Mutex::new(Vec::new()));
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(DelayedCompletion {
                arrivals: Arc::clone(&arrivals),
                delay,
            })
            .mount(&server)
            .await;

        let (results, _) = drain(orchestrator(&server, settings(2, None), 100).spawn(records(5))).await;
        assert_eq!(results.len(), 5);

        let mut times = arrivals.lock().unwrap().clone();
        times.sort();
        assert_eq!(times.len(), 5);
        // both requests of the first batch are in flight together
        assert!(times[1] - times[0] < delay);
        // a third request only goes out after the previous batch answered
        for window in times.windows(3) {
            assert!(window[2] - window[0] >= delay);
        }
    }

    #[tokio::test]
    async fn test_request_carries_single_user_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "messages": [{"role": "user", "content": "Summarize: text 0"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("summary")))
            .expect(1)
            .mount(&server)
            .await;

        let (results, _) = drain(orchestrator(&server, settings(4, None), 100).spawn(records(1))).await;
        assert_eq!(results[0].prompt, "Summarize: text 0");
        assert_eq!(results[0].inference_result, "summary");
    }

    #[tokio::test]
    async fn test_subset_cap_limits_dispatch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("summary")))
            .expect(3)
            .mount(&server)
            .await;

        let (results, counters) = drain(orchestrator(&server, settings(2, Some(3)), 100).spawn(records(10))).await;
        assert_eq!(results.len(), 3);
        assert_eq!(counters.dispatched, 3);
    }

    #[tokio::test]
    async fn test_empty_choices_are_counted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let (results, counters) = drain(orchestrator(&server, settings(2, None), 100).spawn(records(2))).await;
        assert!(results.is_empty());
        assert_eq!(counters.inference_errors, 2);
    }

    #[tokio::test]
    async fn test_missing_column_is_fatal() {
        let server = MockServer::start().await;
        let bad = vec![json!({"id": "x"}).as_object().unwrap().clone()];

        let mut stream = orchestrator(&server, settings(2, None), 100).spawn(bad);
        assert!(stream.next().await.is_none());
        let err = stream.finish().await.unwrap_err();
        assert!(err.to_string().contains("no column 'context'"));
    }

    #[tokio::test]
    async fn test_invalid_settings_are_rejected() {
        let server = MockServer::start().await;
        let client = ChatClient::new(&ClientConfig::new(&server.uri())).unwrap();
        let filter = TokenBudgetFilter::new(Arc::new(Whitespace), 10);

        assert!(matches!(
            InferenceOrchestrator::new(client.clone(), filter.clone(), settings(0, None)),
            Err(EvalError::InvalidBatchSize(0))
        ));

        let mut bad_template = settings(1, None);
        bad_template.prompt_template = "{question}".to_string();
        assert!(matches!(
            InferenceOrchestrator::new(client, filter, bad_template),
            Err(EvalError::Template(_))
        ));
    }
}
