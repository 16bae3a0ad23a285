use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::messages::{ChatCompletion, ChatCompletionRequest, ChatMessage, RequestParameters};

/// The services behind the adapter do not authenticate.
const PLACEHOLDER_API_KEY: &str = "EMPTY";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Chat-completion client bound to one connection target.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    target: String,
}

impl ChatClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let target = config.target();
        info!("Connecting to model at {}", target);

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("Failed to build HTTP client")?;

        Ok(Self { http, target })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Issue one chat completion for `doc_id`.
    ///
    /// Failures never escape: they come back as [`ChatCompletion::error`].
    /// No retries are attempted.
    pub async fn chat_completion(
        &self,
        doc_id: String,
        messages: Vec<ChatMessage>,
        model: &str,
        parameters: &RequestParameters,
    ) -> (String, ChatCompletion) {
        let response = match self.try_chat_completion(&messages, model, parameters).await {
            Ok(completion) => completion,
            Err(e) => {
                warn!("Chat completion for document {} failed: {}", doc_id, e);
                ChatCompletion::error(&doc_id, model, e)
            }
        };
        (doc_id, response)
    }

    async fn try_chat_completion(
        &self,
        messages: &[ChatMessage],
        model: &str,
        parameters: &RequestParameters,
    ) -> Result<ChatCompletion, ClientError> {
        let request = ChatCompletionRequest {
            model,
            messages,
            parameters,
        };

        let response = self
            .http
            .post(format!("{}chat/completions", self.target))
            .bearer_auth(PLACEHOLDER_API_KEY)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }

        let completion: ChatCompletion = response.json().await?;
        debug!("Received completion {} with {} choices", completion.id, completion.choices.len());
        Ok(completion)
    }
}
