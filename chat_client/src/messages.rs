use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefix marking a completion that was synthesised from a failed call.
pub const ERROR_SENTINEL: &str = "**ERROR**: ";

/// Free-form request parameters, flattened into the request body.
pub type RequestParameters = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    #[serde(flatten)]
    pub parameters: &'a RequestParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
}

fn default_role() -> Role {
    Role::Assistant
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: usize,
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub total_tokens: usize,
    #[serde(default)]
    pub completion_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatCompletion {
    /// A well-formed completion whose only choice carries the error text.
    /// The finish reason is `length` so callers see a terminated generation.
    pub fn error(doc_id: &str, model: &str, error: impl std::fmt::Display) -> Self {
        Self {
            id: doc_id.to_string(),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage {
                    role: Role::Assistant,
                    content: Some(format!("{}{}", ERROR_SENTINEL, error)),
                },
                finish_reason: Some("length".to_string()),
            }],
            usage: None,
        }
    }

    /// Content of the first choice, if the service returned any.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
    }

    pub fn is_error(&self) -> bool {
        self.content().map_or(false, is_error_content)
    }
}

pub fn is_error_content(content: &str) -> bool {
    content.starts_with(ERROR_SENTINEL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_completion_shape() {
        let completion = ChatCompletion::error("doc-7", "llama", "connection refused");

        assert_eq!(completion.id, "doc-7");
        assert_eq!(completion.object, "chat.completion");
        assert_eq!(completion.choices.len(), 1);
        assert_eq!(completion.choices[0].finish_reason.as_deref(), Some("length"));
        assert_eq!(completion.content(), Some("**ERROR**: connection refused"));
        assert!(completion.is_error());
    }

    #[test]
    fn test_deserialize_minimal_response() {
        let body = json!({
            "choices": [{"message": {"content": "hello"}, "finish_reason": "stop"}]
        });
        let completion: ChatCompletion = serde_json::from_value(body).unwrap();

        assert_eq!(completion.content(), Some("hello"));
        assert!(!completion.is_error());
    }

    #[test]
    fn test_request_flattens_parameters() {
        let messages = vec![ChatMessage::user("hi")];
        let mut parameters = RequestParameters::new();
        parameters.insert("guided_regex".into(), json!("a|b"));

        let request = ChatCompletionRequest {
            model: "m",
            messages: &messages,
            parameters: &parameters,
        };
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["model"], "m");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["guided_regex"], "a|b");
    }
}
