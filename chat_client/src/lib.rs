pub mod client;
pub mod config;
pub mod messages;

pub use client::{ChatClient, ClientError};
pub use config::{build_target, ClientConfig};
pub use messages::{
    is_error_content, ChatCompletion, ChatMessage, Choice, RequestParameters, ResponseMessage,
    Role, ERROR_SENTINEL,
};
