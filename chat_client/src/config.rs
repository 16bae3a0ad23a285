use std::time::Duration;

/// Where the chat-completion service lives and how long to wait for it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub port: Option<String>,
    pub endpoint: Option<String>,
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.into(),
            port: None,
            endpoint: None,
            timeout: None,
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn target(&self) -> String {
        build_target(
            &self.base_url,
            self.port.as_deref().unwrap_or_default(),
            self.endpoint.as_deref().unwrap_or_default(),
        )
    }
}

/// Normalise `{base_url}[:{port}][/{endpoint}]/` into one connection target.
pub fn build_target(base_url: &str, port: &str, endpoint: &str) -> String {
    let mut target = String::from(base_url);
    if !port.is_empty() {
        target.push(':');
        target.push_str(port);
    }
    if !endpoint.is_empty() {
        target.push('/');
        target.push_str(endpoint);
    }
    target.push('/');
    target
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_target_with_port_and_endpoint() {
        assert_eq!(build_target("https://h", "8080", "v1"), "https://h:8080/v1/");
    }

    #[test]
    fn test_build_target_without_port() {
        assert_eq!(build_target("https://h", "", "v1"), "https://h/v1/");
    }

    #[test]
    fn test_build_target_bare() {
        assert_eq!(build_target("https://h", "", ""), "https://h/");
    }

    #[test]
    fn test_config_target_uses_optional_parts() {
        let config = ClientConfig::new("http://localhost").with_port("8081");
        assert_eq!(config.target(), "http://localhost:8081/");

        let config = config.with_endpoint("v1");
        assert_eq!(config.target(), "http://localhost:8081/v1/");
    }
}
