use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

/// Resolves a service slug to its current base URL (spec §4.E "resolve
/// service base-URL from the registry"). `apphub-registry` is the real
/// implementor; tests use a static map.
#[async_trait]
pub trait ServiceResolver: Send + Sync {
    async fn resolve_base_url(&self, service_slug: &str) -> Option<String>;
}

pub struct StaticServiceResolver {
    base_urls: HashMap<String, String>,
}

impl StaticServiceResolver {
    pub fn new(base_urls: HashMap<String, String>) -> Self {
        Self { base_urls }
    }
}

#[async_trait]
impl ServiceResolver for StaticServiceResolver {
    async fn resolve_base_url(&self, service_slug: &str) -> Option<String> {
        self.base_urls.get(service_slug).cloned()
    }
}

#[derive(Debug, Clone)]
pub enum ServiceCallOutcome {
    Succeeded { result: Value },
    Failed { error_message: String, error_type: String },
}

/// Composes and issues the service-step HTTP request (spec §4.E "Service
/// step"). A missing service (no base URL) fails closed with
/// `service_unavailable`, a retriable condition; non-2xx responses fail with
/// `http_{status}`, also retriable unless the step's policy names it fatal.
pub async fn call_service(
    client: &reqwest::Client,
    base_url: Option<&str>,
    method: &str,
    path: &str,
    headers: &HashMap<String, String>,
    body: Option<&Value>,
    timeout: Duration,
) -> ServiceCallOutcome {
    let Some(base_url) = base_url else {
        return ServiceCallOutcome::Failed {
            error_message: "service has no registered base URL".to_string(),
            error_type: "service_unavailable".to_string(),
        };
    };

    let method = match method.to_uppercase().parse::<reqwest::Method>() {
        Ok(m) => m,
        Err(_) => {
            return ServiceCallOutcome::Failed {
                error_message: format!("invalid HTTP method '{method}'"),
                error_type: "invalid_method".to_string(),
            }
        }
    };

    let url = format!("{}{}", base_url.trim_end_matches('/'), path);
    let mut request = client.request(method, &url).timeout(timeout);
    for (key, value) in headers {
        request = request.header(key, value);
    }
    if let Some(body) = body {
        request = request.json(body);
    }

    match request.send().await {
        Ok(response) => {
            let status = response.status();
            if status.is_success() {
                let result = response.json::<Value>().await.unwrap_or(Value::Null);
                ServiceCallOutcome::Succeeded { result }
            } else {
                ServiceCallOutcome::Failed {
                    error_message: format!("service responded with status {status}"),
                    error_type: format!("http_{}", status.as_u16()),
                }
            }
        }
        Err(err) if err.is_timeout() => ServiceCallOutcome::Failed {
            error_message: err.to_string(),
            error_type: "timeout".to_string(),
        },
        Err(err) => ServiceCallOutcome::Failed {
            error_message: err.to_string(),
            error_type: "service_unavailable".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_base_url_fails_as_service_unavailable() {
        let client = reqwest::Client::new();
        let outcome = call_service(
            &client,
            None,
            "GET",
            "/health",
            &HashMap::new(),
            None,
            Duration::from_secs(1),
        )
        .await;
        match outcome {
            ServiceCallOutcome::Failed { error_type, .. } => {
                assert_eq!(error_type, "service_unavailable")
            }
            _ => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn static_resolver_returns_configured_url() {
        let mut urls = HashMap::new();
        urls.insert("billing".to_string(), "http://billing.internal".to_string());
        let resolver = StaticServiceResolver::new(urls);
        assert_eq!(
            resolver.resolve_base_url("billing").await,
            Some("http://billing.internal".to_string())
        );
        assert_eq!(resolver.resolve_base_url("missing").await, None);
    }
}
