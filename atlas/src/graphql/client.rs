//! Async HTTP client for the remote GraphQL endpoints.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, warn};

use super::{BudgetTracker, CircuitBreaker, GraphQLClientError};

/// Seam the pipeline depends on; the production implementation is
/// [`AtlasGraphQLClient`], tests use a scripted executor.
#[async_trait]
pub trait GraphQLExecutor: Send + Sync {
    /// Executes a query and returns the response `data` field.
    async fn execute(
        &self,
        query: &str,
        variables: Value,
        session_id: Option<&str>,
    ) -> Result<Value, GraphQLClientError>;
}

/// HTTP statuses classified as transient (eligible for retry).
const TRANSIENT_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

/// Client for one GraphQL endpoint with retry, error classification, and
/// budget + breaker integration.
///
/// Calling sequence per `execute`: circuit pre-flight, budget pre-flight,
/// then up to `1 + max_retries` attempts with exponential backoff on
/// transient failures. Success records on the breaker and consumes budget;
/// permanent errors bypass both (the upstream is healthy).
pub struct AtlasGraphQLClient {
    base_url: String,
    http: reqwest::Client,
    max_retries: u32,
    backoff_base: Duration,
    budget: Option<Arc<BudgetTracker>>,
    circuit: Option<Arc<CircuitBreaker>>,
}

impl AtlasGraphQLClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into(),
            http,
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            budget: None,
            circuit: None,
        }
    }

    pub fn with_retries(mut self, max_retries: u32, backoff_base: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff_base = backoff_base;
        self
    }

    pub fn with_budget(mut self, budget: Arc<BudgetTracker>) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_circuit(mut self, circuit: Arc<CircuitBreaker>) -> Self {
        self.circuit = Some(circuit);
        self
    }

    async fn send_request(&self, payload: &Value) -> Result<Value, GraphQLClientError> {
        let response = self
            .http
            .post(&self.base_url)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GraphQLClientError::Transient(format!("request timed out: {e}"))
                } else if e.is_connect() {
                    GraphQLClientError::Transient(format!("connect error: {e}"))
                } else {
                    GraphQLClientError::Transient(format!("network error: {e}"))
                }
            })?;

        let status = response.status().as_u16();
        if TRANSIENT_STATUS.contains(&status) {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(GraphQLClientError::Transient(format!(
                "HTTP {status}: {snippet}"
            )));
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(GraphQLClientError::Permanent(format!(
                "HTTP {status}: {snippet}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| GraphQLClientError::Permanent(format!("invalid JSON response: {e}")))?;

        let errors = body.get("errors").filter(|e| !e.is_null());
        let data = body.get("data").filter(|d| !d.is_null());

        // GraphQL spec: if data is present (even with errors), return it.
        if let Some(data) = data {
            if let Some(errors) = errors {
                warn!(%errors, "GraphQL response contained partial errors");
            }
            return Ok(data.clone());
        }
        if let Some(errors) = errors {
            let joined = errors
                .as_array()
                .map(|arr| {
                    arr.iter()
                        .map(|e| {
                            e.get("message")
                                .and_then(Value::as_str)
                                .map(str::to_string)
                                .unwrap_or_else(|| e.to_string())
                        })
                        .collect::<Vec<_>>()
                        .join("; ")
                })
                .unwrap_or_else(|| errors.to_string());
            return Err(GraphQLClientError::Permanent(joined));
        }
        Err(GraphQLClientError::Permanent(
            "empty GraphQL response: no data and no errors".into(),
        ))
    }
}

#[async_trait]
impl GraphQLExecutor for AtlasGraphQLClient {
    async fn execute(
        &self,
        query: &str,
        variables: Value,
        session_id: Option<&str>,
    ) -> Result<Value, GraphQLClientError> {
        if let Some(circuit) = &self.circuit {
            if circuit.is_open() {
                return Err(GraphQLClientError::CircuitOpen);
            }
        }
        if let Some(budget) = &self.budget {
            if !budget.is_available(session_id) {
                return Err(GraphQLClientError::BudgetExhausted);
            }
        }

        let mut payload = json!({ "query": query });
        if !variables.is_null()
            && variables
                .as_object()
                .map(|o| !o.is_empty())
                .unwrap_or(true)
        {
            payload["variables"] = variables;
        }

        let total_attempts = 1 + self.max_retries;
        let mut last_error = GraphQLClientError::Transient("no attempt made".into());

        for attempt in 0..total_attempts {
            match self.send_request(&payload).await {
                Ok(data) => {
                    if let Some(circuit) = &self.circuit {
                        circuit.record_success();
                    }
                    if let Some(budget) = &self.budget {
                        budget.consume(session_id);
                    }
                    return Ok(data);
                }
                Err(GraphQLClientError::Transient(message)) => {
                    if let Some(circuit) = &self.circuit {
                        circuit.record_failure();
                    }
                    if attempt < total_attempts - 1 {
                        let delay = self.backoff_base * 2u32.pow(attempt);
                        warn!(
                            attempt = attempt + 1,
                            total = total_attempts,
                            delay_secs = delay.as_secs_f64(),
                            %message,
                            "transient GraphQL error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        error!(total = total_attempts, %message, "all GraphQL attempts failed");
                    }
                    last_error = GraphQLClientError::Transient(message);
                }
                // Permanent errors mean a healthy upstream: no breaker count.
                Err(e) => return Err(e),
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted executor used across the crate's tests.
    pub struct ScriptedExecutor {
        responses: std::sync::Mutex<Vec<Result<Value, GraphQLClientError>>>,
        pub calls: AtomicU32,
    }

    impl ScriptedExecutor {
        pub fn new(responses: Vec<Result<Value, GraphQLClientError>>) -> Self {
            let mut reversed = responses;
            reversed.reverse();
            Self {
                responses: std::sync::Mutex::new(reversed),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl GraphQLExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            _query: &str,
            _variables: Value,
            _session_id: Option<&str>,
        ) -> Result<Value, GraphQLClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(GraphQLClientError::Permanent("script exhausted".into())))
        }
    }

    /// **Scenario**: a circuit-open client fails fast without issuing the
    /// request or consuming budget.
    #[tokio::test]
    async fn circuit_open_fails_fast() {
        let circuit = Arc::new(CircuitBreaker::new(1, Duration::from_secs(30)));
        circuit.record_failure();
        let budget = Arc::new(BudgetTracker::new(5, Duration::from_secs(60)));
        let client = AtlasGraphQLClient::new("http://127.0.0.1:1/graphql", Duration::from_secs(1))
            .with_circuit(circuit)
            .with_budget(Arc::clone(&budget));

        let err = client.execute("{ x }", Value::Null, None).await.unwrap_err();
        assert!(matches!(err, GraphQLClientError::CircuitOpen));
        assert_eq!(budget.remaining(None), 5);
    }

    /// **Scenario**: an exhausted budget fails fast with BudgetExhausted.
    #[tokio::test]
    async fn budget_exhausted_fails_fast() {
        let budget = Arc::new(BudgetTracker::new(1, Duration::from_secs(60)));
        budget.consume(None);
        let client = AtlasGraphQLClient::new("http://127.0.0.1:1/graphql", Duration::from_secs(1))
            .with_budget(budget);
        let err = client.execute("{ x }", Value::Null, None).await.unwrap_err();
        assert!(matches!(err, GraphQLClientError::BudgetExhausted));
    }

    /// **Scenario**: retry bound: at most 1 + max_retries attempts against
    /// an unreachable endpoint, each recorded by the breaker.
    #[tokio::test]
    async fn retry_bound_holds() {
        let circuit = Arc::new(CircuitBreaker::new(100, Duration::from_secs(30)));
        let client = AtlasGraphQLClient::new("http://127.0.0.1:1/graphql", Duration::from_millis(50))
            .with_retries(2, Duration::from_millis(1))
            .with_circuit(Arc::clone(&circuit));

        let err = client.execute("{ x }", Value::Null, None).await.unwrap_err();
        assert!(matches!(err, GraphQLClientError::Transient(_)));
        assert_eq!(circuit.failure_count(), 3);
    }
}
