use crate::{error::TransportError, retry::RetryPolicy};
use async_trait::async_trait;
use model::{batch::Batch, record::MappedRecord};
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

/// Row counts the webhook reports back for an accepted batch.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct WebhookAck {
    #[serde(default)]
    pub inserted: u64,
    #[serde(default)]
    pub updated: u64,
}

/// An HTTP response that made it back, whatever its status.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub ack: Option<WebhookAck>,
    pub body_snippet: String,
}

/// Seam between the dispatcher and the wire, so retry and classification
/// logic is exercised without a live endpoint.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, records: &[MappedRecord]) -> Result<HttpReply, TransportError>;
}

/// Production transport: POST `{app_url}/webhook` with the API-key header and
/// the records as a JSON array under the `data` wrapper key.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(app_url: &str, api_key: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}/webhook", app_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post(&self, records: &[MappedRecord]) -> Result<HttpReply, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .header("X-Api-Key", &self.api_key)
            .json(&serde_json::json!({ "data": records }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else if e.is_connect() {
                    TransportError::Connect(e.to_string())
                } else {
                    TransportError::Other(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            // A non-JSON 2xx body is tolerated; the batch was accepted.
            let ack = response.json::<WebhookAck>().await.ok();
            if ack.is_none() {
                warn!("Webhook returned a non-JSON success body");
            }
            Ok(HttpReply {
                status,
                ack,
                body_snippet: String::new(),
            })
        } else {
            let body = response.text().await.unwrap_or_default();
            Ok(HttpReply {
                status,
                ack: None,
                body_snippet: body.chars().take(200).collect(),
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success,
    /// Transient failures on every attempt; run-level policy decides next.
    RetriesExhausted,
    /// Non-retryable response; the run must abort.
    Fatal,
}

/// Produced once per batch.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub outcome: DispatchOutcome,
    pub attempts: usize,
    pub ack: WebhookAck,
    pub error: Option<String>,
}

enum ReplyClass {
    Success,
    Retryable,
    Fatal,
}

/// 2xx accepted. 4xx means misconfiguration (auth or validation) and is never
/// retried; 503 is the endpoint saying its API key is not configured, which
/// is the same condition. Remaining 5xx are transient load.
fn classify_status(status: u16) -> ReplyClass {
    match status {
        200..=299 => ReplyClass::Success,
        400..=499 => ReplyClass::Fatal,
        503 => ReplyClass::Fatal,
        _ => ReplyClass::Retryable,
    }
}

pub struct Dispatcher {
    transport: Arc<dyn WebhookTransport>,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn WebhookTransport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    /// Sends one batch, applying exponential backoff with jitter between
    /// attempts. Never returns an `Err`: every terminal condition is encoded
    /// in the `DispatchResult`.
    pub async fn send(&self, batch: &Batch) -> DispatchResult {
        let max_attempts = self.retry.max_attempts;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.transport.post(&batch.records).await {
                Ok(reply) => match classify_status(reply.status) {
                    ReplyClass::Success => {
                        info!(
                            batch_seq = batch.seq,
                            rows = batch.len(),
                            attempts = attempt,
                            "Batch accepted by webhook"
                        );
                        return DispatchResult {
                            outcome: DispatchOutcome::Success,
                            attempts: attempt,
                            ack: reply.ack.unwrap_or_default(),
                            error: None,
                        };
                    }
                    ReplyClass::Fatal => {
                        return DispatchResult {
                            outcome: DispatchOutcome::Fatal,
                            attempts: attempt,
                            ack: WebhookAck::default(),
                            error: Some(format!(
                                "HTTP {}: {}",
                                reply.status, reply.body_snippet
                            )),
                        };
                    }
                    ReplyClass::Retryable => {
                        last_error = format!("HTTP {}: {}", reply.status, reply.body_snippet);
                        warn!(
                            batch_seq = batch.seq,
                            attempt,
                            max_attempts,
                            status = reply.status,
                            "Webhook rejected batch with a transient status"
                        );
                    }
                },
                Err(err) => {
                    last_error = err.to_string();
                    warn!(
                        batch_seq = batch.seq,
                        attempt,
                        max_attempts,
                        error = %err,
                        "Webhook request failed"
                    );
                }
            }

            if attempt < max_attempts {
                let delay = self.retry.jittered_delay(attempt - 1);
                tokio::time::sleep(delay).await;
            }
        }

        DispatchResult {
            outcome: DispatchOutcome::RetriesExhausted,
            attempts: max_attempts,
            ack: WebhookAck::default(),
            error: Some(last_error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    pub(crate) struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<HttpReply, TransportError>>>,
        pub calls: std::sync::atomic::AtomicUsize,
    }

    impl ScriptedTransport {
        pub fn new(replies: Vec<Result<HttpReply, TransportError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: std::sync::atomic::AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl WebhookTransport for ScriptedTransport {
        async fn post(&self, _records: &[MappedRecord]) -> Result<HttpReply, TransportError> {
            self.calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(TransportError::Other("script exhausted".into())))
        }
    }

    fn ok_reply(inserted: u64) -> HttpReply {
        HttpReply {
            status: 200,
            ack: Some(WebhookAck {
                inserted,
                updated: 0,
            }),
            body_snippet: String::new(),
        }
    }

    fn status_reply(status: u16) -> HttpReply {
        HttpReply {
            status,
            ack: None,
            body_snippet: "err".into(),
        }
    }

    fn fast_policy(attempts: usize) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::ZERO, Duration::ZERO)
    }

    fn batch() -> Batch {
        Batch {
            seq: 1,
            first_record: 1,
            records: vec![],
            watermark: model::watermark::Watermark::None,
        }
    }

    #[tokio::test]
    async fn timeouts_then_success_reports_three_attempts() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
            Ok(ok_reply(200)),
        ]));
        let dispatcher = Dispatcher::new(transport.clone(), fast_policy(3));

        let result = dispatcher.send(&batch()).await;
        assert_eq!(result.outcome, DispatchOutcome::Success);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.ack.inserted, 200);
        assert_eq!(transport.calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn auth_failure_is_fatal_without_retry() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(status_reply(401))]));
        let dispatcher = Dispatcher::new(transport.clone(), fast_policy(3));

        let result = dispatcher.send(&batch()).await;
        assert_eq!(result.outcome, DispatchOutcome::Fatal);
        assert_eq!(result.attempts, 1);
        assert_eq!(transport.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(result.error.unwrap().contains("401"));
    }

    #[tokio::test]
    async fn missing_server_key_503_is_fatal() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(status_reply(503))]));
        let dispatcher = Dispatcher::new(transport, fast_policy(3));

        let result = dispatcher.send(&batch()).await;
        assert_eq!(result.outcome, DispatchOutcome::Fatal);
    }

    #[tokio::test]
    async fn server_errors_exhaust_retries() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(status_reply(500)),
            Ok(status_reply(502)),
            Ok(status_reply(500)),
        ]));
        let dispatcher = Dispatcher::new(transport.clone(), fast_policy(3));

        let result = dispatcher.send(&batch()).await;
        assert_eq!(result.outcome, DispatchOutcome::RetriesExhausted);
        assert_eq!(result.attempts, 3);
        assert_eq!(transport.calls.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert!(result.error.unwrap().contains("500"));
    }

    #[tokio::test]
    async fn success_without_ack_body_still_succeeds() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(HttpReply {
            status: 200,
            ack: None,
            body_snippet: String::new(),
        })]));
        let dispatcher = Dispatcher::new(transport, fast_policy(3));

        let result = dispatcher.send(&batch()).await;
        assert_eq!(result.outcome, DispatchOutcome::Success);
        assert_eq!(result.ack.inserted, 0);
    }
}
