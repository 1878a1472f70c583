//! Clause classification: one page of contract text in, term → sentences out.
//!
//! The [`Classifier`] sends each page to a [`CompletionService`] together
//! with the closed term vocabulary, backs off exponentially while the
//! service rate limits, and parses the answer into a
//! [`PageClassification`] restricted to the canonical terms.

pub mod client;
pub mod prompt;
pub mod response;
pub mod retry;

use tracing::{debug, info, instrument, warn};

use riskclause_shared::{
    CanonicalTermSet, ClassifierConfig, PageClassification, PageText, Result, RiskClauseError,
};

pub use client::{
    ChatMessage, ChatRequest, CompletionService, OpenAiCompatClient, Role, ServiceError,
};
pub use response::{extract_json_object, parse_classification};
pub use retry::Backoff;

/// Page classifier bound to one completion service.
#[derive(Debug)]
pub struct Classifier<S> {
    service: S,
    config: ClassifierConfig,
}

impl<S: CompletionService> Classifier<S> {
    pub fn new(service: S, config: ClassifierConfig) -> Self {
        Self { service, config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Classify one page.
    ///
    /// Blank pages return an empty classification without contacting the
    /// service. Rate limiting is retried with back-off; any other service
    /// failure or an unparseable answer is returned as a page-local error.
    #[instrument(skip_all, fields(page = page.index))]
    pub async fn classify_page(
        &self,
        page: &PageText,
        terms: &CanonicalTermSet,
    ) -> Result<PageClassification> {
        if page.is_blank() {
            debug!("blank page, nothing to classify");
            return Ok(PageClassification::new());
        }

        let request = prompt::build_request(&self.config.model, page, terms);
        let raw = self.complete_with_backoff(&request).await?;
        let classification = parse_classification(&raw, terms)?;

        debug!(
            terms = classification.len(),
            sentences = classification.values().map(Vec::len).sum::<usize>(),
            "page classified"
        );
        Ok(classification)
    }

    async fn complete_with_backoff(&self, request: &ChatRequest) -> Result<String> {
        let policy = &self.config.retry;
        let mut backoff = Backoff::new(policy);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.service.complete(request).await {
                Ok(text) => {
                    if attempt > 1 {
                        info!(attempts = attempt, "completed after rate limiting");
                    }
                    return Ok(text);
                }
                Err(ServiceError::RateLimited) => {
                    if policy.max_attempts.is_some_and(|max| attempt >= max) {
                        warn!(attempts = attempt, "rate limited, giving up");
                        return Err(RiskClauseError::RateLimited { attempts: attempt });
                    }
                    let delay = backoff.next_delay();
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(other) => {
                    warn!(attempt, error = %other, "completion failed");
                    return Err(other.into());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use riskclause_shared::RetryPolicy;
    use tokio::time::Instant;

    /// Replays scripted outcomes and records when each call arrived.
    struct ScriptedService {
        script: Mutex<VecDeque<std::result::Result<String, ServiceError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedService {
        fn new(script: Vec<std::result::Result<String, ServiceError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CompletionService for ScriptedService {
        async fn complete(
            &self,
            _request: &ChatRequest,
        ) -> std::result::Result<String, ServiceError> {
            self.calls.lock().unwrap().push(Instant::now());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("{}".to_string()))
        }
    }

    fn config(base_ms: u64, max_ms: u64, max_attempts: Option<u32>) -> ClassifierConfig {
        ClassifierConfig {
            model: "test-model".into(),
            retry: RetryPolicy {
                base_delay: Duration::from_millis(base_ms),
                max_delay: Duration::from_millis(max_ms),
                max_attempts,
            },
            page_interval: Duration::ZERO,
        }
    }

    fn terms() -> CanonicalTermSet {
        CanonicalTermSet::new(["T1", "T2"])
    }

    fn rate_limited(n: usize) -> Vec<std::result::Result<String, ServiceError>> {
        (0..n).map(|_| Err(ServiceError::RateLimited)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn retries_rate_limits_with_capped_backoff() {
        let mut script = rate_limited(5);
        script.push(Ok(r#"{"T1": "clause a"}"#.to_string()));
        let classifier = Classifier::new(ScriptedService::new(script), config(100, 400, None));

        let page = PageText::new(1, "The supplier shall indemnify the buyer.");
        let parsed = classifier.classify_page(&page, &terms()).await.unwrap();
        assert_eq!(parsed["T1"], vec!["clause a"]);

        let calls = classifier.service().call_times();
        assert_eq!(calls.len(), 6);

        let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(gaps.windows(2).all(|w| w[0] <= w[1]), "gaps: {gaps:?}");
        assert!(gaps.iter().all(|g| *g <= Duration::from_millis(400)));
        assert_eq!(
            gaps,
            [100, 200, 400, 400, 400].map(Duration::from_millis).to_vec()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn max_attempts_bounds_retries() {
        let service = ScriptedService::new(rate_limited(10));
        let classifier = Classifier::new(service, config(10, 50, Some(3)));

        let page = PageText::new(2, "Payment is due in 30 days.");
        let err = classifier.classify_page(&page, &terms()).await.unwrap_err();
        assert!(matches!(err, RiskClauseError::RateLimited { attempts: 3 }));
        assert!(err.is_page_local());
        assert_eq!(classifier.service().call_times().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_restarts_for_each_page() {
        let mut script = rate_limited(2);
        script.push(Ok("{}".into()));
        script.extend(rate_limited(1));
        script.push(Ok("{}".into()));
        let classifier = Classifier::new(ScriptedService::new(script), config(100, 1_000, None));

        let t = terms();
        classifier.classify_page(&PageText::new(1, "a"), &t).await.unwrap();
        classifier.classify_page(&PageText::new(2, "b"), &t).await.unwrap();

        let calls = classifier.service().call_times();
        assert_eq!(calls.len(), 5);
        assert_eq!(calls[4] - calls[3], Duration::from_millis(100));
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let service = ScriptedService::new(vec![Err(ServiceError::Http {
            status: 500,
            body: "internal".into(),
        })]);
        let classifier = Classifier::new(service, config(10, 10, None));

        let err = classifier
            .classify_page(&PageText::new(1, "text"), &terms())
            .await
            .unwrap_err();
        assert!(matches!(err, RiskClauseError::Service(_)));
        assert_eq!(classifier.service().call_times().len(), 1);
    }

    #[tokio::test]
    async fn unparseable_answer_is_page_local() {
        let service = ScriptedService::new(vec![Ok("I cannot help with that.".into())]);
        let classifier = Classifier::new(service, config(10, 10, None));

        let err = classifier
            .classify_page(&PageText::new(1, "text"), &terms())
            .await
            .unwrap_err();
        assert!(matches!(err, RiskClauseError::ClassificationParse { .. }));
        assert!(err.is_page_local());
    }

    #[tokio::test]
    async fn blank_page_skips_the_service() {
        let classifier = Classifier::new(ScriptedService::new(vec![]), config(10, 10, None));

        let parsed = classifier
            .classify_page(&PageText::new(4, " \n "), &terms())
            .await
            .unwrap();
        assert!(parsed.is_empty());
        assert!(classifier.service().call_times().is_empty());
    }

    #[tokio::test]
    async fn http_client_retries_through_429() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant",
                    "content": "```json\n{\"T2\": [\"clause c\"], \"Other\": \"x\"}\n```"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            OpenAiCompatClient::new(&server.uri(), "test-key", Duration::from_secs(5)).unwrap();
        let classifier = Classifier::new(client, config(1, 4, None));

        let parsed = classifier
            .classify_page(&PageText::new(1, "The liability cap is unlimited."), &terms())
            .await
            .unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["T2"], vec!["clause c"]);
    }
}
