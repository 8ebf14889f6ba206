//! Page extraction: one page image in, one fragment (or nothing) out.
//!
//! ## Retry Strategy
//!
//! Only failures where no answer arrived are retried: transport errors,
//! per-call timeouts and rate limits. The wait is `retry_backoff_ms * 2^n`,
//! stretched to the provider's retry-after hint when one is given. An answer
//! that arrived but could not be decoded is final for that page; asking again
//! costs a full page of image tokens and rarely changes the outcome.

use crate::config::ExtractionConfig;
use crate::document::{DocumentType, PageImage};
use crate::error::{ModelError, PageError};
use crate::fragment::{IncorporationFragment, PageFragment, SanctionsFragment};
use crate::output::PageOutcome;
use crate::pipeline::llm::{ModelReply, VisionModel};
use crate::prompts::{page_instruction, DEFAULT_SYSTEM_PROMPT};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Retry and timeout settings for one page.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub api_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_ms: config.retry_backoff_ms,
            api_timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Exponential backoff, stretched to a server Retry-After hint. The hint
    /// is capped at `api_timeout` so one bogus header cannot park a page.
    fn delay(&self, attempt: u32, failure: &Failure) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let backoff = Duration::from_millis(self.backoff_ms.saturating_mul(1u64 << exp));
        let hinted = match failure {
            Failure::Model(ModelError::RateLimited {
                retry_after_secs: Some(secs),
                ..
            }) => Duration::from_secs(*secs).min(self.api_timeout),
            _ => Duration::ZERO,
        };
        backoff.max(hinted)
    }
}

/// Why an attempt produced no answer.
enum Failure {
    Model(ModelError),
    Timeout,
}

/// A page's outcome plus the fragment it contributed, if any.
#[derive(Debug, Clone)]
pub struct PageRun {
    pub outcome: PageOutcome,
    pub fragment: Option<PageFragment>,
}

/// Queries the vision model for single pages of one document type.
///
/// Holds the injected model; construct once per request and share across
/// page tasks.
pub struct PageExtractor {
    model: Arc<dyn VisionModel>,
    system_prompt: String,
}

impl PageExtractor {
    pub fn new(model: Arc<dyn VisionModel>, system_prompt: Option<&str>) -> Self {
        Self {
            model,
            system_prompt: system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT).to_string(),
        }
    }

    /// Extract one page with exactly one model request.
    ///
    /// `Ok(None)` means the page is blank. Rate limits come back as
    /// [`PageError::RateLimitExceeded`], distinct from malformed answers.
    pub async fn extract(
        &self,
        image: &PageImage,
        document_type: DocumentType,
    ) -> Result<Option<PageFragment>, PageError> {
        let reply = self
            .model
            .submit(image, &self.system_prompt, page_instruction(document_type))
            .await
            .map_err(|e| model_failure(image.page_num, 0, Failure::Model(e), 0))?;
        decode_reply(&reply, image.page_num, document_type)
    }

    /// Extract one page, retrying while no answer arrives.
    pub async fn extract_with_retry(
        &self,
        image: &PageImage,
        document_type: DocumentType,
        policy: &RetryPolicy,
    ) -> PageRun {
        let start = Instant::now();
        let page_num = image.page_num;
        let instruction = page_instruction(document_type);

        let mut attempt = 0u32;
        let answer = loop {
            let call = self.model.submit(image, &self.system_prompt, instruction);
            let failure = match timeout(policy.api_timeout, call).await {
                Ok(Ok(reply)) => break Ok(reply),
                Ok(Err(e)) => Failure::Model(e),
                Err(_) => Failure::Timeout,
            };

            if attempt >= policy.max_retries {
                break Err(failure);
            }
            attempt += 1;
            let wait = policy.delay(attempt, &failure);
            warn!(
                "Page {}: {}; retry {}/{} after {}ms",
                page_num,
                describe(&failure),
                attempt,
                policy.max_retries,
                wait.as_millis()
            );
            sleep(wait).await;
        };

        let mut outcome = PageOutcome {
            page_num,
            produced_fragment: false,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
            retries: attempt,
            error: None,
        };

        let fragment = match answer {
            Ok(reply) => {
                outcome.input_tokens = reply.input_tokens;
                outcome.output_tokens = reply.output_tokens;
                match decode_reply(&reply, page_num, document_type) {
                    Ok(fragment) => fragment,
                    Err(e) => {
                        outcome.error = Some(e);
                        None
                    }
                }
            }
            Err(failure) => {
                let secs = policy.api_timeout.as_secs();
                outcome.error = Some(model_failure(page_num, attempt, failure, secs));
                None
            }
        };

        outcome.produced_fragment = fragment.is_some();
        outcome.duration_ms = start.elapsed().as_millis() as u64;
        PageRun { outcome, fragment }
    }
}

fn describe(failure: &Failure) -> String {
    match failure {
        Failure::Model(e) => e.to_string(),
        Failure::Timeout => "timed out".to_string(),
    }
}

fn model_failure(page: usize, retries: u32, failure: Failure, timeout_secs: u64) -> PageError {
    match failure {
        Failure::Model(ModelError::RateLimited {
            retry_after_secs, ..
        }) => PageError::RateLimitExceeded {
            page,
            retries,
            retry_after_secs,
        },
        Failure::Model(ModelError::Transport(detail)) => PageError::Transport {
            page,
            retries,
            detail,
        },
        Failure::Timeout => PageError::Timeout {
            page,
            secs: timeout_secs,
        },
    }
}

fn decode_reply(
    reply: &ModelReply,
    page: usize,
    document_type: DocumentType,
) -> Result<Option<PageFragment>, PageError> {
    match reply.content.as_deref() {
        None => {
            debug!("Page {}: empty answer, treating as blank", page);
            Ok(None)
        }
        Some(raw) => {
            let parsed = parse_page_response(raw, page, document_type);
            if let Err(ref e) = parsed {
                warn!("{} (raw: {:.200})", e, raw);
            }
            parsed
        }
    }
}

static FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\s*```$").unwrap());

/// Remove a surrounding markdown code fence, if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    match FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}

/// Turn a raw model answer into a fragment.
///
/// Blank answers (and a bare JSON `null`) are blank pages. Anything that is
/// not JSON, not the container the document type expects, or not decodable
/// into its fields is a [`PageError::MalformedExtraction`] carrying the raw
/// text.
pub fn parse_page_response(
    raw: &str,
    page: usize,
    document_type: DocumentType,
) -> Result<Option<PageFragment>, PageError> {
    let malformed = |detail: String| PageError::MalformedExtraction {
        page,
        detail,
        raw: raw.to_string(),
    };

    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Ok(None);
    }

    let value: Value =
        serde_json::from_str(body).map_err(|e| malformed(format!("invalid JSON: {e}")))?;
    if value.is_null() {
        return Ok(None);
    }

    let fragment = match document_type {
        DocumentType::IncorporationRecord => {
            if !value.is_object() {
                return Err(malformed("expected a JSON object".into()));
            }
            let f: IncorporationFragment = serde_json::from_value(value)
                .map_err(|e| malformed(format!("unexpected field shape: {e}")))?;
            PageFragment::Incorporation(f)
        }
        DocumentType::SanctionsList => {
            let has_entries = value
                .as_object()
                .and_then(|o| o.get("entries"))
                .is_some_and(Value::is_array);
            if !has_entries {
                return Err(malformed("expected an object with an \"entries\" array".into()));
            }
            let f: SanctionsFragment = serde_json::from_value(value)
                .map_err(|e| malformed(format!("unexpected field shape: {e}")))?;
            PageFragment::Sanctions(f)
        }
    };

    debug!("Page {}: decoded {} fragment", page, document_type);
    Ok(Some(fragment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const ACTA: DocumentType = DocumentType::IncorporationRecord;
    const LPB: DocumentType = DocumentType::SanctionsList;

    #[test]
    fn strips_fences() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  ```\n{}\n```  "), "{}");
        assert_eq!(strip_code_fence("```{}```"), "{}");
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn blank_answers_are_blank_pages() {
        assert_eq!(parse_page_response("", 1, ACTA).unwrap(), None);
        assert_eq!(parse_page_response("  \n", 1, LPB).unwrap(), None);
        assert_eq!(parse_page_response("```json\n```", 1, ACTA).unwrap(), None);
        assert_eq!(parse_page_response("null", 1, ACTA).unwrap(), None);
    }

    #[test]
    fn fenced_incorporation_page_decodes() {
        let raw = "```json\n{\"companyName\": \"Acme SA\", \"partners\": []}\n```";
        let f = parse_page_response(raw, 2, ACTA).unwrap().unwrap();
        match f {
            PageFragment::Incorporation(p) => assert_eq!(p.company_name.as_deref(), Some("Acme SA")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invalid_json_is_malformed_with_raw() {
        let err = parse_page_response("Lo siento, no puedo leer la imagen.", 4, ACTA).unwrap_err();
        match err {
            PageError::MalformedExtraction { page, raw, .. } => {
                assert_eq!(page, 4);
                assert!(raw.contains("Lo siento"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn wrong_container_is_malformed() {
        assert!(matches!(
            parse_page_response("[1, 2]", 1, ACTA),
            Err(PageError::MalformedExtraction { .. })
        ));
        assert!(matches!(
            parse_page_response("{\"fullName\": \"X\"}", 1, LPB),
            Err(PageError::MalformedExtraction { .. })
        ));
        assert!(matches!(
            parse_page_response("{\"entries\": {}}", 1, LPB),
            Err(PageError::MalformedExtraction { .. })
        ));
    }

    #[test]
    fn empty_entries_is_a_fragment() {
        let f = parse_page_response("{\"entries\": []}", 1, LPB).unwrap();
        assert_eq!(
            f,
            Some(PageFragment::Sanctions(SanctionsFragment { entries: vec![] }))
        );
    }

    /// Plays back a fixed list of answers.
    struct Scripted {
        replies: Mutex<VecDeque<Result<ModelReply, ModelError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(replies: Vec<Result<ModelReply, ModelError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl VisionModel for Scripted {
        async fn submit(&self, _: &PageImage, _: &str, _: &str) -> Result<ModelReply, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ModelError::Transport("script exhausted".into())))
        }
    }

    fn page() -> PageImage {
        PageImage::new(1, vec![0u8; 4], "image/png")
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_ms: 1,
            api_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn single_extract_makes_one_call() {
        let model = Scripted::new(vec![Ok(ModelReply::text("{\"companyName\": \"Acme\"}"))]);
        let extractor = PageExtractor::new(model.clone(), None);
        let f = extractor.extract(&page(), ACTA).await.unwrap();
        assert!(f.is_some());
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn single_extract_reports_rate_limit() {
        let model = Scripted::new(vec![Err(ModelError::RateLimited {
            detail: "429".into(),
            retry_after_secs: Some(3),
        })]);
        let extractor = PageExtractor::new(model, None);
        let err = extractor.extract(&page(), LPB).await.unwrap_err();
        assert!(matches!(
            err,
            PageError::RateLimitExceeded {
                retry_after_secs: Some(3),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn transport_errors_are_retried() {
        let model = Scripted::new(vec![
            Err(ModelError::Transport("reset".into())),
            Ok(ModelReply {
                content: Some("{\"entries\": [{\"fullName\": \"X\"}]}".into()),
                input_tokens: 900,
                output_tokens: 40,
            }),
        ]);
        let extractor = PageExtractor::new(model.clone(), None);
        let run = extractor.extract_with_retry(&page(), LPB, &fast_policy(2)).await;
        assert!(run.fragment.is_some());
        assert!(run.outcome.error.is_none());
        assert_eq!(run.outcome.retries, 1);
        assert_eq!(run.outcome.input_tokens, 900);
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn malformed_answer_is_not_retried() {
        let model = Scripted::new(vec![
            Ok(ModelReply::text("not json")),
            Ok(ModelReply::text("{}")),
        ]);
        let extractor = PageExtractor::new(model.clone(), None);
        let run = extractor.extract_with_retry(&page(), ACTA, &fast_policy(3)).await;
        assert!(matches!(
            run.outcome.error,
            Some(PageError::MalformedExtraction { .. })
        ));
        assert!(!run.outcome.produced_fragment);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn persistent_rate_limit_exhausts_retries() {
        let limited = || {
            Err(ModelError::RateLimited {
                detail: "429".into(),
                retry_after_secs: None,
            })
        };
        let model = Scripted::new(vec![limited(), limited(), limited()]);
        let extractor = PageExtractor::new(model.clone(), None);
        let run = extractor.extract_with_retry(&page(), ACTA, &fast_policy(2)).await;
        assert!(matches!(
            run.outcome.error,
            Some(PageError::RateLimitExceeded { retries: 2, .. })
        ));
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        struct Slow;

        #[async_trait]
        impl VisionModel for Slow {
            async fn submit(&self, _: &PageImage, _: &str, _: &str) -> Result<ModelReply, ModelError> {
                sleep(Duration::from_secs(30)).await;
                Ok(ModelReply::default())
            }
        }

        let extractor = PageExtractor::new(Arc::new(Slow), None);
        let policy = RetryPolicy {
            max_retries: 0,
            backoff_ms: 1,
            api_timeout: Duration::from_millis(20),
        };
        let run = extractor.extract_with_retry(&page(), ACTA, &policy).await;
        assert!(matches!(run.outcome.error, Some(PageError::Timeout { .. })));
    }

    #[test]
    fn retry_after_hint_stretches_delay() {
        let policy = fast_policy(3);
        let hinted = Failure::Model(ModelError::RateLimited {
            detail: String::new(),
            retry_after_secs: Some(2),
        });
        assert_eq!(policy.delay(1, &hinted), Duration::from_secs(2));
        assert_eq!(policy.delay(3, &Failure::Timeout), Duration::from_millis(4));
    }

    #[test]
    fn retry_after_hint_is_capped_by_api_timeout() {
        let policy = RetryPolicy {
            max_retries: 2,
            backoff_ms: 10,
            api_timeout: Duration::from_secs(5),
        };
        let day = Failure::Model(ModelError::RateLimited {
            detail: "retry after 86400".into(),
            retry_after_secs: Some(86_400),
        });
        assert_eq!(policy.delay(1, &day), Duration::from_secs(5));
    }
}
