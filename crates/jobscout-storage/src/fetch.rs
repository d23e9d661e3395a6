//! The fetch primitive: cache lookup, retried plain or rendered fetch, cache fill.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info_span, warn, Instrument};

use crate::cache::ResponseCache;
use crate::http::{random_user_agent, BackoffPolicy, FetchError, HttpTransport, RetryDisposition};
use crate::render::PageRenderer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Plain,
    Render,
}

pub struct Fetcher {
    transport: Arc<dyn HttpTransport>,
    renderer: Option<Arc<dyn PageRenderer>>,
    cache: Option<ResponseCache>,
    backoff: BackoffPolicy,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("has_renderer", &self.renderer.is_some())
            .field("cache", &self.cache)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl Fetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, backoff: BackoffPolicy) -> Self {
        Self {
            transport,
            renderer: None,
            cache: None,
            backoff,
        }
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// Return the body for `url`, from cache when fresh, otherwise from the
    /// network with retries. Only successful bodies are cached.
    pub async fn fetch(&self, url: &str, mode: FetchMode) -> Result<String, FetchError> {
        if let Some(cache) = &self.cache {
            if let Some(body) = cache.get(url).await {
                return Ok(body);
            }
        }

        let body = match mode {
            FetchMode::Plain => {
                let transport = self.transport.clone();
                self.with_retries(url, "http", || {
                    let transport = transport.clone();
                    let user_agent = random_user_agent();
                    async move { transport.get(url, user_agent).await }
                })
                .instrument(info_span!("http_fetch", url))
                .await?
            }
            FetchMode::Render => {
                let renderer = self.renderer.clone().ok_or_else(|| {
                    FetchError::RendererUnavailable {
                        url: url.to_string(),
                    }
                })?;
                self.with_retries(url, "render", || {
                    let renderer = renderer.clone();
                    let user_agent = random_user_agent();
                    async move { renderer.render(url, user_agent).await }
                })
                .instrument(info_span!("render_fetch", url))
                .await?
            }
        };

        if let Some(cache) = &self.cache {
            cache.put(url, &body).await;
        }
        Ok(body)
    }

    /// Reachability check for telemetry; never an error.
    pub async fn probe(&self, url: &str) -> bool {
        match self.transport.probe(url, random_user_agent()).await {
            Ok(status) => {
                let ok = status < 400;
                debug!(url, status, ok, "probe finished");
                ok
            }
            Err(err) => {
                warn!(url, error = %err, "probe failed");
                false
            }
        }
    }

    async fn with_retries<F, Fut>(
        &self,
        url: &str,
        label: &'static str,
        mut attempt_fn: F,
    ) -> Result<String, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String, FetchError>>,
    {
        let attempts = self.backoff.max_retries + 1;
        let mut attempt = 0usize;
        loop {
            let err = match attempt_fn().await {
                Ok(body) => return Ok(body),
                Err(err) => err,
            };
            if err.disposition() == RetryDisposition::NonRetryable {
                warn!(url, label, error = %err, "non-retryable fetch failure");
                return Err(err);
            }
            attempt += 1;
            if attempt >= attempts {
                warn!(url, label, attempts, error = %err, "all fetch attempts failed");
                return Err(FetchError::Exhausted {
                    url: url.to_string(),
                    attempts,
                    last: Box::new(err),
                });
            }
            let wait = self.backoff.jittered_delay_for_attempt(attempt - 1);
            warn!(
                url,
                label,
                attempt,
                attempts,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "fetch attempt failed; retrying"
            );
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheBackend;
    use crate::DEFAULT_CACHE_TTL;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<String, u16>>>,
        calls: AtomicUsize,
        user_agents: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<&str, u16>>) -> Self {
            Self {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|r| r.map(ToString::to_string))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
                user_agents: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn get(&self, url: &str, user_agent: &str) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.user_agents.lock().unwrap().push(user_agent.to_string());
            let next = self.responses.lock().unwrap().pop_front().unwrap_or(Err(503));
            next.map_err(|status| FetchError::HttpStatus {
                status,
                url: url.to_string(),
            })
        }

        async fn probe(&self, _url: &str, _user_agent: &str) -> Result<u16, FetchError> {
            Ok(200)
        }
    }

    struct FlakyRenderer {
        failures_left: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PageRenderer for FlakyRenderer {
        async fn render(&self, url: &str, _user_agent: &str) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(FetchError::Render {
                    url: url.to_string(),
                    message: "session crashed".into(),
                });
            }
            Ok("<html>rendered</html>".into())
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let transport = Arc::new(ScriptedTransport::new(vec![Err(503), Err(429), Ok("body")]));
        let fetcher = Fetcher::new(transport.clone(), BackoffPolicy::immediate(3));

        let body = fetcher.fetch("https://example.test/jobs", FetchMode::Plain).await.unwrap();
        assert_eq!(body, "body");
        assert_eq!(transport.calls(), 3);
        for ua in transport.user_agents.lock().unwrap().iter() {
            assert!(crate::http::USER_AGENTS.contains(&ua.as_str()));
        }
    }

    #[tokio::test]
    async fn exhausting_retries_yields_exhausted_and_caches_nothing() {
        let transport = Arc::new(ScriptedTransport::new(vec![Err(500), Err(500), Err(500)]));
        let backend = Arc::new(MemoryCacheBackend::new());
        let fetcher = Fetcher::new(transport.clone(), BackoffPolicy::immediate(2))
            .with_cache(ResponseCache::new(backend.clone(), DEFAULT_CACHE_TTL));

        let err = fetcher.fetch("https://example.test/down", FetchMode::Plain).await.unwrap_err();
        assert!(matches!(err, FetchError::Exhausted { attempts: 3, .. }));
        assert_eq!(transport.calls(), 3);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn client_error_statuses_are_retried() {
        let transport = Arc::new(ScriptedTransport::new(vec![Err(404), Err(401), Ok("body")]));
        let fetcher = Fetcher::new(transport.clone(), BackoffPolicy::immediate(3));
        let body = fetcher.fetch("https://example.test/jobs", FetchMode::Plain).await.unwrap();
        assert_eq!(body, "body");
        assert_eq!(transport.calls(), 3);

        let transport = Arc::new(ScriptedTransport::new(vec![Err(404); 4]));
        let fetcher = Fetcher::new(transport.clone(), BackoffPolicy::immediate(3));
        let err = fetcher.fetch("https://example.test/missing", FetchMode::Plain).await.unwrap_err();
        assert!(matches!(err, FetchError::Exhausted { attempts: 4, .. }));
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test]
    async fn cache_hit_skips_network_and_expiry_refetches() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok("v1"), Ok("v2")]));
        let backend = Arc::new(MemoryCacheBackend::new());
        let fetcher = Fetcher::new(transport.clone(), BackoffPolicy::immediate(0))
            .with_cache(ResponseCache::new(backend.clone(), DEFAULT_CACHE_TTL));
        let url = "https://example.test/cached";

        assert_eq!(fetcher.fetch(url, FetchMode::Plain).await.unwrap(), "v1");
        assert_eq!(fetcher.fetch(url, FetchMode::Plain).await.unwrap(), "v1");
        assert_eq!(transport.calls(), 1);

        backend.backdate(url, chrono::Duration::hours(12));
        assert_eq!(fetcher.fetch(url, FetchMode::Plain).await.unwrap(), "v2");
        assert_eq!(transport.calls(), 2);
        assert_eq!(backend.entry_for(url).unwrap().body, "v2");
    }

    #[tokio::test]
    async fn works_without_a_cache() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok("a"), Ok("b")]));
        let fetcher = Fetcher::new(transport.clone(), BackoffPolicy::immediate(0));
        assert_eq!(fetcher.fetch("u", FetchMode::Plain).await.unwrap(), "a");
        assert_eq!(fetcher.fetch("u", FetchMode::Plain).await.unwrap(), "b");
    }

    #[tokio::test]
    async fn render_mode_retries_sessions_and_fills_cache() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let renderer = Arc::new(FlakyRenderer {
            failures_left: AtomicUsize::new(2),
            calls: AtomicUsize::new(0),
        });
        let backend = Arc::new(MemoryCacheBackend::new());
        let fetcher = Fetcher::new(transport.clone(), BackoffPolicy::immediate(3))
            .with_renderer(renderer.clone())
            .with_cache(ResponseCache::new(backend.clone(), DEFAULT_CACHE_TTL));

        let body = fetcher.fetch("https://spa.test/jobs", FetchMode::Render).await.unwrap();
        assert_eq!(body, "<html>rendered</html>");
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 3);
        assert_eq!(transport.calls(), 0);
        assert!(backend.entry_for("https://spa.test/jobs").is_some());
    }

    #[tokio::test]
    async fn render_mode_without_renderer_is_an_error() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let fetcher = Fetcher::new(transport, BackoffPolicy::immediate(1));
        let err = fetcher.fetch("https://spa.test", FetchMode::Render).await.unwrap_err();
        assert!(matches!(err, FetchError::RendererUnavailable { .. }));
    }
}
