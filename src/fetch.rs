//! Polite, cached HTTP fetching
//!
//! Every outbound request goes through [`Fetcher`], which serves fresh bodies
//! from the response cache, spaces real requests by a randomized delay, rotates
//! the `User-Agent` header and backs off on HTTP 429.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use rand::Rng;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::CacheManager;

/// Browser agents rotated across requests
pub const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:123.0) Gecko/20100101 Firefox/123.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.4 Safari/605.1.15",
];

/// HTTP status signalling rate limiting
const TOO_MANY_REQUESTS: u16 = 429;

/// Per-request timeout for the reqwest transport
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when fetching a URL
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, timeout or body read failure; worth retrying later
    #[error("Network error requesting {url}: {message}")]
    TransientNetwork { url: String, message: String },

    /// Non-2xx status other than 429
    #[error("HTTP {status} for {url}")]
    Http { status: u16, url: String },

    /// Still rate limited after the retry cap
    #[error("Rate limited on {url} after {attempts} attempts")]
    RateLimitExceeded { url: String, attempts: u32 },
}

/// Status and body of a completed HTTP exchange
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// The network seam under [`Fetcher`]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs a single GET with the given headers
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<TransportResponse, FetchError>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FetchError::TransientNetwork {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    /// Create a transport around a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<TransportResponse, FetchError> {
        let network_error = |e: reqwest::Error| FetchError::TransientNetwork {
            url: url.to_string(),
            message: e.to_string(),
        };

        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(network_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(network_error)?;

        Ok(TransportResponse { status, body })
    }
}

/// Timing and retry knobs for [`Fetcher`]
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Lower bound of the randomized spacing between requests
    pub min_delay: Duration,
    /// Upper bound of the randomized spacing between requests
    pub max_delay: Duration,
    /// Maximum age of a cached body
    pub cache_ttl: Duration,
    /// Sleep after a 429 before retrying
    pub rate_limit_cooldown: Duration,
    /// Total attempts allowed while rate limited
    pub max_attempts: u32,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(10),
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            rate_limit_cooldown: Duration::from_secs(60),
            max_attempts: 5,
        }
    }
}

impl FetchPolicy {
    /// Picks a spacing delay uniformly within `[min_delay, max_delay]`
    pub fn pick_delay(&self) -> Duration {
        random_between(self.min_delay, self.max_delay)
    }
}

/// Uniform random duration between two bounds, in either order
///
/// Bounds beyond `u64::MAX` nanoseconds are clamped to it.
pub fn random_between(a: Duration, b: Duration) -> Duration {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    let low = u64::try_from(low.as_nanos()).unwrap_or(u64::MAX);
    let high = u64::try_from(high.as_nanos()).unwrap_or(u64::MAX);
    if low == high {
        return Duration::from_nanos(low);
    }
    Duration::from_nanos(rand::rng().random_range(low..=high))
}

/// Time of the last outbound request
#[derive(Debug, Default)]
pub struct RequestBudget {
    last_request: Option<Instant>,
}

impl RequestBudget {
    /// How long to wait at `now` so that `delay` separates two requests
    pub fn remaining(&self, delay: Duration, now: Instant) -> Duration {
        match self.last_request {
            Some(last) => delay.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    pub fn record(&mut self, at: Instant) {
        self.last_request = Some(at);
    }
}

/// A GET to issue through the [`Fetcher`]
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub allow_cache: bool,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            allow_cache: true,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn allow_cache(mut self, allow: bool) -> Self {
        self.allow_cache = allow;
        self
    }
}

/// Rate-limited, caching HTTP fetcher
///
/// Owns the response cache and the request budget. Requests are awaited one
/// at a time; sharing a `Fetcher` between concurrent tasks would still space
/// the requests but offers no ordering guarantees.
pub struct Fetcher {
    transport: Box<dyn Transport>,
    cache: Option<CacheManager>,
    policy: FetchPolicy,
    budget: Mutex<RequestBudget>,
    cache_enabled: bool,
}

impl Fetcher {
    pub fn new(
        transport: Box<dyn Transport>,
        cache: Option<CacheManager>,
        policy: FetchPolicy,
    ) -> Self {
        Self {
            transport,
            cache,
            policy,
            budget: Mutex::new(RequestBudget::default()),
            cache_enabled: true,
        }
    }

    /// Fetcher over the real network
    pub fn http(cache: Option<CacheManager>, policy: FetchPolicy) -> Result<Self, FetchError> {
        Ok(Self::new(Box::new(HttpTransport::new()?), cache, policy))
    }

    /// Skips cache reads for every request; bodies are still written back
    pub fn without_cache_reads(mut self) -> Self {
        self.cache_enabled = false;
        self
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Fetches `url`, serving it from cache while fresh
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.fetch_with(&FetchRequest::new(url)).await
    }

    /// Fetches a request with extra headers and explicit cache choice
    pub async fn fetch_with(&self, request: &FetchRequest) -> Result<String, FetchError> {
        let url = request.url.as_str();

        if request.allow_cache && self.cache_enabled {
            if let Some(ref cache) = self.cache {
                if let Some(cached) = cache.read(url, self.policy.cache_ttl) {
                    if !cached.is_expired {
                        debug!("Using cached response for {}", url);
                        return Ok(cached.body);
                    }
                }
            }
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            self.wait_for_turn().await;

            let mut headers = request.headers.clone();
            headers.push(("User-Agent".to_string(), pick_user_agent().to_string()));

            info!("Requesting {}", url);
            let result = self.transport.get(url, &headers).await;
            self.record_request();
            let response = result?;

            match response.status {
                TOO_MANY_REQUESTS => {
                    if attempts >= self.policy.max_attempts {
                        return Err(FetchError::RateLimitExceeded {
                            url: url.to_string(),
                            attempts,
                        });
                    }
                    warn!(
                        "Rate limited on {} (attempt {}/{}), waiting {:?}",
                        url, attempts, self.policy.max_attempts, self.policy.rate_limit_cooldown
                    );
                    tokio::time::sleep(self.policy.rate_limit_cooldown).await;
                }
                status if (200..300).contains(&status) => {
                    if let Some(ref cache) = self.cache {
                        if let Err(e) = cache.write(url, &response.body) {
                            warn!("Failed to cache response for {}: {}", url, e);
                        }
                    }
                    return Ok(response.body);
                }
                status => {
                    return Err(FetchError::Http {
                        status,
                        url: url.to_string(),
                    })
                }
            }
        }
    }

    /// Sleeps until a freshly drawn delay has passed since the last request
    async fn wait_for_turn(&self) {
        let delay = self.policy.pick_delay();
        let wait = self
            .budget
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remaining(delay, Instant::now());

        if !wait.is_zero() {
            debug!("Rate limiting: sleeping for {:.2}s", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }
    }

    fn record_request(&self) {
        self.budget
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(Instant::now());
    }
}

fn pick_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{quick_policy, MockTransport};
    use std::fs;
    use std::time::SystemTime;
    use tempfile::TempDir;

    const URL: &str = "https://fbref.com/en/squads/822bd0ba/Liverpool-Stats";

    fn fetcher_with(mock: &MockTransport, dir: &TempDir) -> Fetcher {
        Fetcher::new(
            Box::new(mock.clone()),
            Some(CacheManager::with_dir(dir.path().to_path_buf())),
            quick_policy(),
        )
    }

    #[tokio::test]
    async fn test_second_fetch_within_ttl_uses_cache() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mock = MockTransport::new();
        mock.respond(URL, 200, "<html>squad</html>");
        let fetcher = fetcher_with(&mock, &temp_dir);

        let first = fetcher.fetch(URL).await.expect("First fetch should succeed");
        let second = fetcher.fetch(URL).await.expect("Second fetch should succeed");

        assert_eq!(first, "<html>squad</html>");
        assert_eq!(second, first);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mock = MockTransport::new();
        mock.respond(URL, 200, "old");
        mock.respond(URL, 200, "new");
        let fetcher = fetcher_with(&mock, &temp_dir);

        fetcher.fetch(URL).await.expect("First fetch should succeed");

        let cache = CacheManager::with_dir(temp_dir.path().to_path_buf());
        let file = fs::File::options()
            .write(true)
            .open(cache.path_for(URL))
            .expect("Cache file should exist");
        file.set_modified(SystemTime::now() - fetcher.policy().cache_ttl * 2)
            .expect("Should set mtime");

        let body = fetcher.fetch(URL).await.expect("Refetch should succeed");
        assert_eq!(body, "new");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_allow_cache_false_bypasses_fresh_entry() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mock = MockTransport::new();
        mock.respond(URL, 200, "body");
        let fetcher = fetcher_with(&mock, &temp_dir);

        fetcher.fetch(URL).await.expect("First fetch should succeed");
        fetcher
            .fetch_with(&FetchRequest::new(URL).allow_cache(false))
            .await
            .expect("Uncached fetch should succeed");

        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_then_success_retries() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mock = MockTransport::new();
        mock.respond(URL, 429, "");
        mock.respond(URL, 200, "finally");
        let fetcher = fetcher_with(&mock, &temp_dir);

        let body = fetcher.fetch(URL).await.expect("Retry should succeed");

        assert_eq!(body, "finally");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_persistent_rate_limit_stops_at_cap() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mock = MockTransport::new();
        mock.respond(URL, 429, "");
        let fetcher = fetcher_with(&mock, &temp_dir);

        let err = fetcher.fetch(URL).await.expect_err("Should give up");

        match err {
            FetchError::RateLimitExceeded { attempts, .. } => assert_eq!(attempts, 5),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(mock.call_count(), 5);
    }

    #[tokio::test]
    async fn test_http_error_is_not_cached() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mock = MockTransport::new();
        mock.respond(URL, 500, "oops");
        let fetcher = fetcher_with(&mock, &temp_dir);

        let err = fetcher.fetch(URL).await.expect_err("Should fail");

        assert!(matches!(err, FetchError::Http { status: 500, .. }));
        let cache = CacheManager::with_dir(temp_dir.path().to_path_buf());
        assert!(!cache.path_for(URL).exists());
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_transient() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mock = MockTransport::new();
        mock.fail(URL, "connection reset");
        let fetcher = fetcher_with(&mock, &temp_dir);

        let err = fetcher.fetch(URL).await.expect_err("Should fail");

        assert!(matches!(err, FetchError::TransientNetwork { .. }));
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_user_agent_comes_from_pool_and_headers_are_forwarded() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mock = MockTransport::new();
        mock.respond(URL, 200, "{}");
        let fetcher = fetcher_with(&mock, &temp_dir);

        fetcher
            .fetch_with(&FetchRequest::new(URL).header("X-Auth-Token", "secret"))
            .await
            .expect("Fetch should succeed");

        let headers = mock.last_headers().expect("Should record headers");
        let agent = headers
            .iter()
            .find(|(name, _)| name == "User-Agent")
            .map(|(_, value)| value.as_str())
            .expect("User-Agent should be set");
        assert!(USER_AGENTS.contains(&agent));
        assert!(headers
            .iter()
            .any(|(name, value)| name == "X-Auth-Token" && value == "secret"));
    }

    #[tokio::test]
    async fn test_without_cache_reads_still_writes_back() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mock = MockTransport::new();
        mock.respond(URL, 200, "body");
        let fetcher = fetcher_with(&mock, &temp_dir).without_cache_reads();

        fetcher.fetch(URL).await.expect("First fetch should succeed");
        fetcher.fetch(URL).await.expect("Second fetch should succeed");

        assert_eq!(mock.call_count(), 2);
        let cache = CacheManager::with_dir(temp_dir.path().to_path_buf());
        assert!(cache.path_for(URL).exists());
    }

    #[test]
    fn test_budget_first_request_does_not_wait() {
        let budget = RequestBudget::default();
        assert_eq!(
            budget.remaining(Duration::from_secs(5), Instant::now()),
            Duration::ZERO
        );
    }

    #[test]
    fn test_budget_waits_for_remainder() {
        let mut budget = RequestBudget::default();
        let start = Instant::now();
        budget.record(start);

        let wait = budget.remaining(Duration::from_secs(5), start + Duration::from_secs(2));
        assert_eq!(wait, Duration::from_secs(3));

        let wait = budget.remaining(Duration::from_secs(5), start + Duration::from_secs(7));
        assert_eq!(wait, Duration::ZERO);
    }

    #[test]
    fn test_pick_delay_stays_in_window() {
        let policy = FetchPolicy {
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(200),
            ..FetchPolicy::default()
        };
        for _ in 0..50 {
            let delay = policy.pick_delay();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(200));
        }
    }

    #[test]
    fn test_pick_delay_tolerates_swapped_bounds() {
        let policy = FetchPolicy {
            min_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(1),
            ..FetchPolicy::default()
        };
        let delay = policy.pick_delay();
        assert!(delay >= Duration::from_secs(1) && delay <= Duration::from_secs(3));
    }

    #[test]
    fn test_random_between_clamps_huge_bounds() {
        let delay = random_between(Duration::MAX, Duration::from_secs(1));
        assert!(delay >= Duration::from_secs(1));
        assert!(delay <= Duration::from_nanos(u64::MAX));

        let pinned = random_between(Duration::MAX, Duration::MAX);
        assert_eq!(pinned, Duration::from_nanos(u64::MAX));
    }

    #[test]
    fn test_default_policy_values() {
        let policy = FetchPolicy::default();
        assert_eq!(policy.min_delay, Duration::from_secs(5));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert_eq!(policy.cache_ttl, Duration::from_secs(86_400));
        assert_eq!(policy.rate_limit_cooldown, Duration::from_secs(60));
        assert_eq!(policy.max_attempts, 5);
    }
}
