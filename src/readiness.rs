//! Readiness probing with a bounded retry loop.
//!
//! A probe is invoked immediately and then once per interval until it
//! succeeds. The timeout is checked after each failure, before waiting: once
//! it has been exceeded the last probe error is returned as-is, so callers
//! always see why the container was not ready rather than a bare timeout.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::error::ProbeError;

/// Wait between failed probe attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// What a probe knows about the container it is checking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessContext {
    pub host: String,
    pub port: u16,
    /// The container was already running with the right image before this
    /// handle first reconciled it.
    pub was_already_running: bool,
}

/// Decides whether a running container is ready to serve traffic.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn check(&self, ctx: &ReadinessContext) -> Result<(), ProbeError>;
}

/// Probe backed by an async closure. Build with [`probe_fn`].
pub struct FnProbe<F> {
    f: F,
}

/// Wrap an async closure as a [`ReadinessProbe`].
///
/// ```rust,no_run
/// use docker_starter::readiness::{probe_fn, ReadinessContext};
/// use docker_starter::ProbeError;
///
/// let probe = probe_fn(|ctx: ReadinessContext| async move {
///     if ctx.port == 0 {
///         return Err(ProbeError::new("no port"));
///     }
///     Ok(())
/// });
/// ```
pub fn probe_fn<F, Fut>(f: F) -> FnProbe<F>
where
    F: Fn(ReadinessContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ProbeError>> + Send + 'static,
{
    FnProbe { f }
}

#[async_trait]
impl<F, Fut> ReadinessProbe for FnProbe<F>
where
    F: Fn(ReadinessContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ProbeError>> + Send + 'static,
{
    async fn check(&self, ctx: &ReadinessContext) -> Result<(), ProbeError> {
        (self.f)(ctx.clone()).await
    }
}

/// Ready once a TCP connection can be opened.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    connect_timeout: Duration,
}

impl TcpProbe {
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
        }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadinessProbe for TcpProbe {
    async fn check(&self, ctx: &ReadinessContext) -> Result<(), ProbeError> {
        let addr = (ctx.host.as_str(), ctx.port);
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ProbeError::new(format!(
                "connect to {}:{} failed: {e}",
                ctx.host, ctx.port
            ))),
            Err(_) => Err(ProbeError::new(format!(
                "connect to {}:{} timed out",
                ctx.host, ctx.port
            ))),
        }
    }
}

/// Ready once `GET http://host:port/path` returns a 2xx status.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    path: String,
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(path: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            path: path.into(),
            client,
        }
    }

    fn url(&self, ctx: &ReadinessContext) -> String {
        format!(
            "http://{}:{}/{}",
            ctx.host,
            ctx.port,
            self.path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl ReadinessProbe for HttpProbe {
    async fn check(&self, ctx: &ReadinessContext) -> Result<(), ProbeError> {
        let url = self.url(ctx);
        let response = self.client.get(&url).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProbeError::new(format!(
                "GET {url} returned {}",
                response.status()
            )))
        }
    }
}

/// Terminal outcome of a readiness poll that never succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollFailure {
    /// Number of probe invocations.
    pub attempts: u32,
    /// Error from the final attempt.
    pub last_error: ProbeError,
}

/// Runs a probe until it succeeds or the timeout is exceeded.
#[derive(Debug, Clone)]
pub struct ReadinessPoller {
    interval: Duration,
}

impl ReadinessPoller {
    pub fn new() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Poll `probe` until it succeeds, returning the number of attempts.
    pub async fn poll_with_timeout(
        &self,
        probe: &dyn ReadinessProbe,
        ctx: &ReadinessContext,
        timeout: Duration,
    ) -> Result<u32, PollFailure> {
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match probe.check(ctx).await {
                Ok(()) => {
                    tracing::debug!(attempts, "Readiness probe succeeded");
                    return Ok(attempts);
                }
                Err(e) => {
                    if started.elapsed() > timeout {
                        return Err(PollFailure {
                            attempts,
                            last_error: e,
                        });
                    }
                    tracing::debug!(attempt = attempts, error = %e, "Readiness probe failed, retrying");
                    tokio::time::sleep(self.interval).await;
                }
            }
        }
    }
}

impl Default for ReadinessPoller {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn ctx() -> ReadinessContext {
        ReadinessContext {
            host: "127.0.0.1".to_string(),
            port: 8080,
            was_already_running: false,
        }
    }

    /// Fails until the given attempt, then succeeds.
    fn succeeds_on(attempt: u32) -> (impl ReadinessProbe, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let probe = probe_fn(move |_ctx| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(if n >= attempt {
                Ok(())
            } else {
                Err(ProbeError::new(format!("attempt {n} not ready")))
            })
        });
        (probe, calls)
    }

    fn assert_elapsed_near(started: Instant, expected: Duration) {
        let elapsed = started.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(50),
            "elapsed {elapsed:?}, expected about {expected:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success() {
        let (probe, calls) = succeeds_on(1);
        let started = Instant::now();

        let attempts = ReadinessPoller::new()
            .poll_with_timeout(&probe, &ctx(), Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_elapsed_near(started, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let (probe, calls) = succeeds_on(4);
        let started = Instant::now();

        let attempts = ReadinessPoller::new()
            .poll_with_timeout(&probe, &ctx(), Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // Three one-second waits between four attempts.
        assert_elapsed_near(started, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_surfaces_last_probe_error() {
        let (probe, calls) = succeeds_on(u32::MAX);
        let started = Instant::now();

        let failure = ReadinessPoller::new()
            .poll_with_timeout(&probe, &ctx(), Duration::from_secs(5))
            .await
            .unwrap_err();

        let calls = calls.load(Ordering::SeqCst);
        assert_eq!(failure.attempts, calls);
        assert_eq!(
            failure.last_error.message(),
            format!("attempt {calls} not ready")
        );
        // One attempt per second until the first failure past the 5s mark.
        assert!((6..=7).contains(&calls), "unexpected attempt count {calls}");
        let elapsed = started.elapsed();
        assert!(elapsed > Duration::from_secs(5) && elapsed < Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_still_retries_once() {
        let (probe, calls) = succeeds_on(u32::MAX);

        let failure = ReadinessPoller::new()
            .poll_with_timeout(&probe, &ctx(), Duration::ZERO)
            .await
            .unwrap_err();

        assert_eq!(failure.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_interval() {
        let (probe, _calls) = succeeds_on(3);
        let started = Instant::now();

        ReadinessPoller::new()
            .with_interval(Duration::from_millis(250))
            .poll_with_timeout(&probe, &ctx(), Duration::from_secs(30))
            .await
            .unwrap();

        assert_elapsed_near(started, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_probe_receives_context() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let sink = seen.clone();
        let probe = probe_fn(move |ctx: ReadinessContext| {
            let sink = sink.clone();
            async move {
                *sink.lock().unwrap() = Some(ctx);
                Ok::<(), ProbeError>(())
            }
        });

        let expected = ReadinessContext {
            host: "10.0.0.2".to_string(),
            port: 5432,
            was_already_running: true,
        };
        probe.check(&expected).await.unwrap();
        assert_eq!(seen.lock().unwrap().clone(), Some(expected));
    }

    #[tokio::test]
    async fn test_tcp_probe() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = TcpProbe::new();

        let ctx = ReadinessContext {
            host: "127.0.0.1".to_string(),
            port,
            was_already_running: false,
        };
        assert!(probe.check(&ctx).await.is_ok());

        drop(listener);
        let err = probe.check(&ctx).await.unwrap_err();
        assert!(err.message().contains(&format!("127.0.0.1:{port}")));
    }

    #[test]
    fn test_http_probe_url() {
        let probe = HttpProbe::new("/health");
        assert_eq!(probe.url(&ctx()), "http://127.0.0.1:8080/health");

        let probe = HttpProbe::new("");
        assert_eq!(probe.url(&ctx()), "http://127.0.0.1:8080/");
    }
}
