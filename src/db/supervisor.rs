//! Startup connection handling for the three backends.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;
use tracing::{error, info, warn};

use super::{
    Backend, Backends, DocumentStore, GraphStore, InfluxTimeSeries, Neo4jGraph, SqliteDocuments,
    TimeSeriesStore,
};
use crate::config::{Config, SupervisorConfig};
use crate::error::BackendError;

/// Bounded connection retry: `attempts` tries in total, `delay` apart.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    fn strategy(&self) -> impl Iterator<Item = Duration> {
        // The first attempt is not a retry.
        FixedInterval::new(self.delay).take(self.attempts.saturating_sub(1))
    }
}

impl From<&SupervisorConfig> for RetryPolicy {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            attempts: config.connect_attempts.max(1),
            delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

/// Connects every backend once at startup.
///
/// A backend that fails all attempts stays [`Backend::Unavailable`] for the
/// rest of the process; nothing reconnects per request.
pub struct ConnectionSupervisor {
    policy: RetryPolicy,
}

impl ConnectionSupervisor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub async fn connect_all(&self, config: &Config) -> Backends {
        let document = &config.document;
        let timeseries = &config.timeseries;
        let graph = &config.graph;

        // Only the document store is probed. The HTTP backends are live once
        // their client is built and their errors surface at query time.
        let (document, timeseries, graph) = tokio::join!(
            connect_with_retry("document", &self.policy, move || async move {
                let store =
                    SqliteDocuments::connect(&document.url, document.max_connections).await?;
                store.ping().await?;
                store.ensure_indexes().await?;
                Ok::<_, BackendError>(Arc::new(store) as Arc<dyn DocumentStore>)
            }),
            connect_with_retry("timeseries", &self.policy, move || async move {
                let store = InfluxTimeSeries::new(timeseries)?;
                Ok::<_, BackendError>(Arc::new(store) as Arc<dyn TimeSeriesStore>)
            }),
            connect_with_retry("graph", &self.policy, move || async move {
                Ok::<_, BackendError>(Arc::new(Neo4jGraph::new(graph)?) as Arc<dyn GraphStore>)
            }),
        );

        Backends {
            document,
            timeseries,
            graph,
        }
    }
}

/// Run `connect` under `policy`, turning final failure into an unavailable marker.
///
/// Configuration errors are not retried.
pub async fn connect_with_retry<T, F, Fut>(
    name: &'static str,
    policy: &RetryPolicy,
    mut connect: F,
) -> Backend<T>
where
    T: ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Arc<T>, BackendError>>,
{
    let mut attempt = 0usize;
    let result = RetryIf::spawn(
        policy.strategy(),
        || {
            attempt += 1;
            let n = attempt;
            let fut = connect();
            async move {
                fut.await.map_err(|e| {
                    warn!(backend = name, attempt = n, error = %e, "Connection attempt failed");
                    e
                })
            }
        },
        BackendError::is_retryable,
    )
    .await;

    match result {
        Ok(handle) => {
            info!(backend = name, "Backend connected");
            Backend::Live(handle)
        }
        Err(e) => {
            error!(
                backend = name,
                attempts = attempt,
                error = %e,
                "Backend unavailable for this run"
            );
            Backend::Unavailable(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn policy(attempts: usize) -> RetryPolicy {
        RetryPolicy {
            attempts,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicUsize::new(0);
        let backend: Backend<str> = connect_with_retry("test", &policy(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(BackendError::Query("refused".into()))
                } else {
                    Ok(Arc::<str>::from("handle"))
                }
            }
        })
        .await;

        assert!(backend.is_available());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let calls = AtomicUsize::new(0);
        let backend: Backend<str> = connect_with_retry("test", &policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<Arc<str>, _>(BackendError::Query("refused".into())) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match backend {
            Backend::Unavailable(reason) => assert!(reason.contains("refused")),
            Backend::Live(_) => panic!("expected unavailable backend"),
        }
    }

    #[tokio::test]
    async fn single_attempt_policy_does_not_retry() {
        let calls = AtomicUsize::new(0);
        let backend: Backend<str> = connect_with_retry("test", &policy(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<Arc<str>, _>(BackendError::Query("refused".into())) }
        })
        .await;

        assert!(!backend.is_available());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn config_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let backend: Backend<str> = connect_with_retry("test", &policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<Arc<str>, _>(BackendError::Config("graph.url is not set".into())) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(backend, Backend::Unavailable(ref r) if r.contains("graph.url")));
    }

    #[tokio::test]
    async fn unconfigured_http_backends_are_unavailable() {
        let mut config = crate::config::load_config_from("does-not-exist").unwrap();
        config.document.url = "sqlite::memory:".to_string();
        config.document.max_connections = 1;
        config.timeseries.url = None;
        config.graph.url = None;

        let supervisor = ConnectionSupervisor::new(policy(2));
        let backends = supervisor.connect_all(&config).await;

        assert!(backends.document.is_available());
        assert!(!backends.timeseries.is_available());
        assert!(!backends.graph.is_available());
    }
}
