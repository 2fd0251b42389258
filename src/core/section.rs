use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::db::Backend;
use crate::error::BackendError;
use crate::models::Section;

/// Run one backend query and settle it into a [`Section`].
///
/// Unavailable backends short-circuit without calling `query`. Errors and
/// timeouts are captured as [`SectionStatus::Error`](crate::models::SectionStatus::Error).
pub async fn settle<S, T, F, Fut>(
    name: &'static str,
    backend: &Backend<S>,
    limit: Duration,
    query: F,
) -> Section<T>
where
    S: ?Sized,
    T: Default,
    F: FnOnce(Arc<S>) -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let store = match backend {
        Backend::Live(store) => Arc::clone(store),
        Backend::Unavailable(reason) => return Section::unavailable(reason.as_str()),
    };

    let outcome = match tokio::time::timeout(limit, query(store)).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(limit)),
    };

    match outcome {
        Ok(data) => Section::ok(data),
        Err(e) => {
            warn!(backend = name, error = %e, "Section degraded");
            Section::failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SectionStatus;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn unavailable_backend_is_not_queried() {
        let backend: Backend<str> = Backend::Unavailable("refused".into());
        let ran = AtomicBool::new(false);
        let section: Section<Vec<u8>> = settle("test", &backend, Duration::from_secs(1), |_| async {
            ran.store(true, Ordering::SeqCst);
            Ok::<_, BackendError>(Vec::new())
        })
        .await;
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(section.status, SectionStatus::Unavailable("refused".into()));
        assert!(section.data.is_empty());
    }

    #[tokio::test]
    async fn slow_query_times_out() {
        let backend: Backend<str> = Backend::Live(Arc::from("store"));
        let limit = Duration::from_millis(10);
        let section: Section<Vec<u8>> = settle("test", &backend, limit, |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, BackendError>(vec![1])
        })
        .await;
        assert!(matches!(section.status, SectionStatus::Error(ref m) if m.contains("timed out")));
        assert!(section.data.is_empty());
    }

    #[tokio::test]
    async fn query_error_keeps_cause() {
        let backend: Backend<str> = Backend::Live(Arc::from("store"));
        let section: Section<Vec<u8>> = settle("test", &backend, Duration::from_secs(1), |_| async {
            Err::<Vec<u8>, _>(BackendError::Query("connection reset".into()))
        })
        .await;
        assert_eq!(
            section.status,
            SectionStatus::Error("query rejected: connection reset".into())
        );
    }
}
