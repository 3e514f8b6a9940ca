//! Bounded reload-mutate-save loop for callers of the service.
//!
//! The service reports `VersionConflict` and never retries on its own.
//! Callers that want another attempt wrap the whole operation here; each
//! attempt reloads the aggregate because the operation starts from scratch.

use std::future::Future;

use domains::Result;
use tracing::debug;

pub async fn retry_on_conflict<T, F, Fut>(max_attempts: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if err.is_version_conflict() && attempt < max_attempts => {
                debug!(attempt, max_attempts, "version conflict, retrying operation");
                attempt += 1;
            }
            outcome => return outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::DomainError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn conflict() -> DomainError {
        DomainError::VersionConflict { id: "f".into(), expected: 1, found: 2 }
    }

    #[tokio::test]
    async fn succeeds_after_a_conflict() {
        let calls = AtomicU32::new(0);
        let result = retry_on_conflict(3, || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(conflict())
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(tokio_test::assert_ok!(result), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_the_limit() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_on_conflict(2, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(conflict())
        })
        .await;
        assert!(result.unwrap_err().is_version_conflict());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_on_conflict(5, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DomainError::Unauthorized("no".into()))
        })
        .await;
        tokio_test::assert_err!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
