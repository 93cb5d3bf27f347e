//! Async timeout helpers and the default deadline constants shared by the
//! session layer.
//!
//! The receive-side timeout policy (a maximum wait for a complete packet
//! and a minimum sustained byte rate) belongs to the I/O layer; these
//! wrappers give it a uniform way to fail an operation with
//! `TransportError::Timeout`.

use std::future::Future;
use std::time::Duration;

use crate::error::{Result, TransportError};

/// Default deadline for send/receive operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between keepalive probes.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Grace period for draining connections on shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `future` under a deadline, mapping expiry to
/// `TransportError::Timeout`.
pub async fn with_timeout<F, T>(future: F, deadline: Duration) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(deadline, future)
        .await
        .map_err(|_| TransportError::Timeout)
}

/// Like [`with_timeout`] for fallible futures: flattens the deadline error
/// into the future's own `Result`.
pub async fn with_timeout_error<F, T>(future: F, deadline: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, future).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let value = with_timeout(async { 42 }, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_expiry_maps_to_timeout() {
        let result = with_timeout_error::<_, ()>(
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            },
            Duration::from_millis(10),
        )
        .await;
        assert!(matches!(result, Err(TransportError::Timeout)));
    }
}
