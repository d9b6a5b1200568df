//! Request deadlines for engine calls
//!
//! The core never retries a failed engine request; it only bounds how long it
//! waits. An elapsed deadline becomes [`ClientError::OperationTimeout`], which
//! the state machines treat like any other network failure.

use std::future::Future;
use std::time::Duration;

use tracing::error;

use crate::error::{ClientError, ClientResult};

/// Run `future` with a deadline
///
/// # Examples
///
/// ```rust
/// # use softphone_core::client::recovery::with_timeout;
/// # use softphone_core::{ClientError, ClientResult};
/// # use std::time::Duration;
/// # #[tokio::main]
/// # async fn main() {
/// let result: ClientResult<()> = with_timeout("send_register", Duration::from_millis(20), async {
///     tokio::time::sleep(Duration::from_secs(1)).await;
///     Ok(())
/// })
/// .await;
///
/// match result {
///     Err(ClientError::OperationTimeout { operation, duration_ms }) => {
///         assert_eq!(operation, "send_register");
///         assert_eq!(duration_ms, 20);
///     }
///     other => panic!("expected timeout, got {other:?}"),
/// }
/// # }
/// ```
pub async fn with_timeout<T, F>(operation: &str, timeout: Duration, future: F) -> ClientResult<T>
where
    F: Future<Output = ClientResult<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            let duration_ms = timeout.as_millis() as u64;
            error!(operation = %operation, timeout_ms = duration_ms, "Operation timed out");
            Err(ClientError::timeout(operation, duration_ms))
        }
    }
}
