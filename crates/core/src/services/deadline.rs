use std::future::Future;
use std::time::Duration;

use crate::errors::CoreError;

/// Await a gateway/store call, giving up after `limit`.
///
/// Expiry is reported as `StoreUnavailable`; the call is dropped and its
/// effect on the backend is unknown. Needs a Tokio runtime with the time
/// driver enabled.
#[cfg(not(target_arch = "wasm32"))]
pub async fn within<T, F>(limit: Duration, what: &str, call: F) -> Result<T, CoreError>
where
    F: Future<Output = Result<T, CoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(what, ?limit, "backend call timed out");
            Err(CoreError::StoreUnavailable(format!(
                "{what} timed out after {limit:?}"
            )))
        }
    }
}

/// wasm32 has no timer here; the call is awaited as-is.
#[cfg(target_arch = "wasm32")]
pub async fn within<T, F>(_limit: Duration, _what: &str, call: F) -> Result<T, CoreError>
where
    F: Future<Output = Result<T, CoreError>>,
{
    call.await
}
