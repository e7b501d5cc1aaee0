use std::future::Future;
use std::time::Duration;

use parley_db::{StoreError, StoreResult};

/// Bound a store call. Expiry surfaces as `StoreError::Timeout`.
pub async fn bounded<T, F>(deadline: Duration, call: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    tokio::time::timeout(deadline, call)
        .await
        .unwrap_or(Err(StoreError::Timeout))
}
