//! Deadline wrapper for source and store calls

use std::future::Future;
use std::time::Duration;

use crate::{Error, Result};

/// Await `fut`, failing with [`Error::Timeout`] once `after` elapses.
pub async fn timed<T, F>(operation: &str, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, ?after, "Operation timed out");
            Err(Error::Timeout {
                operation: operation.to_string(),
                after,
            })
        }
    }
}
