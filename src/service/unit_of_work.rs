// service/unit_of_work.rs
use std::future::Future;
use std::time::Duration;

use crate::service::error::ServiceError;

/// Runs one unit of work under a deadline.
///
/// On expiry the future is dropped, which drops the open [`LedgerUnit`]
/// and discards its writes. Callers see [`ServiceError::Timeout`].
///
/// [`LedgerUnit`]: crate::db::ledger::LedgerUnit
pub async fn bounded<T, F>(limit: Duration, operation: &'static str, work: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(limit, work).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation,
                timeout_ms = limit.as_millis() as u64,
                "Unit of work timed out and was rolled back"
            );
            Err(ServiceError::Timeout(format!(
                "{} did not finish within {}ms",
                operation,
                limit.as_millis()
            )))
        }
    }
}
