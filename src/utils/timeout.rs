use std::future::Future;
use std::time::Duration;
use crate::error::{Error, Result};

/// Race `operation` against `deadline`.
///
/// The operation runs as its own task. When the deadline wins, the task is
/// abandoned rather than cancelled: it keeps running to completion and its
/// output is dropped. Only pass operations whose sole effect is producing a value.
pub async fn with_timeout<F, T>(operation: F, deadline: Duration) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(operation);

    match tokio::time::timeout(deadline, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(Error::TaskFailed(join_error.to_string())),
        Err(_) => Err(Error::Timeout(deadline)),
    }
}
