//! Utility functions shared by the operation modules.

use std::future::Future;
use std::time::Duration;

use reportgate_gateway::{GatewayError, GatewayResult};
use reportgate_store::StoreError;

use crate::error::{OpsError, OpsResult};

/// Run a synchronous store call on the blocking pool under a deadline.
///
/// If the deadline passes the caller gets `Timeout`; the statement itself
/// still runs to completion on its thread, and because every write is a
/// single statement it either lands whole or not at all.
pub(crate) async fn run_store<T, F>(
    timeout: Duration,
    context: impl Into<String>,
    f: F,
) -> OpsResult<T>
where
    F: FnOnce() -> reportgate_store::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let context = context.into();
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Err(_) => Err(OpsError::Timeout {
            operation: context,
            after: timeout,
        }),
        Ok(Err(join)) => Err(OpsError::persistence(
            context,
            StoreError::task(join.to_string()),
        )),
        Ok(Ok(Err(e))) => Err(OpsError::persistence(context, e)),
        Ok(Ok(Ok(value))) => Ok(value),
    }
}

/// Bound a provider call by a deadline, reporting expiry as a gateway timeout.
pub(crate) async fn with_deadline<T, Fut>(timeout: Duration, fut: Fut) -> GatewayResult<T>
where
    Fut: Future<Output = GatewayResult<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| GatewayError::timeout(format!("no response within {:?}", timeout)))?
}
