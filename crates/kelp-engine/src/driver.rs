//! Concurrent fan-out of one traversal batch.

use std::collections::HashMap;
use std::future::Future;

use kelp_types::NodeId;
use tokio::task::JoinSet;
use tracing::warn;

use crate::context::ExecutionContext;
use crate::error::ObjectError;

/// Run `call` against every node of `batch` concurrently.
///
/// Calls are bounded by the context's limiter and cut off at its deadline:
/// on timeout every in-flight call is aborted and [`ObjectError::Timeout`]
/// returned. A node whose task panicked is missing from the result; callers
/// treat a missing answer as a failure.
pub(crate) async fn dispatch<T, F, Fut>(
    ctx: &ExecutionContext,
    batch: &[NodeId],
    call: F,
) -> Result<HashMap<NodeId, T>, ObjectError>
where
    F: Fn(NodeId) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    ctx.check_deadline()?;

    let mut tasks = JoinSet::new();
    for &node in batch {
        let limiter = ctx.limiter();
        let fut = call(node);
        tasks.spawn(async move {
            // The limiter is never closed.
            let _permit = limiter.acquire_owned().await.ok();
            (node, fut.await)
        });
    }

    let mut answers = HashMap::with_capacity(batch.len());
    loop {
        match tokio::time::timeout_at(ctx.deadline(), tasks.join_next()).await {
            Ok(Some(Ok((node, answer)))) => {
                answers.insert(node, answer);
            }
            Ok(Some(Err(e))) => {
                warn!(error = %e, "node call task failed");
            }
            Ok(None) => break,
            Err(_) => {
                tasks.abort_all();
                return Err(ObjectError::Timeout);
            }
        }
    }

    Ok(answers)
}
