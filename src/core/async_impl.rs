//! Async invocation of compiled nodes.
//!
//! Node implementations are synchronous. From async code they run on the
//! blocking pool, so a slow node never stalls the executor.

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::core::error::NodeError;
use crate::core::exec::{CompiledNode, NodeOutput};
use crate::core::value::Value;

impl CompiledNode {
    /// [`CompiledNode::invoke`] on tokio's blocking pool. Must be polled
    /// inside a tokio runtime.
    pub fn invoke_async(
        self: &Arc<Self>,
        kwargs: HashMap<String, Value>,
    ) -> BoxFuture<'static, Result<NodeOutput, NodeError>> {
        let node = Arc::clone(self);
        async move {
            tokio::task::spawn_blocking(move || node.invoke(kwargs))
                .await
                .map_err(|e| NodeError::Join(e.to_string()))?
        }
        .boxed()
    }
}

/// Invoke several nodes concurrently, keeping the input order.
pub async fn invoke_all(
    calls: Vec<(Arc<CompiledNode>, HashMap<String, Value>)>,
) -> Vec<Result<NodeOutput, NodeError>> {
    let futures = calls
        .into_iter()
        .map(|(node, kwargs)| node.invoke_async(kwargs));
    futures::future::join_all(futures).await
}
