//
// remote/host.rs
//
// Remote worker acquisition and invocation seams
//

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::protocol::{ReferenceMessage, RemoteRequest};
use crate::error::Result;

/// Handle to a live analysis worker.
///
/// Calls are independent of each other; a handle may be shared by any
/// number of concurrent callers.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Run one request to completion
    async fn invoke(&self, request: RemoteRequest, token: &CancellationToken) -> Result<()>;

    /// Run a search, streaming results into `callback`. The worker drops its
    /// sender when the call ends, which retires the channel.
    async fn invoke_streaming(
        &self,
        request: RemoteRequest,
        callback: mpsc::UnboundedSender<ReferenceMessage>,
        token: &CancellationToken,
    ) -> Result<()>;
}

/// Source of worker handles.
///
/// `None` is a routing decision, not an error. Implementations must be cheap
/// to call repeatedly while no worker is available.
#[async_trait]
pub trait RemoteHost: Send + Sync {
    async fn try_get_client(&self, token: &CancellationToken) -> Option<Arc<dyn RemoteClient>>;
}

/// A host that never has a worker
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableHost;

#[async_trait]
impl RemoteHost for UnavailableHost {
    async fn try_get_client(&self, _token: &CancellationToken) -> Option<Arc<dyn RemoteClient>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unavailable_host_never_yields_a_client() {
        let host = UnavailableHost;
        let token = CancellationToken::new();
        for _ in 0..3 {
            assert!(host.try_get_client(&token).await.is_none());
        }
    }
}
