//! Pre-flight reachability probe run before any mutating call.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::client::BackendClient;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait Reachability: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Any HTTP answer from the auth health endpoint counts as reachable; only
/// transport failures count as offline.
#[derive(Clone, Debug)]
pub struct HttpReachability {
    client: BackendClient,
}

impl HttpReachability {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Reachability for HttpReachability {
    async fn is_reachable(&self) -> bool {
        let request = self
            .client
            .http()
            .get(self.client.endpoint("auth/v1/health"))
            .timeout(PROBE_TIMEOUT);
        match self.client.authorize(request).await.send().await {
            Ok(_) => true,
            Err(err) => {
                warn!(error = %err, "backend reachability probe failed");
                false
            }
        }
    }
}

/// Used when storage is local to the process.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysReachable;

#[async_trait]
impl Reachability for AlwaysReachable {
    async fn is_reachable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        // Port 9 (discard) is closed on test machines.
        let reachability = HttpReachability::new(BackendClient::new("http://127.0.0.1:9", "anon"));
        assert!(!reachability.is_reachable().await);
        assert!(AlwaysReachable.is_reachable().await);
    }
}
