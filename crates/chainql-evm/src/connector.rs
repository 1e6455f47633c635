//! Opens JSON-RPC chain sources for `SET CONNECTION` directives.

use std::sync::Arc;

use async_trait::async_trait;

use chainql_core::{ChainConnector, ChainError, ChainSource};

use crate::client::{EvmSourceConfig, JsonRpcChainSource};

#[derive(Debug, Clone, Default)]
pub struct EvmConnector {
    config: EvmSourceConfig,
}

impl EvmConnector {
    pub fn new(config: EvmSourceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ChainConnector for EvmConnector {
    /// Open a source for `url` and check that the node answers.
    async fn connect(&self, url: &str) -> Result<Arc<dyn ChainSource>, ChainError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ChainError::Rpc(format!("unsupported connection url '{url}'")));
        }
        let source = JsonRpcChainSource::new(url, &self.config);
        let head = source.block_number().await?;
        tracing::info!(url = %url, head, "Chain source connected");
        Ok(Arc::new(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainql_core::RetryConfig;

    #[tokio::test]
    async fn websocket_urls_are_rejected() {
        let connector = EvmConnector::default();
        let err = connector.connect("wss://node.example").await.err().unwrap();
        assert!(err.to_string().contains("unsupported connection url"));
    }

    #[tokio::test]
    async fn unreachable_node_fails_to_connect() {
        let connector = EvmConnector::new(EvmSourceConfig {
            retry: RetryConfig::none(),
            request_timeout_ms: 1_000,
        });
        assert!(connector.connect("http://127.0.0.1:9").await.is_err());
    }
}
