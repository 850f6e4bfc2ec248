use async_trait::async_trait;

pub mod http;
#[cfg(test)]
pub mod mock;
mod types;

pub use http::HttpChainClient;
pub use types::*;

/// Which upstream node a request goes to. The fast node serves the latest,
/// possibly revisable chain data; the confirmed node only serves finalized
/// blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Fast,
    Confirmed,
}

/// Remote interface to the two blockchain node roles. All calls are
/// blocking remote procedures; timeouts are handled by the implementation
/// and surface as errors, which the caller treats as transient.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current head block number of the given role.
    async fn head_number(&self, role: NodeRole) -> anyhow::Result<i64>;

    /// Block by number. `Ok(None)` means the role does not have the block
    /// (for the confirmed role: not yet finalized).
    async fn block_by_num(&self, role: NodeRole, num: i64) -> anyhow::Result<Option<RawBlock>>;

    /// Post-execution transaction infos for all transactions of a block.
    async fn transaction_infos(
        &self,
        role: NodeRole,
        num: i64,
    ) -> anyhow::Result<Vec<RawTransactionInfo>>;

    /// Token metadata for a contract address, if the contract exposes it.
    async fn token_metadata(&self, contract: &str) -> anyhow::Result<Option<TokenMetadata>>;
}
