use async_trait::async_trait;
use sqlx::types::BigDecimal;
use std::fmt;

use super::models::{Block, Event, TokenInfo, Transaction};

/// A transfer delta would drive a holder balance below zero. This is a
/// data-consistency fault, not a valid state; callers reject the transfer
/// instead of clamping.
#[derive(Debug)]
pub struct BalanceUnderflow {
    pub contract: String,
    pub holder: String,
}

impl fmt::Display for BalanceUnderflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "balance underflow: contract={} holder={}",
            self.contract, self.holder
        )
    }
}

impl std::error::Error for BalanceUnderflow {}

/// Persistence interface consumed by the indexing pipeline. Every write is
/// an idempotent upsert keyed as documented on the method.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Highest block number fully indexed, if any block was ever committed.
    async fn get_cursor(&self) -> anyhow::Result<Option<i64>>;
    async fn set_cursor(&self, height: i64) -> anyhow::Result<()>;

    async fn get_block(&self, number: i64) -> anyhow::Result<Option<Block>>;
    /// Upsert keyed by block number.
    async fn upsert_block(&self, block: &Block) -> anyhow::Result<()>;
    /// Remove all blocks with number >= `number` together with their
    /// transactions and events. Returns the removed events so ledger
    /// deltas derived from them can be reversed.
    async fn delete_blocks_from(&self, number: i64) -> anyhow::Result<Vec<Event>>;

    /// Upsert keyed by transaction hash.
    async fn upsert_transaction(&self, tx: &Transaction) -> anyhow::Result<()>;

    async fn get_event(&self, transaction_id: &str, event_index: i32)
        -> anyhow::Result<Option<Event>>;
    /// Upsert keyed by (transaction id, event index). The `unconfirmed`
    /// flag only ever transitions true -> false.
    async fn upsert_event(&self, event: &Event) -> anyhow::Result<()>;
    /// Block numbers <= `max_height` that still carry unconfirmed events.
    async fn unconfirmed_blocks(&self, max_height: i64, limit: i64) -> anyhow::Result<Vec<i64>>;

    /// Apply one transfer as a single logical update: debit `from` and
    /// credit `to` (either side absent for mint/burn). Fails with
    /// [`BalanceUnderflow`] without applying anything when a debit would
    /// go negative.
    ///
    /// When `event` names an event row, the application is recorded on
    /// that row (`ledger_applied`) in the same transaction as the deltas;
    /// a call for an already-applied or missing row is a no-op returning
    /// `Ok(false)`. Returns `Ok(true)` when the deltas were applied.
    async fn apply_transfer(
        &self,
        contract: &str,
        from: Option<&str>,
        to: Option<&str>,
        amount: &BigDecimal,
        timestamp: i64,
        event: Option<(&str, i32)>,
    ) -> anyhow::Result<bool>;
    async fn get_balance(&self, contract: &str, holder: &str)
        -> anyhow::Result<Option<BigDecimal>>;

    async fn get_token(&self, contract: &str) -> anyhow::Result<Option<TokenInfo>>;
    /// Upsert keyed by contract address. Holder and transfer counters are
    /// preserved on conflict; metadata fields are replaced.
    async fn upsert_token(&self, token: &TokenInfo) -> anyhow::Result<()>;
    async fn add_transfer_count(&self, contract: &str, delta: i64) -> anyhow::Result<()>;
    async fn list_tokens(&self) -> anyhow::Result<Vec<TokenInfo>>;

    async fn count_holders(&self, contract: &str) -> anyhow::Result<i64>;
    async fn set_holder_count(&self, contract: &str, count: i64) -> anyhow::Result<()>;
    /// Recompute ownership percentages for every holder of the contract
    /// against the given total supply.
    async fn recompute_percentages(
        &self,
        contract: &str,
        total_supply: &BigDecimal,
    ) -> anyhow::Result<()>;
}
