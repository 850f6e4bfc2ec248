//! Token balance ledger. Applies extracted transfers to per-holder
//! balances, registers tokens on first sight and keeps the derived
//! holder/percentage statistics fresh.

use sqlx::types::BigDecimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::event::TransferOp;
use crate::db::{BalanceUnderflow, IndexStore, TokenInfo};
use crate::node::ChainClient;

/// Burn/mint sentinel: a transfer from this address mints, a transfer to
/// it burns. Plain hex, 20 zero bytes.
pub const ZERO_ADDRESS: &str = "0000000000000000000000000000000000000000";

pub struct TokenLedger {
    store: Arc<dyn IndexStore>,
    node: Arc<dyn ChainClient>,
}

impl TokenLedger {
    pub fn new(store: Arc<dyn IndexStore>, node: Arc<dyn ChainClient>) -> Self {
        TokenLedger { store, node }
    }

    /// Apply one transfer to the ledger. Malformed amounts and underflows
    /// are logged and skipped so a single bad event cannot wedge the
    /// pipeline; storage failures still propagate.
    ///
    /// `event` names the event row the transfer came from; the store
    /// records the application on it atomically with the deltas, so a
    /// re-commit of the same block leaves balances untouched.
    pub async fn apply(
        &self,
        op: &TransferOp,
        timestamp: i64,
        event: Option<(&str, i32)>,
    ) -> anyhow::Result<()> {
        self.ensure_token(&op.contract).await?;

        let amount = match parse_amount(op) {
            Some(v) => v,
            None => return Ok(()),
        };

        let from = ledger_side(&op.from);
        let to = ledger_side(&op.to);
        if from.is_none() && to.is_none() {
            return Ok(());
        }

        let applied = match self
            .store
            .apply_transfer(&op.contract, from, to, &amount, timestamp, event)
            .await
        {
            Ok(applied) => applied,
            Err(err) => {
                if err.downcast_ref::<BalanceUnderflow>().is_some() {
                    error!("transfer rejected: {}", err);
                    return Ok(());
                }
                return Err(err);
            }
        };

        if applied {
            self.store.add_transfer_count(&op.contract, 1).await?;
        }
        Ok(())
    }

    /// Undo a previously applied transfer by applying it with the sides
    /// swapped. Used when a fork's blocks are discarded.
    pub async fn revert(&self, op: &TransferOp, timestamp: i64) -> anyhow::Result<()> {
        let amount = match parse_amount(op) {
            Some(v) => v,
            None => return Ok(()),
        };

        let from = ledger_side(&op.from);
        let to = ledger_side(&op.to);
        if from.is_none() && to.is_none() {
            return Ok(());
        }

        if let Err(err) = self
            .store
            .apply_transfer(&op.contract, to, from, &amount, timestamp, None)
            .await
        {
            if err.downcast_ref::<BalanceUnderflow>().is_some() {
                error!("transfer reversal rejected: {}", err);
                return Ok(());
            }
            return Err(err);
        }

        self.store.add_transfer_count(&op.contract, -1).await
    }

    /// Register the token on first sight. Metadata comes from a contract
    /// call against the node; when that fails a placeholder row is kept so
    /// balances are never orphaned, and a later stats pass retries.
    async fn ensure_token(&self, contract: &str) -> anyhow::Result<()> {
        if self.store.get_token(contract).await?.is_some() {
            return Ok(());
        }

        let mut token = TokenInfo {
            contract_address: contract.to_owned(),
            ..Default::default()
        };
        match self.node.token_metadata(contract).await {
            Ok(Some(meta)) => {
                token.name = meta.name;
                token.symbol = meta.symbol;
                token.decimals = meta.decimals;
                token.total_supply = meta.total_supply;
            }
            Ok(None) => {
                debug!("no metadata for contract={}", contract);
            }
            Err(err) => {
                warn!("metadata fetch failed: contract={} err={}", contract, err);
            }
        }
        self.store.upsert_token(&token).await
    }

    /// Recompute holder counts and ownership percentages for every known
    /// token, retrying metadata for tokens still missing a name.
    pub async fn refresh_stats(&self) -> anyhow::Result<()> {
        for mut token in self.store.list_tokens().await? {
            if token.name.is_empty() {
                if let Ok(Some(meta)) = self.node.token_metadata(&token.contract_address).await {
                    token.name = meta.name;
                    token.symbol = meta.symbol;
                    token.decimals = meta.decimals;
                    token.total_supply = meta.total_supply;
                    self.store.upsert_token(&token).await?;
                }
            }

            let holders = self.store.count_holders(&token.contract_address).await?;
            self.store
                .set_holder_count(&token.contract_address, holders)
                .await?;

            match token.total_supply.parse::<BigDecimal>() {
                Ok(supply) if supply > BigDecimal::from(0) => {
                    self.store
                        .recompute_percentages(&token.contract_address, &supply)
                        .await?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn parse_amount(op: &TransferOp) -> Option<BigDecimal> {
    match op.value.parse::<BigDecimal>() {
        Ok(v) if v >= BigDecimal::from(0) => Some(v),
        Ok(_) => {
            warn!(
                "negative transfer amount skipped: contract={} value={}",
                op.contract, op.value
            );
            None
        }
        Err(_) => {
            warn!(
                "non-numeric transfer amount skipped: contract={} value={}",
                op.contract, op.value
            );
            None
        }
    }
}

fn ledger_side(address: &str) -> Option<&str> {
    if address.is_empty() || address == ZERO_ADDRESS {
        None
    } else {
        Some(address)
    }
}

/// Periodic background task recomputing the derived token statistics.
pub struct Maintenance {
    ledger: Arc<TokenLedger>,
    interval: Duration,
}

impl Maintenance {
    pub fn new(ledger: Arc<TokenLedger>, interval: Duration) -> Self {
        Maintenance { ledger, interval }
    }

    pub fn start(self, stop_signal: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("starting token-stats maintenance task");
            loop {
                tokio::select! {
                    _ = sleep(self.interval) => {
                        if let Err(err) = self.ledger.refresh_stats().await {
                            error!("token stats refresh failed: {}", err);
                        }
                    }
                    _ = stop_signal.cancelled() => {
                        break;
                    }
                }
            }
            info!("token-stats maintenance task finished");
        })
    }
}
