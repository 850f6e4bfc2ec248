//! In-memory store used by pipeline tests. Mirrors the upsert semantics of
//! the Postgres repository.

use async_trait::async_trait;
use sqlx::types::BigDecimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::models::{Block, Event, TokenInfo, Transaction};
use super::store::{BalanceUnderflow, IndexStore};

#[derive(Default)]
struct MemInner {
    cursor: Option<i64>,
    blocks: BTreeMap<i64, Block>,
    transactions: HashMap<String, Transaction>,
    events: BTreeMap<(String, i32), Event>,
    balances: BTreeMap<(String, String), (BigDecimal, f64, i64)>,
    tokens: BTreeMap<String, TokenInfo>,
    transfer_faults: usize,
}

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<MemInner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_count(&self) -> usize {
        self.inner.lock().unwrap().blocks.len()
    }

    pub fn event_count(&self) -> usize {
        self.inner.lock().unwrap().events.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.inner.lock().unwrap().transactions.len()
    }

    /// Make the next `n` calls to `apply_transfer` fail with a generic
    /// storage error.
    pub fn inject_transfer_fault(&self, n: usize) {
        self.inner.lock().unwrap().transfer_faults = n;
    }
}

#[async_trait]
impl IndexStore for MemStore {
    async fn get_cursor(&self) -> anyhow::Result<Option<i64>> {
        Ok(self.inner.lock().unwrap().cursor)
    }

    async fn set_cursor(&self, height: i64) -> anyhow::Result<()> {
        self.inner.lock().unwrap().cursor = Some(height);
        Ok(())
    }

    async fn get_block(&self, number: i64) -> anyhow::Result<Option<Block>> {
        Ok(self.inner.lock().unwrap().blocks.get(&number).cloned())
    }

    async fn upsert_block(&self, block: &Block) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .blocks
            .insert(block.number, block.clone());
        Ok(())
    }

    async fn delete_blocks_from(&self, number: i64) -> anyhow::Result<Vec<Event>> {
        let mut inner = self.inner.lock().unwrap();
        inner.blocks.split_off(&number);
        inner.transactions.retain(|_, tx| tx.block_number < number);

        let removed: Vec<Event> = inner
            .events
            .values()
            .filter(|ev| ev.block_number >= number)
            .cloned()
            .collect();
        inner.events.retain(|_, ev| ev.block_number < number);
        Ok(removed)
    }

    async fn upsert_transaction(&self, tx: &Transaction) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .transactions
            .insert(tx.hash.clone(), tx.clone());
        Ok(())
    }

    async fn get_event(
        &self,
        transaction_id: &str,
        event_index: i32,
    ) -> anyhow::Result<Option<Event>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .events
            .get(&(transaction_id.to_owned(), event_index))
            .cloned())
    }

    async fn upsert_event(&self, event: &Event) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let key = (event.transaction_id.clone(), event.event_index);
        let mut row = event.clone();
        if let Some(existing) = inner.events.get(&key) {
            row.unconfirmed = existing.unconfirmed && event.unconfirmed;
            row.ledger_applied = existing.ledger_applied;
        }
        inner.events.insert(key, row);
        Ok(())
    }

    async fn unconfirmed_blocks(&self, max_height: i64, limit: i64) -> anyhow::Result<Vec<i64>> {
        let inner = self.inner.lock().unwrap();
        let mut result: Vec<i64> = inner
            .events
            .values()
            .filter(|ev| ev.unconfirmed && ev.block_number <= max_height)
            .map(|ev| ev.block_number)
            .collect();
        result.sort_unstable();
        result.dedup();
        result.truncate(limit as usize);
        Ok(result)
    }

    async fn apply_transfer(
        &self,
        contract: &str,
        from: Option<&str>,
        to: Option<&str>,
        amount: &BigDecimal,
        timestamp: i64,
        event: Option<(&str, i32)>,
    ) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock().unwrap();

        if inner.transfer_faults > 0 {
            inner.transfer_faults -= 1;
            anyhow::bail!("injected storage failure");
        }

        if let Some((transaction_id, event_index)) = event {
            match inner
                .events
                .get(&(transaction_id.to_owned(), event_index))
            {
                Some(row) if !row.ledger_applied => {}
                _ => return Ok(false),
            }
        }

        // validate the debit before touching anything so the transfer is
        // all-or-nothing
        let next_from = match from {
            Some(holder) => {
                let key = (contract.to_owned(), holder.to_owned());
                let current = inner
                    .balances
                    .get(&key)
                    .map(|(b, _, _)| b.clone())
                    .unwrap_or_else(|| BigDecimal::from(0));
                let next = current - amount.clone();
                if next < BigDecimal::from(0) {
                    return Err(BalanceUnderflow {
                        contract: contract.to_owned(),
                        holder: holder.to_owned(),
                    }
                    .into());
                }
                Some((key, next))
            }
            None => None,
        };

        if let Some((key, next)) = next_from {
            inner.balances.insert(key, (next, 0.0, timestamp));
        }
        if let Some(holder) = to {
            let key = (contract.to_owned(), holder.to_owned());
            let current = inner
                .balances
                .get(&key)
                .map(|(b, _, _)| b.clone())
                .unwrap_or_else(|| BigDecimal::from(0));
            inner
                .balances
                .insert(key, (current + amount.clone(), 0.0, timestamp));
        }

        if let Some((transaction_id, event_index)) = event {
            if let Some(row) = inner
                .events
                .get_mut(&(transaction_id.to_owned(), event_index))
            {
                row.ledger_applied = true;
            }
        }
        Ok(true)
    }

    async fn get_balance(
        &self,
        contract: &str,
        holder: &str,
    ) -> anyhow::Result<Option<BigDecimal>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .balances
            .get(&(contract.to_owned(), holder.to_owned()))
            .map(|(b, _, _)| b.clone()))
    }

    async fn get_token(&self, contract: &str) -> anyhow::Result<Option<TokenInfo>> {
        Ok(self.inner.lock().unwrap().tokens.get(contract).cloned())
    }

    async fn upsert_token(&self, token: &TokenInfo) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let mut row = token.clone();
        if let Some(existing) = inner.tokens.get(&token.contract_address) {
            row.holder_count = existing.holder_count;
            row.transfer_count = existing.transfer_count;
        }
        inner.tokens.insert(token.contract_address.clone(), row);
        Ok(())
    }

    async fn add_transfer_count(&self, contract: &str, delta: i64) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(token) = inner.tokens.get_mut(contract) {
            token.transfer_count += delta;
        }
        Ok(())
    }

    async fn list_tokens(&self) -> anyhow::Result<Vec<TokenInfo>> {
        Ok(self.inner.lock().unwrap().tokens.values().cloned().collect())
    }

    async fn count_holders(&self, contract: &str) -> anyhow::Result<i64> {
        let inner = self.inner.lock().unwrap();
        let count = inner
            .balances
            .iter()
            .filter(|((c, _), (b, _, _))| c == contract && *b != BigDecimal::from(0))
            .count();
        Ok(count as i64)
    }

    async fn set_holder_count(&self, contract: &str, count: i64) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(token) = inner.tokens.get_mut(contract) {
            token.holder_count = count;
        }
        Ok(())
    }

    async fn recompute_percentages(
        &self,
        contract: &str,
        total_supply: &BigDecimal,
    ) -> anyhow::Result<()> {
        let supply: f64 = total_supply.to_string().parse().unwrap_or(0.0);
        if supply == 0.0 {
            return Ok(());
        }

        let mut inner = self.inner.lock().unwrap();
        for ((c, _), entry) in inner.balances.iter_mut() {
            if c != contract {
                continue;
            }
            let balance: f64 = entry.0.to_string().parse().unwrap_or(0.0);
            entry.1 = 100.0 * balance / supply;
        }
        Ok(())
    }
}

impl MemStore {
    pub fn percentage(&self, contract: &str, holder: &str) -> Option<f64> {
        self.inner
            .lock()
            .unwrap()
            .balances
            .get(&(contract.to_owned(), holder.to_owned()))
            .map(|(_, p, _)| *p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(unconfirmed: bool) -> Event {
        Event {
            transaction_id: "t1".to_owned(),
            event_index: 0,
            block_number: 10,
            unconfirmed,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn confirmed_event_is_never_downgraded() {
        let store = MemStore::new();

        store.upsert_event(&event(false)).await.unwrap();
        // a later fast-node view of the same event must not flip it back
        store.upsert_event(&event(true)).await.unwrap();

        let row = store.get_event("t1", 0).await.unwrap().unwrap();
        assert!(!row.unconfirmed);
    }

    #[tokio::test]
    async fn unconfirmed_event_upgrades_once() {
        let store = MemStore::new();

        store.upsert_event(&event(true)).await.unwrap();
        assert!(store.get_event("t1", 0).await.unwrap().unwrap().unconfirmed);

        store.upsert_event(&event(false)).await.unwrap();
        assert!(!store.get_event("t1", 0).await.unwrap().unwrap().unconfirmed);
    }

    #[tokio::test]
    async fn transfer_is_recorded_on_the_event_once() {
        let store = MemStore::new();
        store.upsert_event(&event(false)).await.unwrap();

        let amount = BigDecimal::from(100);
        let first = store
            .apply_transfer("c1", None, Some("aa"), &amount, 1, Some(("t1", 0)))
            .await
            .unwrap();
        let second = store
            .apply_transfer("c1", None, Some("aa"), &amount, 1, Some(("t1", 0)))
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
        let balance = store.get_balance("c1", "aa").await.unwrap().unwrap();
        assert_eq!(balance, BigDecimal::from(100));

        // re-upserting the event keeps the applied marker
        store.upsert_event(&event(false)).await.unwrap();
        assert!(store.get_event("t1", 0).await.unwrap().unwrap().ledger_applied);
    }
}
