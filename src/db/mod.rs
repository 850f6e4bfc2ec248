use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::prelude::FromRow;
use sqlx::types::BigDecimal;
use sqlx::{PgPool, Postgres};

use crate::config::DBConfig;

#[cfg(test)]
pub mod mem;
mod models;
mod store;

pub use models::*;
pub use store::{BalanceUnderflow, IndexStore};

static MIGRATOR: Migrator = sqlx::migrate!("src/db/migrations");

static SYNC_INDEXER_ID: &str = "chain_sync";

pub async fn open_postgres_db(config: DBConfig) -> anyhow::Result<Repo> {
    let pool = PgPoolOptions::new()
        .max_connections(100)
        .connect(&config.dsn)
        .await?;
    let repo = Repo { pool };
    if config.automigrate {
        repo.migrate().await?;
    }
    Ok(repo)
}

#[derive(FromRow)]
struct Count {
    count: i64,
}

pub struct Repo {
    pub pool: PgPool,
}

impl Repo {
    pub async fn migrate(&self) -> anyhow::Result<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub async fn reset_schema(&self) -> anyhow::Result<()> {
        let _ = sqlx::query("DROP SCHEMA public CASCADE")
            .execute(&self.pool)
            .await?;

        let _ = sqlx::query("CREATE SCHEMA public")
            .execute(&self.pool)
            .await?;
        self.migrate().await?;
        Ok(())
    }

    pub async fn get_sync_cursor(&self) -> anyhow::Result<Option<SyncCursor>> {
        let result = sqlx::query_as::<_, SyncCursor>("SELECT * FROM sync_cursor WHERE indexer = $1")
            .bind(SYNC_INDEXER_ID)
            .fetch_optional(&self.pool)
            .await?;
        Ok(result)
    }

    async fn apply_delta(
        dbtx: &mut sqlx::Transaction<'_, Postgres>,
        contract: &str,
        holder: &str,
        delta: BigDecimal,
        timestamp: i64,
    ) -> anyhow::Result<()> {
        let current: Option<BigDecimal> = sqlx::query_scalar(
            "SELECT balance FROM token_balances
             WHERE contract_address = $1 AND holder_address = $2 FOR UPDATE",
        )
        .bind(contract)
        .bind(holder)
        .fetch_optional(&mut **dbtx)
        .await?;

        let next = current.unwrap_or_else(|| BigDecimal::from(0)) + delta;
        if next < BigDecimal::from(0) {
            return Err(BalanceUnderflow {
                contract: contract.to_owned(),
                holder: holder.to_owned(),
            }
            .into());
        }

        let _ = sqlx::query(
            "INSERT INTO token_balances (contract_address, holder_address, balance, percentage, updated_at)
             VALUES ($1, $2, $3, 0, $4)
             ON CONFLICT (contract_address, holder_address)
             DO UPDATE SET balance = EXCLUDED.balance, updated_at = EXCLUDED.updated_at",
        )
        .bind(contract)
        .bind(holder)
        .bind(&next)
        .bind(timestamp)
        .execute(&mut **dbtx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl IndexStore for Repo {
    async fn get_cursor(&self) -> anyhow::Result<Option<i64>> {
        Ok(self.get_sync_cursor().await?.map(|c| c.height))
    }

    async fn set_cursor(&self, height: i64) -> anyhow::Result<()> {
        let _ = sqlx::query(
            "INSERT INTO sync_cursor (indexer, height) VALUES ($1, $2)
             ON CONFLICT (indexer) DO UPDATE SET height = EXCLUDED.height",
        )
        .bind(SYNC_INDEXER_ID)
        .bind(height)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_block(&self, number: i64) -> anyhow::Result<Option<Block>> {
        let result = sqlx::query_as::<_, Block>("SELECT * FROM blocks WHERE number = $1")
            .bind(number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(result)
    }

    async fn upsert_block(&self, block: &Block) -> anyhow::Result<()> {
        let _ = sqlx::query(
            "INSERT INTO blocks
               (number, hash, parent_hash, timestamp, witness_address, tx_count, size, version)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (number) DO UPDATE SET
               hash = EXCLUDED.hash,
               parent_hash = EXCLUDED.parent_hash,
               timestamp = EXCLUDED.timestamp,
               witness_address = EXCLUDED.witness_address,
               tx_count = EXCLUDED.tx_count,
               size = EXCLUDED.size,
               version = EXCLUDED.version",
        )
        .bind(block.number)
        .bind(&block.hash)
        .bind(&block.parent_hash)
        .bind(block.timestamp)
        .bind(&block.witness_address)
        .bind(block.tx_count)
        .bind(block.size)
        .bind(block.version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_blocks_from(&self, number: i64) -> anyhow::Result<Vec<Event>> {
        let mut dbtx = self.pool.begin().await?;

        let events = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE block_number >= $1")
            .bind(number)
            .fetch_all(&mut *dbtx)
            .await?;

        let _ = sqlx::query("DELETE FROM events WHERE block_number >= $1")
            .bind(number)
            .execute(&mut *dbtx)
            .await?;
        let _ = sqlx::query("DELETE FROM transactions WHERE block_number >= $1")
            .bind(number)
            .execute(&mut *dbtx)
            .await?;
        let _ = sqlx::query("DELETE FROM blocks WHERE number >= $1")
            .bind(number)
            .execute(&mut *dbtx)
            .await?;

        dbtx.commit().await?;
        Ok(events)
    }

    async fn upsert_transaction(&self, tx: &Transaction) -> anyhow::Result<()> {
        let _ = sqlx::query(
            "INSERT INTO transactions
               (hash, block_number, timestamp, from_address, to_address, contract_address,
                amount, fee, energy_usage, net_usage, result, contract_type, internal_transactions)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             ON CONFLICT (hash) DO UPDATE SET
               block_number = EXCLUDED.block_number,
               timestamp = EXCLUDED.timestamp,
               from_address = EXCLUDED.from_address,
               to_address = EXCLUDED.to_address,
               contract_address = EXCLUDED.contract_address,
               amount = EXCLUDED.amount,
               fee = EXCLUDED.fee,
               energy_usage = EXCLUDED.energy_usage,
               net_usage = EXCLUDED.net_usage,
               result = EXCLUDED.result,
               contract_type = EXCLUDED.contract_type,
               internal_transactions = EXCLUDED.internal_transactions",
        )
        .bind(&tx.hash)
        .bind(tx.block_number)
        .bind(tx.timestamp)
        .bind(&tx.from_address)
        .bind(&tx.to_address)
        .bind(&tx.contract_address)
        .bind(tx.amount)
        .bind(tx.fee)
        .bind(tx.energy_usage)
        .bind(tx.net_usage)
        .bind(&tx.result)
        .bind(&tx.contract_type)
        .bind(&tx.internal_transactions)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_event(
        &self,
        transaction_id: &str,
        event_index: i32,
    ) -> anyhow::Result<Option<Event>> {
        let result = sqlx::query_as::<_, Event>(
            "SELECT * FROM events WHERE transaction_id = $1 AND event_index = $2",
        )
        .bind(transaction_id)
        .bind(event_index)
        .fetch_optional(&self.pool)
        .await?;
        Ok(result)
    }

    async fn upsert_event(&self, event: &Event) -> anyhow::Result<()> {
        // unconfirmed only ever drops from true to false, never back;
        // ledger_applied is owned by apply_transfer and kept as-is on
        // conflict
        let _ = sqlx::query(
            "INSERT INTO events
               (transaction_id, event_index, block_number, block_timestamp, contract_address,
                event_name, event_signature, result, result_type, unconfirmed, ledger_applied)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (transaction_id, event_index) DO UPDATE SET
               block_number = EXCLUDED.block_number,
               block_timestamp = EXCLUDED.block_timestamp,
               contract_address = EXCLUDED.contract_address,
               event_name = EXCLUDED.event_name,
               event_signature = EXCLUDED.event_signature,
               result = EXCLUDED.result,
               result_type = EXCLUDED.result_type,
               unconfirmed = events.unconfirmed AND EXCLUDED.unconfirmed",
        )
        .bind(&event.transaction_id)
        .bind(event.event_index)
        .bind(event.block_number)
        .bind(event.block_timestamp)
        .bind(&event.contract_address)
        .bind(&event.event_name)
        .bind(&event.event_signature)
        .bind(&event.result)
        .bind(&event.result_type)
        .bind(event.unconfirmed)
        .bind(event.ledger_applied)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn unconfirmed_blocks(&self, max_height: i64, limit: i64) -> anyhow::Result<Vec<i64>> {
        let result = sqlx::query_scalar::<_, i64>(
            "SELECT DISTINCT block_number FROM events
             WHERE unconfirmed = true AND block_number <= $1
             ORDER BY block_number ASC LIMIT $2",
        )
        .bind(max_height)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
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
        let mut dbtx = self.pool.begin().await?;

        // the marker update and the deltas commit or roll back together
        if let Some((transaction_id, event_index)) = event {
            let marked = sqlx::query(
                "UPDATE events SET ledger_applied = true
                 WHERE transaction_id = $1 AND event_index = $2 AND NOT ledger_applied",
            )
            .bind(transaction_id)
            .bind(event_index)
            .execute(&mut *dbtx)
            .await?;
            if marked.rows_affected() == 0 {
                return Ok(false);
            }
        }

        if let Some(holder) = from {
            Self::apply_delta(&mut dbtx, contract, holder, -amount.clone(), timestamp).await?;
        }
        if let Some(holder) = to {
            Self::apply_delta(&mut dbtx, contract, holder, amount.clone(), timestamp).await?;
        }

        dbtx.commit().await?;
        Ok(true)
    }

    async fn get_balance(
        &self,
        contract: &str,
        holder: &str,
    ) -> anyhow::Result<Option<BigDecimal>> {
        let result = sqlx::query_scalar::<_, BigDecimal>(
            "SELECT balance FROM token_balances
             WHERE contract_address = $1 AND holder_address = $2",
        )
        .bind(contract)
        .bind(holder)
        .fetch_optional(&self.pool)
        .await?;
        Ok(result)
    }

    async fn get_token(&self, contract: &str) -> anyhow::Result<Option<TokenInfo>> {
        let result =
            sqlx::query_as::<_, TokenInfo>("SELECT * FROM token_info WHERE contract_address = $1")
                .bind(contract)
                .fetch_optional(&self.pool)
                .await?;
        Ok(result)
    }

    async fn upsert_token(&self, token: &TokenInfo) -> anyhow::Result<()> {
        let _ = sqlx::query(
            "INSERT INTO token_info
               (contract_address, name, symbol, decimals, total_supply, holder_count, transfer_count)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (contract_address) DO UPDATE SET
               name = EXCLUDED.name,
               symbol = EXCLUDED.symbol,
               decimals = EXCLUDED.decimals,
               total_supply = EXCLUDED.total_supply",
        )
        .bind(&token.contract_address)
        .bind(&token.name)
        .bind(&token.symbol)
        .bind(token.decimals)
        .bind(&token.total_supply)
        .bind(token.holder_count)
        .bind(token.transfer_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_transfer_count(&self, contract: &str, delta: i64) -> anyhow::Result<()> {
        let _ = sqlx::query(
            "UPDATE token_info SET transfer_count = transfer_count + $2 WHERE contract_address = $1",
        )
        .bind(contract)
        .bind(delta)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_tokens(&self) -> anyhow::Result<Vec<TokenInfo>> {
        let result =
            sqlx::query_as::<_, TokenInfo>("SELECT * FROM token_info ORDER BY contract_address")
                .fetch_all(&self.pool)
                .await?;
        Ok(result)
    }

    async fn count_holders(&self, contract: &str) -> anyhow::Result<i64> {
        let result = sqlx::query_as::<_, Count>(
            "SELECT count(*) as count FROM token_balances
             WHERE contract_address = $1 AND balance <> 0",
        )
        .bind(contract)
        .fetch_one(&self.pool)
        .await?;
        Ok(result.count)
    }

    async fn set_holder_count(&self, contract: &str, count: i64) -> anyhow::Result<()> {
        let _ =
            sqlx::query("UPDATE token_info SET holder_count = $2 WHERE contract_address = $1")
                .bind(contract)
                .bind(count)
                .execute(&self.pool)
                .await?;
        Ok(())
    }

    async fn recompute_percentages(
        &self,
        contract: &str,
        total_supply: &BigDecimal,
    ) -> anyhow::Result<()> {
        let _ = sqlx::query(
            "UPDATE token_balances
             SET percentage = (100 * balance / $2)::float8
             WHERE contract_address = $1",
        )
        .bind(contract)
        .bind(total_supply)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
