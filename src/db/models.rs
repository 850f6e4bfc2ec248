use serde::Serialize;
use sqlx::prelude::FromRow;

#[derive(Default, Clone, Debug, FromRow, Serialize)]
pub struct SyncCursor {
    pub indexer: String,
    pub height: i64,
}

#[derive(Default, Clone, Debug, PartialEq, FromRow, Serialize)]
pub struct Block {
    pub number: i64,
    pub hash: String,
    pub parent_hash: String,
    pub timestamp: i64,
    pub witness_address: String,
    pub tx_count: i32,
    pub size: i32,
    pub version: i32,
}

#[derive(Default, Clone, Debug, PartialEq, FromRow, Serialize)]
pub struct Transaction {
    pub hash: String,
    pub block_number: i64,
    pub timestamp: i64,
    pub from_address: String,
    pub to_address: String,
    pub contract_address: String,
    pub amount: i64,
    pub fee: i64,
    pub energy_usage: i64,
    pub net_usage: i64,
    pub result: String,
    pub contract_type: String,
    pub internal_transactions: serde_json::Value,
}

impl Transaction {
    pub const RESULT_SUCCESS: &'static str = "success";
    pub const RESULT_FAILED: &'static str = "failed";
}

#[derive(Default, Clone, Debug, PartialEq, FromRow, Serialize)]
pub struct Event {
    pub transaction_id: String,
    pub event_index: i32,
    pub block_number: i64,
    pub block_timestamp: i64,
    pub contract_address: String,
    pub event_name: String,
    pub event_signature: String,
    pub result: serde_json::Value,
    pub result_type: serde_json::Value,
    pub unconfirmed: bool,
    /// Set in the same store transaction as the balance deltas of a
    /// transfer event, so a re-commit of the block never applies the
    /// deltas twice.
    pub ledger_applied: bool,
}

#[derive(Default, Clone, Debug, FromRow, Serialize)]
pub struct TokenInfo {
    pub contract_address: String,
    pub name: String,
    pub symbol: String,
    pub decimals: i32,
    pub total_supply: String,
    pub holder_count: i64,
    pub transfer_count: i64,
}
