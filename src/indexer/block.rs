//! Normalizes one fetched block into a persisted block record.

use crate::db;
use crate::node::RawBlock;

pub fn build_block(raw: &RawBlock) -> db::Block {
    let header = &raw.block_header.raw_data;

    db::Block {
        number: header.number,
        hash: raw.block_id.clone(),
        parent_hash: header.parent_hash.clone(),
        timestamp: header.timestamp,
        witness_address: header.witness_address.clone(),
        tx_count: raw.transactions.len() as i32,
        size: approximate_size(raw),
        version: header.version,
    }
}

fn approximate_size(raw: &RawBlock) -> i32 {
    serde_json::to_vec(raw).map(|v| v.len() as i32).unwrap_or(0)
}
