//! Scripted chain client used by pipeline tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::{
    ChainClient, NodeRole, RawBlock, RawBlockHeader, RawBlockHeaderData, RawLog, RawTransaction,
    RawTransactionInfo, TokenMetadata,
};
use crate::indexer::decoder::TRANSFER_SIGNATURE;

#[derive(Default)]
struct ChainSide {
    blocks: BTreeMap<i64, RawBlock>,
    infos: HashMap<i64, Vec<RawTransactionInfo>>,
}

#[derive(Default)]
pub struct MockChain {
    fast: Mutex<ChainSide>,
    confirmed: Mutex<ChainSide>,
    tokens: Mutex<HashMap<String, TokenMetadata>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn side(&self, role: NodeRole) -> &Mutex<ChainSide> {
        match role {
            NodeRole::Fast => &self.fast,
            NodeRole::Confirmed => &self.confirmed,
        }
    }

    pub fn put_block(&self, role: NodeRole, block: RawBlock) {
        let number = block.block_header.raw_data.number;
        self.side(role).lock().unwrap().blocks.insert(number, block);
    }

    pub fn put_infos(&self, role: NodeRole, num: i64, infos: Vec<RawTransactionInfo>) {
        self.side(role).lock().unwrap().infos.insert(num, infos);
    }

    pub fn put_token(&self, contract: &str, meta: TokenMetadata) {
        self.tokens
            .lock()
            .unwrap()
            .insert(contract.to_owned(), meta);
    }

    pub fn drop_blocks_from(&self, role: NodeRole, num: i64) {
        let mut side = self.side(role).lock().unwrap();
        side.blocks.split_off(&num);
        side.infos.retain(|k, _| *k < num);
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn head_number(&self, role: NodeRole) -> anyhow::Result<i64> {
        let side = self.side(role).lock().unwrap();
        side.blocks
            .keys()
            .next_back()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("mock chain is empty"))
    }

    async fn block_by_num(&self, role: NodeRole, num: i64) -> anyhow::Result<Option<RawBlock>> {
        Ok(self.side(role).lock().unwrap().blocks.get(&num).cloned())
    }

    async fn transaction_infos(
        &self,
        role: NodeRole,
        num: i64,
    ) -> anyhow::Result<Vec<RawTransactionInfo>> {
        Ok(self
            .side(role)
            .lock()
            .unwrap()
            .infos
            .get(&num)
            .cloned()
            .unwrap_or_default())
    }

    async fn token_metadata(&self, contract: &str) -> anyhow::Result<Option<TokenMetadata>> {
        Ok(self.tokens.lock().unwrap().get(contract).cloned())
    }
}

pub fn raw_block(number: i64, hash: &str, parent_hash: &str) -> RawBlock {
    RawBlock {
        block_id: hash.to_owned(),
        block_header: RawBlockHeader {
            raw_data: RawBlockHeaderData {
                number,
                parent_hash: parent_hash.to_owned(),
                timestamp: 1_700_000_000_000 + number,
                witness_address: "41da146374a75310b9666e834ee4ad0866d6f4035b".to_owned(),
                version: 28,
            },
        },
        transactions: Vec::new(),
    }
}

pub fn word(hex20: &str) -> String {
    format!("{:0>64}", hex20)
}

pub fn value_data(amount: u64) -> String {
    format!("{:064x}", amount)
}

pub fn transfer_info(
    tx_id: &str,
    block_number: i64,
    contract: &str,
    from: &str,
    to: &str,
    amount: u64,
) -> RawTransactionInfo {
    RawTransactionInfo {
        id: tx_id.to_owned(),
        block_number,
        block_timestamp: 1_700_000_000_000 + block_number,
        log: vec![RawLog {
            address: contract.to_owned(),
            topics: vec![
                TRANSFER_SIGNATURE.to_owned(),
                word(from),
                word(to),
            ],
            data: value_data(amount),
        }],
        ..Default::default()
    }
}

pub fn simple_tx(tx_id: &str) -> RawTransaction {
    RawTransaction {
        tx_id: tx_id.to_owned(),
        ..Default::default()
    }
}
