use anyhow::{anyhow, Context};
use async_trait::async_trait;
use primitive_types::U256;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

use super::{ChainClient, NodeRole, RawBlock, RawTransactionInfo, TokenMetadata};
use crate::config::NodeConfig;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// HTTP client for the node wallet API. The fast role is served from the
/// `wallet/` path prefix, the confirmed role from `walletsolidity/`.
pub struct HttpChainClient {
    http: reqwest::Client,
    fast_base: String,
    confirmed_base: String,
}

impl HttpChainClient {
    pub fn new(cfg: &NodeConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(cfg.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            fast_base: cfg.fast_address.trim_end_matches('/').to_owned(),
            confirmed_base: cfg.confirmed_address.trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, role: NodeRole, method: &str) -> String {
        match role {
            NodeRole::Fast => format!("{}/wallet/{}", self.fast_base, method),
            NodeRole::Confirmed => format!("{}/walletsolidity/{}", self.confirmed_base, method),
        }
    }

    async fn post<T: DeserializeOwned>(
        &self,
        role: NodeRole,
        method: &str,
        body: serde_json::Value,
    ) -> anyhow::Result<T> {
        let url = self.url(role, method);
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("request failed: url={}", url))?
            .error_for_status()
            .with_context(|| format!("bad status: url={}", url))?;

        let parsed = resp
            .json::<T>()
            .await
            .with_context(|| format!("invalid response body: url={}", url))?;
        Ok(parsed)
    }

    async fn constant_call(&self, contract: &str, selector: &str) -> anyhow::Result<Vec<u8>> {
        let body = json!({
            "owner_address": "410000000000000000000000000000000000000000",
            "contract_address": contract,
            "function_selector": selector,
        });

        let resp: serde_json::Value = self
            .post(NodeRole::Fast, "triggerconstantcontract", body)
            .await?;

        let word = resp
            .get("constant_result")
            .and_then(|r| r.get(0))
            .and_then(|r| r.as_str())
            .ok_or_else(|| anyhow!("no constant_result: contract={} fn={}", contract, selector))?;

        Ok(hex::decode(word.trim_start_matches("0x"))?)
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn head_number(&self, role: NodeRole) -> anyhow::Result<i64> {
        let block: RawBlock = self.post(role, "getnowblock", json!({})).await?;
        if block.block_id.is_empty() {
            return Err(anyhow!("empty head block response"));
        }
        Ok(block.block_header.raw_data.number)
    }

    async fn block_by_num(&self, role: NodeRole, num: i64) -> anyhow::Result<Option<RawBlock>> {
        // A node that does not have the block yet answers with an empty
        // JSON object rather than an error.
        let value: serde_json::Value = self.post(role, "getblockbynum", json!({"num": num})).await?;
        if value.get("blockID").is_none() {
            return Ok(None);
        }
        let block: RawBlock = serde_json::from_value(value)?;
        Ok(Some(block))
    }

    async fn transaction_infos(
        &self,
        role: NodeRole,
        num: i64,
    ) -> anyhow::Result<Vec<RawTransactionInfo>> {
        self.post(role, "gettransactioninfobyblocknum", json!({"num": num}))
            .await
    }

    async fn token_metadata(&self, contract: &str) -> anyhow::Result<Option<TokenMetadata>> {
        let name = self.constant_call(contract, "name()").await;
        let Ok(name) = name else {
            // contracts without a token interface are not an error
            return Ok(None);
        };

        let symbol = self.constant_call(contract, "symbol()").await?;
        let decimals = self.constant_call(contract, "decimals()").await?;
        let total_supply = self.constant_call(contract, "totalSupply()").await?;

        Ok(Some(TokenMetadata {
            name: decode_abi_string(&name),
            symbol: decode_abi_string(&symbol),
            decimals: decode_abi_uint(&decimals)
                .to_string()
                .parse()
                .unwrap_or_default(),
            total_supply: decode_abi_uint(&total_supply).to_string(),
        }))
    }
}

/// Decode an ABI-encoded return value as a string. Standard encoding is
/// offset word + length word + bytes; some legacy tokens return a single
/// zero-padded word instead.
pub(crate) fn decode_abi_string(data: &[u8]) -> String {
    if data.len() >= 64 {
        let len_word = U256::from_big_endian(&data[32..64]);
        if len_word <= U256::from(data.len()) {
            let end = 64 + len_word.as_usize();
            if end <= data.len() {
                return String::from_utf8_lossy(&data[64..end]).into_owned();
            }
        }
    }

    let trimmed: Vec<u8> = data.iter().copied().filter(|b| *b != 0).collect();
    String::from_utf8_lossy(&trimmed).into_owned()
}

/// Decode the last 32-byte word of an ABI return value as an unsigned int.
pub(crate) fn decode_abi_uint(data: &[u8]) -> U256 {
    if data.is_empty() {
        return U256::zero();
    }
    let mut word = [0u8; 32];
    if data.len() >= 32 {
        word.copy_from_slice(&data[data.len() - 32..]);
    } else {
        word[32 - data.len()..].copy_from_slice(data);
    }
    U256::from_big_endian(&word)
}
