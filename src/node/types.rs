use serde::{Deserialize, Serialize};

/// Block as returned by the node HTTP API. Unknown fields are ignored,
/// missing fields default so that partially populated responses still parse.
#[derive(Default, Clone, Debug, Deserialize, Serialize)]
pub struct RawBlock {
    #[serde(rename = "blockID", default)]
    pub block_id: String,
    #[serde(default)]
    pub block_header: RawBlockHeader,
    #[serde(default)]
    pub transactions: Vec<RawTransaction>,
}

#[derive(Default, Clone, Debug, Deserialize, Serialize)]
pub struct RawBlockHeader {
    #[serde(default)]
    pub raw_data: RawBlockHeaderData,
}

#[derive(Default, Clone, Debug, Deserialize, Serialize)]
pub struct RawBlockHeaderData {
    #[serde(default)]
    pub number: i64,
    #[serde(rename = "parentHash", default)]
    pub parent_hash: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub witness_address: String,
    #[serde(default)]
    pub version: i32,
}

#[derive(Default, Clone, Debug, Deserialize, Serialize)]
pub struct RawTransaction {
    #[serde(rename = "txID", default)]
    pub tx_id: String,
    #[serde(default)]
    pub raw_data: RawTransactionData,
    #[serde(default)]
    pub ret: Vec<RawTransactionRet>,
}

#[derive(Default, Clone, Debug, Deserialize, Serialize)]
pub struct RawTransactionData {
    #[serde(default)]
    pub contract: Vec<RawContractCall>,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub expiration: i64,
}

#[derive(Default, Clone, Debug, Deserialize, Serialize)]
pub struct RawContractCall {
    #[serde(rename = "type", default)]
    pub contract_type: String,
    #[serde(default)]
    pub parameter: RawContractParameter,
}

#[derive(Default, Clone, Debug, Deserialize, Serialize)]
pub struct RawContractParameter {
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub type_url: String,
}

#[derive(Default, Clone, Debug, Deserialize, Serialize)]
pub struct RawTransactionRet {
    #[serde(rename = "contractRet", default)]
    pub contract_ret: String,
}

/// Post-execution info for one transaction: fee, resource receipt,
/// outcome, event logs and internal transactions.
#[derive(Default, Clone, Debug, Deserialize, Serialize)]
pub struct RawTransactionInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub fee: i64,
    #[serde(rename = "blockNumber", default)]
    pub block_number: i64,
    #[serde(rename = "blockTimeStamp", default)]
    pub block_timestamp: i64,
    #[serde(default)]
    pub receipt: RawReceipt,
    #[serde(default)]
    pub log: Vec<RawLog>,
    #[serde(default)]
    pub contract_address: String,
    #[serde(default)]
    pub internal_transactions: Vec<RawInternalTx>,
    #[serde(default)]
    pub result: Option<String>,
}

#[derive(Default, Clone, Debug, Deserialize, Serialize)]
pub struct RawReceipt {
    #[serde(default)]
    pub energy_usage_total: i64,
    #[serde(default)]
    pub net_usage: i64,
    #[serde(default)]
    pub result: Option<String>,
}

#[derive(Default, Clone, Debug, Deserialize, Serialize)]
pub struct RawLog {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

#[derive(Default, Clone, Debug, Deserialize, Serialize)]
pub struct RawInternalTx {
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub caller_address: String,
    #[serde(rename = "transferTo_address", default)]
    pub to_address: String,
    #[serde(default)]
    pub rejected: bool,
    #[serde(rename = "callValueInfo", default)]
    pub call_value_info: Vec<RawCallValue>,
}

#[derive(Default, Clone, Debug, Deserialize, Serialize)]
pub struct RawCallValue {
    #[serde(rename = "callValue", default)]
    pub call_value: i64,
    #[serde(default)]
    pub token_id: String,
}

/// Token contract metadata used for token registration.
#[derive(Default, Clone, Debug, Deserialize, Serialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: i32,
    pub total_supply: String,
}
