//! Transaction contract parameters as a tagged variant, decoded once from
//! the raw JSON payload. Unknown contract types keep the raw payload so
//! nothing is lost.

use serde::Deserialize;

#[derive(Default, Clone, Debug, PartialEq, Deserialize)]
pub struct TransferParams {
    #[serde(default)]
    pub owner_address: String,
    #[serde(default)]
    pub to_address: String,
    #[serde(default)]
    pub amount: i64,
}

#[derive(Default, Clone, Debug, PartialEq, Deserialize)]
pub struct TransferAssetParams {
    #[serde(default)]
    pub owner_address: String,
    #[serde(default)]
    pub to_address: String,
    #[serde(default)]
    pub asset_name: String,
    #[serde(default)]
    pub amount: i64,
}

#[derive(Default, Clone, Debug, PartialEq, Deserialize)]
pub struct TriggerSmartParams {
    #[serde(default)]
    pub owner_address: String,
    #[serde(default)]
    pub contract_address: String,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub call_value: i64,
}

#[derive(Default, Clone, Debug, PartialEq, Deserialize)]
pub struct CreateSmartParams {
    #[serde(default)]
    pub owner_address: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ContractCall {
    Transfer(TransferParams),
    TransferAsset(TransferAssetParams),
    TriggerSmart(TriggerSmartParams),
    CreateSmart(CreateSmartParams),
    Unknown {
        type_name: String,
        raw: serde_json::Value,
    },
}

impl ContractCall {
    /// Decode a contract parameter payload by its type discriminator.
    /// Total: a malformed payload or an unrecognized type becomes
    /// `Unknown` with the raw value preserved.
    pub fn decode(type_name: &str, value: &serde_json::Value) -> Self {
        let unknown = || ContractCall::Unknown {
            type_name: type_name.to_owned(),
            raw: value.clone(),
        };

        match type_name {
            "TransferContract" => serde_json::from_value(value.clone())
                .map(ContractCall::Transfer)
                .unwrap_or_else(|_| unknown()),
            "TransferAssetContract" => serde_json::from_value(value.clone())
                .map(ContractCall::TransferAsset)
                .unwrap_or_else(|_| unknown()),
            "TriggerSmartContract" => serde_json::from_value(value.clone())
                .map(ContractCall::TriggerSmart)
                .unwrap_or_else(|_| unknown()),
            "CreateSmartContract" => serde_json::from_value(value.clone())
                .map(ContractCall::CreateSmart)
                .unwrap_or_else(|_| unknown()),
            _ => unknown(),
        }
    }

    pub fn from_address(&self) -> &str {
        match self {
            ContractCall::Transfer(p) => &p.owner_address,
            ContractCall::TransferAsset(p) => &p.owner_address,
            ContractCall::TriggerSmart(p) => &p.owner_address,
            ContractCall::CreateSmart(p) => &p.owner_address,
            ContractCall::Unknown { .. } => "",
        }
    }

    pub fn to_address(&self) -> &str {
        match self {
            ContractCall::Transfer(p) => &p.to_address,
            ContractCall::TransferAsset(p) => &p.to_address,
            _ => "",
        }
    }

    pub fn contract_address(&self) -> &str {
        match self {
            ContractCall::TriggerSmart(p) => &p.contract_address,
            _ => "",
        }
    }

    pub fn amount(&self) -> i64 {
        match self {
            ContractCall::Transfer(p) => p.amount,
            ContractCall::TransferAsset(p) => p.amount,
            ContractCall::TriggerSmart(p) => p.call_value,
            _ => 0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ContractCall::Unknown { .. })
    }
}
