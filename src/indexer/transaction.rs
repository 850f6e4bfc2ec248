//! Normalizes transactions (and their post-execution info, when available)
//! into persisted transaction records.

use serde::Serialize;
use std::collections::HashMap;

use super::contract::ContractCall;
use crate::db;
use crate::node::{RawBlock, RawInternalTx, RawTransaction, RawTransactionInfo};

/// Internal transaction (sub-call) attached to its owning transaction.
#[derive(Default, Clone, Debug, Serialize)]
pub struct InternalTx {
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value: i64,
    pub rejected: bool,
}

pub fn build_transactions(
    raw: &RawBlock,
    infos: &HashMap<String, RawTransactionInfo>,
) -> Vec<db::Transaction> {
    raw.transactions
        .iter()
        .map(|tx| build_transaction(raw, tx, infos.get(&tx.tx_id)))
        .collect()
}

/// One transaction record, partial when `info` has not been resolved yet:
/// fee, resource usage, outcome and internal transactions are merged in
/// from the info lookup.
pub fn build_transaction(
    raw: &RawBlock,
    tx: &RawTransaction,
    info: Option<&RawTransactionInfo>,
) -> db::Transaction {
    let header = &raw.block_header.raw_data;

    let call = match tx.raw_data.contract.first() {
        Some(c) => {
            let call = ContractCall::decode(&c.contract_type, &c.parameter.value);
            if call.is_unknown() {
                debug!(
                    "unrecognized contract payload: tx={} type={}",
                    tx.tx_id, c.contract_type
                );
            }
            call
        }
        None => {
            warn!("transaction without contract entry: tx={}", tx.tx_id);
            ContractCall::Unknown {
                type_name: String::new(),
                raw: serde_json::Value::Null,
            }
        }
    };

    let contract_type = tx
        .raw_data
        .contract
        .first()
        .map(|c| c.contract_type.clone())
        .unwrap_or_default();

    // the contract address for a trigger call lives in the parameter;
    // for a freshly deployed contract it only shows up in the info
    let mut contract_address = call.contract_address().to_owned();
    if contract_address.is_empty() {
        if let Some(info) = info {
            contract_address = info.contract_address.clone();
        }
    }

    let mut row = db::Transaction {
        hash: tx.tx_id.clone(),
        block_number: header.number,
        timestamp: header.timestamp,
        from_address: call.from_address().to_owned(),
        to_address: call.to_address().to_owned(),
        contract_address,
        amount: call.amount(),
        fee: 0,
        energy_usage: 0,
        net_usage: 0,
        result: outcome(tx, info).to_owned(),
        contract_type,
        internal_transactions: serde_json::Value::Array(Vec::new()),
    };

    if let Some(info) = info {
        row.fee = info.fee;
        row.energy_usage = info.receipt.energy_usage_total;
        row.net_usage = info.receipt.net_usage;

        let internal: Vec<InternalTx> = info
            .internal_transactions
            .iter()
            .map(normalize_internal)
            .collect();
        row.internal_transactions =
            serde_json::to_value(internal).unwrap_or(serde_json::Value::Array(Vec::new()));
    }

    row
}

fn normalize_internal(tx: &RawInternalTx) -> InternalTx {
    InternalTx {
        hash: tx.hash.clone(),
        from: tx.caller_address.clone(),
        to: tx.to_address.clone(),
        value: tx.call_value_info.iter().map(|v| v.call_value).sum(),
        rejected: tx.rejected,
    }
}

fn outcome(tx: &RawTransaction, info: Option<&RawTransactionInfo>) -> &'static str {
    if let Some(result) = info.and_then(|i| i.receipt.result.as_deref()) {
        return if result == "SUCCESS" {
            db::Transaction::RESULT_SUCCESS
        } else {
            db::Transaction::RESULT_FAILED
        };
    }

    match tx.ret.first() {
        Some(ret) if !ret.contract_ret.is_empty() && ret.contract_ret != "SUCCESS" => {
            db::Transaction::RESULT_FAILED
        }
        _ => db::Transaction::RESULT_SUCCESS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::mock::raw_block;
    use crate::node::{
        RawCallValue, RawContractCall, RawContractParameter, RawReceipt, RawTransactionRet,
    };
    use serde_json::json;

    fn transfer_tx(tx_id: &str, amount: i64) -> RawTransaction {
        RawTransaction {
            tx_id: tx_id.to_owned(),
            raw_data: crate::node::RawTransactionData {
                contract: vec![RawContractCall {
                    contract_type: "TransferContract".to_owned(),
                    parameter: RawContractParameter {
                        value: json!({
                            "owner_address": "41aaaa",
                            "to_address": "41bbbb",
                            "amount": amount,
                        }),
                        type_url: String::new(),
                    },
                }],
                ..Default::default()
            },
            ret: vec![RawTransactionRet {
                contract_ret: "SUCCESS".to_owned(),
            }],
        }
    }

    #[test]
    fn partial_record_without_info() {
        let raw = raw_block(7, "b7", "b6");
        let tx = transfer_tx("t1", 100);

        let row = build_transaction(&raw, &tx, None);
        assert_eq!(row.hash, "t1");
        assert_eq!(row.block_number, 7);
        assert_eq!(row.from_address, "41aaaa");
        assert_eq!(row.to_address, "41bbbb");
        assert_eq!(row.amount, 100);
        assert_eq!(row.fee, 0);
        assert_eq!(row.result, db::Transaction::RESULT_SUCCESS);
    }

    #[test]
    fn info_enriches_record() {
        let raw = raw_block(7, "b7", "b6");
        let tx = transfer_tx("t1", 100);
        let info = RawTransactionInfo {
            id: "t1".to_owned(),
            fee: 26_000,
            receipt: RawReceipt {
                energy_usage_total: 13_000,
                net_usage: 268,
                result: Some("SUCCESS".to_owned()),
            },
            ..Default::default()
        };

        let row = build_transaction(&raw, &tx, Some(&info));
        assert_eq!(row.fee, 26_000);
        assert_eq!(row.energy_usage, 13_000);
        assert_eq!(row.net_usage, 268);
        assert_eq!(row.result, db::Transaction::RESULT_SUCCESS);
    }

    #[test]
    fn receipt_failure_overrides_ret() {
        let raw = raw_block(7, "b7", "b6");
        let tx = transfer_tx("t1", 100);
        let info = RawTransactionInfo {
            id: "t1".to_owned(),
            receipt: RawReceipt {
                result: Some("OUT_OF_ENERGY".to_owned()),
                ..Default::default()
            },
            ..Default::default()
        };

        let row = build_transaction(&raw, &tx, Some(&info));
        assert_eq!(row.result, db::Transaction::RESULT_FAILED);
    }

    #[test]
    fn failed_ret_without_info() {
        let raw = raw_block(7, "b7", "b6");
        let mut tx = transfer_tx("t1", 100);
        tx.ret[0].contract_ret = "REVERT".to_owned();

        let row = build_transaction(&raw, &tx, None);
        assert_eq!(row.result, db::Transaction::RESULT_FAILED);
    }

    #[test]
    fn malformed_parameter_keeps_partial_record() {
        let raw = raw_block(7, "b7", "b6");
        let mut tx = transfer_tx("t1", 100);
        tx.raw_data.contract[0].parameter.value = json!({"amount": "garbage"});

        let row = build_transaction(&raw, &tx, None);
        assert_eq!(row.hash, "t1");
        assert_eq!(row.from_address, "");
        assert_eq!(row.amount, 0);
        assert_eq!(row.contract_type, "TransferContract");
    }

    #[test]
    fn internal_transactions_keep_order() {
        let raw = raw_block(7, "b7", "b6");
        let tx = transfer_tx("t1", 100);
        let info = RawTransactionInfo {
            id: "t1".to_owned(),
            internal_transactions: vec![
                RawInternalTx {
                    hash: "i1".to_owned(),
                    caller_address: "41aa".to_owned(),
                    to_address: "41bb".to_owned(),
                    rejected: false,
                    call_value_info: vec![RawCallValue {
                        call_value: 50,
                        token_id: String::new(),
                    }],
                },
                RawInternalTx {
                    hash: "i2".to_owned(),
                    caller_address: "41bb".to_owned(),
                    to_address: "41cc".to_owned(),
                    rejected: true,
                    call_value_info: Vec::new(),
                },
            ],
            ..Default::default()
        };

        let row = build_transaction(&raw, &tx, Some(&info));
        let list = row.internal_transactions.as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["hash"], "i1");
        assert_eq!(list[0]["value"], 50);
        assert_eq!(list[1]["hash"], "i2");
        assert_eq!(list[1]["rejected"], true);
    }
}
