//! Builds persisted event records from transaction logs and extracts the
//! token transfers that feed the balance ledger.

use super::decoder::{self, TRANSFER_EVENT};
use crate::db;
use crate::node::RawTransactionInfo;

/// A balance movement extracted from a Transfer event. `value` stays a
/// decimal string until the ledger parses it.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOp {
    pub contract: String,
    pub from: String,
    pub to: String,
    pub value: String,
}

/// Decode every log of a transaction into an event record. Transfer events
/// additionally carry the extracted balance movement.
pub fn build_events(
    info: &RawTransactionInfo,
    block_number: i64,
    block_timestamp: i64,
    unconfirmed: bool,
) -> Vec<(db::Event, Option<TransferOp>)> {
    info.log
        .iter()
        .enumerate()
        .map(|(index, log)| {
            let decoded = decoder::decode_event(&log.topics, &log.data);
            let event = db::Event {
                transaction_id: info.id.clone(),
                event_index: index as i32,
                block_number,
                block_timestamp,
                contract_address: decoder::normalize_hex(&log.address),
                event_name: decoded.name.clone(),
                event_signature: decoded.signature.clone(),
                result: decoded.result_json(),
                result_type: decoded.result_type_json(),
                unconfirmed,
                ledger_applied: false,
            };
            let op = transfer_op_from_event(&event);
            (event, op)
        })
        .collect()
}

/// Re-derive the balance movement from a stored event record. Used when a
/// discarded fork's transfers have to be reversed.
pub fn transfer_op_from_event(event: &db::Event) -> Option<TransferOp> {
    if event.event_name != TRANSFER_EVENT {
        return None;
    }
    let result = event.result.as_object()?;
    let field = |name: &str| result.get(name)?.as_str().map(str::to_owned);
    Some(TransferOp {
        contract: event.contract_address.clone(),
        from: field("from")?,
        to: field("to")?,
        value: field("value")?,
    })
}
