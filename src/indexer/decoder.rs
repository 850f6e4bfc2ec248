//! Pure decoding of raw event log topics/data into named, typed fields.
//! No I/O, no state; decoding never fails outright. Unknown or malformed
//! events degrade to a generic hex representation.

use primitive_types::U256;

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_SIGNATURE: &str =
    "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";
/// keccak256("Approval(address,address,uint256)")
pub const APPROVAL_SIGNATURE: &str =
    "8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925";

pub const TRANSFER_EVENT: &str = "Transfer";
pub const APPROVAL_EVENT: &str = "Approval";
pub const UNKNOWN_EVENT: &str = "UnknownEvent";

struct KnownEvent {
    signature: &'static str,
    name: &'static str,
    /// Names of the indexed address parameters, read positionally from
    /// topics 1..=n.
    indexed: &'static [&'static str],
    /// Name of the uint256 amount carried in the final data word.
    amount: &'static str,
}

static KNOWN_EVENTS: &[KnownEvent] = &[
    KnownEvent {
        signature: TRANSFER_SIGNATURE,
        name: TRANSFER_EVENT,
        indexed: &["from", "to"],
        amount: "value",
    },
    KnownEvent {
        signature: APPROVAL_SIGNATURE,
        name: APPROVAL_EVENT,
        indexed: &["owner", "spender"],
        amount: "value",
    },
];

#[derive(Debug, Clone, PartialEq)]
pub struct EventField {
    pub name: String,
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub name: String,
    /// Raw signature word (topic 0), normalized hex. Empty when the log
    /// carried no topics.
    pub signature: String,
    pub fields: Vec<EventField>,
}

impl DecodedEvent {
    pub fn field(&self, name: &str) -> Option<&EventField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// name -> value mapping as stored on the event record.
    pub fn result_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for f in &self.fields {
            map.insert(f.name.clone(), serde_json::Value::String(f.value.clone()));
        }
        serde_json::Value::Object(map)
    }

    /// name -> declared type mapping as stored on the event record.
    pub fn result_type_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for f in &self.fields {
            map.insert(f.name.clone(), serde_json::Value::String(f.kind.clone()));
        }
        serde_json::Value::Object(map)
    }
}

/// Decode one event log. Topics are 32-byte words as hex strings, data is
/// the raw payload as a hex string. Total: any input yields a decoded
/// event, falling back to `UnknownEvent` with hex fields.
pub fn decode_event(topics: &[String], data: &str) -> DecodedEvent {
    let signature = topics.first().map(|t| normalize_hex(t)).unwrap_or_default();

    if let Some(known) = KNOWN_EVENTS.iter().find(|k| k.signature == signature) {
        if let Some(fields) = decode_known(known, topics, data) {
            return DecodedEvent {
                name: known.name.to_owned(),
                signature,
                fields,
            };
        }
    }

    decode_fallback(topics, data, signature)
}

fn decode_known(known: &KnownEvent, topics: &[String], data: &str) -> Option<Vec<EventField>> {
    if topics.len() < known.indexed.len() + 1 {
        return None;
    }

    let mut fields = Vec::with_capacity(known.indexed.len() + 1);
    for (i, name) in known.indexed.iter().enumerate() {
        let address = address_from_word(&topics[i + 1])?;
        fields.push(EventField {
            name: (*name).to_owned(),
            kind: "address".to_owned(),
            value: address,
        });
    }

    let amount = uint_from_data(data)?;
    fields.push(EventField {
        name: known.amount.to_owned(),
        kind: "uint256".to_owned(),
        value: amount,
    });

    Some(fields)
}

fn decode_fallback(topics: &[String], data: &str, signature: String) -> DecodedEvent {
    let mut fields = Vec::new();

    for (i, topic) in topics.iter().enumerate().skip(1) {
        fields.push(EventField {
            name: format!("topic{}", i),
            kind: "bytes32".to_owned(),
            value: normalize_hex(topic),
        });
    }

    let data = normalize_hex(data);
    if !data.is_empty() {
        fields.push(EventField {
            name: "data".to_owned(),
            kind: "bytes".to_owned(),
            value: data,
        });
    }

    DecodedEvent {
        name: UNKNOWN_EVENT.to_owned(),
        signature,
        fields,
    }
}

pub fn normalize_hex(s: &str) -> String {
    s.trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X")
        .to_ascii_lowercase()
}

/// Last 20 bytes of a 32-byte topic word, as plain hex.
fn address_from_word(word: &str) -> Option<String> {
    let bytes = hex::decode(normalize_hex(word)).ok()?;
    if bytes.len() != 32 {
        return None;
    }
    Some(hex::encode(&bytes[12..]))
}

/// Final 32-byte word of the data payload as an unsigned decimal string.
/// Shorter payloads are left-padded.
fn uint_from_data(data: &str) -> Option<String> {
    let bytes = hex::decode(normalize_hex(data)).ok()?;
    if bytes.is_empty() {
        return None;
    }

    let mut word = [0u8; 32];
    if bytes.len() >= 32 {
        word.copy_from_slice(&bytes[bytes.len() - 32..]);
    } else {
        word[32 - bytes.len()..].copy_from_slice(&bytes);
    }
    Some(U256::from_big_endian(&word).to_string())
}
