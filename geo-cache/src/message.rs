//! Wire format for replicated writes.
//!
//! Every local write becomes one JSON object sent to each peer over its own
//! TCP connection:
//!
//! ```text
//! {"action": "set", "key": <any>, "value": <any>, "version": <int>, "region": <string>}
//! ```
//!
//! There is no framing: the sender closes the connection after writing, and
//! the receiver decodes whatever arrived, up to [`MAX_MESSAGE_BYTES`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Receive buffer size on the listener side. Larger payloads arrive
/// truncated and fail to decode.
pub const MAX_MESSAGE_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    #[default]
    Set,
}

/// One replicated write, produced by the writer's region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message<K, V> {
    #[serde(default)]
    pub action: Action,
    pub key: K,
    pub value: V,
    pub version: u64,
    pub region: String,
}

impl<K, V> Message<K, V> {
    pub fn set(key: K, value: V, version: u64, region: impl Into<String>) -> Self {
        Self {
            action: Action::Set,
            key,
            value,
            version,
            region: region.into(),
        }
    }
}

impl<K, V> Message<K, V>
where
    K: Serialize,
    V: Serialize,
{
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("failed to encode replication message")
    }
}

impl<K, V> Message<K, V>
where
    K: DeserializeOwned,
    V: DeserializeOwned,
{
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("failed to decode replication message")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encodes_documented_shape() {
        let message = Message::set("a".to_string(), "1".to_string(), 3, "us-east");
        let encoded: serde_json::Value =
            serde_json::from_slice(&message.encode().expect("encode")).expect("valid json");
        assert_eq!(
            encoded,
            json!({"action": "set", "key": "a", "value": "1", "version": 3, "region": "us-east"})
        );
    }

    #[test]
    fn decodes_schema_free_values() {
        let raw = br#"{"action": "set", "key": "user:1", "value": {"name": "ana", "tags": [1, 2]}, "version": 2, "region": "eu"}"#;
        let message: Message<String, serde_json::Value> = Message::decode(raw).expect("decode");
        assert_eq!(message.key, "user:1");
        assert_eq!(message.value["tags"], json!([1, 2]));
        assert_eq!(message.version, 2);
        assert_eq!(message.region, "eu");
    }

    #[test]
    fn missing_action_defaults_to_set() {
        let raw = br#"{"key": "a", "value": "1", "version": 1, "region": "us-west"}"#;
        let message: Message<String, String> = Message::decode(raw).expect("decode");
        assert_eq!(message.action, Action::Set);
    }

    #[test]
    fn rejects_malformed_payloads() {
        let cases: [&[u8]; 4] = [
            b"not json",
            br#"{"action": "delete", "key": "a", "value": "1", "version": 1, "region": "r"}"#,
            br#"{"action": "set", "key": "a", "value": "1", "version": -1, "region": "r"}"#,
            br#"{"action": "set", "key": "a", "value": "1", "region": "r"}"#,
        ];
        for raw in cases {
            assert!(Message::<String, String>::decode(raw).is_err());
        }
    }

    #[test]
    fn truncated_payload_fails_to_decode() {
        let message = Message::set("big".to_string(), "x".repeat(MAX_MESSAGE_BYTES), 1, "r");
        let encoded = message.encode().expect("encode");
        assert!(encoded.len() > MAX_MESSAGE_BYTES);
        assert!(Message::<String, String>::decode(&encoded[..MAX_MESSAGE_BYTES]).is_err());
    }
}
