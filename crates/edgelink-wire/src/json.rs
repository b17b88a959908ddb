//! JSON helpers for the gateway's REST representation of records.
//!
//! The gateway serializes blob fields as base64 strings (and `null` for an
//! absent blob); everything else is plain JSON with all-lowercase keys.

/// Serde adapter for `Vec<u8>` blob fields carried as base64 strings.
pub mod base64_blob {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let value = Option::<String>::deserialize(deserializer)?;
        match value {
            None => Ok(Vec::new()),
            Some(encoded) => STANDARD
                .decode(encoded.as_bytes())
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::message::MessageRecord;

    #[test]
    fn json_keys_match_gateway_contract() {
        let mut record = MessageRecord::new();
        record.group_id = "grp".to_string();
        record.sequence_number = 2;
        record.previous_hash = "aa".to_string();
        record.content_data = vec![1, 2, 3];

        let value = serde_json::to_value(&record).unwrap();
        let obj = value.as_object().unwrap();

        for key in [
            "id",
            "tag",
            "groupid",
            "sequencenumber",
            "sequencetotal",
            "priority",
            "timestamp",
            "publisher",
            "authid",
            "authgroup",
            "version",
            "chainposition",
            "hash",
            "previoushash",
            "nonce",
            "difficultytarget",
            "infotype",
            "infoformat",
            "contextdata",
            "contentdata",
        ] {
            assert!(obj.contains_key(key), "missing key {key}");
        }
        assert_eq!(obj.len(), 20);
    }

    #[test]
    fn blobs_are_base64_strings() {
        let mut record = MessageRecord::new();
        record.content_data = vec![1, 2, 3];

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["contentdata"], "AQID");
        assert_eq!(value["contextdata"], "");
    }

    #[test]
    fn json_roundtrip() {
        let mut record = MessageRecord::new();
        record.id = "m1".to_string();
        record.publisher = "agentA".to_string();
        record.timestamp = 1_700_000_000_000;
        record.context_data = vec![0xDE, 0xAD];
        record.content_data = vec![0xBE, 0xEF];

        let text = serde_json::to_string(&record).unwrap();
        let back: MessageRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn missing_and_null_fields_default() {
        let back: MessageRecord =
            serde_json::from_str(r#"{"publisher":"p","contentdata":null}"#).unwrap();
        assert_eq!(back.publisher, "p");
        assert_eq!(back.version, crate::PROTOCOL_VERSION);
        assert!(back.content_data.is_empty());
        assert_eq!(back.sequence_number, 0);
    }
}
