//! Message codec: one Message to/from a transport payload (JSON object).
//!
//! Keys on the wire: `id`, `username`, `value`, `timestamp`, `languageCode`,
//! `translationLanguageCode`, `translatedValue`. All are required, empty or not.

use crate::message::Message;

/// Serialize a message into a transport payload.
pub fn encode_message(message: &Message) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(message).map_err(CodecError::Encode)
}

/// Parse a transport payload into a message.
pub fn decode_message(bytes: &[u8]) -> Result<Message, CodecError> {
    serde_json::from_slice(bytes).map_err(CodecError::Decode)
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("decode error: {0}")]
    Decode(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_all_fields() {
        let m = Message::new("Ana's iPhone", "hallo wereld", "2/6/20, 10:13 AM")
            .with_language("nl")
            .translated("en", "hello world".to_string());
        let decoded = decode_message(&encode_message(&m).unwrap()).unwrap();
        assert_eq!(decoded, m);
    }

    #[test]
    fn roundtrip_empty_strings() {
        let m = Message::new("", "", "");
        let decoded = decode_message(&encode_message(&m).unwrap()).unwrap();
        assert_eq!(decoded, m);
        assert_eq!(decoded.translated_value(), "");
    }

    #[test]
    fn wire_keys() {
        let m = Message::new("ana", "hi", "now");
        let v: serde_json::Value = serde_json::from_slice(&encode_message(&m).unwrap()).unwrap();
        let obj = v.as_object().unwrap();
        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            [
                "id",
                "languageCode",
                "timestamp",
                "translatedValue",
                "translationLanguageCode",
                "username",
                "value"
            ]
        );
    }

    #[test]
    fn missing_key_rejected() {
        let json = br#"{"id":"6f1c0f5e-4a59-4a8e-9d43-6f3a1b2f7c10","username":"a","value":"b","timestamp":"","languageCode":"","translationLanguageCode":""}"#;
        assert!(matches!(decode_message(json), Err(CodecError::Decode(_))));
    }

    #[test]
    fn garbage_rejected() {
        assert!(decode_message(b"\x00\x01not json").is_err());
    }
}
