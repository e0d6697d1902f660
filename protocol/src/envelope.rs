//! Envelope wire format.
//!
//! An envelope is the standard base64 encoding (with padding) of
//! `nonce (12 bytes) || ciphertext || tag (16 bytes)` produced by AES-256-GCM
//! without associated data. It travels inside a JSON object under the
//! [`ENCRYPTED_PAYLOAD_FIELD`] key, both in requests and in responses.

use {
    derive_more::{AsRef, Display, Into},
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

/// JSON field whose presence marks a body as encrypted.
pub const ENCRYPTED_PAYLOAD_FIELD: &str = "encrypted_payload";

pub const NONCE_LENGTH: usize = 12;
pub const TAG_LENGTH: usize = 16;

/// Base64 text of a sealed payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, AsRef, Display, Into)]
#[serde(transparent)]
pub struct Envelope(String);

impl Envelope {
    #[must_use]
    #[inline]
    pub fn new(text: String) -> Self {
        Self(text)
    }

    #[must_use]
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Body shape of an encrypted request or response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBody {
    pub encrypted_payload: Envelope,
}

impl EncryptedBody {
    #[must_use]
    #[inline]
    pub fn new(encrypted_payload: Envelope) -> Self {
        Self { encrypted_payload }
    }

    /// The body as a JSON object, ready to be sent or nested.
    #[must_use]
    pub fn into_json(self) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert(
            ENCRYPTED_PAYLOAD_FIELD.into(),
            Value::String(self.encrypted_payload.into()),
        );
        body
    }
}

#[test]
fn encrypted_body_shape() {
    let body = EncryptedBody::new(Envelope::new("AAAA".into()));
    let json = serde_json::to_value(&body).unwrap();
    assert_eq!(json, serde_json::json!({ ENCRYPTED_PAYLOAD_FIELD: "AAAA" }));
    assert_eq!(Value::Object(body.into_json()), json);
}
