use {
    super::{Codec, CodecError, Payload},
    filegate_protocol::{ENCRYPTED_PAYLOAD_FIELD, EncryptedBody, EnvelopeSecret},
    serde_json::{Map, Value},
    thiserror::Error,
    tracing::debug,
};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to decrypt payload: {0}")]
    InvalidEncryptedPayload(String),
    #[error("Failed to encrypt response: {0}")]
    EncryptionFailed(#[source] CodecError),
}

/// Request body after classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub body: Map<String, Value>,
    /// Whether the body arrived as an envelope.
    pub encrypted: bool,
}

/// Encryption capability of a process.
///
/// Without a codec only the plaintext path is available: encrypted requests
/// are rejected and encryption requested for responses is not applied.
#[derive(Debug, Clone, Default)]
pub struct Transport {
    codec: Option<Codec>,
}

impl Transport {
    #[must_use]
    #[inline]
    pub fn new(codec: Option<Codec>) -> Self {
        Self { codec }
    }

    #[must_use]
    #[inline]
    pub fn from_secret(secret: Option<&EnvelopeSecret>) -> Self {
        Self::new(secret.map(|secret| Codec::new(&secret.derive_key())))
    }

    #[must_use]
    #[inline]
    pub fn is_capable(&self) -> bool {
        self.codec.is_some()
    }

    #[inline]
    pub fn codec(&self) -> Result<&Codec, CodecError> {
        self.codec.as_ref().ok_or(CodecError::Configuration)
    }

    /// Returns the effective request body.
    ///
    /// A body is encrypted iff it is an object holding a non-empty string under
    /// `encrypted_payload`. Anything else takes the plaintext path: objects are
    /// returned as is, other values become an empty object.
    #[inline]
    pub fn classify_and_decrypt(&self, body: Value) -> Result<Classified, TransportError> {
        let Value::Object(body) = body else {
            return Ok(Classified {
                body: Map::new(),
                encrypted: false,
            });
        };
        let envelope = match body.get(ENCRYPTED_PAYLOAD_FIELD) {
            Some(Value::String(envelope)) if !envelope.is_empty() => envelope,
            _ => {
                return Ok(Classified {
                    body,
                    encrypted: false,
                });
            }
        };

        let payload = self
            .codec()
            .and_then(|codec| codec.decrypt_payload(envelope))
            .map_err(|err| {
                debug!(?err, "rejected encrypted payload");
                TransportError::InvalidEncryptedPayload(err.to_string())
            })?;
        let body = match payload {
            Payload::Structured(map) => map,
            Payload::Raw(bytes) => {
                let text = String::from_utf8(bytes).map_err(|_utf8_error| {
                    TransportError::InvalidEncryptedPayload(
                        "Decrypted payload is not valid JSON".into(),
                    )
                })?;
                serde_json::from_str::<Map<String, Value>>(&text).map_err(|_json_error| {
                    TransportError::InvalidEncryptedPayload(
                        "Decrypted payload is not valid JSON".into(),
                    )
                })?
            }
        };
        Ok(Classified {
            body,
            encrypted: true,
        })
    }

    #[must_use]
    #[inline]
    pub fn should_encrypt(&self, client_requested_encryption: bool) -> bool {
        client_requested_encryption && self.is_capable()
    }

    /// Seals `data` into `{"encrypted_payload": ...}` if the client asked for it
    /// and a key is configured; returns it unchanged otherwise.
    #[inline]
    pub fn wrap_response(
        &self,
        data: Map<String, Value>,
        client_requested_encryption: bool,
    ) -> Result<Map<String, Value>, TransportError> {
        if !self.should_encrypt(client_requested_encryption) {
            return Ok(data);
        }
        let envelope = self
            .codec()
            .and_then(|codec| codec.encrypt_payload(data))
            .map_err(TransportError::EncryptionFailed)?;
        Ok(EncryptedBody::new(envelope).into_json())
    }
}
