use {
    aes_gcm::{
        Aes256Gcm, Key, Nonce,
        aead::{Aead, AeadCore, KeyInit, OsRng},
    },
    base64::{Engine, prelude::BASE64_STANDARD},
    filegate_protocol::{
        EnvelopeKey,
        envelope::{Envelope, NONCE_LENGTH},
    },
    serde::Serialize,
    serde_json::{Map, Value},
    std::fmt,
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encryption key is not configured")]
    Configuration,
    #[error("invalid envelope encoding: {0}")]
    Decode(String),
    #[error("envelope authentication failed")]
    Authentication,
    #[error("payload cannot be serialized: {0}")]
    Serialization(String),
    #[error("encryption failed")]
    Encryption,
}

/// Decrypted content of an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// The plaintext was a UTF-8 JSON object.
    Structured(Map<String, Value>),
    Raw(Vec<u8>),
}

impl Payload {
    #[must_use]
    #[inline]
    pub fn from_plaintext(plaintext: Vec<u8>) -> Self {
        match serde_json::from_slice::<Map<String, Value>>(&plaintext) {
            Ok(map) => Self::Structured(map),
            Err(_) => Self::Raw(plaintext),
        }
    }
}

/// Data accepted by [`Codec::encrypt_payload`].
#[derive(Debug, Clone, PartialEq)]
pub enum Plaintext {
    /// Sealed as its JSON serialization.
    Object(Map<String, Value>),
    /// Sealed as its UTF-8 bytes.
    Text(String),
    Bytes(Vec<u8>),
    /// Any other value is sealed as its string form.
    Other(Value),
}

impl From<Map<String, Value>> for Plaintext {
    #[inline]
    fn from(value: Map<String, Value>) -> Self {
        Self::Object(value)
    }
}

impl From<String> for Plaintext {
    #[inline]
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Plaintext {
    #[inline]
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<Vec<u8>> for Plaintext {
    #[inline]
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for Plaintext {
    #[inline]
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl From<Value> for Plaintext {
    #[inline]
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Object(map),
            Value::String(text) => Self::Text(text),
            other => Self::Other(other),
        }
    }
}

impl Plaintext {
    fn into_bytes(self) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Object(map) => {
                serde_json::to_vec(&map).map_err(|err| CodecError::Serialization(err.to_string()))
            }
            Self::Text(text) => Ok(text.into_bytes()),
            Self::Bytes(bytes) => Ok(bytes),
            Self::Other(value) => Ok(value.to_string().into_bytes()),
        }
    }
}

#[derive(Clone)]
pub struct Codec {
    inner: Aes256Gcm,
}

impl fmt::Debug for Codec {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec").finish_non_exhaustive()
    }
}

impl Codec {
    #[must_use]
    #[inline]
    pub fn new(key: &EnvelopeKey) -> Self {
        Self {
            inner: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes())),
        }
    }

    /// Seals `plaintext` under a fresh random nonce.
    #[inline]
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Envelope, CodecError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .inner
            .encrypt(&nonce, plaintext)
            .map_err(|aes_gcm::Error| CodecError::Encryption)?;

        let mut sealed = Vec::with_capacity(NONCE_LENGTH.saturating_add(ciphertext.len()));
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(Envelope::new(BASE64_STANDARD.encode(sealed)))
    }

    #[inline]
    pub fn decrypt(&self, envelope: &str) -> Result<Vec<u8>, CodecError> {
        let sealed = BASE64_STANDARD
            .decode(envelope)
            .map_err(|err| CodecError::Decode(err.to_string()))?;
        if sealed.len() < NONCE_LENGTH {
            return Err(CodecError::Decode(format!(
                "envelope is {} bytes long, expected at least {NONCE_LENGTH}",
                sealed.len()
            )));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LENGTH);
        self.inner
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|aes_gcm::Error| CodecError::Authentication)
    }

    #[inline]
    pub fn encrypt_payload(&self, data: impl Into<Plaintext>) -> Result<Envelope, CodecError> {
        let plaintext = data.into().into_bytes()?;
        self.encrypt(&plaintext)
    }

    /// Seals the JSON form of any serializable value.
    #[inline]
    pub fn encrypt_serializable<T: Serialize + ?Sized>(
        &self,
        data: &T,
    ) -> Result<Envelope, CodecError> {
        let value =
            serde_json::to_value(data).map_err(|err| CodecError::Serialization(err.to_string()))?;
        self.encrypt_payload(value)
    }

    #[inline]
    pub fn decrypt_payload(&self, envelope: &str) -> Result<Payload, CodecError> {
        self.decrypt(envelope).map(Payload::from_plaintext)
    }
}
