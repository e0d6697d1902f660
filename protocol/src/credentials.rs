use {
    anyhow::{Error, ensure},
    serde::{Deserialize, Deserializer, Serialize, Serializer, de},
    sha2::{Digest, Sha256},
    std::{
        borrow::Cow,
        fmt::{self, Debug},
        str::FromStr,
    },
};

/// Length of the envelope key in bytes.
pub const KEY_LENGTH: usize = 32;

const HEX_SECRET_LENGTH: usize = 2 * KEY_LENGTH;

/// Shared secret the envelope key is derived from.
///
/// The same value must be configured on the server and on every client that
/// wants to exchange encrypted payloads with it.
#[derive(Clone, PartialEq, Eq)]
pub struct EnvelopeSecret(String);

impl EnvelopeSecret {
    #[must_use]
    #[inline]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    #[must_use]
    #[inline]
    pub fn as_unmasked_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    #[inline]
    pub fn derive_key(&self) -> EnvelopeKey {
        EnvelopeKey::derive(&self.0)
    }
}

impl FromStr for EnvelopeSecret {
    type Err = Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ensure!(!s.is_empty(), "envelope secret cannot be empty");
        Ok(Self(s.to_owned()))
    }
}

impl<'de> Deserialize<'de> for EnvelopeSecret {
    #[inline]
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Cow::<'_, str>::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }
}

impl Serialize for EnvelopeSecret {
    #[inline]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl Debug for EnvelopeSecret {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeSecret").finish()
    }
}

/// 256-bit key used for all envelope operations of a process.
#[derive(Clone, PartialEq, Eq)]
pub struct EnvelopeKey([u8; KEY_LENGTH]);

impl EnvelopeKey {
    /// Derives the key from a configured secret.
    ///
    /// A secret of exactly 64 hex digits is taken as the hex encoding of the key.
    /// Any other secret is hashed with SHA-256.
    #[must_use]
    #[inline]
    pub fn derive(secret: &str) -> Self {
        if secret.len() == HEX_SECRET_LENGTH && secret.bytes().all(|b| b.is_ascii_hexdigit()) {
            let mut key = [0u8; KEY_LENGTH];
            if hex::decode_to_slice(secret, &mut key).is_ok() {
                return Self(key);
            }
        }
        Self(Sha256::digest(secret.as_bytes()).into())
    }

    #[must_use]
    #[inline]
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }
}

impl Debug for EnvelopeKey {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeKey").finish()
    }
}

/// Bearer token issued by `/auth/login`.
#[derive(Clone, Deserialize, Serialize)]
pub struct AccessToken(String);

impl AccessToken {
    #[must_use]
    #[inline]
    pub fn new(token: String) -> Self {
        Self(token)
    }

    #[must_use]
    #[inline]
    pub fn as_unmasked_str(&self) -> &str {
        &self.0
    }
}

impl Debug for AccessToken {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken").finish()
    }
}
