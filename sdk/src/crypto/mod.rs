//! Encrypted transport of request and response bodies.
//!
//! All envelope operations use AES-256-GCM with a 256-bit key derived once per
//! process from a shared secret (see [`EnvelopeKey::derive`]). Every call to
//! [`Codec::encrypt`] draws a fresh random 96-bit nonce from the OS random
//! source. The nonce and the sealed bytes (ciphertext followed by the 128-bit tag)
//! are concatenated and encoded as standard base64:
//!
//! - nonce (96 bits)
//! - ciphertext (same length as the plaintext)
//! - authentication tag (128 bits)
//!
//! Random nonces are safe as long as the number of envelopes sealed under one
//! key stays far below the 2^32 birthday bound for 96-bit values.
//!
//! A body is considered encrypted when it is a JSON object with a non-empty
//! string under the `encrypted_payload` key. [`Transport`] decides how to read
//! request bodies and whether to seal response bodies, and works without a key
//! for plaintext-only deployments.
//!
//! [`EnvelopeKey::derive`]: filegate_protocol::EnvelopeKey::derive

mod codec;
mod transport;

pub use codec::{Codec, CodecError, Payload, Plaintext};
pub use transport::{Classified, Transport, TransportError};
