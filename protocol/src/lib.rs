pub mod credentials;
pub mod endpoints;
pub mod envelope;
mod file_id;
pub mod util;

pub use crate::{
    credentials::{AccessToken, EnvelopeKey, EnvelopeSecret},
    envelope::{ENCRYPTED_PAYLOAD_FIELD, EncryptedBody, Envelope},
    file_id::{FileId, Visibility, check_file_id},
};

pub type DateTimeUtc = chrono::DateTime<chrono::Utc>;
