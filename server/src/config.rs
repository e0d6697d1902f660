use {
    anyhow::{Context as _, Result},
    derivative::Derivative,
    filegate_protocol::EnvelopeSecret,
    serde::{Deserialize, Serialize},
    std::{
        env,
        net::SocketAddr,
        path::{Path, PathBuf},
        time::Duration,
    },
};

pub use byte_unit::Byte;

pub const ENVELOPE_SECRET_ENV: &str = "FILEGATE_ENVELOPE_SECRET";
pub const JWT_SECRET_ENV: &str = "FILEGATE_JWT_SECRET";
pub const PASSWORD_HASH_ENV: &str = "FILEGATE_PASSWORD_HASH";

/// Encrypted uploads carry base64 file content, which is a third larger than the file.
pub const DEFAULT_MAX_PART_SIZE: u64 = 250 * 1024 * 1024;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 200 * 1024 * 1024;

#[derive(Derivative, Clone, Serialize, Deserialize)]
#[derivative(Debug)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub storage_path: PathBuf,
    /// Enables encrypted transport when set.
    #[serde(default)]
    pub envelope_secret: Option<EnvelopeSecret>,
    #[serde(default = "default_username")]
    pub username: String,
    /// Hex-encoded SHA-256 of the password.
    #[serde(default)]
    #[derivative(Debug = "ignore")]
    pub password_hash: Option<String>,
    /// Signing secret of access tokens. A random one is generated if unset,
    /// so tokens don't survive a restart.
    #[serde(default)]
    #[derivative(Debug = "ignore")]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_token_lifetime", with = "humantime_serde")]
    pub token_lifetime: Duration,
    /// Maximum size of a single multipart form field and of a JSON body.
    #[serde(default = "default_max_part_size", with = "byte_size")]
    pub max_part_size: Byte,
    /// Maximum size of a stored file.
    #[serde(default = "default_max_file_size", with = "byte_size")]
    pub max_file_size: Byte,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_username() -> String {
    "admin".into()
}

fn default_token_lifetime() -> Duration {
    Duration::from_secs(3600)
}

fn default_max_part_size() -> Byte {
    Byte::from_u64(DEFAULT_MAX_PART_SIZE)
}

fn default_max_file_size() -> Byte {
    Byte::from_u64(DEFAULT_MAX_FILE_SIZE)
}

fn default_log_filter() -> String {
    "info".into()
}

/// Sizes are written either as a plain byte count or as a string with a unit.
mod byte_size {
    use {
        byte_unit::Byte,
        serde::{Deserialize, Deserializer, Serialize, Serializer, de},
    };

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Bytes(u64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Byte, D::Error> {
        match Size::deserialize(deserializer)? {
            Size::Bytes(bytes) => Ok(Byte::from_u64(bytes)),
            Size::Text(text) => text.parse().map_err(de::Error::custom),
        }
    }

    pub fn serialize<S: Serializer>(size: &Byte, serializer: S) -> Result<S::Ok, S::Error> {
        size.serialize(serializer)
    }
}

impl Config {
    /// Config with defaults for everything but the listening address and storage root.
    pub fn new(bind_addr: SocketAddr, storage_path: PathBuf) -> Self {
        Self {
            bind_addr,
            storage_path,
            envelope_secret: None,
            username: default_username(),
            password_hash: None,
            jwt_secret: None,
            token_lifetime: default_token_lifetime(),
            max_part_size: default_max_part_size(),
            max_file_size: default_max_file_size(),
            log_file: None,
            log_filter: default_log_filter(),
        }
    }

    /// Reads a JSON5 config file. Secrets missing from the file are taken
    /// from the environment.
    pub fn parse(path: &Path) -> Result<Self> {
        let mut config: Self = json5::from_str(&fs_err::read_to_string(path)?)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if self.envelope_secret.is_none() {
            if let Some(secret) = env_var(ENVELOPE_SECRET_ENV)? {
                self.envelope_secret = Some(
                    secret
                        .parse()
                        .with_context(|| format!("invalid {ENVELOPE_SECRET_ENV}"))?,
                );
            }
        }
        if self.jwt_secret.is_none() {
            self.jwt_secret = env_var(JWT_SECRET_ENV)?;
        }
        if self.password_hash.is_none() {
            self.password_hash = env_var(PASSWORD_HASH_ENV)?;
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Result<Option<String>> {
    match env::var(name) {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("invalid value of {name}")),
    }
}
