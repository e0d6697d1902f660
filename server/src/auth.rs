use {
    chrono::Utc,
    derivative::Derivative,
    filegate_protocol::AccessToken,
    jsonwebtoken::{
        Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
        errors::ErrorKind,
    },
    serde::{Deserialize, Serialize},
    sha2::{Digest, Sha256},
    std::time::Duration,
    subtle::ConstantTimeEq,
    thiserror::Error,
};

/// Accepted when no password hash is configured.
const DEVELOPMENT_PASSWORD: &str = "admin";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Not authenticated")]
    Missing,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Token has expired")]
    Expired,
    #[error("Could not validate credentials")]
    Invalid,
    #[error("failed to issue token: {0}")]
    Issue(#[source] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
}

/// Password check and HS256 bearer tokens for the single configured user.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Sessions {
    username: String,
    #[derivative(Debug = "ignore")]
    password_hash: Option<String>,
    #[derivative(Debug = "ignore")]
    encoding_key: EncodingKey,
    #[derivative(Debug = "ignore")]
    decoding_key: DecodingKey,
    lifetime: Duration,
}

impl Sessions {
    pub fn new(
        username: String,
        password_hash: Option<String>,
        secret: &[u8],
        lifetime: Duration,
    ) -> Self {
        Self {
            username,
            password_hash: password_hash.map(|hash| hash.to_ascii_lowercase()),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            lifetime,
        }
    }

    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    fn verify_password(&self, password: &str) -> bool {
        let matches = match &self.password_hash {
            Some(hash) => hex::encode(Sha256::digest(password.as_bytes()))
                .as_bytes()
                .ct_eq(hash.as_bytes()),
            None => password.as_bytes().ct_eq(DEVELOPMENT_PASSWORD.as_bytes()),
        };
        matches.into()
    }

    pub fn login(&self, username: &str, password: &str) -> Result<AccessToken, AuthError> {
        if username != self.username || !self.verify_password(password) {
            return Err(AuthError::InvalidCredentials);
        }
        let now = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        self.issue(username, now.saturating_add(self.lifetime.as_secs()))
    }

    fn issue(&self, username: &str, exp: u64) -> Result<AccessToken, AuthError> {
        let claims = Claims {
            sub: username.into(),
            exp,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map(AccessToken::new)
            .map_err(AuthError::Issue)
    }

    pub fn authenticate(&self, token: &str) -> Result<User, AuthError> {
        let data = decode::<Claims>(
            token,
            &self.decoding_key,
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|err| match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::Invalid,
        })?;
        if data.claims.sub.is_empty() {
            return Err(AuthError::Invalid);
        }
        Ok(User {
            username: data.claims.sub,
        })
    }

    /// Authenticates the value of an `Authorization` header.
    pub fn authenticate_header(&self, header: Option<&str>) -> Result<User, AuthError> {
        let header = header.ok_or(AuthError::Missing)?;
        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .ok_or(AuthError::Missing)?;
        self.authenticate(token.trim())
    }
}
