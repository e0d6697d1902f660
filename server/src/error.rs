use {
    crate::{auth::AuthError, fetch::FetchError, form::FormError, storage::StorageError, util},
    filegate_protocol::endpoints::ErrorResponse,
    filegate_sdk::crypto::TransportError,
    hyper::{
        Response, StatusCode,
        header::{HeaderValue, WWW_AUTHENTICATE},
    },
    thiserror::Error,
};

/// Everything a handler can fail with. Each variant maps to one status code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Form(#[from] FormError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    BadRequest(String),
    /// Well-formed JSON that doesn't match the expected shape.
    #[error("{0}")]
    Validation(String),
    #[error("Not Found")]
    UnknownRoute,
    #[error("Method Not Allowed")]
    MethodNotAllowed,
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Transport(TransportError::InvalidEncryptedPayload(_)) => StatusCode::BAD_REQUEST,
            Self::Transport(TransportError::EncryptionFailed(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Form(FormError::PayloadTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Form(FormError::MalformedForm(_)) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Auth(AuthError::Issue(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Storage(StorageError::NotFound(_)) | Self::UnknownRoute => StatusCode::NOT_FOUND,
            Self::Storage(StorageError::AlreadyExists(_)) | Self::Conflict(_) => {
                StatusCode::CONFLICT
            }
            Self::Storage(StorageError::FileTooLarge { .. }) | Self::Fetch(FetchError::TooLarge(_)) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            Self::Storage(StorageError::Io(_)) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Fetch(FetchError::InvalidUrl(_)) | Self::Validation(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Fetch(FetchError::Upstream(_)) => StatusCode::BAD_GATEWAY,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    /// Message sent to the client. Details of server-side failures stay in the log.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Storage(StorageError::NotFound(_)) => "File not found".into(),
            Self::Storage(StorageError::Io(_)) | Self::Internal(_) => {
                "Internal server error".into()
            }
            other => other.to_string(),
        }
    }

    #[must_use]
    pub fn into_response(self) -> Response<util::Body> {
        let status = self.status();
        let mut response = util::json_response(
            status,
            &ErrorResponse {
                detail: self.detail(),
            },
        );
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
