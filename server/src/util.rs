use {
    crate::error::ApiError,
    anyhow::Result,
    bytes::Bytes,
    filegate_protocol::{FileId, util::{log_writer, parse_bool}},
    http_body_util::{BodyExt, Full, combinators::BoxBody},
    hyper::{
        Response, StatusCode,
        header::{CONTENT_TYPE, HeaderValue},
    },
    percent_encoding::percent_decode_str,
    serde::Serialize,
    std::{convert::Infallible, path::Path, sync::Mutex},
    tracing::warn,
    tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt},
};

pub type Body = BoxBody<Bytes, Infallible>;

pub fn full_body(data: impl Into<Bytes>) -> Body {
    Full::new(data.into()).boxed()
}

pub fn json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response<Body> {
    let (status, data) = match serde_json::to_vec(value) {
        Ok(data) => (status, data),
        Err(err) => {
            warn!(?err, "failed to serialize response");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                br#"{"detail":"Internal server error"}"#.to_vec(),
            )
        }
    };
    let mut response = Response::new(full_body(data));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Decoded query string of a request.
#[derive(Debug, Default)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    pub fn parse(query: Option<&str>) -> Self {
        Self {
            pairs: query
                .map(|query| url::form_urlencoded::parse(query.as_bytes()).into_owned().collect())
                .unwrap_or_default(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn optional_flag(&self, name: &str) -> Result<Option<bool>, ApiError> {
        self.get(name)
            .map(|value| {
                parse_bool(value).map_err(|err| ApiError::Validation(format!("{name}: {err}")))
            })
            .transpose()
    }

    /// Boolean parameter that defaults to `false`.
    pub fn flag(&self, name: &str) -> Result<bool, ApiError> {
        Ok(self.optional_flag(name)?.unwrap_or(false))
    }
}

/// Parses a percent-encoded file id taken from the request path.
pub fn file_id_from_path(segment: &str) -> Result<FileId, ApiError> {
    let decoded = percent_decode_str(segment)
        .decode_utf8()
        .map_err(|_utf8_error| ApiError::BadRequest("Invalid file id".into()))?;
    decoded
        .parse()
        .map_err(|err| ApiError::BadRequest(format!("Invalid file id: {err}")))
}

pub fn setup_logger(log_file: Option<&Path>, log_filter: &str) -> Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(Mutex::new(log_writer(log_file)?));
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(EnvFilter::try_new(log_filter)?)
        .init();
    Ok(())
}
