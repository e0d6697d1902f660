use {
    crate::{error::ApiError, storage::Storage},
    std::io::Write,
    tempfile::NamedTempFile,
    thiserror::Error,
    tokio::task::block_in_place,
    tracing::{debug, info},
    url::Url,
};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Failed to fetch URL: {0}")]
    Upstream(String),
    #[error("File too large. Maximum size is {0} bytes")]
    TooLarge(u64),
}

fn parse_url(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|err| FetchError::InvalidUrl(err.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(FetchError::InvalidUrl(format!(
            "unsupported scheme {:?}",
            parsed.scheme()
        )));
    }
    Ok(parsed)
}

/// Downloads `url` into a temporary file of `storage`, failing as soon as the
/// content grows beyond the storage file size limit.
pub async fn fetch_to_file(
    http: &reqwest::Client,
    storage: &Storage,
    url: &str,
) -> Result<NamedTempFile, ApiError> {
    let url = parse_url(url)?;
    let limit = storage.max_file_size();

    let mut response = http
        .get(url.clone())
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|err| FetchError::Upstream(err.to_string()))?;
    if let Some(length) = response.content_length() {
        if length > limit {
            debug!(%url, length, limit, "advertised length is over the limit");
            return Err(FetchError::TooLarge(limit).into());
        }
    }

    let mut file = block_in_place(|| storage.create_file())?;
    let mut size: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|err| FetchError::Upstream(err.to_string()))?
    {
        size = size.saturating_add(u64::try_from(chunk.len()).unwrap_or(u64::MAX));
        if size > limit {
            debug!(%url, limit, "fetched content is over the limit");
            return Err(FetchError::TooLarge(limit).into());
        }
        block_in_place(|| file.write_all(&chunk)).map_err(|err| ApiError::Internal(err.into()))?;
    }
    info!(%url, size, "fetched remote file");
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_validation() {
        parse_url("http://example.com/a.bin").unwrap();
        parse_url("https://example.com/").unwrap();
        assert!(matches!(
            parse_url("ftp://example.com/a"),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_url("file:///etc/passwd"),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_url("not a url"),
            Err(FetchError::InvalidUrl(_))
        ));
    }
}
