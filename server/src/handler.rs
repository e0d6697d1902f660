use {
    crate::{
        auth::{Sessions, User},
        error::ApiError,
        fetch::fetch_to_file,
        form::ingest_multipart,
        storage::{Storage, StorageError, StoredObject},
        util::{Body, Query, json_response},
    },
    base64::{Engine, prelude::BASE64_STANDARD},
    bytes::Bytes,
    filegate_protocol::{
        ENCRYPTED_PAYLOAD_FIELD, EncryptedBody, Envelope, FileId, Visibility,
        endpoints::{
            DownloadedFile, FileList, FileStatResponse, LoginRequest, LoginResponse,
            MeResponse, MessageResponse, RenameRequest, RenameResponse, ShareResponse,
            UploadRequest, UploadResponse,
        },
        util::{parse_bool, stream_file},
    },
    filegate_sdk::crypto::Transport,
    futures_util::StreamExt,
    http_body_util::{BodyExt, Limited, StreamBody},
    hyper::{
        Request, Response, StatusCode,
        body::{Frame, Incoming},
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, HeaderValue},
    },
    percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode},
    serde::{Serialize, de::DeserializeOwned},
    serde_json::{Map, Value},
    std::{convert::Infallible, sync::Arc},
    tokio::task::block_in_place,
    tracing::{debug, info},
};

#[derive(Debug, Clone)]
pub struct Context {
    pub storage: Arc<Storage>,
    pub transport: Arc<Transport>,
    pub sessions: Arc<Sessions>,
    pub http: reqwest::Client,
    /// Limit of a multipart field and of a JSON body.
    pub max_part_size: u64,
}

pub type HandlerResult = Result<Response<Body>, ApiError>;

async fn read_json(ctx: &Context, request: Request<Incoming>) -> Result<Value, ApiError> {
    let limit = usize::try_from(ctx.max_part_size).unwrap_or(usize::MAX);
    let bytes = Limited::new(request.into_body(), limit)
        .collect()
        .await
        .map_err(|err| {
            if err.is::<http_body_util::LengthLimitError>() {
                ApiError::Form(crate::form::FormError::PayloadTooLarge {
                    field: None,
                    limit: ctx.max_part_size,
                })
            } else {
                ApiError::BadRequest(format!("Failed to read request body: {err}"))
            }
        })?
        .to_bytes();
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes)
        .map_err(|err| ApiError::BadRequest(format!("Invalid JSON body: {err}")))
}

/// Reads a JSON body and decrypts it if it arrived as an envelope.
async fn read_classified<T: DeserializeOwned>(
    ctx: &Context,
    request: Request<Incoming>,
) -> Result<(T, bool), ApiError> {
    let body = read_json(ctx, request).await?;
    let classified = ctx.transport.classify_and_decrypt(body)?;
    Ok((parse_fields(classified.body)?, classified.encrypted))
}

fn parse_fields<T: DeserializeOwned>(body: Map<String, Value>) -> Result<T, ApiError> {
    serde_json::from_value(Value::Object(body)).map_err(|err| ApiError::Validation(err.to_string()))
}

/// Serializes `value` as the response body, sealed if `encrypt` is set and
/// the server has a key.
fn respond<T: Serialize>(ctx: &Context, value: &T, encrypt: bool) -> HandlerResult {
    let Value::Object(data) =
        serde_json::to_value(value).map_err(|err| ApiError::Internal(err.into()))?
    else {
        return Err(ApiError::Internal(anyhow::anyhow!(
            "response is not a JSON object"
        )));
    };
    let data = ctx.transport.wrap_response(data, encrypt)?;
    Ok(json_response(StatusCode::OK, &data))
}

fn visibility_flag(query: &Query, name: &str) -> Result<Visibility, ApiError> {
    Ok(Visibility::from_is_public(query.flag(name)?))
}

fn new_file_id(file_id: Option<FileId>) -> Result<FileId, ApiError> {
    match file_id {
        Some(file_id) => Ok(file_id),
        None => uuid::Uuid::new_v4()
            .to_string()
            .parse()
            .map_err(ApiError::Internal),
    }
}

fn ensure_absent(ctx: &Context, id: &FileId, visibility: Visibility) -> Result<(), ApiError> {
    if block_in_place(|| ctx.storage.exists(id, visibility))? {
        return Err(ApiError::Conflict("File already exists".into()));
    }
    Ok(())
}

fn decode_file_data(file_data: &str) -> Result<Vec<u8>, ApiError> {
    BASE64_STANDARD
        .decode(file_data)
        .map_err(|err| ApiError::BadRequest(format!("Invalid base64 in file_data: {err}")))
}

fn upload_response(
    file_id: FileId,
    stored: StoredObject,
    visibility: Visibility,
    original_filename: Option<String>,
) -> UploadResponse {
    UploadResponse {
        file_id,
        object_path: stored.object_path,
        size: stored.size,
        is_public: visibility.is_public(),
        original_filename,
    }
}

pub fn root() -> HandlerResult {
    Ok(json_response(
        StatusCode::OK,
        &MessageResponse {
            message: "File Storage API".into(),
        },
    ))
}

pub async fn login(ctx: Context, request: Request<Incoming>) -> HandlerResult {
    let (body, encrypted): (LoginRequest, _) = read_classified(&ctx, request).await?;
    let access_token = ctx.sessions.login(&body.username, &body.password)?;
    info!(username = %body.username, "user logged in");
    respond(
        &ctx,
        &LoginResponse {
            access_token,
            token_type: "bearer".into(),
            expires_in: ctx.sessions.lifetime().as_secs(),
        },
        encrypted,
    )
}

/// Tokens are stateless, so this only confirms that the token was valid.
pub fn logout(user: &User) -> HandlerResult {
    debug!(username = %user.username, "user logged out");
    Ok(json_response(
        StatusCode::OK,
        &MessageResponse {
            message: "Successfully logged out".into(),
        },
    ))
}

pub fn me(user: &User) -> HandlerResult {
    Ok(json_response(
        StatusCode::OK,
        &MeResponse {
            username: user.username.clone(),
        },
    ))
}

/// Stores a file fetched from `url` or decoded from `file_data`.
pub async fn upload(ctx: Context, request: Request<Incoming>) -> HandlerResult {
    let (body, encrypted): (UploadRequest, _) = read_classified(&ctx, request).await?;
    let file_id = new_file_id(body.file_id)?;
    let visibility = Visibility::from_is_public(body.is_public);
    ensure_absent(&ctx, &file_id, visibility)?;

    let stored = match (body.url, body.file_data) {
        (Some(url), None) => {
            let file = fetch_to_file(&ctx.http, &ctx.storage, &url).await?;
            block_in_place(|| ctx.storage.commit_file(file, &file_id, visibility))?
        }
        (None, Some(file_data)) => {
            let data = decode_file_data(&file_data)?;
            block_in_place(|| ctx.storage.put(&data, &file_id, visibility))?
        }
        (Some(_), Some(_)) => {
            return Err(ApiError::Validation(
                "Only one of url and file_data may be set".into(),
            ));
        }
        (None, None) => {
            return Err(ApiError::Validation(
                "Either url or file_data is required".into(),
            ));
        }
    };
    info!(%file_id, size = stored.size, encrypted, "stored uploaded file");
    respond(
        &ctx,
        &upload_response(file_id, stored, visibility, body.filename),
        encrypted,
    )
}

/// Multipart upload. The form holds either a `file` part with optional
/// `file_id` and `is_public` text fields, or a single `encrypted_payload`
/// text field sealing an [`UploadRequest`] with `file_data`.
pub async fn upload_direct(ctx: Context, request: Request<Incoming>) -> HandlerResult {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned);
    let form = ingest_multipart(
        content_type.as_deref(),
        request.into_body().into_data_stream(),
        ctx.max_part_size,
    )
    .await?;

    let envelope = form
        .text(ENCRYPTED_PAYLOAD_FIELD)
        .filter(|envelope| !envelope.is_empty());
    let (file_id, visibility, data, filename, encrypted) = if let Some(envelope) = envelope {
        let body = EncryptedBody::new(Envelope::new(envelope.to_owned())).into_json();
        let classified = ctx.transport.classify_and_decrypt(Value::Object(body))?;
        let body: UploadRequest = parse_fields(classified.body)?;
        let Some(file_data) = body.file_data else {
            return Err(ApiError::Validation(
                "Encrypted form payload has no file_data".into(),
            ));
        };
        (
            body.file_id,
            Visibility::from_is_public(body.is_public),
            Bytes::from(decode_file_data(&file_data)?),
            body.filename,
            true,
        )
    } else {
        let file = form
            .file("file")
            .ok_or_else(|| ApiError::Validation("Field required: file".into()))?;
        let file_id = form
            .text("file_id")
            .filter(|file_id| !file_id.is_empty())
            .map(|file_id| {
                file_id
                    .parse::<FileId>()
                    .map_err(|err| ApiError::Validation(format!("file_id: {err}")))
            })
            .transpose()?;
        let is_public = form
            .text("is_public")
            .map(|value| {
                parse_bool(value).map_err(|err| ApiError::Validation(format!("is_public: {err}")))
            })
            .transpose()?
            .unwrap_or(false);
        (
            file_id,
            Visibility::from_is_public(is_public),
            file.read(),
            file.filename.clone(),
            false,
        )
    };

    let file_id = new_file_id(file_id)?;
    ensure_absent(&ctx, &file_id, visibility)?;
    let stored = block_in_place(|| ctx.storage.put(&data, &file_id, visibility))?;
    info!(%file_id, size = stored.size, encrypted, "stored form upload");
    respond(
        &ctx,
        &upload_response(file_id, stored, visibility, filename),
        encrypted,
    )
}

pub fn list(ctx: &Context, query: &Query) -> HandlerResult {
    let visibility = query
        .optional_flag("is_public")?
        .map(Visibility::from_is_public);
    let encrypted = query.flag("encrypted")?;
    let files = block_in_place(|| ctx.storage.list(visibility))?;
    if ctx.transport.should_encrypt(encrypted) {
        respond(ctx, &FileList { files }, true)
    } else {
        Ok(json_response(StatusCode::OK, &files))
    }
}

fn content_disposition(id: &FileId) -> Result<HeaderValue, ApiError> {
    let plain = id
        .as_str()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    let value = if plain {
        format!("attachment; filename=\"{id}\"")
    } else {
        format!(
            "attachment; filename*=UTF-8''{}",
            utf8_percent_encode(id.as_str(), NON_ALPHANUMERIC)
        )
    };
    HeaderValue::try_from(value).map_err(|err| ApiError::Internal(err.into()))
}

/// Streams the file, or returns it base64-encoded inside an envelope if
/// encryption was requested and is available.
pub fn download(ctx: &Context, id: &FileId, query: &Query) -> HandlerResult {
    let visibility = visibility_flag(query, "is_public")?;
    let encrypted = query.flag("encrypted")?;
    if ctx.transport.should_encrypt(encrypted) {
        let data = block_in_place(|| ctx.storage.get(id, visibility))?;
        let file = DownloadedFile {
            file_id: id.clone(),
            is_public: visibility.is_public(),
            size: u64::try_from(data.len()).unwrap_or(u64::MAX),
            file_data: BASE64_STANDARD.encode(&data),
        };
        return respond(ctx, &file, true);
    }

    let (file, size) = block_in_place(|| ctx.storage.open(id, visibility))?;
    let body = StreamBody::new(
        stream_file(file).map(|bytes| Ok::<_, Infallible>(Frame::data(bytes))),
    );
    let mut response = Response::new(BodyExt::boxed(body));
    let headers = response.headers_mut();
    headers.insert(CONTENT_LENGTH, HeaderValue::from(size));
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(CONTENT_DISPOSITION, content_disposition(id)?);
    Ok(response)
}

pub fn stat(ctx: &Context, id: &FileId, query: &Query) -> HandlerResult {
    let visibility = visibility_flag(query, "is_public")?;
    let encrypted = query.flag("encrypted")?;
    let stat = block_in_place(|| ctx.storage.stat(id, visibility))?;
    respond(
        ctx,
        &FileStatResponse {
            file_id: id.clone(),
            is_public: visibility.is_public(),
            size: stat.size,
            modified: stat.modified,
        },
        encrypted,
    )
}

pub async fn rename(
    ctx: Context,
    request: Request<Incoming>,
    id: FileId,
    query: Query,
) -> HandlerResult {
    let visibility = visibility_flag(&query, "is_public")?;
    let (body, encrypted): (RenameRequest, _) = read_classified(&ctx, request).await?;
    let object_path = block_in_place(|| ctx.storage.rename(&id, &body.new_file_id, visibility))
        .map_err(|err| match err {
            StorageError::AlreadyExists(_) => {
                ApiError::Conflict("Target filename already exists".into())
            }
            other => other.into(),
        })?;
    info!(old = %id, new = %body.new_file_id, "renamed file");
    respond(
        &ctx,
        &RenameResponse {
            old_file_id: id,
            new_file_id: body.new_file_id,
            object_path,
            is_public: visibility.is_public(),
        },
        encrypted,
    )
}

pub fn toggle_share(ctx: &Context, id: &FileId, query: &Query) -> HandlerResult {
    let current = visibility_flag(query, "current_is_public")?;
    let (object_path, new) = block_in_place(|| ctx.storage.toggle_share(id, current))?;
    info!(%id, is_public = new.is_public(), "changed file visibility");
    Ok(json_response(
        StatusCode::OK,
        &ShareResponse {
            file_id: id.clone(),
            object_path,
            was_public: current.is_public(),
            is_public: new.is_public(),
        },
    ))
}

pub fn delete(ctx: &Context, id: &FileId, query: &Query) -> HandlerResult {
    let visibility = visibility_flag(query, "is_public")?;
    if !block_in_place(|| ctx.storage.delete(id, visibility))? {
        return Err(StorageError::NotFound(id.clone()).into());
    }
    info!(%id, "deleted file");
    Ok(json_response(
        StatusCode::OK,
        &MessageResponse {
            message: format!("File {id} deleted successfully"),
        },
    ))
}
