use {
    crate::crypto::{Codec, Payload},
    anyhow::{Context as _, Result, bail, format_err},
    base64::{Engine, prelude::BASE64_STANDARD},
    filegate_protocol::{
        AccessToken, ENCRYPTED_PAYLOAD_FIELD, EncryptedBody, FileId, Visibility,
        endpoints::{
            DOWNLOAD_PREFIX, DownloadedFile, ErrorResponse, FILES_PATH, FILES_PREFIX, FileInfo,
            FileList, FileStatResponse, LOGIN_PATH, LOGOUT_PATH, LoginRequest, LoginResponse,
            ME_PATH, MeResponse, MessageResponse, RENAME_PREFIX, RenameRequest, RenameResponse,
            SHARE_PREFIX, STAT_PREFIX, ShareResponse, UPLOAD_DIRECT_PATH, UPLOAD_PATH,
            UploadRequest, UploadResponse,
        },
    },
    reqwest::{
        Method, RequestBuilder, StatusCode, Url,
        multipart::{Form, Part},
    },
    serde::{Serialize, de::DeserializeOwned},
    serde_json::Value,
    std::time::Duration,
    thiserror::Error,
    tracing::instrument,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Uploads of large files may take a long time.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(3600);

/// Non-success response of the gateway.
#[derive(Debug, Error)]
#[error("server error {status}: {detail}")]
pub struct ServerError {
    pub status: StatusCode,
    pub detail: String,
}

/// Reuse created client or clone it in order to reuse a connection pool.
#[derive(Debug, Clone)]
pub struct Client {
    reqwest: reqwest::Client,
    server_url: Url,
    token: Option<AccessToken>,
    codec: Option<Codec>,
}

fn visibility_query(visibility: Visibility) -> (&'static str, &'static str) {
    ("is_public", bool_str(visibility.is_public()))
}

fn bool_str(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

impl Client {
    #[inline]
    pub fn new(server_url: Url) -> Result<Self> {
        Ok(Self {
            server_url,
            token: None,
            codec: None,
            reqwest: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()?,
        })
    }

    /// Enables encrypted requests and decryption of encrypted responses.
    #[must_use]
    #[inline]
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = Some(codec);
        self
    }

    #[must_use]
    #[inline]
    pub fn with_token(mut self, token: AccessToken) -> Self {
        self.token = Some(token);
        self
    }

    #[must_use]
    #[inline]
    pub fn token(&self) -> Option<&AccessToken> {
        self.token.as_ref()
    }

    fn codec(&self) -> Result<&Codec> {
        self.codec
            .as_ref()
            .ok_or_else(|| format_err!("client has no encryption key"))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.server_url.join(path)?;
        Ok(self.authorize(self.reqwest.request(method, url)))
    }

    fn file_request(&self, method: Method, prefix: &str, id: &FileId) -> Result<RequestBuilder> {
        let mut url = self.server_url.clone();
        url.path_segments_mut()
            .map_err(|()| format_err!("server URL cannot be a base"))?
            .pop_if_empty()
            .extend(prefix.split('/').filter(|segment| !segment.is_empty()))
            .push(id.as_str());
        Ok(self.authorize(self.reqwest.request(method, url)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_unmasked_str())
        } else {
            request
        }
    }

    /// Wraps a JSON body into an envelope if `encrypt` is set.
    fn body<T: Serialize>(&self, body: &T, encrypt: bool) -> Result<Value> {
        if encrypt {
            let envelope = self.codec()?.encrypt_serializable(body)?;
            Ok(Value::Object(EncryptedBody::new(envelope).into_json()))
        } else {
            Ok(serde_json::to_value(body)?)
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorResponse>(&text)
            .map(|err| err.detail)
            .unwrap_or(text);
        Err(ServerError { status, detail }.into())
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let value: Value = self.send(request).await?.json().await?;
        Ok(serde_json::from_value(self.open(value)?)?)
    }

    /// Decrypts `{"encrypted_payload": ...}` responses, passes others through.
    fn open(&self, value: Value) -> Result<Value> {
        let envelope = match &value {
            Value::Object(map) => match map.get(ENCRYPTED_PAYLOAD_FIELD) {
                Some(Value::String(envelope)) => envelope,
                _ => return Ok(value),
            },
            _ => return Ok(value),
        };
        match self.codec()?.decrypt_payload(envelope)? {
            Payload::Structured(map) => Ok(Value::Object(map)),
            Payload::Raw(_) => bail!("encrypted response is not a JSON object"),
        }
    }

    /// Logs in and remembers the issued token for subsequent requests.
    #[instrument(skip(self, password))]
    #[inline]
    pub async fn login(&mut self, username: &str, password: &str) -> Result<LoginResponse> {
        let request = self.request(Method::POST, LOGIN_PATH)?.json(&LoginRequest {
            username: username.into(),
            password: password.into(),
        });
        let response: LoginResponse = self.send_json(request).await?;
        self.token = Some(response.access_token.clone());
        Ok(response)
    }

    #[inline]
    pub async fn logout(&self) -> Result<MessageResponse> {
        self.send_json(self.request(Method::POST, LOGOUT_PATH)?)
            .await
    }

    #[inline]
    pub async fn me(&self) -> Result<MeResponse> {
        self.send_json(self.request(Method::GET, ME_PATH)?).await
    }

    /// Asks the gateway to fetch `url` and store the result.
    #[instrument(skip(self))]
    #[inline]
    pub async fn upload_url(
        &self,
        url: &str,
        file_id: Option<FileId>,
        visibility: Visibility,
        encrypt: bool,
    ) -> Result<UploadResponse> {
        let body = UploadRequest {
            url: Some(url.into()),
            file_id,
            is_public: visibility.is_public(),
            ..UploadRequest::default()
        };
        let request = self
            .request(Method::POST, UPLOAD_PATH)?
            .timeout(UPLOAD_TIMEOUT)
            .json(&self.body(&body, encrypt)?);
        self.send_json(request).await
    }

    /// Uploads `data` as base64 inside a JSON body.
    #[instrument(skip(self, data), fields(size = data.len()))]
    #[inline]
    pub async fn upload_bytes(
        &self,
        data: &[u8],
        file_id: Option<FileId>,
        visibility: Visibility,
        filename: Option<&str>,
        encrypt: bool,
    ) -> Result<UploadResponse> {
        let body = UploadRequest {
            file_data: Some(BASE64_STANDARD.encode(data)),
            file_id,
            is_public: visibility.is_public(),
            filename: filename.map(Into::into),
            ..UploadRequest::default()
        };
        let request = self
            .request(Method::POST, UPLOAD_PATH)?
            .timeout(UPLOAD_TIMEOUT)
            .json(&self.body(&body, encrypt)?);
        self.send_json(request).await
    }

    /// Uploads `data` as a multipart form.
    ///
    /// If `encrypt` is set, the file travels base64-encoded inside a sealed
    /// `encrypted_payload` field instead of a `file` part.
    #[instrument(skip(self, data), fields(size = data.len()))]
    #[inline]
    pub async fn upload_direct(
        &self,
        data: Vec<u8>,
        filename: &str,
        file_id: Option<FileId>,
        visibility: Visibility,
        encrypt: bool,
    ) -> Result<UploadResponse> {
        let form = if encrypt {
            let body = UploadRequest {
                file_data: Some(BASE64_STANDARD.encode(&data)),
                file_id,
                is_public: visibility.is_public(),
                filename: Some(filename.into()),
                ..UploadRequest::default()
            };
            let envelope = self.codec()?.encrypt_serializable(&body)?;
            Form::new().text(ENCRYPTED_PAYLOAD_FIELD, String::from(envelope))
        } else {
            let mut form = Form::new()
                .part("file", Part::bytes(data).file_name(filename.to_owned()))
                .text("is_public", bool_str(visibility.is_public()));
            if let Some(file_id) = file_id {
                form = form.text("file_id", file_id.to_string());
            }
            form
        };
        let request = self
            .request(Method::POST, UPLOAD_DIRECT_PATH)?
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form);
        self.send_json(request).await
    }

    /// Lists stored files. `None` lists both folders.
    #[inline]
    pub async fn list(
        &self,
        visibility: Option<Visibility>,
        encrypted: bool,
    ) -> Result<Vec<FileInfo>> {
        let mut request = self
            .request(Method::GET, FILES_PATH)?
            .query(&[("encrypted", bool_str(encrypted))]);
        if let Some(visibility) = visibility {
            request = request.query(&[visibility_query(visibility)]);
        }
        let value: Value = self.send(request).await?.json().await?;
        let value = self.open(value)?;
        if value.is_array() {
            Ok(serde_json::from_value(value)?)
        } else {
            Ok(serde_json::from_value::<FileList>(value)?.files)
        }
    }

    #[instrument(skip(self))]
    #[inline]
    pub async fn download(
        &self,
        id: &FileId,
        visibility: Visibility,
        encrypted: bool,
    ) -> Result<Vec<u8>> {
        let request = self
            .file_request(Method::GET, DOWNLOAD_PREFIX, id)?
            .timeout(UPLOAD_TIMEOUT)
            .query(&[visibility_query(visibility), ("encrypted", bool_str(encrypted))]);
        let response = self.send(request).await?;
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/json"));
        if !is_json {
            return Ok(response.bytes().await?.to_vec());
        }
        let value = self.open(response.json().await?)?;
        let file: DownloadedFile = serde_json::from_value(value)?;
        BASE64_STANDARD
            .decode(file.file_data)
            .context("invalid file_data in response")
    }

    #[inline]
    pub async fn stat(
        &self,
        id: &FileId,
        visibility: Visibility,
        encrypted: bool,
    ) -> Result<FileStatResponse> {
        let request = self
            .file_request(Method::GET, STAT_PREFIX, id)?
            .query(&[visibility_query(visibility), ("encrypted", bool_str(encrypted))]);
        self.send_json(request).await
    }

    #[inline]
    pub async fn rename(
        &self,
        id: &FileId,
        new_file_id: FileId,
        visibility: Visibility,
        encrypt: bool,
    ) -> Result<RenameResponse> {
        let body = self.body(&RenameRequest { new_file_id }, encrypt)?;
        let request = self
            .file_request(Method::POST, RENAME_PREFIX, id)?
            .query(&[visibility_query(visibility)])
            .json(&body);
        self.send_json(request).await
    }

    /// Moves the file to the other visibility folder.
    #[inline]
    pub async fn toggle_share(&self, id: &FileId, current: Visibility) -> Result<ShareResponse> {
        let request = self
            .file_request(Method::POST, SHARE_PREFIX, id)?
            .query(&[("current_is_public", bool_str(current.is_public()))]);
        self.send_json(request).await
    }

    #[inline]
    pub async fn delete(&self, id: &FileId, visibility: Visibility) -> Result<MessageResponse> {
        let request = self
            .file_request(Method::DELETE, FILES_PREFIX, id)?
            .query(&[visibility_query(visibility)]);
        self.send_json(request).await
    }
}
