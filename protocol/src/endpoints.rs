use {
    crate::{DateTimeUtc, FileId, credentials::AccessToken},
    serde::{Deserialize, Serialize},
};

pub const LOGIN_PATH: &str = "/auth/login";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const ME_PATH: &str = "/auth/me";
pub const UPLOAD_PATH: &str = "/api/upload";
pub const UPLOAD_DIRECT_PATH: &str = "/api/upload/direct";
pub const FILES_PATH: &str = "/api/files";
pub const DOWNLOAD_PREFIX: &str = "/api/download/";
pub const STAT_PREFIX: &str = "/api/stat/";
pub const RENAME_PREFIX: &str = "/api/rename/";
pub const SHARE_PREFIX: &str = "/api/share/";
pub const FILES_PREFIX: &str = "/api/files/";

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: AccessToken,
    pub token_type: String,
    /// Token lifetime in seconds.
    pub expires_in: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeResponse {
    pub username: String,
}

/// Body of `POST /api/upload`, after decryption if it arrived encrypted.
///
/// Exactly one of `url` and `file_data` must be set. `file_data` is the
/// base64 encoding of the file content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<FileId>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub file_id: FileId,
    pub object_path: String,
    pub size: u64,
    pub is_public: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_id: FileId,
    pub object_path: String,
    pub size: u64,
    pub is_public: bool,
}

/// Shape of an encrypted `GET /api/files` response after decryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileList {
    pub files: Vec<FileInfo>,
}

/// Shape of an encrypted `GET /api/download/{id}` response after decryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedFile {
    pub file_id: FileId,
    pub is_public: bool,
    pub size: u64,
    /// Base64 encoding of the file content.
    pub file_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatResponse {
    pub file_id: FileId,
    pub is_public: bool,
    pub size: u64,
    pub modified: DateTimeUtc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameRequest {
    pub new_file_id: FileId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameResponse {
    pub old_file_id: FileId,
    pub new_file_id: FileId,
    pub object_path: String,
    pub is_public: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareResponse {
    pub file_id: FileId,
    pub object_path: String,
    pub was_public: bool,
    pub is_public: bool,
}

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}
