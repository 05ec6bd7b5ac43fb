use thiserror::Error;

pub type Result<T> = std::result::Result<T, AsrError>;

pub const ERR_INVALID_PARAM: i64 = 1001;
pub const ERR_CONNECT_FAILED: i64 = 1002;
pub const ERR_WRITE_FAILED: i64 = 1003;
pub const ERR_READ_FAILED: i64 = 1004;
pub const ERR_AUTH_FAILED: i64 = 1005;
pub const ERR_TIMEOUT: i64 = 1006;
pub const ERR_SERVER_ERROR: i64 = 1007;
pub const ERR_ALREADY_STARTED: i64 = 1008;
pub const ERR_NOT_STARTED: i64 = 1009;

/// Coarse classification of an [`AsrError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidParameter,
    ConnectFailed,
    WriteFailed,
    ReadFailed,
    AuthFailed,
    Timeout,
    ServerError,
    AlreadyStarted,
    NotStarted,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AsrError {
    #[error("trtc-asr error [1001]: {0}")]
    InvalidParameter(String),

    #[error("trtc-asr error [1002]: {0}")]
    ConnectFailed(String),

    #[error("trtc-asr error [1003]: {0}")]
    WriteFailed(String),

    #[error("trtc-asr error [1004]: {0}")]
    ReadFailed(String),

    #[error("trtc-asr error [1005]: {0}")]
    AuthFailed(String),

    #[error("trtc-asr error [1006]: {0}")]
    Timeout(String),

    /// Error reported by the service. `code` is the service's own code for
    /// streaming errors and [`ERR_SERVER_ERROR`] for HTTP envelope errors.
    #[error("trtc-asr error [{code}]: {message}")]
    Server { code: i64, message: String },

    #[error("trtc-asr error [1008]: recognizer already started")]
    AlreadyStarted,

    #[error("trtc-asr error [1009]: {0}")]
    NotStarted(&'static str),
}

impl AsrError {
    pub fn server(code: i64, message: impl Into<String>) -> Self {
        Self::Server {
            code,
            message: message.into(),
        }
    }

    /// Numeric code carried to callers.
    pub fn code(&self) -> i64 {
        match self {
            Self::InvalidParameter(_) => ERR_INVALID_PARAM,
            Self::ConnectFailed(_) => ERR_CONNECT_FAILED,
            Self::WriteFailed(_) => ERR_WRITE_FAILED,
            Self::ReadFailed(_) => ERR_READ_FAILED,
            Self::AuthFailed(_) => ERR_AUTH_FAILED,
            Self::Timeout(_) => ERR_TIMEOUT,
            Self::Server { code, .. } => *code,
            Self::AlreadyStarted => ERR_ALREADY_STARTED,
            Self::NotStarted(_) => ERR_NOT_STARTED,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParameter(_) => ErrorKind::InvalidParameter,
            Self::ConnectFailed(_) => ErrorKind::ConnectFailed,
            Self::WriteFailed(_) => ErrorKind::WriteFailed,
            Self::ReadFailed(_) => ErrorKind::ReadFailed,
            Self::AuthFailed(_) => ErrorKind::AuthFailed,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Server { .. } => ErrorKind::ServerError,
            Self::AlreadyStarted => ErrorKind::AlreadyStarted,
            Self::NotStarted(_) => ErrorKind::NotStarted,
        }
    }

    /// Human readable message without the code prefix.
    pub fn message(&self) -> String {
        match self {
            Self::InvalidParameter(m)
            | Self::ConnectFailed(m)
            | Self::WriteFailed(m)
            | Self::ReadFailed(m)
            | Self::AuthFailed(m)
            | Self::Timeout(m) => m.clone(),
            Self::Server { message, .. } => message.clone(),
            Self::AlreadyStarted => "recognizer already started".to_string(),
            Self::NotStarted(m) => (*m).to_string(),
        }
    }
}
