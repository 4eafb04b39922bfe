use std::fmt;

/// Errors surfaced by bot handlers and startup code
#[derive(Debug)]
pub enum BotError {
    /// Telegram API errors
    TelegramError(teloxide::RequestError),
    /// Archive search API errors
    SearchError(reqwest::Error),
    /// Database errors outside of the conversion worker
    DatabaseError(sqlx::Error),
    /// Filesystem errors
    FileSystemError(std::io::Error),
    /// Data parsing errors
    ParseError(String),
    /// Invalid parameters or configuration
    InvalidParameters(String),
    /// General error with a description
    General(String),
}

/// Failure of a single conversion request, tagged by the stage that failed
#[derive(Debug)]
pub enum ConversionError {
    /// Source fetch failed: non-200 status, transport error or empty body
    FetchFailed(String),
    /// Transcoder could not be launched or exited unsuccessfully
    TranscodeFailed(String),
    /// Open/read/remove failure around the temporary artifact
    TempFileIo(std::io::Error),
    /// Upload transport error or unusable response
    UploadFailed(String),
    /// Cache store lookup or write failure
    CacheStore(sqlx::Error),
}

impl ConversionError {
    /// Short stage name used in worker logs
    pub fn stage(&self) -> &'static str {
        match self {
            ConversionError::FetchFailed(_) => "fetch",
            ConversionError::TranscodeFailed(_) => "transcode",
            ConversionError::TempFileIo(_) => "temp-file",
            ConversionError::UploadFailed(_) => "upload",
            ConversionError::CacheStore(_) => "cache-store",
        }
    }

    pub fn fetch_failed(msg: impl Into<String>) -> Self {
        Self::FetchFailed(msg.into())
    }

    pub fn transcode_failed(msg: impl Into<String>) -> Self {
        Self::TranscodeFailed(msg.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }
}

impl fmt::Display for BotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotError::TelegramError(e) => write!(f, "Telegram API error: {}", e),
            BotError::SearchError(e) => write!(f, "Archive search error: {}", e),
            BotError::DatabaseError(e) => write!(f, "Database error: {}", e),
            BotError::FileSystemError(e) => write!(f, "Filesystem error: {}", e),
            BotError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            BotError::InvalidParameters(msg) => write!(f, "Invalid parameters: {}", msg),
            BotError::General(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionError::FetchFailed(msg) => write!(f, "fetch failed: {}", msg),
            ConversionError::TranscodeFailed(msg) => write!(f, "transcode failed: {}", msg),
            ConversionError::TempFileIo(e) => write!(f, "temporary file I/O failed: {}", e),
            ConversionError::UploadFailed(msg) => write!(f, "upload failed: {}", msg),
            ConversionError::CacheStore(e) => write!(f, "cache store failed: {}", e),
        }
    }
}

impl std::error::Error for BotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BotError::TelegramError(e) => Some(e),
            BotError::SearchError(e) => Some(e),
            BotError::DatabaseError(e) => Some(e),
            BotError::FileSystemError(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ConversionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConversionError::TempFileIo(e) => Some(e),
            ConversionError::CacheStore(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        BotError::FileSystemError(err)
    }
}

impl From<teloxide::RequestError> for BotError {
    fn from(err: teloxide::RequestError) -> Self {
        BotError::TelegramError(err)
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        BotError::SearchError(err)
    }
}

impl From<sqlx::Error> for BotError {
    fn from(err: sqlx::Error) -> Self {
        BotError::DatabaseError(err)
    }
}

impl From<sqlx::migrate::MigrateError> for BotError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        BotError::General(format!("Failed to run migrations: {}", err))
    }
}

impl From<strum::ParseError> for BotError {
    fn from(err: strum::ParseError) -> Self {
        BotError::ParseError(format!("Enum parsing error: {}", err))
    }
}

impl From<std::io::Error> for ConversionError {
    fn from(e: std::io::Error) -> Self {
        Self::TempFileIo(e)
    }
}

impl From<sqlx::Error> for ConversionError {
    fn from(e: sqlx::Error) -> Self {
        Self::CacheStore(e)
    }
}

impl BotError {
    pub fn invalid_parameters(msg: impl Into<String>) -> Self {
        Self::InvalidParameters(msg.into())
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    pub fn general(msg: impl Into<String>) -> Self {
        Self::General(msg.into())
    }
}

/// Result of bot operations
pub type BotResult<T> = Result<T, BotError>;

/// Result for handlers
pub type HandlerResult = BotResult<()>;
