// Centralized error handling for the attendance client

use thiserror::Error;

pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred";
pub const NETWORK_ERROR_MESSAGE: &str =
    "Unable to connect to the server. Please check your internet connection.";

/// Errors surfaced by the API client and the session controllers
///
/// `Display` is the message shown to the user: the server's own message when it
/// sent one, a generic text otherwise.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{message}")]
    Api { status: u16, message: String },

    /// 401 from the backend; the stored token has already been removed
    #[error("{message}")]
    Unauthorized { message: String },

    #[error("{}", NETWORK_ERROR_MESSAGE)]
    Network(#[source] reqwest::Error),

    #[error("{}", UNEXPECTED_ERROR_MESSAGE)]
    Decode(#[source] reqwest::Error),

    #[error("{}", UNEXPECTED_ERROR_MESSAGE)]
    Parse(#[from] serde_json::Error),

    #[error("{}", UNEXPECTED_ERROR_MESSAGE)]
    InvalidUrl(String),

    #[error("Failed to access the stored session: {0}")]
    Storage(#[from] StorageError),

    #[error("The request was cancelled")]
    Cancelled,
}

impl ClientError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized { .. })
    }

    /// True for failures detected before anything was sent
    pub fn is_validation(&self) -> bool {
        matches!(self, ClientError::Validation(_))
    }

    /// Classify a transport error from reqwest
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err)
        } else {
            ClientError::Network(err)
        }
    }
}

/// Client-side input checks that run before any request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter your email address")]
    MissingEmail,

    #[error("Please enter a valid email address")]
    InvalidEmail,

    #[error("Please enter your password")]
    MissingPassword,

    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("Invalid QR code. Please scan a valid attendance QR code.")]
    InvalidQr(QrRejection),

    #[error("Invalid date range: {start} is after {end}")]
    InvalidDateRange { start: String, end: String },
}

/// Why a scanned payload was refused; kept for logs, never shown
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QrRejection {
    #[error("payload is not a URL")]
    NotAUrl,

    #[error("URL does not point at attendance/qr")]
    WrongPath,

    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("unknown check type: {0}")]
    UnknownCheckType(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No data directory available for the token file")]
    NoDataDir,
}
