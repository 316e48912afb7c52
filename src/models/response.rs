use serde::Deserialize;

/// Envelope used by endpoints that wrap their payload
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub success: bool,
}

/// Error body the backend sends alongside non-2xx statuses
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}
