use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standard body returned by the Genesis HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl<T> ApiResponse<T> {
    /// Payload of a successful response, if any
    pub fn into_data(self) -> Option<T> {
        if self.success { self.data } else { None }
    }
}
