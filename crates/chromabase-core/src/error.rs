//! Error types for chromabase operations.
//!
//! Errors carry a structured [`ErrorCode`] so that the HTTP layer and the
//! client library can branch on the kind of failure without string matching.

use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for chromabase operations.
pub type ChromaResult<T> = Result<T, ChromaError>;

/// Main error type for all chromabase operations.
#[derive(Error, Debug)]
pub enum ChromaError {
    /// Input failed the collection's validation rules.
    #[error("{message}")]
    Validation {
        message: String,
        code: ErrorCode,
        /// Offending field, when the failure is tied to one.
        field: Option<String>,
        details: HashMap<String, String>,
    },

    /// The requested collection is not configured.
    #[error("Unknown collection: {collection}")]
    UnknownCollection { collection: String },

    /// Record not found in the document store.
    #[error("Not found")]
    NotFound {
        code: ErrorCode,
        collection: Option<String>,
        id: Option<String>,
    },

    /// Document store rejected or failed the operation.
    #[error("Persistence error: {message}")]
    Persistence {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A webhook delivery attempt failed.
    #[error("Webhook delivery to {url} failed: {message}")]
    Delivery {
        url: String,
        message: String,
        code: ErrorCode,
    },

    /// A live subscriber channel is gone.
    #[error("Live subscriber {subscriber_id} is closed")]
    Broadcast { subscriber_id: u64, code: ErrorCode },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network error talking to a remote API.
    #[error("Network error: {message}")]
    Network {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation (VAL_xxx)
    ValInvalidInput,
    ValMissingField,
    ValInvalidFormat,
    ValNotAllowed,
    ValUnknownCollection,

    // Store (STORE_xxx)
    StoreNotFound,
    StoreOperationFailed,
    StoreConnectionFailed,
    StorePermissionDenied,

    // Webhooks (HOOK_xxx)
    HookNetwork,
    HookTimeout,
    HookRejected,

    // Live stream (LIVE_xxx)
    LiveClosed,

    // Config (CFG_xxx)
    CfgInvalid,

    // Network (NET_xxx)
    NetConnectionFailed,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValInvalidInput => "VAL_001",
            ErrorCode::ValMissingField => "VAL_002",
            ErrorCode::ValInvalidFormat => "VAL_003",
            ErrorCode::ValNotAllowed => "VAL_004",
            ErrorCode::ValUnknownCollection => "VAL_005",
            ErrorCode::StoreNotFound => "STORE_001",
            ErrorCode::StoreOperationFailed => "STORE_002",
            ErrorCode::StoreConnectionFailed => "STORE_003",
            ErrorCode::StorePermissionDenied => "STORE_004",
            ErrorCode::HookNetwork => "HOOK_001",
            ErrorCode::HookTimeout => "HOOK_002",
            ErrorCode::HookRejected => "HOOK_003",
            ErrorCode::LiveClosed => "LIVE_001",
            ErrorCode::CfgInvalid => "CFG_001",
            ErrorCode::NetConnectionFailed => "NET_001",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl ChromaError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            field: None,
            details: HashMap::new(),
        }
    }

    /// Create a validation error tied to a field.
    pub fn invalid_field(field: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code,
            field: Some(field.into()),
            details: HashMap::new(),
        }
    }

    /// Create an unknown collection error.
    pub fn unknown_collection(collection: impl Into<String>) -> Self {
        Self::UnknownCollection {
            collection: collection.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            code: ErrorCode::StoreNotFound,
            collection: Some(collection.into()),
            id: Some(id.into()),
        }
    }

    /// Create a persistence error.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
            code: ErrorCode::StoreOperationFailed,
            source: None,
        }
    }

    /// Create a persistence error with an explicit code.
    pub fn persistence_with_code(message: impl Into<String>, code: ErrorCode) -> Self {
        Self::Persistence {
            message: message.into(),
            code,
            source: None,
        }
    }

    /// Create a webhook delivery error.
    pub fn delivery(url: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Delivery {
            url: url.into(),
            message: message.into(),
            code,
        }
    }

    /// Create an API/network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            code: ErrorCode::NetConnectionFailed,
            source: None,
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { code, .. } => *code,
            Self::UnknownCollection { .. } => ErrorCode::ValUnknownCollection,
            Self::NotFound { code, .. } => *code,
            Self::Persistence { code, .. } => *code,
            Self::Delivery { code, .. } => *code,
            Self::Broadcast { code, .. } => *code,
            Self::Configuration(_) => ErrorCode::CfgInvalid,
            Self::Network { code, .. } => *code,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether the caller sent bad input, as opposed to a backend failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::UnknownCollection { .. } | Self::NotFound { .. }
        )
    }

    /// Whether the store reported the record as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Convert from an HTTP status code returned by a remote API.
    pub fn from_http_status(status: u16, body: &str) -> Self {
        match status {
            400 => Self::validation(body),
            401 | 403 => Self::persistence_with_code(body, ErrorCode::StorePermissionDenied),
            404 => Self::NotFound {
                code: ErrorCode::StoreNotFound,
                collection: None,
                id: None,
            },
            _ => Self::Internal(format!("HTTP {}: {}", status, body)),
        }
    }
}

impl From<reqwest::Error> for ChromaError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
            code: ErrorCode::NetConnectionFailed,
            source: Some(Box::new(err)),
        }
    }
}
