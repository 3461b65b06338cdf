//! Structured API error responses with error codes
//!
//! Every failure surfaced over HTTP carries a stable machine-readable code
//! alongside the human-readable message, so workers can branch on conflicts
//! (lost claim races, stale executors) without string matching.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

// ============================================================================
// Error Codes
// ============================================================================

/// Error codes for API responses
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (3xxx)
    /// Request body is malformed
    InvalidRequestBody,
    /// Required field is missing
    MissingRequiredField,
    /// Field value is invalid
    InvalidFieldValue,
    /// Payload exceeds size limit
    PayloadTooLarge,
    /// Too many ciphertexts in one staging batch
    BatchTooLarge,

    // Resource errors (4xxx)
    /// Requested resource not found
    ResourceNotFound,
    /// Job not found in the queue
    JobNotFound,
    /// Ciphertext handle not found
    CiphertextNotFound,
    /// Registration receipt not found
    RegistrationNotFound,

    // Conflict errors (5xxx)
    /// Claim attempted on a job that is not queued
    JobNotClaimable,
    /// Result submitted for a job outside assigned/executing
    JobNotExecutable,
    /// Caller is not the executor the job was assigned to
    ExecutorMismatch,

    // Admission/planning errors (6xxx)
    /// CID set failed pre-admission validation
    CidValidationFailed,
    /// Dependency graph contains a cycle
    PlanCycle,

    // Infrastructure errors (8xxx)
    /// Store is at capacity; nothing is evicted to make room
    StoreFull,
    /// Ledger RPC or subscription unavailable
    LedgerUnavailable,
    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn numeric_code(&self) -> u32 {
        match self {
            // Validation (3xxx)
            ErrorCode::InvalidRequestBody => 3001,
            ErrorCode::MissingRequiredField => 3002,
            ErrorCode::InvalidFieldValue => 3003,
            ErrorCode::PayloadTooLarge => 3004,
            ErrorCode::BatchTooLarge => 3005,

            // Resource (4xxx)
            ErrorCode::ResourceNotFound => 4001,
            ErrorCode::JobNotFound => 4002,
            ErrorCode::CiphertextNotFound => 4003,
            ErrorCode::RegistrationNotFound => 4004,

            // Conflict (5xxx)
            ErrorCode::JobNotClaimable => 5001,
            ErrorCode::JobNotExecutable => 5002,
            ErrorCode::ExecutorMismatch => 5003,

            // Admission/planning (6xxx)
            ErrorCode::CidValidationFailed => 6001,
            ErrorCode::PlanCycle => 6002,

            // Infrastructure (8xxx)
            ErrorCode::StoreFull => 8001,
            ErrorCode::LedgerUnavailable => 8002,
            ErrorCode::InternalError => 8999,
        }
    }

    /// Get the HTTP status code for this error
    pub fn http_status(&self) -> StatusCode {
        match self {
            // Validation -> 400/413
            ErrorCode::InvalidRequestBody => StatusCode::BAD_REQUEST,
            ErrorCode::MissingRequiredField => StatusCode::BAD_REQUEST,
            ErrorCode::InvalidFieldValue => StatusCode::BAD_REQUEST,
            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::BatchTooLarge => StatusCode::PAYLOAD_TOO_LARGE,

            // Resource -> 404
            ErrorCode::ResourceNotFound => StatusCode::NOT_FOUND,
            ErrorCode::JobNotFound => StatusCode::NOT_FOUND,
            ErrorCode::CiphertextNotFound => StatusCode::NOT_FOUND,
            ErrorCode::RegistrationNotFound => StatusCode::NOT_FOUND,

            // Conflict -> 409/403
            ErrorCode::JobNotClaimable => StatusCode::CONFLICT,
            ErrorCode::JobNotExecutable => StatusCode::CONFLICT,
            ErrorCode::ExecutorMismatch => StatusCode::FORBIDDEN,

            // Admission/planning -> 400/422
            ErrorCode::CidValidationFailed => StatusCode::BAD_REQUEST,
            ErrorCode::PlanCycle => StatusCode::UNPROCESSABLE_ENTITY,

            // Infrastructure -> 500/503
            ErrorCode::StoreFull => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::LedgerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code_str = match self {
            ErrorCode::InvalidRequestBody => "INVALID_REQUEST_BODY",
            ErrorCode::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            ErrorCode::InvalidFieldValue => "INVALID_FIELD_VALUE",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::BatchTooLarge => "BATCH_TOO_LARGE",
            ErrorCode::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorCode::JobNotFound => "JOB_NOT_FOUND",
            ErrorCode::CiphertextNotFound => "CIPHERTEXT_NOT_FOUND",
            ErrorCode::RegistrationNotFound => "REGISTRATION_NOT_FOUND",
            ErrorCode::JobNotClaimable => "JOB_NOT_CLAIMABLE",
            ErrorCode::JobNotExecutable => "JOB_NOT_EXECUTABLE",
            ErrorCode::ExecutorMismatch => "EXECUTOR_MISMATCH",
            ErrorCode::CidValidationFailed => "CID_VALIDATION_FAILED",
            ErrorCode::PlanCycle => "PLAN_CYCLE",
            ErrorCode::StoreFull => "STORE_FULL",
            ErrorCode::LedgerUnavailable => "LEDGER_UNAVAILABLE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", code_str)
    }
}

// ============================================================================
// Structured Error Response
// ============================================================================

/// Structured error response for API endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error details
    pub error: ErrorDetails,
}

/// Detailed error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Numeric error code for easy categorization
    pub numeric_code: u32,

    /// Human-readable error message
    pub message: String,

    /// Unique request ID for tracing (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Related resource ID (job id, handle, receipt id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl ApiError {
    /// Create a new API error
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetails {
                code,
                numeric_code: code.numeric_code(),
                message: message.into(),
                request_id: None,
                details: None,
                resource_id: None,
            },
        }
    }

    /// Set the request ID
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.error.request_id = Some(request_id.into());
        self
    }

    /// Set additional details
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }

    /// Set related resource ID
    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.error.resource_id = Some(id.into());
        self
    }

    /// Get the HTTP status code
    pub fn status(&self) -> StatusCode {
        self.error.code.http_status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code_str = self.error.code.to_string();
        let mut response = (status, Json(self)).into_response();

        // Add error code header for easier debugging
        if let Ok(code_value) = axum::http::HeaderValue::from_str(&code_str) {
            response.headers_mut().insert(
                axum::http::header::HeaderName::from_static("x-error-code"),
                code_value,
            );
        }

        response
    }
}

// ============================================================================
// Conversion from GatewatchError
// ============================================================================

impl From<crate::infra::GatewatchError> for ApiError {
    fn from(err: crate::infra::GatewatchError) -> Self {
        use crate::infra::GatewatchError;

        match err {
            GatewatchError::Rpc(e) => ApiError::new(
                ErrorCode::LedgerUnavailable,
                format!("Ledger RPC error: {}", e),
            ),
            GatewatchError::Subscription(e) => ApiError::new(
                ErrorCode::LedgerUnavailable,
                format!("Ledger subscription error: {}", e),
            ),
            GatewatchError::ConfirmationFailed { address, reason } => ApiError::new(
                ErrorCode::LedgerUnavailable,
                format!("Account confirmation failed: {}", reason),
            )
            .with_resource_id(address.to_string()),
            GatewatchError::CiphertextNotFound(handle) => ApiError::new(
                ErrorCode::CiphertextNotFound,
                format!("Ciphertext not found: {}", handle),
            )
            .with_resource_id(handle),
            GatewatchError::JobNotFound(job_id) => {
                ApiError::new(ErrorCode::JobNotFound, format!("Job not found: {}", job_id))
                    .with_resource_id(job_id.to_string())
            }
            GatewatchError::RegistrationNotFound(reg_id) => ApiError::new(
                ErrorCode::RegistrationNotFound,
                format!("Registration not found: {}", reg_id),
            )
            .with_resource_id(reg_id),
            GatewatchError::RegistrationEntryNotFound(handle) => ApiError::new(
                ErrorCode::RegistrationNotFound,
                format!("No registration entry for handle: {}", handle),
            )
            .with_resource_id(handle),
            GatewatchError::CapacityExceeded { store, capacity } => ApiError::new(
                ErrorCode::StoreFull,
                format!("{} store full: capacity {} reached", store, capacity),
            ),
            GatewatchError::PayloadTooLarge { size, max } => ApiError::new(
                ErrorCode::PayloadTooLarge,
                format!("Payload of {} bytes exceeds max {}", size, max),
            )
            .with_details(serde_json::json!({ "size": size, "max": max })),
            GatewatchError::NotClaimable { job_id, status } => {
                ApiError::new(ErrorCode::JobNotClaimable, "Job not available for claiming")
                    .with_resource_id(job_id.to_string())
                    .with_details(serde_json::json!({ "current_status": status }))
            }
            GatewatchError::NotExecutable { job_id, status } => {
                ApiError::new(ErrorCode::JobNotExecutable, "Job not in executable state")
                    .with_resource_id(job_id.to_string())
                    .with_details(serde_json::json!({ "current_status": status }))
            }
            GatewatchError::ExecutorMismatch(job_id) => ApiError::new(
                ErrorCode::ExecutorMismatch,
                "Executor does not match assigned executor",
            )
            .with_resource_id(job_id.to_string()),
            GatewatchError::CidValidation(reason) => {
                ApiError::new(ErrorCode::CidValidationFailed, reason)
            }
            GatewatchError::PlanCycle(reason) => ApiError::new(ErrorCode::PlanCycle, reason),
            GatewatchError::Validation(reason) => {
                ApiError::new(ErrorCode::InvalidFieldValue, reason)
            }
            GatewatchError::Parse(e) => {
                ApiError::new(ErrorCode::InternalError, format!("Parse error: {}", e))
            }
            GatewatchError::Event(e) => ApiError::new(
                ErrorCode::InternalError,
                format!("Event processing error: {}", e),
            ),
            GatewatchError::Serialization(e) => ApiError::new(
                ErrorCode::InternalError,
                format!("Serialization error: {}", e),
            ),
            GatewatchError::Configuration(e) => ApiError::new(
                ErrorCode::InternalError,
                format!("Configuration error: {}", e),
            ),
            GatewatchError::Internal(e) => ApiError::new(ErrorCode::InternalError, e),
        }
    }
}
