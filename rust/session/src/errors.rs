/// Error envelope handed to the transport boundary
///
/// This module provides:
/// - A serializable error response for every rejected intent
/// - Machine-readable error codes and severities
/// - Severity-aware error logging
use dehla_engine::errors::GameError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Standard error payload sent back to the originating seat
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "room_not_found")
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (structured data)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Error classification for logging levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Rejected intent from a player; the room is unchanged
    Client,
    /// Unexpected engine state, needs investigation
    Server,
    /// Registry integrity at risk
    Critical,
}

/// Conversion of an error into the envelope the transport sends back
pub trait IntoErrorResponse {
    /// Get the error code string (machine-readable)
    fn error_code(&self) -> &'static str;

    /// Get the error message (human-readable)
    fn error_message(&self) -> String;

    fn error_details(&self) -> Option<serde_json::Value> {
        None
    }

    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Client
    }

    fn to_error_response(&self) -> ErrorResponse {
        if let Some(details) = self.error_details() {
            ErrorResponse::with_details(self.error_code(), self.error_message(), details)
        } else {
            ErrorResponse::new(self.error_code(), self.error_message())
        }
    }

    /// Log at the level matching the severity, then build the envelope.
    fn log_error(&self) -> ErrorResponse {
        let response = self.to_error_response();
        match self.severity() {
            ErrorSeverity::Client => {
                tracing::info!(code = %response.error, "rejected intent: {}", response.message);
            }
            ErrorSeverity::Server => {
                tracing::error!(code = %response.error, "server error: {}", response.message);
            }
            ErrorSeverity::Critical => {
                tracing::error!(
                    code = %response.error,
                    critical = true,
                    "critical error: {}",
                    response.message
                );
            }
        }
        response
    }
}

impl IntoErrorResponse for GameError {
    fn error_code(&self) -> &'static str {
        match self {
            GameError::Precondition { .. } | GameError::SeatCount { .. } => "precondition_failed",
            GameError::Turn { .. } => "not_your_turn",
            GameError::IllegalMove { .. } => "illegal_move",
            GameError::CardNotInHand { .. } => "card_not_in_hand",
            GameError::UnknownPlayer(_) => "unknown_player",
            GameError::InvariantViolated(_) => "invariant_violated",
        }
    }

    fn error_message(&self) -> String {
        self.to_string()
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            GameError::Turn { expected, .. } => Some(serde_json::json!({
                "expected_player": expected
            })),
            GameError::IllegalMove { card } | GameError::CardNotInHand { card } => {
                Some(serde_json::json!({ "card": card }))
            }
            _ => None,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            GameError::InvariantViolated(_) => ErrorSeverity::Server,
            _ => ErrorSeverity::Client,
        }
    }
}
