//! Error taxonomy for reservation and notification operations.
//!
//! Every operation surfaces one [`BookingError`] kind to its caller. The kinds are
//! deliberately coarse so that a booking UI can tell apart "this room just got
//! taken" ([`BookingError::Conflict`]), "your input was invalid"
//! ([`BookingError::Validation`]) and "try again" ([`BookingError::Timeout`]).
//!
//! Storage adapters report [`StoreError`], which converts into the public taxonomy.

use crate::types::BookingStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single invalid input field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Name of the offending field, as it appears in requests
    pub field: String,
    /// Human-readable message
    pub message: String,
}

impl FieldError {
    /// Create a field error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors returned by the reservation engine and the availability notifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// Bad input; nothing was written.
    #[error("validation failed: {}", summarize(.0))]
    Validation(Vec<FieldError>),

    /// The requested window overlaps an active booking, or the room cannot be
    /// sold right now. Nothing was written.
    #[error("conflict: {reason}")]
    Conflict {
        /// Why the reservation was refused
        reason: String,
    },

    /// A lifecycle transition was attempted from the wrong status.
    #[error("cannot {action} a booking in status {current}")]
    InvalidState {
        /// Attempted transition (`check_in`, `check_out`, `cancel`)
        action: &'static str,
        /// Status the booking was actually in
        current: BookingStatus,
    },

    /// Lock or transaction timeout. Safe to retry with the same parameters.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The principal lacks scope for the hotel or topic.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// Unknown room, booking, hotel or topic.
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Kind of resource
        resource: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Reference exhaustion, storage or transport failure.
    #[error("internal error: {0}")]
    Internal(String),
}

fn summarize(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join(", ")
}

impl BookingError {
    /// Shorthand for a single-field validation error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    /// Shorthand for a not-found error.
    #[must_use]
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// The overlap conflict returned by `reserve`.
    #[must_use]
    pub fn room_unavailable() -> Self {
        Self::Conflict {
            reason: "room unavailable for requested window".to_string(),
        }
    }

    /// Whether the caller may retry with the same parameters.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Stable label used in metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Conflict { .. } => "conflict",
            Self::InvalidState { .. } => "invalid_state",
            Self::Timeout(_) => "timeout",
            Self::Authorization(_) => "authorization",
            Self::NotFound { .. } => "not_found",
            Self::Internal(_) => "internal",
        }
    }
}

/// Errors reported by storage adapters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Row lock could not be acquired within the configured timeout.
    #[error("lock wait exceeded {0:?}")]
    LockTimeout(std::time::Duration),

    /// The store's own overlap guard rejected the write.
    #[error("overlapping booking for room")]
    Overlap,

    /// A booking reference collided with an existing one.
    #[error("duplicate booking reference")]
    DuplicateReference,

    /// A row the operation depends on does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Stored data could not be decoded into domain types.
    #[error("corrupt row: {0}")]
    Decode(String),

    /// Any other backend failure.
    #[error("database error: {0}")]
    Database(String),
}

impl From<StoreError> for BookingError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::LockTimeout(waited) => {
                Self::Timeout(format!("room lock not acquired within {waited:?}"))
            }
            StoreError::Overlap => Self::room_unavailable(),
            StoreError::NotFound(what) => Self::NotFound {
                resource: "record",
                id: what,
            },
            StoreError::DuplicateReference => {
                Self::Internal("booking reference collision".to_string())
            }
            StoreError::Decode(msg) | StoreError::Database(msg) => Self::Internal(msg),
        }
    }
}
