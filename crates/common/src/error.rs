use thiserror::Error;

use crate::UnitId;

/// Failures surfaced by the control and data planes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    /// Malformed provisioning parameters or configuration.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// A unit with the same unique id is already provisioned.
    #[error("Unit already exists: {id}")]
    AlreadyExists { id: UnitId },

    /// Unknown unique id or slot address.
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Every slot is occupied.
    #[error("Capacity exceeded: all {capacity} slots are in use")]
    CapacityExceeded { capacity: usize },

    /// The caller's output buffer cannot hold the full result.
    #[error("Buffer too small: {required} entries required, {available} available")]
    BufferTooSmall { required: usize, available: usize },

    /// The transaction channel closed while the caller was waiting.
    #[error("Operation cancelled: channel closed")]
    Cancelled,

    /// The handler broke the request/response contract.
    #[error("Protocol error: {reason}")]
    Protocol { reason: String },
}

impl PortError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        PortError::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        PortError::NotFound { what: what.into() }
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        PortError::Protocol {
            reason: reason.into(),
        }
    }

    /// Logic defects in the handler, as opposed to operational outcomes.
    pub fn is_defect(&self) -> bool {
        matches!(self, PortError::Protocol { .. })
    }

    /// Errors a caller may retry once conditions change.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PortError::CapacityExceeded { .. } | PortError::BufferTooSmall { .. }
        )
    }
}

pub type PortResult<T> = std::result::Result<T, PortError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        let err = PortError::CapacityExceeded { capacity: 16 };
        assert!(err.to_string().contains("all 16 slots"));

        let err = PortError::BufferTooSmall {
            required: 2,
            available: 1,
        };
        assert!(err.to_string().contains("2 entries required"));
    }

    #[test]
    fn classification() {
        assert!(PortError::protocol("unmatched hint 7").is_defect());
        assert!(!PortError::Cancelled.is_defect());
        assert!(!PortError::Cancelled.is_retryable());
        assert!(PortError::CapacityExceeded { capacity: 1 }.is_retryable());
        assert!(!PortError::not_found("slot 3").is_retryable());
    }
}
