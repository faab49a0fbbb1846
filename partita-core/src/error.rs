//! Error types for configuration and library construction.
//!
//! Matching itself never fails with an error: a rejected alignment is an
//! ordinary `None` from the solver.

use thiserror::Error;

/// Invalid matcher configuration value
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Value must lie in a closed range
    #[error("{field} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },

    /// Value must be a finite number
    #[error("{field} must be finite, got {value}")]
    NotFinite { field: &'static str, value: f64 },

    /// Count must be at least one
    #[error("{field} must be at least 1")]
    Zero { field: &'static str },
}

/// Errors raised while wiring up a passage library
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LibraryError {
    /// Bar id does not belong to this library
    #[error("unknown bar {0}")]
    UnknownBar(usize),

    /// Segment id does not belong to this library
    #[error("unknown segment {0}")]
    UnknownSegment(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ConfigError::OutOfRange {
            field: "margin",
            min: 0.0,
            max: 4.0,
            value: 5.0,
        };
        assert_eq!(err.to_string(), "margin must be within [0, 4], got 5");
        assert_eq!(LibraryError::UnknownBar(3).to_string(), "unknown bar 3");
    }
}
