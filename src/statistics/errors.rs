//! statistics::errors — failures of the shared numerical helpers.
//!
//! The helpers in this module tree are pure functions; the only way they can
//! fail is through a malformed request (for example an unbracketed root) or
//! a solver that gives up. Both are reported through [`NumericError`].

pub type NumericResult<T> = Result<T, NumericError>;

/// NumericError — failure of a bracketed solver or numeric helper.
///
/// Variants
/// --------
/// - `InvalidInterval { lower, upper }`
///   The search interval is empty, reversed or not finite.
/// - `RootNotBracketed { lower, upper }`
///   The function does not change sign across `[lower, upper]`.
/// - `NonFiniteValue { at, value }`
///   The objective evaluated to NaN or ±∞ at an interval end point.
/// - `Solver(String)`
///   The `argmin` executor returned an error or no parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericError {
    // ---- Input validation ----
    InvalidInterval { lower: f64, upper: f64 },
    RootNotBracketed { lower: f64, upper: f64 },
    NonFiniteValue { at: f64, value: f64 },

    // ---- Backend ----
    Solver(String),
}

impl std::error::Error for NumericError {}

impl std::fmt::Display for NumericError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumericError::InvalidInterval { lower, upper } => {
                write!(f, "Invalid search interval [{lower}, {upper}]")
            }
            NumericError::RootNotBracketed { lower, upper } => {
                write!(f, "Function does not change sign on [{lower}, {upper}]")
            }
            NumericError::NonFiniteValue { at, value } => {
                write!(f, "Objective is not finite at {at}: {value}")
            }
            NumericError::Solver(msg) => write!(f, "Solver failed: {msg}"),
        }
    }
}

impl From<argmin::core::Error> for NumericError {
    fn from(err: argmin::core::Error) -> Self {
        NumericError::Solver(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    // Purpose
    // -------
    // Check that `Display` embeds the offending payload.
    fn display_includes_interval() {
        // Arrange
        let err = NumericError::RootNotBracketed { lower: 1.0, upper: 2.0 };

        // Act
        let msg = err.to_string();

        // Assert
        assert!(msg.contains("[1, 2]"), "unexpected message: {msg}");
    }
}
