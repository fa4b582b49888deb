//! Error types for pronosticar operations.
//!
//! Provides rich error context for library consumers.

use std::fmt;

/// Main error type for pronosticar operations.
///
/// Covers table-shape mismatches, model/feature-table contract violations,
/// numerical failures in the solvers, and I/O failures during ingestion
/// and artifact persistence.
///
/// # Examples
///
/// ```
/// use pronosticar::error::PronosticarError;
///
/// let err = PronosticarError::DimensionMismatch {
///     expected: "100x10".to_string(),
///     actual: "100x5".to_string(),
/// };
/// assert!(err.to_string().contains("dimension mismatch"));
/// ```
#[derive(Debug)]
pub enum PronosticarError {
    /// Matrix/vector dimensions don't match for the operation.
    DimensionMismatch {
        /// Expected dimensions description
        expected: String,
        /// Actual dimensions found
        actual: String,
    },

    /// A model was asked to predict on a table whose feature-name ordering
    /// differs from the one it was trained with. Always a programming
    /// error, never a data quality issue.
    FeatureMismatch {
        /// Feature names the model was trained with
        expected: Vec<String>,
        /// Feature names of the supplied table
        actual: Vec<String>,
    },

    /// Matrix is singular (non-invertible).
    SingularMatrix {
        /// Context of the failed factorization (e.g. "vif", "ridge")
        context: String,
    },

    /// Optimization failed to converge within iteration limit.
    ConvergenceFailure {
        /// Number of iterations attempted
        iterations: usize,
        /// Final loss value
        final_loss: f32,
    },

    /// Invalid hyperparameter value provided.
    InvalidHyperparameter {
        /// Parameter name
        param: String,
        /// Provided value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// A pipeline stage produced or received a table with zero usable rows.
    EmptyTable {
        /// Stage that hit the empty table
        stage: String,
    },

    /// A named column is absent from the table.
    MissingColumn {
        /// Column name that was looked up
        name: String,
    },

    /// An (entity, year) key appeared more than once in the panel.
    DuplicateObservation {
        /// Entity identifier
        entity: String,
        /// Observation year
        year: i32,
    },

    /// CSV parsing failed.
    CsvParse {
        /// 1-based line of the offending record
        line: u64,
        /// Error description
        message: String,
    },

    /// I/O error (file not found, permission denied, etc.).
    Io(std::io::Error),

    /// Serialization/deserialization error.
    Serialization(String),

    /// Generic error with string message.
    Other(String),
}

impl fmt::Display for PronosticarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PronosticarError::DimensionMismatch { expected, actual } => {
                write!(
                    f,
                    "Matrix dimension mismatch: expected {expected}, got {actual}"
                )
            }
            PronosticarError::FeatureMismatch { expected, actual } => {
                write!(
                    f,
                    "Feature-name mismatch: model trained with {expected:?}, table supplies {actual:?}"
                )
            }
            PronosticarError::SingularMatrix { context } => {
                write!(f, "Singular matrix in {context}: cannot solve")
            }
            PronosticarError::ConvergenceFailure {
                iterations,
                final_loss,
            } => {
                write!(
                    f,
                    "Convergence failure after {iterations} iterations, loss = {final_loss}"
                )
            }
            PronosticarError::InvalidHyperparameter {
                param,
                value,
                constraint,
            } => {
                write!(
                    f,
                    "Invalid hyperparameter: {param} = {value}, expected {constraint}"
                )
            }
            PronosticarError::EmptyTable { stage } => {
                write!(f, "Stage '{stage}' produced zero usable rows")
            }
            PronosticarError::MissingColumn { name } => {
                write!(f, "Column not found: '{name}'")
            }
            PronosticarError::DuplicateObservation { entity, year } => {
                write!(f, "Duplicate observation for entity '{entity}' in year {year}")
            }
            PronosticarError::CsvParse { line, message } => {
                write!(f, "CSV parse error at line {line}: {message}")
            }
            PronosticarError::Io(e) => write!(f, "I/O error: {e}"),
            PronosticarError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            PronosticarError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for PronosticarError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PronosticarError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PronosticarError {
    fn from(err: std::io::Error) -> Self {
        PronosticarError::Io(err)
    }
}

impl From<csv::Error> for PronosticarError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map_or(0, csv::Position::line);
        PronosticarError::CsvParse {
            line,
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for PronosticarError {
    fn from(err: serde_json::Error) -> Self {
        PronosticarError::Serialization(err.to_string())
    }
}

impl From<&str> for PronosticarError {
    fn from(msg: &str) -> Self {
        PronosticarError::Other(msg.to_string())
    }
}

impl From<String> for PronosticarError {
    fn from(msg: String) -> Self {
        PronosticarError::Other(msg)
    }
}

impl PronosticarError {
    /// Create a missing-column error.
    #[must_use]
    pub fn missing_column(name: &str) -> Self {
        Self::MissingColumn {
            name: name.to_string(),
        }
    }

    /// Create an empty-table error for the given pipeline stage.
    #[must_use]
    pub fn empty_table(stage: &str) -> Self {
        Self::EmptyTable {
            stage: stage.to_string(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PronosticarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_dimension_mismatch() {
        let err = PronosticarError::DimensionMismatch {
            expected: "3x2".to_string(),
            actual: "3x5".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("dimension mismatch"));
        assert!(msg.contains("3x2"));
    }

    #[test]
    fn test_display_feature_mismatch() {
        let err = PronosticarError::FeatureMismatch {
            expected: vec!["gdp".to_string()],
            actual: vec!["gdp".to_string(), "pop".to_string()],
        };
        assert!(err.to_string().contains("Feature-name mismatch"));
    }

    #[test]
    fn test_display_empty_table() {
        let err = PronosticarError::empty_table("outlier_filter");
        assert!(err.to_string().contains("outlier_filter"));
        assert!(err.to_string().contains("zero usable rows"));
    }

    #[test]
    fn test_display_duplicate_observation() {
        let err = PronosticarError::DuplicateObservation {
            entity: "China".to_string(),
            year: 2015,
        };
        assert!(err.to_string().contains("China"));
        assert!(err.to_string().contains("2015"));
    }

    #[test]
    fn test_from_str() {
        let err: PronosticarError = "something went wrong".into();
        assert_eq!(err.to_string(), "something went wrong");
    }

    #[test]
    fn test_from_io_error_has_source() {
        use std::error::Error;
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no file");
        let err: PronosticarError = io.into();
        assert!(err.source().is_some());
    }
}
