use std::fmt::{self, Display, Formatter};

use thiserror::Error;

/// Errors raised by the isotope pattern engine.
///
/// Every failure is reported synchronously by the call that detects it; inputs
/// are never modified when an operation fails.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IsoError {
    #[error("Invalid sum formula: {0}")]
    InvalidFormula(String),
    #[error("Too many isotope combinations for {element}: {combinations} exceeds the limit of {limit}")]
    TooManyCombinations {
        element: String,
        combinations: u64,
        limit: u64,
    },
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Too few points: a window of {window} samples needs more than {points} points")]
    TooFewPoints { window: usize, points: usize },
}

/// Plain tag for [`IsoError`], for callers that map failures onto their own error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidFormula,
    TooManyCombinations,
    InvalidParameter,
    InvalidInput,
    TooFewPoints,
}

impl IsoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IsoError::InvalidFormula(_) => ErrorKind::InvalidFormula,
            IsoError::TooManyCombinations { .. } => ErrorKind::TooManyCombinations,
            IsoError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            IsoError::InvalidInput(_) => ErrorKind::InvalidInput,
            IsoError::TooFewPoints { .. } => ErrorKind::TooFewPoints,
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidFormula => write!(f, "InvalidFormula"),
            ErrorKind::TooManyCombinations => write!(f, "TooManyCombinations"),
            ErrorKind::InvalidParameter => write!(f, "InvalidParameter"),
            ErrorKind::InvalidInput => write!(f, "InvalidInput"),
            ErrorKind::TooFewPoints => write!(f, "TooFewPoints"),
        }
    }
}

pub type Result<T> = std::result::Result<T, IsoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        let err = IsoError::TooFewPoints { window: 10, points: 4 };
        assert_eq!(err.kind(), ErrorKind::TooFewPoints);
        assert_eq!(err.kind().to_string(), "TooFewPoints");
    }

    #[test]
    fn test_message_names_element() {
        let err = IsoError::TooManyCombinations {
            element: "H".to_string(),
            combinations: 100_001,
            limit: 100_000,
        };
        assert!(err.to_string().contains("for H"));
    }
}
