// Parser error taxonomy
// Every parser in `crate::parser` fails with exactly one of these kinds.

use thiserror::Error;

/// Result alias for the pure parsers.
pub type ParseResult<T> = Result<T, ParseError>;

/// Why a piece of user input was rejected.
///
/// The kinds are distinct so the prompting layer can word its message, but
/// all of them are recoverable: the caller re-asks and nothing was mutated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Input does not match any recognised shape.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// Input matched a shape but failed a semantic check (bounds, formats).
    #[error("value error: {0}")]
    Value(String),

    /// Input referenced something that is not in the known set.
    #[error("lookup error: {0}")]
    Lookup(String),
}

impl ParseError {
    pub fn syntax(message: impl Into<String>) -> Self {
        ParseError::Syntax(message.into())
    }

    pub fn value(message: impl Into<String>) -> Self {
        ParseError::Value(message.into())
    }

    pub fn lookup(message: impl Into<String>) -> Self {
        ParseError::Lookup(message.into())
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self, ParseError::Syntax(_))
    }

    pub fn is_value(&self) -> bool {
        matches!(self, ParseError::Value(_))
    }

    pub fn is_lookup(&self) -> bool {
        matches!(self, ParseError::Lookup(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert!(ParseError::syntax("x").is_syntax());
        assert!(ParseError::value("x").is_value());
        assert!(ParseError::lookup("x").is_lookup());
        assert!(!ParseError::value("x").is_syntax());
    }

    #[test]
    fn test_error_display() {
        let err = ParseError::value("'4' must be >= '10'");
        assert_eq!(err.to_string(), "value error: '4' must be >= '10'");
    }
}
