//! Identifier validation, the single injection-prevention chokepoint.
//!
//! Every user-supplied name that could reach SQL text (table names, column
//! names, sort fields, filter fields) must pass [`validate`] before it is
//! interpolated anywhere. Quoting itself is a per-dialect concern and lives
//! on [`crate::dialect::DialectProfile`]; [`quote`] combines both steps.

use crate::dialect::Dialect;
use crate::error::{EngineError, Result};

/// Maximum identifier length in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Validates a SQL identifier.
///
/// The rule is dialect-independent: non-empty, at most 64 bytes, first
/// character an ASCII letter or underscore, remaining characters ASCII
/// alphanumeric or underscore. Anything else is rejected before any SQL text
/// is built.
///
/// # Errors
/// Returns [`EngineError::InvalidIdentifier`] describing the first rule the
/// name violates. Callers must treat this as a client-input error.
pub fn validate(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(EngineError::invalid_identifier(name, "must not be empty"));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(EngineError::invalid_identifier(
            name,
            format!("exceeds {} characters", MAX_IDENTIFIER_LEN),
        ));
    }

    let mut chars = name.chars();
    // Non-empty checked above.
    if let Some(first) = chars.next() {
        if !(first.is_ascii_alphabetic() || first == '_') {
            return Err(EngineError::invalid_identifier(
                name,
                "must start with a letter or underscore",
            ));
        }
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return Err(EngineError::invalid_identifier(
            name,
            format!("contains invalid character {:?}", bad),
        ));
    }

    Ok(())
}

/// Validates `name` and quotes it for `dialect`.
///
/// Quoting never fails once validation has passed, though dialects that fold
/// case (Oracle) may re-case the name.
pub fn quote(dialect: Dialect, name: &str) -> Result<String> {
    validate(name)?;
    Ok(dialect.profile().quote(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_well_formed_names() {
        for name in ["a", "_hidden", "field_1", "A1_b2", "t"] {
            assert!(validate(name).is_ok(), "expected {:?} to pass", name);
        }
        let max = "a".repeat(MAX_IDENTIFIER_LEN);
        assert!(validate(&max).is_ok());
    }

    #[test]
    fn test_rejects_empty_and_overlong() {
        assert!(validate("").is_err());
        let too_long = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(validate(&too_long).is_err());
    }

    #[test]
    fn test_rejects_injection_shapes() {
        let hostile = [
            "users; DROP TABLE users",
            "name--comment",
            "a b",
            "col\n",
            "1starts_with_digit",
            "semi;colon",
            "quote'name",
            "back`tick",
            "dash-name",
            "dollar$",
            "uni\u{00e9}code",
        ];
        for name in hostile {
            assert!(validate(name).is_err(), "expected {:?} to fail", name);
        }
    }

    #[test]
    fn test_quote_validates_first() {
        assert!(quote(Dialect::Postgres, "ok_name").is_ok());
        let err = quote(Dialect::Postgres, "no spaces").unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidIdentifier { .. }
        ));
    }
}
