//! Oracle dialect support.
//!
//! Statement compilation, connection strings, and catalog queries for Oracle
//! are fully implemented through its dialect profile; no driver is wired up,
//! so execution paths report the capability gap instead of connecting.

use crate::error::EngineError;

pub(super) fn unsupported(feature: &str) -> EngineError {
    EngineError::unsupported_feature(feature, "Oracle")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_names_dialect() {
        let error = unsupported("query execution");
        assert!(error.to_string().contains("Oracle"));
        assert!(error.to_string().contains("query execution"));
    }
}
