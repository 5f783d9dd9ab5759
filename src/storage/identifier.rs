//! Identifier validation.
//!
//! Table and column names cannot be bound as parameters, so they are the
//! only caller-influenced text that ever reaches a statement template. Every
//! name goes through [`validate`] first.

use crate::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

/// Longest accepted identifier, in bytes (PostgreSQL truncates beyond this).
pub const MAX_IDENTIFIER_LEN: usize = 63;

static IDENTIFIER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok());

/// Keywords rejected as bare identifiers, compared case-insensitively.
const RESERVED: &[&str] = &[
    "ALTER", "AND", "CREATE", "DECLARE", "DELETE", "DROP", "FROM", "GRANT", "INSERT", "LIMIT",
    "NULL", "OR", "ORDER", "SELECT", "SET", "TABLE", "TRUNCATE", "UNION", "UPDATE", "VALUES",
    "WHERE",
];

/// Validates a table or column identifier.
///
/// Accepts names matching `[A-Za-z_][A-Za-z0-9_]*` of at most
/// [`MAX_IDENTIFIER_LEN`] bytes that are not reserved keywords.
///
/// # Errors
///
/// Returns [`Error::InvalidIdentifier`] for anything else.
///
/// # Examples
///
/// ```
/// use spendlog::storage::validate_identifier;
///
/// assert_eq!(validate_identifier("expenses").unwrap(), "expenses");
/// assert!(validate_identifier("expenses; DROP TABLE users").is_err());
/// ```
pub fn validate(identifier: &str) -> Result<&str> {
    let matches = IDENTIFIER
        .as_ref()
        .is_some_and(|re| re.is_match(identifier));

    if !matches
        || identifier.len() > MAX_IDENTIFIER_LEN
        || RESERVED
            .iter()
            .any(|kw| kw.eq_ignore_ascii_case(identifier))
    {
        return Err(Error::InvalidIdentifier {
            identifier: identifier.to_string(),
        });
    }

    Ok(identifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("expenses")]
    #[test_case("user_id")]
    #[test_case("_private")]
    #[test_case("T2")]
    #[test_case("created_at")]
    fn test_accepts(identifier: &str) {
        assert_eq!(validate(identifier).unwrap(), identifier);
    }

    #[test_case(""; "empty")]
    #[test_case("1table"; "leading digit")]
    #[test_case("expenses; DROP TABLE users"; "statement terminator")]
    #[test_case("user id"; "space")]
    #[test_case("name\t"; "tab")]
    #[test_case("na\"me"; "double quote")]
    #[test_case("na'me"; "single quote")]
    #[test_case("na`me"; "backtick")]
    #[test_case("a-b"; "dash")]
    #[test_case("col--"; "comment")]
    #[test_case("tbl/*x*/"; "block comment")]
    #[test_case("имя"; "non ascii")]
    #[test_case("drop"; "lowercase keyword")]
    #[test_case("SELECT"; "uppercase keyword")]
    fn test_rejects(identifier: &str) {
        let err = validate(identifier).unwrap_err();
        assert!(
            matches!(err, Error::InvalidIdentifier { identifier: ref id } if id == identifier),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn test_length_limit() {
        let longest = "a".repeat(MAX_IDENTIFIER_LEN);
        assert!(validate(&longest).is_ok());

        let too_long = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(validate(&too_long).is_err());
    }

    #[test]
    fn test_keyword_prefix_is_fine() {
        assert!(validate("selection").is_ok());
        assert!(validate("drop_count").is_ok());
    }
}
