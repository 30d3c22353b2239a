//! Dynamic table naming from free-form identifiers.
//!
//! # Invariants
//! - `dynamic_table_name` is pure and injective for a fixed category:
//!   distinct keys always produce distinct names.
//! - Output only contains ASCII alphanumerics and `_`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

static CATEGORY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]*$").expect("valid category regex"));

const MAX_TABLE_NAME_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableNameError {
    InvalidCategory(String),
    EmptyKey,
    TooLong { name: String, max: usize },
}

impl Display for TableNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCategory(value) => {
                write!(f, "table category must be an identifier, got `{value}`")
            }
            Self::EmptyKey => write!(f, "table key must not be empty"),
            Self::TooLong { name, max } => {
                write!(f, "table name `{name}` exceeds {max} chars")
            }
        }
    }
}

impl Error for TableNameError {}

/// Builds a table name for `(category, key)`, e.g. results per exam.
///
/// ASCII alphanumerics of the key are kept verbatim; every other byte
/// (including `_` itself) becomes `_hh` in lowercase hex. Because `_` is
/// always followed by exactly two hex digits, the encoding is prefix-free.
/// The key is encoded as given, surrounding whitespace included; a key
/// that is empty or only whitespace is rejected.
pub fn dynamic_table_name(category: &str, key: &str) -> Result<String, TableNameError> {
    if !CATEGORY_RE.is_match(category) {
        return Err(TableNameError::InvalidCategory(category.to_string()));
    }
    if key.trim().is_empty() {
        return Err(TableNameError::EmptyKey);
    }

    let mut name = String::with_capacity(category.len() + 1 + key.len());
    name.push_str(category);
    name.push('_');
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() {
            name.push(char::from(byte));
        } else {
            name.push_str(&format!("_{byte:02x}"));
        }
    }

    if name.len() > MAX_TABLE_NAME_CHARS {
        return Err(TableNameError::TooLong {
            name,
            max: MAX_TABLE_NAME_CHARS,
        });
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::{dynamic_table_name, TableNameError};
    use std::collections::HashSet;

    #[test]
    fn keeps_alphanumerics_and_escapes_the_rest() {
        assert_eq!(
            dynamic_table_name("Results", "Unit Test 1").expect("name"),
            "Results_Unit_20Test_201"
        );
    }

    #[test]
    fn keys_differing_only_in_disallowed_characters_do_not_collide() {
        let keys = [
            "Unit Test",
            "Unit_Test",
            "Unit-Test",
            "Unit.Test",
            "UnitTest",
            "Unit  Test",
            "Unit_20Test",
            "Term 1",
            "Term-1",
            "Term_1",
            "Tërm 1",
        ];
        let names: HashSet<_> = keys
            .iter()
            .map(|key| dynamic_table_name("Results", key).expect("name"))
            .collect();
        assert_eq!(names.len(), keys.len());
        for name in &names {
            assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        }
    }

    #[test]
    fn surrounding_whitespace_is_part_of_the_key() {
        let plain = dynamic_table_name("Results", "Mid").expect("name");
        let padded = dynamic_table_name("Results", " Mid").expect("name");
        assert_eq!(plain, "Results_Mid");
        assert_eq!(padded, "Results__20Mid");
        assert_ne!(dynamic_table_name("Results", "Mid ").expect("name"), plain);
    }

    #[test]
    fn rejects_bad_category_empty_key_and_overlong_names() {
        assert_eq!(
            dynamic_table_name("Res ults", "x").unwrap_err(),
            TableNameError::InvalidCategory("Res ults".to_string())
        );
        assert_eq!(
            dynamic_table_name("Results", "  ").unwrap_err(),
            TableNameError::EmptyKey
        );
        assert!(matches!(
            dynamic_table_name("Results", &"/".repeat(60)).unwrap_err(),
            TableNameError::TooLong { .. }
        ));
    }
}
