//! Identifier quoting shared by the dialects.

use crate::error::Error;

/// How an object name is treated before quoting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectNameOptions {
    /// Quote the name exactly as given.
    None,
    /// Trim surrounding whitespace first and reject names that are left empty.
    #[default]
    Trim,
}

/// Quote `name` between `open` and `close`, doubling any embedded `close` delimiter.
///
/// Empty names are always rejected; with [`ObjectNameOptions::Trim`] whitespace-only names are
/// rejected as well. Names longer than `max_len` characters (after trimming) are rejected.
pub(crate) fn delimit(
    name: &str,
    options: ObjectNameOptions,
    open: char,
    close: char,
    max_len: usize,
) -> Result<String, Error> {
    let name = validate(name, options)?;
    if name.chars().count() > max_len {
        return Err(Error::InvalidObjectName {
            name: name.to_string(),
            reason: format!("longer than {} characters", max_len),
        });
    }

    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push(open);
    for c in name.chars() {
        quoted.push(c);
        if c == close {
            quoted.push(close);
        }
    }
    quoted.push(close);
    Ok(quoted)
}

/// Apply `options` to `name` without quoting it.
pub(crate) fn validate(name: &str, options: ObjectNameOptions) -> Result<&str, Error> {
    let name = match options {
        ObjectNameOptions::None => name,
        ObjectNameOptions::Trim => name.trim(),
    };
    if name.is_empty() {
        return Err(Error::InvalidObjectName {
            name: name.to_string(),
            reason: "name is empty".to_string(),
        });
    }
    Ok(name)
}

/// Render `value` as a single-quoted SQL string literal.
pub(crate) fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimit_wraps_and_trims() {
        assert_eq!(
            delimit("  Users ", ObjectNameOptions::Trim, '[', ']', 128).unwrap(),
            "[Users]"
        );
        assert_eq!(
            delimit(" Users", ObjectNameOptions::None, '[', ']', 128).unwrap(),
            "[ Users]"
        );
    }

    #[test]
    fn delimit_doubles_closing_delimiter() {
        assert_eq!(
            delimit("a]b", ObjectNameOptions::Trim, '[', ']', 128).unwrap(),
            "[a]]b]"
        );
        assert_eq!(
            delimit("say \"hi\"", ObjectNameOptions::Trim, '"', '"', 63).unwrap(),
            "\"say \"\"hi\"\"\""
        );
    }

    #[test]
    fn rejects_blank_names() {
        assert!(matches!(
            delimit("", ObjectNameOptions::None, '[', ']', 128),
            Err(Error::InvalidObjectName { .. })
        ));
        assert!(matches!(
            delimit("   ", ObjectNameOptions::Trim, '[', ']', 128),
            Err(Error::InvalidObjectName { .. })
        ));
        // without trimming, whitespace is a legal (if odd) identifier
        assert_eq!(
            delimit(" ", ObjectNameOptions::None, '[', ']', 128).unwrap(),
            "[ ]"
        );
    }

    #[test]
    fn rejects_long_names() {
        let name = "x".repeat(64);
        assert!(delimit(&name, ObjectNameOptions::Trim, '`', '`', 64).is_ok());
        let name = "x".repeat(65);
        assert_eq!(
            delimit(&name, ObjectNameOptions::Trim, '`', '`', 64),
            Err(Error::InvalidObjectName {
                name,
                reason: "longer than 64 characters".to_string()
            })
        );
    }

    #[test]
    fn string_literal_escapes_quotes() {
        assert_eq!(string_literal("0001_init.sql"), "'0001_init.sql'");
        assert_eq!(string_literal("it's"), "'it''s'");
    }
}
