//! `${name}` placeholder replacement.

use crate::error::{Error, Result};
use std::collections::BTreeMap;

const PREFIX: &str = "${";
const SUFFIX: char = '}';

/// Replace every `${name}` in `text` with its value.
///
/// Unknown placeholders are an error naming the script.
pub fn replace_placeholders(
    text: &str,
    values: &BTreeMap<String, String>,
    script: &str,
) -> Result<String> {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(PREFIX) {
        output.push_str(&rest[..start]);
        let after = &rest[start + PREFIX.len()..];
        let Some(end) = after.find(SUFFIX) else {
            output.push_str(&rest[start..]);
            return Ok(output);
        };
        let name = &after[..end];
        let value = values.get(name).ok_or_else(|| Error::Resolver {
            location: script.to_string(),
            message: format!("no value provided for placeholder ${{{}}}", name),
        })?;
        output.push_str(value);
        rest = &after[end + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> BTreeMap<String, String> {
        let mut values = BTreeMap::new();
        values.insert("owner".to_string(), "app".to_string());
        values.insert("migratedb:table".to_string(), "history".to_string());
        values
    }

    #[test]
    fn test_replace() {
        let text = "grant all on ${migratedb:table} to ${owner};";
        assert_eq!(
            replace_placeholders(text, &values(), "V1__x.sql").unwrap(),
            "grant all on history to app;"
        );
    }

    #[test]
    fn test_unterminated_is_left_alone() {
        assert_eq!(
            replace_placeholders("select '${oops", &values(), "V1__x.sql").unwrap(),
            "select '${oops"
        );
    }

    #[test]
    fn test_unknown_placeholder() {
        let err = replace_placeholders("${missing}", &values(), "V1__x.sql").unwrap_err();
        assert!(err.to_string().contains("missing"));
        assert!(err.to_string().contains("V1__x.sql"));
    }
}
