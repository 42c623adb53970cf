//! `${VAR}` substitution.
//!
//! Supports:
//! - `${NAME}` - replaced with the value of `NAME`, or left as written when
//!   `NAME` is not set
//! - `$${NAME}` - an escape, always written out as the literal `${NAME}`
//!
//! Values spanning several lines are inserted as a quoted, escaped string so a
//! command keeps to a single line.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

// Regex for matching ${NAME} and $${NAME}
static VAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(\$?)\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Replaces every `${NAME}` in `input` using `env`.
pub fn substitute(input: &str, env: &BTreeMap<String, String>) -> String {
    VAR_REGEX
        .replace_all(input, |caps: &Captures| {
            let name = &caps[2];
            if !caps[1].is_empty() {
                return format!("${{{name}}}");
            }
            match env.get(name) {
                Some(value) if value.contains('\n') => {
                    serde_json::to_string(value).unwrap_or_else(|_| value.clone())
                }
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Names referenced by `input`, escapes excluded.
pub fn references(input: &str) -> Vec<String> {
    VAR_REGEX
        .captures_iter(input)
        .filter(|caps| caps[1].is_empty())
        .map(|caps| caps[2].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_basic_substitution() {
        let env = env(&[("BUILD_BRANCH", "main"), ("BUILD_COMMIT", "abc123")]);
        assert_eq!(
            substitute("commit ${BUILD_COMMIT} on ${BUILD_BRANCH}", &env),
            "commit abc123 on main"
        );
    }

    #[test]
    fn test_unknown_variable_preserved() {
        assert_eq!(substitute("echo ${NOPE}", &env(&[])), "echo ${NOPE}");
    }

    #[test]
    fn test_escape_is_not_looked_up() {
        let env = env(&[("HOME", "/root")]);
        assert_eq!(substitute("echo $${HOME} ${HOME}", &env), "echo ${HOME} /root");
    }

    #[test]
    fn test_multiline_values_are_quoted() {
        let env = env(&[("MSG", "line one\nline \"two\"")]);
        assert_eq!(
            substitute("echo ${MSG}", &env),
            r#"echo "line one\nline \"two\"""#
        );
    }

    #[test]
    fn test_second_pass_is_noop() {
        let env = env(&[("A", "1"), ("B", "two words")]);
        let once = substitute("${A}-${B}-$HOME-{A}", &env);
        assert_eq!(once, "1-two words-$HOME-{A}");
        assert_eq!(substitute(&once, &env), once);
    }

    #[test]
    fn test_nested_braces() {
        let env = env(&[("SHA", "abc123")]);
        assert_eq!(
            substitute(r#"{"sha": "${SHA}"}"#, &env),
            r#"{"sha": "abc123"}"#
        );
    }

    #[test]
    fn test_references() {
        assert_eq!(references("${A} $${B} ${C}"), vec!["A", "C"]);
    }
}
