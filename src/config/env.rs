//! Environment variable substitution for webhook URLs.

use crate::error::ConfigError;
use regex::Regex;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var pattern")
});

/// Resolves `${VAR_NAME}` patterns in a string.
///
/// Every undefined variable is reported in a single error.
pub fn resolve_env_vars(value: &str) -> Result<String, ConfigError> {
    let mut missing = Vec::new();

    let resolved = ENV_VAR_PATTERN.replace_all(value, |caps: &regex::Captures<'_>| {
        let var_name = &caps[1];
        match std::env::var(var_name) {
            Ok(var_value) => var_value,
            Err(_) => {
                missing.push(var_name.to_string());
                String::new()
            }
        }
    });

    if missing.is_empty() {
        Ok(resolved.into_owned())
    } else {
        Err(ConfigError::ValidationError(format!(
            "undefined environment variable{}: {}",
            if missing.len() > 1 { "s" } else { "" },
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn resolve_env_vars_substitutes_single_variable() {
        temp_env::with_var(
            "TEST_LARK_HOOK",
            Some("https://open.feishu.cn/open-apis/bot/v2/hook/abc"),
            || {
                let result = resolve_env_vars("${TEST_LARK_HOOK}");
                assert_eq!(
                    result.unwrap(),
                    "https://open.feishu.cn/open-apis/bot/v2/hook/abc"
                );
            },
        );
    }

    #[test]
    #[serial]
    fn resolve_env_vars_substitutes_multiple_variables() {
        temp_env::with_vars(
            [
                ("TEST_HOST", Some("hooks.example.com")),
                ("TEST_TOKEN", Some("secret123")),
            ],
            || {
                let result = resolve_env_vars("https://${TEST_HOST}/hook/${TEST_TOKEN}");
                assert_eq!(result.unwrap(), "https://hooks.example.com/hook/secret123");
            },
        );
    }

    #[test]
    fn resolve_env_vars_returns_unchanged_without_pattern() {
        let input = "https://example.com/static/path";
        assert_eq!(resolve_env_vars(input).unwrap(), input);
    }

    #[test]
    fn resolve_env_vars_ignores_bare_dollar() {
        let input = "https://example.com/$notavar/{x}";
        assert_eq!(resolve_env_vars(input).unwrap(), input);
    }

    #[test]
    #[serial]
    fn resolve_env_vars_error_lists_all_undefined_variables() {
        temp_env::with_vars(
            [("UNDEFINED_A", None::<&str>), ("UNDEFINED_B", None::<&str>)],
            || {
                let err = resolve_env_vars("${UNDEFINED_A} and ${UNDEFINED_B}").unwrap_err();
                let msg = err.to_string();
                assert!(msg.contains("variables"));
                assert!(msg.contains("UNDEFINED_A"));
                assert!(msg.contains("UNDEFINED_B"));
            },
        );
    }

    #[test]
    #[serial]
    fn resolve_env_vars_preserves_text_around_variables() {
        temp_env::with_var("TEST_MIDDLE", Some("REPLACED"), || {
            let result = resolve_env_vars("prefix_${TEST_MIDDLE}_suffix");
            assert_eq!(result.unwrap(), "prefix_REPLACED_suffix");
        });
    }

    #[test]
    #[serial]
    fn resolve_env_vars_handles_empty_env_value() {
        temp_env::with_var("TEST_EMPTY_VAR", Some(""), || {
            let result = resolve_env_vars("before${TEST_EMPTY_VAR}after");
            assert_eq!(result.unwrap(), "beforeafter");
        });
    }
}
