//! Redacting wrapper for webhook URLs.

use serde::Deserialize;

/// A string that never shows up in logs.
///
/// Chat webhook URLs embed their access token in the path, so anything that
/// holds one keeps it behind this type. `Debug` and `Display` print
/// `[REDACTED]`; call [`SecretString::expose`] only where the raw value is
/// handed to the HTTP client.
///
/// ```
/// use dockwatch::config::SecretString;
///
/// let hook = SecretString::new("https://open.feishu.cn/open-apis/bot/v2/hook/t0k3n".to_string());
/// assert_eq!(format!("{:?}", hook), "[REDACTED]");
/// assert!(hook.expose().ends_with("t0k3n"));
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: String) -> Self {
        SecretString(s)
    }

    /// Returns the raw value. Never pass the result to a tracing macro.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl std::fmt::Display for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretString::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_string_redacts_in_debug_and_display() {
        let secret = SecretString::new("https://hooks.example.com/bot/abc123".to_string());

        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(secret.expose(), "https://hooks.example.com/bot/abc123");
    }

    #[test]
    fn no_hook_token_leaks_through_containers() {
        let hook = SecretString::new("https://open.feishu.cn/open-apis/bot/v2/hook/xyz789".to_string());

        let representations = [
            format!("{:?}", Some(&hook)),
            format!("{:?}", vec![&hook]),
            format!("{:?}", (&hook, "label")),
        ];

        for repr in &representations {
            assert!(!repr.contains("xyz789"), "token leaked: {}", repr);
            assert!(!repr.contains("feishu"), "host leaked: {}", repr);
        }
    }

    #[test]
    fn equal_urls_compare_equal() {
        let a = SecretString::new("https://a.example/hook".to_string());
        let b = SecretString::new("https://a.example/hook".to_string());
        assert_eq!(a, b);
    }
}
