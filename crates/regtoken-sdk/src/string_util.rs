/// String helpers shared across the regtoken crates.
pub struct StringUtil;

impl StringUtil {
    /// Convert a string to a boolean.
    ///
    /// Accepts `"1"`, `"true"` (true) and `"0"`, `"false"` (false), case-insensitive.
    /// Returns `None` for empty or unrecognized values.
    pub fn convert_to_bool(value: &str) -> Option<bool> {
        if value.is_empty() {
            return None;
        }
        match value.trim().to_lowercase().as_str() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        }
    }

    /// Read an environment variable and interpret it as a boolean flag.
    /// Unset or unrecognized values are `false`.
    pub fn env_flag(name: &str) -> bool {
        std::env::var(name)
            .ok()
            .and_then(|v| Self::convert_to_bool(&v))
            .unwrap_or(false)
    }

    /// Render a secret in a form that is safe to log.
    ///
    /// GitHub token prefixes (`ghs_`, `ghp_`, ...) are kept so the token kind stays
    /// visible; everything else is replaced by `****` and the original length.
    pub fn redact(secret: &str) -> String {
        if secret.is_empty() {
            return "<empty>".to_string();
        }

        let prefix = match secret.find('_') {
            Some(idx) if idx <= 4 && idx + 1 < secret.len() => &secret[..=idx],
            _ => "",
        };

        format!("{prefix}****({} chars)", secret.chars().count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_to_bool_true_values() {
        assert_eq!(StringUtil::convert_to_bool("1"), Some(true));
        assert_eq!(StringUtil::convert_to_bool("true"), Some(true));
        assert_eq!(StringUtil::convert_to_bool("True"), Some(true));
        assert_eq!(StringUtil::convert_to_bool(" TRUE "), Some(true));
    }

    #[test]
    fn convert_to_bool_false_values() {
        assert_eq!(StringUtil::convert_to_bool("0"), Some(false));
        assert_eq!(StringUtil::convert_to_bool("false"), Some(false));
    }

    #[test]
    fn convert_to_bool_unknown() {
        assert_eq!(StringUtil::convert_to_bool(""), None);
        assert_eq!(StringUtil::convert_to_bool("yes"), None);
    }

    #[test]
    fn redact_keeps_github_prefix() {
        assert_eq!(StringUtil::redact("ghs_abcdef"), "ghs_****(10 chars)");
    }

    #[test]
    fn redact_hides_unprefixed_values() {
        let jwt = "eyJhbGciOiJSUzI1NiJ9.payload.sig";
        let redacted = StringUtil::redact(jwt);
        assert!(!redacted.contains("eyJ"));
        assert_eq!(redacted, format!("****({} chars)", jwt.len()));
    }

    #[test]
    fn redact_empty() {
        assert_eq!(StringUtil::redact(""), "<empty>");
    }
}
