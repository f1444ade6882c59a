/// Interprets an environment-variable style boolean ("1"/"true"/"yes"/"on" and friends), falling back to `default`
/// when the variable is unset or unintelligible. Feature switches like the expiry-worker toggle go through this so
/// a typo disables nothing silently.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

#[cfg(test)]
mod test {
    use super::parse_boolean_flag;

    #[test]
    fn boolean_flags_accept_the_usual_spellings() {
        for truthy in ["1", "true", "YES", " on "] {
            assert!(parse_boolean_flag(Some(truthy.into()), false), "{truthy} should be true");
        }
        for falsy in ["0", "False", "no", "OFF"] {
            assert!(!parse_boolean_flag(Some(falsy.into()), true), "{falsy} should be false");
        }
        assert!(parse_boolean_flag(None, true));
        assert!(!parse_boolean_flag(Some("maybe".into()), false));
    }
}
