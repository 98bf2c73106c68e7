use log::debug;
use std::env;

/// Prefix shared by every pipeline environment variable.
pub const ENV_PREFIX: &str = "ALMA_";

/// Read an environment variable with fallback to a default value
///
/// The prefixed form (`ALMA_<KEY>`) wins over the bare key so a shared
/// shell environment can still carry unrelated values under the short name.
pub fn read_env(key: &str, default: &str) -> String {
    let value = env::var(format!("{}{}", ENV_PREFIX, key))
        .or_else(|_| env::var(key))
        .unwrap_or_else(|_| default.to_string());

    debug!("Environment variable {} resolved to: {}", key, value);
    value
}

/// Read an optional environment variable; empty values count as unset.
pub fn read_env_opt(key: &str) -> Option<String> {
    let value = read_env(key, "");
    if value.trim().is_empty() { None } else { Some(value) }
}

/// Read an environment variable with boolean conversion
///
/// "true", "1", "yes", "y" are considered true
pub fn read_env_bool(key: &str, default: bool) -> bool {
    let value = read_env(key, if default { "true" } else { "false" });
    parse_bool(&value)
}

/// Read an environment variable with unsigned integer conversion
pub fn read_env_u64(key: &str, default: u64) -> u64 {
    let value = read_env(key, &default.to_string());
    value.trim().parse::<u64>().unwrap_or(default)
}

/// Read a comma separated list of integers, skipping unparsable entries.
pub fn read_env_i32_list(key: &str, default: &[i32]) -> Vec<i32> {
    match read_env_opt(key) {
        Some(raw) => raw
            .split(',')
            .filter_map(|part| part.trim().parse::<i32>().ok())
            .collect(),
        None => default.to_vec(),
    }
}

pub(crate) fn parse_bool(value: &str) -> bool {
    let lower_value = value.trim().to_lowercase();
    lower_value == "true" || lower_value == "1" || lower_value == "yes" || lower_value == "y"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_variants() {
        assert!(parse_bool("true"));
        assert!(parse_bool(" YES "));
        assert!(parse_bool("1"));
        assert!(!parse_bool("no"));
        assert!(!parse_bool(""));
    }

    #[test]
    fn test_missing_variables_fall_back() {
        assert_eq!(read_env("ALMA_TEST_SURELY_UNSET_KEY_42", "fallback"), "fallback");
        assert_eq!(read_env_u64("ALMA_TEST_SURELY_UNSET_KEY_42", 7), 7);
        assert_eq!(read_env_i32_list("ALMA_TEST_SURELY_UNSET_KEY_42", &[8]), vec![8]);
        assert!(read_env_opt("ALMA_TEST_SURELY_UNSET_KEY_42").is_none());
    }
}
