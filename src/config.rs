//! Configuration Loading
//!
//! Config structs carry their defaults via `Default` and can be overridden
//! from environment variables. Each struct validates itself before use.

use thiserror::Error;

/// Invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A value is out of range.
    #[error("invalid {field}: {reason}")]
    OutOfRange {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// An environment variable could not be parsed.
    #[error("environment variable {var} has invalid value {value:?}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Read a u64 from the environment, using `default` when unset.
pub fn env_u64(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
        Err(_) => Ok(default),
    }
}

/// Read a usize from the environment, using `default` when unset.
pub fn env_usize(var: &'static str, default: usize) -> Result<usize, ConfigError> {
    env_u64(var, default as u64).map(|v| v as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_default_when_unset() {
        assert_eq!(env_u64("BATTLE_DINGHY_TEST_UNSET_VAR", 7), Ok(7));
    }

    #[test]
    fn test_env_parse() {
        std::env::set_var("BATTLE_DINGHY_TEST_GOOD_VAR", " 42 ");
        assert_eq!(env_u64("BATTLE_DINGHY_TEST_GOOD_VAR", 7), Ok(42));

        std::env::set_var("BATTLE_DINGHY_TEST_BAD_VAR", "forty");
        assert_eq!(
            env_usize("BATTLE_DINGHY_TEST_BAD_VAR", 7),
            Err(ConfigError::InvalidEnv {
                var: "BATTLE_DINGHY_TEST_BAD_VAR",
                value: "forty".into(),
            })
        );
    }
}
