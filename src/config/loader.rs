//! Configuration loader with environment variable expansion

use super::{Config, ConfigError};
use lazy_static::lazy_static;
use regex_lite::Regex;
use std::path::Path;

lazy_static! {
    // ${VAR} or ${VAR:-default}
    static ref ENV_VAR: Regex =
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Expand `${VAR}` and `${VAR:-default}`
    ///
    /// An unset variable without a default keeps its placeholder.
    fn expand_env_vars(content: &str) -> String {
        let mut result = String::with_capacity(content.len());
        let mut last = 0;

        for cap in ENV_VAR.captures_iter(content) {
            let (Some(full), Some(name)) = (cap.get(0), cap.get(1)) else {
                continue;
            };

            result.push_str(&content[last..full.start()]);
            match (std::env::var(name.as_str()), cap.get(2)) {
                (Ok(value), _) => result.push_str(&value),
                (Err(_), Some(default)) => result.push_str(default.as_str()),
                (Err(_), None) => result.push_str(full.as_str()),
            }
            last = full.end();
        }

        result.push_str(&content[last..]);
        result
    }
}
