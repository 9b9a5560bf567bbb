//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml_with_defaults() {
        let yaml = r#"
source:
  company_id: co-1
  division_id: div-1
  company_name: Acme Traders
  url: http://localhost:9000
target:
  host: localhost
  database: tally_db
  user: postgres
  password: secret
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.target.port, 5432);
        assert_eq!(config.target.schema, "tally");
        assert_eq!(config.source.timeout_secs, 120);
        assert_eq!(config.migration.get_chunk_size(), 1_000);
        assert_eq!(config.migration.strictness, Strictness::SkipAndContinue);
        assert!(!config.migration.skip_load);
    }

    #[test]
    fn test_from_yaml_explicit_migration() {
        let yaml = r#"
source:
  company_id: co-1
  division_id: div-1
  company_name: Acme Traders
  url: http://localhost:9000
target:
  host: localhost
  database: tally_db
  user: postgres
  password: secret
migration:
  chunk_size: 250
  strictness: abort_on_fatal
  skip_verify: true
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.migration.get_chunk_size(), 250);
        assert_eq!(config.migration.strictness, Strictness::AbortOnFatal);
        assert!(config.migration.skip_verify);
    }
}
