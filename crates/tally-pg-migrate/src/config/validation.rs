//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Tenant scope validation
    if config.source.company_id.is_empty() {
        return Err(MigrateError::Config("source.company_id is required".into()));
    }
    if config.source.division_id.is_empty() {
        return Err(MigrateError::Config(
            "source.division_id is required".into(),
        ));
    }
    if config.source.company_name.is_empty() {
        return Err(MigrateError::Config(
            "source.company_name is required".into(),
        ));
    }
    if config.source.url.is_empty() {
        return Err(MigrateError::Config("source.url is required".into()));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }

    // Migration config validation - only check if explicitly set
    if let Some(0) = config.migration.chunk_size {
        return Err(MigrateError::Config(
            "migration.chunk_size must be at least 1".into(),
        ));
    }
    if let Some(0) = config.migration.load_workers {
        return Err(MigrateError::Config(
            "migration.load_workers must be at least 1".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MigrationConfig, SourceConfig, TargetConfig};

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                company_id: "co-1".to_string(),
                division_id: "div-1".to_string(),
                company_name: "Acme Traders".to_string(),
                url: "http://localhost:9000".to_string(),
                timeout_secs: 120,
            },
            target: TargetConfig {
                host: "localhost".to_string(),
                port: 5432,
                database: "target_db".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                schema: "tally".to_string(),
                ssl_mode: "disable".to_string(),
            },
            migration: MigrationConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_company_id() {
        let mut config = valid_config();
        config.source.company_id = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_target_host() {
        let mut config = valid_config();
        config.target.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let mut config = valid_config();
        config.migration.chunk_size = Some(0);
        assert!(validate(&config).is_err());
    }
}
