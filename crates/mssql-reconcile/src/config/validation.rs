//! Configuration validation.

use super::{Config, EndpointConfig};
use crate::core::identifier::validate_identifier;
use crate::error::{ReconcileError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_endpoint("parent", &config.parent)?;
    validate_endpoint("child", &config.child)?;

    // Cannot reconcile a database with itself
    if config.parent.host.eq_ignore_ascii_case(&config.child.host)
        && config.parent.port == config.child.port
        && config.parent.database.eq_ignore_ascii_case(&config.child.database)
    {
        return Err(ReconcileError::Config(
            "parent and child cannot be the same database".into(),
        ));
    }

    let reconcile = &config.reconcile;
    if reconcile.batch_size == 0 {
        return Err(ReconcileError::Config(
            "reconcile.batch_size must be at least 1".into(),
        ));
    }
    if reconcile.max_iterations == 0 {
        return Err(ReconcileError::Config(
            "reconcile.max_iterations must be at least 1".into(),
        ));
    }
    if reconcile.key_attempts == 0 {
        return Err(ReconcileError::Config(
            "reconcile.key_attempts must be at least 1".into(),
        ));
    }
    if reconcile.max_connections == 0 {
        return Err(ReconcileError::Config(
            "reconcile.max_connections must be at least 1".into(),
        ));
    }
    for table in &reconcile.tables {
        if table.split_once('.').is_none() {
            return Err(ReconcileError::Config(format!(
                "reconcile.tables entries must be schema-qualified, got '{}'",
                table
            )));
        }
    }

    Ok(())
}

fn validate_endpoint(side: &str, endpoint: &EndpointConfig) -> Result<()> {
    if endpoint.host.is_empty() {
        return Err(ReconcileError::Config(format!("{}.host is required", side)));
    }
    if endpoint.database.is_empty() {
        return Err(ReconcileError::Config(format!(
            "{}.database is required",
            side
        )));
    }
    if endpoint.user.is_empty() {
        return Err(ReconcileError::Config(format!("{}.user is required", side)));
    }
    validate_identifier(&endpoint.sync_schema).map_err(|e| {
        ReconcileError::Config(format!("{}.sync_schema is invalid: {}", side, e))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconcileConfig;

    fn endpoint(host: &str, database: &str) -> EndpointConfig {
        EndpointConfig {
            host: host.to_string(),
            port: 1433,
            database: database.to_string(),
            user: "sync".to_string(),
            password: "password".to_string(),
            encrypt: false,
            trust_server_cert: true,
            sync_schema: "Sync".to_string(),
            app_name: None,
        }
    }

    fn valid_config() -> Config {
        Config {
            parent: endpoint("parent-db", "Exigo"),
            child: endpoint("child-db", "Tenant"),
            reconcile: ReconcileConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_parent_host() {
        let mut config = valid_config();
        config.parent.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_child_user() {
        let mut config = valid_config();
        config.child.user = "".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("child.user"));
    }

    #[test]
    fn test_same_database_rejected() {
        let mut config = valid_config();
        config.child = endpoint("PARENT-DB", "exigo");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = valid_config();
        config.reconcile.batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unqualified_table_filter_rejected() {
        let mut config = valid_config();
        config.reconcile.tables = vec!["Customer".to_string()];
        assert!(validate(&config).is_err());

        config.reconcile.tables = vec!["dbo.Customer".to_string()];
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_empty_sync_schema_rejected() {
        let mut config = valid_config();
        config.parent.sync_schema = String::new();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_endpoint_debug_redacts_password() {
        let mut config = valid_config();
        config.parent.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.parent);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }
}
