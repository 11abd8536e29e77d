//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Parent database (side A, metadata source).
    pub parent: EndpointConfig,

    /// Child database (side B).
    pub child: EndpointConfig,

    /// Reconciliation behavior.
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// Connection settings for one side.
#[derive(Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Encrypt connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// Schema holding the cursor settings table (default: "Sync").
    #[serde(default = "default_sync_schema")]
    pub sync_schema: String,

    /// Application name reported to the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .field("sync_schema", &self.sync_schema)
            .field("app_name", &self.app_name)
            .finish()
    }
}

/// Reconciliation behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Tenant id used to select table maps from the entity registry.
    #[serde(default)]
    pub company_id: i32,

    /// Tenant display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Schemas left out of discovery.
    #[serde(default)]
    pub excluded_schemas: Vec<String>,

    /// Explicit parent tables (`schema.table`) to reconcile instead of the
    /// registry's changed-rows tables.
    #[serde(default)]
    pub tables: Vec<String>,

    /// Rows per batch window (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Batch iterations per table before giving up (default: 100).
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Random key attempts before a row fails (default: 1000).
    #[serde(default = "default_key_attempts")]
    pub key_attempts: usize,

    /// Report differences without writing (default: false).
    #[serde(default)]
    pub report_only: bool,

    /// Allow NOLOCK reads when snapshot isolation is off (default: true).
    #[serde(default = "default_true")]
    pub allow_no_lock: bool,

    /// Pool size per side (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            company_id: 0,
            name: None,
            excluded_schemas: Vec::new(),
            tables: Vec::new(),
            batch_size: default_batch_size(),
            max_iterations: default_max_iterations(),
            key_attempts: default_key_attempts(),
            report_only: false,
            allow_no_lock: true,
            max_connections: default_max_connections(),
        }
    }
}

// Default value functions for serde
fn default_mssql_port() -> u16 {
    1433
}

fn default_sync_schema() -> String {
    "Sync".to_string()
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    1000
}

fn default_max_iterations() -> usize {
    100
}

fn default_key_attempts() -> usize {
    1000
}

fn default_max_connections() -> u32 {
    4
}
