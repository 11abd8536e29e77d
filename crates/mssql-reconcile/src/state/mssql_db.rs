//! MSSQL-backed cursor storage in the side's sync schema.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::core::identifier::{qualify_mssql, quote_mssql};
use crate::drivers::mssql::MssqlPool;
use crate::error::{ReconcileError, Result};
use crate::state::backend::{CursorStore, SETTINGS_TABLE};

/// Cursor store backed by `[{schema}].[CleanUpSettings]`.
pub struct MssqlCursorStore {
    pool: Arc<MssqlPool>,
    schema: String,
}

impl MssqlCursorStore {
    /// Create a cursor store in `schema` on the pool's database.
    pub fn new(pool: Arc<MssqlPool>, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    fn settings_table(&self) -> Result<String> {
        qualify_mssql(&self.schema, SETTINGS_TABLE)
    }

    /// Create the sync schema and settings table if missing.
    pub async fn init_schema(&self) -> Result<()> {
        let mut conn = self.pool.get_conn().await?;

        // DDL cannot take parameters; the quoted name is embedded in EXEC.
        let quoted_schema = quote_mssql(&self.schema)?;
        let sql = format!(
            "IF NOT EXISTS (SELECT 1 FROM sys.schemas WHERE name = @P1) EXEC(N'CREATE SCHEMA {}')",
            quoted_schema.replace('\'', "''")
        );
        conn.execute(sql, &[&self.schema.as_str()]).await?;

        let sql = format!(
            "IF NOT EXISTS (SELECT 1 FROM sys.tables WHERE name = @P2 AND schema_id = SCHEMA_ID(@P1))
             BEGIN
                 CREATE TABLE {} (
                     TableName NVARCHAR(500) NOT NULL PRIMARY KEY,
                     LastSequence BIGINT NOT NULL DEFAULT 0
                 )
             END",
            self.settings_table()?
        );
        conn.execute(sql, &[&self.schema.as_str(), &SETTINGS_TABLE])
            .await?;

        debug!("Cursor table ready: {}.{}", self.schema, SETTINGS_TABLE);
        Ok(())
    }

    /// Read the cursor for a table, inserting a 0 record if none exists.
    pub async fn last_sequence(&self, table_name: &str) -> Result<i64> {
        let table = self.settings_table()?;
        let mut conn = self.pool.get_conn().await?;

        let sql = format!(
            "SELECT TOP 1 LastSequence FROM {} WHERE TableName = @P1",
            table
        );
        let row = conn
            .query(sql, &[&table_name])
            .await?
            .into_row()
            .await?;

        if let Some(row) = row {
            let value: Option<i64> = row.try_get(0)?;
            return value.ok_or_else(|| {
                ReconcileError::Cursor(format!("NULL LastSequence for {}", table_name))
            });
        }

        let sql = format!(
            "INSERT INTO {} (TableName, LastSequence) VALUES (@P1, 0)",
            table
        );
        conn.execute(sql, &[&table_name]).await?;
        debug!("Created cursor record for {}", table_name);
        Ok(0)
    }

    /// Persist the cursor for a table.
    pub async fn set_last_sequence(&self, table_name: &str, sequence: i64) -> Result<()> {
        let sql = format!(
            "MERGE {} AS target
             USING (SELECT @P1 AS TableName) AS source
             ON target.TableName = source.TableName
             WHEN MATCHED THEN
                 UPDATE SET LastSequence = @P2
             WHEN NOT MATCHED THEN
                 INSERT (TableName, LastSequence) VALUES (@P1, @P2);",
            self.settings_table()?
        );
        let mut conn = self.pool.get_conn().await?;
        conn.execute(sql, &[&table_name, &sequence]).await?;
        Ok(())
    }

    /// Get the backend type name.
    pub fn backend_type(&self) -> &'static str {
        "mssql"
    }
}

#[async_trait]
impl CursorStore for MssqlCursorStore {
    async fn init_schema(&self) -> Result<()> {
        MssqlCursorStore::init_schema(self).await
    }

    async fn last_sequence(&self, table_name: &str) -> Result<i64> {
        MssqlCursorStore::last_sequence(self, table_name).await
    }

    async fn set_last_sequence(&self, table_name: &str, sequence: i64) -> Result<()> {
        MssqlCursorStore::set_last_sequence(self, table_name, sequence).await
    }

    fn backend_type(&self) -> &'static str {
        MssqlCursorStore::backend_type(self)
    }
}
