//! SQL Server implementation of [`RelationalStore`].

use std::sync::Arc;

use async_trait::async_trait;
use tiberius::ToSql;
use tracing::debug;
use uuid::Uuid;

use super::convert::{bind_params, read_value};
use super::dialect::{MssqlDialect, Statement};
use super::pool::MssqlPool;
use crate::core::row::{ColumnValue, Row, SequencedRow};
use crate::core::schema::{Column, Table};
use crate::core::traits::{RelationalStore, WindowRequest, WriteCommand};
use crate::core::value::SqlValue;
use crate::error::{ReconcileError, Result};

/// One side's database, reached through a bb8 pool of tiberius clients.
pub struct MssqlStore {
    pool: Arc<MssqlPool>,
    dialect: MssqlDialect,
}

impl MssqlStore {
    pub fn new(pool: Arc<MssqlPool>) -> Self {
        Self {
            pool,
            dialect: MssqlDialect::new(),
        }
    }

    /// The pool this store reads and writes through.
    pub fn pool(&self) -> &Arc<MssqlPool> {
        &self.pool
    }

    async fn query_rows(&self, statement: &Statement) -> Result<Vec<tiberius::Row>> {
        let params = bind_params(&statement.params);
        let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut conn = self.pool.get_conn().await?;
        let rows = conn
            .query(statement.sql.as_str(), &refs)
            .await?
            .into_first_result()
            .await?;
        Ok(rows)
    }

    async fn query_scalar_row(&self, statement: &Statement) -> Result<Option<tiberius::Row>> {
        let params = bind_params(&statement.params);
        let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut conn = self.pool.get_conn().await?;
        let row = conn
            .query(statement.sql.as_str(), &refs)
            .await?
            .into_row()
            .await?;
        Ok(row)
    }
}

fn to_row(row: &tiberius::Row, columns: &[Column]) -> Result<Row> {
    let mut values = Vec::with_capacity(columns.len());
    for (idx, column) in columns.iter().enumerate() {
        values.push(ColumnValue::new(
            column.name.clone(),
            column.data_type,
            read_value(row, idx, column.data_type)?,
        ));
    }
    Ok(Row::new(values))
}

#[async_trait]
impl RelationalStore for MssqlStore {
    async fn read_window(&self, request: &WindowRequest<'_>) -> Result<Vec<SequencedRow>> {
        let statement = self.dialect.window_query(request)?;
        debug!(
            "{}: window ({}, {}] of {}",
            self.pool.name(),
            request.start,
            request.end,
            request.table
        );

        let rows = self.query_rows(&statement).await?;
        let sequence_idx = request.columns.len();

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let sequence: i64 = row.try_get(sequence_idx)?.ok_or_else(|| {
                ReconcileError::metadata(format!(
                    "NULL row ordinal reading {}",
                    request.table.qualified_name()
                ))
            })?;
            out.push(SequencedRow {
                sequence,
                row: to_row(row, request.columns)?,
            });
        }
        Ok(out)
    }

    async fn read_by_guid(
        &self,
        table: &Table,
        columns: &[Column],
        guid_column: &str,
        guid: Uuid,
    ) -> Result<Option<Row>> {
        let statement =
            self.dialect
                .select_by_guid(table, columns, guid_column, SqlValue::Uuid(guid))?;
        match self.query_scalar_row(&statement).await? {
            Some(row) => Ok(Some(to_row(&row, columns)?)),
            None => Ok(None),
        }
    }

    async fn count_matching(
        &self,
        table: &Table,
        column: &Column,
        value: &SqlValue,
        hold_lock: bool,
    ) -> Result<i64> {
        let statement = self
            .dialect
            .count_matching(table, column, value, hold_lock)?;
        let count = match self.query_scalar_row(&statement).await? {
            Some(row) => row.try_get::<i64, _>(0)?.unwrap_or(0),
            None => 0,
        };
        Ok(count)
    }

    async fn max_value(&self, table: &Table, column: &Column) -> Result<Option<SqlValue>> {
        let statement = self.dialect.max_value(table, column)?;
        match self.query_scalar_row(&statement).await? {
            Some(row) => {
                let value = read_value(&row, 0, column.data_type)?;
                Ok((!value.is_null()).then_some(value))
            }
            None => Ok(None),
        }
    }

    async fn execute(&self, command: &WriteCommand) -> Result<u64> {
        let statement = self.dialect.write(command)?;
        debug!("{}: {}", self.pool.name(), statement.sql);

        let params = bind_params(&statement.params);
        let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut conn = self.pool.get_conn().await?;
        let result = conn.execute(statement.sql.as_str(), &refs).await?;
        Ok(result.total())
    }

    async fn read_committed_snapshot(&self) -> Result<bool> {
        let mut conn = self.pool.get_conn().await?;
        let row = conn
            .simple_query(self.dialect.read_committed_snapshot_query())
            .await?
            .into_row()
            .await?;
        Ok(match row {
            Some(row) => row.try_get::<bool, _>(0)?.unwrap_or(false),
            None => false,
        })
    }

    fn store_type(&self) -> &'static str {
        "mssql"
    }
}
