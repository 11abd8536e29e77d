//! Replacement values for colliding primary key columns.
//!
//! A key copied from one side may already be taken on the other. Numeric
//! keys move past the current maximum (read under a key-range lock); string
//! and guid keys are regenerated at random and re-checked.
//!
//! The max + 1 read is not an atomic reservation: two writers that read the
//! same maximum before either inserts will still pick the same value.

use rand::Rng;
use rust_decimal::Decimal;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::schema::{Column, DataType, Table};
use crate::core::traits::RelationalStore;
use crate::core::value::SqlValue;
use crate::error::{ReconcileError, Result};

/// Default number of random keys tried before giving up.
pub const DEFAULT_KEY_ATTEMPTS: usize = 1000;

/// Uppercase A-Z string of `length` characters.
fn random_key(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(rng.random_range(b'A'..=b'Z')))
        .collect()
}

/// Resolves key collisions against the store that will receive the row.
#[derive(Debug, Clone)]
pub struct UniqueKeyResolver {
    attempts: usize,
}

impl Default for UniqueKeyResolver {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_ATTEMPTS)
    }
}

impl UniqueKeyResolver {
    pub fn new(attempts: usize) -> Self {
        Self {
            attempts: attempts.max(1),
        }
    }

    /// Return `candidate` if `column` on `table` does not hold it yet,
    /// otherwise a value that it does not hold.
    pub async fn resolve(
        &self,
        store: &dyn RelationalStore,
        table: &Table,
        column: &Column,
        candidate: SqlValue,
    ) -> Result<SqlValue> {
        if candidate.is_null() {
            return Ok(candidate);
        }
        if store.count_matching(table, column, &candidate, false).await? == 0 {
            return Ok(candidate);
        }

        let resolved = match column.data_type {
            DataType::Short | DataType::Int | DataType::Long => {
                self.next_integer(store, table, column).await?
            }
            DataType::Decimal => self.next_decimal(store, table, column).await?,
            DataType::String => {
                let length = match &candidate {
                    SqlValue::Text(s) => s.chars().count(),
                    other => other.to_string().chars().count(),
                };
                self.random_string(store, table, column, length).await?
            }
            DataType::Guid => self.random_guid(store, table, column).await?,
            data_type => {
                return Err(ReconcileError::UnsupportedKeyType {
                    table: table.qualified_name(),
                    column: column.name.clone(),
                    data_type,
                })
            }
        };

        debug!(
            "{}.{}: key {} taken, using {}",
            table.qualified_name(),
            column.name,
            candidate,
            resolved
        );
        Ok(resolved)
    }

    async fn next_integer(
        &self,
        store: &dyn RelationalStore,
        table: &Table,
        column: &Column,
    ) -> Result<SqlValue> {
        let max = store
            .max_value(table, column)
            .await?
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        max.checked_add(1)
            .and_then(|next| SqlValue::integer(column.data_type, next))
            .ok_or_else(|| {
                ReconcileError::key_generation(
                    table.qualified_name(),
                    column.name.clone(),
                    1,
                    format!("{} + 1", max),
                )
            })
    }

    async fn next_decimal(
        &self,
        store: &dyn RelationalStore,
        table: &Table,
        column: &Column,
    ) -> Result<SqlValue> {
        let max = store
            .max_value(table, column)
            .await?
            .and_then(|v| v.as_decimal())
            .unwrap_or(Decimal::ZERO);
        max.checked_add(Decimal::ONE)
            .map(SqlValue::Decimal)
            .ok_or_else(|| {
                ReconcileError::key_generation(
                    table.qualified_name(),
                    column.name.clone(),
                    1,
                    format!("{} + 1", max),
                )
            })
    }

    async fn random_string(
        &self,
        store: &dyn RelationalStore,
        table: &Table,
        column: &Column,
        length: usize,
    ) -> Result<SqlValue> {
        let mut length = length.max(1);
        if column.size > 0 {
            length = length.min(column.size as usize);
        }

        let mut last = String::new();
        for _ in 0..self.attempts {
            last = random_key(length);
            let value = SqlValue::Text(last.clone());
            if store.count_matching(table, column, &value, true).await? == 0 {
                return Ok(value);
            }
        }

        warn!(
            "{}.{}: no free {}-character key after {} attempts",
            table.qualified_name(),
            column.name,
            length,
            self.attempts
        );
        Err(ReconcileError::key_generation(
            table.qualified_name(),
            column.name.clone(),
            self.attempts,
            last,
        ))
    }

    async fn random_guid(
        &self,
        store: &dyn RelationalStore,
        table: &Table,
        column: &Column,
    ) -> Result<SqlValue> {
        let mut last = Uuid::nil();
        for _ in 0..self.attempts {
            last = Uuid::new_v4();
            let value = SqlValue::Uuid(last);
            if store.count_matching(table, column, &value, true).await? == 0 {
                return Ok(value);
            }
        }
        Err(ReconcileError::key_generation(
            table.qualified_name(),
            column.name.clone(),
            self.attempts,
            last.to_string(),
        ))
    }
}
