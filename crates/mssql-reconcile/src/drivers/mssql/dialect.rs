//! MSSQL SQL dialect.
//!
//! Renders the typed store operations into T-SQL. Identifiers are bracket
//! quoted through [`crate::core::identifier`]; every value is a `@Pn`
//! parameter carried in [`Statement::params`].

use crate::core::identifier::{qualify_table, quote_mssql};
use crate::core::row::ColumnValue;
use crate::core::schema::{Column, Table};
use crate::core::traits::{WindowRequest, WriteCommand};
use crate::core::value::SqlValue;
use crate::error::Result;

/// Alias of the ordinal column added to window queries.
pub const SEQUENCE_COLUMN: &str = "__ReconcileSequence";

/// Rendered statement text with its parameters in `@P1..@Pn` order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    fn new(sql: String, params: Vec<SqlValue>) -> Self {
        Self { sql, params }
    }
}

/// Microsoft SQL Server dialect.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    pub fn new() -> Self {
        Self
    }

    fn column_list(columns: &[Column]) -> Result<String> {
        let quoted = columns
            .iter()
            .map(|c| quote_mssql(&c.name))
            .collect::<Result<Vec<_>>>()?;
        Ok(quoted.join(", "))
    }

    /// Numbered window over the table.
    ///
    /// ```sql
    /// SELECT TOP (@P3) [a], [b], [__ReconcileSequence]
    /// FROM (SELECT [a], [b], ROW_NUMBER() OVER (ORDER BY [k] DESC) AS [__ReconcileSequence]
    ///       FROM [dbo].[t] WITH (NOLOCK)) AS CompleteSet
    /// WHERE [__ReconcileSequence] > @P1 AND [__ReconcileSequence] <= @P2
    /// ORDER BY [__ReconcileSequence]
    /// ```
    pub fn window_query(&self, request: &WindowRequest<'_>) -> Result<Statement> {
        let cols = Self::column_list(request.columns)?;
        let seq = quote_mssql(SEQUENCE_COLUMN)?;

        let order_by = if request.ordering_keys.is_empty() {
            "(SELECT NULL)".to_string()
        } else {
            request
                .ordering_keys
                .iter()
                .map(|k| quote_mssql(k).map(|q| format!("{} DESC", q)))
                .collect::<Result<Vec<_>>>()?
                .join(", ")
        };

        let hint = if request.no_lock { " WITH (NOLOCK)" } else { "" };
        let projection = if cols.is_empty() {
            seq.clone()
        } else {
            format!("{}, {}", cols, seq)
        };
        let inner = if cols.is_empty() {
            String::new()
        } else {
            format!("{}, ", cols)
        };

        let sql = format!(
            "SELECT TOP (@P3) {projection} FROM (SELECT {inner}ROW_NUMBER() OVER (ORDER BY {order_by}) AS {seq} FROM {table}{hint}) AS CompleteSet WHERE {seq} > @P1 AND {seq} <= @P2 ORDER BY {seq}",
            projection = projection,
            inner = inner,
            order_by = order_by,
            seq = seq,
            table = qualify_table(request.table)?,
            hint = hint,
        );

        Ok(Statement::new(
            sql,
            vec![
                SqlValue::I64(request.start),
                SqlValue::I64(request.end),
                SqlValue::I64(request.size()),
            ],
        ))
    }

    /// The row whose guid column equals `guid`.
    pub fn select_by_guid(
        &self,
        table: &Table,
        columns: &[Column],
        guid_column: &str,
        guid: SqlValue,
    ) -> Result<Statement> {
        let sql = format!(
            "SELECT TOP 1 {} FROM {} WHERE {} = @P1",
            Self::column_list(columns)?,
            qualify_table(table)?,
            quote_mssql(guid_column)?
        );
        Ok(Statement::new(sql, vec![guid]))
    }

    /// Number of rows whose column equals `value`.
    pub fn count_matching(
        &self,
        table: &Table,
        column: &Column,
        value: &SqlValue,
        hold_lock: bool,
    ) -> Result<Statement> {
        let hint = if hold_lock { " WITH (HOLDLOCK)" } else { "" };
        let column_name = quote_mssql(&column.name)?;
        let table_name = qualify_table(table)?;

        if value.is_null() {
            return Ok(Statement::new(
                format!(
                    "SELECT COUNT_BIG(*) FROM {}{} WHERE {} IS NULL",
                    table_name, hint, column_name
                ),
                Vec::new(),
            ));
        }

        Ok(Statement::new(
            format!(
                "SELECT COUNT_BIG(*) FROM {}{} WHERE {} = @P1",
                table_name, hint, column_name
            ),
            vec![value.clone()],
        ))
    }

    /// Largest non-NULL value of a column, read under a key-range lock.
    pub fn max_value(&self, table: &Table, column: &Column) -> Result<Statement> {
        let column_name = quote_mssql(&column.name)?;
        let sql = format!(
            "SELECT TOP 1 {col} FROM {} WITH (HOLDLOCK) WHERE {col} IS NOT NULL ORDER BY {col} DESC",
            qualify_table(table)?,
            col = column_name
        );
        Ok(Statement::new(sql, Vec::new()))
    }

    /// INSERT or UPDATE for a write command.
    pub fn write(&self, command: &WriteCommand) -> Result<Statement> {
        match command {
            WriteCommand::Insert { table, values } => self.insert(table, values),
            WriteCommand::Update {
                table,
                assignments,
                filter,
            } => self.update(table, assignments, filter),
        }
    }

    fn insert(&self, table: &Table, values: &[ColumnValue]) -> Result<Statement> {
        let table_name = qualify_table(table)?;
        if values.is_empty() {
            return Ok(Statement::new(
                format!("INSERT INTO {} DEFAULT VALUES", table_name),
                Vec::new(),
            ));
        }

        let columns = values
            .iter()
            .map(|v| quote_mssql(&v.name))
            .collect::<Result<Vec<_>>>()?;
        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("@P{}", i)).collect();

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table_name,
            columns.join(", "),
            placeholders.join(", ")
        );
        Ok(Statement::new(
            sql,
            values.iter().map(|v| v.value.clone()).collect(),
        ))
    }

    fn update(
        &self,
        table: &Table,
        assignments: &[ColumnValue],
        filter: &ColumnValue,
    ) -> Result<Statement> {
        let mut sets = Vec::with_capacity(assignments.len());
        for (i, assignment) in assignments.iter().enumerate() {
            sets.push(format!("{} = @P{}", quote_mssql(&assignment.name)?, i + 1));
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = @P{}",
            qualify_table(table)?,
            sets.join(", "),
            quote_mssql(&filter.name)?,
            assignments.len() + 1
        );

        let mut params: Vec<SqlValue> = assignments.iter().map(|a| a.value.clone()).collect();
        params.push(filter.value.clone());
        Ok(Statement::new(sql, params))
    }

    /// Whether READ_COMMITTED_SNAPSHOT is on for the current database.
    pub fn read_committed_snapshot_query(&self) -> &'static str {
        "SELECT CAST(is_read_committed_snapshot_on AS BIT) FROM sys.databases WHERE name = DB_NAME()"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::DataType;
    use uuid::Uuid;

    fn customer() -> Table {
        Table::new("dbo", "Customer")
    }

    fn columns() -> Vec<Column> {
        vec![
            Column::new("CustomerID", DataType::Int).key(),
            Column::new("Name", DataType::String),
        ]
    }

    #[test]
    fn test_window_query_with_keys() {
        let table = customer();
        let cols = columns();
        let keys = vec!["CustomerID".to_string(), "Region".to_string()];
        let request = WindowRequest {
            table: &table,
            columns: &cols,
            ordering_keys: &keys,
            start: 1000,
            end: 2000,
            no_lock: true,
        };

        let stmt = MssqlDialect::new().window_query(&request).unwrap();
        assert!(stmt.sql.starts_with(
            "SELECT TOP (@P3) [CustomerID], [Name], [__ReconcileSequence] FROM (SELECT [CustomerID], [Name], ROW_NUMBER()"
        ));
        assert!(stmt
            .sql
            .contains("OVER (ORDER BY [CustomerID] DESC, [Region] DESC)"));
        assert!(stmt.sql.contains("FROM [dbo].[Customer] WITH (NOLOCK)) AS CompleteSet"));
        assert!(stmt
            .sql
            .ends_with("WHERE [__ReconcileSequence] > @P1 AND [__ReconcileSequence] <= @P2 ORDER BY [__ReconcileSequence]"));
        assert_eq!(
            stmt.params,
            vec![SqlValue::I64(1000), SqlValue::I64(2000), SqlValue::I64(1000)]
        );
    }

    #[test]
    fn test_window_query_without_keys_or_hint() {
        let table = customer();
        let cols = columns();
        let request = WindowRequest {
            table: &table,
            columns: &cols,
            ordering_keys: &[],
            start: 0,
            end: 2,
            no_lock: false,
        };

        let stmt = MssqlDialect::new().window_query(&request).unwrap();
        assert!(stmt.sql.contains("OVER (ORDER BY (SELECT NULL))"));
        assert!(!stmt.sql.contains("NOLOCK"));
    }

    #[test]
    fn test_count_matching() {
        let dialect = MssqlDialect::new();
        let col = Column::new("Code", DataType::String);

        let stmt = dialect
            .count_matching(&customer(), &col, &SqlValue::from("ABC"), true)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT COUNT_BIG(*) FROM [dbo].[Customer] WITH (HOLDLOCK) WHERE [Code] = @P1"
        );
        assert_eq!(stmt.params, vec![SqlValue::from("ABC")]);

        let stmt = dialect
            .count_matching(&customer(), &col, &SqlValue::Null(DataType::String), false)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT COUNT_BIG(*) FROM [dbo].[Customer] WHERE [Code] IS NULL"
        );
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_max_value_holds_lock() {
        let stmt = MssqlDialect::new()
            .max_value(&customer(), &Column::new("CustomerID", DataType::Int))
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT TOP 1 [CustomerID] FROM [dbo].[Customer] WITH (HOLDLOCK) WHERE [CustomerID] IS NOT NULL ORDER BY [CustomerID] DESC"
        );
    }

    #[test]
    fn test_insert_is_parameterized() {
        let cmd = WriteCommand::Insert {
            table: customer(),
            values: vec![
                ColumnValue::new("Name", DataType::String, "O'Brien".into()),
                ColumnValue::new("RowVersion", DataType::Long, SqlValue::I64(3)),
            ],
        };
        let stmt = MssqlDialect::new().write(&cmd).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO [dbo].[Customer] ([Name], [RowVersion]) VALUES (@P1, @P2)"
        );
        assert_eq!(stmt.params[0], SqlValue::from("O'Brien"));
    }

    #[test]
    fn test_insert_without_values() {
        let cmd = WriteCommand::Insert {
            table: customer(),
            values: Vec::new(),
        };
        let stmt = MssqlDialect::new().write(&cmd).unwrap();
        assert_eq!(stmt.sql, "INSERT INTO [dbo].[Customer] DEFAULT VALUES");
    }

    #[test]
    fn test_update_filters_by_guid() {
        let id = Uuid::new_v4();
        let cmd = WriteCommand::Update {
            table: customer(),
            assignments: vec![
                ColumnValue::new("Name", DataType::String, "Y".into()),
                ColumnValue::new("RowVersion", DataType::Long, SqlValue::I64(5)),
            ],
            filter: ColumnValue::new("RowGuid", DataType::Guid, SqlValue::Uuid(id)),
        };
        let stmt = MssqlDialect::new().write(&cmd).unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE [dbo].[Customer] SET [Name] = @P1, [RowVersion] = @P2 WHERE [RowGuid] = @P3"
        );
        assert_eq!(stmt.params.len(), 3);
        assert_eq!(stmt.params[2], SqlValue::Uuid(id));
    }

    #[test]
    fn test_select_by_guid() {
        let id = Uuid::new_v4();
        let stmt = MssqlDialect::new()
            .select_by_guid(&customer(), &columns(), "RowGuid", SqlValue::Uuid(id))
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT TOP 1 [CustomerID], [Name] FROM [dbo].[Customer] WHERE [RowGuid] = @P1"
        );
    }
}
