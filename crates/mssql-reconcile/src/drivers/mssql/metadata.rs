//! Table map discovery from the parent catalog and the tenant entity registry.

use std::sync::Arc;

use tiberius::ToSql;
use tracing::{debug, info, warn};

use super::pool::MssqlPool;
use crate::core::schema::{
    Column, ColumnMap, SyncType, Table, TableMap, DEFAULT_IDENTITY_RANGE_INCREMENT,
};
use crate::error::{ReconcileError, Result};

/// Registry value of `SyncTypeID` for changed-rows tables.
const CHANGED_ROWS_SYNC_TYPE_ID: i32 = 2;

const CATALOG_QUERY: &str = r#"
    SELECT
        ee.SchemaName,
        ee.EntityName,
        ee.EntitySetName,
        c.name,
        c.system_type_id,
        c.is_nullable,
        c.is_identity,
        CAST(CASE WHEN ic.object_id IS NULL THEN 0 ELSE 1 END AS BIT) AS is_key,
        ee.DbSchema,
        c.max_length,
        dc.definition,
        CAST(ee.IdentityRangeIncrement AS INT) AS IdentityRangeIncrement,
        CAST(ee.SyncTypeID AS INT) AS SyncTypeID
    FROM sys.columns c
    INNER JOIN sys.tables t
        ON c.object_id = t.object_id
    INNER JOIN sys.schemas s
        ON t.schema_id = s.schema_id
    INNER JOIN ExtendedEntity ee
        ON ee.EntityName = t.name COLLATE catalog_default
        AND ee.DbSchema = s.name COLLATE catalog_default
    LEFT JOIN sys.indexes i
        ON i.object_id = t.object_id
        AND i.is_primary_key = 1
    LEFT JOIN sys.index_columns ic
        ON ic.object_id = i.object_id
        AND ic.index_id = i.index_id
        AND ic.column_id = c.column_id
    LEFT JOIN sys.default_constraints dc
        ON dc.parent_object_id = c.object_id
        AND dc.parent_column_id = c.column_id
    WHERE ee.CompanyID = @P1"#;

/// Builds [`TableMap`]s from the parent database's catalog.
pub struct MetadataSource {
    pool: Arc<MssqlPool>,
}

impl MetadataSource {
    pub fn new(pool: Arc<MssqlPool>) -> Self {
        Self { pool }
    }

    /// Discover the table maps of a tenant.
    ///
    /// Without an explicit `tables` filter (parent `schema.table` names) only
    /// changed-rows registry entries are returned. Entries whose child schema
    /// is in `excluded_schemas` are left out.
    pub async fn table_maps(
        &self,
        company_id: i32,
        excluded_schemas: &[String],
        tables: &[String],
    ) -> Result<Vec<TableMap>> {
        let (sql, params) = build_catalog_query(company_id, excluded_schemas, tables);
        let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut conn = self.pool.get_conn().await?;
        let rows = conn
            .query(sql.as_str(), &refs)
            .await?
            .into_first_result()
            .await?;

        let mut maps: Vec<TableMap> = Vec::new();
        for row in &rows {
            let catalog = CatalogRow::read(row)?;
            let starts_new_map = maps.last().map_or(true, |m| {
                m.to_table.schema != catalog.schema_name || m.to_table.name != catalog.entity_set
            });
            if starts_new_map {
                maps.push(catalog.table_map());
            }

            let column = Column::from_catalog(
                catalog.column_name.clone(),
                catalog.system_type_id,
                catalog.max_length,
                catalog.is_key,
                catalog.is_identity,
                catalog.is_nullable,
                catalog.default_definition.as_deref(),
            );

            match (column, maps.last_mut()) {
                (Some(column), Some(map)) => map.column_maps.push(ColumnMap::identity(column)),
                (None, _) => warn!(
                    "Skipping {}.{}.{}: unsupported system_type_id {}",
                    catalog.db_schema,
                    catalog.entity_name,
                    catalog.column_name,
                    catalog.system_type_id
                ),
                (Some(_), None) => {}
            }
        }

        for map in &maps {
            debug!("Discovered {} ({} columns)", map, map.column_maps.len());
        }
        info!(
            "Discovered {} table maps for company {}",
            maps.len(),
            company_id
        );
        Ok(maps)
    }
}

/// Render the catalog query and its parameters.
fn build_catalog_query(
    company_id: i32,
    excluded_schemas: &[String],
    tables: &[String],
) -> (String, Vec<Box<dyn ToSql>>) {
    let mut sql = CATALOG_QUERY.to_string();
    let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(company_id)];

    if tables.is_empty() {
        params.push(Box::new(CHANGED_ROWS_SYNC_TYPE_ID));
        sql.push_str(&format!("\n      AND ee.SyncTypeID = @P{}", params.len()));
    } else {
        let mut ids = Vec::with_capacity(tables.len());
        for table in tables {
            params.push(Box::new(table.clone()));
            ids.push(format!("OBJECT_ID(@P{})", params.len()));
        }
        sql.push_str(&format!("\n      AND c.object_id IN ({})", ids.join(", ")));
    }

    if !excluded_schemas.is_empty() {
        let mut names = Vec::with_capacity(excluded_schemas.len());
        for schema in excluded_schemas {
            params.push(Box::new(schema.clone()));
            names.push(format!("@P{}", params.len()));
        }
        sql.push_str(&format!("\n      AND ee.SchemaName NOT IN ({})", names.join(", ")));
    }

    sql.push_str("\n    ORDER BY ee.SchemaName, ee.EntityName, c.column_id");
    (sql, params)
}

/// One column row of the catalog query.
struct CatalogRow {
    schema_name: String,
    entity_name: String,
    entity_set: String,
    column_name: String,
    system_type_id: u8,
    is_nullable: bool,
    is_identity: bool,
    is_key: bool,
    db_schema: String,
    max_length: i16,
    default_definition: Option<String>,
    identity_range_increment: Option<i32>,
    sync_type_id: Option<i32>,
}

impl CatalogRow {
    fn read(row: &tiberius::Row) -> Result<Self> {
        let text = |idx: usize, name: &str| -> Result<String> {
            row.try_get::<&str, _>(idx)?
                .map(str::to_string)
                .ok_or_else(|| ReconcileError::metadata(format!("NULL {} in catalog row", name)))
        };

        Ok(Self {
            schema_name: text(0, "SchemaName")?,
            entity_name: text(1, "EntityName")?,
            entity_set: text(2, "EntitySetName")?,
            column_name: text(3, "column name")?,
            system_type_id: row.try_get::<u8, _>(4)?.unwrap_or(0),
            is_nullable: row.try_get::<bool, _>(5)?.unwrap_or(true),
            is_identity: row.try_get::<bool, _>(6)?.unwrap_or(false),
            is_key: row.try_get::<bool, _>(7)?.unwrap_or(false),
            db_schema: text(8, "DbSchema")?,
            max_length: row.try_get::<i16, _>(9)?.unwrap_or(0),
            default_definition: row.try_get::<&str, _>(10)?.map(str::to_string),
            identity_range_increment: row.try_get::<i32, _>(11)?,
            sync_type_id: row.try_get::<i32, _>(12)?,
        })
    }

    fn table_map(&self) -> TableMap {
        let mut map = TableMap::new(
            Table::new(self.db_schema.clone(), self.entity_name.clone()),
            Table::new(self.schema_name.clone(), self.entity_set.clone()),
        );
        map.identity_range_increment = self
            .identity_range_increment
            .unwrap_or(DEFAULT_IDENTITY_RANGE_INCREMENT);
        map.sync_type = self
            .sync_type_id
            .and_then(SyncType::from_id)
            .unwrap_or_default();
        map
    }
}
