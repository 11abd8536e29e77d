//! Schema mapping types: tables, columns, column maps and table maps.
//!
//! A [`TableMap`] pairs a table on the parent side with its counterpart on
//! the child side. Column maps are built once per run by metadata discovery
//! and are read-only afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the stable row identity column every reconcilable table exposes.
pub const ROW_GUID: &str = "RowGuid";

/// Name of the version counter column every reconcilable table exposes.
pub const ROW_VERSION: &str = "RowVersion";

/// Default increment for identity ranges handed out to child databases.
pub const DEFAULT_IDENTITY_RANGE_INCREMENT: i32 = 100_000;

/// Size used for memory-optimized columns without a usable declared size.
const MEMORY_OPTIMIZED_DEFAULT_SIZE: i32 = 2000;

/// Semantic column type, decided once during metadata discovery.
///
/// Discriminants are the SQL Server `system_type_id` of the canonical type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum DataType {
    Short = 48,
    Int = 56,
    Long = 127,
    DateTime = 61,
    Decimal = 60,
    Boolean = 104,
    String = 231,
    Binary = 165,
    Guid = 36,
}

impl DataType {
    /// Map a SQL Server `system_type_id` onto its semantic type.
    ///
    /// Returns `None` for types the reconciler cannot carry (xml, sql_variant,
    /// floating point, spatial, ...).
    pub fn from_system_type_id(id: u8) -> Option<Self> {
        match id {
            48 | 52 => Some(DataType::Short),
            56 => Some(DataType::Int),
            127 => Some(DataType::Long),
            40 | 42 | 58 | 61 => Some(DataType::DateTime),
            60 | 106 | 108 | 122 => Some(DataType::Decimal),
            104 => Some(DataType::Boolean),
            35 | 99 | 167 | 175 | 231 | 239 => Some(DataType::String),
            34 | 165 | 173 => Some(DataType::Binary),
            36 => Some(DataType::Guid),
            _ => None,
        }
    }

    /// Canonical SQL Server `system_type_id`.
    pub fn system_type_id(self) -> u8 {
        self as u8
    }

    /// Whether a colliding key of this type is resolved with max + 1.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            DataType::Short | DataType::Int | DataType::Long | DataType::Decimal
        )
    }

    /// Whether the type is an integer type.
    pub fn is_integer(self) -> bool {
        matches!(self, DataType::Short | DataType::Int | DataType::Long)
    }

    /// Whether the declared size of a column of this type is meaningful.
    pub fn is_sized(self) -> bool {
        matches!(self, DataType::String | DataType::Binary)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Short => "short",
            DataType::Int => "int",
            DataType::Long => "long",
            DataType::DateTime => "datetime",
            DataType::Decimal => "decimal",
            DataType::Boolean => "boolean",
            DataType::String => "string",
            DataType::Binary => "binary",
            DataType::Guid => "guid",
        };
        f.write_str(name)
    }
}

/// A table on one side, identified by schema and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Table {
    /// Schema name (default: "dbo").
    pub schema: String,

    /// Table name.
    pub name: String,
}

impl Table {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// `schema.name`, used as the cursor key and in report lines.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new("dbo", "")
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Semantic type.
    pub data_type: DataType,

    /// Declared size for string/binary columns in characters/bytes; -1 is unbounded.
    pub size: i32,

    /// Size override applied when the table is memory optimized.
    pub memory_optimized_size: Option<i32>,

    /// Part of the primary key.
    pub is_key: bool,

    /// Server-assigned value (identity).
    pub is_auto_number: bool,

    /// Nullability, when known.
    pub allow_null: Option<bool>,

    /// Default constraint expression without its outer parentheses.
    pub default: Option<String>,

    /// Computed column expression.
    pub expression: Option<String>,

    /// Whether the default may be applied when adding the column.
    pub allow_default_add: bool,
}

impl Column {
    /// Create a plain nullable column.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            size: 0,
            memory_optimized_size: None,
            is_key: false,
            is_auto_number: false,
            allow_null: None,
            default: None,
            expression: None,
            allow_default_add: false,
        }
    }

    /// Mark the column as part of the primary key.
    pub fn key(mut self) -> Self {
        self.is_key = true;
        self
    }

    /// Mark the column as server-assigned.
    pub fn auto_number(mut self) -> Self {
        self.is_auto_number = true;
        self
    }

    /// Set the declared size.
    pub fn with_size(mut self, size: i32) -> Self {
        self.size = size;
        self
    }

    /// Build a column from a `sys.columns` catalog row.
    ///
    /// `max_length` is in bytes as reported by the catalog. Unicode string
    /// sizes are halved to characters; 0 and `max` become -1. Returns `None`
    /// for unsupported types.
    pub fn from_catalog(
        name: impl Into<String>,
        system_type_id: u8,
        max_length: i16,
        is_key: bool,
        is_identity: bool,
        is_nullable: bool,
        default_definition: Option<&str>,
    ) -> Option<Self> {
        let data_type = DataType::from_system_type_id(system_type_id)?;

        let size = match data_type {
            DataType::String => {
                let mut size = i32::from(max_length);
                if size > 0 && matches!(system_type_id, 231 | 239) {
                    size /= 2;
                }
                if size <= 0 {
                    -1
                } else {
                    size
                }
            }
            DataType::Binary => i32::from(max_length),
            _ => 0,
        };

        Some(Self {
            name: name.into(),
            data_type,
            size,
            memory_optimized_size: None,
            is_key,
            is_auto_number: is_identity,
            allow_null: Some(is_nullable),
            default: default_definition.map(strip_outer_parens),
            expression: None,
            allow_default_add: false,
        })
    }

    /// Declared size to use for a memory-optimized copy of this column.
    pub fn memory_optimized_size(&self) -> i32 {
        let size = if self.size <= 0 {
            MEMORY_OPTIMIZED_DEFAULT_SIZE
        } else {
            self.size
        };
        match self.memory_optimized_size {
            Some(limit) if limit > 0 && limit < size => limit,
            _ => size,
        }
    }
}

/// Strip a single enclosing pair of parentheses from a default definition.
///
/// The leading `(` must close at the final `)`; `(a)+(b)` is left as is.
fn strip_outer_parens(definition: &str) -> String {
    let Some(inner) = definition
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
    else {
        return definition.to_string();
    };

    let mut depth = 0i32;
    for c in inner.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return definition.to_string();
                }
            }
            _ => {}
        }
    }
    inner.to_string()
}

/// One of the two databases being reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Side A: the metadata source, holds the `from` half of every map.
    Parent,
    /// Side B: holds the `to` half of every map.
    Child,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Parent => Side::Child,
            Side::Child => Side::Parent,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Parent => f.write_str("parent"),
            Side::Child => f.write_str("child"),
        }
    }
}

/// Corresponding columns on the parent (`from`) and child (`to`) tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMap {
    pub from: Column,
    pub to: Column,
}

impl ColumnMap {
    pub fn new(from: Column, to: Column) -> Self {
        Self { from, to }
    }

    /// Same column on both sides.
    pub fn identity(column: Column) -> Self {
        Self {
            from: column.clone(),
            to: column,
        }
    }

    /// The column as it appears on `side`.
    pub fn column(&self, side: Side) -> &Column {
        match side {
            Side::Parent => &self.from,
            Side::Child => &self.to,
        }
    }
}

/// Table synchronization strategy declared by the tenant registry.
///
/// Only `ChangedRows` semantics are implemented by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    #[default]
    ReplaceTable,
    ReplaceTableMemory,
    ChangedRows,
    AppendOnly,
}

impl SyncType {
    /// Map a registry `SyncTypeID`.
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(SyncType::ReplaceTable),
            1 => Some(SyncType::ReplaceTableMemory),
            2 => Some(SyncType::ChangedRows),
            3 => Some(SyncType::AppendOnly),
            _ => None,
        }
    }
}

/// Reserved identity and version column maps of an eligible table.
#[derive(Debug, Clone, Copy)]
pub struct ReservedColumns<'a> {
    pub guid: &'a ColumnMap,
    pub version: &'a ColumnMap,
}

/// Mapping between a parent table and a child table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMap {
    /// Table on the parent side.
    pub from_table: Table,

    /// Table on the child side.
    pub to_table: Table,

    /// Ordered column correspondences.
    pub column_maps: Vec<ColumnMap>,

    /// Declared sync strategy.
    #[serde(default)]
    pub sync_type: SyncType,

    /// Identity range increment from the tenant registry.
    #[serde(default = "default_identity_range_increment")]
    pub identity_range_increment: i32,
}

fn default_identity_range_increment() -> i32 {
    DEFAULT_IDENTITY_RANGE_INCREMENT
}

impl TableMap {
    pub fn new(from_table: Table, to_table: Table) -> Self {
        Self {
            from_table,
            to_table,
            column_maps: Vec::new(),
            sync_type: SyncType::default(),
            identity_range_increment: DEFAULT_IDENTITY_RANGE_INCREMENT,
        }
    }

    /// Add a column map.
    pub fn with_column(mut self, map: ColumnMap) -> Self {
        self.column_maps.push(map);
        self
    }

    /// The table on `side`.
    pub fn table(&self, side: Side) -> &Table {
        match side {
            Side::Parent => &self.from_table,
            Side::Child => &self.to_table,
        }
    }

    /// Parent-side columns in map order.
    pub fn from_columns(&self) -> Vec<Column> {
        self.columns_for(Side::Parent)
    }

    /// Child-side columns in map order.
    pub fn to_columns(&self) -> Vec<Column> {
        self.columns_for(Side::Child)
    }

    /// Columns of `side` in map order.
    pub fn columns_for(&self, side: Side) -> Vec<Column> {
        self.column_maps
            .iter()
            .map(|m| m.column(side).clone())
            .collect()
    }

    /// Primary key column names on `side`, used to order batch windows.
    pub fn ordering_keys(&self, side: Side) -> Vec<String> {
        self.column_maps
            .iter()
            .map(|m| m.column(side))
            .filter(|c| c.is_key)
            .map(|c| c.name.clone())
            .collect()
    }

    /// Find the column map whose `side` column is named `name`.
    pub fn map_for(&self, side: Side, name: &str) -> Option<&ColumnMap> {
        self.column_maps
            .iter()
            .find(|m| m.column(side).name.eq_ignore_ascii_case(name))
    }

    /// Translate a column name on `side` to the name on the other side.
    pub fn translate(&self, side: Side, name: &str) -> Option<&str> {
        self.map_for(side, name)
            .map(|m| m.column(side.other()).name.as_str())
    }

    /// The `RowGuid`/`RowVersion` maps, or `None` if the table is ineligible.
    pub fn reserved_columns(&self) -> Option<ReservedColumns<'_>> {
        let find = |reserved: &str| {
            self.column_maps.iter().find(|m| {
                m.from.name.eq_ignore_ascii_case(reserved)
                    && m.to.name.eq_ignore_ascii_case(reserved)
            })
        };
        let guid = find(ROW_GUID)?;
        let version = find(ROW_VERSION)?;
        Some(ReservedColumns { guid, version })
    }

    /// Whether both reserved columns are mapped.
    pub fn is_eligible(&self) -> bool {
        self.reserved_columns().is_some()
    }
}

impl fmt::Display for TableMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}",
            self.from_table.qualified_name(),
            self.to_table.qualified_name()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_map() -> TableMap {
        TableMap::new(Table::new("dbo", "Customer"), Table::new("api", "Customers"))
            .with_column(ColumnMap::identity(
                Column::new("CustomerID", DataType::Int).key().auto_number(),
            ))
            .with_column(ColumnMap::new(
                Column::new("Name", DataType::String).with_size(50),
                Column::new("DisplayName", DataType::String).with_size(50),
            ))
            .with_column(ColumnMap::identity(Column::new(ROW_GUID, DataType::Guid)))
            .with_column(ColumnMap::identity(Column::new(ROW_VERSION, DataType::Long)))
    }

    #[test]
    fn test_data_type_from_system_type_id() {
        assert_eq!(DataType::from_system_type_id(56), Some(DataType::Int));
        assert_eq!(DataType::from_system_type_id(167), Some(DataType::String));
        assert_eq!(DataType::from_system_type_id(42), Some(DataType::DateTime));
        assert_eq!(DataType::from_system_type_id(36), Some(DataType::Guid));
        assert_eq!(DataType::from_system_type_id(241), None);
        assert_eq!(DataType::Guid.system_type_id(), 36);
    }

    #[test]
    fn test_unicode_size_is_halved() {
        let col = Column::from_catalog("Name", 231, 100, false, false, true, None).unwrap();
        assert_eq!(col.size, 50);

        let col = Column::from_catalog("Code", 167, 100, false, false, true, None).unwrap();
        assert_eq!(col.size, 100);

        let col = Column::from_catalog("Notes", 231, -1, false, false, true, None).unwrap();
        assert_eq!(col.size, -1);
    }

    #[test]
    fn test_binary_size_is_kept() {
        let col = Column::from_catalog("Blob", 165, -1, false, false, true, None).unwrap();
        assert_eq!(col.size, -1);
        let col = Column::from_catalog("Hash", 173, 32, false, false, false, None).unwrap();
        assert_eq!(col.size, 32);
    }

    #[test]
    fn test_default_definition_parens_stripped() {
        let col =
            Column::from_catalog("Flag", 104, 1, false, false, false, Some("((0))")).unwrap();
        assert_eq!(col.default.as_deref(), Some("(0)"));

        let col = Column::from_catalog("Created", 61, 8, false, false, false, Some("(getdate())"))
            .unwrap();
        assert_eq!(col.default.as_deref(), Some("getdate()"));
    }

    #[test]
    fn test_unbalanced_outer_parens_are_kept() {
        assert_eq!(strip_outer_parens("(a)+(b)"), "(a)+(b)");
        assert_eq!(strip_outer_parens("((1)+(2))"), "(1)+(2)");
        assert_eq!(strip_outer_parens("N'x'"), "N'x'");
        assert_eq!(strip_outer_parens("(0"), "(0");
    }

    #[test]
    fn test_memory_optimized_size() {
        let col = Column::new("Notes", DataType::String).with_size(-1);
        assert_eq!(col.memory_optimized_size(), 2000);

        let mut col = Column::new("Name", DataType::String).with_size(4000);
        col.memory_optimized_size = Some(500);
        assert_eq!(col.memory_optimized_size(), 500);

        col.memory_optimized_size = Some(8000);
        assert_eq!(col.memory_optimized_size(), 4000);
    }

    #[test]
    fn test_qualified_name_and_display() {
        let map = make_test_map();
        assert_eq!(map.from_table.qualified_name(), "dbo.Customer");
        assert_eq!(map.to_string(), "dbo.Customer -> api.Customers");
    }

    #[test]
    fn test_translate_is_direction_aware() {
        let map = make_test_map();
        assert_eq!(map.translate(Side::Parent, "Name"), Some("DisplayName"));
        assert_eq!(map.translate(Side::Child, "DisplayName"), Some("Name"));
        assert_eq!(map.translate(Side::Parent, "DisplayName"), None);
        assert_eq!(map.translate(Side::Parent, "Missing"), None);
    }

    #[test]
    fn test_ordering_keys() {
        let map = make_test_map();
        assert_eq!(map.ordering_keys(Side::Parent), vec!["CustomerID"]);
        assert_eq!(map.to_columns().len(), 4);
    }

    #[test]
    fn test_eligibility_requires_both_reserved_columns() {
        let map = make_test_map();
        assert!(map.is_eligible());

        let mut map = make_test_map();
        map.column_maps.retain(|m| m.from.name != ROW_VERSION);
        assert!(!map.is_eligible());
    }

    #[test]
    fn test_table_map_defaults() {
        let map = TableMap::new(Table::default(), Table::default());
        assert_eq!(map.sync_type, SyncType::ReplaceTable);
        assert_eq!(SyncType::from_id(2), Some(SyncType::ChangedRows));
        assert_eq!(SyncType::from_id(9), None);
        assert_eq!(map.identity_range_increment, 100_000);
        assert_eq!(map.from_table.schema, "dbo");
    }
}
