//! Version-based differencing of two batches.
//!
//! Parent rows drive the comparison. A parent row whose identity is not in
//! the child batch is looked up on the child table before it is classified
//! as missing, because the child's matching row may simply sit in another
//! window. Child rows left over are returned unverified; the caller checks
//! them against the parent table the same way.

use std::collections::{HashMap, HashSet};

use tracing::debug;
use uuid::Uuid;

use crate::core::row::Row;
use crate::core::schema::{Column, Table};
use crate::core::traits::RelationalStore;
use crate::error::Result;

/// Full-table lookups by identity on one side.
pub struct SideLookup<'a> {
    store: &'a dyn RelationalStore,
    table: &'a Table,
    columns: &'a [Column],
    guid_column: &'a str,
}

impl<'a> SideLookup<'a> {
    pub fn new(
        store: &'a dyn RelationalStore,
        table: &'a Table,
        columns: &'a [Column],
        guid_column: &'a str,
    ) -> Self {
        Self {
            store,
            table,
            columns,
            guid_column,
        }
    }

    /// Whether any row of the table carries `guid`.
    pub async fn exists(&self, guid: Uuid) -> Result<bool> {
        self.store
            .guid_exists(self.table, self.guid_column, guid)
            .await
    }

    /// The table's row carrying `guid`.
    pub async fn fetch(&self, guid: Uuid) -> Result<Option<Row>> {
        self.store
            .read_by_guid(self.table, self.columns, self.guid_column, guid)
            .await
    }
}

/// The row as seen on each side; `None` means the side has no such row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowPair {
    pub parent: Option<Row>,
    pub child: Option<Row>,
}

/// A row identity whose two sides disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct Difference {
    pub guid: Uuid,
    pub pair: RowPair,
}

/// Result of comparing one parent batch against one child batch.
#[derive(Debug, Default)]
pub struct DiffOutcome {
    /// Differences in parent batch order.
    pub differences: Vec<Difference>,
    /// Child rows no parent row in the batch matched, in child batch order.
    pub unmatched_child: Vec<Row>,
}

/// Names of the reserved columns on each side.
#[derive(Debug, Clone, Copy)]
pub struct ReservedNames<'a> {
    pub parent_guid: &'a str,
    pub parent_version: &'a str,
    pub child_guid: &'a str,
    pub child_version: &'a str,
}

/// Compare a parent batch against a child batch.
///
/// Rows without both reserved columns are skipped. If the same identity
/// appears twice in the parent batch only the first row is compared.
pub async fn diff(
    names: ReservedNames<'_>,
    parent_rows: Vec<Row>,
    child_rows: Vec<Row>,
    child_lookup: &SideLookup<'_>,
) -> Result<DiffOutcome> {
    let mut remaining: Vec<Option<Row>> = Vec::with_capacity(child_rows.len());
    let mut child_index: HashMap<Uuid, usize> = HashMap::new();
    for row in child_rows {
        let (Some(guid), Some(_)) = (
            row.guid(names.child_guid),
            row.version(names.child_version),
        ) else {
            continue;
        };
        child_index.entry(guid).or_insert(remaining.len());
        remaining.push(Some(row));
    }

    let mut outcome = DiffOutcome::default();
    let mut seen: HashSet<Uuid> = HashSet::new();

    for parent in parent_rows {
        let (Some(guid), Some(parent_version)) = (
            parent.guid(names.parent_guid),
            parent.version(names.parent_version),
        ) else {
            continue;
        };
        if !seen.insert(guid) {
            continue;
        }

        let sampled = child_index
            .get(&guid)
            .and_then(|&idx| remaining.get_mut(idx))
            .and_then(Option::take);

        let child = match sampled {
            Some(child) => Some(child),
            None if child_lookup.exists(guid).await? => {
                let fetched = child_lookup.fetch(guid).await?;
                if fetched.is_none() {
                    debug!("{} disappeared from the child between lookups", guid);
                }
                fetched
            }
            None => None,
        };

        match child {
            Some(child) => match child.version(names.child_version) {
                Some(child_version) if child_version != parent_version => {
                    outcome.differences.push(Difference {
                        guid,
                        pair: RowPair {
                            parent: Some(parent),
                            child: Some(child),
                        },
                    });
                }
                _ => {}
            },
            None => outcome.differences.push(Difference {
                guid,
                pair: RowPair {
                    parent: Some(parent),
                    child: None,
                },
            }),
        }
    }

    outcome.unmatched_child = remaining.into_iter().flatten().collect();
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::DataType;
    use crate::drivers::MemoryStore;

    const NAMES: ReservedNames<'static> = ReservedNames {
        parent_guid: "RowGuid",
        parent_version: "RowVersion",
        child_guid: "RowGuid",
        child_version: "RowVersion",
    };

    fn row(guid: Uuid, version: i64, name: &str) -> Row {
        Row::default()
            .with("RowGuid", guid)
            .with("RowVersion", version)
            .with("Name", name)
    }

    fn columns() -> Vec<Column> {
        vec![
            Column::new("RowGuid", DataType::Guid),
            Column::new("RowVersion", DataType::Long),
            Column::new("Name", DataType::String),
        ]
    }

    async fn child_store(rows: Vec<Row>) -> MemoryStore {
        let store = MemoryStore::new("child");
        let table = Table::new("dbo", "Customer");
        store.create_table(table.clone(), columns()).await;
        store.seed(&table, rows).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_identical_rows_produce_no_difference() {
        let g = Uuid::new_v4();
        let store = child_store(vec![row(g, 2, "X")]).await;
        let table = Table::new("dbo", "Customer");
        let cols = columns();
        let lookup = SideLookup::new(&store, &table, &cols, "RowGuid");

        let outcome = diff(NAMES, vec![row(g, 2, "X")], vec![row(g, 2, "X")], &lookup)
            .await
            .unwrap();
        assert!(outcome.differences.is_empty());
        assert!(outcome.unmatched_child.is_empty());
    }

    #[tokio::test]
    async fn test_version_mismatch_and_missing_child() {
        let g1 = Uuid::new_v4();
        let g2 = Uuid::new_v4();
        let store = child_store(vec![row(g1, 5, "Y")]).await;
        let table = Table::new("dbo", "Customer");
        let cols = columns();
        let lookup = SideLookup::new(&store, &table, &cols, "RowGuid");

        let outcome = diff(
            NAMES,
            vec![row(g1, 3, "X"), row(g2, 1, "Z")],
            vec![row(g1, 5, "Y")],
            &lookup,
        )
        .await
        .unwrap();

        assert_eq!(outcome.differences.len(), 2);
        assert_eq!(outcome.differences[0].guid, g1);
        assert!(outcome.differences[0].pair.child.is_some());
        assert_eq!(outcome.differences[1].guid, g2);
        assert!(outcome.differences[1].pair.child.is_none());
    }

    #[tokio::test]
    async fn test_child_outside_window_is_looked_up() {
        let g = Uuid::new_v4();
        let store = child_store(vec![row(g, 9, "later")]).await;
        let table = Table::new("dbo", "Customer");
        let cols = columns();
        let lookup = SideLookup::new(&store, &table, &cols, "RowGuid");

        let outcome = diff(NAMES, vec![row(g, 4, "earlier")], Vec::new(), &lookup)
            .await
            .unwrap();
        assert_eq!(outcome.differences.len(), 1);
        let child = outcome.differences[0].pair.child.as_ref().unwrap();
        assert_eq!(child.version("RowVersion"), Some(9));
    }

    #[tokio::test]
    async fn test_unmatched_child_rows_are_returned() {
        let g = Uuid::new_v4();
        let orphan = Uuid::new_v4();
        let store = child_store(vec![row(g, 1, "a"), row(orphan, 1, "b")]).await;
        let table = Table::new("dbo", "Customer");
        let cols = columns();
        let lookup = SideLookup::new(&store, &table, &cols, "RowGuid");

        let outcome = diff(
            NAMES,
            vec![row(g, 1, "a")],
            vec![row(g, 1, "a"), row(orphan, 1, "b")],
            &lookup,
        )
        .await
        .unwrap();
        assert!(outcome.differences.is_empty());
        assert_eq!(outcome.unmatched_child.len(), 1);
        assert_eq!(outcome.unmatched_child[0].guid("RowGuid"), Some(orphan));
    }

    #[tokio::test]
    async fn test_rows_without_reserved_columns_are_skipped() {
        let store = child_store(Vec::new()).await;
        let table = Table::new("dbo", "Customer");
        let cols = columns();
        let lookup = SideLookup::new(&store, &table, &cols, "RowGuid");

        let no_version = Row::default().with("RowGuid", Uuid::new_v4());
        let null_guid = Row::default()
            .with("RowGuid", crate::core::SqlValue::Null(DataType::Guid))
            .with("RowVersion", 1i64);

        let outcome = diff(NAMES, vec![no_version.clone(), null_guid], vec![no_version], &lookup)
            .await
            .unwrap();
        assert!(outcome.differences.is_empty());
        assert!(outcome.unmatched_child.is_empty());
    }
}
