//! Turns differences into write commands against the losing side.
//!
//! The side with the higher `RowVersion` wins; a side without the row gets
//! it inserted. Column names are translated through the table map, server
//! assigned columns are left out, and non-assigned key columns go through
//! [`UniqueKeyResolver`] on the receiving table.

use tracing::{debug, warn};
use uuid::Uuid;

use super::differ::Difference;
use super::keys::UniqueKeyResolver;
use super::report::{Finding, FindingKind, Outcome, RunReport};
use crate::core::row::{ColumnValue, Row};
use crate::core::schema::{DataType, ReservedColumns, Side, TableMap};
use crate::core::traits::{RelationalStore, WriteCommand};
use crate::core::value::SqlValue;
use crate::error::Result;

/// Which side receives a write and from which row.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub kind: FindingKind,
    /// Side that receives the write.
    pub target: Side,
    /// Row on the winning side.
    pub source: Row,
    /// Current row on the target side (updates only).
    pub existing: Option<Row>,
    /// Version carried to the target.
    pub version: i64,
    pub parent_version: Option<i64>,
    pub child_version: Option<i64>,
}

impl Decision {
    pub fn source_side(&self) -> Side {
        self.target.other()
    }
}

/// Reconciles the differences of one table map.
pub struct Reconciler<'a> {
    map: &'a TableMap,
    reserved: ReservedColumns<'a>,
    parent: &'a dyn RelationalStore,
    child: &'a dyn RelationalStore,
    keys: &'a UniqueKeyResolver,
}

impl<'a> Reconciler<'a> {
    /// Returns `None` if the map lacks either reserved column.
    pub fn new(
        map: &'a TableMap,
        parent: &'a dyn RelationalStore,
        child: &'a dyn RelationalStore,
        keys: &'a UniqueKeyResolver,
    ) -> Option<Self> {
        let reserved = map.reserved_columns()?;
        Some(Self {
            map,
            reserved,
            parent,
            child,
            keys,
        })
    }

    fn store(&self, side: Side) -> &'a dyn RelationalStore {
        match side {
            Side::Parent => self.parent,
            Side::Child => self.child,
        }
    }

    fn version_of(&self, side: Side, row: &Row) -> Option<i64> {
        row.version(&self.reserved.version.column(side).name)
    }

    /// Decide which side wins. Equal versions need no write.
    pub fn decide(&self, difference: &Difference) -> Option<Decision> {
        let pair = &difference.pair;
        let parent_version = pair
            .parent
            .as_ref()
            .and_then(|r| self.version_of(Side::Parent, r));
        let child_version = pair
            .child
            .as_ref()
            .and_then(|r| self.version_of(Side::Child, r));

        let (kind, target, source, existing, version) = match (&pair.parent, &pair.child) {
            (Some(parent), None) => (
                FindingKind::Insert,
                Side::Child,
                parent.clone(),
                None,
                parent_version?,
            ),
            (None, Some(child)) => (
                FindingKind::Insert,
                Side::Parent,
                child.clone(),
                None,
                child_version?,
            ),
            (Some(parent), Some(child)) => {
                let (pv, cv) = (parent_version?, child_version?);
                if pv > cv {
                    (
                        FindingKind::Update,
                        Side::Child,
                        parent.clone(),
                        Some(child.clone()),
                        pv,
                    )
                } else if cv > pv {
                    (
                        FindingKind::Update,
                        Side::Parent,
                        child.clone(),
                        Some(parent.clone()),
                        cv,
                    )
                } else {
                    return None;
                }
            }
            (None, None) => return None,
        };

        Some(Decision {
            kind,
            target,
            source,
            existing,
            version,
            parent_version,
            child_version,
        })
    }

    /// Report line for a decision. Table names are schema qualified.
    pub fn describe(&self, guid: &Uuid, decision: &Decision) -> String {
        let winner = self.map.table(decision.source_side()).qualified_name();
        let loser = self.map.table(decision.target).qualified_name();
        match decision.kind {
            FindingKind::Insert => format!(
                "GUID: {} has an entry in table {} but not in {}",
                guid, winner, loser
            ),
            FindingKind::Update => {
                let losing_version = match decision.target {
                    Side::Parent => decision.parent_version,
                    Side::Child => decision.child_version,
                }
                .unwrap_or_default();
                format!(
                    "GUID: {} has a higher RowVersion of {} in {} compared to {} in {}",
                    guid, decision.version, winner, losing_version, loser
                )
            }
        }
    }

    /// Build the write for a decision, resolving key collisions on the target.
    pub async fn build_command(&self, guid: Uuid, decision: &Decision) -> Result<WriteCommand> {
        let source_side = decision.source_side();
        let target = decision.target;
        let target_table = self.map.table(target);
        let target_store = self.store(target);
        let version_column = self.reserved.version.column(target);
        let guid_column = self.reserved.guid.column(target);

        let mut values = Vec::new();
        for source_value in decision.source.iter() {
            let Some(map) = self.map.map_for(source_side, &source_value.name) else {
                continue;
            };
            let column = map.column(target);
            if column.is_auto_number {
                continue;
            }

            let mut value = source_value.value.clone();
            if column.name.eq_ignore_ascii_case(&version_column.name) {
                value = version_value(column.data_type, decision.version);
            }

            if let Some(existing) = &decision.existing {
                if column.name.eq_ignore_ascii_case(&guid_column.name) {
                    continue;
                }
                let unchanged = existing
                    .value(&column.name)
                    .is_some_and(|current| same_value(current, &value));
                if unchanged && !column.name.eq_ignore_ascii_case(&version_column.name) {
                    continue;
                }
            }

            if column.is_key {
                value = self
                    .keys
                    .resolve(target_store, target_table, column, value)
                    .await?;
            }

            values.push(ColumnValue::new(column.name.clone(), column.data_type, value));
        }

        Ok(match decision.existing {
            None => WriteCommand::Insert {
                table: target_table.clone(),
                values,
            },
            Some(_) => {
                if !values
                    .iter()
                    .any(|v| v.name.eq_ignore_ascii_case(&version_column.name))
                {
                    values.push(ColumnValue::new(
                        version_column.name.clone(),
                        version_column.data_type,
                        version_value(version_column.data_type, decision.version),
                    ));
                }
                WriteCommand::Update {
                    table: target_table.clone(),
                    assignments: values,
                    filter: ColumnValue::new(
                        guid_column.name.clone(),
                        guid_column.data_type,
                        SqlValue::Uuid(guid),
                    ),
                }
            }
        })
    }

    /// Record one difference and, unless `report_only`, write it.
    ///
    /// Key-generation failures are recorded against the row and do not
    /// fail the call; store errors do.
    pub async fn reconcile(
        &self,
        difference: &Difference,
        report_only: bool,
        report: &mut RunReport,
    ) -> Result<()> {
        let Some(decision) = self.decide(difference) else {
            return Ok(());
        };

        report.record(Finding {
            table_map: self.map.to_string(),
            guid: difference.guid,
            kind: decision.kind,
            target: decision.target,
            parent_version: decision.parent_version,
            child_version: decision.child_version,
            message: self.describe(&difference.guid, &decision),
            outcome: Outcome::Reported,
            error: None,
        });

        if report_only {
            return Ok(());
        }

        let command = match self.build_command(difference.guid, &decision).await {
            Ok(command) => command,
            Err(e) if e.is_row_scoped() => {
                warn!("{}: GUID {} not remedied: {}", self.map, difference.guid, e);
                report.mark_failed(e.to_string());
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        debug!("{}: {}", self.map, command.describe());
        self.store(decision.target).execute(&command).await?;
        report.mark_remedied();
        Ok(())
    }
}

/// The winning version typed for the receiving version column.
fn version_value(data_type: DataType, version: i64) -> SqlValue {
    SqlValue::integer(data_type, version).unwrap_or(SqlValue::I64(version))
}

/// Value equality for the update column filter; differently typed NULLs match.
fn same_value(a: &SqlValue, b: &SqlValue) -> bool {
    match (a.is_null(), b.is_null()) {
        (true, true) => true,
        (false, false) => a.equivalent(b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{Column, ColumnMap, Table};
    use crate::drivers::MemoryStore;
    use crate::reconcile::differ::RowPair;

    fn map() -> TableMap {
        TableMap::new(Table::new("dbo", "Customer"), Table::new("api", "Customers"))
            .with_column(ColumnMap::identity(
                Column::new("CustomerID", DataType::Int).key().auto_number(),
            ))
            .with_column(ColumnMap::new(
                Column::new("Name", DataType::String),
                Column::new("DisplayName", DataType::String),
            ))
            .with_column(ColumnMap::identity(Column::new("RowGuid", DataType::Guid)))
            .with_column(ColumnMap::identity(Column::new("RowVersion", DataType::Long)))
    }

    fn parent_row(g: Uuid, version: i64, name: &str) -> Row {
        Row::default()
            .with("CustomerID", 1)
            .with("Name", name)
            .with("RowGuid", g)
            .with("RowVersion", version)
    }

    fn child_row(g: Uuid, version: i64, name: &str) -> Row {
        Row::default()
            .with("CustomerID", 40)
            .with("DisplayName", name)
            .with("RowGuid", g)
            .with("RowVersion", version)
    }

    fn difference(g: Uuid, parent: Option<Row>, child: Option<Row>) -> Difference {
        Difference {
            guid: g,
            pair: RowPair { parent, child },
        }
    }

    #[tokio::test]
    async fn test_decide() {
        let m = map();
        let store = MemoryStore::new("x");
        let keys = UniqueKeyResolver::default();
        let reconciler = Reconciler::new(&m, &store, &store, &keys).unwrap();
        let g = Uuid::new_v4();

        let d = reconciler
            .decide(&difference(g, Some(parent_row(g, 3, "X")), None))
            .unwrap();
        assert_eq!((d.kind, d.target), (FindingKind::Insert, Side::Child));

        let d = reconciler
            .decide(&difference(g, None, Some(child_row(g, 2, "Y"))))
            .unwrap();
        assert_eq!((d.kind, d.target), (FindingKind::Insert, Side::Parent));

        let d = reconciler
            .decide(&difference(
                g,
                Some(parent_row(g, 3, "X")),
                Some(child_row(g, 5, "Y")),
            ))
            .unwrap();
        assert_eq!((d.kind, d.target, d.version), (FindingKind::Update, Side::Parent, 5));
        assert_eq!(
            reconciler.describe(&g, &d),
            format!(
                "GUID: {} has a higher RowVersion of 5 in api.Customers compared to 3 in dbo.Customer",
                g
            )
        );

        assert!(reconciler
            .decide(&difference(
                g,
                Some(parent_row(g, 4, "X")),
                Some(child_row(g, 4, "Y")),
            ))
            .is_none());
    }

    #[tokio::test]
    async fn test_update_translates_and_skips_unchanged() {
        let m = map();
        let store = MemoryStore::new("x");
        let keys = UniqueKeyResolver::default();
        let reconciler = Reconciler::new(&m, &store, &store, &keys).unwrap();
        let g = Uuid::new_v4();

        let d = reconciler
            .decide(&difference(
                g,
                Some(parent_row(g, 7, "New")),
                Some(child_row(g, 2, "Old")),
            ))
            .unwrap();
        let command = reconciler.build_command(g, &d).await.unwrap();

        match command {
            WriteCommand::Update {
                table,
                assignments,
                filter,
            } => {
                assert_eq!(table.qualified_name(), "api.Customers");
                let names: Vec<_> = assignments.iter().map(|a| a.name.as_str()).collect();
                assert_eq!(names, vec!["DisplayName", "RowVersion"]);
                assert_eq!(assignments[1].value, SqlValue::I64(7));
                assert_eq!(filter.value, SqlValue::Uuid(g));
            }
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_insert_drops_auto_number_columns() {
        let m = map();
        let store = MemoryStore::new("x");
        let keys = UniqueKeyResolver::default();
        let reconciler = Reconciler::new(&m, &store, &store, &keys).unwrap();
        let g = Uuid::new_v4();

        let d = reconciler
            .decide(&difference(g, None, Some(child_row(g, 2, "Y"))))
            .unwrap();
        let command = reconciler.build_command(g, &d).await.unwrap();

        match command {
            WriteCommand::Insert { table, values } => {
                assert_eq!(table.qualified_name(), "dbo.Customer");
                let names: Vec<_> = values.iter().map(|v| v.name.as_str()).collect();
                assert_eq!(names, vec!["Name", "RowGuid", "RowVersion"]);
            }
            other => panic!("expected insert, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ineligible_map_has_no_reconciler() {
        let mut m = map();
        m.column_maps.retain(|c| c.from.name != "RowGuid");
        let store = MemoryStore::new("x");
        let keys = UniqueKeyResolver::default();
        assert!(Reconciler::new(&m, &store, &store, &keys).is_none());
    }
}
