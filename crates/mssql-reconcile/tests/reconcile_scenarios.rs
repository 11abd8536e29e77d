//! End-to-end reconciliation runs over in-memory stores.

use std::sync::Arc;

use mssql_reconcile::core::schema::Column;
use mssql_reconcile::error::EXIT_METADATA_ERROR;
use mssql_reconcile::{
    ColumnMap, DataType, Endpoint, MemoryCursorStore, MemoryStore, Orchestrator, ReconcileError,
    Row, RunSettings, RunStatus, SqlValue, Table, TableMap,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct Side {
    store: Arc<MemoryStore>,
    cursors: Arc<MemoryCursorStore>,
}

impl Side {
    async fn new(label: &str, table: &Table, columns: Vec<Column>, rows: Vec<Row>) -> Self {
        let store = Arc::new(MemoryStore::new(label));
        store.create_table(table.clone(), columns).await;
        store.seed(table, rows).await.unwrap();
        Self {
            store,
            cursors: Arc::new(MemoryCursorStore::new()),
        }
    }

    fn endpoint(&self, label: &str) -> Endpoint {
        Endpoint::new(label, self.store.clone(), self.cursors.clone())
    }
}

fn orchestrator(parent: &Side, child: &Side, batch_size: usize) -> Orchestrator {
    let settings = RunSettings {
        batch_size,
        ..Default::default()
    };
    Orchestrator::new(parent.endpoint("parent"), child.endpoint("child"), settings)
}

/// `dbo.Customer` on the parent, `api.Customers` with a renamed column on the child.
fn customer_map() -> TableMap {
    TableMap::new(Table::new("dbo", "Customer"), Table::new("api", "Customers"))
        .with_column(ColumnMap::identity(
            Column::new("CustomerID", DataType::Int).key(),
        ))
        .with_column(ColumnMap::new(
            Column::new("Name", DataType::String).with_size(50),
            Column::new("DisplayName", DataType::String).with_size(50),
        ))
        .with_column(ColumnMap::identity(Column::new("RowGuid", DataType::Guid)))
        .with_column(ColumnMap::identity(Column::new("RowVersion", DataType::Long)))
}

fn parent_row(id: i32, guid: Uuid, version: i64, name: &str) -> Row {
    Row::default()
        .with("CustomerID", id)
        .with("Name", name)
        .with("RowGuid", guid)
        .with("RowVersion", version)
}

fn child_row(id: i32, guid: Uuid, version: i64, name: &str) -> Row {
    Row::default()
        .with("CustomerID", id)
        .with("DisplayName", name)
        .with("RowGuid", guid)
        .with("RowVersion", version)
}

async fn sides(map: &TableMap, parent_rows: Vec<Row>, child_rows: Vec<Row>) -> (Side, Side) {
    let parent = Side::new("parent", &map.from_table, map.from_columns(), parent_rows).await;
    let child = Side::new("child", &map.to_table, map.to_columns(), child_rows).await;
    (parent, child)
}

fn find<'a>(rows: &'a [Row], guid: Uuid) -> &'a Row {
    rows.iter()
        .find(|r| r.guid("RowGuid") == Some(guid))
        .unwrap()
}

#[tokio::test]
async fn test_newer_child_row_updates_parent() {
    let map = customer_map();
    let g1 = Uuid::new_v4();
    let (parent, child) = sides(
        &map,
        vec![parent_row(1, g1, 3, "X")],
        vec![child_row(1, g1, 5, "Y")],
    )
    .await;

    let report = orchestrator(&parent, &child, 1000)
        .run(&[map.clone()], false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.differences_found, 1);
    assert_eq!(report.differences_remedied, 1);

    let rows = parent.store.rows(&map.from_table).await.unwrap();
    let row = find(&rows, g1);
    assert_eq!(row.value("Name"), Some(&SqlValue::from("Y")));
    assert_eq!(row.version("RowVersion"), Some(5));
    assert_eq!(child.store.mutations(), 0);

    let text = report.render();
    assert!(text.contains(&format!(
        "GUID: {} has a higher RowVersion of 5 in api.Customers compared to 3 in dbo.Customer",
        g1
    )));
    assert!(text.contains("Differences were remedied\n"));
    assert!(text.ends_with("1 total differences were found.\n"));
}

#[tokio::test]
async fn test_all_windows_are_visited() {
    let map = customer_map();
    let guids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
    let rows = guids
        .iter()
        .zip(1..=5)
        .map(|(guid, id)| parent_row(id, *guid, id as i64 * 10, &format!("C{}", id)))
        .collect();
    let (parent, child) = sides(&map, rows, Vec::new()).await;

    let report = orchestrator(&parent, &child, 2)
        .run(&[map.clone()], false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.differences_found, 5);
    assert_eq!(report.differences_remedied, 5);
    assert!(report.tables_capped.is_empty());
    assert_eq!(parent.store.mutations(), 0);

    let child_rows = child.store.rows(&map.to_table).await.unwrap();
    assert_eq!(child_rows.len(), 5);
    for (guid, id) in guids.iter().zip(1..=5) {
        let row = find(&child_rows, *guid);
        assert_eq!(row.version("RowVersion"), Some(id as i64 * 10));
        assert_eq!(row.value("CustomerID"), Some(&SqlValue::I32(id)));
        assert_eq!(
            row.value("DisplayName"),
            Some(&SqlValue::from(format!("C{}", id).as_str()))
        );
    }
}

#[tokio::test]
async fn test_second_run_finds_nothing() {
    let map = customer_map();
    let (parent, child) = sides(
        &map,
        vec![
            parent_row(1, Uuid::new_v4(), 1, "A"),
            parent_row(2, Uuid::new_v4(), 4, "B"),
        ],
        vec![child_row(7, Uuid::new_v4(), 2, "C")],
    )
    .await;
    let orchestrator = orchestrator(&parent, &child, 1);

    let first = orchestrator
        .run(&[map.clone()], false, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.differences_found, 3);

    let second = orchestrator
        .run(&[map.clone()], false, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.differences_found, 0);
    assert!(second.findings.is_empty());

    // Cursors are back at the start after every table
    let cursors = parent.cursors.snapshot().await;
    assert_eq!(cursors.get("dbo.Customer"), Some(&0));
    let cursors = child.cursors.snapshot().await;
    assert_eq!(cursors.get("api.Customers"), Some(&0));
}

#[tokio::test]
async fn test_report_only_matches_real_run_and_writes_nothing() {
    let map = customer_map();
    let g1 = Uuid::new_v4();
    let g2 = Uuid::new_v4();
    let g3 = Uuid::new_v4();
    let parent_rows = vec![parent_row(1, g1, 3, "X"), parent_row(2, g2, 1, "only parent")];
    let child_rows = vec![child_row(1, g1, 5, "Y"), child_row(9, g3, 1, "only child")];

    let (parent, child) = sides(&map, parent_rows.clone(), child_rows.clone()).await;
    let dry = orchestrator(&parent, &child, 1000)
        .run(&[map.clone()], true, CancellationToken::new())
        .await
        .unwrap();

    assert!(dry.report_only);
    assert_eq!(parent.store.mutations(), 0);
    assert_eq!(child.store.mutations(), 0);
    assert!(parent.cursors.snapshot().await.is_empty());
    assert!(child.cursors.snapshot().await.is_empty());
    assert!(!dry.text.contains("Differences were remedied"));

    let (parent, child) = sides(&map, parent_rows, child_rows).await;
    let real = orchestrator(&parent, &child, 1000)
        .run(&[map.clone()], false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(dry.differences_found, 3);
    assert_eq!(dry.differences_found, real.differences_found);
    assert_eq!(dry.finding_lines(), real.finding_lines());
}

#[tokio::test]
async fn test_colliding_keys_are_replaced() {
    let map = customer_map();
    let ga = Uuid::new_v4();
    let gb = Uuid::new_v4();
    let (parent, child) = sides(
        &map,
        vec![parent_row(1, ga, 7, "parent's")],
        vec![child_row(1, gb, 3, "child's")],
    )
    .await;

    let report = orchestrator(&parent, &child, 1000)
        .run(&[map.clone()], false, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.differences_remedied, 2);

    let parent_rows = parent.store.rows(&map.from_table).await.unwrap();
    assert_eq!(find(&parent_rows, ga).value("CustomerID"), Some(&SqlValue::I32(1)));
    assert_eq!(find(&parent_rows, gb).value("CustomerID"), Some(&SqlValue::I32(2)));

    let child_rows = child.store.rows(&map.to_table).await.unwrap();
    assert_eq!(find(&child_rows, gb).value("CustomerID"), Some(&SqlValue::I32(1)));
    assert_eq!(find(&child_rows, ga).value("CustomerID"), Some(&SqlValue::I32(2)));
    assert_eq!(
        find(&child_rows, ga).value("DisplayName"),
        Some(&SqlValue::from("parent's"))
    );
    assert_eq!(find(&child_rows, ga).version("RowVersion"), Some(7));
    assert_eq!(child_rows.len(), 2);

    assert_eq!(find(&parent_rows, gb).value("Name"), Some(&SqlValue::from("child's")));
    assert_eq!(find(&parent_rows, gb).version("RowVersion"), Some(3));
    assert_eq!(parent_rows.len(), 2);
}

#[tokio::test]
async fn test_crossed_windows_match_through_full_table_lookup() {
    let map = customer_map();
    let ga = Uuid::new_v4();
    let gb = Uuid::new_v4();
    // Same rows on both sides, but the ordering keys place them in opposite windows
    let (parent, child) = sides(
        &map,
        vec![parent_row(2, ga, 1, "A"), parent_row(1, gb, 1, "B")],
        vec![child_row(2, gb, 1, "B"), child_row(1, ga, 1, "A")],
    )
    .await;

    let report = orchestrator(&parent, &child, 1)
        .run(&[map.clone()], false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.differences_found, 0);
    assert_eq!(parent.store.mutations(), 0);
    assert_eq!(child.store.mutations(), 0);
}

#[tokio::test]
async fn test_unresolvable_key_fails_row_and_run_continues() {
    let stamp = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let later = stamp + chrono::Duration::days(1);

    let map = TableMap::new(Table::new("dbo", "Event"), Table::new("dbo", "Event"))
        .with_column(ColumnMap::identity(
            Column::new("Stamp", DataType::DateTime).key(),
        ))
        .with_column(ColumnMap::identity(Column::new("RowGuid", DataType::Guid)))
        .with_column(ColumnMap::identity(Column::new("RowVersion", DataType::Long)));

    let blocked = Uuid::new_v4();
    let free = Uuid::new_v4();
    let event = |at: chrono::NaiveDateTime, guid: Uuid| {
        Row::default()
            .with("Stamp", SqlValue::DateTime(at))
            .with("RowGuid", guid)
            .with("RowVersion", 1i64)
    };
    let (parent, child) = sides(
        &map,
        vec![event(stamp, blocked), event(later, free)],
        vec![event(stamp, Uuid::new_v4())],
    )
    .await;

    let report = orchestrator(&parent, &child, 1000)
        .run(&[map.clone()], false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.differences_failed, 2);
    assert_eq!(report.differences_remedied, 1);
    assert!(report
        .text
        .contains(&format!("GUID: {} could not be remedied", blocked)));

    let child_rows = child.store.rows(&map.to_table).await.unwrap();
    assert!(child_rows.iter().any(|r| r.guid("RowGuid") == Some(free)));
    assert!(!child_rows.iter().any(|r| r.guid("RowGuid") == Some(blocked)));
}

#[tokio::test]
async fn test_failed_row_revisited_after_shift_is_recorded_once() {
    let early = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let late = early + chrono::Duration::days(1);

    let map = TableMap::new(Table::new("dbo", "Event"), Table::new("dbo", "Event"))
        .with_column(ColumnMap::identity(
            Column::new("Stamp", DataType::DateTime).key(),
        ))
        .with_column(ColumnMap::identity(Column::new("RowGuid", DataType::Guid)))
        .with_column(ColumnMap::identity(Column::new("RowVersion", DataType::Long)));
    let event = |at: chrono::NaiveDateTime, guid: Uuid| {
        Row::default()
            .with("Stamp", SqlValue::DateTime(at))
            .with("RowGuid", guid)
            .with("RowVersion", 1i64)
    };

    // The child-only row sorts first on the parent once inserted, pushing the
    // blocked parent row into the next window.
    let blocked = Uuid::new_v4();
    let earlier = Uuid::new_v4();
    let clashing = Uuid::new_v4();
    let parent_rows = vec![event(late, blocked)];
    let child_rows = vec![event(early, earlier), event(late, clashing)];

    let (parent, child) = sides(&map, parent_rows.clone(), child_rows.clone()).await;
    let dry = orchestrator(&parent, &child, 1)
        .run(&[map.clone()], true, CancellationToken::new())
        .await
        .unwrap();

    let (parent, child) = sides(&map, parent_rows, child_rows).await;
    let real = orchestrator(&parent, &child, 1)
        .run(&[map.clone()], false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(dry.differences_found, 3);
    assert_eq!(real.differences_found, 3);
    assert_eq!(dry.finding_lines(), real.finding_lines());
    assert_eq!(real.differences_remedied, 1);
    assert_eq!(real.differences_failed, 2);
    let blocked_line = format!(
        "GUID: {} has an entry in table dbo.Event but not in dbo.Event",
        blocked
    );
    assert_eq!(real.text.matches(&blocked_line).count(), 1);
    assert!(parent
        .store
        .rows(&map.from_table)
        .await
        .unwrap()
        .iter()
        .any(|r| r.guid("RowGuid") == Some(earlier)));
}

#[tokio::test]
async fn test_ineligible_table_is_skipped() {
    let mut map = customer_map();
    map.column_maps.retain(|m| m.from.name != "RowVersion");
    let (parent, child) = sides(
        &map,
        vec![parent_row(1, Uuid::new_v4(), 1, "A")],
        Vec::new(),
    )
    .await;

    let report = orchestrator(&parent, &child, 1000)
        .run(&[map.clone()], false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.tables_skipped, vec!["dbo.Customer -> api.Customers"]);
    assert_eq!(report.tables_processed, 0);
    assert_eq!(report.differences_found, 0);
    assert_eq!(child.store.mutations(), 0);
}

#[tokio::test]
async fn test_cancelled_run_stops_before_writing() {
    let map = customer_map();
    let (parent, child) = sides(
        &map,
        vec![parent_row(1, Uuid::new_v4(), 1, "A")],
        Vec::new(),
    )
    .await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = orchestrator(&parent, &child, 1000)
        .run(&[map.clone()], false, cancel)
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(report.tables_processed, 0);
    assert_eq!(child.store.mutations(), 0);
    assert!(report.completed_at.is_some());
}

#[tokio::test]
async fn test_store_failure_aborts_with_partial_report() {
    let good = customer_map();
    let g = Uuid::new_v4();
    let (parent, child) = sides(&good, vec![parent_row(1, g, 1, "A")], Vec::new()).await;

    // Mapped on both sides but never created on the child
    let missing = TableMap::new(Table::new("dbo", "Customer"), Table::new("api", "Gone"))
        .with_column(ColumnMap::identity(Column::new("RowGuid", DataType::Guid)))
        .with_column(ColumnMap::identity(Column::new("RowVersion", DataType::Long)));

    let err = orchestrator(&parent, &child, 1000)
        .run(&[good, missing], false, CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), EXIT_METADATA_ERROR);
    let report = err.partial_report().unwrap();
    assert_eq!(report.status, RunStatus::Aborted);
    assert_eq!(report.tables_processed, 1);
    assert_eq!(report.differences_remedied, 1);
    assert!(matches!(err, ReconcileError::RunAborted { .. }));
}
