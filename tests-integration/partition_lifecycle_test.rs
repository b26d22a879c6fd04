//! Integration tests for the partition lifecycle
//!
//! These tests create, inspect, maintain and prune a partitioned table on a real
//! PostgreSQL database.
//!
//! Set PARTWRIGHT_TEST_DATABASE_URL to run them; without it every test returns early.
//!
//! Test flow:
//! 1. Synthesize a monthly RANGE plan from a sea-query table shape
//! 2. Apply it and verify the catalog
//! 3. Verify a failing plan leaves nothing behind
//! 4. Detach, attach, drop and prune partitions

use chrono::NaiveDate;
use partwright::{
    apply_plan, catalog, connect, DdlExecutor, MayPostgresExecutor, PartitionBuilder,
    PartitionConfig, PartitionKind, TableShape,
};
use sea_query::{ColumnDef, Table};
use std::env;

fn test_executor() -> Option<MayPostgresExecutor> {
    let url = env::var("PARTWRIGHT_TEST_DATABASE_URL").ok()?;
    Some(connect(&url).expect("Failed to connect to test database"))
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn readings_builder(table: &str) -> PartitionBuilder {
    let shape = Table::create()
        .table(table)
        .col(ColumnDef::new("id").big_integer().not_null())
        .col(ColumnDef::new("taken_on").date().not_null())
        .to_owned();

    let mut builder = PartitionBuilder::new(table, &PartitionConfig::default());
    builder.table_shape(TableShape::from_sea_query(&shape));
    builder
        .range_by("taken_on")
        .unwrap()
        .generate_monthly(ymd(2024, 1, 1), 3)
        .unwrap()
        .default_partition("default");
    builder
}

fn drop_table(executor: &MayPostgresExecutor, table: &str) {
    executor
        .execute(&format!("DROP TABLE IF EXISTS {table} CASCADE"))
        .expect("Failed to clean up test table");
}

#[test]
fn test_create_and_inspect() {
    let Some(executor) = test_executor() else {
        return;
    };
    let table = "pw_it_readings";
    drop_table(&executor, table);

    let report = readings_builder(table).create(&executor).unwrap();
    assert_eq!(report.statements_executed, 6);

    assert!(catalog::is_partitioned(&executor, table).unwrap());
    assert_eq!(
        catalog::partition_strategy(&executor, table).unwrap(),
        Some(PartitionKind::Range)
    );
    assert_eq!(
        catalog::partition_columns(&executor, table).unwrap(),
        vec!["taken_on".to_string()]
    );
    assert_eq!(catalog::partition_count(&executor, table).unwrap(), 4);

    let partitions = catalog::list_partitions(&executor, table).unwrap();
    let first = partitions
        .iter()
        .find(|p| p.name == "pw_it_readings_2024_01")
        .expect("January partition should exist");
    assert_eq!(first.range_start(), Some(ymd(2024, 1, 1)));
    assert_eq!(
        catalog::partition_info(&executor, table, "pw_it_readings_2024_01").unwrap(),
        Some(first.clone())
    );
    assert!(catalog::partition_exists(&executor, table, "pw_it_readings_default").unwrap());
    assert!(!catalog::partition_exists(&executor, table, "pw_it_readings_2023_12").unwrap());

    // Re-running the same plan is a no-op.
    readings_builder(table).create(&executor).unwrap();
    assert_eq!(catalog::partition_count(&executor, table).unwrap(), 4);

    drop_table(&executor, table);
}

#[test]
fn test_failed_apply_leaves_nothing() {
    let Some(executor) = test_executor() else {
        return;
    };
    let table = "pw_it_broken";
    drop_table(&executor, table);

    let mut builder = readings_builder(table);
    builder.check("broken", "no_such_column > 0");
    let plan = builder.synthesize().unwrap();

    let err = apply_plan(&plan, &executor).unwrap_err();
    assert!(err.is_apply());
    assert!(!catalog::is_partitioned(&executor, table).unwrap());
    assert_eq!(catalog::partition_count(&executor, table).unwrap(), 0);
}

#[test]
fn test_maintenance_and_prune() {
    let Some(executor) = test_executor() else {
        return;
    };
    let table = "pw_it_maintained";
    drop_table(&executor, table);

    let mut builder = readings_builder(table);
    builder.analyze_after_create(false);
    builder.create(&executor).unwrap();
    let maintenance = builder.maintenance();

    maintenance
        .detach_partition(&executor, "pw_it_maintained_2024_03", Some(false))
        .unwrap();
    assert_eq!(catalog::partition_count(&executor, table).unwrap(), 3);
    assert!(!catalog::partition_exists(&executor, table, "pw_it_maintained_2024_03").unwrap());

    maintenance
        .attach_range_partition(&executor, "pw_it_maintained_2024_03", ymd(2024, 3, 1), ymd(2024, 4, 1))
        .unwrap();
    assert_eq!(catalog::partition_count(&executor, table).unwrap(), 4);

    maintenance.analyze(&executor).unwrap();

    let dropped =
        catalog::drop_partitions_before(&executor, table, ymd(2024, 3, 1), &maintenance).unwrap();
    assert_eq!(
        dropped,
        vec![
            "pw_it_maintained_2024_01".to_string(),
            "pw_it_maintained_2024_02".to_string(),
        ]
    );
    assert_eq!(catalog::partition_count(&executor, table).unwrap(), 2);
    assert_ne!(catalog::table_size(&executor, table).unwrap(), "");

    drop_table(&executor, table);
}
