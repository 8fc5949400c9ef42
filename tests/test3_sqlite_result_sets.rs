#![cfg(feature = "sqlite")]

use chrono::NaiveDate;
use sql_coordinator::prelude::*;

const SCHEMA: &str = include_str!("sqlite/items_schema.sql");

async fn seeded() -> Result<Coordinator, SqlCoordinatorError> {
    let mut db = Coordinator::builder(DatabaseType::Sqlite, "Data Source=:memory:").build()?;
    db.execute_statement(SCHEMA, CommandKind::Text, None, None).await?;
    db.execute_statement(
        "INSERT INTO Items (Id, Name, Price) VALUES (1, 'bolt', 0.25), (2, 'nut', 0.1), (3, 'gear', 4.0)",
        CommandKind::Text,
        None,
        None,
    )
    .await?;
    Ok(db)
}

#[tokio::test]
async fn row_set_exposes_columns_and_values() -> Result<(), SqlCoordinatorError> {
    let mut db = seeded().await?;
    let mut params = ParameterSet::new();
    params.add(":min_price", 0.2, DbType::Float)?;
    let rows = db
        .execute_row_set(
            "SELECT Id, Name, Price FROM Items WHERE Price >= :min_price ORDER BY Id",
            CommandKind::Text,
            Some(&params),
            None,
        )
        .await?;

    assert_eq!(rows.column_names(), ["Id", "Name", "Price"]);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows.results[0].get("name"), Some(&DbValue::Text("bolt".into())));
    assert_eq!(rows.results[1].get("Price").and_then(DbValue::as_float), Some(4.0));
    Ok(())
}

#[tokio::test]
async fn statement_without_rows_gives_an_empty_row_set() -> Result<(), SqlCoordinatorError> {
    let mut db = seeded().await?;
    let rows = db
        .execute_row_set("UPDATE Items SET Price = Price * 2", CommandKind::Text, None, None)
        .await?;
    assert!(rows.is_empty());
    assert!(rows.column_names().is_empty());
    Ok(())
}

#[tokio::test]
async fn multi_row_set_keeps_statement_order() -> Result<(), SqlCoordinatorError> {
    let mut db = seeded().await?;
    let sets = db
        .execute_multi_row_set(
            "SELECT COUNT(*) AS Total FROM Items;
             UPDATE Items SET Price = 0 WHERE Id = 2;
             SELECT Name FROM Items ORDER BY Id DESC;
             SELECT Id FROM Empty;",
            CommandKind::Text,
            None,
            None,
        )
        .await?;

    assert_eq!(sets.len(), 3);
    assert_eq!(sets[0].first_value(), Some(&DbValue::Int(3)));
    let names: Vec<_> = sets[1]
        .iter()
        .filter_map(|row| row.get("Name").and_then(DbValue::as_text))
        .collect();
    assert_eq!(names, ["gear", "nut", "bolt"]);
    assert!(sets[2].is_empty());
    assert_eq!(sets[2].column_names(), ["Id"]);
    Ok(())
}

#[tokio::test]
async fn parameter_set_is_reusable_after_a_call() -> Result<(), SqlCoordinatorError> {
    let mut db = seeded().await?;
    let sql = "INSERT INTO Items (Id, Name, CreatedAt) VALUES (@id, @name, @created)";
    let created = NaiveDate::from_ymd_opt(2024, 2, 29)
        .and_then(|d| d.and_hms_opt(8, 30, 0))
        .ok_or_else(|| SqlCoordinatorError::InvalidArgument("bad date".into()))?;

    let mut params = ParameterSet::new();
    params
        .add("@id", 10_i64, DbType::Int)?
        .add("@name", "washer", DbType::NVarChar)?
        .add("@created", created, DbType::DateTime2)?;
    assert_eq!(db.execute_statement(sql, CommandKind::Text, Some(&params), None).await?, 1);

    // mutating the set afterwards must not touch the row already written
    params.clear();
    params
        .add("@id", 11_i64, DbType::Int)?
        .add("@name", "spring", DbType::NVarChar)?
        .add("@created", None::<String>, DbType::DateTime2)?;
    assert_eq!(db.execute_statement(sql, CommandKind::Text, Some(&params), None).await?, 1);

    let rows = db
        .execute_row_set(
            "SELECT Name, CreatedAt FROM Items WHERE Id >= 10 ORDER BY Id",
            CommandKind::Text,
            None,
            None,
        )
        .await?;
    assert_eq!(rows.results[0].get("Name"), Some(&DbValue::Text("washer".into())));
    assert_eq!(
        rows.results[0].get("CreatedAt").and_then(DbValue::as_timestamp),
        Some(created)
    );
    assert_eq!(rows.results[1].get("CreatedAt"), Some(&DbValue::Null));
    Ok(())
}

#[tokio::test]
async fn blank_sql_fails_before_opening() {
    let mut db = Coordinator::new(CoordinatorOptions::sqlite(":memory:")).unwrap();
    let err = db
        .execute_scalar("   ", CommandKind::Text, None, None)
        .await
        .unwrap_err();
    assert!(err.is_invalid_argument());
    assert!(!db.is_open());
}

#[tokio::test]
async fn missing_placeholder_value_is_a_database_error() -> Result<(), SqlCoordinatorError> {
    let mut db = seeded().await?;
    let err = db
        .execute_scalar("SELECT Name FROM Items WHERE Id = @id", CommandKind::Text, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SqlCoordinatorError::DatabaseError { .. }));
    Ok(())
}

#[tokio::test]
async fn stored_procedures_are_rejected_on_sqlite() -> Result<(), SqlCoordinatorError> {
    let mut db = seeded().await?;
    let err = db
        .execute_statement("dbo.ArchiveItems", CommandKind::StoredProcedure, None, None)
        .await
        .unwrap_err();
    assert!(err.is_invalid_argument());
    Ok(())
}
