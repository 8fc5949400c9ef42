//! The same unit of work against every backend available to this build.
//!
//! SQLite always runs. SQL Server joins the matrix when the `mssql` feature is enabled and
//! `TESTING_MSSQL_CONNECTION` holds an ADO connection string for a scratch database.

use sql_coordinator::prelude::*;
use tokio::runtime::Runtime;

enum TestCase {
    #[cfg(feature = "sqlite")]
    Sqlite(String),
    #[cfg(feature = "mssql")]
    Mssql(String),
}

impl TestCase {
    fn options(&self) -> CoordinatorOptions {
        match self {
            #[cfg(feature = "sqlite")]
            TestCase::Sqlite(conn) => CoordinatorOptions::sqlite(conn.as_str()),
            #[cfg(feature = "mssql")]
            TestCase::Mssql(conn) => CoordinatorOptions::mssql(conn.as_str()),
        }
    }

    fn create_table(&self) -> &'static str {
        match self {
            #[cfg(feature = "sqlite")]
            TestCase::Sqlite(_) => {
                "DROP TABLE IF EXISTS CoordinatorMatrix;
                 CREATE TABLE CoordinatorMatrix (
                     Id INTEGER PRIMARY KEY,
                     Name TEXT NOT NULL,
                     Price REAL
                 );"
            }
            #[cfg(feature = "mssql")]
            TestCase::Mssql(_) => {
                "IF OBJECT_ID('dbo.CoordinatorMatrix') IS NOT NULL DROP TABLE dbo.CoordinatorMatrix;
                 CREATE TABLE dbo.CoordinatorMatrix (
                     Id INT PRIMARY KEY,
                     Name NVARCHAR(50) NOT NULL,
                     Price FLOAT NULL
                 );"
            }
        }
    }
}

fn test_cases(dir: &tempfile::TempDir) -> Vec<TestCase> {
    #[allow(unused_mut)]
    let mut cases = Vec::new();
    #[cfg(feature = "sqlite")]
    cases.push(TestCase::Sqlite(
        dir.path().join("matrix.db").to_string_lossy().into_owned(),
    ));
    #[cfg(feature = "mssql")]
    if let Ok(conn) = std::env::var("TESTING_MSSQL_CONNECTION") {
        cases.push(TestCase::Mssql(conn));
    }
    let _ = dir;
    cases
}

async fn insert(db: &mut Coordinator, id: i64, name: &str) -> Result<u64, SqlCoordinatorError> {
    let mut params = ParameterSet::new();
    params
        .add("@id", id, DbType::Int)?
        .add_with_size("@name", name, DbType::NVarChar, 50)?;
    db.execute_statement(
        "INSERT INTO CoordinatorMatrix (Id, Name) VALUES (@id, @name)",
        CommandKind::Text,
        Some(&params),
        None,
    )
    .await
}

async fn count(db: &mut Coordinator) -> Result<DbValue, SqlCoordinatorError> {
    db.execute_scalar(
        "SELECT COUNT(*) FROM CoordinatorMatrix",
        CommandKind::Text,
        None,
        None,
    )
    .await
}

#[test]
fn unit_of_work_behaves_the_same_on_every_backend() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let rt = Runtime::new()?;
    for case in test_cases(&dir) {
        rt.block_on(async {
            let mut db = Coordinator::new(case.options())?;
            db.execute_statement(case.create_table(), CommandKind::Text, None, None)
                .await?;

            db.begin_transaction().await?;
            assert_eq!(insert(&mut db, 1, "discarded").await?, 1);
            db.rollback().await?;
            assert_eq!(count(&mut db).await?, DbValue::Int(0));

            db.begin_transaction().await?;
            insert(&mut db, 1, "widget").await?;
            let mut rows = ResultSet::new(["Id", "Name", "Price"]);
            rows.push_row(vec![DbValue::Int(2), "gadget".into(), DbValue::Float(2.5)])?;
            rows.push_row(vec![DbValue::Int(3), "gizmo".into(), DbValue::Null])?;
            assert_eq!(db.bulk_load("CoordinatorMatrix", &rows, None, None).await?, 2);
            db.commit().await?;
            assert_eq!(count(&mut db).await?, DbValue::Int(3));

            let mut params = ParameterSet::new();
            params.add("@id", 2_i64, DbType::Int)?;
            let found = db
                .execute_row_set(
                    "SELECT Name, Price FROM CoordinatorMatrix WHERE Id = @id",
                    CommandKind::Text,
                    Some(&params),
                    None,
                )
                .await?;
            assert_eq!(found.len(), 1);
            assert_eq!(
                found.iter().next().and_then(|r| r.get("Name")),
                Some(&DbValue::Text("gadget".into()))
            );

            let sets = db
                .execute_multi_row_set(
                    "SELECT 1 AS A; SELECT 2 AS B",
                    CommandKind::Text,
                    None,
                    None,
                )
                .await?;
            assert_eq!(sets.len(), 2);
            assert_eq!(sets[1].first_value(), Some(&DbValue::Int(2)));

            db.execute_statement("DROP TABLE CoordinatorMatrix", CommandKind::Text, None, None)
                .await?;
            db.close().await?;
            Ok::<_, SqlCoordinatorError>(())
        })?;
    }
    Ok(())
}
