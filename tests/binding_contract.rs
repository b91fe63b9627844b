//! Purpose: Run the shared adapter contract against every binding available to the test run.
//! Exports: None (integration test module).
//! Role: Memory, SQLite, and the fake cluster always run; PostgreSQL and MySQL run when
//! `YCSB_BIND_POSTGRES_URL` / `YCSB_BIND_MYSQL_URL` name a reachable server.
//! Invariants: Server-backed tests create their own table and drop it on entry.

mod support;

use support::fake_es::FakeEs;
use support::{TestResult, contract, es_props};
use ycsb_bind::bindings::{Db, DbFactory, DbKind};
use ycsb_bind::core::props::Properties;

fn with_binding(kind: DbKind, props: &Properties) -> TestResult<()> {
    let mut db = DbFactory::new(kind).create();
    db.init(props)?;
    let outcome = contract::run_all(&*db);
    db.cleanup()?;
    db.cleanup()?;
    outcome
}

fn sql_props(url: &str) -> Properties {
    Properties::new()
        .with("db.url", url)
        .with("db.create_table", "true")
        .with("db.newdb", "true")
        .with("table", contract::TABLE)
        .with("fieldcount", "3")
}

#[test]
fn memory_binding_meets_contract() -> TestResult<()> {
    with_binding(DbKind::Memory, &Properties::new())
}

#[test]
fn sqlite_binding_meets_contract() -> TestResult<()> {
    let dir = tempfile::tempdir()?;
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("contract.db").display());
    with_binding(DbKind::Sql, &sql_props(&url))
}

#[test]
fn elasticsearch_binding_meets_contract() -> TestResult<()> {
    let server = FakeEs::start();
    with_binding(DbKind::Elasticsearch, &es_props(&server.host()))
}

#[test]
fn postgres_binding_meets_contract() -> TestResult<()> {
    let Ok(url) = std::env::var("YCSB_BIND_POSTGRES_URL") else {
        eprintln!("skipping: YCSB_BIND_POSTGRES_URL is not set");
        return Ok(());
    };
    with_binding(DbKind::Sql, &sql_props(&url))
}

#[test]
fn mysql_binding_meets_contract() -> TestResult<()> {
    let Ok(url) = std::env::var("YCSB_BIND_MYSQL_URL") else {
        eprintln!("skipping: YCSB_BIND_MYSQL_URL is not set");
        return Ok(());
    };
    with_binding(DbKind::Sql, &sql_props(&url))
}
