//! Purpose: Relational binding (the JDBC counterpart) over sqlx's `Any` driver.
//! Exports: `SqlDb`, `SqlConfig`, `Dialect`.
//! Role: Maps the CRUD contract onto parameterised INSERT/SELECT/UPDATE/DELETE statements.
//! Invariants: Each instance owns a current-thread runtime and blocks on it; callers stay synchronous.
//! Invariants: Update and delete report `NotFound` when no row matched the key.
//! Invariants: Field projection is case-insensitive and reports fields under the requested spelling.
#![allow(clippy::result_large_err)]

mod dialect;

pub use dialect::Dialect;

use super::{Db, not_initialized};
use crate::core::error::{Error, ErrorKind};
use crate::core::props::Properties;
use crate::core::record::{FieldSet, FieldValue, Fields, ScanRecord, wants_all};
use dialect::check_identifier;
use sqlx::AnyPool;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{Column, Row};
use std::future::Future;
use std::time::Duration;

const OPTION_PREFIX: &str = "db.option.";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SqlConfig {
    pub url: String,
    pub dialect: Dialect,
    pub key_column: String,
    pub pool_size: u32,
    pub timeout: Duration,
    pub create_table: bool,
    pub new_db: bool,
    pub table: String,
    pub field_count: usize,
    pub field_prefix: String,
}

impl SqlConfig {
    pub fn from_props(props: &Properties) -> Result<Self, Error> {
        let raw_url = props.require("db.url")?;
        let options: Vec<(&str, &str)> = props.with_prefix(OPTION_PREFIX).collect();
        let url = dialect::normalize_url(
            raw_url,
            props.get("db.user"),
            props.get("db.passwd"),
            &options,
        )?;
        let dialect = Dialect::from_url(&url)?;
        if let Some(driver) = props.get("db.driver") {
            let declared = Dialect::from_driver(driver)?;
            if declared != dialect {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("db.driver `{driver}` does not match db.url"))
                    .with_hint("Drop db.driver or point db.url at the matching database."));
            }
        }
        let pool_size = props.parse_or("db.pool.size", 1u32)?;
        if pool_size == 0 {
            return Err(Error::new(ErrorKind::Usage).with_message("db.pool.size must be at least 1"));
        }
        let key_column = check_identifier("key column", props.get_or("db.keyfield", "YCSB_KEY"))?;
        let table = check_identifier("table", props.get_or("table", "usertable"))?;
        let field_prefix = check_identifier("field prefix", props.get_or("fieldnameprefix", "field"))?;

        Ok(Self {
            url,
            dialect,
            key_column: key_column.to_string(),
            pool_size,
            timeout: props.millis_or("db.timeout.ms", 30_000)?,
            create_table: props.bool_or("db.create_table", false)?,
            new_db: props.bool_or("db.newdb", false)?,
            table: table.to_string(),
            field_count: props.parse_or("fieldcount", 10usize)?,
            field_prefix: field_prefix.to_string(),
        })
    }

    pub fn field_columns(&self) -> Vec<String> {
        (0..self.field_count)
            .map(|i| format!("{}{i}", self.field_prefix))
            .collect()
    }
}

struct Connection {
    runtime: tokio::runtime::Runtime,
    pool: AnyPool,
    config: SqlConfig,
}

impl Connection {
    fn run<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn key_column(&self) -> &str {
        &self.config.key_column
    }

    fn row_fields(&self, row: &AnyRow) -> Result<(Option<String>, Fields), Error> {
        let mut key = None;
        let mut fields = Fields::new();
        for column in row.columns() {
            let value: Option<String> = row
                .try_get(column.ordinal())
                .map_err(|err| driver_error("failed to decode column", err))?;
            if column.name().eq_ignore_ascii_case(self.key_column()) {
                key = value;
            } else if let Some(value) = value {
                fields.insert(column.name().to_string(), FieldValue::from(value));
            }
        }
        Ok((key, fields))
    }
}

/// Applies a field set to a row whose column names may differ in case from the request.
fn project_columns(fields: Fields, wanted: Option<&FieldSet>) -> Fields {
    let Some(wanted) = wanted.filter(|_| !wants_all(wanted)) else {
        return fields;
    };
    fields
        .into_iter()
        .filter_map(|(name, value)| {
            wanted
                .iter()
                .find(|requested| requested.eq_ignore_ascii_case(&name))
                .map(|requested| (requested.clone(), value))
        })
        .collect()
}

fn driver_error(context: &str, err: sqlx::Error) -> Error {
    let kind = match &err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => ErrorKind::Io,
        sqlx::Error::Configuration(_) => ErrorKind::Usage,
        _ => ErrorKind::Backend,
    };
    Error::new(kind).with_message(context.to_string()).with_source(err)
}

fn missing() -> Error {
    Error::new(ErrorKind::NotFound).with_message("row not found")
}

fn field_columns(values: &Fields) -> Result<Vec<&str>, Error> {
    values
        .keys()
        .map(|name| check_identifier("field", name))
        .collect()
}

#[derive(Default)]
pub struct SqlDb {
    connection: Option<Connection>,
}

impl SqlDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn connection(&self) -> Result<&Connection, Error> {
        self.connection.as_ref().ok_or_else(|| not_initialized("jdbc"))
    }

    fn create_table(conn: &Connection) -> Result<(), Error> {
        let config = &conn.config;
        if config.new_db {
            tracing::info!(table = %config.table, "dropping benchmark table");
            let sql = dialect::drop_table_sql(&config.table);
            conn.run(sqlx::query(&sql).execute(&conn.pool))
                .map_err(|err| driver_error("failed to drop table", err))?;
        }
        let columns = config.field_columns();
        let sql = dialect::create_table_sql(config.dialect, &config.table, &config.key_column, &columns);
        tracing::info!(table = %config.table, fields = columns.len(), "creating benchmark table");
        conn.run(sqlx::query(&sql).execute(&conn.pool))
            .map_err(|err| driver_error("failed to create table", err))?;
        Ok(())
    }

    fn insert_row(conn: &Connection, table: &str, key: &str, values: &Fields) -> Result<(), Error> {
        let table = check_identifier("table", table)?;
        let columns = field_columns(values)?;
        let sql = dialect::insert_sql(conn.config.dialect, table, conn.key_column(), &columns);
        let mut query = sqlx::query(&sql).bind(key.to_string());
        for value in values.values() {
            query = query.bind(value.to_text());
        }
        conn.run(query.execute(&conn.pool))
            .map_err(|err| driver_error("insert failed", err))?;
        Ok(())
    }

    fn read_row(conn: &Connection, table: &str, key: &str) -> Result<Fields, Error> {
        let table = check_identifier("table", table)?;
        let sql = dialect::select_sql(conn.config.dialect, table, conn.key_column());
        let row = conn
            .run(sqlx::query(&sql).bind(key.to_string()).fetch_optional(&conn.pool))
            .map_err(|err| driver_error("read failed", err))?
            .ok_or_else(missing)?;
        let (_, fields) = conn.row_fields(&row)?;
        Ok(fields)
    }

    fn update_row(conn: &Connection, table: &str, key: &str, values: &Fields) -> Result<(), Error> {
        if values.is_empty() {
            return Self::read_row(conn, table, key).map(|_| ());
        }
        let table = check_identifier("table", table)?;
        let columns = field_columns(values)?;
        let sql = dialect::update_sql(conn.config.dialect, table, conn.key_column(), &columns);
        let mut query = sqlx::query(&sql);
        for value in values.values() {
            query = query.bind(value.to_text());
        }
        let result = conn
            .run(query.bind(key.to_string()).execute(&conn.pool))
            .map_err(|err| driver_error("update failed", err))?;
        if result.rows_affected() == 0 {
            return Err(missing());
        }
        Ok(())
    }

    fn delete_row(conn: &Connection, table: &str, key: &str) -> Result<(), Error> {
        let table = check_identifier("table", table)?;
        let sql = dialect::delete_sql(conn.config.dialect, table, conn.key_column());
        let result = conn
            .run(sqlx::query(&sql).bind(key.to_string()).execute(&conn.pool))
            .map_err(|err| driver_error("delete failed", err))?;
        if result.rows_affected() == 0 {
            return Err(missing());
        }
        Ok(())
    }

    fn scan_rows(
        conn: &Connection,
        table: &str,
        start_key: &str,
        count: usize,
        fields: Option<&FieldSet>,
    ) -> Result<Vec<ScanRecord>, Error> {
        let table = check_identifier("table", table)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let sql = dialect::scan_sql(conn.config.dialect, table, conn.key_column(), count);
        let rows = conn
            .run(sqlx::query(&sql).bind(start_key.to_string()).fetch_all(&conn.pool))
            .map_err(|err| driver_error("scan failed", err))?;
        rows.iter()
            .map(|row| {
                let (key, row_fields) = conn.row_fields(row)?;
                let key = key.ok_or_else(|| {
                    Error::new(ErrorKind::Backend).with_message("scan row is missing its key column")
                })?;
                Ok(ScanRecord {
                    key,
                    fields: project_columns(row_fields, fields),
                })
            })
            .collect()
    }
}

impl Db for SqlDb {
    fn init(&mut self, props: &Properties) -> Result<(), Error> {
        let config = SqlConfig::from_props(props)?;
        sqlx::any::install_default_drivers();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to start runtime")
                    .with_source(err)
            })?;
        tracing::debug!(dialect = ?config.dialect, pool_size = config.pool_size, "connecting sql binding");
        let pool = runtime
            .block_on(
                AnyPoolOptions::new()
                    .max_connections(config.pool_size)
                    .acquire_timeout(config.timeout)
                    .connect(&config.url),
            )
            .map_err(|err| {
                driver_error("failed to connect", err)
                    .with_hint("Check db.url, db.user, and db.passwd, and that the database is reachable.")
            })?;

        let conn = Connection {
            runtime,
            pool,
            config,
        };
        if conn.config.create_table {
            Self::create_table(&conn)?;
        }
        self.connection = Some(conn);
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), Error> {
        if let Some(conn) = self.connection.take() {
            conn.run(conn.pool.close());
            tracing::debug!("sql binding closed");
        }
        Ok(())
    }

    fn insert(&self, table: &str, key: &str, values: &Fields) -> Result<(), Error> {
        let conn = self.connection()?;
        Self::insert_row(conn, table, key, values).map_err(|err| err.at(table, key))
    }

    fn read(&self, table: &str, key: &str, fields: Option<&FieldSet>) -> Result<Fields, Error> {
        let conn = self.connection()?;
        Self::read_row(conn, table, key)
            .map(|row| project_columns(row, fields))
            .map_err(|err| err.at(table, key))
    }

    fn update(&self, table: &str, key: &str, values: &Fields) -> Result<(), Error> {
        let conn = self.connection()?;
        Self::update_row(conn, table, key, values).map_err(|err| err.at(table, key))
    }

    fn delete(&self, table: &str, key: &str) -> Result<(), Error> {
        let conn = self.connection()?;
        Self::delete_row(conn, table, key).map_err(|err| err.at(table, key))
    }

    fn scan(
        &self,
        table: &str,
        start_key: &str,
        count: usize,
        fields: Option<&FieldSet>,
    ) -> Result<Vec<ScanRecord>, Error> {
        let conn = self.connection()?;
        Self::scan_rows(conn, table, start_key, count, fields).map_err(|err| err.at(table, start_key))
    }
}
