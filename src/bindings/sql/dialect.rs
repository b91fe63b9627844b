//! Purpose: Resolve connection URLs, driver names, and SQL text per database family.
//! Exports: `Dialect`, `normalize_url`, `check_identifier`, statement builders.
//! Role: Pure string layer under the sql binding; no I/O.
//! Invariants: Identifiers are validated, never quoted; values always travel as bind parameters.
//! Invariants: Placeholder syntax follows the dialect (`$n` for PostgreSQL, `?` otherwise).
use crate::core::error::{Error, ErrorKind};
use url::Url;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    pub fn from_url(url: &str) -> Result<Self, Error> {
        let scheme = url.split_once(':').map(|(scheme, _)| scheme).unwrap_or_default();
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "sqlite" => Ok(Dialect::Sqlite),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unsupported database url scheme `{scheme}`"))
                .with_hint("Use a postgres://, mysql://, or sqlite: url.")),
        }
    }

    /// Accepts short names and the JDBC driver class names used by existing property files.
    pub fn from_driver(driver: &str) -> Result<Self, Error> {
        match driver.trim() {
            "postgres" | "postgresql" | "org.postgresql.Driver" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" | "com.mysql.jdbc.Driver" | "com.mysql.cj.jdbc.Driver"
            | "org.mariadb.jdbc.Driver" => Ok(Dialect::MySql),
            "sqlite" | "org.sqlite.JDBC" => Ok(Dialect::Sqlite),
            other => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unsupported db.driver `{other}`"))
                .with_hint("Use postgres, mysql, sqlite, or a matching JDBC driver class.")),
        }
    }

    pub fn placeholder(self, position: usize) -> String {
        match self {
            Dialect::Postgres => format!("${position}"),
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
        }
    }

    fn text_type(self) -> &'static str {
        match self {
            Dialect::Postgres | Dialect::Sqlite => "TEXT",
            Dialect::MySql => "LONGTEXT",
        }
    }
}

/// Strips a leading `jdbc:`, injects credentials, and appends driver options as query pairs.
pub fn normalize_url(
    raw: &str,
    user: Option<&str>,
    password: Option<&str>,
    options: &[(&str, &str)],
) -> Result<String, Error> {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_prefix("jdbc:")
        .or_else(|| trimmed.strip_prefix("JDBC:"))
        .unwrap_or(trimmed);
    let dialect = Dialect::from_url(stripped)?;
    if dialect == Dialect::Sqlite && options.is_empty() {
        return Ok(stripped.to_string());
    }

    let mut url = Url::parse(stripped).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid db.url")
            .with_source(err)
    })?;
    if dialect != Dialect::Sqlite {
        if let Some(user) = user.filter(|user| !user.is_empty()) {
            if url.username().is_empty() {
                url.set_username(user).map_err(|_| {
                    Error::new(ErrorKind::Usage).with_message("db.url cannot carry credentials")
                })?;
                if let Some(password) = password.filter(|password| !password.is_empty()) {
                    url.set_password(Some(password)).map_err(|_| {
                        Error::new(ErrorKind::Usage).with_message("db.url cannot carry credentials")
                    })?;
                }
            }
        }
    }
    if !options.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in options {
            pairs.append_pair(name, value);
        }
    }
    Ok(url.to_string())
}

pub fn check_identifier<'a>(what: &str, name: &'a str) -> Result<&'a str, Error> {
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_');
    if valid_head && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name)
    } else {
        Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid {what} name `{name}`"))
            .with_hint("Names must match [A-Za-z_][A-Za-z0-9_]*."))
    }
}

pub fn insert_sql(dialect: Dialect, table: &str, key_column: &str, columns: &[&str]) -> String {
    let mut names = vec![key_column];
    names.extend_from_slice(columns);
    let placeholders: Vec<_> = (1..=names.len()).map(|i| dialect.placeholder(i)).collect();
    format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        names.join(", "),
        placeholders.join(", ")
    )
}

pub fn select_sql(dialect: Dialect, table: &str, key_column: &str) -> String {
    format!(
        "SELECT * FROM {table} WHERE {key_column} = {}",
        dialect.placeholder(1)
    )
}

/// Binds each column value first and the key last.
pub fn update_sql(dialect: Dialect, table: &str, key_column: &str, columns: &[&str]) -> String {
    let assignments: Vec<_> = columns
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{column} = {}", dialect.placeholder(i + 1)))
        .collect();
    format!(
        "UPDATE {table} SET {} WHERE {key_column} = {}",
        assignments.join(", "),
        dialect.placeholder(columns.len() + 1)
    )
}

pub fn delete_sql(dialect: Dialect, table: &str, key_column: &str) -> String {
    format!(
        "DELETE FROM {table} WHERE {key_column} = {}",
        dialect.placeholder(1)
    )
}

pub fn scan_sql(dialect: Dialect, table: &str, key_column: &str, count: usize) -> String {
    format!(
        "SELECT * FROM {table} WHERE {key_column} >= {} ORDER BY {key_column} LIMIT {count}",
        dialect.placeholder(1)
    )
}

pub fn create_table_sql(dialect: Dialect, table: &str, key_column: &str, columns: &[String]) -> String {
    let mut definition = format!(
        "CREATE TABLE IF NOT EXISTS {table} ({key_column} VARCHAR(255) PRIMARY KEY"
    );
    for column in columns {
        definition.push_str(&format!(", {column} {}", dialect.text_type()));
    }
    definition.push(')');
    definition
}

pub fn drop_table_sql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {table}")
}
