//! Purpose: Define the store-adapter contract and the registry of shipped bindings.
//! Exports: `Db`, `DbKind`, `DbFactory`, and the `memory`, `elasticsearch`, `sql` bindings.
//! Role: The only seam between benchmark drivers and backing stores.
//! Invariants: One adapter instance per worker thread; instances share nothing but the factory.
//! Invariants: Operations block for one store round trip and never retry.
//! Invariants: Missing records surface as `ErrorKind::NotFound`; everything else is an error.
use crate::core::error::{Error, ErrorKind};
use crate::core::props::Properties;
use crate::core::record::{FieldSet, Fields, ScanRecord};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub mod elasticsearch;
pub mod memory;
pub mod sql;

pub use elasticsearch::ElasticsearchDb;
pub use memory::{MemoryDb, MemoryStore};
pub use sql::SqlDb;

/// CRUD contract a benchmark client needs from a pluggable backing store.
///
/// `init` and `cleanup` bracket the lifetime of the connection owned by the
/// instance. `cleanup` must be safe to call more than once. Calls made outside
/// that window fail with a `Usage` error.
pub trait Db: Send {
    fn init(&mut self, props: &Properties) -> Result<(), Error>;

    fn cleanup(&mut self) -> Result<(), Error>;

    fn insert(&self, table: &str, key: &str, values: &Fields) -> Result<(), Error>;

    /// Returns the requested fields (all fields when `fields` is `None` or empty).
    fn read(&self, table: &str, key: &str, fields: Option<&FieldSet>) -> Result<Fields, Error>;

    /// Merges `values` into the stored record, leaving other fields untouched.
    fn update(&self, table: &str, key: &str, values: &Fields) -> Result<(), Error>;

    fn delete(&self, table: &str, key: &str) -> Result<(), Error>;

    /// Returns at most `count` records with key >= `start_key`, in store order.
    fn scan(
        &self,
        table: &str,
        start_key: &str,
        count: usize,
        fields: Option<&FieldSet>,
    ) -> Result<Vec<ScanRecord>, Error>;
}

impl<D: Db + ?Sized> Db for Box<D> {
    fn init(&mut self, props: &Properties) -> Result<(), Error> {
        (**self).init(props)
    }

    fn cleanup(&mut self) -> Result<(), Error> {
        (**self).cleanup()
    }

    fn insert(&self, table: &str, key: &str, values: &Fields) -> Result<(), Error> {
        (**self).insert(table, key, values)
    }

    fn read(&self, table: &str, key: &str, fields: Option<&FieldSet>) -> Result<Fields, Error> {
        (**self).read(table, key, fields)
    }

    fn update(&self, table: &str, key: &str, values: &Fields) -> Result<(), Error> {
        (**self).update(table, key, values)
    }

    fn delete(&self, table: &str, key: &str) -> Result<(), Error> {
        (**self).delete(table, key)
    }

    fn scan(
        &self,
        table: &str,
        start_key: &str,
        count: usize,
        fields: Option<&FieldSet>,
    ) -> Result<Vec<ScanRecord>, Error> {
        (**self).scan(table, start_key, count, fields)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DbKind {
    Memory,
    Elasticsearch,
    Sql,
}

impl DbKind {
    pub fn name(self) -> &'static str {
        match self {
            DbKind::Memory => "memory",
            DbKind::Elasticsearch => "elasticsearch",
            DbKind::Sql => "jdbc",
        }
    }
}

impl FromStr for DbKind {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "memory" | "basic" => Ok(DbKind::Memory),
            "elasticsearch" | "elasticsearch5" | "es" => Ok(DbKind::Elasticsearch),
            "jdbc" | "sql" => Ok(DbKind::Sql),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown binding `{input}`"))
                .with_hint("Use one of: memory, elasticsearch, jdbc.")),
        }
    }
}

impl fmt::Display for DbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Creates adapter instances for one binding; clones share the in-memory store.
#[derive(Clone, Debug)]
pub struct DbFactory {
    kind: DbKind,
    memory: Arc<MemoryStore>,
}

impl DbFactory {
    pub fn new(kind: DbKind) -> Self {
        Self {
            kind,
            memory: Arc::new(MemoryStore::default()),
        }
    }

    pub fn kind(&self) -> DbKind {
        self.kind
    }

    pub fn create(&self) -> Box<dyn Db> {
        match self.kind {
            DbKind::Memory => Box::new(MemoryDb::with_store(Arc::clone(&self.memory))),
            DbKind::Elasticsearch => Box::new(ElasticsearchDb::new()),
            DbKind::Sql => Box::new(SqlDb::new()),
        }
    }
}

pub(crate) fn not_initialized(binding: &str) -> Error {
    Error::new(ErrorKind::Usage)
        .with_message(format!("{binding} binding is not initialized"))
        .with_hint("Call init() before issuing operations, and not after cleanup().")
}
