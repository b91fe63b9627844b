//! Purpose: In-process reference binding backed by ordered maps.
//! Exports: `MemoryStore`, `MemoryDb`.
//! Role: Local runs and contract tests without an external store.
//! Invariants: Scan is an exact ascending key-range scan per table.
//! Invariants: Update merges under one write lock, so it cannot lose concurrent updates.
use super::{Db, not_initialized};
use crate::core::error::{Error, ErrorKind};
use crate::core::props::Properties;
use crate::core::record::{FieldSet, Fields, ScanRecord, project};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

type Tables = BTreeMap<String, BTreeMap<String, Fields>>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn record_count(&self, table: &str) -> Result<usize, Error> {
        Ok(self.read_tables()?.get(table).map_or(0, BTreeMap::len))
    }

    fn clear(&self) -> Result<(), Error> {
        self.write_tables()?.clear();
        Ok(())
    }

    fn read_tables(&self) -> Result<RwLockReadGuard<'_, Tables>, Error> {
        self.tables.read().map_err(|_| poisoned())
    }

    fn write_tables(&self) -> Result<RwLockWriteGuard<'_, Tables>, Error> {
        self.tables.write().map_err(|_| poisoned())
    }
}

fn poisoned() -> Error {
    Error::new(ErrorKind::Internal).with_message("memory store lock poisoned")
}

fn missing(table: &str, key: &str) -> Error {
    Error::new(ErrorKind::NotFound)
        .with_message("record not found")
        .at(table, key)
}

#[derive(Debug)]
pub struct MemoryDb {
    store: Arc<MemoryStore>,
    open: bool,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::default()))
    }

    pub fn with_store(store: Arc<MemoryStore>) -> Self {
        Self { store, open: false }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    fn store_checked(&self) -> Result<&MemoryStore, Error> {
        if self.open {
            Ok(&self.store)
        } else {
            Err(not_initialized("memory"))
        }
    }
}

impl Default for MemoryDb {
    fn default() -> Self {
        Self::new()
    }
}

impl Db for MemoryDb {
    fn init(&mut self, props: &Properties) -> Result<(), Error> {
        if props.bool_or("memory.newdb", false)? {
            self.store.clear()?;
        }
        self.open = true;
        tracing::debug!("memory binding ready");
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), Error> {
        self.open = false;
        Ok(())
    }

    fn insert(&self, table: &str, key: &str, values: &Fields) -> Result<(), Error> {
        let mut tables = self.store_checked()?.write_tables()?;
        tables
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), values.clone());
        Ok(())
    }

    fn read(&self, table: &str, key: &str, fields: Option<&FieldSet>) -> Result<Fields, Error> {
        let tables = self.store_checked()?.read_tables()?;
        let record = tables
            .get(table)
            .and_then(|records| records.get(key))
            .ok_or_else(|| missing(table, key))?;
        Ok(project(record.clone(), fields))
    }

    fn update(&self, table: &str, key: &str, values: &Fields) -> Result<(), Error> {
        let mut tables = self.store_checked()?.write_tables()?;
        let record = tables
            .get_mut(table)
            .and_then(|records| records.get_mut(key))
            .ok_or_else(|| missing(table, key))?;
        for (name, value) in values {
            record.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    fn delete(&self, table: &str, key: &str) -> Result<(), Error> {
        let mut tables = self.store_checked()?.write_tables()?;
        tables
            .get_mut(table)
            .and_then(|records| records.remove(key))
            .map(|_| ())
            .ok_or_else(|| missing(table, key))
    }

    fn scan(
        &self,
        table: &str,
        start_key: &str,
        count: usize,
        fields: Option<&FieldSet>,
    ) -> Result<Vec<ScanRecord>, Error> {
        let tables = self.store_checked()?.read_tables()?;
        let Some(records) = tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(records
            .range(start_key.to_string()..)
            .take(count)
            .map(|(key, record)| ScanRecord {
                key: key.clone(),
                fields: project(record.clone(), fields),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryDb;
    use crate::bindings::Db;
    use crate::core::error::ErrorKind;
    use crate::core::props::Properties;
    use crate::core::record::{FieldSet, fields_from_strs};

    fn open_db() -> MemoryDb {
        let mut db = MemoryDb::new();
        db.init(&Properties::new()).expect("init");
        db
    }

    #[test]
    fn usertable_example_flow() {
        let db = open_db();
        let values = fields_from_strs([("FIELD0", "v0")]);
        db.insert("USERTABLE", "user0", &values).expect("insert");
        assert_eq!(db.read("USERTABLE", "user0", None).expect("read"), values);
        db.delete("USERTABLE", "user0").expect("delete");
        let err = db.read("USERTABLE", "user0", None).expect_err("gone");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn update_merges_and_reports_missing_keys() {
        let db = open_db();
        db.insert(
            "usertable",
            "user1",
            &fields_from_strs([("field0", "a"), ("field1", "b")]),
        )
        .expect("insert");
        db.update("usertable", "user1", &fields_from_strs([("field1", "B"), ("field2", "C")]))
            .expect("update");
        let fields = db.read("usertable", "user1", None).expect("read");
        assert_eq!(
            fields,
            fields_from_strs([("field0", "a"), ("field1", "B"), ("field2", "C")])
        );

        let err = db
            .update("usertable", "nobody", &fields_from_strs([("field0", "x")]))
            .expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.key(), Some("nobody"));
    }

    #[test]
    fn scan_is_ordered_bounded_and_projected() {
        let db = open_db();
        for i in 0..10 {
            let key = format!("user{i}");
            db.insert(
                "usertable",
                &key,
                &fields_from_strs([("field0", "x"), ("field1", "y")]),
            )
            .expect("insert");
        }
        let wanted: FieldSet = ["field1".to_string()].into();
        let records = db.scan("usertable", "user3", 4, Some(&wanted)).expect("scan");
        let keys: Vec<_> = records.iter().map(|record| record.key.as_str()).collect();
        assert_eq!(keys, vec!["user3", "user4", "user5", "user6"]);
        assert!(records.iter().all(|record| record.fields.len() == 1));

        assert!(db.scan("othertable", "user0", 4, None).expect("scan").is_empty());
        assert!(db.scan("usertable", "user0", 0, None).expect("scan").is_empty());
    }

    #[test]
    fn operations_require_init_and_cleanup_is_idempotent() {
        let mut db = MemoryDb::new();
        let err = db.read("usertable", "user0", None).expect_err("closed");
        assert_eq!(err.kind(), ErrorKind::Usage);

        db.init(&Properties::new()).expect("init");
        db.cleanup().expect("first cleanup");
        db.cleanup().expect("second cleanup");
        assert!(db.delete("usertable", "user0").is_err());
    }

    #[test]
    fn newdb_clears_shared_store() {
        let mut first = open_db();
        first
            .insert("usertable", "user0", &fields_from_strs([("f", "v")]))
            .expect("insert");
        let mut second = MemoryDb::with_store(first.store().clone());
        second
            .init(&Properties::new().with("memory.newdb", "true"))
            .expect("init");
        assert_eq!(second.store().record_count("usertable").expect("count"), 0);
        first.cleanup().expect("cleanup");
        second.cleanup().expect("cleanup");
    }
}
