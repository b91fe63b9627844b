//! Purpose: Store-neutral checks every binding must pass.
//! Exports: `run_all`.
//! Role: Shared by the per-binding contract tests so all adapters are held to one behaviour.
//! Invariants: Checks use disjoint key prefixes, so they can share one table.

use super::TestResult;
use ycsb_bind::bindings::Db;
use ycsb_bind::core::error::ErrorKind;
use ycsb_bind::core::record::{FieldSet, fields_from_strs};

pub const TABLE: &str = "usertable";

pub fn run_all(db: &dyn Db) -> TestResult<()> {
    round_trip(db)?;
    update_merges(db)?;
    missing_keys_are_not_found(db)?;
    scan_respects_bounds(db)?;
    Ok(())
}

fn round_trip(db: &dyn Db) -> TestResult<()> {
    let values = fields_from_strs([("field0", "alpha"), ("field1", "beta"), ("field2", "gamma")]);
    db.insert(TABLE, "a-user0", &values)?;
    assert_eq!(db.read(TABLE, "a-user0", None)?, values);

    let wanted: FieldSet = ["field2".to_string()].into();
    assert_eq!(
        db.read(TABLE, "a-user0", Some(&wanted))?,
        fields_from_strs([("field2", "gamma")])
    );
    assert_eq!(db.read(TABLE, "a-user0", Some(&FieldSet::new()))?, values);

    db.delete(TABLE, "a-user0")?;
    let err = db.read(TABLE, "a-user0", None).expect_err("deleted record");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

fn update_merges(db: &dyn Db) -> TestResult<()> {
    db.insert(TABLE, "b-user0", &fields_from_strs([("field0", "a"), ("field1", "b")]))?;
    db.update(TABLE, "b-user0", &fields_from_strs([("field1", "B")]))?;
    assert_eq!(
        db.read(TABLE, "b-user0", None)?,
        fields_from_strs([("field0", "a"), ("field1", "B")])
    );
    db.delete(TABLE, "b-user0")?;
    Ok(())
}

fn missing_keys_are_not_found(db: &dyn Db) -> TestResult<()> {
    let err = db.read(TABLE, "c-nobody", None).expect_err("read missing");
    assert_eq!(err.kind(), ErrorKind::NotFound, "{err}");
    let err = db
        .update(TABLE, "c-nobody", &fields_from_strs([("field0", "x")]))
        .expect_err("update missing");
    assert_eq!(err.kind(), ErrorKind::NotFound, "{err}");
    let err = db.delete(TABLE, "c-nobody").expect_err("delete missing");
    assert_eq!(err.kind(), ErrorKind::NotFound, "{err}");
    Ok(())
}

fn scan_respects_bounds(db: &dyn Db) -> TestResult<()> {
    for i in 0..8 {
        db.insert(TABLE, &format!("d-user{i}"), &fields_from_strs([("field0", "v")]))?;
    }
    let records = db.scan(TABLE, "d-user3", 3, None)?;
    assert!(records.len() <= 3);
    let keys: Vec<_> = records.iter().map(|record| record.key.clone()).collect();
    assert_eq!(keys, vec!["d-user3", "d-user4", "d-user5"]);
    assert!(keys.windows(2).all(|pair| pair[0] <= pair[1]));
    for i in 0..8 {
        db.delete(TABLE, &format!("d-user{i}"))?;
    }
    Ok(())
}
