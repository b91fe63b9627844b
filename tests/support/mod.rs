#![allow(dead_code)]

pub mod contract;
pub mod fake_es;

use ycsb_bind::core::props::Properties;

pub type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Properties pointing the elasticsearch binding at a fake cluster.
pub fn es_props(host: &str) -> Properties {
    Properties::new()
        .with("es.hosts.list", host)
        .with("es.timeout.ms", "5000")
}

/// Properties for a fresh SQLite database with the benchmark table created.
pub fn sqlite_props(path: &std::path::Path) -> Properties {
    Properties::new()
        .with("db.url", format!("sqlite://{}?mode=rwc", path.display()))
        .with("db.create_table", "true")
        .with("table", "USERTABLE")
        .with("fieldnameprefix", "FIELD")
        .with("fieldcount", "3")
}
