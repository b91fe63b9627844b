//! Purpose: Store bindings for a YCSB-style benchmark client, shared by the `ycsb-bind` CLI and tests.
//! Exports: `core` (errors, properties, records, status), `bindings`, `measure`, `workload`.
//! Role: Library backing the binary; drivers talk to stores only through `bindings::Db`.
//! Invariants: Every store failure reaches callers as a typed `core::error::Error`.
//! Invariants: Bindings hold no process-wide state; one instance per worker thread.
pub mod bindings;
pub mod core;
pub mod measure;
pub mod workload;

pub use bindings::{Db, DbFactory, DbKind};
pub use core::error::{Error, ErrorKind, to_exit_code};
pub use core::props::Properties;
pub use core::record::{FieldSet, FieldValue, Fields, ScanRecord, fields_from_strs};
pub use core::status::Status;
