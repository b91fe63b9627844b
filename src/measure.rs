//! Purpose: Wrap an adapter to time every call and count its `Status`.
//! Exports: `Measured`, `OpStats`, `Measurements`.
//! Role: Boundary where typed errors collapse into the three-valued outcome.
//! Invariants: Errors other than `NotFound` are logged here exactly once.
use crate::bindings::Db;
use crate::core::error::Error;
use crate::core::props::Properties;
use crate::core::record::{FieldSet, Fields, ScanRecord};
use crate::core::status::Status;
use crate::workload::Operation;
use serde_json::{Value, json};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Clone, Debug, Default)]
pub struct OpStats {
    pub ok: u64,
    pub not_found: u64,
    pub errors: u64,
    min: Option<Duration>,
    max: Duration,
    total: Duration,
    samples_us: Vec<u64>,
}

impl OpStats {
    pub fn record(&mut self, status: Status, elapsed: Duration) {
        match status {
            Status::Ok => self.ok += 1,
            Status::NotFound => self.not_found += 1,
            Status::Error => self.errors += 1,
        }
        self.min = Some(self.min.map_or(elapsed, |min| min.min(elapsed)));
        self.max = self.max.max(elapsed);
        self.total += elapsed;
        self.samples_us
            .push(u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX));
    }

    pub fn count(&self) -> u64 {
        self.ok + self.not_found + self.errors
    }

    pub fn merge(&mut self, other: &OpStats) {
        self.ok += other.ok;
        self.not_found += other.not_found;
        self.errors += other.errors;
        self.min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max = self.max.max(other.max);
        self.total += other.total;
        self.samples_us.extend_from_slice(&other.samples_us);
    }

    pub fn mean(&self) -> Duration {
        match u32::try_from(self.count()) {
            Ok(0) => Duration::ZERO,
            Ok(count) => self.total / count,
            Err(_) => Duration::from_secs_f64(self.total.as_secs_f64() / self.count() as f64),
        }
    }

    /// Latency quantile in microseconds using the nearest-rank sample.
    pub fn quantile_us(&self, q: f64) -> u64 {
        let mut sorted = self.samples_us.clone();
        sorted.sort_unstable();
        quantile(&sorted, q)
    }

    pub fn to_json(&self) -> Value {
        let mut sorted = self.samples_us.clone();
        sorted.sort_unstable();
        json!({
            "count": self.count(),
            "ok": self.ok,
            "not_found": self.not_found,
            "errors": self.errors,
            "latency_us": {
                "min": self.min.map_or(0, |min| duration_us(min)),
                "mean": duration_us(self.mean()),
                "p50": quantile(&sorted, 0.50),
                "p95": quantile(&sorted, 0.95),
                "p99": quantile(&sorted, 0.99),
                "max": duration_us(self.max),
            },
        })
    }
}

fn duration_us(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

fn quantile(sorted: &[u64], q: f64) -> u64 {
    let Some(last) = sorted.last() else {
        return 0;
    };
    let clamped = q.clamp(0.0, 1.0);
    let idx = ((sorted.len() - 1) as f64 * clamped).round() as usize;
    sorted.get(idx).copied().unwrap_or(*last)
}

/// Per-operation statistics, keyed in a stable order for reports.
#[derive(Clone, Debug, Default)]
pub struct Measurements {
    ops: BTreeMap<Operation, OpStats>,
}

impl Measurements {
    pub fn record(&mut self, op: Operation, status: Status, elapsed: Duration) {
        self.ops.entry(op).or_default().record(status, elapsed);
    }

    pub fn get(&self, op: Operation) -> Option<&OpStats> {
        self.ops.get(&op)
    }

    pub fn merge(&mut self, other: &Measurements) {
        for (op, stats) in &other.ops {
            self.ops.entry(*op).or_default().merge(stats);
        }
    }

    pub fn total_ops(&self) -> u64 {
        self.ops.values().map(OpStats::count).sum()
    }

    pub fn total_errors(&self) -> u64 {
        self.ops.values().map(|stats| stats.errors).sum()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.ops
                .iter()
                .map(|(op, stats)| (op.name().to_string(), stats.to_json()))
                .collect(),
        )
    }
}

/// Forwards to the wrapped adapter while recording latency and status per call.
pub struct Measured<D: Db> {
    inner: D,
    stats: RefCell<Measurements>,
}

impl<D: Db> Measured<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            stats: RefCell::new(Measurements::default()),
        }
    }

    pub fn snapshot(&self) -> Measurements {
        self.stats.borrow().clone()
    }

    pub fn into_parts(self) -> (D, Measurements) {
        (self.inner, self.stats.into_inner())
    }

    fn measure<T>(
        &self,
        op: Operation,
        table: &str,
        key: &str,
        call: impl FnOnce(&D) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let started = Instant::now();
        let result = call(&self.inner);
        let elapsed = started.elapsed();
        let status = Status::of(&result);
        if let Err(err) = &result {
            if status == Status::Error {
                tracing::warn!(op = op.name(), table, key, error = %err, "operation failed");
            }
        }
        self.stats.borrow_mut().record(op, status, elapsed);
        result
    }
}

impl<D: Db> Db for Measured<D> {
    fn init(&mut self, props: &Properties) -> Result<(), Error> {
        self.inner.init(props)
    }

    fn cleanup(&mut self) -> Result<(), Error> {
        self.inner.cleanup()
    }

    fn insert(&self, table: &str, key: &str, values: &Fields) -> Result<(), Error> {
        self.measure(Operation::Insert, table, key, |db| db.insert(table, key, values))
    }

    fn read(&self, table: &str, key: &str, fields: Option<&FieldSet>) -> Result<Fields, Error> {
        self.measure(Operation::Read, table, key, |db| db.read(table, key, fields))
    }

    fn update(&self, table: &str, key: &str, values: &Fields) -> Result<(), Error> {
        self.measure(Operation::Update, table, key, |db| db.update(table, key, values))
    }

    fn delete(&self, table: &str, key: &str) -> Result<(), Error> {
        self.measure(Operation::Delete, table, key, |db| db.delete(table, key))
    }

    fn scan(
        &self,
        table: &str,
        start_key: &str,
        count: usize,
        fields: Option<&FieldSet>,
    ) -> Result<Vec<ScanRecord>, Error> {
        self.measure(Operation::Scan, table, start_key, |db| {
            db.scan(table, start_key, count, fields)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Measured, Measurements, OpStats};
    use crate::bindings::{Db, MemoryDb};
    use crate::core::props::Properties;
    use crate::core::record::fields_from_strs;
    use crate::core::status::Status;
    use crate::workload::Operation;
    use std::time::Duration;

    #[test]
    fn measured_counts_each_status() {
        let mut db = Measured::new(MemoryDb::new());
        db.init(&Properties::new()).expect("init");
        db.insert("usertable", "user0", &fields_from_strs([("field0", "v")]))
            .expect("insert");
        db.read("usertable", "user0", None).expect("read");
        assert!(db.read("usertable", "missing", None).is_err());
        assert!(db.delete("usertable", "missing").is_err());

        let stats = db.snapshot();
        let reads = stats.get(Operation::Read).expect("read stats");
        assert_eq!((reads.ok, reads.not_found, reads.errors), (1, 1, 0));
        assert_eq!(stats.get(Operation::Delete).expect("delete stats").not_found, 1);
        assert_eq!(stats.total_ops(), 4);
        assert_eq!(stats.total_errors(), 0);
        db.cleanup().expect("cleanup");
    }

    #[test]
    fn usage_errors_count_as_errors() {
        let db = Measured::new(MemoryDb::new());
        assert!(db.read("usertable", "user0", None).is_err());
        let (_, stats) = db.into_parts();
        assert_eq!(stats.get(Operation::Read).expect("stats").errors, 1);
    }

    #[test]
    fn stats_merge_and_quantiles() {
        let mut a = OpStats::default();
        for ms in 1..=100 {
            a.record(Status::Ok, Duration::from_millis(ms));
        }
        let mut b = OpStats::default();
        b.record(Status::Error, Duration::from_micros(10));
        a.merge(&b);

        assert_eq!(a.count(), 101);
        assert_eq!(a.errors, 1);
        assert_eq!(a.quantile_us(0.0), 10);
        assert_eq!(a.quantile_us(1.0), 100_000);
        let summary = a.to_json();
        assert_eq!(summary["latency_us"]["min"], 10);
        assert_eq!(summary["latency_us"]["max"], 100_000);

        let mut total = Measurements::default();
        total.record(Operation::Scan, Status::Ok, Duration::from_micros(5));
        let mut other = Measurements::default();
        other.record(Operation::Scan, Status::NotFound, Duration::from_micros(7));
        total.merge(&other);
        assert_eq!(total.to_json()["SCAN"]["count"], 2);
    }
}
