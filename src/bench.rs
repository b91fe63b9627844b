// Benchmark runner for ycsb-bind.
//
// Purpose:
// - Drive any binding through a load phase (sequential inserts) and a run phase (mixed operations).
// - Emit machine-readable JSON to stdout and a human-readable table to stderr.
//
// Design notes:
// - One adapter instance per worker thread, created from a shared `DbFactory`.
// - Keys are drawn uniformly from the records loaded so far; inserts extend the key space.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde_json::{Value, json};

use ycsb_bind::bindings::{Db, DbFactory};
use ycsb_bind::core::error::{Error, ErrorKind};
use ycsb_bind::core::props::Properties;
use ycsb_bind::measure::{Measured, Measurements};
use ycsb_bind::workload::{Operation, Workload};

#[derive(Clone, Debug)]
pub struct BenchArgs {
    pub records: u64,
    pub operations: u64,
    pub threads: usize,
    pub format: BenchFormat,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BenchFormat {
    Json,
    Table,
    Both,
}

impl BenchFormat {
    pub fn parse(input: &str) -> Result<Self, Error> {
        match input.trim() {
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            "both" => Ok(Self::Both),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message("invalid --format (use json|table|both)")),
        }
    }
}

pub fn run_bench(
    factory: &DbFactory,
    props: &Properties,
    args: &BenchArgs,
    program_version: &str,
) -> Result<(), Error> {
    let report = bench_report(factory, props, args, program_version)?;
    emit_bench_output(report, args.format)
}

pub fn bench_report(
    factory: &DbFactory,
    props: &Properties,
    args: &BenchArgs,
    program_version: &str,
) -> Result<Value, Error> {
    if args.threads == 0 {
        return Err(Error::new(ErrorKind::Usage).with_message("--threads must be at least 1"));
    }
    let start = SystemTime::now();
    let workload = Workload::from_props(props)?;

    tracing::info!(db = %factory.kind(), records = args.records, threads = args.threads, "load phase");
    let load_started = Instant::now();
    let load = run_phase(factory, props, args.threads, |worker, db| {
        let (first, last) = partition(args.records, args.threads, worker);
        for n in first..last {
            let key = workload.key(n);
            // Failures are already counted by the measuring wrapper.
            let _ = db.insert(&workload.table, &key, &workload.record(&key));
        }
        Ok(())
    })?;
    let load_elapsed = load_started.elapsed();

    tracing::info!(operations = args.operations, "run phase");
    let key_space = AtomicU64::new(args.records);
    let run_started = Instant::now();
    let run = run_phase(factory, props, args.threads, |worker, db| {
        let (first, last) = partition(args.operations, args.threads, worker);
        let mut rng = rand::thread_rng();
        for _ in first..last {
            run_operation(db, &workload, &key_space, &mut rng);
        }
        Ok(())
    })?;
    let run_elapsed = run_started.elapsed();

    Ok(json!({
        "name": "ycsb-bind",
        "version": program_version,
        "ts": rfc3339_now(start),
        "system": system_json(),
        "params": {
            "db": factory.kind().name(),
            "table": workload.table,
            "records": args.records,
            "operations": args.operations,
            "threads": args.threads,
            "fieldcount": workload.field_count,
            "fieldlength": workload.field_length,
            "debug_build": cfg!(debug_assertions),
        },
        "load": phase_json(&load, load_elapsed),
        "run": phase_json(&run, run_elapsed),
    }))
}

fn run_operation<D: Db, R: Rng>(db: &D, workload: &Workload, key_space: &AtomicU64, rng: &mut R) {
    let known = key_space.load(Ordering::Relaxed);
    let op = if known == 0 {
        Operation::Insert
    } else {
        workload.mix.choose(rng)
    };
    let table = workload.table.as_str();
    let _ = match op {
        Operation::Read => {
            let key = existing_key(workload, known, rng);
            let fields = workload.read_fields(rng);
            db.read(table, &key, fields.as_ref()).map(drop)
        }
        Operation::Update => {
            let key = existing_key(workload, known, rng);
            let values = workload.update_fields(&key, rng);
            db.update(table, &key, &values)
        }
        Operation::Scan => {
            let key = existing_key(workload, known, rng);
            let count = workload.scan_length(rng);
            let fields = workload.read_fields(rng);
            db.scan(table, &key, count, fields.as_ref()).map(drop)
        }
        Operation::Delete => {
            let key = existing_key(workload, known, rng);
            db.delete(table, &key)
        }
        Operation::Insert => {
            let key = workload.key(key_space.fetch_add(1, Ordering::Relaxed));
            db.insert(table, &key, &workload.record(&key))
        }
    };
}

fn existing_key<R: Rng>(workload: &Workload, known: u64, rng: &mut R) -> String {
    workload.key(rng.gen_range(0..known))
}

/// Half-open range of work items owned by `worker`.
fn partition(total: u64, workers: usize, worker: usize) -> (u64, u64) {
    let workers = workers as u64;
    let worker = worker as u64;
    let base = total / workers;
    let extra = total % workers;
    let first = worker * base + worker.min(extra);
    let len = base + u64::from(worker < extra);
    (first, first + len)
}

fn run_phase<F>(
    factory: &DbFactory,
    props: &Properties,
    threads: usize,
    body: F,
) -> Result<Measurements, Error>
where
    F: Fn(usize, &Measured<Box<dyn Db>>) -> Result<(), Error> + Sync,
{
    let results: Vec<Result<Measurements, Error>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|worker| {
                let body = &body;
                scope.spawn(move || -> Result<Measurements, Error> {
                    let mut db = Measured::new(factory.create());
                    db.init(props)?;
                    let outcome = body(worker, &db);
                    db.cleanup()?;
                    outcome?;
                    Ok(db.snapshot())
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle.join().unwrap_or_else(|_| {
                    Err(Error::new(ErrorKind::Internal).with_message("bench worker panicked"))
                })
            })
            .collect()
    });

    let mut total = Measurements::default();
    for result in results {
        total.merge(&result?);
    }
    Ok(total)
}

fn phase_json(stats: &Measurements, elapsed: Duration) -> Value {
    let secs = elapsed.as_secs_f64().max(1e-9);
    json!({
        "duration_ms": elapsed.as_secs_f64() * 1000.0,
        "operations": stats.total_ops(),
        "errors": stats.total_errors(),
        "ops_per_sec": stats.total_ops() as f64 / secs,
        "ops": stats.to_json(),
    })
}

fn emit_bench_output(value: Value, format: BenchFormat) -> Result<(), Error> {
    match format {
        BenchFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string()));
            Ok(())
        }
        BenchFormat::Table => emit_table(&value),
        BenchFormat::Both => {
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string()));
            emit_table(&value)
        }
    }
}

fn table_error(err: io::Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message("failed to write bench table")
        .with_source(err)
}

fn emit_table(value: &Value) -> Result<(), Error> {
    let mut stderr = io::stderr().lock();
    let db = value["params"]["db"].as_str().unwrap_or("?");
    writeln!(stderr, "ycsb-bind bench ({db})").map_err(table_error)?;
    writeln!(
        stderr,
        "{:>6}  {:>8}  {:>10}  {:>8}  {:>8}  {:>10}  {:>10}  {:>10}",
        "phase", "op", "count", "notfound", "errors", "mean_us", "p95_us", "p99_us"
    )
    .map_err(table_error)?;

    for phase in ["load", "run"] {
        let Some(ops) = value[phase]["ops"].as_object() else {
            continue;
        };
        for (op, stats) in ops {
            let latency = &stats["latency_us"];
            writeln!(
                stderr,
                "{:>6}  {:>8}  {:>10}  {:>8}  {:>8}  {:>10}  {:>10}  {:>10}",
                phase,
                op,
                stats["count"].as_u64().unwrap_or(0),
                stats["not_found"].as_u64().unwrap_or(0),
                stats["errors"].as_u64().unwrap_or(0),
                latency["mean"].as_u64().unwrap_or(0),
                latency["p95"].as_u64().unwrap_or(0),
                latency["p99"].as_u64().unwrap_or(0),
            )
            .map_err(table_error)?;
        }
        let ops_per_sec = value[phase]["ops_per_sec"].as_f64().unwrap_or(f64::NAN);
        writeln!(stderr, "{phase:>6}  throughput {ops_per_sec:.1} ops/s").map_err(table_error)?;
    }
    Ok(())
}

fn system_json() -> Value {
    let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    json!({
        "os": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "cpus": cpus,
    })
}

fn rfc3339_now(ts: SystemTime) -> String {
    let dur = ts.duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = dur.as_secs() as i64;
    let nsec = dur.subsec_nanos();
    let tm = time::OffsetDateTime::from_unix_timestamp(secs).unwrap_or(time::OffsetDateTime::UNIX_EPOCH);
    let tm = tm.replace_nanosecond(nsec).unwrap_or(tm);
    tm.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
