//! Purpose: Hold top-level CLI command dispatch for `ycsb-bind`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every command that initializes a binding cleans it up, also on failure.

use super::*;
use ycsb_bind::Db;
use ycsb_bind::core::record::FieldSet;
use ycsb_bind::workload::{Operation, Workload, deterministic_value};
use ycsb_bind::{FieldValue, Fields, Status};

pub(super) fn dispatch_command(command: Command) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "ycsb-bind", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Ping { db } => {
            let factory = db.factory()?;
            let props = db.load_properties()?;
            let mut adapter = factory.create();
            adapter.init(&props)?;
            adapter.cleanup()?;
            emit_json(json!({ "db": factory.kind().name(), "status": Status::Ok.name() }));
            Ok(RunOutcome::ok())
        }
        Command::Smoke { db, key } => {
            let factory = db.factory()?;
            let props = db.load_properties()?;
            let workload = Workload::from_props(&props)?;
            let mut adapter = factory.create();
            adapter.init(&props)?;
            let steps = smoke_steps(&*adapter, &workload, &key);
            adapter.cleanup()?;

            let passed = steps.iter().all(SmokeStep::passed);
            emit_json(json!({
                "db": factory.kind().name(),
                "table": workload.table,
                "key": key,
                "ok": passed,
                "steps": steps.iter().map(SmokeStep::to_json).collect::<Vec<_>>(),
            }));
            Ok(if passed {
                RunOutcome::ok()
            } else {
                RunOutcome::with_code(to_exit_code(ErrorKind::Internal))
            })
        }
        Command::Bench {
            db,
            records,
            operations,
            threads,
            format,
        } => {
            let factory = db.factory()?;
            let props = db.load_properties()?;
            let args = bench::BenchArgs {
                records,
                operations,
                threads,
                format: bench::BenchFormat::parse(&format)?,
            };
            bench::run_bench(&factory, &props, &args, env!("CARGO_PKG_VERSION"))?;
            Ok(RunOutcome::ok())
        }
    }
}

struct SmokeStep {
    op: Operation,
    status: Status,
    expected: Status,
    detail: Option<String>,
}

impl SmokeStep {
    fn passed(&self) -> bool {
        self.status == self.expected && self.detail.is_none()
    }

    fn to_json(&self) -> Value {
        let mut step = json!({
            "op": self.op.name(),
            "status": self.status.name(),
            "expected": self.expected.name(),
        });
        if let Some(detail) = &self.detail {
            step["detail"] = json!(detail);
        }
        step
    }
}

fn step<T>(op: Operation, expected: Status, result: &Result<T, Error>) -> SmokeStep {
    let status = Status::of(result);
    let detail = match result {
        Err(err) if status != expected => Some(err.to_string()),
        _ => None,
    };
    SmokeStep {
        op,
        status,
        expected,
        detail,
    }
}

fn smoke_steps(db: &dyn Db, workload: &Workload, key: &str) -> Vec<SmokeStep> {
    let table = workload.table.as_str();
    // A probe left behind by an interrupted run would make the insert collide.
    let _ = db.delete(table, key);

    let record = workload.record(key);
    let first_field = workload.field_name(0);
    let updated: Fields = Fields::from([(
        first_field.clone(),
        FieldValue::from(deterministic_value(&format!("{key}-updated"), &first_field, workload.field_length)),
    )]);

    let mut steps = Vec::new();
    steps.push(step(Operation::Insert, Status::Ok, &db.insert(table, key, &record)));
    steps.push(read_step(db, table, key, None, &record));
    steps.push(step(Operation::Update, Status::Ok, &db.update(table, key, &updated)));
    let wanted = FieldSet::from([first_field]);
    steps.push(read_step(db, table, key, Some(&wanted), &updated));
    steps.push(step(Operation::Scan, Status::Ok, &db.scan(table, key, 1, None)));
    steps.push(step(Operation::Delete, Status::Ok, &db.delete(table, key)));
    steps.push(step(Operation::Read, Status::NotFound, &db.read(table, key, None)));
    steps
}

fn read_step(
    db: &dyn Db,
    table: &str,
    key: &str,
    fields: Option<&FieldSet>,
    expected: &Fields,
) -> SmokeStep {
    let result = db.read(table, key, fields);
    let mut outcome = step(Operation::Read, Status::Ok, &result);
    if let Ok(found) = &result {
        if found != expected {
            outcome.detail = Some("read returned different field values".to_string());
        }
    }
    outcome
}
