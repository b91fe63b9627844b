//! Purpose: `ycsb-bind` CLI entry point.
//! Role: Binary crate root; parses args, loads properties, runs commands, emits JSON on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `to_exit_code`.
//! Invariants: Diagnostics go through `tracing` on stderr; stdout carries only command output.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{
    Args, CommandFactory, Parser, Subcommand, ValueEnum, ValueHint,
    error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod bench;
mod command_dispatch;

use ycsb_bind::{DbFactory, DbKind, Error, ErrorKind, Properties, to_exit_code};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse_from(std::env::args_os()) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint(clap_error_hint(&err)),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    command_dispatch::dispatch_command(cli.command).map_err(|err| (err, color_mode))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "ycsb-bind",
    version,
    about = "Pluggable store bindings for YCSB-style benchmarks",
    long_about = None,
    before_help = r#"Bindings: memory, elasticsearch (es), jdbc (sql).

Configuration is a property map: load files with -P and override keys with -p key=value."#,
    after_help = r#"EXAMPLES
  $ ycsb-bind ping --db elasticsearch -p es.hosts.list=localhost:9200
  $ ycsb-bind smoke --db jdbc -p db.url=sqlite:ycsb.db?mode=rwc -p db.create_table=true
  $ ycsb-bind bench --db memory --records 10000 --operations 100000 --threads 4 --format both

LEARN MORE
  $ ycsb-bind <command> --help"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Args, Clone, Debug)]
struct DbArgs {
    #[arg(long, help = "Binding to use: memory|elasticsearch|jdbc")]
    db: String,
    #[arg(
        short = 'P',
        long = "properties",
        value_name = "FILE",
        help = "Load a .properties file (repeatable; later files win)",
        value_hint = ValueHint::FilePath
    )]
    property_files: Vec<PathBuf>,
    #[arg(
        short = 'p',
        long = "property",
        value_name = "KEY=VALUE",
        help = "Set one property (repeatable; overrides files)"
    )]
    properties: Vec<String>,
}

impl DbArgs {
    fn factory(&self) -> Result<DbFactory, Error> {
        let kind: DbKind = self.db.parse()?;
        Ok(DbFactory::new(kind))
    }

    fn load_properties(&self) -> Result<Properties, Error> {
        let mut props = Properties::new();
        for path in &self.property_files {
            props.extend(&Properties::load(path)?);
        }
        for assignment in &self.properties {
            let (key, value) = Properties::parse_assignment(assignment)?;
            props.set(key, value);
        }
        Ok(props)
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Initialize a binding and clean it up again",
        after_help = r#"EXAMPLES
  $ ycsb-bind ping --db es -p es.hosts.list=10.0.0.5:9200 -p cluster.name=bench"#
    )]
    Ping {
        #[command(flatten)]
        db: DbArgs,
    },
    #[command(
        about = "Run a CRUD round trip on one probe record",
        long_about = r#"Insert, read, update, read, scan, delete, and read back one probe record.

Prints each step's status next to the expected status. Exits 1 when any step deviates."#
    )]
    Smoke {
        #[command(flatten)]
        db: DbArgs,
        #[arg(long, default_value = "ycsb-smoke-probe", help = "Key of the probe record")]
        key: String,
    },
    #[command(
        about = "Load records, then run a mixed workload",
        long_about = r#"Load phase inserts --records records; run phase issues --operations operations.

The mix comes from readproportion, updateproportion, scanproportion, and insertproportion."#
    )]
    Bench {
        #[command(flatten)]
        db: DbArgs,
        #[arg(long, default_value_t = 1000, help = "Records inserted during the load phase")]
        records: u64,
        #[arg(long, default_value_t = 1000, help = "Operations issued during the run phase")]
        operations: u64,
        #[arg(long, default_value_t = 1, help = "Worker threads, one adapter each")]
        threads: usize,
        #[arg(long, default_value = "json", help = "Output format: json|table|both")]
        format: String,
    },
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Backend => "backend error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(table) = err.table() {
        inner.insert("table".to_string(), json!(table));
    }
    if let Some(key) = err.key() {
        inner.insert("key".to_string(), json!(key));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = vec![format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    )];
    if let Some(hint) = err.hint() {
        lines.push(format!("{} {hint}", colorize_label("hint:", use_color, AnsiColor::Yellow)));
    }
    if let Some(table) = err.table() {
        lines.push(format!("{} {table}", colorize_label("table:", use_color, AnsiColor::Yellow)));
    }
    if let Some(key) = err.key() {
        lines.push(format!("{} {key}", colorize_label("key:", use_color, AnsiColor::Yellow)));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let command = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .and_then(|usage| {
            let mut tokens = usage.split_whitespace().skip_while(|token| *token != "ycsb-bind");
            tokens.next()?;
            tokens.next().filter(|token| !token.starts_with(['-', '<', '[']))
        });
    match command {
        Some(command) => format!("Try `ycsb-bind {command} --help`."),
        None => "Try `ycsb-bind --help`.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command, error_json, error_text};
    use clap::Parser;
    use ycsb_bind::{Error, ErrorKind};

    #[test]
    fn error_json_carries_record_address_and_hint() {
        let err = Error::new(ErrorKind::NotFound)
            .with_message("record not found")
            .with_hint("check the key")
            .at("usertable", "user7");
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "NotFound");
        assert_eq!(value["error"]["table"], "usertable");
        assert_eq!(value["error"]["key"], "user7");
        assert_eq!(value["error"]["hint"], "check the key");
    }

    #[test]
    fn error_text_respects_color_flag() {
        let err = Error::new(ErrorKind::Backend).with_message("boom");
        assert_eq!(error_text(&err, false), "error: boom");
        assert!(error_text(&err, true).contains("\u{1b}[31m"));
    }

    #[test]
    fn properties_merge_files_then_assignments() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("workload.properties");
        std::fs::write(&path, "table=fromfile\nfieldcount=3\n").expect("write");
        let cli = Cli::try_parse_from([
            "ycsb-bind",
            "ping",
            "--db",
            "memory",
            "-P",
            path.to_str().expect("utf8 path"),
            "-p",
            "table=override",
        ])
        .expect("parse");
        let Command::Ping { db } = cli.command else {
            panic!("expected ping");
        };
        let props = db.load_properties().expect("props");
        assert_eq!(props.get("table"), Some("override"));
        assert_eq!(props.get("fieldcount"), Some("3"));
    }
}
