//! Purpose: Generate keys, field values, and the operation mix for benchmark runs.
//! Exports: `Operation`, `OpMix`, `Workload`, `build_key`, `deterministic_value`.
//! Role: Pure helpers shared by `bench`, `smoke`, and tests; no I/O.
//! Invariants: `deterministic_value` depends only on key, field name, and length.
//! Invariants: Proportions are normalised; a mix with no positive weight is a Usage error.
use crate::core::error::{Error, ErrorKind};
use crate::core::props::Properties;
use crate::core::record::{FieldSet, FieldValue, Fields};
use rand::Rng;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Operation {
    Insert,
    Read,
    Update,
    Delete,
    Scan,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Read => "READ",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Scan => "SCAN",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `user` followed by `n`, left-padded with zeros to `zeropadding` digits.
pub fn build_key(n: u64, zeropadding: usize) -> String {
    format!("user{n:0>zeropadding$}")
}

/// Java `String.hashCode` over UTF-16 code units.
fn java_hash(text: &str) -> i32 {
    text.encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// Builds `key:field:` followed by repeated hash digits, cut to `len` characters.
///
/// Readers can recompute the expected value of any field from its address,
/// which lets a verification pass check data without keeping a copy.
pub fn deterministic_value(key: &str, field: &str, len: usize) -> String {
    let mut value = String::with_capacity(len + 16);
    value.push_str(key);
    value.push(':');
    value.push_str(field);
    let mut chars = value.chars().count();
    while chars < len {
        value.push(':');
        let hash = java_hash(&value).to_string();
        value.push_str(&hash);
        chars += 1 + hash.len();
    }
    if let Some((cut, _)) = value.char_indices().nth(len) {
        value.truncate(cut);
    }
    value
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OpMix {
    read: f64,
    update: f64,
    scan: f64,
    insert: f64,
    delete: f64,
}

impl OpMix {
    pub fn new(read: f64, update: f64, scan: f64, insert: f64, delete: f64) -> Result<Self, Error> {
        let weights = [read, update, scan, insert, delete];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("operation proportions must be finite and non-negative"));
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("operation proportions sum to zero")
                .with_hint("Set at least one of readproportion, updateproportion, scanproportion, insertproportion, deleteproportion."));
        }
        Ok(Self {
            read: read / total,
            update: update / total,
            scan: scan / total,
            insert: insert / total,
            delete: delete / total,
        })
    }

    pub fn from_props(props: &Properties) -> Result<Self, Error> {
        Self::new(
            props.parse_or("readproportion", 0.5)?,
            props.parse_or("updateproportion", 0.3)?,
            props.parse_or("scanproportion", 0.1)?,
            props.parse_or("insertproportion", 0.1)?,
            props.parse_or("deleteproportion", 0.0)?,
        )
    }

    pub fn choose<R: Rng>(&self, rng: &mut R) -> Operation {
        let buckets = [
            (self.read, Operation::Read),
            (self.update, Operation::Update),
            (self.scan, Operation::Scan),
            (self.delete, Operation::Delete),
            (self.insert, Operation::Insert),
        ];
        let mut roll = rng.gen_range(0.0..1.0);
        let mut last = Operation::Read;
        for (weight, op) in buckets {
            if weight <= 0.0 {
                continue;
            }
            if roll < weight {
                return op;
            }
            roll -= weight;
            last = op;
        }
        // Rounding can leave `roll` just past the last bucket.
        last
    }
}

/// Record layout and key space shared by every worker of a run.
#[derive(Clone, Debug)]
pub struct Workload {
    pub table: String,
    pub field_count: usize,
    pub field_length: usize,
    pub field_prefix: String,
    pub max_scan_length: usize,
    pub zeropadding: usize,
    pub mix: OpMix,
}

impl Workload {
    pub fn from_props(props: &Properties) -> Result<Self, Error> {
        let field_count = props.parse_or("fieldcount", 10usize)?;
        if field_count == 0 {
            return Err(Error::new(ErrorKind::Usage).with_message("fieldcount must be at least 1"));
        }
        Ok(Self {
            table: props.get_or("table", "usertable").to_string(),
            field_count,
            field_length: props.parse_or("fieldlength", 32usize)?,
            field_prefix: props.get_or("fieldnameprefix", "field").to_string(),
            max_scan_length: props.parse_or("maxscanlength", 10usize)?.max(1),
            zeropadding: props.parse_or("zeropadding", 1usize)?,
            mix: OpMix::from_props(props)?,
        })
    }

    pub fn field_name(&self, index: usize) -> String {
        format!("{}{index}", self.field_prefix)
    }

    pub fn key(&self, n: u64) -> String {
        build_key(n, self.zeropadding)
    }

    pub fn record(&self, key: &str) -> Fields {
        (0..self.field_count)
            .map(|i| {
                let name = self.field_name(i);
                let value = deterministic_value(key, &name, self.field_length);
                (name, FieldValue::from(value))
            })
            .collect()
    }

    /// One randomly chosen field with a fresh deterministic value.
    pub fn update_fields<R: Rng>(&self, key: &str, rng: &mut R) -> Fields {
        let name = self.field_name(rng.gen_range(0..self.field_count));
        let value = deterministic_value(key, &name, self.field_length);
        Fields::from([(name, FieldValue::from(value))])
    }

    /// Either every field (`None`) or a single random one.
    pub fn read_fields<R: Rng>(&self, rng: &mut R) -> Option<FieldSet> {
        rng.gen_bool(0.5)
            .then(|| FieldSet::from([self.field_name(rng.gen_range(0..self.field_count))]))
    }

    pub fn scan_length<R: Rng>(&self, rng: &mut R) -> usize {
        rng.gen_range(1..=self.max_scan_length)
    }
}
