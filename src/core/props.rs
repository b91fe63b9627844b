//! Purpose: Hold string-valued binding configuration and typed accessors over it.
//! Exports: `Properties`.
//! Role: Single configuration surface shared by every binding, the bench runner, and the CLI.
//! Invariants: Later assignments win; parse failures are `Usage` errors naming the key.
//! Invariants: File syntax is the Java `.properties` subset (`k=v`, `k: v`, `#`/`!` comments).
use super::error::{Error, ErrorKind};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Properties {
    values: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn extend(&mut self, other: &Properties) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Returns a non-empty value or a `Usage` error naming the missing key.
    pub fn require(&self, key: &str) -> Result<&str, Error> {
        match self.get(key).map(str::trim) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("missing required property `{key}`"))
                .with_hint(format!("Set it with `-p {key}=<value>` or in a properties file."))),
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, Error> {
        let Some(raw) = self.get(key) else {
            return Ok(default);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("property `{key}` must be true or false, got `{raw}`"))),
        }
    }

    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T, Error>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let Some(raw) = self.get(key) else {
            return Ok(default);
        };
        raw.trim().parse::<T>().map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid value `{raw}` for property `{key}`"))
                .with_source(err)
        })
    }

    pub fn millis_or(&self, key: &str, default_ms: u64) -> Result<Duration, Error> {
        self.parse_or(key, default_ms).map(Duration::from_millis)
    }

    /// Yields `(suffix, value)` for every key starting with `prefix`, suffix non-empty.
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.values
            .range(prefix.to_string()..)
            .take_while(move |(key, _)| key.starts_with(prefix))
            .filter_map(move |(key, value)| {
                let suffix = &key[prefix.len()..];
                (!suffix.is_empty()).then_some((suffix, value.as_str()))
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parses a single `key=value` assignment as given on the command line.
    pub fn parse_assignment(input: &str) -> Result<(String, String), Error> {
        match split_assignment(input) {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("invalid property assignment `{input}`"))
                .with_hint("Use key=value, for example `-p es.index.key=ycsb`.")),
        }
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut props = Self::new();
        let mut pending = String::new();
        for (index, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim_start();
            if pending.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
                continue;
            }
            if let Some(continued) = line.strip_suffix('\\') {
                pending.push_str(continued);
                continue;
            }
            pending.push_str(line);
            let logical = std::mem::take(&mut pending);
            let (key, value) = split_assignment(&logical).ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("malformed properties line {}", index + 1))
            })?;
            if key.is_empty() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("empty key on properties line {}", index + 1)));
            }
            props.set(key, value);
        }
        if !pending.is_empty() {
            let (key, value) = split_assignment(&pending).ok_or_else(|| {
                Error::new(ErrorKind::Usage).with_message("dangling line continuation")
            })?;
            props.set(key, value);
        }
        Ok(props)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to read properties file {}", path.display()))
                .with_source(err)
        })?;
        Self::parse(&text)
    }
}

impl<K, V> FromIterator<(K, V)> for Properties
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Self::new();
        for (key, value) in iter {
            props.set(key, value);
        }
        props
    }
}

fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let split_at = line.find(['=', ':'])?;
    let key = line[..split_at].trim();
    let value = line[split_at + 1..].trim();
    Some((key, value))
}
