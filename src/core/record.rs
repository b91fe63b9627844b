//! Purpose: Define the record shapes exchanged between the harness and a binding.
//! Exports: `FieldValue`, `Fields`, `FieldSet`, `ScanRecord`, `project`, `fields_from_strs`.
//! Role: Store-neutral data model; bindings convert to and from their native documents/rows.
//! Invariants: Values are immutable byte buffers; text stores see the lossy UTF-8 rendering.
//! Invariants: An absent or empty field set selects every stored field.
use bytes::Bytes;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldValue(Bytes);

impl FieldValue {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(&self.0))
    }
}

pub type Fields = BTreeMap<String, FieldValue>;

pub type FieldSet = BTreeSet<String>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScanRecord {
    pub key: String,
    pub fields: Fields,
}

/// Restricts `fields` to the names in `wanted`; `None` or an empty set keeps everything.
pub fn project(mut fields: Fields, wanted: Option<&FieldSet>) -> Fields {
    match wanted {
        Some(wanted) if !wanted.is_empty() => {
            fields.retain(|name, _| wanted.contains(name));
            fields
        }
        _ => fields,
    }
}

pub fn wants_all(wanted: Option<&FieldSet>) -> bool {
    wanted.is_none_or(|wanted| wanted.is_empty())
}

pub fn fields_from_strs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Fields {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), FieldValue::from(value)))
        .collect()
}
