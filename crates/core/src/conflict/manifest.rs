//! `composer.json` as an immutable value.
//!
//! Only the `conflict` section is interpreted. Every other top-level member is
//! carried through untouched, in its original position, and `conflict` is
//! written back where it was found (or appended if the manifest had none).

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::ManifestError;

const CONFLICT: &str = "conflict";

/// A parsed composer manifest.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComposerManifest {
    conflict: IndexMap<String, String>,
    other: Map<String, Value>,
    /// Position of `conflict` among the original top-level members.
    conflict_index: Option<usize>,
}

impl ComposerManifest {
    /// Parse manifest bytes as fetched from the repository.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ManifestError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ManifestError::InvalidEncoding)?;
        Self::from_json_str(text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ManifestError> {
        let Value::Object(members) = serde_json::from_str::<Value>(text)? else {
            return Err(ManifestError::NotAnObject);
        };

        let mut manifest = Self::default();
        for (index, (name, value)) in members.into_iter().enumerate() {
            if name == CONFLICT {
                manifest.conflict = parse_conflict(value)?;
                manifest.conflict_index = Some(index);
            } else {
                manifest.other.insert(name, value);
            }
        }
        Ok(manifest)
    }

    /// The conflict section, in manifest order.
    pub fn conflict(&self) -> &IndexMap<String, String> {
        &self.conflict
    }

    /// The constraint currently recorded for `package`.
    pub fn constraint_for(&self, package: &str) -> Option<&str> {
        self.conflict.get(package).map(String::as_str)
    }

    /// Top-level members other than `conflict`.
    pub fn other_fields(&self) -> &Map<String, Value> {
        &self.other
    }

    /// Whether conflict keys are in ascending order.
    pub fn is_conflict_sorted(&self) -> bool {
        self.conflict
            .keys()
            .zip(self.conflict.keys().skip(1))
            .all(|(a, b)| a <= b)
    }

    pub(crate) fn set_constraint(&mut self, package: String, constraint: String) {
        self.conflict.insert(package, constraint);
    }

    pub(crate) fn sort_conflict(&mut self) {
        self.conflict.sort_by(|a, _, b, _| a.cmp(b));
    }

    /// The whole manifest as a JSON value.
    pub fn to_value(&self) -> Value {
        let conflict: Map<String, Value> = self
            .conflict
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        let mut out = Map::new();
        let mut conflict = Some(conflict);
        for (index, (name, value)) in self.other.iter().enumerate() {
            if self.conflict_index == Some(index) {
                if let Some(section) = conflict.take() {
                    out.insert(CONFLICT.to_string(), Value::Object(section));
                }
            }
            out.insert(name.clone(), value.clone());
        }
        if let Some(section) = conflict {
            if self.conflict_index.is_some() || !section.is_empty() {
                out.insert(CONFLICT.to_string(), Value::Object(section));
            }
        }
        Value::Object(out)
    }

    /// Pretty-printed JSON (four-space indent, `/` unescaped, trailing newline).
    pub fn to_pretty_json(&self) -> Result<String, ManifestError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.to_value().serialize(&mut ser)?;
        buf.push(b'\n');
        String::from_utf8(buf).map_err(|_| ManifestError::InvalidEncoding)
    }
}

fn parse_conflict(value: Value) -> Result<IndexMap<String, String>, ManifestError> {
    match value {
        Value::Object(entries) => entries
            .into_iter()
            .map(|(package, constraint)| match constraint {
                Value::String(s) => Ok((package, s)),
                other => Err(ManifestError::InvalidConflictSection(format!(
                    "constraint for '{package}' is {other}, expected a string"
                ))),
            })
            .collect(),
        // An empty PHP array encodes as `[]`.
        Value::Array(items) if items.is_empty() => Ok(IndexMap::new()),
        Value::Null => Ok(IndexMap::new()),
        other => Err(ManifestError::InvalidConflictSection(format!(
            "expected an object, found {other}"
        ))),
    }
}
