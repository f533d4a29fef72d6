//! Declarative field mapping.
//!
//! The syndication feeds differ only in which source columns feed which
//! destination fields and which small transforms apply on the way. That
//! makes the mapping data, not code: an import run carries a table of
//! [`FieldMapping`] entries, each naming its source column(s) and a chain
//! of [`Transform`]s, instead of one parser subclass per feed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ImportError, Result};

/// Where a destination field reads its raw value from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FieldSource {
    /// A single source column.
    Column(String),
    /// Several source columns, delivered to the transforms as an array.
    Columns(Vec<String>),
}

/// A pure value transform, applied in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Transform {
    /// Prefix the value with a fixed string (scoped external ids like "P-12").
    Prefix(String),
    /// Prepend "http://" when a URL value carries no scheme.
    EnsureHttp,
    /// Replace null with an empty string.
    BlankIfNull,
    /// Translate through a value table. With `partial`, a table key only
    /// needs to be contained in the value. Unknown values are a field-level
    /// error: the field is dropped with a warning, the row survives.
    MapValues {
        mapping: HashMap<String, String>,
        partial: bool,
    },
    /// Split on the run's separator and trim each part, dropping empties.
    SplitTrim,
    /// Reject the whole row when the value is null or blank.
    Required,
}

/// One destination field: source column(s) plus its transform chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub dest: String,
    pub source: FieldSource,
    #[serde(default)]
    pub transforms: Vec<Transform>,
}

impl FieldMapping {
    /// Map `dest` straight from a single column, no transforms.
    pub fn direct(dest: &str, column: &str) -> Self {
        FieldMapping {
            dest: dest.to_string(),
            source: FieldSource::Column(column.to_string()),
            transforms: Vec::new(),
        }
    }

    /// Append a transform to the chain.
    pub fn with(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }
}

/// Apply a mapping table to one record's raw fields.
///
/// Returns the mapped field set, overlaid with `constants`. Field-level
/// errors drop the field and push a warning; a `Required` failure rejects
/// the row by returning [`ImportError::Row`].
pub fn apply_mappings(
    mappings: &[FieldMapping],
    constants: &HashMap<String, Value>,
    fields: &HashMap<String, Value>,
    separator: char,
    warnings: &mut Vec<String>,
) -> Result<HashMap<String, Value>> {
    let mut mapped = HashMap::with_capacity(mappings.len() + constants.len());

    for mapping in mappings {
        let raw = read_source(&mapping.source, fields);
        let mut value = raw;
        let mut dropped = false;
        for transform in &mapping.transforms {
            match apply_transform(transform, &mapping.dest, value.clone(), separator) {
                Ok(next) => value = next,
                Err(ImportError::Value { field, message }) => {
                    let warning = format!("Bad value for field '{}': {}", field, message);
                    log::warn!("[TrekImport] {}", warning);
                    warnings.push(warning);
                    dropped = true;
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        if !dropped {
            mapped.insert(mapping.dest.clone(), value);
        }
    }

    for (name, value) in constants {
        mapped.insert(name.clone(), value.clone());
    }

    Ok(mapped)
}

fn read_source(source: &FieldSource, fields: &HashMap<String, Value>) -> Value {
    match source {
        FieldSource::Column(name) => fields.get(name).cloned().unwrap_or(Value::Null),
        FieldSource::Columns(names) => Value::Array(
            names
                .iter()
                .map(|name| fields.get(name).cloned().unwrap_or(Value::Null))
                .collect(),
        ),
    }
}

fn apply_transform(
    transform: &Transform,
    dest: &str,
    value: Value,
    separator: char,
) -> Result<Value> {
    match transform {
        Transform::Prefix(prefix) => Ok(Value::String(format!(
            "{}{}",
            prefix,
            scalar_text(&value)
        ))),
        Transform::EnsureHttp => {
            let text = scalar_text(&value);
            if text.is_empty() || text.contains("://") {
                Ok(value)
            } else {
                Ok(Value::String(format!("http://{}", text)))
            }
        }
        Transform::BlankIfNull => {
            if value.is_null() {
                Ok(Value::String(String::new()))
            } else {
                Ok(value)
            }
        }
        Transform::MapValues { mapping, partial } => {
            let text = scalar_text(&value);
            let translated = mapping.get(&text).cloned().or_else(|| {
                if *partial {
                    mapping
                        .iter()
                        .find(|(key, _)| text.contains(key.as_str()))
                        .map(|(_, v)| v.clone())
                } else {
                    None
                }
            });
            match translated {
                Some(out) => Ok(Value::String(out)),
                None => Err(ImportError::value(
                    dest,
                    format!("'{}' not found in mapping table", text),
                )),
            }
        }
        Transform::SplitTrim => {
            let text = scalar_text(&value);
            let parts: Vec<Value> = text
                .split(separator)
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| Value::String(part.to_string()))
                .collect();
            Ok(Value::Array(parts))
        }
        Transform::Required => {
            let blank = match &value {
                Value::Null => true,
                Value::String(text) => text.trim().is_empty(),
                Value::Array(items) => items
                    .iter()
                    .any(|item| matches!(item, Value::Null) || item.as_str() == Some("")),
                _ => false,
            };
            if blank {
                Err(ImportError::row(format!(
                    "Required value for field '{}'",
                    dest
                )))
            } else {
                Ok(value)
            }
        }
    }
}

/// Textual form of a scalar value; objects and arrays pass through serde_json.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
