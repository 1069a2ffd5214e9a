use super::error::{create_dir_error, read_error, write_error, StateError};
use crate::shared::fs_atomic::atomic_write_file;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

// Missing or blank files are empty. A legacy array is indexed by `key_field`.
pub(crate) fn load_records<T>(
    path: &Path,
    key_field: &str,
) -> Result<BTreeMap<String, T>, StateError>
where
    T: DeserializeOwned,
{
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(source) if source.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(source) if source.kind() == ErrorKind::InvalidData => {
            return Err(load_error(path, format!("file is not valid UTF-8: {source}"), None))
        }
        Err(source) => return Err(read_error(path, source)),
    };
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let value: Value = serde_json::from_str(&raw)
        .map_err(|err| load_error(path, format!("invalid json: {err}"), Some(err)))?;

    let mut records = BTreeMap::new();
    match value {
        Value::Object(entries) => {
            for (key, mut entry) in entries {
                let Some(fields) = entry.as_object_mut() else {
                    return Err(load_error(
                        path,
                        format!("record `{key}` is not an object"),
                        None,
                    ));
                };
                fields
                    .entry(key_field.to_string())
                    .or_insert_with(|| Value::String(key.clone()));
                records.insert(key.clone(), decode_record(path, &key, entry)?);
            }
        }
        Value::Array(entries) => {
            for (index, entry) in entries.into_iter().enumerate() {
                let key = entry
                    .get(key_field)
                    .and_then(Value::as_str)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        load_error(
                            path,
                            format!("legacy record at index {index} has no `{key_field}`"),
                            None,
                        )
                    })?;
                let record = decode_record(path, &key, entry)?;
                records.insert(key, record);
            }
        }
        other => {
            return Err(load_error(
                path,
                format!(
                    "expected an object keyed by id or an array of records, found {}",
                    json_kind(&other)
                ),
                None,
            ))
        }
    }
    Ok(records)
}

pub(crate) fn save_records<T>(path: &Path, records: &BTreeMap<String, T>) -> Result<(), StateError>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| create_dir_error(parent, source))?;
    }
    let mut body = serde_json::to_vec_pretty(records).map_err(|source| StateError::Encode {
        path: path.display().to_string(),
        source,
    })?;
    body.push(b'\n');
    atomic_write_file(path, &body).map_err(|source| write_error(path, source))
}

fn decode_record<T: DeserializeOwned>(
    path: &Path,
    key: &str,
    value: Value,
) -> Result<T, StateError> {
    serde_json::from_value(value)
        .map_err(|err| load_error(path, format!("record `{key}` is malformed: {err}"), Some(err)))
}

fn load_error(path: &Path, reason: String, source: Option<serde_json::Error>) -> StateError {
    StateError::Load {
        path: path.display().to_string(),
        reason,
        source,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
