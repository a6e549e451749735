//! Helpers for unpacking values out of dynamic JSON trees
//!
//! Responses with no fixed shape can be requested as a
//! [`serde_json::Value`] and navigated with these accessors, which trade
//! the panics of direct indexing for explicit errors: a missing key, an
//! out-of-range index, and a value of the wrong runtime type each report
//! what was asked for and what was found.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::Error;

/// Pulls the value for `key` out of a JSON object, converted to `T`.
///
/// Inner objects convert to [`Map<String, Value>`] and inner arrays to
/// [`Vec<Value>`], so a tree can be walked one level at a time.
///
/// # Errors
///
/// [`Error::MissingKey`] when the object has no such key, or
/// [`Error::TypeMismatch`] when the value cannot be converted to `T`.
pub fn value_from_object<T>(object: &Map<String, Value>, key: &str) -> Result<T, Error>
where
    T: DeserializeOwned,
{
    let value = object.get(key).ok_or_else(|| Error::MissingKey {
        key: key.to_owned(),
    })?;

    convert(value, || format!("key \"{key}\""))
}

/// Pulls the value at `index` out of a JSON array, converted to `T`.
///
/// # Errors
///
/// [`Error::IndexOutOfRange`] when the array is shorter than `index + 1`,
/// or [`Error::TypeMismatch`] when the value cannot be converted to `T`.
pub fn value_from_array<T>(array: &[Value], index: usize) -> Result<T, Error>
where
    T: DeserializeOwned,
{
    let value = array.get(index).ok_or(Error::IndexOutOfRange {
        index,
        len: array.len(),
    })?;

    convert(value, || format!("index {index}"))
}

fn convert<T>(value: &Value, context: impl FnOnce() -> String) -> Result<T, Error>
where
    T: DeserializeOwned,
{
    serde_json::from_value(value.clone()).map_err(|source| Error::TypeMismatch {
        context: context(),
        source,
    })
}
