//! Structural diff/patch over JSON values.
//!
//! [`delta`] computes the minimal patch turning one snapshot into the next,
//! [`assign`] applies such a patch back onto the base value. The codec is
//! positional for arrays and requires matching key sets for objects; it
//! cannot express property deletion. Callers hitting
//! [`DeltaError::UnsupportedDelete`] must fall back to sending the full
//! value.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeltaError {
    #[error("delta doesn't support deleting props ({previous} keys vs {current})")]
    UnsupportedDelete { previous: usize, current: usize },
}

/// Diff `current` against `previous`.
///
/// Returns `None` for an unchanged primitive leaf. Arrays are walked to
/// `current`'s length; a slot with no previous counterpart materializes the
/// full current value, an unchanged primitive slot is encoded as `null`.
/// Objects keep every key whose nested delta is present, so an unchanged
/// object diffs to `{}`, not to an absent key.
pub fn delta(previous: &Value, current: &Value) -> Result<Option<Value>, DeltaError> {
    match (previous, current) {
        (Value::Number(a), Value::Number(b)) => Ok((a != b).then(|| current.clone())),
        (Value::String(a), Value::String(b)) => Ok((a != b).then(|| current.clone())),
        (Value::Bool(a), Value::Bool(b)) => Ok((a != b).then(|| current.clone())),
        (Value::Null, Value::Null) => Ok(None),
        (Value::Array(prev), Value::Array(cur)) => {
            let mut patch = Vec::with_capacity(cur.len());
            for (i, item) in cur.iter().enumerate() {
                match prev.get(i) {
                    Some(base) => patch.push(delta(base, item)?.unwrap_or(Value::Null)),
                    None => patch.push(item.clone()),
                }
            }
            Ok(Some(Value::Array(patch)))
        }
        (Value::Object(prev), Value::Object(cur)) => {
            if prev.len() != cur.len() {
                return Err(DeltaError::UnsupportedDelete {
                    previous: prev.len(),
                    current: cur.len(),
                });
            }
            let mut patch = Map::new();
            for (key, base) in prev {
                let Some(item) = cur.get(key) else { continue };
                if let Some(changed) = delta(base, item)? {
                    patch.insert(key.clone(), changed);
                }
            }
            Ok(Some(Value::Object(patch)))
        }
        _ => Ok(Some(current.clone())),
    }
}

/// Apply a patch produced by [`delta`] onto `base`, reconstructing the value
/// it was diffed against. A `null` patch slot means "keep the base value".
pub fn assign(base: &Value, patch: &Value) -> Value {
    match (base, patch) {
        (_, Value::Null) => base.clone(),
        (Value::Array(bases), Value::Array(slots)) => {
            let mut out = Vec::with_capacity(slots.len());
            for (i, slot) in slots.iter().enumerate() {
                match bases.get(i) {
                    Some(b) => out.push(assign(b, slot)),
                    None => out.push(slot.clone()),
                }
            }
            Value::Array(out)
        }
        (Value::Object(bases), Value::Object(slots)) => {
            let mut out = bases.clone();
            for (key, b) in bases {
                if let Some(slot) = slots.get(key) {
                    out.insert(key.clone(), assign(b, slot));
                }
            }
            Value::Object(out)
        }
        _ => patch.clone(),
    }
}
