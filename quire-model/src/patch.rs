//! Shallow field patches.
//!
//! A [`Patch`] touches top-level fields of a JSON object. Every optimistic
//! update is expressed as a patch plus its inverse, and
//! `invert(before).apply(patch.applied(before)) == before` holds for any
//! object `before`.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::{ModelError, ModelResult};

/// What a patch does to one top-level field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Set the field to this value (inserting it if absent).
    Set(Value),
    /// Remove the field.
    Remove,
}

impl FieldOp {
    /// The op that restores `field` to its state in `before`.
    pub fn restoring(before: &Map<String, Value>, field: &str) -> Self {
        match before.get(field) {
            Some(value) => FieldOp::Set(value.clone()),
            None => FieldOp::Remove,
        }
    }

    /// Applies this op to `field` of `obj`.
    pub fn apply_to(&self, obj: &mut Map<String, Value>, field: &str) {
        apply_op(obj, field, self);
    }
}

/// A shallow change set over a JSON object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Patch {
    ops: BTreeMap<String, FieldOp>,
}

impl Patch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `Set` op.
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.insert(field.into(), FieldOp::Set(value.into()));
        self
    }

    /// Adds a `Remove` op.
    #[must_use]
    pub fn remove(mut self, field: impl Into<String>) -> Self {
        self.ops.insert(field.into(), FieldOp::Remove);
        self
    }

    /// Builds a patch that sets every field of a JSON object.
    pub fn from_json(value: Value) -> ModelResult<Self> {
        match value {
            Value::Object(map) => Ok(Self {
                ops: map.into_iter().map(|(k, v)| (k, FieldOp::Set(v))).collect(),
            }),
            _ => Err(ModelError::PatchNotObject),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Field names touched by this patch, in sorted order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.ops.keys().map(String::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&FieldOp> {
        self.ops.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.ops.contains_key(field)
    }

    /// Inserts or replaces the op for `field`.
    pub fn insert(&mut self, field: impl Into<String>, op: FieldOp) {
        self.ops.insert(field.into(), op);
    }

    /// Iterates over `(field, op)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldOp)> {
        self.ops.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// True if this patch has an op for every field `other` touches.
    pub fn covers(&self, other: &Patch) -> bool {
        other.fields().all(|f| self.contains(f))
    }

    /// Fields `other` touches that this patch does not.
    pub fn missing_from(&self, other: &Patch) -> Vec<String> {
        other
            .fields()
            .filter(|f| !self.contains(f))
            .map(str::to_string)
            .collect()
    }

    /// Applies this patch in place. Non-object targets are left untouched.
    pub fn apply(&self, target: &mut Value) {
        let Some(obj) = target.as_object_mut() else {
            return;
        };
        for (field, op) in &self.ops {
            apply_op(obj, field, op);
        }
    }

    /// Returns a patched copy of `target`.
    #[must_use]
    pub fn applied(&self, target: &Value) -> Value {
        let mut out = target.clone();
        self.apply(&mut out);
        out
    }

    /// Computes the patch that undoes `self` when applied after it.
    pub fn invert(&self, before: &Value) -> ModelResult<Patch> {
        let obj = before.as_object().ok_or(ModelError::InvertNonObject)?;
        Ok(Patch {
            ops: self
                .ops
                .keys()
                .map(|field| (field.clone(), FieldOp::restoring(obj, field)))
                .collect(),
        })
    }
}

/// Applies a single field op to an object.
pub(crate) fn apply_op(obj: &mut Map<String, Value>, field: &str, op: &FieldOp) {
    match op {
        FieldOp::Set(value) => {
            obj.insert(field.to_string(), value.clone());
        }
        FieldOp::Remove => {
            obj.remove(field);
        }
    }
}

impl FromIterator<(String, FieldOp)> for Patch {
    fn from_iter<I: IntoIterator<Item = (String, FieldOp)>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}
