//! Values that may be conditionally absent from a document tree.
//!
//! Builders insert [`Conditional`] wrappers wherever a value only exists
//! under some configuration. Before a tree is rendered it must be passed
//! through [`clean_tree`] (or [`cleaned`]), which deletes disabled wrappers
//! and replaces enabled ones with their resolved payload.

use snafu::{ResultExt, Snafu};

use crate::{
    merge,
    value::Value,
};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    /// Resolving a disabled value while the caller demanded one must exist.
    #[snafu(display("cannot resolve a disabled value"))]
    Disabled,

    #[snafu(display("failed to merge the configured overlay into the wrapped value"))]
    MergeOverlay { source: merge::Error },
}

/// A value wrapper that can mark itself absent.
///
/// The variant set is closed and exhaustively matched by every consumer.
/// Wrappers are immutable after construction, resolution always rebuilds
/// the surrounding tree instead of mutating the wrapper.
#[derive(Clone, Debug, PartialEq)]
pub enum Conditional {
    /// The always-disabled sentinel.
    Disabled,

    /// A plain value holder.
    Value { value: Value, enabled: bool },

    /// A merge-aware holder: resolving deep-merges `overlay` into `value`
    /// before the result is returned.
    Merged {
        value: Value,
        overlay: Value,
        enabled: bool,
    },
}

impl Conditional {
    pub fn new(value: impl Into<Value>, enabled: bool) -> Self {
        Self::Value {
            value: value.into(),
            enabled,
        }
    }

    pub fn enabled(value: impl Into<Value>) -> Self {
        Self::new(value, true)
    }

    pub fn disabled(value: impl Into<Value>) -> Self {
        Self::new(value, false)
    }

    /// A holder that is disabled when its payload is null.
    pub fn unless_null(value: impl Into<Value>) -> Self {
        let value = value.into();
        let enabled = !value.is_null();
        Self::Value { value, enabled }
    }

    pub fn merged(value: impl Into<Value>, overlay: impl Into<Value>) -> Self {
        Self::Merged {
            value: value.into(),
            overlay: overlay.into(),
            enabled: true,
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Disabled => false,
            Self::Value { enabled, .. } | Self::Merged { enabled, .. } => *enabled,
        }
    }

    /// The wrapped payload, if any. The payload of a [`Conditional::Merged`]
    /// is returned without the overlay applied.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Disabled => None,
            Self::Value { value, .. } | Self::Merged { value, .. } => Some(value),
        }
    }

    /// Produces the wrapped value, applying the configured overlay for
    /// merge-aware holders. The enabled flag is not consulted here.
    pub fn value(&self) -> Result<Value, merge::Error> {
        match self {
            Self::Disabled => Ok(Value::Null),
            Self::Value { value, .. } => Ok(value.clone()),
            Self::Merged { value, overlay, .. } => {
                let mut merged = value.clone();
                merge::merge(&mut merged, overlay.clone())?;
                Ok(merged)
            }
        }
    }
}

/// Resolves a possibly-wrapped value into a plain one.
///
/// Unwrapped values pass through unchanged. A disabled wrapper resolves to
/// [`Value::Null`], or fails when `raise_if_disabled` is set. An enabled
/// wrapper is unwrapped transitively, so chains of nested wrappers collapse
/// into the innermost payload.
pub fn resolve(value: &Value, raise_if_disabled: bool) -> Result<Value> {
    match value {
        Value::Conditional(conditional) => {
            if !conditional.is_enabled() {
                if raise_if_disabled {
                    return DisabledSnafu.fail();
                }
                return Ok(Value::Null);
            }
            let inner = conditional.value().context(MergeOverlaySnafu)?;
            resolve(&inner, raise_if_disabled)
        }
        other => Ok(other.clone()),
    }
}

/// Removes every [`Conditional`] wrapper from a tree, in place.
///
/// Mapping keys holding a disabled wrapper are deleted; enabled wrappers
/// are replaced with their resolved payload. Sequences are visited in
/// reverse index order so removals do not shift indices that have not been
/// visited yet. Leaves are left untouched.
pub fn clean_tree(tree: &mut Value) -> Result<()> {
    match tree {
        Value::Mapping(mapping) => {
            let keys: Vec<String> = mapping.keys().cloned().collect();
            for key in keys {
                let replacement = match mapping.get(&key) {
                    Some(current @ Value::Conditional(conditional)) => {
                        if conditional.is_enabled() {
                            Some(resolve(current, false)?)
                        } else {
                            None
                        }
                    }
                    _ => continue,
                };
                match replacement {
                    Some(resolved) => {
                        mapping.insert(key, resolved);
                    }
                    None => {
                        mapping.shift_remove(&key);
                    }
                }
            }
            for value in mapping.values_mut() {
                clean_tree(value)?;
            }
        }
        Value::Sequence(sequence) => {
            for index in (0..sequence.len()).rev() {
                let replacement = match &sequence[index] {
                    current @ Value::Conditional(conditional) => {
                        if conditional.is_enabled() {
                            Some(resolve(current, false)?)
                        } else {
                            None
                        }
                    }
                    _ => continue,
                };
                match replacement {
                    Some(resolved) => sequence[index] = resolved,
                    None => {
                        sequence.remove(index);
                    }
                }
            }
            for value in sequence.iter_mut() {
                clean_tree(value)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Copying variant of [`clean_tree`], the input is never mutated.
pub fn cleaned(tree: &Value) -> Result<Value> {
    let mut copy = tree.clone();
    clean_tree(&mut copy)?;
    Ok(copy)
}

/// Checks whether a value is semantically "none": null, a disabled wrapper,
/// or an enabled wrapper around (transitively) such a value.
pub fn value_is_none(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Conditional(conditional) => match conditional.as_ref() {
            Conditional::Disabled => true,
            Conditional::Value { value, enabled } => !*enabled || value_is_none(value),
            Conditional::Merged { value, enabled, .. } => !*enabled || value_is_none(value),
        },
        _ => false,
    }
}
