//! Deep merging of document trees.
//!
//! A merge walks the incoming tree against the base tree and combines the
//! two under per-kind strategies: sequences append, mappings merge
//! recursively, everything else is handed to an ordered fallback chain.
//! When no fallback produces a result the merge fails with a type conflict
//! naming the dotted path where the two trees disagree.
//!
//! Two entry points are offered: [`merge`] creates mapping keys that are
//! missing from the base, [`merge_strict`] rejects them. This is used to
//! enforce closed option sets at merge time.
//!
//! # Example
//!
//! ```
//! use kubeweave::{merge::merge, value::Value};
//! use serde_json::json;
//!
//! let mut base = Value::from(json!({"metadata": {"name": "web"}}));
//! merge(&mut base, Value::from(json!({"metadata": {"namespace": "prod"}}))).unwrap();
//! assert_eq!(
//!     base,
//!     Value::from(json!({"metadata": {"name": "web", "namespace": "prod"}}))
//! );
//! ```

use indexmap::map::Entry;
use snafu::Snafu;
use tracing::trace;

use crate::{
    conditional::Conditional,
    value::{Mapping, Sequence, StyledStr, Value, ValueKind},
};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum Error {
    /// A strict merge encountered a key that does not exist in the base.
    #[snafu(display("unknown option {path:?}"))]
    UnknownKey { path: String },

    /// No strategy or fallback could combine the two values at this path.
    #[snafu(display("type conflict at {path:?}: {base}, {incoming}"))]
    TypeConflict {
        path: String,
        base: ValueKind,
        incoming: ValueKind,
    },
}

/// How mapping keys that are missing from the base are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MapStrategy {
    /// Missing keys are created in the base.
    #[default]
    CreateMissing,

    /// Missing keys fail the merge with [`Error::UnknownKey`].
    RejectMissing,
}

/// Outcome of a single [`Fallback`] handler.
pub enum FallbackOutcome {
    /// The handler produced the merged value.
    Replace(Value),

    /// The handler does not apply, the incoming value is handed back for
    /// the next handler in the chain.
    Decline(Value),
}

/// A fallback handler consulted when neither the sequence nor the mapping
/// strategy applies at a path.
pub type Fallback = fn(&Value, Value) -> FallbackOutcome;

/// Tie-break for string values carrying a rendering-style tag: the content
/// is always taken from the incoming value, the tag from the incoming value
/// if it carries one, otherwise from the base.
pub fn styled_str_fallback(base: &Value, incoming: Value) -> FallbackOutcome {
    let (Value::String(base_str), Value::String(incoming_str)) = (base, &incoming) else {
        return FallbackOutcome::Decline(incoming);
    };
    let style = if incoming_str.style().is_tagged() {
        incoming_str.style()
    } else {
        base_str.style()
    };
    FallbackOutcome::Replace(Value::String(StyledStr::new(incoming_str.as_str(), style)))
}

/// Replaces the base with the incoming value when both are of the same kind.
pub fn override_fallback(base: &Value, incoming: Value) -> FallbackOutcome {
    if base.kind() == incoming.kind() {
        FallbackOutcome::Replace(incoming)
    } else {
        FallbackOutcome::Decline(incoming)
    }
}

/// The deep-merge engine.
///
/// A `Merger` is an immutable strategy configuration; the common ones are
/// available through [`Merger::permissive`] and [`Merger::strict`], or the
/// [`merge`] and [`merge_strict`] shorthands.
#[derive(Clone)]
pub struct Merger {
    map_strategy: MapStrategy,
    fallbacks: Vec<Fallback>,
}

impl Default for Merger {
    fn default() -> Self {
        Self::permissive()
    }
}

impl Merger {
    /// A merger that creates mapping keys missing from the base.
    pub fn permissive() -> Self {
        Self {
            map_strategy: MapStrategy::CreateMissing,
            fallbacks: vec![styled_str_fallback, override_fallback],
        }
    }

    /// A merger that rejects mapping keys missing from the base.
    pub fn strict() -> Self {
        Self {
            map_strategy: MapStrategy::RejectMissing,
            ..Self::permissive()
        }
    }

    /// Replaces the fallback chain. Handlers are consulted in order.
    pub fn with_fallbacks(mut self, fallbacks: Vec<Fallback>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    /// Deep-merges `incoming` into `base`, mutating `base`.
    ///
    /// Key order in the result follows the insertion order of `base`,
    /// extended by new keys in `incoming` order. Sequences have no
    /// positional merge, incoming elements are appended after the base
    /// elements, duplicates included.
    pub fn merge(&self, base: &mut Value, incoming: Value) -> Result<()> {
        trace!(strategy = ?self.map_strategy, "deep merging trees");
        self.merge_value(&mut Vec::new(), base, incoming)
    }

    fn merge_value(&self, path: &mut Vec<String>, base: &mut Value, incoming: Value) -> Result<()> {
        // A conditional base is substituted with its resolved value before
        // any strategy applies. Disabled wrappers collapse to an empty
        // container matching the shape of their payload.
        if let Value::Conditional(conditional) = &*base {
            let substituted = substituted(conditional)?;
            *base = substituted;
        }

        match (base, incoming) {
            (Value::Sequence(base_seq), Value::Sequence(incoming_seq)) => {
                base_seq.extend(incoming_seq);
                Ok(())
            }
            (Value::Mapping(base_map), Value::Mapping(incoming_map)) => {
                self.merge_mapping(path, base_map, incoming_map)
            }
            (base, mut incoming) => {
                for fallback in &self.fallbacks {
                    match fallback(&*base, incoming) {
                        FallbackOutcome::Replace(merged) => {
                            *base = merged;
                            return Ok(());
                        }
                        FallbackOutcome::Decline(declined) => incoming = declined,
                    }
                }
                TypeConflictSnafu {
                    path: path.join("."),
                    base: base.kind(),
                    incoming: incoming.kind(),
                }
                .fail()
            }
        }
    }

    fn merge_mapping(
        &self,
        path: &mut Vec<String>,
        base: &mut Mapping,
        incoming: Mapping,
    ) -> Result<()> {
        // Strict mode validates every incoming key at this level before
        // merging any of them.
        if self.map_strategy == MapStrategy::RejectMissing {
            for key in incoming.keys() {
                if !base.contains_key(key) {
                    let mut segments = path.clone();
                    segments.push(key.clone());
                    return UnknownKeySnafu {
                        path: segments.join("."),
                    }
                    .fail();
                }
            }
        }

        for (key, incoming_value) in incoming {
            match base.entry(key) {
                Entry::Occupied(mut entry) => {
                    path.push(entry.key().clone());
                    self.merge_value(path, entry.get_mut(), incoming_value)?;
                    path.pop();
                }
                Entry::Vacant(entry) => {
                    entry.insert(incoming_value);
                }
            }
        }
        Ok(())
    }
}

/// Deep-merges `incoming` into `base`, creating keys missing from `base`.
pub fn merge(base: &mut Value, incoming: Value) -> Result<()> {
    Merger::permissive().merge(base, incoming)
}

/// Deep-merges `incoming` into `base`, failing on keys missing from `base`.
pub fn merge_strict(base: &mut Value, incoming: Value) -> Result<()> {
    Merger::strict().merge(base, incoming)
}

fn substituted(conditional: &Conditional) -> Result<Value> {
    if !conditional.is_enabled() {
        return Ok(empty_like(conditional.payload()));
    }
    let mut value = conditional.value()?;
    loop {
        match value {
            Value::Conditional(inner) => {
                if !inner.is_enabled() {
                    return Ok(empty_like(inner.payload()));
                }
                value = inner.value()?;
            }
            other => return Ok(other),
        }
    }
}

fn empty_like(payload: Option<&Value>) -> Value {
    match payload {
        Some(Value::Mapping(_)) => Value::Mapping(Mapping::new()),
        Some(Value::Sequence(_)) => Value::Sequence(Sequence::new()),
        _ => Value::Null,
    }
}
