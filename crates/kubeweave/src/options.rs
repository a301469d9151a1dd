//! Option stores and the resolution of dotted option paths.
//!
//! An [`Options`] store holds a tree of concrete overrides, optionally bound
//! to a [`Schema`]. Binding a schema closes the option set: construction
//! fails if the overrides contain a path the schema does not declare.
//!
//! [`Options::resolve`] turns a dotted path into a final value, following
//! root-store references, default values, deferred computations and
//! conditional wrappers, and type-checking the result against the schema.

use std::sync::Arc;

use educe::Educe;
use snafu::{OptionExt, Snafu};
use tracing::trace;

use crate::{
    conditional,
    schema::{OptionDef, Schema},
    value::{Mapping, Value, ValueKind},
};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    /// An override path is not declared by the schema.
    #[snafu(display("unknown option {path:?}"))]
    UnknownOption { path: String },

    #[snafu(display("could not find option {name:?}"))]
    NotFound { name: String },

    /// The schema path exists but is a namespace, not a definition.
    #[snafu(display("option {name:?} does not refer to an option definition"))]
    InvalidDefinition { name: String },

    #[snafu(display("option {name:?} is required"))]
    Required { name: String },

    #[snafu(display(
        "type \"{found}\" for option {name:?} is not in the allowed types ({allowed})"
    ))]
    NotAllowedType {
        name: String,
        found: ValueKind,
        allowed: String,
    },

    #[snafu(display("option {name:?} references the root options, but none were provided"))]
    NoRootOptions { name: String },

    #[snafu(display("failed to resolve the value of option {name:?}"))]
    ResolveValue {
        name: String,
        source: conditional::Error,
    },
}

/// The signature of a deferred option computation. Called with the dotted
/// option name and the schema definition for that path, if any.
pub type ComputedFn = Arc<dyn Fn(&str, Option<&OptionDef>) -> Value + Send + Sync>;

/// A deferred option value inside a store's override tree.
#[derive(Clone, Educe)]
#[educe(Debug, PartialEq)]
pub enum Placeholder {
    /// Resolves by looking up `name` in the root store.
    Root { name: String },

    /// Resolves to the definition's default value.
    Default,

    /// Resolves by calling a function with the option name and definition.
    Computed(#[educe(Debug(ignore), PartialEq(ignore))] ComputedFn),
}

impl Placeholder {
    pub fn root(name: impl Into<String>) -> Self {
        Self::Root { name: name.into() }
    }

    pub fn computed<F>(compute: F) -> Self
    where
        F: Fn(&str, Option<&OptionDef>) -> Value + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(compute))
    }
}

/// A configuration store: a tree of overrides plus an optional schema.
///
/// Stores are read-only after construction.
#[derive(Clone, Debug, PartialEq)]
pub struct Options {
    schema: Option<Schema>,
    values: Value,
}

impl Options {
    /// Creates a schema-less store. Any dotted path present in the tree can
    /// be read, nothing is validated.
    pub fn new(values: impl Into<Value>) -> Self {
        Self {
            schema: None,
            values: values.into(),
        }
    }

    /// Creates a schema-bound store.
    ///
    /// Every path in `values` must be declared in the schema; descent stops
    /// at definition leaves, so the tree below a declared option is opaque.
    /// Value types are not checked here, that happens at resolution time.
    pub fn with_schema(schema: Schema, values: impl Into<Value>) -> Result<Self> {
        let values = values.into();
        if let (Schema::Namespace(namespace), Value::Mapping(mapping)) = (&schema, &values) {
            check_values(&mut Vec::new(), namespace, mapping)?;
        }
        Ok(Self {
            schema: Some(schema),
            values,
        })
    }

    /// Reads an option value by dotted name.
    ///
    /// On a schema-bound store a missing override falls back to the
    /// definition's default value. No placeholder or conditional processing
    /// happens here.
    pub fn value_get(&self, name: &str) -> Result<Value> {
        match &self.schema {
            None => Ok(self
                .values
                .get_path(name)
                .ok()
                .context(NotFoundSnafu { name })?
                .clone()),
            Some(schema) => {
                let definition = definition(schema, name)?;
                match self.override_value(name) {
                    Some(value) => Ok(value.clone()),
                    None => Ok(definition.default_value().clone()),
                }
            }
        }
    }

    /// Resolves an option to its final plain value.
    ///
    /// This is the main entry point for builders: the result has passed
    /// type validation and all conditional wrappers are resolved out of it
    /// (a disabled value resolves to null). The store itself is never
    /// mutated, cleaning happens on a copy.
    pub fn resolve(&self, name: &str, root: Option<&Options>) -> Result<Value> {
        let raw = self.resolve_raw(name, root)?;
        conditional::resolve(&raw, false)
            .and_then(|value| conditional::cleaned(&value))
            .map_err(|source| Error::ResolveValue {
                name: name.to_owned(),
                source,
            })
    }

    /// Like [`Options::resolve`], but returns the value before conditional
    /// resolution, so callers can inspect the wrapper itself.
    pub fn resolve_raw(&self, name: &str, root: Option<&Options>) -> Result<Value> {
        let definition = match &self.schema {
            Some(schema) => Some(definition(schema, name)?),
            None => None,
        };

        let mut value = self.override_value(name).cloned();
        if value.is_none() && definition.is_none() {
            return NotFoundSnafu { name }.fail();
        }

        // Root dereference.
        let root_name = match &value {
            Some(Value::Placeholder(Placeholder::Root { name })) => Some(name.clone()),
            _ => None,
        };
        if let Some(root_name) = root_name {
            let root = root.context(NoRootOptionsSnafu { name })?;
            value = Some(root.value_get(&root_name)?);
        }

        // Default and computed substitution. A missing override means the
        // definition acts as its own unset marker.
        let value = match value {
            None | Some(Value::Placeholder(Placeholder::Default)) => match definition {
                Some(definition) => definition.default_value().clone(),
                None => Value::Null,
            },
            Some(Value::Placeholder(Placeholder::Computed(compute))) => compute(name, definition),
            Some(value) => value,
        };

        // Type validation. Conditional wrappers are exempt, their payload
        // is only known after resolution.
        if !matches!(value, Value::Conditional(_)) {
            if let Some(definition) = definition {
                check_allowed(name, &value, definition)?;
            }
        }

        trace!(option = name, kind = %value.kind(), "resolved option");
        Ok(value)
    }

    fn override_value(&self, name: &str) -> Option<&Value> {
        self.values.get_path(name).ok()
    }
}

fn definition<'a>(schema: &'a Schema, name: &str) -> Result<&'a OptionDef> {
    match schema.lookup(name) {
        Some(Schema::Def(definition)) => Ok(definition),
        Some(Schema::Namespace(_)) => InvalidDefinitionSnafu { name }.fail(),
        None => NotFoundSnafu { name }.fail(),
    }
}

fn check_values(
    path: &mut Vec<String>,
    schema: &indexmap::IndexMap<String, Schema>,
    values: &Mapping,
) -> Result<()> {
    for (key, value) in values {
        match schema.get(key) {
            None => {
                let mut segments = path.clone();
                segments.push(key.clone());
                return UnknownOptionSnafu {
                    path: segments.join("."),
                }
                .fail();
            }
            Some(Schema::Def(_)) => {}
            Some(Schema::Namespace(namespace)) => {
                if let Value::Mapping(nested) = value {
                    path.push(key.clone());
                    check_values(path, namespace, nested)?;
                    path.pop();
                }
            }
        }
    }
    Ok(())
}

fn check_allowed(name: &str, value: &Value, definition: &OptionDef) -> Result<()> {
    let allowed = definition.allowed_types();
    let permitted = if value.is_null() {
        !definition.is_required()
    } else {
        match allowed {
            None => true,
            Some(kinds) => kinds.contains(&value.kind()),
        }
    };
    if permitted {
        return Ok(());
    }

    if allowed.is_none() || (value.is_null() && definition.is_required()) {
        return RequiredSnafu { name }.fail();
    }

    let mut names = Vec::new();
    if !definition.is_required() {
        names.push(format!("\"{}\"", ValueKind::Null));
    }
    names.extend(
        allowed
            .unwrap_or_default()
            .iter()
            .map(|kind| format!("\"{kind}\"")),
    );
    NotAllowedTypeSnafu {
        name,
        found: value.kind(),
        allowed: names.join(", "),
    }
    .fail()
}
