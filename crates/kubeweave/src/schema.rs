//! Declarative schemas for option stores.
//!
//! A [`Schema`] mirrors the dotted option namespace: internal nodes are
//! namespaces, leaves are [`OptionDef`] definitions declaring required-ness,
//! a default value, the allowed value kinds and a format tag.

use indexmap::IndexMap;
use strum::Display;

use crate::value::{Value, ValueKind};

/// A node in an option schema.
#[derive(Clone, Debug, PartialEq)]
pub enum Schema {
    /// A nested namespace of further schema nodes.
    Namespace(IndexMap<String, Schema>),

    /// A declared option.
    Def(OptionDef),
}

impl Schema {
    pub fn namespace<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Schema)>,
    {
        Self::Namespace(
            entries
                .into_iter()
                .map(|(key, schema)| (key.into(), schema))
                .collect(),
        )
    }

    /// Descends through namespaces using a dotted accessor string.
    ///
    /// Returns [`None`] when a segment is missing or when the path descends
    /// into a definition leaf.
    pub fn lookup(&self, name: &str) -> Option<&Schema> {
        let mut current = self;
        for segment in name.split('.') {
            match current {
                Self::Namespace(entries) => current = entries.get(segment)?,
                Self::Def(_) => return None,
            }
        }
        Some(current)
    }
}

impl From<OptionDef> for Schema {
    fn from(definition: OptionDef) -> Self {
        Self::Def(definition)
    }
}

/// The declaration of a single option.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OptionDef {
    required: bool,
    default_value: Value,
    allowed_types: Option<Vec<ValueKind>>,
    format: OptionFormat,
}

impl OptionDef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the option as required: resolving it to null is an error.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// The value used when no override is present.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = value.into();
        self
    }

    /// Restricts the resolved value to the given kinds. Null is additionally
    /// allowed for options that are not required.
    pub fn with_allowed_types(mut self, kinds: impl IntoIterator<Item = ValueKind>) -> Self {
        self.allowed_types = Some(kinds.into_iter().collect());
        self
    }

    pub fn with_format(mut self, format: OptionFormat) -> Self {
        self.format = format;
        self
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default_value(&self) -> &Value {
        &self.default_value
    }

    pub fn allowed_types(&self) -> Option<&[ValueKind]> {
        self.allowed_types.as_deref()
    }

    pub fn format(&self) -> OptionFormat {
        self.format
    }
}

/// Documents that an option carries a value with special downstream
/// treatment, for example a container environment or volume reference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum OptionFormat {
    #[default]
    Generic,
    EnvReference,
    VolumeReference,
}

impl OptionFormat {
    /// Whether the option value is a reference into generated resources.
    pub fn is_reference(self) -> bool {
        matches!(self, Self::EnvReference | Self::VolumeReference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::namespace([(
            "config",
            Schema::namespace([
                (
                    "service_port",
                    Schema::from(OptionDef::new().with_default(8080)),
                ),
                (
                    "node_name",
                    Schema::from(OptionDef::new().required()),
                ),
            ]),
        )])
    }

    #[test]
    fn lookup_descends_namespaces() {
        let schema = schema();
        assert!(matches!(
            schema.lookup("config.service_port"),
            Some(Schema::Def(_))
        ));
        assert!(matches!(schema.lookup("config"), Some(Schema::Namespace(_))));
    }

    #[test]
    fn lookup_fails_on_missing_or_leaf_descent() {
        let schema = schema();
        assert!(schema.lookup("config.other").is_none());
        assert!(schema.lookup("config.service_port.inner").is_none());
    }

    #[test]
    fn definition_builder_accumulates() {
        let definition = OptionDef::new()
            .required()
            .with_default("baz")
            .with_allowed_types([ValueKind::String, ValueKind::Int])
            .with_format(OptionFormat::EnvReference);
        assert!(definition.is_required());
        assert_eq!(definition.default_value(), &Value::from("baz"));
        assert_eq!(
            definition.allowed_types(),
            Some([ValueKind::String, ValueKind::Int].as_slice())
        );
        assert!(definition.format().is_reference());
    }
}
