//! The document tree model shared by all engines.
//!
//! A [`Value`] is a JSON-compatible tree of scalars, sequences and
//! insertion-ordered mappings, extended with [`Conditional`] wrappers,
//! option [`Placeholder`]s and rendering-style string tags. The extensions
//! are opaque to consumers and must be resolved out of a tree before it is
//! serialized.

use indexmap::IndexMap;
use serde::ser::{Error as _, Serialize, SerializeMap, SerializeSeq, Serializer};
use snafu::Snafu;
use strum::Display;

use crate::{conditional::Conditional, options::Placeholder};

/// An insertion-ordered mapping of tree nodes.
pub type Mapping = IndexMap<String, Value>;

/// An ordered sequence of tree nodes.
pub type Sequence = Vec<Value>;

/// Raised when a dotted path does not exist in a tree being read.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(display("could not find option {name:?}"))]
pub struct PathError {
    name: String,
}

/// A node in a document tree.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(StyledStr),
    Sequence(Sequence),
    Mapping(Mapping),
    /// A value that may be conditionally absent, see [`Conditional`].
    Conditional(Box<Conditional>),
    /// A deferred option value, only meaningful inside an option store.
    Placeholder(Placeholder),
}

/// The runtime kind of a [`Value`], used for type checks and diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    String,
    Sequence,
    Mapping,
    Conditional,
    Placeholder,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::String(_) => ValueKind::String,
            Self::Sequence(_) => ValueKind::Sequence,
            Self::Mapping(_) => ValueKind::Mapping,
            Self::Conditional(_) => ValueKind::Conditional,
            Self::Placeholder(_) => ValueKind::Placeholder,
        }
    }

    /// Creates a string node with an explicit rendering style.
    pub fn styled(value: impl Into<String>, style: StrStyle) -> Self {
        Self::String(StyledStr::new(value, style))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Self::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            Self::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Sequence> {
        match self {
            Self::Sequence(sequence) => Some(sequence),
            _ => None,
        }
    }

    /// Reads a value through nested mappings using a dotted accessor string
    /// (for example `config.service_port`).
    ///
    /// There is no escaping mechanism, keys containing literal dots cannot
    /// be addressed.
    pub fn get_path(&self, name: &str) -> Result<&Value, PathError> {
        let mut current = self;
        for segment in name.split('.') {
            let Self::Mapping(mapping) = current else {
                return PathSnafu { name }.fail();
            };
            current = match mapping.get(segment) {
                Some(value) => value,
                None => return PathSnafu { name }.fail(),
            };
        }
        Ok(current)
    }

    /// Checks whether a dotted accessor string exists in this tree.
    pub fn has_path(&self, name: &str) -> bool {
        self.get_path(name).is_ok()
    }

    /// Flattens nested mappings into a single-level mapping with dotted keys.
    ///
    /// Non-mapping values (including this one, if it is not a mapping) are
    /// kept as-is.
    pub fn flatten(&self) -> Mapping {
        fn walk(prefix: &str, mapping: &Mapping, out: &mut Mapping) {
            for (key, value) in mapping {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                if let Value::Mapping(nested) = value {
                    walk(&path, nested, out);
                } else {
                    out.insert(path, value.clone());
                }
            }
        }

        let mut out = Mapping::new();
        if let Self::Mapping(mapping) = self {
            walk("", mapping, &mut out);
        }
        out
    }
}

/// A string carrying a rendering-style tag.
///
/// The style is a hint for downstream renderers (quoting or block style in
/// YAML output) and is ignored by every engine except the merge tie-break
/// for string values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StyledStr {
    style: StrStyle,
    value: String,
}

impl StyledStr {
    pub fn new(value: impl Into<String>, style: StrStyle) -> Self {
        Self {
            style,
            value: value.into(),
        }
    }

    pub fn plain(value: impl Into<String>) -> Self {
        Self::new(value, StrStyle::Plain)
    }

    pub fn style(&self) -> StrStyle {
        self.style
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_string(self) -> String {
        self.value
    }
}

/// Rendering style of a string node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum StrStyle {
    #[default]
    Plain,
    Quoted,
    SingleQuoted,
    DoubleQuoted,
    Folded,
    Literal,
}

impl StrStyle {
    /// Whether this style is an explicit tag rather than the default.
    pub fn is_tagged(self) -> bool {
        !matches!(self, Self::Plain)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(StyledStr::plain(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(StyledStr::plain(value))
    }
}

impl From<StyledStr> for Value {
    fn from(value: StyledStr) -> Self {
        Self::String(value)
    }
}

impl From<Sequence> for Value {
    fn from(value: Sequence) -> Self {
        Self::Sequence(value)
    }
}

impl From<Mapping> for Value {
    fn from(value: Mapping) -> Self {
        Self::Mapping(value)
    }
}

impl From<Conditional> for Value {
    fn from(value: Conditional) -> Self {
        Self::Conditional(Box::new(value))
    }
}

impl From<Placeholder> for Value {
    fn from(value: Placeholder) -> Self {
        Self::Placeholder(value)
    }
}

impl FromIterator<(String, Value)> for Value {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self::Mapping(iter.into_iter().collect())
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::Sequence(iter.into_iter().collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(value) => Self::Bool(value),
            serde_json::Value::Number(number) => {
                if let Some(value) = number.as_i64() {
                    Self::Int(value)
                } else if let Some(value) = number.as_f64() {
                    Self::Float(value)
                } else {
                    Self::Null
                }
            }
            serde_json::Value::String(value) => Self::String(StyledStr::plain(value)),
            serde_json::Value::Array(values) => {
                Self::Sequence(values.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(entries) => Self::Mapping(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(value) => serializer.serialize_bool(*value),
            Self::Int(value) => serializer.serialize_i64(*value),
            Self::Float(value) => serializer.serialize_f64(*value),
            Self::String(value) => serializer.serialize_str(value.as_str()),
            Self::Sequence(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for value in values {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
            Self::Mapping(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Self::Conditional(_) => Err(S::Error::custom(
                "cannot serialize an unresolved conditional value, clean the tree first",
            )),
            Self::Placeholder(_) => Err(S::Error::custom(
                "cannot serialize an unresolved option placeholder",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::conditional::Conditional;

    fn tree() -> Value {
        Value::from(json!({
            "config": {
                "service_port": 8080,
                "listeners": ["http", "https"],
            },
        }))
    }

    #[test]
    fn get_path_walks_nested_mappings() {
        let tree = tree();
        assert_eq!(
            tree.get_path("config.service_port").unwrap(),
            &Value::Int(8080)
        );
        assert!(tree.has_path("config.listeners"));
    }

    #[test]
    fn get_path_fails_on_missing_segment() {
        let tree = tree();
        let err = tree.get_path("config.missing").unwrap_err();
        assert_eq!(
            err.to_string(),
            "could not find option \"config.missing\""
        );
        assert!(!tree.has_path("config.missing"));
    }

    #[test]
    fn get_path_fails_on_non_mapping_intermediate() {
        let tree = tree();
        assert!(tree.get_path("config.service_port.inner").is_err());
        assert!(!tree.has_path("config.listeners.0"));
    }

    #[test]
    fn flatten_produces_dotted_keys() {
        let flat = tree().flatten();
        assert_eq!(
            flat.keys().collect::<Vec<_>>(),
            ["config.service_port", "config.listeners"]
        );
    }

    #[test]
    fn json_numbers_map_to_int_and_float() {
        assert_eq!(Value::from(json!(23)), Value::Int(23));
        assert_eq!(Value::from(json!(1.5)), Value::Float(1.5));
    }

    #[test]
    fn serialize_plain_tree() {
        let yaml = serde_yaml::to_string(&tree()).unwrap();
        assert_eq!(
            yaml,
            "config:\n  service_port: 8080\n  listeners:\n  - http\n  - https\n"
        );
    }

    #[test]
    fn serialize_refuses_conditional_nodes() {
        let tree = Value::from_iter([(
            "key".to_owned(),
            Value::from(Conditional::enabled(Value::from("value"))),
        )]);
        assert!(serde_yaml::to_string(&tree).is_err());
    }

    #[test]
    fn styled_str_keeps_its_tag() {
        let value = Value::styled("quote me", StrStyle::SingleQuoted);
        let Value::String(inner) = &value else {
            panic!("expected a string node");
        };
        assert_eq!(inner.style(), StrStyle::SingleQuoted);
        assert_eq!(value.as_str(), Some("quote me"));
        assert_eq!(StrStyle::SingleQuoted.to_string(), "single-quoted");
    }
}
