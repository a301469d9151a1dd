//! Named documents, the unit the patch engine operates on.

use snafu::{ResultExt, Snafu};

use crate::{conditional, value::Value};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to clean the document body"))]
    CleanBody { source: conditional::Error },
}

/// A single generated document (a Pod, StatefulSet, Secret and so on)
/// together with the metadata used to locate it when applying patches.
///
/// The body is cleaned of conditional wrappers on construction. A document
/// without any metadata behaves as a raw tree: filters constraining name,
/// source or instance can never accept it.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    name: Option<String>,
    source: Option<String>,
    instance: Option<String>,
    body: Value,
}

impl Document {
    pub fn new(body: impl Into<Value>) -> Result<Self, Error> {
        let mut body = body.into();
        conditional::clean_tree(&mut body).context(CleanBodySnafu)?;
        Ok(Self {
            name: None,
            source: None,
            instance: None,
            body,
        })
    }

    /// The internal name used to locate the document.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The origin of the document, normally the builder name.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// A possibly unique instance name, normally a builder basename.
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Value {
        &mut self.body
    }

    pub fn into_body(self) -> Value {
        self.body
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::conditional::Conditional;

    #[test]
    fn construction_cleans_the_body() {
        let document = Document::new(Value::from_iter([
            ("keep".to_owned(), Value::from(Conditional::enabled(Value::Int(1)))),
            ("drop".to_owned(), Value::from(Conditional::disabled(Value::Int(2)))),
        ]))
        .unwrap();
        assert_eq!(document.body(), &Value::from(json!({"keep": 1})));
    }

    #[test]
    fn metadata_builders_accumulate() {
        let document = Document::new(Value::from(json!({})))
            .unwrap()
            .with_name("x")
            .with_source("y")
            .with_instance("z");
        assert_eq!(document.name(), Some("x"));
        assert_eq!(document.source(), Some("y"));
        assert_eq!(document.instance(), Some("z"));
    }
}
