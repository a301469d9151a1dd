//! Utility functions for writing generated trees in the YAML file format.
//!
//! Trees must be cleaned of conditional wrappers before they reach this
//! boundary, serialization fails otherwise.

use std::io::Write;

use serde::ser;
use snafu::{ResultExt, Snafu};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to serialize YAML"))]
    SerializeYaml { source: serde_yaml::Error },

    #[snafu(display("failed to write YAML document separator"))]
    WriteDocumentSeparator { source: std::io::Error },
}

/// Serializes the given tree as an explicit YAML document (prefixed with
/// the `---` separator) and writes it to a [`Write`].
pub fn serialize_to_explicit_document<T, W>(mut writer: W, value: &T) -> Result<()>
where
    T: ser::Serialize,
    W: Write,
{
    writer
        .write_all(b"---\n")
        .context(WriteDocumentSeparatorSnafu)?;
    serde_yaml::to_writer(writer, value).context(SerializeYamlSnafu)
}

/// Serializes the given tree as an explicit YAML document string.
pub fn to_explicit_document_string<T: ser::Serialize>(value: &T) -> Result<String> {
    let body = serde_yaml::to_string(value).context(SerializeYamlSnafu)?;
    Ok(format!("---\n{body}"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{conditional::Conditional, value::Value};

    #[test]
    fn writes_an_explicit_document() {
        let tree = Value::from(json!({"apiVersion": "v1", "kind": "ConfigMap"}));
        assert_eq!(
            to_explicit_document_string(&tree).unwrap(),
            "---\napiVersion: v1\nkind: ConfigMap\n"
        );

        let mut buffer = Vec::new();
        serialize_to_explicit_document(&mut buffer, &tree).unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "---\napiVersion: v1\nkind: ConfigMap\n"
        );
    }

    #[test]
    fn uncleaned_trees_are_rejected() {
        let tree = Value::from_iter([(
            "key".to_owned(),
            Value::from(Conditional::disabled(Value::Int(1))),
        )]);
        let err = to_explicit_document_string(&tree).unwrap_err();
        assert!(matches!(err, Error::SerializeYaml { .. }));
    }
}
