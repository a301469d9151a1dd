//! Filtered patch application on generated documents.
//!
//! Patches follow the JSON-Patch operation format (`op`, `path`, `value`)
//! with one extension: a `merge` op that deep-merges its value into the
//! target instead of overwriting it. A [`FilteredPatch`] couples a list of
//! operations with the filters selecting the documents to patch.

use std::{fmt, sync::Arc};

use educe::Educe;
use serde::{Deserialize, Deserializer, de};
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::debug;

use crate::{
    document::Document,
    merge::{self, Merger},
    value::{Value, ValueKind},
};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("invalid patch pointer {pointer:?}"))]
    InvalidPointer { pointer: String },

    #[snafu(display("invalid patch at {pointer:?}"))]
    Apply {
        pointer: String,
        source: PointerError,
    },

    #[snafu(display("failed to merge patch value at {pointer:?}"))]
    MergeValue {
        pointer: String,
        source: merge::Error,
    },
}

/// A failure while resolving a pointer against a document tree.
#[derive(Debug, Snafu)]
pub enum PointerError {
    #[snafu(display("no value at segment {segment:?}"))]
    NotFound { segment: String },

    #[snafu(display("segment {segment:?} is not a sequence index"))]
    InvalidIndex { segment: String },

    #[snafu(display("index {index} is out of bounds (sequence length {len})"))]
    OutOfBounds { index: usize, len: usize },

    #[snafu(display("cannot index into a {kind} value"))]
    Unindexable { kind: ValueKind },

    #[snafu(display("cannot remove the whole document"))]
    RootRemoval,
}

/// A parsed JSON-Pointer (RFC 6901).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pointer {
    raw: String,
    segments: Vec<String>,
}

impl Pointer {
    pub fn parse(pointer: &str) -> Result<Self> {
        if pointer.is_empty() {
            return Ok(Self {
                raw: String::new(),
                segments: Vec::new(),
            });
        }
        let Some(rest) = pointer.strip_prefix('/') else {
            return InvalidPointerSnafu { pointer }.fail();
        };
        let segments = rest
            .split('/')
            .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
            .collect();
        Ok(Self {
            raw: pointer.to_owned(),
            segments,
        })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A single patch operation.
#[derive(Clone, Debug, PartialEq)]
pub enum PatchOp {
    Add { path: Pointer, value: Value },
    Replace { path: Pointer, value: Value },
    Remove { path: Pointer },
    Merge { path: Pointer, value: Value },
}

impl PatchOp {
    pub fn add(path: &str, value: impl Into<Value>) -> Result<Self> {
        Ok(Self::Add {
            path: Pointer::parse(path)?,
            value: value.into(),
        })
    }

    pub fn replace(path: &str, value: impl Into<Value>) -> Result<Self> {
        Ok(Self::Replace {
            path: Pointer::parse(path)?,
            value: value.into(),
        })
    }

    pub fn remove(path: &str) -> Result<Self> {
        Ok(Self::Remove {
            path: Pointer::parse(path)?,
        })
    }

    pub fn merge(path: &str, value: impl Into<Value>) -> Result<Self> {
        Ok(Self::Merge {
            path: Pointer::parse(path)?,
            value: value.into(),
        })
    }
}

impl<'de> Deserialize<'de> for PatchOp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct RawOp {
            op: String,
            path: String,
            #[serde(default)]
            value: serde_json::Value,
        }

        let raw = RawOp::deserialize(deserializer)?;
        let path = Pointer::parse(&raw.path).map_err(de::Error::custom)?;
        let value = Value::from(raw.value);
        match raw.op.as_str() {
            "add" => Ok(Self::Add { path, value }),
            "replace" => Ok(Self::Replace { path, value }),
            "remove" => Ok(Self::Remove { path }),
            "merge" => Ok(Self::Merge { path, value }),
            other => Err(de::Error::unknown_variant(
                other,
                &["add", "replace", "remove", "merge"],
            )),
        }
    }
}

/// A predicate selecting documents for patching.
pub type FilterPredicate = Arc<dyn Fn(&Document) -> bool + Send + Sync>;

/// Selects documents by metadata membership and/or predicates.
///
/// All populated metadata fields must match (AND). If predicates are set,
/// at least one of them must accept the document. A filter without any
/// constraints accepts every document; a filter constraining metadata can
/// never accept a document that does not carry that metadata.
#[derive(Clone, Default, Educe)]
#[educe(Debug)]
pub struct Filter {
    names: Option<Vec<String>>,
    sources: Option<Vec<String>>,
    instances: Option<Vec<String>>,
    #[educe(Debug(ignore))]
    predicates: Vec<FilterPredicate>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = Some(sources.into_iter().map(Into::into).collect());
        self
    }

    pub fn instances<I, S>(mut self, instances: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instances = Some(instances.into_iter().map(Into::into).collect());
        self
    }

    pub fn predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Document) -> bool + Send + Sync + 'static,
    {
        self.predicates.push(Arc::new(predicate));
        self
    }

    pub fn accepts(&self, document: &Document) -> bool {
        fn member(constraint: Option<&Vec<String>>, value: Option<&str>) -> bool {
            match constraint {
                None => true,
                Some(items) => value.is_some_and(|value| items.iter().any(|item| item == value)),
            }
        }

        if !member(self.names.as_ref(), document.name())
            || !member(self.sources.as_ref(), document.source())
            || !member(self.instances.as_ref(), document.instance())
        {
            return false;
        }
        if !self.predicates.is_empty() {
            return self.predicates.iter().any(|predicate| predicate(document));
        }
        true
    }
}

/// An ordered list of patch operations plus the filters selecting targets.
///
/// Without filters every document is patched. With filters, a document is
/// patched if at least one filter accepts it.
#[derive(Clone, Debug, Default)]
pub struct FilteredPatch {
    filters: Option<Vec<Filter>>,
    ops: Vec<PatchOp>,
}

impl FilteredPatch {
    pub fn new(ops: impl IntoIterator<Item = PatchOp>) -> Self {
        Self {
            filters: None,
            ops: ops.into_iter().collect(),
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.get_or_insert_with(Vec::new).push(filter);
        self
    }

    pub fn matches(&self, document: &Document) -> bool {
        match &self.filters {
            None => true,
            Some(filters) => filters.iter().any(|filter| filter.accepts(document)),
        }
    }
}

/// Applies filtered patches to a set of documents, in place.
///
/// Application is all-or-nothing per document: a failing operation aborts
/// the remaining operations of that patch on that document, already-applied
/// operations are not rolled back, and the error propagates.
pub fn apply(documents: &mut [Document], patches: &[FilteredPatch]) -> Result<()> {
    for document in documents.iter_mut() {
        for patch in patches {
            if !patch.matches(document) {
                continue;
            }
            debug!(name = document.name(), "applying patch operations to document");
            for op in &patch.ops {
                apply_op(document.body_mut(), op)?;
            }
        }
    }
    Ok(())
}

/// Applies a list of operations to a single tree, unfiltered.
pub fn apply_ops(document: &mut Value, ops: &[PatchOp]) -> Result<()> {
    for op in ops {
        apply_op(document, op)?;
    }
    Ok(())
}

/// Applies one operation to a tree.
pub fn apply_op(document: &mut Value, op: &PatchOp) -> Result<()> {
    match op {
        PatchOp::Add { path, value } => {
            add(document, path, value.clone()).context(ApplySnafu { pointer: &path.raw })
        }
        PatchOp::Replace { path, value } => {
            replace(document, path, value.clone()).context(ApplySnafu { pointer: &path.raw })
        }
        PatchOp::Remove { path } => {
            remove(document, path).context(ApplySnafu { pointer: &path.raw })
        }
        PatchOp::Merge { path, value } => {
            let target = descend(document, &path.segments).context(ApplySnafu {
                pointer: &path.raw,
            })?;
            Merger::permissive()
                .merge(target, value.clone())
                .context(MergeValueSnafu { pointer: &path.raw })
        }
    }
}

fn descend<'a>(
    mut current: &'a mut Value,
    segments: &[String],
) -> std::result::Result<&'a mut Value, PointerError> {
    for segment in segments {
        current = match current {
            Value::Mapping(mapping) => mapping
                .get_mut(segment)
                .context(NotFoundSnafu { segment })?,
            Value::Sequence(sequence) => {
                let index = parse_index(segment)?;
                let len = sequence.len();
                sequence
                    .get_mut(index)
                    .context(OutOfBoundsSnafu { index, len })?
            }
            other => return UnindexableSnafu { kind: other.kind() }.fail(),
        };
    }
    Ok(current)
}

fn parse_index(segment: &str) -> std::result::Result<usize, PointerError> {
    segment
        .parse()
        .ok()
        .context(InvalidIndexSnafu { segment })
}

fn add(document: &mut Value, path: &Pointer, value: Value) -> std::result::Result<(), PointerError> {
    let Some((last, parents)) = path.segments.split_last() else {
        *document = value;
        return Ok(());
    };
    match descend(document, parents)? {
        Value::Mapping(mapping) => {
            mapping.insert(last.clone(), value);
            Ok(())
        }
        Value::Sequence(sequence) => {
            if last == "-" {
                sequence.push(value);
                return Ok(());
            }
            let index = parse_index(last)?;
            let len = sequence.len();
            if index > len {
                return OutOfBoundsSnafu { index, len }.fail();
            }
            sequence.insert(index, value);
            Ok(())
        }
        other => UnindexableSnafu { kind: other.kind() }.fail(),
    }
}

fn replace(
    document: &mut Value,
    path: &Pointer,
    value: Value,
) -> std::result::Result<(), PointerError> {
    let Some((last, parents)) = path.segments.split_last() else {
        *document = value;
        return Ok(());
    };
    match descend(document, parents)? {
        Value::Mapping(mapping) => {
            let slot = mapping.get_mut(last).context(NotFoundSnafu { segment: last })?;
            *slot = value;
            Ok(())
        }
        Value::Sequence(sequence) => {
            let index = parse_index(last)?;
            let len = sequence.len();
            let slot = sequence
                .get_mut(index)
                .context(OutOfBoundsSnafu { index, len })?;
            *slot = value;
            Ok(())
        }
        other => UnindexableSnafu { kind: other.kind() }.fail(),
    }
}

fn remove(document: &mut Value, path: &Pointer) -> std::result::Result<(), PointerError> {
    let Some((last, parents)) = path.segments.split_last() else {
        return RootRemovalSnafu.fail();
    };
    match descend(document, parents)? {
        Value::Mapping(mapping) => {
            mapping
                .shift_remove(last)
                .context(NotFoundSnafu { segment: last })?;
            Ok(())
        }
        Value::Sequence(sequence) => {
            let index = parse_index(last)?;
            let len = sequence.len();
            if index >= len {
                return OutOfBoundsSnafu { index, len }.fail();
            }
            sequence.remove(index);
            Ok(())
        }
        other => UnindexableSnafu { kind: other.kind() }.fail(),
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use serde_json::json;

    use super::*;
    use crate::{
        conditional::Conditional,
        value::StrStyle,
    };

    fn named_document() -> Document {
        Document::new(Value::from(json!({
            "foo": "bar",
            "shin": {"gami": "hai", "shami": "nai"},
        })))
        .unwrap()
        .with_name("x")
        .with_source("y")
        .with_instance("z")
    }

    fn add_tari() -> FilteredPatch {
        FilteredPatch::new([PatchOp::add("/shin/tari", "bai").unwrap()])
    }

    #[test]
    fn patch_applies_to_a_matching_name() {
        let mut documents = vec![named_document()];
        apply(
            &mut documents,
            &[add_tari().with_filter(Filter::new().names(["x"]))],
        )
        .unwrap();
        assert_eq!(
            documents[0].body(),
            &Value::from(json!({
                "foo": "bar",
                "shin": {"gami": "hai", "shami": "nai", "tari": "bai"},
            }))
        );
    }

    #[test]
    fn patch_skips_a_non_matching_name() {
        let mut documents = vec![named_document()];
        let original = documents[0].clone();
        apply(
            &mut documents,
            &[add_tari().with_filter(Filter::new().names(["a"]))],
        )
        .unwrap();
        assert_eq!(documents[0], original);
    }

    #[test]
    fn filter_fields_combine_with_and_semantics() {
        let mut documents = vec![named_document()];
        let original = documents[0].clone();

        // One mismatching field rejects the document.
        apply(
            &mut documents,
            &[add_tari().with_filter(
                Filter::new().names(["a"]).sources(["y"]).instances(["z"]),
            )],
        )
        .unwrap();
        assert_eq!(documents[0], original);

        // All fields matching accepts it.
        apply(
            &mut documents,
            &[add_tari().with_filter(
                Filter::new().names(["x"]).sources(["y"]).instances(["z"]),
            )],
        )
        .unwrap();
        assert!(documents[0].body().has_path("shin.tari"));
    }

    #[test]
    fn filters_combine_with_or_semantics() {
        let mut documents = vec![named_document()];
        apply(
            &mut documents,
            &[add_tari()
                .with_filter(Filter::new().names(["a"]))
                .with_filter(Filter::new().predicate(|document| document.name() == Some("x")))],
        )
        .unwrap();
        assert!(documents[0].body().has_path("shin.tari"));
    }

    #[test]
    fn predicates_require_at_least_one_acceptance() {
        let rejecting = Filter::new()
            .predicate(|document| document.name() == Some("a"))
            .predicate(|document| document.name() == Some("b"));
        assert!(!rejecting.accepts(&named_document()));

        let accepting = Filter::new()
            .predicate(|document| document.name() == Some("a"))
            .predicate(|document| document.name() == Some("x"));
        assert!(accepting.accepts(&named_document()));
    }

    #[test]
    fn an_empty_filter_accepts_everything() {
        assert!(Filter::new().accepts(&named_document()));
        assert!(Filter::new().accepts(&Document::new(Value::from(json!({}))).unwrap()));
    }

    #[test]
    fn metadata_constraints_reject_raw_documents() {
        let raw = Document::new(Value::from(json!({"foo": "bar"}))).unwrap();
        assert!(!Filter::new().names(["x"]).accepts(&raw));
        assert!(!Filter::new().sources(["y"]).accepts(&raw));
        assert!(!Filter::new().instances(["z"]).accepts(&raw));
    }

    #[test]
    fn replace_overwrites_tags_verbatim() {
        // Unlike the merge op, replace carries no tie-break: the incoming
        // value lands as given.
        let mut tree = Value::from_iter([(
            "shin".to_owned(),
            Value::styled("gami", StrStyle::Quoted),
        )]);
        apply_ops(&mut tree, &[PatchOp::replace("/shin", "bai").unwrap()]).unwrap();
        assert_eq!(tree.get_path("shin").unwrap(), &Value::from("bai"));

        let mut tree = Value::from_iter([("shin".to_owned(), Value::from("gami"))]);
        apply_ops(
            &mut tree,
            &[PatchOp::Replace {
                path: Pointer::parse("/shin").unwrap(),
                value: Value::styled("bai", StrStyle::Literal),
            }],
        )
        .unwrap();
        assert_eq!(
            tree.get_path("shin").unwrap(),
            &Value::styled("bai", StrStyle::Literal)
        );
    }

    #[test]
    fn merge_op_uses_the_tie_breaking_merger() {
        let mut tree = Value::from(json!({"shin": {"gami": "hai"}}));
        apply_ops(
            &mut tree,
            &[PatchOp::merge("/shin", Value::from(json!({"tari": "bai"}))).unwrap()],
        )
        .unwrap();
        assert_eq!(
            tree,
            Value::from(json!({"shin": {"gami": "hai", "tari": "bai"}}))
        );
    }

    #[test]
    fn merge_op_substitutes_conditional_targets() {
        let mut tree = Value::from_iter([(
            "shin".to_owned(),
            Value::from(Conditional::enabled(Value::from(json!({"gami": "hai"})))),
        )]);
        apply_ops(
            &mut tree,
            &[PatchOp::merge("/shin", Value::from(json!({"tari": "bai"}))).unwrap()],
        )
        .unwrap();
        assert_eq!(
            tree,
            Value::from(json!({"shin": {"gami": "hai", "tari": "bai"}}))
        );
    }

    #[test]
    fn sequence_ops_insert_append_and_bound_check() {
        let mut tree = Value::from(json!({"ports": [80, 443]}));
        apply_ops(
            &mut tree,
            &[
                PatchOp::add("/ports/1", 8080).unwrap(),
                PatchOp::add("/ports/-", 9090).unwrap(),
            ],
        )
        .unwrap();
        assert_eq!(tree, Value::from(json!({"ports": [80, 8080, 443, 9090]})));

        let err = apply_ops(&mut tree, &[PatchOp::add("/ports/9", 1).unwrap()]).unwrap_err();
        assert!(matches!(err, Error::Apply { .. }));
    }

    #[test]
    fn remove_deletes_keys_and_elements() {
        let mut tree = Value::from(json!({"shin": {"gami": "hai"}, "ports": [80, 443]}));
        apply_ops(
            &mut tree,
            &[
                PatchOp::remove("/shin/gami").unwrap(),
                PatchOp::remove("/ports/0").unwrap(),
            ],
        )
        .unwrap();
        assert_eq!(tree, Value::from(json!({"shin": {}, "ports": [443]})));
    }

    #[test]
    fn a_failing_op_aborts_without_rollback() {
        let mut tree = Value::from(json!({"shin": {}}));
        let err = apply_ops(
            &mut tree,
            &[
                PatchOp::add("/shin/tari", "bai").unwrap(),
                PatchOp::remove("/missing").unwrap(),
                PatchOp::add("/shin/gari", "sai").unwrap(),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Apply { .. }));
        // The first op stays applied, the third was never reached.
        assert_eq!(tree, Value::from(json!({"shin": {"tari": "bai"}})));
    }

    #[test]
    fn pointer_parse_rejects_missing_leading_slash() {
        let err = Pointer::parse("shin/tari").unwrap_err();
        assert!(matches!(err, Error::InvalidPointer { .. }));
    }

    #[test]
    fn pointer_unescapes_rfc6901_sequences() {
        let pointer = Pointer::parse("/a~1b/c~0d").unwrap();
        assert_eq!(pointer.segments, ["a/b", "c~d"]);
    }

    #[test]
    fn patch_ops_deserialize_from_yaml() {
        let ops: Vec<PatchOp> = serde_yaml::from_str(indoc! {"
            - op: add
              path: /shin/tari
              value: bai
            - op: merge
              path: /shin
              value:
                gari: sai
            - op: remove
              path: /foo
        "})
        .unwrap();

        let mut tree = Value::from(json!({"foo": "bar", "shin": {"gami": "hai"}}));
        apply_ops(&mut tree, &ops).unwrap();
        assert_eq!(
            tree,
            Value::from(json!({"shin": {"gami": "hai", "tari": "bai", "gari": "sai"}}))
        );
    }
}
