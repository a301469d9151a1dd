//! Generation core for declarative Kubernetes manifest trees.
//!
//! The crate is built around three cooperating engines:
//!
//! - [`merge`] deep-merges nested mapping/sequence trees under per-kind
//!   strategies with an extensible fallback chain.
//! - [`options`] resolves a dotted configuration namespace against an
//!   optional declared [`schema`], following root references, defaults and
//!   deferred computations.
//! - [`conditional`] resolves conditionally-absent values out of trees
//!   before they are rendered.
//!
//! Everything downstream (builders, renderers, CLIs) consumes cleaned
//! [`value::Value`] trees and resolved option values only.

pub mod conditional;
pub mod document;
pub mod merge;
pub mod options;
pub mod patch;
pub mod schema;
pub mod value;
pub mod yaml;

// External re-exports
pub use indexmap;
