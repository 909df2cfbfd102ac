//! epub_validator -- EPUB conformance validator
//!
//! Checks zip-packaged or expanded EPUB publications, or single resources,
//! for structural and semantic conformance.
//!
//! A run goes through these layers, leaves first:
//! path/URL normalization ([`path`]), the container resource model
//! ([`container`]), the immutable per-resource [`context`], predicate-driven
//! schema chain selection ([`schema`]), the XML event pipeline ([`xml`]),
//! content checker dispatch ([`checker`]) and the two-phase cross-reference
//! registry ([`xref`]). [`validate`] ties them together.
//!
//! # Features
//!
//! - `async` -- tokio-based file reading helper
//! - `parallel` -- check resources on the rayon thread pool
//! - `cli` -- the `epub-validator` binary

#![warn(missing_docs)]
#![deny(clippy::large_enum_variant, clippy::large_stack_arrays, clippy::redundant_clone)]
#![warn(
    clippy::box_collection,
    clippy::needless_collect,
    clippy::map_clone,
    clippy::implicit_clone,
    clippy::inefficient_to_string
)]

pub mod checker;
pub mod container;
pub mod context;
pub mod css;
pub mod encryption;
pub mod error;
pub mod media;
pub mod ocf;
pub mod path;
pub mod report;
pub mod schema;
pub mod validate;
pub mod xml;
pub mod xref;
pub mod zip;

#[cfg(feature = "async")]
pub mod async_api;

// Re-export key types for convenience
#[cfg(feature = "async")]
pub use async_api::{validate_epub_file_async, validate_epub_file_async_with_options};
pub use checker::{dispatch, Checker};
pub use container::{Container, ResourceOpener, ResourceProvider};
pub use context::{EpubVersion, PublicationType, ValidationContext, ValidationProfile};
pub use error::{EpubError, PathError, ZipError, ZipErrorKind};
pub use path::{normalize_path, resolve_relative_reference};
pub use report::{
    Location, ReportCollector, ReportSink, ValidationDiagnostic, ValidationReport,
    ValidationSeverity,
};
pub use schema::{SchemaTable, SchemaValidator, Violation};
pub use validate::{
    validate_directory, validate_epub_file, validate_epub_file_with_options, validate_epub_reader,
    validate_path, validate_single_bytes, validate_single_file, ValidationMode, ValidationOptions,
};
pub use xref::{ReferenceKind, XRefRegistry};
pub use zip::ZipLimits;
