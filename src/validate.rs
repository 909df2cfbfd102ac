//! Validation runs.
//!
//! A run enumerates the container, reads the package document to learn the
//! EPUB version, checks every resource through [`dispatch`], and resolves
//! all cross-references once every resource has been scanned.
//!
//! Entry points:
//! - [`validate_epub_file`] / [`validate_epub_reader`] for zip containers
//! - [`validate_directory`] for expanded publications
//! - [`validate_single_file`] / [`validate_single_bytes`] for one resource
//! - [`validate_path`], which picks one of the above from the options and
//!   the filesystem

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Arc;

use crate::checker::{check_package, dispatch, package_header, read_ahead, PackageDocument};
use crate::container::{Container, DirectoryProvider, MemoryProvider, ResourceOpener, ZipProvider};
use crate::context::{EpubVersion, RunHandles, ValidationContext, ValidationProfile};
use crate::error::EpubError;
use crate::media;
use crate::ocf;
use crate::path::normalize_path;
use crate::report::{ReportCollector, ReportSink, ValidationDiagnostic, ValidationReport};
use crate::schema::{SchemaTable, CONTAINER_XML};
use crate::xref::{RegistryConfig, XRefRegistry};
use crate::zip::{StreamingZip, ZipLimits};

/// What is being validated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ValidationMode {
    /// A whole publication (zip archive or expanded directory).
    #[default]
    Publication,
    /// One resource on its own; only same-document references are checked.
    SingleFile {
        /// Media type; guessed from the file extension when `None`.
        media_type: Option<String>,
        /// EPUB version the resource is checked against.
        version: EpubVersion,
        /// Manifest item properties to assume (for example `nav`).
        properties: Vec<String>,
    },
}

impl ValidationMode {
    /// Single-file mode for an EPUB 3 resource with no properties.
    pub fn single_file() -> Self {
        ValidationMode::SingleFile {
            media_type: None,
            version: EpubVersion::V3,
            properties: Vec::new(),
        }
    }
}

/// Options for validation runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Optional ZIP safety limits used while reading archive entries.
    pub zip_limits: Option<ZipLimits>,
    /// Extra rule set to apply.
    pub profile: ValidationProfile,
    /// Check resources on the rayon thread pool (needs the `parallel`
    /// feature; ignored otherwise).
    pub parallel: bool,
    /// Publication or single-file run.
    pub mode: ValidationMode,
}

impl ValidationOptions {
    /// Set ZIP limits.
    pub fn with_zip_limits(mut self, limits: ZipLimits) -> Self {
        self.zip_limits = Some(limits);
        self
    }

    /// Set the validation profile.
    pub fn with_profile(mut self, profile: ValidationProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Enable or disable the parallel resource scan.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set the run mode.
    pub fn with_mode(mut self, mode: ValidationMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Validate an EPUB from a filesystem path.
pub fn validate_epub_file<P: AsRef<Path>>(path: P) -> Result<ValidationReport, EpubError> {
    validate_epub_file_with_options(path, &ValidationOptions::default())
}

/// Validate an EPUB from a filesystem path with explicit options.
pub fn validate_epub_file_with_options<P: AsRef<Path>>(
    path: P,
    options: &ValidationOptions,
) -> Result<ValidationReport, EpubError> {
    let file = File::open(path).map_err(|e| EpubError::Io(e.to_string()))?;
    Ok(validate_epub_reader(file, options))
}

/// Validate an EPUB from any `Read + Seek` reader.
///
/// An archive that cannot be opened yields a report with a single fatal
/// diagnostic.
pub fn validate_epub_reader<R>(reader: R, options: &ValidationOptions) -> ValidationReport
where
    R: Read + Seek + Send + 'static,
{
    let mut zip = match StreamingZip::new_with_limits(reader, options.zip_limits.unwrap_or_default()) {
        Ok(zip) => zip,
        Err(err) => return unreadable(format!("Failed to parse ZIP container: {}", err)),
    };
    let structural = ocf::check_zip_structure(&mut zip);
    match Container::new(ZipProvider::new(zip)) {
        Ok(container) => run_publication(container, structural, options),
        Err(err) => unreadable(format!("Failed to enumerate ZIP container: {}", err)),
    }
}

/// Validate an expanded (unzipped) publication directory.
pub fn validate_directory<P: AsRef<Path>>(
    path: P,
    options: &ValidationOptions,
) -> Result<ValidationReport, EpubError> {
    let container = Container::new(DirectoryProvider::new(path.as_ref()))?;
    Ok(run_publication(container, None, options))
}

/// Validate one resource file outside any container.
pub fn validate_single_file<P: AsRef<Path>>(
    path: P,
    options: &ValidationOptions,
) -> Result<ValidationReport, EpubError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| EpubError::Io(format!("'{}' is not a file", path.display())))?;
    Ok(validate_single_bytes(&name, bytes, options))
}

/// Validate in-memory bytes as the single resource `name`.
///
/// `options.mode` supplies media type, version and properties; in
/// publication mode the media type is guessed and EPUB 3 is assumed.
pub fn validate_single_bytes(
    name: &str,
    bytes: impl Into<Vec<u8>>,
    options: &ValidationOptions,
) -> ValidationReport {
    let (media_type, version, properties) = match &options.mode {
        ValidationMode::SingleFile {
            media_type,
            version,
            properties,
        } => (media_type.clone(), *version, properties.clone()),
        ValidationMode::Publication => (None, EpubVersion::V3, Vec::new()),
    };
    let name = normalize_path(name)
        .ok()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "resource".to_string());
    let media_type = media_type
        .or_else(|| media::guess_from_path(&name).map(str::to_string))
        .unwrap_or_default();

    let container = match Container::new(MemoryProvider::new().with_file(name.clone(), bytes)) {
        Ok(container) => container,
        Err(err) => return unreadable(format!("Failed to load '{}': {}", name, err)),
    };
    let sink = Arc::new(ReportCollector::new());
    let handles = RunHandles {
        sink: sink.clone(),
        xrefs: Arc::new(XRefRegistry::new(RegistryConfig::single_file(&name, version))),
        opener: Arc::new(container),
        schemas: Arc::new(SchemaTable::standard()),
    };
    let ctx = ValidationContext::new(handles, name.as_str(), media_type.as_str(), version, options.profile)
        .with_properties(properties);

    let checker = dispatch(&ctx);
    log::debug!("[DISPATCH] single file {} checked as {:?}", name, checker);
    checker.check(&ctx);
    finish(&ctx, &sink)
}

/// Validate whatever `path` points at: a single file when `options.mode`
/// asks for it, an expanded publication for a directory, a zip container
/// otherwise.
pub fn validate_path<P: AsRef<Path>>(
    path: P,
    options: &ValidationOptions,
) -> Result<ValidationReport, EpubError> {
    let path = path.as_ref();
    if matches!(options.mode, ValidationMode::SingleFile { .. }) {
        validate_single_file(path, options)
    } else if path.is_dir() {
        validate_directory(path, options)
    } else {
        validate_epub_file_with_options(path, options)
    }
}

fn unreadable(message: String) -> ValidationReport {
    log::warn!("[OCF] {}", message);
    ValidationReport::from_diagnostics(vec![ValidationDiagnostic::fatal(
        "OCF_ZIP_UNREADABLE",
        message,
    )])
}

fn run_publication(
    container: Container,
    structural: Option<ValidationDiagnostic>,
    options: &ValidationOptions,
) -> ValidationReport {
    let container = Arc::new(container);
    let sink = Arc::new(ReportCollector::new());
    for note in container.notes() {
        sink.report(note.clone());
    }
    if let Some(diagnostic) = structural {
        log::debug!("[OCF] structural problem: {}", diagnostic.code);
        sink.report(diagnostic);
    }

    // The version decides schema chains, so container.xml and the package
    // document are parsed before the run context exists. Their checks reuse
    // these documents.
    let container_xml = read_ahead(container.as_ref(), CONTAINER_XML);
    let rootfiles = ocf::discover_rootfiles(container_xml.as_ref());
    let primary = ocf::primary_rootfile(&rootfiles).and_then(|r| normalize_path(&r.full_path).ok());
    let package_xml = primary
        .as_deref()
        .and_then(|path| read_ahead(container.as_ref(), path));
    let header = package_xml
        .as_ref()
        .and_then(|parsed| parsed.as_ref().ok())
        .map(package_header);
    let version = header.as_ref().map_or(EpubVersion::V3, |p| p.version);

    let handles = RunHandles {
        sink: sink.clone(),
        xrefs: Arc::new(XRefRegistry::new(RegistryConfig::publication(
            container.paths(),
            version,
        ))),
        opener: container.clone(),
        schemas: Arc::new(SchemaTable::standard()),
    };
    let root = ValidationContext::new(handles, CONTAINER_XML, media::XML, version, options.profile)
        .with_pub_types(header.map(|p| p.pub_types).unwrap_or_default());

    if ocf::check_container_xml(&root, container_xml).is_none() {
        return sink.to_report();
    }
    ocf::check_sidecars(&root, &container);

    let package = primary.as_deref().and_then(|path| {
        if !container.has_entry(path) {
            return None;
        }
        check_package(&root.for_resource(path, media::OPF, Vec::<String>::new()), package_xml).1
    });

    if let Some(package) = &package {
        if let Some(identifier) = &package.unique_identifier {
            container.bind_identifier(identifier);
        }
        let tasks = resource_contexts(&root, package, container.as_ref());
        let failed = check_resources(&tasks, options.parallel);
        log::debug!(
            "[DISPATCH] checked {} resources, {} with problems",
            tasks.len(),
            failed
        );
    }

    finish(&root, &sink)
}

/// One context per distinct manifest path present in the container. When
/// several items share a path, the first one decides how it is checked.
fn resource_contexts(
    root: &ValidationContext,
    package: &PackageDocument,
    opener: &dyn ResourceOpener,
) -> Vec<ValidationContext> {
    let mut seen = BTreeSet::new();
    package
        .manifest
        .iter()
        .filter_map(|item| {
            let path = item.path.as_deref()?;
            if path == package.path || item.is_remote() || !opener.has_entry(path) {
                return None;
            }
            if !seen.insert(path) {
                log::debug!("[DISPATCH] {} already scheduled, skipping item '{}'", path, item.id);
                return None;
            }
            Some(root.for_resource(path, &item.media_type, item.properties.iter().cloned()))
        })
        .collect()
}

/// Check every context; returns how many checks were not clean.
#[cfg(feature = "parallel")]
fn check_resources(tasks: &[ValidationContext], parallel: bool) -> usize {
    use rayon::prelude::*;

    if parallel {
        return tasks
            .par_iter()
            .filter(|ctx| !dispatch(ctx).check(ctx))
            .count();
    }
    check_sequential(tasks)
}

/// Check every context; returns how many checks were not clean.
#[cfg(not(feature = "parallel"))]
fn check_resources(tasks: &[ValidationContext], parallel: bool) -> usize {
    if parallel {
        log::debug!("[DISPATCH] parallel scan requested without the 'parallel' feature");
    }
    check_sequential(tasks)
}

fn check_sequential(tasks: &[ValidationContext]) -> usize {
    tasks.iter().filter(|ctx| !dispatch(ctx).check(ctx)).count()
}

/// Resolve references after the scan barrier and snapshot the report.
fn finish(ctx: &ValidationContext, sink: &ReportCollector) -> ValidationReport {
    match ctx.xrefs().resolve(sink) {
        Ok(summary) => log::debug!(
            "[XREF] {} references resolved, {} diagnostics",
            summary.references,
            summary.diagnostics
        ),
        Err(err) => log::warn!("[XREF] {}", err),
    }
    let report = sink.to_report();
    let counts = report.counts();
    log::debug!(
        "[OCF] run finished: {} fatal, {} errors, {} warnings, {} unverified",
        counts.fatal,
        counts.error,
        counts.warning,
        counts.unverified
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::tests::{build_zip, TestEntry};
    use std::io::Cursor;

    const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="EPUB/package.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

    const PACKAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="uid">urn:uuid:1234</dc:identifier>
    <dc:title>Test</dc:title>
    <dc:language>en</dc:language>
    <meta property="dcterms:modified">2024-01-01T00:00:00Z</meta>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine><itemref idref="c1"/></spine>
</package>"#;

    const NAV: &str = r#"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops"><head><title>Nav</title></head><body>
<nav epub:type="toc"><ol><li><a href="c1.xhtml">One</a></li></ol></nav></body></html>"#;

    const CHAPTER: &str = r#"<html xmlns="http://www.w3.org/1999/xhtml"><head><title>One</title></head><body><p id="p1"><a href="nav.xhtml">contents</a></p></body></html>"#;

    fn publication(chapter: &str) -> Vec<u8> {
        build_zip(&[
            TestEntry::stored("mimetype", b"application/epub+zip"),
            TestEntry::deflated("META-INF/container.xml", CONTAINER.as_bytes()),
            TestEntry::deflated("EPUB/package.opf", PACKAGE.as_bytes()),
            TestEntry::deflated("EPUB/nav.xhtml", NAV.as_bytes()),
            TestEntry::deflated("EPUB/c1.xhtml", chapter.as_bytes()),
        ])
    }

    #[test]
    fn test_minimal_publication_is_valid() {
        let report = validate_epub_reader(Cursor::new(publication(CHAPTER)), &ValidationOptions::default());
        assert!(report.is_valid(), "{:?}", report);
    }

    #[test]
    fn test_broken_link_fails_run() {
        let chapter = CHAPTER.replace("nav.xhtml", "missing.xhtml");
        let report = validate_epub_reader(Cursor::new(publication(&chapter)), &ValidationOptions::default());
        assert!(!report.is_valid());
        assert_eq!(report.with_code("XREF_UNRESOLVED").count(), 1);
        assert_eq!(report.error_count(), 1);
    }

    #[test]
    fn test_garbage_archive_is_fatal() {
        let report = validate_epub_reader(Cursor::new(b"not a zip".to_vec()), &ValidationOptions::default());
        assert_eq!(report.fatal_count(), 1);
        assert_eq!(report.diagnostics()[0].code, "OCF_ZIP_UNREADABLE");
    }

    #[test]
    fn test_single_bytes_mode() {
        let options = ValidationOptions::default().with_mode(ValidationMode::SingleFile {
            media_type: None,
            version: EpubVersion::V3,
            properties: vec!["nav".to_string()],
        });
        let report = validate_single_bytes("nav.xhtml", NAV, &options);
        assert!(report.is_valid(), "{:?}", report);

        let broken = NAV.replace("<ol>", "<ul>").replace("</ol>", "</ul>");
        let report = validate_single_bytes("nav.xhtml", broken, &options);
        assert!(report.with_code("SCH_NAV").count() >= 1);
    }
}
