//! OCF container checks.
//!
//! - zip structure: the archive starts with a local file header and its
//!   first record is a stored `mimetype` entry holding exactly
//!   `application/epub+zip`
//! - `META-INF/container.xml` rootfile discovery
//! - sidecar files under `META-INF/`

use std::io::{Read, Seek};

use crate::checker::{accept_markup, markup_document};
use crate::container::{Container, ENCRYPTION_XML};
use crate::context::ValidationContext;
use crate::encryption::EncryptionMap;
use crate::media;
use crate::report::{CheckReport, Location, ValidationDiagnostic};
use crate::schema::CONTAINER_XML;
use crate::xml::{ParsedXml, XmlDocument, CONTAINER_NS};
use crate::xref::ReferenceKind;
use crate::zip::{StreamingZip, METHOD_STORED};

/// Name of the required first zip entry.
pub const MIMETYPE: &str = "mimetype";

/// Sidecar files checked for well-formedness when present.
pub const SIDECARS: [&str; 5] = [
    ENCRYPTION_XML,
    "META-INF/signatures.xml",
    "META-INF/rights.xml",
    "META-INF/metadata.xml",
    "META-INF/manifest.xml",
];

/// Check the physical layout of a zip container.
///
/// At most one diagnostic is produced: a missing local header signature
/// wins over a missing `mimetype` entry, which wins over a misplaced,
/// compressed or wrong `mimetype`.
pub fn check_zip_structure<F: Read + Seek>(zip: &mut StreamingZip<F>) -> Option<ValidationDiagnostic> {
    let first = match zip.first_local_record() {
        Ok(Some(record)) => record,
        Ok(None) => {
            return Some(ValidationDiagnostic::fatal(
                "OCF_ZIP_SIGNATURE",
                "Container does not start with a zip local file header.",
            ));
        }
        Err(err) => {
            return Some(ValidationDiagnostic::fatal(
                "OCF_ZIP_SIGNATURE",
                format!("First zip record could not be read: {}", err),
            ));
        }
    };

    let Some(entry) = zip.entry(MIMETYPE).cloned() else {
        return Some(
            ValidationDiagnostic::fatal(
                "OCF_MIMETYPE_MISSING",
                "Container has no 'mimetype' entry.",
            )
            .with_hint("Add a stored 'mimetype' entry containing 'application/epub+zip' as the first zip entry."),
        );
    };

    let layout = |message: String| {
        Some(
            ValidationDiagnostic::error("OCF_MIMETYPE_LAYOUT", message)
                .with_path(MIMETYPE)
                .with_hint("The 'mimetype' entry must be first, stored, and contain exactly 'application/epub+zip'."),
        )
    };

    if first.filename != MIMETYPE {
        return layout(format!(
            "'mimetype' must be the first entry of the archive, found '{}'.",
            first.filename
        ));
    }
    if first.method != METHOD_STORED {
        return layout(format!(
            "'mimetype' must be stored without compression (method {}).",
            first.method
        ));
    }
    match zip.read_to_vec(&entry) {
        Ok(content) if content == media::EPUB_ZIP.as_bytes() => None,
        Ok(content) => layout(format!(
            "'mimetype' must contain exactly '{}', found '{}'.",
            media::EPUB_ZIP,
            String::from_utf8_lossy(&content)
        )),
        Err(err) => layout(format!("'mimetype' could not be read: {}", err)),
    }
}

/// One `rootfile` of `container.xml`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rootfile {
    /// `full-path`, as written.
    pub full_path: String,
    /// `media-type`.
    pub media_type: String,
    /// Position of the element.
    pub location: Location,
}

impl Rootfile {
    /// Whether this rootfile names a package document.
    pub fn is_package(&self) -> bool {
        media::essence(&self.media_type) == media::OPF
    }
}

fn rootfiles(doc: &XmlDocument) -> Vec<Rootfile> {
    let Some(list) = doc.first_child_named(doc.root_id(), CONTAINER_NS, "rootfiles") else {
        return Vec::new();
    };
    doc.children_named(list, CONTAINER_NS, "rootfile")
        .map(|id| {
            let element = doc.element(id);
            Rootfile {
                full_path: element.attr("full-path").unwrap_or_default().trim().to_string(),
                media_type: element.attr("media-type").unwrap_or_default().trim().to_string(),
                location: element.location,
            }
        })
        .collect()
}

/// First rootfile with the package media type.
pub fn primary_rootfile(rootfiles: &[Rootfile]) -> Option<&Rootfile> {
    rootfiles
        .iter()
        .find(|r| r.is_package() && !r.full_path.is_empty())
}

/// Rootfiles of a `container.xml` read ahead of the run context; empty when
/// it is missing or not well-formed.
pub fn discover_rootfiles(container_xml: Option<&ParsedXml>) -> Vec<Rootfile> {
    container_xml
        .and_then(|parsed| parsed.as_ref().ok())
        .map(rootfiles)
        .unwrap_or_default()
}

/// Check `container.xml` and register every rootfile as a reference.
///
/// `parsed` is the document read ahead for rootfile discovery, if any.
/// Returns `None` when the file is missing or not well-formed; the run
/// cannot continue without it.
pub fn check_container_xml(
    ctx: &ValidationContext,
    parsed: Option<ParsedXml>,
) -> Option<Vec<Rootfile>> {
    let mut report = CheckReport::new(CONTAINER_XML);
    if !ctx.opener().has_entry(CONTAINER_XML) {
        report.fatal(
            "OCF_CONTAINER_XML_MISSING",
            None,
            "Missing required 'META-INF/container.xml'.",
        );
        report.flush(ctx.sink());
        return None;
    }
    let found = markup_document(ctx, parsed, &mut report).map(|doc| rootfiles(&doc));

    if let Some(found) = &found {
        for rootfile in found.iter().filter(|r| !r.full_path.is_empty()) {
            ctx.xrefs().register_reference(
                CONTAINER_XML,
                Some(rootfile.location),
                &rootfile.full_path,
                ReferenceKind::Rootfile,
                true,
            );
        }
        if !found.is_empty() && primary_rootfile(found).is_none() {
            report.error(
                "OCF_ROOTFILE_PACKAGE_MISSING",
                None,
                format!("No rootfile has media type '{}'.", media::OPF),
            );
        }
        ctx.xrefs().mark_parsed(CONTAINER_XML);
    }
    report.flush(ctx.sink());
    found
}

/// Check every sidecar present under `META-INF/`.
///
/// `ctx` is any context of the run; a child context is derived per sidecar.
/// `encryption.xml` reuses the document `container` parsed when it was
/// enumerated.
pub fn check_sidecars(ctx: &ValidationContext, container: &Container) {
    for path in SIDECARS {
        if !ctx.opener().has_entry(path) {
            continue;
        }
        let sidecar = ctx.for_resource(path, media::XML, Vec::<String>::new());
        let mut report = CheckReport::new(path);
        let parsed = if path == ENCRYPTION_XML {
            check_encryption_xml(&sidecar, container, &mut report)
        } else {
            markup_document(&sidecar, None, &mut report).is_some()
        };
        if parsed {
            sidecar.xrefs().mark_parsed(path);
        }
        report.flush(sidecar.sink());
    }
}

fn check_encryption_xml(ctx: &ValidationContext, container: &Container, report: &mut CheckReport) -> bool {
    let Some(parsed) = container.encryption_xml() else {
        let Some(doc) = markup_document(ctx, None, report) else {
            return false;
        };
        register_cipher_references(ctx, &EncryptionMap::from_document(&doc));
        return true;
    };
    if !accept_markup(ctx, parsed.as_ref(), report) {
        return false;
    }
    if let Some(map) = container.encryption() {
        register_cipher_references(ctx, map);
    }
    true
}

fn register_cipher_references(ctx: &ValidationContext, map: &EncryptionMap) {
    for resource in map.resources() {
        if resource.uri.trim().is_empty() {
            continue;
        }
        ctx.xrefs().register_reference(
            ENCRYPTION_XML,
            Some(resource.location),
            &resource.uri,
            ReferenceKind::EncryptedResource,
            true,
        );
    }
    log::debug!(
        "[OCF] {} encrypted resources declared",
        map.resources().len()
    );
}
