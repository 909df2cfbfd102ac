//! Package document checker: manifest registration, fallbacks and spine.

use std::collections::{BTreeMap, BTreeSet};

use super::{markup_document, parse_markup};
use crate::context::{EpubVersion, PublicationType, ValidationContext};
use crate::media;
use crate::path::{reference_form, resolve_relative_reference, split_fragment, ReferenceForm};
use crate::report::{CheckReport, Location, ValidationDiagnostic};
use crate::xml::{NodeId, ParsedXml, XmlDocument, DC_NS, OPF_NS};
use crate::xref::ReferenceKind;

/// One manifest `item`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestItem {
    /// `id`
    pub id: String,
    /// `href` as written.
    pub href: String,
    /// Container path of a local item; `None` for remote or unresolvable
    /// hrefs.
    pub path: Option<String>,
    /// `media-type`
    pub media_type: String,
    /// `properties` tokens.
    pub properties: Vec<String>,
    /// `fallback` idref.
    pub fallback: Option<String>,
    /// `media-overlay` idref.
    pub media_overlay: Option<String>,
    /// Position of the element in the package document.
    pub location: Location,
}

impl ManifestItem {
    /// Whether the item declares `property`.
    pub fn has_property(&self, property: &str) -> bool {
        self.properties.iter().any(|p| p == property)
    }

    /// Whether the href is an absolute remote URL.
    pub fn is_remote(&self) -> bool {
        reference_form(&self.href) == ReferenceForm::Remote
    }
}

/// One spine `itemref`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpineItem {
    /// `idref`
    pub idref: String,
    /// `linear="no"` clears this.
    pub linear: bool,
    /// Position of the element in the package document.
    pub location: Location,
}

/// What the rest of a run needs from the package document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageDocument {
    /// Container path of the package document.
    pub path: String,
    /// Declared EPUB version.
    pub version: EpubVersion,
    /// Value of the `dc:identifier` named by `unique-identifier`.
    pub unique_identifier: Option<String>,
    /// Recognized `dc:type` values.
    pub pub_types: Vec<PublicationType>,
    /// Manifest items in document order.
    pub manifest: Vec<ManifestItem>,
    /// Spine items in reading order.
    pub spine: Vec<SpineItem>,
    /// EPUB 2 `spine/@toc`.
    pub toc: Option<String>,
    spine_location: Location,
}

impl PackageDocument {
    /// Extract manifest, spine and metadata from a parsed package document.
    pub fn from_document(path: &str, doc: &XmlDocument) -> Self {
        let root = doc.root();
        let version = EpubVersion::from_package_attr(root.attr("version").unwrap_or_default());
        let metadata = doc.first_child_named(doc.root_id(), OPF_NS, "metadata");

        let unique_identifier = metadata.and_then(|metadata| {
            let wanted = root.attr("unique-identifier")?;
            doc.children_named(metadata, DC_NS, "identifier")
                .find(|id| doc.element(*id).attr("id") == Some(wanted))
                .map(|id| doc.text_content(id).trim().to_string())
        });
        let pub_types = metadata
            .map(|metadata| {
                doc.children_named(metadata, DC_NS, "type")
                    .filter_map(|id| PublicationType::from_dc_type(&doc.text_content(id)))
                    .collect()
            })
            .unwrap_or_default();

        let manifest = doc
            .first_child_named(doc.root_id(), OPF_NS, "manifest")
            .map(|manifest| {
                doc.children_named(manifest, OPF_NS, "item")
                    .map(|id| manifest_item(path, doc, id))
                    .collect()
            })
            .unwrap_or_default();

        let spine_id = doc.first_child_named(doc.root_id(), OPF_NS, "spine");
        let spine = spine_id
            .map(|spine| {
                doc.children_named(spine, OPF_NS, "itemref")
                    .map(|id| {
                        let element = doc.element(id);
                        SpineItem {
                            idref: element.attr("idref").unwrap_or_default().trim().to_string(),
                            linear: element.attr("linear") != Some("no"),
                            location: element.location,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            path: path.to_string(),
            version,
            unique_identifier,
            pub_types,
            manifest,
            spine,
            toc: spine_id.and_then(|s| doc.element(s).attr("toc").map(str::to_string)),
            spine_location: spine_id.map_or(root.location, |s| doc.element(s).location),
        }
    }

    /// Manifest item by id.
    pub fn item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// Manifest item by container path.
    pub fn item_by_path(&self, path: &str) -> Option<&ManifestItem> {
        self.manifest
            .iter()
            .find(|item| item.path.as_deref() == Some(path))
    }

    /// Whether the fallback chain starting after `item` reaches a content
    /// document. Cycles end the walk.
    pub fn has_content_fallback(&self, item: &ManifestItem) -> bool {
        let epub3 = self.version == EpubVersion::V3;
        let mut seen = BTreeSet::from([item.id.as_str()]);
        let mut cursor = item.fallback.as_deref();
        while let Some(id) = cursor {
            if !seen.insert(id) {
                return false;
            }
            let Some(next) = self.item(id) else {
                return false;
            };
            if media::is_content_document(&next.media_type, epub3) {
                return true;
            }
            cursor = next.fallback.as_deref();
        }
        false
    }
}

fn manifest_item(opf_path: &str, doc: &XmlDocument, id: NodeId) -> ManifestItem {
    let element = doc.element(id);
    let href = element.attr("href").unwrap_or_default().trim().to_string();
    let path = match reference_form(&href) {
        ReferenceForm::Local if !href.is_empty() => resolve_relative_reference(opf_path, &href)
            .ok()
            .map(|resolved| split_fragment(&resolved).0.to_string()),
        _ => None,
    };
    ManifestItem {
        id: element.attr("id").unwrap_or_default().trim().to_string(),
        href,
        path,
        media_type: element.attr("media-type").unwrap_or_default().trim().to_string(),
        properties: element
            .attr("properties")
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect(),
        fallback: element.attr("fallback").map(|f| f.trim().to_string()),
        media_overlay: element.attr("media-overlay").map(|f| f.trim().to_string()),
        location: element.location,
    }
}

/// Version and publication types read ahead of the full check, so the run
/// context can be set up before any schema chain is selected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageHeader {
    /// Declared version.
    pub version: EpubVersion,
    /// Recognized `dc:type` values.
    pub pub_types: Vec<PublicationType>,
}

/// Read version and publication types from a parsed package document.
pub fn package_header(doc: &XmlDocument) -> PackageHeader {
    let package = PackageDocument::from_document("", doc);
    PackageHeader {
        version: package.version,
        pub_types: package.pub_types,
    }
}

/// Check the package document at `ctx.path()`.
///
/// `parsed` is the document when it was already read ahead to learn the
/// version; otherwise it is opened here. Returns whether the check was clean
/// and, when the document could be parsed, the extracted package model.
pub fn check_package(
    ctx: &ValidationContext,
    parsed: Option<ParsedXml>,
) -> (bool, Option<PackageDocument>) {
    let mut report = CheckReport::new(ctx.path());
    let package = markup_document(ctx, parsed, &mut report)
        .map(|doc| check_package_document(ctx, &doc, &mut report));
    (report.flush(ctx.sink()), package)
}

pub(crate) fn check_package_bytes(
    ctx: &ValidationContext,
    bytes: &[u8],
    report: &mut CheckReport,
) -> Option<PackageDocument> {
    let doc = parse_markup(ctx, bytes, report)?;
    Some(check_package_document(ctx, &doc, report))
}

fn check_package_document(
    ctx: &ValidationContext,
    doc: &XmlDocument,
    report: &mut CheckReport,
) -> PackageDocument {
    let package = PackageDocument::from_document(ctx.path(), doc);
    if package.version != ctx.version() {
        log::warn!(
            "[DISPATCH] {} declares EPUB {} but was checked as EPUB {}",
            ctx.path(),
            package.version,
            ctx.version()
        );
    }

    register_manifest(ctx, &package, report);
    check_fallbacks(&package, report);
    check_spine(&package, report);
    check_navigation_items(&package, report);
    register_guide(ctx, doc);
    ctx.xrefs().mark_parsed(ctx.path());
    package
}

fn register_manifest(ctx: &ValidationContext, package: &PackageDocument, report: &mut CheckReport) {
    let xrefs = ctx.xrefs();
    let mut ids = BTreeSet::new();
    let mut paths = BTreeSet::new();

    for item in &package.manifest {
        if !item.id.is_empty() && !ids.insert(item.id.as_str()) {
            report.error(
                "MANIFEST_ID_DUPLICATE",
                Some(item.location),
                format!("Duplicate manifest id '{}'.", item.id),
            );
        }
        if item.href.is_empty() {
            continue;
        }

        if item.is_remote() {
            xrefs.declare_remote(&item.href);
        } else if let Some(path) = &item.path {
            if !paths.insert(path.as_str()) {
                report.push(
                    ValidationDiagnostic::warning(
                        "MANIFEST_HREF_DUPLICATE",
                        format!("Multiple manifest items reference '{}'.", path),
                    )
                    .at(Some(item.location))
                    .with_arg(path.clone()),
                );
            }
            xrefs.declare_resource(path, &item.media_type, package.has_content_fallback(item));
        }
        xrefs.register_reference(
            &package.path,
            Some(item.location),
            &item.href,
            ReferenceKind::ManifestItem,
            true,
        );

        if let Some(overlay) = &item.media_overlay {
            let valid = package
                .item(overlay)
                .is_some_and(|target| media::essence(&target.media_type) == media::SMIL);
            if !valid {
                report.error(
                    "MANIFEST_MEDIA_OVERLAY_INVALID",
                    Some(item.location),
                    format!(
                        "Manifest item '{}' media-overlay '{}' does not name a SMIL item.",
                        item.id, overlay
                    ),
                );
            }
        }
    }
}

fn check_fallbacks(package: &PackageDocument, report: &mut CheckReport) {
    let by_id: BTreeMap<&str, &ManifestItem> = package
        .manifest
        .iter()
        .map(|item| (item.id.as_str(), item))
        .collect();

    for item in &package.manifest {
        let Some(fallback_id) = item.fallback.as_deref() else {
            continue;
        };
        if fallback_id == item.id {
            report.error(
                "MANIFEST_FALLBACK_SELF_REFERENCE",
                Some(item.location),
                format!("Manifest item '{}' fallback points to itself.", item.id),
            );
            continue;
        }
        if !by_id.contains_key(fallback_id) {
            report.error(
                "MANIFEST_FALLBACK_TARGET_MISSING",
                Some(item.location),
                format!(
                    "Manifest item '{}' fallback references missing id '{}'.",
                    item.id, fallback_id
                ),
            );
            continue;
        }

        let mut seen = BTreeSet::from([item.id.as_str()]);
        let mut cursor = fallback_id;
        while let Some(entry) = by_id.get(cursor) {
            if !seen.insert(cursor) {
                report.error(
                    "MANIFEST_FALLBACK_CYCLE",
                    Some(item.location),
                    format!(
                        "Fallback chain from '{}' contains a cycle at id '{}'.",
                        item.id, cursor
                    ),
                );
                break;
            }
            match entry.fallback.as_deref() {
                Some(next) => cursor = next,
                None => break,
            }
        }
    }
}

fn check_spine(package: &PackageDocument, report: &mut CheckReport) {
    if package.spine.is_empty() {
        report.warning(
            "SPINE_EMPTY",
            Some(package.spine_location),
            "Spine has no reading-order entries.",
        );
    }
    let epub3 = package.version == EpubVersion::V3;
    let mut seen = BTreeSet::new();
    for (index, itemref) in package.spine.iter().enumerate() {
        if itemref.idref.is_empty() {
            continue;
        }
        let Some(item) = package.item(&itemref.idref) else {
            report.push(
                ValidationDiagnostic::error(
                    "SPINE_IDREF_NOT_IN_MANIFEST",
                    format!(
                        "Spine item at index {} references unknown manifest id '{}'.",
                        index, itemref.idref
                    ),
                )
                .at(Some(itemref.location))
                .with_hint(
                    "Ensure each `<itemref idref=\"...\">` matches a manifest `<item id=\"...\">`.",
                ),
            );
            continue;
        };
        if !seen.insert(itemref.idref.as_str()) {
            report.error(
                "SPINE_ITEM_DUPLICATE",
                Some(itemref.location),
                format!("Manifest item '{}' appears in the spine more than once.", item.id),
            );
        }
        if !media::is_content_document(&item.media_type, epub3)
            && !package.has_content_fallback(item)
        {
            report.warning(
                "SPINE_ITEM_NON_CONTENT",
                Some(itemref.location),
                format!(
                    "Spine item '{}' references media-type '{}' without a content document fallback.",
                    item.id, item.media_type
                ),
            );
        }
    }
}

fn check_navigation_items(package: &PackageDocument, report: &mut CheckReport) {
    match package.version {
        EpubVersion::V3 => match package.manifest.iter().find(|item| item.has_property("nav")) {
            None => report.error(
                "NAV_DOCUMENT_MISSING",
                None,
                "No manifest item declares the 'nav' property.",
            ),
            Some(nav) if media::essence(&nav.media_type) != media::XHTML => report.error(
                "NAV_DOCUMENT_INVALID",
                Some(nav.location),
                format!(
                    "Navigation document '{}' must be application/xhtml+xml, found '{}'.",
                    nav.id, nav.media_type
                ),
            ),
            Some(_) => {}
        },
        EpubVersion::V2 => {
            let Some(toc) = package.toc.as_deref() else {
                return;
            };
            let is_ncx = package
                .item(toc)
                .is_some_and(|item| media::essence(&item.media_type) == media::NCX);
            if !is_ncx {
                report.error(
                    "NCX_REFERENCE_INVALID",
                    Some(package.spine_location),
                    format!("spine 'toc' attribute '{}' does not name an NCX item.", toc),
                );
            }
        }
    }
}

fn register_guide(ctx: &ValidationContext, doc: &XmlDocument) {
    let Some(guide) = doc.first_child_named(doc.root_id(), OPF_NS, "guide") else {
        return;
    };
    for reference in doc.children_named(guide, OPF_NS, "reference") {
        let element = doc.element(reference);
        if let Some(href) = element.attr("href") {
            ctx.xrefs().register_reference(
                ctx.path(),
                Some(element.location),
                href,
                ReferenceKind::Guide,
                false,
            );
        }
    }
}
