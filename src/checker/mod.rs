//! Content checkers and their dispatch.
//!
//! [`dispatch`] maps a resource context to exactly one [`Checker`]. Every
//! checker goes through the same [`Checker::check`] entry point, which first
//! makes sure the resource exists and can be decrypted, then runs the
//! format-specific work against a per-resource [`CheckReport`] and flushes it
//! to the run's sink.

mod css;
mod image;
mod markup;
mod overlay;
mod package;

pub use package::{
    check_package, package_header, ManifestItem, PackageDocument, PackageHeader, SpineItem,
};

use crate::context::ValidationContext;
use crate::media;
use crate::report::{CheckReport, ValidationDiagnostic};
use crate::container::ResourceOpener;
use crate::xml::{parse_document, validate_parsed, ParsedXml, XmlDocument, XmlFatal};

/// Closed set of content checkers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Checker {
    /// Package document (OPF).
    Package,
    /// EPUB 3 navigation document.
    Navigation,
    /// EPUB 3 XHTML, SVG and other XML content.
    GenericMarkup,
    /// EPUB 2 OPS content documents.
    LegacyOps,
    /// EPUB 2 NCX.
    Ncx,
    /// SMIL media overlay.
    MediaOverlay,
    /// Search-key map.
    SearchKeyMap,
    /// CSS stylesheet.
    Stylesheet,
    /// Bitmap image.
    BitmapImage,
    /// Anything else: the resource only has to exist and be readable.
    Existence,
}

/// Pick the checker for `ctx`. Total over every media type and version.
pub fn dispatch(ctx: &ValidationContext) -> Checker {
    let media_type = media::essence(ctx.media_type());
    let checker = match media_type {
        media::OPF => Checker::Package,
        media::XHTML if ctx.is_epub3() && ctx.has_property("nav") => Checker::Navigation,
        media::XHTML if ctx.is_epub3() => Checker::GenericMarkup,
        media::XHTML | media::OEB1_DOCUMENT | media::DTBOOK => Checker::LegacyOps,
        media::NCX => Checker::Ncx,
        media::SMIL => Checker::MediaOverlay,
        media::SEARCH_KEY_MAP => Checker::SearchKeyMap,
        media::CSS => Checker::Stylesheet,
        mt if media::is_bitmap_image(mt) => Checker::BitmapImage,
        mt if media::is_xml_family(mt) => Checker::GenericMarkup,
        _ => Checker::Existence,
    };
    log::debug!(
        "[DISPATCH] {} ({}, EPUB {}) -> {:?}",
        ctx.path(),
        media_type,
        ctx.version(),
        checker
    );
    checker
}

impl Checker {
    /// Check the resource described by `ctx`.
    ///
    /// Returns true iff the check added no errors or warnings. Every failure
    /// along the way becomes a diagnostic; nothing is propagated.
    pub fn check(self, ctx: &ValidationContext) -> bool {
        let mut report = CheckReport::new(ctx.path());
        if let Some(bytes) = open_resource(ctx, &mut report) {
            self.run(ctx, &bytes, &mut report);
        }
        report.flush(ctx.sink())
    }

    fn run(self, ctx: &ValidationContext, bytes: &[u8], report: &mut CheckReport) {
        match self {
            Checker::Package => {
                package::check_package_bytes(ctx, bytes, report);
            }
            Checker::Navigation => markup::check(ctx, bytes, markup::Flavor::Navigation, report),
            Checker::GenericMarkup => markup::check(ctx, bytes, markup::Flavor::Modern, report),
            Checker::LegacyOps => markup::check(ctx, bytes, markup::Flavor::Legacy, report),
            Checker::Ncx => overlay::check_ncx(ctx, bytes, report),
            Checker::MediaOverlay => overlay::check_smil(ctx, bytes, report),
            Checker::SearchKeyMap => overlay::check_search_key_map(ctx, bytes, report),
            Checker::Stylesheet => css::check(ctx, bytes, report),
            Checker::BitmapImage => image::check(ctx, bytes, report),
            Checker::Existence => {}
        }
    }
}

/// Existence and decryption gate shared by every checker.
///
/// An undecryptable resource stays a known entry; it is recorded as
/// unparsable so references into it resolve as unverified.
pub(crate) fn open_resource(ctx: &ValidationContext, report: &mut CheckReport) -> Option<Vec<u8>> {
    let path = ctx.path();
    let opener = ctx.opener();
    if !opener.has_entry(path) {
        report.error(
            "RSC_MISSING",
            None,
            format!("resource '{}' is not present in the container", path),
        );
        return None;
    }
    if !opener.can_decrypt(path) {
        log::debug!("[DISPATCH] {} is encrypted and cannot be decrypted", path);
        report.push(
            ValidationDiagnostic::unverified(
                "RSC_DECRYPTION_UNAVAILABLE",
                format!("resource '{}' is encrypted and was not checked", path),
            )
            .with_arg(path),
        );
        ctx.xrefs().mark_unparsable(path);
        return None;
    }
    match opener.open(path) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            report.error("RSC_READ_FAILED", None, format!("resource could not be read: {}", err));
            ctx.xrefs().mark_unparsable(path);
            None
        }
    }
}

/// Parse and schema-check a markup resource, recording a parse failure in
/// the registry.
pub(crate) fn parse_markup(
    ctx: &ValidationContext,
    bytes: &[u8],
    report: &mut CheckReport,
) -> Option<XmlDocument> {
    let parsed = parse_document(bytes);
    if accept_markup(ctx, parsed.as_ref(), report) {
        parsed.ok()
    } else {
        None
    }
}

/// Schema-check markup that is already parsed, recording a parse failure in
/// the registry.
pub(crate) fn accept_markup(
    ctx: &ValidationContext,
    parsed: Result<&XmlDocument, &XmlFatal>,
    report: &mut CheckReport,
) -> bool {
    let accepted = validate_parsed(ctx, parsed, report);
    if !accepted {
        ctx.xrefs().mark_unparsable(ctx.path());
    }
    accepted
}

/// Read and parse `path` before a run context exists, reporting nothing.
///
/// `None` when the resource is absent, cannot be decrypted or cannot be
/// read; its check then opens it and reports the problem itself.
pub fn read_ahead(opener: &dyn ResourceOpener, path: &str) -> Option<ParsedXml> {
    if !opener.has_entry(path) || !opener.can_decrypt(path) {
        return None;
    }
    let bytes = opener.open(path).ok()?;
    Some(parse_document(&bytes))
}

/// Document for `ctx`: the [`read_ahead`] result when there is one,
/// otherwise the resource is opened and parsed now.
pub(crate) fn markup_document(
    ctx: &ValidationContext,
    parsed: Option<ParsedXml>,
    report: &mut CheckReport,
) -> Option<XmlDocument> {
    let Some(parsed) = parsed else {
        return open_resource(ctx, report).and_then(|bytes| parse_markup(ctx, &bytes, report));
    };
    if accept_markup(ctx, parsed.as_ref(), report) {
        parsed.ok()
    } else {
        None
    }
}
