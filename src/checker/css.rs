//! Stylesheet checker and CSS reference registration.

use crate::context::ValidationContext;
use crate::css::{scan_stylesheet, CssScan, CssUrlKind};
use crate::report::{CheckReport, Location};
use crate::xref::ReferenceKind;

/// Where scanned CSS text came from, for mapping its positions.
#[derive(Clone, Copy, Debug)]
pub(super) enum CssOrigin {
    /// A stylesheet file; positions are already file positions.
    File,
    /// A `style` element whose text starts at the given position.
    Element(Location),
    /// A `style` attribute on the element at the given position.
    Attribute(Location),
}

impl CssOrigin {
    fn map(self, location: Location) -> Location {
        match self {
            CssOrigin::File => location,
            CssOrigin::Attribute(at) => at,
            CssOrigin::Element(at) if location.line <= 1 => {
                Location::new(at.line, at.column + location.column.saturating_sub(1))
            }
            CssOrigin::Element(at) => Location::new(at.line + location.line - 1, location.column),
        }
    }
}

/// Register the references of `scan` and report its structural problems.
pub(super) fn register_scan(
    ctx: &ValidationContext,
    scan: &CssScan,
    origin: CssOrigin,
    report: &mut CheckReport,
) {
    for reference in &scan.references {
        let kind = match reference.kind {
            CssUrlKind::Import => ReferenceKind::Stylesheet,
            CssUrlKind::FontFace => ReferenceKind::Font,
            CssUrlKind::Url => ReferenceKind::Image,
        };
        ctx.xrefs().register_reference(
            ctx.path(),
            Some(origin.map(reference.location)),
            &reference.url,
            kind,
            true,
        );
    }
    for problem in &scan.problems {
        report.error("CSS_SYNTAX", Some(origin.map(problem.location)), problem.message.clone());
    }
}

pub(super) fn check(ctx: &ValidationContext, bytes: &[u8], report: &mut CheckReport) {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            report.error(
                "CSS_ENCODING",
                None,
                format!("stylesheet is not valid UTF-8: {}", err),
            );
            return;
        }
    };

    let scan = scan_stylesheet(text);
    if let Some(charset) = &scan.charset {
        if !charset.eq_ignore_ascii_case("utf-8") {
            report.error(
                "CSS_ENCODING",
                Some(Location::new(1, 1)),
                format!("stylesheets must be encoded in UTF-8, @charset declares '{}'", charset),
            );
        }
    }
    register_scan(ctx, &scan, CssOrigin::File, report);
    log::debug!(
        "[DISPATCH] {}: {} CSS references",
        ctx.path(),
        scan.references.len()
    );
}
