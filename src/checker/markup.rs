//! XHTML, SVG and legacy OPS content checker.
//!
//! After the schema chain has run, the document is replayed into a
//! [`ContentHandler`] that records every `id` as an anchor and every
//! outgoing URL as a typed reference. Embedded CSS (`style` elements and
//! attributes) goes through the CSS scanner.

use super::css::{register_scan, CssOrigin};
use super::parse_markup;
use crate::context::ValidationContext;
use crate::css::{scan_declarations, scan_stylesheet};
use crate::report::{CheckReport, Location};
use crate::xml::{drive, Element, NodeId, XmlDocument, XmlHandler, SVG_NS, XHTML_NS, XLINK_NS, XML_NS};
use crate::xref::ReferenceKind;

/// Which kind of content document is being checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Flavor {
    /// EPUB 3 navigation document.
    Navigation,
    /// EPUB 3 XHTML or SVG content.
    Modern,
    /// EPUB 2 OPS content.
    Legacy,
}

pub(super) fn check(
    ctx: &ValidationContext,
    bytes: &[u8],
    flavor: Flavor,
    report: &mut CheckReport,
) {
    let Some(doc) = parse_markup(ctx, bytes, report) else {
        return;
    };
    let mut handler = ContentHandler {
        ctx,
        flavor,
        report,
        style: None,
        references: 0,
        anchors: 0,
    };
    drive(&doc, &mut handler);
    log::debug!(
        "[DISPATCH] {} ({:?}): {} references, {} anchors",
        ctx.path(),
        flavor,
        handler.references,
        handler.anchors
    );
    ctx.xrefs().mark_parsed(ctx.path());
}

struct StyleBuffer {
    element: NodeId,
    text: String,
    start: Option<Location>,
}

struct ContentHandler<'a> {
    ctx: &'a ValidationContext,
    flavor: Flavor,
    report: &'a mut CheckReport,
    style: Option<StyleBuffer>,
    references: usize,
    anchors: usize,
}

impl ContentHandler<'_> {
    fn reference(&mut self, element: &Element, raw: &str, kind: ReferenceKind, required: bool) {
        if raw.trim().is_empty() {
            return;
        }
        if self.ctx.xrefs().register_reference(
            self.ctx.path(),
            Some(element.location),
            raw,
            kind,
            required,
        ) {
            self.references += 1;
        }
    }

    fn xhtml_references(&mut self, doc: &XmlDocument, id: NodeId, element: &Element) {
        match element.name.local.as_str() {
            "a" | "area" => {
                if let Some(href) = element.attr("href") {
                    let kind = if self.flavor == Flavor::Navigation
                        && doc.ancestor_named(id, XHTML_NS, "nav").is_some()
                    {
                        ReferenceKind::NavLink
                    } else {
                        ReferenceKind::Hyperlink
                    };
                    self.reference(element, href, kind, true);
                }
            }
            "img" => {
                if let Some(src) = element.attr("src") {
                    self.reference(element, src, ReferenceKind::Image, true);
                }
            }
            "link" => {
                if let Some(href) = element.attr("href") {
                    let stylesheet = element.attr("rel").is_some_and(|rel| {
                        rel.split_ascii_whitespace()
                            .any(|token| token.eq_ignore_ascii_case("stylesheet"))
                    });
                    if stylesheet {
                        self.reference(element, href, ReferenceKind::Stylesheet, true);
                    } else {
                        self.reference(element, href, ReferenceKind::Link, false);
                    }
                }
            }
            "script" => {
                if let Some(src) = element.attr("src") {
                    self.reference(element, src, ReferenceKind::Script, true);
                }
            }
            "audio" => {
                if let Some(src) = element.attr("src") {
                    self.reference(element, src, ReferenceKind::Audio, true);
                }
            }
            "video" => {
                if let Some(src) = element.attr("src") {
                    self.reference(element, src, ReferenceKind::Video, true);
                }
                if let Some(poster) = element.attr("poster") {
                    self.reference(element, poster, ReferenceKind::Image, true);
                }
            }
            "source" => {
                if let Some(src) = element.attr("src") {
                    let parent = element.parent.map(|p| doc.element(p).name.local.as_str());
                    let kind = match parent {
                        Some("audio") => ReferenceKind::Audio,
                        Some("video") => ReferenceKind::Video,
                        Some("picture") => ReferenceKind::Image,
                        _ => ReferenceKind::Generic,
                    };
                    self.reference(element, src, kind, true);
                }
            }
            "track" | "embed" | "iframe" => {
                if let Some(src) = element.attr("src") {
                    self.reference(element, src, ReferenceKind::Generic, true);
                }
            }
            "object" => {
                if let Some(data) = element.attr("data") {
                    self.reference(element, data, ReferenceKind::Generic, true);
                }
            }
            "blockquote" | "q" | "ins" | "del" => {
                if let Some(cite) = element.attr("cite") {
                    self.reference(element, cite, ReferenceKind::Cite, false);
                }
            }
            _ => {}
        }
    }

    fn svg_references(&mut self, element: &Element) {
        let href = element
            .attr_ns(XLINK_NS, "href")
            .or_else(|| element.attr("href"));
        let Some(href) = href else {
            return;
        };
        let kind = match element.name.local.as_str() {
            "image" => ReferenceKind::Image,
            "a" => ReferenceKind::Hyperlink,
            "use" => ReferenceKind::Generic,
            _ => return,
        };
        self.reference(element, href, kind, true);
    }
}

impl XmlHandler for ContentHandler<'_> {
    fn start_element(&mut self, doc: &XmlDocument, id: NodeId) {
        let element = doc.element(id);

        let anchor = element.attr("id").or_else(|| element.attr_ns(XML_NS, "id"));
        if let Some(anchor) = anchor {
            if self.ctx.xrefs().register_anchor(self.ctx.path(), anchor) {
                self.anchors += 1;
            }
        }

        if let Some(style) = element.attr("style") {
            let scan = scan_declarations(style);
            register_scan(self.ctx, &scan, CssOrigin::Attribute(element.location), self.report);
        }

        match element.name.namespace.as_deref() {
            Some(XHTML_NS) => self.xhtml_references(doc, id, element),
            Some(SVG_NS) => self.svg_references(element),
            _ => {}
        }

        if element.is(XHTML_NS, "style") || element.is(SVG_NS, "style") {
            self.style = Some(StyleBuffer {
                element: id,
                text: String::new(),
                start: None,
            });
        }
    }

    fn end_element(&mut self, doc: &XmlDocument, id: NodeId) {
        let Some(buffer) = self.style.take_if(|buffer| buffer.element == id) else {
            return;
        };
        let scan = scan_stylesheet(&buffer.text);
        let origin = buffer.start.unwrap_or(doc.element(id).location);
        register_scan(self.ctx, &scan, CssOrigin::Element(origin), self.report);
    }

    fn text(&mut self, _doc: &XmlDocument, text: &str, location: Location) {
        if let Some(buffer) = self.style.as_mut() {
            buffer.start.get_or_insert(location);
            buffer.text.push_str(text);
        }
    }
}
