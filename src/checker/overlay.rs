//! NCX, media overlay and search-key map checkers.
//!
//! These formats share one shape: ids become anchors and a fixed set of
//! `(element, attribute)` pairs become references of one kind.

use super::parse_markup;
use crate::context::ValidationContext;
use crate::report::CheckReport;
use crate::xml::{drive, NodeId, XmlDocument, XmlHandler, NCX_NS, SEARCH_KEY_MAP_NS, SMIL_NS, XML_NS};
use crate::xref::ReferenceKind;

struct LinkRule {
    ns: &'static str,
    element: &'static str,
    attr: &'static str,
    kind: ReferenceKind,
}

const NCX_LINKS: &[LinkRule] = &[LinkRule {
    ns: NCX_NS,
    element: "content",
    attr: "src",
    kind: ReferenceKind::NcxContent,
}];

const SMIL_LINKS: &[LinkRule] = &[
    LinkRule {
        ns: SMIL_NS,
        element: "text",
        attr: "src",
        kind: ReferenceKind::OverlayText,
    },
    LinkRule {
        ns: SMIL_NS,
        element: "audio",
        attr: "src",
        kind: ReferenceKind::OverlayAudio,
    },
    LinkRule {
        ns: SMIL_NS,
        element: "seq",
        attr: "textref",
        kind: ReferenceKind::OverlayText,
    },
    LinkRule {
        ns: SMIL_NS,
        element: "body",
        attr: "textref",
        kind: ReferenceKind::OverlayText,
    },
];

const SEARCH_KEY_LINKS: &[LinkRule] = &[LinkRule {
    ns: SEARCH_KEY_MAP_NS,
    element: "search-key-group",
    attr: "href",
    kind: ReferenceKind::SearchKey,
}];

struct LinkHandler<'a> {
    ctx: &'a ValidationContext,
    rules: &'static [LinkRule],
    references: usize,
}

impl XmlHandler for LinkHandler<'_> {
    fn start_element(&mut self, doc: &XmlDocument, id: NodeId) {
        let element = doc.element(id);
        let xrefs = self.ctx.xrefs();
        if let Some(anchor) = element.attr("id").or_else(|| element.attr_ns(XML_NS, "id")) {
            xrefs.register_anchor(self.ctx.path(), anchor);
        }
        for rule in self.rules.iter().filter(|r| element.is(r.ns, r.element)) {
            let Some(raw) = element.attr(rule.attr).filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            if xrefs.register_reference(self.ctx.path(), Some(element.location), raw, rule.kind, true) {
                self.references += 1;
            }
        }
    }
}

fn check_links(
    ctx: &ValidationContext,
    bytes: &[u8],
    rules: &'static [LinkRule],
    report: &mut CheckReport,
) {
    let Some(doc) = parse_markup(ctx, bytes, report) else {
        return;
    };
    let mut handler = LinkHandler {
        ctx,
        rules,
        references: 0,
    };
    drive(&doc, &mut handler);
    log::debug!("[DISPATCH] {}: {} references", ctx.path(), handler.references);
    ctx.xrefs().mark_parsed(ctx.path());
}

pub(super) fn check_ncx(ctx: &ValidationContext, bytes: &[u8], report: &mut CheckReport) {
    check_links(ctx, bytes, NCX_LINKS, report);
}

pub(super) fn check_smil(ctx: &ValidationContext, bytes: &[u8], report: &mut CheckReport) {
    check_links(ctx, bytes, SMIL_LINKS, report);
}

pub(super) fn check_search_key_map(ctx: &ValidationContext, bytes: &[u8], report: &mut CheckReport) {
    check_links(ctx, bytes, SEARCH_KEY_LINKS, report);
}

#[cfg(test)]
mod tests {
    use crate::checker::Checker;
    use crate::context::tests::memory_context;
    use crate::context::EpubVersion;
    use crate::media;
    use crate::report::ValidationSeverity;

    const CHAPTER: &str = r#"<html xmlns="http://www.w3.org/1999/xhtml"><head><title>One</title></head><body><p id="s1">One</p></body></html>"#;

    const OVERLAY: &str = r#"<smil xmlns="http://www.w3.org/ns/SMIL" version="3.0"><body>
  <par id="p1"><text src="../c1.xhtml#s1"/></par>
  <par id="p2"><text src="../c1.xhtml#s9"/></par>
</body></smil>"#;

    #[test]
    fn test_overlay_text_to_missing_anchor() {
        let files = [("EPUB/c1.xhtml", CHAPTER), ("EPUB/mo/c1.smil", OVERLAY)];
        let (ctx, sink) = memory_context(&files, "EPUB/mo/c1.smil", media::SMIL, EpubVersion::V3);
        ctx.xrefs().declare_resource("EPUB/c1.xhtml", media::XHTML, false);
        ctx.xrefs().declare_resource("EPUB/mo/c1.smil", media::SMIL, false);

        assert!(Checker::MediaOverlay.check(&ctx));
        let chapter = ctx.for_resource("EPUB/c1.xhtml", media::XHTML, Vec::<String>::new());
        assert!(Checker::GenericMarkup.check(&chapter));
        ctx.xrefs().resolve(sink.as_ref()).unwrap();

        let report = sink.to_report();
        assert_eq!(report.diagnostics().len(), 1, "{:?}", report);
        let diagnostic = &report.diagnostics()[0];
        assert_eq!(diagnostic.code, "XREF_FRAGMENT_UNRESOLVED");
        assert_eq!(diagnostic.severity, ValidationSeverity::Error);
        assert_eq!(diagnostic.path.as_deref(), Some("EPUB/mo/c1.smil"));
    }

    #[test]
    fn test_ncx_content_must_be_a_content_document() {
        let ncx = r#"<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head/><docTitle><text>Book</text></docTitle>
  <navMap>
    <navPoint id="n1" playOrder="1"><navLabel><text>One</text></navLabel><content src="c1.xhtml"/></navPoint>
    <navPoint id="n2" playOrder="2"><navLabel><text>Cover</text></navLabel><content src="cover.jpg"/></navPoint>
  </navMap>
</ncx>"#;
        let files = [
            ("OEBPS/toc.ncx", ncx),
            ("OEBPS/c1.xhtml", CHAPTER),
            ("OEBPS/cover.jpg", "jpg"),
        ];
        let (ctx, sink) = memory_context(&files, "OEBPS/toc.ncx", media::NCX, EpubVersion::V2);
        ctx.xrefs().declare_resource("OEBPS/c1.xhtml", media::XHTML, false);
        ctx.xrefs().declare_resource("OEBPS/cover.jpg", "image/jpeg", false);

        assert!(Checker::Ncx.check(&ctx));
        ctx.xrefs().resolve(sink.as_ref()).unwrap();
        let report = sink.to_report();
        assert_eq!(report.diagnostics().len(), 1, "{:?}", report);
        assert_eq!(report.diagnostics()[0].code, "XREF_INCOMPATIBLE_TARGET");
    }

    #[test]
    fn test_search_key_targets_must_be_declared() {
        let map = r#"<search-key-map xmlns="http://www.idpf.org/2016/search-key-map">
  <search-key-group href="dict.xhtml#cat"><match value="cat"/></search-key-group>
</search-key-map>"#;
        let files = [("EPUB/keys.xml", map), ("EPUB/dict.xhtml", CHAPTER)];
        let (ctx, sink) =
            memory_context(&files, "EPUB/keys.xml", media::SEARCH_KEY_MAP, EpubVersion::V3);

        assert!(Checker::SearchKeyMap.check(&ctx));
        ctx.xrefs().resolve(sink.as_ref()).unwrap();
        let report = sink.to_report();
        assert_eq!(report.with_code("XREF_UNDECLARED_RESOURCE").count(), 1);
    }
}
