//! Content document rules: XHTML, legacy OPS, SVG and the EPUB profile
//! vocabularies (EDUPUB, dictionaries, indexes).

use std::collections::BTreeMap;

use super::{Findings, SchemaValidator, Violation};
use crate::path::is_valid_id_ref;
use crate::xml::{Element, NodeId, XmlDocument, EPUB_OPS_NS, SVG_NS, XHTML_NS, XML_NS};

/// EPUB 3 XHTML content documents.
pub struct XhtmlSchema;

/// EPUB 2 (OPS 2.0.1) restrictions layered on XHTML.
pub struct OpsSchema;

/// Standalone SVG content documents.
pub struct SvgSchema;

/// EDUPUB structural semantics.
pub struct EdupubSchema;

/// EPUB Dictionaries content.
pub struct DictSchema;

/// EPUB Indexes content.
pub struct IdxSchema;

/// Whitespace-separated `epub:type` tokens of `element`.
pub(crate) fn epub_types(element: &Element) -> impl Iterator<Item = &str> {
    element
        .attr_ns(EPUB_OPS_NS, "type")
        .unwrap_or_default()
        .split_whitespace()
}

pub(crate) fn has_epub_type(element: &Element, token: &str) -> bool {
    epub_types(element).any(|t| t == token)
}

/// Level of an XHTML `h1`..`h6` element.
pub(crate) fn heading_level(element: &Element) -> Option<u8> {
    if element.name.namespace.as_deref() != Some(XHTML_NS) {
        return None;
    }
    match element.name.local.as_str() {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

/// Report duplicate and malformed `id` attributes under `root`.
fn check_ids(doc: &XmlDocument, findings: &mut Findings) {
    let mut seen: BTreeMap<&str, NodeId> = BTreeMap::new();
    let all = std::iter::once(doc.root_id()).chain(doc.descendants(doc.root_id()));
    for id in all {
        let element = doc.element(id);
        let value = element.attr("id").or_else(|| element.attr_ns(XML_NS, "id"));
        let Some(value) = value else {
            continue;
        };
        if !is_valid_id_ref(value) {
            findings.error(
                element.location,
                format!("'{}' is not a valid id value", value),
            );
        } else if seen.insert(value, id).is_some() {
            findings.error(element.location, format!("duplicate id '{}'", value));
        }
    }
}

impl SchemaValidator for XhtmlSchema {
    fn id(&self) -> &'static str {
        "xhtml"
    }

    fn validate(&self, doc: &XmlDocument) -> Vec<Violation> {
        let mut findings = Findings::new("SCH_XHTML");
        let root = doc.root();
        if !root.is(XHTML_NS, "html") {
            findings.error(
                root.location,
                format!(
                    "root element must be 'html' in the XHTML namespace, found '{}'",
                    root.name.qualified()
                ),
            );
            return findings.finish();
        }

        let children: Vec<NodeId> = doc.children(doc.root_id()).collect();
        let head = children.first().filter(|id| doc.element(**id).is(XHTML_NS, "head"));
        let body = children.get(1).filter(|id| doc.element(**id).is(XHTML_NS, "body"));
        if head.is_none() || body.is_none() || children.len() != 2 {
            findings.error(
                root.location,
                "'html' must contain exactly a 'head' followed by a 'body'",
            );
        }

        check_ids(doc, &mut findings);

        for id in doc.descendants(doc.root_id()) {
            let element = doc.element(id);
            if element.is(XHTML_NS, "img") && element.attr("src").is_none_or(str::is_empty) {
                findings.error(element.location, "'img' is missing required attribute 'src'");
            }
            if element.is(XHTML_NS, "a") && doc.ancestor_named(id, XHTML_NS, "a").is_some() {
                findings.error(element.location, "'a' elements must not be nested");
            }
        }
        findings.finish()
    }
}

const HTML5_ONLY: &[&str] = &[
    "article",
    "aside",
    "audio",
    "canvas",
    "figcaption",
    "figure",
    "footer",
    "header",
    "main",
    "mark",
    "nav",
    "section",
    "time",
    "video",
];

impl SchemaValidator for OpsSchema {
    fn id(&self) -> &'static str {
        "ops"
    }

    fn validate(&self, doc: &XmlDocument) -> Vec<Violation> {
        let mut findings = Findings::new("SCH_OPS");
        let all = std::iter::once(doc.root_id()).chain(doc.descendants(doc.root_id()));
        for id in all {
            let element = doc.element(id);
            if element.name.namespace.as_deref() == Some(XHTML_NS)
                && HTML5_ONLY.contains(&element.name.local.as_str())
            {
                findings.error(
                    element.location,
                    format!("element '{}' is not allowed in EPUB 2 content", element.name.local),
                );
            }
            for attr in &element.attributes {
                if attr.name.namespace.as_deref() == Some(EPUB_OPS_NS) {
                    findings.error(
                        element.location,
                        format!(
                            "attribute '{}' is not allowed in EPUB 2 content",
                            attr.name.qualified()
                        ),
                    );
                }
            }
        }
        findings.finish()
    }
}

impl SchemaValidator for SvgSchema {
    fn id(&self) -> &'static str {
        "svg"
    }

    fn validate(&self, doc: &XmlDocument) -> Vec<Violation> {
        let mut findings = Findings::new("SCH_SVG");
        let root = doc.root();
        if !root.is(SVG_NS, "svg") {
            findings.error(
                root.location,
                format!(
                    "root element must be 'svg' in the SVG namespace, found '{}'",
                    root.name.qualified()
                ),
            );
            return findings.finish();
        }
        check_ids(doc, &mut findings);
        findings.finish()
    }
}

impl SchemaValidator for EdupubSchema {
    fn id(&self) -> &'static str {
        "edupub"
    }

    fn validate(&self, doc: &XmlDocument) -> Vec<Violation> {
        let mut findings = Findings::new("SCH_EDUPUB");
        for id in doc.descendants(doc.root_id()) {
            let element = doc.element(id);
            if !element.is(XHTML_NS, "section") {
                continue;
            }
            let labelled = element.attr("aria-label").is_some_and(|v| !v.trim().is_empty())
                || element.attr("aria-labelledby").is_some();
            let titled = doc.children(id).any(|child| {
                let child = doc.element(child);
                heading_level(child).is_some() || child.is(XHTML_NS, "header")
            });
            if !labelled && !titled {
                findings.error(
                    element.location,
                    "sections must have a heading or an 'aria-label'",
                );
            }
        }
        findings.finish()
    }
}

impl SchemaValidator for DictSchema {
    fn id(&self) -> &'static str {
        "dict"
    }

    fn validate(&self, doc: &XmlDocument) -> Vec<Violation> {
        let mut findings = Findings::new("SCH_DICT");
        for id in doc.descendants(doc.root_id()) {
            let element = doc.element(id);
            if !has_epub_type(element, "dictentry") {
                continue;
            }
            if !element.is(XHTML_NS, "article") {
                findings.error(
                    element.location,
                    format!(
                        "'dictentry' must be declared on an 'article', found '{}'",
                        element.name.local
                    ),
                );
                continue;
            }
            let has_term = doc
                .descendants(id)
                .into_iter()
                .any(|d| doc.element(d).is(XHTML_NS, "dfn"));
            if !has_term {
                findings.error(element.location, "dictionary entries must contain a 'dfn' term");
            }
        }
        findings.finish()
    }
}

impl SchemaValidator for IdxSchema {
    fn id(&self) -> &'static str {
        "idx"
    }

    fn validate(&self, doc: &XmlDocument) -> Vec<Violation> {
        let mut findings = Findings::new("SCH_IDX");
        let mut has_index = false;
        let all = std::iter::once(doc.root_id()).chain(doc.descendants(doc.root_id()));
        for id in all {
            let element = doc.element(id);
            for token in epub_types(element) {
                let expected = match token {
                    "index" => {
                        has_index = true;
                        continue;
                    }
                    "index-entry-list" => "ul",
                    "index-entry" => "li",
                    _ => continue,
                };
                if !element.is(XHTML_NS, expected) {
                    findings.error(
                        element.location,
                        format!(
                            "'{}' must be declared on a '{}' element, found '{}'",
                            token, expected, element.name.local
                        ),
                    );
                }
            }
        }
        if !has_index {
            findings.error(
                doc.root().location,
                "index documents must contain an element with epub:type 'index'",
            );
        }
        findings.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;

    fn run(validator: &dyn SchemaValidator, xml: &str) -> Vec<Violation> {
        validator.validate(&parse_document(xml.as_bytes()).unwrap())
    }

    const HTML_OPEN: &str = r#"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops"><head><title>t</title></head>"#;

    fn page(body: &str) -> String {
        format!("{}<body>{}</body></html>", HTML_OPEN, body)
    }

    #[test]
    fn test_xhtml_accepts_simple_page() {
        assert!(run(&XhtmlSchema, &page("<p id=\"p1\">Hi</p>")).is_empty());
    }

    #[test]
    fn test_xhtml_ids_and_images() {
        let violations = run(
            &XhtmlSchema,
            &page("<p id=\"a\"/><p id=\"a\"/><p id=\"1bad\"/><img alt=\"x\"/>"),
        );
        let messages: Vec<&str> = violations.iter().map(|v| v.message.as_str()).collect();
        assert_eq!(violations.len(), 3, "{:?}", messages);
        assert!(messages.iter().any(|m| m.contains("duplicate id 'a'")));
        assert!(messages.iter().any(|m| m.contains("'1bad'")));
    }

    #[test]
    fn test_xhtml_requires_head_and_body() {
        let violations = run(
            &XhtmlSchema,
            r#"<html xmlns="http://www.w3.org/1999/xhtml"><body/></html>"#,
        );
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_ops_rejects_html5_and_epub_attributes() {
        let violations = run(
            &OpsSchema,
            &page("<section epub:type=\"chapter\"><p>x</p></section>"),
        );
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().all(|v| v.code == "SCH_OPS"));
    }

    #[test]
    fn test_svg_root() {
        assert!(run(&SvgSchema, r#"<svg xmlns="http://www.w3.org/2000/svg"><g id="g1"/></svg>"#).is_empty());
        assert_eq!(run(&SvgSchema, "<svg/>").len(), 1);
    }

    #[test]
    fn test_edupub_sections_need_headings() {
        let violations = run(
            &EdupubSchema,
            &page("<section><h1>One</h1></section><section><p>untitled</p></section><section aria-label=\"x\"/>"),
        );
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_dictionary_entries() {
        let violations = run(
            &DictSchema,
            &page(
                "<article epub:type=\"dictentry\"><dfn>cat</dfn></article>\
                 <article epub:type=\"dictentry\"><p>dog</p></article>\
                 <div epub:type=\"dictentry\"/>",
            ),
        );
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn test_index_structure() {
        let ok = page(
            "<section epub:type=\"index\"><ul epub:type=\"index-entry-list\">\
             <li epub:type=\"index-entry\">term</li></ul></section>",
        );
        assert!(run(&IdxSchema, &ok).is_empty());

        let bad = page("<ol epub:type=\"index-entry-list\"/>");
        assert_eq!(run(&IdxSchema, &bad).len(), 2);
    }
}
