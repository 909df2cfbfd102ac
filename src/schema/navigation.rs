//! EPUB 3 navigation document rules.

use super::content::{epub_types, has_epub_type, heading_level};
use super::{Findings, SchemaValidator, Violation};
use crate::report::ValidationSeverity;
use crate::xml::{NodeId, XmlDocument, XHTML_NS};

/// `nav` elements and their list structure.
pub struct NavSchema;

const NAV_TYPES: &[&str] = &["toc", "page-list", "landmarks"];

impl SchemaValidator for NavSchema {
    fn id(&self) -> &'static str {
        "nav"
    }

    fn validate(&self, doc: &XmlDocument) -> Vec<Violation> {
        let mut findings = Findings::new("SCH_NAV");
        let navs: Vec<NodeId> = doc
            .descendants(doc.root_id())
            .into_iter()
            .filter(|id| doc.element(*id).is(XHTML_NS, "nav"))
            .collect();

        for kind in NAV_TYPES {
            let count = navs
                .iter()
                .filter(|id| has_epub_type(doc.element(**id), kind))
                .count();
            match (*kind, count) {
                ("toc", 0) => findings.error(
                    doc.root().location,
                    "navigation document must contain a 'toc' nav element",
                ),
                (_, 0 | 1) => {}
                _ => findings.error(
                    doc.root().location,
                    format!("navigation document must contain at most one '{}' nav", kind),
                ),
            }
        }

        for nav in &navs {
            check_nav(doc, *nav, &mut findings);
        }
        check_headings(doc, &mut findings);
        findings.finish()
    }
}

fn check_nav(doc: &XmlDocument, nav: NodeId, findings: &mut Findings) {
    let element = doc.element(nav);
    let typed = epub_types(element).any(|t| NAV_TYPES.contains(&t));

    let mut children = doc.children(nav).peekable();
    if children.peek().is_some_and(|id| heading_level(doc.element(*id)).is_some()) {
        children.next();
    }
    let list = match children.next() {
        Some(id) if doc.element(id).is(XHTML_NS, "ol") => id,
        _ => {
            if typed {
                findings.error(
                    element.location,
                    "nav must contain an optional heading followed by an 'ol' list",
                );
            }
            return;
        }
    };
    check_list(doc, list, has_epub_type(element, "landmarks"), findings);
}

fn check_list(doc: &XmlDocument, list: NodeId, landmarks: bool, findings: &mut Findings) {
    let mut items = 0;
    for item in doc.children(list) {
        let li = doc.element(item);
        if !li.is(XHTML_NS, "li") {
            findings.error(li.location, format!("'{}' is not allowed in a nav list", li.name.local));
            continue;
        }
        items += 1;

        let children: Vec<NodeId> = doc.children(item).collect();
        let Some(label_id) = children.first().copied() else {
            findings.error(li.location, "nav list items must contain an 'a' or 'span' label");
            continue;
        };
        let label = doc.element(label_id);
        let sublist = children
            .get(1)
            .copied()
            .filter(|id| doc.element(*id).is(XHTML_NS, "ol"));

        if label.is(XHTML_NS, "span") {
            if sublist.is_none() {
                findings.error(label.location, "a 'span' label must be followed by a nested 'ol'");
            }
        } else if label.is(XHTML_NS, "a") {
            if landmarks && epub_types(label).next().is_none() {
                findings.error(label.location, "landmarks links must declare an 'epub:type'");
            }
        } else {
            findings.error(li.location, "nav list items must start with an 'a' or 'span' label");
            continue;
        }

        if doc.text_content(label_id).trim().is_empty() && !has_image_alt(doc, label_id) {
            findings.error(label.location, "nav labels must not be empty");
        }
        if let Some(sublist) = sublist {
            check_list(doc, sublist, landmarks, findings);
        }
    }
    if items == 0 {
        findings.error(doc.element(list).location, "nav lists must contain at least one 'li'");
    }
}

fn has_image_alt(doc: &XmlDocument, id: NodeId) -> bool {
    doc.descendants(id).into_iter().any(|d| {
        let element = doc.element(d);
        element.is(XHTML_NS, "img") && element.attr("alt").is_some_and(|a| !a.trim().is_empty())
    })
}

/// Heading levels inside `nav` elements may not skip relative to the
/// previous heading in document order, and may not be empty.
fn check_headings(doc: &XmlDocument, findings: &mut Findings) {
    let mut previous: Option<u8> = None;
    for id in doc.descendants(doc.root_id()) {
        let element = doc.element(id);
        let Some(level) = heading_level(element) else {
            continue;
        };
        if doc.ancestor_named(id, XHTML_NS, "nav").is_some() {
            if let Some(previous) = previous {
                if level > previous + 1 {
                    findings.push(
                        "NAV_HEADING_SKIP",
                        ValidationSeverity::Error,
                        element.location,
                        format!(
                            "heading level skips from h{} to h{}",
                            previous, level
                        ),
                    );
                }
            }
            if doc.text_content(id).trim().is_empty() && !has_image_alt(doc, id) {
                findings.push(
                    "NAV_HEADING_EMPTY",
                    ValidationSeverity::Error,
                    element.location,
                    format!("heading 'h{}' must not be empty", level),
                );
            }
        }
        previous = Some(level);
    }
}
