//! Package document (OPF) rules.

use super::{Findings, SchemaValidator, Violation};
use crate::xml::{NodeId, XmlDocument, DC_NS, OPF_NS};

/// Rules shared by every package document version.
pub struct PackageSchema;

/// EPUB 3 package rules.
pub struct Package30Schema;

/// EPUB 2 package rules.
pub struct Package20Schema;

fn section(doc: &XmlDocument, name: &str) -> Option<NodeId> {
    doc.first_child_named(doc.root_id(), OPF_NS, name)
}

impl SchemaValidator for PackageSchema {
    fn id(&self) -> &'static str {
        "opf"
    }

    fn validate(&self, doc: &XmlDocument) -> Vec<Violation> {
        let mut findings = Findings::new("SCH_OPF");
        let root = doc.root();
        if !root.is(OPF_NS, "package") {
            findings.error(
                root.location,
                format!(
                    "root element must be 'package' in the OPF namespace, found '{}'",
                    root.name.qualified()
                ),
            );
            return findings.finish();
        }
        if root.attr("version").is_none_or(|v| v.trim().is_empty()) {
            findings.error(root.location, "package is missing required attribute 'version'");
        }

        for required in ["metadata", "manifest", "spine"] {
            if section(doc, required).is_none() {
                findings.error(
                    root.location,
                    format!("package is missing required element '{}'", required),
                );
            }
        }

        if let Some(metadata) = section(doc, "metadata") {
            for name in ["title", "identifier", "language"] {
                let present = doc
                    .children_named(metadata, DC_NS, name)
                    .any(|id| !doc.text_content(id).trim().is_empty());
                if !present {
                    findings.error(
                        doc.element(metadata).location,
                        format!("metadata must contain a non-empty 'dc:{}'", name),
                    );
                }
            }

            match root.attr("unique-identifier") {
                None => findings.error(
                    root.location,
                    "package is missing required attribute 'unique-identifier'",
                ),
                Some(unique) => {
                    let matched = doc
                        .children_named(metadata, DC_NS, "identifier")
                        .any(|id| doc.element(id).attr("id") == Some(unique));
                    if !matched {
                        findings.error(
                            root.location,
                            format!(
                                "unique-identifier '{}' does not match any dc:identifier id",
                                unique
                            ),
                        );
                    }
                }
            }
        }

        if let Some(manifest) = section(doc, "manifest") {
            let mut count = 0;
            for item in doc.children_named(manifest, OPF_NS, "item") {
                count += 1;
                let element = doc.element(item);
                for attr in ["id", "href", "media-type"] {
                    if element.attr(attr).is_none_or(|v| v.trim().is_empty()) {
                        findings.error(
                            element.location,
                            format!("manifest item is missing required attribute '{}'", attr),
                        );
                    }
                }
            }
            if count == 0 {
                findings.error(
                    doc.element(manifest).location,
                    "manifest must contain at least one item",
                );
            }
        }

        if let Some(spine) = section(doc, "spine") {
            for itemref in doc.children_named(spine, OPF_NS, "itemref") {
                let element = doc.element(itemref);
                if element.attr("idref").is_none_or(|v| v.trim().is_empty()) {
                    findings.error(element.location, "itemref is missing required attribute 'idref'");
                }
                if let Some(linear) = element.attr("linear") {
                    if linear != "yes" && linear != "no" {
                        findings.error(
                            element.location,
                            format!("itemref 'linear' must be \"yes\" or \"no\", found '{}'", linear),
                        );
                    }
                }
            }
        }

        findings.finish()
    }
}

/// Whether `value` has the `CCYY-MM-DDThh:mm:ssZ` shape.
fn is_modified_timestamp(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 20 {
        return false;
    }
    bytes.iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        10 => *b == b'T',
        13 | 16 => *b == b':',
        19 => *b == b'Z',
        _ => b.is_ascii_digit(),
    })
}

impl SchemaValidator for Package30Schema {
    fn id(&self) -> &'static str {
        "opf30"
    }

    fn validate(&self, doc: &XmlDocument) -> Vec<Violation> {
        let mut findings = Findings::new("SCH_OPF30");
        let Some(metadata) = section(doc, "metadata") else {
            return findings.finish();
        };

        let modified: Vec<NodeId> = doc
            .children_named(metadata, OPF_NS, "meta")
            .filter(|id| doc.element(*id).attr("property") == Some("dcterms:modified"))
            .collect();
        match modified.as_slice() {
            [] => findings.error(
                doc.element(metadata).location,
                "metadata must contain exactly one 'dcterms:modified' meta",
            ),
            [one] => {
                let value = doc.text_content(*one);
                if !is_modified_timestamp(value.trim()) {
                    findings.error(
                        doc.element(*one).location,
                        format!(
                            "dcterms:modified must be of the form CCYY-MM-DDThh:mm:ssZ, found '{}'",
                            value.trim()
                        ),
                    );
                }
            }
            [_, rest @ ..] => {
                for extra in rest {
                    findings.error(
                        doc.element(*extra).location,
                        "metadata must contain exactly one 'dcterms:modified' meta",
                    );
                }
            }
        }

        for meta in doc.children_named(metadata, OPF_NS, "meta") {
            let element = doc.element(meta);
            if element.attr("property").is_some() && doc.text_content(meta).trim().is_empty() {
                findings.error(element.location, "meta element must not be empty");
            }
        }

        if let Some(manifest) = section(doc, "manifest") {
            let navs = doc
                .children_named(manifest, OPF_NS, "item")
                .filter(|id| {
                    doc.element(*id)
                        .attr("properties")
                        .is_some_and(|p| p.split_whitespace().any(|t| t == "nav"))
                })
                .count();
            if navs > 1 {
                findings.error(
                    doc.element(manifest).location,
                    "exactly one manifest item must declare the 'nav' property",
                );
            }
        }

        findings.finish()
    }
}

impl SchemaValidator for Package20Schema {
    fn id(&self) -> &'static str {
        "opf20"
    }

    fn validate(&self, doc: &XmlDocument) -> Vec<Violation> {
        let mut findings = Findings::new("SCH_OPF20");
        if let Some(spine) = section(doc, "spine") {
            let element = doc.element(spine);
            if element.attr("toc").is_none_or(|v| v.trim().is_empty()) {
                findings.error(element.location, "spine is missing required attribute 'toc'");
            }
        }
        if let Some(manifest) = section(doc, "manifest") {
            for item in doc.children_named(manifest, OPF_NS, "item") {
                let element = doc.element(item);
                if element.attr("properties").is_some() {
                    findings.error(
                        element.location,
                        "attribute 'properties' is not allowed on EPUB 2 manifest items",
                    );
                }
            }
        }
        findings.finish()
    }
}
