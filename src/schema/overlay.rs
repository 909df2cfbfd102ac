//! NCX, SMIL media overlay and search-key map rules.

use std::collections::BTreeSet;

use super::{Findings, SchemaValidator, Violation};
use crate::xml::{NodeId, XmlDocument, NCX_NS, SEARCH_KEY_MAP_NS, SMIL_NS};

/// EPUB 2 NCX table of contents.
pub struct NcxSchema;

/// EPUB 3 media overlay documents.
pub struct SmilSchema;

/// EPUB 3 search-key map documents.
pub struct SearchKeyMapSchema;

impl SchemaValidator for NcxSchema {
    fn id(&self) -> &'static str {
        "ncx"
    }

    fn validate(&self, doc: &XmlDocument) -> Vec<Violation> {
        let mut findings = Findings::new("SCH_NCX");
        let root = doc.root();
        if !root.is(NCX_NS, "ncx") {
            findings.error(
                root.location,
                format!(
                    "root element must be 'ncx' in the NCX namespace, found '{}'",
                    root.name.qualified()
                ),
            );
            return findings.finish();
        }
        for required in ["head", "docTitle", "navMap"] {
            if doc.first_child_named(doc.root_id(), NCX_NS, required).is_none() {
                findings.error(
                    root.location,
                    format!("'ncx' is missing required element '{}'", required),
                );
            }
        }

        let mut ids = BTreeSet::new();
        for id in doc.descendants(doc.root_id()) {
            let element = doc.element(id);
            if let Some(value) = element.attr("id") {
                if !ids.insert(value) {
                    findings.error(element.location, format!("duplicate id '{}'", value));
                }
            }
            if !(element.is(NCX_NS, "navPoint") || element.is(NCX_NS, "pageTarget")) {
                continue;
            }
            let label = doc.first_child_named(id, NCX_NS, "navLabel");
            if label.is_none_or(|label| doc.text_content(label).trim().is_empty()) {
                findings.error(
                    element.location,
                    format!("'{}' must have a non-empty 'navLabel'", element.name.local),
                );
            }
            let content = doc.first_child_named(id, NCX_NS, "content");
            if content.is_none_or(|c| doc.element(c).attr("src").is_none_or(str::is_empty)) {
                findings.error(
                    element.location,
                    format!("'{}' must have a 'content' element with a 'src'", element.name.local),
                );
            }
            if let Some(order) = element.attr("playOrder") {
                if order.trim().parse::<u32>().is_err() {
                    findings.error(
                        element.location,
                        format!("'playOrder' must be a non-negative integer, found '{}'", order),
                    );
                }
            }
        }
        findings.finish()
    }
}

/// Seconds denoted by a SMIL clock value (full clock, partial clock or
/// timecount).
pub(crate) fn parse_clock(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.contains(':') {
        let parts: Vec<&str> = value.split(':').collect();
        let (hours, minutes, seconds) = match parts.as_slice() {
            [h, m, s] => (parse_digits(h)?, *m, *s),
            [m, s] => (0.0, *m, *s),
            _ => return None,
        };
        if minutes.len() != 2 {
            return None;
        }
        let minutes = parse_digits(minutes)?;
        let seconds = parse_seconds(seconds)?;
        if minutes >= 60.0 || seconds >= 60.0 {
            return None;
        }
        return Some(hours * 3600.0 + minutes * 60.0 + seconds);
    }

    if let Some(n) = value.strip_suffix("ms") {
        return Some(parse_decimal(n)? / 1000.0);
    }
    let (number, scale) = if let Some(n) = value.strip_suffix("min") {
        (n, 60.0)
    } else if let Some(n) = value.strip_suffix('h') {
        (n, 3600.0)
    } else if let Some(n) = value.strip_suffix('s') {
        (n, 1.0)
    } else {
        (value, 1.0)
    };
    Some(parse_decimal(number)? * scale)
}

fn parse_digits(value: &str) -> Option<f64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

fn parse_seconds(value: &str) -> Option<f64> {
    let (whole, _) = value.split_once('.').unwrap_or((value, ""));
    if whole.len() != 2 {
        return None;
    }
    parse_decimal(value)
}

fn parse_decimal(value: &str) -> Option<f64> {
    let (whole, fraction) = match value.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (value, None),
    };
    parse_digits(whole)?;
    if let Some(fraction) = fraction {
        parse_digits(fraction)?;
    }
    value.parse().ok()
}

impl SmilSchema {
    fn check_par(&self, doc: &XmlDocument, par: NodeId, findings: &mut Findings) {
        let element = doc.element(par);
        let texts: Vec<NodeId> = doc.children_named(par, SMIL_NS, "text").collect();
        if texts.len() != 1 {
            findings.error(element.location, "'par' must contain exactly one 'text' element");
        }
        if doc.children_named(par, SMIL_NS, "audio").count() > 1 {
            findings.error(element.location, "'par' must contain at most one 'audio' element");
        }
    }

    fn check_audio(&self, doc: &XmlDocument, audio: NodeId, findings: &mut Findings) {
        let element = doc.element(audio);
        let mut begin = Some(0.0);
        let mut end = None;
        for (attr, slot) in [("clipBegin", &mut begin), ("clipEnd", &mut end)] {
            let Some(value) = element.attr(attr) else {
                continue;
            };
            match parse_clock(value) {
                Some(seconds) => *slot = Some(seconds),
                None => {
                    *slot = None;
                    findings.error(
                        element.location,
                        format!("'{}' is not a valid clock value: '{}'", attr, value),
                    );
                }
            }
        }
        if let (Some(begin), Some(end)) = (begin, end) {
            if end <= begin {
                findings.error(element.location, "'clipEnd' must be after 'clipBegin'");
            }
        }
    }
}

impl SchemaValidator for SmilSchema {
    fn id(&self) -> &'static str {
        "smil"
    }

    fn validate(&self, doc: &XmlDocument) -> Vec<Violation> {
        let mut findings = Findings::new("SCH_SMIL");
        let root = doc.root();
        if !root.is(SMIL_NS, "smil") {
            findings.error(
                root.location,
                format!(
                    "root element must be 'smil' in the SMIL namespace, found '{}'",
                    root.name.qualified()
                ),
            );
            return findings.finish();
        }
        if root.attr("version") != Some("3.0") {
            findings.error(root.location, "media overlay 'version' must be \"3.0\"");
        }
        if doc.first_child_named(doc.root_id(), SMIL_NS, "body").is_none() {
            findings.error(root.location, "'smil' is missing required element 'body'");
        }

        for id in doc.descendants(doc.root_id()) {
            let element = doc.element(id);
            if element.name.namespace.as_deref() != Some(SMIL_NS) {
                continue;
            }
            match element.name.local.as_str() {
                "par" => self.check_par(doc, id, &mut findings),
                "text" | "audio" => {
                    if element.attr("src").is_none_or(str::is_empty) {
                        findings.error(
                            element.location,
                            format!("'{}' is missing required attribute 'src'", element.name.local),
                        );
                    }
                    if element.name.local == "audio" {
                        self.check_audio(doc, id, &mut findings);
                    }
                }
                _ => {}
            }
        }
        findings.finish()
    }
}

impl SchemaValidator for SearchKeyMapSchema {
    fn id(&self) -> &'static str {
        "search-key-map"
    }

    fn validate(&self, doc: &XmlDocument) -> Vec<Violation> {
        let mut findings = Findings::new("SCH_SEARCH_KEY_MAP");
        let root = doc.root();
        if !root.is(SEARCH_KEY_MAP_NS, "search-key-map") {
            findings.error(
                root.location,
                format!(
                    "root element must be 'search-key-map' in the search-key map namespace, found '{}'",
                    root.name.qualified()
                ),
            );
            return findings.finish();
        }

        let mut groups = 0;
        for group in doc.children_named(doc.root_id(), SEARCH_KEY_MAP_NS, "search-key-group") {
            groups += 1;
            let element = doc.element(group);
            if element.attr("href").is_none_or(|v| v.trim().is_empty()) {
                findings.error(element.location, "'search-key-group' is missing required attribute 'href'");
            }
            let mut matches = 0;
            for matched in doc.children_named(group, SEARCH_KEY_MAP_NS, "match") {
                matches += 1;
                let m = doc.element(matched);
                if m.attr("value").is_none_or(|v| v.trim().is_empty()) {
                    findings.error(m.location, "'match' is missing required attribute 'value'");
                }
            }
            if matches == 0 {
                findings.error(element.location, "'search-key-group' must contain at least one 'match'");
            }
        }
        if groups == 0 {
            findings.error(root.location, "'search-key-map' must contain at least one 'search-key-group'");
        }
        findings.finish()
    }
}
