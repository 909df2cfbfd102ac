//! XML event pipeline.
//!
//! A resource is parsed exactly once into an [`XmlDocument`]: the ordered
//! event stream plus an element arena with resolved namespaces and source
//! positions. The document is then fed to every validator of the resource's
//! schema chain and replayed into one semantic [`XmlHandler`]. A
//! well-formedness failure stops at the first fatal error; nothing is fed
//! downstream for that resource.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::context::ValidationContext;
use crate::report::{CheckReport, Location, ValidationDiagnostic};

/// Namespace bound to the reserved `xml:` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
/// XHTML namespace.
pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";
/// EPUB operations namespace (`epub:type` and friends).
pub const EPUB_OPS_NS: &str = "http://www.idpf.org/2007/ops";
/// OPF package namespace.
pub const OPF_NS: &str = "http://www.idpf.org/2007/opf";
/// Dublin Core elements namespace.
pub const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
/// OCF container namespace.
pub const CONTAINER_NS: &str = "urn:oasis:names:tc:opendocument:xmlns:container";
/// NCX namespace.
pub const NCX_NS: &str = "http://www.daisy.org/z3986/2005/ncx/";
/// SMIL namespace.
pub const SMIL_NS: &str = "http://www.w3.org/ns/SMIL";
/// SVG namespace.
pub const SVG_NS: &str = "http://www.w3.org/2000/svg";
/// XLink namespace.
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
/// XML Encryption namespace.
pub const XMLENC_NS: &str = "http://www.w3.org/2001/04/xmlenc#";
/// Search key map namespace.
pub const SEARCH_KEY_MAP_NS: &str = "http://www.idpf.org/2016/search-key-map";

const BOM: &str = "\u{FEFF}";

/// Index of an element in the document arena.
pub type NodeId = usize;

/// Namespace-resolved element or attribute name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QName {
    /// Namespace URI, if the name is in one.
    pub namespace: Option<String>,
    /// Local part.
    pub local: String,
    /// Prefix as written in the source.
    pub prefix: Option<String>,
}

impl QName {
    /// Whether this is `local` in namespace `ns`.
    pub fn is(&self, ns: &str, local: &str) -> bool {
        self.local == local && self.namespace.as_deref() == Some(ns)
    }

    /// Name as written in the source (`prefix:local`).
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.local),
            None => self.local.clone(),
        }
    }
}

/// Attribute with its value unescaped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XmlAttribute {
    /// Resolved name. Unprefixed attributes are in no namespace.
    pub name: QName,
    /// Unescaped value.
    pub value: String,
}

/// Child of an element, in document order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Content {
    /// Nested element.
    Element(NodeId),
    /// Character data (text, CDATA and resolved references merged).
    Text(String),
}

/// Element node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    /// Resolved name.
    pub name: QName,
    /// Attributes in source order, namespace declarations excluded.
    pub attributes: Vec<XmlAttribute>,
    /// Position of the start tag.
    pub location: Location,
    /// Parent element.
    pub parent: Option<NodeId>,
    /// Children in document order.
    pub content: Vec<Content>,
}

impl Element {
    /// Whether this element is `local` in namespace `ns`.
    pub fn is(&self, ns: &str, local: &str) -> bool {
        self.name.is(ns, local)
    }

    /// Value of the unprefixed attribute `local`.
    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.namespace.is_none() && a.name.local == local)
            .map(|a| a.value.as_str())
    }

    /// Value of attribute `local` in namespace `ns`.
    pub fn attr_ns(&self, ns: &str, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.is(ns, local))
            .map(|a| a.value.as_str())
    }
}

/// One entry of the ordered event stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum XmlEvent {
    /// Start tag (self-closing tags produce a start and an end).
    Start(NodeId),
    /// End tag.
    End(NodeId),
    /// Character data.
    Text {
        /// Text content.
        text: String,
        /// Where the text starts.
        location: Location,
    },
}

/// A parsed, well-formed XML resource.
#[derive(Clone, Debug)]
pub struct XmlDocument {
    events: Vec<XmlEvent>,
    elements: Vec<Element>,
    doctype: Option<String>,
    declared_encoding: Option<String>,
}

impl XmlDocument {
    /// Ordered event stream.
    pub fn events(&self) -> &[XmlEvent] {
        &self.events
    }

    /// Root element id (always 0).
    pub fn root_id(&self) -> NodeId {
        0
    }

    /// Root element.
    pub fn root(&self) -> &Element {
        &self.elements[0]
    }

    /// Element by id.
    pub fn element(&self, id: NodeId) -> &Element {
        &self.elements[id]
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Always false for a parsed document; there is at least a root.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// DOCTYPE declaration content, if any.
    pub fn doctype(&self) -> Option<&str> {
        self.doctype.as_deref()
    }

    /// Encoding named in the XML declaration.
    pub fn declared_encoding(&self) -> Option<&str> {
        self.declared_encoding.as_deref()
    }

    /// Element children of `id`.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.elements[id].content.iter().filter_map(|c| match c {
            Content::Element(child) => Some(*child),
            Content::Text(_) => None,
        })
    }

    /// Element children of `id` named `local` in `ns`.
    pub fn children_named<'a>(
        &'a self,
        id: NodeId,
        ns: &'a str,
        local: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.children(id)
            .filter(move |child| self.elements[*child].is(ns, local))
    }

    /// First element child of `id` named `local` in `ns`.
    pub fn first_child_named(&self, id: NodeId, ns: &str, local: &str) -> Option<NodeId> {
        self.children_named(id, ns, local).next()
    }

    /// All descendant elements of `id` in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).collect();
        stack.reverse();
        while let Some(next) = stack.pop() {
            out.push(next);
            let start = stack.len();
            stack.extend(self.children(next));
            stack[start..].reverse();
        }
        out
    }

    /// Concatenated text of `id` and its descendants.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        for content in &self.elements[id].content {
            match content {
                Content::Text(text) => out.push_str(text),
                Content::Element(child) => self.collect_text(*child, out),
            }
        }
    }

    /// Nearest ancestor of `id` (excluding itself) named `local` in `ns`.
    pub fn ancestor_named(&self, id: NodeId, ns: &str, local: &str) -> Option<NodeId> {
        let mut cursor = self.elements[id].parent;
        while let Some(parent) = cursor {
            if self.elements[parent].is(ns, local) {
                return Some(parent);
            }
            cursor = self.elements[parent].parent;
        }
        None
    }
}

/// First well-formedness error of a resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XmlFatal {
    /// Description of the error.
    pub message: String,
    /// Where parsing stopped.
    pub location: Location,
}

struct LineIndex<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(text: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { text, line_starts }
    }

    fn location(&self, offset: u64) -> Location {
        let offset = usize::try_from(offset)
            .unwrap_or(usize::MAX)
            .min(self.text.len());
        let line = self.line_starts.partition_point(|start| *start <= offset);
        let start = self.line_starts[line - 1];
        let column = match self.text.get(start..offset) {
            Some(slice) => slice.chars().count(),
            None => offset - start,
        };
        Location::new(line as u32, column as u32 + 1)
    }
}

struct TreeBuilder {
    events: Vec<XmlEvent>,
    elements: Vec<Element>,
    open: Vec<NodeId>,
    scopes: Vec<Vec<(String, String)>>,
    doctype: Option<String>,
    declared_encoding: Option<String>,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            events: Vec::new(),
            elements: Vec::new(),
            open: Vec::new(),
            scopes: Vec::new(),
            doctype: None,
            declared_encoding: None,
        }
    }

    fn lookup(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NS);
        }
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    fn resolve(&self, raw: &str, is_attribute: bool) -> Result<QName, String> {
        match raw.split_once(':') {
            Some((prefix, local)) => {
                let ns = self
                    .lookup(prefix)
                    .ok_or_else(|| format!("namespace prefix '{}' is not bound", prefix))?;
                Ok(QName {
                    namespace: Some(ns.to_string()),
                    local: local.to_string(),
                    prefix: Some(prefix.to_string()),
                })
            }
            None => {
                let namespace = if is_attribute {
                    None
                } else {
                    self.lookup("").filter(|uri| !uri.is_empty()).map(str::to_string)
                };
                Ok(QName {
                    namespace,
                    local: raw.to_string(),
                    prefix: None,
                })
            }
        }
    }

    fn open_element(
        &mut self,
        reader: &Reader<&[u8]>,
        start: &BytesStart<'_>,
        location: Location,
        self_closing: bool,
    ) -> Result<(), String> {
        if self.open.is_empty() && !self.elements.is_empty() {
            return Err("document has more than one root element".to_string());
        }

        let raw_name = reader
            .decoder()
            .decode(start.name().as_ref())
            .map_err(|e| format!("decode error: {:?}", e))?
            .to_string();

        let mut scope = Vec::new();
        let mut raw_attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| format!("malformed attribute: {}", e))?;
            let key = reader
                .decoder()
                .decode(attr.key.as_ref())
                .map_err(|e| format!("decode error: {:?}", e))?
                .to_string();
            let raw_value = reader
                .decoder()
                .decode(&attr.value)
                .map_err(|e| format!("decode error: {:?}", e))?;
            let value = match quick_xml::escape::unescape(&raw_value) {
                Ok(value) => value.into_owned(),
                Err(_) if self.doctype.is_some() => raw_value.into_owned(),
                Err(e) => return Err(format!("attribute '{}': {}", key, e)),
            };
            if key == "xmlns" {
                scope.push((String::new(), value));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                if value.is_empty() {
                    return Err(format!("namespace prefix '{}' bound to empty URI", prefix));
                }
                scope.push((prefix.to_string(), value));
            } else {
                raw_attributes.push((key, value));
            }
        }
        self.scopes.push(scope);

        let name = self.resolve(&raw_name, false)?;
        let mut attributes = Vec::with_capacity(raw_attributes.len());
        for (key, value) in raw_attributes {
            let attr_name = self.resolve(&key, true)?;
            let repeated = attributes.iter().any(|a: &XmlAttribute| {
                a.name.namespace == attr_name.namespace && a.name.local == attr_name.local
            });
            if repeated {
                return Err(format!("attribute '{}' is repeated", key));
            }
            attributes.push(XmlAttribute {
                name: attr_name,
                value,
            });
        }

        let id = self.elements.len();
        let parent = self.open.last().copied();
        if let Some(parent) = parent {
            self.elements[parent].content.push(Content::Element(id));
        }
        self.elements.push(Element {
            name,
            attributes,
            location,
            parent,
            content: Vec::new(),
        });
        self.events.push(XmlEvent::Start(id));
        self.open.push(id);

        if self_closing {
            self.close_element();
        }
        Ok(())
    }

    fn close_element(&mut self) {
        if let Some(id) = self.open.pop() {
            self.scopes.pop();
            self.events.push(XmlEvent::End(id));
        }
    }

    fn text(&mut self, text: &str, location: Location) -> Result<(), String> {
        let Some(&current) = self.open.last() else {
            if text.trim().is_empty() {
                return Ok(());
            }
            return Err("text content outside the root element".to_string());
        };
        if text.is_empty() {
            return Ok(());
        }
        if let Some(XmlEvent::Text { text: last, .. }) = self.events.last_mut() {
            last.push_str(text);
            if let Some(Content::Text(content)) = self.elements[current].content.last_mut() {
                content.push_str(text);
            }
            return Ok(());
        }
        self.events.push(XmlEvent::Text {
            text: text.to_string(),
            location,
        });
        self.elements[current]
            .content
            .push(Content::Text(text.to_string()));
        Ok(())
    }
}

/// Parse `bytes` into a document, stopping at the first well-formedness error.
pub fn parse_document(bytes: &[u8]) -> Result<XmlDocument, XmlFatal> {
    let text = core::str::from_utf8(bytes).map_err(|e| {
        let prefix = core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default();
        XmlFatal {
            message: "resource is not valid UTF-8".to_string(),
            location: LineIndex::new(prefix).location(prefix.len() as u64),
        }
    })?;
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let index = LineIndex::new(text);

    let mut reader = Reader::from_reader(text.as_bytes());
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = true;

    let mut builder = TreeBuilder::new();
    let mut buf = Vec::new();
    loop {
        let position = reader.buffer_position();
        let location = index.location(position);
        let fatal = |message: String| XmlFatal { message, location };

        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => builder
                .open_element(&reader, &e, location, false)
                .map_err(fatal)?,
            Ok(Event::Empty(e)) => builder
                .open_element(&reader, &e, location, true)
                .map_err(fatal)?,
            Ok(Event::End(_)) => builder.close_element(),
            Ok(Event::Text(e)) => {
                let text = reader
                    .decoder()
                    .decode(&e)
                    .map_err(|e| fatal(format!("decode error: {:?}", e)))?;
                builder.text(&text, location).map_err(fatal)?;
            }
            Ok(Event::CData(e)) => {
                let text = reader
                    .decoder()
                    .decode(&e)
                    .map_err(|e| fatal(format!("decode error: {:?}", e)))?;
                builder.text(&text, location).map_err(fatal)?;
            }
            Ok(Event::GeneralRef(e)) => {
                let entity_name = e
                    .decode()
                    .map_err(|err| fatal(format!("decode error: {:?}", err)))?;
                let entity = format!("&{};", entity_name);
                let resolved = match quick_xml::escape::unescape(&entity) {
                    Ok(resolved) => resolved.into_owned(),
                    Err(_) if builder.doctype.is_some() => String::new(),
                    Err(_) => {
                        return Err(fatal(format!(
                            "entity '{}' was referenced but not declared",
                            entity
                        )))
                    }
                };
                builder.text(&resolved, location).map_err(fatal)?;
            }
            Ok(Event::DocType(e)) => {
                if !builder.elements.is_empty() {
                    return Err(fatal("DOCTYPE after the root element".to_string()));
                }
                let doctype = reader
                    .decoder()
                    .decode(&e)
                    .map_err(|e| fatal(format!("decode error: {:?}", e)))?;
                builder.doctype = Some(doctype.trim().to_string());
            }
            Ok(Event::Decl(decl)) => {
                builder.declared_encoding = decl
                    .encoding()
                    .and_then(|enc| enc.ok())
                    .map(|enc| String::from_utf8_lossy(&enc).into_owned());
            }
            Ok(Event::Comment(_)) | Ok(Event::PI(_)) => {}
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(XmlFatal {
                    message: err.to_string(),
                    location: index.location(reader.error_position()),
                })
            }
        }
        buf.clear();
    }

    let end = index.location(text.len() as u64);
    if let Some(&unclosed) = builder.open.last() {
        return Err(XmlFatal {
            message: format!(
                "element '{}' is not closed",
                builder.elements[unclosed].name.qualified()
            ),
            location: end,
        });
    }
    if builder.elements.is_empty() {
        return Err(XmlFatal {
            message: "document has no root element".to_string(),
            location: end,
        });
    }

    Ok(XmlDocument {
        events: builder.events,
        elements: builder.elements,
        doctype: builder.doctype,
        declared_encoding: builder.declared_encoding,
    })
}

/// Semantic consumer of a document's event stream.
pub trait XmlHandler {
    /// Called for every start tag.
    fn start_element(&mut self, doc: &XmlDocument, id: NodeId);

    /// Called for every end tag.
    fn end_element(&mut self, _doc: &XmlDocument, _id: NodeId) {}

    /// Called for every run of character data.
    fn text(&mut self, _doc: &XmlDocument, _text: &str, _location: Location) {}
}

/// Replay a document's events into `handler`.
pub fn drive(doc: &XmlDocument, handler: &mut dyn XmlHandler) {
    for event in doc.events() {
        match event {
            XmlEvent::Start(id) => handler.start_element(doc, *id),
            XmlEvent::End(id) => handler.end_element(doc, *id),
            XmlEvent::Text { text, location } => handler.text(doc, text, *location),
        }
    }
}

/// Outcome of parsing a resource that was read ahead of its check.
pub type ParsedXml = Result<XmlDocument, XmlFatal>;

/// Run the schema chain over a resource that is already parsed.
///
/// Returns false after reporting the fatal well-formedness error.
pub fn validate_parsed(
    ctx: &ValidationContext,
    parsed: Result<&XmlDocument, &XmlFatal>,
    report: &mut CheckReport,
) -> bool {
    let doc = match parsed {
        Ok(doc) => doc,
        Err(fatal) => {
            log::debug!("[XML] {} is not well-formed: {}", ctx.path(), fatal.message);
            report.push(
                ValidationDiagnostic::fatal("RSC_XML_MALFORMED", fatal.message.clone())
                    .at(Some(fatal.location)),
            );
            return false;
        }
    };

    if let Some(encoding) = doc.declared_encoding() {
        if !encoding.eq_ignore_ascii_case("utf-8") {
            report.error(
                "RSC_XML_ENCODING",
                Some(Location::new(1, 1)),
                format!("XML documents must be encoded in UTF-8, found '{}'", encoding),
            );
        }
    }

    let chain = ctx.schemas().select(ctx);
    log::debug!(
        "[XML] {} -> schema chain [{}]",
        ctx.path(),
        chain.ids().collect::<Vec<_>>().join(", ")
    );
    for validator in chain.iter() {
        for violation in validator.validate(doc) {
            report.push(violation.into_diagnostic());
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolves_namespaces_and_positions() {
        let doc = parse_document(
            b"<?xml version=\"1.0\"?>\n<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\">\n  <body epub:type=\"bodymatter\" xml:lang=\"en\"/>\n</html>",
        )
        .unwrap();
        let root = doc.root();
        assert!(root.is(XHTML_NS, "html"));
        assert_eq!(root.location, Location::new(2, 1));
        assert!(root.attributes.is_empty());

        let body = doc.first_child_named(doc.root_id(), XHTML_NS, "body").unwrap();
        let body = doc.element(body);
        assert_eq!(body.location, Location::new(3, 3));
        assert_eq!(body.attr_ns(EPUB_OPS_NS, "type"), Some("bodymatter"));
        assert_eq!(body.attr_ns(XML_NS, "lang"), Some("en"));
        assert_eq!(body.attr("type"), None);
    }

    #[test]
    fn test_self_closing_produces_start_and_end() {
        let doc = parse_document(b"<a><b/></a>").unwrap();
        assert_eq!(
            doc.events(),
            &[
                XmlEvent::Start(0),
                XmlEvent::Start(1),
                XmlEvent::End(1),
                XmlEvent::End(0)
            ]
        );
    }

    #[test]
    fn test_text_and_references_merge() {
        let doc = parse_document(b"<p>Fish &amp; chips &#8212; <i>hot</i></p>").unwrap();
        assert_eq!(doc.text_content(0), "Fish & chips \u{2014} hot");
        let texts: Vec<_> = doc
            .events()
            .iter()
            .filter(|e| matches!(e, XmlEvent::Text { .. }))
            .collect();
        assert_eq!(texts.len(), 2);
    }

    #[test]
    fn test_attribute_values_unescaped() {
        let doc = parse_document(b"<a href=\"x.xhtml?a=1&amp;b=2\"/>").unwrap();
        assert_eq!(doc.root().attr("href"), Some("x.xhtml?a=1&b=2"));
    }

    #[test]
    fn test_bom_is_skipped() {
        let doc = parse_document("\u{FEFF}<root/>".as_bytes()).unwrap();
        assert_eq!(doc.root().location, Location::new(1, 1));
    }

    #[test]
    fn test_mismatched_end_tag_is_fatal() {
        let err = parse_document(b"<a>\n<b></c></a>").unwrap_err();
        assert_eq!(err.location.line, 2);
    }

    #[test]
    fn test_unclosed_root_is_fatal() {
        let err = parse_document(b"<a><b></b>").unwrap_err();
        assert!(err.message.contains("not closed"));
    }

    #[test]
    fn test_second_root_is_fatal() {
        assert!(parse_document(b"<a/><b/>").is_err());
        assert!(parse_document(b"<a/>trailing").is_err());
        assert!(parse_document(b"   ").is_err());
    }

    #[test]
    fn test_unbound_prefix_is_fatal() {
        let err = parse_document(b"<epub:a/>").unwrap_err();
        assert!(err.message.contains("not bound"));
    }

    #[test]
    fn test_unknown_entity_needs_doctype() {
        assert!(parse_document(b"<p>&nbsp;</p>").is_err());
        assert!(parse_document(b"<!DOCTYPE html><p>&nbsp;</p>").is_ok());
    }

    #[test]
    fn test_invalid_utf8_is_fatal() {
        let err = parse_document(b"<a>\n\xFF</a>").unwrap_err();
        assert_eq!(err.location.line, 2);
    }

    #[test]
    fn test_descendants_in_document_order() {
        let doc = parse_document(b"<a><b><c/></b><d/></a>").unwrap();
        let names: Vec<_> = doc
            .descendants(0)
            .into_iter()
            .map(|id| doc.element(id).name.local.clone())
            .collect();
        assert_eq!(names, vec!["b", "c", "d"]);
    }

    struct Counter {
        starts: usize,
        ends: usize,
        text: String,
    }

    impl XmlHandler for Counter {
        fn start_element(&mut self, _doc: &XmlDocument, _id: NodeId) {
            self.starts += 1;
        }

        fn end_element(&mut self, _doc: &XmlDocument, _id: NodeId) {
            self.ends += 1;
        }

        fn text(&mut self, _doc: &XmlDocument, text: &str, _location: Location) {
            self.text.push_str(text);
        }
    }

    #[test]
    fn test_drive_replays_events() {
        let doc = parse_document(b"<a>x<b/>y</a>").unwrap();
        let mut counter = Counter {
            starts: 0,
            ends: 0,
            text: String::new(),
        };
        drive(&doc, &mut counter);
        assert_eq!(counter.starts, 2);
        assert_eq!(counter.ends, 2);
        assert_eq!(counter.text, "xy");
    }
}
