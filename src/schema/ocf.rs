use super::{Findings, SchemaValidator, Violation};
use crate::xml::{XmlDocument, CONTAINER_NS};

/// `META-INF/container.xml` structure.
pub struct ContainerSchema;

impl SchemaValidator for ContainerSchema {
    fn id(&self) -> &'static str {
        "container"
    }

    fn validate(&self, doc: &XmlDocument) -> Vec<Violation> {
        let mut findings = Findings::new("SCH_CONTAINER");
        let root = doc.root();
        if !root.is(CONTAINER_NS, "container") {
            findings.error(
                root.location,
                format!(
                    "root element must be 'container' in the OCF namespace, found '{}'",
                    root.name.qualified()
                ),
            );
            return findings.finish();
        }
        if root.attr("version") != Some("1.0") {
            findings.error(root.location, "container 'version' must be \"1.0\"");
        }

        let Some(rootfiles) = doc.first_child_named(doc.root_id(), CONTAINER_NS, "rootfiles")
        else {
            findings.error(root.location, "missing required 'rootfiles' element");
            return findings.finish();
        };

        let mut count = 0;
        for rootfile in doc.children_named(rootfiles, CONTAINER_NS, "rootfile") {
            count += 1;
            let element = doc.element(rootfile);
            for attr in ["full-path", "media-type"] {
                if element.attr(attr).is_none_or(|v| v.trim().is_empty()) {
                    findings.error(
                        element.location,
                        format!("rootfile is missing required attribute '{}'", attr),
                    );
                }
            }
        }
        if count == 0 {
            findings.error(
                doc.element(rootfiles).location,
                "'rootfiles' must contain at least one 'rootfile'",
            );
        }
        findings.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;

    fn run(xml: &str) -> Vec<Violation> {
        ContainerSchema.validate(&parse_document(xml.as_bytes()).unwrap())
    }

    #[test]
    fn test_valid_container() {
        let violations = run(r#"<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="EPUB/package.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#);
        assert!(violations.is_empty(), "{:?}", violations);
    }

    #[test]
    fn test_missing_attributes_and_version() {
        let violations = run(r#"<container xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path=""/></rootfiles>
</container>"#);
        assert_eq!(violations.len(), 3);
    }

    #[test]
    fn test_wrong_namespace() {
        let violations = run(r#"<container version="1.0"><rootfiles/></container>"#);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("OCF namespace"));
    }
}
