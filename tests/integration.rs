mod common;

use std::io::Cursor;

use common::{build_zip, chapter, package, publication, write_directory, Entry};
use epub_validator::{
    validate_directory, validate_epub_file, validate_epub_reader, validate_path,
    validate_single_bytes, EpubVersion, ValidationMode, ValidationOptions, ValidationReport,
    ValidationSeverity,
};

const TWO_CHAPTERS: &str = r#"<item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/>
    <item id="c2" href="c2.xhtml" media-type="application/xhtml+xml"/>"#;

fn validate_zip(entries: &[Entry]) -> ValidationReport {
    validate_epub_reader(Cursor::new(build_zip(entries)), &ValidationOptions::default())
}

fn nav_options() -> ValidationOptions {
    ValidationOptions::default().with_mode(ValidationMode::SingleFile {
        media_type: None,
        version: EpubVersion::V3,
        properties: vec!["nav".to_string()],
    })
}

fn valid_entries() -> Vec<Entry> {
    let opf = package(TWO_CHAPTERS, &["c1", "c2"]);
    let c1 = chapter("One", r#"<p id="p1"><a href="c2.xhtml#p2">next</a></p>"#);
    let c2 = chapter("Two", r#"<p id="p2"><a href="c1.xhtml#p1">back</a></p>"#);
    publication(&opf, &[("EPUB/c1.xhtml", &c1), ("EPUB/c2.xhtml", &c2)])
}

#[test]
fn test_valid_publication() {
    let report = validate_zip(&valid_entries());
    assert!(report.is_valid(), "{:?}", report);
    assert_eq!(report.unverified_count(), 0);
}

#[test]
fn test_mimetype_not_first_is_one_layout_error() {
    let mut entries = valid_entries();
    let mimetype = entries.remove(0);
    entries.insert(1, mimetype);

    let report = validate_zip(&entries);
    assert!(!report.is_valid());
    assert_eq!(report.with_code("OCF_MIMETYPE_LAYOUT").count(), 1, "{:?}", report);
    assert_eq!(report.error_count(), 1);
    assert_eq!(report.fatal_count(), 0);
}

#[test]
fn test_compressed_mimetype_is_one_layout_error() {
    let mut entries = valid_entries();
    entries[0] = Entry::deflated("mimetype", "application/epub+zip");

    let report = validate_zip(&entries);
    assert!(!report.is_valid());
    assert_eq!(report.with_code("OCF_MIMETYPE_LAYOUT").count(), 1, "{:?}", report);
    assert_eq!(report.error_count(), 1);
}

#[test]
fn test_missing_mimetype_is_fatal() {
    let mut entries = valid_entries();
    entries.remove(0);

    let report = validate_zip(&entries);
    assert_eq!(report.with_code("OCF_MIMETYPE_MISSING").count(), 1, "{:?}", report);
    assert_eq!(report.fatal_count(), 1);
}

#[test]
fn test_missing_container_xml_stops_the_run() {
    let entries: Vec<Entry> = valid_entries()
        .into_iter()
        .filter(|e| e.name != "META-INF/container.xml")
        .collect();

    let report = validate_zip(&entries);
    assert_eq!(report.with_code("OCF_CONTAINER_XML_MISSING").count(), 1, "{:?}", report);
    assert_eq!(report.fatal_count(), 1);
    assert_eq!(report.error_count(), 0);
}

fn broken_link_entries(reverse: bool) -> Vec<Entry> {
    let opf = package(TWO_CHAPTERS, &["c1", "c2"]);
    let c1 = chapter(
        "One",
        r#"<p><img src="missing.png" alt=""/><a href="c2.xhtml">next</a></p>"#,
    );
    let c2 = chapter(
        "Two",
        r#"<p><a href="gone.xhtml#x">gone</a><img src="missing.png" alt=""/></p>"#,
    );
    let mut files = vec![("EPUB/c1.xhtml", c1.as_str()), ("EPUB/c2.xhtml", c2.as_str())];
    if reverse {
        files.reverse();
    }
    publication(&opf, &files)
}

#[test]
fn test_each_missing_reference_is_reported_once() {
    let report = validate_zip(&broken_link_entries(false));
    assert_eq!(report.with_code("XREF_UNRESOLVED").count(), 3, "{:?}", report);
    assert_eq!(report.error_count(), 3);
    assert!(report
        .with_code("XREF_UNRESOLVED")
        .all(|d| d.severity == ValidationSeverity::Error));

    let sources: Vec<_> = report
        .with_code("XREF_UNRESOLVED")
        .filter_map(|d| d.path.as_deref())
        .collect();
    assert_eq!(sources.iter().filter(|p| **p == "EPUB/c1.xhtml").count(), 1);
    assert_eq!(sources.iter().filter(|p| **p == "EPUB/c2.xhtml").count(), 2);
}

#[test]
fn test_report_does_not_depend_on_entry_order() {
    let forward = validate_zip(&broken_link_entries(false));
    let reverse = validate_zip(&broken_link_entries(true));
    assert_eq!(forward, reverse);
}

#[cfg(feature = "parallel")]
#[test]
fn test_parallel_scan_matches_sequential() {
    let bytes = build_zip(&broken_link_entries(false));
    let sequential = validate_epub_reader(Cursor::new(bytes.clone()), &ValidationOptions::default());
    let parallel = validate_epub_reader(
        Cursor::new(bytes),
        &ValidationOptions::default().with_parallel(true),
    );
    assert_eq!(sequential, parallel);
}

#[test]
fn test_undeclared_resource() {
    let opf = package(TWO_CHAPTERS, &["c1", "c2"]);
    let c1 = chapter("One", r#"<p><img src="extra.png" alt=""/></p>"#);
    let c2 = chapter("Two", "<p>Two</p>");
    let mut entries = publication(&opf, &[("EPUB/c1.xhtml", &c1), ("EPUB/c2.xhtml", &c2)]);
    entries.push(Entry::stored("EPUB/extra.png", b"\x89PNG\r\n\x1a\n"));

    let report = validate_zip(&entries);
    assert_eq!(report.with_code("XREF_UNDECLARED_RESOURCE").count(), 1, "{:?}", report);
    assert!(!report.is_valid());
}

#[test]
fn test_shared_href_is_checked_once() {
    let items = r#"<item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/>
    <item id="c1-again" href="c1.xhtml" media-type="application/xhtml+xml"/>
    <item id="c2" href="c2.xhtml" media-type="application/xhtml+xml"/>"#;
    let opf = package(items, &["c1", "c2"]);
    let c1 = r#"<html xmlns="http://www.w3.org/1999/xhtml"><body><p></html>"#;
    let c2 = chapter("Two", "<p>Two</p>");
    let entries = publication(&opf, &[("EPUB/c1.xhtml", c1), ("EPUB/c2.xhtml", &c2)]);

    let report = validate_zip(&entries);
    let malformed: Vec<_> = report.with_code("RSC_XML_MALFORMED").collect();
    assert_eq!(malformed.len(), 1, "{:?}", report);
    assert_eq!(malformed[0].path.as_deref(), Some("EPUB/c1.xhtml"));
}

#[test]
fn test_malformed_control_files_reported_once() {
    for name in ["META-INF/container.xml", "EPUB/package.opf", "META-INF/encryption.xml"] {
        let mut entries: Vec<Entry> = valid_entries()
            .into_iter()
            .filter(|e| e.name != name)
            .collect();
        entries.push(Entry::deflated(name, "<root><unclosed></root>"));

        let report = validate_zip(&entries);
        let malformed: Vec<_> = report.with_code("RSC_XML_MALFORMED").collect();
        assert_eq!(malformed.len(), 1, "{}: {:?}", name, report);
        assert_eq!(malformed[0].path.as_deref(), Some(name));
    }
}

#[test]
fn test_overlay_text_to_missing_anchor() {
    let items = r#"<item id="c1" href="c1.xhtml" media-type="application/xhtml+xml" media-overlay="mo1"/>
    <item id="c2" href="c2.xhtml" media-type="application/xhtml+xml"/>
    <item id="mo1" href="mo/c1.smil" media-type="application/smil+xml"/>"#;
    let opf = package(items, &["c1", "c2"]);
    let c1 = chapter("One", r#"<p id="s1">One</p>"#);
    let c2 = chapter("Two", "<p>Two</p>");
    let overlay = r#"<smil xmlns="http://www.w3.org/ns/SMIL" version="3.0"><body>
  <par id="p1"><text src="../c1.xhtml#s1"/></par>
  <par id="p2"><text src="../c1.xhtml#s9"/></par>
</body></smil>"#;
    let entries = publication(
        &opf,
        &[
            ("EPUB/c1.xhtml", &c1),
            ("EPUB/c2.xhtml", &c2),
            ("EPUB/mo/c1.smil", overlay),
        ],
    );

    let report = validate_zip(&entries);
    assert_eq!(report.error_count(), 1, "{:?}", report);
    let diagnostic = report
        .with_code("XREF_FRAGMENT_UNRESOLVED")
        .next()
        .expect("fragment diagnostic");
    assert_eq!(diagnostic.path.as_deref(), Some("EPUB/mo/c1.smil"));
    assert_eq!(diagnostic.severity, ValidationSeverity::Error);
}

#[test]
fn test_undecryptable_resource_is_unverified() {
    let encryption = r#"<?xml version="1.0"?>
<encryption xmlns="urn:oasis:names:tc:opendocument:xmlns:container"
            xmlns:enc="http://www.w3.org/2001/04/xmlenc#">
  <enc:EncryptedData>
    <enc:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#aes256-cbc"/>
    <enc:CipherData><enc:CipherReference URI="EPUB/c2.xhtml"/></enc:CipherData>
  </enc:EncryptedData>
</encryption>"#;
    let opf = package(TWO_CHAPTERS, &["c1", "c2"]);
    let c1 = chapter("One", r#"<p><a href="c2.xhtml#p2">next</a></p>"#);
    let mut entries = publication(
        &opf,
        &[("EPUB/c1.xhtml", &c1), ("EPUB/c2.xhtml", "\u{1}\u{2}ciphertext")],
    );
    entries.insert(2, Entry::deflated("META-INF/encryption.xml", encryption));

    let report = validate_zip(&entries);
    assert!(report.is_valid(), "{:?}", report);
    assert_eq!(report.with_code("RSC_DECRYPTION_UNAVAILABLE").count(), 1);
    let from_chapter = report
        .with_code("XREF_UNVERIFIED")
        .filter(|d| d.path.as_deref() == Some("EPUB/c1.xhtml"))
        .count();
    assert_eq!(from_chapter, 1, "{:?}", report);
    assert!(report
        .diagnostics()
        .iter()
        .filter(|d| d.code == "XREF_UNVERIFIED")
        .all(|d| d.severity == ValidationSeverity::Unverified));
}

#[test]
fn test_single_file_navigation_document() {
    let nav = r##"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops"><head><title>Nav</title></head><body>
<nav epub:type="toc" id="toc"><h1>Contents</h1><ol><li><a href="c1.xhtml">One</a></li><li><a href="#toc">Top</a></li></ol></nav>
</body></html>"##;
    let report = validate_single_bytes("nav.xhtml", nav, &nav_options());
    assert_eq!(report.error_count(), 0, "{:?}", report);
    assert_eq!(report.warning_count(), 0);
    assert_eq!(report.fatal_count(), 0);
}

/// Navigation document whose nav headings jump from h1 to h3 and further,
/// with some headings left empty: five level skips and three empty headings.
const H_TEXT: &str = r##"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops"><head><title>Headings</title></head><body>
<h1>Book</h1>
<nav epub:type="toc"><h3>Contents</h3><ol><li><a href="c1.xhtml">One</a></li></ol></nav>
<nav epub:type="page-list"><h2> </h2><ol><li><a href="c1.xhtml#p1">1</a></li></ol></nav>
<nav epub:type="landmarks"><h4>Guide</h4><ol><li><a epub:type="bodymatter" href="c1.xhtml">Start</a></li></ol></nav>
<nav><h6>Figures</h6><ol><li><a href="c1.xhtml#f1">Figure 1</a></li></ol></nav>
<nav><h1> </h1><ol><li><a href="c1.xhtml#t1">Table 1</a></li></ol></nav>
<nav><h3></h3><ol><li><a href="c1.xhtml#a1">Audio 1</a></li></ol></nav>
<nav><h5>Notes</h5><ol><li><a href="c1.xhtml#n1">Note 1</a></li></ol></nav>
</body></html>"##;

#[test]
fn test_single_file_navigation_heading_levels() {
    let report = validate_single_bytes("h-text.xhtml", H_TEXT, &nav_options());
    assert_eq!(report.error_count(), 8, "{:?}", report);
    assert_eq!(report.with_code("NAV_HEADING_SKIP").count(), 5);
    assert_eq!(report.with_code("NAV_HEADING_EMPTY").count(), 3);
    assert_eq!(report.warning_count(), 0);
    assert_eq!(report.fatal_count(), 0);
}

#[test]
fn test_expanded_directory() {
    let dir = tempfile::tempdir().unwrap();
    write_directory(dir.path(), &valid_entries()).unwrap();

    let report = validate_directory(dir.path(), &ValidationOptions::default()).unwrap();
    assert!(report.is_valid(), "{:?}", report);

    let report = validate_path(dir.path(), &ValidationOptions::default()).unwrap();
    assert!(report.is_valid(), "{:?}", report);
}

#[test]
fn test_expanded_directory_reports_broken_links() {
    let dir = tempfile::tempdir().unwrap();
    write_directory(dir.path(), &broken_link_entries(false)).unwrap();

    let report = validate_directory(dir.path(), &ValidationOptions::default()).unwrap();
    assert_eq!(report.with_code("XREF_UNRESOLVED").count(), 3, "{:?}", report);
}

#[test]
fn test_epub_file_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.epub");
    std::fs::write(&path, build_zip(&valid_entries())).unwrap();

    let report = validate_epub_file(&path).unwrap();
    assert!(report.is_valid(), "{:?}", report);
    assert!(validate_epub_file(dir.path().join("absent.epub")).is_err());
}

#[test]
fn test_single_file_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("style.css");
    std::fs::write(&path, "p { color: red; }\n").unwrap();

    let options = ValidationOptions::default().with_mode(ValidationMode::single_file());
    let report = validate_path(&path, &options).unwrap();
    assert!(report.is_valid(), "{:?}", report);
}

#[cfg(feature = "async")]
#[tokio::test]
async fn test_async_validation_matches_sync() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.epub");
    std::fs::write(&path, build_zip(&broken_link_entries(false))).unwrap();

    let sync = validate_epub_file(&path).unwrap();
    let report = epub_validator::validate_epub_file_async(&path).await.unwrap();
    assert_eq!(report, sync);
    assert!(epub_validator::validate_epub_file_async(dir.path().join("absent.epub"))
        .await
        .is_err());
}
