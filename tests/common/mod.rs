//! Fixture builders shared by the integration tests.

#![allow(dead_code)]

use std::path::Path;

pub const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="EPUB/package.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

pub const NAV: &str = r#"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops"><head><title>Contents</title></head><body>
<nav epub:type="toc"><ol><li><a href="c1.xhtml">One</a></li><li><a href="c2.xhtml">Two</a></li></ol></nav>
</body></html>"#;

/// An EPUB 3 chapter whose body is `body`.
pub fn chapter(title: &str, body: &str) -> String {
    format!(
        r#"<html xmlns="http://www.w3.org/1999/xhtml"><head><title>{}</title></head><body>{}</body></html>"#,
        title, body
    )
}

/// An EPUB 3 package with a nav document plus `items` (raw `<item>`
/// elements) and a spine over `spine` idrefs.
pub fn package(items: &str, spine: &[&str]) -> String {
    let itemrefs: String = spine
        .iter()
        .map(|id| format!(r#"<itemref idref="{}"/>"#, id))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="uid">urn:uuid:0b0ef5c4-2a7b-4c62-9d5e-8a3c8f0f9a11</dc:identifier>
    <dc:title>Fixture</dc:title>
    <dc:language>en</dc:language>
    <meta property="dcterms:modified">2024-03-01T12:00:00Z</meta>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    {}
  </manifest>
  <spine>{}</spine>
</package>"#,
        items, itemrefs
    )
}

/// One archive member.
#[derive(Clone, Debug)]
pub struct Entry {
    pub name: String,
    pub data: Vec<u8>,
    pub deflate: bool,
}

impl Entry {
    pub fn stored(name: &str, data: impl AsRef<[u8]>) -> Self {
        Self {
            name: name.to_string(),
            data: data.as_ref().to_vec(),
            deflate: false,
        }
    }

    pub fn deflated(name: &str, data: impl AsRef<[u8]>) -> Self {
        Self {
            deflate: true,
            ..Self::stored(name, data)
        }
    }
}

/// Entries of a well-formed publication: stored `mimetype` first, then
/// container, package, nav and `files` (deflated).
pub fn publication(package: &str, files: &[(&str, &str)]) -> Vec<Entry> {
    let mut entries = vec![
        Entry::stored("mimetype", "application/epub+zip"),
        Entry::deflated("META-INF/container.xml", CONTAINER),
        Entry::deflated("EPUB/package.opf", package),
        Entry::deflated("EPUB/nav.xhtml", NAV),
    ];
    entries.extend(files.iter().map(|(name, data)| Entry::deflated(name, data)));
    entries
}

fn deflate_stored_block(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 5 * (data.len() / 0xffff + 1));
    let mut chunks = data.chunks(0xffff).peekable();
    if chunks.peek().is_none() {
        out.extend_from_slice(&[0x01, 0x00, 0x00, 0xff, 0xff]);
        return out;
    }
    while let Some(chunk) = chunks.next() {
        let last = chunks.peek().is_none();
        let len = chunk.len() as u16;
        out.push(u8::from(last));
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&(!len).to_le_bytes());
        out.extend_from_slice(chunk);
    }
    out
}

/// Serialize `entries` in order into a zip archive.
pub fn build_zip(entries: &[Entry]) -> Vec<u8> {
    // 2024-03-01 12:30:00
    let time: u16 = (12 << 11) | (30 << 5);
    let date: u16 = ((2024 - 1980) << 9) | (3 << 5) | 1;
    let mut zip = Vec::new();
    let mut central = Vec::new();

    for entry in entries {
        let (method, payload): (u16, Vec<u8>) = if entry.deflate {
            (8, deflate_stored_block(&entry.data))
        } else {
            (0, entry.data.clone())
        };
        let crc = crc32fast::hash(&entry.data);
        let name = entry.name.as_bytes();
        let offset = zip.len() as u32;

        zip.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
        zip.extend_from_slice(&20u16.to_le_bytes());
        zip.extend_from_slice(&0u16.to_le_bytes());
        zip.extend_from_slice(&method.to_le_bytes());
        zip.extend_from_slice(&time.to_le_bytes());
        zip.extend_from_slice(&date.to_le_bytes());
        zip.extend_from_slice(&crc.to_le_bytes());
        zip.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        zip.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
        zip.extend_from_slice(&(name.len() as u16).to_le_bytes());
        zip.extend_from_slice(&0u16.to_le_bytes());
        zip.extend_from_slice(name);
        zip.extend_from_slice(&payload);

        central.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&method.to_le_bytes());
        central.extend_from_slice(&time.to_le_bytes());
        central.extend_from_slice(&date.to_le_bytes());
        central.extend_from_slice(&crc.to_le_bytes());
        central.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        central.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
        central.extend_from_slice(&(name.len() as u16).to_le_bytes());
        central.extend_from_slice(&[0u8; 12]);
        central.extend_from_slice(&offset.to_le_bytes());
        central.extend_from_slice(name);
    }

    let cd_offset = zip.len() as u32;
    let cd_size = central.len() as u32;
    zip.extend_from_slice(&central);
    zip.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
    zip.extend_from_slice(&[0u8; 4]);
    zip.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    zip.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    zip.extend_from_slice(&cd_size.to_le_bytes());
    zip.extend_from_slice(&cd_offset.to_le_bytes());
    zip.extend_from_slice(&0u16.to_le_bytes());
    zip
}

/// Expand `entries` under `root` as an unpacked publication.
pub fn write_directory(root: &Path, entries: &[Entry]) -> std::io::Result<()> {
    for entry in entries {
        let target = root.join(&entry.name);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(target, &entry.data)?;
    }
    Ok(())
}
