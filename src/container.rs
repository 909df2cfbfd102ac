//! Container resource model.
//!
//! A [`Container`] enumerates the resources of a publication once, through a
//! [`ResourceProvider`] (zip archive, expanded directory or in-memory map),
//! and answers `has_entry`/`open`/`can_decrypt` for the rest of the run.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::encryption::{EncryptionMap, Filter, FilterChain, PublicationKeys};
use crate::error::EpubError;
use crate::path::normalize_path;
use crate::report::ValidationDiagnostic;
use crate::xml::{parse_document, ParsedXml};
use crate::zip::{DosDateTime, StreamingZip, MAX_CD_ENTRIES};

/// Path of the OCF encryption sidecar.
pub const ENCRYPTION_XML: &str = "META-INF/encryption.xml";

/// How the publication is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerKind {
    /// Zip-packaged OCF container.
    Packaged,
    /// Expanded directory.
    Directory,
    /// Resources held in memory (single files, tests).
    Memory,
}

/// One resource in the container. Fixed once the container is built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceEntry {
    path: String,
    modified: Option<DosDateTime>,
    size: u64,
    encryption: FilterChain,
}

impl ResourceEntry {
    /// Normalized container-root-relative path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last modification time, when the provider records one.
    pub fn modified(&self) -> Option<DosDateTime> {
        self.modified
    }

    /// Uncompressed size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether any filter must be undone before the bytes are usable.
    pub fn is_encrypted(&self) -> bool {
        !self.encryption.is_empty()
    }

    /// Filters needed to decode the entry, outermost first.
    pub fn encryption(&self) -> &FilterChain {
        &self.encryption
    }
}

/// Entry as listed by a provider, before normalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawEntry {
    /// Name as stored.
    pub name: String,
    /// Last modification time.
    pub modified: Option<DosDateTime>,
    /// Uncompressed size.
    pub size: u64,
    /// Zip general-purpose encryption flag.
    pub zip_encrypted: bool,
    /// Directory rather than file.
    pub is_directory: bool,
}

/// Backing store of a container.
pub trait ResourceProvider: Send {
    /// Storage kind.
    fn kind(&self) -> ContainerKind;

    /// List every stored entry.
    fn list(&mut self) -> Result<Vec<RawEntry>, EpubError>;

    /// Raw (still encrypted) bytes of the entry stored under `name`.
    fn read(&mut self, name: &str) -> Result<Vec<u8>, EpubError>;

    /// Provider-level observations made while listing.
    fn notes(&self) -> Vec<ValidationDiagnostic> {
        Vec::new()
    }
}

/// Capability handle used by checkers to read resources.
pub trait ResourceOpener: Send + Sync {
    /// Whether `path` is an entry of the container.
    fn has_entry(&self, path: &str) -> bool;

    /// True only if every filter on `path` can be undone.
    fn can_decrypt(&self, path: &str) -> bool;

    /// Decoded bytes of `path`.
    fn open(&self, path: &str) -> Result<Vec<u8>, EpubError>;
}

/// Zip archive provider.
pub struct ZipProvider<F: Read + Seek + Send> {
    zip: StreamingZip<F>,
}

impl<F: Read + Seek + Send> ZipProvider<F> {
    /// Wrap an opened archive.
    pub fn new(zip: StreamingZip<F>) -> Self {
        Self { zip }
    }
}

impl<F: Read + Seek + Send> ResourceProvider for ZipProvider<F> {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Packaged
    }

    fn list(&mut self) -> Result<Vec<RawEntry>, EpubError> {
        Ok(self
            .zip
            .entries()
            .map(|e| RawEntry {
                name: e.filename.clone(),
                modified: Some(e.modified),
                size: u64::from(e.uncompressed_size),
                zip_encrypted: e.is_encrypted(),
                is_directory: e.is_directory(),
            })
            .collect())
    }

    fn read(&mut self, name: &str) -> Result<Vec<u8>, EpubError> {
        let entry = self
            .zip
            .entry(name)
            .cloned()
            .ok_or_else(|| EpubError::NotFound {
                path: name.to_string(),
            })?;
        Ok(self.zip.read_to_vec(&entry)?)
    }

    fn notes(&self) -> Vec<ValidationDiagnostic> {
        if self.zip.is_truncated() {
            vec![ValidationDiagnostic::warning(
                "OCF_ZIP_TOO_MANY_ENTRIES",
                format!(
                    "Archive has more entries than can be validated; only the first {} were checked.",
                    MAX_CD_ENTRIES
                ),
            )]
        } else {
            Vec::new()
        }
    }
}

/// Expanded (unzipped) publication directory provider.
pub struct DirectoryProvider {
    root: PathBuf,
}

impl DirectoryProvider {
    /// Provider rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn walk(&self, dir: &Path, prefix: &str, out: &mut Vec<RawEntry>) -> Result<(), EpubError> {
        let mut children: Vec<_> = std::fs::read_dir(dir)?.collect::<Result<_, _>>()?;
        children.sort_by_key(|c| c.file_name());
        for child in children {
            let name = child.file_name().to_string_lossy().into_owned();
            let path = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };
            let link = std::fs::symlink_metadata(child.path())?;
            let metadata = if link.file_type().is_symlink() {
                match std::fs::metadata(child.path()) {
                    Ok(target) if target.is_file() => target,
                    _ => {
                        log::debug!("[OCF] skipping symlink {}", path);
                        continue;
                    }
                }
            } else {
                link
            };
            let modified = metadata.modified().ok().and_then(dos_from_system_time);
            if metadata.is_dir() {
                out.push(RawEntry {
                    name: format!("{}/", path),
                    modified,
                    size: 0,
                    zip_encrypted: false,
                    is_directory: true,
                });
                self.walk(&child.path(), &path, out)?;
            } else {
                out.push(RawEntry {
                    name: path,
                    modified,
                    size: metadata.len(),
                    zip_encrypted: false,
                    is_directory: false,
                });
            }
        }
        Ok(())
    }
}

impl ResourceProvider for DirectoryProvider {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Directory
    }

    fn list(&mut self) -> Result<Vec<RawEntry>, EpubError> {
        let mut out = Vec::new();
        self.walk(&self.root, "", &mut out)?;
        Ok(out)
    }

    fn read(&mut self, name: &str) -> Result<Vec<u8>, EpubError> {
        let full = self.root.join(name);
        std::fs::read(&full).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => EpubError::NotFound {
                path: name.to_string(),
            },
            _ => EpubError::Io(err.to_string()),
        })
    }
}

/// In-memory provider.
#[derive(Clone, Debug, Default)]
pub struct MemoryProvider {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryProvider {
    /// Empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file.
    pub fn with_file(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.insert(name, data);
        self
    }

    /// Add or replace a file.
    pub fn insert(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.files.insert(name.into(), data.into());
    }
}

impl ResourceProvider for MemoryProvider {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Memory
    }

    fn list(&mut self) -> Result<Vec<RawEntry>, EpubError> {
        Ok(self
            .files
            .iter()
            .map(|(name, data)| RawEntry {
                name: name.clone(),
                modified: None,
                size: data.len() as u64,
                zip_encrypted: false,
                is_directory: name.ends_with('/'),
            })
            .collect())
    }

    fn read(&mut self, name: &str) -> Result<Vec<u8>, EpubError> {
        self.files
            .get(name)
            .cloned()
            .ok_or_else(|| EpubError::NotFound {
                path: name.to_string(),
            })
    }
}

/// Enumerated publication resources plus read access.
pub struct Container {
    kind: ContainerKind,
    provider: Mutex<Box<dyn ResourceProvider>>,
    entries: BTreeMap<String, ResourceEntry>,
    stored_names: BTreeMap<String, String>,
    directories: BTreeSet<String>,
    encryption_xml: Option<ParsedXml>,
    encryption: Option<EncryptionMap>,
    keys: OnceLock<PublicationKeys>,
    notes: Vec<ValidationDiagnostic>,
}

impl Container {
    /// Enumerate `provider` and read `META-INF/encryption.xml` if present.
    pub fn new(provider: impl ResourceProvider + 'static) -> Result<Self, EpubError> {
        Self::from_boxed(Box::new(provider))
    }

    /// Same as [`Container::new`] for an already boxed provider.
    pub fn from_boxed(mut provider: Box<dyn ResourceProvider>) -> Result<Self, EpubError> {
        let raw_entries = provider.list()?;
        let mut notes = provider.notes();
        let mut files: Vec<(String, RawEntry)> = Vec::new();
        let mut stored_names = BTreeMap::new();
        let mut directories = BTreeSet::new();

        for raw in raw_entries {
            let path = match normalize_path(&raw.name) {
                Ok(path) if !path.is_empty() => path,
                _ => {
                    notes.push(
                        ValidationDiagnostic::error(
                            "OCF_ENTRY_NAME_INVALID",
                            format!("Entry name '{}' does not resolve inside the container.", raw.name),
                        )
                        .with_arg(raw.name.clone()),
                    );
                    continue;
                }
            };
            let mut parent = path.as_str();
            while let Some((dir, _)) = parent.rsplit_once('/') {
                directories.insert(dir.to_string());
                parent = dir;
            }
            if raw.is_directory {
                directories.insert(path);
                continue;
            }
            if stored_names.contains_key(&path) {
                notes.push(
                    ValidationDiagnostic::error(
                        "OCF_ENTRY_DUPLICATE",
                        format!("Container has more than one entry named '{}'.", path),
                    )
                    .with_path(path.clone()),
                );
                continue;
            }
            stored_names.insert(path.clone(), raw.name.clone());
            files.push((path, raw));
        }

        let encryption_xml = stored_names
            .get(ENCRYPTION_XML)
            .and_then(|stored| provider.read(stored).ok())
            .map(|bytes| parse_document(&bytes));
        let encryption = encryption_xml
            .as_ref()
            .and_then(|parsed| parsed.as_ref().ok())
            .map(EncryptionMap::from_document);
        let mut chains = encryption
            .as_ref()
            .map(EncryptionMap::chains)
            .unwrap_or_default();

        let mut entries = BTreeMap::new();
        for (path, raw) in files {
            let mut filters = Vec::new();
            if raw.zip_encrypted {
                filters.push(Filter::ZipEncryption);
            }
            if let Some(chain) = chains.remove(&path) {
                filters.extend(chain.filters().iter().cloned());
            }
            entries.insert(
                path.clone(),
                ResourceEntry {
                    path,
                    modified: raw.modified,
                    size: raw.size,
                    encryption: FilterChain::new(filters),
                },
            );
        }

        log::debug!(
            "[OCF] {:?} container with {} entries, {} directories, {} encrypted",
            provider.kind(),
            entries.len(),
            directories.len(),
            entries.values().filter(|e| e.is_encrypted()).count()
        );

        Ok(Self {
            kind: provider.kind(),
            provider: Mutex::new(provider),
            entries,
            stored_names,
            directories,
            encryption_xml,
            encryption,
            keys: OnceLock::new(),
            notes,
        })
    }

    /// Storage kind.
    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// Entry by normalized path.
    pub fn entry(&self, path: &str) -> Option<&ResourceEntry> {
        self.entries.get(path)
    }

    /// All entries ordered by path.
    pub fn entries(&self) -> impl Iterator<Item = &ResourceEntry> {
        self.entries.values()
    }

    /// Normalized entry paths.
    pub fn paths(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().collect()
    }

    /// Directory paths, explicit or implied by entry names.
    pub fn directories(&self) -> &BTreeSet<String> {
        &self.directories
    }

    /// Parsed `encryption.xml`, when present and well-formed.
    pub fn encryption(&self) -> Option<&EncryptionMap> {
        self.encryption.as_ref()
    }

    /// Outcome of parsing `encryption.xml` during enumeration; `None` when
    /// it is absent or could not be read.
    pub fn encryption_xml(&self) -> Option<&ParsedXml> {
        self.encryption_xml.as_ref()
    }

    /// Diagnostics gathered while enumerating.
    pub fn notes(&self) -> &[ValidationDiagnostic] {
        &self.notes
    }

    /// Bind the publication's unique identifier, enabling obfuscation
    /// filters. Later calls are ignored.
    pub fn bind_identifier(&self, identifier: &str) {
        if self
            .keys
            .set(PublicationKeys::from_identifier(identifier))
            .is_ok()
        {
            log::debug!("[OCF] Bound publication identifier for de-obfuscation");
        }
    }

    /// Algorithm of the first filter on `path` that cannot be undone.
    pub fn blocking_algorithm(&self, path: &str) -> Option<String> {
        self.entries.get(path).and_then(|entry| {
            entry
                .encryption
                .first_incapable(self.keys.get())
                .map(|f| f.algorithm().to_string())
        })
    }

    /// Raw bytes without applying any filters.
    pub fn read_raw(&self, path: &str) -> Result<Vec<u8>, EpubError> {
        let stored = self
            .stored_names
            .get(path)
            .ok_or_else(|| EpubError::NotFound {
                path: path.to_string(),
            })?;
        let mut provider = self.provider.lock().unwrap_or_else(PoisonError::into_inner);
        provider.read(stored)
    }
}

impl ResourceOpener for Container {
    fn has_entry(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    fn can_decrypt(&self, path: &str) -> bool {
        self.entries
            .get(path)
            .is_some_and(|entry| entry.encryption.is_capable(self.keys.get()))
    }

    fn open(&self, path: &str) -> Result<Vec<u8>, EpubError> {
        let entry = self.entries.get(path).ok_or_else(|| EpubError::NotFound {
            path: path.to_string(),
        })?;
        if let Some(filter) = entry.encryption.first_incapable(self.keys.get()) {
            return Err(EpubError::DecryptionFailed {
                path: path.to_string(),
                algorithm: filter.algorithm().to_string(),
            });
        }
        let raw = self.read_raw(path)?;
        entry.encryption.decode(path, raw, self.keys.get())
    }
}

/// Convert a filesystem timestamp to a DOS date/time (UTC).
fn dos_from_system_time(time: SystemTime) -> Option<DosDateTime> {
    let secs = time.duration_since(UNIX_EPOCH).ok()?.as_secs();
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;

    // Civil-from-days over 400-year eras.
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);

    Some(DosDateTime::from_parts(
        u16::try_from(year).ok()?,
        month as u8,
        day as u8,
        (rem / 3_600) as u8,
        ((rem % 3_600) / 60) as u8,
        (rem % 60) as u8,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::tests::{build_zip, TestEntry};
    use std::io::Cursor;
    use std::time::Duration;

    const OBFUSCATION_XML: &str = r#"<encryption xmlns="urn:oasis:names:tc:opendocument:xmlns:container" xmlns:enc="http://www.w3.org/2001/04/xmlenc#">
  <enc:EncryptedData>
    <enc:EncryptionMethod Algorithm="http://www.idpf.org/2008/embedding"/>
    <enc:CipherData><enc:CipherReference URI="EPUB/font.otf"/></enc:CipherData>
  </enc:EncryptedData>
  <enc:EncryptedData>
    <enc:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#aes256-cbc"/>
    <enc:CipherData><enc:CipherReference URI="EPUB/locked.xhtml"/></enc:CipherData>
  </enc:EncryptedData>
</encryption>"#;

    fn memory_container() -> Container {
        Container::new(
            MemoryProvider::new()
                .with_file("mimetype", "application/epub+zip")
                .with_file(ENCRYPTION_XML, OBFUSCATION_XML)
                .with_file("EPUB/font.otf", vec![0u8; 64])
                .with_file("EPUB/locked.xhtml", "<html/>")
                .with_file("EPUB/text/c1.xhtml", "<html/>"),
        )
        .unwrap()
    }

    #[test]
    fn test_entries_and_directories() {
        let container = memory_container();
        assert!(container.has_entry("EPUB/text/c1.xhtml"));
        assert!(!container.has_entry("EPUB/text"));
        assert!(container.directories().contains("EPUB/text"));
        assert!(container.directories().contains("META-INF"));
        assert_eq!(container.entries().count(), 5);
    }

    #[test]
    fn test_open_missing_is_not_found() {
        let container = memory_container();
        assert!(matches!(
            container.open("EPUB/nope.xhtml"),
            Err(EpubError::NotFound { .. })
        ));
    }

    #[test]
    fn test_unsupported_encryption_blocks_open() {
        let container = memory_container();
        let entry = container.entry("EPUB/locked.xhtml").unwrap();
        assert!(entry.is_encrypted());
        assert!(!container.can_decrypt("EPUB/locked.xhtml"));
        assert_eq!(
            container.blocking_algorithm("EPUB/locked.xhtml").as_deref(),
            Some("http://www.w3.org/2001/04/xmlenc#aes256-cbc")
        );
        assert_eq!(container.encryption().map(|m| m.resources().len()), Some(2));
        assert!(matches!(
            container.open("EPUB/locked.xhtml"),
            Err(EpubError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn test_obfuscated_font_needs_identifier() {
        let container = memory_container();
        assert!(!container.can_decrypt("EPUB/font.otf"));
        container.bind_identifier("urn:uuid:0b0ef5c4-2a7b-4c62-9d5e-8a3c8f0f9a11");
        assert!(container.can_decrypt("EPUB/font.otf"));
        assert_eq!(container.blocking_algorithm("EPUB/font.otf"), None);
        let bytes = container.open("EPUB/font.otf").unwrap();
        assert_eq!(bytes.len(), 64);
        assert_ne!(bytes, vec![0u8; 64]);
    }

    #[test]
    fn test_zip_provider_entries() {
        let mut flagged = TestEntry::stored("EPUB/secret.xhtml", b"x");
        flagged.flags = 1;
        let data = build_zip(&[
            TestEntry::stored("mimetype", b"application/epub+zip"),
            TestEntry::stored("EPUB/", b""),
            TestEntry::deflated("EPUB/c1.xhtml", b"<html/>"),
            flagged,
        ]);
        let zip = StreamingZip::new(Cursor::new(data)).unwrap();
        let container = Container::new(ZipProvider::new(zip)).unwrap();

        assert_eq!(container.kind(), ContainerKind::Packaged);
        assert_eq!(container.open("EPUB/c1.xhtml").unwrap(), b"<html/>");
        assert!(container.directories().contains("EPUB"));
        let modified = container.entry("EPUB/c1.xhtml").unwrap().modified().unwrap();
        assert_eq!(modified.year(), 2024);
        assert!(!container.can_decrypt("EPUB/secret.xhtml"));
    }

    #[test]
    fn test_invalid_and_duplicate_names_are_noted() {
        let data = build_zip(&[
            TestEntry::stored("../evil.xhtml", b"x"),
            TestEntry::stored("EPUB/a.xhtml", b"1"),
            TestEntry::stored("EPUB//a.xhtml", b"2"),
        ]);
        let zip = StreamingZip::new(Cursor::new(data)).unwrap();
        let container = Container::new(ZipProvider::new(zip)).unwrap();
        let codes: Vec<_> = container.notes().iter().map(|d| d.code).collect();
        assert_eq!(codes, vec!["OCF_ENTRY_NAME_INVALID", "OCF_ENTRY_DUPLICATE"]);
        assert_eq!(container.open("EPUB/a.xhtml").unwrap(), b"1");
    }

    #[test]
    fn test_directory_provider() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("META-INF")).unwrap();
        std::fs::create_dir_all(dir.path().join("EPUB/text")).unwrap();
        std::fs::write(dir.path().join("mimetype"), "application/epub+zip").unwrap();
        std::fs::write(dir.path().join("EPUB/text/c1.xhtml"), "<html/>").unwrap();

        let container = Container::new(DirectoryProvider::new(dir.path())).unwrap();
        assert_eq!(container.kind(), ContainerKind::Directory);
        assert!(container.has_entry("mimetype"));
        assert!(container.directories().contains("META-INF"));
        assert_eq!(container.open("EPUB/text/c1.xhtml").unwrap(), b"<html/>");
        assert!(container.entry("mimetype").unwrap().modified().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_symlink_loop_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("EPUB")).unwrap();
        std::fs::write(dir.path().join("EPUB/c1.xhtml"), "<html/>").unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("EPUB/loop")).unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("EPUB/c1.xhtml"),
            dir.path().join("EPUB/alias.xhtml"),
        )
        .unwrap();

        let container = Container::new(DirectoryProvider::new(dir.path())).unwrap();
        assert!(container.has_entry("EPUB/c1.xhtml"));
        assert!(container.has_entry("EPUB/alias.xhtml"));
        assert!(!container.directories().contains("EPUB/loop"));
        assert!(container.paths().iter().all(|p| !p.starts_with("EPUB/loop")));
    }

    #[test]
    fn test_dos_from_system_time() {
        // 2024-03-01T12:30:10Z
        let time = UNIX_EPOCH + Duration::from_secs(1_709_296_210);
        let dos = dos_from_system_time(time).unwrap();
        assert_eq!(
            (dos.year(), dos.month(), dos.day(), dos.hour(), dos.minute(), dos.second()),
            (2024, 3, 1, 12, 30, 10)
        );
    }
}
