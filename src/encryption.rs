//! Encryption filter chains from `META-INF/encryption.xml`.
//!
//! Only the two font obfuscation schemes can be undone, and only once the
//! publication's unique identifier is known. Every other algorithm, and
//! zip-level encryption, makes a resource undecryptable: it stays in the
//! entry set but is never parsed.

use std::collections::BTreeMap;

use crate::error::EpubError;
use crate::path::{normalize_path, reference_form, ReferenceForm};
use crate::report::Location;
use crate::xml::{parse_document, XmlDocument, XMLENC_NS};

/// IDPF font obfuscation algorithm URI.
pub const IDPF_OBFUSCATION: &str = "http://www.idpf.org/2008/embedding";
/// Adobe font obfuscation algorithm URI.
pub const ADOBE_OBFUSCATION: &str = "http://ns.adobe.com/pdf/enc#RC";

const IDPF_OBFUSCATED_LEN: usize = 1040;
const ADOBE_OBFUSCATED_LEN: usize = 1024;

/// One decoding step applied to an entry's bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Filter {
    /// IDPF font obfuscation (SHA-1 of the unique identifier).
    IdpfObfuscation,
    /// Adobe font obfuscation (UUID identifier bytes).
    AdobeObfuscation,
    /// Zip traditional encryption flagged in the entry header.
    ZipEncryption,
    /// Any other `EncryptionMethod` algorithm.
    Unsupported(String),
}

impl Filter {
    fn from_algorithm(algorithm: &str) -> Self {
        match algorithm.trim() {
            IDPF_OBFUSCATION => Filter::IdpfObfuscation,
            ADOBE_OBFUSCATION => Filter::AdobeObfuscation,
            other => Filter::Unsupported(other.to_string()),
        }
    }

    /// Algorithm identifier for diagnostics.
    pub fn algorithm(&self) -> &str {
        match self {
            Filter::IdpfObfuscation => IDPF_OBFUSCATION,
            Filter::AdobeObfuscation => ADOBE_OBFUSCATION,
            Filter::ZipEncryption => "zip-encryption",
            Filter::Unsupported(algorithm) => algorithm,
        }
    }

    fn is_capable(&self, keys: Option<&PublicationKeys>) -> bool {
        match self {
            Filter::IdpfObfuscation => keys.is_some(),
            Filter::AdobeObfuscation => keys.is_some_and(|k| k.adobe.is_some()),
            Filter::ZipEncryption | Filter::Unsupported(_) => false,
        }
    }

    fn apply(&self, data: &mut [u8], keys: &PublicationKeys) -> bool {
        match (self, keys.adobe.as_ref()) {
            (Filter::IdpfObfuscation, _) => {
                xor_prefix(data, &keys.idpf, IDPF_OBFUSCATED_LEN);
                true
            }
            (Filter::AdobeObfuscation, Some(adobe)) => {
                xor_prefix(data, adobe, ADOBE_OBFUSCATED_LEN);
                true
            }
            _ => false,
        }
    }
}

fn xor_prefix(data: &mut [u8], key: &[u8], len: usize) {
    for (i, byte) in data.iter_mut().take(len).enumerate() {
        *byte ^= key[i % key.len()];
    }
}

/// Keys derived from the publication's unique identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicationKeys {
    idpf: [u8; 20],
    adobe: Option<[u8; 16]>,
}

impl PublicationKeys {
    /// Derive keys from a unique identifier.
    ///
    /// The IDPF key is the SHA-1 of the identifier with XML whitespace
    /// removed. The Adobe key exists only when the identifier is a UUID.
    pub fn from_identifier(identifier: &str) -> Self {
        let stripped: String = identifier
            .chars()
            .filter(|c| !matches!(c, ' ' | '\t' | '\r' | '\n'))
            .collect();
        let idpf = sha1_smol::Sha1::from(stripped.as_bytes()).digest().bytes();
        Self {
            idpf,
            adobe: adobe_key(identifier),
        }
    }
}

fn adobe_key(identifier: &str) -> Option<[u8; 16]> {
    let trimmed = identifier.trim();
    let uuid = trimmed
        .strip_prefix("urn:uuid:")
        .or_else(|| trimmed.strip_prefix("uuid:"))
        .unwrap_or(trimmed);
    let hex: Vec<u8> = uuid.bytes().filter(|b| *b != b'-').collect();
    if hex.len() != 32 {
        return None;
    }
    let mut key = [0u8; 16];
    for (slot, pair) in key.iter_mut().zip(hex.chunks(2)) {
        let text = core::str::from_utf8(pair).ok()?;
        *slot = u8::from_str_radix(text, 16).ok()?;
    }
    Some(key)
}

/// Ordered filters needed to recover an entry's plain bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    /// Chain with the given filters, outermost first.
    pub fn new(filters: Vec<Filter>) -> Self {
        Self { filters }
    }

    /// Whether the entry is stored in the clear.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Filters, outermost first.
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// First filter that cannot be applied with `keys`.
    pub fn first_incapable(&self, keys: Option<&PublicationKeys>) -> Option<&Filter> {
        self.filters.iter().find(|f| !f.is_capable(keys))
    }

    /// True only if every filter is capable.
    pub fn is_capable(&self, keys: Option<&PublicationKeys>) -> bool {
        self.first_incapable(keys).is_none()
    }

    /// Run the chain over `data` for the entry at `path`.
    pub fn decode(
        &self,
        path: &str,
        mut data: Vec<u8>,
        keys: Option<&PublicationKeys>,
    ) -> Result<Vec<u8>, EpubError> {
        for filter in &self.filters {
            let applied = keys.is_some_and(|keys| filter.apply(&mut data, keys));
            if !applied {
                return Err(EpubError::DecryptionFailed {
                    path: path.to_string(),
                    algorithm: filter.algorithm().to_string(),
                });
            }
        }
        Ok(data)
    }
}

/// One `EncryptedData` entry of `encryption.xml`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedResource {
    /// `CipherReference/@URI` as written.
    pub uri: String,
    /// Root-relative normalized path, when the URI is a valid local path.
    pub path: Option<String>,
    /// `EncryptionMethod/@Algorithm`.
    pub algorithm: String,
    /// Position of the `CipherReference` element.
    pub location: Location,
}

/// Parsed `encryption.xml`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncryptionMap {
    resources: Vec<EncryptedResource>,
}

impl EncryptionMap {
    /// Parse the bytes of `encryption.xml`. Only well-formedness errors fail.
    pub fn parse(bytes: &[u8]) -> Result<Self, EpubError> {
        let doc = parse_document(bytes).map_err(|fatal| {
            EpubError::Parse(format!(
                "encryption.xml {}:{}: {}",
                fatal.location.line, fatal.location.column, fatal.message
            ))
        })?;
        Ok(Self::from_document(&doc))
    }

    /// Collect encrypted resources from a parsed `encryption.xml`.
    pub fn from_document(doc: &XmlDocument) -> Self {
        let mut resources = Vec::new();
        for data in doc.descendants(doc.root_id()) {
            if !doc.element(data).is(XMLENC_NS, "EncryptedData") {
                continue;
            }
            let algorithm = doc
                .first_child_named(data, XMLENC_NS, "EncryptionMethod")
                .and_then(|m| doc.element(m).attr("Algorithm"))
                .unwrap_or_default()
                .to_string();
            let reference = doc
                .first_child_named(data, XMLENC_NS, "CipherData")
                .and_then(|c| doc.first_child_named(c, XMLENC_NS, "CipherReference"));
            let Some(reference) = reference else {
                continue;
            };
            let element = doc.element(reference);
            let uri = element.attr("URI").unwrap_or_default().to_string();
            resources.push(EncryptedResource {
                path: cipher_reference_path(&uri),
                uri,
                algorithm,
                location: element.location,
            });
        }
        Self { resources }
    }

    /// Encrypted resources in document order.
    pub fn resources(&self) -> &[EncryptedResource] {
        &self.resources
    }

    /// Filter chains keyed by container path.
    pub fn chains(&self) -> BTreeMap<String, FilterChain> {
        let mut chains: BTreeMap<String, FilterChain> = BTreeMap::new();
        for resource in &self.resources {
            if let Some(path) = &resource.path {
                chains
                    .entry(path.clone())
                    .or_default()
                    .filters
                    .push(Filter::from_algorithm(&resource.algorithm));
            }
        }
        chains
    }
}

fn cipher_reference_path(uri: &str) -> Option<String> {
    if uri.trim().is_empty() || reference_form(uri) != ReferenceForm::Local {
        return None;
    }
    let decoded = percent_encoding::percent_decode_str(uri.trim())
        .decode_utf8()
        .ok()?;
    normalize_path(&decoded).ok().filter(|p| !p.is_empty())
}
