//! Two-phase cross-reference registry.
//!
//! While resources are scanned, checkers register every outgoing reference
//! and every anchor they declare. Registration never judges anything. Once
//! all scans are done, [`XRefRegistry::resolve`] runs exactly once and
//! classifies each reference against the final registry state, so the
//! outcome does not depend on the order resources were scanned in.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::context::EpubVersion;
use crate::error::{EpubError, PathError};
use crate::media;
use crate::path::{
    check_fragment, reference_form, resolve_relative_reference, split_fragment, FragmentCheck,
    FragmentGrammar, ReferenceForm,
};
use crate::report::{Location, ReportSink, ValidationDiagnostic, ValidationSeverity};

/// What a reference is used for; decides which targets are compatible.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReferenceKind {
    /// `a/@href` and similar navigable links.
    Hyperlink,
    /// Link in the EPUB 3 navigation document.
    NavLink,
    /// `content/@src` in an NCX.
    NcxContent,
    /// EPUB 2 `guide/reference/@href`.
    Guide,
    /// `link rel="stylesheet"` or CSS `@import`.
    Stylesheet,
    /// Image source (`img`, SVG `image`, CSS `url()`).
    Image,
    /// `@font-face` source.
    Font,
    /// `audio` source.
    Audio,
    /// `video` source.
    Video,
    /// Media overlay `text/@src`.
    OverlayText,
    /// Media overlay `audio/@src`.
    OverlayAudio,
    /// Search-key map group target.
    SearchKey,
    /// Package manifest `item/@href`.
    ManifestItem,
    /// `container.xml` rootfile `full-path`.
    Rootfile,
    /// `encryption.xml` `CipherReference/@URI`.
    EncryptedResource,
    /// `script/@src`.
    Script,
    /// `cite` attributes.
    Cite,
    /// `link` elements other than stylesheets.
    Link,
    /// Any other resource reference.
    Generic,
}

impl ReferenceKind {
    /// Label used in messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Hyperlink => "hyperlink",
            ReferenceKind::NavLink => "navigation link",
            ReferenceKind::NcxContent => "NCX content",
            ReferenceKind::Guide => "guide reference",
            ReferenceKind::Stylesheet => "stylesheet",
            ReferenceKind::Image => "image",
            ReferenceKind::Font => "font",
            ReferenceKind::Audio => "audio",
            ReferenceKind::Video => "video",
            ReferenceKind::OverlayText => "media overlay text",
            ReferenceKind::OverlayAudio => "media overlay audio",
            ReferenceKind::SearchKey => "search key",
            ReferenceKind::ManifestItem => "manifest item",
            ReferenceKind::Rootfile => "rootfile",
            ReferenceKind::EncryptedResource => "encrypted resource",
            ReferenceKind::Script => "script",
            ReferenceKind::Cite => "citation",
            ReferenceKind::Link => "link",
            ReferenceKind::Generic => "resource",
        }
    }

    /// Remote URLs are fine without a manifest declaration.
    fn allows_undeclared_remote(&self) -> bool {
        matches!(
            self,
            ReferenceKind::Hyperlink | ReferenceKind::Cite | ReferenceKind::Link
        )
    }

    /// Resolved against the container root instead of the source's directory.
    fn is_container_rooted(&self) -> bool {
        matches!(self, ReferenceKind::Rootfile | ReferenceKind::EncryptedResource)
    }

    /// Target must be a manifest item.
    fn requires_declaration(&self) -> bool {
        !matches!(
            self,
            ReferenceKind::Rootfile | ReferenceKind::EncryptedResource | ReferenceKind::ManifestItem
        )
    }

    fn allows_fragment(&self) -> bool {
        !matches!(
            self,
            ReferenceKind::ManifestItem
                | ReferenceKind::Rootfile
                | ReferenceKind::EncryptedResource
                | ReferenceKind::Stylesheet
                | ReferenceKind::Script
        )
    }

    /// Severity of an incompatible target, or `None` when any type is fine.
    fn incompatible(
        &self,
        media_type: &str,
        has_content_fallback: bool,
        epub3: bool,
    ) -> Option<ValidationSeverity> {
        let mt = media::essence(media_type);
        let compatible = match self {
            ReferenceKind::Stylesheet => mt == media::CSS,
            ReferenceKind::Image => media::is_image(mt) || has_content_fallback,
            ReferenceKind::Font => media::is_font(mt),
            ReferenceKind::Audio | ReferenceKind::OverlayAudio => media::is_audio(mt),
            ReferenceKind::Video => media::is_video(mt) || has_content_fallback,
            ReferenceKind::OverlayText => mt == media::XHTML || mt == media::SVG,
            ReferenceKind::SearchKey => mt == media::XHTML,
            ReferenceKind::Script => media::is_script(mt),
            ReferenceKind::Hyperlink | ReferenceKind::NavLink | ReferenceKind::NcxContent => {
                media::is_content_document(mt, epub3) || has_content_fallback
            }
            _ => true,
        };
        match (compatible, self) {
            (true, _) => None,
            (false, ReferenceKind::Font) => Some(ValidationSeverity::Warning),
            (false, _) => Some(ValidationSeverity::Error),
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One registered reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceReference {
    /// Container path of the resource holding the reference.
    pub source: String,
    /// Where the reference appears.
    pub location: Option<Location>,
    /// Reference as written.
    pub raw: String,
    /// Usage.
    pub kind: ReferenceKind,
    /// Unresolved required references are errors, advisory ones warnings.
    pub required: bool,
}

/// Scan outcome of a target resource.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScanState {
    /// Not scanned (yet).
    #[default]
    Pending,
    /// Parsed successfully; its anchors are known.
    Parsed,
    /// Scanned but could not be parsed or decrypted.
    Unparsable,
}

#[derive(Clone, Debug, Default)]
struct TargetRecord {
    media_type: Option<String>,
    declared: bool,
    has_content_fallback: bool,
    anchors: BTreeSet<String>,
    state: ScanState,
}

/// Which references a resolution pass judges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolutionScope {
    /// Every reference of a full publication.
    Publication,
    /// Only references back into this one file; everything else is outside
    /// what can be checked.
    SingleFile(String),
}

/// Fixed inputs of a registry.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    paths: BTreeSet<String>,
    version: EpubVersion,
    scope: ResolutionScope,
}

impl RegistryConfig {
    /// Registry for a publication whose container holds `paths`.
    pub fn publication(paths: BTreeSet<String>, version: EpubVersion) -> Self {
        Self {
            paths,
            version,
            scope: ResolutionScope::Publication,
        }
    }

    /// Registry for validating `path` on its own.
    pub fn single_file(path: &str, version: EpubVersion) -> Self {
        Self {
            paths: BTreeSet::from([path.to_string()]),
            version,
            scope: ResolutionScope::SingleFile(path.to_string()),
        }
    }
}

#[derive(Default)]
struct RegistryState {
    references: BTreeMap<(String, Option<Location>, String), ResourceReference>,
    targets: BTreeMap<String, TargetRecord>,
    remotes: BTreeSet<String>,
}

/// Counts from a finished resolution pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResolutionSummary {
    /// References examined.
    pub references: usize,
    /// Diagnostics emitted.
    pub diagnostics: usize,
}

/// Thread-safe reference and anchor accumulator with a one-shot resolver.
pub struct XRefRegistry {
    config: RegistryConfig,
    state: Mutex<RegistryState>,
    resolved: AtomicBool,
}

impl XRefRegistry {
    /// Empty registry.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RegistryState::default()),
            resolved: AtomicBool::new(false),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut RegistryState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    fn accepting(&self, what: &str) -> bool {
        if self.resolved.load(Ordering::Acquire) {
            log::warn!("[XREF] ignoring {} registered after resolution", what);
            return false;
        }
        true
    }

    /// Record an outgoing reference. Returns `false` when the same
    /// `(source, location, raw)` triple was already registered.
    pub fn register_reference(
        &self,
        source: &str,
        location: Option<Location>,
        raw: &str,
        kind: ReferenceKind,
        required: bool,
    ) -> bool {
        if !self.accepting("reference") {
            return false;
        }
        let key = (source.to_string(), location, raw.to_string());
        self.with_state(|state| {
            if state.references.contains_key(&key) {
                return false;
            }
            state.references.insert(
                key,
                ResourceReference {
                    source: source.to_string(),
                    location,
                    raw: raw.to_string(),
                    kind,
                    required,
                },
            );
            true
        })
    }

    /// Record an anchor (`id`) declared by the resource at `path`. Returns
    /// `false` for a repeated anchor.
    pub fn register_anchor(&self, path: &str, id: &str) -> bool {
        if !self.accepting("anchor") {
            return false;
        }
        self.with_state(|state| {
            state
                .targets
                .entry(path.to_string())
                .or_default()
                .anchors
                .insert(id.to_string())
        })
    }

    /// Record a manifest declaration of a local resource.
    pub fn declare_resource(&self, path: &str, media_type: &str, has_content_fallback: bool) {
        if !self.accepting("declaration") {
            return;
        }
        self.with_state(|state| {
            let record = state.targets.entry(path.to_string()).or_default();
            record.declared = true;
            record.media_type = Some(media_type.to_string());
            record.has_content_fallback |= has_content_fallback;
        });
    }

    /// Record the media type of an undeclared resource (container files,
    /// single-file mode) without marking it declared.
    pub fn note_media_type(&self, path: &str, media_type: &str) {
        if !self.accepting("media type") {
            return;
        }
        self.with_state(|state| {
            let record = state.targets.entry(path.to_string()).or_default();
            if record.media_type.is_none() {
                record.media_type = Some(media_type.to_string());
            }
        });
    }

    /// Record a manifest declaration of a remote resource.
    pub fn declare_remote(&self, url: &str) {
        if !self.accepting("remote declaration") {
            return;
        }
        let url = split_fragment(url.trim()).0.to_string();
        self.with_state(|state| state.remotes.insert(url));
    }

    /// The resource at `path` was parsed; its anchors are complete.
    pub fn mark_parsed(&self, path: &str) {
        self.set_state(path, ScanState::Parsed);
    }

    /// The resource at `path` could not be parsed or decrypted.
    pub fn mark_unparsable(&self, path: &str) {
        self.set_state(path, ScanState::Unparsable);
    }

    fn set_state(&self, path: &str, scan: ScanState) {
        if !self.accepting("scan state") {
            return;
        }
        self.with_state(|state| state.targets.entry(path.to_string()).or_default().state = scan);
    }

    /// Whether resolution has run.
    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }

    /// Number of registered references.
    pub fn reference_count(&self) -> usize {
        self.with_state(|state| state.references.len())
    }

    /// Classify every registered reference and report problems to `sink`.
    ///
    /// Runs once; a second call fails with
    /// [`EpubError::ResolutionAlreadyRun`].
    pub fn resolve(&self, sink: &dyn ReportSink) -> Result<ResolutionSummary, EpubError> {
        if self.resolved.swap(true, Ordering::AcqRel) {
            return Err(EpubError::ResolutionAlreadyRun);
        }
        let state = std::mem::take(
            &mut *self.state.lock().unwrap_or_else(PoisonError::into_inner),
        );
        log::debug!(
            "[XREF] resolving {} references against {} targets",
            state.references.len(),
            state.targets.len()
        );

        let resolver = Resolver {
            config: &self.config,
            state: &state,
        };
        let mut summary = ResolutionSummary {
            references: state.references.len(),
            diagnostics: 0,
        };
        for reference in state.references.values() {
            if let Some(diagnostic) = resolver.classify(reference) {
                summary.diagnostics += 1;
                sink.report(
                    diagnostic
                        .with_path(reference.source.clone())
                        .at(reference.location),
                );
            }
        }
        log::debug!(
            "[XREF] resolution produced {} diagnostics",
            summary.diagnostics
        );
        Ok(summary)
    }
}

struct Resolver<'a> {
    config: &'a RegistryConfig,
    state: &'a RegistryState,
}

impl Resolver<'_> {
    /// At most one diagnostic per reference.
    fn classify(&self, reference: &ResourceReference) -> Option<ValidationDiagnostic> {
        let raw = reference.raw.trim();
        match reference_form(raw) {
            ReferenceForm::Data => return None,
            ReferenceForm::Remote => return self.classify_remote(reference, raw),
            ReferenceForm::Local => {}
        }

        let base = if reference.kind.is_container_rooted() {
            ""
        } else {
            reference.source.as_str()
        };
        let resolved = match resolve_relative_reference(base, raw) {
            Ok(resolved) => resolved,
            Err(err) => return Some(invalid_path(reference, &err)),
        };
        let (path, fragment) = split_fragment(&resolved);

        if let ResolutionScope::SingleFile(file) = &self.config.scope {
            if path != file {
                return None;
            }
        }

        if !self.config.paths.contains(path) {
            return Some(self.unresolved(reference, path));
        }

        let record = self.state.targets.get(path);
        let declared = record.is_some_and(|r| r.declared);
        if !declared
            && reference.kind.requires_declaration()
            && self.config.scope == ResolutionScope::Publication
        {
            return Some(
                ValidationDiagnostic::error(
                    "XREF_UNDECLARED_RESOURCE",
                    format!(
                        "{} target '{}' exists but is not declared in the package manifest",
                        reference.kind, path
                    ),
                )
                .with_arg(path),
            );
        }

        let default_record = TargetRecord::default();
        let record = record.unwrap_or(&default_record);
        let media_type = record
            .media_type
            .as_deref()
            .or_else(|| media::guess_from_path(path));

        if let Some(media_type) = media_type {
            let epub3 = self.config.version == EpubVersion::V3;
            if let Some(severity) =
                reference
                    .kind
                    .incompatible(media_type, record.has_content_fallback, epub3)
            {
                return Some(
                    ValidationDiagnostic::new(
                        "XREF_INCOMPATIBLE_TARGET",
                        severity,
                        format!(
                            "{} target '{}' has incompatible media type '{}'",
                            reference.kind, path, media_type
                        ),
                    )
                    .with_arg(path)
                    .with_arg(media_type),
                );
            }
        }

        if record.state == ScanState::Unparsable {
            return Some(unverified(reference, path));
        }

        let fragment = fragment?;
        if !reference.kind.allows_fragment() {
            return Some(
                ValidationDiagnostic::error(
                    "XREF_FRAGMENT_NOT_ALLOWED",
                    format!(
                        "{} reference '{}' must not carry a fragment identifier",
                        reference.kind, reference.raw
                    ),
                )
                .with_arg(&reference.raw),
            );
        }
        let grammar = media_type.and_then(FragmentGrammar::for_media_type)?;
        match check_fragment(grammar, fragment) {
            FragmentCheck::Accepted => None,
            FragmentCheck::Invalid => Some(
                ValidationDiagnostic::error(
                    "XREF_FRAGMENT_INVALID",
                    format!(
                        "fragment '#{}' is not valid for target '{}' of type '{}'",
                        fragment,
                        path,
                        media_type.unwrap_or_default()
                    ),
                )
                .with_arg(fragment)
                .with_arg(path),
            ),
            FragmentCheck::Anchor(id) => match record.state {
                ScanState::Parsed if record.anchors.contains(id) => None,
                ScanState::Parsed => Some(
                    ValidationDiagnostic::new(
                        "XREF_FRAGMENT_UNRESOLVED",
                        if reference.required {
                            ValidationSeverity::Error
                        } else {
                            ValidationSeverity::Warning
                        },
                        format!("fragment '#{}' is not defined in '{}'", id, path),
                    )
                    .with_arg(id)
                    .with_arg(path),
                ),
                ScanState::Pending | ScanState::Unparsable => Some(unverified(reference, path)),
            },
        }
    }

    fn classify_remote(
        &self,
        reference: &ResourceReference,
        raw: &str,
    ) -> Option<ValidationDiagnostic> {
        if reference.kind.allows_undeclared_remote() {
            return None;
        }
        if let ResolutionScope::SingleFile(_) = self.config.scope {
            return None;
        }
        let url = split_fragment(raw).0;
        if self.state.remotes.contains(url) {
            return None;
        }
        Some(
            ValidationDiagnostic::error(
                "XREF_REMOTE_UNDECLARED",
                format!(
                    "remote {} '{}' is not declared in the package manifest",
                    reference.kind, url
                ),
            )
            .with_arg(url),
        )
    }

    fn unresolved(&self, reference: &ResourceReference, path: &str) -> ValidationDiagnostic {
        let severity = if reference.required {
            ValidationSeverity::Error
        } else {
            ValidationSeverity::Warning
        };
        let mut diagnostic = ValidationDiagnostic::new(
            "XREF_UNRESOLVED",
            severity,
            format!(
                "{} target '{}' could not be found in the container",
                reference.kind, path
            ),
        )
        .with_arg(path);
        if let Some(candidate) = self
            .config
            .paths
            .iter()
            .find(|p| p.eq_ignore_ascii_case(path))
        {
            diagnostic = diagnostic.with_hint(format!(
                "a resource named '{}' exists; paths are case-sensitive",
                candidate
            ));
        }
        diagnostic
    }
}

fn invalid_path(reference: &ResourceReference, err: &PathError) -> ValidationDiagnostic {
    ValidationDiagnostic::error(
        "XREF_INVALID_PATH",
        format!("{} reference is invalid: {}", reference.kind, err),
    )
    .with_arg(&reference.raw)
}

fn unverified(reference: &ResourceReference, path: &str) -> ValidationDiagnostic {
    ValidationDiagnostic::unverified(
        "XREF_UNVERIFIED",
        format!(
            "{} '{}' could not be verified because the target was not parsed",
            reference.kind, reference.raw
        ),
    )
    .with_arg(path)
}
