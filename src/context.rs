//! Immutable per-resource validation context.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::container::ResourceOpener;
use crate::report::ReportSink;
use crate::schema::SchemaTable;
use crate::xref::XRefRegistry;

/// EPUB major version of the publication being checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EpubVersion {
    /// EPUB 2.0.1 (OPS/OPF 2).
    V2,
    /// EPUB 3.x.
    V3,
}

impl EpubVersion {
    /// Version from a package `version` attribute; unknown values map to 3.
    pub fn from_package_attr(value: &str) -> Self {
        if value.trim().starts_with('2') {
            EpubVersion::V2
        } else {
            EpubVersion::V3
        }
    }
}

impl fmt::Display for EpubVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpubVersion::V2 => write!(f, "2.0"),
            EpubVersion::V3 => write!(f, "3.0"),
        }
    }
}

/// Extra rule set requested for the run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValidationProfile {
    /// Core rules only.
    #[default]
    Default,
    /// EDUPUB rules.
    Edupub,
    /// EPUB Indexes rules.
    Index,
    /// EPUB Dictionaries rules.
    Dictionary,
    /// EPUB Previews rules.
    Preview,
}

impl ValidationProfile {
    /// Parse a CLI profile name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "default" => Some(ValidationProfile::Default),
            "edupub" => Some(ValidationProfile::Edupub),
            "idx" | "index" => Some(ValidationProfile::Index),
            "dict" | "dictionary" => Some(ValidationProfile::Dictionary),
            "preview" => Some(ValidationProfile::Preview),
            _ => None,
        }
    }
}

/// Publication type declared with `dc:type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PublicationType {
    /// `edupub`
    Edupub,
    /// `index`
    Index,
    /// `dictionary`
    Dictionary,
    /// `preview`
    Preview,
}

impl PublicationType {
    /// Recognize a `dc:type` value.
    pub fn from_dc_type(value: &str) -> Option<Self> {
        match value.trim() {
            "edupub" => Some(PublicationType::Edupub),
            "index" => Some(PublicationType::Index),
            "dictionary" => Some(PublicationType::Dictionary),
            "preview" => Some(PublicationType::Preview),
            _ => None,
        }
    }
}

/// Shared handles every context of a run points at.
#[derive(Clone)]
pub struct RunHandles {
    /// Diagnostic sink.
    pub sink: Arc<dyn ReportSink>,
    /// Cross-reference registry.
    pub xrefs: Arc<XRefRegistry>,
    /// Resource access.
    pub opener: Arc<dyn ResourceOpener>,
    /// Schema selection table owned by the run.
    pub schemas: Arc<SchemaTable>,
}

/// Everything a checker needs to know about the resource it checks.
///
/// Contexts are never mutated; per-resource contexts are derived from the
/// publication context with [`ValidationContext::for_resource`].
#[derive(Clone)]
pub struct ValidationContext {
    path: String,
    media_type: String,
    version: EpubVersion,
    profile: ValidationProfile,
    pub_types: BTreeSet<PublicationType>,
    properties: BTreeSet<String>,
    handles: RunHandles,
}

impl ValidationContext {
    /// Root context for a run.
    pub fn new(
        handles: RunHandles,
        path: impl Into<String>,
        media_type: impl Into<String>,
        version: EpubVersion,
        profile: ValidationProfile,
    ) -> Self {
        Self {
            path: path.into(),
            media_type: media_type.into(),
            version,
            profile,
            pub_types: BTreeSet::new(),
            properties: BTreeSet::new(),
            handles,
        }
    }

    /// Same context with publication types set.
    pub fn with_pub_types(mut self, pub_types: impl IntoIterator<Item = PublicationType>) -> Self {
        self.pub_types = pub_types.into_iter().collect();
        self
    }

    /// Same context with item properties set.
    pub fn with_properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties = properties.into_iter().map(Into::into).collect();
        self
    }

    /// Child context for another resource. Version, profile and publication
    /// types are inherited.
    pub fn for_resource<I, S>(&self, path: &str, media_type: &str, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.to_string(),
            media_type: media_type.to_string(),
            version: self.version,
            profile: self.profile,
            pub_types: self.pub_types.clone(),
            properties: properties.into_iter().map(Into::into).collect(),
            handles: self.handles.clone(),
        }
    }

    /// Container path of the resource.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Declared media type of the resource.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Publication EPUB version.
    pub fn version(&self) -> EpubVersion {
        self.version
    }

    /// Whether the publication is EPUB 3.
    pub fn is_epub3(&self) -> bool {
        self.version == EpubVersion::V3
    }

    /// Requested profile.
    pub fn profile(&self) -> ValidationProfile {
        self.profile
    }

    /// Declared publication types.
    pub fn pub_types(&self) -> &BTreeSet<PublicationType> {
        &self.pub_types
    }

    /// Whether `pub_type` was declared.
    pub fn has_pub_type(&self, pub_type: PublicationType) -> bool {
        self.pub_types.contains(&pub_type)
    }

    /// Manifest item properties of the resource.
    pub fn properties(&self) -> &BTreeSet<String> {
        &self.properties
    }

    /// Whether the resource's manifest item declares `property`.
    pub fn has_property(&self, property: &str) -> bool {
        self.properties.contains(property)
    }

    /// Diagnostic sink.
    pub fn sink(&self) -> &dyn ReportSink {
        self.handles.sink.as_ref()
    }

    /// Cross-reference registry.
    pub fn xrefs(&self) -> &XRefRegistry {
        &self.handles.xrefs
    }

    /// Resource access.
    pub fn opener(&self) -> &dyn ResourceOpener {
        self.handles.opener.as_ref()
    }

    /// Schema selection table.
    pub fn schemas(&self) -> &SchemaTable {
        &self.handles.schemas
    }
}

impl fmt::Debug for ValidationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationContext")
            .field("path", &self.path)
            .field("media_type", &self.media_type)
            .field("version", &self.version)
            .field("profile", &self.profile)
            .field("pub_types", &self.pub_types)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::container::{Container, MemoryProvider};
    use crate::report::ReportCollector;
    use crate::xref::{RegistryConfig, XRefRegistry};

    /// Context over an in-memory container holding `files`.
    pub(crate) fn memory_context(
        files: &[(&str, &str)],
        path: &str,
        media_type: &str,
        version: EpubVersion,
    ) -> (ValidationContext, Arc<ReportCollector>) {
        let mut provider = MemoryProvider::new();
        for (name, data) in files {
            provider.insert(*name, *data);
        }
        let container = Container::new(provider).unwrap();
        let sink = Arc::new(ReportCollector::new());
        let handles = RunHandles {
            sink: sink.clone(),
            xrefs: Arc::new(XRefRegistry::new(RegistryConfig::publication(
                container.paths(),
                version,
            ))),
            opener: Arc::new(container),
            schemas: Arc::new(SchemaTable::standard()),
        };
        let ctx = ValidationContext::new(handles, path, media_type, version, ValidationProfile::Default);
        (ctx, sink)
    }

    #[test]
    fn test_child_context_inherits_run_settings() {
        let (root, _) = memory_context(&[], "EPUB/package.opf", crate::media::OPF, EpubVersion::V3);
        let root = root.with_pub_types([PublicationType::Dictionary]);
        let child = root.for_resource("EPUB/nav.xhtml", crate::media::XHTML, ["nav"]);
        assert_eq!(child.path(), "EPUB/nav.xhtml");
        assert_eq!(child.version(), EpubVersion::V3);
        assert!(child.has_pub_type(PublicationType::Dictionary));
        assert!(child.has_property("nav"));
        assert!(!root.has_property("nav"));
    }

    #[test]
    fn test_version_from_package_attr() {
        assert_eq!(EpubVersion::from_package_attr("2.0"), EpubVersion::V2);
        assert_eq!(EpubVersion::from_package_attr("3.0"), EpubVersion::V3);
        assert_eq!(EpubVersion::from_package_attr("3.3"), EpubVersion::V3);
    }

    #[test]
    fn test_profile_and_pub_type_parsing() {
        assert_eq!(ValidationProfile::parse("idx"), Some(ValidationProfile::Index));
        assert_eq!(ValidationProfile::parse("bogus"), None);
        assert_eq!(
            PublicationType::from_dc_type(" dictionary "),
            Some(PublicationType::Dictionary)
        );
        assert_eq!(PublicationType::from_dc_type("novel"), None);
    }
}
