//! Schema validator contract and predicate-driven chain selection.
//!
//! A [`SchemaTable`] is an ordered list of `(predicate, validators)` rules.
//! Selecting a chain for a context walks the rules in order, appends the
//! validators of every matching rule, and skips validators already in the
//! chain (by identity), so the same context always yields the same chain.

mod content;
mod navigation;
mod ocf;
mod overlay;
mod package;

use std::sync::Arc;

use crate::context::{EpubVersion, PublicationType, ValidationContext, ValidationProfile};
use crate::media;
use crate::report::{Location, ValidationDiagnostic, ValidationSeverity};
use crate::xml::XmlDocument;

pub use content::{DictSchema, EdupubSchema, IdxSchema, OpsSchema, SvgSchema, XhtmlSchema};
pub use navigation::NavSchema;
pub use ocf::ContainerSchema;
pub use overlay::{NcxSchema, SearchKeyMapSchema, SmilSchema};
pub use package::{Package20Schema, Package30Schema, PackageSchema};

/// Path of the OCF container document.
pub const CONTAINER_XML: &str = "META-INF/container.xml";

/// One schema rule violation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// Diagnostic code.
    pub code: &'static str,
    /// Severity.
    pub severity: ValidationSeverity,
    /// Position in the validated document.
    pub location: Option<Location>,
    /// Description.
    pub message: String,
}

impl Violation {
    /// Convert into a diagnostic (path filled in by the caller's buffer).
    pub fn into_diagnostic(self) -> ValidationDiagnostic {
        ValidationDiagnostic::new(self.code, self.severity, self.message).at(self.location)
    }
}

/// A grammar or rule set run over a parsed document.
pub trait SchemaValidator: Send + Sync {
    /// Stable identifier, used in logs and chain inspection.
    fn id(&self) -> &'static str;

    /// Check `doc` and return every violation found.
    fn validate(&self, doc: &XmlDocument) -> Vec<Violation>;
}

/// Violation accumulator shared by the built-in validators.
pub(crate) struct Findings {
    code: &'static str,
    violations: Vec<Violation>,
}

impl Findings {
    pub(crate) fn new(code: &'static str) -> Self {
        Self {
            code,
            violations: Vec::new(),
        }
    }

    pub(crate) fn error(&mut self, location: Location, message: impl Into<String>) {
        self.push(self.code, ValidationSeverity::Error, location, message);
    }

    pub(crate) fn warning(&mut self, location: Location, message: impl Into<String>) {
        self.push(self.code, ValidationSeverity::Warning, location, message);
    }

    pub(crate) fn push(
        &mut self,
        code: &'static str,
        severity: ValidationSeverity,
        location: Location,
        message: impl Into<String>,
    ) {
        self.violations.push(Violation {
            code,
            severity,
            location: Some(location),
            message: message.into(),
        });
    }

    pub(crate) fn finish(self) -> Vec<Violation> {
        self.violations
    }
}

/// Condition over a validation context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Predicate {
    /// Always true.
    Always,
    /// Resource media type equals the value.
    MediaType(String),
    /// Publication version equals the value.
    Version(EpubVersion),
    /// Run profile equals the value.
    Profile(ValidationProfile),
    /// Publication declares the type.
    HasPubType(PublicationType),
    /// Resource manifest item declares the property.
    HasProperty(String),
    /// Resource path equals the value.
    Path(String),
    /// All hold.
    And(Vec<Predicate>),
    /// Any holds.
    Or(Vec<Predicate>),
    /// Negation.
    Not(Box<Predicate>),
}

impl Predicate {
    /// `mimetype(x)`
    pub fn media_type(media_type: &str) -> Self {
        Predicate::MediaType(media_type.to_string())
    }

    /// `version(v)`
    pub fn version(version: EpubVersion) -> Self {
        Predicate::Version(version)
    }

    /// `profile(p)`
    pub fn profile(profile: ValidationProfile) -> Self {
        Predicate::Profile(profile)
    }

    /// `hasPubType(t)`
    pub fn has_pub_type(pub_type: PublicationType) -> Self {
        Predicate::HasPubType(pub_type)
    }

    /// `hasProp(p)`
    pub fn has_property(property: &str) -> Self {
        Predicate::HasProperty(property.to_string())
    }

    /// Resource path equality.
    pub fn path(path: &str) -> Self {
        Predicate::Path(path.to_string())
    }

    /// Conjunction with `other`.
    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut all) => {
                all.push(other);
                Predicate::And(all)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    /// Disjunction with `other`.
    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Or(mut any) => {
                any.push(other);
                Predicate::Or(any)
            }
            first => Predicate::Or(vec![first, other]),
        }
    }

    /// Evaluate against `ctx`.
    pub fn matches(&self, ctx: &ValidationContext) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::MediaType(value) => media::essence(ctx.media_type()) == value,
            Predicate::Version(value) => ctx.version() == *value,
            Predicate::Profile(value) => ctx.profile() == *value,
            Predicate::HasPubType(value) => ctx.has_pub_type(*value),
            Predicate::HasProperty(value) => ctx.has_property(value),
            Predicate::Path(value) => ctx.path() == value,
            Predicate::And(all) => all.iter().all(|p| p.matches(ctx)),
            Predicate::Or(any) => any.iter().any(|p| p.matches(ctx)),
            Predicate::Not(inner) => !inner.matches(ctx),
        }
    }
}

impl std::ops::Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }
}

/// One `(predicate, validators)` row.
#[derive(Clone)]
pub struct SchemaRule {
    predicate: Predicate,
    validators: Vec<Arc<dyn SchemaValidator>>,
}

impl SchemaRule {
    /// Build a rule.
    pub fn new(predicate: Predicate, validators: Vec<Arc<dyn SchemaValidator>>) -> Self {
        Self {
            predicate,
            validators,
        }
    }

    /// Rule condition.
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }
}

/// Ordered validators selected for one resource.
#[derive(Clone, Default)]
pub struct ValidatorChain {
    validators: Vec<Arc<dyn SchemaValidator>>,
}

impl ValidatorChain {
    fn push_unique(&mut self, validator: &Arc<dyn SchemaValidator>) {
        if !self.validators.iter().any(|v| Arc::ptr_eq(v, validator)) {
            self.validators.push(Arc::clone(validator));
        }
    }

    /// Validators in run order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SchemaValidator>> {
        self.validators.iter()
    }

    /// Validator identifiers in run order.
    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.validators.iter().map(|v| v.id())
    }

    /// Number of validators.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Whether no rule matched.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

/// Rule table owned by a validation run.
#[derive(Clone, Default)]
pub struct SchemaTable {
    rules: Vec<SchemaRule>,
}

impl SchemaTable {
    /// Table from explicit rules, evaluated in the given order.
    pub fn new(rules: Vec<SchemaRule>) -> Self {
        Self { rules }
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[SchemaRule] {
        &self.rules
    }

    /// Select the chain for `ctx`.
    pub fn select(&self, ctx: &ValidationContext) -> ValidatorChain {
        let mut chain = ValidatorChain::default();
        for rule in self.rules.iter().filter(|r| r.predicate.matches(ctx)) {
            for validator in &rule.validators {
                chain.push_unique(validator);
            }
        }
        chain
    }

    /// The built-in rule table.
    pub fn standard() -> Self {
        use EpubVersion::{V2, V3};

        let container: Arc<dyn SchemaValidator> = Arc::new(ContainerSchema);
        let package: Arc<dyn SchemaValidator> = Arc::new(PackageSchema);
        let package30: Arc<dyn SchemaValidator> = Arc::new(Package30Schema);
        let package20: Arc<dyn SchemaValidator> = Arc::new(Package20Schema);
        let xhtml: Arc<dyn SchemaValidator> = Arc::new(XhtmlSchema);
        let ops: Arc<dyn SchemaValidator> = Arc::new(OpsSchema);
        let nav: Arc<dyn SchemaValidator> = Arc::new(NavSchema);
        let svg: Arc<dyn SchemaValidator> = Arc::new(SvgSchema);
        let edupub: Arc<dyn SchemaValidator> = Arc::new(EdupubSchema);
        let dict: Arc<dyn SchemaValidator> = Arc::new(DictSchema);
        let idx: Arc<dyn SchemaValidator> = Arc::new(IdxSchema);
        let ncx: Arc<dyn SchemaValidator> = Arc::new(NcxSchema);
        let smil: Arc<dyn SchemaValidator> = Arc::new(SmilSchema);
        let search_key_map: Arc<dyn SchemaValidator> = Arc::new(SearchKeyMapSchema);

        let is_xhtml = || Predicate::media_type(media::XHTML);
        let is_opf = || Predicate::media_type(media::OPF);
        let wants = |profile, pub_type| {
            Predicate::profile(profile).or(Predicate::has_pub_type(pub_type))
        };

        Self::new(vec![
            SchemaRule::new(Predicate::path(CONTAINER_XML), vec![container]),
            SchemaRule::new(is_opf(), vec![package]),
            SchemaRule::new(is_opf().and(Predicate::version(V3)), vec![package30]),
            SchemaRule::new(is_opf().and(Predicate::version(V2)), vec![package20]),
            SchemaRule::new(is_xhtml().and(Predicate::version(V3)), vec![xhtml.clone()]),
            SchemaRule::new(
                is_xhtml()
                    .and(Predicate::version(V3))
                    .and(Predicate::has_property("nav")),
                vec![xhtml.clone(), nav],
            ),
            SchemaRule::new(
                is_xhtml().and(Predicate::version(V2)),
                vec![xhtml.clone(), ops],
            ),
            SchemaRule::new(Predicate::media_type(media::SVG), vec![svg]),
            SchemaRule::new(
                is_xhtml()
                    .and(Predicate::version(V3))
                    .and(wants(ValidationProfile::Edupub, PublicationType::Edupub)),
                vec![xhtml.clone(), edupub],
            ),
            SchemaRule::new(
                is_xhtml()
                    .and(Predicate::version(V3))
                    .and(wants(ValidationProfile::Dictionary, PublicationType::Dictionary)),
                vec![xhtml.clone(), dict],
            ),
            SchemaRule::new(
                is_xhtml().and(Predicate::version(V3)).and(
                    wants(ValidationProfile::Index, PublicationType::Index)
                        .or(Predicate::has_property("index")),
                ),
                vec![xhtml, idx],
            ),
            SchemaRule::new(Predicate::media_type(media::NCX), vec![ncx]),
            SchemaRule::new(Predicate::media_type(media::SMIL), vec![smil]),
            SchemaRule::new(
                Predicate::media_type(media::SEARCH_KEY_MAP),
                vec![search_key_map],
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::memory_context;

    fn chain_ids(ctx: &ValidationContext) -> Vec<&'static str> {
        SchemaTable::standard().select(ctx).ids().collect()
    }

    #[test]
    fn test_nav_document_chain() {
        let (root, _) = memory_context(&[], "EPUB/package.opf", media::OPF, EpubVersion::V3);
        let nav = root.for_resource("EPUB/nav.xhtml", media::XHTML, ["nav"]);
        assert_eq!(chain_ids(&nav), vec!["xhtml", "nav"]);
    }

    #[test]
    fn test_chain_is_duplicate_free_and_ordered() {
        let (root, _) = memory_context(&[], "EPUB/package.opf", media::OPF, EpubVersion::V3);
        let root = root.with_pub_types([PublicationType::Dictionary, PublicationType::Edupub]);
        let doc = root.for_resource("EPUB/c1.xhtml", media::XHTML, ["nav", "index"]);
        let ids = chain_ids(&doc);
        assert_eq!(ids, vec!["xhtml", "nav", "edupub", "dict", "idx"]);

        let again = chain_ids(&doc);
        assert_eq!(ids, again);
    }

    #[test]
    fn test_version_specific_chains() {
        let (v2, _) = memory_context(&[], "OEBPS/content.opf", media::OPF, EpubVersion::V2);
        assert_eq!(chain_ids(&v2), vec!["opf", "opf20"]);
        let chapter = v2.for_resource("OEBPS/c1.xhtml", media::XHTML, Vec::<String>::new());
        assert_eq!(chain_ids(&chapter), vec!["xhtml", "ops"]);

        let (v3, _) = memory_context(&[], "EPUB/package.opf", media::OPF, EpubVersion::V3);
        assert_eq!(chain_ids(&v3), vec!["opf", "opf30"]);
    }

    #[test]
    fn test_container_and_unknown_types() {
        let (root, _) = memory_context(&[], CONTAINER_XML, media::XML, EpubVersion::V3);
        assert_eq!(chain_ids(&root), vec!["container"]);
        let css = root.for_resource("EPUB/style.css", media::CSS, Vec::<String>::new());
        assert!(SchemaTable::standard().select(&css).is_empty());
    }

    #[test]
    fn test_predicate_combinators() {
        let (ctx, _) = memory_context(&[], "EPUB/c1.xhtml", media::XHTML, EpubVersion::V3);
        let p = Predicate::media_type(media::XHTML).and(!Predicate::version(EpubVersion::V2));
        assert!(p.matches(&ctx));
        let q = Predicate::media_type(media::CSS).or(Predicate::path("EPUB/c1.xhtml"));
        assert!(q.matches(&ctx));
        assert!(!(!Predicate::Always).matches(&ctx));
    }

    #[test]
    fn test_custom_table_dedupes_by_identity() {
        let shared: Arc<dyn SchemaValidator> = Arc::new(XhtmlSchema);
        let other: Arc<dyn SchemaValidator> = Arc::new(XhtmlSchema);
        let table = SchemaTable::new(vec![
            SchemaRule::new(Predicate::Always, vec![shared.clone()]),
            SchemaRule::new(Predicate::Always, vec![shared, other]),
        ]);
        let (ctx, _) = memory_context(&[], "EPUB/c1.xhtml", media::XHTML, EpubVersion::V3);
        assert_eq!(table.select(&ctx).len(), 2);
    }
}
