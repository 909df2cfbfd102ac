//! Structured diagnostics, the shared report sink and per-checker buffers.

use std::sync::{Mutex, PoisonError};

/// Severity level for a validation diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValidationSeverity {
    /// The container or a resource cannot be interpreted at all.
    Fatal,
    /// Violates a required structural expectation.
    Error,
    /// Suspicious or non-ideal structure that may reduce compatibility.
    Warning,
    /// Could not be checked (for example, an undecryptable target).
    Unverified,
}

impl ValidationSeverity {
    /// Lowercase label used in text and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationSeverity::Fatal => "fatal",
            ValidationSeverity::Error => "error",
            ValidationSeverity::Warning => "warning",
            ValidationSeverity::Unverified => "unverified",
        }
    }
}

/// 1-based line and column inside a resource.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    /// Line number, starting at 1.
    pub line: u32,
    /// Column number in characters, starting at 1.
    pub column: u32,
}

impl Location {
    /// Create a location.
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Structured validation diagnostic entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationDiagnostic {
    /// Stable machine-readable diagnostic code.
    pub code: &'static str,
    /// Severity classification.
    pub severity: ValidationSeverity,
    /// Human-readable description.
    pub message: String,
    /// Container path the diagnostic refers to.
    pub path: Option<String>,
    /// Position inside `path`.
    pub location: Option<Location>,
    /// Message arguments (paths, ids, media types) in order.
    pub args: Vec<String>,
    /// Optional remediation hint.
    pub hint: Option<String>,
}

impl ValidationDiagnostic {
    /// Create a diagnostic without path or location.
    pub fn new(
        code: &'static str,
        severity: ValidationSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            path: None,
            location: None,
            args: Vec::new(),
            hint: None,
        }
    }

    /// Fatal diagnostic.
    pub fn fatal(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, ValidationSeverity::Fatal, message)
    }

    /// Error diagnostic.
    pub fn error(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, ValidationSeverity::Error, message)
    }

    /// Warning diagnostic.
    pub fn warning(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, ValidationSeverity::Warning, message)
    }

    /// Unverified diagnostic.
    pub fn unverified(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, ValidationSeverity::Unverified, message)
    }

    /// Attach the container path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach a position.
    pub fn at(mut self, location: Option<Location>) -> Self {
        self.location = location;
        self
    }

    /// Append a message argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    fn sort_key(&self) -> (&str, Location, &str, &str) {
        (
            self.path.as_deref().unwrap_or(""),
            self.location.unwrap_or_default(),
            self.code,
            &self.message,
        )
    }
}

/// Running per-severity totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeverityCounts {
    /// Fatal diagnostics.
    pub fatal: usize,
    /// Error diagnostics.
    pub error: usize,
    /// Warning diagnostics.
    pub warning: usize,
    /// Unverified diagnostics.
    pub unverified: usize,
}

impl SeverityCounts {
    fn record(&mut self, severity: ValidationSeverity) {
        match severity {
            ValidationSeverity::Fatal => self.fatal += 1,
            ValidationSeverity::Error => self.error += 1,
            ValidationSeverity::Warning => self.warning += 1,
            ValidationSeverity::Unverified => self.unverified += 1,
        }
    }

    /// Fatal, error and warning diagnostics together.
    pub fn failures(&self) -> usize {
        self.fatal + self.error + self.warning
    }
}

/// Destination for diagnostics.
///
/// Implementations accept concurrent calls; each diagnostic is recorded
/// whole.
pub trait ReportSink: Send + Sync {
    /// Record one diagnostic.
    fn report(&self, diagnostic: ValidationDiagnostic);

    /// Totals recorded so far.
    fn counts(&self) -> SeverityCounts;
}

#[derive(Default)]
struct CollectorState {
    diagnostics: Vec<ValidationDiagnostic>,
    counts: SeverityCounts,
}

/// Thread-safe in-memory sink that produces a [`ValidationReport`].
#[derive(Default)]
pub struct ReportCollector {
    state: Mutex<CollectorState>,
}

impl ReportCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the collected diagnostics as a sorted report.
    pub fn to_report(&self) -> ValidationReport {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        ValidationReport::from_diagnostics(state.diagnostics.clone())
    }
}

impl ReportSink for ReportCollector {
    fn report(&self, diagnostic: ValidationDiagnostic) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.counts.record(diagnostic.severity);
        state.diagnostics.push(diagnostic);
    }

    fn counts(&self) -> SeverityCounts {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .counts
    }
}

/// Diagnostics gathered while checking one resource.
///
/// Checkers report into a buffer and flush it when done, which keeps the
/// diagnostics of one resource together and tells the checker whether it
/// introduced any errors or warnings.
#[derive(Debug)]
pub struct CheckReport {
    path: String,
    diagnostics: Vec<ValidationDiagnostic>,
}

impl CheckReport {
    /// Buffer for the resource at `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            diagnostics: Vec::new(),
        }
    }

    /// Path diagnostics default to.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Add a diagnostic; a missing path is filled with the buffer's path.
    pub fn push(&mut self, mut diagnostic: ValidationDiagnostic) {
        if diagnostic.path.is_none() {
            diagnostic.path = Some(self.path.clone());
        }
        self.diagnostics.push(diagnostic);
    }

    /// Shorthand for an error at `location`.
    pub fn error(
        &mut self,
        code: &'static str,
        location: Option<Location>,
        message: impl Into<String>,
    ) {
        self.push(ValidationDiagnostic::error(code, message).at(location));
    }

    /// Shorthand for a warning at `location`.
    pub fn warning(
        &mut self,
        code: &'static str,
        location: Option<Location>,
        message: impl Into<String>,
    ) {
        self.push(ValidationDiagnostic::warning(code, message).at(location));
    }

    /// Shorthand for a fatal diagnostic at `location`.
    pub fn fatal(
        &mut self,
        code: &'static str,
        location: Option<Location>,
        message: impl Into<String>,
    ) {
        self.push(ValidationDiagnostic::fatal(code, message).at(location));
    }

    /// Whether nothing above `Unverified` has been buffered.
    pub fn is_clean(&self) -> bool {
        self.diagnostics
            .iter()
            .all(|d| d.severity == ValidationSeverity::Unverified)
    }

    /// Buffered diagnostics.
    pub fn diagnostics(&self) -> &[ValidationDiagnostic] {
        &self.diagnostics
    }

    /// Send everything to `sink`; returns whether the buffer was clean.
    pub fn flush(self, sink: &dyn ReportSink) -> bool {
        let clean = self.is_clean();
        for diagnostic in self.diagnostics {
            sink.report(diagnostic);
        }
        clean
    }
}

/// Validation report with all discovered diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    diagnostics: Vec<ValidationDiagnostic>,
}

impl ValidationReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a report; diagnostics are ordered by path, position and code so
    /// output does not depend on scan order.
    pub fn from_diagnostics(mut diagnostics: Vec<ValidationDiagnostic>) -> Self {
        diagnostics.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Self { diagnostics }
    }

    /// Return all collected diagnostics.
    pub fn diagnostics(&self) -> &[ValidationDiagnostic] {
        &self.diagnostics
    }

    /// Per-severity totals.
    pub fn counts(&self) -> SeverityCounts {
        let mut counts = SeverityCounts::default();
        for d in &self.diagnostics {
            counts.record(d.severity);
        }
        counts
    }

    /// Number of fatal diagnostics.
    pub fn fatal_count(&self) -> usize {
        self.counts().fatal
    }

    /// Number of error diagnostics.
    pub fn error_count(&self) -> usize {
        self.counts().error
    }

    /// Number of warning diagnostics.
    pub fn warning_count(&self) -> usize {
        self.counts().warning
    }

    /// Number of unverified diagnostics.
    pub fn unverified_count(&self) -> usize {
        self.counts().unverified
    }

    /// Diagnostics carrying `code`.
    pub fn with_code<'a>(
        &'a self,
        code: &'a str,
    ) -> impl Iterator<Item = &'a ValidationDiagnostic> + 'a {
        self.diagnostics.iter().filter(move |d| d.code == code)
    }

    /// Returns `true` when no fatal, error or warning diagnostics were found.
    pub fn is_valid(&self) -> bool {
        self.counts().failures() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_unverified_does_not_fail_report() {
        let report = ValidationReport::from_diagnostics(vec![ValidationDiagnostic::unverified(
            "XREF_UNVERIFIED",
            "target could not be decrypted",
        )]);
        assert!(report.is_valid());
        assert_eq!(report.unverified_count(), 1);
    }

    #[test]
    fn test_warning_fails_report() {
        let report = ValidationReport::from_diagnostics(vec![ValidationDiagnostic::warning(
            "OPF_SPINE_EMPTY",
            "spine has no itemrefs",
        )]);
        assert!(!report.is_valid());
    }

    #[test]
    fn test_report_order_is_stable() {
        let a = ValidationDiagnostic::error("B", "b")
            .with_path("EPUB/b.xhtml")
            .at(Some(Location::new(1, 1)));
        let b = ValidationDiagnostic::error("A", "a")
            .with_path("EPUB/a.xhtml")
            .at(Some(Location::new(9, 1)));
        let c = ValidationDiagnostic::error("A", "a")
            .with_path("EPUB/a.xhtml")
            .at(Some(Location::new(2, 4)));
        let one = ValidationReport::from_diagnostics(vec![a.clone(), b.clone(), c.clone()]);
        let two = ValidationReport::from_diagnostics(vec![c, a, b]);
        assert_eq!(one, two);
        assert_eq!(one.diagnostics()[0].location, Some(Location::new(2, 4)));
    }

    #[test]
    fn test_check_report_flush() {
        let collector = ReportCollector::new();
        let mut buffer = CheckReport::new("EPUB/c1.xhtml");
        buffer.warning("HTM_X", None, "something odd");
        assert!(!buffer.flush(&collector));

        let report = collector.to_report();
        assert_eq!(report.warning_count(), 1);
        assert_eq!(report.diagnostics()[0].path.as_deref(), Some("EPUB/c1.xhtml"));

        let clean = CheckReport::new("EPUB/c2.xhtml");
        assert!(clean.flush(&collector));
    }

    #[test]
    fn test_collector_accepts_concurrent_reports() {
        let collector = Arc::new(ReportCollector::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let collector = Arc::clone(&collector);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        collector.report(
                            ValidationDiagnostic::error("T", "concurrent")
                                .with_path(format!("EPUB/{}.xhtml", i)),
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(collector.counts().error, 100);
        assert_eq!(collector.to_report().error_count(), 100);
    }
}
