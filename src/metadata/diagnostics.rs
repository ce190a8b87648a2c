//! Diagnostics collection for patch installation and event dispatch.
//!
//! Neither installation failures nor handler failures stop the process: a failed patch is
//! skipped and the next one installs, a failing handler is skipped and the next one runs. Both
//! still have to be visible, and this module is where they end up.
//!
//! # Architecture
//!
//! One [`Diagnostics`] container is shared (as `Arc<Diagnostics>`) by the components that
//! report:
//! - **PatchInstaller**: unresolved targets, anchor failures, verification failures
//! - **Dispatcher**: handlers that returned an error or panicked
//! - **ProxyCache**: categories that fell back to the generic wrapper
//! - **RoundEndMachine**: aborted or deferred round endings
//!
//! The container uses `boxcar::Vec` for lock-free append. Every entry is also mirrored to the
//! `log` facade at the matching level, so an embedding host sees the same messages through
//! whatever logger it installs.
//!
//! # Key Components
//!
//! - [`Diagnostics`] - Thread-safe container for diagnostic entries
//! - [`Diagnostic`] - Individual diagnostic entry with severity and context
//! - [`DiagnosticSeverity`] - Severity level (Info, Warning, Error)
//! - [`DiagnosticCategory`] - Category of the diagnostic source
//!
//! # Usage Examples
//!
//! ```rust
//! use hookscope::metadata::diagnostics::{
//!     Diagnostic, DiagnosticCategory, DiagnosticSeverity, Diagnostics,
//! };
//! use std::sync::Arc;
//!
//! let diagnostics = Arc::new(Diagnostics::new());
//!
//! diagnostics.push(
//!     Diagnostic::new(
//!         DiagnosticSeverity::Error,
//!         DiagnosticCategory::Installation,
//!         "anchor `call RoundSummary::_ProcessServerSideCode` not found",
//!     )
//!     .with_patch("round-end")
//!     .with_directive(0),
//! );
//! diagnostics.warning(DiagnosticCategory::Dispatch, "handler #3 panicked");
//!
//! assert!(diagnostics.has_errors());
//! assert_eq!(diagnostics.by_patch("round-end").len(), 1);
//! ```
//!
//! # Thread Safety
//!
//! Handlers run on whatever thread fires the event, so reports arrive concurrently. Appending
//! never blocks and never invalidates entries already handed out by [`Diagnostics::iter`].

use std::{collections::BTreeMap, fmt};

use strum::{Display, IntoStaticStr};

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, IntoStaticStr)]
pub enum DiagnosticSeverity {
    /// Progress report, nothing went wrong
    #[strum(serialize = "INFO")]
    Info,

    /// Something degraded but kept working.
    ///
    /// A proxy fell back to its generic kind.
    #[strum(serialize = "WARN")]
    Warning,

    /// Something was not done.
    ///
    /// A patch was not installed or a handler failed. Other patches and handlers are unaffected.
    #[strum(serialize = "ERROR")]
    Error,
}

/// Which component reported a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum DiagnosticCategory {
    /// Patch installation as a whole
    Installation,
    /// Target routine resolution
    Locator,
    /// Anchor location and directive application
    Anchor,
    /// Event handler invocation
    Dispatch,
    /// Proxy construction and teardown
    Proxy,
    /// The round-end sequence
    Round,
    /// Anything else
    General,
}

/// One reported condition, with the patch, directive and event it concerns where known.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// How serious it is
    pub severity: DiagnosticSeverity,
    /// The reporting component
    pub category: DiagnosticCategory,
    /// What happened
    pub message: String,
    /// Name of the patch involved
    pub patch: Option<String>,
    /// Index of the directive involved
    pub directive: Option<usize>,
    /// Name of the event involved
    pub event: Option<&'static str>,
}

impl Diagnostic {
    /// Creates a diagnostic without patch, directive or event context.
    pub fn new(
        severity: DiagnosticSeverity,
        category: DiagnosticCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            message: message.into(),
            patch: None,
            directive: None,
            event: None,
        }
    }

    /// Names the patch this diagnostic concerns.
    #[must_use]
    pub fn with_patch(mut self, patch: impl Into<String>) -> Self {
        self.patch = Some(patch.into());
        self
    }

    /// Names the directive (by position in its patch) this diagnostic concerns.
    #[must_use]
    pub fn with_directive(mut self, directive: usize) -> Self {
        self.directive = Some(directive);
        self
    }

    /// Names the event this diagnostic concerns.
    #[must_use]
    pub fn with_event(mut self, event: &'static str) -> Self {
        self.event = Some(event);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<5} {}", self.severity, self.category)?;
        match (&self.patch, self.directive) {
            (Some(patch), Some(directive)) => write!(f, " [{patch} #{directive}]")?,
            (Some(patch), None) => write!(f, " [{patch}]")?,
            (None, Some(directive)) => write!(f, " [#{directive}]")?,
            (None, None) => {}
        }
        if let Some(event) = self.event {
            write!(f, " <{event}>")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Append-only, shareable collection of [`Diagnostic`]s.
///
/// # Example
///
/// ```rust
/// use hookscope::metadata::diagnostics::{Diagnostics, DiagnosticCategory};
/// use std::sync::Arc;
///
/// let diagnostics = Arc::new(Diagnostics::new());
///
/// let diag_clone = Arc::clone(&diagnostics);
/// std::thread::spawn(move || {
///     diag_clone.warning(DiagnosticCategory::Proxy, "unknown category, using generic");
/// })
/// .join()
/// .unwrap();
///
/// diagnostics.error(DiagnosticCategory::Locator, "no routine named Start");
/// assert_eq!(diagnostics.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: boxcar::Vec<Diagnostic>,
}

impl Diagnostics {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an [`Info`](DiagnosticSeverity::Info) diagnostic without context.
    pub fn info(&self, category: DiagnosticCategory, message: impl Into<String>) {
        self.record(DiagnosticSeverity::Info, category, message);
    }

    /// Records a [`Warning`](DiagnosticSeverity::Warning) diagnostic without context.
    pub fn warning(&self, category: DiagnosticCategory, message: impl Into<String>) {
        self.record(DiagnosticSeverity::Warning, category, message);
    }

    /// Records an [`Error`](DiagnosticSeverity::Error) diagnostic without context.
    pub fn error(&self, category: DiagnosticCategory, message: impl Into<String>) {
        self.record(DiagnosticSeverity::Error, category, message);
    }

    fn record(
        &self,
        severity: DiagnosticSeverity,
        category: DiagnosticCategory,
        message: impl Into<String>,
    ) {
        self.push(Diagnostic::new(severity, category, message));
    }

    /// Records `diagnostic` and mirrors it to the `log` facade at the matching level.
    pub fn push(&self, diagnostic: Diagnostic) {
        let level = match diagnostic.severity {
            DiagnosticSeverity::Info => log::Level::Info,
            DiagnosticSeverity::Warning => log::Level::Warn,
            DiagnosticSeverity::Error => log::Level::Error,
        };
        log::log!(target: "hookscope", level, "{diagnostic}");
        self.entries.push(diagnostic);
    }

    /// Number of recorded diagnostics.
    pub fn len(&self) -> usize {
        self.entries.count()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if at least one error was recorded.
    pub fn has_errors(&self) -> bool {
        self.iter().any(|d| d.severity == DiagnosticSeverity::Error)
    }

    /// Returns true if at least one warning was recorded.
    pub fn has_warnings(&self) -> bool {
        self.iter().any(|d| d.severity == DiagnosticSeverity::Warning)
    }

    /// Number of errors.
    pub fn error_count(&self) -> usize {
        self.matching(|d| d.severity == DiagnosticSeverity::Error).len()
    }

    /// Number of warnings.
    pub fn warning_count(&self) -> usize {
        self.matching(|d| d.severity == DiagnosticSeverity::Warning).len()
    }

    /// Iterates in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().map(|(_, d)| d)
    }

    /// All diagnostics satisfying `predicate`, in recording order.
    pub fn matching<P>(&self, predicate: P) -> Vec<&Diagnostic>
    where
        P: Fn(&Diagnostic) -> bool,
    {
        self.iter().filter(|d| predicate(d)).collect()
    }

    /// All errors.
    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.matching(|d| d.severity == DiagnosticSeverity::Error)
    }

    /// All warnings.
    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.matching(|d| d.severity == DiagnosticSeverity::Warning)
    }

    /// Diagnostics reported by `category`.
    pub fn by_category(&self, category: DiagnosticCategory) -> Vec<&Diagnostic> {
        self.matching(|d| d.category == category)
    }

    /// Diagnostics concerning the named patch.
    pub fn by_patch(&self, patch: &str) -> Vec<&Diagnostic> {
        self.matching(|d| d.patch.as_deref() == Some(patch))
    }

    /// Diagnostics concerning the named event.
    pub fn by_event(&self, event: &str) -> Vec<&Diagnostic> {
        self.matching(|d| d.event == Some(event))
    }

    /// Renders the warnings and errors, grouped by patch.
    ///
    /// Diagnostics without a patch come first under `(runtime)`. Info entries are only counted.
    pub fn summary(&self) -> String {
        let mut groups: BTreeMap<Option<&str>, Vec<&Diagnostic>> = BTreeMap::new();
        let mut infos = 0;
        for diagnostic in self.iter() {
            if diagnostic.severity == DiagnosticSeverity::Info {
                infos += 1;
            } else {
                groups
                    .entry(diagnostic.patch.as_deref())
                    .or_default()
                    .push(diagnostic);
            }
        }

        let mut output = format!(
            "{} error(s), {} warning(s), {infos} info(s)\n",
            self.error_count(),
            self.warning_count()
        );
        for (patch, entries) in groups {
            output.push_str(patch.unwrap_or("(runtime)"));
            output.push('\n');
            for diagnostic in entries {
                output.push_str("  ");
                output.push_str(&diagnostic.to_string());
                output.push('\n');
            }
        }
        output
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}
