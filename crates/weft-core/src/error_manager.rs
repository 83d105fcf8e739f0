//! The request-wide error sink.
//!
//! Plugin faults, refinement failures and validation findings raised while
//! processing are accumulated here instead of unwinding through the
//! broadcaster chain. The driver asks [`ErrorManager::has_errors`] and
//! [`ErrorManager::summarize`] once processing has settled.
//!
//! In rethrow mode the first fatal report marks the manager as aborted; the
//! emitter then stops dispatching and the driver returns
//! [`ErrorManager::abort_error`].

use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::Error;
use crate::syntax::{SourcePosition, SyntaxRef};

/// Severity of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorLevel {
    /// Processing can produce output, but something looks wrong.
    Warning,
    /// The output is not trustworthy.
    Fatal,
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Warning => "warning",
            Self::Fatal => "fatal",
        })
    }
}

/// What kind of problem a report describes. Summaries group by this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCategory {
    /// Plugin setup or input loading.
    Configuration,
    /// Malformed raw syntax.
    Parse,
    /// A subscription handler failed.
    Plugin,
    /// A validator finding.
    Validation,
}

impl ErrorCategory {
    const ALL: [Self; 4] = [
        Self::Configuration,
        Self::Parse,
        Self::Plugin,
        Self::Validation,
    ];

    fn heading(self) -> &'static str {
        match self {
            Self::Configuration => "Configuration errors",
            Self::Parse => "Parse errors",
            Self::Plugin => "Plugin errors",
            Self::Validation => "Validation errors",
        }
    }

    fn of(error: &Error) -> Self {
        match error {
            Error::Configuration { .. } | Error::Io { .. } => Self::Configuration,
            Error::Parse { .. } => Self::Parse,
            Error::Plugin { .. } | Error::Detached { .. } => Self::Plugin,
            Error::Validation { .. } => Self::Validation,
            Error::Aborted { cause } => Self::of(cause),
        }
    }
}

/// A single accumulated report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    /// Severity.
    pub level: ErrorLevel,
    /// Summary group.
    pub category: ErrorCategory,
    /// Human-readable message.
    pub message: String,
    /// Where the problem is, when known.
    pub position: Option<SourcePosition>,
    /// Kind of the unit the report is about, when known.
    pub kind: Option<&'static str>,
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.level)?;
        if let Some(position) = self.position {
            write!(f, " {position}")?;
        }
        if let Some(kind) = self.kind {
            write!(f, " ({kind})")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// What a report is about.
pub enum ReportSource {
    /// A unit a validator or plugin flagged.
    Unit(SyntaxRef),
    /// An error raised while processing.
    Error(Error),
}

impl From<SyntaxRef> for ReportSource {
    fn from(unit: SyntaxRef) -> Self {
        Self::Unit(unit)
    }
}

impl From<&SyntaxRef> for ReportSource {
    fn from(unit: &SyntaxRef) -> Self {
        Self::Unit(SyntaxRef::clone(unit))
    }
}

impl From<Error> for ReportSource {
    fn from(error: Error) -> Self {
        Self::Error(error)
    }
}

/// Accumulates reports for one processing request.
#[derive(Default)]
pub struct ErrorManager {
    reports: Mutex<Vec<ErrorReport>>,
    rethrow_fatal: AtomicBool,
    aborted: Mutex<Option<Error>>,
}

impl ErrorManager {
    /// A manager that accumulates everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// A manager that aborts on the first fatal report.
    pub fn rethrowing() -> Self {
        let manager = Self::new();
        manager.set_rethrow_fatal(true);
        manager
    }

    /// Switch rethrow mode on or off.
    pub fn set_rethrow_fatal(&self, rethrow: bool) {
        self.rethrow_fatal.store(rethrow, Ordering::Relaxed);
    }

    /// Whether fatal reports abort processing.
    pub fn rethrows_fatal(&self) -> bool {
        self.rethrow_fatal.load(Ordering::Relaxed)
    }

    /// Record a report about `source`.
    pub fn report(
        &self,
        level: ErrorLevel,
        source: impl Into<ReportSource>,
        message: impl Into<String>,
    ) {
        let message = message.into();
        let (report, error) = match source.into() {
            ReportSource::Unit(unit) => {
                let position = unit.meta().position();
                let report = ErrorReport {
                    level,
                    category: ErrorCategory::Validation,
                    message: message.clone(),
                    position: Some(position),
                    kind: Some(unit.kind()),
                };
                (report, Error::validation(message, position))
            }
            ReportSource::Error(error) => {
                let report = ErrorReport {
                    level,
                    category: ErrorCategory::of(&error),
                    message,
                    position: error.position(),
                    kind: None,
                };
                (report, error)
            }
        };

        match level {
            ErrorLevel::Warning => {
                tracing::debug!(target: "weft_core::errors", %report, "warning reported");
            }
            ErrorLevel::Fatal => {
                tracing::warn!(target: "weft_core::errors", %report, "error reported");
            }
        }
        self.reports.lock().push(report);

        if level == ErrorLevel::Fatal && self.rethrows_fatal() {
            let mut aborted = self.aborted.lock();
            if aborted.is_none() {
                *aborted = Some(error);
            }
        }
    }

    /// Record an error, using its display text as the message.
    pub fn report_error(&self, level: ErrorLevel, error: Error) {
        let message = error.to_string();
        self.report(level, error, message);
    }

    /// Whether any fatal report was recorded.
    pub fn has_errors(&self) -> bool {
        self.reports.lock().iter().any(|r| r.level == ErrorLevel::Fatal)
    }

    /// Whether any warning was recorded.
    pub fn has_warnings(&self) -> bool {
        self.reports.lock().iter().any(|r| r.level == ErrorLevel::Warning)
    }

    /// Every report, in the order they were raised.
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports.lock().clone()
    }

    /// Whether a fatal report was raised in rethrow mode.
    pub fn is_aborted(&self) -> bool {
        self.aborted.lock().is_some()
    }

    /// The error that aborted processing.
    pub fn abort_error(&self) -> Option<Error> {
        self.aborted.lock().clone().map(Error::aborted)
    }

    /// A readable summary grouped by category, chronological within a group.
    pub fn summarize(&self) -> String {
        let reports = self.reports.lock();
        if reports.is_empty() {
            return "No errors or warnings.".to_string();
        }

        let errors = reports.iter().filter(|r| r.level == ErrorLevel::Fatal).count();
        let warnings = reports.len() - errors;
        let mut out = format!(
            "{errors} error{}, {warnings} warning{}\n",
            plural(errors),
            plural(warnings)
        );
        for category in ErrorCategory::ALL {
            let mut group = reports.iter().filter(|r| r.category == category).peekable();
            if group.peek().is_none() {
                continue;
            }
            let _ = writeln!(out, "{}:", category.heading());
            for report in group {
                let _ = writeln!(out, "  {report}");
            }
        }
        out
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}

impl fmt::Debug for ErrorManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorManager")
            .field("reports", &self.reports.lock().len())
            .field("rethrow_fatal", &self.rethrows_fatal())
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

static_assertions::assert_impl_all!(ErrorManager: Send, Sync);
