use tracing::trace;

use crate::errors::Diagnostic;
use crate::errors::Severity;

/// What the scanner or grouper should do after a diagnostic is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorResponse {
    /// Substitute a best-effort token or value and keep going.
    Continue,
    /// Stop producing tokens; the producer winds down to its end-of-file
    /// marker without scanning further.
    Halt,
}

/// Diagnostic sink - anything that can collect diagnostics for later display.
/// The return value is the sink's recovery decision; producers never abort on
/// their own.
pub trait DiagnosticSink {
    fn emit(&mut self, diagnostic: Diagnostic) -> ErrorResponse;
}

impl DiagnosticSink for () {
    fn emit(&mut self, _: Diagnostic) -> ErrorResponse {
        ErrorResponse::Continue
    }
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn emit(&mut self, diagnostic: Diagnostic) -> ErrorResponse {
        self.push(diagnostic);
        ErrorResponse::Continue
    }
}

/// Collects diagnostics but halts the producer at the first hard error.
/// Warnings and notes pass through without stopping the scan.
#[derive(Default)]
pub struct FailFast {
    pub diagnostics: Vec<Diagnostic>,
}

impl FailFast {
    pub fn new() -> Self {
        Default::default()
    }
}

impl DiagnosticSink for FailFast {
    fn emit(&mut self, diagnostic: Diagnostic) -> ErrorResponse {
        let halt = diagnostic.severity >= Severity::Error;
        if halt {
            trace!("halting after hard error: {}", diagnostic.message);
        }
        self.diagnostics.push(diagnostic);
        if halt {
            ErrorResponse::Halt
        } else {
            ErrorResponse::Continue
        }
    }
}

pub fn pipe_all_diagnostics_into<I>(sink: &mut dyn DiagnosticSink, source: I)
where
    I: IntoIterator<Item = Diagnostic>,
{
    for diagnostic in source {
        let _ = sink.emit(diagnostic);
    }
}
