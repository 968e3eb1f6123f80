//! Error handling for the policy formatter.
//!
//! Parsing is fail-fast: the first malformed construct produces a single
//! `PolicyError` and aborts the whole file. The `Display` text of the error
//! is the normative diagnostic format; the `miette::Diagnostic`
//! implementation adds a labeled source span for rich reporting when the
//! crate is used as a library.

use std::fmt;
use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceSpan};
use thiserror::Error;

/// The single error type for parse failures.
#[derive(Debug)]
pub struct PolicyError {
    pub kind: ErrorKind,
    pub source_info: SourceInfo,
}

/// What went wrong, carrying everything the diagnostic line needs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    #[error("Syntax error: {expectation} at line {line} of {file}, near \"{context}\"")]
    Syntax {
        expectation: String,
        line: u32,
        file: String,
        context: String,
    },
}

/// Where it happened, for span-aware reporting.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub source: Arc<NamedSource<String>>,
    pub primary_span: SourceSpan,
}

impl PolicyError {
    pub fn syntax(
        expectation: String,
        line: u32,
        file: String,
        context: String,
        source: Arc<NamedSource<String>>,
        primary_span: SourceSpan,
    ) -> Self {
        Self {
            kind: ErrorKind::Syntax {
                expectation,
                line,
                file,
                context,
            },
            source_info: SourceInfo {
                source,
                primary_span,
            },
        }
    }
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for PolicyError {}

impl Diagnostic for PolicyError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new("polfmt::syntax"))
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let ErrorKind::Syntax { expectation, .. } = &self.kind;
        let labels = vec![LabeledSpan::new_with_span(
            Some(expectation.clone()),
            self.source_info.primary_span,
        )];
        Some(Box::new(labels.into_iter()))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&*self.source_info.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miette::Report;

    fn sample() -> PolicyError {
        let src = Arc::new(NamedSource::new("policy", "foo:x =".to_string()));
        PolicyError::syntax(
            "Unknown global definition".to_string(),
            1,
            "policy".to_string(),
            "foo:x<--HERE--> =".to_string(),
            src,
            SourceSpan::from(5..6),
        )
    }

    #[test]
    fn display_matches_diagnostic_format() {
        assert_eq!(
            sample().to_string(),
            "Syntax error: Unknown global definition at line 1 of policy, \
             near \"foo:x<--HERE--> =\""
        );
    }

    #[test]
    fn report_carries_label_and_source() {
        let report = Report::new(sample());
        let output = format!("{report:?}");
        assert!(output.contains("Unknown global definition"));
    }
}
