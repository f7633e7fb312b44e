//! Step and pipeline outcomes

use serde::{Deserialize, Serialize};
use std::fmt;

/// How grave a failure is
///
/// Ordered from least to most severe so that the gravest failure of a
/// collection is simply its maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, the step still produced usable output
    Info,
    /// Degraded result, processing continues with fallback content
    Warning,
    /// Processing of the current execution must stop
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

/// A single failure recorded while executing a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineFailure {
    severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    step: Option<String>,
    message: String,
}

impl PipelineFailure {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            step: None,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    /// Attribute this failure to a named step
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Name of the step that produced this failure, if known
    pub fn step(&self) -> Option<&str> {
        self.step.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }

    pub(crate) fn attribute_to(&mut self, step: &str) {
        if self.step.is_none() {
            self.step = Some(step.to_string());
        }
    }
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step {
            Some(step) => write!(f, "[{}] {}: {}", self.severity, step, self.message),
            None => write!(f, "[{}] {}", self.severity, self.message),
        }
    }
}

/// Tri-state outcome of a step or of a whole pipeline execution
///
/// Exactly one variant is active. A `FatalFailure` stops the pipeline; a
/// `RecoverableFailure` is reported while processing continues, optionally
/// with content that downstream steps should use.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineResult<T> {
    Success(T),
    RecoverableFailure {
        content: Option<T>,
        failures: Vec<PipelineFailure>,
    },
    FatalFailure {
        failures: Vec<PipelineFailure>,
    },
}

impl<T> PipelineResult<T> {
    pub fn success(content: T) -> Self {
        PipelineResult::Success(content)
    }

    /// Recoverable failure, with the content to continue with (if any)
    pub fn recoverable(content: Option<T>, failure: PipelineFailure) -> Self {
        PipelineResult::RecoverableFailure {
            content,
            failures: vec![failure],
        }
    }

    pub fn fatal(failure: PipelineFailure) -> Self {
        PipelineResult::FatalFailure {
            failures: vec![failure],
        }
    }

    /// Build a failed result whose tag follows the failure's severity
    pub fn failure(content: Option<T>, failure: PipelineFailure) -> Self {
        if failure.is_fatal() {
            Self::fatal(failure)
        } else {
            Self::recoverable(content, failure)
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Success(_))
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, PipelineResult::RecoverableFailure { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineResult::FatalFailure { .. })
    }

    /// All failures carried by this result (empty on success)
    pub fn failures(&self) -> &[PipelineFailure] {
        match self {
            PipelineResult::Success(_) => &[],
            PipelineResult::RecoverableFailure { failures, .. }
            | PipelineResult::FatalFailure { failures } => failures.as_slice(),
        }
    }

    pub fn content(&self) -> Option<&T> {
        match self {
            PipelineResult::Success(content) => Some(content),
            PipelineResult::RecoverableFailure { content, .. } => content.as_ref(),
            PipelineResult::FatalFailure { .. } => None,
        }
    }

    pub fn into_content(self) -> Option<T> {
        match self {
            PipelineResult::Success(content) => Some(content),
            PipelineResult::RecoverableFailure { content, .. } => content,
            PipelineResult::FatalFailure { .. } => None,
        }
    }

    /// Transform the content while keeping the tag and failures
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PipelineResult<U> {
        match self {
            PipelineResult::Success(content) => PipelineResult::Success(f(content)),
            PipelineResult::RecoverableFailure { content, failures } => {
                PipelineResult::RecoverableFailure {
                    content: content.map(f),
                    failures,
                }
            }
            PipelineResult::FatalFailure { failures } => PipelineResult::FatalFailure { failures },
        }
    }

    /// Fill in the step name of every failure that has none yet
    pub(crate) fn attributed_to(mut self, step: &str) -> Self {
        match &mut self {
            PipelineResult::Success(_) => {}
            PipelineResult::RecoverableFailure { failures, .. }
            | PipelineResult::FatalFailure { failures } => {
                failures.iter_mut().for_each(|f| f.attribute_to(step));
            }
        }
        self
    }

    /// Combine many results into one over the collected contents.
    ///
    /// The gravest outcome wins: any fatal result makes the merged result
    /// fatal, otherwise any failure makes it recoverable (keeping every
    /// content that is present). Failures are concatenated in input order.
    pub fn merge(results: impl IntoIterator<Item = PipelineResult<T>>) -> PipelineResult<Vec<T>> {
        let mut contents = Vec::new();
        let mut failures = Vec::new();
        let mut fatal = false;

        for result in results {
            match result {
                PipelineResult::Success(content) => contents.push(content),
                PipelineResult::RecoverableFailure {
                    content,
                    failures: recorded,
                } => {
                    contents.extend(content);
                    failures.extend(recorded);
                }
                PipelineResult::FatalFailure { failures: recorded } => {
                    fatal = true;
                    failures.extend(recorded);
                }
            }
        }

        if fatal {
            PipelineResult::FatalFailure { failures }
        } else if failures.is_empty() {
            PipelineResult::Success(contents)
        } else {
            PipelineResult::RecoverableFailure {
                content: Some(contents),
                failures,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Fatal > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        let gravest = [Severity::Info, Severity::Fatal, Severity::Warning]
            .into_iter()
            .max();
        assert_eq!(gravest, Some(Severity::Fatal));
    }

    #[test]
    fn test_failure_picks_tag_from_severity() {
        let r: PipelineResult<u32> = PipelineResult::failure(Some(1), PipelineFailure::fatal("boom"));
        assert!(r.is_fatal());
        assert_eq!(r.content(), None);

        let r: PipelineResult<u32> = PipelineResult::failure(Some(1), PipelineFailure::warning("meh"));
        assert!(r.is_recoverable());
        assert_eq!(r.content(), Some(&1));
    }

    #[test]
    fn test_failure_display() {
        let failure = PipelineFailure::warning("service unreachable").with_step("FetchSnapshot");
        assert_eq!(failure.to_string(), "[warning] FetchSnapshot: service unreachable");
        assert_eq!(PipelineFailure::info("noop").to_string(), "[info] noop");
    }

    #[test]
    fn test_map_keeps_failures() {
        let r = PipelineResult::recoverable(Some(2), PipelineFailure::warning("w")).map(|v| v * 10);
        assert_eq!(r.content(), Some(&20));
        assert_eq!(r.failures().len(), 1);
    }

    #[test]
    fn test_attribution_does_not_overwrite() {
        let r: PipelineResult<()> = PipelineResult::FatalFailure {
            failures: vec![
                PipelineFailure::fatal("a"),
                PipelineFailure::fatal("b").with_step("Inner"),
            ],
        };
        let r = r.attributed_to("Outer");
        let steps: Vec<_> = r.failures().iter().map(|f| f.step()).collect();
        assert_eq!(steps, vec![Some("Outer"), Some("Inner")]);
    }

    #[test]
    fn test_merge_all_success() {
        let merged = PipelineResult::merge(vec![
            PipelineResult::success(1),
            PipelineResult::success(2),
        ]);
        assert_eq!(merged, PipelineResult::Success(vec![1, 2]));
    }

    #[test]
    fn test_merge_recoverable_keeps_present_contents() {
        let merged = PipelineResult::merge(vec![
            PipelineResult::success(1),
            PipelineResult::recoverable(None, PipelineFailure::warning("lost")),
            PipelineResult::recoverable(Some(3), PipelineFailure::info("partial")),
        ]);
        assert!(merged.is_recoverable());
        assert_eq!(merged.content(), Some(&vec![1, 3]));
        assert_eq!(merged.failures().len(), 2);
    }

    #[test]
    fn test_merge_fatal_wins() {
        let merged = PipelineResult::merge(vec![
            PipelineResult::recoverable(Some(1), PipelineFailure::warning("w")),
            PipelineResult::fatal(PipelineFailure::fatal("f")),
            PipelineResult::success(3),
        ]);
        assert!(merged.is_fatal());
        assert_eq!(merged.failures().len(), 2);
        assert_eq!(merged.into_content(), None);
    }
}
