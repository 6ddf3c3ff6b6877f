use std::sync::{Arc, Mutex};

use snafu::Snafu;
use tracing::error;

/// Structural inconsistencies detected while maintaining the child lists.
///
/// These are reported, never raised: the offending operation leaves the tree
/// untouched and the caller carries on.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum StructuralError {
    #[snafu(display("{child} is not a child of {parent} - cannot unlink from children list"))]
    NotAChild { child: String, parent: String },
    #[snafu(display("Couldn't unlink {child} from {parent} children list"))]
    MissingFromChildList { child: String, parent: String },
}

pub trait DiagnosticSink: Send {
    fn report(&self, problem: &StructuralError);
}

/// Forwards every report to the `tracing` error log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, problem: &StructuralError) {
        error!("{problem}");
    }
}

#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    reports: Arc<Mutex<Vec<StructuralError>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<StructuralError> {
        match self.reports.lock() {
            Ok(reports) => reports.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, problem: &StructuralError) {
        match self.reports.lock() {
            Ok(mut reports) => reports.push(problem.clone()),
            Err(poisoned) => poisoned.into_inner().push(problem.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_shares_reports_between_clones() {
        let sink = RecordingSink::new();
        let handle = sink.clone();

        sink.report(&StructuralError::NotAChild {
            child: "/a/b".into(),
            parent: "/c".into(),
        });

        assert_eq!(handle.reports().len(), 1);
    }

    #[test]
    fn structural_error_display() {
        let not_a_child = StructuralError::NotAChild {
            child: "/a/b".into(),
            parent: "/c".into(),
        };
        let missing = StructuralError::MissingFromChildList {
            child: "/a/b".into(),
            parent: "/a".into(),
        };

        assert!(not_a_child.to_string().contains("is not a child of /c"));
        assert!(missing.to_string().contains("Couldn't unlink /a/b from /a"));
    }
}
