use tracing::{debug, warn};

use crate::error::ErrorKind;

#[cfg(test)]
use test_log::test;

/// Non-fatal events accumulated into [`crate::SnapshotResult::warnings`].
/// `ModuleSkipped` and `StreamSummarised` are informational: the format
/// recognises these payloads well enough to skip or summarise them, that
/// is expected behaviour rather than a defect in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningKind {
    UnsupportedVersion,
    SizeCeilingExceeded,
    DroppedPendingMetadata,
    ModuleSkipped,
    StreamSummarised,
    ContainerDecodeError(ErrorKind),
    ChecksumMismatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    pub context: Vec<String>,
}

/// Context-stack-backed accumulator: components push a label while they
/// work on some sub-structure, and any warning raised while that label is
/// live gets it attached, so a reader can tell *where* the warning fired
/// without every call site having to pass that information down by hand.
#[derive(Debug, Default)]
pub(crate) struct Warnings {
    context: Vec<String>,
    warnings: Vec<Warning>,
}

impl Warnings {
    pub(crate) fn push_context(&mut self, label: impl Into<String>) {
        self.context.push(label.into());
    }

    pub(crate) fn pop_context(&mut self) {
        self.context.pop();
    }

    pub(crate) fn warn(&mut self, kind: WarningKind, message: impl Into<String>) {
        let message = message.into();
        match &kind {
            WarningKind::ModuleSkipped | WarningKind::StreamSummarised => {
                debug!(target: "snapdump", ?kind, context = ?self.context, "{message}");
            }
            _ => {
                warn!(target: "snapdump", ?kind, context = ?self.context, "{message}");
            }
        }
        self.warnings.push(Warning {
            kind,
            message,
            context: self.context.clone(),
        });
    }

    pub(crate) fn into_vec(self) -> Vec<Warning> {
        self.warnings
    }
}

#[test]
fn test_warnings_attach_context() {
    let mut w = Warnings::default();
    w.push_context("value");
    w.push_context("ziplist entry 3");
    w.warn(WarningKind::SizeCeilingExceeded, "string truncated");
    w.pop_context();
    w.pop_context();
    let out = w.into_vec();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].context, vec!["value", "ziplist entry 3"]);
}
