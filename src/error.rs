//! Error taxonomy for a monitored test run.

use thiserror::Error;

use crate::catalog::TestId;

#[derive(Debug, Error)]
pub enum RunError {
    /// A controller, storage, or connection call failed. Never retried here.
    #[error("{op} failed")]
    Transport {
        op: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("no tests found for target {target}; refusing to monitor an empty run")]
    EmptyCatalog { target: String },

    #[error("{} step(s) failed while archiving finished tests", failures.len())]
    Archive { failures: Vec<ArchiveFailure> },
}

/// One step of finishing a test that did not complete within a polling cycle.
#[derive(Debug, Error)]
#[error("{op} for test {test} failed: {source:#}")]
pub struct ArchiveFailure {
    pub test: TestId,
    /// `"publish run stats"` or `"archive results"`.
    pub op: &'static str,
    pub source: anyhow::Error,
}

/// Tags a collaborator failure with the operation that produced it.
pub(crate) trait Transport<T> {
    fn transport(self, op: &'static str) -> Result<T, RunError>;
}

impl<T> Transport<T> for anyhow::Result<T> {
    fn transport(self, op: &'static str) -> Result<T, RunError> {
        self.map_err(|source| RunError::Transport { op, source })
    }
}
