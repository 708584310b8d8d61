//! Stage error taxonomy.

/// Error returned by any I/O-performing pipeline stage.
///
/// The variant decides what the retry executor does: transient failures are
/// retried with backoff inside the stage, fatal ones abort the current tick
/// for the affected table.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Connection refused, reset or timed out; the call may succeed later.
    #[error("transient failure: {0:#}")]
    Transient(anyhow::Error),

    /// Malformed query, schema mismatch, rejected document.
    #[error("{0:#}")]
    Fatal(anyhow::Error),
}

impl StageError {
    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        Self::Transient(err.into())
    }

    pub fn fatal(err: impl Into<anyhow::Error>) -> Self {
        Self::Fatal(err.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Attach context to the inner error, keeping the classification.
    pub fn context(self, ctx: impl std::fmt::Display + Send + Sync + 'static) -> Self {
        match self {
            Self::Transient(e) => Self::Transient(e.context(ctx)),
            Self::Fatal(e) => Self::Fatal(e.context(ctx)),
        }
    }
}
