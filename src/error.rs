use std::fmt;

use thiserror::Error;

/// Errors surfaced by the core engine.
///
/// Recovery is the caller's job: every operation here is transactional at
/// the level of a single output, so a caller that sees an `Err` can discard
/// any partial output and retry. The engine never retries internally.
#[derive(Debug, Error)]
pub enum Error {
    /// A precondition on the arguments themselves was violated: `K == 0`,
    /// an empty palette, mismatched bit depths, too many colors for a
    /// [`crate::kdtree::KDTree3`], or a tile whose dimensions don't match
    /// the destination rectangle.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A failure surfaced by the external image provider (decode, scale,
    /// crop, or encode). The provider's own error is kept as the source so
    /// its native diagnostic text survives.
    #[error("backend failure: {0}")]
    BackendFailure(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A precondition was found violated at runtime that the caller could
    /// not have prevented by validating arguments up front (a sanity check
    /// after clustering failed, a palette presumed sorted wasn't). In debug
    /// builds this is raised as a panic with diagnostics instead of being
    /// returned, since it indicates a bug in the engine rather than bad
    /// input; release builds return it and abandon the operation without
    /// partial writes.
    #[error("inconsistent state: {0}")]
    InconsistentState(String),
}

impl Error {
    pub(crate) fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::BackendFailure(Box::new(err))
    }

    /// Raise an [`Error::InconsistentState`], panicking in debug builds so
    /// the failing invariant is caught close to its cause.
    pub(crate) fn inconsistent(msg: impl fmt::Display) -> Self {
        let msg = msg.to_string();
        debug_assert!(false, "inconsistent state: {msg}");
        Error::InconsistentState(msg)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
