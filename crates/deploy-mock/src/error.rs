use thiserror::Error;

use crate::Failure;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// A failure injected with `MockHost::fail`.
    #[error("injected failure: {0:?}")]
    Injected(Failure),
}
