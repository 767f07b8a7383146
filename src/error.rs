use thiserror::Error;

/// Failures surfaced by capability providers when a call crosses into the
/// OS media or audio subsystem.
///
/// Reconciliation treats all of these as recoverable: the step that failed
/// skips its contribution and the next notification is the retry path.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The host has no usable media or audio subsystem.
    #[error("capability unavailable: {0}")]
    Unavailable(String),

    /// The session, device or stream disappeared mid-call.
    #[error("object lost: {0}")]
    Lost(String),

    /// Any other OS-side failure.
    #[error("os error: {0}")]
    Os(String),
}

/// Result type alias using [`ProviderError`].
pub type Result<T> = std::result::Result<T, ProviderError>;
