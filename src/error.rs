//! The error taxonomy surfaced to bridge callers.

use crate::host::HostError;

/// Everything a capture session can fail with.
///
/// Variants carry a human-readable cause where one exists. None of these are
/// retried internally; re-requesting consent after [`GrantExpired`] is the
/// caller's job.
///
/// [`GrantExpired`]: CaptureError::GrantExpired
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The host has no context able to present the consent UI.
    #[error("host context unavailable: {0}")]
    NoHostContext(String),

    /// The consent flow could not be started or was abandoned.
    #[error("permission request failed: {0}")]
    RequestFailed(String),

    /// The user declined the consent prompt.
    #[error("screen capture permission denied by user")]
    PermissionDenied,

    /// No grant is held; request permission first.
    #[error("no capture permission held; request permission first")]
    NoPermission,

    /// The grant could not be used to mirror the display.
    #[error("mirroring grant unusable: {0}")]
    GrantInvalid(String),

    /// The platform rejected the grant as consumed or expired. The stored
    /// grant has been invalidated; request permission again.
    #[error("mirroring grant expired ({0}); request permission again")]
    GrantExpired(String),

    /// Neither the latest nor the next frame could be acquired.
    #[error("no frame available from the render target")]
    NoFrameAvailable,

    /// The raw frame could not be converted to an encoded image.
    #[error("failed to convert frame: {0}")]
    ConversionError(String),

    /// A capture session is already in flight.
    #[error("a capture session is already in progress")]
    SessionBusy,

    /// Explicitly requested teardown failed part-way.
    #[error("failed to stop capture: {0}")]
    StopFailed(String),
}

impl From<HostError> for CaptureError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::Unavailable(why) => CaptureError::NoHostContext(why),
            HostError::Failed(why) => CaptureError::RequestFailed(why),
        }
    }
}
