//! Frame acquisition — wait out the settle delay, then pull a frame.

use std::time::Duration;

use crate::error::CaptureError;
use crate::host::RawFrame;
use crate::target::TargetSlot;

/// Wait after creating a mirroring surface before a frame reliably reflects
/// current on-screen content. Chosen empirically; too short yields blank or
/// partial frames.
pub const SETTLE_DELAY: Duration = Duration::from_millis(800);

/// Bound on the blocking next-frame fallback read.
pub const NEXT_FRAME_WAIT: Duration = Duration::from_millis(500);

/// Retrieve one frame from the live render target.
///
/// Sleeps cooperatively for `settle_delay` (other host-context work keeps
/// running), then tries the non-blocking latest-frame read, falling back
/// once to a blocking next-frame read bounded by `next_frame_wait`.
///
/// The slot turning up empty after the sleep means the target was torn down
/// mid-flight, by revocation or an explicit stop.
pub async fn await_frame(
    targets: &TargetSlot,
    settle_delay: Duration,
    next_frame_wait: Duration,
) -> Result<RawFrame, CaptureError> {
    tokio::time::sleep(settle_delay).await;

    let Some(sink) = targets.sink() else {
        return Err(CaptureError::GrantExpired(
            "render target released while waiting for the mirror to settle".into(),
        ));
    };

    if let Some(frame) = sink.acquire_latest() {
        return Ok(frame);
    }

    log::debug!("latest-frame read came back empty, falling back to a next-frame read");
    sink.acquire_next(next_frame_wait)
        .ok_or(CaptureError::NoFrameAvailable)
}
