//! Platform boundary — the traits a host adapter implements.
//!
//! Everything OS-specific lives behind these traits: presenting the consent
//! prompt, keeping a foreground task alive for the session, allocating the
//! frame sink, and binding a mirroring surface to a grant. The crate itself
//! ships no backend; the method-call bridge on the host side supplies one.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Number of bytes per pixel in sink buffers (32-bit RGBA).
pub const BYTES_PER_PIXEL: usize = 4;

/// Immutable snapshot of the display taken once at controller construction.
///
/// Assumed stable for the process lifetime; rotation is not tracked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayGeometry {
    pub width: u32,
    pub height: u32,
    pub density_factor: f32,
}

/// One acquired pixel buffer, with the stride metadata the renderer used.
///
/// Renderers may pad rows, so `row_stride` can exceed
/// `pixel_stride * width`. The frame is consumed by value by the encoder;
/// dropping it releases the buffer.
#[derive(Debug)]
pub struct RawFrame {
    pub data: Vec<u8>,
    /// Bytes from the start of one row to the start of the next.
    pub row_stride: usize,
    /// Bytes per pixel within a row.
    pub pixel_stride: usize,
}

/// Parameters for binding a mirroring surface to a grant.
#[derive(Debug, Clone, Copy)]
pub struct MirrorSpec {
    pub geometry: DisplayGeometry,
    /// Keep the mirror in sync with host display changes.
    pub auto_mirror: bool,
}

/// Errors from the host execution context.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The calling environment cannot present UI or run a foreground task
    /// right now (e.g. no live activity/window).
    #[error("host context unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Failed(String),
}

/// Errors from the mirroring layer.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// The platform refused the grant: already consumed, expired, or timed
    /// out. Callers must re-run the consent flow to get a fresh one.
    #[error("mirroring grant rejected by the platform: {0}")]
    Consumed(String),

    #[error("{0}")]
    Backend(String),
}

/// The buffer queue a mirroring surface renders into.
///
/// Backed by something like an image reader: a small fixed number of
/// in-flight buffers in the format described by [`BYTES_PER_PIXEL`].
pub trait FrameSink: Send + Sync {
    /// Non-blocking read of the most recently rendered frame, if any.
    fn acquire_latest(&self) -> Option<RawFrame>;

    /// Blocking read of the next rendered frame, bounded by `wait`.
    fn acquire_next(&self, wait: Duration) -> Option<RawFrame>;

    /// Release the sink's buffers. Further acquires return nothing.
    fn close(&self);
}

/// A live mirroring surface feeding a [`FrameSink`].
pub trait MirrorSurface: Send {
    /// Stop mirroring and free the surface.
    fn release(&mut self) -> Result<(), MirrorError>;
}

/// The OS-issued capability authorizing display mirroring.
///
/// Single-use until revoked: once the platform rejects a bind with
/// [`MirrorError::Consumed`], the token is dead and the holder should drop
/// it and re-request consent.
pub trait GrantToken: Send {
    /// Bind a mirroring surface that renders into `sink`.
    fn open_mirror(
        &mut self,
        sink: &Arc<dyn FrameSink>,
        spec: &MirrorSpec,
    ) -> Result<Box<dyn MirrorSurface>, MirrorError>;

    /// Ask the platform to call `notify` when it revokes this grant.
    ///
    /// Returns `false` when the platform offers no revocation callback;
    /// the holder then finds out a grant is stale only when a bind fails.
    fn watch_revocation(&mut self, notify: Box<dyn Fn() + Send + Sync>) -> bool;

    /// Relinquish the grant back to the platform.
    fn release(&mut self);
}

/// The host execution context the capture session runs inside.
pub trait ProjectionHost: Send + Sync {
    /// Start the persistent foreground task backing the session.
    ///
    /// Must be running before the consent flow is presented; platforms may
    /// kill the consent UI otherwise.
    fn start_foreground(&self) -> Result<(), HostError>;

    /// Stop the foreground task.
    fn stop_foreground(&self) -> Result<(), HostError>;

    /// Launch the system consent prompt. Its result arrives out-of-band as
    /// a consent-resolution event, not as a return value.
    fn present_consent(&self) -> Result<(), HostError>;

    /// Current display dimensions and density.
    fn display_geometry(&self) -> DisplayGeometry;

    /// Allocate a frame sink sized exactly to `geometry`, in 32-bit RGBA.
    fn create_frame_sink(&self, geometry: DisplayGeometry)
        -> Result<Arc<dyn FrameSink>, HostError>;
}
