//! Mirrorshot — one-shot screenshots over OS display-mirroring grants.
//!
//! The crate wires together:
//! - Grant storage (grant.rs): the OS-issued mirroring capability and the
//!   single pending consent request
//! - Render targets (target.rs): the off-screen surface + frame sink pair,
//!   at most one live instance
//! - Frame acquisition (acquire.rs): settle delay, then a latest read with
//!   a single next-frame fallback
//! - Encoding (encode.rs): stride-aware crop, JPEG, base64 payload
//! - The session controller (session.rs): the end-to-end lifecycle
//!
//! The OS itself stays behind the traits in host.rs; a host adapter (the
//! method-call bridge on the application side) implements them and forwards
//! consent resolutions and revocation notifications as inbound events.

pub mod acquire;
pub mod encode;
pub mod error;
pub mod grant;
pub mod host;
pub mod session;
pub mod target;

pub use acquire::{NEXT_FRAME_WAIT, SETTLE_DELAY};
pub use encode::{CaptureResult, JPEG_QUALITY};
pub use error::CaptureError;
pub use host::{
    DisplayGeometry, FrameSink, GrantToken, HostError, MirrorError, MirrorSpec, MirrorSurface,
    ProjectionHost, RawFrame, BYTES_PER_PIXEL,
};
pub use session::{CaptureConfig, SessionController, SessionState};
