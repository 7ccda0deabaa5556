//! The capture-session lifecycle, end to end.
//!
//! One controller owns the whole flow: request a mirroring grant, build a
//! render target against it, wait for a frame, encode it, and tear the
//! render resources down again. Teardown runs on every path out of a
//! capture, which is the central contract of this module: a caller never
//! receives an outcome while a render target is still live from its session
//! (unless the grant survived and the next capture will rebuild anyway).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::acquire::{self, NEXT_FRAME_WAIT, SETTLE_DELAY};
use crate::encode::{self, CaptureResult, JPEG_QUALITY};
use crate::error::CaptureError;
use crate::grant::{GrantStore, Resolution};
use crate::host::{DisplayGeometry, GrantToken, MirrorError, ProjectionHost};
use crate::target::{RenderTarget, TargetSlot};

/// Where the controller is in the grant/capture lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No grant held, nothing pending.
    Idle,
    /// The consent prompt is up; waiting for its resolution.
    AwaitingGrant,
    /// A grant is held and ready for captures.
    GrantHeld,
    /// A capture is in flight.
    Capturing,
}

/// Tunables for a capture session.
#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    /// Wait between creating the mirror and reading a frame from it.
    pub settle_delay: Duration,
    /// Bound on the blocking next-frame fallback read.
    pub next_frame_wait: Duration,
    /// Lossy compression level, 1-100.
    pub jpeg_quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            settle_delay: SETTLE_DELAY,
            next_frame_wait: NEXT_FRAME_WAIT,
            jpeg_quality: JPEG_QUALITY,
        }
    }
}

struct Inner {
    host: Arc<dyn ProjectionHost>,
    geometry: DisplayGeometry,
    config: CaptureConfig,
    grants: GrantStore,
    targets: Arc<TargetSlot>,
    state: Mutex<SessionState>,
}

/// Orchestrates one capture at a time against a [`ProjectionHost`].
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    pub fn new(host: Arc<dyn ProjectionHost>) -> Self {
        Self::with_config(host, CaptureConfig::default())
    }

    pub fn with_config(host: Arc<dyn ProjectionHost>, config: CaptureConfig) -> Self {
        // Geometry is snapshotted once; rotation is not tracked.
        let geometry = host.display_geometry();
        let targets = Arc::new(TargetSlot::new());
        let grants = GrantStore::new(Arc::clone(&targets));
        Self {
            inner: Arc::new(Inner {
                host,
                geometry,
                config,
                grants,
                targets,
                state: Mutex::new(SessionState::Idle),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state_lock()
    }

    pub fn has_grant(&self) -> bool {
        self.inner.grants.has_grant()
    }

    pub fn geometry(&self) -> DisplayGeometry {
        self.inner.geometry
    }

    /// Run the consent flow and wait for its resolution.
    ///
    /// The foreground task is started before the prompt goes up; platforms
    /// may kill the consent UI of a backgrounded caller. Resolution arrives
    /// out-of-band through [`resolve_consent`](Self::resolve_consent).
    pub async fn request_permission(&self) -> Result<(), CaptureError> {
        if self.state() == SessionState::Capturing {
            return Err(CaptureError::SessionBusy);
        }

        self.inner.host.start_foreground()?;

        let pending = self.inner.grants.begin_request();
        self.set_state(SessionState::AwaitingGrant);

        if let Err(err) = self.inner.host.present_consent() {
            self.inner.grants.cancel_request();
            self.set_state(SessionState::Idle);
            return Err(err.into());
        }

        log::info!("consent prompt presented, waiting for resolution");
        match pending.await {
            Ok(outcome) => outcome,
            // The sender slot was dropped without resolving (teardown).
            Err(_) => Err(CaptureError::RequestFailed(
                "permission request was abandoned".into(),
            )),
        }
    }

    /// Inbound event: the platform resolved the consent prompt.
    pub fn resolve_consent(&self, approved: bool, token: Option<Box<dyn GrantToken>>) {
        let weak = Arc::downgrade(&self.inner);
        let resolution = self.inner.grants.resolve(
            approved,
            token,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    log::info!("platform revoked the mirroring grant");
                    inner.force_teardown();
                }
            }),
        );

        let mut state = self.state_lock();
        match resolution {
            // Leave an in-flight capture alone; it is using the old grant's
            // render target and will finish on its own.
            Resolution::Granted if *state != SessionState::Capturing => {
                *state = SessionState::GrantHeld;
            }
            Resolution::Denied if *state == SessionState::AwaitingGrant => {
                *state = SessionState::Idle;
            }
            _ => {}
        }
    }

    /// Inbound event: the grant was revoked (no payload).
    pub fn notify_revoked(&self) {
        log::info!("revocation notification received");
        self.inner.force_teardown();
    }

    /// The host is destroying the calling context; tear everything down.
    pub fn handle_host_destroyed(&self) {
        log::info!("host context destroyed, tearing the session down");
        self.inner.force_teardown();
    }

    /// Capture one screenshot with the held grant.
    pub async fn capture_screen(&self) -> Result<CaptureResult, CaptureError> {
        self.begin_capture()?;
        let started = std::time::Instant::now();

        let outcome = self.run_capture().await;

        // Teardown before the outcome is handed back. Release failures here
        // are logged, not surfaced; the caller's result already exists.
        if let Err(err) = self.inner.targets.release() {
            log::warn!("render target release after capture failed: {err}");
        }
        self.finish_capture();

        match &outcome {
            Ok(result) => log::info!(
                "captured {}x{} screenshot, {} bytes in {}ms",
                result.width,
                result.height,
                result.size,
                started.elapsed().as_millis()
            ),
            Err(err) => log::warn!("capture session failed: {err}"),
        }
        outcome
    }

    /// Tear down the session: render target, grant, foreground task.
    ///
    /// A no-op while idle. Unlike the implicit teardown paths, failures here
    /// were explicitly asked about and surface as [`CaptureError::StopFailed`].
    pub async fn stop_capture(&self) -> Result<(), CaptureError> {
        let mut failures: Vec<String> = Vec::new();

        if let Err(err) = self.inner.targets.release() {
            failures.push(format!("render target: {err}"));
        }
        self.inner.grants.revoke();
        if let Err(err) = self.inner.host.stop_foreground() {
            failures.push(format!("foreground task: {err}"));
        }
        self.set_state(SessionState::Idle);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CaptureError::StopFailed(failures.join("; ")))
        }
    }

    fn state_lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SessionState) {
        *self.state_lock() = state;
    }

    /// Gate a capture: one at a time, and never without a grant.
    fn begin_capture(&self) -> Result<(), CaptureError> {
        let mut state = self.state_lock();
        if *state == SessionState::Capturing {
            return Err(CaptureError::SessionBusy);
        }
        if !self.inner.grants.has_grant() {
            return Err(CaptureError::NoPermission);
        }
        *state = SessionState::Capturing;
        Ok(())
    }

    /// Settle the state after a capture: the grant may have been consumed,
    /// revoked, or stopped while the capture ran.
    fn finish_capture(&self) {
        let mut state = self.state_lock();
        if *state == SessionState::Capturing {
            *state = if self.inner.grants.has_grant() {
                SessionState::GrantHeld
            } else {
                SessionState::Idle
            };
        }
    }

    async fn run_capture(&self) -> Result<CaptureResult, CaptureError> {
        let inner = &self.inner;

        let target = RenderTarget::create(inner.host.as_ref(), &inner.grants, inner.geometry)
            .map_err(|err| self.grant_failure(err))?;
        inner.targets.install(target);

        let frame = acquire::await_frame(
            &inner.targets,
            inner.config.settle_delay,
            inner.config.next_frame_wait,
        )
        .await?;

        encode::encode_frame(frame, &inner.geometry, inner.config.jpeg_quality)
    }

    /// Map a mirror-bind failure onto the caller-facing taxonomy.
    ///
    /// A consumed grant is reported distinctly so the caller knows a fresh
    /// permission request is the fix, and the dead token is dropped so the
    /// next capture fails fast instead of hitting the platform again.
    fn grant_failure(&self, err: MirrorError) -> CaptureError {
        match err {
            MirrorError::Consumed(why) => {
                self.inner.grants.invalidate();
                CaptureError::GrantExpired(why)
            }
            MirrorError::Backend(why) => CaptureError::GrantInvalid(why),
        }
    }
}

impl Inner {
    /// Full teardown, shared by revocation (callback or event) and host
    /// destruction. Best-effort: failures are logged, never surfaced.
    fn force_teardown(&self) {
        self.grants.revoke();
        if let Err(err) = self.host.stop_foreground() {
            log::warn!("stopping the foreground task during teardown failed: {err}");
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = SessionState::Idle;
    }
}
