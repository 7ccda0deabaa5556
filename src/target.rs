//! Render targets — the off-screen surface + frame sink pair bound to a
//! grant, and the single slot that owns the live one.
//!
//! At most one render target exists process-wide. `TargetSlot` enforces
//! that: installing a new target releases the previous one first, and both
//! the capture path and the revocation path go through the slot's lock, so
//! a revocation arriving mid-capture can empty the slot out from under the
//! in-flight session.

use std::sync::{Arc, Mutex, PoisonError};

use crate::grant::GrantStore;
use crate::host::{DisplayGeometry, FrameSink, MirrorError, MirrorSpec, MirrorSurface, ProjectionHost};

/// A frame sink plus the mirroring surface rendering into it.
pub struct RenderTarget {
    sink: Option<Arc<dyn FrameSink>>,
    surface: Option<Box<dyn MirrorSurface>>,
}

impl RenderTarget {
    /// Allocate a sink sized to `geometry` and bind a mirroring surface to
    /// the stored grant.
    ///
    /// [`MirrorError::Consumed`] means the grant itself was rejected and the
    /// caller should invalidate it; any other failure leaves the grant
    /// alone. A sink whose surface binding fails is closed before returning.
    pub fn create(
        host: &dyn ProjectionHost,
        grants: &GrantStore,
        geometry: DisplayGeometry,
    ) -> Result<Self, MirrorError> {
        let sink = host
            .create_frame_sink(geometry)
            .map_err(|e| MirrorError::Backend(format!("frame sink: {e}")))?;

        let spec = MirrorSpec { geometry, auto_mirror: true };
        let surface = match grants.bind_mirror(&sink, &spec) {
            Ok(surface) => surface,
            Err(err) => {
                sink.close();
                return Err(err);
            }
        };

        Ok(Self { sink: Some(sink), surface: Some(surface) })
    }

    #[cfg(test)]
    pub(crate) fn for_tests(sink: Arc<dyn FrameSink>, surface: Box<dyn MirrorSurface>) -> Self {
        Self { sink: Some(sink), surface: Some(surface) }
    }

    /// The sink this target renders into, while the target is live.
    pub fn sink(&self) -> Option<Arc<dyn FrameSink>> {
        self.sink.clone()
    }

    /// Release the mirroring surface first, then the sink. Idempotent.
    pub fn release(&mut self) -> Result<(), MirrorError> {
        let surface_result = match self.surface.take() {
            Some(mut surface) => surface.release(),
            None => Ok(()),
        };
        if let Some(sink) = self.sink.take() {
            sink.close();
        }
        surface_result
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        // Backstop so a handle can never leak its surface. The explicit
        // release paths have already emptied both slots in the normal case.
        if let Err(err) = self.release() {
            log::warn!("render target release during drop failed: {err}");
        }
    }
}

/// The single slot holding the live render target, if any.
pub struct TargetSlot {
    current: Mutex<Option<RenderTarget>>,
}

impl TargetSlot {
    pub fn new() -> Self {
        Self { current: Mutex::new(None) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<RenderTarget>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install a freshly created target, releasing any previous one first.
    pub fn install(&self, target: RenderTarget) {
        let previous = self.lock().replace(target);
        if let Some(mut previous) = previous {
            log::warn!("replacing a live render target");
            if let Err(err) = previous.release() {
                log::warn!("release of replaced render target failed: {err}");
            }
        }
    }

    /// The live target's sink, if a target is installed.
    pub fn sink(&self) -> Option<Arc<dyn FrameSink>> {
        self.lock().as_ref().and_then(RenderTarget::sink)
    }

    /// Release and clear the live target. Safe to call on an empty slot.
    pub fn release(&self) -> Result<(), MirrorError> {
        let taken = self.lock().take();
        match taken {
            Some(mut target) => target.release(),
            None => Ok(()),
        }
    }

    pub fn is_live(&self) -> bool {
        self.lock().is_some()
    }
}
