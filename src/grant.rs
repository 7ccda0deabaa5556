//! Grant storage — the current display-mirroring grant and the single
//! pending consent request.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

use crate::error::CaptureError;
use crate::host::{FrameSink, GrantToken, MirrorError, MirrorSpec, MirrorSurface};
use crate::target::TargetSlot;

/// Outcome of a consent-resolution event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A grant was stored.
    Granted,
    /// The user declined; the pending request was failed.
    Denied,
    /// A denial arrived with nothing pending; nothing changed.
    Ignored,
}

struct Slots {
    grant: Option<Box<dyn GrantToken>>,
    pending: Option<oneshot::Sender<Result<(), CaptureError>>>,
}

/// Holds the current grant and at most one outstanding consent request.
pub struct GrantStore {
    targets: Arc<TargetSlot>,
    slots: Mutex<Slots>,
}

impl GrantStore {
    pub fn new(targets: Arc<TargetSlot>) -> Self {
        Self {
            targets,
            slots: Mutex::new(Slots { grant: None, pending: None }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install a fresh pending request and return its receiver.
    ///
    /// A request that was still outstanding is failed: the platform delivers
    /// at most one consent result, and it will answer the newest prompt.
    pub fn begin_request(&self) -> oneshot::Receiver<Result<(), CaptureError>> {
        let (tx, rx) = oneshot::channel();
        let superseded = self.lock().pending.replace(tx);
        if let Some(old) = superseded {
            log::warn!("superseding an unresolved permission request");
            let _ = old.send(Err(CaptureError::RequestFailed(
                "superseded by a newer permission request".into(),
            )));
        }
        rx
    }

    /// Drop the pending request without resolving it (consent flow never
    /// launched).
    pub fn cancel_request(&self) {
        self.lock().pending = None;
    }

    /// Complete the pending request from the platform's consent result.
    ///
    /// On approval the token is stored as the current grant and `on_revoked`
    /// is registered with the platform, when it supports revocation
    /// callbacks. An approved token arriving with nothing pending is stored
    /// anyway; platforms can deliver the result after the requester gave up.
    pub fn resolve(
        &self,
        approved: bool,
        token: Option<Box<dyn GrantToken>>,
        on_revoked: Box<dyn Fn() + Send + Sync>,
    ) -> Resolution {
        match token {
            Some(mut token) if approved => {
                if !token.watch_revocation(on_revoked) {
                    log::debug!(
                        "platform offers no revocation callback; stale grants are detected on use"
                    );
                }
                let (pending, replaced) = {
                    let mut slots = self.lock();
                    (slots.pending.take(), slots.grant.replace(token))
                };
                if let Some(mut old) = replaced {
                    old.release();
                }
                match pending {
                    Some(tx) => {
                        let _ = tx.send(Ok(()));
                    }
                    None => log::warn!(
                        "consent approved with no pending request; storing the grant anyway"
                    ),
                }
                Resolution::Granted
            }
            _ => {
                let pending = self.lock().pending.take();
                match pending {
                    Some(tx) => {
                        let _ = tx.send(Err(CaptureError::PermissionDenied));
                        Resolution::Denied
                    }
                    None => {
                        log::warn!("consent denial arrived with no pending request");
                        Resolution::Ignored
                    }
                }
            }
        }
    }

    pub fn has_grant(&self) -> bool {
        self.lock().grant.is_some()
    }

    /// Bind a mirroring surface to the stored grant.
    pub fn bind_mirror(
        &self,
        sink: &Arc<dyn FrameSink>,
        spec: &MirrorSpec,
    ) -> Result<Box<dyn MirrorSurface>, MirrorError> {
        let mut slots = self.lock();
        let grant = slots
            .grant
            .as_mut()
            .ok_or_else(|| MirrorError::Consumed("grant revoked before use".into()))?;
        grant.open_mirror(sink, spec)
    }

    /// Drop the stored grant without calling into the platform.
    ///
    /// Used when the platform has already rejected the token as consumed or
    /// expired; there is nothing left to release.
    pub fn invalidate(&self) {
        if self.lock().grant.take().is_some() {
            log::info!("stored grant invalidated; a fresh permission request is required");
        }
    }

    /// Relinquish the grant and force-release any live render target.
    /// Idempotent.
    pub fn revoke(&self) {
        let token = self.lock().grant.take();
        if let Some(mut token) = token {
            token.release();
        }
        if let Err(err) = self.targets.release() {
            log::warn!("render target release during revoke failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullGrant {
        released: Arc<std::sync::atomic::AtomicBool>,
    }

    impl GrantToken for NullGrant {
        fn open_mirror(
            &mut self,
            _sink: &Arc<dyn FrameSink>,
            _spec: &MirrorSpec,
        ) -> Result<Box<dyn MirrorSurface>, MirrorError> {
            Err(MirrorError::Backend("not mirrorable".into()))
        }

        fn watch_revocation(&mut self, _notify: Box<dyn Fn() + Send + Sync>) -> bool {
            false
        }

        fn release(&mut self) {
            self.released.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    fn store() -> GrantStore {
        GrantStore::new(Arc::new(TargetSlot::new()))
    }

    fn null_grant() -> (Box<dyn GrantToken>, Arc<std::sync::atomic::AtomicBool>) {
        let released = Arc::new(std::sync::atomic::AtomicBool::new(false));
        (Box::new(NullGrant { released: Arc::clone(&released) }), released)
    }

    #[tokio::test]
    async fn superseded_request_is_failed() {
        let store = store();
        let first = store.begin_request();
        let _second = store.begin_request();

        let outcome = first.await.expect("sender kept alive");
        assert!(matches!(outcome, Err(CaptureError::RequestFailed(_))));
    }

    #[tokio::test]
    async fn denial_fails_the_pending_request() {
        let store = store();
        let pending = store.begin_request();

        let resolution = store.resolve(false, None, Box::new(|| {}));
        assert_eq!(resolution, Resolution::Denied);
        assert!(!store.has_grant());

        let outcome = pending.await.expect("resolved");
        assert!(matches!(outcome, Err(CaptureError::PermissionDenied)));
    }

    #[tokio::test]
    async fn approval_stores_the_grant() {
        let store = store();
        let pending = store.begin_request();

        let (token, _) = null_grant();
        let resolution = store.resolve(true, Some(token), Box::new(|| {}));
        assert_eq!(resolution, Resolution::Granted);
        assert!(store.has_grant());
        assert!(pending.await.expect("resolved").is_ok());
    }

    #[test]
    fn late_approval_is_stored_without_a_pending_request() {
        let store = store();
        let (token, _) = null_grant();
        assert_eq!(store.resolve(true, Some(token), Box::new(|| {})), Resolution::Granted);
        assert!(store.has_grant());
    }

    #[test]
    fn revoke_releases_the_token_and_is_idempotent() {
        let store = store();
        let (token, released) = null_grant();
        store.resolve(true, Some(token), Box::new(|| {}));

        store.revoke();
        assert!(!store.has_grant());
        assert!(released.load(std::sync::atomic::Ordering::SeqCst));
        store.revoke();
    }

    #[test]
    fn approval_without_a_token_counts_as_denial() {
        let store = store();
        let _pending = store.begin_request();
        assert_eq!(store.resolve(true, None, Box::new(|| {})), Resolution::Denied);
        assert!(!store.has_grant());
    }
}
