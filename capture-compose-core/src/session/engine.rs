use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use super::controller::RecordingSession;
use crate::models::config::{CaptureConfig, EngineOptions};
use crate::models::error::CaptureError;
use crate::models::state::SessionState;
use crate::traits::encoder::MediaEncoder;
use crate::traits::media_devices::MediaDevices;
use crate::traits::session_events::SessionEvents;

type SessionResult = Result<RecordingSession, CaptureError>;

/// Entry point: pairs a platform backend with an encoder and hands out
/// recording sessions.
///
/// Each engine admits one acquisition at a time. Separate engines acquire
/// independently.
pub struct CaptureEngine {
    devices: Arc<dyn MediaDevices>,
    encoder: Arc<dyn MediaEncoder>,
    options: EngineOptions,
    acquiring: Arc<AtomicBool>,
}

impl CaptureEngine {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        encoder: Arc<dyn MediaEncoder>,
        options: EngineOptions,
    ) -> Result<Self, CaptureError> {
        options.validate()?;
        Ok(Self {
            devices,
            encoder,
            options,
            acquiring: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn is_acquiring(&self) -> bool {
        self.acquiring.load(Ordering::SeqCst)
    }

    /// Acquire sources on the calling thread and return a `Ready` session.
    ///
    /// Blocks for as long as the platform takes to grant access. Fails with
    /// `InvalidStateTransition` while another acquisition on this engine is
    /// pending.
    pub fn create_session(
        &self,
        config: CaptureConfig,
        handlers: Arc<dyn SessionEvents>,
    ) -> Result<RecordingSession, CaptureError> {
        let _guard = AcquireGuard::take(&self.acquiring)?;
        RecordingSession::acquire(
            config,
            self.options.clone(),
            self.devices.as_ref(),
            Arc::clone(&self.encoder),
            handlers,
        )
    }

    /// Acquire sources on a background thread.
    ///
    /// Handlers receive nothing until the session is claimed through the
    /// returned [`PendingSession`]. Dropping it cancels the request: a
    /// session that completes afterwards is discarded and its tracks
    /// released without any event reaching the handlers.
    pub fn request_session(
        &self,
        config: CaptureConfig,
        handlers: Arc<dyn SessionEvents>,
    ) -> Result<PendingSession, CaptureError> {
        let guard = AcquireGuard::take(&self.acquiring)?;
        let (tx, rx) = crossbeam_channel::bounded(1);
        let devices = Arc::clone(&self.devices);
        let encoder = Arc::clone(&self.encoder);
        let options = self.options.clone();

        thread::Builder::new()
            .name("session-acquire".into())
            .spawn(move || {
                let result = RecordingSession::acquire_undelivered(
                    config,
                    options,
                    devices.as_ref(),
                    encoder,
                    handlers,
                );
                drop(guard);
                if let Err(unclaimed) = tx.send(result) {
                    if unclaimed.0.is_ok() {
                        log::info!("Pending session was abandoned, releasing its tracks");
                    }
                }
            })
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn acquisition thread: {}", e)))?;

        Ok(PendingSession { result: rx })
    }
}

/// A session whose sources are still being acquired.
pub struct PendingSession {
    result: Receiver<SessionResult>,
}

impl PendingSession {
    /// Block until acquisition finishes.
    pub fn wait(self) -> SessionResult {
        self.result.recv().unwrap_or_else(|_| Err(worker_lost())).and_then(claim)
    }

    /// `None` if acquisition is still pending after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<SessionResult> {
        match self.result.recv_timeout(timeout) {
            Ok(result) => Some(result.and_then(claim)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(worker_lost())),
        }
    }

    pub fn try_take(&self) -> Option<SessionResult> {
        match self.result.try_recv() {
            Ok(result) => Some(result.and_then(claim)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(worker_lost())),
        }
    }
}

/// Hand a finished session to its caller and start delivering its events.
fn claim(session: RecordingSession) -> SessionResult {
    session.begin_dispatch()?;
    Ok(session)
}

fn worker_lost() -> CaptureError {
    CaptureError::Unknown("acquisition thread exited without a result".into())
}

/// Marks an engine as acquiring until dropped.
struct AcquireGuard {
    flag: Arc<AtomicBool>,
}

impl AcquireGuard {
    fn take(flag: &Arc<AtomicBool>) -> Result<Self, CaptureError> {
        if flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!("Ignoring session request: an acquisition is already pending");
            return Err(CaptureError::invalid_transition("acquire", SessionState::Acquiring));
        }
        Ok(Self {
            flag: Arc::clone(flag),
        })
    }
}

impl Drop for AcquireGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
