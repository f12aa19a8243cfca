// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Barcode camera sessions.
//
// At most one camera session exists at a time.  A session is watched by a
// task that forwards what the camera sees to the page:
//
//   - normal mode: the first ordinary code resolves `StartCamera` and ends
//     the session; cancelling or stopping rejects it instead.
//   - passive mode: `StartCamera` resolves straight away and every ordinary
//     code becomes a `codeScanned` event until `StopCamera`.
//
// Pre-check-in codes bypass the page entirely.  Their labels are looked up
// and printed here, then a `preCheckInCompleted` event reports the result.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

use kiosk_bridge::{CapabilityRegistry, EventEmitter, NativeScanner, ResolutionSink, ScanEvent};
use kiosk_core::error::{KioskError, Result};
use kiosk_core::human_errors::error_payload;
use kiosk_core::Arguments;

use crate::labels::LabelTag;
use crate::printer::LabelPrinterService;

pub const START_CAMERA: &str = "StartCamera";
pub const STOP_CAMERA: &str = "StopCamera";

/// Event carrying a code seen in passive mode.
pub const CODE_SCANNED_EVENT: &str = "codeScanned";
/// Event sent after a pre-check-in code has been handled.
pub const PRE_CHECK_IN_COMPLETED_EVENT: &str = "preCheckInCompleted";

/// Looks up the labels for a pre-check-in code.
#[async_trait]
pub trait PreCheckIn: Send + Sync {
    async fn labels_for_code(&self, code: &str) -> Result<Vec<LabelTag>>;
}

struct CameraSession {
    id: u64,
    /// Dropped to tell the watch task the session was stopped.
    _stop: oneshot::Sender<()>,
}

/// How a session's watch loop ended.
enum Ending {
    Scanned(String),
    Cancelled,
    Stopped,
}

pub struct CameraService {
    scanner: Arc<dyn NativeScanner>,
    events: EventEmitter,
    printer: Arc<LabelPrinterService>,
    pre_check_in: Option<Arc<dyn PreCheckIn>>,
    session: Mutex<Option<CameraSession>>,
    next_session: AtomicU64,
}

impl CameraService {
    pub fn new(
        scanner: Arc<dyn NativeScanner>,
        events: EventEmitter,
        printer: Arc<LabelPrinterService>,
    ) -> Self {
        Self {
            scanner,
            events,
            printer,
            pre_check_in: None,
            session: Mutex::new(None),
            next_session: AtomicU64::new(1),
        }
    }

    /// Handle pre-check-in codes with `lookup`.
    pub fn with_pre_check_in(mut self, lookup: Arc<dyn PreCheckIn>) -> Self {
        self.pre_check_in = Some(lookup);
        self
    }

    /// Whether scanned pre-check-in codes can be looked up and printed.
    pub fn handles_pre_check_in(&self) -> bool {
        self.pre_check_in.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Open a camera session answering `sink`.
    pub fn start(self: &Arc<Self>, passive: bool, sink: ResolutionSink) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            sink.fail(&KioskError::Handler("no async runtime available".into()));
            return;
        };

        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if session.is_some() {
            debug!("camera start refused; session already open");
            sink.fail(&KioskError::CameraBusy);
            return;
        }

        let scans = match self.scanner.start_scanning(passive) {
            Ok(scans) => scans,
            Err(e) => {
                warn!(error = %e, "camera failed to start");
                sink.fail(&e);
                return;
            }
        };

        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let (stop_tx, stop_rx) = oneshot::channel();
        *session = Some(CameraSession { id, _stop: stop_tx });
        drop(session);
        info!(session = id, passive, "camera started");

        let pending = if passive {
            sink.succeed(None);
            None
        } else {
            Some(sink)
        };
        runtime.spawn(Arc::clone(self).watch(id, scans, stop_rx, pending));
    }

    /// Close the current session, if any. Returns whether one was open.
    pub fn stop(&self) -> bool {
        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(session) = session else {
            return false;
        };

        info!(session = session.id, "camera stopped");
        drop(session);
        if let Err(e) = self.scanner.stop_scanning() {
            warn!(error = %e, "camera did not stop cleanly");
        }
        true
    }

    async fn watch(
        self: Arc<Self>,
        id: u64,
        mut scans: mpsc::UnboundedReceiver<ScanEvent>,
        mut stop: oneshot::Receiver<()>,
        pending: Option<ResolutionSink>,
    ) {
        let ending = loop {
            tokio::select! {
                _ = &mut stop => break Ending::Stopped,
                scan = scans.recv() => match scan {
                    Some(ScanEvent::GenericCode(code)) if pending.is_some() => {
                        break Ending::Scanned(code);
                    }
                    Some(ScanEvent::GenericCode(code)) => {
                        debug!(session = id, "code scanned");
                        self.events.emit(CODE_SCANNED_EVENT, Some(Value::String(code)));
                    }
                    Some(ScanEvent::PreCheckInCode(code)) => {
                        tokio::spawn(Arc::clone(&self).process_pre_check_in(code));
                    }
                    Some(ScanEvent::Cancelled) | None => break Ending::Cancelled,
                },
            }
        };

        if !matches!(ending, Ending::Stopped) {
            self.end_session(id);
        }

        let Some(sink) = pending else {
            return;
        };
        match ending {
            Ending::Scanned(code) => sink.succeed(Some(Value::String(code))),
            Ending::Cancelled | Ending::Stopped => sink.fail(&KioskError::ScanCancelled),
        }
    }

    /// Close session `id` from the watch side.
    fn end_session(&self, id: u64) {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if session.as_ref().is_some_and(|s| s.id == id) {
            *session = None;
            drop(session);
            debug!(session = id, "camera session ended");
            if let Err(e) = self.scanner.stop_scanning() {
                warn!(error = %e, "camera did not stop cleanly");
            }
        }
    }

    #[instrument(skip(self))]
    async fn process_pre_check_in(self: Arc<Self>, code: String) {
        let result = match &self.pre_check_in {
            Some(lookup) => match lookup.labels_for_code(&code).await {
                Ok(tags) => self.printer.print_tags(&tags).await,
                Err(e) => Err(e),
            },
            None => Err(KioskError::Handler("pre-check-in is not configured".into())),
        };

        let mut payload = Map::new();
        payload.insert("code".into(), json!(code));
        if let Err(e) = &result {
            warn!(error = %e, "pre-check-in failed");
            payload.insert("error".into(), error_payload(e));
        }
        self.events
            .emit(PRE_CHECK_IN_COMPLETED_EVENT, Some(Value::Object(payload)));
    }
}

/// Register `StartCamera` and `StopCamera`.
pub fn register(registry: &mut CapabilityRegistry, service: Arc<CameraService>) -> Result<()> {
    let camera = Arc::clone(&service);
    registry.register(START_CAMERA, move |args: Arguments, sink: ResolutionSink| {
        match args.bool_or(0, false) {
            Ok(passive) => camera.start(passive, sink),
            Err(e) => sink.fail(&e),
        }
    })?;

    registry.register(STOP_CAMERA, move |_args: Arguments, sink: ResolutionSink| {
        service.stop();
        sink.succeed(None);
    })?;

    Ok(())
}
