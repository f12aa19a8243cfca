// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Single-use resolution tokens.
//
// Each dispatched command gets exactly one `ResolutionSink`.  Resolving
// consumes it, so a handler cannot resolve twice through the same token.
// A sink dropped unresolved rejects its command, and an optional watchdog
// rejects commands that stay pending too long; whichever of handler,
// drop, or watchdog claims the command first wins and the rest are ignored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, warn};

use kiosk_core::error::{KioskError, Result};
use kiosk_core::Resolution;

use crate::message::{Outbound, OutboundMessage};
use crate::transport::OutboundSender;

/// Accepts the one resolution of one command and forwards it to the
/// transport, addressed to the command's correlation id.
pub struct ResolutionSink {
    correlation_id: Arc<str>,
    capability: Arc<str>,
    outbound: OutboundSender,
    /// Set by whoever resolves the command first.
    claimed: Arc<AtomicBool>,
    /// This token has been used (so `Drop` has nothing to do).
    spent: bool,
}

impl ResolutionSink {
    pub(crate) fn new(correlation_id: &str, capability: &str, outbound: OutboundSender) -> Self {
        Self {
            correlation_id: Arc::from(correlation_id),
            capability: Arc::from(capability),
            outbound,
            claimed: Arc::new(AtomicBool::new(false)),
            spent: false,
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn capability(&self) -> &str {
        &self.capability
    }

    /// Resolve the command.
    pub fn resolve(mut self, resolution: Resolution) {
        self.deliver(resolution);
    }

    /// Resolve with `Success(payload)`.
    pub fn succeed(self, payload: Option<Value>) {
        self.resolve(Resolution::Success(payload));
    }

    /// Resolve with the display payload for `err`.
    pub fn fail(self, err: &KioskError) {
        self.resolve(Resolution::from_error(err));
    }

    /// Resolve from a handler result.
    pub fn complete(self, result: Result<Option<Value>>) {
        self.resolve(Resolution::from_result(result));
    }

    /// Convert into a cloneable handle for callback-style handlers.
    pub fn into_shared(self) -> SharedSink {
        SharedSink {
            correlation_id: Arc::clone(&self.correlation_id),
            inner: Arc::new(Mutex::new(Some(self))),
        }
    }

    /// Reject the command if it is still pending after `timeout`.
    pub(crate) fn arm_watchdog(&self, timeout: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                correlation_id = %self.correlation_id,
                "no async runtime; handler watchdog not armed"
            );
            return;
        };

        let claimed = Arc::clone(&self.claimed);
        let outbound = self.outbound.downgrade();
        let correlation_id = Arc::clone(&self.correlation_id);
        let capability = Arc::clone(&self.capability);

        runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if claimed.swap(true, Ordering::AcqRel) {
                return;
            }
            warn!(
                correlation_id = %correlation_id,
                capability = %capability,
                "handler did not resolve in time; rejecting"
            );
            let err = KioskError::Timeout {
                capability: capability.to_string(),
                seconds: timeout.as_secs(),
            };
            if let Some(outbound) = outbound.upgrade() {
                outbound.send(Outbound::Resolution(OutboundMessage::new(
                    correlation_id.as_ref(),
                    Resolution::from_error(&err),
                )));
            }
        });
    }

    fn deliver(&mut self, resolution: Resolution) -> bool {
        self.spent = true;

        if self.claimed.swap(true, Ordering::AcqRel) {
            debug!(
                correlation_id = %self.correlation_id,
                "command already rejected by the watchdog; late resolution ignored"
            );
            return false;
        }

        let outcome = resolution.outcome();
        let message = OutboundMessage::new(self.correlation_id.as_ref(), resolution);
        if !self.outbound.send(Outbound::Resolution(message)) {
            warn!(
                correlation_id = %self.correlation_id,
                "transport closed; resolution discarded"
            );
            return false;
        }

        debug!(
            correlation_id = %self.correlation_id,
            capability = %self.capability,
            ?outcome,
            "command resolved"
        );
        true
    }
}

impl Drop for ResolutionSink {
    fn drop(&mut self) {
        if self.spent {
            return;
        }
        warn!(
            correlation_id = %self.correlation_id,
            capability = %self.capability,
            "handler dropped its sink without resolving; rejecting"
        );
        let err = KioskError::Unresolved(self.capability.to_string());
        self.deliver(Resolution::from_error(&err));
    }
}

impl std::fmt::Debug for ResolutionSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionSink")
            .field("correlation_id", &self.correlation_id)
            .field("capability", &self.capability)
            .field("spent", &self.spent)
            .finish()
    }
}

/// Cloneable handle to a [`ResolutionSink`], for handlers whose resolution
/// can come from more than one callback.
///
/// Only the first `resolve` reaches the page.  A second one is a handler
/// bug: it is logged and ignored, and panics in debug builds so it shows up
/// in tests.
#[derive(Clone)]
pub struct SharedSink {
    correlation_id: Arc<str>,
    inner: Arc<Mutex<Option<ResolutionSink>>>,
}

impl SharedSink {
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Resolve the command. Returns `false` if it was already resolved.
    pub fn resolve(&self, resolution: Resolution) -> bool {
        let sink = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match sink {
            Some(sink) => {
                sink.resolve(resolution);
                true
            }
            None => {
                error!(
                    correlation_id = %self.correlation_id,
                    "command resolved more than once; extra resolution ignored"
                );
                if cfg!(debug_assertions) {
                    panic!("command {} resolved more than once", self.correlation_id);
                }
                false
            }
        }
    }

    pub fn succeed(&self, payload: Option<Value>) -> bool {
        self.resolve(Resolution::Success(payload))
    }

    pub fn fail(&self, err: &KioskError) -> bool {
        self.resolve(Resolution::from_error(err))
    }

    pub fn is_resolved(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{OutboundPump, outbound_channel};
    use kiosk_core::Outcome;
    use serde_json::json;

    fn sink(id: &str) -> (ResolutionSink, OutboundPump) {
        let (tx, pump) = outbound_channel();
        (ResolutionSink::new(id, "test", tx), pump)
    }

    fn resolution(pump: &mut OutboundPump) -> OutboundMessage {
        match pump.try_recv() {
            Some(Outbound::Resolution(msg)) => msg,
            other => panic!("expected a resolution, got {other:?}"),
        }
    }

    #[test]
    fn resolves_once_with_correlation_id() {
        let (sink, mut pump) = sink("42");
        sink.succeed(Some(json!({ "ok": true })));

        let msg = resolution(&mut pump);
        assert_eq!(msg.correlation_id, "42");
        assert_eq!(msg.outcome, Outcome::Success);
        assert_eq!(msg.payload, Some(json!({ "ok": true })));
        assert!(pump.try_recv().is_none());
    }

    #[test]
    fn dropped_sink_rejects_command() {
        let (sink, mut pump) = sink("7");
        drop(sink);

        let msg = resolution(&mut pump);
        assert_eq!(msg.correlation_id, "7");
        assert_eq!(msg.outcome, Outcome::Error);
        assert_eq!(msg.payload, Some(json!("handler for test finished without resolving")));
    }

    #[test]
    fn shared_sink_resolves_through_any_clone() {
        let (sink, mut pump) = sink("s");
        let shared = sink.into_shared();
        let other = shared.clone();

        assert!(!shared.is_resolved());
        assert!(other.fail(&KioskError::ScanCancelled));
        assert!(shared.is_resolved());

        let msg = resolution(&mut pump);
        assert_eq!(msg.payload, Some(json!("scan cancelled")));
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "resolved more than once"))]
    fn second_shared_resolution_is_a_defect() {
        let (sink, mut pump) = sink("twice");
        let shared = sink.into_shared();
        assert!(shared.succeed(None));
        // Release builds log and ignore.
        assert!(!shared.succeed(Some(json!("again"))));
        assert!(pump.try_recv().is_some());
        assert!(pump.try_recv().is_none());
    }

    #[test]
    fn unresolved_shared_sink_rejects_when_last_clone_drops() {
        let (sink, mut pump) = sink("s2");
        let shared = sink.into_shared();
        let clone = shared.clone();
        drop(shared);
        assert!(pump.try_recv().is_none());
        drop(clone);
        assert_eq!(resolution(&mut pump).outcome, Outcome::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_rejects_stalled_command_and_ignores_late_resolution() {
        let (sink, mut pump) = sink("slow");
        sink.arm_watchdog(Duration::from_secs(5));

        let Some(Outbound::Resolution(msg)) = pump.recv().await else {
            panic!("expected watchdog rejection");
        };
        assert_eq!(msg.correlation_id, "slow");
        assert_eq!(msg.payload, Some(json!("test did not resolve within 5s")));

        sink.succeed(None);
        assert!(pump.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_stands_down_after_resolution() {
        let (sink, mut pump) = sink("fast");
        sink.arm_watchdog(Duration::from_secs(5));
        sink.succeed(None);

        assert_eq!(resolution(&mut pump).outcome, Outcome::Success);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(pump.try_recv().is_none());
    }
}
