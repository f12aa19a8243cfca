// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bridge transport: the single entry and exit point for bridge traffic of
// one web view.
//
// Inbound messages are decoded and dispatched one at a time on the caller's
// thread.  Resolutions (and web events) are queued on an unbounded channel
// and drained by the `OutboundPump`, which turns each into a script and
// evaluates it in the web view.  Handlers resolve from wherever they run;
// the channel is the only thing they share with the page.
//
// The transport keeps no record of outstanding correlation ids.  That
// bookkeeping belongs to the page, which must tolerate late or duplicate
// resolutions.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, instrument, warn};

use kiosk_core::{Command, KioskConfig, Resolution};

use crate::message::{Outbound, OutboundMessage, WebEvent, decode_inbound};
use crate::registry::CapabilityRegistry;
use crate::sink::ResolutionSink;
use crate::traits::WebView;

/// Create the outbound queue shared by a transport and its handlers.
pub fn outbound_channel() -> (OutboundSender, OutboundPump) {
    let (tx, rx) = mpsc::unbounded_channel();
    (OutboundSender { tx }, OutboundPump { rx })
}

/// Sending half of the outbound queue.
#[derive(Debug, Clone)]
pub struct OutboundSender {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl OutboundSender {
    /// Queue `outbound` for the page. Returns `false` if the pump is gone.
    pub(crate) fn send(&self, outbound: Outbound) -> bool {
        self.tx.send(outbound).is_ok()
    }

    pub(crate) fn downgrade(&self) -> WeakOutboundSender {
        WeakOutboundSender {
            tx: self.tx.downgrade(),
        }
    }

    /// Handle for pushing unsolicited events to the page.
    pub fn events(&self) -> EventEmitter {
        EventEmitter {
            outbound: self.clone(),
        }
    }
}

/// Sender that does not keep the queue open by itself.
pub(crate) struct WeakOutboundSender {
    tx: mpsc::WeakUnboundedSender<Outbound>,
}

impl WeakOutboundSender {
    pub(crate) fn upgrade(&self) -> Option<OutboundSender> {
        self.tx.upgrade().map(|tx| OutboundSender { tx })
    }
}

/// Pushes named events into the page outside any command.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    outbound: OutboundSender,
}

impl EventEmitter {
    /// Queue `event` for the page. Returns `false` if the pump is gone.
    pub fn emit(&self, event: &str, payload: Option<Value>) -> bool {
        debug!(event, "queueing web event");
        self.outbound
            .send(Outbound::Event(WebEvent::new(event, payload)))
    }
}

/// Receiving half of the outbound queue.
#[derive(Debug)]
pub struct OutboundPump {
    rx: mpsc::UnboundedReceiver<Outbound>,
}

impl OutboundPump {
    /// Next queued item, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.rx.recv().await
    }

    /// Next queued item without waiting.
    pub fn try_recv(&mut self) -> Option<Outbound> {
        self.rx.try_recv().ok()
    }

    /// Evaluate one item in the web view.
    pub fn deliver(web_view: &dyn WebView, namespace: &str, outbound: &Outbound) {
        let script = match outbound.to_script(namespace) {
            Ok(script) => script,
            Err(e) => {
                error!(error = %e, "could not render outbound script");
                return;
            }
        };
        if let Err(e) = web_view.evaluate_script(&script) {
            warn!(error = %e, "web view rejected outbound script");
        }
    }

    /// Deliver everything currently queued. Returns how many were delivered.
    pub fn flush(&mut self, web_view: &dyn WebView, namespace: &str) -> usize {
        let mut delivered = 0;
        while let Some(outbound) = self.try_recv() {
            Self::deliver(web_view, namespace, &outbound);
            delivered += 1;
        }
        delivered
    }

    /// Deliver items until every sender (transport, sinks, emitters) is gone.
    pub async fn run(mut self, web_view: Arc<dyn WebView>, namespace: String) {
        while let Some(outbound) = self.recv().await {
            Self::deliver(web_view.as_ref(), &namespace, &outbound);
        }
        debug!("outbound pump finished");
    }
}

/// Bridge transport for one web view.
pub struct Transport {
    registry: Arc<CapabilityRegistry>,
    outbound: OutboundSender,
    handler_timeout: Option<Duration>,
}

impl Transport {
    /// Freeze `registry` and attach it to an outbound queue.
    pub fn new(registry: CapabilityRegistry, outbound: OutboundSender) -> Self {
        Self {
            registry: Arc::new(registry),
            outbound,
            handler_timeout: None,
        }
    }

    /// Transport using the watchdog setting from `config`.
    pub fn from_config(
        registry: CapabilityRegistry,
        outbound: OutboundSender,
        config: &KioskConfig,
    ) -> Self {
        Self::new(registry, outbound).with_handler_timeout(config.handler_timeout())
    }

    /// Reject commands still pending after `timeout`.
    pub fn with_handler_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn events(&self) -> EventEmitter {
        self.outbound.events()
    }

    /// Decode and dispatch one inbound message.
    ///
    /// Never fails: a malformed message is rejected back to its correlation
    /// id, or dropped with a warning when no id can be recovered.
    #[instrument(skip_all, fields(len = raw.len()))]
    pub fn receive(&self, raw: &str) {
        match decode_inbound(raw) {
            Ok(command) => self.dispatch(command),
            Err(err) => match err.correlation_id {
                Some(correlation_id) => {
                    warn!(%correlation_id, error = %err.error, "rejecting malformed message");
                    let message =
                        OutboundMessage::new(correlation_id, Resolution::from_error(&err.error));
                    if !self.outbound.send(Outbound::Resolution(message)) {
                        warn!("outbound pump closed; rejection discarded");
                    }
                }
                None => {
                    warn!(error = %err.error, "dropping message with no correlation id");
                }
            },
        }
    }

    /// Dispatch an already-decoded command.
    pub fn dispatch(&self, command: Command) {
        let sink = ResolutionSink::new(
            command.correlation_id(),
            command.capability(),
            self.outbound.clone(),
        );
        if let Some(timeout) = self.handler_timeout {
            sink.arm_watchdog(timeout);
        }
        self.registry.dispatch(command, sink);
    }
}
