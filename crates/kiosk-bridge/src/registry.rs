// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Capability registry and dispatcher.
//
// Capability names map to handler objects behind one invocable trait, so a
// camera controller, a label printer, and a preference store share the same
// dispatch path.  The registry is filled once during setup and is read-only
// afterwards, which lets concurrently pending commands share it freely.

use std::collections::HashMap;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use kiosk_core::error::{KioskError, Result};
use kiosk_core::{Arguments, Command};

use crate::sink::ResolutionSink;

/// Native implementation of one capability.
///
/// `invoke` must not block: a handler that needs to wait (camera, printer,
/// network) takes the sink with it onto a task and resolves from there.
/// Every internal failure must come back as an error resolution.
pub trait CapabilityHandler: Send + Sync {
    fn invoke(&self, arguments: Arguments, sink: ResolutionSink);
}

impl<F> CapabilityHandler for F
where
    F: Fn(Arguments, ResolutionSink) + Send + Sync,
{
    fn invoke(&self, arguments: Arguments, sink: ResolutionSink) {
        self(arguments, sink)
    }
}

/// Handler built from an async function; see [`async_handler`].
pub struct AsyncCapability<F> {
    f: F,
}

/// Wrap an async function as a capability handler.
///
/// The future runs on the ambient Tokio runtime and its result resolves the
/// command: `Ok(payload)` as success, `Err(e)` as the display payload for `e`.
pub fn async_handler<F, Fut>(f: F) -> AsyncCapability<F>
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>>> + Send + 'static,
{
    AsyncCapability { f }
}

impl<F, Fut> CapabilityHandler for AsyncCapability<F>
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>>> + Send + 'static,
{
    fn invoke(&self, arguments: Arguments, sink: ResolutionSink) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            sink.fail(&KioskError::Handler("no async runtime available".into()));
            return;
        };
        let fut = (self.f)(arguments);
        runtime.spawn(async move {
            sink.complete(fut.await);
        });
    }
}

/// Name -> handler table.
#[derive(Default)]
pub struct CapabilityRegistry {
    handlers: HashMap<String, Arc<dyn CapabilityHandler>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `handler`.
    ///
    /// Binding a name twice is a setup mistake and fails.
    pub fn register<H>(&mut self, name: impl Into<String>, handler: H) -> Result<()>
    where
        H: CapabilityHandler + 'static,
    {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(KioskError::DuplicateCapability(name));
        }
        debug!(capability = %name, "capability registered");
        self.handlers.insert(name, Arc::new(handler));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered capability names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Hand `command` to its handler.
    ///
    /// Unknown capabilities are rejected through `sink` right away.  The
    /// dispatcher never waits for, times out, or retries a handler.  A handler
    /// that panics takes its sink down with it, which rejects the command.
    pub fn dispatch(&self, command: Command, sink: ResolutionSink) {
        let (correlation_id, capability, arguments) = command.into_parts();

        let Some(handler) = self.handlers.get(&capability) else {
            warn!(%correlation_id, %capability, "unknown capability");
            sink.fail(&KioskError::UnknownCapability(capability));
            return;
        };

        info!(%correlation_id, %capability, args = arguments.len(), "dispatching command");
        let outcome = catch_unwind(AssertUnwindSafe(|| handler.invoke(arguments, sink)));
        if outcome.is_err() {
            error!(%correlation_id, %capability, "capability handler panicked");
        }
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Outbound, OutboundMessage};
    use crate::transport::{OutboundPump, outbound_channel};
    use kiosk_core::Outcome;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn echo(arguments: Arguments, sink: ResolutionSink) {
        sink.succeed(arguments.get(0).cloned());
    }

    fn boom(_arguments: Arguments, _sink: ResolutionSink) {
        panic!("hardware exploded");
    }

    fn dispatch(registry: &CapabilityRegistry, command: Command) -> OutboundMessage {
        let (tx, mut pump): (_, OutboundPump) = outbound_channel();
        let sink = ResolutionSink::new(command.correlation_id(), command.capability(), tx);
        registry.dispatch(command, sink);
        match pump.try_recv() {
            Some(Outbound::Resolution(msg)) => msg,
            other => panic!("expected a resolution, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = CapabilityRegistry::new();
        registry.register("echo", echo).expect("first");
        let err = registry.register("echo", echo).expect_err("second");
        assert!(matches!(err, KioskError::DuplicateCapability(name) if name == "echo"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_capability_is_rejected_not_raised() {
        let registry = CapabilityRegistry::new();
        let msg = dispatch(&registry, Command::new("2", "doesNotExist", vec![]));
        assert_eq!(
            msg,
            OutboundMessage {
                correlation_id: "2".into(),
                outcome: Outcome::Error,
                payload: Some(json!("unknown capability: doesNotExist")),
            }
        );
    }

    #[test]
    fn dispatches_by_name() {
        let mut registry = CapabilityRegistry::new();
        registry.register("echo", echo).expect("register");
        registry
            .register("nothing", |_args: Arguments, sink: ResolutionSink| sink.succeed(None))
            .expect("register");

        let msg = dispatch(&registry, Command::new("e", "echo", vec![json!({ "a": [1, 2] })]));
        assert_eq!(msg.outcome, Outcome::Success);
        assert_eq!(msg.payload, Some(json!({ "a": [1, 2] })));
        assert_eq!(registry.names(), vec!["echo", "nothing"]);
    }

    #[test]
    fn panicking_handler_rejects_instead_of_crashing() {
        let mut registry = CapabilityRegistry::new();
        registry.register("boom", boom).expect("register");

        let msg = dispatch(&registry, Command::new("b", "boom", vec![]));
        assert_eq!(msg.correlation_id, "b");
        assert_eq!(msg.outcome, Outcome::Error);
    }

    #[tokio::test]
    async fn async_handler_resolves_from_task() {
        let mut registry = CapabilityRegistry::new();
        registry
            .register(
                "double",
                async_handler(|args: Arguments| async move {
                    let n = args
                        .get(0)
                        .and_then(Value::as_i64)
                        .ok_or_else(|| KioskError::InvalidArgument("need a number".into()))?;
                    Ok::<_, KioskError>(Some(json!(n * 2)))
                }),
            )
            .expect("register");

        let (tx, mut pump) = outbound_channel();
        let ok = Command::new("d1", "double", vec![json!(21)]);
        let bad = Command::new("d2", "double", vec![json!("x")]);
        registry.dispatch(ok, ResolutionSink::new("d1", "double", tx.clone()));
        registry.dispatch(bad, ResolutionSink::new("d2", "double", tx));

        let mut seen = Vec::new();
        while let Some(Outbound::Resolution(msg)) = pump.recv().await {
            seen.push(msg);
        }
        seen.sort_by(|a, b| a.correlation_id.cmp(&b.correlation_id));
        assert_eq!(seen[0].payload, Some(json!(42)));
        assert_eq!(seen[1].outcome, Outcome::Error);
        assert_eq!(seen[1].payload, Some(json!("invalid argument: need a number")));
    }
}
