// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Label printing.
//
// A print job renders every tag (template + merge fields) before sending
// anything, so bad label data never leaves half a family's labels printed.
// Delivery goes to the configured Bluetooth printer when one is set, and
// otherwise to each tag's network printer over raw TCP.  Only one job runs
// at a time; later jobs wait their turn.
//
// Capabilities:
//   PrintLabels(tagJson)      -> null, or { Error, CanReprint }
//   SetPrinterName(name|null) -> null
//   GetPrinterName()          -> name or null

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use kiosk_bridge::{CapabilityRegistry, NativeLabelPrinter, ResolutionSink, async_handler};
use kiosk_core::error::{KioskError, Result};
use kiosk_core::{Arguments, PrinterConfig, json_kind};

use crate::label_source::LabelSource;
use crate::labels::{LabelTag, merge_fields, parse_label_tags};
use crate::raw_client::{printer_socket_addr, send_raw};

pub const PRINT_LABELS: &str = "PrintLabels";
pub const SET_PRINTER_NAME: &str = "SetPrinterName";
pub const GET_PRINTER_NAME: &str = "GetPrinterName";

/// Renders and sends check-in labels.
pub struct LabelPrinterService {
    config: PrinterConfig,
    source: Arc<dyn LabelSource>,
    bluetooth: Arc<dyn NativeLabelPrinter>,
    /// Bluetooth printer in use; `None` means print over the network.
    printer_name: Mutex<Option<String>>,
    /// Downloaded templates by label key.
    templates: Mutex<HashMap<String, String>>,
    /// Held for the duration of a print job.
    job_lock: tokio::sync::Mutex<()>,
}

impl LabelPrinterService {
    pub fn new(
        config: PrinterConfig,
        source: Arc<dyn LabelSource>,
        bluetooth: Arc<dyn NativeLabelPrinter>,
    ) -> Self {
        let printer_name = config.bluetooth_printer.clone().filter(|n| !n.is_empty());
        Self {
            config,
            source,
            bluetooth,
            printer_name: Mutex::new(printer_name),
            templates: Mutex::new(HashMap::new()),
            job_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn printer_name(&self) -> Option<String> {
        self.printer_name
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Select a Bluetooth printer, or go back to network printing with `None`.
    pub fn set_printer_name(&self, name: Option<String>) {
        let name = name.filter(|n| !n.trim().is_empty());
        info!(printer = ?name, "label printer selected");
        *self.printer_name.lock().unwrap_or_else(PoisonError::into_inner) = name;
    }

    /// Print `tags` as one job.
    #[instrument(skip_all, fields(job_id = %Uuid::new_v4(), labels = tags.len()))]
    pub async fn print_tags(&self, tags: &[LabelTag]) -> Result<()> {
        let _job = self.job_lock.lock().await;

        let mut rendered = Vec::with_capacity(tags.len());
        for tag in tags {
            let template = self.template(tag).await?;
            rendered.push((tag, merge_fields(&template, &tag.merge_fields)));
        }

        for (tag, zpl) in &rendered {
            self.deliver(tag, zpl).await?;
        }

        info!("labels printed");
        Ok(())
    }

    async fn template(&self, tag: &LabelTag) -> Result<String> {
        if let Some(content) = &tag.label_content {
            return Ok(content.clone());
        }
        let url = tag
            .label_file
            .as_deref()
            .ok_or_else(|| KioskError::LabelFormat("label has no template".into()))?;
        let key = tag.cache_key().unwrap_or(url);

        let cached = self
            .templates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();
        if let Some(template) = cached {
            return Ok(template);
        }

        let template = self.source.fetch(url).await?;
        self.templates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), template.clone());
        Ok(template)
    }

    async fn deliver(&self, tag: &LabelTag, zpl: &str) -> Result<()> {
        if let Some(name) = self.printer_name() {
            let bluetooth = Arc::clone(&self.bluetooth);
            let zpl = zpl.to_string();
            return tokio::task::spawn_blocking(move || bluetooth.print_label(&name, &zpl))
                .await
                .map_err(|e| KioskError::PrinterConnection(format!("print task: {e}")))?
                .map_err(|e| match e {
                    KioskError::PrinterConnection(_) => e,
                    other => KioskError::PrinterConnection(other.to_string()),
                });
        }

        let address = tag.printer_address.as_deref().ok_or(KioskError::NoPrinter)?;
        let addr = printer_socket_addr(address, self.config.default_port)?;
        send_raw(&addr, zpl.as_bytes(), self.config.connect_timeout()).await
    }
}

/// Register `PrintLabels`, `SetPrinterName`, and `GetPrinterName`.
pub fn register(
    registry: &mut CapabilityRegistry,
    service: Arc<LabelPrinterService>,
) -> Result<()> {
    let printer = Arc::clone(&service);
    registry.register(
        PRINT_LABELS,
        async_handler(move |args: Arguments| {
            let printer = Arc::clone(&printer);
            async move {
                let data = args
                    .get(0)
                    .ok_or_else(|| KioskError::LabelFormat("missing label data".into()))?;
                let tags = parse_label_tags(data)?;
                if let Err(e) = printer.print_tags(&tags).await {
                    warn!(error = %e, "label print failed");
                    return Err(e);
                }
                Ok(None)
            }
        }),
    )?;

    let printer = Arc::clone(&service);
    registry.register(SET_PRINTER_NAME, move |args: Arguments, sink: ResolutionSink| {
        match args.get(0) {
            None => {
                printer.set_printer_name(None);
                sink.succeed(None);
            }
            Some(Value::String(name)) => {
                printer.set_printer_name(Some(name.clone()));
                sink.succeed(None);
            }
            Some(other) => sink.fail(&KioskError::InvalidArgument(format!(
                "printer name must be a string, got {}",
                json_kind(other)
            ))),
        }
    })?;

    registry.register(GET_PRINTER_NAME, move |_args: Arguments, sink: ResolutionSink| {
        sink.succeed(service.printer_name().map(Value::String));
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kiosk_bridge::{Outbound, OutboundMessage, OutboundPump, Transport, outbound_channel};
    use kiosk_core::{Command, Outcome};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Template source that counts downloads.
    #[derive(Default)]
    struct CountingSource {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl LabelSource for CountingSource {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if url.contains("missing") {
                return Err(KioskError::LabelFetch(format!("{url}: 404")));
            }
            Ok("^XA^FD1^FS^XZ".into())
        }
    }

    /// Bluetooth printer that records what it was sent.
    #[derive(Default)]
    struct RecordingPrinter {
        printed: Mutex<Vec<(String, String)>>,
    }

    impl NativeLabelPrinter for RecordingPrinter {
        fn print_label(&self, printer_name: &str, zpl: &str) -> Result<()> {
            self.printed
                .lock()
                .expect("printed lock")
                .push((printer_name.to_string(), zpl.to_string()));
            Ok(())
        }
    }

    fn service(
        source: Arc<CountingSource>,
        bluetooth: Arc<RecordingPrinter>,
        bluetooth_printer: Option<&str>,
    ) -> Arc<LabelPrinterService> {
        let config = PrinterConfig {
            bluetooth_printer: bluetooth_printer.map(str::to_string),
            connect_timeout_secs: 2,
            ..Default::default()
        };
        Arc::new(LabelPrinterService::new(config, source, bluetooth))
    }

    fn bridge(service: Arc<LabelPrinterService>) -> (Transport, OutboundPump) {
        let mut registry = CapabilityRegistry::new();
        register(&mut registry, service).expect("register");
        let (tx, pump) = outbound_channel();
        (Transport::new(registry, tx), pump)
    }

    async fn call(
        transport: &Transport,
        pump: &mut OutboundPump,
        name: &str,
        args: Vec<Value>,
    ) -> OutboundMessage {
        transport.dispatch(Command::new("job", name, args));
        match pump.recv().await {
            Some(Outbound::Resolution(msg)) => msg,
            other => panic!("expected a resolution, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_label_data_is_rejected_with_reason() {
        let svc = service(Arc::default(), Arc::default(), None);
        let (transport, mut pump) = bridge(svc);

        transport.receive(r#"{"promiseId":"p9","name":"PrintLabels","data":["{not json"]}"#);
        let Some(Outbound::Resolution(msg)) = pump.recv().await else {
            panic!("expected a resolution");
        };

        assert_eq!(msg.correlation_id, "p9");
        assert_eq!(msg.outcome, Outcome::Error);
        let payload = msg.payload.expect("payload");
        assert_eq!(payload["CanReprint"], json!(false));
        let message = payload["Error"].as_str().expect("message");
        assert!(message.starts_with("The label data could not be read."), "{payload}");
    }

    #[tokio::test]
    async fn prints_merged_label_over_network() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let printer = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut received = String::new();
            socket.read_to_string(&mut received).await.expect("read");
            received
        });

        let (transport, mut pump) = bridge(service(Arc::default(), Arc::default(), None));
        let tags = json!([{
            "PrinterAddress": addr,
            "LabelContent": "^XA^FD1^FS^FD2^FS^XZ",
            "MergeFields": { "1": "Noah^Decker", "2": "Room 12" }
        }]);

        let msg = call(&transport, &mut pump, PRINT_LABELS, vec![json!(tags.to_string())]).await;
        assert_eq!(msg.outcome, Outcome::Success);
        assert_eq!(msg.payload, None);
        assert_eq!(printer.await.expect("join"), "^XA^FDNoahDecker^FS^FDRoom 12^FS^XZ");
    }

    #[tokio::test]
    async fn bluetooth_printer_takes_precedence_and_templates_are_cached() {
        let source = Arc::new(CountingSource::default());
        let bluetooth = Arc::new(RecordingPrinter::default());
        let svc = service(Arc::clone(&source), Arc::clone(&bluetooth), Some("ZQ520-01"));
        let (transport, mut pump) = bridge(Arc::clone(&svc));

        let tag = json!({
            "PrinterAddress": "10.255.255.1",
            "LabelFile": "https://rock.example.org/GetFile.ashx?guid=1",
            "LabelKey": "child",
            "MergeFields": { "1": "Ava" }
        });
        let msg = call(&transport, &mut pump, PRINT_LABELS, vec![json!([tag.clone(), tag])]).await;

        assert_eq!(msg.outcome, Outcome::Success);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        let printed = bluetooth.printed.lock().expect("printed lock");
        assert_eq!(printed.len(), 2);
        assert_eq!(printed[0], ("ZQ520-01".to_string(), "^XA^FDAva^FS^XZ".to_string()));
    }

    #[tokio::test]
    async fn unreachable_printer_can_reprint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        drop(listener);

        let (transport, mut pump) = bridge(service(Arc::default(), Arc::default(), None));
        let tags = json!([{ "PrinterAddress": addr, "LabelContent": "^XA^XZ" }]);

        let msg = call(&transport, &mut pump, PRINT_LABELS, vec![tags]).await;
        assert_eq!(msg.outcome, Outcome::Error);
        assert_eq!(msg.payload.expect("payload")["CanReprint"], json!(true));
    }

    #[tokio::test]
    async fn failed_download_prints_nothing() {
        let source = Arc::new(CountingSource::default());
        let bluetooth = Arc::new(RecordingPrinter::default());
        let svc = service(source, Arc::clone(&bluetooth), Some("ZQ520-01"));
        let (transport, mut pump) = bridge(svc);

        let tags = json!([
            { "LabelContent": "^XA^XZ" },
            { "LabelFile": "https://rock.example.org/missing" }
        ]);
        let msg = call(&transport, &mut pump, PRINT_LABELS, vec![tags]).await;

        assert_eq!(msg.outcome, Outcome::Error);
        assert!(bluetooth.printed.lock().expect("printed lock").is_empty());
    }

    #[tokio::test]
    async fn network_label_without_address_needs_a_printer() {
        let (transport, mut pump) = bridge(service(Arc::default(), Arc::default(), None));

        let args = vec![json!([{ "LabelContent": "^XA^XZ" }])];
        let msg = call(&transport, &mut pump, PRINT_LABELS, args).await;
        assert_eq!(
            msg.payload,
            Some(json!({
                "Error": "No label printer is set up for this kiosk.",
                "CanReprint": false,
            }))
        );
    }

    #[tokio::test]
    async fn printer_name_round_trip() {
        let svc = service(Arc::default(), Arc::default(), None);
        let (transport, mut pump) = bridge(Arc::clone(&svc));

        let msg = call(&transport, &mut pump, GET_PRINTER_NAME, vec![]).await;
        assert_eq!(msg.payload, None);

        call(&transport, &mut pump, SET_PRINTER_NAME, vec![json!("ZQ520-01")]).await;
        let msg = call(&transport, &mut pump, GET_PRINTER_NAME, vec![]).await;
        assert_eq!(msg.payload, Some(json!("ZQ520-01")));

        call(&transport, &mut pump, SET_PRINTER_NAME, vec![Value::Null]).await;
        assert!(svc.printer_name().is_none());

        let msg = call(&transport, &mut pump, SET_PRINTER_NAME, vec![json!(5)]).await;
        assert_eq!(msg.outcome, Outcome::Error);
    }
}
