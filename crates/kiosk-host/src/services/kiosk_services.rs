// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer.  Loads the kiosk configuration, opens the
// preference database, and wires the capability services to the platform's
// native scanner and label printer.
//
// The preference store wraps a rusqlite connection (`Send` but not `Sync`)
// behind its own mutex, so every service here is shared as a plain `Arc`.

use std::path::Path;
use std::sync::Arc;

use kiosk_bridge::{CapabilityRegistry, EventEmitter, platform_bridge};
use kiosk_capabilities::{
    Capabilities, CameraService, HttpLabelSource, HttpPreCheckIn, LabelPrinterService,
    PreferenceStore,
};
use kiosk_core::KioskConfig;
use kiosk_core::error::Result;
use tracing::{info, warn};

const CONFIG_FILE: &str = "config.json";
const PREFERENCES_FILE: &str = "preferences.db";

/// Everything the bridge needs to serve one web view.
#[derive(Clone)]
pub struct KioskServices {
    pub config: KioskConfig,
    pub platform_name: String,
    pub capabilities: Capabilities,
}

impl KioskServices {
    /// Initialise all services from `data_dir`.  Call once at startup.
    ///
    /// A missing config file is created with defaults so it can be edited.
    pub fn init(data_dir: &Path, events: EventEmitter) -> Result<Self> {
        info!(path = %data_dir.display(), "initialising kiosk services");

        let config = match load_config(data_dir) {
            Some(config) => config,
            None => {
                let config = KioskConfig::default();
                if let Err(e) = persist_config(data_dir, &config) {
                    warn!(error = %e, "could not write default config");
                }
                config
            }
        };

        let db_path = config
            .preferences_db
            .clone()
            .unwrap_or_else(|| data_dir.join(PREFERENCES_FILE));
        let preferences = PreferenceStore::open(&db_path)?;

        Self::build(config, preferences, events)
    }

    /// Services with default config and in-memory preferences, for when
    /// the data directory is unusable.
    pub fn fallback(events: EventEmitter) -> Result<Self> {
        Self::build(KioskConfig::default(), PreferenceStore::open_in_memory()?, events)
    }

    fn build(
        config: KioskConfig,
        preferences: PreferenceStore,
        events: EventEmitter,
    ) -> Result<Self> {
        let platform = platform_bridge();
        let timeout = config.printer.connect_timeout();
        let preferences = preferences.with_defaults(config.preference_defaults.clone());

        let printer = Arc::new(LabelPrinterService::new(
            config.printer.clone(),
            Arc::new(HttpLabelSource::new(timeout)?),
            platform.label_printer,
        ));

        let mut camera = CameraService::new(platform.scanner, events, Arc::clone(&printer));
        match &config.pre_check_in_url {
            Some(url) => {
                camera = camera.with_pre_check_in(Arc::new(HttpPreCheckIn::new(url, timeout)?));
            }
            None => warn!("no pre_check_in_url configured; pre-check-in codes will be refused"),
        }

        info!(platform = %platform.name, "kiosk services initialised");
        Ok(Self {
            config,
            platform_name: platform.name,
            capabilities: Capabilities {
                preferences: Arc::new(preferences),
                printer,
                camera: Arc::new(camera),
            },
        })
    }

    /// Registry with every capability bound.
    pub fn registry(&self) -> Result<CapabilityRegistry> {
        let mut registry = CapabilityRegistry::new();
        self.capabilities.register_all(&mut registry)?;
        info!(capabilities = ?registry.names(), "capabilities registered");
        Ok(registry)
    }

    /// Release hardware held by the services.
    pub fn shutdown(&self) {
        if self.capabilities.camera.stop() {
            info!("camera closed on shutdown");
        }
    }
}

fn load_config(data_dir: &Path) -> Option<KioskConfig> {
    let path = data_dir.join(CONFIG_FILE);
    let data = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&data) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable config");
            None
        }
    }
}

fn persist_config(data_dir: &Path, config: &KioskConfig) -> Result<()> {
    let path = data_dir.join(CONFIG_FILE);
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_bridge::outbound_channel;

    #[test]
    fn first_start_writes_default_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (tx, _pump) = outbound_channel();

        let services = KioskServices::init(dir.path(), tx.events()).expect("init");

        assert!(dir.path().join(CONFIG_FILE).exists());
        assert!(dir.path().join(PREFERENCES_FILE).exists());
        assert_eq!(services.config.script_namespace, "RockCheckinNative");
        assert_eq!(services.platform_name, "Desktop (stub)");
    }

    #[test]
    fn existing_config_is_used() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = r#"{
            "script_namespace": "Kiosk",
            "printer": { "bluetooth_printer": "ZQ520-01" },
            "preference_defaults": { "checkin.url": "https://rock.example.org" },
            "pre_check_in_url": "https://rock.example.org/api/checkin/labels"
        }"#;
        std::fs::write(dir.path().join(CONFIG_FILE), config).expect("write config");
        let (tx, _pump) = outbound_channel();

        let services = KioskServices::init(dir.path(), tx.events()).expect("init");
        let capabilities = &services.capabilities;

        assert_eq!(services.config.script_namespace, "Kiosk");
        assert_eq!(capabilities.printer.printer_name().as_deref(), Some("ZQ520-01"));
        assert_eq!(
            capabilities.preferences.get("checkin.url").expect("get").as_deref(),
            Some("https://rock.example.org")
        );
        assert!(capabilities.camera.handles_pre_check_in());
    }

    #[test]
    fn default_config_has_no_pre_check_in() {
        let (tx, _pump) = outbound_channel();
        let services = KioskServices::fallback(tx.events()).expect("fallback");
        assert!(!services.capabilities.camera.handles_pre_check_in());
    }

    #[test]
    fn registry_binds_every_capability() {
        let (tx, _pump) = outbound_channel();
        let services = KioskServices::fallback(tx.events()).expect("fallback");

        let registry = services.registry().expect("registry");
        assert_eq!(
            registry.names(),
            vec![
                "GetPrinterName",
                "PrintLabels",
                "SetPrinterName",
                "StartCamera",
                "StopCamera",
                "getSetting",
                "setSetting",
            ]
        );
    }
}
