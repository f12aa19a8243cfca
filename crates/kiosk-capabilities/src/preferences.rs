// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application preferences backed by SQLite.
//
// The page stores small string settings (device PIN, kiosk id, check-in
// URL) that must survive restarts.  Values the page never wrote fall back to
// read-only defaults shipped with the app.
//
// Capabilities:
//   getSetting(key)          -> stored value, default, or null
//   setSetting(key, value)   -> null
// Both also accept the older single-object form `{ key, value }`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::{debug, info, instrument};

use kiosk_bridge::{CapabilityRegistry, ResolutionSink};
use kiosk_core::error::{KioskError, Result};
use kiosk_core::{Arguments, json_kind};

pub const GET_SETTING: &str = "getSetting";
pub const SET_SETTING: &str = "setSetting";

/// SQLite schema for the preferences table.
const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS preferences (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
"#;

fn db_err(context: &'static str) -> impl Fn(rusqlite::Error) -> KioskError {
    move |e| KioskError::Preferences(format!("{context}: {e}"))
}

/// Persistent key/value settings.
///
/// `rusqlite::Connection` is `Send` but not `Sync`, so it sits behind a
/// mutex; every operation is a single short query.
pub struct PreferenceStore {
    conn: Mutex<Connection>,
    defaults: HashMap<String, String>,
}

impl PreferenceStore {
    /// Open (or create) the preference database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err("open"))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db_err("WAL pragma"))?;
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(db_err("create table"))?;

        info!("preference database opened");
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("open in-memory"))?;
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(db_err("create table"))?;

        debug!("in-memory preference database opened");
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            defaults: HashMap::new(),
        }
    }

    /// Values returned for keys that were never stored.
    pub fn with_defaults(mut self, defaults: HashMap<String, String>) -> Self {
        self.defaults = defaults;
        self
    }

    /// Stored value for `key`, else its default, else `None`.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let stored = self
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(db_err("read setting"))?;

        Ok(stored.or_else(|| self.defaults.get(key).cloned()))
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .execute(
                "INSERT INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE
                 SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .map_err(db_err("write setting"))?;

        debug!(key, "setting stored");
        Ok(())
    }
}

/// Register `getSetting` and `setSetting`.
pub fn register(registry: &mut CapabilityRegistry, store: Arc<PreferenceStore>) -> Result<()> {
    let reader = Arc::clone(&store);
    registry.register(GET_SETTING, move |args: Arguments, sink: ResolutionSink| {
        let result = setting_key(&args)
            .and_then(|key| reader.get(&key))
            .map(|value| value.map(Value::String));
        sink.complete(result);
    })?;

    registry.register(SET_SETTING, move |args: Arguments, sink: ResolutionSink| {
        let result = setting_key(&args)
            .and_then(|key| Ok((key, setting_value(&args)?)))
            .and_then(|(key, value)| store.set(&key, &value))
            .map(|()| None);
        sink.complete(result);
    })?;

    Ok(())
}

/// Key from `[key, ...]` or `[{ key, ... }]`.
fn setting_key(args: &Arguments) -> Result<String> {
    let key = match args.get(0) {
        Some(Value::String(key)) => key.clone(),
        Some(Value::Object(fields)) => match fields.get("key") {
            Some(Value::String(key)) => key.clone(),
            _ => return Err(KioskError::InvalidArgument("setting object has no key".into())),
        },
        Some(other) => {
            return Err(KioskError::InvalidArgument(format!(
                "setting key must be a string, got {}",
                json_kind(other)
            )));
        }
        None => return Err(KioskError::InvalidArgument("missing setting key".into())),
    };

    if key.is_empty() {
        return Err(KioskError::InvalidArgument("empty setting key".into()));
    }
    Ok(key)
}

/// Value from `[key, value]` or `[{ key, value }]`, as stored text.
fn setting_value(args: &Arguments) -> Result<String> {
    let value = match args.get(0) {
        Some(Value::Object(fields)) => fields.get("value").filter(|v| !v.is_null()),
        _ => args.get(1),
    };

    match value {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(KioskError::InvalidArgument("missing setting value".into())),
    }
}
