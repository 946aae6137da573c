//! Session snapshots on disk.
//!
//! Layout under the session root:
//!
//! ```text
//! <root>/<card name>/<session>.mgs        snapshot documents
//! <root>/<card name>/current.alias        name of the current session
//! <root>/<card name>/last-applied.alias   name of the last loaded session
//! ```
//!
//! Snapshots are written to a temporary file and renamed into place, so a
//! reader never sees a half-written session. Nothing here locks: two
//! requests storing the same name race and the last rename wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::backend::ControlBackend;
use crate::codec::{ControlDoc, Tier};
use crate::element::Scalar;
use crate::enumerate::{card_info, collect_controls, DeviceDescriptor};
use crate::envelope::{TYPE_SESSION, TYPE_SESSION_INFO};
use crate::error::EngineError;
use crate::gateway::Gateway;
use crate::write::{apply_entry, EntryInput};

pub const SESSION_EXT: &str = "mgs";
/// Session name that refers to the current alias.
pub const DEFAULT_SESSION: &str = "current";
/// Bookkeeping record of the last applied session; not a valid session name.
pub const APPLIED_MARKER: &str = "last-applied";

const ALIAS_EXT: &str = "alias";
const ALIAS_TYPE: &str = "alias";
const PROBE_FILE: &str = ".mixgate-probe";

/// Snapshot document as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDoc {
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub sndcard: DeviceDescriptor,
    pub controls: Vec<ControlDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
}

/// Indirection record naming another session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub target: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// What a session load did.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    /// Session name after alias resolution.
    pub session: String,
    pub doc: SessionDoc,
    pub summary: LoadSummary,
}

fn fatal_io(what: &str, path: &Path, err: impl std::fmt::Display) -> EngineError {
    EngineError::Fatal(format!("{what} {}: {err}", path.display()))
}

/// Directory name for a card; path separators and leading dots are replaced.
fn dir_name(device_name: &str) -> String {
    let mut name: String = device_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() || name.starts_with('.') {
        name.insert(0, '_');
    }
    name
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), EngineError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, contents).map_err(|e| fatal_io("cannot write", &tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        fatal_io("cannot move session into place at", path, e)
    })
}

/// File-backed session storage, one directory per card.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory and prove it is writable.
    pub fn check_dir(&self) -> Result<(), EngineError> {
        fs::create_dir_all(&self.root)
            .map_err(|e| fatal_io("cannot create session directory", &self.root, e))?;

        let probe = self.root.join(PROBE_FILE);
        fs::write(&probe, b"probe")
            .map_err(|e| fatal_io("session directory is not writable:", &self.root, e))?;
        fs::remove_file(&probe).map_err(|e| fatal_io("cannot remove probe file", &probe, e))?;
        Ok(())
    }

    pub fn device_dir(&self, device_name: &str) -> PathBuf {
        self.root.join(dir_name(device_name))
    }

    pub fn session_path(&self, device_name: &str, name: &str) -> PathBuf {
        self.device_dir(device_name)
            .join(format!("{name}.{SESSION_EXT}"))
    }

    fn alias_path(&self, device_name: &str, alias: &str) -> PathBuf {
        self.device_dir(device_name)
            .join(format!("{alias}.{ALIAS_EXT}"))
    }

    /// Session names are plain file stems.
    pub fn validate_name(name: &str) -> Result<(), EngineError> {
        if name.is_empty()
            || name.contains(&['/', '\\'][..])
            || name.starts_with('.')
            || name == APPLIED_MARKER
        {
            return Err(EngineError::Fail(format!("invalid session name '{name}'")));
        }
        Ok(())
    }

    /// Persist a snapshot and point the current alias at it.
    ///
    /// Storing under the default name writes `current.mgs` and drops the
    /// alias, so the literal file is what `current` means from then on.
    pub fn write(
        &self,
        device_name: &str,
        name: &str,
        doc: &SessionDoc,
    ) -> Result<PathBuf, EngineError> {
        Self::validate_name(name)?;

        let dir = self.device_dir(device_name);
        fs::create_dir_all(&dir).map_err(|e| fatal_io("cannot create", &dir, e))?;

        let path = self.session_path(device_name, name);
        let json = serde_json::to_string_pretty(doc)
            .map_err(|e| EngineError::Fatal(format!("cannot serialize session: {e}")))?;
        write_atomic(&path, &json)?;

        if name == DEFAULT_SESSION {
            self.remove_alias(device_name, DEFAULT_SESSION)?;
        } else {
            self.write_alias(device_name, DEFAULT_SESSION, name)?;
        }

        debug!(path = %path.display(), "session written");
        Ok(path)
    }

    /// Read a snapshot; `current` follows the alias when one exists.
    ///
    /// Returns the resolved session name with the document.
    pub fn read(&self, device_name: &str, name: &str) -> Result<(String, SessionDoc), EngineError> {
        Self::validate_name(name)?;

        let resolved = if name == DEFAULT_SESSION {
            self.current(device_name)
                .unwrap_or_else(|| DEFAULT_SESSION.to_string())
        } else {
            name.to_string()
        };

        let path = self.session_path(device_name, &resolved);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(EngineError::Empty(format!(
                    "no session '{resolved}' for '{device_name}'"
                )));
            }
            Err(e) => return Err(fatal_io("cannot read", &path, e)),
        };

        let json: Value =
            serde_json::from_str(&text).map_err(|e| fatal_io("invalid JSON in", &path, e))?;
        if json.get("type").and_then(Value::as_str) != Some(TYPE_SESSION) {
            return Err(EngineError::Fatal(format!(
                "{} is not a session file",
                path.display()
            )));
        }
        let doc: SessionDoc =
            serde_json::from_value(json).map_err(|e| fatal_io("malformed session", &path, e))?;

        Ok((resolved, doc))
    }

    /// Stored sessions for a card, sorted by file name.
    pub fn list(&self, device_name: &str) -> Result<Vec<SessionEntry>, EngineError> {
        let dir = self.device_dir(device_name);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(EngineError::Empty(format!(
                    "no sessions stored for '{device_name}'"
                )));
            }
            Err(e) => return Err(fatal_io("cannot list", &dir, e)),
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == SESSION_EXT))
            .collect();
        files.sort();

        let mut sessions = Vec::with_capacity(files.len());
        for path in files {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let modified = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .map_err(|e| fatal_io("cannot stat", &path, e))?;
            sessions.push(SessionEntry {
                name: name.to_string(),
                timestamp: DateTime::<Utc>::from(modified),
            });
        }

        if sessions.is_empty() {
            return Err(EngineError::Empty(format!(
                "no sessions stored for '{device_name}'"
            )));
        }
        Ok(sessions)
    }

    /// Target of the current alias.
    pub fn current(&self, device_name: &str) -> Option<String> {
        self.read_alias(device_name, DEFAULT_SESSION)
            .map(|alias| alias.target)
    }

    /// Which session was applied last, and when.
    pub fn last_applied(&self, device_name: &str) -> Option<AliasRecord> {
        self.read_alias(device_name, APPLIED_MARKER)
    }

    pub(crate) fn mark_applied(&self, device_name: &str, name: &str) -> Result<(), EngineError> {
        self.write_alias(device_name, APPLIED_MARKER, name)
    }

    pub(crate) fn set_current(&self, device_name: &str, name: &str) -> Result<(), EngineError> {
        self.write_alias(device_name, DEFAULT_SESSION, name)
    }

    fn write_alias(&self, device_name: &str, alias: &str, target: &str) -> Result<(), EngineError> {
        let dir = self.device_dir(device_name);
        fs::create_dir_all(&dir).map_err(|e| fatal_io("cannot create", &dir, e))?;

        let record = AliasRecord {
            kind: ALIAS_TYPE.to_string(),
            target: target.to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&record)
            .map_err(|e| EngineError::Fatal(format!("cannot serialize alias: {e}")))?;
        write_atomic(&self.alias_path(device_name, alias), &json)
    }

    fn read_alias(&self, device_name: &str, alias: &str) -> Option<AliasRecord> {
        let path = self.alias_path(device_name, alias);
        let text = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<AliasRecord>(&text) {
            Ok(record) if record.kind == ALIAS_TYPE => Some(record),
            Ok(_) | Err(_) => {
                warn!(path = %path.display(), "ignoring unreadable alias record");
                None
            }
        }
    }

    fn remove_alias(&self, device_name: &str, alias: &str) -> Result<(), EngineError> {
        let path = self.alias_path(device_name, alias);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(fatal_io("cannot remove", &path, e)),
        }
    }
}

/// Caller-supplied info blocks must say what they are.
fn check_info(info: &Value) -> Result<(), EngineError> {
    match info.get("type").and_then(Value::as_str) {
        Some(TYPE_SESSION_INFO) => Ok(()),
        other => Err(EngineError::Fatal(format!(
            "session info must have type '{TYPE_SESSION_INFO}', got {}",
            other.unwrap_or("none")
        ))),
    }
}

impl<B: ControlBackend> Gateway<B> {
    /// Snapshot every control of a device under `name`.
    pub fn session_store(
        &self,
        device_id: &str,
        name: &str,
        info: Option<Value>,
    ) -> Result<SessionEntry, EngineError> {
        SessionStore::validate_name(name)?;
        if let Some(info) = &info {
            check_info(info)?;
        }

        let (card, controls) = {
            let handle = self.open(device_id)?;
            let card = card_info(&handle)?;
            let controls = collect_controls(&handle, None, Tier::TERSE)?;
            (card, controls)
        };

        let device_name = card.name.clone();
        let doc = SessionDoc {
            kind: TYPE_SESSION.to_string(),
            timestamp: Utc::now(),
            sndcard: DeviceDescriptor::new(device_id, card, Tier::TERSE),
            controls,
            info,
        };
        self.sessions().write(&device_name, name, &doc)?;

        info!(
            session = name,
            card = %device_name,
            controls = doc.controls.len(),
            "session stored"
        );
        Ok(SessionEntry {
            name: name.to_string(),
            timestamp: doc.timestamp,
        })
    }

    /// Re-apply a stored session, entry by entry.
    ///
    /// Entries that cannot be applied are logged and counted, never fatal.
    /// A session recorded for a different card is refused before any write.
    pub fn session_load(&self, device_id: &str, name: &str) -> Result<LoadReport, EngineError> {
        SessionStore::validate_name(name)?;

        let handle = self.open(device_id)?;
        let card = card_info(&handle)?;
        let (session, doc) = self.sessions().read(&card.name, name)?;

        if doc.sndcard.name != card.name {
            return Err(EngineError::Fatal(format!(
                "session '{session}' belongs to '{}', not '{}'",
                doc.sndcard.name, card.name
            )));
        }

        let mut summary = LoadSummary::default();
        for control in &doc.controls {
            let Some(values) = control.values() else {
                summary.skipped += 1;
                continue;
            };
            let values: Vec<Value> = values.iter().map(Scalar::to_json).collect();

            match apply_entry(&handle, control.numid, EntryInput::Json(&values)) {
                Ok(_) => summary.applied += 1,
                Err(EngineError::ReadOnly { numid }) => {
                    debug!(numid, "read-only control left as is");
                    summary.skipped += 1;
                }
                Err(err) => {
                    warn!(numid = control.numid, %err, "session entry not applied");
                    summary.failed += 1;
                }
            }
        }
        drop(handle);

        if let Err(err) = self.sessions().mark_applied(&card.name, &session) {
            warn!(%err, "cannot record applied session");
        }
        if session != DEFAULT_SESSION {
            if let Err(err) = self.sessions().set_current(&card.name, &session) {
                warn!(%err, "cannot update current session alias");
            }
        }

        info!(
            session = %session,
            applied = summary.applied,
            skipped = summary.skipped,
            failed = summary.failed,
            "session loaded"
        );
        Ok(LoadReport {
            session,
            doc,
            summary,
        })
    }

    /// Stored sessions for the card behind `device_id`.
    pub fn session_list(&self, device_id: &str) -> Result<Vec<SessionEntry>, EngineError> {
        let card = {
            let handle = self.open(device_id)?;
            card_info(&handle)?
        };
        self.sessions().list(&card.name)
    }
}
