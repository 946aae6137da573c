//! The engine entry point.
//!
//! A [`Gateway`] pairs a device backend with a session store and the request
//! defaults from the configuration. Operations live in the `enumerate`,
//! `write` and `session` modules as `impl Gateway` blocks; each one opens
//! its own device handle and drops it before returning.

use mixconf::{DefaultsConfig, MixConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::backend::{BackendError, ControlBackend};
use crate::codec::Tier;
use crate::error::EngineError;
use crate::session::SessionStore;

pub struct Gateway<B: ControlBackend> {
    backend: B,
    sessions: SessionStore,
    defaults: DefaultsConfig,
    pings: AtomicU64,
}

impl<B: ControlBackend> Gateway<B> {
    pub fn new(backend: B, config: &MixConfig) -> Self {
        Self {
            backend,
            sessions: SessionStore::new(config.paths.session_dir()),
            defaults: config.defaults.clone(),
            pings: AtomicU64::new(0),
        }
    }

    /// Gateway with default request settings and sessions under `session_dir`.
    pub fn with_session_dir(backend: B, session_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            sessions: SessionStore::new(session_dir.into()),
            defaults: DefaultsConfig::default(),
            pings: AtomicU64::new(0),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn defaults(&self) -> &DefaultsConfig {
        &self.defaults
    }

    /// Device id to use when a request leaves it out.
    pub fn device_or_default<'a>(&'a self, device: Option<&'a str>) -> &'a str {
        device.unwrap_or(&self.defaults.device)
    }

    pub fn tier_or_default(&self, tier: Option<u8>) -> Tier {
        Tier::new(tier.unwrap_or(self.defaults.tier))
    }

    /// Count of pings answered so far, including this one.
    pub fn ping(&self) -> u64 {
        self.pings.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Open a device; unknown ids are `EMPTY`, anything else `FATAL`.
    pub(crate) fn open(&self, device_id: &str) -> Result<B::Handle, EngineError> {
        debug!(device_id, "opening device");
        self.backend.open(device_id).map_err(|err| match err {
            BackendError::NoDevice(_) => EngineError::Empty(err.to_string()),
            other => EngineError::Fatal(format!("cannot open '{device_id}': {other}")),
        })
    }
}
