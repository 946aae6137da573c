//! Device access seam.
//!
//! The engine never touches hardware directly. A [`ControlBackend`] opens
//! devices by identifier and hands out a [`DeviceHandle`], which owns the
//! open control connection and releases it when dropped. Every operation
//! opens its own handle and drops it before returning.

pub mod memory;

#[cfg(feature = "alsa")]
pub mod alsa;

use thiserror::Error;

use crate::element::{CardInfo, ControlValue, ElementInfo};

pub use memory::MemoryBackend;

#[cfg(feature = "alsa")]
pub use self::alsa::AlsaBackend;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("no sound card found for '{0}'")]
    NoDevice(String),

    #[error("no control numid={0}")]
    NoElement(u32),

    #[error("{op} failed: {message}")]
    Io { op: &'static str, message: String },

    #[error("invalid device fixture: {0}")]
    Fixture(String),
}

impl BackendError {
    pub fn io(op: &'static str, message: impl Into<String>) -> Self {
        Self::Io {
            op,
            message: message.into(),
        }
    }
}

/// Opens devices by identifier.
pub trait ControlBackend {
    type Handle: DeviceHandle;

    /// Open a control connection. `NoDevice` when the id resolves to nothing.
    fn open(&self, device_id: &str) -> Result<Self::Handle, BackendError>;

    /// Candidate identifiers probed when listing devices.
    fn device_ids(&self, max_cards: u32) -> Vec<String>;
}

/// An open control connection to one device.
pub trait DeviceHandle {
    fn device_id(&self) -> &str;

    fn card_info(&self) -> Result<CardInfo, BackendError>;

    /// Element ids in device enumeration order.
    fn numids(&self) -> Result<Vec<u32>, BackendError>;

    fn info(&self, numid: u32) -> Result<ElementInfo, BackendError>;

    fn read(&self, info: &ElementInfo) -> Result<ControlValue, BackendError>;

    /// Write a full value; `value` carries exactly `info.count` channels.
    fn write(&self, info: &ElementInfo, value: &ControlValue) -> Result<(), BackendError>;

    /// Raw metadata words for elements with a readable TLV.
    fn read_tlv(&self, info: &ElementInfo) -> Result<Vec<u32>, BackendError>;
}
