//! Device probing and control enumeration.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{ControlBackend, DeviceHandle};
use crate::codec::{self, ControlDoc, Tier};
use crate::element::CardInfo;
use crate::error::EngineError;
use crate::gateway::Gateway;

/// Device listing item. `deviceId`, `driver` and `info` only at tier 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    pub card_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl DeviceDescriptor {
    pub fn new(device_id: &str, card: CardInfo, tier: Tier) -> Self {
        let full = tier.is_full();
        Self {
            card_id: card.id,
            name: card.name,
            device_id: full.then(|| device_id.to_string()),
            driver: full.then_some(card.driver),
            info: full.then_some(card.long_name),
        }
    }
}

/// Result of `find_controls`; the card descriptor is included below tier 2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlsReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sndcard: Option<DeviceDescriptor>,
    pub controls: Vec<ControlDoc>,
}

/// Card info for an open handle; failure here is `FAIL`.
pub(crate) fn card_info<H: DeviceHandle>(handle: &H) -> Result<CardInfo, EngineError> {
    handle.card_info().map_err(|err| {
        EngineError::Fail(format!(
            "cannot read card info for '{}': {err}",
            handle.device_id()
        ))
    })
}

/// Encode the handle's controls in enumeration order.
///
/// A failed element info query aborts the whole enumeration as `FATAL`;
/// value and metadata failures stay inside the element documents.
pub(crate) fn collect_controls<H: DeviceHandle>(
    handle: &H,
    filter: Option<u32>,
    tier: Tier,
) -> Result<Vec<ControlDoc>, EngineError> {
    let numids = handle.numids().map_err(|err| {
        EngineError::Fatal(format!(
            "cannot list controls of '{}': {err}",
            handle.device_id()
        ))
    })?;

    let mut controls = Vec::new();
    for numid in numids {
        if filter.is_some_and(|wanted| wanted != numid) {
            continue;
        }
        let info = handle.info(numid).map_err(|err| {
            EngineError::Fatal(format!("element info failed for numid={numid}: {err}"))
        })?;
        controls.push(codec::encode(handle, &info, tier));
    }

    debug!(
        device_id = handle.device_id(),
        count = controls.len(),
        "controls encoded"
    );
    Ok(controls)
}

impl<B: ControlBackend> Gateway<B> {
    /// Resolve a device and describe it.
    pub fn probe(&self, device_id: &str, tier: Tier) -> Result<DeviceDescriptor, EngineError> {
        let handle = self.open(device_id)?;
        let card = card_info(&handle)?;
        Ok(DeviceDescriptor::new(device_id, card, tier))
    }

    /// Probe every candidate device; ids that resolve to nothing are skipped.
    pub fn list_devices(&self, tier: Tier) -> Result<Vec<DeviceDescriptor>, EngineError> {
        let mut devices = Vec::new();
        for device_id in self.backend().device_ids(self.defaults().max_cards) {
            match self.probe(&device_id, tier) {
                Ok(descriptor) => devices.push(descriptor),
                Err(EngineError::Empty(_)) => continue,
                Err(err @ EngineError::Fatal(_)) => return Err(err),
                Err(err) => warn!(%device_id, %err, "skipping device"),
            }
        }

        if devices.is_empty() {
            return Err(EngineError::Empty("no sound card found".to_string()));
        }
        Ok(devices)
    }

    /// Control documents of a device, optionally only `filter`'s.
    pub fn find_controls(
        &self,
        device_id: &str,
        filter: Option<u32>,
        tier: Tier,
    ) -> Result<ControlsReport, EngineError> {
        let handle = self.open(device_id)?;
        let sndcard = if tier.level() < 2 {
            Some(DeviceDescriptor::new(device_id, card_info(&handle)?, tier))
        } else {
            None
        };
        let controls = collect_controls(&handle, filter, tier)?;
        Ok(ControlsReport { sndcard, controls })
    }
}
