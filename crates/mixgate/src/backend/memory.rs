//! In-memory mixer backend.
//!
//! Serves tests and the `--sim` mode of the binary. Cards can be built in
//! code or loaded from a JSON fixture:
//!
//! ```json
//! {"cards": [{
//!   "device": "hw:0", "id": "Desk", "name": "Desk Mixer",
//!   "controls": [
//!     {"numid": 2, "name": "Master Playback Volume", "type": "INTEGER",
//!      "count": 2, "min": 0, "max": 100, "value": [50, 50],
//!      "tlv": [1, 8, 4294962296, 50]}
//!   ]
//! }]}
//! ```
//!
//! The backend counts open handles and records every successful write so
//! tests can check handle discipline and which entries were applied.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{BackendError, ControlBackend, DeviceHandle};
use crate::element::{
    Access, Bounds, CardInfo, ControlValue, ElementInfo, ElementType, Iface, Scalar,
};

#[derive(Debug, Clone)]
struct MemoryElement {
    info: ElementInfo,
    value: ControlValue,
    tlv: Option<Vec<u32>>,
}

#[derive(Debug, Clone, Default)]
struct Faults {
    card_info: bool,
    info: BTreeSet<u32>,
    read: BTreeSet<u32>,
    write: BTreeSet<u32>,
}

#[derive(Debug, Clone)]
struct MemoryCard {
    info: CardInfo,
    elements: Vec<MemoryElement>,
    faults: Faults,
}

impl MemoryCard {
    fn element(&self, numid: u32) -> Result<&MemoryElement, BackendError> {
        self.elements
            .iter()
            .find(|e| e.info.numid == numid)
            .ok_or(BackendError::NoElement(numid))
    }
}

/// A write that reached the simulated hardware.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub device_id: String,
    pub numid: u32,
    pub value: ControlValue,
}

#[derive(Debug, Default)]
struct State {
    cards: BTreeMap<String, MemoryCard>,
    open_handles: usize,
    writes: Vec<WriteRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a backend from a JSON fixture document.
    pub fn from_json(json: &str) -> Result<Self, BackendError> {
        let fixture: Fixture =
            serde_json::from_str(json).map_err(|e| BackendError::Fixture(e.to_string()))?;

        let backend = Self::new();
        for card in fixture.cards {
            backend.add_card(&card.device, card.card);
            for control in card.controls {
                let (info, value, tlv) = control.into_parts();
                backend.add_element(&card.device, info, value, tlv)?;
            }
        }
        Ok(backend)
    }

    pub fn from_path(path: &Path) -> Result<Self, BackendError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| BackendError::Fixture(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    pub fn add_card(&self, device_id: &str, info: CardInfo) {
        lock(&self.state).cards.insert(
            device_id.to_string(),
            MemoryCard {
                info,
                elements: Vec::new(),
                faults: Faults::default(),
            },
        );
    }

    /// Append an element; `value` is fitted to the element count.
    pub fn add_element(
        &self,
        device_id: &str,
        info: ElementInfo,
        value: ControlValue,
        tlv: Option<Vec<u32>>,
    ) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        let card = state
            .cards
            .get_mut(device_id)
            .ok_or_else(|| BackendError::NoDevice(device_id.to_string()))?;

        let value = crate::element::fit_to_count(&info, &value);
        card.elements.retain(|e| e.info.numid != info.numid);
        card.elements.push(MemoryElement { info, value, tlv });
        Ok(())
    }

    /// Current value of an element, bypassing any injected faults.
    pub fn value(&self, device_id: &str, numid: u32) -> Option<ControlValue> {
        let state = lock(&self.state);
        let card = state.cards.get(device_id)?;
        card.element(numid).ok().map(|e| e.value.clone())
    }

    /// Overwrite an element value without recording a write.
    pub fn poke(&self, device_id: &str, numid: u32, value: ControlValue) {
        let mut state = lock(&self.state);
        if let Some(element) = state
            .cards
            .get_mut(device_id)
            .and_then(|card| card.elements.iter_mut().find(|e| e.info.numid == numid))
        {
            element.value = crate::element::fit_to_count(&element.info, &value);
        }
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        lock(&self.state).writes.clone()
    }

    pub fn clear_writes(&self) {
        lock(&self.state).writes.clear();
    }

    pub fn open_handles(&self) -> usize {
        lock(&self.state).open_handles
    }

    pub fn fail_card_info(&self, device_id: &str) {
        self.with_faults(device_id, |f| f.card_info = true);
    }

    pub fn fail_info(&self, device_id: &str, numid: u32) {
        self.with_faults(device_id, |f| {
            f.info.insert(numid);
        });
    }

    pub fn fail_read(&self, device_id: &str, numid: u32) {
        self.with_faults(device_id, |f| {
            f.read.insert(numid);
        });
    }

    pub fn fail_write(&self, device_id: &str, numid: u32) {
        self.with_faults(device_id, |f| {
            f.write.insert(numid);
        });
    }

    fn with_faults(&self, device_id: &str, apply: impl FnOnce(&mut Faults)) {
        if let Some(card) = lock(&self.state).cards.get_mut(device_id) {
            apply(&mut card.faults);
        }
    }
}

impl ControlBackend for MemoryBackend {
    type Handle = MemoryHandle;

    fn open(&self, device_id: &str) -> Result<MemoryHandle, BackendError> {
        let mut state = lock(&self.state);
        if !state.cards.contains_key(device_id) {
            return Err(BackendError::NoDevice(device_id.to_string()));
        }
        state.open_handles += 1;
        Ok(MemoryHandle {
            state: Arc::clone(&self.state),
            device_id: device_id.to_string(),
        })
    }

    fn device_ids(&self, max_cards: u32) -> Vec<String> {
        (0..max_cards).map(|idx| format!("hw:{idx}")).collect()
    }
}

/// Open connection to a simulated card.
#[derive(Debug)]
pub struct MemoryHandle {
    state: Arc<Mutex<State>>,
    device_id: String,
}

impl MemoryHandle {
    fn with_card<T>(
        &self,
        f: impl FnOnce(&MemoryCard) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        let state = lock(&self.state);
        let card = state
            .cards
            .get(&self.device_id)
            .ok_or_else(|| BackendError::NoDevice(self.device_id.clone()))?;
        f(card)
    }
}

impl DeviceHandle for MemoryHandle {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn card_info(&self) -> Result<CardInfo, BackendError> {
        self.with_card(|card| {
            if card.faults.card_info {
                return Err(BackendError::io("card info", "injected fault"));
            }
            Ok(card.info.clone())
        })
    }

    fn numids(&self) -> Result<Vec<u32>, BackendError> {
        self.with_card(|card| Ok(card.elements.iter().map(|e| e.info.numid).collect()))
    }

    fn info(&self, numid: u32) -> Result<ElementInfo, BackendError> {
        self.with_card(|card| {
            if card.faults.info.contains(&numid) {
                return Err(BackendError::io("element info", "injected fault"));
            }
            Ok(card.element(numid)?.info.clone())
        })
    }

    fn read(&self, info: &ElementInfo) -> Result<ControlValue, BackendError> {
        self.with_card(|card| {
            if card.faults.read.contains(&info.numid) {
                return Err(BackendError::io("element read", "injected fault"));
            }
            let element = card.element(info.numid)?;
            if !element.info.access.readable {
                return Err(BackendError::io("element read", "not readable"));
            }
            Ok(element.value.clone())
        })
    }

    fn write(&self, info: &ElementInfo, value: &ControlValue) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        let card = state
            .cards
            .get_mut(&self.device_id)
            .ok_or_else(|| BackendError::NoDevice(self.device_id.clone()))?;

        if card.faults.write.contains(&info.numid) {
            return Err(BackendError::io("element write", "injected fault"));
        }
        let element = card
            .elements
            .iter_mut()
            .find(|e| e.info.numid == info.numid)
            .ok_or(BackendError::NoElement(info.numid))?;
        if !element.info.access.writable {
            return Err(BackendError::io("element write", "operation not permitted"));
        }
        if value.len() != element.info.count() {
            return Err(BackendError::io(
                "element write",
                format!(
                    "expected {} values, got {}",
                    element.info.count(),
                    value.len()
                ),
            ));
        }

        element.value = value.clone();
        state.writes.push(WriteRecord {
            device_id: self.device_id.clone(),
            numid: info.numid,
            value: value.clone(),
        });
        Ok(())
    }

    fn read_tlv(&self, info: &ElementInfo) -> Result<Vec<u32>, BackendError> {
        self.with_card(|card| {
            card.element(info.numid)?
                .tlv
                .clone()
                .ok_or_else(|| BackendError::io("TLV read", "no metadata"))
        })
    }
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.open_handles = state.open_handles.saturating_sub(1);
    }
}

#[derive(Debug, Deserialize)]
struct Fixture {
    cards: Vec<CardFixture>,
}

#[derive(Debug, Deserialize)]
struct CardFixture {
    device: String,
    #[serde(flatten)]
    card: CardInfo,
    #[serde(default)]
    controls: Vec<ControlFixture>,
}

#[derive(Debug, Deserialize)]
struct ControlFixture {
    numid: u32,
    name: String,
    #[serde(default)]
    iface: Iface,
    #[serde(rename = "type")]
    kind: ElementType,
    #[serde(default = "ControlFixture::default_count")]
    count: u32,
    #[serde(default = "Access::read_write")]
    access: Access,
    min: Option<i64>,
    max: Option<i64>,
    step: Option<i64>,
    #[serde(default)]
    items: Vec<String>,
    #[serde(default)]
    value: ControlValue,
    tlv: Option<Vec<u32>>,
}

impl ControlFixture {
    fn default_count() -> u32 {
        1
    }

    fn into_parts(self) -> (ElementInfo, ControlValue, Option<Vec<u32>>) {
        let bounds = if !self.items.is_empty() {
            Bounds::Enumerated(self.items)
        } else if self.min.is_some() || self.max.is_some() {
            Bounds::Integer {
                min: self.min.unwrap_or(0),
                max: self.max.unwrap_or(0),
                step: self.step.unwrap_or(0),
            }
        } else {
            Bounds::None
        };

        let mut access = self.access;
        if self.tlv.is_some() {
            access.tlv_read = true;
        }

        let value = self
            .value
            .into_iter()
            .map(|v| match (self.kind, v) {
                (ElementType::Boolean, Scalar::Int(i)) => Scalar::Bool(i != 0),
                (_, v) => v,
            })
            .collect();

        let info = ElementInfo {
            numid: self.numid,
            name: self.name,
            iface: self.iface,
            kind: self.kind,
            count: self.count,
            access,
            bounds,
        };
        (info, value, self.tlv)
    }
}
