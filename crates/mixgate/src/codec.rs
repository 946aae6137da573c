//! Control element documents at a chosen detail tier.
//!
//! | tier | fields                                             |
//! |------|----------------------------------------------------|
//! | 0    | numid, name, iface, active, value, ctrl, acl, tlv  |
//! | 1    | numid, iface, active, value                        |
//! | 2    | numid, active, value                               |
//! | 3    | numid, value                                       |
//!
//! `value` appears whenever the element is readable. Value and metadata read
//! failures become `{"error": ..}` markers inside the document; encoding one
//! element never fails.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::backend::DeviceHandle;
use crate::element::{Access, Bounds, ControlValue, ElementInfo, ElementType, Iface};
use crate::tlv;

/// Detail tier, 0 (richest) to 3 (minimal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Tier(u8);

impl Tier {
    pub const FULL: Tier = Tier(0);
    pub const TERSE: Tier = Tier(1);
    pub const MINIMAL: Tier = Tier(3);

    /// Levels above 3 are treated as 3.
    pub fn new(level: u8) -> Self {
        Self(level.min(Self::MINIMAL.0))
    }

    pub fn level(self) -> u8 {
        self.0
    }

    pub fn is_full(self) -> bool {
        self.0 == 0
    }
}

impl From<u8> for Tier {
    fn from(level: u8) -> Self {
        Self::new(level)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueField {
    Values(ControlValue),
    Error { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtrlDoc {
    #[serde(rename = "type")]
    pub kind: ElementType,
    pub count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enums: Option<Vec<String>>,
}

impl CtrlDoc {
    fn from_info(info: &ElementInfo) -> Self {
        let mut doc = Self {
            kind: info.kind,
            count: info.count,
            min: None,
            max: None,
            step: None,
            enums: None,
        };
        match &info.bounds {
            Bounds::Integer { min, max, step } => {
                doc.min = Some(*min);
                doc.max = Some(*max);
                doc.step = Some(*step);
            }
            Bounds::Enumerated(items) => doc.enums = Some(items.clone()),
            Bounds::None => {}
        }
        doc
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlvAclDoc {
    pub read: bool,
    pub write: bool,
    pub command: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclDoc {
    pub read: bool,
    pub write: bool,
    pub inact: bool,
    pub volat: bool,
    pub lock: bool,
    pub tlv: TlvAclDoc,
}

impl From<&Access> for AclDoc {
    fn from(access: &Access) -> Self {
        Self {
            read: access.readable,
            write: access.writable,
            inact: access.inactive,
            volat: access.volatile,
            lock: access.locked,
            tlv: TlvAclDoc {
                read: access.tlv_read,
                write: access.tlv_write,
                command: access.tlv_command,
            },
        }
    }
}

/// Serialized form of one control element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlDoc {
    pub numid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iface: Option<Iface>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ValueField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctrl: Option<CtrlDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<AclDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tlv: Option<Value>,
}

impl ControlDoc {
    /// Stored values, if the document carries a successful read.
    pub fn values(&self) -> Option<&ControlValue> {
        match &self.value {
            Some(ValueField::Values(values)) => Some(values),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Encode one element. `info` must come from the same handle.
pub fn encode<H: DeviceHandle + ?Sized>(handle: &H, info: &ElementInfo, tier: Tier) -> ControlDoc {
    let level = tier.level();
    let mut doc = ControlDoc {
        numid: info.numid,
        ..ControlDoc::default()
    };

    if level < 3 {
        doc.active = Some(!info.access.inactive);
    }
    if level < 2 {
        doc.iface = Some(info.iface);
    }
    if level < 1 {
        doc.name = Some(info.name.clone());
    }

    if info.access.readable {
        doc.value = Some(match handle.read(info) {
            Ok(values) => ValueField::Values(values),
            Err(err) => {
                warn!(numid = info.numid, %err, "control value read failed");
                ValueField::Error {
                    error: err.to_string(),
                }
            }
        });
    }

    if tier.is_full() {
        doc.ctrl = Some(CtrlDoc::from_info(info));
        doc.acl = Some(AclDoc::from(&info.access));
        if info.access.tlv_read {
            doc.tlv = Some(encode_tlv(handle, info));
        }
    }

    doc
}

fn encode_tlv<H: DeviceHandle + ?Sized>(handle: &H, info: &ElementInfo) -> Value {
    let words = match handle.read_tlv(info) {
        Ok(words) => words,
        Err(err) => {
            warn!(numid = info.numid, %err, "TLV read failed");
            return json!({ "error": err.to_string() });
        }
    };

    match tlv::decode(&words) {
        Ok(block) => block.to_json(),
        Err(err) => {
            warn!(numid = info.numid, %err, "TLV decode degraded to error marker");
            err.to_json()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ControlBackend, MemoryBackend};
    use crate::element::{CardInfo, Scalar};
    use crate::tlv::{TLVT_CONTAINER, TLVT_DB_SCALE};

    fn backend() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.add_card(
            "hw:0",
            CardInfo {
                id: "PCH".into(),
                name: "HDA Intel PCH".into(),
                ..CardInfo::default()
            },
        );
        backend
            .add_element(
                "hw:0",
                ElementInfo::new(2, "Master Playback Volume", ElementType::Integer, 2)
                    .with_range(0, 87, 1),
                vec![Scalar::Int(60), Scalar::Int(61)],
                Some(vec![TLVT_DB_SCALE, 8, (-6525i32) as u32, 75]),
            )
            .unwrap();
        backend
    }

    fn tlv_element() -> ElementInfo {
        let mut info = ElementInfo::new(2, "Master Playback Volume", ElementType::Integer, 2)
            .with_range(0, 87, 1);
        info.access.tlv_read = true;
        info
    }

    #[test]
    fn test_full_tier_document() {
        let backend = backend();
        let handle = backend.open("hw:0").unwrap();
        let doc = encode(&handle, &tlv_element(), Tier::FULL);

        assert_eq!(
            doc.to_json(),
            json!({
                "numid": 2,
                "name": "Master Playback Volume",
                "iface": "MIXER",
                "active": true,
                "value": [60, 61],
                "ctrl": {"type": "INTEGER", "count": 2, "min": 0, "max": 87, "step": 1},
                "acl": {
                    "read": true, "write": true, "inact": false, "volat": false, "lock": false,
                    "tlv": {"read": true, "write": false, "command": false}
                },
                "tlv": {"dbscale": {"min": "-65.25dB", "step": "0.75dB", "mute": "0.00dB"}}
            })
        );
    }

    #[test]
    fn test_tier_gating() {
        let backend = backend();
        let handle = backend.open("hw:0").unwrap();
        let info = tlv_element();

        let terse = encode(&handle, &info, Tier::TERSE).to_json();
        assert_eq!(
            terse,
            json!({"numid": 2, "iface": "MIXER", "active": true, "value": [60, 61]})
        );

        let two = encode(&handle, &info, Tier::new(2)).to_json();
        assert_eq!(two, json!({"numid": 2, "active": true, "value": [60, 61]}));

        let minimal = encode(&handle, &info, Tier::new(9)).to_json();
        assert_eq!(minimal, json!({"numid": 2, "value": [60, 61]}));
    }

    #[test]
    fn test_value_read_failure_is_embedded() {
        let backend = backend();
        backend.fail_read("hw:0", 2);
        let handle = backend.open("hw:0").unwrap();

        let doc = encode(&handle, &tlv_element(), Tier::TERSE);
        assert!(matches!(doc.value, Some(ValueField::Error { .. })));
        assert!(doc.values().is_none());
    }

    #[test]
    fn test_unreadable_element_has_no_value() {
        let backend = backend();
        let handle = backend.open("hw:0").unwrap();
        let info = tlv_element().with_access(Access {
            writable: true,
            ..Access::default()
        });
        let doc = encode(&handle, &info, Tier::MINIMAL);
        assert_eq!(doc.to_json(), json!({"numid": 2}));
    }

    #[test]
    fn test_bad_tlv_container_stays_inside_document() {
        let backend = backend();
        backend
            .add_element(
                "hw:0",
                ElementInfo::new(7, "Broken Volume", ElementType::Integer, 1).with_range(0, 10, 1),
                vec![Scalar::Int(3)],
                Some(vec![TLVT_CONTAINER, 16, TLVT_DB_SCALE, 64, 0, 0]),
            )
            .unwrap();
        let handle = backend.open("hw:0").unwrap();
        let info = handle.info(7).unwrap();

        let doc = encode(&handle, &info, Tier::FULL);
        assert_eq!(doc.values(), Some(&vec![Scalar::Int(3)]));
        assert!(doc.tlv.unwrap()["error"]
            .as_str()
            .unwrap()
            .contains("size error"));
    }

    #[test]
    fn test_enumerated_ctrl_lists_items() {
        let backend = backend();
        let handle = backend.open("hw:0").unwrap();
        let info = ElementInfo::new(8, "Input Source", ElementType::Enumerated, 1)
            .with_items(["Mic", "Line"]);
        backend
            .add_element("hw:0", info.clone(), vec![Scalar::Int(1)], None)
            .unwrap();

        let doc = encode(&handle, &info, Tier::FULL);
        let ctrl = doc.ctrl.unwrap();
        assert_eq!(ctrl.enums, Some(vec!["Mic".to_string(), "Line".to_string()]));
        assert!(ctrl.min.is_none());
        assert!(doc.tlv.is_none());
    }

    #[test]
    fn test_document_round_trips_through_json() {
        let backend = backend();
        let handle = backend.open("hw:0").unwrap();
        let doc = encode(&handle, &tlv_element(), Tier::TERSE);

        let parsed: ControlDoc = serde_json::from_value(doc.to_json()).unwrap();
        assert_eq!(parsed, doc);
    }
}
