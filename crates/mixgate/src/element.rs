//! Control element model shared by every backend.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Element value type, numbered as the kernel numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ElementType {
    None,
    Boolean,
    Integer,
    Enumerated,
    Bytes,
    Iec958,
    Integer64,
}

impl ElementType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Boolean,
            2 => Self::Integer,
            3 => Self::Enumerated,
            4 => Self::Bytes,
            5 => Self::Iec958,
            6 => Self::Integer64,
            _ => Self::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Boolean => "BOOLEAN",
            Self::Integer => "INTEGER",
            Self::Enumerated => "ENUMERATED",
            Self::Bytes => "BYTES",
            Self::Iec958 => "IEC958",
            Self::Integer64 => "INTEGER64",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interface class an element belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Iface {
    Card,
    Hwdep,
    #[default]
    Mixer,
    Pcm,
    Rawmidi,
    Timer,
    Sequencer,
}

impl Iface {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Card,
            1 => Self::Hwdep,
            3 => Self::Pcm,
            4 => Self::Rawmidi,
            5 => Self::Timer,
            6 => Self::Sequencer,
            _ => Self::Mixer,
        }
    }
}

/// Access flags reported by the element info record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Access {
    pub readable: bool,
    pub writable: bool,
    pub inactive: bool,
    pub volatile: bool,
    pub locked: bool,
    pub tlv_read: bool,
    pub tlv_write: bool,
    pub tlv_command: bool,
}

impl Access {
    pub fn read_write() -> Self {
        Self {
            readable: true,
            writable: true,
            ..Self::default()
        }
    }

    pub fn read_only() -> Self {
        Self {
            readable: true,
            ..Self::default()
        }
    }
}

/// Type-specific constraints on element values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Bounds {
    #[default]
    None,
    Integer { min: i64, max: i64, step: i64 },
    Enumerated(Vec<String>),
}

/// Everything the element info record says about one control.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementInfo {
    pub numid: u32,
    pub name: String,
    pub iface: Iface,
    pub kind: ElementType,
    pub count: u32,
    pub access: Access,
    pub bounds: Bounds,
}

impl ElementInfo {
    /// Read-write mixer element without bounds.
    pub fn new(numid: u32, name: impl Into<String>, kind: ElementType, count: u32) -> Self {
        Self {
            numid,
            name: name.into(),
            iface: Iface::Mixer,
            kind,
            count,
            access: Access::read_write(),
            bounds: Bounds::None,
        }
    }

    pub fn with_range(mut self, min: i64, max: i64, step: i64) -> Self {
        self.bounds = Bounds::Integer { min, max, step };
        self
    }

    pub fn with_items<S: Into<String>>(mut self, items: impl IntoIterator<Item = S>) -> Self {
        self.bounds = Bounds::Enumerated(items.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn count(&self) -> usize {
        self.count as usize
    }

    /// Clamp an integer into the element's range, if it has one.
    pub fn clamp(&self, value: i64) -> i64 {
        match &self.bounds {
            Bounds::Integer { min, max, .. } if min <= max => value.clamp(*min, *max),
            _ => value,
        }
    }
}

/// IEC958 channel status bytes exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Iec958Status {
    #[serde(rename = "AES0")]
    pub aes0: u8,
    #[serde(rename = "AES1")]
    pub aes1: u8,
    #[serde(rename = "AES2")]
    pub aes2: u8,
    #[serde(rename = "AES3")]
    pub aes3: u8,
}

/// One channel of a control value.
///
/// Enumerated items and bytes are carried as `Int`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Iec958(Iec958Status),
    Unknown,
}

impl Scalar {
    /// Neutral value for an element type.
    pub fn zero(kind: ElementType) -> Self {
        match kind {
            ElementType::Boolean => Self::Bool(false),
            ElementType::Integer
            | ElementType::Integer64
            | ElementType::Enumerated
            | ElementType::Bytes => Self::Int(0),
            ElementType::Iec958 => Self::Iec958(Iec958Status::default()),
            ElementType::None => Self::Unknown,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => json!(b),
            Self::Int(v) => json!(v),
            Self::Iec958(status) => json!({
                "AES0": status.aes0,
                "AES1": status.aes1,
                "AES2": status.aes2,
                "AES3": status.aes3,
            }),
            Self::Unknown => Value::Null,
        }
    }
}

/// Ordered per-channel value of one element.
pub type ControlValue = Vec<Scalar>;

/// Baseline value for writing: `current` padded or cut to the element count.
pub fn fit_to_count(info: &ElementInfo, current: &[Scalar]) -> ControlValue {
    let mut value: ControlValue = current.iter().take(info.count()).copied().collect();
    value.resize(info.count(), Scalar::zero(info.kind));
    value
}

/// Card identity as reported by the card info record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CardInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub long_name: String,
}
