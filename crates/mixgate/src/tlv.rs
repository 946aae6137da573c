//! Decoder for control metadata blocks (TLV records).
//!
//! A block is a `(type, size)` header of two 32-bit words followed by `size`
//! bytes of payload, padded to whole words. Containers nest further blocks.
//! Decoding is pure: it takes the words the device returned and produces a
//! [`MetadataBlock`] or a [`DecodeError`]. Callers embed errors as a marker
//! in the element document instead of failing the enumeration.
//!
//! Gain values are hundredths of a decibel and are rendered with
//! [`format_db`].

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

pub const TLVT_CONTAINER: u32 = 0;
pub const TLVT_DB_SCALE: u32 = 1;
pub const TLVT_DB_LINEAR: u32 = 2;
pub const TLVT_DB_RANGE: u32 = 3;
pub const TLVT_DB_MINMAX: u32 = 4;
pub const TLVT_DB_MINMAX_MUTE: u32 = 5;
pub const TLVT_CHMAP_FIXED: u32 = 0x101;
pub const TLVT_CHMAP_VAR: u32 = 0x102;
pub const TLVT_CHMAP_PAIRED: u32 = 0x103;

/// Mute flag inside the second dB-scale word.
const DB_SCALE_MUTE: u32 = 0x1_0000;

const WORD_BYTES: usize = 4;
/// Words per dB-range group: min, max, then a four-word nested block.
const RANGE_GROUP_WORDS: usize = 6;

/// Short channel position names, indexed by position number.
const CHMAP_NAMES: [&str; 37] = [
    "UNKNOWN", "NA", "MONO", "FL", "FR", "RL", "RR", "FC", "LFE", "SL", "SR", "RC", "FLC",
    "FRC", "RLC", "RRC", "FLW", "FRW", "FLH", "FCH", "FRH", "TC", "TFL", "TFR", "TFC", "TRL",
    "TRR", "TRC", "TFLC", "TFRC", "TSL", "TSR", "LLFE", "RLFE", "BC", "BLC", "BRC",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("TLV truncated: {available} bytes left, header needs 8")]
    Truncated { available: usize },

    #[error("TLV size error: type={tag} declares {declared} bytes, {remaining} remaining")]
    SizeMismatch {
        tag: u32,
        declared: usize,
        remaining: usize,
    },
}

impl DecodeError {
    /// Size-error marker embedded in element documents.
    pub fn to_json(&self) -> Value {
        json!({ "error": self.to_string() })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMapKind {
    Fixed,
    Variable,
    Paired,
}

impl ChannelMapKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Variable => "variable",
            Self::Paired => "paired",
        }
    }
}

/// Which fixed-layout block a raw word dump stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    GainScale,
    GainLinear,
    GainRange,
    GainMinMax,
    GainMinMaxMute,
}

impl RawKind {
    fn key(&self) -> &'static str {
        match self {
            Self::GainScale => "dbscale",
            Self::GainLinear => "dblinear",
            Self::GainRange => "dbrange",
            Self::GainMinMax => "dbminmax",
            Self::GainMinMaxMute => "dbminmaxmute",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GainRangeEntry {
    pub min: i32,
    pub max: i32,
    pub block: Result<Box<MetadataBlock>, DecodeError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataBlock {
    /// Children keep their own decode errors; a bad child does not drop its siblings.
    Container(Vec<Result<MetadataBlock, DecodeError>>),
    GainScale { min: i32, step: u32, mute: u32 },
    GainLinear { min: i32, max: i32 },
    GainRange(Vec<GainRangeEntry>),
    GainMinMax { min: i32, max: i32, mute: bool },
    ChannelMap { kind: ChannelMapKind, positions: Vec<u32> },
    RawWords { kind: RawKind, words: Vec<u32> },
    Unknown { tag: u32, words: Vec<u32> },
}

/// Render hundredths of a decibel, e.g. `-2000` as `"-20.00dB"`.
pub fn format_db(value: i64) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    format!("{sign}{}.{:02}dB", abs / 100, abs % 100)
}

/// Short name of a channel map position; out-of-table positions are "unknown".
pub fn channel_name(position: u32) -> &'static str {
    CHMAP_NAMES
        .get(position as usize)
        .copied()
        .unwrap_or("unknown")
}

fn words_for(bytes: usize) -> usize {
    bytes.div_ceil(WORD_BYTES)
}

fn hex_words(words: &[u32]) -> Vec<String> {
    words.iter().map(|w| format!("0x{w:08x}")).collect()
}

/// Decode one block from a word buffer.
///
/// The buffer may be longer than the block; trailing words are ignored.
pub fn decode(words: &[u32]) -> Result<MetadataBlock, DecodeError> {
    if words.len() < 2 {
        return Err(DecodeError::Truncated {
            available: words.len() * WORD_BYTES,
        });
    }

    let tag = words[0];
    let size = words[1] as usize;
    let remaining = (words.len() - 2) * WORD_BYTES;
    if size > remaining {
        return Err(DecodeError::SizeMismatch {
            tag,
            declared: size,
            remaining,
        });
    }

    let payload = &words[2..2 + words_for(size)];

    let block = match tag {
        TLVT_CONTAINER => decode_container(payload)?,
        TLVT_DB_SCALE => match payload {
            [min, packed] if size == 2 * WORD_BYTES => MetadataBlock::GainScale {
                min: *min as i32,
                step: packed & 0xffff,
                mute: u32::from(packed & DB_SCALE_MUTE != 0),
            },
            _ => raw(RawKind::GainScale, payload),
        },
        TLVT_DB_LINEAR => match payload {
            [min, max] if size == 2 * WORD_BYTES => MetadataBlock::GainLinear {
                min: *min as i32,
                max: *max as i32,
            },
            _ => raw(RawKind::GainLinear, payload),
        },
        TLVT_DB_RANGE => {
            if size % (RANGE_GROUP_WORDS * WORD_BYTES) != 0 {
                raw(RawKind::GainRange, payload)
            } else {
                decode_range(payload)
            }
        }
        TLVT_DB_MINMAX | TLVT_DB_MINMAX_MUTE => {
            let mute = tag == TLVT_DB_MINMAX_MUTE;
            match payload {
                [min, max] if size == 2 * WORD_BYTES => MetadataBlock::GainMinMax {
                    min: *min as i32,
                    max: *max as i32,
                    mute,
                },
                _ if mute => raw(RawKind::GainMinMaxMute, payload),
                _ => raw(RawKind::GainMinMax, payload),
            }
        }
        TLVT_CHMAP_FIXED | TLVT_CHMAP_VAR | TLVT_CHMAP_PAIRED => {
            let kind = match tag {
                TLVT_CHMAP_FIXED => ChannelMapKind::Fixed,
                TLVT_CHMAP_VAR => ChannelMapKind::Variable,
                _ => ChannelMapKind::Paired,
            };
            MetadataBlock::ChannelMap {
                kind,
                positions: payload.to_vec(),
            }
        }
        _ => {
            debug!(tag, size, "unknown TLV type, dumping raw words");
            MetadataBlock::Unknown {
                tag,
                words: payload.to_vec(),
            }
        }
    };

    Ok(block)
}

fn raw(kind: RawKind, payload: &[u32]) -> MetadataBlock {
    MetadataBlock::RawWords {
        kind,
        words: payload.to_vec(),
    }
}

fn decode_container(payload: &[u32]) -> Result<MetadataBlock, DecodeError> {
    let mut blocks = Vec::new();
    let mut idx = 0;

    while idx < payload.len() {
        let rest = &payload[idx..];
        if rest.len() < 2 {
            return Err(DecodeError::Truncated {
                available: rest.len() * WORD_BYTES,
            });
        }

        let nested = rest[1] as usize;
        let remaining = (rest.len() - 2) * WORD_BYTES;
        if nested > remaining {
            return Err(DecodeError::SizeMismatch {
                tag: rest[0],
                declared: nested,
                remaining,
            });
        }

        let span = 2 + words_for(nested);
        let child = decode(&rest[..span]);
        if let Err(err) = &child {
            warn!(%err, "nested container block rejected");
        }
        blocks.push(child);
        idx += span;
    }

    Ok(MetadataBlock::Container(blocks))
}

fn decode_range(payload: &[u32]) -> MetadataBlock {
    let entries = payload
        .chunks_exact(RANGE_GROUP_WORDS)
        .map(|group| {
            let block = decode(&group[2..]).map(Box::new);
            if let Err(err) = &block {
                warn!(%err, "nested dB-range block rejected");
            }
            GainRangeEntry {
                min: group[0] as i32,
                max: group[1] as i32,
                block,
            }
        })
        .collect();

    MetadataBlock::GainRange(entries)
}

impl MetadataBlock {
    /// JSON form used in control documents.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Container(blocks) => {
                let children: Vec<Value> = blocks
                    .iter()
                    .map(|child| match child {
                        Ok(block) => block.to_json(),
                        Err(err) => err.to_json(),
                    })
                    .collect();
                json!({ "container": children })
            }
            Self::GainScale { min, step, mute } => json!({
                "dbscale": {
                    "min": format_db(i64::from(*min)),
                    "step": format_db(i64::from(*step)),
                    // the flag goes through the dB formatter too: 1 renders as "0.01dB"
                    "mute": format_db(i64::from(*mute)),
                }
            }),
            Self::GainLinear { min, max } => json!({
                "dblinear": {
                    "min": format_db(i64::from(*min)),
                    "max": format_db(i64::from(*max)),
                }
            }),
            Self::GainRange(entries) => {
                let entries: Vec<Value> = entries
                    .iter()
                    .map(|entry| {
                        json!({
                            "rangemin": entry.min.to_string(),
                            "rangemax": entry.max.to_string(),
                            "tlv": match &entry.block {
                                Ok(block) => block.to_json(),
                                Err(err) => err.to_json(),
                            },
                        })
                    })
                    .collect();
                json!({ "dbrange": entries })
            }
            Self::GainMinMax { min, max, mute } => {
                let key = if *mute { "dbminmaxmute" } else { "dbminmax" };
                json!({
                    key: {
                        "min": format_db(i64::from(*min)),
                        "max": format_db(i64::from(*max)),
                    }
                })
            }
            Self::ChannelMap { kind, positions } => {
                let names: Vec<&str> = positions.iter().map(|p| channel_name(*p)).collect();
                json!({ "chmap": { kind.as_str(): names } })
            }
            Self::RawWords { kind, words } => {
                json!({ kind.key(): { "array": hex_words(words) } })
            }
            Self::Unknown { tag, words } => json!({
                "unknown": { "type": tag, "array": hex_words(words) }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db(v: i32) -> u32 {
        v as u32
    }

    #[test]
    fn test_format_db() {
        assert_eq!(format_db(-2000), "-20.00dB");
        assert_eq!(format_db(50), "0.50dB");
        assert_eq!(format_db(0), "0.00dB");
        assert_eq!(format_db(-5), "-0.05dB");
        assert_eq!(format_db(12345), "123.45dB");
    }

    #[test]
    fn test_db_scale_with_mute() {
        let words = [TLVT_DB_SCALE, 8, db(-2000), 50 | DB_SCALE_MUTE];
        let block = decode(&words).unwrap();
        assert_eq!(
            block,
            MetadataBlock::GainScale {
                min: -2000,
                step: 50,
                mute: 1
            }
        );
        assert_eq!(
            block.to_json(),
            json!({"dbscale": {"min": "-20.00dB", "step": "0.50dB", "mute": "0.01dB"}})
        );
    }

    #[test]
    fn test_db_scale_wrong_size_is_raw() {
        let words = [TLVT_DB_SCALE, 12, 1, 2, 0xdead_beef];
        let block = decode(&words).unwrap();
        assert_eq!(
            block.to_json(),
            json!({"dbscale": {"array": ["0x00000001", "0x00000002", "0xdeadbeef"]}})
        );
    }

    #[test]
    fn test_db_linear_and_minmax() {
        let linear = decode(&[TLVT_DB_LINEAR, 8, db(-9999), 0]).unwrap();
        assert_eq!(
            linear.to_json(),
            json!({"dblinear": {"min": "-99.99dB", "max": "0.00dB"}})
        );

        let minmax = decode(&[TLVT_DB_MINMAX_MUTE, 8, db(-7200), 600]).unwrap();
        assert_eq!(
            minmax.to_json(),
            json!({"dbminmaxmute": {"min": "-72.00dB", "max": "6.00dB"}})
        );

        let short = decode(&[TLVT_DB_MINMAX, 4, 7]).unwrap();
        assert_eq!(
            short,
            MetadataBlock::RawWords {
                kind: RawKind::GainMinMax,
                words: vec![7]
            }
        );
        let short_linear = decode(&[TLVT_DB_LINEAR, 4, 7]).unwrap();
        assert!(matches!(
            short_linear,
            MetadataBlock::RawWords {
                kind: RawKind::GainLinear,
                ..
            }
        ));
    }

    #[test]
    fn test_truncated_header() {
        assert_eq!(decode(&[]), Err(DecodeError::Truncated { available: 0 }));
        assert_eq!(
            decode(&[TLVT_DB_SCALE]),
            Err(DecodeError::Truncated { available: 4 })
        );
    }

    #[test]
    fn test_declared_size_exceeds_buffer() {
        let err = decode(&[TLVT_DB_SCALE, 16, 0, 0]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::SizeMismatch {
                tag: TLVT_DB_SCALE,
                declared: 16,
                remaining: 8
            }
        );
        assert!(err.to_json()["error"].as_str().unwrap().contains("size error"));
    }

    #[test]
    fn test_container_with_children() {
        let words = [
            TLVT_CONTAINER,
            32,
            TLVT_DB_SCALE,
            8,
            db(-4800),
            75,
            TLVT_CHMAP_FIXED,
            8,
            3,
            4,
        ];
        let block = decode(&words).unwrap();
        assert_eq!(
            block.to_json(),
            json!({"container": [
                {"dbscale": {"min": "-48.00dB", "step": "0.75dB", "mute": "0.00dB"}},
                {"chmap": {"fixed": ["FL", "FR"]}},
            ]})
        );
    }

    #[test]
    fn test_container_nested_overflow_aborts_container() {
        let words = [TLVT_CONTAINER, 24, TLVT_DB_SCALE, 8, 0, 0, TLVT_DB_SCALE, 64];
        let err = decode(&words).unwrap_err();
        assert_eq!(
            err,
            DecodeError::SizeMismatch {
                tag: TLVT_DB_SCALE,
                declared: 64,
                remaining: 0
            }
        );
    }

    #[test]
    fn test_sub_container_overflow_keeps_siblings() {
        let words = [
            TLVT_CONTAINER,
            40,
            TLVT_DB_SCALE,
            8,
            db(-600),
            100,
            TLVT_CONTAINER,
            16,
            TLVT_DB_SCALE,
            64,
            0,
            0,
        ];
        let block = decode(&words).unwrap();
        let MetadataBlock::Container(children) = &block else {
            panic!("expected container, got {block:?}");
        };
        assert_eq!(children.len(), 2);
        assert_eq!(
            children[1],
            Err(DecodeError::SizeMismatch {
                tag: TLVT_DB_SCALE,
                declared: 64,
                remaining: 8
            })
        );

        let json = block.to_json();
        assert_eq!(json["container"][0]["dbscale"]["min"], "-6.00dB");
        assert!(json["container"][1]["error"]
            .as_str()
            .unwrap()
            .contains("size error"));
    }

    #[test]
    fn test_container_dangling_word_is_truncated() {
        let words = [TLVT_CONTAINER, 4, TLVT_DB_SCALE];
        assert_eq!(decode(&words), Err(DecodeError::Truncated { available: 4 }));
    }

    #[test]
    fn test_db_range() {
        let words = [
            TLVT_DB_RANGE,
            48,
            0,
            31,
            TLVT_DB_SCALE,
            8,
            db(-4650),
            150,
            32,
            63,
            TLVT_DB_SCALE,
            8,
            db(-1000),
            50,
        ];
        let block = decode(&words).unwrap();
        let json = block.to_json();
        let entries = json["dbrange"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["rangemin"], "0");
        assert_eq!(entries[0]["rangemax"], "31");
        assert_eq!(entries[0]["tlv"]["dbscale"]["min"], "-46.50dB");
        assert_eq!(entries[1]["rangemin"], "32");
        assert_eq!(entries[1]["tlv"]["dbscale"]["step"], "0.50dB");
    }

    #[test]
    fn test_db_range_bad_nested_block_stays_local() {
        let words = [TLVT_DB_RANGE, 24, 0, 10, TLVT_DB_SCALE, 40, 0, 0];
        let block = decode(&words).unwrap();
        let MetadataBlock::GainRange(entries) = &block else {
            panic!("expected range, got {block:?}");
        };
        assert!(entries[0].block.is_err());
        assert!(block.to_json()["dbrange"][0]["tlv"]["error"].is_string());
    }

    #[test]
    fn test_db_range_not_multiple_of_group_is_raw() {
        let words = [TLVT_DB_RANGE, 20, 1, 2, 3, 4, 5];
        let block = decode(&words).unwrap();
        assert_eq!(
            block,
            MetadataBlock::RawWords {
                kind: RawKind::GainRange,
                words: vec![1, 2, 3, 4, 5]
            }
        );
    }

    #[test]
    fn test_channel_maps() {
        let paired = decode(&[TLVT_CHMAP_PAIRED, 12, 7, 8, 999]).unwrap();
        assert_eq!(
            paired.to_json(),
            json!({"chmap": {"paired": ["FC", "LFE", "unknown"]}})
        );
        let variable = decode(&[TLVT_CHMAP_VAR, 4, 2]).unwrap();
        assert_eq!(variable.to_json(), json!({"chmap": {"variable": ["MONO"]}}));
    }

    #[test]
    fn test_unknown_tag_is_not_fatal() {
        let block = decode(&[0x999, 4, 0xabc]).unwrap();
        assert_eq!(
            block.to_json(),
            json!({"unknown": {"type": 0x999, "array": ["0x00000abc"]}})
        );
    }

    #[test]
    fn test_trailing_words_ignored() {
        let block = decode(&[TLVT_DB_LINEAR, 8, 0, 100, 0, 0, 0, 0]).unwrap();
        assert_eq!(block, MetadataBlock::GainLinear { min: 0, max: 100 });
    }
}
