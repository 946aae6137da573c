//! Value expressions and write-back values.
//!
//! Text expressions follow the amixer conventions: a comma separated list
//! sets channels by position, a single item sets every channel. Booleans take
//! `on/off/yes/no/true/false/1/0/mute/unmute/toggle`, integers take plain
//! numbers or `N%` of the range and are clamped, enumerated controls take an
//! item name or index.
//!
//! Every write starts from the element's current value, so channels the
//! caller does not mention keep what the hardware had.

use serde_json::Value;
use thiserror::Error;

use crate::element::{
    fit_to_count, Bounds, ControlValue, ElementInfo, ElementType, Iec958Status, Scalar,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueParseError {
    #[error("empty value expression")]
    Empty,

    #[error("invalid {kind} value '{token}'")]
    Invalid { kind: ElementType, token: String },

    #[error("no item '{token}' in enumerated control")]
    UnknownItem { token: String },

    #[error("{kind} controls cannot be written")]
    Unsupported { kind: ElementType },
}

fn invalid(info: &ElementInfo, token: impl Into<String>) -> ValueParseError {
    ValueParseError::Invalid {
        kind: info.kind,
        token: token.into(),
    }
}

/// Parse a text expression on top of `baseline`.
pub fn parse_expression(
    expr: &str,
    info: &ElementInfo,
    baseline: &[Scalar],
) -> Result<ControlValue, ValueParseError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(ValueParseError::Empty);
    }

    let mut value = fit_to_count(info, baseline);
    let tokens: Vec<&str> = expr.split(',').map(str::trim).collect();

    if let [token] = tokens.as_slice() {
        for slot in value.iter_mut() {
            *slot = parse_token(token, info, slot)?;
        }
    } else {
        for (slot, token) in value.iter_mut().zip(&tokens) {
            if token.is_empty() {
                continue;
            }
            *slot = parse_token(token, info, slot)?;
        }
    }

    Ok(value)
}

/// Overlay JSON values on `baseline`; only the overlap with the element
/// count is applied.
pub fn apply_json(
    values: &[Value],
    info: &ElementInfo,
    baseline: &[Scalar],
) -> Result<ControlValue, ValueParseError> {
    let mut value = fit_to_count(info, baseline);
    for (slot, json) in value.iter_mut().zip(values) {
        *slot = from_json(json, info, slot)?;
    }
    Ok(value)
}

fn from_json(json: &Value, info: &ElementInfo, current: &Scalar) -> Result<Scalar, ValueParseError> {
    match (info.kind, json) {
        (_, Value::String(token)) => parse_token(token, info, current),
        (ElementType::Boolean, Value::Bool(b)) => Ok(Scalar::Bool(*b)),
        (ElementType::Boolean, Value::Number(n)) => n
            .as_i64()
            .map(|v| Scalar::Bool(v != 0))
            .ok_or_else(|| invalid(info, n.to_string())),
        (ElementType::Integer | ElementType::Integer64, Value::Number(n)) => n
            .as_i64()
            .map(|v| Scalar::Int(info.clamp(v)))
            .ok_or_else(|| invalid(info, n.to_string())),
        (ElementType::Enumerated, Value::Number(n)) => match n.as_i64() {
            Some(idx) => enum_index(info, idx, &n.to_string()),
            None => Err(invalid(info, n.to_string())),
        },
        (ElementType::Bytes, Value::Number(n)) => n
            .as_u64()
            .filter(|v| *v <= u64::from(u8::MAX))
            .map(|v| Scalar::Int(v as i64))
            .ok_or_else(|| invalid(info, n.to_string())),
        (ElementType::Iec958, Value::Object(_)) => serde_json::from_value::<Iec958Status>(json.clone())
            .map(Scalar::Iec958)
            .map_err(|_| invalid(info, json.to_string())),
        (ElementType::None, _) => Err(ValueParseError::Unsupported { kind: info.kind }),
        (_, other) => Err(invalid(info, other.to_string())),
    }
}

fn parse_token(token: &str, info: &ElementInfo, current: &Scalar) -> Result<Scalar, ValueParseError> {
    match info.kind {
        ElementType::Boolean => parse_bool(token, current)
            .map(Scalar::Bool)
            .ok_or_else(|| invalid(info, token)),
        ElementType::Integer | ElementType::Integer64 => parse_integer(token, info)
            .map(Scalar::Int)
            .ok_or_else(|| invalid(info, token)),
        ElementType::Enumerated => parse_item(token, info),
        ElementType::Bytes => parse_number(token)
            .filter(|v| (0..=i64::from(u8::MAX)).contains(v))
            .map(Scalar::Int)
            .ok_or_else(|| invalid(info, token)),
        ElementType::Iec958 | ElementType::None => {
            Err(ValueParseError::Unsupported { kind: info.kind })
        }
    }
}

fn parse_bool(token: &str, current: &Scalar) -> Option<bool> {
    match token.to_ascii_lowercase().as_str() {
        "on" | "yes" | "true" | "1" | "unmute" => Some(true),
        "off" | "no" | "false" | "0" | "mute" => Some(false),
        "toggle" => Some(!current.as_bool().unwrap_or(false)),
        _ => None,
    }
}

fn parse_number(token: &str) -> Option<i64> {
    match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => token.parse().ok(),
    }
}

fn parse_integer(token: &str, info: &ElementInfo) -> Option<i64> {
    if let Some(pct) = token.strip_suffix('%') {
        let pct: f64 = pct.trim().parse().ok()?;
        let Bounds::Integer { min, max, .. } = info.bounds else {
            return None;
        };
        let span = max as f64 - min as f64;
        let raw = min as f64 + span * pct / 100.0;
        return Some(info.clamp(raw.round() as i64));
    }
    parse_number(token).map(|v| info.clamp(v))
}

fn parse_item(token: &str, info: &ElementInfo) -> Result<Scalar, ValueParseError> {
    if let Bounds::Enumerated(items) = &info.bounds {
        if let Some(idx) = items.iter().position(|item| item.eq_ignore_ascii_case(token)) {
            return Ok(Scalar::Int(idx as i64));
        }
    }
    match token.parse::<i64>() {
        Ok(idx) => enum_index(info, idx, token),
        Err(_) => Err(ValueParseError::UnknownItem {
            token: token.to_string(),
        }),
    }
}

fn enum_index(info: &ElementInfo, idx: i64, token: &str) -> Result<Scalar, ValueParseError> {
    let items = match &info.bounds {
        Bounds::Enumerated(items) => items.len() as i64,
        _ => 0,
    };
    if (0..items).contains(&idx) {
        Ok(Scalar::Int(idx))
    } else {
        Err(ValueParseError::UnknownItem {
            token: token.to_string(),
        })
    }
}
