//! Control write-back.
//!
//! Every write reads the element's current value first and overlays the
//! caller's input on it. `set_many` stops at the first entry that fails;
//! session load uses the same per-entry step but keeps going.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{BackendError, ControlBackend, DeviceHandle};
use crate::codec::{self, ControlDoc, Tier};
use crate::element::ElementInfo;
use crate::error::EngineError;
use crate::gateway::Gateway;
use crate::value::{apply_json, parse_expression};

/// Input for one entry.
#[derive(Debug, Clone, Copy)]
pub(crate) enum EntryInput<'a> {
    Expr(&'a str),
    Json(&'a [Value]),
}

/// Resolve, check, read baseline, parse, write.
pub(crate) fn apply_entry<H: DeviceHandle>(
    handle: &H,
    numid: u32,
    input: EntryInput<'_>,
) -> Result<ElementInfo, EngineError> {
    let info = handle.info(numid).map_err(|err| match err {
        BackendError::NoElement(_) => EngineError::Fail(err.to_string()),
        other => EngineError::Fatal(format!("element info failed for numid={numid}: {other}")),
    })?;

    if !info.access.writable {
        return Err(EngineError::ReadOnly { numid });
    }

    let baseline = if info.access.readable {
        handle.read(&info).map_err(|err| {
            EngineError::Fatal(format!("baseline read failed for numid={numid}: {err}"))
        })?
    } else {
        Vec::new()
    };

    let value = match input {
        EntryInput::Expr(expr) => parse_expression(expr, &info, &baseline)?,
        EntryInput::Json(values) => apply_json(values, &info, &baseline)?,
    };

    handle
        .write(&info, &value)
        .map_err(|err| EngineError::Fatal(format!("write failed for numid={numid}: {err}")))?;

    debug!(numid, name = %info.name, "control written");
    Ok(info)
}

/// Result of a single write.
#[derive(Debug, Clone, PartialEq)]
pub enum SetOutcome {
    /// Written; tiers above 0 get only this acknowledgement.
    Done { numid: u32 },
    /// Written and re-read at tier 0.
    Echo(ControlDoc),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub written: Vec<u32>,
    /// Read-only entries passed over.
    pub skipped: Vec<u32>,
}

impl<B: ControlBackend> Gateway<B> {
    /// Write one control from a text expression.
    pub fn set_one(
        &self,
        device_id: &str,
        numid: u32,
        expr: &str,
        tier: Tier,
    ) -> Result<SetOutcome, EngineError> {
        let handle = self.open(device_id)?;
        let info = apply_entry(&handle, numid, EntryInput::Expr(expr))?;

        if tier.is_full() {
            Ok(SetOutcome::Echo(codec::encode(&handle, &info, tier)))
        } else {
            Ok(SetOutcome::Done { numid })
        }
    }

    /// Write several controls through one handle.
    ///
    /// Read-only entries are skipped. Any other failure aborts the batch and
    /// names the entry that stopped it; entries before it stay written.
    pub fn set_many(
        &self,
        device_id: &str,
        numids: &[u32],
        values: &[Vec<Value>],
    ) -> Result<BatchSummary, EngineError> {
        if numids.len() != values.len() {
            return Err(EngineError::Fail(format!(
                "{} numids but {} value arrays",
                numids.len(),
                values.len()
            )));
        }

        let handle = self.open(device_id)?;
        let mut summary = BatchSummary::default();

        for (&numid, entry) in numids.iter().zip(values) {
            match apply_entry(&handle, numid, EntryInput::Json(entry)) {
                Ok(_) => summary.written.push(numid),
                Err(EngineError::ReadOnly { .. }) => {
                    warn!(numid, "skipping read-only control");
                    summary.skipped.push(numid);
                }
                Err(err) => return Err(EngineError::entry(numid, err)),
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::element::{Access, CardInfo, ElementType, Scalar};
    use crate::envelope::Status;
    use serde_json::json;

    fn gateway() -> Gateway<MemoryBackend> {
        let backend = MemoryBackend::new();
        backend.add_card(
            "hw:0",
            CardInfo {
                id: "Desk".into(),
                name: "Desk Mixer".into(),
                ..CardInfo::default()
            },
        );
        let elements = [
            (
                ElementInfo::new(5, "Line Volume", ElementType::Integer, 2).with_range(0, 100, 1),
                vec![Scalar::Int(10), Scalar::Int(20)],
            ),
            (
                ElementInfo::new(6, "Line Switch", ElementType::Boolean, 1),
                vec![Scalar::Bool(false)],
            ),
            (
                ElementInfo::new(7, "Clock Rate", ElementType::Integer, 1)
                    .with_range(0, 192000, 1)
                    .with_access(Access::read_only()),
                vec![Scalar::Int(48000)],
            ),
        ];
        for (info, value) in elements {
            backend.add_element("hw:0", info, value, None).unwrap();
        }
        Gateway::with_session_dir(backend, "/tmp/unused")
    }

    #[test]
    fn test_set_one_ack_and_echo() {
        let gw = gateway();
        assert_eq!(
            gw.set_one("hw:0", 5, "40", Tier::TERSE).unwrap(),
            SetOutcome::Done { numid: 5 }
        );
        assert_eq!(
            gw.backend().value("hw:0", 5).unwrap(),
            vec![Scalar::Int(40), Scalar::Int(40)]
        );

        let SetOutcome::Echo(doc) = gw.set_one("hw:0", 5, "1,2", Tier::FULL).unwrap() else {
            panic!("tier 0 echoes the document");
        };
        assert_eq!(doc.name.as_deref(), Some("Line Volume"));
        assert_eq!(doc.values(), Some(&vec![Scalar::Int(1), Scalar::Int(2)]));
        assert_eq!(gw.backend().open_handles(), 0);
    }

    #[test]
    fn test_set_one_errors() {
        let gw = gateway();

        let err = gw.set_one("hw:0", 7, "44100", Tier::TERSE).unwrap_err();
        assert!(matches!(err, EngineError::ReadOnly { numid: 7 }));

        let err = gw.set_one("hw:0", 99, "1", Tier::TERSE).unwrap_err();
        assert_eq!(err.status(), Status::Fail);

        let err = gw.set_one("hw:0", 6, "sideways", Tier::TERSE).unwrap_err();
        assert_eq!(err.status(), Status::Fail);

        let err = gw.set_one("hw:4", 6, "on", Tier::TERSE).unwrap_err();
        assert_eq!(err.status(), Status::Empty);

        assert!(gw.backend().writes().is_empty());
        assert_eq!(gw.backend().open_handles(), 0);
    }

    #[test]
    fn test_write_failure_is_fatal() {
        let gw = gateway();
        gw.backend().fail_write("hw:0", 6);
        let err = gw.set_one("hw:0", 6, "on", Tier::TERSE).unwrap_err();
        assert_eq!(err.status(), Status::Fatal);
    }

    #[test]
    fn test_set_many_short_array_keeps_tail() {
        let gw = gateway();
        let summary = gw
            .set_many("hw:0", &[5, 6], &[vec![json!(77)], vec![json!(true)]])
            .unwrap();
        assert_eq!(summary.written, [5, 6]);
        assert_eq!(
            gw.backend().value("hw:0", 5).unwrap(),
            vec![Scalar::Int(77), Scalar::Int(20)]
        );
        assert_eq!(
            gw.backend().value("hw:0", 6).unwrap(),
            vec![Scalar::Bool(true)]
        );
    }

    #[test]
    fn test_set_many_aborts_at_first_failure() {
        let gw = gateway();
        let err = gw
            .set_many(
                "hw:0",
                &[5, 99, 6],
                &[vec![json!(1)], vec![json!(1)], vec![json!(true)]],
            )
            .unwrap_err();

        assert_eq!(err.failed_numid(), Some(99));
        assert_eq!(err.status(), Status::Fail);

        let written: Vec<u32> = gw.backend().writes().iter().map(|w| w.numid).collect();
        assert_eq!(written, [5]);
        assert_eq!(
            gw.backend().value("hw:0", 6).unwrap(),
            vec![Scalar::Bool(false)]
        );
        assert_eq!(gw.backend().open_handles(), 0);
    }

    #[test]
    fn test_set_many_skips_read_only() {
        let gw = gateway();
        let summary = gw
            .set_many("hw:0", &[7, 6], &[vec![json!(44100)], vec![json!("on")]])
            .unwrap();
        assert_eq!(summary.skipped, [7]);
        assert_eq!(summary.written, [6]);
    }

    #[test]
    fn test_set_many_length_mismatch() {
        let gw = gateway();
        let err = gw.set_many("hw:0", &[5, 6], &[vec![json!(1)]]).unwrap_err();
        assert_eq!(err.status(), Status::Fail);
        assert!(gw.backend().writes().is_empty());
    }
}
