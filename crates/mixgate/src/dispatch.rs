//! Command dispatch.
//!
//! A transport hands the gateway a [`Request`] and gets a [`Response`]
//! envelope back. Command names resolve through a table built once per
//! process and never mutated.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::backend::ControlBackend;
use crate::codec::Tier;
use crate::envelope::{
    Response, Status, TYPE_CARD, TYPE_CARD_LIST, TYPE_CONTROLS, TYPE_MESSAGE, TYPE_PING,
    TYPE_SESSION, TYPE_SESSION_INFO, TYPE_SESSION_LIST,
};
use crate::error::EngineError;
use crate::gateway::Gateway;
use crate::session::DEFAULT_SESSION;
use crate::write::SetOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Ping,
    GetCards,
    GetCard,
    GetControls,
    SetOne,
    SetMany,
    SessionStore,
    SessionLoad,
    SessionList,
}

const ALL_COMMANDS: [Command; 9] = [
    Command::Ping,
    Command::GetCards,
    Command::GetCard,
    Command::GetControls,
    Command::SetOne,
    Command::SetMany,
    Command::SessionStore,
    Command::SessionLoad,
    Command::SessionList,
];

static COMMANDS: LazyLock<HashMap<&'static str, Command>> =
    LazyLock::new(|| ALL_COMMANDS.iter().map(|cmd| (cmd.name(), *cmd)).collect());

impl Command {
    pub fn lookup(name: &str) -> Option<Command> {
        COMMANDS.get(name).copied()
    }

    pub fn all() -> &'static [Command] {
        &ALL_COMMANDS
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::GetCards => "get-cards",
            Self::GetCard => "get-card",
            Self::GetControls => "get-controls",
            Self::SetOne => "set-one",
            Self::SetMany => "set-many",
            Self::SessionStore => "session-store",
            Self::SessionLoad => "session-load",
            Self::SessionList => "session-list",
        }
    }

    /// Envelope type tag for this command's responses.
    pub fn response_type(&self) -> &'static str {
        match self {
            Self::Ping => TYPE_PING,
            Self::GetCards => TYPE_CARD_LIST,
            Self::GetCard => TYPE_CARD,
            Self::GetControls | Self::SetOne | Self::SetMany => TYPE_CONTROLS,
            Self::SessionStore | Self::SessionLoad => TYPE_SESSION,
            Self::SessionList => TYPE_SESSION_LIST,
        }
    }
}

/// Control selector: a numid or the keyword `all`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumidSel {
    Id(u32),
    Keyword(String),
}

impl NumidSel {
    fn filter(&self) -> Result<Option<u32>, EngineError> {
        match self {
            Self::Id(numid) => Ok(Some(*numid)),
            Self::Keyword(word) if word.eq_ignore_ascii_case("all") => Ok(None),
            Self::Keyword(word) => word
                .parse()
                .map(Some)
                .map_err(|_| EngineError::Fail(format!("invalid numid '{word}'"))),
        }
    }
}

/// Decoded inputs from the transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Request {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numid: Option<NumidSel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub numids: Vec<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
}

impl Request {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            ..Self::default()
        }
    }
}

fn to_data<T: Serialize>(value: &T) -> Result<Value, EngineError> {
    serde_json::to_value(value)
        .map_err(|e| EngineError::Fatal(format!("cannot serialize response: {e}")))
}

impl<B: ControlBackend> Gateway<B> {
    /// Run one request and wrap the outcome in an envelope.
    pub fn handle(&self, request: Request) -> Response {
        let Some(command) = Command::lookup(&request.command) else {
            return Response::message(
                TYPE_MESSAGE,
                Status::Fail,
                format!("unknown command '{}'", request.command),
            );
        };

        let kind = command.response_type();
        match self.run(command, &request) {
            Ok(response) => response,
            Err(err) => Response::from_error(kind, &err),
        }
    }

    fn run(&self, command: Command, req: &Request) -> Result<Response, EngineError> {
        let kind = command.response_type();
        let device = self.device_or_default(req.device.as_deref());
        let tier = self.tier_or_default(req.tier);
        let session = req.session.as_deref().unwrap_or(DEFAULT_SESSION);

        let response = match command {
            Command::Ping => Response::success(kind, json!({ "ping": self.ping() })),
            Command::GetCards => Response::success(kind, to_data(&self.list_devices(tier)?)?),
            Command::GetCard => Response::success(kind, to_data(&self.probe(device, tier)?)?),
            Command::GetControls => {
                let filter = match &req.numid {
                    Some(sel) => sel.filter()?,
                    None => None,
                };
                Response::success(kind, to_data(&self.find_controls(device, filter, tier)?)?)
            }
            Command::SetOne => {
                let numid = match req.numid.as_ref().map(NumidSel::filter).transpose()? {
                    Some(Some(numid)) => numid,
                    _ => return Err(EngineError::Fail("set-one needs a single numid".into())),
                };
                let expr = req
                    .value
                    .as_deref()
                    .ok_or_else(|| EngineError::Fail("set-one needs a value".into()))?;
                match self.set_one(device, numid, expr, tier)? {
                    SetOutcome::Echo(doc) => Response::success(kind, doc.to_json()),
                    SetOutcome::Done { numid } => {
                        Response::message(kind, Status::Success, format!("numid={numid} updated"))
                    }
                }
            }
            Command::SetMany => {
                let summary = self.set_many(device, &req.numids, &req.values)?;
                Response::success(kind, to_data(&summary)?)
            }
            Command::SessionStore => {
                let entry = self.session_store(device, session, req.info.clone())?;
                Response::message(
                    kind,
                    Status::Success,
                    format!("session '{}' stored at {}", entry.name, entry.timestamp),
                )
            }
            Command::SessionLoad => {
                let report = self.session_load(device, session)?;
                match tier.level() {
                    0 => Response::success(kind, to_data(&report.doc)?),
                    1 => match report.doc.info {
                        Some(info) => Response::success(TYPE_SESSION_INFO, info),
                        None => Response::message(
                            kind,
                            Status::Warning,
                            format!("session '{}' has no info block", report.session),
                        ),
                    },
                    _ => Response::message(
                        kind,
                        if report.summary.failed > 0 {
                            Status::Warning
                        } else {
                            Status::Success
                        },
                        format!(
                            "session '{}' applied: {} applied, {} skipped, {} failed",
                            report.session,
                            report.summary.applied,
                            report.summary.skipped,
                            report.summary.failed
                        ),
                    ),
                }
            }
            Command::SessionList => Response::success(kind, to_data(&self.session_list(device)?)?),
        };

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::element::{CardInfo, ElementInfo, ElementType, Scalar};
    use tempfile::TempDir;

    fn gateway(dir: &TempDir) -> Gateway<MemoryBackend> {
        let backend = MemoryBackend::new();
        backend.add_card(
            "hw:0",
            CardInfo {
                id: "Desk".into(),
                name: "Desk Mixer".into(),
                ..CardInfo::default()
            },
        );
        backend
            .add_element(
                "hw:0",
                ElementInfo::new(2, "Main Volume", ElementType::Integer, 1).with_range(0, 100, 1),
                vec![Scalar::Int(50)],
                None,
            )
            .unwrap();
        Gateway::with_session_dir(backend, dir.path())
    }

    #[test]
    fn test_every_command_resolves() {
        for cmd in Command::all() {
            assert_eq!(Command::lookup(cmd.name()), Some(*cmd));
        }
        assert_eq!(Command::lookup("reboot"), None);
    }

    #[test]
    fn test_unknown_command() {
        let dir = TempDir::new().unwrap();
        let resp = gateway(&dir).handle(Request::new("reboot"));
        assert_eq!(resp.status, Status::Fail);
        assert_eq!(resp.kind, TYPE_MESSAGE);
    }

    #[test]
    fn test_ping_counter() {
        let dir = TempDir::new().unwrap();
        let gw = gateway(&dir);
        gw.handle(Request::new("ping"));
        let resp = gw.handle(Request::new("ping"));
        assert_eq!(resp.data, Some(json!({"ping": 2})));
    }

    #[test]
    fn test_request_parses_all_keyword() {
        let req: Request = serde_json::from_value(json!({
            "command": "get-controls", "device": "hw:0", "numid": "all", "tier": 3
        }))
        .unwrap();
        assert_eq!(req.numid, Some(NumidSel::Keyword("all".into())));

        let dir = TempDir::new().unwrap();
        let resp = gateway(&dir).handle(req);
        assert_eq!(resp.status, Status::Success);
        assert_eq!(
            resp.data,
            Some(json!({"controls": [{"numid": 2, "value": [50]}]}))
        );
    }

    #[test]
    fn test_set_one_envelopes() {
        let dir = TempDir::new().unwrap();
        let gw = gateway(&dir);

        let mut req = Request::new("set-one");
        req.numid = Some(NumidSel::Id(2));
        req.value = Some("75".into());
        req.tier = Some(1);
        let resp = gw.handle(req.clone());
        assert_eq!(resp.status, Status::Success);
        assert!(resp.data.is_none());

        req.numid = Some(NumidSel::Keyword("all".into()));
        let resp = gw.handle(req);
        assert_eq!(resp.status, Status::Fail);
        assert_eq!(resp.kind, TYPE_CONTROLS);
    }

    #[test]
    fn test_session_load_tiers() {
        let dir = TempDir::new().unwrap();
        let gw = gateway(&dir);

        let mut store = Request::new("session-store");
        store.session = Some("desk".into());
        assert_eq!(gw.handle(store).status, Status::Success);

        let mut load = Request::new("session-load");
        load.session = Some("desk".into());

        load.tier = Some(0);
        let full = gw.handle(load.clone());
        assert_eq!(full.data.unwrap()["type"], "session");

        load.tier = Some(1);
        assert_eq!(gw.handle(load.clone()).status, Status::Warning);

        load.tier = Some(2);
        let terse = gw.handle(load.clone());
        assert_eq!(terse.status, Status::Success);
        assert!(terse.info.unwrap().contains("1 applied"));

        gw.backend().fail_write("hw:0", 2);
        let partial = gw.handle(load);
        assert_eq!(partial.status, Status::Warning);
        assert!(partial.info.unwrap().contains("0 applied, 0 skipped, 1 failed"));
    }

    #[test]
    fn test_session_load_tier_one_returns_info() {
        let dir = TempDir::new().unwrap();
        let gw = gateway(&dir);

        let mut store = Request::new("session-store");
        store.session = Some("desk".into());
        store.info = Some(json!({"type": "session_info", "venue": "hall"}));
        gw.handle(store);

        let mut load = Request::new("session-load");
        load.session = Some("desk".into());
        load.tier = Some(1);
        let resp = gw.handle(load);
        assert_eq!(resp.kind, TYPE_SESSION_INFO);
        assert_eq!(resp.data.unwrap()["venue"], "hall");
    }

    #[test]
    fn test_missing_device_is_empty_envelope() {
        let dir = TempDir::new().unwrap();
        let mut req = Request::new("get-card");
        req.device = Some("hw:9".into());
        let resp = gateway(&dir).handle(req);
        assert_eq!(resp.status, Status::Empty);
        assert_eq!(resp.kind, TYPE_CARD);
    }
}
