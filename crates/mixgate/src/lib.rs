//! mixgate: a mixer control registry as JSON.
//!
//! The engine enumerates a sound card's control elements, serializes them at
//! a chosen detail tier (decoding their TLV metadata on the way), writes
//! values back with read-before-write semantics, and stores, lists and
//! reloads named snapshots ("sessions") of a card's full control set.
//!
//! ```rust,no_run
//! use mixgate::{Gateway, MemoryBackend, Request};
//!
//! let backend = MemoryBackend::from_path("desk.json".as_ref()).unwrap();
//! let gateway = Gateway::with_session_dir(backend, "/tmp/sessions");
//!
//! let mut request = Request::new("get-controls");
//! request.device = Some("hw:0".into());
//! println!("{}", gateway.handle(request).to_json());
//! ```
//!
//! Hardware access goes through [`ControlBackend`]. The ALSA implementation
//! is behind the `alsa` cargo feature; [`MemoryBackend`] needs nothing.

pub mod backend;
pub mod codec;
pub mod dispatch;
pub mod element;
pub mod enumerate;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod session;
pub mod tlv;
pub mod value;
pub mod write;

pub use backend::{BackendError, ControlBackend, DeviceHandle, MemoryBackend};
pub use codec::{ControlDoc, Tier};
pub use dispatch::{Command, NumidSel, Request};
pub use enumerate::{ControlsReport, DeviceDescriptor};
pub use envelope::{Response, Status};
pub use error::EngineError;
pub use gateway::Gateway;
pub use session::{LoadReport, LoadSummary, SessionEntry, SessionStore};
pub use write::{BatchSummary, SetOutcome};

#[cfg(feature = "alsa")]
pub use backend::AlsaBackend;
