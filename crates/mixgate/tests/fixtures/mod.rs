use mixgate::{Gateway, MemoryBackend};
use std::path::Path;
use tempfile::TempDir;

pub const DESK: &str = "hw:0";
pub const RACK: &str = "hw:1";

pub struct TestFixture {
    pub gateway: Gateway<MemoryBackend>,
    pub session_dir: TempDir,
}

impl TestFixture {
    /// Both simulated cards from `desk.json`, sessions in a fresh temp dir.
    pub fn new() -> Self {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/desk.json");
        let backend = MemoryBackend::from_path(&path).expect("Failed to load desk.json fixture");
        let session_dir = TempDir::new().expect("Failed to create session dir");
        let gateway = Gateway::with_session_dir(backend, session_dir.path());

        Self {
            gateway,
            session_dir,
        }
    }

    pub fn backend(&self) -> &MemoryBackend {
        self.gateway.backend()
    }
}
