use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::snapshot::RawSnapshot;
use crate::{ClipSpan, LaneKind, Seconds};

#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    #[error("host bridge unavailable: {0}")]
    Unavailable(String),
    #[error("host rejected call: {0}")]
    Rejected(String),
    #[error("malformed host response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneRef {
    pub index: usize,
    pub name: String,
    pub kind: LaneKind,
}

/// Host-side handle of an imported media item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
}

/// A bin (folder) inside the host project. `path` is the slash-joined bin
/// names from the project root, e.g. `AI SFX/explosions`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerRef {
    pub id: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContainerEntry {
    Bin(ContainerRef),
    Item { name: String, media_path: Option<PathBuf>, is_audio: bool },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppInfo {
    pub app_name: String,
    pub project_name: Option<String>,
    pub has_active_sequence: bool,
}

/// Narrow interface onto the host editing application. Every call may fail
/// independently; none of them is retried here.
pub trait TimelineBridge: Send {
    fn snapshot(&mut self) -> Result<RawSnapshot, BridgeError>;

    fn list_lanes(&mut self, kind: LaneKind) -> Result<Vec<LaneRef>, BridgeError>;

    fn lane_clips(&mut self, lane: &LaneRef) -> Result<Vec<ClipSpan>, BridgeError>;

    /// Ask the host to append a lane. `Ok(true)` only means the host claimed success.
    fn create_lane(&mut self, kind: LaneKind) -> Result<bool, BridgeError>;

    fn insert_asset(&mut self, lane: &LaneRef, asset: &AssetRef, time: Seconds) -> Result<bool, BridgeError>;

    fn import_asset(&mut self, path: &Path, bin: Option<&str>) -> Result<AssetRef, BridgeError>;

    /// Directory of the saved project file; `None` while the project is unsaved.
    fn project_root(&mut self) -> Result<Option<PathBuf>, BridgeError>;

    fn container_roots(&mut self) -> Result<Vec<ContainerRef>, BridgeError>;

    fn list_container(&mut self, container: &ContainerRef) -> Result<Vec<ContainerEntry>, BridgeError>;

    fn app_info(&mut self) -> Result<AppInfo, BridgeError>;

    /// Register for host-pushed change notifications. Returns false when the
    /// host cannot push, in which case callers rely on polling alone.
    fn subscribe(&mut self, _events: Sender<()>) -> bool { false }
}

/// Shared, serialized access to the bridge. The host executes one script call
/// at a time, so every caller goes through this one lock.
#[derive(Clone)]
pub struct BridgeHandle {
    inner: Arc<Mutex<Box<dyn TimelineBridge>>>,
}

impl BridgeHandle {
    pub fn new(bridge: impl TimelineBridge + 'static) -> Self {
        Self { inner: Arc::new(Mutex::new(Box::new(bridge))) }
    }

    /// Run `f` with exclusive bridge access. Multi-call sequences that must
    /// not interleave with other callers belong in a single `with`.
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn TimelineBridge) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut **guard)
    }

    /// Like [`with`](Self::with) but gives up after `timeout` instead of
    /// queueing behind a long placement.
    pub fn try_with<R>(&self, timeout: Duration, f: impl FnOnce(&mut dyn TimelineBridge) -> R) -> Option<R> {
        let mut guard = self.inner.try_lock_for(timeout)?;
        Some(f(&mut **guard))
    }
}

impl std::fmt::Debug for BridgeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str("BridgeHandle") }
}
