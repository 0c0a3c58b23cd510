use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use timeline::BridgeHandle;
use tracing::{info, warn};

use crate::config::Settings;
use crate::scan::{merge_records, scan_containers, scan_filesystem, AssetRecord};
use crate::search::{next_sequence_number, search_records};

/// One complete scan result. Never mutated after construction; a rescan
/// replaces it wholesale.
#[derive(Debug)]
pub struct IndexSnapshot {
    pub records: Vec<AssetRecord>,
    pub built_at: Instant,
}

impl IndexSnapshot {
    fn is_fresh(&self, ttl: Duration) -> bool { self.built_at.elapsed() < ttl }
}

/// Cached, shared asset catalog. Readers get an `Arc` to the current
/// snapshot and never see a scan in progress.
pub struct AssetIndex {
    roots: RwLock<Vec<PathBuf>>,
    bridge: Option<BridgeHandle>,
    /// Library folder name looked up under the host's project directory.
    library_folder: Option<String>,
    ttl: Duration,
    max_items_per_dir: usize,
    search_limit: usize,
    current: RwLock<Option<Arc<IndexSnapshot>>>,
    scanning: Mutex<()>,
}

impl AssetIndex {
    pub fn new(roots: Vec<PathBuf>, bridge: Option<BridgeHandle>, ttl: Duration) -> Self {
        let defaults = Settings::default();
        Self {
            roots: RwLock::new(roots),
            bridge,
            library_folder: None,
            ttl,
            max_items_per_dir: defaults.max_items_per_dir,
            search_limit: defaults.search_limit,
            current: RwLock::new(None),
            scanning: Mutex::new(()),
        }
    }

    /// Index the configured extra roots, the fallback directory and, when a
    /// host is attached, the library folder of its saved project.
    pub fn from_settings(settings: &Settings, bridge: Option<BridgeHandle>) -> Self {
        let mut roots = settings.extra_roots.clone();
        if let Some(fallback) = &settings.fallback_dir {
            roots.push(fallback.clone());
        }
        let mut index = Self::new(roots, bridge, settings.index_ttl);
        index.library_folder = Some(settings.library_folder.clone());
        index.max_items_per_dir = settings.max_items_per_dir;
        index.search_limit = settings.search_limit;
        index
    }

    pub fn set_roots(&self, roots: Vec<PathBuf>) {
        *self.roots.write() = roots;
        self.invalidate();
    }

    /// Current snapshot, rescanning first when none exists or it has expired.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        if let Some(snap) = self.current.read().as_ref() {
            if snap.is_fresh(self.ttl) {
                return snap.clone();
            }
        }
        self.rescan()
    }

    /// Build a new snapshot and swap it in. Concurrent callers share one scan.
    pub fn rescan(&self) -> Arc<IndexSnapshot> {
        let started = Instant::now();
        let _scan = self.scanning.lock();
        if let Some(snap) = self.current.read().as_ref() {
            if snap.built_at >= started {
                return snap.clone();
            }
        }
        let records = self.build();
        let snap = Arc::new(IndexSnapshot { records, built_at: Instant::now() });
        info!(assets = snap.records.len(), elapsed_ms = started.elapsed().as_millis() as u64, "asset index rebuilt");
        *self.current.write() = Some(snap.clone());
        snap
    }

    /// Drop the cached snapshot; the next read rescans.
    pub fn invalidate(&self) { *self.current.write() = None; }

    pub fn records(&self) -> Vec<AssetRecord> { self.snapshot().records.clone() }

    pub fn search(&self, query: &str) -> Vec<AssetRecord> { search_records(&self.snapshot().records, query, self.search_limit) }

    pub fn next_sequence_number(&self, prompt: &str) -> u32 { next_sequence_number(&self.snapshot().records, prompt) }

    fn build(&self) -> Vec<AssetRecord> {
        let mut roots = self.roots.read().clone();
        if let (Some(bridge), Some(folder)) = (&self.bridge, &self.library_folder) {
            match bridge.with(|b| b.project_root()) {
                Ok(Some(project)) => roots.insert(0, project.join(folder)),
                Ok(None) => {}
                Err(e) => warn!("could not resolve project directory: {e}"),
            }
        }
        roots.dedup();

        // Disk first, without holding the bridge.
        let mut records = scan_filesystem(&roots, self.max_items_per_dir);
        if let Some(bridge) = &self.bridge {
            let cap = self.max_items_per_dir;
            let walked = bridge.with(|b| match b.container_roots() {
                Ok(bins) => scan_containers(b, &bins, cap),
                Err(e) => Err(e),
            });
            match walked {
                Ok(found) => records.extend(found),
                Err(e) => warn!("bin walk failed, index holds filesystem assets only: {e}"),
            }
        }
        merge_records(records)
    }
}

impl std::fmt::Debug for AssetIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetIndex").field("roots", &*self.roots.read()).field("ttl", &self.ttl).finish()
    }
}
