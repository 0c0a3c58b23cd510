use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use timeline::{BridgeError, ContainerEntry, ContainerRef, TimelineBridge};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::naming::parse_asset_name;

pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "aif", "aiff", "flac", "ogg", "m4a", "aac"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Filesystem,
    Container,
}

/// One known audio file. `filename` is unique across a merged index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub filename: String,
    pub basename: String,
    pub sequence_number: u32,
    pub prompt_text: String,
    pub timestamp_token: Option<String>,
    pub source_kind: SourceKind,
    pub resolved_path: Option<PathBuf>,
    /// Slash-joined bin path for container-sourced records.
    pub container_path: Option<String>,
}

impl AssetRecord {
    pub fn from_filename(filename: &str, source_kind: SourceKind, resolved_path: Option<PathBuf>, container_path: Option<String>) -> Self {
        let basename = Path::new(filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string());
        let parsed = parse_asset_name(&basename);
        Self {
            filename: filename.to_string(),
            basename,
            sequence_number: parsed.sequence_number,
            prompt_text: parsed.prompt_text,
            timestamp_token: parsed.timestamp_token,
            source_kind,
            resolved_path,
            container_path,
        }
    }
}

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Walk each root recursively for audio files. At most `cap` files are taken
/// from any single directory.
pub fn scan_filesystem(roots: &[PathBuf], cap: usize) -> Vec<AssetRecord> {
    let mut out = Vec::new();
    let mut per_dir: HashMap<PathBuf, usize> = HashMap::new();
    for root in roots {
        if !root.is_dir() {
            debug!(root = %root.display(), "skipping missing index root");
            continue;
        }
        let walker = WalkDir::new(root).follow_links(false).sort_by_file_name().into_iter();
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() || !is_audio_file(entry.path()) { continue; }
            let dir = entry.path().parent().map(Path::to_path_buf).unwrap_or_default();
            let count = per_dir.entry(dir).or_insert(0);
            if *count >= cap { continue; }
            *count += 1;
            let filename = entry.file_name().to_string_lossy().into_owned();
            out.push(AssetRecord::from_filename(&filename, SourceKind::Filesystem, Some(entry.path().to_path_buf()), None));
        }
    }
    for (dir, count) in per_dir.iter().filter(|(_, c)| **c >= cap) {
        warn!(dir = %dir.display(), count, "directory item cap reached, remaining files not indexed");
    }
    out
}

/// Walk the host's bin hierarchy for audio items. An unreachable host fails
/// the whole walk; a single unreadable bin is skipped.
pub fn scan_containers(bridge: &mut dyn TimelineBridge, roots: &[ContainerRef], cap: usize) -> Result<Vec<AssetRecord>, BridgeError> {
    let mut out = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut pending: Vec<ContainerRef> = roots.iter().rev().cloned().collect();
    while let Some(bin) = pending.pop() {
        if !visited.insert(bin.id.clone()) { continue; }
        let entries = match bridge.list_container(&bin) {
            Ok(entries) => entries,
            Err(e @ BridgeError::Unavailable(_)) => return Err(e),
            Err(e) => {
                warn!(bin = %bin.path, "skipping unreadable bin: {e}");
                continue;
            }
        };
        let mut taken = 0usize;
        let mut children = Vec::new();
        for entry in entries {
            match entry {
                ContainerEntry::Bin(child) => children.push(child),
                ContainerEntry::Item { name, media_path, is_audio } => {
                    let audio = is_audio || is_audio_file(Path::new(&name));
                    if !audio || taken >= cap { continue; }
                    taken += 1;
                    let filename = media_path
                        .as_deref()
                        .and_then(|p| p.file_name())
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or(name);
                    out.push(AssetRecord::from_filename(&filename, SourceKind::Container, media_path, Some(bin.path.clone())));
                }
            }
        }
        pending.extend(children.into_iter().rev());
    }
    Ok(out)
}

/// Merge keyed by filename, keeping first-seen order. A container record
/// replaces a filesystem record in place; any other duplicate is dropped.
pub fn merge_records(records: impl IntoIterator<Item = AssetRecord>) -> Vec<AssetRecord> {
    let mut out: Vec<AssetRecord> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();
    for record in records {
        match by_name.get(&record.filename) {
            Some(&i) => {
                if out[i].source_kind == SourceKind::Filesystem && record.source_kind == SourceKind::Container {
                    out[i] = record;
                }
            }
            None => {
                by_name.insert(record.filename.clone(), out.len());
                out.push(record);
            }
        }
    }
    out
}

/// Full catalog scan: the filesystem roots plus, when a host is attached,
/// every bin under its container roots.
pub fn scan(roots: &[PathBuf], bridge: Option<&mut dyn TimelineBridge>, cap: usize) -> Vec<AssetRecord> {
    let mut records = scan_filesystem(roots, cap);
    if let Some(bridge) = bridge {
        let walked = match bridge.container_roots() {
            Ok(bins) => scan_containers(bridge, &bins, cap),
            Err(e) => Err(e),
        };
        match walked {
            Ok(found) => records.extend(found),
            Err(e) => warn!("bin walk failed, index holds filesystem assets only: {e}"),
        }
    }
    merge_records(records)
}
