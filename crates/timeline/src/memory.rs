use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::bridge::{AppInfo, AssetRef, BridgeError, ContainerEntry, ContainerRef, LaneRef, TimelineBridge};
use crate::snapshot::RawSnapshot;
use crate::{Clip, ClipSpan, Fps, Lane, LaneKind, Seconds, Sequence};

/// How the in-memory host answers `create_lane`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneCreation {
    Works,
    Unsupported,
    /// Reports success without adding anything; some hosts behave like this.
    SilentNoop,
}

struct MemoryState {
    app_name: String,
    project_name: Option<String>,
    sequence: Option<Sequence>,
    playhead: Value,
    in_point: Value,
    out_point: Value,
    project_root: Option<PathBuf>,
    bins: Vec<(ContainerRef, Vec<ContainerEntry>)>,
    lane_creation: LaneCreation,
    clip_duration: Seconds,
    offline: bool,
    reject_inserts: bool,
    push_events: bool,
    subscribers: Vec<Sender<()>>,
    imported: Vec<AssetRef>,
    snapshot_calls: usize,
    next_id: u64,
}

/// Headless timeline host. Clones share state, so a test can keep one clone
/// for inspection while another sits behind a `BridgeHandle`.
#[derive(Clone)]
pub struct MemoryTimeline {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryTimeline {
    pub fn new(audio_lanes: usize) -> Self {
        let mut seq = Sequence::new("Sequence 01", Fps::new(30, 1));
        seq.add_lane(Lane::new("V1", LaneKind::Video));
        for i in 0..audio_lanes {
            seq.add_lane(Lane::new(format!("A{}", i + 1), LaneKind::Audio));
        }
        let state = MemoryState {
            app_name: "Memory Host".into(),
            project_name: Some("Untitled".into()),
            sequence: Some(seq),
            playhead: json!(0.0),
            in_point: Value::Null,
            out_point: Value::Null,
            project_root: None,
            bins: Vec::new(),
            lane_creation: LaneCreation::Works,
            clip_duration: 5.0,
            offline: false,
            reject_inserts: false,
            push_events: true,
            subscribers: Vec::new(),
            imported: Vec::new(),
            snapshot_calls: 0,
            next_id: 1,
        };
        Self { inner: Arc::new(Mutex::new(state)) }
    }

    pub fn without_sequence() -> Self {
        let t = Self::new(0);
        t.inner.lock().sequence = None;
        t
    }

    pub fn add_clip(&self, lane: usize, start: Seconds, duration: Seconds) {
        let mut st = self.inner.lock();
        if let Some(seq) = st.sequence.as_mut() {
            if let Some(l) = seq.lanes_of_mut(LaneKind::Audio).nth(lane) {
                l.clips.push(Clip::new("existing", start, duration));
            }
        }
    }

    pub fn clips_on(&self, lane: usize) -> Vec<ClipSpan> {
        let st = self.inner.lock();
        st.sequence
            .as_ref()
            .and_then(|s| s.lanes_of(LaneKind::Audio).nth(lane).map(|l| l.spans()))
            .unwrap_or_default()
    }

    pub fn clip_sources_on(&self, lane: usize) -> Vec<String> {
        let st = self.inner.lock();
        st.sequence
            .as_ref()
            .and_then(|s| s.lanes_of(LaneKind::Audio).nth(lane).map(|l| l.clips.iter().map(|c| c.src.clone()).collect()))
            .unwrap_or_default()
    }

    pub fn audio_lane_count(&self) -> usize {
        self.inner.lock().sequence.as_ref().map(|s| s.lane_count(LaneKind::Audio)).unwrap_or(0)
    }

    pub fn set_playhead(&self, seconds: Seconds) { self.inner.lock().playhead = json!(seconds); }

    pub fn set_in_out(&self, in_point: Option<Seconds>, out_point: Option<Seconds>) {
        let to_value = |v: Option<Seconds>| v.map(|s| json!(s)).unwrap_or(Value::Null);
        self.set_raw_points(to_value(in_point), to_value(out_point));
    }

    /// Store in/out exactly as given, to mimic a host that returns strings or junk.
    pub fn set_raw_points(&self, in_point: Value, out_point: Value) {
        let mut st = self.inner.lock();
        st.in_point = in_point;
        st.out_point = out_point;
        notify(&mut st);
    }

    pub fn set_project_root(&self, root: Option<PathBuf>) { self.inner.lock().project_root = root; }

    pub fn set_lane_creation(&self, mode: LaneCreation) { self.inner.lock().lane_creation = mode; }

    pub fn set_clip_duration(&self, seconds: Seconds) { self.inner.lock().clip_duration = seconds; }

    pub fn set_offline(&self, offline: bool) { self.inner.lock().offline = offline; }

    pub fn set_reject_inserts(&self, reject: bool) { self.inner.lock().reject_inserts = reject; }

    pub fn set_push_events(&self, enabled: bool) { self.inner.lock().push_events = enabled; }

    /// Put a media item into the bin at `bin_path`, creating intermediate bins.
    pub fn add_bin_item(&self, bin_path: &str, name: &str, media_path: Option<PathBuf>, is_audio: bool) {
        let mut st = self.inner.lock();
        let idx = ensure_bin(&mut st, bin_path);
        st.bins[idx].1.push(ContainerEntry::Item { name: name.to_string(), media_path, is_audio });
    }

    pub fn imported(&self) -> Vec<AssetRef> { self.inner.lock().imported.clone() }

    pub fn snapshot_calls(&self) -> usize { self.inner.lock().snapshot_calls }
}

fn notify(st: &mut MemoryState) {
    st.subscribers.retain(|tx| tx.send(()).is_ok());
}

fn ensure_bin(st: &mut MemoryState, bin_path: &str) -> usize {
    let mut parent: Option<usize> = None;
    let mut path = String::new();
    for part in bin_path.split('/').filter(|p| !p.is_empty()) {
        if !path.is_empty() { path.push('/'); }
        path.push_str(part);
        let idx = match st.bins.iter().position(|(c, _)| c.path == path) {
            Some(i) => i,
            None => {
                let container = ContainerRef { id: format!("bin-{}", st.next_id), path: path.clone() };
                st.next_id += 1;
                st.bins.push((container.clone(), Vec::new()));
                if let Some(p) = parent {
                    st.bins[p].1.push(ContainerEntry::Bin(container));
                }
                st.bins.len() - 1
            }
        };
        parent = Some(idx);
    }
    parent.unwrap_or_else(|| {
        // Empty path: a synthetic root bin so items still have a home.
        let container = ContainerRef { id: "bin-root".into(), path: String::new() };
        match st.bins.iter().position(|(c, _)| c.path.is_empty()) {
            Some(i) => i,
            None => {
                st.bins.push((container, Vec::new()));
                st.bins.len() - 1
            }
        }
    })
}

impl MemoryState {
    fn online(&self) -> Result<(), BridgeError> {
        if self.offline { Err(BridgeError::Unavailable("host not responding".into())) } else { Ok(()) }
    }

    fn sequence(&self) -> Result<&Sequence, BridgeError> {
        self.sequence.as_ref().ok_or_else(|| BridgeError::Rejected("no active sequence".into()))
    }

    fn sequence_mut(&mut self) -> Result<&mut Sequence, BridgeError> {
        self.sequence.as_mut().ok_or_else(|| BridgeError::Rejected("no active sequence".into()))
    }
}

impl TimelineBridge for MemoryTimeline {
    fn snapshot(&mut self) -> Result<RawSnapshot, BridgeError> {
        let mut st = self.inner.lock();
        st.snapshot_calls += 1;
        st.online()?;
        let seq = st.sequence()?;
        Ok(RawSnapshot {
            sequence_id: json!(seq.id),
            sequence_name: json!(seq.name),
            playhead: st.playhead.clone(),
            in_point: st.in_point.clone(),
            out_point: st.out_point.clone(),
            audio_track_count: json!(seq.lane_count(LaneKind::Audio)),
            video_track_count: json!(seq.lane_count(LaneKind::Video)),
        })
    }

    fn list_lanes(&mut self, kind: LaneKind) -> Result<Vec<LaneRef>, BridgeError> {
        let st = self.inner.lock();
        st.online()?;
        let seq = st.sequence()?;
        Ok(seq.lanes_of(kind).enumerate().map(|(index, l)| LaneRef { index, name: l.name.clone(), kind }).collect())
    }

    fn lane_clips(&mut self, lane: &LaneRef) -> Result<Vec<ClipSpan>, BridgeError> {
        let st = self.inner.lock();
        st.online()?;
        let seq = st.sequence()?;
        let spans = seq.lanes_of(lane.kind).nth(lane.index).map(|l| l.spans());
        spans.ok_or_else(|| BridgeError::Rejected(format!("no lane {}", lane.index)))
    }

    fn create_lane(&mut self, kind: LaneKind) -> Result<bool, BridgeError> {
        let mut st = self.inner.lock();
        st.online()?;
        match st.lane_creation {
            LaneCreation::Unsupported => Err(BridgeError::Rejected("lane creation not supported".into())),
            LaneCreation::SilentNoop => Ok(true),
            LaneCreation::Works => {
                let seq = st.sequence_mut()?;
                let prefix = if kind == LaneKind::Audio { "A" } else { "V" };
                let name = format!("{}{}", prefix, seq.lane_count(kind) + 1);
                seq.add_lane(Lane::new(name, kind));
                Ok(true)
            }
        }
    }

    fn insert_asset(&mut self, lane: &LaneRef, asset: &AssetRef, time: Seconds) -> Result<bool, BridgeError> {
        let mut st = self.inner.lock();
        st.online()?;
        if st.reject_inserts {
            return Err(BridgeError::Rejected("insert refused by host".into()));
        }
        let duration = st.clip_duration;
        let seq = st.sequence_mut()?;
        let inserted = match seq.lanes_of_mut(lane.kind).nth(lane.index) {
            Some(l) => {
                l.clips.push(Clip::new(asset.path.to_string_lossy(), time, duration));
                true
            }
            None => false,
        };
        Ok(inserted)
    }

    fn import_asset(&mut self, path: &Path, bin: Option<&str>) -> Result<AssetRef, BridgeError> {
        let mut st = self.inner.lock();
        st.online()?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| BridgeError::Rejected(format!("not a file: {}", path.display())))?;
        let idx = ensure_bin(&mut st, bin.unwrap_or(""));
        st.bins[idx].1.push(ContainerEntry::Item { name: name.clone(), media_path: Some(path.to_path_buf()), is_audio: true });
        let asset = AssetRef { id: format!("asset-{}", st.next_id), name, path: path.to_path_buf() };
        st.next_id += 1;
        st.imported.push(asset.clone());
        Ok(asset)
    }

    fn project_root(&mut self) -> Result<Option<PathBuf>, BridgeError> {
        let st = self.inner.lock();
        st.online()?;
        Ok(st.project_root.clone())
    }

    fn container_roots(&mut self) -> Result<Vec<ContainerRef>, BridgeError> {
        let st = self.inner.lock();
        st.online()?;
        Ok(st.bins.iter().map(|(c, _)| c).filter(|c| !c.path.contains('/')).cloned().collect())
    }

    fn list_container(&mut self, container: &ContainerRef) -> Result<Vec<ContainerEntry>, BridgeError> {
        let st = self.inner.lock();
        st.online()?;
        st.bins
            .iter()
            .find(|(c, _)| c.id == container.id)
            .map(|(_, entries)| entries.clone())
            .ok_or_else(|| BridgeError::Rejected(format!("unknown bin {}", container.path)))
    }

    fn app_info(&mut self) -> Result<AppInfo, BridgeError> {
        let st = self.inner.lock();
        st.online()?;
        Ok(AppInfo { app_name: st.app_name.clone(), project_name: st.project_name.clone(), has_active_sequence: st.sequence.is_some() })
    }

    fn subscribe(&mut self, events: Sender<()>) -> bool {
        let mut st = self.inner.lock();
        if !st.push_events { return false; }
        st.subscribers.push(events);
        true
    }
}
