use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod bridge;
mod memory;
pub mod monitor;
pub mod placement;
mod snapshot;
mod timecode;

pub use bridge::{AppInfo, AssetRef, BridgeError, BridgeHandle, ContainerEntry, ContainerRef, LaneRef, TimelineBridge};
pub use memory::{LaneCreation, MemoryTimeline};
pub use monitor::{MonitorHandle, MonitorRuntime, PollIntervals, SharedMonitor, TimelineMonitor};
pub use placement::{PlacementMode, PlacementRequest, PlacementResult, PlacementScheduler, MAX_DURATION_SECONDS, MIN_DURATION_SECONDS};
pub use snapshot::{parse_count, parse_seconds, RawSnapshot, TimelineSnapshot};
pub use timecode::format_timecode;

/// Timeline positions are carried in seconds end to end.
pub type Seconds = f64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fps {
    pub num: u32,
    pub den: u32,
}

impl Fps {
    pub const fn new(num: u32, den: u32) -> Self { Self { num, den } }

    pub fn as_f64(&self) -> f64 {
        if self.num == 0 { return 0.0; }
        self.num as f64 / self.den.max(1) as f64
    }
}

impl Default for Fps {
    fn default() -> Self { Self::new(30, 1) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LaneKind {
    #[serde(rename = "audio")]
    Audio,
    #[serde(rename = "video")]
    Video,
}

/// Occupied interval of a clip on a lane, `[start, end]` in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipSpan {
    pub start: Seconds,
    pub end: Seconds,
}

impl ClipSpan {
    pub fn new(start: Seconds, duration: Seconds) -> Self { Self { start, end: start + duration.max(0.0) } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clip {
    pub id: String,
    pub span: ClipSpan,
    pub src: String,
}

impl Clip {
    pub fn new(src: impl Into<String>, start: Seconds, duration: Seconds) -> Self {
        Self { id: Uuid::new_v4().to_string(), span: ClipSpan::new(start, duration), src: src.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lane {
    pub name: String,
    pub kind: LaneKind,
    pub clips: Vec<Clip>,
}

impl Lane {
    pub fn new(name: impl Into<String>, kind: LaneKind) -> Self { Self { name: name.into(), kind, clips: Vec::new() } }

    pub fn spans(&self) -> Vec<ClipSpan> { self.clips.iter().map(|c| c.span).collect() }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub id: String,
    pub name: String,
    pub fps: Fps,
    pub lanes: Vec<Lane>,
}

impl Sequence {
    pub fn new(name: impl Into<String>, fps: Fps) -> Self {
        Self { id: Uuid::new_v4().to_string(), name: name.into(), fps, lanes: Vec::new() }
    }

    pub fn add_lane(&mut self, lane: Lane) { self.lanes.push(lane); }

    pub fn lanes_of(&self, kind: LaneKind) -> impl Iterator<Item = &Lane> {
        self.lanes.iter().filter(move |l| l.kind == kind)
    }

    pub fn lanes_of_mut(&mut self, kind: LaneKind) -> impl Iterator<Item = &mut Lane> {
        self.lanes.iter_mut().filter(move |l| l.kind == kind)
    }

    pub fn lane_count(&self, kind: LaneKind) -> usize { self.lanes_of(kind).count() }
}
