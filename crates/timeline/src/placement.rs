//! Conflict-free placement of an asset onto an audio lane.
//!
//! One attempt walks `Init -> LocateLane -> (Found | CreateLane) -> Insert ->
//! {Success | Fail}`. When every lane is occupied and the host cannot add a
//! lane, the asset still lands on the last lane and the result says so.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bridge::{AssetRef, BridgeHandle, LaneRef, TimelineBridge};
use crate::{format_timecode, ClipSpan, Fps, LaneKind, Seconds};

pub const MIN_DURATION_SECONDS: Seconds = 1.0;
/// Hard ceiling of the generation API.
pub const MAX_DURATION_SECONDS: Seconds = 22.0;
pub const DEFAULT_CONFLICT_BUFFER: Seconds = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlacementMode {
    AtPlayhead,
    AtExplicitTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementRequest {
    pub target_time_seconds: Seconds,
    pub preferred_lane_index: usize,
    pub duration_seconds: Seconds,
    pub placement_mode: PlacementMode,
}

impl PlacementRequest {
    pub fn new(target_time_seconds: Seconds, preferred_lane_index: usize, duration_seconds: Seconds, placement_mode: PlacementMode) -> Self {
        let target = if target_time_seconds.is_finite() { target_time_seconds.max(0.0) } else { 0.0 };
        Self { target_time_seconds: target, preferred_lane_index, duration_seconds: clamp_duration(duration_seconds), placement_mode }
    }

    /// Same lane and duration, different instant.
    pub fn retarget(&self, time: Seconds) -> Self {
        Self::new(time, self.preferred_lane_index, self.duration_seconds, PlacementMode::AtPlayhead)
    }
}

pub fn clamp_duration(seconds: Seconds) -> Seconds {
    if seconds.is_nan() { return MIN_DURATION_SECONDS; }
    seconds.clamp(MIN_DURATION_SECONDS, MAX_DURATION_SECONDS)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlacementResult {
    pub success: bool,
    pub lane_index: Option<usize>,
    pub final_time_seconds: Option<Seconds>,
    pub created_new_lane: bool,
    pub error: Option<String>,
    /// Set when the asset was placed on a lane that may already hold material.
    pub warning: Option<String>,
    pub position_label: Option<String>,
}

impl PlacementResult {
    fn failed(error: impl Into<String>) -> Self { Self { error: Some(error.into()), ..Default::default() } }

    pub fn conflict_risk(&self) -> bool { self.success && self.warning.is_some() }
}

/// True when `time` falls inside any clip widened by `buffer` on both sides.
/// A lane with no clips never conflicts.
pub fn has_conflict(clips: &[ClipSpan], time: Seconds, buffer: Seconds) -> bool {
    clips.iter().any(|c| time >= c.start - buffer && time <= c.end + buffer)
}

/// Interval form of [`has_conflict`]: `[start, start + duration]` against every
/// widened clip. With a zero duration the two agree.
pub fn span_conflicts(clips: &[ClipSpan], start: Seconds, duration: Seconds, buffer: Seconds) -> bool {
    let end = start + duration.max(0.0);
    clips.iter().any(|c| start <= c.end + buffer && end >= c.start - buffer)
}

#[derive(Debug)]
enum Phase {
    Init,
    LocateLane,
    Found(LaneRef),
    CreateLane,
    Insert { lane: LaneRef, created: bool },
    Success { lane: LaneRef, created: bool },
    Fail(String),
}

#[derive(Debug, Clone)]
pub struct PlacementScheduler {
    kind: LaneKind,
    buffer: Seconds,
    fps: Fps,
}

impl Default for PlacementScheduler {
    fn default() -> Self { Self::new(DEFAULT_CONFLICT_BUFFER) }
}

impl PlacementScheduler {
    pub fn new(buffer: Seconds) -> Self { Self { kind: LaneKind::Audio, buffer: buffer.max(0.0), fps: Fps::default() } }

    pub fn with_fps(mut self, fps: Fps) -> Self {
        self.fps = fps;
        self
    }

    pub fn buffer(&self) -> Seconds { self.buffer }

    /// First lane at or after `start_index` that is free for the request.
    /// Lanes whose clips cannot be read are skipped, never assumed empty.
    pub fn locate_lane(&self, bridge: &mut dyn TimelineBridge, lanes: &[LaneRef], start_index: usize, time: Seconds, duration: Seconds) -> Option<LaneRef> {
        for lane in lanes.iter().skip(start_index) {
            match bridge.lane_clips(lane) {
                Ok(clips) if !span_conflicts(&clips, time, duration, self.buffer) => return Some(lane.clone()),
                Ok(_) => debug!(lane = lane.index, time, "lane occupied"),
                Err(e) => warn!(lane = lane.index, "could not read lane clips, skipping: {e}"),
            }
        }
        None
    }

    /// Run one placement attempt while holding the bridge, so no other job can
    /// claim the same free lane in between.
    pub fn place(&self, bridge: &BridgeHandle, asset: &AssetRef, request: &PlacementRequest) -> PlacementResult {
        bridge.with(|b| self.place_on(b, asset, request))
    }

    pub fn place_on(&self, bridge: &mut dyn TimelineBridge, asset: &AssetRef, request: &PlacementRequest) -> PlacementResult {
        let time = request.target_time_seconds;
        let mut lanes: Vec<LaneRef> = Vec::new();
        let mut warning: Option<String> = None;
        let mut phase = Phase::Init;
        loop {
            debug!(?phase, asset = %asset.name, "placement");
            phase = match phase {
                Phase::Init => match bridge.list_lanes(self.kind) {
                    Ok(found) => {
                        lanes = found;
                        Phase::LocateLane
                    }
                    Err(e) => Phase::Fail(format!("could not list lanes: {e}")),
                },
                Phase::LocateLane => {
                    match self.locate_lane(bridge, &lanes, request.preferred_lane_index, time, request.duration_seconds) {
                        Some(lane) => Phase::Found(lane),
                        None => Phase::CreateLane,
                    }
                }
                Phase::Found(lane) => Phase::Insert { lane, created: false },
                Phase::CreateLane => self.create_lane(bridge, &mut lanes, time, &mut warning),
                Phase::Insert { lane, created } => match bridge.insert_asset(&lane, asset, time) {
                    Ok(true) => Phase::Success { lane, created },
                    Ok(false) => Phase::Fail(format!("host refused to insert {} on lane {}", asset.name, lane.name)),
                    Err(e) => Phase::Fail(format!("insert on lane {} failed: {e}", lane.name)),
                },
                Phase::Success { lane, created } => {
                    return PlacementResult {
                        success: true,
                        lane_index: Some(lane.index),
                        final_time_seconds: Some(time),
                        created_new_lane: created,
                        error: None,
                        warning,
                        position_label: Some(format_timecode(time, self.fps)),
                    };
                }
                Phase::Fail(error) => {
                    warn!(asset = %asset.name, "placement failed: {error}");
                    return PlacementResult { warning, ..PlacementResult::failed(error) };
                }
            };
        }
    }

    fn create_lane(&self, bridge: &mut dyn TimelineBridge, lanes: &mut Vec<LaneRef>, time: Seconds, warning: &mut Option<String>) -> Phase {
        let before = lanes.len();
        let claimed = match bridge.create_lane(self.kind) {
            Ok(claimed) => claimed,
            Err(e) => {
                warn!("lane creation failed: {e}");
                false
            }
        };
        if claimed {
            match bridge.list_lanes(self.kind) {
                Ok(after) if after.len() > before => {
                    let fresh = after.last().cloned();
                    *lanes = after;
                    if let Some(lane) = fresh {
                        return Phase::Insert { lane, created: true };
                    }
                }
                Ok(_) => warn!(before, "host reported a new lane but the lane count did not change"),
                Err(e) => warn!("could not re-list lanes after creation: {e}"),
            }
        }
        match lanes.last() {
            Some(last) => {
                let msg = format!(
                    "all {} audio lanes are occupied at {}; no new lane could be added, placed on {} with conflict risk",
                    lanes.len(),
                    format_timecode(time, self.fps),
                    last.name
                );
                warn!("{msg}");
                *warning = Some(msg);
                Phase::Insert { lane: last.clone(), created: false }
            }
            None => Phase::Fail("no audio lanes exist and none could be created".into()),
        }
    }
}
