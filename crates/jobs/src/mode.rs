use timeline::{PlacementMode, PlacementRequest, TimelineSnapshot, MAX_DURATION_SECONDS};

use crate::panel::{GenerationMode, PanelState};
use crate::JobError;

/// Turn the panel and the timeline state at job creation into a fixed
/// placement request. Evaluated once per job. `auto_default` is the configured
/// auto-mode duration, used when the panel has no override.
pub fn resolve_request(panel: &PanelState, snapshot: &TimelineSnapshot, auto_default: f64) -> Result<PlacementRequest, JobError> {
    match panel.mode {
        GenerationMode::InOut => {
            let (in_point, out_point) = snapshot
                .selection()
                .ok_or_else(|| JobError::InvalidSelection("mark an in point and a later out point".into()))?;
            let span = out_point - in_point;
            if span > MAX_DURATION_SECONDS {
                return Err(JobError::InvalidSelection(format!(
                    "in/out span is {span:.2}s, the maximum is {MAX_DURATION_SECONDS}s"
                )));
            }
            Ok(PlacementRequest::new(in_point, panel.preferred_lane, span, PlacementMode::AtExplicitTime))
        }
        GenerationMode::Manual => {
            Ok(PlacementRequest::new(playhead(snapshot)?, panel.preferred_lane, panel.manual_duration, PlacementMode::AtPlayhead))
        }
        GenerationMode::Auto => {
            Ok(PlacementRequest::new(playhead(snapshot)?, panel.preferred_lane, panel.auto_duration(auto_default), PlacementMode::AtPlayhead))
        }
    }
}

fn playhead(snapshot: &TimelineSnapshot) -> Result<f64, JobError> {
    // A stale snapshot with a known playhead is still a usable target.
    match snapshot.playhead_seconds {
        Some(t) => Ok(t),
        None if snapshot.stale => Err(JobError::BridgeUnavailable("playhead position unknown".into())),
        None => Ok(0.0),
    }
}
