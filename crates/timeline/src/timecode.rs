use crate::{Fps, Seconds};

/// `HH:MM:SS:FF` for a position in seconds. Frames are truncated, not rounded,
/// so a clip never appears to start later than it does.
pub fn format_timecode(seconds: Seconds, fps: Fps) -> String {
    let secs = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let rate = fps.as_f64();
    let whole = secs.floor() as u64;
    let frames = if rate > 0.0 { ((secs - secs.floor()) * rate).floor() as u64 } else { 0 };
    format!("{:02}:{:02}:{:02}:{:02}", whole / 3600, (whole / 60) % 60, whole % 60, frames)
}
