use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Seconds;

/// Point-in-time values exactly as the host bridge reported them. The host
/// scripting layer is loosely typed, so every scalar may arrive as a number,
/// a numeric string, or garbage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawSnapshot {
    pub sequence_id: Value,
    pub sequence_name: Value,
    pub playhead: Value,
    pub in_point: Value,
    pub out_point: Value,
    pub audio_track_count: Value,
    pub video_track_count: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineSnapshot {
    pub sequence_id: Option<String>,
    pub sequence_name: Option<String>,
    pub playhead_seconds: Option<Seconds>,
    pub in_point: Option<Seconds>,
    pub out_point: Option<Seconds>,
    pub track_count: usize,
    pub video_track_count: usize,
    pub last_change_hash: u64,
    /// Set when the bridge could not be queried and this is the last known good value.
    pub stale: bool,
}

impl TimelineSnapshot {
    pub fn from_raw(raw: &RawSnapshot) -> Self {
        let mut in_point = parse_seconds(&raw.in_point);
        let mut out_point = parse_seconds(&raw.out_point);
        if let (Some(i), Some(o)) = (in_point, out_point) {
            if o <= i {
                in_point = None;
                out_point = None;
            }
        }
        let mut snap = Self {
            sequence_id: parse_label(&raw.sequence_id),
            sequence_name: parse_label(&raw.sequence_name),
            playhead_seconds: parse_seconds(&raw.playhead),
            in_point,
            out_point,
            track_count: parse_count(&raw.audio_track_count).unwrap_or(0),
            video_track_count: parse_count(&raw.video_track_count).unwrap_or(0),
            last_change_hash: 0,
            stale: false,
        };
        snap.last_change_hash = snap.change_hash();
        snap
    }

    /// Hash over the selection-relevant fields only. Playhead motion alone
    /// does not count as a change.
    pub fn change_hash(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.in_point.map(f64::to_bits).unwrap_or(0).hash(&mut h);
        self.out_point.map(f64::to_bits).unwrap_or(0).hash(&mut h);
        self.sequence_name.hash(&mut h);
        self.in_point.is_some().hash(&mut h);
        self.out_point.is_some().hash(&mut h);
        h.finish()
    }

    /// The in/out range, present only when both points are set and ordered.
    pub fn selection(&self) -> Option<(Seconds, Seconds)> {
        match (self.in_point, self.out_point) {
            (Some(i), Some(o)) if o > i => Some((i, o)),
            _ => None,
        }
    }

    pub fn mark_stale(mut self) -> Self {
        self.stale = true;
        self
    }
}

/// Seconds from a loosely-typed scalar. Non-numeric, non-finite and negative
/// values are unset.
pub fn parse_seconds(value: &Value) -> Option<Seconds> {
    let v = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if v.is_finite() && v >= 0.0 { Some(v) } else { None }
}

pub fn parse_count(value: &Value) -> Option<usize> {
    let v = parse_seconds(value)?;
    if v.fract() == 0.0 { Some(v as usize) } else { None }
}

fn parse_label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_numbers_and_numeric_strings() {
        assert_eq!(parse_seconds(&json!(12.5)), Some(12.5));
        assert_eq!(parse_seconds(&json!(" 30 ")), Some(30.0));
        assert_eq!(parse_seconds(&json!("abc")), None);
        assert_eq!(parse_seconds(&json!(-1.0)), None);
        assert_eq!(parse_seconds(&json!("-4")), None);
        assert_eq!(parse_seconds(&json!(true)), None);
        assert_eq!(parse_seconds(&Value::Null), None);
        assert_eq!(parse_seconds(&json!("NaN")), None);
        assert_eq!(parse_count(&json!("4")), Some(4));
        assert_eq!(parse_count(&json!(2.5)), None);
    }

    #[test]
    fn inverted_selection_is_no_selection() {
        let raw = RawSnapshot { in_point: json!(40.0), out_point: json!("10"), ..Default::default() };
        let snap = TimelineSnapshot::from_raw(&raw);
        assert_eq!(snap.in_point, None);
        assert_eq!(snap.out_point, None);
        assert_eq!(snap.selection(), None);
    }

    #[test]
    fn camel_case_wire_form_deserializes() {
        let raw: RawSnapshot = serde_json::from_str(
            r#"{"sequenceName":"Main","playhead":"3.5","inPoint":30,"outPoint":"35.0","audioTrackCount":"4"}"#,
        )
        .unwrap();
        let snap = TimelineSnapshot::from_raw(&raw);
        assert_eq!(snap.sequence_name.as_deref(), Some("Main"));
        assert_eq!(snap.playhead_seconds, Some(3.5));
        assert_eq!(snap.selection(), Some((30.0, 35.0)));
        assert_eq!(snap.track_count, 4);
    }

    #[test]
    fn hash_ignores_playhead_but_tracks_selection() {
        let mut raw = RawSnapshot { in_point: json!(1.0), out_point: json!(2.0), playhead: json!(0.0), ..Default::default() };
        let a = TimelineSnapshot::from_raw(&raw);
        raw.playhead = json!(9.0);
        let b = TimelineSnapshot::from_raw(&raw);
        assert_eq!(a.last_change_hash, b.last_change_hash);
        raw.out_point = json!(3.0);
        let c = TimelineSnapshot::from_raw(&raw);
        assert_ne!(a.last_change_hash, c.last_change_hash);
    }
}
