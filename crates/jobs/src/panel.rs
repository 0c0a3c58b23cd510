use serde::{Deserialize, Serialize};
use timeline::placement::clamp_duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Operator-chosen duration at the playhead.
    Manual,
    /// Fixed default duration at the playhead.
    Auto,
    /// Duration and position taken from the in/out selection.
    InOut,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::Manual => "manual",
            GenerationMode::Auto => "auto",
            GenerationMode::InOut => "in_out",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PanelAction {
    SetMode(GenerationMode),
    SetManualDuration(f64),
    /// `None` goes back to the configured auto duration.
    SetAutoDuration(Option<f64>),
    SetPromptInfluence(f64),
    SetPreferredLane(usize),
}

/// Operator controls that shape the next job. Passed explicitly to whatever
/// needs it; nothing reads it ambiently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelState {
    pub mode: GenerationMode,
    pub manual_duration: f64,
    /// `None` uses the auto duration from settings.
    pub auto_duration_override: Option<f64>,
    pub prompt_influence: f64,
    pub preferred_lane: usize,
}

impl Default for PanelState {
    fn default() -> Self {
        Self {
            mode: GenerationMode::Manual,
            manual_duration: 5.0,
            auto_duration_override: None,
            prompt_influence: 0.3,
            preferred_lane: 0,
        }
    }
}

impl PanelState {
    pub fn apply(&mut self, action: PanelAction) {
        match action {
            PanelAction::SetMode(mode) => self.mode = mode,
            PanelAction::SetManualDuration(d) => self.manual_duration = clamp_duration(d),
            PanelAction::SetAutoDuration(d) => self.auto_duration_override = d.map(clamp_duration),
            PanelAction::SetPromptInfluence(p) => self.prompt_influence = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) },
            PanelAction::SetPreferredLane(lane) => self.preferred_lane = lane,
        }
    }

    pub fn reduce(mut self, action: PanelAction) -> Self {
        self.apply(action);
        self
    }

    /// Auto-mode duration: the panel override when set, else `configured`.
    pub fn auto_duration(&self, configured: f64) -> f64 { clamp_duration(self.auto_duration_override.unwrap_or(configured)) }
}
