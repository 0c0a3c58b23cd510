use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use timeline::PollIntervals;

use crate::{app_data_dir, ProjectError};

const CONFIG_FILE_NAME: &str = "config.toml";
/// Generation attempts per job, first try included.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

const ENV_CONFIG_PATH: &str = "SFX_PLACER_CONFIG_PATH";
const ENV_API_URL: &str = "SFX_PLACER_API_URL";
const ENV_API_KEY: &str = "SFX_PLACER_API_KEY";
const ENV_AUTO_DURATION: &str = "SFX_PLACER_AUTO_DURATION";
const ENV_LIBRARY_DIR: &str = "SFX_PLACER_LIBRARY_DIR";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    /// `<project>/<library_folder>/<ai_subfolder>/` receives generated files.
    pub library_folder: String,
    pub ai_subfolder: String,
    /// Project bin that imported generations are filed under.
    pub bin_name: String,
    /// Used when the host project has never been saved.
    pub fallback_dir: Option<PathBuf>,
    /// Extra directories indexed alongside the project library.
    pub extra_roots: Vec<PathBuf>,
    pub audio_extension: String,
    pub index_ttl: Duration,
    pub search_limit: usize,
    pub max_items_per_dir: usize,
    pub focused_poll: Duration,
    pub unfocused_poll: Duration,
    pub auto_duration_seconds: f64,
    pub conflict_buffer_seconds: f64,
    pub retry_max_attempts: u32,
    pub backoff_cap: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "https://api.elevenlabs.io/v1/sound-generation".into(),
            api_key: None,
            request_timeout: Duration::from_secs(60),
            library_folder: "Audio".into(),
            ai_subfolder: "AI SFX".into(),
            bin_name: "AI SFX".into(),
            fallback_dir: dirs::desktop_dir().map(|d| d.join("SFX AI")),
            extra_roots: Vec::new(),
            audio_extension: "mp3".into(),
            index_ttl: Duration::from_secs(15 * 60),
            search_limit: 50,
            max_items_per_dir: 500,
            focused_poll: Duration::from_millis(1000),
            unfocused_poll: Duration::from_millis(5000),
            auto_duration_seconds: 10.0,
            conflict_buffer_seconds: 0.1,
            retry_max_attempts: 3,
            backoff_cap: Duration::from_secs(10),
        }
    }
}

impl Settings {
    /// Defaults, then the TOML file, then environment overrides.
    pub fn load() -> Result<Self, ProjectError> {
        let mut settings = Self::default();
        let path = match config_file_override() {
            Some(path) => path,
            None => Self::default_config_path(),
        };
        if path.exists() {
            settings.apply_partial(read_partial(&path)?);
        }
        settings.apply_env()?;
        Ok(settings)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ProjectError> {
        let partial: PartialSettings = toml::from_str(contents).map_err(|e| ProjectError::Config(e.to_string()))?;
        let mut settings = Self::default();
        settings.apply_partial(partial);
        Ok(settings)
    }

    pub fn default_config_path() -> PathBuf { app_data_dir().join(CONFIG_FILE_NAME) }

    pub fn poll_intervals(&self) -> PollIntervals { PollIntervals { focused: self.focused_poll, unfocused: self.unfocused_poll } }

    fn apply_partial(&mut self, partial: PartialSettings) {
        if let Some(v) = partial.api_url { self.api_url = v; }
        if let Some(v) = partial.api_key { self.api_key = Some(v); }
        if let Some(v) = partial.request_timeout_secs { self.request_timeout = Duration::from_secs(v); }
        if let Some(v) = partial.library_folder { self.library_folder = v; }
        if let Some(v) = partial.ai_subfolder { self.ai_subfolder = v; }
        if let Some(v) = partial.bin_name { self.bin_name = v; }
        if let Some(v) = partial.fallback_dir { self.fallback_dir = Some(v); }
        if let Some(v) = partial.extra_roots { self.extra_roots = v; }
        if let Some(v) = partial.audio_extension { self.audio_extension = v.trim_start_matches('.').to_ascii_lowercase(); }
        if let Some(v) = partial.index_ttl_secs { self.index_ttl = Duration::from_secs(v); }
        if let Some(v) = partial.search_limit { self.search_limit = v.max(1); }
        if let Some(v) = partial.max_items_per_dir { self.max_items_per_dir = v.max(1); }
        if let Some(v) = partial.focused_poll_ms { self.focused_poll = Duration::from_millis(v); }
        if let Some(v) = partial.unfocused_poll_ms { self.unfocused_poll = Duration::from_millis(v); }
        if let Some(v) = partial.auto_duration_seconds { self.auto_duration_seconds = v; }
        if let Some(v) = partial.conflict_buffer_seconds { self.conflict_buffer_seconds = v.max(0.0); }
        if let Some(v) = partial.retry_max_attempts { self.retry_max_attempts = v.clamp(1, MAX_RETRY_ATTEMPTS); }
        if let Some(v) = partial.backoff_cap_secs { self.backoff_cap = Duration::from_secs(v); }
    }

    fn apply_env(&mut self) -> Result<(), ProjectError> {
        if let Ok(value) = env::var(ENV_API_URL) {
            if !value.trim().is_empty() { self.api_url = value; }
        }
        if let Ok(value) = env::var(ENV_API_KEY) {
            self.api_key = if value.trim().is_empty() { None } else { Some(value) };
        }
        if let Ok(value) = env::var(ENV_AUTO_DURATION) {
            if !value.trim().is_empty() {
                self.auto_duration_seconds = value
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| ProjectError::Config(format!("{ENV_AUTO_DURATION} must be a number of seconds")))?;
            }
        }
        if let Ok(value) = env::var(ENV_LIBRARY_DIR) {
            if !value.trim().is_empty() { self.library_folder = value; }
        }
        Ok(())
    }
}

fn config_file_override() -> Option<PathBuf> {
    let value = env::var_os(ENV_CONFIG_PATH)?;
    if value.is_empty() { return None; }
    let path = PathBuf::from(value);
    if path.is_dir() { Some(path.join(CONFIG_FILE_NAME)) } else { Some(path) }
}

fn read_partial(path: &Path) -> Result<PartialSettings, ProjectError> {
    let contents = fs::read_to_string(path).map_err(|e| ProjectError::Config(format!("failed to read {}: {e}", path.display())))?;
    toml::from_str(&contents).map_err(|e| ProjectError::Config(format!("failed to parse {}: {e}", path.display())))
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct PartialSettings {
    api_url: Option<String>,
    api_key: Option<String>,
    request_timeout_secs: Option<u64>,
    library_folder: Option<String>,
    ai_subfolder: Option<String>,
    bin_name: Option<String>,
    fallback_dir: Option<PathBuf>,
    extra_roots: Option<Vec<PathBuf>>,
    audio_extension: Option<String>,
    index_ttl_secs: Option<u64>,
    search_limit: Option<usize>,
    max_items_per_dir: Option<usize>,
    focused_poll_ms: Option<u64>,
    unfocused_poll_ms: Option<u64>,
    auto_duration_seconds: Option<f64>,
    conflict_buffer_seconds: Option<f64>,
    retry_max_attempts: Option<u32>,
    backoff_cap_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_overrides_only_what_it_names() {
        let s = Settings::from_toml_str(
            r#"
            ai_subfolder = "Generated"
            index_ttl_secs = 60
            audio_extension = ".WAV"
            "#,
        )
        .unwrap();
        assert_eq!(s.ai_subfolder, "Generated");
        assert_eq!(s.index_ttl, Duration::from_secs(60));
        assert_eq!(s.audio_extension, "wav");
        assert_eq!(s.bin_name, Settings::default().bin_name);
        assert_eq!(s.retry_max_attempts, 3);
    }

    #[test]
    fn load_layers_file_then_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "retry_max_attempts = 9\nauto_duration_seconds = 12.0\nfocused_poll_ms = 250\n").unwrap();
        env::set_var(ENV_CONFIG_PATH, &path);
        env::set_var(ENV_AUTO_DURATION, "4");
        let loaded = Settings::load();
        env::remove_var(ENV_AUTO_DURATION);
        env::remove_var(ENV_CONFIG_PATH);

        let s = loaded.unwrap();
        assert_eq!(s.auto_duration_seconds, 4.0);
        assert_eq!(s.retry_max_attempts, MAX_RETRY_ATTEMPTS);
        assert_eq!(s.poll_intervals().focused, Duration::from_millis(250));
        assert_eq!(s.poll_intervals().unfocused, Settings::default().unfocused_poll);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        assert!(matches!(Settings::from_toml_str("search_limit = \"many\""), Err(ProjectError::Config(_))));
    }
}
