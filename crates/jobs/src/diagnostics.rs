//! Environment health check for the generation pipeline.

use std::path::PathBuf;

use project::{output_dir, AssetIndex, Settings, SourceKind};
use serde::{Deserialize, Serialize};
use timeline::{AppInfo, BridgeHandle};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub host_reachable: bool,
    pub host_error: Option<String>,
    pub app: Option<AppInfo>,
    pub project_root: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub api_key_configured: bool,
    pub container_assets: usize,
    pub filesystem_assets: usize,
    /// Generated files on disk that no project bin references.
    pub unimported: Vec<PathBuf>,
}

impl DiagnosticReport {
    /// One line per problem, phrased as what to do about it.
    pub fn issues(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.host_reachable {
            let detail = self.host_error.as_deref().unwrap_or("no response");
            out.push(format!("Timeline host is not reachable ({detail}); make sure the editor is running with the panel loaded."));
        }
        if let Some(app) = &self.app {
            if !app.has_active_sequence {
                out.push("No active sequence; open a sequence before generating.".to_string());
            }
        }
        if self.host_reachable && self.project_root.is_none() {
            match &self.output_dir {
                Some(dir) => out.push(format!("Project is unsaved; audio will be written to {}.", dir.display())),
                None => out.push("Project is unsaved and no fallback folder is configured; save the project first.".to_string()),
            }
        }
        if !self.api_key_configured {
            out.push("No API key configured; set SFX_PLACER_API_KEY or api_key in config.toml.".to_string());
        }
        if !self.unimported.is_empty() {
            out.push(format!("{} generated file(s) are not in any project bin; import them to use them on the timeline.", self.unimported.len()));
        }
        out
    }

    pub fn is_healthy(&self) -> bool { self.issues().is_empty() }
}

pub fn run(bridge: &BridgeHandle, index: &AssetIndex, settings: &Settings) -> DiagnosticReport {
    let mut report = DiagnosticReport { api_key_configured: settings.api_key.is_some(), ..Default::default() };

    let probe = bridge.with(|b| -> Result<_, timeline::BridgeError> { Ok((b.app_info()?, b.project_root()?)) });
    match probe {
        Ok((app, root)) => {
            report.host_reachable = true;
            report.app = Some(app);
            report.project_root = root;
        }
        Err(e) => report.host_error = Some(e.to_string()),
    }
    report.output_dir = output_dir(report.project_root.as_deref(), settings).ok();

    let snapshot = index.rescan();
    for record in &snapshot.records {
        match record.source_kind {
            SourceKind::Container => report.container_assets += 1,
            SourceKind::Filesystem => report.filesystem_assets += 1,
        }
    }
    if let Some(dir) = &report.output_dir {
        report.unimported = snapshot
            .records
            .iter()
            .filter(|r| r.source_kind == SourceKind::Filesystem)
            .filter_map(|r| r.resolved_path.clone())
            .filter(|p| p.starts_with(dir))
            .collect();
    }
    info!(
        host = report.host_reachable,
        container = report.container_assets,
        filesystem = report.filesystem_assets,
        unimported = report.unimported.len(),
        "diagnostics complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use timeline::MemoryTimeline;

    fn settings() -> Settings {
        let mut s = Settings::default();
        s.fallback_dir = None;
        s.api_key = Some("key".into());
        s
    }

    #[test]
    fn reports_generated_files_missing_from_bins() {
        let project = tempfile::tempdir().unwrap();
        let dir = project.path().join("Audio").join("AI SFX");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("boom_1.mp3"), b"x").unwrap();
        fs::write(dir.join("boom_2.mp3"), b"x").unwrap();

        let host = MemoryTimeline::new(2);
        host.set_project_root(Some(project.path().to_path_buf()));
        host.add_bin_item("AI SFX", "boom_1.mp3", Some(dir.join("boom_1.mp3")), true);
        let bridge = BridgeHandle::new(host);
        let settings = settings();
        let index = AssetIndex::from_settings(&settings, Some(bridge.clone()));

        let report = run(&bridge, &index, &settings);
        assert!(report.host_reachable);
        assert_eq!(report.container_assets, 1);
        assert_eq!(report.filesystem_assets, 1);
        assert_eq!(report.unimported, vec![dir.join("boom_2.mp3")]);
        assert_eq!(report.issues().len(), 1);
    }

    #[test]
    fn unreachable_host_is_an_issue_not_a_panic() {
        let host = MemoryTimeline::new(1);
        host.set_offline(true);
        let bridge = BridgeHandle::new(host);
        let index = AssetIndex::new(Vec::new(), Some(bridge.clone()), Duration::from_secs(60));
        let report = run(&bridge, &index, &settings());
        assert!(!report.host_reachable);
        assert!(!report.is_healthy());
        assert!(report.issues()[0].contains("not reachable"));
    }

    #[test]
    fn missing_sequence_and_unsaved_project_are_reported() {
        let bridge = BridgeHandle::new(MemoryTimeline::without_sequence());
        let index = AssetIndex::new(Vec::new(), Some(bridge.clone()), Duration::from_secs(60));
        let report = run(&bridge, &index, &settings());
        assert!(report.host_reachable);
        assert_eq!(report.app.as_ref().map(|a| a.has_active_sequence), Some(false));
        let issues = report.issues();
        assert_eq!(issues.len(), 2);
        assert!(issues[0].contains("No active sequence"));
        assert!(issues[1].contains("save the project first"));
    }
}
