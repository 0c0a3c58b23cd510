//! One generation job end to end: generate, save, import, place.
//!
//! Everything the job needs to know about where it lands is fixed in
//! [`Orchestrator::create_job`]; [`Orchestrator::run_job`] never looks at the
//! panel again and only re-reads the timeline for the playhead fallback.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use project::{output_dir, write_asset, AssetIndex, LedgerState, NewGeneration, ProjectDb, Settings};
use serde::{Deserialize, Serialize};
use timeline::{BridgeHandle, PlacementRequest, PlacementResult, PlacementScheduler, SharedMonitor, TimelineSnapshot};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::client::{GenerationClient, GenerationParams};
use crate::mode::resolve_request;
use crate::panel::{GenerationMode, PanelState};
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper};
use crate::{JobError, JobStatus};

/// A job as frozen at creation. Its duration is `request.duration_seconds`.
/// Progress is not stored here: it is reported as [`JobStatus`] events from
/// [`Orchestrator::run_job`] and persisted as `LedgerState` when a ledger is
/// attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: String,
    pub prompt: String,
    pub mode: GenerationMode,
    pub prompt_influence: f64,
    pub request: PlacementRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub saved_path: PathBuf,
    pub placement: PlacementResult,
    /// Placed at the playhead after the captured target failed.
    pub used_fallback: bool,
}

/// Terminal failure. `saved_path` is set whenever the audio reached disk, so
/// the operator can still place it by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub error: JobError,
    pub saved_path: Option<PathBuf>,
}

impl JobFailure {
    fn before_save(error: JobError) -> Self { Self { error, saved_path: None } }

    fn after_save(error: JobError, saved_path: &Path) -> Self { Self { error, saved_path: Some(saved_path.to_path_buf()) } }
}

pub struct Orchestrator {
    bridge: BridgeHandle,
    client: Arc<dyn GenerationClient>,
    index: Arc<AssetIndex>,
    settings: Settings,
    scheduler: PlacementScheduler,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    monitor: Option<SharedMonitor>,
    ledger: Option<Arc<Mutex<ProjectDb>>>,
}

impl Orchestrator {
    pub fn new(bridge: BridgeHandle, client: Arc<dyn GenerationClient>, index: Arc<AssetIndex>, settings: Settings) -> Self {
        Self {
            bridge,
            client,
            index,
            scheduler: PlacementScheduler::new(settings.conflict_buffer_seconds),
            retry: RetryPolicy::new(settings.retry_max_attempts, settings.backoff_cap),
            sleeper: Arc::new(ThreadSleeper),
            settings,
            monitor: None,
            ledger: None,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Read timeline state through a running monitor instead of querying
    /// the bridge directly.
    pub fn with_monitor(mut self, monitor: SharedMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<Mutex<ProjectDb>>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn index(&self) -> &Arc<AssetIndex> { &self.index }

    pub fn settings(&self) -> &Settings { &self.settings }

    pub fn current_snapshot(&self) -> Result<TimelineSnapshot, JobError> {
        if let Some(monitor) = &self.monitor {
            return Ok(monitor.lock().refresh());
        }
        let raw = self.bridge.with(|b| b.snapshot())?;
        Ok(TimelineSnapshot::from_raw(&raw))
    }

    /// Validate and freeze a job against the timeline as it is right now.
    pub fn create_job(&self, prompt: &str, panel: &PanelState) -> Result<GenerationJob, JobError> {
        let snapshot = self.current_snapshot()?;
        self.create_job_at(prompt, panel, &snapshot)
    }

    pub fn create_job_at(&self, prompt: &str, panel: &PanelState, snapshot: &TimelineSnapshot) -> Result<GenerationJob, JobError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(JobError::EmptyPrompt);
        }
        let request = resolve_request(panel, snapshot, self.settings.auto_duration_seconds)?;
        let job = GenerationJob {
            id: Uuid::new_v4().to_string(),
            prompt: prompt.to_string(),
            mode: panel.mode,
            prompt_influence: panel.prompt_influence,
            request,
        };
        self.record(|db| {
            db.record_job(&NewGeneration {
                id: &job.id,
                prompt: &job.prompt,
                duration_seconds: job.request.duration_seconds,
                prompt_influence: job.prompt_influence,
                mode: job.mode.as_str(),
                target_time: Some(job.request.target_time_seconds),
                preferred_lane: job.request.preferred_lane_index,
            })
        });
        info!(job = %job.id, mode = job.mode.as_str(), target = job.request.target_time_seconds, duration = job.request.duration_seconds, "job created");
        Ok(job)
    }

    pub fn run_job(&self, job: &GenerationJob, on_status: &mut dyn FnMut(JobStatus)) -> Result<JobOutcome, JobFailure> {
        let outcome = self.drive(job, on_status);
        match &outcome {
            Ok(done) => {
                self.record(|db| db.record_outcome(&job.id, &done.placement));
                info!(job = %job.id, lane = ?done.placement.lane_index, time = ?done.placement.final_time_seconds, "job done");
            }
            Err(failure) => {
                let message = failure.error.to_string();
                self.record(|db| db.record_failure(&job.id, &message, failure.saved_path.as_deref()));
                error!(job = %job.id, saved = ?failure.saved_path, "job failed: {message}");
            }
        }
        outcome
    }

    fn drive(&self, job: &GenerationJob, on_status: &mut dyn FnMut(JobStatus)) -> Result<JobOutcome, JobFailure> {
        self.record(|db| db.update_job_state(&job.id, LedgerState::Generating));
        let params = GenerationParams {
            text: job.prompt.clone(),
            duration_seconds: job.request.duration_seconds,
            prompt_influence: job.prompt_influence,
        };
        let audio = self
            .retry
            .run(self.sleeper.as_ref(), |attempt| {
                on_status(JobStatus::Generating { attempt });
                self.client.generate(&params)
            })
            .map_err(JobFailure::before_save)?;

        on_status(JobStatus::Saving);
        self.record(|db| db.update_job_state(&job.id, LedgerState::Saving));
        let saved_path = self.persist(&job.prompt, &audio).map_err(JobFailure::before_save)?;
        self.record(|db| db.record_saved(&job.id, &saved_path));
        self.index.invalidate();

        on_status(JobStatus::Placing);
        self.record(|db| db.update_job_state(&job.id, LedgerState::Placing));
        let asset = self
            .bridge
            .with(|b| b.import_asset(&saved_path, Some(self.settings.bin_name.as_str())))
            .map_err(|e| JobFailure::after_save(e.into(), &saved_path))?;
        self.index.invalidate();

        let primary = self.scheduler.place(&self.bridge, &asset, &job.request);
        let (placement, used_fallback) = if primary.success {
            (primary, false)
        } else {
            let reason = primary.error.clone().unwrap_or_else(|| "placement failed".into());
            warn!(job = %job.id, "placement at captured target failed, trying current playhead: {reason}");
            let playhead = self.current_snapshot().ok().and_then(|s| s.playhead_seconds);
            match playhead {
                Some(now) => (self.scheduler.place(&self.bridge, &asset, &job.request.retarget(now)), true),
                None => (primary, false),
            }
        };

        if !placement.success {
            let reason = placement.error.clone().unwrap_or_else(|| "placement failed".into());
            self.record(|db| db.record_outcome(&job.id, &placement));
            return Err(JobFailure::after_save(JobError::PlacementFailed(reason), &saved_path));
        }
        if let Some(w) = &placement.warning {
            warn!(job = %job.id, "{}", JobError::PlacementConflict(w.clone()));
        }
        Ok(JobOutcome { saved_path, placement, used_fallback })
    }

    fn persist(&self, prompt: &str, audio: &[u8]) -> Result<PathBuf, JobError> {
        let project_root = match self.bridge.with(|b| b.project_root()) {
            Ok(root) => root,
            Err(e) => {
                warn!("could not read project directory, using fallback folder: {e}");
                None
            }
        };
        let dir = output_dir(project_root.as_deref(), &self.settings)?;
        let n = self.index.next_sequence_number(prompt);
        let (path, _) = write_asset(&dir, prompt, n, &self.settings.audio_extension, audio)?;
        Ok(path)
    }

    fn record(&self, f: impl FnOnce(&ProjectDb) -> anyhow::Result<()>) {
        if let Some(ledger) = &self.ledger {
            if let Err(e) = f(&*ledger.lock()) {
                warn!("generation ledger write failed: {e:#}");
            }
        }
    }
}
