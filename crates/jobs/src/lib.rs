use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

mod client;
pub mod diagnostics;
mod error;
mod mode;
mod orchestrator;
mod panel;
mod retry;

pub use client::{classify_status, error_message, GenerationClient, GenerationParams, HttpGenerationClient};
pub use error::JobError;
pub use mode::resolve_request;
pub use orchestrator::{GenerationJob, JobFailure, JobOutcome, Orchestrator};
pub use panel::{GenerationMode, PanelAction, PanelState};
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Generating { attempt: u32 },
    Saving,
    Placing,
    Done {
        saved_path: PathBuf,
        lane_index: Option<usize>,
        final_time_seconds: Option<f64>,
        created_new_lane: bool,
        warning: Option<String>,
    },
    Failed { error: String, saved_path: Option<PathBuf> },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool { matches!(self, JobStatus::Done { .. } | JobStatus::Failed { .. }) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub id: String,
    pub prompt: String,
    pub status: JobStatus,
}

/// Front door for generation jobs. Each accepted job runs on its own thread;
/// nothing serializes jobs except the bridge lock during placement.
#[derive(Clone)]
pub struct JobsHandle {
    orchestrator: Arc<Orchestrator>,
    tx_events: Sender<JobEvent>,
    workers: Arc<Mutex<Vec<thread::JoinHandle<()>>>>,
    pub rx_events: Receiver<JobEvent>,
}

pub struct JobsRuntime;

impl JobsRuntime {
    pub fn start(orchestrator: Orchestrator) -> JobsHandle {
        let (tx_events, rx_events) = unbounded::<JobEvent>();
        JobsHandle { orchestrator: Arc::new(orchestrator), tx_events, workers: Arc::new(Mutex::new(Vec::new())), rx_events }
    }
}

impl JobsHandle {
    /// Create a job against the timeline as it is now and start it. Invalid
    /// requests are refused here, before anything touches the network.
    pub fn submit(&self, prompt: &str, panel: &PanelState) -> Result<String, JobError> {
        let job = self.orchestrator.create_job(prompt, panel)?;
        Ok(self.spawn(job))
    }

    /// Start a job that was already created.
    pub fn spawn(&self, job: GenerationJob) -> String {
        let id = job.id.clone();
        let _ = self.tx_events.send(JobEvent { id: id.clone(), prompt: job.prompt.clone(), status: JobStatus::Queued });
        let orchestrator = self.orchestrator.clone();
        let tx_e = self.tx_events.clone();
        let worker = thread::spawn(move || {
            let emit = |status: JobStatus| {
                let _ = tx_e.send(JobEvent { id: job.id.clone(), prompt: job.prompt.clone(), status });
            };
            let mut progress = |status: JobStatus| emit(status);
            let terminal = match orchestrator.run_job(&job, &mut progress) {
                Ok(done) => JobStatus::Done {
                    saved_path: done.saved_path,
                    lane_index: done.placement.lane_index,
                    final_time_seconds: done.placement.final_time_seconds,
                    created_new_lane: done.placement.created_new_lane,
                    warning: done.placement.warning,
                },
                Err(failure) => JobStatus::Failed { error: failure.error.to_string(), saved_path: failure.saved_path },
            };
            emit(terminal);
        });
        let mut workers = self.workers.lock();
        workers.retain(|w| !w.is_finished());
        workers.push(worker);
        debug!(job = %id, running = workers.len(), "job started");
        id
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> { &self.orchestrator }

    /// Block until every started job has finished.
    pub fn join_all(&self) {
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for w in workers {
            let _ = w.join();
        }
    }
}
