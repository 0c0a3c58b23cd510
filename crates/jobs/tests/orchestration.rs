use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use jobs::{
    GenerationClient, GenerationMode, GenerationParams, JobError, JobEvent, JobStatus, JobsRuntime, Orchestrator, PanelAction,
    PanelState, Sleeper,
};
use parking_lot::Mutex;
use project::{AssetIndex, LedgerState, ProjectDb, Settings};
use timeline::{
    AppInfo, AssetRef, BridgeError, BridgeHandle, ClipSpan, ContainerEntry, ContainerRef, LaneKind, LaneRef, MemoryTimeline, MonitorRuntime,
    RawSnapshot, TimelineBridge,
};

struct ScriptedClient {
    responses: Mutex<VecDeque<Result<Vec<u8>, JobError>>>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    fn new(responses: Vec<Result<Vec<u8>, JobError>>) -> Arc<Self> {
        Arc::new(Self { responses: Mutex::new(responses.into()), calls: AtomicUsize::new(0) })
    }

    fn always_ok() -> Arc<Self> { Self::new(Vec::new()) }

    fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

impl GenerationClient for ScriptedClient {
    fn generate(&self, _params: &GenerationParams) -> Result<Vec<u8>, JobError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses.lock().pop_front().unwrap_or_else(|| Ok(b"ID3audio".to_vec()))
    }
}

/// Holds every call until the test releases it.
struct GatedClient {
    release: Receiver<()>,
    entered: Sender<()>,
}

impl GenerationClient for GatedClient {
    fn generate(&self, _params: &GenerationParams) -> Result<Vec<u8>, JobError> {
        let _ = self.entered.send(());
        self.release.recv_timeout(Duration::from_secs(10)).map_err(|e| JobError::Transport(e.to_string()))?;
        Ok(b"audio".to_vec())
    }
}

#[derive(Default)]
struct RecordingSleeper(Mutex<Vec<Duration>>);

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) { self.0.lock().push(duration); }
}

/// Memory host that refuses inserts at one particular time.
struct PickyHost {
    inner: MemoryTimeline,
    refuse_at: f64,
}

impl TimelineBridge for PickyHost {
    fn snapshot(&mut self) -> Result<RawSnapshot, BridgeError> { self.inner.snapshot() }
    fn list_lanes(&mut self, kind: LaneKind) -> Result<Vec<LaneRef>, BridgeError> { self.inner.list_lanes(kind) }
    fn lane_clips(&mut self, lane: &LaneRef) -> Result<Vec<ClipSpan>, BridgeError> { self.inner.lane_clips(lane) }
    fn create_lane(&mut self, kind: LaneKind) -> Result<bool, BridgeError> { self.inner.create_lane(kind) }
    fn insert_asset(&mut self, lane: &LaneRef, asset: &AssetRef, time: f64) -> Result<bool, BridgeError> {
        if (time - self.refuse_at).abs() < 1e-9 {
            return Err(BridgeError::Rejected("locked region".into()));
        }
        self.inner.insert_asset(lane, asset, time)
    }
    fn import_asset(&mut self, path: &Path, bin: Option<&str>) -> Result<AssetRef, BridgeError> { self.inner.import_asset(path, bin) }
    fn project_root(&mut self) -> Result<Option<PathBuf>, BridgeError> { self.inner.project_root() }
    fn container_roots(&mut self) -> Result<Vec<ContainerRef>, BridgeError> { self.inner.container_roots() }
    fn list_container(&mut self, c: &ContainerRef) -> Result<Vec<ContainerEntry>, BridgeError> { self.inner.list_container(c) }
    fn app_info(&mut self) -> Result<AppInfo, BridgeError> { self.inner.app_info() }
}

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.fallback_dir = None;
    settings
}

fn orchestrator(bridge: &BridgeHandle, client: Arc<dyn GenerationClient>, settings: Settings) -> Orchestrator {
    let index = Arc::new(AssetIndex::from_settings(&settings, Some(bridge.clone())));
    Orchestrator::new(bridge.clone(), client, index, settings).with_sleeper(Arc::new(RecordingSleeper::default()))
}

fn saved_host(project: &Path, lanes: usize) -> MemoryTimeline {
    let host = MemoryTimeline::new(lanes);
    host.set_project_root(Some(project.to_path_buf()));
    host
}

fn terminal_events(rx: &Receiver<JobEvent>, count: usize) -> Vec<JobEvent> {
    let mut out = Vec::new();
    while out.len() < count {
        let event = rx.recv_timeout(Duration::from_secs(10)).expect("job did not finish");
        if event.status.is_terminal() {
            out.push(event);
        }
    }
    out
}

fn in_out_panel() -> PanelState { PanelState::default().reduce(PanelAction::SetMode(GenerationMode::InOut)) }

#[test]
fn rate_limited_twice_then_succeeds_after_two_backoffs() {
    let project = tempfile::tempdir().unwrap();
    let host = saved_host(project.path(), 2);
    host.set_playhead(3.0);
    let bridge = BridgeHandle::new(host.clone());
    let client = ScriptedClient::new(vec![
        Err(JobError::GenerationRateLimited("slow down".into())),
        Err(JobError::GenerationRateLimited("slow down".into())),
        Ok(b"audio".to_vec()),
    ]);
    let sleeper = Arc::new(RecordingSleeper::default());
    let orch = orchestrator(&bridge, client.clone(), test_settings()).with_sleeper(sleeper.clone());

    let job = orch.create_job("Door Slam", &PanelState::default()).unwrap();
    let mut seen = Vec::new();
    let outcome = orch.run_job(&job, &mut |s| seen.push(s)).unwrap();

    assert_eq!(client.calls(), 3);
    assert_eq!(*sleeper.0.lock(), vec![Duration::from_secs(2), Duration::from_secs(4)]);
    assert_eq!(seen.iter().filter(|s| matches!(s, JobStatus::Generating { .. })).count(), 3);
    assert_eq!(outcome.placement.final_time_seconds, Some(3.0));
    assert_eq!(outcome.saved_path, project.path().join("Audio").join("AI SFX").join("door_slam_1.mp3"));
    assert!(outcome.saved_path.exists());
}

#[test]
fn rejected_request_fails_without_retry() {
    let project = tempfile::tempdir().unwrap();
    let bridge = BridgeHandle::new(saved_host(project.path(), 1));
    let client = ScriptedClient::new(vec![Err(JobError::GenerationRejected { status: 422, body: "prompt too long".into() })]);
    let orch = orchestrator(&bridge, client.clone(), test_settings());

    let job = orch.create_job("wind", &PanelState::default()).unwrap();
    let failure = orch.run_job(&job, &mut |_| {}).unwrap_err();
    assert_eq!(client.calls(), 1);
    assert_eq!(failure.saved_path, None);
    assert!(failure.error.to_string().contains("prompt too long"));
}

#[test]
fn in_out_selection_drives_duration_and_target() {
    let project = tempfile::tempdir().unwrap();
    let host = saved_host(project.path(), 2);
    host.set_in_out(Some(30.0), Some(35.0));
    host.set_playhead(1.0);
    let bridge = BridgeHandle::new(host.clone());
    let orch = orchestrator(&bridge, ScriptedClient::always_ok(), test_settings());

    let job = orch.create_job("thunder", &in_out_panel()).unwrap();
    assert_eq!(job.request.duration_seconds, 5.0);
    assert_eq!(job.request.target_time_seconds, 30.0);

    let outcome = orch.run_job(&job, &mut |_| {}).unwrap();
    assert_eq!(outcome.placement.lane_index, Some(0));
    assert_eq!(host.clips_on(0)[0].start, 30.0);
    assert_eq!(host.imported()[0].name, "thunder_1.mp3");
}

#[test]
fn oversized_selection_is_refused_before_any_network_call() {
    let project = tempfile::tempdir().unwrap();
    let host = saved_host(project.path(), 2);
    host.set_in_out(Some(10.0), Some(40.0));
    let bridge = BridgeHandle::new(host);
    let client = ScriptedClient::always_ok();
    let handle = JobsRuntime::start(orchestrator(&bridge, client.clone(), test_settings()));

    let err = handle.submit("alarm", &in_out_panel()).unwrap_err();
    assert!(matches!(err, JobError::InvalidSelection(_)));
    handle.join_all();
    assert_eq!(client.calls(), 0);
    assert!(handle.rx_events.try_recv().is_err());
}

#[test]
fn each_job_keeps_the_playhead_it_was_created_with() {
    let project = tempfile::tempdir().unwrap();
    let host = saved_host(project.path(), 2);
    host.set_playhead(5.0);
    let bridge = BridgeHandle::new(host.clone());
    let (tx_release, rx_release) = unbounded();
    let (tx_entered, rx_entered) = unbounded();
    let client = Arc::new(GatedClient { release: rx_release, entered: tx_entered });
    let handle = JobsRuntime::start(orchestrator(&bridge, client, test_settings()));

    let first = handle.submit("glass", &PanelState::default()).unwrap();
    host.set_playhead(50.0);
    let second = handle.submit("metal", &PanelState::default()).unwrap();

    // Both jobs are generating at once before either is allowed to finish.
    for _ in 0..2 {
        rx_entered.recv_timeout(Duration::from_secs(10)).unwrap();
    }
    tx_release.send(()).unwrap();
    tx_release.send(()).unwrap();

    let events = terminal_events(&handle.rx_events, 2);
    handle.join_all();
    let time_of = |id: &str| match &events.iter().find(|e| e.id == id).unwrap().status {
        JobStatus::Done { final_time_seconds, .. } => *final_time_seconds,
        other => panic!("unexpected status {other:?}"),
    };
    assert_eq!(time_of(&first), Some(5.0));
    assert_eq!(time_of(&second), Some(50.0));
}

#[test]
fn failed_target_falls_back_to_current_playhead() {
    let project = tempfile::tempdir().unwrap();
    let inner = saved_host(project.path(), 1);
    inner.set_in_out(Some(8.0), Some(12.0));
    let bridge = BridgeHandle::new(PickyHost { inner: inner.clone(), refuse_at: 8.0 });
    let orch = orchestrator(&bridge, ScriptedClient::always_ok(), test_settings());

    let job = orch.create_job("rumble", &in_out_panel()).unwrap();
    inner.set_playhead(20.0);
    let outcome = orch.run_job(&job, &mut |_| {}).unwrap();
    assert!(outcome.used_fallback);
    assert_eq!(outcome.placement.final_time_seconds, Some(20.0));
    assert_eq!(inner.clips_on(0)[0].start, 20.0);
}

#[test]
fn unplaceable_asset_is_reported_with_its_saved_path() {
    let project = tempfile::tempdir().unwrap();
    let host = saved_host(project.path(), 2);
    host.set_reject_inserts(true);
    let bridge = BridgeHandle::new(host);
    let ledger = Arc::new(Mutex::new(ProjectDb::open_in_memory().unwrap()));
    let orch = orchestrator(&bridge, ScriptedClient::always_ok(), test_settings()).with_ledger(ledger.clone());
    let handle = JobsRuntime::start(orch);

    let id = handle.submit("bell", &PanelState::default()).unwrap();
    let events = terminal_events(&handle.rx_events, 1);
    handle.join_all();
    let JobStatus::Failed { error, saved_path } = &events[0].status else { panic!("expected failure") };
    assert!(error.contains("insert refused"));
    let saved_path = saved_path.clone().unwrap();
    assert!(saved_path.exists());

    let row = ledger.lock().job(&id).unwrap().unwrap();
    assert_eq!(row.state, LedgerState::Failed);
    assert_eq!(row.saved_path, Some(saved_path.clone()));
    assert_eq!(ledger.lock().unplaced_assets().unwrap(), vec![saved_path]);
}

#[test]
fn write_failure_aborts_before_placement() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"x").unwrap();
    let host = MemoryTimeline::new(1);
    let bridge = BridgeHandle::new(host.clone());
    let mut settings = test_settings();
    settings.fallback_dir = Some(blocker.join("sfx"));
    let orch = orchestrator(&bridge, ScriptedClient::always_ok(), settings);

    let job = orch.create_job("splash", &PanelState::default()).unwrap();
    let failure = orch.run_job(&job, &mut |_| {}).unwrap_err();
    assert!(matches!(failure.error, JobError::PersistenceFailure(_)));
    assert_eq!(failure.saved_path, None);
    assert!(host.imported().is_empty());
}

#[test]
fn unsaved_project_without_fallback_is_reported() {
    let bridge = BridgeHandle::new(MemoryTimeline::new(1));
    let orch = orchestrator(&bridge, ScriptedClient::always_ok(), test_settings());
    let job = orch.create_job("hum", &PanelState::default()).unwrap();
    let failure = orch.run_job(&job, &mut |_| {}).unwrap_err();
    assert_eq!(failure.error, JobError::ProjectUnsaved);
}

#[test]
fn second_generation_of_a_prompt_gets_the_next_number() {
    let project = tempfile::tempdir().unwrap();
    let host = saved_host(project.path(), 2);
    let bridge = BridgeHandle::new(host.clone());
    let orch = orchestrator(&bridge, ScriptedClient::always_ok(), test_settings());

    let first = orch.run_job(&orch.create_job("Laser Zap", &PanelState::default()).unwrap(), &mut |_| {}).unwrap();
    host.set_playhead(30.0);
    let second = orch.run_job(&orch.create_job("laser zap", &PanelState::default()).unwrap(), &mut |_| {}).unwrap();
    assert_eq!(first.saved_path.file_name().unwrap(), "laser_zap_1.mp3");
    assert_eq!(second.saved_path.file_name().unwrap(), "laser_zap_2.mp3");
    assert_eq!(orch.index().search("laser").len(), 2);
}

#[test]
fn jobs_can_read_the_timeline_through_a_running_monitor() {
    let project = tempfile::tempdir().unwrap();
    let host = saved_host(project.path(), 1);
    host.set_in_out(Some(2.0), Some(6.0));
    let bridge = BridgeHandle::new(host.clone());
    let settings = test_settings();
    let mut monitor = MonitorRuntime::start(bridge.clone(), settings.poll_intervals());
    let orch = orchestrator(&bridge, ScriptedClient::always_ok(), settings).with_monitor(monitor.shared());

    let job = orch.create_job("click", &in_out_panel()).unwrap();
    assert_eq!((job.request.target_time_seconds, job.request.duration_seconds), (2.0, 4.0));
    let outcome = orch.run_job(&job, &mut |_| {}).unwrap();
    assert_eq!(outcome.placement.final_time_seconds, Some(2.0));
    monitor.stop();
}

#[test]
fn auto_mode_uses_the_configured_duration_unless_the_panel_overrides_it() {
    let project = tempfile::tempdir().unwrap();
    let host = saved_host(project.path(), 1);
    host.set_playhead(8.0);
    let bridge = BridgeHandle::new(host.clone());
    let mut settings = Settings::from_toml_str("auto_duration_seconds = 4.0").unwrap();
    settings.fallback_dir = None;
    let orch = orchestrator(&bridge, ScriptedClient::always_ok(), settings);

    let auto = PanelState::default().reduce(PanelAction::SetMode(GenerationMode::Auto));
    let job = orch.create_job("rain loop", &auto).unwrap();
    assert_eq!((job.request.target_time_seconds, job.request.duration_seconds), (8.0, 4.0));

    let pinned = auto.reduce(PanelAction::SetAutoDuration(Some(7.0)));
    assert_eq!(orch.create_job("rain loop", &pinned).unwrap().request.duration_seconds, 7.0);
}
