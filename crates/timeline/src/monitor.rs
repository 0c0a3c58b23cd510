//! Freshest-known timeline state with minimal bridge traffic.
//!
//! Host push events and a focus-dependent poll timer both end in the same
//! [`TimelineMonitor::refresh`], and subscribers only hear about a snapshot
//! when its change hash moved. Either trigger can be missing without
//! affecting correctness, only latency.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::bridge::BridgeHandle;
use crate::snapshot::TimelineSnapshot;

const BRIDGE_WAIT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub focused: Duration,
    pub unfocused: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self { Self { focused: Duration::from_millis(1000), unfocused: Duration::from_millis(5000) } }
}

impl PollIntervals {
    pub fn for_focus(&self, focused: bool) -> Duration { if focused { self.focused } else { self.unfocused } }
}

pub struct TimelineMonitor {
    bridge: BridgeHandle,
    last_good: Option<TimelineSnapshot>,
    last_hash: Option<u64>,
    subscribers: Vec<Sender<TimelineSnapshot>>,
}

impl TimelineMonitor {
    pub fn new(bridge: BridgeHandle) -> Self { Self { bridge, last_good: None, last_hash: None, subscribers: Vec::new() } }

    /// Receive a snapshot each time the selection state actually changes.
    pub fn subscribe(&mut self) -> Receiver<TimelineSnapshot> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn latest(&self) -> Option<&TimelineSnapshot> { self.last_good.as_ref() }

    /// Query the host. On failure, or when the bridge is busy, the last known
    /// good snapshot comes back marked stale; this never errors.
    pub fn refresh(&mut self) -> TimelineSnapshot {
        let outcome = self.bridge.try_with(BRIDGE_WAIT, |b| b.snapshot());
        let raw = match outcome {
            Some(Ok(raw)) => raw,
            Some(Err(e)) => {
                warn!("timeline query failed, serving last known state: {e}");
                return self.stale();
            }
            None => {
                debug!("bridge busy, serving last known state");
                return self.stale();
            }
        };
        let snap = TimelineSnapshot::from_raw(&raw);
        if self.last_hash != Some(snap.last_change_hash) {
            debug!(hash = snap.last_change_hash, in_point = ?snap.in_point, out_point = ?snap.out_point, "timeline selection changed");
            self.last_hash = Some(snap.last_change_hash);
            self.subscribers.retain(|tx| tx.send(snap.clone()).is_ok());
        }
        self.last_good = Some(snap.clone());
        snap
    }

    fn stale(&self) -> TimelineSnapshot { self.last_good.clone().unwrap_or_default().mark_stale() }
}

pub type SharedMonitor = Arc<Mutex<TimelineMonitor>>;

pub struct MonitorHandle {
    monitor: SharedMonitor,
    focused: Arc<AtomicBool>,
    push_supported: bool,
    tx_poke: Sender<()>,
    tx_stop: Sender<()>,
    worker: Option<JoinHandle<()>>,
    pub rx_changes: Receiver<TimelineSnapshot>,
}

pub struct MonitorRuntime;

impl MonitorRuntime {
    pub fn start(bridge: BridgeHandle, intervals: PollIntervals) -> MonitorHandle {
        let (tx_poke, rx_poke) = unbounded::<()>();
        let (tx_stop, rx_stop) = bounded::<()>(1);
        let push_supported = bridge.with(|b| b.subscribe(tx_poke.clone()));
        if !push_supported {
            debug!("host has no change events, polling only");
        }
        let mut monitor = TimelineMonitor::new(bridge);
        let rx_changes = monitor.subscribe();
        let monitor = Arc::new(Mutex::new(monitor));
        let focused = Arc::new(AtomicBool::new(false));

        let worker = {
            let monitor = monitor.clone();
            let focused = focused.clone();
            thread::spawn(move || {
                monitor.lock().refresh();
                loop {
                    let interval = intervals.for_focus(focused.load(Ordering::Relaxed));
                    crossbeam_channel::select! {
                        recv(rx_stop) -> _ => break,
                        recv(rx_poke) -> msg => {
                            if msg.is_err() { break; }
                            // A single user action often fires a burst of events.
                            while rx_poke.try_recv().is_ok() {}
                            monitor.lock().refresh();
                        }
                        default(interval) => {
                            monitor.lock().refresh();
                        }
                    }
                }
            })
        };

        MonitorHandle { monitor, focused, push_supported, tx_poke, tx_stop, worker: Some(worker), rx_changes }
    }
}

impl MonitorHandle {
    pub fn shared(&self) -> SharedMonitor { self.monitor.clone() }

    /// Tighter polling while the consuming surface has input focus.
    pub fn set_focused(&self, focused: bool) { self.focused.store(focused, Ordering::Relaxed); }

    pub fn push_supported(&self) -> bool { self.push_supported }

    /// Request an out-of-band refresh on the monitor thread.
    pub fn poke(&self) { let _ = self.tx_poke.send(()); }

    pub fn latest(&self) -> Option<TimelineSnapshot> { self.monitor.lock().latest().cloned() }

    pub fn stop(&mut self) {
        let _ = self.tx_stop.try_send(());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) { self.stop(); }
}
