//! Foreground liveness monitor.
//!
//! While the UI is visible, a background task polls the engine once per
//! second and lets it force-terminate sessions the host failed to end on
//! time (an alarm that never fired, a count-up left running overnight).
//! Leaving the foreground stops the task; entering it again replaces it.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::timer::{TimerHandle, TimerSnapshot};

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

struct MonitorTask {
    handle: JoinHandle<()>,
    stop: watch::Sender<bool>,
}

pub struct ForegroundMonitor {
    timer: TimerHandle,
    task: Option<MonitorTask>,
}

impl ForegroundMonitor {
    pub fn new(timer: TimerHandle) -> Self {
        Self { timer, task: None }
    }

    /// Start polling, replacing any task left from an earlier entry.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_enter_foreground(&mut self) {
        self.timer.on_bring_to_foreground();
        self.stop_task();
        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run(self.timer.clone(), stop_rx));
        self.task = Some(MonitorTask { handle, stop });
        debug!("liveness monitor started");
    }

    pub fn on_exit_foreground(&mut self) {
        self.timer.on_send_to_background();
        self.stop_task();
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    fn stop_task(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.stop.send(true);
            task.handle.abort();
            debug!("liveness monitor stopped");
        }
    }
}

impl Drop for ForegroundMonitor {
    fn drop(&mut self) {
        self.stop_task();
    }
}

fn observe(snapshots: &mut watch::Receiver<TimerSnapshot>) -> (bool, u64) {
    let snapshot = snapshots.borrow_and_update();
    (snapshot.state.is_active(), snapshot.start_time)
}

async fn run(timer: TimerHandle, mut stop: watch::Receiver<bool>) {
    let mut snapshots = timer.subscribe();

    'monitor: loop {
        if *stop.borrow() {
            break;
        }

        let (active, mut session_start) = observe(&mut snapshots);
        if !active {
            tokio::select! {
                _ = stop.changed() => break 'monitor,
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break 'monitor;
                    }
                }
            }
            continue;
        }

        debug!(session_start, "monitoring active session");
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.changed() => break 'monitor,
                _ = ticker.tick() => {
                    let events = timer.check_liveness();
                    if !events.is_empty() {
                        info!(count = events.len(), "liveness check ended the session");
                    }
                }
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break 'monitor;
                    }
                    let (active, start) = observe(&mut snapshots);
                    if !active {
                        break;
                    }
                    if start != session_start {
                        debug!(start, "tracking newer session");
                        session_start = start;
                        ticker.reset_immediately();
                    }
                }
            }
        }
    }
}
