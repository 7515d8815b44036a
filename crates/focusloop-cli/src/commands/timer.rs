use std::sync::Arc;
use std::time::Duration;

use clap::{Subcommand, ValueEnum};
use focusloop_core::storage::LocalStore;
use focusloop_core::{
    Event, FinishActionType, ForegroundMonitor, LogListener, Streak, SystemClock, TimerEngine,
    TimerHandle, TimerSnapshot, TimerType,
};
use serde::Serialize;
use tracing::warn;

const SNAPSHOT_KEY: &str = "timer_snapshot";

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

#[derive(Clone, Copy, ValueEnum)]
pub enum SessionKind {
    Work,
    Break,
    LongBreak,
}

impl From<SessionKind> for TimerType {
    fn from(kind: SessionKind) -> Self {
        match kind {
            SessionKind::Work => TimerType::Work,
            SessionKind::Break => TimerType::Break,
            SessionKind::LongBreak => TimerType::LongBreak,
        }
    }
}

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start a session
    Start {
        #[arg(long = "type", value_enum, default_value_t = SessionKind::Work)]
        kind: SessionKind,
    },
    /// Pause or resume the current session
    Toggle,
    /// Add one minute to the current countdown
    AddMinute,
    /// Abandon the current session and start the next one
    Skip,
    /// Finish the current session and start the next one
    Next,
    /// Finish the current session
    Finish,
    /// Reset to idle, recording at least a minute of work
    Reset {
        /// Drop the session without recording it
        #[arg(long)]
        discard: bool,
    },
    /// Print current timer state as JSON
    Status,
    /// Follow the timer with the liveness monitor running until Ctrl-C
    Watch,
}

#[derive(Serialize)]
struct Report<'a> {
    events: &'a [Event],
    snapshot: &'a TimerSnapshot,
    base_time_ms: i64,
    break_budget_ms: u64,
    streak: Streak,
}

fn open_engine(store: &Arc<LocalStore>) -> CliResult<TimerEngine> {
    let mut engine = TimerEngine::new(
        Arc::new(SystemClock::new()),
        store.clone(),
        store.clone(),
        vec![Box::new(LogListener)],
    )?;
    match store.database().kv_get_json::<TimerSnapshot>(SNAPSHOT_KEY) {
        Ok(Some(snapshot)) => {
            engine.restore(snapshot);
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "ignoring unreadable timer snapshot"),
    }
    Ok(engine)
}

fn save_snapshot(store: &LocalStore, snapshot: &TimerSnapshot) -> CliResult {
    store.database().kv_set_json(SNAPSHOT_KEY, snapshot)?;
    Ok(())
}

fn print_report(engine: &mut TimerEngine, events: &[Event]) -> CliResult {
    let base_time_ms = engine.base_time();
    let break_budget_ms = engine.break_budget().as_millis() as u64;
    let report = Report {
        events,
        snapshot: engine.snapshot(),
        base_time_ms,
        break_budget_ms,
        streak: engine.streak(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub fn run(action: TimerAction) -> CliResult {
    let store = Arc::new(LocalStore::open()?);
    let mut engine = open_engine(&store)?;

    // Sessions that ran out while nothing was watching end here.
    let mut events = engine.check_liveness();

    match action {
        TimerAction::Start { kind } => events.extend(engine.start(kind.into())),
        TimerAction::Toggle => events.extend(engine.toggle()),
        TimerAction::AddMinute => events.extend(engine.add_one_minute()),
        TimerAction::Skip => events.extend(engine.next(FinishActionType::ManualSkip)),
        TimerAction::Next => events.extend(engine.next(FinishActionType::ManualNext)),
        TimerAction::Finish => events.extend(engine.finish(FinishActionType::ManualNext)),
        TimerAction::Reset { discard } => {
            let action = if discard {
                FinishActionType::ManualDoNothing
            } else {
                FinishActionType::ManualReset
            };
            events.extend(engine.reset(action));
        }
        TimerAction::Status => {}
        TimerAction::Watch => return watch(engine, store),
    }

    print_report(&mut engine, &events)?;
    save_snapshot(&store, engine.snapshot())?;
    engine.flush();
    Ok(())
}

fn watch(engine: TimerEngine, store: Arc<LocalStore>) -> CliResult {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let timer = TimerHandle::new(engine);
        let mut snapshots = timer.subscribe();
        let mut monitor = ForegroundMonitor::new(timer.clone());
        monitor.on_enter_foreground();

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut ticker = tokio::time::interval(Duration::from_secs(1));

        loop {
            tokio::select! {
                _ = &mut ctrl_c => break,
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    save_snapshot(&store, &snapshot)?;
                    println!("{}", serde_json::to_string(&snapshot)?);
                }
                _ = ticker.tick() => {
                    let snapshot = timer.snapshot();
                    if snapshot.state.is_active() {
                        println!(
                            "{}",
                            serde_json::json!({
                                "state": snapshot.state,
                                "session_type": snapshot.session_type,
                                "base_time_ms": timer.base_time(),
                            })
                        );
                    }
                }
            }
        }

        monitor.on_exit_foreground();
        save_snapshot(&store, &timer.snapshot())?;
        timer.flush();
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
