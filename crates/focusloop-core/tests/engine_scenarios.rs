//! End-to-end timer scenarios driven through the public API with a manual
//! clock and in-memory stores.

use std::sync::Arc;
use std::time::Duration;

use focusloop_core::{
    EngineSettings, Event, FinishActionType, Label, ManualClock, MemoryStore, RecordingListener,
    Streak, StoredSettings, TimerEngine, TimerProfile, TimerSnapshot, TimerState, TimerType,
};
use focusloop_core::timer::{BreakBudget, COUNT_UP_HARD_LIMIT_MS, ONE_MINUTE_MS};

const MIN: u64 = ONE_MINUTE_MS;
const WALL_START: i64 = 1_700_000_000_000;

struct Rig {
    engine: TimerEngine,
    clock: ManualClock,
    store: Arc<MemoryStore>,
    events: RecordingListener,
}

impl Rig {
    fn new(profile: TimerProfile) -> Self {
        Self::with_settings(StoredSettings {
            engine: EngineSettings {
                label: Label::new("scenario", profile),
                ..EngineSettings::default()
            },
            ..StoredSettings::default()
        })
    }

    fn with_settings(settings: StoredSettings) -> Self {
        let clock = ManualClock::new(WALL_START, 0);
        let store = Arc::new(MemoryStore::with_settings(settings));
        let events = RecordingListener::new();
        let engine = TimerEngine::new(
            Arc::new(clock.clone()),
            store.clone(),
            store.clone(),
            vec![Box::new(events.clone())],
        )
        .expect("engine");
        Self {
            engine,
            clock,
            store,
            events,
        }
    }

    /// Move the boot clock to `elapsed`, wall clock alongside it.
    fn at(&self, elapsed: u64) {
        self.clock.set_elapsed(elapsed);
        self.clock.set_wall(WALL_START + elapsed as i64);
    }
}

fn long_breaks() -> TimerProfile {
    TimerProfile {
        is_long_break_enabled: true,
        sessions_before_long_break: 4,
        ..TimerProfile::default()
    }
}

#[test]
fn reset_countdown_base_time_is_full_duration() {
    for minutes in [1u32, 25, 90] {
        let mut rig = Rig::new(TimerProfile {
            work_duration: minutes,
            ..TimerProfile::default()
        });
        assert_eq!(rig.engine.base_time(), i64::from(minutes) * 60_000);
    }
}

#[test]
fn pause_does_not_consume_countdown_time() {
    let mut rig = Rig::new(TimerProfile::default());
    rig.at(0);
    rig.engine.start(TimerType::Work);
    rig.at(300_000);
    rig.engine.toggle();
    rig.at(360_000);
    rig.engine.toggle();
    assert_eq!(rig.engine.base_time(), 1_200_000);
}

#[test]
fn count_up_budget_accrues_across_pause() {
    let mut rig = Rig::new(TimerProfile::count_up(4));
    rig.engine.start(TimerType::Work);
    rig.at(8 * MIN);
    rig.engine.toggle();
    assert_eq!(
        rig.engine.break_budget_ledger().persisted_amount(),
        Duration::from_secs(2 * 60)
    );

    rig.engine.toggle();
    rig.at(12 * MIN);
    rig.engine.toggle();
    assert_eq!(
        rig.engine.break_budget_ledger().persisted_amount(),
        Duration::from_secs(3 * 60)
    );

    rig.engine.flush();
    assert_eq!(
        rig.store.break_budget(),
        BreakBudget::new(Duration::from_secs(3 * 60), 12 * MIN)
    );
}

#[test]
fn idle_time_before_count_up_start_spends_budget() {
    let mut rig = Rig::new(TimerProfile::count_up(3));
    rig.engine.start(TimerType::Work);
    rig.at(12 * MIN);
    rig.engine.reset(FinishActionType::ManualReset);
    assert_eq!(rig.engine.break_budget_ledger().persisted_amount(), Duration::from_secs(4 * 60));

    rig.at(15 * MIN);
    assert_eq!(rig.engine.break_budget(), Duration::from_secs(60));

    rig.engine.start(TimerType::Work);
    rig.at(27 * MIN);
    rig.engine.reset(FinishActionType::ManualReset);
    assert_eq!(rig.engine.break_budget_ledger().persisted_amount(), Duration::from_secs(5 * 60));
}

#[test]
fn existing_budget_sets_count_up_break_length() {
    let mut rig = Rig::with_settings(StoredSettings {
        engine: EngineSettings {
            label: Label::new("reading", TimerProfile::count_up(3)),
            auto_start_work: true,
            ..EngineSettings::default()
        },
        break_budget: BreakBudget::new(Duration::from_secs(3 * 60), 0),
        streak: Streak::default(),
    });

    rig.engine.start(TimerType::Work);
    rig.engine.next(FinishActionType::ManualNext);
    assert_eq!(rig.engine.snapshot().session_type, TimerType::Break);
    assert_eq!(rig.engine.snapshot().end_time, 3 * MIN);

    rig.at(MIN);
    assert_eq!(rig.engine.break_budget(), Duration::from_secs(2 * 60));

    rig.at(3 * MIN);
    rig.engine.finish(FinishActionType::ManualNext);
    assert_eq!(
        rig.events.events(),
        vec![
            Event::Start {
                end_time: COUNT_UP_HARD_LIMIT_MS,
                auto_started: false
            },
            Event::Finished {
                session_type: TimerType::Work,
                auto_start_next: true
            },
            Event::Start {
                end_time: 3 * MIN,
                auto_started: true
            },
            Event::Finished {
                session_type: TimerType::Break,
                auto_start_next: true
            },
            Event::Start {
                end_time: 3 * MIN + COUNT_UP_HARD_LIMIT_MS,
                auto_started: true
            },
        ]
    );
    assert_eq!(rig.engine.snapshot().session_type, TimerType::Work);
}

#[test]
fn countdown_profiles_never_touch_the_budget() {
    let mut rig = Rig::with_settings(StoredSettings {
        engine: EngineSettings {
            label: Label::new("scenario", TimerProfile::default()),
            ..EngineSettings::default()
        },
        break_budget: BreakBudget::new(Duration::from_secs(600), 0),
        streak: Streak::default(),
    });
    rig.engine.start(TimerType::Work);
    rig.at(10 * MIN);
    assert_eq!(rig.engine.break_budget(), Duration::ZERO);
    rig.engine.next(FinishActionType::ManualNext);
    rig.engine.flush();
    assert_eq!(
        rig.store.break_budget(),
        BreakBudget::new(Duration::from_secs(600), 0)
    );
}

#[test]
fn long_break_after_fourth_session() {
    let mut rig = Rig::new(long_breaks());
    let mut now = 0;
    for session in 1..=4 {
        if session == 1 {
            rig.engine.start(TimerType::Work);
        } else {
            rig.engine.next(FinishActionType::ManualNext);
            assert_eq!(rig.engine.snapshot().session_type, TimerType::Work);
        }
        now += 2 * MIN;
        rig.at(now);
        rig.engine.finish(FinishActionType::ManualNext);
        rig.engine.next(FinishActionType::ManualNext);
        assert_eq!(rig.engine.streak().count, session);
        let expected = if session == 4 {
            TimerType::LongBreak
        } else {
            TimerType::Break
        };
        assert_eq!(rig.engine.snapshot().session_type, expected, "after session {session}");
    }
    assert_eq!(rig.engine.snapshot().end_time, now + 15 * MIN);
}

#[test]
fn long_break_after_resets_and_a_final_next() {
    let mut rig = Rig::new(long_breaks());
    let mut now = 0;
    for session in 1..=4u32 {
        rig.engine.start(TimerType::Work);
        now += 2 * MIN;
        rig.at(now);
        rig.engine.finish(FinishActionType::ManualNext);
        if session < 4 {
            rig.engine.reset(FinishActionType::ManualReset);
        }
        assert_eq!(rig.engine.streak().count, session);
    }
    rig.engine.next(FinishActionType::ManualNext);
    assert_eq!(rig.engine.snapshot().session_type, TimerType::LongBreak);
}

#[test]
fn idle_streak_goes_cold() {
    let mut rig = Rig::new(long_breaks());
    let mut now = 0;
    rig.engine.start(TimerType::Work);
    for _ in 0..3 {
        now += 2 * MIN;
        rig.at(now);
        rig.engine.next(FinishActionType::ManualNext); // work -> break
        rig.engine.next(FinishActionType::ManualNext); // break -> work
    }
    assert_eq!(rig.engine.streak().count, 3);
    rig.engine.reset(FinishActionType::ManualReset);

    now += 60 * MIN + 1;
    rig.at(now);
    rig.engine.start(TimerType::Work);
    assert_eq!(rig.engine.streak(), Streak::default());

    now += 2 * MIN;
    rig.at(now);
    rig.engine.next(FinishActionType::ManualNext);
    assert_eq!(rig.engine.streak().count, 1);
    assert_eq!(rig.engine.snapshot().session_type, TimerType::Break);
}

#[test]
fn long_pause_is_not_idle_time_for_the_streak() {
    let mut rig = Rig::new(TimerProfile::default());
    rig.engine.start(TimerType::Work);
    rig.at(1);
    rig.engine.toggle();
    rig.at(1 + 2 * 60 * MIN);
    rig.engine.toggle();
    rig.engine.finish(FinishActionType::ManualNext);
    assert_eq!(rig.engine.streak().count, 1);
}

#[test]
fn session_floor_is_one_minute() {
    let mut rig = Rig::new(TimerProfile::default());
    rig.engine.start(TimerType::Work);
    rig.at(59_999);
    rig.engine.reset(FinishActionType::ManualReset);
    rig.engine.start(TimerType::Work);
    rig.at(59_999 + MIN);
    rig.engine.reset(FinishActionType::ManualReset);

    rig.engine.flush();
    let sessions = rig.store.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].duration_min, 1);
    assert_eq!(sessions[0].label, "scenario");
}

#[test]
fn break_sessions_are_recorded_as_breaks() {
    let mut rig = Rig::new(TimerProfile::default());
    rig.engine.start(TimerType::Work);
    rig.at(MIN);
    rig.engine.next(FinishActionType::ManualNext);
    rig.at(2 * MIN);
    rig.engine.next(FinishActionType::ManualNext);

    rig.engine.flush();
    let sessions = rig.store.sessions();
    assert_eq!(sessions.len(), 2);
    assert!(sessions[0].is_work);
    assert!(!sessions[1].is_work);
    assert_eq!(sessions[1].end_timestamp, WALL_START + (2 * MIN) as i64);
}

#[test]
fn persistence_failures_do_not_break_the_timer() {
    let mut rig = Rig::new(TimerProfile::count_up(3));
    rig.store.set_failing(true);

    rig.engine.start(TimerType::Work);
    rig.at(9 * MIN);
    rig.engine.next(FinishActionType::ManualNext);
    assert_eq!(rig.engine.snapshot().state, TimerState::Running);
    assert_eq!(rig.engine.break_budget_ledger().persisted_amount(), Duration::from_secs(3 * 60));

    rig.engine.flush();
    assert!(rig.store.sessions().is_empty());
    assert_eq!(rig.store.break_budget(), BreakBudget::default());
}

#[test]
fn boot_clock_regression_is_clamped() {
    let mut rig = Rig::new(TimerProfile::default());
    rig.at(10 * MIN);
    rig.engine.start(TimerType::Work);
    rig.at(5 * MIN);
    // Still 25 minutes left: the regression is ignored.
    assert_eq!(rig.engine.base_time(), 25 * 60_000);
    rig.engine.toggle();
    assert_eq!(rig.engine.snapshot().last_pause_time, 10 * MIN);
}

#[test]
fn snapshot_from_before_reboot_is_discarded() {
    let mut rig = Rig::new(TimerProfile::default());
    let stale = TimerSnapshot {
        start_time: 90 * MIN,
        last_start_time: 90 * MIN,
        end_time: 115 * MIN,
        state: TimerState::Running,
        ..TimerSnapshot::ready(Label::default())
    };
    rig.at(MIN);
    assert!(!rig.engine.restore(stale));
    assert_eq!(rig.engine.snapshot().state, TimerState::Reset);
}

#[test]
fn restored_snapshot_resumes_and_expires() {
    let mut first = Rig::new(TimerProfile::default());
    first.engine.start(TimerType::Work);
    first.at(5 * MIN);
    first.engine.toggle();
    let persisted = first.engine.snapshot().clone();

    let mut second = Rig::new(TimerProfile::default());
    second.at(6 * MIN);
    assert!(second.engine.restore(persisted));
    assert_eq!(second.engine.snapshot().state, TimerState::Paused);
    second.engine.toggle();
    assert_eq!(second.engine.snapshot().end_time, 26 * MIN);

    second.at(26 * MIN);
    let events = second.engine.check_liveness();
    assert_eq!(
        events,
        vec![Event::Finished {
            session_type: TimerType::Work,
            auto_start_next: false
        }]
    );
}

#[test]
fn reboot_keeps_budget_but_drops_streak() {
    let mut rig = Rig::with_settings(StoredSettings {
        engine: EngineSettings {
            label: Label::new("scenario", long_breaks()),
            ..EngineSettings::default()
        },
        break_budget: BreakBudget::new(Duration::from_secs(120), 500 * MIN),
        streak: Streak::new(3, 480 * MIN),
    });
    rig.at(MIN);
    assert_eq!(
        rig.engine.break_budget_ledger().persisted().remaining(MIN),
        Duration::from_secs(120)
    );
    rig.engine.start(TimerType::Work);
    assert_eq!(rig.engine.streak(), Streak::default());
}

#[test]
fn restart_picks_up_stored_changes() {
    let mut rig = Rig::new(TimerProfile::default());
    rig.engine.start(TimerType::Work);
    rig.at(25 * MIN);
    rig.engine.finish(FinishActionType::ManualNext);
    rig.events.clear();

    rig.store.set_engine_settings(EngineSettings {
        label: Label::new("deep", TimerProfile {
            work_duration: 50,
            ..TimerProfile::default()
        }),
        ..EngineSettings::default()
    });
    assert_eq!(rig.engine.restart(), vec![Event::Reset]);
    assert_eq!(rig.engine.snapshot().label.name, "deep");
    assert_eq!(rig.engine.base_time(), 50 * 60_000);
}
