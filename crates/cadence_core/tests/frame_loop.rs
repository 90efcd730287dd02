//! Drives the clock, the interval scheduler and the phase executor together
//! the way a world update loop does.

use cadence_core::{
    IntervalScheduler, PhaseExecutor, PriorityClock, TaskDescriptor, TaskKey, TickBudget,
    UpdateDescriptor, UpdatePhase,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const FRAME: Duration = Duration::from_micros(16_666);

#[test]
fn many_tasks_on_one_cadence_run_evenly() {
    let scheduler = IntervalScheduler::new();
    let mut clock = PriorityClock::new();
    let counters: Vec<Arc<AtomicUsize>> = (0..300).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    for (instance, counter) in counters.iter().enumerate() {
        let counter = counter.clone();
        scheduler
            .register(
                TaskDescriptor::new(TaskKey::new(0xC0DE, instance), move |_| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                })
                .interval(Duration::from_millis(100)),
            )
            .unwrap();
    }

    for _ in 0..3000 {
        let now = clock.advance(FRAME);
        scheduler.run_due_tasks(now, true);
    }

    let counts: Vec<usize> = counters.iter().map(|c| c.load(Ordering::Relaxed)).collect();
    let min = *counts.iter().min().unwrap();
    let max = *counts.iter().max().unwrap();
    assert!(min > 0);
    assert!(max - min <= 1);
}

#[test]
fn budgeted_scheduler_catches_up_after_pause() {
    let scheduler = IntervalScheduler::with_budget(TickBudget {
        max_runs: Some(2),
        max_time: None,
    });
    let mut clock = PriorityClock::with_granularity(Duration::from_millis(10));
    let runs = Arc::new(AtomicUsize::new(0));
    for instance in 0..6 {
        let runs = runs.clone();
        scheduler
            .register(
                TaskDescriptor::new(TaskKey::new(1, instance), move |_| {
                    runs.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                })
                .only_when_active(true),
            )
            .unwrap();
    }

    // Paused: nothing runs, nothing is lost.
    for _ in 0..10 {
        let now = clock.advance(FRAME);
        let report = scheduler.run_due_tasks(now, false);
        assert_eq!(report.ran, 0);
    }
    assert_eq!(runs.load(Ordering::Relaxed), 0);

    // Resumed: two per tick, every task reached within three ticks.
    for _ in 0..3 {
        let now = clock.advance(FRAME);
        scheduler.run_due_tasks(now, true);
    }
    assert_eq!(runs.load(Ordering::Relaxed), 6);
    for instance in 0..6 {
        assert_eq!(scheduler.run_count(TaskKey::new(1, instance)), Some(1));
    }
}

#[test]
fn world_tick_runs_phases_and_tasks() {
    let executor = PhaseExecutor::with_worker_threads(2).unwrap();
    let scheduler = IntervalScheduler::new();
    let mut clock = PriorityClock::new();
    let trace = Arc::new(Mutex::new(Vec::new()));

    let log = trace.clone();
    executor
        .register(UpdateDescriptor::new(TaskKey::new(1, 0), "input", move |_| {
            log.lock().unwrap().push("input");
            Ok(())
        }))
        .unwrap();
    let log = trace.clone();
    executor
        .register(
            UpdateDescriptor::new(TaskKey::new(2, 0), "animate", move |ctx| {
                if ctx.first == 0 {
                    log.lock().unwrap().push("animate");
                }
                Ok(())
            })
            .phase(UpdatePhase::Parallel)
            .batch_size(64),
        )
        .unwrap();
    let log = trace.clone();
    executor
        .register(
            UpdateDescriptor::new(TaskKey::new(3, 0), "transforms", move |_| {
                log.lock().unwrap().push("transforms");
                Ok(())
            })
            .phase(UpdatePhase::PostTransform),
        )
        .unwrap();
    let log = trace.clone();
    scheduler
        .register(
            TaskDescriptor::new(TaskKey::new(4, 0), move |_| {
                log.lock().unwrap().push("script");
                Ok(())
            })
            .interval(Duration::from_millis(30)),
        )
        .unwrap();

    for _ in 0..3 {
        let now = clock.advance(FRAME);
        scheduler.run_due_tasks(now, true);
        executor.run_all_phases(true, 0..256);
    }

    let trace = trace.lock().unwrap();
    assert_eq!(
        *trace,
        vec![
            "script", "input", "animate", "transforms", // frame 1
            "input", "animate", "transforms", // frame 2: script not due yet
            "script", "input", "animate", "transforms", // frame 3
        ]
    );
}
