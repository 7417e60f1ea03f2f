//! Wall-clock timer behavior against live actors.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hive_actors::{Agent, Context, Timer};

#[derive(Default)]
struct Clocked {
    fired: Arc<AtomicUsize>,
}

impl Agent for Clocked {}

#[test]
fn test_one_shot_fires_once() {
    let ctx = Context::new(1).unwrap();
    let fired = Arc::new(AtomicUsize::new(0));
    let actor = ctx
        .spawn(Clocked {
            fired: fired.clone(),
        })
        .unwrap();

    let timer = Timer::new(
        &actor,
        |clocked: &mut Clocked| {
            clocked.fired.fetch_add(1, Ordering::SeqCst);
        },
        Duration::from_millis(50),
        Duration::ZERO,
    );

    thread::sleep(Duration::from_millis(300));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    timer.dispose();
}

#[test]
fn test_periodic_fires_repeatedly_until_disposed() {
    let ctx = Context::new(1).unwrap();
    let fired = Arc::new(AtomicUsize::new(0));
    let actor = ctx
        .spawn(Clocked {
            fired: fired.clone(),
        })
        .unwrap();

    let timer = Timer::new(
        &actor,
        |clocked: &mut Clocked| {
            clocked.fired.fetch_add(1, Ordering::SeqCst);
        },
        Duration::from_millis(30),
        Duration::from_millis(30),
    );

    thread::sleep(Duration::from_millis(400));
    let seen = fired.load(Ordering::SeqCst);
    assert!(seen >= 3, "expected at least 3 fires, saw {seen}");

    timer.dispose();
    thread::sleep(Duration::from_millis(100));
    let frozen = fired.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150));
    assert_eq!(fired.load(Ordering::SeqCst), frozen);
}

#[test]
fn test_change_rearms_a_spent_one_shot() {
    let ctx = Context::new(1).unwrap();
    let fired = Arc::new(AtomicUsize::new(0));
    let actor = ctx
        .spawn(Clocked {
            fired: fired.clone(),
        })
        .unwrap();

    let timer = Timer::new(
        &actor,
        |clocked: &mut Clocked| {
            clocked.fired.fetch_add(1, Ordering::SeqCst);
        },
        Duration::from_millis(30),
        Duration::ZERO,
    );

    thread::sleep(Duration::from_millis(200));
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    timer.change(Duration::from_millis(30), Duration::ZERO);
    thread::sleep(Duration::from_millis(200));
    assert_eq!(fired.load(Ordering::SeqCst), 2);
    timer.dispose();
}

#[test]
fn test_timer_does_not_keep_target_alive() {
    let ctx = Context::new(1).unwrap();
    let fired = Arc::new(AtomicUsize::new(0));
    let actor = ctx
        .spawn(Clocked {
            fired: fired.clone(),
        })
        .unwrap();

    let _timer = Timer::new(
        &actor,
        |clocked: &mut Clocked| {
            clocked.fired.fetch_add(1, Ordering::SeqCst);
        },
        Duration::from_millis(50),
        Duration::from_millis(50),
    );

    actor.dispose();
    assert!(actor.join_timeout(Duration::from_secs(1)));
    drop(actor);

    // With the last strong handle gone the clock thread posts to nobody.
    thread::sleep(Duration::from_millis(200));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}
