use std::sync::atomic::AtomicUsize;

use super::*;

fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> ScheduledTask) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let make = move |label: &str| -> ScheduledTask {
        let sink = sink.clone();
        let label = label.to_string();
        Box::new(move || sink.lock().expect("lock").push(label))
    };
    (log, make)
}

#[test]
fn manual_scheduler_runs_due_tasks_in_order() {
    let scheduler = ManualScheduler::new();
    let (log, task) = recorder();

    scheduler.schedule(Duration::from_millis(200), task("late"));
    scheduler.schedule(Duration::from_millis(100), task("early"));
    let cancelled = scheduler.schedule(Duration::from_millis(150), task("cancelled"));
    cancelled.cancel();
    assert_eq!(scheduler.pending(), 2);

    scheduler.advance(Duration::from_millis(99));
    assert!(log.lock().expect("lock").is_empty());

    scheduler.advance(Duration::from_millis(200));
    assert_eq!(*log.lock().expect("lock"), vec!["early", "late"]);
    assert_eq!(scheduler.pending(), 0);
    assert_eq!(scheduler.now(), Duration::from_millis(299));
}

#[test]
fn burst_of_keystrokes_runs_once_with_last_value() {
    let scheduler = Arc::new(ManualScheduler::new());
    let debouncer = Debouncer::with_default_delay(scheduler.clone());
    let (log, _) = recorder();

    for query in ["a", "ad", "ada"] {
        let log = log.clone();
        debouncer.call(move || log.lock().expect("lock").push(query.to_string()));
        scheduler.advance(Duration::from_millis(100));
    }
    assert!(log.lock().expect("lock").is_empty());

    scheduler.advance(DEFAULT_DEBOUNCE);
    assert_eq!(*log.lock().expect("lock"), vec!["ada"]);

    // A new quiet period after the first one fires again.
    let again = log.clone();
    debouncer.call(move || again.lock().expect("lock").push("grace".to_string()));
    scheduler.advance(Duration::from_millis(300));
    assert_eq!(*log.lock().expect("lock"), vec!["ada", "grace"]);
}

#[test]
fn cancel_and_drop_discard_the_pending_call() {
    let scheduler = Arc::new(ManualScheduler::new());
    let runs = Arc::new(AtomicUsize::new(0));

    let debouncer = Debouncer::new(scheduler.clone(), Duration::from_millis(50));
    let counter = runs.clone();
    debouncer.call(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    debouncer.cancel();
    scheduler.advance(Duration::from_millis(100));
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    let counter = runs.clone();
    debouncer.call(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    drop(debouncer);
    scheduler.advance(Duration::from_millis(100));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn tokio_scheduler_honours_delay_and_cancellation() {
    let scheduler = Arc::new(TokioScheduler::current());
    let runs = Arc::new(AtomicUsize::new(0));
    let debouncer = Debouncer::new(scheduler, Duration::from_millis(300));

    for _ in 0..3 {
        let counter = runs.clone();
        debouncer.call(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}
