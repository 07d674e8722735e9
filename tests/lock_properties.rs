mod common;

use common::{manager_on, options, FlakyStore};
use lease_mutex::{LockError, LockManager, LockState, MemoryStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn at_most_one_holder_at_a_time() {
    let store = Arc::new(MemoryStore::new());
    let inside = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let manager = manager_on(&store, options(60, 32));
        let inside = inside.clone();
        let peak = peak.clone();
        handles.push(tokio::spawn(async move {
            manager
                .run_exclusive(|| async move {
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
                .await
        }));
    }

    for handle in handles {
        let done = handle.await.unwrap().unwrap();
        assert!(done.released.unwrap());
    }
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn abandoned_lease_becomes_available_after_expiry() {
    let store = Arc::new(MemoryStore::new());
    let crashed = manager_on(&store, options(5, 1));
    let next = manager_on(&store, options(5, 1));

    crashed.lock().await.unwrap();

    tokio::time::advance(Duration::from_secs(4)).await;
    assert!(matches!(
        next.try_lock().await,
        Err(LockError::LockFailed { tries: 1, .. })
    ));

    tokio::time::advance(Duration::from_secs(1)).await;
    next.try_lock().await.unwrap();
    assert_eq!(store.holder("resource"), next.status().token);
}

#[tokio::test(start_paused = true)]
async fn stale_holder_cannot_release_newer_lease() {
    let store = Arc::new(MemoryStore::new());
    let stale = manager_on(&store, options(1, 1));
    let fresh = manager_on(&store, options(30, 1));

    stale.lock().await.unwrap();
    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(stale.status().state, LockState::Expired);

    fresh.lock().await.unwrap();
    let fresh_token = fresh.status().token;

    assert!(!stale.unlock().await.unwrap());
    assert!(!stale.is_held());
    assert_eq!(store.holder("resource"), fresh_token);

    assert!(fresh.unlock().await.unwrap());
    assert_eq!(store.holder("resource"), None);
}

#[tokio::test(start_paused = true)]
async fn exhausted_tries_bound_the_wait() {
    let store = Arc::new(MemoryStore::new());
    let holder = manager_on(&store, options(600, 1));
    let waiter = manager_on(&store, options(600, 4));
    holder.lock().await.unwrap();

    let start = Instant::now();
    let err = waiter.lock().await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, LockError::LockFailed { tries: 4, .. }));
    assert!(err.is_denied());
    assert!(elapsed >= Duration::from_millis(1500), "{:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(2000), "{:?}", elapsed);
    assert!(!waiter.is_held());
}

#[tokio::test(start_paused = true)]
async fn single_try_is_immediate() {
    let store = FlakyStore::new();
    let holder = manager_on(&store, options(600, 1));
    let loser = manager_on(&store, options(600, 1));
    holder.lock().await.unwrap();

    let start = Instant::now();
    let err = loser.lock().await.unwrap_err();

    assert!(matches!(err, LockError::LockFailed { tries: 1, .. }));
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(store.set_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn try_lock_ignores_configured_tries() {
    let store = FlakyStore::new();
    let holder = manager_on(&store, options(600, 1));
    let loser = manager_on(&store, options(600, 32));
    holder.lock().await.unwrap();

    let start = Instant::now();
    assert!(loser.try_lock().await.is_err());
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(store.set_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn unreachable_store_consumes_tries_and_surfaces() {
    let store = FlakyStore::new();
    let manager = manager_on(&store, options(10, 3));
    store.set_unavailable(true);

    let start = Instant::now();
    let err = manager.lock().await.unwrap_err();

    assert!(matches!(
        err,
        LockError::Store(ref e) if e.is_unavailable()
    ));
    assert!(!err.is_denied());
    assert_eq!(store.set_calls(), 3);
    assert_eq!(start.elapsed(), Duration::from_millis(1000));
    assert!(!manager.is_held());
}

#[tokio::test(start_paused = true)]
async fn store_recovering_between_attempts_still_acquires() {
    let store = FlakyStore::new();
    let manager = manager_on(&store, options(10, 5));
    store.set_unavailable(true);

    let flipper = store.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(700)).await;
        flipper.set_unavailable(false);
    });

    manager.lock().await.unwrap();
    assert_eq!(store.set_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn lost_reply_does_not_leak_the_key() {
    let store = FlakyStore::new();
    let manager = manager_on(&store, options(600, 1));
    store.set_lose_replies(true);

    let err = manager.lock().await.unwrap_err();
    assert!(matches!(err, LockError::Store(_)));
    assert_eq!(store.inner.holder("resource"), None);

    store.set_lose_replies(false);
    let other = manager_on(&store, options(600, 1));
    other.lock().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_cleanup_is_retried_before_next_attempt() {
    let store = FlakyStore::new();
    let manager = manager_on(&store, options(600, 3)).with_token_generator(|| "mine".to_string());
    store.set_lose_replies(true);
    store.set_fail_deletes(true);

    let flipper = store.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(700)).await;
        flipper.set_lose_replies(false);
        flipper.set_fail_deletes(false);
    });

    manager.lock().await.unwrap();
    assert_eq!(store.set_calls(), 3);
    assert_eq!(store.delete_calls(), 4);
    assert_eq!(store.inner.holder("resource").as_deref(), Some("mine"));
}

#[tokio::test(start_paused = true)]
async fn unbounded_durations_are_rejected_up_front() {
    let store = Arc::new(MemoryStore::new());
    let huge_expiry = options(600, 1).with_expiry(Duration::MAX);
    let huge_delay = options(600, 2).with_retry_delay(Duration::MAX);

    for options in [huge_expiry, huge_delay] {
        let err = LockManager::new("resource", store.clone(), options).err();
        assert!(matches!(err, Some(LockError::InvalidOptions(_))));
    }
}

#[tokio::test(start_paused = true)]
async fn unlock_reports_store_failure() {
    let store = FlakyStore::new();
    let manager = manager_on(&store, options(600, 1));
    manager.lock().await.unwrap();

    store.set_unavailable(true);
    let err = manager.unlock().await.unwrap_err();

    assert!(matches!(err, LockError::Store(_)));
    assert!(!manager.is_held());
    assert!(store.inner.holder("resource").is_some());
}

#[tokio::test(start_paused = true)]
async fn deadline_stops_waiting() {
    let store = Arc::new(MemoryStore::new());
    let holder = manager_on(&store, options(600, 1));
    let waiter = manager_on(&store, options(600, 32));
    holder.lock().await.unwrap();

    let start = Instant::now();
    let err = waiter
        .lock_with_deadline(start + Duration::from_millis(1200))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LockError::DeadlineExceeded { attempts: 3, .. }
    ));
    assert_eq!(start.elapsed(), Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn scoped_section_releases_on_error_value() {
    let store = Arc::new(MemoryStore::new());
    let manager = manager_on(&store, options(600, 1));

    let done = manager
        .run_exclusive(|| async { Err::<(), &str>("work failed") })
        .await
        .unwrap();

    assert_eq!(done.output, Err("work failed"));
    assert!(done.released.unwrap());
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn scoped_section_releases_on_panic() {
    let store = Arc::new(MemoryStore::new());
    let manager = Arc::new(manager_on(&store, options(600, 1)));

    let task_manager = manager.clone();
    let handle = tokio::spawn(async move {
        task_manager
            .run_exclusive(|| async {
                panic!("critical section blew up");
            })
            .await
    });

    let err = handle.await.unwrap_err();
    assert!(err.is_panic());
    assert!(store.is_empty());
    assert!(!manager.is_held());
}

#[tokio::test(start_paused = true)]
async fn scoped_section_is_skipped_when_denied() {
    let store = Arc::new(MemoryStore::new());
    let holder = manager_on(&store, options(600, 1));
    let loser = manager_on(&store, options(600, 1));
    holder.lock().await.unwrap();

    let ran_flag = AtomicBool::new(false);
    let ran = &ran_flag;
    let result = loser
        .run_exclusive(move || async move {
            ran.store(true, Ordering::SeqCst);
        })
        .await;

    assert!(matches!(result, Err(LockError::LockFailed { .. })));
    assert!(!ran_flag.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn overrunning_section_sees_release_mismatch() {
    let store = Arc::new(MemoryStore::new());
    let manager = manager_on(&store, options(1, 1));

    let done = manager
        .run_exclusive(|| tokio::time::sleep(Duration::from_secs(2)))
        .await
        .unwrap();

    assert!(!done.released.unwrap());
}
