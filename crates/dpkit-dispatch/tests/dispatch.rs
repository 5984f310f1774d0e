//! Integration tests for the dispatcher: listeners, waiters, timeouts,
//! close, and the parse-and-dispatch loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dpkit_dispatch::{DispatchError, Dispatcher, EventFilter, HandlerError};
use dpkit_protocol::{Event, EventKind, Grammar};
use dpkit_source::{ChannelSource, RawLine};
use tokio::sync::mpsc;

fn elim(victim: &str) -> Event {
    Event::new(EventKind::Elim)
        .with_field("killer_nick", "k")
        .with_field("victim_nick", victim)
}

async fn noop(_: Arc<Event>) -> Result<(), HandlerError> {
    Ok(())
}

/// Yields until `n` waiters are registered.
async fn until_waiters(dispatcher: &Dispatcher, n: usize) {
    while dispatcher.pending_waiters() < n {
        tokio::task::yield_now().await;
    }
}

// =========================================================================
// Waiters
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_wait_for_without_event_times_out_and_cleans_up() {
    let dispatcher = Dispatcher::new();
    assert_eq!(dispatcher.pending_waiters(), 0);

    let result = dispatcher
        .wait_for(EventKind::Elim, |_| true, Some(Duration::from_secs(5)))
        .await;

    assert_eq!(result.unwrap_err(), DispatchError::Timeout(EventKind::Elim));
    assert_eq!(dispatcher.pending_waiters(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_ignores_other_kinds_and_failed_predicates() {
    let dispatcher = Dispatcher::new();
    let waiter = {
        let d = dispatcher.clone();
        tokio::spawn(async move {
            d.wait_for(
                EventKind::Elim,
                |e| e.text("victim_nick") == Some("target"),
                Some(Duration::from_secs(10)),
            )
            .await
        })
    };
    until_waiters(&dispatcher, 1).await;

    assert_eq!(dispatcher.dispatch(Event::new(EventKind::Chat)), 0);
    assert_eq!(dispatcher.dispatch(elim("bystander")), 0);
    assert_eq!(dispatcher.pending_waiters(), 1);
    assert_eq!(dispatcher.dispatch(elim("target")), 1);

    let event = waiter.await.unwrap().unwrap();
    assert_eq!(event.text("victim_nick"), Some("target"));
    assert_eq!(dispatcher.pending_waiters(), 0);
}

#[tokio::test]
async fn test_two_waiters_and_listener_each_see_one_event_once() {
    let dispatcher = Dispatcher::new();
    let fired = Arc::new(AtomicUsize::new(0));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    let counter = Arc::clone(&fired);
    dispatcher
        .on(EventKind::Elim, move |_event| {
            let counter = Arc::clone(&counter);
            let done_tx = done_tx.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = done_tx.send(());
                Ok::<(), HandlerError>(())
            }
        })
        .unwrap();

    let mut waiters = Vec::new();
    for _ in 0..2 {
        let d = dispatcher.clone();
        waiters.push(tokio::spawn(async move {
            d.wait_for_next(EventKind::Elim, Some(Duration::from_secs(5))).await
        }));
    }
    until_waiters(&dispatcher, 2).await;

    assert_eq!(dispatcher.dispatch(elim("x")), 3);

    for waiter in waiters {
        let event = waiter.await.unwrap().unwrap();
        assert_eq!(event.text("victim_nick"), Some("x"));
    }
    done_rx.recv().await.unwrap();
    tokio::task::yield_now().await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(dispatcher.pending_waiters(), 0);
}

#[tokio::test]
async fn test_dropped_wait_future_removes_waiter() {
    let dispatcher = Dispatcher::new();
    let d = dispatcher.clone();
    let task = tokio::spawn(async move { d.wait_for_next(EventKind::Chat, None).await });
    until_waiters(&dispatcher, 1).await;

    task.abort();
    let _ = task.await;

    assert_eq!(dispatcher.pending_waiters(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_match_uses_filter() {
    let dispatcher = Dispatcher::new();
    let d = dispatcher.clone();
    let waiter = tokio::spawn(async move {
        d.wait_for_match(
            EventKind::Elim,
            EventFilter::new().field("victim_nick", "b"),
            Some(Duration::from_secs(1)),
        )
        .await
    });
    until_waiters(&dispatcher, 1).await;

    dispatcher.dispatch(elim("a"));
    dispatcher.dispatch(elim("b"));

    assert_eq!(waiter.await.unwrap().unwrap().text("victim_nick"), Some("b"));
}

// =========================================================================
// Close
// =========================================================================

#[tokio::test]
async fn test_close_resolves_all_pending_waiters() {
    let dispatcher = Dispatcher::new();
    let mut waiters = Vec::new();
    for kind in [EventKind::Elim, EventKind::Chat, EventKind::Elim] {
        let d = dispatcher.clone();
        waiters.push(tokio::spawn(async move { d.wait_for_next(kind, None).await }));
    }
    until_waiters(&dispatcher, 3).await;

    dispatcher.close();

    for waiter in waiters {
        assert_eq!(waiter.await.unwrap().unwrap_err(), DispatchError::SessionClosed);
    }
    assert_eq!(dispatcher.pending_waiters(), 0);
}

#[tokio::test]
async fn test_close_is_idempotent_and_rejects_registration() {
    let dispatcher = Dispatcher::new();
    dispatcher.on(EventKind::Chat, noop).unwrap();

    dispatcher.close();
    dispatcher.close();

    assert!(dispatcher.is_closed());
    assert_eq!(dispatcher.listener_count(), 0);
    assert!(matches!(
        dispatcher.on(EventKind::Chat, noop),
        Err(DispatchError::SessionClosed)
    ));
    assert_eq!(
        dispatcher.wait_for_next(EventKind::Chat, None).await.unwrap_err(),
        DispatchError::SessionClosed
    );
    assert_eq!(dispatcher.dispatch(Event::new(EventKind::Chat)), 0);
}

// =========================================================================
// Listeners
// =========================================================================

#[tokio::test]
async fn test_failing_and_panicking_handlers_are_isolated() {
    let dispatcher = Dispatcher::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    dispatcher
        .on(EventKind::Chat, |_| async {
            Err::<(), HandlerError>("handler refused".into())
        })
        .unwrap();
    dispatcher
        .on(EventKind::Chat, |_| async {
            if true {
                panic!("handler blew up");
            }
            Ok::<(), HandlerError>(())
        })
        .unwrap();
    dispatcher
        .on(EventKind::Chat, move |event| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event.text("message").map(str::to_string));
                Ok::<(), HandlerError>(())
            }
        })
        .unwrap();

    dispatcher.dispatch(Event::new(EventKind::Chat).with_field("message", "one"));
    dispatcher.dispatch(Event::new(EventKind::Chat).with_field("message", "two"));

    let seen = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
    assert_eq!(seen, vec![Some("one".to_string()), Some("two".to_string())]);
    assert_eq!(dispatcher.listener_count(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_listener_sees_events_in_arrival_order() {
    const EVENTS: i64 = 2000;
    let dispatcher = Dispatcher::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    dispatcher
        .on(EventKind::Elim, move |event| {
            let tx = tx.clone();
            async move {
                tokio::task::yield_now().await;
                let _ = tx.send(event.int("n"));
                Ok::<(), HandlerError>(())
            }
        })
        .unwrap();

    for n in 0..EVENTS {
        assert_eq!(dispatcher.dispatch(elim("x").with_field("n", n)), 1);
    }

    for expected in 0..EVENTS {
        assert_eq!(rx.recv().await.unwrap(), Some(expected));
    }
}

#[tokio::test]
async fn test_slow_listener_does_not_hold_up_others() {
    let dispatcher = Dispatcher::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    dispatcher
        .on(EventKind::Chat, |_| async {
            std::future::pending::<()>().await;
            Ok::<(), HandlerError>(())
        })
        .unwrap();
    dispatcher
        .on(EventKind::Chat, move |event| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event.text("message").map(str::to_string));
                Ok::<(), HandlerError>(())
            }
        })
        .unwrap();

    for message in ["one", "two", "three"] {
        dispatcher.dispatch(Event::new(EventKind::Chat).with_field("message", message));
    }
    for message in ["one", "two", "three"] {
        assert_eq!(rx.recv().await.unwrap().as_deref(), Some(message));
    }
}

#[tokio::test]
async fn test_off_stops_delivery() {
    let dispatcher = Dispatcher::new();
    let id = dispatcher.on(EventKind::Chat, noop).unwrap();

    assert_eq!(dispatcher.dispatch(Event::new(EventKind::Chat)), 1);
    assert!(dispatcher.off(id));
    assert!(!dispatcher.off(id));
    assert_eq!(dispatcher.dispatch(Event::new(EventKind::Chat)), 0);
}

#[tokio::test]
async fn test_handler_may_call_back_into_dispatcher() {
    let dispatcher = Dispatcher::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let inner = dispatcher.clone();

    dispatcher
        .on(EventKind::RoundStarted, move |_| {
            let inner = inner.clone();
            let tx = tx.clone();
            async move {
                let id = inner.on(EventKind::RoundEnd, noop)?;
                let _ = tx.send(id);
                Ok::<(), HandlerError>(())
            }
        })
        .unwrap();

    dispatcher.dispatch(Event::new(EventKind::RoundStarted));
    rx.recv().await.unwrap();
    assert_eq!(dispatcher.listener_count(), 2);
}

// =========================================================================
// Run loop
// =========================================================================

#[tokio::test]
async fn test_run_parses_and_dispatches_until_source_ends() {
    let dispatcher = Dispatcher::new();
    let (tx, source) = ChannelSource::pair(16);

    let d = dispatcher.clone();
    let waiter = tokio::spawn(async move {
        d.wait_for(
            EventKind::Elim,
            |e| e.int("victim_id") == Some(2),
            Some(Duration::from_secs(5)),
        )
        .await
    });
    until_waiters(&dispatcher, 1).await;

    let pump = {
        let d = dispatcher.clone();
        tokio::spawn(async move { d.run(source, &Grammar::paintball2()).await })
    };

    tx.send(RawLine::new("garbage that matches nothing")).await.unwrap();
    tx.send(RawLine::new("killer_nick[1] killed victim_nick[2] with weapon_x"))
        .await
        .unwrap();

    let event = waiter.await.unwrap().unwrap();
    assert_eq!(event.kind, EventKind::Elim);
    assert_eq!(event.int("killer_id"), Some(1));
    assert_eq!(event.text("weapon"), Some("weapon_x"));

    drop(tx);
    pump.await.unwrap().unwrap();
    assert!(dispatcher.is_closed());
}

#[tokio::test]
async fn test_run_stops_when_closed() {
    let dispatcher = Dispatcher::new();
    let (_tx, source) = ChannelSource::pair(1);

    let pump = {
        let d = dispatcher.clone();
        tokio::spawn(async move { d.run(source, &Grammar::paintball2()).await })
    };
    dispatcher.close();

    tokio::time::timeout(Duration::from_secs(5), pump)
        .await
        .expect("pump should stop")
        .unwrap()
        .unwrap();
}
