// Dispatcher behaviour driven through the in-memory transport

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use socket_dispatch::config::DispatcherConfig;
use socket_dispatch::transport::memory::{self, MemoryPeer};
use socket_dispatch::{Connection, ConnectionState, DispatchError, Dispatcher};

async fn connect(dispatcher: &Dispatcher) -> (Connection, MemoryPeer) {
    let (sink, source, peer) = memory::channel();
    let connection = dispatcher.accept(sink, source).await.unwrap();
    (connection, peer)
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

async fn next_envelope(peer: &mut MemoryPeer) -> Value {
    let frame = timeout(Duration::from_secs(2), peer.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("transport closed");
    serde_json::from_str(&frame).unwrap()
}

#[tokio::test]
async fn test_broadcast_reaches_every_member() {
    let dispatcher = Dispatcher::default();
    let (c1, mut p1) = connect(&dispatcher).await;
    let (c2, mut p2) = connect(&dispatcher).await;

    dispatcher.join(c1.id(), "lobby").await.unwrap();
    dispatcher.join(c2.id(), "lobby").await.unwrap();

    let report = dispatcher
        .broadcast("lobby", &json!({"text": "hi"}))
        .await
        .unwrap();
    assert_eq!(report.delivered.len(), 2);
    assert!(report.is_complete());

    let expected = json!({"e": "broadcast", "s": true, "m": {"r": "lobby", "m": {"text": "hi"}}});
    assert_eq!(next_envelope(&mut p1).await, expected);
    assert_eq!(next_envelope(&mut p2).await, expected);
}

#[tokio::test]
async fn test_broadcast_to_missing_room_is_lookup_error() {
    let dispatcher = Dispatcher::default();
    let (_c1, _p1) = connect(&dispatcher).await;

    let result = dispatcher.broadcast("nowhere", "x").await;
    match result {
        Err(e @ DispatchError::RoomNotFound(_)) => assert!(e.is_lookup()),
        other => panic!("expected RoomNotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_broadcast_continues_past_failed_recipient() {
    let dispatcher = Dispatcher::default();
    let (c1, mut p1) = connect(&dispatcher).await;
    let (c2, mut p2) = connect(&dispatcher).await;
    let (c3, mut p3) = connect(&dispatcher).await;

    for connection in [&c1, &c2, &c3] {
        dispatcher.join(connection.id(), "lobby").await.unwrap();
    }
    p2.refuse_writes();

    let report = match dispatcher.broadcast("lobby", "hello").await {
        Err(DispatchError::PartialDelivery(report)) => report,
        other => panic!("expected PartialDelivery, got {:?}", other),
    };

    assert_eq!(report.recipient_count(), 3);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].connection_id, c2.id());
    assert!(report.delivered.contains(&c1.id().to_string()));
    assert!(report.delivered.contains(&c3.id().to_string()));

    assert_eq!(next_envelope(&mut p1).await["m"]["m"], "hello");
    assert_eq!(next_envelope(&mut p3).await["m"]["m"], "hello");

    // The failed write tears c2 down and removes it from the room
    eventually(|| async { dispatcher.connection_count().await == 2 }).await;
    let members = dispatcher.members_of("lobby").await;
    assert_eq!(members.len(), 2);
    assert!(!members.contains(c2.id()));
    assert!(dispatcher.is_consistent().await);
}

#[tokio::test]
async fn test_user_frame_invokes_handler_once() {
    let dispatcher = Dispatcher::default();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let (sink, source, p1) = memory::channel();
    let _c1 = dispatcher
        .accept_with(sink, source, |connection| {
            connection
                .on("ping", move |_conn, payload| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(payload);
                    }
                })
                .unwrap();
        })
        .await
        .unwrap();

    assert!(p1.send(r#"{"e":"ping","s":false,"m":"x"}"#));

    let payload = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(payload, json!("x"));

    sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_event_without_handler_is_ignored() {
    let dispatcher = Dispatcher::default();
    let (c1, p1) = connect(&dispatcher).await;

    assert!(p1.send(r#"{"e":"nobody-listens","s":false,"m":1}"#));
    assert!(p1.send(r#"{"e":"join","s":true,"m":"after"}"#));

    eventually(|| async { dispatcher.contains_room("after").await }).await;
    assert!(c1.is_open());
}

#[tokio::test]
async fn test_reregistering_replaces_handler() {
    let dispatcher = Dispatcher::default();
    let hits = Arc::new(AtomicUsize::new(0));
    let (c1, p1) = connect(&dispatcher).await;

    let first = hits.clone();
    c1.on("tick", move |_c, _p| {
        let hits = first.clone();
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
        }
    })
    .unwrap();
    let second = hits.clone();
    c1.on("tick", move |_c, _p| {
        let hits = second.clone();
        async move {
            hits.fetch_add(100, Ordering::SeqCst);
        }
    })
    .unwrap();

    p1.send(r#"{"e":"tick","s":false,"m":null}"#);
    eventually(|| async { hits.load(Ordering::SeqCst) != 0 }).await;
    assert_eq!(hits.load(Ordering::SeqCst), 100);
}

#[tokio::test]
async fn test_malformed_frame_does_not_stop_reading() {
    let dispatcher = Dispatcher::default();
    let (c1, p1) = connect(&dispatcher).await;

    assert!(p1.send("{this is not json"));
    assert!(p1.send(r#"{"e":"join","s":true,"m":17}"#));
    assert!(p1.send(r#"{"e":"join","s":true,"m":"lobby"}"#));

    eventually(|| async { dispatcher.members_of("lobby").await.contains(c1.id()) }).await;
    assert_eq!(dispatcher.connection_count().await, 1);
    assert!(c1.is_open());
}

#[tokio::test]
async fn test_oversized_frame_is_dropped() {
    let dispatcher = Dispatcher::new(DispatcherConfig { max_frame_size: 64 });
    let (c1, p1) = connect(&dispatcher).await;

    let big_room = "r".repeat(100);
    p1.send(json!({"e": "join", "s": true, "m": big_room}).to_string());
    p1.send(r#"{"e":"join","s":true,"m":"small"}"#);

    eventually(|| async { dispatcher.contains_room("small").await }).await;
    assert!(!dispatcher.contains_room(&big_room).await);
    assert!(c1.is_open());
}

#[tokio::test]
async fn test_system_frames_join_leave_and_unknown() {
    let dispatcher = Dispatcher::default();
    let (c1, p1) = connect(&dispatcher).await;

    p1.send(r#"{"e":"join","s":true,"m":"a"}"#);
    p1.send(r#"{"e":"join","s":true,"m":"b"}"#);
    p1.send(r#"{"e":"join","s":true,"m":"b"}"#);
    p1.send(r#"{"e":"leave","s":true,"m":"a"}"#);
    p1.send(r#"{"e":"leave","s":true,"m":"never-joined"}"#);
    p1.send(r#"{"e":"subscribe","s":true,"m":"ignored"}"#);
    p1.send(r#"{"e":"join","s":true,"m":"c"}"#);

    eventually(|| async { dispatcher.contains_room("c").await }).await;

    let rooms = dispatcher.rooms_of(c1.id()).await;
    assert_eq!(rooms.len(), 2);
    assert!(rooms.contains("b"));
    assert!(rooms.contains("c"));
    assert!(!dispatcher.contains_room("a").await);
    assert_eq!(dispatcher.members_of("b").await.len(), 1);
    assert!(dispatcher.is_consistent().await);
}

#[tokio::test]
async fn test_emit_to_frame_reaches_recipient() {
    let dispatcher = Dispatcher::default();
    let (_c1, p1) = connect(&dispatcher).await;
    let (c2, mut p2) = connect(&dispatcher).await;

    p1.send(
        json!({"e": "emitTo", "s": true, "m": {"r": c2.id(), "e": "hello", "m": {"n": 1}}})
            .to_string(),
    );

    assert_eq!(
        next_envelope(&mut p2).await,
        json!({"e": "hello", "s": false, "m": {"n": 1}})
    );
}

#[tokio::test]
async fn test_broadcast_frame_from_client() {
    let dispatcher = Dispatcher::default();
    let (c1, mut p1) = connect(&dispatcher).await;
    let (c2, mut p2) = connect(&dispatcher).await;

    dispatcher.join(c1.id(), "lobby").await.unwrap();
    dispatcher.join(c2.id(), "lobby").await.unwrap();

    p1.send(r#"{"e":"broadcast","s":true,"m":{"r":"lobby","m":"from c1"}}"#);

    let expected = json!({"e": "broadcast", "s": true, "m": {"r": "lobby", "m": "from c1"}});
    assert_eq!(next_envelope(&mut p1).await, expected);
    assert_eq!(next_envelope(&mut p2).await, expected);
}

#[tokio::test]
async fn test_emit_to_unknown_recipient_changes_nothing() {
    let dispatcher = Dispatcher::default();
    let (c1, _p1) = connect(&dispatcher).await;
    dispatcher.join(c1.id(), "lobby").await.unwrap();

    let result = dispatcher.emit_to("no-such-id", "hello", "x").await;
    assert!(matches!(result, Err(DispatchError::RecipientNotFound(_))));

    assert_eq!(dispatcher.connection_count().await, 1);
    assert_eq!(dispatcher.list_rooms().await.len(), 1);
    assert!(c1.is_open());
}

#[tokio::test]
async fn test_close_removes_connection_everywhere() {
    let dispatcher = Dispatcher::default();
    let (c1, mut p1) = connect(&dispatcher).await;
    let (c2, _p2) = connect(&dispatcher).await;

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    c1.on_close(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    dispatcher.join(c1.id(), "a").await.unwrap();
    dispatcher.join(c1.id(), "b").await.unwrap();
    dispatcher.join(c2.id(), "b").await.unwrap();

    assert!(dispatcher.close(c1.id()).await);
    assert!(!dispatcher.close(c1.id()).await);

    assert_eq!(c1.state(), ConnectionState::Closed);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(!dispatcher.contains_room("a").await);
    assert_eq!(dispatcher.members_of("b").await.len(), 1);
    assert!(dispatcher.rooms_of(c1.id()).await.is_empty());
    assert!(dispatcher.connection(c1.id()).await.is_err());
    assert!(timeout(Duration::from_secs(2), p1.recv()).await.unwrap().is_none());

    // no handlers can be attached to a torn down connection
    assert!(c1.on("ping", |_c, _p| async {}).is_err());
    // and a closed connection cannot join anything
    assert!(matches!(
        dispatcher.join(c1.id(), "c").await,
        Err(DispatchError::ConnectionNotFound(_))
    ));
    assert!(dispatcher.is_consistent().await);
}

#[tokio::test]
async fn test_remote_disconnect_tears_down() {
    let dispatcher = Dispatcher::default();
    let (c1, mut p1) = connect(&dispatcher).await;
    dispatcher.join(c1.id(), "lobby").await.unwrap();

    p1.disconnect();

    eventually(|| async { dispatcher.connection_count().await == 0 }).await;
    assert!(!dispatcher.contains_room("lobby").await);
    eventually(|| async { c1.state() == ConnectionState::Closed }).await;
}

#[tokio::test]
async fn test_connection_close_tears_down_before_returning() {
    let dispatcher = Dispatcher::default();
    let (c1, _p1) = connect(&dispatcher).await;
    let (c2, mut p2) = connect(&dispatcher).await;
    dispatcher.join(c1.id(), "lobby").await.unwrap();
    dispatcher.join(c2.id(), "lobby").await.unwrap();

    let seen = Arc::new(std::sync::Mutex::new(None));
    let slot = seen.clone();
    c1.on_close(move |conn| {
        *slot.lock().unwrap() = Some(conn.state());
    });

    c1.close().await;

    // no yield to the inbound task is needed
    assert_eq!(c1.state(), ConnectionState::Closed);
    assert_eq!(*seen.lock().unwrap(), Some(ConnectionState::Closed));
    assert!(dispatcher.connection(c1.id()).await.is_err());
    assert_eq!(dispatcher.connection_count().await, 1);
    assert!(dispatcher.rooms_of(c1.id()).await.is_empty());
    assert!(!dispatcher.members_of("lobby").await.contains(c1.id()));

    let report = dispatcher.broadcast("lobby", "after close").await.unwrap();
    assert_eq!(report.delivered, vec![c2.id().to_string()]);
    assert_eq!(next_envelope(&mut p2).await["m"]["m"], "after close");

    // closing again through either path changes nothing
    c1.close().await;
    assert!(!dispatcher.close(c1.id()).await);
    assert!(dispatcher.is_consistent().await);
}

#[tokio::test]
async fn test_handler_can_reply_and_close_itself() {
    let dispatcher = Dispatcher::default();
    let (sink, source, mut p1) = memory::channel();
    let d = dispatcher.clone();
    let c1 = dispatcher
        .accept_with(sink, source, move |connection| {
            connection
                .on("bye", move |conn, _payload| {
                    let d = d.clone();
                    async move {
                        conn.emit("goodbye", "see you").await.unwrap();
                        d.close(conn.id()).await;
                    }
                })
                .unwrap();
        })
        .await
        .unwrap();

    p1.send(r#"{"e":"bye","s":false,"m":null}"#);

    assert_eq!(next_envelope(&mut p1).await["e"], "goodbye");
    eventually(|| async { dispatcher.connection_count().await == 0 }).await;
    assert_eq!(c1.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_concurrent_joins_and_closes_stay_consistent() {
    let dispatcher = Dispatcher::default();
    let mut connections = Vec::new();
    for _ in 0..10 {
        connections.push(connect(&dispatcher).await);
    }

    let mut tasks = Vec::new();
    for (i, (connection, _)) in connections.iter().enumerate() {
        let dispatcher = dispatcher.clone();
        let id = connection.id().to_string();
        tasks.push(tokio::spawn(async move {
            for room in ["a", "b", "c"] {
                let _ = dispatcher.join(&id, room).await;
            }
            if i % 2 == 0 {
                dispatcher.close(&id).await;
            } else {
                dispatcher.leave(&id, "a").await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(dispatcher.connection_count().await, 5);
    assert!(!dispatcher.contains_room("a").await);
    assert_eq!(dispatcher.members_of("b").await.len(), 5);
    assert!(dispatcher.is_consistent().await);
}
