//! Thread reconstruction through the room timeline.

mod common;

use std::sync::Arc;

use common::*;
use lattice_core::{EventId, MatrixEvent, SendStatus, TransportError, UserId};
use lattice_relations::{RoomTimeline, Thread, ThreadContext, ThreadNotificationKind, ThreadState};
use lattice_settings::ClientSettings;
use proptest::prelude::*;
use serde_json::{Value, json};

fn root_id() -> EventId {
    EventId::from("$root")
}

fn last_reply_id(room: &RoomTimeline) -> Option<String> {
    room.thread(&root_id())
        .and_then(|t| t.reply_to_event())
        .map(|e| e.event_id().to_string())
}

fn bundled_root(count: usize, latest: Value, participated: bool) -> lattice_core::SharedEvent {
    event_at(
        json!({
            "event_id": "$root",
            "type": "m.room.message",
            "sender": ALICE,
            "origin_server_ts": 1,
            "content": {"msgtype": "m.text", "body": "root"},
            "unsigned": {"m.relations": {"m.thread": {
                "latest_event": latest,
                "count": count,
                "current_user_participated": participated,
            }}}
        }),
        1,
    )
}

// ── Fallback mode ───────────────────────────────────────────────────────

#[tokio::test]
async fn replies_create_the_thread_and_count() {
    let mut room = timeline(false);
    let mut created = room.subscribe_threads();
    room.ingest(message("$root", ALICE, 1)).await;
    assert!(room.thread(&root_id()).is_none());

    room.ingest(thread_reply("$e1", BOB, "$root", 10)).await;
    room.ingest(thread_reply("$e2", ALICE, "$root", 20)).await;

    let thread = room.thread(&root_id()).unwrap();
    assert_eq!(thread.reply_count(), 2);
    assert_eq!(thread.events().len(), 2);
    assert!(thread.root().is_some());
    assert!(!thread.has_participated());
    assert_eq!(last_reply_id(&room).as_deref(), Some("$e2"));

    let notification = created.try_recv().unwrap();
    assert_eq!(notification.thread_id, root_id());
    assert!(matches!(notification.kind, ThreadNotificationKind::New));
    assert!(created.try_recv().is_err());
}

#[tokio::test]
async fn own_reply_marks_participation() {
    let mut room = timeline(false);
    room.ingest(message("$root", ALICE, 1)).await;
    room.ingest(thread_reply("$e1", ME, "$root", 10)).await;
    assert!(room.thread(&root_id()).unwrap().has_participated());
}

#[tokio::test]
async fn late_root_is_attached_to_an_existing_thread() {
    let mut room = timeline(false);
    room.ingest(thread_reply("$e1", BOB, "$root", 10)).await;
    assert!(room.thread(&root_id()).unwrap().root().is_none());

    room.ingest(message("$root", ALICE, 1)).await;
    let thread = room.thread(&root_id()).unwrap();
    assert!(thread.root().is_some());
    assert_eq!(thread.reply_count(), 1);
    assert_eq!(room.threads().count(), 1);
}

#[tokio::test]
async fn redacting_the_latest_reply_rescans_the_pointer() {
    let mut room = timeline(false);
    room.ingest(message("$root", ALICE, 1)).await;
    room.ingest(thread_reply("$e1", BOB, "$root", 10)).await;
    room.ingest(thread_reply("$e2", BOB, "$root", 20)).await;
    room.ingest(thread_reply("$e3", BOB, "$root", 30)).await;
    assert_eq!(last_reply_id(&room).as_deref(), Some("$e3"));

    room.redact(&EventId::from("$e3"), true).unwrap();
    assert_eq!(last_reply_id(&room).as_deref(), Some("$e2"));
    assert_eq!(room.thread(&root_id()).unwrap().reply_count(), 2);
}

#[tokio::test]
async fn redacting_an_older_reply_keeps_the_pointer() {
    let mut room = timeline(false);
    room.ingest(message("$root", ALICE, 1)).await;
    room.ingest(thread_reply("$e1", BOB, "$root", 10)).await;
    room.ingest(thread_reply("$e2", BOB, "$root", 20)).await;

    room.redact(&EventId::from("$e1"), true).unwrap();
    assert_eq!(last_reply_id(&room).as_deref(), Some("$e2"));
    assert_eq!(room.thread(&root_id()).unwrap().reply_count(), 1);
}

#[tokio::test]
async fn redacting_every_reply_falls_back_to_the_root() {
    let mut room = timeline(false);
    room.ingest(message("$root", ALICE, 1)).await;
    room.ingest(thread_reply("$e1", BOB, "$root", 10)).await;

    room.redact(&EventId::from("$e1"), true).unwrap();
    let thread = room.thread(&root_id()).unwrap();
    assert_eq!(thread.reply_count(), 0);
    assert_eq!(
        thread.reply_to_event().map(|e| e.event_id().to_string()).as_deref(),
        Some("$root")
    );
}

#[tokio::test]
async fn unconfirmed_redaction_keeps_the_count() {
    let mut room = timeline(false);
    room.ingest(message("$root", ALICE, 1)).await;
    room.ingest(thread_reply("$e1", BOB, "$root", 10)).await;

    room.redact(&EventId::from("$e1"), false).unwrap();
    assert_eq!(room.thread(&root_id()).unwrap().reply_count(), 1);
    assert_eq!(last_reply_id(&room).as_deref(), Some("$e1"));
}

#[tokio::test]
async fn cancelled_local_reply_is_uncounted() {
    let mut room = timeline(false);
    room.ingest(message("$root", ALICE, 1)).await;
    room.ingest(thread_reply("$e1", BOB, "$root", 10)).await;

    let echo = MatrixEvent::local_echo(
        &room_id(),
        &UserId::from(ME),
        "m.room.message",
        lattice_core::content::make_thread_reply(&root_id(), "draft"),
    );
    let echo_id = echo.event_id().clone();
    room.ingest(echo).await;
    assert_eq!(room.thread(&root_id()).unwrap().reply_count(), 2);
    assert_eq!(last_reply_id(&room), Some(echo_id.to_string()));

    room.update_status(&echo_id, SendStatus::Cancelled).unwrap();
    let thread = room.thread(&root_id()).unwrap();
    assert_eq!(thread.reply_count(), 1);
    assert!(!thread.has(&echo_id));
    assert_eq!(last_reply_id(&room).as_deref(), Some("$e1"));
    assert!(room.find_event(&echo_id).is_none());
}

#[tokio::test]
async fn confirmed_local_reply_is_counted_once() {
    let mut room = timeline(false);
    room.ingest(message("$root", ALICE, 1)).await;
    room.ingest(thread_reply("$e1", BOB, "$root", 10)).await;
    let echo = local_echo(
        "m.room.message",
        lattice_core::content::make_thread_reply(&root_id(), "mine"),
    );
    room.ingest(Arc::clone(&echo)).await;
    room.update_status(echo.event_id(), SendStatus::Sent).unwrap();
    room.ingest(remote_copy(&echo, "$mine")).await;

    let thread = room.thread(&root_id()).unwrap();
    assert_eq!(thread.reply_count(), 2);
    assert_eq!(thread.events().len(), 2);
    assert!(thread.has(&EventId::from("$mine")));
    assert!(!thread.has(echo.event_id()));
    assert!(thread.has_participated());
    assert_eq!(last_reply_id(&room).as_deref(), Some("$mine"));
}

#[tokio::test]
async fn fallback_fetch_has_nothing_to_load() {
    let mut room = timeline(false);
    room.ingest(message("$root", ALICE, 1)).await;
    room.ingest(thread_reply("$e1", BOB, "$root", 10)).await;

    let thread = room.thread_mut(&root_id()).unwrap();
    assert!(thread.fetch_initial_events().await.is_none());
    assert!(thread.initial_events_fetched());
}

proptest! {
    #[test]
    fn reply_count_does_not_depend_on_delivery_order(
        order in Just(vec![0_usize, 1, 2]).prop_shuffle()
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let events = [
                message("$root", ALICE, 1),
                thread_reply("$e1", BOB, "$root", 10),
                thread_reply("$e2", BOB, "$root", 20),
            ];
            let mut room = timeline(false);
            for i in &order {
                room.ingest(Arc::clone(&events[*i])).await;
            }
            let thread = room.thread(&root_id()).unwrap();
            prop_assert_eq!(thread.reply_count(), 2);
            prop_assert!(thread.root().is_some());
            let last = last_reply_id(&room);
            prop_assert_eq!(last.as_deref(), Some("$e2"));
            Ok(())
        })?;
    }
}

proptest! {
    #[test]
    fn only_thread_replies_are_counted_in_any_order(
        order in Just(vec![0_usize, 1, 2]).prop_shuffle()
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let mut settings = ClientSettings::default();
            settings.threads.server_side_support = false;
            let ctx = ThreadContext::from_settings(room_id(), UserId::from(ME), &settings);
            let events = [
                thread_reply("$e1", BOB, "$root", 10),
                message("$plain", ALICE, 15),
                thread_reply("$e2", BOB, "$root", 20),
            ];

            let mut thread = Thread::new(root_id(), Some(message("$root", ALICE, 1)), ctx).await;
            for i in &order {
                thread.add_event(Arc::clone(&events[*i]), false).await;
            }
            prop_assert_eq!(thread.reply_count(), 2);
            prop_assert_eq!(thread.events().len(), 3);
            prop_assert!(thread.has(&EventId::from("$plain")));
            prop_assert_eq!(
                thread.reply_to_event().map(|e| e.event_id().as_str()),
                Some("$e2")
            );
            Ok(())
        })?;
    }
}

// ── Server mode ─────────────────────────────────────────────────────────

#[tokio::test]
async fn server_mode_seeds_from_the_bundled_summary() {
    let mut room = timeline(true);
    let latest = raw("$e2", "m.room.message", ME, 20, lattice_core::content::make_thread_reply(&root_id(), "two"));
    room.ingest(bundled_root(2, latest, true)).await;

    let thread = room.thread(&root_id()).unwrap();
    assert!(thread.server_side_support());
    assert_eq!(thread.reply_count(), 2);
    assert!(thread.has_participated());
    assert_eq!(last_reply_id(&room).as_deref(), Some("$e2"));
    assert!(thread.events().is_empty());
    assert_eq!(thread.state(), ThreadState::Partial);
}

#[tokio::test]
async fn server_mode_ignores_live_replies_before_the_initial_fetch() {
    let mut room = timeline(true);
    let latest = raw("$e2", "m.room.message", BOB, 20, lattice_core::content::make_thread_reply(&root_id(), "two"));
    room.ingest(bundled_root(2, latest, false)).await;
    room.ingest(thread_reply("$e3", BOB, "$root", 30)).await;

    let thread = room.thread(&root_id()).unwrap();
    assert_eq!(thread.reply_count(), 2);
    assert!(!thread.has(&EventId::from("$e3")));
}

#[tokio::test]
async fn server_mode_fetch_loads_replies_oldest_first() {
    let transport = Arc::new(FakeTransport::default());
    let e1 = raw("$e1", "m.room.message", BOB, 10, lattice_core::content::make_thread_reply(&root_id(), "one"));
    let e2 = raw("$e2", "m.room.message", BOB, 20, lattice_core::content::make_thread_reply(&root_id(), "two"));
    transport.respond(
        "/relations/%24root/m%2Ethread",
        Ok(json!({"chunk": [e2.clone(), e1], "next_batch": "tok"})),
    );

    let mut room = timeline(true).with_transport(Arc::clone(&transport) as Arc<dyn lattice_core::Transport>);
    room.ingest(bundled_root(2, e2, false)).await;

    let thread = room.thread_mut(&root_id()).unwrap();
    let result = thread.fetch_initial_events().await.unwrap();
    let ids: Vec<_> = result.events.iter().map(|e| e.event_id().to_string()).collect();
    assert_eq!(ids, vec!["$e1", "$e2"]);
    assert_eq!(result.next_batch.as_deref(), Some("tok"));
    assert_eq!(thread.state(), ThreadState::Initialized);
    assert_eq!(thread.reply_count(), 2);
    assert_eq!(thread.events().len(), 2);

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].query_param("dir"), Some("b"));

    room.ingest(thread_reply("$e3", ME, "$root", 30)).await;
    let thread = room.thread(&root_id()).unwrap();
    assert_eq!(thread.reply_count(), 3);
    assert!(thread.has_participated());
    assert_eq!(last_reply_id(&room).as_deref(), Some("$e3"));
}

#[tokio::test]
async fn server_mode_fetch_failure_is_logged_and_marks_fetched() {
    let transport = Arc::new(FakeTransport::default());
    transport.respond(
        "/relations/",
        Err(TransportError::Connection {
            message: "offline".into(),
        }),
    );
    let latest = raw("$e1", "m.room.message", BOB, 10, lattice_core::content::make_thread_reply(&root_id(), "one"));
    let mut room = timeline(true).with_transport(transport);
    room.ingest(bundled_root(1, latest, false)).await;

    let thread = room.thread_mut(&root_id()).unwrap();
    assert!(thread.fetch_initial_events().await.is_none());
    assert!(thread.initial_events_fetched());
    assert_eq!(thread.reply_count(), 1);
}

#[tokio::test]
async fn server_mode_without_transport_cannot_fetch() {
    let latest = raw("$e1", "m.room.message", BOB, 10, lattice_core::content::make_thread_reply(&root_id(), "one"));
    let mut room = timeline(true);
    room.ingest(bundled_root(1, latest, false)).await;

    let thread = room.thread_mut(&root_id()).unwrap();
    assert!(thread.fetch_initial_events().await.is_none());
    assert_eq!(thread.state(), ThreadState::Initialized);
}

#[tokio::test]
async fn encrypted_bundled_latest_reply_gets_its_edit_fetched() {
    let transport = Arc::new(FakeTransport::default());
    let edit = raw(
        "$edit",
        "m.room.message",
        BOB,
        40,
        lattice_core::content::make_replacement(&EventId::from("$enc"), "fixed"),
    );
    transport.respond("/relations/%24enc/m%2Ereplace", Ok(json!({"chunk": [edit]})));

    let latest = raw(
        "$enc",
        "m.room.encrypted",
        BOB,
        10,
        json!({
            "algorithm": "m.megolm.v1.aes-sha2",
            "ciphertext": "AAAA",
            "m.relates_to": {"rel_type": "m.thread", "event_id": "$root"}
        }),
    );
    let mut room = timeline(true).with_transport(Arc::clone(&transport) as Arc<dyn lattice_core::Transport>);
    room.ingest(bundled_root(1, latest, false)).await;

    let last = room
        .thread(&root_id())
        .and_then(|t| t.reply_to_event())
        .cloned()
        .unwrap();
    assert_eq!(last.replacing_event().unwrap().event_id().as_str(), "$edit");
    assert_eq!(transport.requests()[0].query_param("limit"), Some("1"));
}
