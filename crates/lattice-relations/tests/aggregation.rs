//! Reaction and edit aggregation through the room timeline.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use common::*;
use lattice_core::{EventId, MatrixEvent, RelationType, SendStatus, UserId};
use lattice_relations::{RelationsError, RoomTimeline};
use serde_json::json;

fn keys_and_counts(room: &RoomTimeline, origin: &str) -> Vec<(String, usize)> {
    room.relations(&EventId::from(origin), &RelationType::Annotation, "m.reaction")
        .and_then(|b| b.grouped_by_key())
        .map(|groups| groups.iter().map(|g| (g.key().to_owned(), g.len())).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn reactions_group_by_key_and_reorder_on_removal() {
    let mut room = timeline(false);
    room.ingest(message("$o", ALICE, 1)).await;

    for i in 0..3 {
        room.ingest(reaction(&format!("$up{i}"), &format!("@u{i}:x"), "$o", "👍")).await;
    }
    for i in 0..5 {
        room.ingest(reaction(&format!("$heart{i}"), &format!("@h{i}:x"), "$o", "❤️")).await;
    }
    assert_eq!(
        keys_and_counts(&room, "$o"),
        vec![("❤️".to_owned(), 5), ("👍".to_owned(), 3)]
    );

    room.redact(&EventId::from("$heart0"), true).unwrap();
    room.redact(&EventId::from("$heart1"), true).unwrap();
    assert_eq!(
        keys_and_counts(&room, "$o"),
        vec![("👍".to_owned(), 3), ("❤️".to_owned(), 3)]
    );
}

#[tokio::test]
async fn delivering_a_reaction_twice_counts_once() {
    let mut room = timeline(false);
    room.ingest(message("$o", ALICE, 1)).await;
    let r = reaction("$r", BOB, "$o", "👍");
    room.ingest(Arc::clone(&r)).await;
    room.ingest(r).await;
    room.ingest(reaction("$r", BOB, "$o", "👍")).await;

    assert_eq!(keys_and_counts(&room, "$o"), vec![("👍".to_owned(), 1)]);
    let bucket = room
        .relations(&EventId::from("$o"), &RelationType::Annotation, "m.reaction")
        .unwrap();
    assert_eq!(bucket.len(), 1);
    assert_eq!(bucket.grouped_by_sender().unwrap().len(), 1);
}

#[tokio::test]
async fn reactions_before_origin_are_kept() {
    let mut room = timeline(false);
    room.ingest(reaction("$r", BOB, "$o", "👍")).await;
    let bucket = room
        .relations(&EventId::from("$o"), &RelationType::Annotation, "m.reaction")
        .unwrap();
    assert!(bucket.origin().is_none());
    assert_eq!(bucket.len(), 1);

    room.ingest(message("$o", ALICE, 1)).await;
    let bucket = room
        .relations(&EventId::from("$o"), &RelationType::Annotation, "m.reaction")
        .unwrap();
    assert!(bucket.origin().is_some());
}

#[tokio::test]
async fn newest_same_sender_edit_wins() {
    let mut room = timeline(false);
    room.ingest(message("$o", ALICE, 1)).await;
    room.ingest(edit("$e10", ALICE, "$o", 10)).await;
    room.ingest(edit("$e30", ALICE, "$o", 30)).await;
    room.ingest(edit("$e20", ALICE, "$o", 20)).await;

    let origin = room.find_event(&EventId::from("$o")).unwrap();
    assert_eq!(origin.replacing_event().unwrap().event_id().as_str(), "$e30");
    assert_eq!(origin.effective_content()["body"], "$e30");
}

#[tokio::test]
async fn edits_from_other_senders_are_ignored() {
    let mut room = timeline(false);
    room.ingest(message("$o", ALICE, 1)).await;
    room.ingest(edit("$mine", ALICE, "$o", 10)).await;
    room.ingest(edit("$theirs", BOB, "$o", 99)).await;

    let origin = room.find_event(&EventId::from("$o")).unwrap();
    assert_eq!(origin.replacing_event().unwrap().event_id().as_str(), "$mine");

    let bucket = room
        .relations(&EventId::from("$o"), &RelationType::Replace, "m.room.message")
        .unwrap();
    assert_eq!(bucket.len(), 2);
}

#[tokio::test]
async fn edits_older_than_the_bundled_edit_never_win() {
    let mut room = timeline(false);
    room.ingest(event_at(
        json!({
            "event_id": "$o",
            "type": "m.room.message",
            "sender": ALICE,
            "origin_server_ts": 1,
            "unsigned": {"m.relations": {"m.replace": {"event_id": "$e25", "origin_server_ts": 25}}},
            "content": {"body": "original"}
        }),
        1,
    ))
    .await;

    room.ingest(edit("$e20", ALICE, "$o", 20)).await;
    let origin = Arc::clone(room.find_event(&EventId::from("$o")).unwrap());
    assert!(origin.replacing_event().is_none());

    room.ingest(edit("$e30", ALICE, "$o", 30)).await;
    assert_eq!(origin.replacing_event().unwrap().event_id().as_str(), "$e30");
}

#[tokio::test]
async fn edits_before_origin_are_applied_when_it_arrives() {
    let mut room = timeline(false);
    room.ingest(edit("$e1", ALICE, "$o", 10)).await;
    room.ingest(edit("$e2", ALICE, "$o", 20)).await;
    room.ingest(message("$o", ALICE, 1)).await;

    let origin = room.find_event(&EventId::from("$o")).unwrap();
    assert_eq!(origin.replacing_event().unwrap().event_id().as_str(), "$e2");
}

#[tokio::test]
async fn redacting_the_latest_edit_falls_back_to_the_previous_one() {
    let mut room = timeline(false);
    room.ingest(message("$o", ALICE, 1)).await;
    room.ingest(edit("$e1", ALICE, "$o", 10)).await;
    room.ingest(edit("$e2", ALICE, "$o", 20)).await;

    room.redact(&EventId::from("$e2"), true).unwrap();
    let origin = room.find_event(&EventId::from("$o")).cloned().unwrap();
    assert_eq!(origin.replacing_event().unwrap().event_id().as_str(), "$e1");

    room.redact(&EventId::from("$e1"), true).unwrap();
    assert!(origin.replacing_event().is_none());
    assert_eq!(origin.effective_content()["body"], "$o");
}

#[tokio::test]
async fn unconfirmed_redaction_leaves_aggregates_alone() {
    let mut room = timeline(false);
    room.ingest(message("$o", ALICE, 1)).await;
    room.ingest(reaction("$r", BOB, "$o", "👍")).await;

    room.redact(&EventId::from("$r"), false).unwrap();
    assert_eq!(keys_and_counts(&room, "$o"), vec![("👍".to_owned(), 1)]);
    assert!(!room.find_event(&EventId::from("$r")).unwrap().is_redacted());
}

#[tokio::test]
async fn redacting_an_unknown_event_fails() {
    let mut room = timeline(false);
    let err = room.redact(&EventId::from("$missing"), true).unwrap_err();
    assert_matches!(err, RelationsError::UnknownEvent(id) if id.as_str() == "$missing");
}

#[tokio::test]
async fn cancelled_local_reaction_is_removed_everywhere() {
    let mut room = timeline(false);
    room.ingest(message("$o", ALICE, 1)).await;
    let echo = MatrixEvent::local_echo(
        &room_id(),
        &UserId::from(ME),
        "m.reaction",
        lattice_core::content::make_reaction(&EventId::from("$o"), "🎉"),
    );
    let echo_id = echo.event_id().clone();
    room.ingest(echo).await;
    assert_eq!(keys_and_counts(&room, "$o"), vec![("🎉".to_owned(), 1)]);
    let bucket = room
        .relations(&EventId::from("$o"), &RelationType::Annotation, "m.reaction")
        .unwrap();
    assert!(bucket.is_watching(&echo_id));

    room.update_status(&echo_id, SendStatus::Cancelled).unwrap();
    assert!(keys_and_counts(&room, "$o").is_empty());
    assert!(room.find_event(&echo_id).is_none());
}

#[tokio::test]
async fn sent_local_reaction_stays_and_stops_being_watched() {
    let mut room = timeline(false);
    room.ingest(message("$o", ALICE, 1)).await;
    let echo = MatrixEvent::local_echo(
        &room_id(),
        &UserId::from(ME),
        "m.reaction",
        lattice_core::content::make_reaction(&EventId::from("$o"), "🎉"),
    );
    let echo_id = echo.event_id().clone();
    room.ingest(echo).await;

    room.update_status(&echo_id, SendStatus::Sent).unwrap();
    let bucket = room
        .relations(&EventId::from("$o"), &RelationType::Annotation, "m.reaction")
        .unwrap();
    assert!(!bucket.is_watching(&echo_id));
    assert_eq!(bucket.len(), 1);

    let err = room.update_status(&echo_id, SendStatus::Cancelled).unwrap_err();
    assert_matches!(err, RelationsError::Event(_));
}

#[tokio::test]
async fn confirmed_local_reaction_is_not_counted_twice() {
    let mut room = timeline(false);
    room.ingest(message("$o", ALICE, 1)).await;
    let echo = local_echo(
        "m.reaction",
        lattice_core::content::make_reaction(&EventId::from("$o"), "👍"),
    );
    let echo_id = echo.event_id().clone();
    room.ingest(Arc::clone(&echo)).await;
    room.update_status(&echo_id, SendStatus::Sent).unwrap();

    let remote = remote_copy(&echo, "$real");
    room.ingest(Arc::clone(&remote)).await;
    room.ingest(remote).await;

    let bucket = room
        .relations(&EventId::from("$o"), &RelationType::Annotation, "m.reaction")
        .unwrap();
    let ids: Vec<&str> = bucket.members().iter().map(|e| e.event_id().as_str()).collect();
    assert_eq!(ids, vec!["$real"]);
    assert_eq!(keys_and_counts(&room, "$o"), vec![("👍".to_owned(), 1)]);
    assert_eq!(room.find_event(&echo_id).unwrap().event_id().as_str(), "$real");
    assert_eq!(room.len(), 2);

    room.update_status(&echo_id, SendStatus::Sent).unwrap();
    let err = room.update_status(&echo_id, SendStatus::Cancelled).unwrap_err();
    assert_matches!(err, RelationsError::Event(_));
    assert_eq!(keys_and_counts(&room, "$o"), vec![("👍".to_owned(), 1)]);
}

#[tokio::test]
async fn remote_copy_arriving_before_send_confirmation_settles_the_echo() {
    let mut room = timeline(false);
    room.ingest(message("$o", ALICE, 1)).await;
    let echo = local_echo(
        "m.reaction",
        lattice_core::content::make_reaction(&EventId::from("$o"), "🎉"),
    );
    let echo_id = echo.event_id().clone();
    room.ingest(Arc::clone(&echo)).await;

    room.ingest(remote_copy(&echo, "$real")).await;
    assert_eq!(echo.status(), SendStatus::Sent);
    room.update_status(&echo_id, SendStatus::Sent).unwrap();

    let bucket = room
        .relations(&EventId::from("$o"), &RelationType::Annotation, "m.reaction")
        .unwrap();
    assert_eq!(bucket.len(), 1);
    assert!(!bucket.is_watching(&echo_id));
    assert!(bucket.contains(&EventId::from("$real")));
}

#[tokio::test]
async fn confirmed_local_edit_keeps_a_single_replacement() {
    let mut room = timeline(false);
    let origin = message("$o", ME, 1);
    room.ingest(Arc::clone(&origin)).await;
    let echo = local_echo(
        "m.room.message",
        lattice_core::content::make_replacement(&EventId::from("$o"), "fixed"),
    );
    room.ingest(Arc::clone(&echo)).await;
    room.update_status(echo.event_id(), SendStatus::Sent).unwrap();
    room.ingest(remote_copy(&echo, "$edit")).await;

    let bucket = room
        .relations(&EventId::from("$o"), &RelationType::Replace, "m.room.message")
        .unwrap();
    assert_eq!(bucket.len(), 1);
    assert_eq!(origin.replacing_event().unwrap().event_id().as_str(), "$edit");
    assert_eq!(origin.effective_content()["body"], "fixed");
}

#[tokio::test]
async fn remote_copy_of_a_cancelled_echo_is_a_new_event() {
    let mut room = timeline(false);
    room.ingest(message("$o", ALICE, 1)).await;
    let echo = local_echo(
        "m.reaction",
        lattice_core::content::make_reaction(&EventId::from("$o"), "👍"),
    );
    room.ingest(Arc::clone(&echo)).await;
    room.update_status(echo.event_id(), SendStatus::Cancelled).unwrap();

    room.ingest(remote_copy(&echo, "$real")).await;
    assert_eq!(keys_and_counts(&room, "$o"), vec![("👍".to_owned(), 1)]);
    assert!(room.find_event(echo.event_id()).is_none());
}

#[test]
fn attaching_a_decryptor_keeps_notification_capacity() {
    let mut settings = lattice_settings::ClientSettings::default();
    settings.relations.notification_capacity = 3;
    let room = RoomTimeline::new(room_id(), UserId::from(ME), &settings)
        .with_decryptor(Arc::new(FakeDecryptor::default()));
    assert_eq!(room.index().notification_capacity(), 3);
}

#[tokio::test]
async fn encrypted_reactions_are_routed_under_their_clear_type() {
    let decryptor = FakeDecryptor::default().with(
        "$enc",
        "m.reaction",
        json!({"m.relates_to": {"rel_type": "m.annotation", "event_id": "$o", "key": "👀"}}),
    );
    let mut room = timeline(false).with_decryptor(Arc::new(decryptor));
    room.ingest(message("$o", ALICE, 1)).await;
    room.ingest(encrypted(
        "$enc",
        BOB,
        5,
        json!({"rel_type": "m.annotation", "event_id": "$o", "key": "👀"}),
    ))
    .await;

    assert_eq!(keys_and_counts(&room, "$o"), vec![("👀".to_owned(), 1)]);
}

#[tokio::test]
async fn undecryptable_relations_stay_under_the_wire_type() {
    let mut room = timeline(false).with_decryptor(Arc::new(FakeDecryptor::default()));
    room.ingest(message("$o", ALICE, 1)).await;
    room.ingest(encrypted(
        "$enc",
        BOB,
        5,
        json!({"rel_type": "m.annotation", "event_id": "$o", "key": "👀"}),
    ))
    .await;

    assert!(keys_and_counts(&room, "$o").is_empty());
    let bucket = room
        .relations(&EventId::from("$o"), &RelationType::Annotation, "m.room.encrypted")
        .unwrap();
    assert_eq!(bucket.len(), 1);
}
