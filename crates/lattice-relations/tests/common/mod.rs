//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;

use async_trait::async_trait;
use lattice_core::{
    ClearEvent, DecryptionError, Decryptor, EventId, MatrixEvent, RoomId, SharedEvent, Transport,
    TransportError, TransportRequest, UserId,
};
use lattice_relations::RoomTimeline;
use lattice_settings::ClientSettings;
use parking_lot::Mutex;
use serde_json::{Value, json};

pub const ROOM: &str = "!room:example.org";
pub const ME: &str = "@me:example.org";
pub const ALICE: &str = "@alice:example.org";
pub const BOB: &str = "@bob:example.org";

pub fn room_id() -> RoomId {
    RoomId::from(ROOM)
}

pub fn timeline(server_side_support: bool) -> RoomTimeline {
    let mut settings = ClientSettings::default();
    settings.threads.server_side_support = server_side_support;
    RoomTimeline::new(room_id(), UserId::from(ME), &settings)
}

pub fn raw(id: &str, kind: &str, sender: &str, ts: u64, content: Value) -> Value {
    json!({
        "event_id": id,
        "type": kind,
        "sender": sender,
        "origin_server_ts": ts,
        "content": content,
    })
}

pub fn event_at(raw: Value, local_ts: u64) -> SharedEvent {
    MatrixEvent::from_json_at(&room_id(), raw, local_ts).unwrap()
}

pub fn message(id: &str, sender: &str, ts: u64) -> SharedEvent {
    event_at(raw(id, "m.room.message", sender, ts, json!({"msgtype": "m.text", "body": id})), ts)
}

pub fn reaction(id: &str, sender: &str, target: &str, key: &str) -> SharedEvent {
    event_at(
        raw(
            id,
            "m.reaction",
            sender,
            5,
            lattice_core::content::make_reaction(&EventId::from(target), key),
        ),
        5,
    )
}

pub fn edit(id: &str, sender: &str, target: &str, ts: u64) -> SharedEvent {
    event_at(
        raw(
            id,
            "m.room.message",
            sender,
            ts,
            lattice_core::content::make_replacement(&EventId::from(target), id),
        ),
        ts,
    )
}

pub fn thread_reply(id: &str, sender: &str, root: &str, ts: u64) -> SharedEvent {
    event_at(
        raw(
            id,
            "m.room.message",
            sender,
            ts,
            lattice_core::content::make_thread_reply(&EventId::from(root), id),
        ),
        ts,
    )
}

pub fn local_echo(event_type: &str, content: Value) -> SharedEvent {
    MatrixEvent::local_echo(&room_id(), &UserId::from(ME), event_type, content)
}

/// The server's copy of `echo`, as delivered by sync.
pub fn remote_copy(echo: &SharedEvent, id: &str) -> SharedEvent {
    let mut value = raw(
        id,
        echo.wire_type(),
        echo.sender().as_str(),
        echo.origin_server_ts(),
        echo.wire_content().clone(),
    );
    value["unsigned"] = json!({"transaction_id": echo.event_id().as_str()});
    event_at(value, echo.local_timestamp() + 5)
}

/// Transport answering by path prefix and recording every request.
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<HashMap<String, Result<Value, TransportError>>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl FakeTransport {
    pub fn respond(&self, path_contains: &str, response: Result<Value, TransportError>) {
        let _ = self.responses.lock().insert(path_contains.to_owned(), response);
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn request(&self, request: TransportRequest) -> Result<Value, TransportError> {
        self.requests.lock().push(request.clone());
        self.responses
            .lock()
            .iter()
            .find(|(needle, _)| request.path.contains(needle.as_str()))
            .map_or_else(
                || {
                    Err(TransportError::Matrix {
                        http_status: 404,
                        errcode: "M_NOT_FOUND".into(),
                        message: "no fixture".into(),
                    })
                },
                |(_, response)| response.clone(),
            )
    }
}

/// Decryptor that maps event IDs to cleartexts and fails for the rest.
#[derive(Default)]
pub struct FakeDecryptor {
    clear: Mutex<HashMap<String, ClearEvent>>,
}

impl FakeDecryptor {
    pub fn with(self, event_id: &str, event_type: &str, content: Value) -> Self {
        let _ = self.clear.lock().insert(
            event_id.to_owned(),
            ClearEvent {
                event_type: event_type.to_owned(),
                content,
            },
        );
        self
    }
}

#[async_trait]
impl Decryptor for FakeDecryptor {
    async fn decrypt(&self, event: &MatrixEvent) -> Result<ClearEvent, DecryptionError> {
        self.clear
            .lock()
            .get(event.event_id().as_str())
            .cloned()
            .ok_or_else(|| DecryptionError::MissingRoomKey {
                session_id: "unknown".into(),
            })
    }
}

pub fn encrypted(id: &str, sender: &str, ts: u64, relates_to: Value) -> SharedEvent {
    event_at(
        raw(
            id,
            "m.room.encrypted",
            sender,
            ts,
            json!({
                "algorithm": "m.megolm.v1.aes-sha2",
                "ciphertext": "AAAA",
                "session_id": "s1",
                "m.relates_to": relates_to,
            }),
        ),
        ts,
    )
}
