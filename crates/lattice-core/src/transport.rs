//! Transport collaborator interface and the relations lookup request.
//!
//! The SDK core never talks HTTP itself. Everything that needs the server goes
//! through a [`Transport`], which executes one client-server API request and
//! returns the decoded JSON body.

use std::fmt;

use async_trait::async_trait;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::ids::{EventId, RoomId};

/// Failure reported by a [`Transport`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request never produced a response.
    #[error("connection error: {message}")]
    Connection {
        /// Underlying cause.
        message: String,
    },

    /// The server answered with a protocol error.
    #[error("{errcode} ({http_status}): {message}")]
    Matrix {
        /// HTTP status code.
        http_status: u16,
        /// Protocol error code, e.g. `M_NOT_FOUND`.
        errcode: String,
        /// Human-readable error.
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("undecodable response: {0}")]
    Decode(String),
}

/// HTTP method of a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
        })
    }
}

/// One client-server API request.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: Method,
    /// Path below the homeserver base URL, already percent-encoded.
    pub path: String,
    /// Query parameters in order.
    pub query: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<Value>,
}

impl TransportRequest {
    /// A `GET` request with no query.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Value of a query parameter.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Executes client-server API requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and return the decoded JSON body.
    async fn request(&self, request: TransportRequest) -> Result<Value, TransportError>;
}

/// Pagination direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Newest first (`b`).
    #[default]
    #[serde(rename = "b")]
    Backward,
    /// Oldest first (`f`).
    #[serde(rename = "f")]
    Forward,
}

impl Direction {
    /// Wire value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backward => "b",
            Self::Forward => "f",
        }
    }
}

/// Optional parameters of a relations lookup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelationsRequestOpts {
    /// Maximum number of events to return.
    pub limit: Option<u32>,
    /// Pagination token.
    pub from: Option<String>,
    /// Pagination direction; the server default is backwards.
    pub dir: Option<Direction>,
}

/// One page of related events.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationsChunk {
    /// Raw wire events, in the order the server returned them.
    #[serde(default)]
    pub chunk: Vec<Value>,
    /// Token for the next page in the requested direction.
    #[serde(default)]
    pub next_batch: Option<String>,
    /// Token for the previous page.
    #[serde(default)]
    pub prev_batch: Option<String>,
}

fn encode(segment: &str) -> String {
    utf8_percent_encode(segment, NON_ALPHANUMERIC).to_string()
}

/// Build the relations lookup request for an origin event.
#[must_use]
pub fn relations_request(
    room_id: &RoomId,
    event_id: &EventId,
    relation_type: &str,
    event_type: Option<&str>,
    opts: &RelationsRequestOpts,
) -> TransportRequest {
    let mut path = format!(
        "/_matrix/client/v1/rooms/{}/relations/{}/{}",
        encode(room_id),
        encode(event_id),
        encode(relation_type),
    );
    if let Some(event_type) = event_type {
        path.push('/');
        path.push_str(&encode(event_type));
    }

    let mut request = TransportRequest::get(path);
    if let Some(limit) = opts.limit {
        request.query.push(("limit".into(), limit.to_string()));
    }
    if let Some(from) = &opts.from {
        request.query.push(("from".into(), from.clone()));
    }
    if let Some(dir) = opts.dir {
        request.query.push(("dir".into(), dir.as_str().into()));
    }
    request
}

/// Fetch one page of events related to `event_id`.
pub async fn fetch_relations(
    transport: &dyn Transport,
    room_id: &RoomId,
    event_id: &EventId,
    relation_type: &str,
    event_type: Option<&str>,
    opts: &RelationsRequestOpts,
) -> Result<RelationsChunk, TransportError> {
    let request = relations_request(room_id, event_id, relation_type, event_type, opts);
    debug!(path = %request.path, "fetching relations");
    let body = transport.request(request).await?;
    serde_json::from_value(body).map_err(|e| TransportError::Decode(e.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
