//! Branded ID newtypes for type safety.
//!
//! Events, rooms and users are all identified by opaque strings on the wire.
//! Wrapping each in its own newtype prevents passing a room ID where an event
//! ID is expected.
//!
//! Server-assigned IDs are taken verbatim from the wire. Local echoes get a
//! provisional event ID from [`EventId::new_local`] (a `~`-prefixed UUID v7)
//! until the transport layer swaps in the confirmed record.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Prefix marking a provisional (not yet server-assigned) event ID.
pub const LOCAL_ID_PREFIX: char = '~';

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Identifier of a protocol event (`$...` on the wire, `~...` for local echoes).
    EventId
}

branded_id! {
    /// Identifier of a room (`!...:server`).
    RoomId
}

branded_id! {
    /// Identifier of a user (`@...:server`).
    UserId
}

impl EventId {
    /// Create a provisional ID for a local echo.
    #[must_use]
    pub fn new_local() -> Self {
        Self(format!("{LOCAL_ID_PREFIX}{}", Uuid::now_v7()))
    }

    /// Whether this ID was generated locally and not yet confirmed by the server.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
