//! Protocol constants shared across crates.

/// Current version of the SDK (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Event type of a plain room message.
pub const ROOM_MESSAGE: &str = "m.room.message";

/// Event type of an encrypted event before decryption.
pub const ROOM_ENCRYPTED: &str = "m.room.encrypted";

/// Event type of a reaction (an `m.annotation` relation).
pub const REACTION: &str = "m.reaction";

/// Event type of a room tombstone.
pub const ROOM_TOMBSTONE: &str = "m.room.tombstone";

/// Content key carrying the relation descriptor.
pub const RELATES_TO: &str = "m.relates_to";

/// Content key carrying the replacement body of an edit.
pub const NEW_CONTENT: &str = "m.new_content";

/// Key under `unsigned` holding server bundled aggregations.
pub const BUNDLED_RELATIONS: &str = "m.relations";

/// Stable name of the thread relation.
pub const THREAD_STABLE: &str = "m.thread";

/// Unstable (MSC3440) name of the thread relation.
pub const THREAD_UNSTABLE: &str = "io.element.thread";
