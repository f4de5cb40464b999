//! Room state collaborator interface used by push evaluation.

use crate::ids::UserId;

/// A room member as seen by the current room state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoomMember {
    /// Current display name, if set.
    pub display_name: Option<String>,
    /// Current power level.
    pub power_level: i64,
}

/// Read-only view of a room's current state.
pub trait RoomState: Send + Sync {
    /// The member record for `user_id`, if they are in the room.
    fn member(&self, user_id: &UserId) -> Option<RoomMember>;

    /// Number of joined members.
    fn joined_member_count(&self) -> u64;

    /// Whether `user_id` has enough power to trigger notifications of `kind`
    /// (e.g. `room` for `@room` mentions).
    fn may_trigger_notif_of_type(&self, kind: &str, user_id: &UserId) -> bool;
}
