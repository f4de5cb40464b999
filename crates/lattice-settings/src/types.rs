//! Settings type definitions.
//!
//! All types use camelCase JSON keys and `#[serde(default)]`, so a partial
//! settings file only needs the values it overrides.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the client SDK.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Relation aggregation.
    pub relations: RelationSettings,
    /// Thread aggregation.
    pub threads: ThreadSettings,
    /// Push rule evaluation.
    pub push: PushSettings,
    /// Logging.
    pub logging: LoggingSettings,
}

impl ClientSettings {
    /// Reject values the aggregation layer cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.relations.notification_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "relations.notificationCapacity must be greater than zero".into(),
            ));
        }
        if self.relations.edit_fetch_limit == 0 {
            return Err(SettingsError::InvalidValue(
                "relations.editFetchLimit must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Relation aggregation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelationSettings {
    /// Capacity of bucket and thread notification channels.
    pub notification_capacity: usize,
    /// Page size when fetching the latest edit of an encrypted event.
    pub edit_fetch_limit: u32,
}

impl Default for RelationSettings {
    fn default() -> Self {
        Self {
            notification_capacity: 64,
            edit_fetch_limit: 1,
        }
    }
}

/// Thread aggregation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThreadSettings {
    /// Whether the homeserver bundles thread summaries.
    pub server_side_support: bool,
    /// Use `m.thread` rather than `io.element.thread` in requests.
    pub prefer_stable_prefix: bool,
}

impl Default for ThreadSettings {
    fn default() -> Self {
        Self {
            server_side_support: false,
            prefer_stable_prefix: true,
        }
    }
}

/// Push rule evaluation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PushSettings {
    /// Rewrite the fetched rule set with the built-in override rules.
    pub inject_default_overrides: bool,
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            inject_default_overrides: true,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level when no `RUST_LOG` is set.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".into(),
        }
    }
}
