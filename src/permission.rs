use crate::record::{Record, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub const PROPERTY_PATH: &str = "path";
pub const PROPERTY_USER_ID: &str = "userId";
pub const PROPERTY_ACCESS_LEVEL: &str = "accessLevel";
pub const PROPERTY_UPDATED_AT: &str = "updatedAt";

const SORTABLE: &[&str] = &[PROPERTY_PATH, PROPERTY_USER_ID, PROPERTY_UPDATED_AT];
const FILTERABLE: &[&str] = &[
    PROPERTY_PATH,
    PROPERTY_USER_ID,
    PROPERTY_ACCESS_LEVEL,
    PROPERTY_UPDATED_AT,
];

/// Access granted to one user on one path.
///
/// Levels are ordered, so `ReadWrite` implies `Read` and `Admin` implies both.
/// In predicates the level is exposed as an integer rank (see [`AccessLevel::rank`]).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    #[default]
    None,
    Read,
    ReadWrite,
    Admin,
}

impl AccessLevel {
    pub fn rank(self) -> i64 {
        match self {
            AccessLevel::None => 0,
            AccessLevel::Read => 1,
            AccessLevel::ReadWrite => 2,
            AccessLevel::Admin => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::None => "none",
            AccessLevel::Read => "read",
            AccessLevel::ReadWrite => "read_write",
            AccessLevel::Admin => "admin",
        }
    }

    pub fn may_read(self) -> bool {
        self >= AccessLevel::Read
    }

    pub fn may_write(self) -> bool {
        self >= AccessLevel::ReadWrite
    }

    pub fn may_manage(self) -> bool {
        self == AccessLevel::Admin
    }
}

impl From<AccessLevel> for Value {
    fn from(value: AccessLevel) -> Self {
        Value::Integer(value.rank())
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PermissionKey {
    pub path: String,
    pub user_id: String,
}

impl PermissionKey {
    pub fn new(path: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            user_id: user_id.into(),
        }
    }
}

/// One permission grant as last reported by the synchronization layer.
///
/// Entries are immutable; collections vend them behind `Arc` and only the
/// store's commit path replaces them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionEntry {
    path: String,
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(rename = "accessLevel")]
    access_level: AccessLevel,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "updatedAt")]
    updated_at: i64,
}

impl PermissionEntry {
    pub fn new(
        path: impl Into<String>,
        user_id: impl Into<String>,
        access_level: AccessLevel,
        updated_at: i64,
    ) -> Self {
        Self {
            path: path.into(),
            user_id: user_id.into(),
            access_level,
            updated_at,
        }
    }

    /// Stamps the entry with the current wall clock.
    pub fn now(path: impl Into<String>, user_id: impl Into<String>, access_level: AccessLevel) -> Self {
        Self::new(path, user_id, access_level, now_millis())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn access_level(&self) -> AccessLevel {
        self.access_level
    }

    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    pub fn identity(&self) -> PermissionKey {
        PermissionKey::new(self.path.clone(), self.user_id.clone())
    }
}

impl Record for PermissionEntry {
    type Key = PermissionKey;

    fn key(&self) -> PermissionKey {
        self.identity()
    }

    fn revision(&self) -> i64 {
        self.updated_at
    }

    fn sortable_properties() -> &'static [&'static str] {
        SORTABLE
    }

    fn filterable_properties() -> &'static [&'static str] {
        FILTERABLE
    }

    fn value(&self, property: &str) -> Option<Value> {
        match property {
            PROPERTY_PATH => Some(Value::Text(self.path.clone())),
            PROPERTY_USER_ID => Some(Value::Text(self.user_id.clone())),
            PROPERTY_ACCESS_LEVEL => Some(self.access_level.into()),
            PROPERTY_UPDATED_AT => Some(Value::Timestamp(self.updated_at)),
            _ => None,
        }
    }
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
