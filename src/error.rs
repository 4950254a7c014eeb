use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermviewErrorCode {
    WrongThread,
    StaleVersion,
    VersionNotVisible,
    InvalidSortProperty,
    InvalidPredicate,
    IncompatibleSnapshots,
    UnsupportedOperation,
    Detached,
    InvalidConfig,
    Validation,
    Decode,
}

impl PermviewErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            PermviewErrorCode::WrongThread => "wrong_thread",
            PermviewErrorCode::StaleVersion => "stale_version",
            PermviewErrorCode::VersionNotVisible => "version_not_visible",
            PermviewErrorCode::InvalidSortProperty => "invalid_sort_property",
            PermviewErrorCode::InvalidPredicate => "invalid_predicate",
            PermviewErrorCode::IncompatibleSnapshots => "incompatible_snapshots",
            PermviewErrorCode::UnsupportedOperation => "unsupported_operation",
            PermviewErrorCode::Detached => "detached",
            PermviewErrorCode::InvalidConfig => "invalid_config",
            PermviewErrorCode::Validation => "validation",
            PermviewErrorCode::Decode => "decode",
        }
    }
}

/// Errors are `Clone` so a single refresh failure can be handed to every
/// subscriber of the collection that hit it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermviewError {
    #[error("{operation} called off the owning thread (owner={owner}, caller={caller})")]
    WrongThread {
        operation: &'static str,
        owner: String,
        caller: String,
    },
    #[error("requested version {requested} has been reclaimed (oldest retained: {oldest_retained})")]
    StaleVersion { requested: u64, oldest_retained: u64 },
    #[error("requested version {requested} is not yet visible (latest: {latest})")]
    VersionNotVisible { requested: u64, latest: u64 },
    #[error("invalid sort property '{property}'")]
    InvalidSortProperty { property: String },
    #[error("invalid predicate: {reason}")]
    InvalidPredicate { reason: String },
    #[error("incompatible snapshots: {reason}")]
    IncompatibleSnapshots { reason: String },
    #[error("unsupported operation: {operation}")]
    UnsupportedOperation { operation: &'static str },
    #[error("collection detached")]
    Detached,
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl PermviewError {
    pub fn code(&self) -> PermviewErrorCode {
        match self {
            PermviewError::WrongThread { .. } => PermviewErrorCode::WrongThread,
            PermviewError::StaleVersion { .. } => PermviewErrorCode::StaleVersion,
            PermviewError::VersionNotVisible { .. } => PermviewErrorCode::VersionNotVisible,
            PermviewError::InvalidSortProperty { .. } => PermviewErrorCode::InvalidSortProperty,
            PermviewError::InvalidPredicate { .. } => PermviewErrorCode::InvalidPredicate,
            PermviewError::IncompatibleSnapshots { .. } => {
                PermviewErrorCode::IncompatibleSnapshots
            }
            PermviewError::UnsupportedOperation { .. } => PermviewErrorCode::UnsupportedOperation,
            PermviewError::Detached => PermviewErrorCode::Detached,
            PermviewError::InvalidConfig { .. } => PermviewErrorCode::InvalidConfig,
            PermviewError::Validation(_) => PermviewErrorCode::Validation,
            PermviewError::Decode(_) => PermviewErrorCode::Decode,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    /// Whether re-issuing the same call from the right context can succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PermviewError::WrongThread { .. })
    }
}

impl From<serde_json::Error> for PermviewError {
    fn from(value: serde_json::Error) -> Self {
        PermviewError::Decode(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{PermviewError, PermviewErrorCode};

    #[test]
    fn error_code_strings_are_stable() {
        assert_eq!(PermviewErrorCode::WrongThread.as_str(), "wrong_thread");
        assert_eq!(
            PermviewErrorCode::InvalidSortProperty.as_str(),
            "invalid_sort_property"
        );
        assert_eq!(
            PermviewErrorCode::UnsupportedOperation.as_str(),
            "unsupported_operation"
        );
    }

    #[test]
    fn error_code_str_matches_variant_mapping() {
        let err = PermviewError::StaleVersion {
            requested: 3,
            oldest_retained: 7,
        };
        assert_eq!(err.code(), PermviewErrorCode::StaleVersion);
        assert_eq!(err.code_str(), "stale_version");
        assert_eq!(
            err.to_string(),
            "requested version 3 has been reclaimed (oldest retained: 7)"
        );
    }

    #[test]
    fn only_wrong_thread_is_recoverable() {
        let wrong = PermviewError::WrongThread {
            operation: "items",
            owner: "ThreadId(1)".into(),
            caller: "ThreadId(2)".into(),
        };
        assert!(wrong.is_recoverable());
        assert!(!PermviewError::Detached.is_recoverable());
    }
}
