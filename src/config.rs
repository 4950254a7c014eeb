use crate::error::PermviewError;

/// Runtime configuration for a permission store and the collections reading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermviewConfig {
    /// Unreferenced historical versions kept around for `read`. The latest
    /// version and every version pinned by a snapshot are always retained.
    pub max_retained_versions: usize,
    pub max_sort_keys: usize,
    pub max_expr_depth: usize,
    pub max_batch_entries: usize,
    /// Tick period used by [`crate::host::RefreshDriver`].
    pub refresh_interval_ms: u64,
}

impl Default for PermviewConfig {
    fn default() -> Self {
        Self {
            max_retained_versions: 16,
            max_sort_keys: 8,
            max_expr_depth: 32,
            max_batch_entries: 10_000,
            refresh_interval_ms: 16,
        }
    }
}

impl PermviewConfig {
    pub fn development() -> Self {
        Self {
            max_retained_versions: 1024,
            refresh_interval_ms: 50,
            ..Self::default()
        }
    }

    /// Ticks every millisecond and keeps no unreferenced history.
    pub fn low_latency() -> Self {
        Self {
            max_retained_versions: 0,
            refresh_interval_ms: 1,
            ..Self::default()
        }
    }

    pub fn with_max_retained_versions(mut self, versions: usize) -> Self {
        self.max_retained_versions = versions;
        self
    }

    pub fn with_max_batch_entries(mut self, entries: usize) -> Self {
        self.max_batch_entries = entries;
        self
    }

    pub fn with_refresh_interval_ms(mut self, interval_ms: u64) -> Self {
        self.refresh_interval_ms = interval_ms;
        self
    }

    pub fn validate(&self) -> Result<(), PermviewError> {
        if self.max_sort_keys == 0 {
            return Err(PermviewError::InvalidConfig {
                message: "max_sort_keys must be at least 1".into(),
            });
        }
        if self.max_expr_depth == 0 {
            return Err(PermviewError::InvalidConfig {
                message: "max_expr_depth must be at least 1".into(),
            });
        }
        if self.max_batch_entries == 0 {
            return Err(PermviewError::InvalidConfig {
                message: "max_batch_entries must be at least 1".into(),
            });
        }
        if self.refresh_interval_ms == 0 {
            return Err(PermviewError::InvalidConfig {
                message: "refresh_interval_ms must be non-zero".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::PermviewConfig;
    use crate::error::PermviewErrorCode;

    #[test]
    fn profiles_validate() {
        PermviewConfig::default().validate().expect("default");
        PermviewConfig::development().validate().expect("development");
        PermviewConfig::low_latency().validate().expect("low latency");
    }

    #[test]
    fn zero_limits_are_rejected() {
        let err = PermviewConfig::default()
            .with_max_batch_entries(0)
            .validate()
            .expect_err("zero batch");
        assert_eq!(err.code(), PermviewErrorCode::InvalidConfig);

        let err = PermviewConfig::default()
            .with_refresh_interval_ms(0)
            .validate()
            .expect_err("zero interval");
        assert_eq!(err.code(), PermviewErrorCode::InvalidConfig);
    }
}
