//! Configuration for sync managers.

/// Configuration for a [`crate::SyncManager`].
#[derive(Debug, Clone)]
pub struct SyncManagerConfig {
    /// REST API version used when building request paths.
    pub api_version: String,
    /// Name of the soup holding persisted sync states.
    pub syncs_soup: String,
    /// Upper bound on dirty records considered by one sync-up run.
    pub sync_up_page_size: u32,
}

impl SyncManagerConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            api_version: "v60.0".into(),
            syncs_soup: "syncs".into(),
            sync_up_page_size: 2000,
        }
    }

    /// Sets the REST API version.
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Sets the soup holding persisted sync states.
    pub fn with_syncs_soup(mut self, syncs_soup: impl Into<String>) -> Self {
        self.syncs_soup = syncs_soup.into();
        self
    }

    /// Sets the sync-up page size.
    pub fn with_sync_up_page_size(mut self, page_size: u32) -> Self {
        self.sync_up_page_size = page_size;
        self
    }
}

impl Default for SyncManagerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = SyncManagerConfig::new()
            .with_api_version("v61.0")
            .with_syncs_soup("__syncs__")
            .with_sync_up_page_size(500);

        assert_eq!(config.api_version, "v61.0");
        assert_eq!(config.syncs_soup, "__syncs__");
        assert_eq!(config.sync_up_page_size, 500);
    }

    #[test]
    fn defaults() {
        let config = SyncManagerConfig::default();
        assert_eq!(config.syncs_soup, "syncs");
        assert_eq!(config.sync_up_page_size, 2000);
    }
}
