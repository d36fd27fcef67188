//! Factory configuration.

/// Configuration for a [`crate::Factory`].
#[derive(Debug, Clone, Copy)]
pub struct FactoryConfig {
    /// Whether to create the database directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether commits with default durability flush the journal.
    pub sync_on_commit: bool,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
        }
    }
}

impl FactoryConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether default-durability commits flush the journal.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = FactoryConfig::default();
        assert!(config.create_if_missing);
        assert!(config.sync_on_commit);
    }

    #[test]
    fn builder_pattern() {
        let config = FactoryConfig::new()
            .create_if_missing(false)
            .sync_on_commit(false);
        assert!(!config.create_if_missing);
        assert!(!config.sync_on_commit);
    }
}
