//! Local store configuration.

/// Configuration for opening a [`LocalStore`](crate::LocalStore).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Number of journal records appended before the journal is rewritten
    /// as a snapshot (0 = never compact automatically).
    pub compact_after_records: usize,

    /// Whether to fsync the journal after every append.
    pub sync_on_write: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            compact_after_records: 1000,
            sync_on_write: true,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the automatic compaction threshold.
    #[must_use]
    pub const fn compact_after_records(mut self, records: usize) -> Self {
        self.compact_after_records = records;
        self
    }

    /// Sets whether to fsync the journal on every append.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }
}
