//! Loader configuration.

/// Configuration for a [`RelationLoader`](crate::RelationLoader).
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Hydrate related records as plain maps unless a relation says otherwise.
    pub as_array: bool,
    /// Treat null key parts as equal to each other when matching records.
    ///
    /// Off by default: like SQL, null never matches null. When on, null
    /// key values also narrow dependent queries through `IS NULL`.
    pub null_keys_match: bool,
    /// Log a warning when a to-one relation matched more than one record.
    pub warn_on_to_one_overflow: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            as_array: false,
            null_keys_match: false,
            warn_on_to_one_overflow: true,
        }
    }
}

impl LoaderConfig {
    /// Create new default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default result mode (builder pattern).
    #[must_use]
    pub fn as_array(mut self, value: bool) -> Self {
        self.as_array = value;
        self
    }

    /// Set the `null_keys_match` option (builder pattern).
    #[must_use]
    pub fn null_keys_match(mut self, value: bool) -> Self {
        self.null_keys_match = value;
        self
    }

    /// Set the `warn_on_to_one_overflow` option (builder pattern).
    #[must_use]
    pub fn warn_on_to_one_overflow(mut self, value: bool) -> Self {
        self.warn_on_to_one_overflow = value;
        self
    }
}
