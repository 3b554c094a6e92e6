//! Store configuration.

/// Configuration for a [`Db`](crate::Db).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Prefix for ids minted for locally created resources.
    ///
    /// The server never assigns ids with this prefix, so an identifier that
    /// carries it is known to be temporary.
    pub temporary_id_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            temporary_id_prefix: "tmp-".to_string(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the temporary id prefix.
    #[must_use]
    pub fn temporary_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.temporary_id_prefix = prefix.into();
        self
    }
}
