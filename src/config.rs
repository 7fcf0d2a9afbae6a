use std::str::FromStr;

use serde::Serialize;

use crate::{
    error::{Error, Result},
    news_store::NewsStore,
};

pub const EAGER_RESOLVE_COUNT: &str = "eager_resolve_count";
pub const VERIFY_EXISTENCE: &str = "verify_existence";
pub const BACKGROUND_SCAN_THRESHOLD: &str = "background_scan_threshold";
pub const REPLAY_CAPACITY: &str = "replay_capacity";

/// Every key understood by [`SessionConfig`].
pub const KEYS: [&str; 4] = [
    EAGER_RESOLVE_COUNT,
    VERIFY_EXISTENCE,
    BACKGROUND_SCAN_THRESHOLD,
    REPLAY_CAPACITY,
];

/// Tuning for a search session, persisted in the store's settings table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionConfig {
    /// Hits resolved in the background as soon as a query completes.
    pub eager_resolve_count: usize,
    /// Drop hits whose item the store no longer holds.
    pub verify_existence: bool,
    /// Event batches at least this large are planned off the foreground.
    /// Zero disables background planning.
    pub background_scan_threshold: usize,
    /// Events buffered while a query runs. Older events are dropped first.
    pub replay_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            eager_resolve_count: 20,
            verify_existence: false,
            background_scan_threshold: 512,
            replay_capacity: 4096,
        }
    }
}

impl SessionConfig {
    /// Read every key from the store, falling back to defaults.
    pub fn from_store(store: &NewsStore) -> Result<Self> {
        let mut config = Self::default();
        for key in KEYS {
            if let Some(value) = store.get_setting(key)? {
                config.set(key, &value)?;
            }
        }
        Ok(config)
    }

    /// Validate and persist one key.
    pub fn store_value(
        store: &NewsStore,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let mut checked = Self::default();
        checked.set(key, value)?;
        store.set_setting(key, value.trim())
    }

    /// Set one key from its textual form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            EAGER_RESOLVE_COUNT => self.eager_resolve_count = parse(key, value)?,
            VERIFY_EXISTENCE => self.verify_existence = parse_bool(key, value)?,
            BACKGROUND_SCAN_THRESHOLD => {
                self.background_scan_threshold = parse(key, value)?
            }
            REPLAY_CAPACITY => self.replay_capacity = parse(key, value)?,
            other => {
                return Err(Error::Config(format!(
                    "unknown setting '{other}' (expected one of: {})",
                    KEYS.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Key and value pairs in display form.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            (EAGER_RESOLVE_COUNT, self.eager_resolve_count.to_string()),
            (VERIFY_EXISTENCE, self.verify_existence.to_string()),
            (
                BACKGROUND_SCAN_THRESHOLD,
                self.background_scan_threshold.to_string(),
            ),
            (REPLAY_CAPACITY, self.replay_capacity.to_string()),
        ]
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        Error::Config(format!("invalid value '{value}' for {key}"))
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(Error::Config(format!(
            "invalid value '{value}' for {key} (expected true or false)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, NewsStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = NewsStore::open(&tmp.path().join("news.redb")).unwrap();
        (tmp, store)
    }

    #[test]
    fn defaults_when_unset() {
        let (_tmp, store) = test_store();
        assert_eq!(
            SessionConfig::from_store(&store).unwrap(),
            SessionConfig::default()
        );
    }

    #[test]
    fn stored_values_override_defaults() {
        let (_tmp, store) = test_store();
        SessionConfig::store_value(&store, EAGER_RESOLVE_COUNT, "5").unwrap();
        SessionConfig::store_value(&store, VERIFY_EXISTENCE, "yes").unwrap();

        let config = SessionConfig::from_store(&store).unwrap();
        assert_eq!(config.eager_resolve_count, 5);
        assert!(config.verify_existence);
        assert_eq!(config.replay_capacity, 4096);
    }

    #[test]
    fn invalid_values_are_rejected_before_storing() {
        let (_tmp, store) = test_store();
        let err =
            SessionConfig::store_value(&store, REPLAY_CAPACITY, "lots").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(store.get_setting(REPLAY_CAPACITY).unwrap(), None);

        assert!(SessionConfig::store_value(&store, "colour", "red").is_err());
    }

    #[test]
    fn corrupt_stored_value_is_a_config_error() {
        let (_tmp, store) = test_store();
        store.set_setting(VERIFY_EXISTENCE, "maybe").unwrap();
        assert!(matches!(
            SessionConfig::from_store(&store),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn entries_cover_every_key() {
        let entries = SessionConfig::default().entries();
        let keys: Vec<_> = entries.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, KEYS.to_vec());
    }
}
