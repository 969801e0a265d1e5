use crate::error::AcadError;
use std::path::PathBuf;
use tracing::warn;

pub const ENV_CAPACITY_BYTES: &str = "ACADB_CAPACITY_BYTES";
pub const ENV_MAX_READERS: &str = "ACADB_MAX_READERS";
pub const ENV_MAX_TABLES: &str = "ACADB_MAX_TABLES";

/// Floor for the concurrent-reader budget. An under-provisioned budget turns
/// into hard request failures under load, so overrides below this are clamped
/// up rather than honored.
const MIN_READERS: usize = 16;
const MAX_READERS_CEILING: usize = 126;

const DEFAULT_CAPACITY_BYTES: u64 = 256 * 1024 * 1024;
const MIN_CAPACITY_BYTES: u64 = 16 * 1024 * 1024;
const DEFAULT_MAX_TABLES: usize = 8;

/// Runtime configuration for the storage engine adapter.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    /// Engine cache/capacity budget in bytes.
    pub capacity_bytes: u64,
    /// Concurrent read-transaction slots enforced by the adapter.
    pub max_readers: usize,
    /// Budget for named sub-stores the adapter may open.
    pub max_tables: usize,
}

impl StoreConfig {
    /// Computed resource profile for a data directory, no overrides applied.
    pub fn profile(data_dir: impl Into<PathBuf>) -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            data_dir: data_dir.into(),
            capacity_bytes: DEFAULT_CAPACITY_BYTES,
            max_readers: (parallelism * 4).clamp(MIN_READERS, MAX_READERS_CEILING),
            max_tables: DEFAULT_MAX_TABLES,
        }
    }

    /// Profile plus process-environment overrides.
    pub fn from_env(data_dir: impl Into<PathBuf>) -> Result<Self, AcadError> {
        Self::from_env_with(data_dir, |name| std::env::var(name).ok())
    }

    /// Override application with an injectable environment lookup.
    ///
    /// Each override is parsed independently: setting the capacity never
    /// touches the reader budget, and a reader override below the floor is
    /// clamped up rather than silently shrinking the budget.
    pub fn from_env_with(
        data_dir: impl Into<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AcadError> {
        let mut config = Self::profile(data_dir);

        if let Some(raw) = lookup(ENV_CAPACITY_BYTES) {
            config.capacity_bytes = parse_override(ENV_CAPACITY_BYTES, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_READERS) {
            let requested: usize = parse_override(ENV_MAX_READERS, &raw)?;
            if requested < MIN_READERS {
                warn!(
                    requested,
                    floor = MIN_READERS,
                    "reader budget override below floor, clamping up"
                );
            }
            config.max_readers = requested.clamp(MIN_READERS, MAX_READERS_CEILING);
        }
        if let Some(raw) = lookup(ENV_MAX_TABLES) {
            config.max_tables = parse_override(ENV_MAX_TABLES, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AcadError> {
        if self.capacity_bytes < MIN_CAPACITY_BYTES {
            return Err(AcadError::InvalidConfig {
                message: format!(
                    "capacity {} below minimum {}",
                    self.capacity_bytes, MIN_CAPACITY_BYTES
                ),
            });
        }
        if self.max_readers == 0 {
            return Err(AcadError::InvalidConfig {
                message: "at least one reader slot is required".into(),
            });
        }
        if self.max_tables == 0 {
            return Err(AcadError::InvalidConfig {
                message: "at least one named sub-store is required".into(),
            });
        }
        Ok(())
    }
}

fn parse_override<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, AcadError> {
    raw.trim()
        .parse()
        .map_err(|_| AcadError::InvalidConfig {
            message: format!("{name} is not a valid number: {raw:?}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn profile_has_sane_reader_budget() {
        let config = StoreConfig::profile("/tmp/acadb");
        assert!(config.max_readers >= MIN_READERS);
        assert!(config.max_readers <= MAX_READERS_CEILING);
    }

    #[test]
    fn capacity_override_leaves_reader_budget_alone() {
        let base = StoreConfig::profile("/tmp/acadb");
        let config = StoreConfig::from_env_with(
            "/tmp/acadb",
            env(&[(ENV_CAPACITY_BYTES, "134217728")]),
        )
        .unwrap();
        assert_eq!(config.capacity_bytes, 134_217_728);
        assert_eq!(config.max_readers, base.max_readers);
    }

    #[test]
    fn reader_override_below_floor_is_clamped_up() {
        let config =
            StoreConfig::from_env_with("/tmp/acadb", env(&[(ENV_MAX_READERS, "2")])).unwrap();
        assert_eq!(config.max_readers, MIN_READERS);
    }

    #[test]
    fn unparsable_override_is_rejected() {
        let err = StoreConfig::from_env_with("/tmp/acadb", env(&[(ENV_MAX_TABLES, "many")]))
            .unwrap_err();
        assert_eq!(err.code_str(), "invalid_config");
    }

    #[test]
    fn zero_reader_budget_is_rejected() {
        let mut config = StoreConfig::profile("/tmp/acadb");
        config.max_readers = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.code_str(), "invalid_config");
    }

    #[test]
    fn undersized_capacity_is_rejected() {
        let err = StoreConfig::from_env_with("/tmp/acadb", env(&[(ENV_CAPACITY_BYTES, "1024")]))
            .unwrap_err();
        assert_eq!(err.code_str(), "invalid_config");
    }
}
