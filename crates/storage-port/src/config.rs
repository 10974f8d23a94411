use common::{PortError, PortResult, DEFAULT_CAPACITY, MAX_CAPACITY};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const ENV_CAPACITY: &str = "VSTOR_CAPACITY";
pub const ENV_TRANSACT_TIMEOUT_MS: &str = "VSTOR_TRANSACT_TIMEOUT_MS";

/// Tunables for a [`StoragePort`](crate::StoragePort).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    /// Number of unit slots (1..=256).
    pub capacity: usize,
    /// Applied to `transact` calls that do not pass their own timeout.
    /// `None` blocks until a request arrives or the unit goes away.
    #[serde(default)]
    pub transact_timeout: Option<Duration>,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            transact_timeout: None,
        }
    }
}

impl PortConfig {
    /// Defaults overridden by `VSTOR_CAPACITY` and `VSTOR_TRANSACT_TIMEOUT_MS`.
    pub fn from_env() -> PortResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> PortResult<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_CAPACITY) {
            config.capacity = raw.trim().parse().map_err(|_| {
                PortError::invalid_argument(format!("{ENV_CAPACITY} is not a number: {raw}"))
            })?;
        }
        if let Some(raw) = lookup(ENV_TRANSACT_TIMEOUT_MS) {
            let millis: u64 = raw.trim().parse().map_err(|_| {
                PortError::invalid_argument(format!(
                    "{ENV_TRANSACT_TIMEOUT_MS} is not a number: {raw}"
                ))
            })?;
            config.transact_timeout = Some(Duration::from_millis(millis));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PortResult<()> {
        if self.capacity == 0 || self.capacity > MAX_CAPACITY {
            return Err(PortError::invalid_argument(format!(
                "capacity must be within 1..={MAX_CAPACITY}, got {}",
                self.capacity
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = PortConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, PortConfig::default());
        assert_eq!(config.capacity, 16);
        assert!(config.transact_timeout.is_none());
    }

    #[test]
    fn overrides() {
        let config = PortConfig::from_lookup(lookup(&[
            (ENV_CAPACITY, "64"),
            (ENV_TRANSACT_TIMEOUT_MS, " 250 "),
        ]))
        .unwrap();
        assert_eq!(config.capacity, 64);
        assert_eq!(config.transact_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(PortConfig::from_lookup(lookup(&[(ENV_CAPACITY, "lots")])).is_err());
        assert!(PortConfig::from_lookup(lookup(&[(ENV_CAPACITY, "0")])).is_err());
        assert!(PortConfig::from_lookup(lookup(&[(ENV_CAPACITY, "257")])).is_err());
        assert!(PortConfig::from_lookup(lookup(&[(ENV_TRANSACT_TIMEOUT_MS, "-1")])).is_err());
    }
}
