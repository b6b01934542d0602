//! Global configuration used as the source of defaults for balancing and model cleanup
use std::sync::{LazyLock, RwLock};

use serde::Deserialize;
use thiserror::Error;

pub static CONFIGURATION: LazyLock<RwLock<Configuration>> =
    LazyLock::new(|| RwLock::new(Configuration::default()));

/// Snapshot of the global configuration, recovering it if the lock was poisoned
pub fn current() -> Configuration {
    match CONFIGURATION.read() {
        Ok(config) => config.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Tunable parameters for the reaction balancer and the cleanup loop
///
/// Fields missing from a JSON document take their default values.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Largest stoichiometric coefficient an explicit participant may be assigned
    pub max_stoichiometric_coefficient: u32,
    /// Largest coefficient used by the model cleanup loop
    pub cleanup_max_stoichiometric_coefficient: u32,
    /// Wall clock limit for a single solver call, in milliseconds
    pub solver_timeout_ms: u64,
    /// Number of cleanup passes after which the loop gives up
    pub max_cleanup_passes: usize,
    /// Change in balanced fraction below which the cleanup loop is considered stable
    pub convergence_tolerance: f64,
    /// Element residuals smaller than this are treated as zero
    pub residual_tolerance: f64,
    /// Remove reactions with identical reactant and product sets after every pass
    pub remove_pointless_reactions: bool,
    /// Remove species no longer referenced by any reaction after every pass
    pub remove_orphan_species: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            max_stoichiometric_coefficient: 8,
            cleanup_max_stoichiometric_coefficient: 12,
            solver_timeout_ms: 1000,
            max_cleanup_passes: 100,
            convergence_tolerance: 1e-8,
            residual_tolerance: 1e-8,
            remove_pointless_reactions: false,
            remove_orphan_species: false,
        }
    }
}

impl Configuration {
    /// Read a configuration from a JSON string
    ///
    /// # Examples
    /// ```rust
    /// use metabal_core::configuration::Configuration;
    /// let config = Configuration::from_json_str(r#"{"solver_timeout_ms": 250}"#).unwrap();
    /// assert_eq!(config.solver_timeout_ms, 250);
    /// assert_eq!(config.max_stoichiometric_coefficient, 8);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Configuration, ConfigurationError> {
        let config: Configuration = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the global configuration
    pub fn install(self) -> Result<(), ConfigurationError> {
        self.validate()?;
        match CONFIGURATION.write() {
            Ok(mut global) => {
                *global = self;
                Ok(())
            }
            Err(_) => Err(ConfigurationError::Poisoned),
        }
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_stoichiometric_coefficient < 1 || self.cleanup_max_stoichiometric_coefficient < 1
        {
            return Err(ConfigurationError::InvalidValue(
                "stoichiometric coefficient limits must be at least 1",
            ));
        }
        if self.max_cleanup_passes == 0 {
            return Err(ConfigurationError::InvalidValue(
                "max_cleanup_passes must be positive",
            ));
        }
        if !(self.convergence_tolerance >= 0.0 && self.residual_tolerance >= 0.0) {
            return Err(ConfigurationError::InvalidValue(
                "tolerances must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Errors raised while loading a configuration
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The document could not be deserialized
    #[error("Failed to read configuration: {0}")]
    Deserialize(#[from] serde_json::Error),
    /// A value is outside of its permitted range
    #[error("Invalid configuration value: {0}")]
    InvalidValue(&'static str),
    /// The global configuration lock was poisoned
    #[error("Global configuration lock is poisoned")]
    Poisoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let config =
            Configuration::from_json_str(r#"{"max_cleanup_passes": 5, "remove_orphan_species": true}"#)
                .unwrap();
        assert_eq!(config.max_cleanup_passes, 5);
        assert!(config.remove_orphan_species);
        assert_eq!(config.cleanup_max_stoichiometric_coefficient, 12);
        assert_eq!(config.solver_timeout_ms, 1000);
    }

    #[test]
    fn rejects_zero_coefficient_limit() {
        match Configuration::from_json_str(r#"{"max_stoichiometric_coefficient": 0}"#) {
            Err(ConfigurationError::InvalidValue(_)) => {}
            _ => panic!("Expected an invalid value error"),
        }
    }

    #[test]
    fn rejects_malformed_json() {
        match Configuration::from_json_str("{not json") {
            Err(ConfigurationError::Deserialize(_)) => {}
            _ => panic!("Expected a deserialize error"),
        }
    }
}
