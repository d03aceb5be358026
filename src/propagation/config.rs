//! Propagation tunables.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::quantity::Quantity;

/// A named absorption pool and its share of the remainder, in percent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolShare {
    pub name: String,
    pub percent: u32,
}

impl PoolShare {
    pub fn new(name: impl Into<String>, percent: u32) -> Self {
        Self {
            name: name.into(),
            percent,
        }
    }
}

/// Parameters of the three-phase distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    /// Maximum hop that can receive a share.
    pub horizon: u32,
    /// Share at hop `h` is `R / decay_base^h`.
    pub decay_base: u32,
    /// Amount earmarked for the introducer on a join.
    pub acknowledgement: Quantity,
    /// Recipients scoring below this are redirected to the first pool.
    pub min_activity_score: f64,
    /// Absorption pools in order. The first one also takes redirects and dust.
    pub pools: Vec<PoolShare>,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            horizon: 15,
            decay_base: 2,
            acknowledgement: Quantity::from_whole(10),
            min_activity_score: 10.0,
            pools: vec![
                PoolShare::new("stability", 40),
                PoolShare::new("liquidity", 25),
                PoolShare::new("intelligence", 20),
                PoolShare::new("compliance", 15),
            ],
        }
    }
}

impl PropagationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.horizon < 1 {
            bail!("propagation.horizon must be at least 1");
        }
        if self.decay_base < 2 {
            bail!(
                "propagation.decay_base must be at least 2 (got {})",
                self.decay_base
            );
        }
        if self.pools.is_empty() {
            bail!("propagation.pools must name at least one pool");
        }
        let total: u32 = self.pools.iter().map(|p| p.percent).sum();
        if total != 100 {
            bail!("propagation.pools percentages must sum to 100 (got {total})");
        }
        if self.acknowledgement.is_negative() {
            bail!("propagation.acknowledgement must not be negative");
        }
        Ok(())
    }

    /// Pool that receives redirected shares and rounding dust.
    pub fn redirect_pool(&self) -> &str {
        self.pools
            .first()
            .map(|p| p.name.as_str())
            .unwrap_or("stability")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = PropagationConfig::default();
        config.validate().unwrap();
        assert_eq!(config.redirect_pool(), "stability");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PropagationConfig {
            decay_base: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.decay_base = 2;
        config.pools[0].percent = 41;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("101"));

        config.pools.clear();
        assert!(config.validate().is_err());

        let zero_horizon = PropagationConfig {
            horizon: 0,
            ..Default::default()
        };
        assert!(zero_horizon.validate().is_err());
    }
}
