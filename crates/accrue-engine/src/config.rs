//! Deployment configuration.
//!
//! A deployment is described by one TOML document: the minter's schedule and
//! pools, the routers, and the staking services. Pools, routers and services
//! refer to each other by name; [`EngineConfig::validate`] resolves every name
//! and rejects the document before any state is built.
//!
//! ```toml
//! owner = "<64 hex>"
//! first_tick_supply = "3.5"
//!
//! [[pools]]
//! name = "staking"
//!
//! [[schedule]]
//! cycle_days = 7
//! cycles_count = 52
//! multiplier = "0.994"
//! shares = { staking = "0.72" }
//!
//! [[service]]
//! name = "single"
//! id = "<64 hex>"
//! staking_asset = "NMX"
//! supplier = { pool = "staking" }
//! ```

use std::collections::{BTreeMap, BTreeSet};

use accrue_emission::{EmissionScheduleItem, PoolDistributionSchedule};
use accrue_types::{AccountId, AssetId, Decimal, Timestamp, SECONDS_PER_DAY};
use serde::{Deserialize, Serialize};

use crate::{EngineError, Result};

/// Complete deployment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Owner of the minter, and of routers and services that name no owner.
    pub owner: AccountId,
    /// When emission starts.
    #[serde(default)]
    pub start_time: Timestamp,
    /// Emission per second during the first cycle.
    pub first_tick_supply: Decimal,
    /// Initial output rate, in `(0, 1]`.
    #[serde(default = "default_output_rate")]
    pub output_rate: Decimal,
    /// Asset minted by the emission stream.
    #[serde(default = "default_reward_asset")]
    pub reward_asset: AssetId,
    /// Allocation pools, in index order.
    pub pools: Vec<PoolConfig>,
    #[serde(default)]
    pub schedule: Vec<ScheduleItemConfig>,
    /// Optional overlay replacing the per-item shares.
    #[serde(default)]
    pub pool_distribution: Vec<PoolDistributionConfig>,
    #[serde(default, rename = "router")]
    pub routers: Vec<RouterConfig>,
    #[serde(default, rename = "service")]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub name: String,
    /// External owner. Pools drained by a router or service leave this unset.
    #[serde(default)]
    pub owner: Option<AccountId>,
}

/// One schedule item. The cycle length is `cycle_days` days plus
/// `cycle_seconds` seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleItemConfig {
    #[serde(default)]
    pub cycle_days: u64,
    #[serde(default)]
    pub cycle_seconds: u64,
    pub cycles_count: u32,
    pub multiplier: Decimal,
    /// Pool name to share. Pools not listed get nothing.
    #[serde(default)]
    pub shares: BTreeMap<String, Decimal>,
}

/// One overlay step, in force for `duration` seconds after the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolDistributionConfig {
    #[serde(default)]
    pub duration: u64,
    pub factors: BTreeMap<String, Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    pub name: String,
    pub id: AccountId,
    #[serde(default)]
    pub owner: Option<AccountId>,
    /// The pool the router drains.
    pub pool: String,
    /// Service name to weight.
    #[serde(default)]
    pub weights: BTreeMap<String, Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub id: AccountId,
    #[serde(default)]
    pub owner: Option<AccountId>,
    pub staking_asset: AssetId,
    pub supplier: SupplierConfig,
}

/// A service's upstream, by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplierConfig {
    Pool(String),
    Router(String),
}

fn default_output_rate() -> Decimal {
    Decimal::ONE
}

fn default_reward_asset() -> AssetId {
    AssetId::new("NMX")
}

fn invalid(message: impl Into<String>) -> EngineError {
    EngineError::InvalidConfig(message.into())
}

impl EngineConfig {
    /// Parse a TOML document. Does not validate.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| invalid(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| invalid(e.to_string()))
    }

    /// Index of the pool called `name`.
    pub fn pool_index(&self, name: &str) -> Option<usize> {
        self.pools.iter().position(|pool| pool.name == name)
    }

    /// Check names, identities and numeric bounds.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidConfig`] for structural problems
    /// - [`EngineError::Emission`] for invalid multipliers, shares or factors
    pub fn validate(&self) -> Result<()> {
        if self.owner.is_zero() {
            return Err(invalid("owner must not be the zero account"));
        }
        if self.output_rate.is_zero() || self.output_rate > Decimal::ONE {
            return Err(invalid(format!(
                "output_rate must be in (0, 1], got {}",
                self.output_rate
            )));
        }
        if self.pools.is_empty() {
            return Err(invalid("at least one pool is required"));
        }
        unique("pool", self.pools.iter().map(|p| p.name.as_str()))?;
        unique("router", self.routers.iter().map(|r| r.name.as_str()))?;
        unique("service", self.services.iter().map(|s| s.name.as_str()))?;

        self.schedule_items()?;
        self.distribution()?;

        let mut identities = BTreeSet::new();
        for id in self
            .routers
            .iter()
            .map(|r| r.id)
            .chain(self.services.iter().map(|s| s.id))
        {
            if id.is_zero() {
                return Err(invalid("router and service ids must not be zero"));
            }
            if !identities.insert(id) {
                return Err(invalid(format!("identity {id} is used twice")));
            }
        }

        let mut claimed = BTreeSet::new();
        let mut claim = |pool: &str, by: &str| -> Result<()> {
            if self.pool_index(pool).is_none() {
                return Err(invalid(format!("{by} refers to unknown pool '{pool}'")));
            }
            if !claimed.insert(pool.to_string()) {
                return Err(invalid(format!("pool '{pool}' has more than one owner")));
            }
            Ok(())
        };
        for pool in &self.pools {
            if let Some(owner) = pool.owner {
                if identities.contains(&owner) {
                    return Err(invalid(format!(
                        "pool '{}' owner {owner} is a router or service",
                        pool.name
                    )));
                }
                claim(&pool.name, "pool owner")?;
            }
        }
        for router in &self.routers {
            claim(&router.pool, &format!("router '{}'", router.name))?;
        }
        for service in &self.services {
            match &service.supplier {
                SupplierConfig::Pool(pool) => {
                    claim(pool, &format!("service '{}'", service.name))?;
                }
                SupplierConfig::Router(router) => {
                    if !self.routers.iter().any(|r| &r.name == router) {
                        return Err(invalid(format!(
                            "service '{}' refers to unknown router '{router}'",
                            service.name
                        )));
                    }
                }
            }
        }

        for router in &self.routers {
            for participant in router.weights.keys() {
                let service = self
                    .services
                    .iter()
                    .find(|s| &s.name == participant)
                    .ok_or_else(|| {
                        invalid(format!(
                            "router '{}' weights unknown service '{participant}'",
                            router.name
                        ))
                    })?;
                if service.supplier != SupplierConfig::Router(router.name.clone()) {
                    return Err(invalid(format!(
                        "router '{}' weights service '{participant}', which it does not supply",
                        router.name
                    )));
                }
            }
            accrue_router::validate_weights(&self.router_weights(router)?)?;
        }
        Ok(())
    }

    /// Schedule items with shares laid out in pool order.
    pub fn schedule_items(&self) -> Result<Vec<EmissionScheduleItem>> {
        self.schedule
            .iter()
            .map(|item| -> Result<EmissionScheduleItem> {
                let duration = item
                    .cycle_days
                    .checked_mul(SECONDS_PER_DAY)
                    .and_then(|d| d.checked_add(item.cycle_seconds))
                    .ok_or(EngineError::Overflow)?;
                let shares = self.by_pool(&item.shares, "schedule shares")?;
                Ok(EmissionScheduleItem::new(
                    duration,
                    item.cycles_count,
                    item.multiplier,
                    shares,
                )?)
            })
            .collect()
    }

    /// The overlay, if one is configured.
    pub fn distribution(&self) -> Result<Option<PoolDistributionSchedule>> {
        if self.pool_distribution.is_empty() {
            return Ok(None);
        }
        let relative = self
            .pool_distribution
            .iter()
            .map(|step| -> Result<(u64, Vec<Decimal>)> {
                Ok((step.duration, self.by_pool(&step.factors, "pool_distribution")?))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(PoolDistributionSchedule::from_relative(
            self.start_time,
            relative,
            self.pools.len(),
        )?))
    }

    /// A router's weights keyed by service identity.
    pub fn router_weights(&self, router: &RouterConfig) -> Result<BTreeMap<AccountId, Decimal>> {
        router
            .weights
            .iter()
            .map(|(name, weight)| {
                self.services
                    .iter()
                    .find(|s| &s.name == name)
                    .map(|s| (s.id, *weight))
                    .ok_or_else(|| invalid(format!("unknown service '{name}'")))
            })
            .collect()
    }

    fn by_pool(&self, named: &BTreeMap<String, Decimal>, what: &str) -> Result<Vec<Decimal>> {
        let mut values = vec![Decimal::ZERO; self.pools.len()];
        for (name, value) in named {
            let index = self
                .pool_index(name)
                .ok_or_else(|| invalid(format!("{what} refer to unknown pool '{name}'")))?;
            if let Some(slot) = values.get_mut(index) {
                *slot = *value;
            }
        }
        Ok(values)
    }
}

fn unique<'a>(what: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(invalid(format!("duplicate {what} name '{name}'")));
        }
    }
    Ok(())
}
