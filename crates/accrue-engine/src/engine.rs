//! The engine and its operations.
//!
//! ## Token flow
//!
//! ```text
//! minter --mint--> pool owner (service or router)
//! router --transfer--> participant service      (its pending share)
//! staker --transfer--> service                  (stake)
//! service --transfer--> staker                  (unstake, claim)
//! ```
//!
//! Services and routers hold their tokens in the ledger under their own
//! identity, so the ledger always shows where every emitted unit sits.
//!
//! A router only pays a participant when that participant pulls, so every
//! weighted account must be a service supplied by that same router. Anything
//! else would let credited supply sit in the router forever.
//!
//! ## Rollback cost
//!
//! Operations take a full clone of the engine (every position and balance)
//! before running and put it back on error. That is O(state) per call, which
//! suits the one-operation-per-process CLI; a long-running host with large
//! ledgers would want a journal of touched entries instead.

use std::collections::BTreeMap;

use accrue_emission::{
    EmissionSchedule, Minter, MinterRecord, PoolAllocation,
};
use accrue_router::DistributionRouter;
use accrue_staking::{Movement, ServiceRecord, Settlement, SignedAuthorization, StakerPosition, StakingService};
use accrue_types::{AccessError, AccountId, AssetId, Decimal, PoolId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, SupplierConfig};
use crate::ledger::{Balances, Transfer};
use crate::supplier::Supplier;
use crate::{EngineError, Result};

/// Persisted state of one service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub record: ServiceRecord,
    pub positions: BTreeMap<AccountId, StakerPosition>,
}

/// Everything that changes after construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub minter: MinterRecord,
    pub routers: BTreeMap<AccountId, DistributionRouter>,
    pub services: BTreeMap<AccountId, ServiceSnapshot>,
    pub balances: Balances,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ServiceEntry {
    name: String,
    service: StakingService,
    supplier: Supplier,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Engine {
    reward_asset: AssetId,
    pool_names: Vec<String>,
    minter: Minter,
    routers: BTreeMap<AccountId, DistributionRouter>,
    router_names: BTreeMap<String, AccountId>,
    services: BTreeMap<AccountId, ServiceEntry>,
    balances: Balances,
}

impl Engine {
    /// Validate `config` and build a fresh engine.
    ///
    /// Pools with an external owner, routers and pool-supplied services are
    /// given ownership of their pools.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let owner = config.owner;
        let pool_count = config.pools.len();

        let schedule = EmissionSchedule::new(config.schedule_items()?, pool_count)?;
        let allocation = match config.distribution()? {
            Some(overlay) => PoolAllocation::Overlay(overlay),
            None => PoolAllocation::ItemShares,
        };
        let mut minter = Minter::new(
            owner,
            schedule,
            allocation,
            config.first_tick_supply,
            config.start_time,
        )?;
        if config.output_rate != Decimal::ONE {
            minter.set_output_rate(owner, config.output_rate, config.start_time)?;
        }

        let pool_id = |name: &str| {
            config
                .pool_index(name)
                .map(PoolId)
                .ok_or_else(|| EngineError::InvalidConfig(format!("unknown pool '{name}'")))
        };

        for (index, pool) in config.pools.iter().enumerate() {
            if let Some(pool_owner) = pool.owner {
                minter.transfer_pool_ownership(owner, PoolId(index), pool_owner)?;
            }
        }

        let mut routers = BTreeMap::new();
        let mut router_names = BTreeMap::new();
        for router in &config.routers {
            minter.transfer_pool_ownership(owner, pool_id(&router.pool)?, router.id)?;
            let weights = config.router_weights(router)?;
            routers.insert(
                router.id,
                DistributionRouter::new(router.id, router.owner.unwrap_or(owner), weights)?,
            );
            router_names.insert(router.name.clone(), router.id);
        }

        let mut services = BTreeMap::new();
        for service in &config.services {
            let supplier = match &service.supplier {
                SupplierConfig::Pool(pool) => {
                    minter.transfer_pool_ownership(owner, pool_id(pool)?, service.id)?;
                    Supplier::Pool
                }
                SupplierConfig::Router(name) => {
                    let router = router_names.get(name).copied().ok_or_else(|| {
                        EngineError::InvalidConfig(format!("unknown router '{name}'"))
                    })?;
                    Supplier::Router(router)
                }
            };
            let staking = StakingService::new(
                service.id,
                service.owner.unwrap_or(owner),
                service.staking_asset.clone(),
                config.reward_asset.clone(),
            );
            services.insert(
                service.id,
                ServiceEntry {
                    name: service.name.clone(),
                    service: staking,
                    supplier,
                },
            );
        }

        tracing::info!(
            pools = pool_count,
            routers = routers.len(),
            services = services.len(),
            start_time = config.start_time,
            "engine: built from configuration"
        );

        Ok(Self {
            reward_asset: config.reward_asset.clone(),
            pool_names: config.pools.iter().map(|p| p.name.clone()).collect(),
            minter,
            routers,
            router_names,
            services,
            balances: Balances::new(),
        })
    }

    // ---- views ----

    pub fn reward_asset(&self) -> &AssetId {
        &self.reward_asset
    }

    pub fn minter(&self) -> &Minter {
        &self.minter
    }

    pub fn balances(&self) -> &Balances {
        &self.balances
    }

    pub fn balance_of(&self, asset: &AssetId, account: AccountId) -> Decimal {
        self.balances.balance_of(asset, account)
    }

    pub fn router(&self, id: AccountId) -> Option<&DistributionRouter> {
        self.routers.get(&id)
    }

    pub fn routers(&self) -> impl Iterator<Item = (&str, &DistributionRouter)> {
        self.router_names
            .iter()
            .filter_map(|(name, id)| self.routers.get(id).map(|r| (name.as_str(), r)))
    }

    pub fn service(&self, id: AccountId) -> Option<&StakingService> {
        self.services.get(&id).map(|entry| &entry.service)
    }

    /// Services with their names and suppliers.
    pub fn services(&self) -> impl Iterator<Item = (&str, &StakingService, Supplier)> {
        self.services
            .values()
            .map(|entry| (entry.name.as_str(), &entry.service, entry.supplier))
    }

    pub fn supplier(&self, service: AccountId) -> Option<Supplier> {
        self.services.get(&service).map(|entry| entry.supplier)
    }

    pub fn service_by_name(&self, name: &str) -> Option<AccountId> {
        self.services
            .values()
            .find(|entry| entry.name == name)
            .map(|entry| entry.service.id())
    }

    pub fn router_by_name(&self, name: &str) -> Option<AccountId> {
        self.router_names.get(name).copied()
    }

    pub fn pool_by_name(&self, name: &str) -> Option<PoolId> {
        self.pool_names.iter().position(|p| p == name).map(PoolId)
    }

    pub fn pool_names(&self) -> &[String] {
        &self.pool_names
    }

    /// Reward `staker` could claim from `service` without pulling new supply.
    pub fn pending_reward(&self, service: AccountId, staker: AccountId) -> Result<Decimal> {
        Ok(self.service_ref(service)?.pending_reward(staker)?)
    }

    // ---- staking operations ----

    pub fn stake(&mut self, service: AccountId, caller: AccountId, amount: Decimal, now: Timestamp) -> Result<Settlement> {
        self.settle_service(service, now, |s, supplied| s.stake(caller, amount, supplied))
    }

    pub fn stake_for(
        &mut self,
        service: AccountId,
        payer: AccountId,
        beneficiary: AccountId,
        amount: Decimal,
        now: Timestamp,
    ) -> Result<Settlement> {
        self.settle_service(service, now, |s, supplied| {
            s.stake_for(payer, beneficiary, amount, supplied)
        })
    }

    pub fn unstake(&mut self, service: AccountId, caller: AccountId, amount: Decimal, now: Timestamp) -> Result<Settlement> {
        self.settle_service(service, now, |s, supplied| s.unstake(caller, amount, supplied))
    }

    pub fn unstake_to(
        &mut self,
        service: AccountId,
        caller: AccountId,
        recipient: AccountId,
        amount: Decimal,
        now: Timestamp,
    ) -> Result<Settlement> {
        self.settle_service(service, now, |s, supplied| {
            s.unstake_to(caller, recipient, amount, supplied)
        })
    }

    pub fn claim_reward(&mut self, service: AccountId, caller: AccountId, now: Timestamp) -> Result<Settlement> {
        self.settle_service(service, now, |s, supplied| s.claim_reward(caller, supplied))
    }

    pub fn claim_reward_to(
        &mut self,
        service: AccountId,
        caller: AccountId,
        recipient: AccountId,
        now: Timestamp,
    ) -> Result<Settlement> {
        self.settle_service(service, now, |s, supplied| {
            s.claim_reward_to(caller, recipient, supplied)
        })
    }

    pub fn stake_with_authorization(
        &mut self,
        service: AccountId,
        caller: AccountId,
        signed: &SignedAuthorization,
        amount: Decimal,
        now: Timestamp,
    ) -> Result<Settlement> {
        self.settle_service(service, now, |s, supplied| {
            s.stake_with_authorization(caller, signed, amount, now, supplied)
        })
    }

    pub fn unstake_with_authorization(
        &mut self,
        service: AccountId,
        caller: AccountId,
        signed: &SignedAuthorization,
        amount: Decimal,
        now: Timestamp,
    ) -> Result<Settlement> {
        self.settle_service(service, now, |s, supplied| {
            s.unstake_with_authorization(caller, signed, amount, now, supplied)
        })
    }

    pub fn claim_with_authorization(
        &mut self,
        service: AccountId,
        caller: AccountId,
        signed: &SignedAuthorization,
        now: Timestamp,
    ) -> Result<Settlement> {
        self.settle_service(service, now, |s, supplied| {
            s.claim_with_authorization(caller, signed, now, supplied)
        })
    }

    /// Pull the service's supply and fold it into its rate. Returns the
    /// rate increment.
    pub fn update_reward_rate(&mut self, service: AccountId, now: Timestamp) -> Result<Decimal> {
        self.atomically(|engine| {
            let supplied = engine.pull(service, now)?;
            Ok(engine.service_mut(service)?.update_reward_rate(supplied)?)
        })
    }

    // ---- emission operations ----

    /// Drain the caller's pool into the caller's balance.
    ///
    /// For external pool owners. Services and routers pull as part of their
    /// own operations and are refused here.
    pub fn pull_supply(&mut self, caller: AccountId, now: Timestamp) -> Result<Decimal> {
        if self.is_managed(caller) {
            return Err(EngineError::ManagedAccount(caller));
        }
        self.atomically(|engine| {
            let amount = engine.minter.supply(caller, now)?;
            engine.balances.mint(&engine.reward_asset, caller, amount)?;
            Ok(amount)
        })
    }

    pub fn set_output_rate(&mut self, caller: AccountId, rate: Decimal, now: Timestamp) -> Result<()> {
        self.atomically(|engine| Ok(engine.minter.set_output_rate(caller, rate, now)?))
    }

    /// Hand a pool to `new_owner`.
    ///
    /// A router-supplied service never drains a pool, so it cannot own one.
    pub fn transfer_pool_ownership(&mut self, caller: AccountId, pool: PoolId, new_owner: AccountId) -> Result<()> {
        if matches!(self.supplier(new_owner), Some(Supplier::Router(_))) {
            return Err(EngineError::ManagedAccount(new_owner));
        }
        self.atomically(|engine| Ok(engine.minter.transfer_pool_ownership(caller, pool, new_owner)?))
    }

    // ---- router operations ----

    /// Replace a router's weights, settling with the old ones first.
    ///
    /// Every participant must be a service supplied by this router.
    pub fn change_router_weights(
        &mut self,
        router: AccountId,
        caller: AccountId,
        weights: BTreeMap<AccountId, Decimal>,
        now: Timestamp,
    ) -> Result<()> {
        for participant in weights.keys() {
            if self.service_entry(*participant)?.supplier != Supplier::Router(router) {
                return Err(EngineError::NotParticipant {
                    router,
                    service: *participant,
                });
            }
        }
        self.atomically(|engine| {
            let Self {
                minter,
                routers,
                balances,
                reward_asset,
                ..
            } = engine;
            let target = routers
                .get_mut(&router)
                .ok_or(EngineError::UnknownRouter(router))?;
            target.change_weights(caller, weights, || -> Result<Decimal> {
                let amount = minter.supply(router, now)?;
                balances.mint(reward_asset, router, amount)?;
                Ok(amount)
            })
        })
    }

    // ---- service administration ----

    pub fn suspend_service(&mut self, service: AccountId, caller: AccountId) -> Result<()> {
        self.atomically(|engine| Ok(engine.service_mut(service)?.suspend(caller)?))
    }

    pub fn resume_service(&mut self, service: AccountId, caller: AccountId) -> Result<()> {
        self.atomically(|engine| Ok(engine.service_mut(service)?.resume(caller)?))
    }

    pub fn set_claim_reward_paused(
        &mut self,
        service: AccountId,
        caller: AccountId,
        paused: bool,
    ) -> Result<()> {
        self.atomically(|engine| {
            Ok(engine
                .service_mut(service)?
                .set_claim_reward_paused(caller, paused)?)
        })
    }

    /// Send tokens a service account holds but owes nobody to `to`. Service
    /// owner only. No supply is pulled.
    pub fn recover_funds(
        &mut self,
        service: AccountId,
        caller: AccountId,
        asset: &AssetId,
        amount: Decimal,
        to: AccountId,
    ) -> Result<Settlement> {
        self.atomically(|engine| {
            let held = engine.balances.balance_of(asset, service);
            let settlement = engine
                .service_ref(service)?
                .recover_funds(caller, asset, amount, to, held)?;
            engine.execute(service, &settlement)?;
            Ok(settlement)
        })
    }

    /// Credit tokens that entered from outside the engine (e.g. a bridged
    /// deposit of a staking asset). Minter owner only; the reward asset can
    /// only be created by emission.
    pub fn deposit_external(
        &mut self,
        caller: AccountId,
        asset: &AssetId,
        to: AccountId,
        amount: Decimal,
    ) -> Result<()> {
        self.minter.governance().require_owner(caller)?;
        if asset == &self.reward_asset {
            return Err(AccessError::NotOwner { caller }.into());
        }
        self.balances.mint(asset, to, amount)?;
        tracing::info!(%asset, %to, amount = %amount, "engine: external deposit");
        Ok(())
    }

    // ---- persistence ----

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            minter: self.minter.snapshot(),
            routers: self.routers.clone(),
            services: self
                .services
                .iter()
                .map(|(id, entry)| {
                    let snapshot = ServiceSnapshot {
                        record: entry.service.snapshot(),
                        positions: entry
                            .service
                            .positions()
                            .map(|(staker, position)| (*staker, position.clone()))
                            .collect(),
                    };
                    (*id, snapshot)
                })
                .collect(),
            balances: self.balances.clone(),
        }
    }

    /// Overlay persisted state on a freshly configured engine.
    ///
    /// Every router and service in the snapshot must exist in the
    /// configuration, and every saved router weight must still name a service
    /// that router supplies. Nothing changes if any part is rejected.
    pub fn restore(&mut self, snapshot: EngineSnapshot) -> Result<()> {
        self.atomically(|engine| {
            engine.minter.restore(snapshot.minter)?;
            for (id, router) in snapshot.routers {
                let slot = engine
                    .routers
                    .get_mut(&id)
                    .ok_or(EngineError::UnknownRouter(id))?;
                if router.id() != id {
                    return Err(EngineError::UnknownRouter(router.id()));
                }
                *slot = router;
            }
            for (id, router) in &engine.routers {
                for participant in router.weights().keys() {
                    if engine.service_entry(*participant)?.supplier != Supplier::Router(*id) {
                        return Err(EngineError::NotParticipant {
                            router: *id,
                            service: *participant,
                        });
                    }
                }
            }
            for (id, service) in snapshot.services {
                engine
                    .service_mut(id)?
                    .restore(service.record, service.positions);
            }
            engine.balances = snapshot.balances;
            Ok(())
        })
    }

    // ---- internals ----

    /// Run `op`; on error, put everything back the way it was.
    fn atomically<T, F>(&mut self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let checkpoint = self.clone();
        let result = op(self);
        if let Err(err) = &result {
            tracing::warn!(error = %err, "engine: operation rolled back");
            *self = checkpoint;
        }
        result
    }

    /// Pull once, run the service operation, execute its settlement.
    fn settle_service<F>(&mut self, service: AccountId, now: Timestamp, op: F) -> Result<Settlement>
    where
        F: FnOnce(&mut StakingService, Decimal) -> accrue_staking::Result<Settlement>,
    {
        self.atomically(|engine| {
            let supplied = engine.pull(service, now)?;
            let settlement = op(engine.service_mut(service)?, supplied)?;
            engine.execute(service, &settlement)?;
            tracing::debug!(
                %service,
                now,
                supplied = %supplied,
                movements = settlement.movements.len(),
                "engine: service operation settled"
            );
            Ok(settlement)
        })
    }

    /// Pull the service's upstream supply into its account.
    fn pull(&mut self, service: AccountId, now: Timestamp) -> Result<Decimal> {
        let supplier = self.service_entry(service)?.supplier;
        let Self {
            minter,
            routers,
            balances,
            reward_asset,
            ..
        } = self;
        match supplier {
            Supplier::Pool => {
                let amount = minter.supply(service, now)?;
                balances.mint(reward_asset, service, amount)?;
                Ok(amount)
            }
            Supplier::Router(router) => {
                let distributor = routers
                    .get_mut(&router)
                    .ok_or(EngineError::UnknownRouter(router))?;
                let paid = distributor.mint(service, || -> Result<Decimal> {
                    let amount = minter.supply(router, now)?;
                    balances.mint(reward_asset, router, amount)?;
                    Ok(amount)
                })?;
                if !balances.transfer_from(reward_asset, router, service, paid) {
                    return Err(EngineError::TransferFailed {
                        asset: reward_asset.clone(),
                        from: router,
                        to: service,
                        amount: paid,
                    });
                }
                Ok(paid)
            }
        }
    }

    fn execute(&mut self, service: AccountId, settlement: &Settlement) -> Result<()> {
        let staking_asset = self.service_ref(service)?.staking_asset().clone();
        let reward_asset = self.reward_asset.clone();
        for movement in &settlement.movements {
            let (asset, from, to, amount) = match movement {
                Movement::Deposit { from, amount } => (&staking_asset, *from, service, *amount),
                Movement::Withdraw { to, amount } => (&staking_asset, service, *to, *amount),
                Movement::Reward { to, amount } => (&reward_asset, service, *to, *amount),
                Movement::Recover { asset, to, amount } => (asset, service, *to, *amount),
            };
            if !self.balances.transfer_from(asset, from, to, amount) {
                return Err(EngineError::TransferFailed {
                    asset: asset.clone(),
                    from,
                    to,
                    amount,
                });
            }
        }
        Ok(())
    }

    fn is_managed(&self, account: AccountId) -> bool {
        self.services.contains_key(&account) || self.routers.contains_key(&account)
    }

    fn service_entry(&self, id: AccountId) -> Result<&ServiceEntry> {
        self.services.get(&id).ok_or(EngineError::UnknownService(id))
    }

    fn service_ref(&self, id: AccountId) -> Result<&StakingService> {
        Ok(&self.service_entry(id)?.service)
    }

    fn service_mut(&mut self, id: AccountId) -> Result<&mut StakingService> {
        self.services
            .get_mut(&id)
            .map(|entry| &mut entry.service)
            .ok_or(EngineError::UnknownService(id))
    }
}
