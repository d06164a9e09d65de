//! Output formatting for the accrue CLI.
//! Supports plain text and JSON output modes.

use std::fmt::Write as _;

use accrue_engine::{Engine, Supplier};
use accrue_staking::{Movement, Settlement};
use accrue_types::{AccountId, AssetId, Decimal, PoolId, Timestamp};
use serde::Serialize;

/// Format a serializable value as a pretty-printed JSON string.
pub fn format_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|e| format!("JSON serialization error: {e}"))
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub now: Timestamp,
    pub minter: MinterReport,
    pub pools: Vec<PoolReport>,
    pub routers: Vec<RouterReport>,
    pub services: Vec<ServiceReport>,
}

#[derive(Debug, Serialize)]
pub struct MinterReport {
    pub owner: AccountId,
    pub output_rate: Decimal,
    pub time: Timestamp,
    pub item_index: u32,
    pub cycle_index: u32,
    pub next_tick_supply: Decimal,
    pub exhausted: bool,
    pub unallocated: Decimal,
}

#[derive(Debug, Serialize)]
pub struct PoolReport {
    pub name: String,
    pub owner: Option<AccountId>,
    pub pending: Decimal,
    /// Emission per second currently flowing to the pool.
    pub rate: Decimal,
}

#[derive(Debug, Serialize)]
pub struct RouterReport {
    pub name: String,
    pub id: AccountId,
    pub owner: AccountId,
    pub weights: Vec<(AccountId, Decimal)>,
    pub unallocated: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ServiceReport {
    pub name: String,
    pub id: AccountId,
    pub staking_asset: AssetId,
    pub supplier: Supplier,
    pub suspended: bool,
    pub claims_paused: bool,
    pub total_staked: Decimal,
    pub reward_rate: Decimal,
    pub undistributed: Decimal,
}

impl StatusReport {
    pub fn collect(engine: &Engine, now: Timestamp) -> anyhow::Result<Self> {
        let minter = engine.minter();
        let state = minter.state();
        let pools = engine
            .pool_names()
            .iter()
            .enumerate()
            .map(|(index, name)| -> anyhow::Result<PoolReport> {
                let pool = PoolId(index);
                Ok(PoolReport {
                    name: name.clone(),
                    owner: minter.pool_owner(pool),
                    pending: minter.pending(pool),
                    rate: minter.reward_rate(pool)?,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        let routers = engine
            .routers()
            .map(|(name, router)| RouterReport {
                name: name.to_string(),
                id: router.id(),
                owner: router.governance().owner(),
                weights: router.weights().iter().map(|(a, w)| (*a, *w)).collect(),
                unallocated: router.unallocated(),
            })
            .collect();
        let services = engine
            .services()
            .map(|(name, service, supplier)| ServiceReport {
                name: name.to_string(),
                id: service.id(),
                staking_asset: service.staking_asset().clone(),
                supplier,
                suspended: service.governance().is_suspended(),
                claims_paused: service.is_claim_reward_paused(),
                total_staked: service.total_staked(),
                reward_rate: service.reward_state().historical_reward_rate,
                undistributed: service.reward_state().undistributed,
            })
            .collect();

        Ok(Self {
            now,
            minter: MinterReport {
                owner: minter.owner(),
                output_rate: minter.output_rate(),
                time: state.time,
                item_index: state.item_index,
                cycle_index: state.cycle_index,
                next_tick_supply: state.next_tick_supply,
                exhausted: minter.schedule().is_exhausted(state),
                unallocated: minter.unallocated(),
            },
            pools,
            routers,
            services,
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let m = &self.minter;
        let _ = writeln!(out, "Minter (as of {}, settled to {})", self.now, m.time);
        let _ = writeln!(out, "  owner:            {}", m.owner);
        let _ = writeln!(out, "  output rate:      {}", m.output_rate);
        let _ = writeln!(out, "  item / cycle:     {} / {}", m.item_index, m.cycle_index);
        let _ = writeln!(out, "  next tick supply: {}", m.next_tick_supply);
        if m.exhausted {
            let _ = writeln!(out, "  schedule exhausted");
        }

        let _ = writeln!(out, "\nPools");
        for pool in &self.pools {
            let owner = pool.owner.map_or_else(|| "-".to_string(), |o| o.to_string());
            let _ = writeln!(
                out,
                "  {:<12} rate {:<24} pending {:<24} owner {}",
                pool.name, pool.rate, pool.pending, owner
            );
        }

        let _ = writeln!(out, "\nRouters");
        for router in &self.routers {
            let _ = writeln!(out, "  {} ({})", router.name, router.id);
            for (account, weight) in &router.weights {
                let _ = writeln!(out, "    {account} weight {weight}");
            }
        }

        let _ = writeln!(out, "\nServices");
        for s in &self.services {
            let supplier = match s.supplier {
                Supplier::Pool => "pool".to_string(),
                Supplier::Router(router) => format!("router {router}"),
            };
            let _ = writeln!(
                out,
                "  {:<12} {} staked {} rate {} ({}){}{}",
                s.name,
                s.staking_asset,
                s.total_staked,
                s.reward_rate,
                supplier,
                if s.suspended { " SUSPENDED" } else { "" },
                if s.claims_paused { " CLAIMS PAUSED" } else { "" }
            );
        }
        out
    }
}

/// Describe a settlement as one line per movement.
pub fn render_settlement(settlement: &Settlement, staking_asset: &AssetId, reward_asset: &AssetId) -> String {
    if settlement.is_empty() {
        return "no transfers".to_string();
    }
    let mut out = String::new();
    for movement in &settlement.movements {
        let _ = match movement {
            Movement::Deposit { from, amount } => {
                writeln!(out, "deposited {amount} {staking_asset} from {from}")
            }
            Movement::Withdraw { to, amount } => {
                writeln!(out, "withdrew {amount} {staking_asset} to {to}")
            }
            Movement::Reward { to, amount } => {
                writeln!(out, "paid {amount} {reward_asset} to {to}")
            }
            Movement::Recover { asset, to, amount } => {
                writeln!(out, "recovered {amount} {asset} to {to}")
            }
        };
    }
    out.trim_end().to_string()
}
