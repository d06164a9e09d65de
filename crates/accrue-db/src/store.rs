//! Saving and loading a whole engine.
//!
//! The configuration is the source of structure (which pools, routers and
//! services exist); the store only holds what changed since construction.
//! Loading rebuilds the engine from configuration and overlays the records.

use std::collections::BTreeMap;

use accrue_emission::MinterRecord;
use accrue_engine::{Balances, Engine, EngineConfig, EngineSnapshot, ServiceSnapshot};
use accrue_router::DistributionRouter;
use accrue_staking::{ServiceRecord, StakerPosition};
use accrue_types::{AccountId, AssetId, Decimal};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::records::{self, Kind};
use crate::{DbError, Result};

const MINTER_KEY: &str = "minter";
const SAVED_AT_KEY: &str = "saved_at";

#[derive(Debug, Serialize, Deserialize)]
struct PositionRow {
    service: AccountId,
    staker: AccountId,
    position: StakerPosition,
}

#[derive(Debug, Serialize, Deserialize)]
struct BalanceRow {
    asset: AssetId,
    account: AccountId,
    amount: Decimal,
}

/// Whether an engine has been saved to this database.
pub fn is_initialized(conn: &Connection) -> Result<bool> {
    Ok(records::find::<MinterRecord>(conn, Kind::Minter, MINTER_KEY)?.is_some())
}

/// Write the engine's whole mutable state in one transaction.
///
/// Per-account rows are rewritten from scratch, so positions and balances
/// that dropped to nothing do not linger.
pub fn save_engine(conn: &mut Connection, engine: &Engine, now: u64) -> Result<()> {
    let snapshot = engine.snapshot();
    let tx = conn.transaction()?;

    records::put(&tx, Kind::Minter, MINTER_KEY, &snapshot.minter, now)?;

    records::clear(&tx, Kind::Router)?;
    for (id, router) in &snapshot.routers {
        records::put(&tx, Kind::Router, &id.to_string(), router, now)?;
    }

    records::clear(&tx, Kind::Service)?;
    records::clear(&tx, Kind::Position)?;
    let mut positions = 0usize;
    for (service, state) in &snapshot.services {
        records::put(&tx, Kind::Service, &service.to_string(), &state.record, now)?;
        for (staker, position) in &state.positions {
            let row = PositionRow {
                service: *service,
                staker: *staker,
                position: position.clone(),
            };
            records::put(&tx, Kind::Position, &format!("{service}/{staker}"), &row, now)?;
            positions += 1;
        }
    }

    records::clear(&tx, Kind::Balance)?;
    let mut balances = 0usize;
    for (asset, account, amount) in snapshot.balances.entries() {
        let row = BalanceRow {
            asset: asset.clone(),
            account,
            amount,
        };
        records::put(&tx, Kind::Balance, &format!("{asset}/{account}"), &row, now)?;
        balances += 1;
    }

    records::put(&tx, Kind::Meta, SAVED_AT_KEY, &now, now)?;
    tx.commit()?;

    tracing::debug!(
        routers = snapshot.routers.len(),
        services = snapshot.services.len(),
        positions,
        balances,
        now,
        "db: engine saved"
    );
    Ok(())
}

/// Build the engine from `config` and overlay the stored state.
///
/// An empty database yields a fresh engine.
///
/// # Errors
///
/// - [`DbError::Engine`] if the configuration is invalid or the stored state
///   names a router or service the configuration does not have
/// - [`DbError::Serialization`] if a record does not decode
pub fn load_engine(conn: &Connection, config: &EngineConfig) -> Result<Engine> {
    let mut engine = Engine::from_config(config)?;
    let Some(minter) = records::find::<MinterRecord>(conn, Kind::Minter, MINTER_KEY)? else {
        tracing::info!("db: no saved state, starting fresh");
        return Ok(engine);
    };

    let routers = records::list::<DistributionRouter>(conn, Kind::Router)?
        .into_iter()
        .map(|(_, router)| (router.id(), router))
        .collect();

    let mut services = BTreeMap::new();
    for (key, record) in records::list::<ServiceRecord>(conn, Kind::Service)? {
        let id: AccountId = key
            .parse()
            .map_err(|e| DbError::Serialization(format!("service key '{key}': {e}")))?;
        services.insert(
            id,
            ServiceSnapshot {
                record,
                positions: BTreeMap::new(),
            },
        );
    }
    for (key, row) in records::list::<PositionRow>(conn, Kind::Position)? {
        let service = services
            .get_mut(&row.service)
            .ok_or_else(|| DbError::NotFound(format!("service for position '{key}'")))?;
        service.positions.insert(row.staker, row.position);
    }

    let mut balances = Balances::new();
    for (_, row) in records::list::<BalanceRow>(conn, Kind::Balance)? {
        balances.set(&row.asset, row.account, row.amount);
    }

    engine.restore(EngineSnapshot {
        minter,
        routers,
        services,
        balances,
    })?;
    let saved_at: Option<u64> = records::find(conn, Kind::Meta, SAVED_AT_KEY)?;
    tracing::info!(saved_at = ?saved_at, "db: engine loaded");
    Ok(engine)
}
