//! Command dispatch.

use std::collections::BTreeMap;
use std::path::Path;

use accrue_crypto::ed25519::SigningKey;
use accrue_engine::{Engine, EngineConfig};
use accrue_staking::{Authorization, AuthorizationAction, Settlement, SignedAuthorization};
use accrue_types::{AccountId, AssetId, Decimal, PoolId, Timestamp};
use anyhow::{anyhow, bail};
use rusqlite::Connection;
use serde::Serialize;

use crate::keys::{read_key_file, write_key_file};
use crate::output::{format_json, render_settlement, StatusReport};
use crate::Commands;

/// Run one command. Mutating commands save the engine afterwards.
pub fn run(
    command: &Commands,
    conn: &mut Connection,
    deployment: &EngineConfig,
    now: Timestamp,
    json: bool,
) -> anyhow::Result<()> {
    if let Commands::Init = command {
        return init(conn, deployment, now);
    }
    if !accrue_db::is_initialized(conn)? {
        bail!("no saved state; run `accrue init` first");
    }
    let mut engine = accrue_db::load_engine(conn, deployment)?;
    if execute(&mut engine, command, now, json)? {
        accrue_db::save_engine(conn, &engine, now)?;
        tracing::debug!(now, "accrue: state saved");
    }
    Ok(())
}

fn init(conn: &mut Connection, deployment: &EngineConfig, now: Timestamp) -> anyhow::Result<()> {
    if accrue_db::is_initialized(conn)? {
        bail!("already initialized");
    }
    let engine = Engine::from_config(deployment)?;
    accrue_db::save_engine(conn, &engine, now)?;
    println!(
        "initialized: {} pools, {} routers, {} services",
        engine.pool_names().len(),
        engine.routers().count(),
        engine.services().count()
    );
    Ok(())
}

/// Write a fresh owner key to `out`. Needs no deployment or saved state.
pub fn keygen(out: &Path, json: bool) -> anyhow::Result<()> {
    let key = SigningKey::generate();
    write_key_file(out, &key)?;
    let report = KeyReport {
        account: key.account_id(),
        key_file: out.display().to_string(),
    };
    tracing::info!(account = %report.account, "accrue: key generated");
    print(json, &report, || format!("account {} (key in {})", report.account, report.key_file));
    Ok(())
}

/// Returns whether the engine changed.
fn execute(engine: &mut Engine, command: &Commands, now: Timestamp, json: bool) -> anyhow::Result<bool> {
    match command {
        Commands::Init => Ok(false),
        Commands::Status => {
            let report = StatusReport::collect(engine, now)?;
            print(json, &report, || report.render());
            Ok(false)
        }
        Commands::Balance { account, asset } => {
            let asset = asset.as_deref().map(AssetId::new);
            let rows: Vec<BalanceRow> = engine
                .balances()
                .entries()
                .filter(|(a, holder, _)| holder == account && asset.as_ref().map_or(true, |x| x == *a))
                .map(|(a, _, amount)| BalanceRow {
                    asset: a.clone(),
                    amount: amount.to_string(),
                })
                .collect();
            print(json, &rows, || {
                if rows.is_empty() {
                    return "no balances".to_string();
                }
                rows.iter()
                    .map(|r| format!("{:<10} {}", r.asset, r.amount))
                    .collect::<Vec<_>>()
                    .join("\n")
            });
            Ok(false)
        }
        Commands::Pending { service, account } => {
            let service = resolve_service(engine, service)?;
            let pending = engine.pending_reward(service, *account)?;
            print(json, &pending, || format!("{pending} {}", engine.reward_asset()));
            Ok(false)
        }
        Commands::Fund {
            caller,
            asset,
            to,
            amount,
        } => {
            engine.deposit_external(*caller, &AssetId::new(asset.as_str()), *to, *amount)?;
            println!("credited {amount} {asset} to {to}");
            Ok(true)
        }
        Commands::Stake {
            service,
            account,
            amount,
            beneficiary,
        } => {
            let id = resolve_service(engine, service)?;
            let settlement = match beneficiary {
                Some(beneficiary) => engine.stake_for(id, *account, *beneficiary, *amount, now)?,
                None => engine.stake(id, *account, *amount, now)?,
            };
            report_settlement(engine, id, &settlement, json);
            Ok(true)
        }
        Commands::Unstake {
            service,
            account,
            amount,
            to,
        } => {
            let id = resolve_service(engine, service)?;
            let settlement = match to {
                Some(to) => engine.unstake_to(id, *account, *to, *amount, now)?,
                None => engine.unstake(id, *account, *amount, now)?,
            };
            report_settlement(engine, id, &settlement, json);
            Ok(true)
        }
        Commands::Claim { service, account, to } => {
            let id = resolve_service(engine, service)?;
            let settlement = match to {
                Some(to) => engine.claim_reward_to(id, *account, *to, now)?,
                None => engine.claim_reward(id, *account, now)?,
            };
            report_settlement(engine, id, &settlement, json);
            Ok(true)
        }
        Commands::Update { service } => {
            let id = resolve_service(engine, service)?;
            let increment = engine.update_reward_rate(id, now)?;
            print(json, &increment, || format!("reward rate +{increment}"));
            Ok(true)
        }
        Commands::Supply { account } => {
            let amount = engine.pull_supply(*account, now)?;
            print(json, &amount, || format!("supplied {amount} {}", engine.reward_asset()));
            Ok(true)
        }
        Commands::SetOutputRate { caller, rate } => {
            engine.set_output_rate(*caller, *rate, now)?;
            println!("output rate set to {rate}");
            Ok(true)
        }
        Commands::SetWeights {
            router,
            caller,
            weights,
        } => {
            let router = resolve_router(engine, router)?;
            let weights = weights
                .iter()
                .map(|(name, weight)| -> anyhow::Result<(AccountId, Decimal)> {
                    Ok((resolve_service(engine, name)?, *weight))
                })
                .collect::<anyhow::Result<BTreeMap<_, _>>>()?;
            let count = weights.len();
            engine.change_router_weights(router, *caller, weights, now)?;
            println!("router {router} now has {count} participants");
            Ok(true)
        }
        Commands::TransferPool { caller, pool, to } => {
            let pool = resolve_pool(engine, pool)?;
            engine.transfer_pool_ownership(*caller, pool, *to)?;
            println!("pool {pool} now owned by {to}");
            Ok(true)
        }
        Commands::Suspend { service, caller } => {
            let id = resolve_service(engine, service)?;
            engine.suspend_service(id, *caller)?;
            println!("service {id} suspended");
            Ok(true)
        }
        Commands::Resume { service, caller } => {
            let id = resolve_service(engine, service)?;
            engine.resume_service(id, *caller)?;
            println!("service {id} resumed");
            Ok(true)
        }
        Commands::PauseClaims { service, caller } => {
            let id = resolve_service(engine, service)?;
            engine.set_claim_reward_paused(id, *caller, true)?;
            println!("service {id} claims paused");
            Ok(true)
        }
        Commands::UnpauseClaims { service, caller } => {
            let id = resolve_service(engine, service)?;
            engine.set_claim_reward_paused(id, *caller, false)?;
            println!("service {id} claims unpaused");
            Ok(true)
        }
        Commands::Recover {
            service,
            caller,
            asset,
            amount,
            to,
        } => {
            let id = resolve_service(engine, service)?;
            let settlement = engine.recover_funds(id, *caller, &AssetId::new(asset.as_str()), *amount, *to)?;
            report_settlement(engine, id, &settlement, json);
            Ok(true)
        }
        Commands::Keygen { out } => {
            keygen(out, json)?;
            Ok(false)
        }
        Commands::Authorize {
            key_file,
            service,
            action,
            spender,
            amount,
            deadline,
        } => {
            let id = resolve_service(engine, service)?;
            let key = read_key_file(key_file)?;
            let deadline = deadline.unwrap_or(now.saturating_add(3_600));
            let signed = authorize(engine, id, &key, *action, *spender, *amount, deadline)?;
            println!("{}", format_json(&signed));
            Ok(false)
        }
        Commands::Relay {
            service,
            caller,
            authorization,
            amount,
        } => {
            let id = resolve_service(engine, service)?;
            let text = std::fs::read_to_string(authorization)
                .map_err(|e| anyhow!("reading {}: {e}", authorization.display()))?;
            let signed: SignedAuthorization = serde_json::from_str(&text)?;
            let amount = amount.unwrap_or(signed.authorization.signed_amount);
            let settlement = match signed.authorization.action {
                AuthorizationAction::Stake => {
                    engine.stake_with_authorization(id, *caller, &signed, amount, now)?
                }
                AuthorizationAction::Unstake => {
                    engine.unstake_with_authorization(id, *caller, &signed, amount, now)?
                }
                AuthorizationAction::Claim => engine.claim_with_authorization(id, *caller, &signed, now)?,
            };
            report_settlement(engine, id, &settlement, json);
            Ok(true)
        }
    }
}

/// Sign an authorization for the service's next nonce of the key's account.
fn authorize(
    engine: &Engine,
    service: AccountId,
    key: &SigningKey,
    action: AuthorizationAction,
    spender: AccountId,
    amount: Decimal,
    deadline: Timestamp,
) -> anyhow::Result<SignedAuthorization> {
    let target = engine
        .service(service)
        .ok_or_else(|| anyhow!("unknown service {service}"))?;
    let owner = key.account_id();
    Ok(Authorization {
        domain: target.domain(),
        action,
        owner,
        spender,
        signed_amount: amount,
        nonce: target.next_nonce(owner),
        deadline,
    }
    .sign(key))
}

#[derive(Debug, Serialize)]
struct KeyReport {
    account: AccountId,
    key_file: String,
}

#[derive(Debug, Serialize)]
struct BalanceRow {
    asset: AssetId,
    amount: String,
}

fn print<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) {
    if json {
        println!("{}", format_json(value));
    } else {
        println!("{}", text());
    }
}

fn report_settlement(engine: &Engine, service: AccountId, settlement: &Settlement, json: bool) {
    let staking_asset = engine
        .service(service)
        .map(|s| s.staking_asset().clone())
        .unwrap_or_else(|| AssetId::new("?"));
    print(json, settlement, || {
        render_settlement(settlement, &staking_asset, engine.reward_asset())
    });
}

/// A service by name or by hex id.
fn resolve_service(engine: &Engine, arg: &str) -> anyhow::Result<AccountId> {
    if let Some(id) = engine.service_by_name(arg) {
        return Ok(id);
    }
    arg.parse::<AccountId>()
        .ok()
        .filter(|id| engine.service(*id).is_some())
        .ok_or_else(|| anyhow!("unknown service '{arg}'"))
}

/// A router by name or by hex id.
fn resolve_router(engine: &Engine, arg: &str) -> anyhow::Result<AccountId> {
    if let Some(id) = engine.router_by_name(arg) {
        return Ok(id);
    }
    arg.parse::<AccountId>()
        .ok()
        .filter(|id| engine.router(*id).is_some())
        .ok_or_else(|| anyhow!("unknown router '{arg}'"))
}

/// A pool by name or by index.
fn resolve_pool(engine: &Engine, arg: &str) -> anyhow::Result<PoolId> {
    if let Some(pool) = engine.pool_by_name(arg) {
        return Ok(pool);
    }
    arg.parse::<usize>()
        .ok()
        .filter(|index| *index < engine.pool_names().len())
        .map(PoolId)
        .ok_or_else(|| anyhow!("unknown pool '{arg}'"))
}
