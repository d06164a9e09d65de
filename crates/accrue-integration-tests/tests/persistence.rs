//! Integration test: engine state across save and load.
//!
//! Exercises the store the way the CLI uses it:
//! 1. An engine saved and reloaded between every operation ends up equal
//!    to one that ran without interruption
//! 2. A file-backed database survives reopening
//! 3. A deployment that dropped a service refuses the saved state

mod common;

use accrue_db::{load_engine, save_engine, DbError};
use accrue_engine::{Engine, EngineConfig};
use accrue_types::Timestamp;
use common::*;

/// Operation times of the scripted scenario.
const TIMES: [Timestamp; 7] = [0, 40, 130, 170, 260, 333, 420];

fn step(index: usize, e: &mut Engine, now: Timestamp) {
    match index {
        0 => {
            fund(e, ALICE, 500);
            fund(e, BOB, 500);
            e.stake(LP, ALICE, int(200), now).expect("stake");
        }
        1 => {
            e.stake(LIQUIDITY, BOB, int(100), now).expect("stake");
        }
        2 => {
            e.claim_reward(LP, ALICE, now).expect("claim");
        }
        3 => {
            e.stake(SINGLE, ALICE, int(1000), now).expect("stake");
        }
        4 => {
            e.unstake_to(LIQUIDITY, BOB, ALICE, int(40), now).expect("unstake");
            e.pull_supply(TEAM, now).expect("team");
        }
        5 => {
            e.set_output_rate(OWNER, d("0.8"), now).expect("rate");
        }
        _ => {
            e.claim_reward_to(SINGLE, ALICE, BOB, now).expect("claim");
            e.suspend_service(LP, OWNER).expect("suspend");
        }
    }
}

#[test]
fn reload_between_operations_matches_uninterrupted_run() {
    let config = deployment();

    let mut continuous = engine();
    for (index, now) in TIMES.into_iter().enumerate() {
        step(index, &mut continuous, now);
    }

    let mut conn = accrue_db::open_memory().expect("open");
    save_engine(&mut conn, &engine(), 0).expect("initial save");
    for (index, now) in TIMES.into_iter().enumerate() {
        let mut reloaded = load_engine(&conn, &config).expect("load");
        step(index, &mut reloaded, now);
        save_engine(&mut conn, &reloaded, now).expect("save");
    }

    let last = load_engine(&conn, &config).expect("final load");
    assert_eq!(last, continuous);
    assert!(last.service(LP).expect("lp").governance().is_suspended());
    assert!(last.balance_of(&nmx(), BOB) > int(0));
}

#[test]
fn file_database_survives_reopen() {
    let dir = std::env::temp_dir().join(format!("accrue-it-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("mkdir");
    let path = dir.join(accrue_db::DB_FILE);
    let config = deployment();

    {
        let mut conn = accrue_db::open(&path).expect("open");
        let mut engine = engine();
        fund(&mut engine, ALICE, 100);
        engine.stake(LIQUIDITY, ALICE, int(100), 0).expect("stake");
        save_engine(&mut conn, &engine, 0).expect("save");
    }

    let conn = accrue_db::open(&path).expect("reopen");
    assert!(accrue_db::is_initialized(&conn).expect("initialized"));
    let mut engine = load_engine(&conn, &config).expect("load");
    let claim = engine.claim_reward(LIQUIDITY, ALICE, 10).expect("claim");
    assert_eq!(claim.reward_paid(), int(300));

    drop(conn);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn saved_state_for_removed_service_is_rejected() {
    let mut conn = accrue_db::open_memory().expect("open");
    let mut engine = engine();
    fund(&mut engine, ALICE, 100);
    engine.stake(LIQUIDITY, ALICE, int(10), 0).expect("stake");
    save_engine(&mut conn, &engine, 0).expect("save");

    let mut shrunk: EngineConfig = deployment();
    shrunk.services.retain(|s| s.name != "liquidity");
    // The liquidity pool needs another owner for the deployment to stay valid.
    if let Some(pool) = shrunk.pools.iter_mut().find(|p| p.name == "liquidity") {
        pool.owner = Some(BOB);
    }
    shrunk.validate().expect("still valid");

    assert!(matches!(
        load_engine(&conn, &shrunk),
        Err(DbError::Engine(_))
    ));
}
