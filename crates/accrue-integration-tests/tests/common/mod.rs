//! Shared deployment for the integration tests.
//!
//! Emission starts at t=0 with 100/s. The first item runs three 100s cycles
//! decaying by 0.9 and splits team 0.1 / staking 0.6 / liquidity 0.3. The
//! terminal item halves every 100s and splits staking 0.7 / liquidity 0.3.

#![allow(dead_code)]

use accrue_engine::{Engine, EngineConfig};
use accrue_types::{AccountId, AssetId, Decimal};

pub const OWNER: AccountId = AccountId::from_bytes([0x01; 32]);
pub const TEAM: AccountId = AccountId::from_bytes([0x02; 32]);
pub const ROUTER: AccountId = AccountId::from_bytes([0xCC; 32]);
pub const LP: AccountId = AccountId::from_bytes([0xD1; 32]);
pub const SINGLE: AccountId = AccountId::from_bytes([0xD2; 32]);
pub const LIQUIDITY: AccountId = AccountId::from_bytes([0xD3; 32]);
pub const ALICE: AccountId = AccountId::from_bytes([0xA1; 32]);
pub const BOB: AccountId = AccountId::from_bytes([0xB0; 32]);
pub const RELAYER: AccountId = AccountId::from_bytes([0x77; 32]);

pub fn deployment() -> EngineConfig {
    let toml = format!(
        r#"
owner = "{owner}"
start_time = 0
first_tick_supply = "100"

[[pools]]
name = "team"
owner = "{team}"

[[pools]]
name = "staking"

[[pools]]
name = "liquidity"

[[schedule]]
cycle_seconds = 100
cycles_count = 3
multiplier = "0.9"
shares = {{ team = "0.1", staking = "0.6", liquidity = "0.3" }}

[[schedule]]
cycle_seconds = 100
cycles_count = 0
multiplier = "0.5"
shares = {{ staking = "0.7", liquidity = "0.3" }}

[[router]]
name = "main"
id = "{router}"
pool = "staking"
weights = {{ lp = "0.5", single = "0.5" }}

[[service]]
name = "lp"
id = "{lp}"
staking_asset = "LP"
supplier = {{ router = "main" }}

[[service]]
name = "single"
id = "{single}"
staking_asset = "NMX"
supplier = {{ router = "main" }}

[[service]]
name = "liquidity"
id = "{liquidity}"
staking_asset = "LP"
supplier = {{ pool = "liquidity" }}
"#,
        owner = OWNER,
        team = TEAM,
        router = ROUTER,
        lp = LP,
        single = SINGLE,
        liquidity = LIQUIDITY,
    );
    EngineConfig::from_toml_str(&toml).expect("deployment")
}

pub fn engine() -> Engine {
    Engine::from_config(&deployment()).expect("engine")
}

pub fn lp_token() -> AssetId {
    AssetId::new("LP")
}

pub fn nmx() -> AssetId {
    AssetId::new("NMX")
}

pub fn int(n: u64) -> Decimal {
    Decimal::from_int(n)
}

pub fn d(s: &str) -> Decimal {
    s.parse().expect("decimal")
}

/// Give `account` some LP tokens.
pub fn fund(engine: &mut Engine, account: AccountId, amount: u64) {
    engine
        .deposit_external(OWNER, &lp_token(), account, int(amount))
        .expect("fund");
}
