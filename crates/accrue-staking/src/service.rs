//! Staking service.
//!
//! Every mutating operation follows the same order:
//!
//! 1. fold the supply the caller pulled from upstream into the rate
//! 2. move what the acting staker is owed into their `accrued` balance and
//!    checkpoint them at the new rate
//! 3. change the position amount and the total
//!
//! Steps 1 and 2 read the amounts before step 3 changes them. Each operation
//! works on copies and commits at the end, so an error leaves the service as
//! it was.
//!
//! The owner can pause reward claims without touching stakes, and can send
//! back tokens the service holds but owes nobody: foreign assets, and staking
//! asset above `total_staked`. The reward asset is never recoverable, since
//! unclaimed rewards sit in the same account.
//!
//! The service never moves tokens. It returns a [`Settlement`] listing the
//! transfers the caller must execute, and the caller must discard the service
//! change if any of them fails.

use std::collections::BTreeMap;

use accrue_types::{AccountId, AssetId, Decimal, Governance, Timestamp};
use serde::{Deserialize, Serialize};

use crate::accumulator::RewardState;
use crate::authorization::{service_domain, AuthorizationAction, SignedAuthorization};
use crate::position::StakerPosition;
use crate::{Result, StakingError};

/// One token transfer a settlement requires.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Movement {
    /// Staking asset from `from` into the service account.
    Deposit { from: AccountId, amount: Decimal },
    /// Staking asset from the service account to `to`.
    Withdraw { to: AccountId, amount: Decimal },
    /// Reward asset from the service account to `to`.
    Reward { to: AccountId, amount: Decimal },
    /// Any non-reward asset from the service account to `to`.
    Recover {
        asset: AssetId,
        to: AccountId,
        amount: Decimal,
    },
}

/// Transfers produced by one operation. Zero amounts are left out.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub movements: Vec<Movement>,
}

impl Settlement {
    fn single(movement: Movement) -> Self {
        let amount = match &movement {
            Movement::Deposit { amount, .. }
            | Movement::Withdraw { amount, .. }
            | Movement::Reward { amount, .. }
            | Movement::Recover { amount, .. } => *amount,
        };
        if amount.is_zero() {
            Self::default()
        } else {
            Self {
                movements: vec![movement],
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.movements.is_empty()
    }

    /// Total reward paid out.
    pub fn reward_paid(&self) -> Decimal {
        self.movements
            .iter()
            .filter_map(|m| match m {
                Movement::Reward { amount, .. } => Some(*amount),
                _ => None,
            })
            .fold(Decimal::ZERO, Decimal::saturating_add)
    }
}

/// Persisted service state, positions excluded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub governance: Governance,
    pub state: RewardState,
    #[serde(default)]
    pub nonces: BTreeMap<AccountId, u64>,
    #[serde(default)]
    pub claim_reward_paused: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StakingService {
    id: AccountId,
    staking_asset: AssetId,
    reward_asset: AssetId,
    domain: [u8; 32],
    governance: Governance,
    state: RewardState,
    positions: BTreeMap<AccountId, StakerPosition>,
    nonces: BTreeMap<AccountId, u64>,
    claim_reward_paused: bool,
}

impl StakingService {
    /// A service identified (and holding custody) as `id`.
    pub fn new(id: AccountId, owner: AccountId, staking_asset: AssetId, reward_asset: AssetId) -> Self {
        Self {
            id,
            staking_asset,
            reward_asset,
            domain: service_domain(id),
            governance: Governance::new(owner),
            state: RewardState::new(),
            positions: BTreeMap::new(),
            nonces: BTreeMap::new(),
            claim_reward_paused: false,
        }
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn staking_asset(&self) -> &AssetId {
        &self.staking_asset
    }

    pub fn reward_asset(&self) -> &AssetId {
        &self.reward_asset
    }

    /// Domain that authorizations for this service must carry.
    pub fn domain(&self) -> [u8; 32] {
        self.domain
    }

    pub fn governance(&self) -> &Governance {
        &self.governance
    }

    pub fn is_claim_reward_paused(&self) -> bool {
        self.claim_reward_paused
    }

    pub fn reward_state(&self) -> &RewardState {
        &self.state
    }

    pub fn total_staked(&self) -> Decimal {
        self.state.total_staked
    }

    pub fn position(&self, staker: AccountId) -> Option<&StakerPosition> {
        self.positions.get(&staker)
    }

    pub fn positions(&self) -> impl Iterator<Item = (&AccountId, &StakerPosition)> {
        self.positions.iter()
    }

    /// Nonce the next authorization from `owner` must carry.
    pub fn next_nonce(&self, owner: AccountId) -> u64 {
        self.nonces.get(&owner).copied().unwrap_or(0)
    }

    /// Reward `staker` could claim at the current rate.
    ///
    /// Supply not yet pulled from upstream is not included.
    pub fn pending_reward(&self, staker: AccountId) -> Result<Decimal> {
        match self.positions.get(&staker) {
            Some(position) => position.pending_reward(self.state.historical_reward_rate),
            None => Ok(Decimal::ZERO),
        }
    }

    /// Fold `supplied` into the rate without touching any position.
    pub fn update_reward_rate(&mut self, supplied: Decimal) -> Result<Decimal> {
        self.state.fold(supplied)
    }

    /// Stake `amount` of the caller's tokens for the caller.
    pub fn stake(&mut self, caller: AccountId, amount: Decimal, supplied: Decimal) -> Result<Settlement> {
        self.stake_for(caller, caller, amount, supplied)
    }

    /// Stake `amount` of `payer`'s tokens into `beneficiary`'s position.
    ///
    /// # Errors
    ///
    /// - [`AccessError::Suspended`](accrue_types::AccessError::Suspended) while suspended
    /// - [`StakingError::ZeroAccount`] for a zero payer or beneficiary
    /// - [`StakingError::Overflow`] on arithmetic overflow
    pub fn stake_for(
        &mut self,
        payer: AccountId,
        beneficiary: AccountId,
        amount: Decimal,
        supplied: Decimal,
    ) -> Result<Settlement> {
        self.governance.require_not_suspended()?;
        if payer.is_zero() || beneficiary.is_zero() {
            return Err(StakingError::ZeroAccount);
        }

        let (mut state, mut position) = self.settled(beneficiary, supplied)?;
        position.amount = position
            .amount
            .checked_add(amount)
            .ok_or(StakingError::Overflow)?;
        state.total_staked = state
            .total_staked
            .checked_add(amount)
            .ok_or(StakingError::Overflow)?;
        self.commit(beneficiary, state, position);

        tracing::debug!(
            service = %self.id,
            %payer,
            %beneficiary,
            amount = %amount,
            total_staked = %self.state.total_staked,
            "staking: staked"
        );
        Ok(Settlement::single(Movement::Deposit { from: payer, amount }))
    }

    pub fn unstake(&mut self, caller: AccountId, amount: Decimal, supplied: Decimal) -> Result<Settlement> {
        self.unstake_to(caller, caller, amount, supplied)
    }

    /// Withdraw `amount` from the caller's position to `recipient`.
    ///
    /// Allowed while suspended. Earned reward stays in `accrued`.
    ///
    /// # Errors
    ///
    /// - [`StakingError::NotEnoughStaked`] if `amount` exceeds the position
    /// - [`StakingError::ZeroAccount`] for a zero recipient
    pub fn unstake_to(
        &mut self,
        caller: AccountId,
        recipient: AccountId,
        amount: Decimal,
        supplied: Decimal,
    ) -> Result<Settlement> {
        if recipient.is_zero() {
            return Err(StakingError::ZeroAccount);
        }
        let staked = self.positions.get(&caller).map_or(Decimal::ZERO, |p| p.amount);
        if amount > staked {
            return Err(StakingError::NotEnoughStaked {
                requested: amount,
                staked,
            });
        }

        let (mut state, mut position) = self.settled(caller, supplied)?;
        position.amount = position
            .amount
            .checked_sub(amount)
            .ok_or(StakingError::Overflow)?;
        state.total_staked = state
            .total_staked
            .checked_sub(amount)
            .ok_or(StakingError::Overflow)?;
        self.commit(caller, state, position);

        tracing::debug!(
            service = %self.id,
            %caller,
            %recipient,
            amount = %amount,
            total_staked = %self.state.total_staked,
            "staking: unstaked"
        );
        Ok(Settlement::single(Movement::Withdraw {
            to: recipient,
            amount,
        }))
    }

    pub fn claim_reward(&mut self, caller: AccountId, supplied: Decimal) -> Result<Settlement> {
        self.claim_reward_to(caller, caller, supplied)
    }

    /// Pay the caller's whole accrued reward to `recipient`. Allowed while suspended.
    pub fn claim_reward_to(
        &mut self,
        caller: AccountId,
        recipient: AccountId,
        supplied: Decimal,
    ) -> Result<Settlement> {
        self.claim(caller, recipient, supplied, None)
    }

    /// Stake on the owner's behalf under a signed authorization.
    ///
    /// The owner pays and receives the position. The nonce is consumed only
    /// if the stake succeeds.
    pub fn stake_with_authorization(
        &mut self,
        caller: AccountId,
        signed: &SignedAuthorization,
        amount: Decimal,
        now: Timestamp,
        supplied: Decimal,
    ) -> Result<Settlement> {
        self.authorize(caller, signed, AuthorizationAction::Stake, amount, now)?;
        let owner = signed.authorization.owner;
        let settlement = self.stake_for(owner, owner, amount, supplied)?;
        self.consume_nonce(owner);
        Ok(settlement)
    }

    /// Unstake on the owner's behalf. Tokens go back to the owner.
    pub fn unstake_with_authorization(
        &mut self,
        caller: AccountId,
        signed: &SignedAuthorization,
        amount: Decimal,
        now: Timestamp,
        supplied: Decimal,
    ) -> Result<Settlement> {
        self.authorize(caller, signed, AuthorizationAction::Unstake, amount, now)?;
        let owner = signed.authorization.owner;
        let settlement = self.unstake_to(owner, owner, amount, supplied)?;
        self.consume_nonce(owner);
        Ok(settlement)
    }

    /// Claim on the owner's behalf, paying the owner at most the signed amount.
    ///
    /// Accrued reward above the signed amount stays accrued.
    pub fn claim_with_authorization(
        &mut self,
        caller: AccountId,
        signed: &SignedAuthorization,
        now: Timestamp,
        supplied: Decimal,
    ) -> Result<Settlement> {
        self.authorize(caller, signed, AuthorizationAction::Claim, Decimal::ZERO, now)?;
        let owner = signed.authorization.owner;
        let cap = signed.authorization.signed_amount;
        let settlement = self.claim(owner, owner, supplied, Some(cap))?;
        self.consume_nonce(owner);
        Ok(settlement)
    }

    pub fn suspend(&mut self, caller: AccountId) -> Result<()> {
        Ok(self.governance.suspend(caller)?)
    }

    pub fn resume(&mut self, caller: AccountId) -> Result<()> {
        Ok(self.governance.resume(caller)?)
    }

    /// Pause or unpause reward claims. Owner only. Stakes and unstakes are
    /// not affected, and rewards keep accruing while paused.
    pub fn set_claim_reward_paused(&mut self, caller: AccountId, paused: bool) -> Result<()> {
        self.governance.require_owner(caller)?;
        self.claim_reward_paused = paused;
        tracing::info!(service = %self.id, paused, "staking: claim reward pause set");
        Ok(())
    }

    /// Send `amount` of `asset` the service holds but owes nobody to
    /// `recipient`. Owner only.
    ///
    /// `held` is the service account's balance of `asset`. Of the staking
    /// asset only what exceeds `total_staked` is recoverable; other assets
    /// are recoverable in full.
    ///
    /// # Errors
    ///
    /// - [`StakingError::InvalidRecoverableAsset`] for the reward asset
    /// - [`StakingError::RecoverableAmountNotEnough`] if `amount` exceeds what is recoverable
    /// - [`StakingError::ZeroAccount`] for a zero recipient
    pub fn recover_funds(
        &self,
        caller: AccountId,
        asset: &AssetId,
        amount: Decimal,
        recipient: AccountId,
        held: Decimal,
    ) -> Result<Settlement> {
        self.governance.require_owner(caller)?;
        if asset == &self.reward_asset {
            return Err(StakingError::InvalidRecoverableAsset(asset.clone()));
        }
        if recipient.is_zero() {
            return Err(StakingError::ZeroAccount);
        }
        let available = if asset == &self.staking_asset {
            held.saturating_sub(self.state.total_staked)
        } else {
            held
        };
        if amount > available {
            return Err(StakingError::RecoverableAmountNotEnough {
                requested: amount,
                available,
            });
        }
        tracing::info!(service = %self.id, %asset, %recipient, amount = %amount, "staking: funds recovered");
        Ok(Settlement::single(Movement::Recover {
            asset: asset.clone(),
            to: recipient,
            amount,
        }))
    }

    pub fn transfer_ownership(&mut self, caller: AccountId, new_owner: AccountId) -> Result<()> {
        Ok(self.governance.transfer_ownership(caller, new_owner)?)
    }

    pub fn snapshot(&self) -> ServiceRecord {
        ServiceRecord {
            governance: self.governance.clone(),
            state: self.state.clone(),
            nonces: self.nonces.clone(),
            claim_reward_paused: self.claim_reward_paused,
        }
    }

    /// Replace the mutable state with persisted records.
    pub fn restore(&mut self, record: ServiceRecord, positions: BTreeMap<AccountId, StakerPosition>) {
        self.governance = record.governance;
        self.state = record.state;
        self.nonces = record.nonces;
        self.claim_reward_paused = record.claim_reward_paused;
        self.positions = positions;
    }

    fn claim(
        &mut self,
        owner: AccountId,
        recipient: AccountId,
        supplied: Decimal,
        cap: Option<Decimal>,
    ) -> Result<Settlement> {
        if self.claim_reward_paused {
            return Err(StakingError::ClaimRewardPaused);
        }
        if recipient.is_zero() {
            return Err(StakingError::ZeroAccount);
        }
        let (state, mut position) = self.settled(owner, supplied)?;
        let paid = cap.map_or(position.accrued, |cap| cap.min(position.accrued));
        position.accrued = position.accrued.saturating_sub(paid);
        self.commit(owner, state, position);

        tracing::info!(service = %self.id, %owner, %recipient, paid = %paid, "staking: reward claimed");
        Ok(Settlement::single(Movement::Reward {
            to: recipient,
            amount: paid,
        }))
    }

    /// Steps 1 and 2 on copies: the folded state and the settled position.
    fn settled(&self, staker: AccountId, supplied: Decimal) -> Result<(RewardState, StakerPosition)> {
        let mut state = self.state.clone();
        state.fold(supplied)?;
        let rate = state.historical_reward_rate;
        let mut position = self
            .positions
            .get(&staker)
            .cloned()
            .unwrap_or_else(|| StakerPosition::new(rate));
        position.settle(rate)?;
        Ok((state, position))
    }

    fn commit(&mut self, staker: AccountId, state: RewardState, position: StakerPosition) {
        self.state = state;
        self.positions.insert(staker, position);
    }

    fn authorize(
        &self,
        caller: AccountId,
        signed: &SignedAuthorization,
        action: AuthorizationAction,
        amount: Decimal,
        now: Timestamp,
    ) -> Result<()> {
        let authorization = &signed.authorization;
        if now > authorization.deadline {
            return Err(StakingError::AuthorizationExpired {
                deadline: authorization.deadline,
                now,
            });
        }
        let expected = self.next_nonce(authorization.owner);
        if authorization.nonce != expected {
            return Err(StakingError::InvalidNonce {
                expected,
                actual: authorization.nonce,
            });
        }
        if authorization.domain != self.domain {
            return Err(StakingError::WrongDomain);
        }
        if authorization.action != action {
            return Err(StakingError::WrongAction {
                expected: action,
                actual: authorization.action,
            });
        }
        if caller != authorization.spender {
            return Err(StakingError::WrongSpender);
        }
        signed.verify_signature()?;
        if amount > authorization.signed_amount {
            return Err(StakingError::AmountExceedsAuthorization {
                requested: amount,
                signed: authorization.signed_amount,
            });
        }
        Ok(())
    }

    fn consume_nonce(&mut self, owner: AccountId) {
        let nonce = self.nonces.entry(owner).or_insert(0);
        *nonce = nonce.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::Authorization;
    use accrue_crypto::ed25519::SigningKey;
    use accrue_types::AccessError;

    const SERVICE: AccountId = AccountId::from_bytes([0xEE; 32]);
    const OWNER: AccountId = AccountId::from_bytes([1; 32]);
    const ALICE: AccountId = AccountId::from_bytes([0xA1; 32]);
    const BOB: AccountId = AccountId::from_bytes([0xB0; 32]);
    const RELAYER: AccountId = AccountId::from_bytes([0x77; 32]);

    fn d(s: &str) -> Decimal {
        s.parse().expect("decimal")
    }

    fn int(n: u64) -> Decimal {
        Decimal::from_int(n)
    }

    fn service() -> StakingService {
        StakingService::new(SERVICE, OWNER, AssetId::new("LP"), AssetId::new("NMX"))
    }

    #[test]
    fn test_second_staker_does_not_share_earlier_supply() {
        let mut service = service();
        service.stake(ALICE, int(100), Decimal::ZERO).expect("alice stakes");

        // 10 arrives upstream and is pulled during Bob's stake.
        service.stake(BOB, int(50), int(10)).expect("bob stakes");

        assert_eq!(service.reward_state().historical_reward_rate, d("0.1"));
        assert_eq!(service.pending_reward(ALICE).expect("pending"), int(10));
        assert_eq!(service.pending_reward(BOB).expect("pending"), Decimal::ZERO);
        assert_eq!(
            service.position(BOB).expect("bob").initial_reward_rate,
            d("0.1")
        );
        assert_eq!(service.total_staked(), int(150));
    }

    #[test]
    fn test_stake_returns_deposit() {
        let mut service = service();
        let settlement = service.stake(ALICE, int(5), Decimal::ZERO).expect("stake");
        assert_eq!(
            settlement.movements,
            vec![Movement::Deposit {
                from: ALICE,
                amount: int(5)
            }]
        );
    }

    #[test]
    fn test_unstake_more_than_staked_changes_nothing() {
        let mut service = service();
        service.stake(ALICE, int(10), Decimal::ZERO).expect("stake");
        let before = service.clone();

        let err = service.unstake(ALICE, int(11), int(3)).expect_err("too much");
        assert_eq!(
            err,
            StakingError::NotEnoughStaked {
                requested: int(11),
                staked: int(10)
            }
        );
        assert_eq!(service, before);
    }

    #[test]
    fn test_unstake_keeps_earned_reward() {
        let mut service = service();
        service.stake(ALICE, int(10), Decimal::ZERO).expect("stake");

        let settlement = service.unstake_to(ALICE, BOB, int(10), int(4)).expect("unstake");
        assert_eq!(
            settlement.movements,
            vec![Movement::Withdraw { to: BOB, amount: int(10) }]
        );
        let position = service.position(ALICE).expect("position kept");
        assert_eq!(position.amount, Decimal::ZERO);
        assert_eq!(position.accrued, int(4));
        assert_eq!(service.total_staked(), Decimal::ZERO);

        let claim = service.claim_reward(ALICE, Decimal::ZERO).expect("claim");
        assert_eq!(claim.reward_paid(), int(4));
        assert_eq!(service.pending_reward(ALICE).expect("pending"), Decimal::ZERO);
    }

    #[test]
    fn test_zero_stake_supply_is_carried_forward() {
        let mut service = service();
        service.update_reward_rate(int(10)).expect("update");
        assert_eq!(service.reward_state().undistributed, int(10));

        // The stake folds first, with nothing staked yet.
        service.stake(ALICE, int(100), Decimal::ZERO).expect("stake");
        assert_eq!(service.reward_state().undistributed, int(10));

        let claim = service.claim_reward(ALICE, Decimal::ZERO).expect("claim");
        assert_eq!(claim.reward_paid(), int(10));
        assert_eq!(service.reward_state().undistributed, Decimal::ZERO);
    }

    #[test]
    fn test_zero_amount_stake_still_settles() {
        let mut service = service();
        service.stake(ALICE, int(20), Decimal::ZERO).expect("stake");
        let settlement = service.stake(ALICE, Decimal::ZERO, int(2)).expect("zero stake");
        assert!(settlement.is_empty());
        let position = service.position(ALICE).expect("position");
        assert_eq!(position.accrued, int(2));
        assert_eq!(position.initial_reward_rate, d("0.1"));
    }

    #[test]
    fn test_suspension_blocks_stake_only() {
        let mut service = service();
        service.stake(ALICE, int(10), Decimal::ZERO).expect("stake");
        assert!(service.suspend(ALICE).is_err());
        service.suspend(OWNER).expect("suspend");

        assert_eq!(
            service.stake(ALICE, int(1), Decimal::ZERO),
            Err(StakingError::Access(AccessError::Suspended))
        );
        service.claim_reward(ALICE, int(1)).expect("claim while suspended");
        service.unstake(ALICE, int(10), Decimal::ZERO).expect("unstake while suspended");

        service.resume(OWNER).expect("resume");
        service.stake(ALICE, int(1), Decimal::ZERO).expect("stake after resume");
    }

    #[test]
    fn test_stake_for_credits_beneficiary() {
        let mut service = service();
        let settlement = service
            .stake_for(ALICE, BOB, int(7), Decimal::ZERO)
            .expect("stake for");
        assert_eq!(
            settlement.movements,
            vec![Movement::Deposit { from: ALICE, amount: int(7) }]
        );
        assert_eq!(service.position(BOB).expect("bob").amount, int(7));
        assert!(service.position(ALICE).is_none());
        assert_eq!(
            service.stake_for(ALICE, AccountId::ZERO, int(1), Decimal::ZERO),
            Err(StakingError::ZeroAccount)
        );
    }

    #[test]
    fn test_rewards_split_pro_rata() {
        let mut service = service();
        service.stake(ALICE, int(30), Decimal::ZERO).expect("alice");
        service.stake(BOB, int(10), Decimal::ZERO).expect("bob");
        service.update_reward_rate(int(8)).expect("update");

        assert_eq!(service.pending_reward(ALICE).expect("alice"), int(6));
        assert_eq!(service.pending_reward(BOB).expect("bob"), int(2));
    }

    fn signed(
        key: &SigningKey,
        service: &StakingService,
        action: AuthorizationAction,
        amount: u64,
        nonce: u64,
    ) -> SignedAuthorization {
        Authorization {
            domain: service.domain(),
            action,
            owner: key.account_id(),
            spender: RELAYER,
            signed_amount: int(amount),
            nonce,
            deadline: 1_000,
        }
        .sign(key)
    }

    #[test]
    fn test_stake_with_authorization() {
        let key = SigningKey::from_bytes(&[21; 32]);
        let owner = key.account_id();
        let mut service = service();
        let auth = signed(&key, &service, AuthorizationAction::Stake, 100, 0);

        let settlement = service
            .stake_with_authorization(RELAYER, &auth, int(60), 500, Decimal::ZERO)
            .expect("authorized stake");
        assert_eq!(
            settlement.movements,
            vec![Movement::Deposit { from: owner, amount: int(60) }]
        );
        assert_eq!(service.position(owner).expect("position").amount, int(60));
        assert_eq!(service.next_nonce(owner), 1);

        // Replay is rejected.
        assert_eq!(
            service.stake_with_authorization(RELAYER, &auth, int(1), 500, Decimal::ZERO),
            Err(StakingError::InvalidNonce { expected: 1, actual: 0 })
        );
    }

    #[test]
    fn test_authorization_checks() {
        let key = SigningKey::from_bytes(&[21; 32]);
        let mut service = service();
        let auth = signed(&key, &service, AuthorizationAction::Stake, 100, 0);

        assert_eq!(
            service.stake_with_authorization(RELAYER, &auth, int(1), 1_001, Decimal::ZERO),
            Err(StakingError::AuthorizationExpired { deadline: 1_000, now: 1_001 })
        );
        assert_eq!(
            service.stake_with_authorization(ALICE, &auth, int(1), 0, Decimal::ZERO),
            Err(StakingError::WrongSpender)
        );
        assert_eq!(
            service.stake_with_authorization(RELAYER, &auth, int(101), 0, Decimal::ZERO),
            Err(StakingError::AmountExceedsAuthorization {
                requested: int(101),
                signed: int(100)
            })
        );
        assert!(matches!(
            service.unstake_with_authorization(RELAYER, &auth, int(1), 0, Decimal::ZERO),
            Err(StakingError::WrongAction { .. })
        ));

        let other = StakingService::new(
            AccountId::from_bytes([0xEF; 32]),
            OWNER,
            AssetId::new("LP"),
            AssetId::new("NMX"),
        );
        let foreign = signed(&key, &other, AuthorizationAction::Stake, 100, 0);
        assert_eq!(
            service.stake_with_authorization(RELAYER, &foreign, int(1), 0, Decimal::ZERO),
            Err(StakingError::WrongDomain)
        );

        let mut forged = auth.clone();
        forged.authorization.signed_amount = int(1_000_000);
        assert_eq!(
            service.stake_with_authorization(RELAYER, &forged, int(500), 0, Decimal::ZERO),
            Err(StakingError::InvalidSignature)
        );
        assert_eq!(service.next_nonce(key.account_id()), 0);
    }

    #[test]
    fn test_failed_operation_keeps_nonce() {
        let key = SigningKey::from_bytes(&[22; 32]);
        let owner = key.account_id();
        let mut service = service();
        service.stake(owner, int(5), Decimal::ZERO).expect("stake");
        let auth = signed(&key, &service, AuthorizationAction::Unstake, 50, 0);

        assert!(matches!(
            service.unstake_with_authorization(RELAYER, &auth, int(6), 0, Decimal::ZERO),
            Err(StakingError::NotEnoughStaked { .. })
        ));
        assert_eq!(service.next_nonce(owner), 0);

        let settlement = service
            .unstake_with_authorization(RELAYER, &auth, int(5), 0, Decimal::ZERO)
            .expect("unstake");
        assert_eq!(
            settlement.movements,
            vec![Movement::Withdraw { to: owner, amount: int(5) }]
        );
        assert_eq!(service.next_nonce(owner), 1);
    }

    #[test]
    fn test_claim_with_authorization_is_capped() {
        let key = SigningKey::from_bytes(&[23; 32]);
        let owner = key.account_id();
        let mut service = service();
        service.stake(owner, int(10), Decimal::ZERO).expect("stake");
        service.update_reward_rate(int(9)).expect("update");

        let auth = signed(&key, &service, AuthorizationAction::Claim, 4, 0);
        let settlement = service
            .claim_with_authorization(RELAYER, &auth, 0, Decimal::ZERO)
            .expect("claim");
        assert_eq!(settlement.reward_paid(), int(4));
        assert_eq!(service.pending_reward(owner).expect("pending"), int(5));
    }

    #[test]
    fn test_claim_pause_blocks_claims_only() {
        let key = SigningKey::from_bytes(&[24; 32]);
        let owner = key.account_id();
        let mut service = service();
        service.stake(owner, int(10), Decimal::ZERO).expect("stake");
        service.update_reward_rate(int(6)).expect("update");

        assert!(service.set_claim_reward_paused(ALICE, true).is_err());
        service.set_claim_reward_paused(OWNER, true).expect("pause");
        assert!(service.is_claim_reward_paused());

        assert_eq!(
            service.claim_reward(owner, Decimal::ZERO),
            Err(StakingError::ClaimRewardPaused)
        );
        assert_eq!(
            service.claim_reward_to(owner, BOB, Decimal::ZERO),
            Err(StakingError::ClaimRewardPaused)
        );
        let auth = signed(&key, &service, AuthorizationAction::Claim, 6, 0);
        assert_eq!(
            service.claim_with_authorization(RELAYER, &auth, 0, Decimal::ZERO),
            Err(StakingError::ClaimRewardPaused)
        );
        assert_eq!(service.next_nonce(owner), 0);

        // Stakes and unstakes keep working, and reward keeps accruing.
        service.stake(ALICE, int(10), int(4)).expect("stake while paused");
        service.unstake(owner, int(5), Decimal::ZERO).expect("unstake while paused");
        assert_eq!(service.pending_reward(owner).expect("pending"), int(10));

        service.set_claim_reward_paused(OWNER, false).expect("unpause");
        let claim = service.claim_reward(owner, Decimal::ZERO).expect("claim");
        assert_eq!(claim.reward_paid(), int(10));
    }

    #[test]
    fn test_recover_funds() {
        let mut service = service();
        service.stake(ALICE, int(10), Decimal::ZERO).expect("stake");
        let lp = AssetId::new("LP");

        // 20 LP held against 10 staked: 10 belong to nobody.
        let settlement = service
            .recover_funds(OWNER, &lp, int(10), BOB, int(20))
            .expect("recover all");
        assert_eq!(
            settlement.movements,
            vec![Movement::Recover {
                asset: lp.clone(),
                to: BOB,
                amount: int(10)
            }]
        );
        assert_eq!(
            service.recover_funds(OWNER, &lp, int(11), BOB, int(20)),
            Err(StakingError::RecoverableAmountNotEnough {
                requested: int(11),
                available: int(10)
            })
        );
        assert_eq!(
            service.recover_funds(OWNER, &AssetId::new("NMX"), int(1), BOB, int(20)),
            Err(StakingError::InvalidRecoverableAsset(AssetId::new("NMX")))
        );
        assert!(matches!(
            service.recover_funds(BOB, &lp, int(1), BOB, int(20)),
            Err(StakingError::Access(AccessError::NotOwner { .. }))
        ));

        // A foreign asset is recoverable in full.
        let usdt = AssetId::new("USDT");
        let settlement = service
            .recover_funds(OWNER, &usdt, int(7), BOB, int(7))
            .expect("recover foreign");
        assert_eq!(settlement.movements.len(), 1);
        assert_eq!(service.total_staked(), int(10));
    }

    #[test]
    fn test_snapshot_restore() {
        let mut service = service();
        service.stake(ALICE, int(3), Decimal::ZERO).expect("stake");
        service.update_reward_rate(int(1)).expect("update");
        service.set_claim_reward_paused(OWNER, true).expect("pause");

        let record = service.snapshot();
        assert!(record.claim_reward_paused);
        let json = serde_json::to_string(&record).expect("serialize");
        let record: ServiceRecord = serde_json::from_str(&json).expect("deserialize");
        let positions = service
            .positions()
            .map(|(k, v)| (*k, v.clone()))
            .collect();

        let mut fresh = self::service();
        fresh.restore(record, positions);
        assert_eq!(fresh, service);
    }
}
