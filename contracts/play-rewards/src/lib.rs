//! CanvasForge Play Rewards Contract
//!
//! Counts plays per published creation and accrues a fixed reward for the
//! creation's owner every time the count reaches a multiple of
//! [`PLAYS_PER_REWARD`]. Owners claim accrued rewards from a shared pool that
//! anyone may top up.
//!
//! Two separate trust checks live here and are kept apart on purpose:
//! - `record_play` trusts the configured recorder (the play admission
//!   service) to have vetted each play; it does no content checks itself.
//! - `claim_rewards` pays only the registered owner of a creation.
//!
//! ## Storage Strategy
//! - `instance()`: Admin, Token, Recorder, RewardUnit.
//! - `persistent()`: PoolBalance and one `Creation(id)` entry per creation,
//!   bumped on every write.
#![no_std]
#![allow(unexpected_cfgs)]

use canvasforge_shared::{collect_payment, disburse, PERSISTENT_BUMP_LEDGERS};
use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, Address, Bytes, Env,
};

/// Play-count multiple that triggers a reward accrual.
pub const PLAYS_PER_REWARD: u64 = 100;

/// One whole token at 7 decimals.
pub const DEFAULT_REWARD_UNIT: i128 = 10_000_000;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized     = 2,
    Unauthorized       = 3,
    InvalidAmount      = 4,
    InvalidCreationId  = 5,
    NotRegistered      = 6,
    NothingToClaim     = 7,
    InsufficientPool   = 8,
    PaymentMismatch    = 9,
    Overflow           = 10,
}

impl From<canvasforge_shared::Error> for Error {
    fn from(err: canvasforge_shared::Error) -> Self {
        match err {
            canvasforge_shared::Error::InvalidAmount => Error::InvalidAmount,
            canvasforge_shared::Error::PaymentMismatch => Error::PaymentMismatch,
            canvasforge_shared::Error::Overflow => Error::Overflow,
        }
    }
}

// ---------------------------------------------------------------------------
// Storage keys and data types
// ---------------------------------------------------------------------------

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Admin,
    Token,
    Recorder,
    RewardUnit,
    PoolBalance,
    Creation(Bytes),
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreationCounter {
    pub creation_id: Bytes,
    pub owner: Address,
    pub play_count: u64,
    /// Rewards accrued since the last claim.
    pub accrued_reward: i128,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[contractevent]
pub struct Initialized {
    pub admin: Address,
    pub token: Address,
    pub recorder: Address,
    pub reward_unit: i128,
}

#[contractevent]
pub struct CreationRegistered {
    #[topic]
    pub creation_id: Bytes,
    #[topic]
    pub owner: Address,
}

#[contractevent]
pub struct PlayRecorded {
    #[topic]
    pub creation_id: Bytes,
    pub play_count: u64,
}

#[contractevent]
pub struct RewardAccrued {
    #[topic]
    pub creation_id: Bytes,
    pub play_count: u64,
    pub accrued_reward: i128,
}

#[contractevent]
pub struct RewardsClaimed {
    #[topic]
    pub creation_id: Bytes,
    #[topic]
    pub owner: Address,
    pub amount: i128,
}

#[contractevent]
pub struct PoolFunded {
    #[topic]
    pub from: Address,
    pub amount: i128,
    pub pool_balance: i128,
}

#[contractevent]
pub struct RecorderChanged {
    pub recorder: Address,
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[contract]
pub struct PlayRewards;

#[contractimpl]
impl PlayRewards {
    /// Initialize with the operator, reward token, trusted recorder and the
    /// amount accrued per [`PLAYS_PER_REWARD`] plays. Call once.
    pub fn init(
        env: Env,
        admin: Address,
        token: Address,
        recorder: Address,
        reward_unit: i128,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Admin) {
            return Err(Error::AlreadyInitialized);
        }
        if reward_unit <= 0 {
            return Err(Error::InvalidAmount);
        }

        admin.require_auth();

        let instance = env.storage().instance();
        instance.set(&DataKey::Admin, &admin);
        instance.set(&DataKey::Token, &token);
        instance.set(&DataKey::Recorder, &recorder);
        instance.set(&DataKey::RewardUnit, &reward_unit);
        set_pool_balance(&env, 0);

        Initialized {
            admin,
            token,
            recorder,
            reward_unit,
        }
        .publish(&env);
        Ok(())
    }

    /// Start tracking a creation. Idempotent: the first registration fixes
    /// the owner, later calls change nothing and return `false`. The owner
    /// must sign.
    pub fn register_creation(
        env: Env,
        creation_id: Bytes,
        owner: Address,
    ) -> Result<bool, Error> {
        require_initialized(&env)?;
        if creation_id.is_empty() {
            return Err(Error::InvalidCreationId);
        }
        owner.require_auth();

        let key = DataKey::Creation(creation_id.clone());
        if env.storage().persistent().has(&key) {
            return Ok(false);
        }

        let counter = CreationCounter {
            creation_id: creation_id.clone(),
            owner: owner.clone(),
            play_count: 0,
            accrued_reward: 0,
        };
        set_creation(&env, &counter);

        CreationRegistered { creation_id, owner }.publish(&env);
        Ok(true)
    }

    /// Count one admitted play. Recorder only. Returns the new play count.
    pub fn record_play(env: Env, creation_id: Bytes) -> Result<u64, Error> {
        require_initialized(&env)?;
        get_recorder(&env)?.require_auth();

        let mut counter = get_creation(&env, &creation_id)?;
        counter.play_count = counter.play_count.checked_add(1).ok_or(Error::Overflow)?;

        let accrues = counter.play_count % PLAYS_PER_REWARD == 0;
        if accrues {
            counter.accrued_reward = counter
                .accrued_reward
                .checked_add(get_reward_unit(&env))
                .ok_or(Error::Overflow)?;
        }
        set_creation(&env, &counter);

        PlayRecorded {
            creation_id: creation_id.clone(),
            play_count: counter.play_count,
        }
        .publish(&env);
        if accrues {
            RewardAccrued {
                creation_id,
                play_count: counter.play_count,
                accrued_reward: counter.accrued_reward,
            }
            .publish(&env);
        }

        Ok(counter.play_count)
    }

    /// Pay everything accrued for `creation_id` to its owner.
    /// Play count is left untouched.
    pub fn claim_rewards(env: Env, caller: Address, creation_id: Bytes) -> Result<i128, Error> {
        require_initialized(&env)?;
        caller.require_auth();

        let mut counter = get_creation(&env, &creation_id)?;
        if caller != counter.owner {
            return Err(Error::Unauthorized);
        }

        let amount = counter.accrued_reward;
        if amount <= 0 {
            return Err(Error::NothingToClaim);
        }

        let pool = get_pool_balance(&env);
        if pool < amount {
            return Err(Error::InsufficientPool);
        }

        counter.accrued_reward = 0;
        set_creation(&env, &counter);
        set_pool_balance(&env, pool.checked_sub(amount).ok_or(Error::Overflow)?);

        disburse(&env, &get_token(&env), &counter.owner, amount);

        RewardsClaimed {
            creation_id,
            owner: counter.owner,
            amount,
        }
        .publish(&env);
        Ok(amount)
    }

    /// Top up the claimable pool with `amount` tokens pulled from `from`.
    pub fn fund_pool(env: Env, from: Address, amount: i128) -> Result<(), Error> {
        require_initialized(&env)?;
        from.require_auth();

        collect_payment(&env, &get_token(&env), &from, amount)?;

        let pool_balance = get_pool_balance(&env)
            .checked_add(amount)
            .ok_or(Error::Overflow)?;
        set_pool_balance(&env, pool_balance);

        PoolFunded {
            from,
            amount,
            pool_balance,
        }
        .publish(&env);
        Ok(())
    }

    /// Replace the trusted recorder account. Admin only.
    pub fn set_recorder(env: Env, admin: Address, recorder: Address) -> Result<(), Error> {
        require_admin(&env, &admin)?;
        env.storage().instance().set(&DataKey::Recorder, &recorder);
        RecorderChanged { recorder }.publish(&env);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// Plays recorded for a creation; 0 when unregistered.
    pub fn get_play_count(env: Env, creation_id: Bytes) -> u64 {
        get_creation(&env, &creation_id)
            .map(|c| c.play_count)
            .unwrap_or(0)
    }

    /// Unclaimed rewards for a creation; 0 when unregistered.
    pub fn get_accrued_reward(env: Env, creation_id: Bytes) -> i128 {
        get_creation(&env, &creation_id)
            .map(|c| c.accrued_reward)
            .unwrap_or(0)
    }

    pub fn get_creation(env: Env, creation_id: Bytes) -> Result<CreationCounter, Error> {
        get_creation(&env, &creation_id)
    }

    pub fn get_pool_balance(env: Env) -> Result<i128, Error> {
        require_initialized(&env)?;
        Ok(get_pool_balance(&env))
    }

    pub fn get_recorder(env: Env) -> Result<Address, Error> {
        get_recorder(&env)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn require_initialized(env: &Env) -> Result<(), Error> {
    if !env.storage().instance().has(&DataKey::Admin) {
        return Err(Error::NotInitialized);
    }
    Ok(())
}

fn require_admin(env: &Env, caller: &Address) -> Result<(), Error> {
    let admin: Address = env
        .storage()
        .instance()
        .get(&DataKey::Admin)
        .ok_or(Error::NotInitialized)?;
    caller.require_auth();
    if *caller != admin {
        return Err(Error::Unauthorized);
    }
    Ok(())
}

fn get_recorder(env: &Env) -> Result<Address, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Recorder)
        .ok_or(Error::NotInitialized)
}

fn get_token(env: &Env) -> Address {
    env.storage()
        .instance()
        .get(&DataKey::Token)
        .expect("PlayRewards: token not set")
}

fn get_reward_unit(env: &Env) -> i128 {
    env.storage()
        .instance()
        .get(&DataKey::RewardUnit)
        .unwrap_or(DEFAULT_REWARD_UNIT)
}

fn get_creation(env: &Env, creation_id: &Bytes) -> Result<CreationCounter, Error> {
    env.storage()
        .persistent()
        .get(&DataKey::Creation(creation_id.clone()))
        .ok_or(Error::NotRegistered)
}

fn set_creation(env: &Env, counter: &CreationCounter) {
    let key = DataKey::Creation(counter.creation_id.clone());
    env.storage().persistent().set(&key, counter);
    env.storage()
        .persistent()
        .extend_ttl(&key, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);
}

fn get_pool_balance(env: &Env) -> i128 {
    env.storage()
        .persistent()
        .get(&DataKey::PoolBalance)
        .unwrap_or(0)
}

fn set_pool_balance(env: &Env, value: i128) {
    env.storage().persistent().set(&DataKey::PoolBalance, &value);
    env.storage().persistent().extend_ttl(
        &DataKey::PoolBalance,
        PERSISTENT_BUMP_LEDGERS,
        PERSISTENT_BUMP_LEDGERS,
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test;
