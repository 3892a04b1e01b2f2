//! CanvasForge Wager Pool Contract
//!
//! Holds the house reserve that covers automated counterparties and runs the
//! single wager round played against it. A player joins with a stake, the
//! reserve earmarks `stake * counterparties`, an off-ledger game decides the
//! outcome, `settle` disburses the session pool and the operator `reset`s the
//! slot for the next player.
//!
//! ## Phase as concurrency control
//! join/settle/reset arrive as independent, unordered, retryable calls. Every
//! mutator checks the round phase before touching anything, so a duplicate
//! settle, a second join or an early reset fails with `WrongPhase` and moves no
//! value. The transitions themselves live in [`round`] as pure functions.
//!
//! ## Storage Strategy
//! - `instance()`: Admin, Token, TimeoutLedgers. Fixed at `init`.
//! - `persistent()`: Reserve and Round, bumped on every write.
//!
//! ## Invariant
//! `token.balance(contract) == reserve + session_pool` while a round is
//! active, and `== reserve` otherwise, assuming all inflows go through
//! `fund` and `join`.
#![no_std]
#![allow(unexpected_cfgs)]

mod round;

pub use round::{ActiveRound, Outcome, Round, RoundStatus, SettledRound};

use canvasforge_shared::{collect_payment, disburse, PERSISTENT_BUMP_LEDGERS};
use round::Pool;
use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, Address, Env,
};

/// Default round timeout (~1 hour at 5 s/ledger).
pub const DEFAULT_TIMEOUT_LEDGERS: u32 = 720;

// ---------------------------------------------------------------------------
// Error Types
// ---------------------------------------------------------------------------

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized    = 1,
    NotInitialized        = 2,
    Unauthorized          = 3,
    WrongPhase            = 4,
    InsufficientReserve   = 5,
    InvalidStake          = 6,
    InvalidCounterparties = 7,
    InvalidOutcome        = 8,
    InvalidAmount         = 9,
    PaymentMismatch       = 10,
    DeadlineNotReached    = 11,
    InvalidConfig         = 12,
    Overflow              = 13,
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
// Storage Types
// ---------------------------------------------------------------------------

#[contracttype]
pub enum DataKey {
    // --- instance() ---
    Admin,
    Token,
    TimeoutLedgers,
    // --- persistent() ---
    /// Funds not earmarked by the active round.
    Reserve,
    /// The single round slot.
    Round,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[contractevent]
pub struct Initialized {
    #[topic]
    pub admin: Address,
    pub token: Address,
    pub timeout_ledgers: u32,
}

#[contractevent]
pub struct Funded {
    #[topic]
    pub from: Address,
    pub amount: i128,
    pub reserve: i128,
}

#[contractevent]
pub struct RoundJoined {
    #[topic]
    pub player: Address,
    pub stake: i128,
    pub counterparties: u32,
    pub session_pool: i128,
    pub deadline: u32,
}

#[contractevent]
pub struct RoundSettled {
    #[topic]
    pub player: Address,
    pub outcome: Outcome,
    pub paid_to_player: i128,
    pub reserve: i128,
}

#[contractevent]
pub struct RoundReset {
    #[topic]
    pub admin: Address,
}

#[contractevent]
pub struct EmergencyWithdrawn {
    #[topic]
    pub admin: Address,
    pub paid_to_player: i128,
    pub paid_to_operator: i128,
}

#[contractevent]
pub struct RoundTimedOut {
    #[topic]
    pub player: Address,
    pub refunded: i128,
    pub reserve: i128,
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[contract]
pub struct WagerPool;

#[contractimpl]
impl WagerPool {
    /// Initialize the pool. May only be called once.
    ///
    /// `admin` becomes the operator for every privileged call; `token` is the
    /// SEP-41 asset stakes and reserve are held in. `timeout_ledgers` is how
    /// long an unsettled round may stay active before anyone can close it
    /// with `force_timeout`.
    pub fn init(
        env: Env,
        admin: Address,
        token: Address,
        timeout_ledgers: u32,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Admin) {
            return Err(Error::AlreadyInitialized);
        }
        if timeout_ledgers == 0 {
            return Err(Error::InvalidConfig);
        }

        admin.require_auth();

        env.storage().instance().set(&DataKey::Admin, &admin);
        env.storage().instance().set(&DataKey::Token, &token);
        env.storage()
            .instance()
            .set(&DataKey::TimeoutLedgers, &timeout_ledgers);

        store_pool(&env, &Pool::new());

        Initialized {
            admin,
            token,
            timeout_ledgers,
        }
        .publish(&env);

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Operator funding
    // -----------------------------------------------------------------------

    /// Deposit `amount` tokens from the operator into the reserve.
    /// Only while no round is in progress.
    pub fn fund(env: Env, caller: Address, amount: i128) -> Result<(), Error> {
        require_initialized(&env)?;
        require_admin(&env, &caller)?;

        let next = load_pool(&env).fund(amount)?;
        collect_payment(&env, &get_token(&env), &caller, amount)?;
        store_pool(&env, &next);

        Funded {
            from: caller,
            amount,
            reserve: next.reserve,
        }
        .publish(&env);

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Round lifecycle
    // -----------------------------------------------------------------------

    /// Open a round: pull `stake` from the player and earmark
    /// `stake * counterparties` from the reserve.
    pub fn join(
        env: Env,
        player: Address,
        stake: i128,
        counterparties: u32,
    ) -> Result<(), Error> {
        require_initialized(&env)?;
        player.require_auth();

        let next = load_pool(&env).join(
            player.clone(),
            stake,
            counterparties,
            env.ledger().sequence(),
            get_timeout_ledgers(&env),
        )?;
        collect_payment(&env, &get_token(&env), &player, stake)?;
        store_pool(&env, &next);

        if let Some(active) = next.round.active() {
            RoundJoined {
                player,
                stake,
                counterparties,
                session_pool: active.session_pool,
                deadline: active.deadline,
            }
            .publish(&env);
        }

        Ok(())
    }

    /// Submit the off-ledger outcome of the active round.
    ///
    /// `outcome_code`: 0 = player lost, 1 = player won, 2 = draw. Callable by
    /// the round's player or the operator; winnings always go to the player
    /// recorded at join.
    pub fn settle(env: Env, caller: Address, outcome_code: u32) -> Result<(), Error> {
        require_initialized(&env)?;

        let pool = load_pool(&env);
        let player = pool
            .round
            .active()
            .map(|active| active.player.clone())
            .ok_or(Error::WrongPhase)?;
        let outcome = Outcome::from_code(outcome_code)?;

        caller.require_auth();
        if caller != player && caller != get_admin(&env)? {
            return Err(Error::Unauthorized);
        }

        let (next, payout) = pool.settle(outcome)?;

        // State is written before the outbound transfer.
        store_pool(&env, &next);
        disburse(&env, &get_token(&env), &player, payout.to_player);

        RoundSettled {
            player,
            outcome,
            paid_to_player: payout.to_player,
            reserve: next.reserve,
        }
        .publish(&env);

        Ok(())
    }

    /// Return a settled round slot to idle. Operator only.
    pub fn reset(env: Env, caller: Address) -> Result<(), Error> {
        require_initialized(&env)?;
        require_admin(&env, &caller)?;

        let next = load_pool(&env).reset()?;
        store_pool(&env, &next);

        RoundReset { admin: caller }.publish(&env);

        Ok(())
    }

    /// Drain the pool to the operator. Operator only.
    ///
    /// While idle the whole reserve is paid out. While a round is active the
    /// player's stake is refunded first, the reserve and the counterparty
    /// earmark go to the operator, and the round is closed as
    /// `EmergencyDraw`; it still has to be `reset`.
    pub fn emergency_withdraw(env: Env, caller: Address) -> Result<(), Error> {
        require_initialized(&env)?;
        require_admin(&env, &caller)?;

        let pool = load_pool(&env);
        let player = pool.round.active().map(|active| active.player.clone());
        let (next, payout) = pool.emergency_withdraw()?;

        store_pool(&env, &next);

        let token = get_token(&env);
        if let Some(player) = player {
            disburse(&env, &token, &player, payout.to_player);
        }
        disburse(&env, &token, &caller, payout.to_operator);

        EmergencyWithdrawn {
            admin: caller,
            paid_to_player: payout.to_player,
            paid_to_operator: payout.to_operator,
        }
        .publish(&env);

        Ok(())
    }

    /// Close an active round whose deadline has passed. Anyone may call.
    /// The player gets the stake back and the earmark returns to the reserve.
    pub fn force_timeout(env: Env) -> Result<(), Error> {
        require_initialized(&env)?;

        let (next, payout) = load_pool(&env).force_timeout(env.ledger().sequence())?;
        let player = next
            .round
            .settled()
            .map(|settled| settled.player.clone())
            .ok_or(Error::WrongPhase)?;

        store_pool(&env, &next);
        disburse(&env, &get_token(&env), &player, payout.to_player);

        RoundTimedOut {
            player,
            refunded: payout.to_player,
            reserve: next.reserve,
        }
        .publish(&env);

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// Reserve balance not earmarked by the active round.
    pub fn get_balance(env: Env) -> Result<i128, Error> {
        require_initialized(&env)?;
        Ok(load_pool(&env).reserve)
    }

    pub fn get_status(env: Env) -> Result<RoundStatus, Error> {
        require_initialized(&env)?;
        Ok(load_pool(&env).round.status())
    }

    /// Outcome of the last settled round; `None` while idle or active.
    pub fn get_outcome(env: Env) -> Result<Option<Outcome>, Error> {
        require_initialized(&env)?;
        Ok(load_pool(&env).round.outcome())
    }

    pub fn get_round(env: Env) -> Result<Round, Error> {
        require_initialized(&env)?;
        Ok(load_pool(&env).round)
    }

    pub fn get_admin(env: Env) -> Result<Address, Error> {
        get_admin(&env)
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn require_initialized(env: &Env) -> Result<(), Error> {
    if !env.storage().instance().has(&DataKey::Admin) {
        return Err(Error::NotInitialized);
    }
    Ok(())
}

fn get_admin(env: &Env) -> Result<Address, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Admin)
        .ok_or(Error::NotInitialized)
}

/// Verify that `caller` is the stored operator and has signed the invocation.
fn require_admin(env: &Env, caller: &Address) -> Result<(), Error> {
    let admin = get_admin(env)?;
    caller.require_auth();
    if caller != &admin {
        return Err(Error::Unauthorized);
    }
    Ok(())
}

fn get_token(env: &Env) -> Address {
    env.storage()
        .instance()
        .get(&DataKey::Token)
        .expect("WagerPool: token not set")
}

fn get_timeout_ledgers(env: &Env) -> u32 {
    env.storage()
        .instance()
        .get(&DataKey::TimeoutLedgers)
        .unwrap_or(DEFAULT_TIMEOUT_LEDGERS)
}

fn load_pool(env: &Env) -> Pool {
    let storage = env.storage().persistent();
    Pool {
        reserve: storage.get(&DataKey::Reserve).unwrap_or(0),
        round: storage.get(&DataKey::Round).unwrap_or(Round::Idle),
    }
}

fn store_pool(env: &Env, pool: &Pool) {
    let storage = env.storage().persistent();
    storage.set(&DataKey::Reserve, &pool.reserve);
    storage.extend_ttl(&DataKey::Reserve, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);
    storage.set(&DataKey::Round, &pool.round);
    storage.extend_ttl(&DataKey::Round, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
